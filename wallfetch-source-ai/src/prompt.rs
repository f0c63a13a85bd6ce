use wallfetch_core::config::AiConfig;
use wallfetch_core::error::{Result, WallfetchError};
use wallfetch_core::models::{AiStyle, TargetResolution};
use wallfetch_core::sources::GenerationRequest;

pub fn style_terms(style: AiStyle) -> &'static str {
    match style {
        AiStyle::Photography => {
            "high-resolution, professional photography, wallpaper, desktop background"
        }
        AiStyle::DigitalArt => "digital art, high-quality, wallpaper, desktop background, detailed",
        AiStyle::Abstract => {
            "abstract art, modern, clean, wallpaper, desktop background, high-resolution"
        }
        AiStyle::Minimal => {
            "minimalist, clean, simple, wallpaper, desktop background, modern design"
        }
    }
}

/// 1080p and 1440p have no terms of their own and borrow the 4K ones.
pub fn resolution_terms(resolution: TargetResolution) -> &'static str {
    match resolution {
        TargetResolution::Ultrawide => "ultrawide aspect ratio, panoramic, wide-screen wallpaper",
        TargetResolution::Mobile => "mobile wallpaper, vertical orientation, high-resolution",
        TargetResolution::Uhd4k | TargetResolution::Qhd1440 | TargetResolution::Hd1080 => {
            "4K resolution, ultra-high-definition, sharp details"
        }
    }
}

pub fn enhance(prompt: &str, style: AiStyle, resolution: TargetResolution) -> String {
    format!(
        "{}, {}, {}",
        prompt.trim(),
        style_terms(style),
        resolution_terms(resolution)
    )
}

/// The prompt actually sent to a generator.
pub fn prepare(request: &GenerationRequest, ai: &AiConfig) -> Result<String> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(WallfetchError::invalid_config("prompt", "must not be empty"));
    }
    Ok(if ai.auto_enhance_prompts {
        enhance(prompt, request.style, request.resolution)
    } else {
        prompt.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.into(),
            style: AiStyle::Minimal,
            resolution: TargetResolution::Ultrawide,
            count: 1,
        }
    }

    #[test]
    fn test_enhance() {
        assert_eq!(
            enhance(" misty forest ", AiStyle::Photography, TargetResolution::Uhd4k),
            "misty forest, high-resolution, professional photography, wallpaper, \
             desktop background, 4K resolution, ultra-high-definition, sharp details"
        );
        assert!(enhance("x", AiStyle::Abstract, TargetResolution::Mobile)
            .ends_with("vertical orientation, high-resolution"));
        assert_eq!(
            resolution_terms(TargetResolution::Hd1080),
            resolution_terms(TargetResolution::Uhd4k)
        );
    }

    #[test]
    fn test_prepare_respects_auto_enhance() {
        let mut ai = AiConfig::default();
        let enhanced = prepare(&request("calm sea"), &ai).unwrap();
        assert!(enhanced.starts_with("calm sea, minimalist"));
        assert!(enhanced.contains("panoramic"));

        ai.auto_enhance_prompts = false;
        assert_eq!(prepare(&request("  calm sea "), &ai).unwrap(), "calm sea");
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let err = prepare(&request("   "), &AiConfig::default()).unwrap_err();
        assert!(matches!(err, WallfetchError::InvalidConfig { .. }));
    }
}
