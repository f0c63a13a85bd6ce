//! Image generators. Each one turns a prompt into one or more candidates
//! that flow through the same quality check and storage as downloads.
//! Generated images travel inline as `data:` URIs where the service
//! returns them inline.

pub mod craiyon;
pub mod monica;
pub mod prompt;
pub mod stable_diffusion;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use wallfetch_core::config::{AiConfig, Config};
use wallfetch_core::error::{Result, WallfetchError};
use wallfetch_core::models::{SourceKind, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{GenerationRequest, WallpaperSource};

pub use craiyon::{CraiyonClient, CraiyonConfig};
pub use monica::{MonicaClient, MonicaConfig};
pub use stable_diffusion::{StableDiffusionClient, StableDiffusionConfig};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_TITLE_LEN: usize = 60;

pub fn create_sources(config: &Config, client: reqwest::Client) -> Vec<Box<dyn WallpaperSource>> {
    let mut sources: Vec<Box<dyn WallpaperSource>> = Vec::new();

    if config.source_settings(SourceKind::MonicaAi).enabled {
        sources.push(Box::new(MonicaClient::new(
            read_table(config, SourceKind::MonicaAi),
            config.ai.clone(),
            client.clone(),
            generation_limiter(config, SourceKind::MonicaAi),
        )));
    }
    if config.source_settings(SourceKind::Craiyon).enabled {
        sources.push(Box::new(CraiyonClient::new(
            read_table(config, SourceKind::Craiyon),
            config.ai.clone(),
            client.clone(),
            generation_limiter(config, SourceKind::Craiyon)
                .with_window(Duration::from_secs(3600), craiyon::MAX_PER_HOUR),
        )));
    }
    if config.source_settings(SourceKind::StableDiffusion).enabled {
        sources.push(Box::new(StableDiffusionClient::new(
            read_table(config, SourceKind::StableDiffusion),
            config.ai.clone(),
            client,
            generation_limiter(config, SourceKind::StableDiffusion),
        )));
    }
    sources
}

/// Per-source delay plus the daily generation budget from `ai`.
fn generation_limiter(config: &Config, kind: SourceKind) -> RateLimiter {
    let settings = config.source_settings(kind);
    RateLimiter::new(kind.as_str(), settings.delay())
        .with_window(DAY, config.ai.max_generations_per_day as usize)
}

fn read_table<T: DeserializeOwned + Default>(config: &Config, kind: SourceKind) -> T {
    match config.source_table(kind.as_str()) {
        Some(table) => serde_json::from_value(Value::Object(table.clone())).unwrap_or_else(|e| {
            tracing::warn!(source = %kind, "invalid config, using defaults: {e}");
            T::default()
        }),
        None => T::default(),
    }
}

/// Candidate for a freshly generated image. Dimensions are read from the
/// bytes when stored.
fn generated_preview(
    kind: SourceKind,
    request: &GenerationRequest,
    index: usize,
    full_url: String,
) -> WallpaperPreview {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    WallpaperPreview {
        source_type: kind.source_type(),
        source_id: format!("{stamp}-{index}"),
        title: request.prompt.trim().chars().take(MAX_TITLE_LEN).collect(),
        source_url: String::new(),
        full_url,
        width: 0,
        height: 0,
        tags: vec![request.style.to_string(), request.resolution.to_string()],
    }
}

/// Search on a generator: the query is the prompt, the limit the count.
fn search_request(ai: &AiConfig, query: &str, limit: u32) -> GenerationRequest {
    GenerationRequest {
        prompt: query.to_string(),
        style: ai.default_style,
        resolution: ai.default_resolution,
        count: limit.max(1),
    }
}

/// A failure after some images were produced keeps those images.
fn keep_partial(
    kind: SourceKind,
    previews: Vec<WallpaperPreview>,
    error: Option<WallfetchError>,
) -> Result<Vec<WallpaperPreview>> {
    match error {
        Some(e) if previews.is_empty() => Err(e),
        Some(e) => {
            tracing::warn!(source = %kind, kept = previews.len(), "generation stopped early: {e}");
            Ok(previews)
        }
        None => Ok(previews),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallfetch_core::models::{AiStyle, Category, TargetResolution};

    #[test]
    fn test_create_sources_defaults() {
        let sources = create_sources(&Config::default(), reqwest::Client::new());
        let kinds: Vec<_> = sources.iter().map(|s| s.kind()).collect();
        // stable diffusion needs a local server and is off by default
        assert_eq!(kinds, vec![SourceKind::MonicaAi, SourceKind::Craiyon]);
        assert!(sources.iter().all(|s| s.category() == Category::AiGenerated));
    }

    #[test]
    fn test_create_sources_enable_sd() {
        let mut config = Config::default();
        config
            .sources
            .insert("stable_diffusion".into(), serde_json::json!({ "enabled": true }));
        let sources = create_sources(&config, reqwest::Client::new());
        assert_eq!(sources.len(), 3);
    }

    #[test]
    fn test_generated_preview() {
        let request = GenerationRequest {
            prompt: format!("  {}", "a".repeat(100)),
            style: AiStyle::DigitalArt,
            resolution: TargetResolution::Mobile,
            count: 1,
        };
        let p = generated_preview(SourceKind::Craiyon, &request, 2, "data:x".into());
        assert!(p.source_id.ends_with("-2"));
        assert_eq!(p.title.len(), MAX_TITLE_LEN);
        assert_eq!(p.tags, vec!["digital_art", "mobile"]);
        assert!(!p.has_dimensions());
    }

    #[test]
    fn test_keep_partial() {
        let request = search_request(&AiConfig::default(), "dunes", 0);
        assert_eq!(request.count, 1);
        let one = vec![generated_preview(SourceKind::MonicaAi, &request, 0, String::new())];
        let limited = || Some(WallfetchError::RateLimited("monica_ai".into()));

        assert_eq!(keep_partial(SourceKind::MonicaAi, one, limited()).unwrap().len(), 1);
        assert!(keep_partial(SourceKind::MonicaAi, Vec::new(), limited()).is_err());
        assert!(keep_partial(SourceKind::MonicaAi, Vec::new(), None).unwrap().is_empty());
    }
}
