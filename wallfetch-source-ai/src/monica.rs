//! Monica AI. The service publishes no image API, so requests go to an
//! OpenAI-compatible `images/generations` endpoint the user configures
//! (a Monica-backed proxy or any compatible gateway).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use wallfetch_core::config::AiConfig;
use wallfetch_core::error::{Result, WallfetchError};
use wallfetch_core::models::{SourceKind, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, GenerationRequest, WallpaperSource};

use crate::{generated_preview, keep_partial, prompt, search_request};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonicaConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Overrides the size derived from the target resolution, e.g. "1792x1024".
    pub size: Option<String>,
}

pub struct MonicaClient {
    config: MonicaConfig,
    ai: AiConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl MonicaClient {
    pub fn new(
        config: MonicaConfig,
        ai: AiConfig,
        client: reqwest::Client,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            config,
            ai,
            client,
            limiter,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint().is_some()
    }

    fn endpoint(&self) -> Option<&str> {
        self.config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    fn body<'a>(&'a self, prompt: &'a str, request: &GenerationRequest) -> ImageRequest<'a> {
        let size = self.config.size.clone().unwrap_or_else(|| {
            let (w, h) = request.resolution.dimensions();
            format!("{w}x{h}")
        });
        ImageRequest {
            model: self.config.model.as_deref(),
            prompt,
            n: 1,
            size,
            response_format: "b64_json",
        }
    }

    async fn generate_one(&self, endpoint: &str, prompt: &str, request: &GenerationRequest) -> Result<Vec<String>> {
        self.limiter.acquire().await?;
        let mut req = self.client.post(endpoint).json(&self.body(prompt, request));
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }
        let resp: ImageResponse = get_json("monica_ai", req).await?;
        Ok(image_urls(resp))
    }
}

#[async_trait]
impl WallpaperSource for MonicaClient {
    fn name(&self) -> &str {
        "Monica AI"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MonicaAi
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        self.generate(&search_request(&self.ai, query, limit)).await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<WallpaperPreview>> {
        let endpoint = self.endpoint().ok_or_else(|| {
            WallfetchError::SourceNotConfigured(
                "monica_ai: set sources.monica_ai.endpoint to an image generation endpoint".into(),
            )
        })?;
        let prompt = prompt::prepare(request, &self.ai)?;
        tracing::info!(prompt = %prompt, count = request.count, "generating with Monica AI");

        let mut previews = Vec::new();
        let mut error = None;
        for _ in 0..request.count {
            match self.generate_one(endpoint, &prompt, request).await {
                Ok(urls) => {
                    for url in urls {
                        let index = previews.len();
                        previews.push(generated_preview(self.kind(), request, index, url));
                    }
                }
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        keep_partial(self.kind(), previews, error)
    }

    async fn download(&self, preview: &WallpaperPreview) -> Result<bytes::Bytes> {
        fetch_bytes("monica_ai", &self.client, &preview.full_url).await
    }
}

fn image_urls(resp: ImageResponse) -> Vec<String> {
    resp.data
        .into_iter()
        .filter_map(|item| match (item.b64_json, item.url) {
            (Some(b64), _) => Some(format!("data:image/png;base64,{b64}")),
            (None, Some(url)) => Some(url),
            (None, None) => None,
        })
        .collect()
}

// -- API types --

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    n: u32,
    size: String,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wallfetch_core::models::{AiStyle, TargetResolution};

    fn client(config: MonicaConfig) -> MonicaClient {
        MonicaClient::new(
            config,
            AiConfig::default(),
            reqwest::Client::new(),
            RateLimiter::new("monica_ai", Duration::ZERO),
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "aurora over fjord".into(),
            style: AiStyle::Photography,
            resolution: TargetResolution::Qhd1440,
            count: 2,
        }
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint() {
        let c = client(MonicaConfig {
            endpoint: Some("  ".into()),
            ..MonicaConfig::default()
        });
        assert!(!c.is_configured());
        let err = c.generate(&request()).await.unwrap_err();
        assert!(matches!(err, WallfetchError::SourceNotConfigured(_)));
    }

    #[test]
    fn test_request_body() {
        let c = client(MonicaConfig::default());
        let body = serde_json::to_value(c.body("p", &request())).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"prompt": "p", "n": 1, "size": "2560x1440", "response_format": "b64_json"})
        );

        let c = client(MonicaConfig {
            model: Some("wallpaper-v1".into()),
            size: Some("1792x1024".into()),
            ..MonicaConfig::default()
        });
        let body = serde_json::to_value(c.body("p", &request())).unwrap();
        assert_eq!(body["model"], "wallpaper-v1");
        assert_eq!(body["size"], "1792x1024");
    }

    #[test]
    fn test_parse_response() {
        let resp: ImageResponse = serde_json::from_str(
            r#"{"created": 1700000000, "data": [
                {"b64_json": "iVBORw0KGgo="},
                {"url": "https://cdn.example.com/img/1.png"},
                {"revised_prompt": "nothing else"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            image_urls(resp),
            vec![
                "data:image/png;base64,iVBORw0KGgo=".to_string(),
                "https://cdn.example.com/img/1.png".to_string(),
            ]
        );
    }
}
