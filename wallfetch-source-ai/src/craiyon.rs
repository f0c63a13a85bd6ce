//! Craiyon through the Apify actor wrapper. One synchronous actor run
//! returns a dataset of image URLs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use wallfetch_core::config::AiConfig;
use wallfetch_core::error::{Result, WallfetchError};
use wallfetch_core::models::{AiStyle, SourceKind, TargetResolution, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, GenerationRequest, WallpaperSource};

use crate::{generated_preview, prompt, search_request};

pub const MAX_PER_HOUR: usize = 10;
const APIFY_ACTS: &str = "https://api.apify.com/v2/acts";
const WALLPAPER_TERMS: &str =
    "desktop wallpaper, background image, wide format, landscape orientation";
const EXCLUDED_WORDS: &str = "nsfw, inappropriate, explicit";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CraiyonConfig {
    pub apify_token: Option<String>,
    pub actor: String,
}

impl Default for CraiyonConfig {
    fn default() -> Self {
        Self {
            apify_token: None,
            actor: "muhammetakkurtt/craiyon-ai-image-creator".into(),
        }
    }
}

pub struct CraiyonClient {
    config: CraiyonConfig,
    ai: AiConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl CraiyonClient {
    pub fn new(
        config: CraiyonConfig,
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
        self.token().is_some()
    }

    /// Generations left before the hourly or daily cap.
    pub async fn remaining(&self) -> Option<usize> {
        self.limiter.remaining().await
    }

    fn token(&self) -> Option<&str> {
        self.config
            .apify_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    fn run_url(&self) -> String {
        format!(
            "{APIFY_ACTS}/{}/run-sync-get-dataset-items",
            self.config.actor.replace('/', "~")
        )
    }

    fn run_input(&self, request: &GenerationRequest) -> Result<RunInput> {
        let mut prompt = prompt::prepare(request, &self.ai)?;
        if self.ai.auto_enhance_prompts {
            prompt = format!("{prompt}, {WALLPAPER_TERMS}");
        }
        Ok(RunInput {
            prompt,
            kind: generation_type(request.style),
            aspect_ratio: aspect_ratio(request.resolution),
            exclude_words: self.ai.content_filter.then_some(EXCLUDED_WORDS),
        })
    }
}

#[async_trait]
impl WallpaperSource for CraiyonClient {
    fn name(&self) -> &str {
        "Craiyon"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Craiyon
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        self.generate(&search_request(&self.ai, query, limit)).await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<WallpaperPreview>> {
        let token = self.token().ok_or_else(|| {
            WallfetchError::SourceNotConfigured(
                "craiyon: set sources.craiyon.apify_token to an Apify API token".into(),
            )
        })?;
        let input = self.run_input(request)?;
        self.limiter.acquire().await?;
        tracing::info!(prompt = %input.prompt, "generating with Craiyon");

        let req = self
            .client
            .post(self.run_url())
            .query(&[("token", token)])
            .json(&input);
        let items: Vec<DatasetItem> = get_json("craiyon", req).await?;

        Ok(image_urls(items, request.count)
            .into_iter()
            .enumerate()
            .map(|(i, url)| generated_preview(self.kind(), request, i, url))
            .collect())
    }

    async fn download(&self, preview: &WallpaperPreview) -> Result<bytes::Bytes> {
        fetch_bytes("craiyon", &self.client, &preview.full_url).await
    }
}

/// Craiyon models: Art, Drawing, Photo.
fn generation_type(style: AiStyle) -> &'static str {
    match style {
        AiStyle::Photography => "Photo",
        AiStyle::DigitalArt | AiStyle::Abstract => "Art",
        AiStyle::Minimal => "Drawing",
    }
}

fn aspect_ratio(resolution: TargetResolution) -> &'static str {
    match resolution {
        TargetResolution::Mobile => "Portrait",
        _ => "Landscape",
    }
}

fn image_urls(items: Vec<DatasetItem>, count: u32) -> Vec<String> {
    items
        .into_iter()
        .flat_map(|item| item.image_urls)
        .filter(|u| !u.is_empty())
        .take(count as usize)
        .collect()
}

// -- API types --

#[derive(Debug, Serialize)]
struct RunInput {
    prompt: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "aspectRatio")]
    aspect_ratio: &'static str,
    #[serde(rename = "excludeWords", skip_serializing_if = "Option::is_none")]
    exclude_words: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct DatasetItem {
    #[serde(default, rename = "imageUrls")]
    image_urls: Vec<String>,
}
