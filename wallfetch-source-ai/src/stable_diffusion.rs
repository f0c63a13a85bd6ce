//! Local Stable Diffusion through the AUTOMATIC1111 web UI API
//! (`--api` flag). Images come back base64-encoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use wallfetch_core::config::AiConfig;
use wallfetch_core::error::Result;
use wallfetch_core::models::{SourceKind, TargetResolution, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, GenerationRequest, WallpaperSource};

use crate::{generated_preview, keep_partial, prompt, search_request};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StableDiffusionConfig {
    pub endpoint: String,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: Option<String>,
    pub negative_prompt: String,
    /// Longest side sent to the model; larger targets are scaled down.
    pub max_side: u32,
}

impl Default for StableDiffusionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7860".into(),
            steps: 30,
            cfg_scale: 7.0,
            sampler_name: None,
            negative_prompt: "blurry, low quality, watermark, text".into(),
            max_side: 1920,
        }
    }
}

pub struct StableDiffusionClient {
    config: StableDiffusionConfig,
    ai: AiConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl StableDiffusionClient {
    pub fn new(
        config: StableDiffusionConfig,
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

    fn txt2img_url(&self) -> String {
        format!("{}/sdapi/v1/txt2img", self.config.endpoint.trim_end_matches('/'))
    }

    fn negative_prompt(&self) -> String {
        let base = self.config.negative_prompt.trim();
        match (self.ai.content_filter, base.is_empty()) {
            (false, _) => base.to_string(),
            (true, true) => "nsfw".to_string(),
            (true, false) => format!("{base}, nsfw"),
        }
    }

    fn body<'a>(&'a self, prompt: &'a str, resolution: TargetResolution) -> Txt2Img<'a> {
        let (width, height) = fit_dimensions(resolution.dimensions(), self.config.max_side);
        Txt2Img {
            prompt,
            negative_prompt: self.negative_prompt(),
            width,
            height,
            steps: self.config.steps,
            cfg_scale: self.config.cfg_scale,
            sampler_name: self.config.sampler_name.as_deref(),
            batch_size: 1,
            n_iter: 1,
        }
    }

    async fn generate_one(&self, prompt: &str, resolution: TargetResolution) -> Result<Vec<String>> {
        self.limiter.acquire().await?;
        let req = self
            .client
            .post(self.txt2img_url())
            .json(&self.body(prompt, resolution));
        let resp: Txt2ImgResponse = get_json("stable_diffusion", req).await?;
        Ok(resp
            .images
            .into_iter()
            .filter(|b64| !b64.is_empty())
            .map(|b64| format!("data:image/png;base64,{b64}"))
            .collect())
    }
}

#[async_trait]
impl WallpaperSource for StableDiffusionClient {
    fn name(&self) -> &str {
        "Stable Diffusion"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::StableDiffusion
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        self.generate(&search_request(&self.ai, query, limit)).await
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<WallpaperPreview>> {
        let prompt = prompt::prepare(request, &self.ai)?;
        tracing::info!(
            endpoint = %self.config.endpoint,
            count = request.count,
            "generating with Stable Diffusion"
        );

        let mut previews = Vec::new();
        let mut error = None;
        for _ in 0..request.count {
            match self.generate_one(&prompt, request.resolution).await {
                Ok(images) => {
                    for uri in images {
                        let index = previews.len();
                        previews.push(generated_preview(self.kind(), request, index, uri));
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
        fetch_bytes("stable_diffusion", &self.client, &preview.full_url).await
    }
}

/// Scale so the longest side is at most `max_side`, keeping the aspect
/// ratio. Both sides end up multiples of 8.
fn fit_dimensions((w, h): (u32, u32), max_side: u32) -> (u32, u32) {
    let longest = w.max(h);
    let (w, h) = if max_side > 0 && longest > max_side {
        let scale = max_side as f64 / longest as f64;
        ((w as f64 * scale) as u32, (h as f64 * scale) as u32)
    } else {
        (w, h)
    };
    ((w / 8 * 8).max(8), (h / 8 * 8).max(8))
}

// -- API types --

#[derive(Debug, Serialize)]
struct Txt2Img<'a> {
    prompt: &'a str,
    negative_prompt: String,
    width: u32,
    height: u32,
    steps: u32,
    cfg_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    sampler_name: Option<&'a str>,
    batch_size: u32,
    n_iter: u32,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}
