use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use wallfetch_core::config::Config;
use wallfetch_core::error::Result;
use wallfetch_core::models::{SourceKind, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, WallpaperSource};

const API_BASE: &str = "https://wallhaven.cc/api/v1";
const PAGE_SIZE: u32 = 24;
const REQUESTS_PER_MINUTE: u32 = 45;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WallhavenConfig {
    pub api_key: Option<String>,
    pub categories: String,
    pub purity: String,
    pub sorting: String,
    pub atleast: String,
    pub default_query: String,
}

impl Default for WallhavenConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            categories: "111".into(),
            purity: "100".into(),
            sorting: "relevance".into(),
            atleast: "1920x1080".into(),
            default_query: "nature".into(),
        }
    }
}

pub fn create_sources(config: &Config, client: reqwest::Client) -> Vec<Box<dyn WallpaperSource>> {
    let settings = config.source_settings(SourceKind::Wallhaven);
    if !settings.enabled {
        return Vec::new();
    }
    let wallhaven: WallhavenConfig = match config.source_table("wallhaven") {
        Some(table) => serde_json::from_value(Value::Object(table.clone())).unwrap_or_else(|e| {
            tracing::warn!("invalid wallhaven config, using defaults: {e}");
            WallhavenConfig::default()
        }),
        None => WallhavenConfig::default(),
    };
    let limiter = RateLimiter::per_minute("wallhaven", REQUESTS_PER_MINUTE);
    let limiter = if settings.delay() > limiter.min_interval() {
        RateLimiter::new("wallhaven", settings.delay())
    } else {
        limiter
    };
    vec![Box::new(WallhavenClient {
        config: wallhaven,
        client,
        limiter,
    })]
}

pub struct WallhavenClient {
    config: WallhavenConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl WallhavenClient {
    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref key) => req.query(&[("apikey", key)]),
            None => req,
        }
    }

    async fn search_page(&self, query: &str, page: u32) -> Result<Vec<WallhavenWallpaper>> {
        self.limiter.acquire().await?;
        let req = self.client.get(format!("{API_BASE}/search")).query(&[
            ("q", query),
            ("page", &page.to_string()),
            ("categories", &self.config.categories),
            ("purity", &self.config.purity),
            ("sorting", &self.config.sorting),
            ("atleast", &self.config.atleast),
        ]);
        let resp: WallhavenResponse = get_json("wallhaven", self.with_key(req)).await?;
        Ok(resp.data)
    }

    async fn detail(&self, id: &str) -> Result<WallhavenWallpaper> {
        self.limiter.acquire().await?;
        let req = self.client.get(format!("{API_BASE}/w/{id}"));
        let resp: WallhavenDetailResponse = get_json("wallhaven", self.with_key(req)).await?;
        Ok(resp.data)
    }
}

#[async_trait]
impl WallpaperSource for WallhavenClient {
    fn name(&self) -> &str {
        "Wallhaven"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Wallhaven
    }

    /// A wallhaven.cc link as the query fetches that one wallpaper.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        if let Some(id) = wallpaper_id_from_url(query) {
            return Ok(vec![to_preview(self.detail(id).await?)]);
        }

        let query = if query.trim().is_empty() {
            self.config.default_query.as_str()
        } else {
            query
        };
        let mut previews = Vec::new();
        let pages = limit.div_ceil(PAGE_SIZE).max(1);
        for page in 1..=pages {
            let batch = self.search_page(query, page).await?;
            let last = (batch.len() as u32) < PAGE_SIZE;
            previews.extend(batch.into_iter().map(to_preview));
            if last || previews.len() >= limit as usize {
                break;
            }
        }
        previews.truncate(limit as usize);
        Ok(previews)
    }

    async fn download(&self, preview: &WallpaperPreview) -> Result<bytes::Bytes> {
        fetch_bytes("wallhaven", &self.client, &preview.full_url).await
    }
}

/// Matches `wallhaven.cc/w/<id>` and `whvn.cc/<id>`.
fn wallpaper_id_from_url(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://wallhaven.cc/w/")
        .or_else(|| url.strip_prefix("https://whvn.cc/"))?;
    let id = rest.trim_end_matches('/');
    (!id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())).then_some(id)
}

fn to_preview(w: WallhavenWallpaper) -> WallpaperPreview {
    let tags: Vec<String> = w.tags.into_iter().map(|t| t.name).collect();
    let title = if tags.is_empty() {
        format!("wallhaven {}", w.id)
    } else {
        tags.iter().take(3).cloned().collect::<Vec<_>>().join(" ")
    };
    WallpaperPreview {
        source_type: SourceKind::Wallhaven.source_type(),
        source_id: w.id,
        title,
        source_url: w.url,
        full_url: w.path,
        width: w.dimension_x,
        height: w.dimension_y,
        tags,
    }
}

// -- API response types --

#[derive(Debug, Deserialize)]
struct WallhavenResponse {
    data: Vec<WallhavenWallpaper>,
}

#[derive(Debug, Deserialize)]
struct WallhavenDetailResponse {
    data: WallhavenWallpaper,
}

#[derive(Debug, Deserialize)]
struct WallhavenWallpaper {
    id: String,
    url: String,
    path: String,
    dimension_x: u32,
    dimension_y: u32,
    #[serde(default)]
    tags: Vec<WallhavenTag>,
}

#[derive(Debug, Deserialize)]
struct WallhavenTag {
    name: String,
}
