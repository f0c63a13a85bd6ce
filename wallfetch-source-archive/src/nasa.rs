use async_trait::async_trait;
use serde::Deserialize;

use wallfetch_core::error::Result;
use wallfetch_core::models::{SourceKind, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, WallpaperSource};

use crate::USER_AGENT;

const API: &str = "https://images-api.nasa.gov/search";
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NasaConfig {
    pub default_query: String,
}

impl Default for NasaConfig {
    fn default() -> Self {
        Self {
            default_query: "nebula".into(),
        }
    }
}

pub struct NasaClient {
    config: NasaConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl NasaClient {
    pub fn new(config: NasaConfig, client: reqwest::Client, limiter: RateLimiter) -> Self {
        Self {
            config,
            client,
            limiter,
        }
    }
}

#[async_trait]
impl WallpaperSource for NasaClient {
    fn name(&self) -> &str {
        "NASA Image Library"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Nasa
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        let query = if query.trim().is_empty() {
            self.config.default_query.as_str()
        } else {
            query
        };
        self.limiter.acquire().await?;

        let page_size = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let req = self
            .client
            .get(API)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("q", query),
                ("media_type", "image"),
                ("page_size", page_size.as_str()),
            ]);
        let resp: SearchResponse = get_json("nasa", req).await?;

        let mut previews: Vec<_> = resp.collection.items.into_iter().filter_map(to_preview).collect();
        previews.truncate(limit as usize);
        Ok(previews)
    }

    async fn download(&self, preview: &WallpaperPreview) -> Result<bytes::Bytes> {
        fetch_bytes("nasa", &self.client, &preview.full_url).await
    }
}

fn to_preview(item: Item) -> Option<WallpaperPreview> {
    let data = item.data.into_iter().next()?;
    if data.media_type != "image" {
        return None;
    }
    let thumb = item
        .links
        .into_iter()
        .find(|l| l.render.as_deref() == Some("image"))?
        .href;
    Some(WallpaperPreview {
        source_type: SourceKind::Nasa.source_type(),
        source_url: format!("https://images.nasa.gov/details/{}", data.nasa_id),
        full_url: original_url(&thumb),
        source_id: data.nasa_id,
        title: data.title,
        // the search API does not report dimensions
        width: 0,
        height: 0,
        tags: data.keywords,
    })
}

/// Asset links follow `<id>~thumb.jpg`; the full-size file is `<id>~orig.jpg`.
fn original_url(thumb: &str) -> String {
    match thumb.rsplit_once("~thumb.") {
        Some((base, ext)) => format!("{base}~orig.{ext}"),
        None => thumb.to_string(),
    }
}

// -- API response types --

#[derive(Debug, Deserialize)]
struct SearchResponse {
    collection: Collection,
}

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    data: Vec<ItemData>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct ItemData {
    nasa_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    media_type: String,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    render: Option<String>,
}
