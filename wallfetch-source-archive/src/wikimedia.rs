use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use wallfetch_core::error::Result;
use wallfetch_core::models::{SourceKind, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, WallpaperSource};

use crate::USER_AGENT;

const API: &str = "https://commons.wikimedia.org/w/api.php";
const FILE_NAMESPACE: &str = "6";
const MAX_RESULTS: u32 = 50;
const BITMAP_MIMES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikimediaConfig {
    pub default_query: String,
}

impl Default for WikimediaConfig {
    fn default() -> Self {
        Self {
            default_query: "landscape wallpaper".into(),
        }
    }
}

pub struct WikimediaClient {
    config: WikimediaConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl WikimediaClient {
    pub fn new(config: WikimediaConfig, client: reqwest::Client, limiter: RateLimiter) -> Self {
        Self {
            config,
            client,
            limiter,
        }
    }
}

#[async_trait]
impl WallpaperSource for WikimediaClient {
    fn name(&self) -> &str {
        "Wikimedia Commons"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Wikimedia
    }

    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        let query = if query.trim().is_empty() {
            self.config.default_query.as_str()
        } else {
            query
        };
        self.limiter.acquire().await?;

        let search = format!("{query} filetype:bitmap");
        let gsrlimit = limit.clamp(1, MAX_RESULTS).to_string();
        let req = self
            .client
            .get(API)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", search.as_str()),
                ("gsrnamespace", FILE_NAMESPACE),
                ("gsrlimit", gsrlimit.as_str()),
                ("prop", "imageinfo"),
                ("iiprop", "url|size|mime"),
            ]);
        let resp: QueryResponse = get_json("wikimedia", req).await?;

        let mut previews = to_previews(resp);
        previews.truncate(limit as usize);
        Ok(previews)
    }

    async fn download(&self, preview: &WallpaperPreview) -> Result<bytes::Bytes> {
        fetch_bytes("wikimedia", &self.client, &preview.full_url).await
    }
}

/// Pages come back keyed by page id; `index` carries the search rank.
fn to_previews(resp: QueryResponse) -> Vec<WallpaperPreview> {
    let Some(query) = resp.query else {
        return Vec::new();
    };
    let mut pages: Vec<Page> = query.pages.into_values().collect();
    pages.sort_by_key(|p| p.index);

    pages
        .into_iter()
        .filter_map(|page| {
            let info = page.imageinfo.into_iter().next()?;
            if !BITMAP_MIMES.contains(&info.mime.as_str()) {
                return None;
            }
            let title = page
                .title
                .strip_prefix("File:")
                .unwrap_or(&page.title)
                .rsplit_once('.')
                .map(|(stem, _)| stem.to_string())
                .unwrap_or_else(|| page.title.clone());
            Some(WallpaperPreview {
                source_type: SourceKind::Wikimedia.source_type(),
                source_id: page.pageid.to_string(),
                title,
                source_url: info.descriptionurl,
                full_url: info.url,
                width: info.width,
                height: info.height,
                tags: Vec::new(),
            })
        })
        .collect()
}

// -- API response types --

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    pageid: u64,
    title: String,
    #[serde(default)]
    index: u32,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: String,
    #[serde(default)]
    descriptionurl: String,
    width: u32,
    height: u32,
    mime: String,
}
