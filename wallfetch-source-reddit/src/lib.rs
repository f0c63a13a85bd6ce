use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use wallfetch_core::config::Config;
use wallfetch_core::error::Result;
use wallfetch_core::models::{SourceKind, WallpaperPreview};
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::{fetch_bytes, get_json, WallpaperSource};

const BASE: &str = "https://www.reddit.com";
const MAX_PAGE: u32 = 100;
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];
const WALLPAPER_KEYWORDS: &[&str] = &[
    "wallpaper",
    "background",
    "desktop",
    "screen",
    "resolution",
    "1920x1080",
    "4k",
    "2560x1440",
    "nature",
    "landscape",
    "space",
    "abstract",
    "minimal",
    "city",
    "mountain",
    "ocean",
];
/// Posts here are wallpapers whatever their title says.
const WALLPAPER_SUBREDDITS: &[&str] = &[
    "wallpapers",
    "wallpaper",
    "widescreenwallpaper",
    "minimalwallpaper",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub subreddits: Vec<String>,
    /// hot, new or top
    pub sort: String,
    /// Window for `top`: day, week, month, year, all
    pub time_filter: String,
    pub user_agent: String,
    pub include_nsfw: bool,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddits: [
                "wallpapers",
                "EarthPorn",
                "SpacePorn",
                "CityPorn",
                "wallpaper",
                "WidescreenWallpaper",
                "MinimalWallpaper",
                "AbstractArt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sort: "hot".into(),
            time_filter: "week".into(),
            user_agent: concat!("wallfetch/", env!("CARGO_PKG_VERSION")).into(),
            include_nsfw: false,
        }
    }
}

pub fn create_sources(config: &Config, client: reqwest::Client) -> Vec<Box<dyn WallpaperSource>> {
    let settings = config.source_settings(SourceKind::Reddit);
    if !settings.enabled {
        return Vec::new();
    }
    let reddit: RedditConfig = match config.source_table("reddit") {
        Some(table) => serde_json::from_value(Value::Object(table.clone())).unwrap_or_else(|e| {
            tracing::warn!("invalid reddit config, using defaults: {e}");
            RedditConfig::default()
        }),
        None => RedditConfig::default(),
    };
    vec![Box::new(RedditClient {
        limiter: RateLimiter::new("reddit", settings.delay()),
        config: reddit,
        client,
    })]
}

pub struct RedditClient {
    config: RedditConfig,
    client: reqwest::Client,
    limiter: RateLimiter,
}

/// What a query string asks for.
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    /// `r/<sub>` alone, or an empty query over every configured subreddit
    Listing(Vec<&'a str>),
    Search(Vec<&'a str>, &'a str),
}

impl RedditClient {
    fn target<'a>(&'a self, query: &'a str) -> Target<'a> {
        let query = query.trim();
        if let Some(rest) = query.strip_prefix("r/") {
            let (sub, terms) = rest.split_once(' ').unwrap_or((rest, ""));
            let terms = terms.trim();
            return if terms.is_empty() {
                Target::Listing(vec![sub])
            } else {
                Target::Search(vec![sub], terms)
            };
        }
        let subs = self.config.subreddits.iter().map(String::as_str).collect();
        if query.is_empty() {
            Target::Listing(subs)
        } else {
            Target::Search(subs, query)
        }
    }

    async fn listing(&self, sub: &str, limit: u32) -> Result<Listing> {
        self.limiter.acquire().await?;
        let limit = limit.to_string();
        let sort = match self.config.sort.as_str() {
            s @ ("hot" | "new" | "top") => s,
            _ => "hot",
        };
        let mut req = self
            .client
            .get(format!("{BASE}/r/{sub}/{sort}.json"))
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .query(&[("limit", limit.as_str())]);
        if sort == "top" {
            req = req.query(&[("t", self.config.time_filter.as_str())]);
        }
        get_json("reddit", req).await
    }

    async fn search_sub(&self, sub: &str, terms: &str, limit: u32) -> Result<Listing> {
        self.limiter.acquire().await?;
        let limit = limit.to_string();
        let req = self
            .client
            .get(format!("{BASE}/r/{sub}/search.json"))
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .query(&[
                ("q", terms),
                ("restrict_sr", "on"),
                ("sort", "top"),
                ("limit", limit.as_str()),
            ]);
        get_json("reddit", req).await
    }
}

#[async_trait]
impl WallpaperSource for RedditClient {
    fn name(&self) -> &str {
        "Reddit"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    /// Empty query: listings of the configured subreddits. `r/<sub> [terms]`
    /// narrows to one subreddit. Anything else searches the configured ones.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
        // many posts are filtered out, so over-fetch
        let page = limit.saturating_mul(2).clamp(10, MAX_PAGE);
        let (subs, terms) = match self.target(query) {
            Target::Listing(subs) => (subs, None),
            Target::Search(subs, terms) => (subs, Some(terms)),
        };

        let mut previews: Vec<WallpaperPreview> = Vec::new();
        let mut last_error = None;
        for sub in subs {
            if previews.len() >= limit as usize {
                break;
            }
            let listing = match terms {
                Some(terms) => self.search_sub(sub, terms, page).await,
                None => self.listing(sub, page).await,
            };
            let listing = match listing {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(subreddit = sub, "{e}");
                    last_error = Some(e);
                    continue;
                }
            };
            for post in listing.data.children.into_iter().map(|c| c.data) {
                if let Some(p) = to_preview(post, self.config.include_nsfw) {
                    if !previews.iter().any(|q| q.source_id == p.source_id) {
                        previews.push(p);
                    }
                }
            }
        }
        // one dead subreddit is tolerated, all of them failing is not
        if let (true, Some(e)) = (previews.is_empty(), last_error) {
            return Err(e);
        }
        previews.truncate(limit as usize);
        Ok(previews)
    }

    async fn download(&self, preview: &WallpaperPreview) -> Result<bytes::Bytes> {
        fetch_bytes("reddit", &self.client, &preview.full_url).await
    }
}

fn to_preview(post: Post, include_nsfw: bool) -> Option<WallpaperPreview> {
    if post.is_self || post.is_video || (post.over_18 && !include_nsfw) {
        return None;
    }
    let url = post.url.as_deref().filter(|u| !u.is_empty())?;
    let image_url = if is_image_url(url) {
        url.to_string()
    } else {
        direct_image_url(url)?
    };
    if !is_wallpaper_related(&post.title, &post.subreddit) {
        return None;
    }

    let (width, height) = post
        .preview
        .and_then(|p| p.images.into_iter().next())
        .map(|i| (i.source.width, i.source.height))
        .unwrap_or((0, 0));

    Some(WallpaperPreview {
        source_type: SourceKind::Reddit.source_type(),
        source_id: post.id,
        title: post.title,
        source_url: format!("{BASE}{}", post.permalink),
        full_url: image_url,
        width,
        height,
        tags: vec![format!("r/{}", post.subreddit)],
    })
}

fn is_image_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| {
            let path = u.path().to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        })
        .unwrap_or(false)
}

/// Imgur page links become direct `.jpg` links. Reddit galleries need
/// extra API calls and are skipped.
fn direct_image_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.ends_with("imgur.com") {
        let id = parsed.path_segments()?.find(|s| !s.is_empty())?;
        // albums and galleries hold several images
        if matches!(id, "a" | "gallery") {
            return None;
        }
        if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Some(format!("https://i.imgur.com/{id}.jpg"));
        }
    }
    None
}

fn is_wallpaper_related(title: &str, subreddit: &str) -> bool {
    let title = title.to_lowercase();
    let subreddit = subreddit.to_lowercase();
    WALLPAPER_SUBREDDITS.contains(&subreddit.as_str())
        || WALLPAPER_KEYWORDS.iter().any(|k| title.contains(k))
}

// -- API response types --

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    url: Option<String>,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    over_18: bool,
    preview: Option<PostPreview>,
}

#[derive(Debug, Deserialize)]
struct PostPreview {
    #[serde(default)]
    images: Vec<PreviewImage>,
}

#[derive(Debug, Deserialize)]
struct PreviewImage {
    source: PreviewSource,
}

#[derive(Debug, Deserialize)]
struct PreviewSource {
    width: u32,
    height: u32,
}
