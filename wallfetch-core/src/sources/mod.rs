use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{Result, WallfetchError};
use crate::models::{AiStyle, Category, SourceKind, SourceType, TargetResolution, WallpaperPreview};

/// Parameters for sources that create images instead of listing them.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style: AiStyle,
    pub resolution: TargetResolution,
    pub count: u32,
}

#[async_trait]
pub trait WallpaperSource: Send + Sync {
    /// Display name (e.g. "Wallhaven", "NASA Image Library")
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Type string stored with each record (e.g. "wallhaven", "craiyon")
    fn source_type(&self) -> SourceType {
        self.kind().source_type()
    }

    fn category(&self) -> Category {
        self.kind().category()
    }

    /// List up to `limit` candidates. For generators `query` is the prompt.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<WallpaperPreview>>;

    async fn download(&self, preview: &WallpaperPreview) -> Result<Bytes>;

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<WallpaperPreview>> {
        let _ = request;
        Err(WallfetchError::SourceNotConfigured(format!(
            "{} does not generate images",
            self.name()
        )))
    }

    /// Download and write to `path`, creating parent directories.
    async fn download_to(&self, preview: &WallpaperPreview, path: &Path) -> Result<u64> {
        let data = self.download(preview).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }
}

pub struct SourceRegistry {
    sources: Vec<Box<dyn WallpaperSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Box<dyn WallpaperSource>) {
        self.sources.push(source);
    }

    pub fn extend(&mut self, sources: impl IntoIterator<Item = Box<dyn WallpaperSource>>) {
        self.sources.extend(sources);
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Lookup by display name (case-insensitive) or source type string.
    pub fn get(&self, name: &str) -> Option<&dyn WallpaperSource> {
        self.sources
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name) || s.kind().as_str() == name)
            .map(|s| s.as_ref())
    }

    pub fn by_kind(&self, kind: SourceKind) -> Option<&dyn WallpaperSource> {
        self.sources
            .iter()
            .find(|s| s.kind() == kind)
            .map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn WallpaperSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// Highest configured priority first; ties keep registration order.
    pub fn sort_by_priority(&mut self, config: &Config) {
        self.sources
            .sort_by_key(|s| std::cmp::Reverse(config.source_settings(s.kind()).priority));
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Send a request, mapping failures onto
/// `RateLimited` (HTTP 429) or `SourceUnavailable`.
pub async fn send_checked(source: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    let resp = req
        .send()
        .await
        .map_err(|e| WallfetchError::unavailable(source, e))?;
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(WallfetchError::RateLimited(source.to_string()));
    }
    if !status.is_success() {
        return Err(WallfetchError::unavailable(source, format!("HTTP {status}")));
    }
    Ok(resp)
}

pub async fn get_json<T: DeserializeOwned>(source: &str, req: reqwest::RequestBuilder) -> Result<T> {
    let body = send_checked(source, req)
        .await?
        .bytes()
        .await
        .map_err(|e| WallfetchError::unavailable(source, e))?;
    serde_json::from_slice(&body)
        .map_err(|e| WallfetchError::unavailable(source, format!("malformed response: {e}")))
}

/// Fetch image bytes from an http(s) URL or decode an inline `data:` URI.
pub async fn fetch_bytes(source: &str, client: &reqwest::Client, url: &str) -> Result<Bytes> {
    if let Some(data) = decode_data_uri(url) {
        return data.map(Bytes::from);
    }
    let data = send_checked(source, client.get(url))
        .await?
        .bytes()
        .await
        .map_err(|e| WallfetchError::unavailable(source, e))?;
    if data.is_empty() {
        return Err(WallfetchError::unavailable(source, "empty response body"));
    }
    Ok(data)
}

pub fn encode_data_uri(mime: &str, data: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}

/// `None` if `uri` is not a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Option<Result<Vec<u8>>> {
    let rest = uri.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| WallfetchError::InvalidImage(format!("bad data URI: {e}"))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        kind: SourceKind,
        name: &'static str,
    }

    #[async_trait]
    impl WallpaperSource for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn search(&self, _query: &str, _limit: u32) -> Result<Vec<WallpaperPreview>> {
            Ok(Vec::new())
        }

        async fn download(&self, _preview: &WallpaperPreview) -> Result<Bytes> {
            Ok(Bytes::from_static(b"pixels"))
        }
    }

    fn preview() -> WallpaperPreview {
        WallpaperPreview {
            source_type: SourceKind::Nasa.source_type(),
            source_id: "x".into(),
            title: "x".into(),
            source_url: String::new(),
            full_url: String::new(),
            width: 0,
            height: 0,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_registry_lookup_and_priority() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(Fixed {
            kind: SourceKind::Reddit,
            name: "Reddit",
        }));
        registry.register(Box::new(Fixed {
            kind: SourceKind::Wallhaven,
            name: "Wallhaven",
        }));
        registry.register(Box::new(Fixed {
            kind: SourceKind::Craiyon,
            name: "Craiyon",
        }));

        assert!(registry.get("reddit").is_some());
        assert!(registry.get("Wallhaven").is_some());
        assert!(registry.get("unsplash").is_none());
        assert_eq!(
            registry.by_kind(SourceKind::Craiyon).unwrap().category(),
            Category::AiGenerated
        );

        registry.sort_by_priority(&Config::default());
        assert_eq!(registry.names(), vec!["Wallhaven", "Craiyon", "Reddit"]);
    }

    #[tokio::test]
    async fn test_download_to_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let src = Fixed {
            kind: SourceKind::Nasa,
            name: "NASA",
        };
        let path = tmp.path().join("a/b/out.jpg");
        let n = src.download_to(&preview(), &path).await.unwrap();
        assert_eq!(n, 6);
        assert_eq!(std::fs::read(&path).unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn test_generate_unsupported() {
        let src = Fixed {
            kind: SourceKind::Nasa,
            name: "NASA",
        };
        let req = GenerationRequest {
            prompt: "moon".into(),
            style: AiStyle::Photography,
            resolution: TargetResolution::Uhd4k,
            count: 1,
        };
        assert!(matches!(
            src.generate(&req).await,
            Err(WallfetchError::SourceNotConfigured(_))
        ));
    }

    #[test]
    fn test_data_uri() {
        let uri = encode_data_uri("image/png", b"\x89PNG data");
        assert!(uri.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_uri(&uri).unwrap().unwrap(), b"\x89PNG data");
        assert!(decode_data_uri("https://example.com/a.png").is_none());
        assert!(decode_data_uri("data:image/png;base64,@@@").unwrap().is_err());
    }

    #[tokio::test]
    async fn test_fetch_bytes_inline() {
        let client = reqwest::Client::new();
        let uri = encode_data_uri("image/jpeg", b"\xff\xd8jpeg");
        let data = fetch_bytes("stable_diffusion", &client, &uri).await.unwrap();
        assert_eq!(&data[..], b"\xff\xd8jpeg");
    }
}
