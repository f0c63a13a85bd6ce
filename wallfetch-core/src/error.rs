use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WallfetchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config value for `{key}`: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("source not configured: {0}")]
    SourceNotConfigured(String),

    #[error("source unavailable: {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("duplicate image: {0}")]
    DuplicateImage(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("wallpaper not found: {0}")]
    WallpaperNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
}

impl WallfetchError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Transient source failures; the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::RateLimited(_) | Self::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WallfetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(WallfetchError::unavailable("reddit", "timeout").is_retryable());
        assert!(WallfetchError::RateLimited("craiyon".into()).is_retryable());
        assert!(!WallfetchError::InvalidImage("truncated".into()).is_retryable());
        assert!(!WallfetchError::invalid_config("storage.max_total_wallpapers", "must be > 0")
            .is_retryable());
    }

    #[test]
    fn test_unavailable_message() {
        let err = WallfetchError::unavailable("wallhaven", "HTTP 503");
        assert_eq!(err.to_string(), "source unavailable: wallhaven: HTTP 503");
    }
}
