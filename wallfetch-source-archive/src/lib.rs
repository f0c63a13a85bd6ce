//! Public-domain and freely licensed archives: Wikimedia Commons and the
//! NASA Image and Video Library. Both land in `public_domain/`.

mod nasa;
mod wikimedia;

use serde::de::DeserializeOwned;
use serde_json::Value;

use wallfetch_core::config::Config;
use wallfetch_core::models::SourceKind;
use wallfetch_core::ratelimit::RateLimiter;
use wallfetch_core::sources::WallpaperSource;

pub use nasa::{NasaClient, NasaConfig};
pub use wikimedia::{WikimediaClient, WikimediaConfig};

const USER_AGENT: &str = concat!("wallfetch/", env!("CARGO_PKG_VERSION"));

pub fn create_sources(config: &Config, client: reqwest::Client) -> Vec<Box<dyn WallpaperSource>> {
    let mut sources: Vec<Box<dyn WallpaperSource>> = Vec::new();

    let settings = config.source_settings(SourceKind::Wikimedia);
    if settings.enabled {
        sources.push(Box::new(WikimediaClient::new(
            read_table(config, SourceKind::Wikimedia),
            client.clone(),
            RateLimiter::new("wikimedia", settings.delay()),
        )));
    }

    let settings = config.source_settings(SourceKind::Nasa);
    if settings.enabled {
        sources.push(Box::new(NasaClient::new(
            read_table(config, SourceKind::Nasa),
            client,
            RateLimiter::new("nasa", settings.delay()),
        )));
    }
    sources
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sources() {
        let client = reqwest::Client::new();
        let mut config = Config::default();
        let names: Vec<_> = create_sources(&config, client.clone())
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["Wikimedia Commons", "NASA Image Library"]);

        config
            .sources
            .insert("nasa".into(), serde_json::json!({ "enabled": false }));
        let sources = create_sources(&config, client);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].kind(), SourceKind::Wikimedia);
    }

    #[test]
    fn test_read_table_falls_back() {
        let mut config = Config::default();
        config.sources.insert(
            "wikimedia".into(),
            serde_json::json!({ "default_query": 42 }),
        );
        let cfg: WikimediaConfig = read_table(&config, SourceKind::Wikimedia);
        assert_eq!(cfg.default_query, WikimediaConfig::default().default_query);
    }
}
