use serde::Serialize;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Result, WallfetchError};
use crate::manager::ImageManager;
use crate::models::{WallpaperPreview, WallpaperRecord};
use crate::quality::QualityFilter;
use crate::sources::{GenerationRequest, WallpaperSource};

#[derive(Debug, Clone, Serialize)]
pub struct RejectedItem {
    pub source_id: String,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub source_id: String,
    pub error: String,
}

/// Outcome of one fetch or generate run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FetchReport {
    pub found: usize,
    pub stored: Vec<WallpaperRecord>,
    pub rejected: Vec<RejectedItem>,
    pub failed: Vec<FailedItem>,
    pub skipped: usize,
    pub evicted: Vec<WallpaperRecord>,
}

/// Search → download → check → store → retention, one item at a time.
pub struct FetchPipeline<'a> {
    config: &'a Config,
    db: &'a Database,
    manager: &'a ImageManager,
    filter: QualityFilter,
}

impl<'a> FetchPipeline<'a> {
    pub fn new(config: &'a Config, db: &'a Database, manager: &'a ImageManager) -> Self {
        Self {
            config,
            db,
            manager,
            filter: QualityFilter::for_storage(config),
        }
    }

    pub async fn fetch(
        &self,
        source: &dyn WallpaperSource,
        query: &str,
        limit: u32,
    ) -> Result<FetchReport> {
        let previews = source.search(query, limit).await?;
        tracing::info!(source = source.name(), query, found = previews.len(), "search complete");
        Ok(self.process(source, previews).await)
    }

    pub async fn generate(
        &self,
        source: &dyn WallpaperSource,
        request: &GenerationRequest,
    ) -> Result<FetchReport> {
        let previews = source.generate(request).await?;
        tracing::info!(source = source.name(), generated = previews.len(), "generation complete");
        Ok(self.process(source, previews).await)
    }

    async fn process(
        &self,
        source: &dyn WallpaperSource,
        previews: Vec<WallpaperPreview>,
    ) -> FetchReport {
        let session_cap = self
            .config
            .source_settings(source.kind())
            .max_downloads_per_session as usize;
        let mut report = FetchReport {
            found: previews.len(),
            ..Default::default()
        };

        for preview in previews {
            if report.stored.len() >= session_cap {
                tracing::info!(source = source.name(), cap = session_cap, "session download cap reached");
                break;
            }
            match self.handle(source, &preview, &mut report).await {
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(source = source.name(), id = %preview.source_id, "{e}");
                    report.failed.push(FailedItem {
                        source_id: preview.source_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn handle(
        &self,
        source: &dyn WallpaperSource,
        preview: &WallpaperPreview,
        report: &mut FetchReport,
    ) -> Result<()> {
        if self.db.has_source_item(&preview.source_id, &preview.source_type)?
            || self.db.is_rejected(&preview.source_id, &preview.source_type)?
        {
            tracing::debug!(id = %preview.source_id, "already seen, skipping");
            report.skipped += 1;
            return Ok(());
        }
        if preview.has_dimensions()
            && !self
                .filter
                .check_dimensions(preview.width, preview.height)
                .is_empty()
        {
            tracing::debug!(
                id = %preview.source_id,
                width = preview.width,
                height = preview.height,
                "advertised size too small"
            );
            report.skipped += 1;
            return Ok(());
        }

        let data = source.download(preview).await?;

        let known = if self.config.storage.duplicate_detection {
            self.manager.known_hashes(self.db)?
        } else {
            Vec::new()
        };
        let verdict = self.filter.evaluate(&data, &known);
        for warning in &verdict.warnings {
            tracing::debug!(id = %preview.source_id, "{warning}");
        }
        let phash = match (verdict.accepted, verdict.phash) {
            (true, Some(phash)) => phash,
            _ => {
                let summary = verdict.summary();
                tracing::info!(id = %preview.source_id, reason = %summary, "rejected");
                self.db
                    .add_rejected(&preview.source_id, &preview.source_type, &summary)?;
                report.rejected.push(RejectedItem {
                    source_id: preview.source_id.clone(),
                    reasons: verdict.reasons,
                });
                return Ok(());
            }
        };

        match self
            .manager
            .store(self.db, preview, source.category(), &data, phash)
        {
            Ok(record) => report.stored.push(record),
            Err(WallfetchError::DuplicateImage(id)) => {
                tracing::debug!(%id, "identical file already stored");
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        // the item is stored at this point; a failed sweep must not fail it
        if self.config.storage.cleanup_enabled {
            match self
                .manager
                .enforce_retention(self.db, self.config.storage.max_total_wallpapers)
            {
                Ok(evicted) => report.evicted.extend(evicted),
                Err(e) => tracing::warn!("retention sweep failed: {e}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, SourceKind};
    use crate::phash::test_images::{blocks, encode, png_blocks};
    use crate::sources::{encode_data_uri, fetch_bytes};
    use async_trait::async_trait;
    use bytes::Bytes;
    use image::ImageFormat;

    struct Canned {
        items: Vec<(String, Vec<u8>, u32, u32)>,
    }

    #[async_trait]
    impl WallpaperSource for Canned {
        fn name(&self) -> &str {
            "Canned"
        }

        fn kind(&self) -> SourceKind {
            SourceKind::Wallhaven
        }

        async fn search(&self, _query: &str, limit: u32) -> Result<Vec<WallpaperPreview>> {
            Ok(self
                .items
                .iter()
                .take(limit as usize)
                .map(|(id, data, w, h)| WallpaperPreview {
                    source_type: self.source_type(),
                    source_id: id.clone(),
                    title: format!("item {id}"),
                    source_url: String::new(),
                    full_url: if data.is_empty() {
                        "http://127.0.0.1:9/missing.jpg".into()
                    } else {
                        encode_data_uri("image/png", data)
                    },
                    width: *w,
                    height: *h,
                    tags: Vec::new(),
                })
                .collect())
        }

        async fn download(&self, preview: &WallpaperPreview) -> Result<Bytes> {
            if preview.full_url.starts_with("http") {
                return Err(WallfetchError::unavailable("canned", "connection refused"));
            }
            fetch_bytes("canned", &reqwest::Client::new(), &preview.full_url).await
        }
    }

    fn config(max: u32) -> Config {
        let mut config = Config::default();
        config.quality.min_width = 320;
        config.quality.min_height = 180;
        config.quality.min_file_size = 0;
        config.storage.max_total_wallpapers = max;
        config
    }

    fn item(id: &str, data: Vec<u8>) -> (String, Vec<u8>, u32, u32) {
        (id.into(), data, 0, 0)
    }

    #[tokio::test]
    async fn test_fetch_sorts_items_into_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let manager = ImageManager::new(tmp.path());
        let config = config(100);
        let pipeline = FetchPipeline::new(&config, &db, &manager);

        let source = Canned {
            items: vec![
                item("good", png_blocks(320, 180, 1)),
                item("tiny", png_blocks(100, 100, 2)),
                ("advertised".into(), png_blocks(320, 180, 3), 64, 64),
                item("broken", Vec::new()),
                item("rescaled", encode(&blocks(640, 360, 1), ImageFormat::Png)),
            ],
        };

        let report = pipeline.fetch(&source, "nature", 10).await.unwrap();
        assert_eq!(report.found, 5);
        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.stored[0].source_id, "good");
        assert_eq!(report.stored[0].category, Category::Curated);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].source_id, "broken");

        let rejected: Vec<_> = report.rejected.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(rejected, vec!["tiny", "rescaled"]);
        assert!(report.rejected[1].reasons[0].starts_with("duplicate image"));
        assert!(db.is_rejected("tiny", &source.source_type()).unwrap());

        // second run skips stored and rejected items
        let again = pipeline.fetch(&source, "nature", 10).await.unwrap();
        assert!(again.stored.is_empty());
        assert!(again.rejected.is_empty());
        assert_eq!(again.skipped, 4);
        assert_eq!(again.failed.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_runs_retention() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let manager = ImageManager::new(tmp.path());
        let config = config(3);
        let pipeline = FetchPipeline::new(&config, &db, &manager);

        let source = Canned {
            items: (1..=4)
                .map(|i| item(&format!("w{i}"), png_blocks(320, 180, i * 10)))
                .collect(),
        };
        let report = pipeline.fetch(&source, "", 4).await.unwrap();
        assert_eq!(report.stored.len(), 4);
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].source_id, "w1");
        assert_eq!(db.record_count().unwrap(), 3);
        assert!(!std::path::Path::new(&report.stored[0].file_path).exists());
    }

    #[tokio::test]
    async fn test_retention_failure_keeps_item_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let manager = ImageManager::new(tmp.path());
        let config = config(1);
        let pipeline = FetchPipeline::new(&config, &db, &manager);

        let first = Canned {
            items: vec![item("r1", png_blocks(320, 180, 21))],
        };
        let report = pipeline.fetch(&first, "", 1).await.unwrap();
        let old_path = report.stored[0].file_path.clone();
        // a directory in place of the file makes the eviction fail
        std::fs::remove_file(&old_path).unwrap();
        std::fs::create_dir(&old_path).unwrap();

        let second = Canned {
            items: vec![item("r2", png_blocks(320, 180, 22))],
        };
        let report = pipeline.fetch(&second, "", 1).await.unwrap();
        assert_eq!(report.stored.len(), 1);
        assert_eq!(report.stored[0].source_id, "r2");
        assert!(report.failed.is_empty());
        assert!(report.evicted.is_empty());
        assert_eq!(db.record_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_session_cap_and_disabled_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let manager = ImageManager::new(tmp.path());
        let mut config = config(100);
        config.storage.quality_filter = false;
        config.sources.insert(
            "wallhaven".into(),
            serde_json::json!({ "max_downloads_per_session": 2 }),
        );
        let pipeline = FetchPipeline::new(&config, &db, &manager);

        let source = Canned {
            items: (1..=4)
                .map(|i| item(&format!("s{i}"), png_blocks(100, 100, i * 7)))
                .collect(),
        };
        let report = pipeline.fetch(&source, "", 10).await.unwrap();
        assert_eq!(report.stored.len(), 2);
        assert!(report.rejected.is_empty());
    }
}
