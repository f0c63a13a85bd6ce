use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use image::ImageReader;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::db::Database;
use crate::error::{Result, WallfetchError};
use crate::models::{Category, SourceType, WallpaperPreview, WallpaperRecord};
use crate::phash::PerceptualHash;
use crate::quality::QualityFilter;

const MAX_STEM_LEN: usize = 50;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Owns the category tree under the wallpaper directory and keeps it in
/// step with the record store.
pub struct ImageManager {
    base: PathBuf,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CategoryStats {
    pub records: u32,
    pub files: u64,
    pub bytes: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct StorageStats {
    pub base_path: PathBuf,
    pub total_records: u32,
    pub total_files: u64,
    pub total_bytes: u64,
    pub by_category: BTreeMap<Category, CategoryStats>,
    pub by_source: BTreeMap<String, u32>,
}

impl ImageManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.base.join(category.dir_name())
    }

    pub fn ensure_layout(&self) -> Result<()> {
        for cat in Category::ALL {
            std::fs::create_dir_all(self.category_dir(*cat)).map_err(|e| {
                WallfetchError::Storage(format!(
                    "cannot create {}: {e}",
                    self.category_dir(*cat).display()
                ))
            })?;
        }
        Ok(())
    }

    /// Write validated bytes into the category folder and record them.
    /// Identical content (same SHA-256) is refused with `DuplicateImage`.
    pub fn store(
        &self,
        db: &Database,
        preview: &WallpaperPreview,
        category: Category,
        data: &[u8],
        phash: PerceptualHash,
    ) -> Result<WallpaperRecord> {
        let id = sha256_hex(data);
        if db.record_exists(&id)? {
            return Err(WallfetchError::DuplicateImage(id));
        }

        let dir = self.category_dir(category);
        std::fs::create_dir_all(&dir)?;

        let label = if preview.title.trim().is_empty() {
            &preview.source_id
        } else {
            &preview.title
        };
        let stem = format!("{}_{}", preview.source_type, sanitize_filename(label, &id));
        let file_path = unique_path(&dir, &stem, guess_extension(data));
        std::fs::write(&file_path, data)?;

        let (width, height) = image_dimensions(data).unwrap_or((preview.width, preview.height));
        let record = WallpaperRecord {
            id,
            source_type: preview.source_type.clone(),
            source_id: preview.source_id.clone(),
            title: preview.title.clone(),
            category,
            file_path: file_path.to_string_lossy().to_string(),
            width,
            height,
            phash,
            downloaded_at: now(),
        };

        if let Err(e) = db.insert_record(&record) {
            let _ = std::fs::remove_file(&file_path);
            return Err(e);
        }
        tracing::info!(id = %record.id, path = %record.file_path, "stored wallpaper");
        Ok(record)
    }

    /// Delete the oldest records and their files until at most `max` remain.
    /// Returns the evicted records, oldest first.
    pub fn enforce_retention(&self, db: &Database, max: u32) -> Result<Vec<WallpaperRecord>> {
        let count = db.record_count()?;
        if count <= max {
            return Ok(Vec::new());
        }
        let victims = db.oldest_records(count - max)?;
        for record in &victims {
            remove_file_if_present(Path::new(&record.file_path))?;
            db.delete_record(&record.id)?;
            tracing::info!(id = %record.id, path = %record.file_path, "evicted wallpaper");
        }
        Ok(victims)
    }

    pub fn list(&self, db: &Database, category: Option<Category>) -> Result<Vec<WallpaperRecord>> {
        db.list_records(category)
    }

    pub fn remove(&self, db: &Database, id: &str) -> Result<WallpaperRecord> {
        let record = db.get_record(id)?;
        remove_file_if_present(Path::new(&record.file_path))?;
        db.delete_record(id)?;
        Ok(record)
    }

    /// Copy a local image into the tree as if it had been downloaded. The
    /// image passes the same quality and near-duplicate checks as downloads.
    pub fn import_local(
        &self,
        db: &Database,
        config: &Config,
        path: &Path,
        category: Category,
    ) -> Result<WallpaperRecord> {
        if !path.exists() {
            return Err(WallfetchError::FileNotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;

        let known = if config.storage.duplicate_detection {
            self.known_hashes(db)?
        } else {
            Vec::new()
        };
        let verdict = QualityFilter::for_storage(config).evaluate(&data, &known);
        let phash = match (verdict.accepted, verdict.phash) {
            (true, Some(phash)) => phash,
            _ => {
                let reason = format!("{}: {}", path.display(), verdict.summary());
                let duplicate = verdict
                    .reasons
                    .iter()
                    .any(|r| r.starts_with("duplicate image"));
                return Err(if duplicate {
                    WallfetchError::DuplicateImage(reason)
                } else {
                    WallfetchError::InvalidImage(reason)
                });
            }
        };

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let preview = WallpaperPreview {
            source_type: SourceType::new("local"),
            source_id: path.to_string_lossy().to_string(),
            title,
            source_url: String::new(),
            full_url: String::new(),
            width: 0,
            height: 0,
            tags: Vec::new(),
        };
        self.store(db, &preview, category, &data, phash)
    }

    pub fn known_hashes(&self, db: &Database) -> Result<Vec<PerceptualHash>> {
        db.perceptual_hashes()
    }

    /// Drop records whose file has disappeared from disk.
    pub fn prune_missing(&self, db: &Database) -> Result<Vec<WallpaperRecord>> {
        let mut pruned = Vec::new();
        for record in db.list_records(None)? {
            if !Path::new(&record.file_path).exists() {
                tracing::warn!(id = %record.id, path = %record.file_path, "file missing, dropping record");
                db.delete_record(&record.id)?;
                pruned.push(record);
            }
        }
        Ok(pruned)
    }

    pub fn stats(&self, db: &Database) -> Result<StorageStats> {
        let mut stats = StorageStats {
            base_path: self.base.clone(),
            total_records: db.record_count()?,
            by_source: db.count_by_source()?,
            ..Default::default()
        };
        let records = db.count_by_category()?;

        for cat in Category::ALL {
            let mut entry = CategoryStats {
                records: records.get(cat).copied().unwrap_or(0),
                ..Default::default()
            };
            let dir = self.category_dir(*cat);
            if dir.is_dir() {
                for item in std::fs::read_dir(&dir)? {
                    let item = item?;
                    let meta = item.metadata()?;
                    if meta.is_file() && is_image_file(&item.path()) {
                        entry.files += 1;
                        entry.bytes += meta.len();
                    }
                }
            }
            stats.total_files += entry.files;
            stats.total_bytes += entry.bytes;
            stats.by_category.insert(*cat, entry);
        }
        Ok(stats)
    }
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WallfetchError::Storage(format!(
            "cannot remove {}: {e}",
            path.display()
        ))),
    }
}

fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `{stem}.{ext}`, or `{stem}_1.{ext}`, `{stem}_2.{ext}`, ... if taken.
fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{ext}"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Keeps ASCII alphanumerics, `-` and `_`; spaces become `_`. Falls back
/// to the first 12 characters of `fallback_id` when nothing survives.
pub fn sanitize_filename(label: &str, fallback_id: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let cleaned: String = cleaned.chars().take(MAX_STEM_LEN).collect();
    if cleaned.is_empty() {
        fallback_id.chars().take(12).collect()
    } else {
        cleaned
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
}

pub fn guess_extension(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "png"
    } else if data.starts_with(b"\xff\xd8") {
        "jpg"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
        "webp"
    } else if data.starts_with(b"GIF8") {
        "gif"
    } else if data.starts_with(b"BM") {
        "bmp"
    } else {
        "jpg"
    }
}
