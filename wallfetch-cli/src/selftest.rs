//! Built-in checks grouped by component. Offline groups work on a scratch
//! directory and an in-memory database, never on the user's collection.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use wallfetch_core::config::{Config, QualityConfig};
use wallfetch_core::db::Database;
use wallfetch_core::error::WallfetchError;
use wallfetch_core::manager::ImageManager;
use wallfetch_core::models::{Category, SourceType, WallpaperPreview};
use wallfetch_core::phash::PerceptualHash;
use wallfetch_core::quality::QualityFilter;

const ONLINE_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Group {
    All,
    Config,
    Manager,
    Quality,
    Sources,
}

impl Group {
    fn includes(self, other: Group) -> bool {
        self == Group::All || self == other
    }
}

#[derive(Default)]
struct Reporter {
    passed: usize,
    failed: usize,
}

impl Reporter {
    fn check(&mut self, group: &str, name: &str, result: Result<()>) {
        match result {
            Ok(()) => {
                self.passed += 1;
                println!("  ok    {group}: {name}");
            }
            Err(e) => {
                self.failed += 1;
                println!("  FAIL  {group}: {name}: {e:#}");
            }
        }
    }
}

/// Runs the selected group and returns whether every check passed.
pub async fn run(group: Group, online: bool, config: &Config, client: reqwest::Client) -> bool {
    let mut r = Reporter::default();

    if group.includes(Group::Config) {
        r.check("config", "defaults validate", Config::default().validate().map_err(Into::into));
        r.check("config", "save and reload", config_round_trip());
        r.check("config", "set validates", config_set());
    }
    if group.includes(Group::Manager) {
        r.check("manager", "retention keeps newest", manager_retention());
        r.check("manager", "exact duplicates refused", manager_duplicates());
        r.check("manager", "missing files pruned", manager_prune());
    }
    if group.includes(Group::Quality) {
        r.check("quality", "small image rejected", quality_small_rejected());
        r.check("quality", "good image accepted", quality_accepts());
        r.check("quality", "near duplicate rejected", quality_duplicate());
    }
    if group.includes(Group::Sources) {
        r.check("sources", "enabled sources registered", sources_registered(config));
        if online {
            sources_online(&mut r, config, client).await;
        }
    }

    println!("{} passed, {} failed", r.passed, r.failed);
    r.failed == 0
}

fn config_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.json");
    let mut config = Config::default();
    config.storage.max_total_wallpapers = 42;
    config.set("sources.reddit.sort", "top")?;
    config.save_to(&path)?;
    let loaded = Config::load_from(&path)?;
    ensure!(loaded == config, "reloaded config differs from saved one");
    Ok(())
}

fn config_set() -> Result<()> {
    let mut config = Config::default();
    ensure!(
        config.set("storage.max_total_wallpapers", "0").is_err(),
        "zero wallpaper limit accepted"
    );
    ensure!(config.set("storage.no_such_key", "1").is_err(), "unknown key accepted");
    ensure!(config == Config::default(), "failed set modified the config");
    config.set("quality.min_width", "2560")?;
    ensure!(config.quality.min_width == 2560, "value not applied");
    Ok(())
}

fn manager_retention() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = Database::open_in_memory()?;
    let manager = ImageManager::new(dir.path());
    manager.ensure_layout()?;

    let mut stored = Vec::new();
    for seed in 1..=4 {
        let data = noise_png(64, 48, seed)?;
        let hash = PerceptualHash::from_bytes(&data)?;
        stored.push(manager.store(&db, &preview(seed), Category::Curated, &data, hash)?);
        manager.enforce_retention(&db, 3)?;
    }

    ensure!(db.record_count()? == 3, "expected 3 records after retention");
    ensure!(
        !Path::new(&stored[0].file_path).exists(),
        "oldest file still on disk"
    );
    for record in &stored[1..] {
        ensure!(Path::new(&record.file_path).exists(), "{} missing", record.file_path);
    }
    Ok(())
}

fn manager_duplicates() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = Database::open_in_memory()?;
    let manager = ImageManager::new(dir.path());
    let data = noise_png(32, 32, 7)?;
    let hash = PerceptualHash::from_bytes(&data)?;
    manager.store(&db, &preview(1), Category::Community, &data, hash)?;
    match manager.store(&db, &preview(2), Category::Community, &data, hash) {
        Err(WallfetchError::DuplicateImage(_)) => Ok(()),
        Err(e) => Err(e).context("wrong error for duplicate"),
        Ok(_) => anyhow::bail!("duplicate stored twice"),
    }
}

fn manager_prune() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = Database::open_in_memory()?;
    let manager = ImageManager::new(dir.path());
    let data = noise_png(32, 32, 9)?;
    let record = manager.store(
        &db,
        &preview(1),
        Category::PublicDomain,
        &data,
        PerceptualHash::from_bytes(&data)?,
    )?;
    std::fs::remove_file(&record.file_path)?;
    let pruned = manager.prune_missing(&db)?;
    ensure!(pruned.len() == 1, "expected one pruned record");
    ensure!(db.record_count()? == 0, "record kept for missing file");
    Ok(())
}

fn quality_small_rejected() -> Result<()> {
    let filter = QualityFilter::new(QualityConfig {
        min_width: 1920,
        min_height: 1080,
        ..QualityConfig::default()
    });
    let report = filter.evaluate(&noise_png(100, 100, 3)?, &[]);
    ensure!(!report.accepted, "100x100 image accepted");
    ensure!(
        report.reasons.iter().any(|r| r.starts_with("resolution too low")),
        "no resolution reason in {:?}",
        report.reasons
    );
    Ok(())
}

fn quality_accepts() -> Result<()> {
    let filter = QualityFilter::new(QualityConfig::default());
    let report = filter.evaluate(&noise_png(1280, 720, 11)?, &[]);
    ensure!(report.accepted, "rejected: {}", report.reasons.join("; "));
    ensure!(report.phash.is_some(), "no perceptual hash computed");
    Ok(())
}

fn quality_duplicate() -> Result<()> {
    let filter = QualityFilter::new(QualityConfig::default());
    let data = noise_png(1280, 720, 5)?;
    let known = [PerceptualHash::from_bytes(&data)?];
    let report = filter.evaluate(&data, &known);
    ensure!(!report.accepted, "duplicate accepted");
    ensure!(
        report.reasons.iter().any(|r| r.starts_with("duplicate image")),
        "no duplicate reason in {:?}",
        report.reasons
    );
    Ok(())
}

fn sources_registered(config: &Config) -> Result<()> {
    let registry = crate::build_registry(config, reqwest::Client::new());
    for kind in config.enabled_sources() {
        ensure!(registry.by_kind(kind).is_some(), "{kind} enabled but not registered");
    }
    let priorities: Vec<u8> = registry
        .iter()
        .map(|s| config.source_settings(s.kind()).priority)
        .collect();
    ensure!(
        priorities.windows(2).all(|w| w[0] >= w[1]),
        "registry not ordered by priority"
    );
    Ok(())
}

/// One small search per download source. Generators are skipped since
/// every call spends quota.
async fn sources_online(r: &mut Reporter, config: &Config, client: reqwest::Client) {
    let registry = crate::build_registry(config, client);
    for source in registry.iter().filter(|s| !s.kind().is_generator()) {
        let result = match tokio::time::timeout(ONLINE_TIMEOUT, source.search("nature", 2)).await {
            Ok(Ok(previews)) if previews.is_empty() => Err(anyhow::anyhow!("no results")),
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow::anyhow!("timed out after {}s", ONLINE_TIMEOUT.as_secs())),
        };
        r.check("sources", &format!("{} search", source.name()), result);
    }
}

fn preview(n: u64) -> WallpaperPreview {
    WallpaperPreview {
        source_type: SourceType::new("selftest"),
        source_id: format!("item-{n}"),
        title: format!("selftest {n}"),
        source_url: String::new(),
        full_url: String::new(),
        width: 0,
        height: 0,
        tags: Vec::new(),
    }
}

/// Pseudo-random RGB noise; distinct seeds give distinct images that do
/// not compress well, so file size scales with dimensions.
pub(crate) fn noise_png(width: u32, height: u32, seed: u64) -> Result<Vec<u8>> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let b = state.to_le_bytes();
        Rgb([b[0], b[1], b[2]])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("failed to encode test image")?;
    Ok(buf)
}
