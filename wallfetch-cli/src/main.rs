mod selftest;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use wallfetch_core::config::{Config, PromptTemplate};
use wallfetch_core::db::Database;
use wallfetch_core::manager::ImageManager;
use wallfetch_core::models::{AiStyle, Category, SourceKind, TargetResolution, WallpaperRecord};
use wallfetch_core::paths::WallfetchPaths;
use wallfetch_core::pipeline::{FetchPipeline, FetchReport};
use wallfetch_core::quality::{QualityFilter, ValidationSummary};
use wallfetch_core::sources::{GenerationRequest, SourceRegistry};

#[derive(Parser)]
#[command(name = "wallfetch", version, about = "Download and generate wallpapers")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sources with their priority and state
    Sources,
    /// Search a source and download what passes the quality check
    Fetch {
        /// Source name, e.g. wallhaven, reddit, wikimedia, nasa
        source: String,
        /// Search terms; empty uses the source's default listing
        #[arg(default_value = "")]
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
        /// Store into this directory instead of the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate wallpapers with an AI source
    Generate {
        /// monica_ai, craiyon or stable_diffusion
        source: String,
        prompt: Option<String>,
        /// Use a saved prompt template
        #[arg(short, long)]
        template: Option<String>,
        /// photography, digital_art, abstract, minimal
        #[arg(short, long)]
        style: Option<AiStyle>,
        /// mobile, 1080p, 1440p, 4K, ultrawide
        #[arg(short, long)]
        resolution: Option<TargetResolution>,
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },
    /// Copy a local image into the collection
    Import {
        file: PathBuf,
        #[arg(short, long, default_value = "curated")]
        category: Category,
    },
    /// List stored wallpapers
    List {
        #[arg(short, long)]
        category: Option<Category>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a wallpaper by ID (or unique ID prefix)
    Remove { id: String },
    /// Show storage statistics
    Stats,
    /// Drop records whose files are gone and apply the wallpaper limit
    Cleanup,
    /// Run the quality check on local files
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Also check sharpness
        #[arg(long)]
        strict: bool,
    },
    /// Manage prompt templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },
    /// Show or edit the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the list of rejected items
    Rejected {
        #[command(subcommand)]
        action: RejectedAction,
    },
    /// Run built-in checks; exit code reflects the result
    Selftest {
        #[arg(short, long, value_enum, default_value_t = selftest::Group::All)]
        group: selftest::Group,
        /// Also query the network sources
        #[arg(long)]
        online: bool,
    },
}

#[derive(Subcommand)]
enum TemplatesAction {
    /// List templates
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Add or replace a template
    Add {
        name: String,
        prompt: String,
        #[arg(short, long, default_value = "photography")]
        style: AiStyle,
        #[arg(short, long, default_value = "custom")]
        category: String,
    },
    /// Remove a template
    Remove { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Set a value by dotted key, e.g. storage.max_total_wallpapers 500
    Set { key: String, value: String },
    /// Restore defaults
    Reset,
}

#[derive(Subcommand)]
enum RejectedAction {
    /// List rejected items
    List,
    /// Forget all rejections so items can be retried
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "wallfetch=debug"
    } else {
        "wallfetch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    let paths = WallfetchPaths::new()?;
    let mut config = match (&command, Config::load(&paths)) {
        (_, Ok(config)) => config,
        // still reachable with a broken file, so it can be located or replaced
        (
            Commands::Config {
                action: ConfigAction::Path | ConfigAction::Reset,
            },
            Err(e),
        ) => {
            tracing::warn!("ignoring configuration: {e}");
            Config::default()
        }
        (_, Err(e)) => return Err(e).context("cannot load configuration"),
    };

    match command {
        Commands::Sources => {
            let registry = build_registry(&config, http_client()?);
            print_sources(&config, &registry);
        }
        Commands::Fetch {
            source,
            query,
            limit,
            output,
        } => {
            let output = output.filter(|dir| *dir != config.storage.base_path);
            if let Some(ref dir) = output {
                config.storage.base_path = dir.clone();
            }
            let registry = build_registry(&config, http_client()?);
            let Some(src) = registry.get(&source) else {
                bail!("unknown or disabled source: {source} (see `wallfetch sources`)");
            };
            let (db, manager) = match output {
                Some(ref dir) => open_store_at(&output_db_path(dir), &config)?,
                None => open_store(&paths, &config)?,
            };
            let pipeline = FetchPipeline::new(&config, &db, &manager);
            let report = pipeline.fetch(src, &query, limit).await?;
            print_report(&report);
        }
        Commands::Generate {
            source,
            prompt,
            template,
            style,
            resolution,
            count,
        } => {
            let request = generation_request(&config, prompt, template, style, resolution, count)?;
            let registry = build_registry(&config, http_client()?);
            let Some(src) = registry.get(&source) else {
                bail!("unknown or disabled source: {source} (see `wallfetch sources`)");
            };
            if !src.kind().is_generator() {
                bail!("{} does not generate images; use `wallfetch fetch`", src.name());
            }
            let (db, manager) = open_store(&paths, &config)?;
            let pipeline = FetchPipeline::new(&config, &db, &manager);
            let report = pipeline.generate(src, &request).await?;
            print_report(&report);
            if config.ai.save_prompts && !report.stored.is_empty() {
                if let Err(e) = save_prompt_log(&paths, src.kind(), &request, &report.stored) {
                    tracing::warn!("failed to save prompt log: {e:#}");
                }
            }
        }
        Commands::Import { file, category } => {
            let (db, manager) = open_store(&paths, &config)?;
            let record = manager.import_local(&db, &config, &file, category)?;
            println!("imported {} -> {}", short_id(&record.id), record.file_path);
            if config.storage.cleanup_enabled {
                let evicted = manager.enforce_retention(&db, config.storage.max_total_wallpapers)?;
                print_evicted(&evicted);
            }
        }
        Commands::List { category, json } => {
            let (db, manager) = open_store(&paths, &config)?;
            let records = manager.list(&db, category)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("no wallpapers stored");
            } else {
                for r in &records {
                    println!(
                        "{}  {:<13} {:>9}  {:<10} {}",
                        short_id(&r.id),
                        r.category,
                        format!("{}x{}", r.width, r.height),
                        r.source_type,
                        r.file_path
                    );
                }
                println!("{} wallpaper(s)", records.len());
            }
        }
        Commands::Remove { id } => {
            let (db, manager) = open_store(&paths, &config)?;
            let id = resolve_id(&manager.list(&db, None)?, &id)?;
            let record = manager.remove(&db, &id)?;
            println!("removed {} ({})", short_id(&record.id), record.file_path);
        }
        Commands::Stats => {
            let (db, manager) = open_store(&paths, &config)?;
            let stats = manager.stats(&db)?;
            println!("location:   {}", stats.base_path.display());
            println!(
                "wallpapers: {} of {} max ({} files, {})",
                stats.total_records,
                config.storage.max_total_wallpapers,
                stats.total_files,
                format_bytes(stats.total_bytes)
            );
            for (category, s) in &stats.by_category {
                println!(
                    "  {:<14} {:>5} records {:>5} files {:>10}",
                    category.to_string(),
                    s.records,
                    s.files,
                    format_bytes(s.bytes)
                );
            }
            if !stats.by_source.is_empty() {
                println!("by source:");
                for (source, n) in &stats.by_source {
                    println!("  {source:<16} {n}");
                }
            }
        }
        Commands::Cleanup => {
            let (db, manager) = open_store(&paths, &config)?;
            let missing = manager.prune_missing(&db)?;
            println!("dropped {} record(s) with missing files", missing.len());
            let evicted = manager.enforce_retention(&db, config.storage.max_total_wallpapers)?;
            print_evicted(&evicted);
        }
        Commands::Validate { files, strict } => {
            let mut quality = config.quality.clone();
            quality.strict |= strict;
            return validate_files(QualityFilter::new(quality), &files);
        }
        Commands::Templates { action } => templates(&paths, &mut config, action)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&config)?),
            ConfigAction::Path => println!("{}", paths.config_file().display()),
            ConfigAction::Set { key, value } => {
                config.set(&key, &value)?;
                config.save(&paths)?;
                println!("{key} updated");
            }
            ConfigAction::Reset => {
                config.reset();
                config.save(&paths)?;
                println!("configuration reset to defaults");
            }
        },
        Commands::Rejected { action } => {
            let (db, _) = open_store(&paths, &config)?;
            match action {
                RejectedAction::List => {
                    let entries = db.list_rejected()?;
                    if entries.is_empty() {
                        println!("no rejected items");
                    }
                    for e in entries {
                        println!("{:<12} {:<24} {}  {}", e.source, e.source_id, e.rejected_at, e.reason);
                    }
                }
                RejectedAction::Clear => {
                    let n = db.clear_rejected()?;
                    println!("cleared {n} rejected item(s)");
                }
            }
        }
        Commands::Selftest { group, online } => {
            let passed = selftest::run(group, online, &config, http_client()?).await;
            return Ok(if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("wallfetch/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()
        .context("failed to build HTTP client")
}

/// Every enabled source, highest priority first.
pub(crate) fn build_registry(config: &Config, client: reqwest::Client) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.extend(wallfetch_source_wallhaven::create_sources(config, client.clone()));
    registry.extend(wallfetch_source_reddit::create_sources(config, client.clone()));
    registry.extend(wallfetch_source_archive::create_sources(config, client.clone()));
    registry.extend(wallfetch_source_ai::create_sources(config, client));
    registry.sort_by_priority(config);
    registry
}

const OUTPUT_DB_NAME: &str = ".wallfetch.db";

fn open_store(paths: &WallfetchPaths, config: &Config) -> Result<(Database, ImageManager)> {
    paths.ensure_dirs()?;
    open_store_at(&paths.db_path(), config)
}

/// A `--output` tree keeps its own record store, so retention and stats
/// there never touch records of the configured tree.
fn output_db_path(dir: &Path) -> PathBuf {
    dir.join(OUTPUT_DB_NAME)
}

fn open_store_at(db_path: &Path, config: &Config) -> Result<(Database, ImageManager)> {
    let manager = ImageManager::new(&config.storage.base_path);
    manager.ensure_layout()?;
    let db = Database::open(db_path)?;
    Ok((db, manager))
}

fn generation_request(
    config: &Config,
    prompt: Option<String>,
    template: Option<String>,
    style: Option<AiStyle>,
    resolution: Option<TargetResolution>,
    count: u32,
) -> Result<GenerationRequest> {
    let template = match template {
        Some(name) => Some(
            config
                .find_template(&name)
                .with_context(|| format!("no prompt template named {name:?}"))?,
        ),
        None => None,
    };
    let prompt = match (template, prompt) {
        (Some(t), Some(extra)) => format!("{}, {}", t.prompt, extra.trim()),
        (Some(t), None) => t.prompt.clone(),
        (None, Some(p)) => p,
        (None, None) => bail!("a prompt or --template is required"),
    };
    if prompt.trim().is_empty() {
        bail!("prompt must not be empty");
    }
    Ok(GenerationRequest {
        prompt,
        style: style
            .or(template.map(|t| t.style))
            .unwrap_or(config.ai.default_style),
        resolution: resolution.unwrap_or(config.ai.default_resolution),
        count: count.max(1),
    })
}

fn templates(paths: &WallfetchPaths, config: &mut Config, action: TemplatesAction) -> Result<()> {
    match action {
        TemplatesAction::List { category } => {
            let list: Vec<&PromptTemplate> = match category {
                Some(ref c) => config.templates_by_category(c),
                None => config.prompt_templates.iter().collect(),
            };
            for t in list {
                println!("{:<20} [{}/{}] {}", t.name, t.category, t.style, t.prompt);
            }
        }
        TemplatesAction::Add {
            name,
            prompt,
            style,
            category,
        } => {
            if prompt.trim().is_empty() {
                bail!("template prompt must not be empty");
            }
            config.add_prompt_template(PromptTemplate {
                name: name.clone(),
                prompt,
                style,
                category,
            });
            config.save(paths)?;
            println!("saved template {name:?}");
        }
        TemplatesAction::Remove { name } => {
            if !config.remove_prompt_template(&name) {
                bail!("no prompt template named {name:?}");
            }
            config.save(paths)?;
            println!("removed template {name:?}");
        }
    }
    Ok(())
}

fn validate_files(filter: QualityFilter, files: &[PathBuf]) -> Result<ExitCode> {
    let mut reports = Vec::with_capacity(files.len());
    let mut seen = Vec::new();
    for file in files {
        let data = match std::fs::read(file) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("{}: {e}", file.display());
                continue;
            }
        };
        let report = filter.evaluate(&data, &seen);
        println!("{}: {}", file.display(), report.summary());
        for w in &report.warnings {
            println!("    warning: {w}");
        }
        for r in &report.recommendations {
            println!("    hint: {r}");
        }
        if let (true, Some(hash)) = (report.accepted, report.phash) {
            seen.push(hash);
        }
        reports.push(report);
    }

    let summary = ValidationSummary::from_reports(&reports);
    println!(
        "\n{} checked, {} accepted, {} rejected ({:.0}%)",
        summary.total,
        summary.accepted,
        summary.rejected,
        summary.acceptance_rate * 100.0
    );
    for (reason, n) in &summary.common_reasons {
        println!("  {n} x {reason}");
    }
    Ok(if summary.rejected == 0 && summary.total == files.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_sources(config: &Config, registry: &SourceRegistry) {
    let mut kinds = SourceKind::ALL.to_vec();
    kinds.sort_by_key(|k| std::cmp::Reverse(config.source_settings(*k).priority));
    for kind in kinds {
        let settings = config.source_settings(kind);
        let state = match (settings.enabled, registry.by_kind(kind)) {
            (true, Some(_)) => "enabled",
            (true, None) => "unavailable",
            (false, _) => "disabled",
        };
        println!(
            "{:<17} {:<14} priority {:>2}  {}",
            kind.as_str(),
            kind.category().to_string(),
            settings.priority,
            state
        );
    }
}

fn print_report(report: &FetchReport) {
    for r in &report.stored {
        println!("stored   {} {}", short_id(&r.id), r.file_path);
    }
    for r in &report.rejected {
        println!("rejected {}: {}", r.source_id, r.reasons.join("; "));
    }
    for f in &report.failed {
        println!("failed   {}: {}", f.source_id, f.error);
    }
    print_evicted(&report.evicted);
    println!(
        "found {}, stored {}, rejected {}, failed {}, skipped {}",
        report.found,
        report.stored.len(),
        report.rejected.len(),
        report.failed.len(),
        report.skipped
    );
}

fn print_evicted(evicted: &[WallpaperRecord]) {
    for r in evicted {
        println!("evicted  {} {}", short_id(&r.id), r.file_path);
    }
}

fn save_prompt_log(
    paths: &WallfetchPaths,
    source: SourceKind,
    request: &GenerationRequest,
    stored: &[WallpaperRecord],
) -> Result<()> {
    append_prompt_log(&paths.data_dir.join("prompts.jsonl"), source, request, stored)
}

/// One JSON line per generation run that stored at least one image.
fn append_prompt_log(
    path: &Path,
    source: SourceKind,
    request: &GenerationRequest,
    stored: &[WallpaperRecord],
) -> Result<()> {
    let entry = serde_json::json!({
        "source": source,
        "prompt": request.prompt,
        "style": request.style,
        "resolution": request.resolution,
        "ids": stored.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        "at": stored.first().map(|r| r.downloaded_at.as_str()),
    });
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{entry}")?;
    Ok(())
}

fn resolve_id(records: &[WallpaperRecord], id: &str) -> Result<String> {
    let matches: Vec<&WallpaperRecord> = records.iter().filter(|r| r.id.starts_with(id)).collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => bail!("no wallpaper with id {id}"),
        _ => bail!("id prefix {id} is ambiguous ({} matches)", matches.len()),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallfetch_core::models::SourceType;
    use wallfetch_core::phash::PerceptualHash;

    fn record(id: &str) -> WallpaperRecord {
        WallpaperRecord {
            id: id.into(),
            source_type: SourceType::new("local"),
            source_id: id.into(),
            title: String::new(),
            category: Category::Curated,
            file_path: format!("/w/{id}.png"),
            width: 1920,
            height: 1080,
            phash: PerceptualHash::from_bits(0),
            downloaded_at: "2026-01-01T00:00:00.000000Z".into(),
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["wallfetch", "fetch", "wallhaven", "mountains", "-l", "5"]).unwrap();
        match cli.command {
            Commands::Fetch { source, query, limit, output } => {
                assert_eq!(source, "wallhaven");
                assert_eq!(query, "mountains");
                assert_eq!(limit, 5);
                assert!(output.is_none());
            }
            _ => panic!("expected fetch"),
        }

        let cli = Cli::try_parse_from([
            "wallfetch", "generate", "craiyon", "misty lake", "--style", "digital_art",
            "--resolution", "ultrawide", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Generate { style, resolution, count, .. } => {
                assert_eq!(style, Some(AiStyle::DigitalArt));
                assert_eq!(resolution, Some(TargetResolution::Ultrawide));
                assert_eq!(count, 1);
            }
            _ => panic!("expected generate"),
        }

        let cli = Cli::try_parse_from(["wallfetch", "selftest", "--group", "quality"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Selftest { group: selftest::Group::Quality, online: false }
        ));

        assert!(Cli::try_parse_from(["wallfetch", "import", "a.png", "-c", "nowhere"]).is_err());
        assert!(Cli::try_parse_from(["wallfetch", "validate"]).is_err());
    }

    #[test]
    fn test_generation_request_from_template() {
        let config = Config::default();
        let request = generation_request(
            &config,
            Some("at dawn".into()),
            Some("Space Nebula".into()),
            None,
            None,
            0,
        )
        .unwrap();
        let template = config.find_template("Space Nebula").unwrap();
        assert_eq!(request.prompt, format!("{}, at dawn", template.prompt));
        assert_eq!(request.style, template.style);
        assert_eq!(request.resolution, config.ai.default_resolution);
        assert_eq!(request.count, 1);

        let request = generation_request(
            &config,
            Some("red dunes".into()),
            None,
            Some(AiStyle::Minimal),
            Some(TargetResolution::Mobile),
            3,
        )
        .unwrap();
        assert_eq!(request.style, AiStyle::Minimal);
        assert_eq!(request.count, 3);

        assert!(generation_request(&config, None, None, None, None, 1).is_err());
        assert!(generation_request(&config, None, Some("missing".into()), None, None, 1).is_err());
        assert!(generation_request(&config, Some("  ".into()), None, None, None, 1).is_err());
    }

    #[test]
    fn test_build_registry_order() {
        let config = Config::default();
        let registry = build_registry(&config, reqwest::Client::new());
        let priorities: Vec<u8> = registry
            .iter()
            .map(|s| config.source_settings(s.kind()).priority)
            .collect();
        assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(registry.iter().next().map(|s| s.kind()), Some(SourceKind::Wallhaven));
        assert!(registry.by_kind(SourceKind::StableDiffusion).is_none());
    }

    #[test]
    fn test_output_dir_has_own_store() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WallfetchPaths {
            config_dir: tmp.path().join("config"),
            data_dir: tmp.path().join("data"),
        };
        let mut config = Config::default();
        config.storage.base_path = tmp.path().join("walls");
        config.quality.min_width = 32;
        config.quality.min_height = 32;
        config.quality.min_file_size = 0;

        let image = tmp.path().join("one.png");
        std::fs::write(&image, selftest::noise_png(64, 48, 3).unwrap()).unwrap();

        let mut elsewhere = config.clone();
        elsewhere.storage.base_path = tmp.path().join("elsewhere");
        let db_path = output_db_path(&elsewhere.storage.base_path);
        let (db, manager) = open_store_at(&db_path, &elsewhere).unwrap();
        manager
            .import_local(&db, &elsewhere, &image, Category::Curated)
            .unwrap();
        assert!(db_path.exists());
        assert_eq!(db.record_count().unwrap(), 1);

        let (shared, _) = open_store(&paths, &config).unwrap();
        assert_eq!(shared.record_count().unwrap(), 0);
        assert!(paths.db_path().exists());
    }

    #[test]
    fn test_resolve_id() {
        let records = vec![record("abc123"), record("abd456")];
        assert_eq!(resolve_id(&records, "abc").unwrap(), "abc123");
        assert_eq!(resolve_id(&records, "abd456").unwrap(), "abd456");
        assert!(resolve_id(&records, "ab").is_err());
        assert!(resolve_id(&records, "zzz").is_err());
    }

    #[test]
    fn test_prompt_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.jsonl");
        let request = GenerationRequest {
            prompt: "quiet harbor".into(),
            style: AiStyle::Photography,
            resolution: TargetResolution::Uhd4k,
            count: 1,
        };
        append_prompt_log(&path, SourceKind::Craiyon, &request, &[record("one")]).unwrap();
        append_prompt_log(&path, SourceKind::MonicaAi, &request, &[record("two")]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["source"], "craiyon");
        assert_eq!(lines[1]["ids"][0], "two");
        assert_eq!(lines[1]["resolution"], "4K");
    }
}
