use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, WallfetchError};
use crate::models::{AiStyle, SourceKind, TargetResolution};
use crate::paths::{default_wallpaper_dir, WallfetchPaths};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub quality: QualityConfig,
    pub ai: AiConfig,
    /// Raw per-source objects keyed by source type. Each source crate reads
    /// its own keys; the shared ones resolve through [`Config::source_settings`].
    pub sources: Map<String, Value>,
    pub prompt_templates: Vec<PromptTemplate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            quality: QualityConfig::default(),
            ai: AiConfig::default(),
            sources: Map::new(),
            prompt_templates: default_templates(),
        }
    }
}

impl Config {
    /// Load from the per-user config file. A missing file yields defaults;
    /// an unreadable, malformed or invalid one is an error.
    pub fn load(paths: &WallfetchPaths) -> Result<Self> {
        let path = paths.config_file();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WallfetchError::Config(format!("failed to read {}: {e}", path.display())))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| WallfetchError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.merge_default_templates();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, paths: &WallfetchPaths) -> Result<()> {
        self.save_to(&paths.config_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| WallfetchError::Config(format!("failed to serialize config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| WallfetchError::Config(format!("failed to write {}: {e}", path.display())))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.max_total_wallpapers == 0 {
            return Err(WallfetchError::invalid_config(
                "storage.max_total_wallpapers",
                "must be greater than 0",
            ));
        }
        let q = &self.quality;
        if q.min_width == 0 || q.min_height == 0 {
            return Err(WallfetchError::invalid_config(
                "quality.min_width",
                "minimum dimensions must be greater than 0",
            ));
        }
        if q.min_aspect_ratio <= 0.0 || q.min_aspect_ratio >= q.max_aspect_ratio {
            return Err(WallfetchError::invalid_config(
                "quality.min_aspect_ratio",
                format!(
                    "aspect band {}..{} is empty",
                    q.min_aspect_ratio, q.max_aspect_ratio
                ),
            ));
        }
        if q.min_file_size > q.max_file_size {
            return Err(WallfetchError::invalid_config(
                "quality.min_file_size",
                "must not exceed quality.max_file_size",
            ));
        }
        if q.duplicate_threshold > 64 {
            return Err(WallfetchError::invalid_config(
                "quality.duplicate_threshold",
                "a 64-bit hash distance cannot exceed 64",
            ));
        }
        for kind in SourceKind::ALL {
            let settings = self.resolve_source_settings(*kind)?;
            if settings.rate_limit_delay < 0.0 || !settings.rate_limit_delay.is_finite() {
                return Err(WallfetchError::invalid_config(
                    format!("sources.{kind}.rate_limit_delay"),
                    "must be a non-negative number of seconds",
                ));
            }
        }
        Ok(())
    }

    /// Set a single value by dotted key (`storage.max_total_wallpapers`,
    /// `sources.reddit.enabled`). The value is parsed as JSON, falling back
    /// to a plain string. The config is left untouched on error.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let value: Value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        let segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Err(WallfetchError::invalid_config(key, "empty key"));
        };

        let mut doc = serde_json::to_value(&*self)?;
        let free_form = segments.first() == Some(&"sources");
        let mut cursor = &mut doc;
        for seg in parents {
            let obj = cursor
                .as_object_mut()
                .ok_or_else(|| WallfetchError::invalid_config(key, format!("`{seg}` is not a section")))?;
            if !obj.contains_key(*seg) {
                if !free_form {
                    return Err(WallfetchError::invalid_config(key, "unknown key"));
                }
                obj.insert((*seg).to_string(), Value::Object(Map::new()));
            }
            cursor = obj
                .get_mut(*seg)
                .ok_or_else(|| WallfetchError::invalid_config(key, "unknown key"))?;
        }
        let obj = cursor
            .as_object_mut()
            .ok_or_else(|| WallfetchError::invalid_config(key, "parent is not a section"))?;
        if !free_form && !obj.contains_key(*last) {
            return Err(WallfetchError::invalid_config(key, "unknown key"));
        }
        obj.insert((*last).to_string(), value);

        let updated: Config = serde_json::from_value(doc)
            .map_err(|e| WallfetchError::invalid_config(key, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Raw config object for a source, if present.
    pub fn source_table(&self, name: &str) -> Option<&Map<String, Value>> {
        self.sources.get(name).and_then(Value::as_object)
    }

    /// Shared settings for a built-in source: its defaults overlaid with
    /// whatever keys the config sets. Malformed entries fall back to defaults.
    pub fn source_settings(&self, kind: SourceKind) -> SourceSettings {
        self.resolve_source_settings(kind).unwrap_or_else(|e| {
            warn!(source = %kind, "ignoring malformed source settings: {e}");
            SourceSettings::defaults_for(kind)
        })
    }

    fn resolve_source_settings(&self, kind: SourceKind) -> Result<SourceSettings> {
        let defaults = SourceSettings::defaults_for(kind);
        let Some(table) = self.source_table(kind.as_str()) else {
            return Ok(defaults);
        };
        let mut merged = serde_json::to_value(&defaults)?;
        if let Some(obj) = merged.as_object_mut() {
            for (k, v) in table {
                if obj.contains_key(k) {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }
        serde_json::from_value(merged).map_err(|e| {
            WallfetchError::invalid_config(format!("sources.{kind}"), e.to_string())
        })
    }

    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .iter()
            .copied()
            .filter(|k| self.source_settings(*k).enabled)
            .collect()
    }

    /// Enabled sources, highest priority first.
    pub fn sources_by_priority(&self) -> Vec<SourceKind> {
        let mut kinds = self.enabled_sources();
        kinds.sort_by_key(|k| std::cmp::Reverse(self.source_settings(*k).priority));
        kinds
    }

    /// Add a template, replacing any existing one with the same name.
    pub fn add_prompt_template(&mut self, template: PromptTemplate) {
        self.prompt_templates.retain(|t| t.name != template.name);
        self.prompt_templates.push(template);
    }

    pub fn remove_prompt_template(&mut self, name: &str) -> bool {
        let before = self.prompt_templates.len();
        self.prompt_templates.retain(|t| t.name != name);
        self.prompt_templates.len() < before
    }

    pub fn templates_by_category(&self, category: &str) -> Vec<&PromptTemplate> {
        self.prompt_templates
            .iter()
            .filter(|t| t.category == category)
            .collect()
    }

    pub fn find_template(&self, name: &str) -> Option<&PromptTemplate> {
        self.prompt_templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn merge_default_templates(&mut self) {
        for template in default_templates() {
            if !self.prompt_templates.iter().any(|t| t.name == template.name) {
                self.prompt_templates.push(template);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_path: PathBuf,
    pub max_total_wallpapers: u32,
    pub cleanup_enabled: bool,
    pub duplicate_detection: bool,
    pub quality_filter: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_wallpaper_dir(),
            max_total_wallpapers: 1000,
            cleanup_enabled: true,
            duplicate_detection: true,
            quality_filter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub min_file_size: u64,
    pub max_file_size: u64,
    /// Hashes at or below this Hamming distance count as duplicates.
    pub duplicate_threshold: u32,
    pub strict: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_width: 1280,
            min_height: 720,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 3.5,
            min_file_size: 50 * 1024,
            max_file_size: 50 * 1024 * 1024,
            duplicate_threshold: 5,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub default_style: AiStyle,
    pub default_resolution: TargetResolution,
    pub content_filter: bool,
    pub max_generations_per_day: u32,
    pub save_prompts: bool,
    pub auto_enhance_prompts: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_style: AiStyle::Photography,
            default_resolution: TargetResolution::Uhd4k,
            content_filter: true,
            max_generations_per_day: 20,
            save_prompts: true,
            auto_enhance_prompts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub enabled: bool,
    /// 1-10, higher first.
    pub priority: u8,
    /// Seconds between requests.
    pub rate_limit_delay: f64,
    pub max_downloads_per_session: u32,
    pub categories: Vec<String>,
}

impl SourceSettings {
    pub fn defaults_for(kind: SourceKind) -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match kind {
            SourceKind::Wallhaven => Self {
                enabled: true,
                priority: 9,
                rate_limit_delay: 60.0 / 45.0,
                max_downloads_per_session: 20,
                categories: strings(&["nature", "landscape", "space"]),
            },
            SourceKind::MonicaAi | SourceKind::Craiyon => Self {
                enabled: true,
                priority: 8,
                rate_limit_delay: 3.0,
                max_downloads_per_session: 5,
                categories: strings(&["nature", "abstract", "minimal"]),
            },
            SourceKind::StableDiffusion => Self {
                enabled: false,
                priority: 7,
                rate_limit_delay: 5.0,
                max_downloads_per_session: 3,
                categories: strings(&["any"]),
            },
            SourceKind::Reddit | SourceKind::Wikimedia | SourceKind::Nasa => Self {
                enabled: true,
                priority: 6,
                rate_limit_delay: 2.0,
                max_downloads_per_session: 10,
                categories: strings(&["nature", "space"]),
            },
        }
    }

    pub fn delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.rate_limit_delay.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub prompt: String,
    pub style: AiStyle,
    #[serde(default = "default_template_category")]
    pub category: String,
}

fn default_template_category() -> String {
    "custom".into()
}

fn default_templates() -> Vec<PromptTemplate> {
    let t = |name: &str, prompt: &str, style: AiStyle, category: &str| PromptTemplate {
        name: name.into(),
        prompt: prompt.into(),
        style,
        category: category.into(),
    };
    vec![
        t(
            "Nature Landscape",
            "beautiful mountain landscape with lake reflection at sunset",
            AiStyle::Photography,
            "nature",
        ),
        t(
            "Space Nebula",
            "colorful nebula in deep space with stars and cosmic dust",
            AiStyle::DigitalArt,
            "space",
        ),
        t(
            "Abstract Geometric",
            "geometric shapes in gradient colors, modern abstract design",
            AiStyle::Abstract,
            "abstract",
        ),
        t(
            "Minimal Ocean",
            "calm ocean horizon line, minimalist composition",
            AiStyle::Minimal,
            "minimal",
        ),
        t(
            "Forest Path",
            "sunlit forest path with tall trees and dappled light",
            AiStyle::Photography,
            "nature",
        ),
        t(
            "City Skyline",
            "modern city skyline at night with illuminated buildings",
            AiStyle::Photography,
            "urban",
        ),
        t(
            "Abstract Flow",
            "flowing liquid abstract shapes in blue and purple gradients",
            AiStyle::Abstract,
            "abstract",
        ),
        t(
            "Desert Dunes",
            "sand dunes with dramatic shadows and golden light",
            AiStyle::Photography,
            "nature",
        ),
    ]
}
