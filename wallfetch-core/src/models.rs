use serde::{Deserialize, Serialize};

use crate::phash::PerceptualHash;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SourceType(String);

impl SourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Storage category; each one owns a subfolder of the wallpaper directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Curated,
    AiGenerated,
    Community,
    PublicDomain,
}

impl Category {
    pub const ALL: &[Category] = &[
        Category::Curated,
        Category::AiGenerated,
        Category::Community,
        Category::PublicDomain,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::AiGenerated => "ai_generated",
            Self::Community => "community",
            Self::PublicDomain => "public_domain",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "curated" => Ok(Self::Curated),
            "ai_generated" | "ai" => Ok(Self::AiGenerated),
            "community" => Ok(Self::Community),
            "public_domain" => Ok(Self::PublicDomain),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Built-in source identifiers, as used for keys under `sources` in the config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Wallhaven,
    Reddit,
    Wikimedia,
    Nasa,
    MonicaAi,
    Craiyon,
    StableDiffusion,
}

impl SourceKind {
    pub const ALL: &[SourceKind] = &[
        SourceKind::Wallhaven,
        SourceKind::Reddit,
        SourceKind::Wikimedia,
        SourceKind::Nasa,
        SourceKind::MonicaAi,
        SourceKind::Craiyon,
        SourceKind::StableDiffusion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wallhaven => "wallhaven",
            Self::Reddit => "reddit",
            Self::Wikimedia => "wikimedia",
            Self::Nasa => "nasa",
            Self::MonicaAi => "monica_ai",
            Self::Craiyon => "craiyon",
            Self::StableDiffusion => "stable_diffusion",
        }
    }

    pub fn category(self) -> Category {
        match self {
            Self::Wallhaven => Category::Curated,
            Self::Reddit => Category::Community,
            Self::Wikimedia | Self::Nasa => Category::PublicDomain,
            Self::MonicaAi | Self::Craiyon | Self::StableDiffusion => Category::AiGenerated,
        }
    }

    pub fn is_generator(self) -> bool {
        self.category() == Category::AiGenerated
    }

    pub fn source_type(self) -> SourceType {
        SourceType::new(self.as_str())
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown source: {s}"))
    }
}

/// A stored wallpaper. Created once on a successful download and never
/// updated; removed by the retention sweep or an explicit remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallpaperRecord {
    /// SHA-256 of the file contents.
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub category: Category,
    pub file_path: String,
    pub width: u32,
    pub height: u32,
    pub phash: PerceptualHash,
    pub downloaded_at: String,
}

/// Candidate image returned by a source search. `full_url` may be a
/// `data:` URI for generated images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallpaperPreview {
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub source_url: String,
    pub full_url: String,
    pub width: u32,
    pub height: u32,
    pub tags: Vec<String>,
}

impl WallpaperPreview {
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub source_id: String,
    pub source: SourceType,
    pub reason: String,
    pub rejected_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiStyle {
    Photography,
    DigitalArt,
    Abstract,
    Minimal,
}

impl AiStyle {
    pub const ALL: &[AiStyle] = &[
        AiStyle::Photography,
        AiStyle::DigitalArt,
        AiStyle::Abstract,
        AiStyle::Minimal,
    ];
}

impl std::fmt::Display for AiStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Photography => write!(f, "photography"),
            Self::DigitalArt => write!(f, "digital_art"),
            Self::Abstract => write!(f, "abstract"),
            Self::Minimal => write!(f, "minimal"),
        }
    }
}

impl std::str::FromStr for AiStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "photography" | "photo" => Ok(Self::Photography),
            "digital_art" | "art" => Ok(Self::DigitalArt),
            "abstract" => Ok(Self::Abstract),
            "minimal" => Ok(Self::Minimal),
            other => Err(format!("unknown style: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetResolution {
    #[serde(rename = "mobile")]
    Mobile,
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "1440p")]
    Qhd1440,
    #[serde(rename = "4K")]
    Uhd4k,
    #[serde(rename = "ultrawide")]
    Ultrawide,
}

impl TargetResolution {
    pub const ALL: &[TargetResolution] = &[
        TargetResolution::Mobile,
        TargetResolution::Hd1080,
        TargetResolution::Qhd1440,
        TargetResolution::Uhd4k,
        TargetResolution::Ultrawide,
    ];

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Mobile => (1080, 1920),
            Self::Hd1080 => (1920, 1080),
            Self::Qhd1440 => (2560, 1440),
            Self::Uhd4k => (3840, 2160),
            Self::Ultrawide => (3440, 1440),
        }
    }
}

impl std::fmt::Display for TargetResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mobile => write!(f, "mobile"),
            Self::Hd1080 => write!(f, "1080p"),
            Self::Qhd1440 => write!(f, "1440p"),
            Self::Uhd4k => write!(f, "4K"),
            Self::Ultrawide => write!(f, "ultrawide"),
        }
    }
}

impl std::str::FromStr for TargetResolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(Self::Mobile),
            "1080p" => Ok(Self::Hd1080),
            "1440p" => Ok(Self::Qhd1440),
            "4k" => Ok(Self::Uhd4k),
            "ultrawide" => Ok(Self::Ultrawide),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}
