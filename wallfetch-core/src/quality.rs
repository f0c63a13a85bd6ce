use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use serde::Serialize;

use crate::config::{Config, QualityConfig};
use crate::phash::PerceptualHash;

const DARK_THRESHOLD: f64 = 30.0;
const BRIGHT_THRESHOLD: f64 = 220.0;
const LOW_CONTRAST_THRESHOLD: f64 = 20.0;
const BLUR_THRESHOLD: f64 = 100.0;
const ANALYSIS_SIZE: u32 = 256;
const BLUR_ANALYSIS_SIZE: u32 = 1024;
const DIVERSITY_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub file_size: u64,
    pub format: Option<String>,
    pub mean_brightness: f64,
    pub contrast: f64,
    pub color_diversity: f64,
    pub laplacian_variance: Option<f64>,
}

/// Verdict for one image. `reasons` explain a rejection; `warnings` never
/// reject on their own.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub accepted: bool,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub metrics: Option<ImageMetrics>,
    pub phash: Option<PerceptualHash>,
}

impl QualityReport {
    fn rejected(reason: String, file_size: u64) -> Self {
        let mut reasons = Vec::new();
        if file_size == 0 {
            reasons.push("empty file".to_string());
        }
        reasons.push(reason);
        Self {
            accepted: false,
            reasons,
            warnings: Vec::new(),
            recommendations: Vec::new(),
            metrics: None,
            phash: None,
        }
    }

    pub fn summary(&self) -> String {
        if self.accepted {
            "accepted".into()
        } else {
            self.reasons.join("; ")
        }
    }
}

pub struct QualityFilter {
    config: QualityConfig,
}

impl QualityFilter {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// The filter applied before anything is stored. With
    /// `storage.quality_filter` off only decoding and the duplicate
    /// threshold still apply.
    pub fn for_storage(config: &Config) -> Self {
        if config.storage.quality_filter {
            return Self::new(config.quality.clone());
        }
        Self::new(QualityConfig {
            min_width: 1,
            min_height: 1,
            min_aspect_ratio: 0.0,
            max_aspect_ratio: f64::INFINITY,
            min_file_size: 0,
            max_file_size: u64::MAX,
            ..config.quality.clone()
        })
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Resolution and aspect checks alone; usable on advertised dimensions
    /// before anything is downloaded.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Vec<String> {
        let mut reasons = Vec::new();
        if width < self.config.min_width || height < self.config.min_height {
            reasons.push(format!(
                "resolution too low: {width}x{height} (minimum: {}x{})",
                self.config.min_width, self.config.min_height
            ));
        }
        if height > 0 {
            let ratio = width as f64 / height as f64;
            if ratio < self.config.min_aspect_ratio || ratio > self.config.max_aspect_ratio {
                reasons.push(format!(
                    "invalid aspect ratio: {ratio:.2} (range: {}-{})",
                    self.config.min_aspect_ratio, self.config.max_aspect_ratio
                ));
            }
        }
        reasons
    }

    /// Evaluate raw image bytes against the thresholds and the hashes of
    /// already stored images. Pure: the same input gives the same report.
    pub fn evaluate(&self, data: &[u8], known: &[PerceptualHash]) -> QualityReport {
        let file_size = data.len() as u64;

        let reader = match ImageReader::new(Cursor::new(data)).with_guessed_format() {
            Ok(r) => r,
            Err(e) => return QualityReport::rejected(format!("failed to read image: {e}"), file_size),
        };
        let format = reader.format();
        let img = match reader.decode() {
            Ok(img) => img,
            Err(e) => {
                return QualityReport::rejected(format!("failed to decode image: {e}"), file_size)
            }
        };

        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        if file_size < self.config.min_file_size {
            reasons.push(format!(
                "file too small: {file_size} bytes (minimum: {})",
                self.config.min_file_size
            ));
        }
        if file_size > self.config.max_file_size {
            warnings.push(format!("large file size: {}MB", file_size / (1024 * 1024)));
        }

        let (width, height) = (img.width(), img.height());
        reasons.extend(self.check_dimensions(width, height));

        if !matches!(
            format,
            Some(ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp)
        ) {
            warnings.push(format!("unusual format: {}", format_name(format)));
        }
        if matches!(
            img.color(),
            ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
        ) {
            warnings.push("grayscale image".into());
        }

        let phash = PerceptualHash::from_image(&img);
        if let Some((nearest, distance)) = nearest(phash, known) {
            if distance <= self.config.duplicate_threshold {
                reasons.push(format!(
                    "duplicate image: perceptual distance {distance} to {nearest} (threshold: {})",
                    self.config.duplicate_threshold
                ));
            }
        }

        let (mean_brightness, contrast) = brightness_contrast(&img);
        if mean_brightness < DARK_THRESHOLD {
            warnings.push("image is very dark".into());
        }
        if mean_brightness > BRIGHT_THRESHOLD {
            warnings.push("image is very bright".into());
        }
        if contrast < LOW_CONTRAST_THRESHOLD {
            warnings.push("low contrast image".into());
        }

        let laplacian_variance = self.config.strict.then(|| laplacian_variance(&img));
        if laplacian_variance.is_some_and(|v| v < BLUR_THRESHOLD) {
            warnings.push("image appears blurry".into());
        }

        let metrics = ImageMetrics {
            width,
            height,
            aspect_ratio: if height > 0 { width as f64 / height as f64 } else { 0.0 },
            file_size,
            format: format.map(|f| format_name(Some(f))),
            mean_brightness,
            contrast,
            color_diversity: color_diversity(&img),
            laplacian_variance,
        };

        QualityReport {
            accepted: reasons.is_empty(),
            reasons,
            warnings,
            recommendations: recommendations(&metrics),
            metrics: Some(metrics),
            phash: Some(phash),
        }
    }
}

fn nearest(hash: PerceptualHash, known: &[PerceptualHash]) -> Option<(PerceptualHash, u32)> {
    known
        .iter()
        .map(|k| (*k, hash.distance(*k)))
        .min_by_key(|(_, d)| *d)
}

fn format_name(format: Option<ImageFormat>) -> String {
    match format {
        Some(f) => f
            .extensions_str()
            .first()
            .map(|s| s.to_ascii_uppercase())
            .unwrap_or_else(|| format!("{f:?}")),
        None => "unknown".into(),
    }
}

/// Mean and standard deviation of RGB channels, averaged across channels.
fn brightness_contrast(img: &DynamicImage) -> (f64, f64) {
    let small = img.thumbnail(ANALYSIS_SIZE, ANALYSIS_SIZE).to_rgb8();
    let n = (small.width() * small.height()) as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mut sum = [0f64; 3];
    let mut sum_sq = [0f64; 3];
    for p in small.pixels() {
        for c in 0..3 {
            let v = f64::from(p.0[c]);
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }
    let mut mean_total = 0.0;
    let mut std_total = 0.0;
    for c in 0..3 {
        let mean = sum[c] / n;
        let var = (sum_sq[c] / n - mean * mean).max(0.0);
        mean_total += mean;
        std_total += var.sqrt();
    }
    (mean_total / 3.0, std_total / 3.0)
}

/// Unique colors in a 100x100 reduction, as a fraction of its pixels.
fn color_diversity(img: &DynamicImage) -> f64 {
    let small = img
        .resize_exact(DIVERSITY_SIZE, DIVERSITY_SIZE, FilterType::Triangle)
        .to_rgb8();
    let unique: HashSet<[u8; 3]> = small.pixels().map(|p| p.0).collect();
    (unique.len() as f64 / (DIVERSITY_SIZE * DIVERSITY_SIZE) as f64).min(1.0)
}

/// Variance of the 4-neighbour Laplacian; low values mean few edges.
fn laplacian_variance(img: &DynamicImage) -> f64 {
    let gray = img.thumbnail(BLUR_ANALYSIS_SIZE, BLUR_ANALYSIS_SIZE).to_luma8();
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y).0[0]);
    let mut values = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            values.push(
                4.0 * px(x, y) - px(x - 1, y) - px(x + 1, y) - px(x, y - 1) - px(x, y + 1),
            );
        }
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn recommendations(m: &ImageMetrics) -> Vec<String> {
    let mut out = Vec::new();
    if m.width >= 3840 && m.height >= 2160 {
        out.push("Excellent for 4K displays".to_string());
    } else if m.width >= 2560 && m.height >= 1440 {
        out.push("Great for QHD displays".to_string());
    } else if m.width >= 1920 && m.height >= 1080 {
        out.push("Good for Full HD displays".to_string());
    }

    let ar = m.aspect_ratio;
    if (2.3..=2.4).contains(&ar) {
        out.push("Perfect for ultrawide monitors".to_string());
    } else if (1.7..=1.8).contains(&ar) {
        out.push("Suitable for standard widescreen".to_string());
    } else if (0.55..=0.65).contains(&ar) {
        out.push("Good for mobile wallpapers".to_string());
    }

    if m.contrast > 50.0 {
        out.push("High contrast - great visual impact".to_string());
    }
    if m.color_diversity > 0.3 {
        out.push("Rich color palette".to_string());
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub acceptance_rate: f64,
    pub common_reasons: Vec<(String, usize)>,
    pub common_warnings: Vec<(String, usize)>,
}

impl ValidationSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a QualityReport>) -> Self {
        let mut total = 0;
        let mut accepted = 0;
        let mut reasons: HashMap<String, usize> = HashMap::new();
        let mut warnings: HashMap<String, usize> = HashMap::new();
        for report in reports {
            total += 1;
            if report.accepted {
                accepted += 1;
            }
            for r in &report.reasons {
                *reasons.entry(reason_kind(r)).or_default() += 1;
            }
            for w in &report.warnings {
                *warnings.entry(reason_kind(w)).or_default() += 1;
            }
        }
        Self {
            total,
            accepted,
            rejected: total - accepted,
            acceptance_rate: if total > 0 { accepted as f64 / total as f64 } else { 0.0 },
            common_reasons: top_five(reasons),
            common_warnings: top_five(warnings),
        }
    }
}

/// Strip the per-image detail after the colon so reasons group together.
fn reason_kind(s: &str) -> String {
    s.split(':').next().unwrap_or(s).trim().to_string()
}

fn top_five(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut v: Vec<_> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.truncate(5);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phash::test_images::{blocks, encode, png_blocks};
    use image::RgbImage;

    fn lenient() -> QualityConfig {
        QualityConfig {
            min_width: 640,
            min_height: 360,
            min_file_size: 0,
            ..QualityConfig::default()
        }
    }

    #[test]
    fn test_small_image_rejected_with_resolution_reason() {
        let filter = QualityFilter::new(QualityConfig {
            min_width: 1920,
            min_height: 1080,
            min_file_size: 0,
            ..QualityConfig::default()
        });
        let data = png_blocks(100, 100, 3);
        let report = filter.evaluate(&data, &[]);
        assert!(!report.accepted);
        assert!(
            report.reasons.iter().any(|r| r.contains("resolution too low: 100x100")),
            "{:?}",
            report.reasons
        );
    }

    #[test]
    fn test_anything_below_minimum_is_rejected() {
        let filter = QualityFilter::new(lenient());
        for (w, h) in [(639, 360), (640, 359), (320, 180), (1, 1)] {
            let report = filter.evaluate(&png_blocks(w, h, 9), &[]);
            assert!(!report.accepted, "{w}x{h} accepted");
        }
        assert!(!filter.check_dimensions(639, 360).is_empty());
        assert!(filter.check_dimensions(640, 360).is_empty());
    }

    #[test]
    fn test_good_image_accepted() {
        let filter = QualityFilter::new(lenient());
        let report = filter.evaluate(&png_blocks(640, 360, 11), &[]);
        assert!(report.accepted, "{:?}", report.reasons);
        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.width, 640);
        assert_eq!(metrics.format.as_deref(), Some("PNG"));
        assert!(report.phash.is_some());
    }

    #[test]
    fn test_duplicate_rejected() {
        let filter = QualityFilter::new(lenient());
        let data = png_blocks(640, 360, 5);
        let first = filter.evaluate(&data, &[]);
        let known = vec![first.phash.unwrap()];

        let again = filter.evaluate(&data, &known);
        assert!(!again.accepted);
        assert!(again.reasons.iter().any(|r| r.starts_with("duplicate image")));

        // rescaled copy of the same picture
        let larger = encode(&blocks(1280, 720, 5), ImageFormat::Png);
        assert!(!filter.evaluate(&larger, &known).accepted);

        let other = filter.evaluate(&png_blocks(640, 360, 6), &known);
        assert!(other.accepted, "{:?}", other.reasons);
    }

    #[test]
    fn test_aspect_ratio_rejected() {
        let filter = QualityFilter::new(lenient());
        let report = filter.evaluate(&png_blocks(1600, 400, 1), &[]);
        assert!(!report.accepted);
        assert!(report.reasons.iter().any(|r| r.starts_with("invalid aspect ratio")));
    }

    #[test]
    fn test_file_size_floor() {
        let filter = QualityFilter::new(QualityConfig {
            min_width: 640,
            min_height: 360,
            ..QualityConfig::default()
        });
        // flat blocks compress to far less than 50KB
        let report = filter.evaluate(&png_blocks(640, 360, 2), &[]);
        assert!(!report.accepted);
        assert!(report.reasons.iter().any(|r| r.starts_with("file too small")));
    }

    #[test]
    fn test_garbage_rejected() {
        let filter = QualityFilter::new(lenient());
        let report = filter.evaluate(b"<html>rate limited</html>", &[]);
        assert!(!report.accepted);
        assert!(report.metrics.is_none());
        assert!(report.phash.is_none());
    }

    #[test]
    fn test_dark_flat_image_warnings() {
        let filter = QualityFilter::new(QualityConfig {
            strict: true,
            ..lenient()
        });
        let black = DynamicImage::ImageRgb8(RgbImage::new(640, 360));
        let report = filter.evaluate(&encode(&black, ImageFormat::Png), &[]);
        assert!(report.accepted);
        assert!(report.warnings.contains(&"image is very dark".to_string()));
        assert!(report.warnings.contains(&"low contrast image".to_string()));
        assert!(report.warnings.contains(&"image appears blurry".to_string()));
    }

    #[test]
    fn test_recommendations() {
        let m = ImageMetrics {
            width: 3840,
            height: 2160,
            aspect_ratio: 3840.0 / 2160.0,
            file_size: 1,
            format: None,
            mean_brightness: 100.0,
            contrast: 60.0,
            color_diversity: 0.5,
            laplacian_variance: None,
        };
        let recs = recommendations(&m);
        assert_eq!(
            recs,
            vec![
                "Excellent for 4K displays",
                "Suitable for standard widescreen",
                "High contrast - great visual impact",
                "Rich color palette",
            ]
        );
    }

    #[test]
    fn test_summary() {
        let filter = QualityFilter::new(lenient());
        let reports = vec![
            filter.evaluate(&png_blocks(640, 360, 1), &[]),
            filter.evaluate(&png_blocks(100, 100, 1), &[]),
            filter.evaluate(&png_blocks(200, 100, 1), &[]),
            filter.evaluate(b"junk", &[]),
        ];
        let summary = ValidationSummary::from_reports(&reports);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 3);
        assert!((summary.acceptance_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(summary.common_reasons[0], ("resolution too low".to_string(), 2));
    }
}
