//! 64-bit DCT perceptual hash.
//!
//! The image is reduced to 32x32 grayscale, transformed with a 2-D DCT-II,
//! and the top-left 8x8 block of low frequencies is compared against its
//! median: one bit per coefficient, set when the coefficient is above it.
//! Near-identical images (re-encoded, rescaled) land within a few bits of
//! each other.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WallfetchError};

const SAMPLE_SIZE: usize = 32;
const LOW_FREQ: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance, 0..=64.
    pub fn distance(self, other: PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()?;
        Ok(Self::from_image(&img))
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let gray = img.to_luma8();
        let small = imageops::resize(
            &gray,
            SAMPLE_SIZE as u32,
            SAMPLE_SIZE as u32,
            FilterType::Lanczos3,
        );
        let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0])).collect();
        let coeffs = dct_2d(&pixels);

        let mut low = [0f64; LOW_FREQ * LOW_FREQ];
        for y in 0..LOW_FREQ {
            for x in 0..LOW_FREQ {
                low[y * LOW_FREQ + x] = coeffs[y * SAMPLE_SIZE + x];
            }
        }

        let median = median(&low);
        let bits = low
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > median)
            .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
        Self(bits)
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = WallfetchError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 16 {
            return Err(WallfetchError::InvalidImage(format!(
                "perceptual hash must be 16 hex digits, got {s:?}"
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| WallfetchError::InvalidImage(format!("bad perceptual hash {s:?}: {e}")))
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = WallfetchError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PerceptualHash> for String {
    fn from(h: PerceptualHash) -> Self {
        h.to_string()
    }
}

fn dct_2d(pixels: &[f64]) -> Vec<f64> {
    let n = SAMPLE_SIZE;
    let table = cos_table();

    // rows, then columns
    let mut rows = vec![0f64; n * n];
    for y in 0..n {
        for k in 0..n {
            rows[y * n + k] = (0..n).map(|x| pixels[y * n + x] * table[k * n + x]).sum();
        }
    }

    let mut out = vec![0f64; n * n];
    for x in 0..n {
        for k in 0..n {
            out[k * n + x] = (0..n).map(|y| rows[y * n + x] * table[k * n + y]).sum();
        }
    }
    out
}

/// `table[k * n + i] = cos(pi * (2i + 1) * k / 2n)`
fn cos_table() -> Vec<f64> {
    let n = SAMPLE_SIZE;
    let mut table = vec![0f64; n * n];
    for k in 0..n {
        for i in 0..n {
            table[k * n + i] =
                (std::f64::consts::PI * (2 * i + 1) as f64 * k as f64 / (2 * n) as f64).cos();
        }
    }
    table
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    /// 8x8 grid of pseudo-random colored blocks; different seeds give
    /// visually unrelated images.
    pub fn blocks(width: u32, height: u32, seed: u64) -> DynamicImage {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut colors = [[0u8; 3]; 64];
        for c in colors.iter_mut() {
            for ch in c.iter_mut() {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                *ch = (state >> 56) as u8;
            }
        }
        let img = RgbImage::from_fn(width, height, |x, y| {
            let bx = (x * 8 / width) as usize;
            let by = (y * 8 / height) as usize;
            image::Rgb(colors[by * 8 + bx])
        });
        DynamicImage::ImageRgb8(img)
    }

    pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    pub fn png_blocks(width: u32, height: u32, seed: u64) -> Vec<u8> {
        encode(&blocks(width, height, seed), ImageFormat::Png)
    }
}
