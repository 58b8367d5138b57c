//! Difference-hash fingerprint over a 9x8 resampled grid.
//!
//! The resampling, rounding and luma steps are fixed so that a desktop
//! decoder and the mobile client produce fingerprints within the
//! comparator's tolerance for the same photo.

use crate::error::{EngineError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const GRID_WIDTH: usize = 9;
const GRID_HEIGHT: usize = 8;

/// Number of bytes in a fingerprint.
pub const FINGERPRINT_BYTES: usize = 8;

/// A view over caller-owned pixel bytes, borrowed for the duration of one
/// fingerprint computation.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    width: usize,
    height: usize,
    channels: usize,
    data: &'a [u8],
}

impl<'a> PixelBuffer<'a> {
    /// Wrap row-major pixel bytes. `channels` must be 3 (RGB) or 4 (RGBA).
    pub fn new(width: usize, height: usize, channels: usize, data: &'a [u8]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::invalid_image(format!(
                "zero-area buffer ({}x{})",
                width, height
            )));
        }
        if channels != 3 && channels != 4 {
            return Err(EngineError::invalid_image(format!(
                "unsupported channel count {}",
                channels
            )));
        }
        let expected = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or_else(|| EngineError::invalid_image("buffer dimensions overflow"))?;
        if data.len() != expected {
            return Err(EngineError::invalid_image(format!(
                "expected {} bytes for {}x{}x{}, got {}",
                expected,
                width,
                height,
                channels,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// View a decoded RGBA image without copying it.
    pub fn from_rgba(image: &'a image::RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width as usize, height as usize, 4, image.as_raw())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn channel(&self, x: usize, y: usize, c: usize) -> f64 {
        f64::from(self.data[(y * self.width + x) * self.channels + c])
    }
}

/// 64-bit perceptual fingerprint, serialized as 16 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_BYTES]);

impl Fingerprint {
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != FINGERPRINT_BYTES * 2 {
            return Err(EngineError::argument(format!(
                "fingerprint must be {} hex characters, got {}",
                FINGERPRINT_BYTES * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; FINGERPRINT_BYTES];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| EngineError::argument(format!("invalid fingerprint {:?}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the fingerprint of a pixel buffer. Deterministic for identical input.
///
/// Degenerate input is rejected when the `PixelBuffer` is built, so a buffer
/// that exists always yields a full 64-bit fingerprint.
pub fn compute_fingerprint(buffer: &PixelBuffer<'_>) -> Result<Fingerprint> {
    let gray = grayscale_grid(buffer);

    let mut bytes = [0u8; FINGERPRINT_BYTES];
    let mut bit_index = 0;
    for row in gray.iter() {
        for x in 0..GRID_WIDTH - 1 {
            if row[x] < row[x + 1] {
                bytes[bit_index / 8] |= 1 << (7 - bit_index % 8);
            }
            bit_index += 1;
        }
    }

    Ok(Fingerprint(bytes))
}

/// Resample to the 9x8 grid and reduce every cell to BT.601 luma.
fn grayscale_grid(buffer: &PixelBuffer<'_>) -> [[u32; GRID_WIDTH]; GRID_HEIGHT] {
    let x_ratio = (buffer.width - 1) as f64 / (GRID_WIDTH - 1) as f64;
    let y_ratio = (buffer.height - 1) as f64 / (GRID_HEIGHT - 1) as f64;

    let mut gray = [[0u32; GRID_WIDTH]; GRID_HEIGHT];
    for (y, row) in gray.iter_mut().enumerate() {
        let src_y = y as f64 * y_ratio;
        let y1 = (src_y.floor() as usize).min(buffer.height - 1);
        let y2 = (y1 + 1).min(buffer.height - 1);
        let y_weight = src_y - y1 as f64;

        for (x, cell) in row.iter_mut().enumerate() {
            let src_x = x as f64 * x_ratio;
            let x1 = (src_x.floor() as usize).min(buffer.width - 1);
            let x2 = (x1 + 1).min(buffer.width - 1);
            let x_weight = src_x - x1 as f64;

            let mut rgb = [0u32; 3];
            for (c, value) in rgb.iter_mut().enumerate() {
                let top = buffer.channel(x1, y1, c) * (1.0 - x_weight)
                    + buffer.channel(x2, y1, c) * x_weight;
                let bottom = buffer.channel(x1, y2, c) * (1.0 - x_weight)
                    + buffer.channel(x2, y2, c) * x_weight;
                let interpolated = top * (1.0 - y_weight) + bottom * y_weight;
                *value = round_half_up(interpolated);
            }

            *cell = (rgb[0] * 299 + rgb[1] * 587 + rgb[2] * 114) / 1000;
        }
    }

    gray
}

fn round_half_up(value: f64) -> u32 {
    (value + 0.5).floor().clamp(0.0, 255.0) as u32
}

/// Decode and fingerprint every file in parallel. Results keep input order.
pub fn fingerprint_files(paths: &[PathBuf]) -> Vec<(PathBuf, Result<Fingerprint>)> {
    paths
        .par_iter()
        .map(|path| (path.clone(), fingerprint_file(path)))
        .collect()
}

/// Decode a single image file and fingerprint it.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let image = crate::core::image::load_rgba(path)?;
    compute_fingerprint(&PixelBuffer::from_rgba(&image)?)
}
