//! # Perceptual Fingerprinting
//!
//! DCT-based perceptual hash (pHash) for images and single video frames.
//!
//! ## Algorithm
//!
//! 1. Convert to grayscale
//! 2. Resize to `N·F × N·F` (N = grid size, F = DCT oversampling factor)
//! 3. Apply a separable 2D DCT-II
//! 4. Keep the top-left `N × N` low-frequency block
//! 5. Emit one bit per coefficient: 1 when it is strictly above the block median
//!
//! Bits are ordered row-major, first coefficient most significant, so the
//! default 8×8 grid yields the usual 64-bit pHash.
//!
//! ## Hamming Distance Interpretation
//!
//! For 64-bit fingerprints:
//!
//! - 0-3: Nearly identical (re-encodes, small resizes)
//! - 4-10: Similar (same subject, light edits)
//! - >10: Different images

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use rustdct::{Dct2, DctPlanner};

use super::types::Fingerprint;

/// Inputs larger than this multiple of the DCT side are box-filtered down
/// before the Lanczos resize
const PRESHRINK_FACTOR: u32 = 8;

/// Largest DCT input side (`grid_size * dct_factor`) a config may ask for
pub const MAX_DCT_SIDE: u32 = 512;

/// Calculate the perceptual fingerprint of a decoded image.
///
/// The DCT side is capped at [`MAX_DCT_SIDE`] and never drops below the grid.
pub fn fingerprint_image(img: &DynamicImage, grid_size: u32, dct_factor: u32) -> Fingerprint {
    let grid_size = grid_size.clamp(1, MAX_DCT_SIDE);
    let side = grid_size
        .checked_mul(dct_factor)
        .map_or(MAX_DCT_SIDE, |side| side.min(MAX_DCT_SIDE))
        .max(grid_size);
    let n = side as usize;
    let grid = grid_size as usize;

    let (width, height) = img.dimensions();
    let limit = side * PRESHRINK_FACTOR;
    let gray = if width > limit || height > limit {
        img.thumbnail(limit, limit).grayscale()
    } else {
        img.grayscale()
    };

    let small = gray.resize_exact(side, side, FilterType::Lanczos3).to_luma8();
    let mut coefficients: Vec<f64> = small.pixels().map(|p| p[0] as f64).collect();

    dct_2d(&mut coefficients, n);

    let mut low = Vec::with_capacity(grid * grid);
    for row in coefficients.chunks_exact(n).take(grid) {
        low.extend_from_slice(&row[..grid]);
    }

    let median = median(&low);
    let bits: Vec<bool> = low.iter().map(|&c| c > median).collect();

    Fingerprint::from_bits(&bits)
}

/// In-place 2D DCT-II over a row-major `n × n` buffer
fn dct_2d(buffer: &mut [f64], n: usize) {
    let mut planner = DctPlanner::<f64>::new();
    let dct = planner.plan_dct2(n);

    for row in buffer.chunks_exact_mut(n) {
        dct.process_dct2(row);
    }

    transpose(buffer, n);
    for column in buffer.chunks_exact_mut(n) {
        dct.process_dct2(column);
    }
    transpose(buffer, n);
}

fn transpose(buffer: &mut [f64], n: usize) {
    for y in 0..n {
        for x in (y + 1)..n {
            buffer.swap(y * n + x, x * n + y);
        }
    }
}

/// Median with the two middle values averaged for even lengths
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
