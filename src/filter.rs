//! Height grid pre-processing: 3×3 median or Gaussian smoothing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::raster::Raster;

/// Smoothing applied to the height grid before seed detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Smoothing {
    None,
    /// 3×3 median filter.
    #[default]
    Median,
    /// Separable Gaussian, sigma in pixels.
    Gaussian { sigma: f64 },
}

impl Smoothing {
    pub fn apply(&self, grid: &Raster) -> Raster {
        match *self {
            Smoothing::None => grid.clone(),
            Smoothing::Median => median_filter(grid, 3),
            Smoothing::Gaussian { sigma } => gaussian_smooth(grid, sigma),
        }
    }
}

/// Median filter on a raster (square kernel of size `ksize × ksize`).
///
/// Out-of-grid and NaN cells are left out of the kernel, so borders use a
/// truncated neighbourhood.
pub fn median_filter(grid: &Raster, ksize: usize) -> Raster {
    let half = (ksize / 2) as isize;
    let mut out = grid.like(f64::NAN);

    let mut buf = Vec::with_capacity(ksize * ksize);
    for r in 0..grid.nrow {
        for c in 0..grid.ncol {
            buf.clear();
            for dr in -half..=half {
                for dc in -half..=half {
                    if let Some(v) = grid.get_opt(r as isize + dr, c as isize + dc) {
                        buf.push(v);
                    }
                }
            }
            if !buf.is_empty() {
                buf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                out.set(r, c, buf[buf.len() / 2]);
            }
        }
    }
    out
}

/// Gaussian smoothing (2D separable). `sigma` in pixels.
pub fn gaussian_smooth(grid: &Raster, sigma: f64) -> Raster {
    if sigma <= 0.0 {
        return grid.clone();
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| {
            let x = i as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let horizontal = convolve_1d(grid, &kernel, radius, (0, 1));
    convolve_1d(&horizontal, &kernel, radius, (1, 0))
}

/// One separable pass along `(dr, dc)`; weights are renormalised where the
/// kernel leaves the grid.
fn convolve_1d(grid: &Raster, kernel: &[f64], radius: isize, (dr, dc): (isize, isize)) -> Raster {
    let mut out = grid.clone();
    for r in 0..grid.nrow {
        for c in 0..grid.ncol {
            if grid.get(r, c).is_nan() {
                continue;
            }
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for (ki, d) in (-radius..=radius).enumerate() {
                if let Some(v) = grid.get_opt(r as isize + d * dr, c as isize + d * dc) {
                    sum += v * kernel[ki];
                    wsum += kernel[ki];
                }
            }
            if wsum > 0.0 {
                out.set(r, c, sum / wsum);
            }
        }
    }
    out
}
