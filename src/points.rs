//! LiDAR point set and its rasterization into a canopy height grid.

use serde::{Deserialize, Serialize};

use crate::error::{CrownError, Result};
use crate::raster::Raster;

/// A height-normalized LiDAR return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Immutable point set tagged with its coordinate reference system.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub points: Vec<Point3>,
    pub crs: Option<String>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points, crs: None }
    }

    pub fn with_crs(mut self, crs: Option<String>) -> Self {
        self.crs = crs;
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// (xmin, ymin, xmax, ymax) over finite points.
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.points
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .fold(None, |acc, p| match acc {
                None => Some((p.x, p.y, p.x, p.y)),
                Some((a, b, c, d)) => Some((a.min(p.x), b.min(p.y), c.max(p.x), d.max(p.y))),
            })
    }

    /// Highest-return surface: each cell holds the maximum z of the points
    /// falling in it, empty cells hold 0. The extent is the points' bounding
    /// box snapped outward to multiples of `resolution`.
    pub fn rasterize(&self, resolution: f64) -> Result<Raster> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(CrownError::config(format!(
                "raster resolution must be positive, got {resolution}"
            )));
        }
        let (bx0, by0, bx1, by1) = self
            .bbox()
            .ok_or_else(|| CrownError::degenerate("point cloud has no finite point"))?;

        let xmin = (bx0 / resolution).floor() * resolution;
        let ymax = (by1 / resolution).ceil() * resolution;
        let ncol = ((bx1 - xmin) / resolution).floor() as usize + 1;
        let nrow = ((ymax - by0) / resolution).floor() as usize + 1;

        let mut surface = vec![f64::NEG_INFINITY; nrow * ncol];
        for p in &self.points {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                continue;
            }
            let col = (((p.x - xmin) / resolution).floor() as usize).min(ncol - 1);
            let row = (((ymax - p.y) / resolution).floor() as usize).min(nrow - 1);
            let cell = &mut surface[row * ncol + col];
            if p.z > *cell {
                *cell = p.z;
            }
        }
        for v in surface.iter_mut() {
            if *v == f64::NEG_INFINITY {
                *v = 0.0;
            }
        }

        Ok(Raster::try_from_vec(nrow, ncol, surface)?
            .with_extent(
                xmin,
                xmin + ncol as f64 * resolution,
                ymax - nrow as f64 * resolution,
                ymax,
            )
            .with_crs(self.crs.clone()))
    }
}
