//! Georeferenced 2D height grid.

use crate::error::{CrownError, Result};

/// A 2D raster (row-major). Origin is top-left.
///
/// Geo-referencing: pixel (r, c) maps to world coordinates:
///   x = xmin + (c + 0.5) * res_x
///   y = ymax - (r + 0.5) * res_y
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub nrow: usize,
    pub ncol: usize,
    pub data: Vec<f64>,
    /// Resolution in X direction (cell width)
    pub res_x: f64,
    /// Resolution in Y direction (cell height)
    pub res_y: f64,
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    /// Opaque coordinate reference system tag (e.g. "EPSG:2154"), carried through untouched.
    pub crs: Option<String>,
}

impl Raster {
    /// Create a new raster filled with a constant value, unit cells, origin at (0, 0).
    pub fn new(nrow: usize, ncol: usize, fill: f64) -> Self {
        Self {
            nrow,
            ncol,
            data: vec![fill; nrow * ncol],
            res_x: 1.0,
            res_y: 1.0,
            xmin: 0.0,
            xmax: ncol as f64,
            ymin: 0.0,
            ymax: nrow as f64,
            crs: None,
        }
    }

    /// Create a raster from row-major data, rejecting empty or mismatched input.
    pub fn try_from_vec(nrow: usize, ncol: usize, data: Vec<f64>) -> Result<Self> {
        if nrow == 0 || ncol == 0 {
            return Err(CrownError::degenerate(format!(
                "empty grid ({nrow} x {ncol})"
            )));
        }
        if data.len() != nrow * ncol {
            return Err(CrownError::degenerate(format!(
                "grid data has {} values, expected {} x {} = {}",
                data.len(),
                nrow,
                ncol,
                nrow * ncol
            )));
        }
        let mut out = Self::new(nrow, ncol, 0.0);
        out.data = data;
        Ok(out)
    }

    /// Set the geographic extent; resolution is derived from it.
    pub fn with_extent(mut self, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        self.xmin = xmin;
        self.xmax = xmax;
        self.ymin = ymin;
        self.ymax = ymax;
        self.res_x = (xmax - xmin) / self.ncol as f64;
        self.res_y = (ymax - ymin) / self.nrow as f64;
        self
    }

    pub fn with_crs(mut self, crs: Option<String>) -> Self {
        self.crs = crs;
        self
    }

    /// A raster sharing this one's shape and georeference, filled with `fill`.
    pub fn like(&self, fill: f64) -> Raster {
        Raster {
            nrow: self.nrow,
            ncol: self.ncol,
            data: vec![fill; self.nrow * self.ncol],
            res_x: self.res_x,
            res_y: self.res_y,
            xmin: self.xmin,
            xmax: self.xmax,
            ymin: self.ymin,
            ymax: self.ymax,
            crs: self.crs.clone(),
        }
    }

    /// Get value at (row, col), returns NaN if out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row < self.nrow && col < self.ncol {
            self.data[row * self.ncol + col]
        } else {
            f64::NAN
        }
    }

    /// Get value at signed (row, col); `None` when outside the grid or NaN.
    #[inline]
    pub fn get_opt(&self, row: isize, col: isize) -> Option<f64> {
        if row >= 0 && col >= 0 && (row as usize) < self.nrow && (col as usize) < self.ncol {
            let v = self.data[row as usize * self.ncol + col as usize];
            if v.is_nan() {
                None
            } else {
                Some(v)
            }
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        if row < self.nrow && col < self.ncol {
            self.data[row * self.ncol + col] = val;
        }
    }

    /// Convert world X,Y to row,col; `None` outside the extent.
    pub fn xy_to_rc(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.xmin) / self.res_x).floor();
        let row = ((self.ymax - y) / self.res_y).floor();
        if col < 0.0 || row < 0.0 || col >= self.ncol as f64 || row >= self.nrow as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    /// Convert row,col to world X,Y (cell centre).
    pub fn rc_to_xy(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.xmin + (col as f64 + 0.5) * self.res_x;
        let y = self.ymax - (row as f64 + 0.5) * self.res_y;
        (x, y)
    }

    /// World coordinates of grid vertex (row, col), i.e. the top-left corner of that cell.
    pub fn vertex_to_xy(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.xmin + col as f64 * self.res_x,
            self.ymax - row as f64 * self.res_y,
        )
    }

    pub fn len(&self) -> usize {
        self.nrow * self.ncol
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a function to every cell.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Raster {
        let mut out = self.clone();
        for v in out.data.iter_mut() {
            *v = f(*v);
        }
        out
    }

    /// Largest finite value, or 0 for a grid without any.
    pub fn max_value(&self) -> f64 {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max)
    }

    /// Detection-ready copy: NaN, infinities and `nodata` become 0, and so does
    /// every cell below `min_height` (treated as ground).
    pub fn normalized(&self, nodata: Option<f64>, min_height: f64) -> Raster {
        self.map(|v| {
            if !v.is_finite() || nodata.is_some_and(|nd| v == nd) || v < min_height {
                0.0
            } else {
                v
            }
        })
    }
}
