//! Height-adaptive parameter tables.
//!
//! Two step functions are built once per run: seed height → search window
//! size, and seed height → maximum growth radius. Lookups pick the value at the
//! nearest breakpoint at or below the query height; values are never
//! interpolated.

use log::debug;

use crate::error::{CrownError, Result};

/// Monotone step function over sorted height breakpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFunction<T> {
    breakpoints: Vec<f64>,
    values: Vec<T>,
}

impl<T: Copy> StepFunction<T> {
    /// Pair breakpoints with values. Breakpoints must be non-decreasing and
    /// both sequences non-empty and of equal length.
    pub fn new(breakpoints: Vec<f64>, values: Vec<T>) -> Result<Self> {
        if breakpoints.is_empty() || breakpoints.len() != values.len() {
            return Err(CrownError::config(format!(
                "step function needs matching non-empty tables ({} breakpoints, {} values)",
                breakpoints.len(),
                values.len()
            )));
        }
        if breakpoints.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(CrownError::config("step function breakpoints must be sorted"));
        }
        Ok(Self { breakpoints, values })
    }

    /// Index of the last breakpoint ≤ `x`, or 0 when `x` is below all of them.
    pub fn interval(&self, x: f64) -> usize {
        self.breakpoints.partition_point(|b| *b <= x).saturating_sub(1)
    }

    pub fn lookup(&self, x: f64) -> T {
        self.values[self.interval(x)]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + i as f64 * step).collect()
        }
    }
}

/// `n` log-spaced values from `start` to `end` inclusive (both > 0).
fn logspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    linspace(start.ln(), end.ln(), n)
        .into_iter()
        .map(f64::exp)
        .collect()
}

/// Bounds used to build a [`ParameterSchedule`].
///
/// Window sizes are in cells, radii in grid units (cells).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleBounds {
    pub min_window: usize,
    pub max_window: usize,
    pub min_radius: f64,
    pub max_radius: f64,
    /// Height at which the first breakpoint sits.
    pub height_threshold: f64,
    /// Largest height observed in the grid.
    pub max_height: f64,
}

impl ScheduleBounds {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("min", self.min_window), ("max", self.max_window)] {
            if w < 3 || w % 2 == 0 {
                return Err(CrownError::config(format!(
                    "{name} window size must be an odd integer >= 3, got {w}"
                )));
            }
        }
        if self.min_window > self.max_window {
            return Err(CrownError::config(format!(
                "min window size {} exceeds max window size {}",
                self.min_window, self.max_window
            )));
        }
        if !(self.min_radius > 0.0) || !self.max_radius.is_finite() {
            return Err(CrownError::config(format!(
                "growth radii must be positive and finite, got {}..{}",
                self.min_radius, self.max_radius
            )));
        }
        if self.min_radius > self.max_radius {
            return Err(CrownError::config(format!(
                "min growth radius {} exceeds max growth radius {}",
                self.min_radius, self.max_radius
            )));
        }
        Ok(())
    }
}

/// The window-size and growth-radius tables for one run.
#[derive(Debug, Clone)]
pub struct ParameterSchedule {
    pub window: StepFunction<usize>,
    pub radius: StepFunction<f64>,
    min_window: usize,
}

impl ParameterSchedule {
    pub fn build(bounds: &ScheduleBounds) -> Result<Self> {
        bounds.validate()?;
        let lo = bounds.height_threshold;
        let hi = bounds.max_height.max(lo);

        let windows: Vec<usize> = (bounds.min_window..=bounds.max_window).step_by(2).collect();
        let window = StepFunction::new(linspace(lo, hi, windows.len()), windows)?;

        let span = bounds.max_radius - bounds.min_radius;
        let n_radii = if span > 0.0 {
            (span.round() as usize).max(2)
        } else {
            1
        };
        let radii = logspace(bounds.min_radius, bounds.max_radius, n_radii);
        let radius = StepFunction::new(linspace(lo, hi, n_radii), radii)?;

        debug!(
            "parameter schedule: {} window steps ({}..{}), {} radius steps ({:.2}..{:.2}), heights {:.2}..{:.2}",
            window.len(),
            bounds.min_window,
            bounds.max_window,
            radius.len(),
            bounds.min_radius,
            bounds.max_radius,
            lo,
            hi
        );

        Ok(Self {
            window,
            radius,
            min_window: bounds.min_window,
        })
    }

    pub fn window_size(&self, height: f64) -> usize {
        self.window.lookup(height)
    }

    pub fn growth_radius(&self, height: f64) -> f64 {
        self.radius.lookup(height)
    }

    pub fn min_window(&self) -> usize {
        self.min_window
    }
}
