//! Tree-top seed detection with a height-adaptive window.
//!
//! Each candidate cell looks up its window size from the parameter schedule
//! and is accepted when it is the maximum of that square neighbourhood and no
//! earlier seed already sits inside it. Ids follow row-major scan order.

use log::debug;

use crate::labels::LabelGrid;
use crate::raster::Raster;
use crate::schedule::ParameterSchedule;

/// A detected tree top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    /// Unique id, 1-based, strictly increasing in scan order.
    pub id: u32,
    pub row: usize,
    pub col: usize,
    pub height: f64,
}

/// Sparse cell → seed id mapping, ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedTable {
    nrow: usize,
    ncol: usize,
    seeds: Vec<Seed>,
}

impl SeedTable {
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seed> {
        self.seeds.iter()
    }

    /// Seed by id; ids are dense so this is an index.
    pub fn get(&self, id: u32) -> Option<&Seed> {
        (id as usize)
            .checked_sub(1)
            .and_then(|i| self.seeds.get(i))
    }

    /// Initial label grid: each seed cell carries its id.
    pub fn to_label_grid(&self) -> LabelGrid {
        let mut labels = LabelGrid::new(self.nrow, self.ncol);
        for s in &self.seeds {
            labels.set(s.row, s.col, s.id);
        }
        labels
    }
}

/// Detect seeds on a normalized height grid.
///
/// Cells closer than ⌈min_window / 2⌉ to the border are not candidates, nor
/// are zero cells or cells below `min_height`. Windows that reach past the
/// border are clipped to the grid.
pub fn detect_seeds(grid: &Raster, schedule: &ParameterSchedule, min_height: f64) -> SeedTable {
    let margin = schedule.min_window().div_ceil(2);
    let mut taken = vec![false; grid.len()];
    let mut seeds: Vec<Seed> = Vec::new();

    if grid.nrow > 2 * margin && grid.ncol > 2 * margin {
        for r in margin..grid.nrow - margin {
            for c in margin..grid.ncol - margin {
                let h = grid.get(r, c);
                if h.is_nan() || h == 0.0 || h < min_height {
                    continue;
                }
                let half = schedule.window_size(h) / 2;
                let r0 = r.saturating_sub(half);
                let r1 = (r + half).min(grid.nrow - 1);
                let c0 = c.saturating_sub(half);
                let c1 = (c + half).min(grid.ncol - 1);

                let mut window_max = f64::NEG_INFINITY;
                let mut occupied = false;
                for rr in r0..=r1 {
                    for cc in c0..=c1 {
                        let idx = rr * grid.ncol + cc;
                        occupied |= taken[idx];
                        let v = grid.data[idx];
                        if v > window_max {
                            window_max = v;
                        }
                    }
                }

                if !occupied && window_max > 0.0 && h == window_max {
                    taken[r * grid.ncol + c] = true;
                    seeds.push(Seed {
                        id: seeds.len() as u32 + 1,
                        row: r,
                        col: c,
                        height: h,
                    });
                }
            }
        }
    }

    debug!(
        "seed detection: {} seeds on {} x {} grid (margin {})",
        seeds.len(),
        grid.nrow,
        grid.ncol,
        margin
    );

    SeedTable {
        nrow: grid.nrow,
        ncol: grid.ncol,
        seeds,
    }
}
