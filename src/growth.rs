//! Seeded region growing under height-ratio, ascent and distance constraints.
//!
//! Growth runs in sweeps. Every sweep examines the frontier of each crown,
//! the cells it gained in the previous sweep (initially the seed alone),
//! collects admissible 4-neighbours into a buffer and commits the buffer at
//! the end of the sweep. The committed cells become the next frontier; a
//! cell is examined once, in the sweep after it joined. Crown means are
//! frozen for the duration of a sweep. When two crowns claim the same cell
//! in one sweep the lower seed id wins, so the result does not depend on
//! iteration order. A labelled cell is never relabelled.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CrownError, Result};
use crate::labels::LabelGrid;
use crate::raster::Raster;
use crate::schedule::ParameterSchedule;
use crate::seeds::SeedTable;

/// A neighbour may be at most this fraction higher than the cell it grows from.
pub const ASCENT_TOLERANCE: f64 = 0.005;
/// A neighbour may be at most this fraction higher than the crown's seed.
pub const SEED_CEILING: f64 = 0.05;

const NEIGHBORS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Growth thresholds, both ratios in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthParams {
    /// Neighbour must exceed `seed height × seed_ratio`.
    pub seed_ratio: f64,
    /// Neighbour must exceed `crown mean × crown_ratio`.
    pub crown_ratio: f64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            seed_ratio: 0.45,
            crown_ratio: 0.55,
        }
    }
}

impl GrowthParams {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("seed", self.seed_ratio), ("crown", self.crown_ratio)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(CrownError::config(format!(
                    "{name} growth ratio must lie in [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Final label grid and the number of sweeps it took, the last one being
/// the sweep that changed nothing.
#[derive(Debug, Clone)]
pub struct GrowthOutcome {
    pub labels: LabelGrid,
    pub sweeps: usize,
}

#[derive(Debug, Clone)]
struct Crown {
    seed_row: usize,
    seed_col: usize,
    seed_height: f64,
    radius: f64,
    frontier: Vec<usize>,
    size: usize,
    height_sum: f64,
}

impl Crown {
    fn mean(&self) -> f64 {
        self.height_sum / self.size as f64
    }
}

/// Sweep-by-sweep region grower over one height grid.
pub struct RegionGrower<'a> {
    grid: &'a Raster,
    params: GrowthParams,
    labels: LabelGrid,
    crowns: Vec<Crown>,
    pending: Vec<u32>,
    sweeps: usize,
}

impl<'a> RegionGrower<'a> {
    pub fn new(
        grid: &'a Raster,
        seeds: &SeedTable,
        schedule: &ParameterSchedule,
        params: GrowthParams,
    ) -> Result<Self> {
        params.validate()?;
        let labels = seeds.to_label_grid();
        if labels.nrow != grid.nrow || labels.ncol != grid.ncol {
            return Err(CrownError::degenerate(format!(
                "seed table is {} x {} but height grid is {} x {}",
                labels.nrow, labels.ncol, grid.nrow, grid.ncol
            )));
        }
        let crowns = seeds
            .iter()
            .map(|s| Crown {
                seed_row: s.row,
                seed_col: s.col,
                seed_height: s.height,
                radius: schedule.growth_radius(s.height),
                frontier: vec![s.row * grid.ncol + s.col],
                size: 1,
                height_sum: s.height,
            })
            .collect();
        Ok(Self {
            grid,
            params,
            labels,
            crowns,
            pending: vec![0; grid.len()],
            sweeps: 0,
        })
    }

    pub fn labels(&self) -> &LabelGrid {
        &self.labels
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Run one sweep; returns the number of cells that joined a crown.
    pub fn sweep(&mut self) -> usize {
        let grid = self.grid;
        let (nrow, ncol) = (grid.nrow, grid.ncol);
        let mut claimed: Vec<usize> = Vec::new();

        for (i, crown) in self.crowns.iter().enumerate() {
            if crown.frontier.is_empty() {
                continue;
            }
            let label = i as u32 + 1;
            let seed_floor = crown.seed_height * self.params.seed_ratio;
            let crown_floor = crown.mean() * self.params.crown_ratio;
            let ceiling = crown.seed_height * (1.0 + SEED_CEILING);

            for &idx in &crown.frontier {
                let (r, c) = (idx / ncol, idx % ncol);
                if r == 0 || c == 0 || r + 1 == nrow || c + 1 == ncol {
                    continue;
                }
                let h_cell = grid.data[idx];
                for (dr, dc) in NEIGHBORS {
                    let nr = (r as isize + dr) as usize;
                    let nc = (c as isize + dc) as usize;
                    let nidx = nr * ncol + nc;
                    if self.labels.data[nidx] != 0 || self.pending[nidx] != 0 {
                        continue;
                    }
                    let h = grid.data[nidx];
                    let dist = ((nr as f64 - crown.seed_row as f64).powi(2)
                        + (nc as f64 - crown.seed_col as f64).powi(2))
                    .sqrt();
                    let admitted = h.is_finite()
                        && h != 0.0
                        && h < h_cell * (1.0 + ASCENT_TOLERANCE)
                        && h > seed_floor
                        && h > crown_floor
                        && h <= ceiling
                        && dist < crown.radius;
                    if admitted {
                        self.pending[nidx] = label;
                        claimed.push(nidx);
                    }
                }
            }
        }

        for crown in &mut self.crowns {
            crown.frontier.clear();
        }
        for &idx in &claimed {
            let label = self.pending[idx];
            self.pending[idx] = 0;
            self.labels.data[idx] = label;
            let crown = &mut self.crowns[label as usize - 1];
            crown.frontier.push(idx);
            crown.size += 1;
            crown.height_sum += grid.data[idx];
        }
        self.sweeps += 1;
        claimed.len()
    }

    /// Sweep until nothing changes.
    pub fn run(mut self) -> GrowthOutcome {
        while self.sweep() > 0 {}
        debug!(
            "region growing: {} crowns settled after {} sweeps",
            self.crowns.len(),
            self.sweeps
        );
        GrowthOutcome {
            labels: self.labels,
            sweeps: self.sweeps,
        }
    }
}

/// Grow every seed of `seeds` into a crown on `grid`.
pub fn grow_regions(
    grid: &Raster,
    seeds: &SeedTable,
    schedule: &ParameterSchedule,
    params: GrowthParams,
) -> Result<GrowthOutcome> {
    Ok(RegionGrower::new(grid, seeds, schedule, params)?.run())
}
