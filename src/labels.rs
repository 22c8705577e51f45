//! Label grid: per-cell crown membership.

use std::collections::BTreeMap;

/// Same shape as the height grid; each cell holds 0 (background) or a crown id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelGrid {
    pub nrow: usize,
    pub ncol: usize,
    pub data: Vec<u32>,
}

impl LabelGrid {
    pub fn new(nrow: usize, ncol: usize) -> Self {
        Self {
            nrow,
            ncol,
            data: vec![0; nrow * ncol],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.data[row * self.ncol + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, label: u32) {
        self.data[row * self.ncol + col] = label;
    }

    /// Label at signed coordinates, 0 outside the grid.
    #[inline]
    pub fn get_or_zero(&self, row: isize, col: isize) -> u32 {
        if row >= 0 && col >= 0 && (row as usize) < self.nrow && (col as usize) < self.ncol {
            self.data[row as usize * self.ncol + col as usize]
        } else {
            0
        }
    }

    /// Cells of every nonzero label, in row-major order, keyed by label.
    pub fn regions(&self) -> BTreeMap<u32, Vec<(usize, usize)>> {
        let mut out: BTreeMap<u32, Vec<(usize, usize)>> = BTreeMap::new();
        for r in 0..self.nrow {
            for c in 0..self.ncol {
                let l = self.get(r, c);
                if l != 0 {
                    out.entry(l).or_default().push((r, c));
                }
            }
        }
        out
    }

    pub fn count(&self, label: u32) -> usize {
        self.data.iter().filter(|l| **l == label).count()
    }

    /// Shrink every region by `margin` cells: a cell keeps its label only if
    /// all cells within Chebyshev distance `margin` (grid outside included as
    /// background) carry the same label.
    pub fn eroded(&self, margin: usize) -> LabelGrid {
        if margin == 0 {
            return self.clone();
        }
        let m = margin as isize;
        let mut out = LabelGrid::new(self.nrow, self.ncol);
        for r in 0..self.nrow {
            for c in 0..self.ncol {
                let label = self.get(r, c);
                if label == 0 {
                    continue;
                }
                let interior = (-m..=m).all(|dr| {
                    (-m..=m).all(|dc| self.get_or_zero(r as isize + dr, c as isize + dc) == label)
                });
                if interior {
                    out.set(r, c, label);
                }
            }
        }
        out
    }
}
