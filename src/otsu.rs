//! Exact Otsu split over the unique values of a small sample.
//!
//! Unlike histogram-based Otsu, every boundary between two consecutive unique
//! values is a candidate. The score of a split is the sum of the two classes'
//! `μ² / ω` terms (cumulative first moment squared over cumulative probability),
//! which is maximal where the between-class variance is.

use std::cmp::Ordering;

/// Fewer unique values than this give no usable split.
pub const MIN_UNIQUE_VALUES: usize = 4;
/// The upper class must hold at least this many sample values.
pub const MIN_UPPER_COUNT: usize = 10;

/// Threshold separating the upper class of `values` from the lower one.
///
/// Returns the midpoint between the largest value of the lower class and the
/// smallest value of the upper class, so `v >= threshold` selects exactly the
/// upper class. `None` means no usable split: callers keep every value.
pub fn otsu_threshold(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    // (value, count) over the sorted unique set
    let mut unique: Vec<(f64, usize)> = Vec::new();
    for v in sorted {
        match unique.last_mut() {
            Some((u, n)) if *u == v => *n += 1,
            _ => unique.push((v, 1)),
        }
    }
    if unique.len() < MIN_UNIQUE_VALUES {
        return None;
    }

    let total = unique.iter().map(|(_, n)| *n).sum::<usize>() as f64;
    let mu_total: f64 = unique.iter().map(|(v, n)| v * *n as f64 / total).sum();

    let mut omega = 0.0;
    let mut mu = 0.0;
    let mut best: Option<(usize, f64)> = None;
    for (k, (v, n)) in unique.iter().enumerate().take(unique.len() - 1) {
        let p = *n as f64 / total;
        omega += p;
        mu += p * v;
        let upper_omega = 1.0 - omega;
        if omega <= 0.0 || upper_omega <= f64::EPSILON {
            continue;
        }
        let score = mu * mu / omega + (mu_total - mu).powi(2) / upper_omega;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((k, score));
        }
    }

    let (k, _) = best?;
    let upper_count: usize = unique[k + 1..].iter().map(|(_, n)| *n).sum();
    if upper_count < MIN_UPPER_COUNT {
        return None;
    }
    Some(0.5 * (unique[k].0 + unique[k + 1].0))
}
