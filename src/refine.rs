//! Point-based crown refinement for the LiDAR path.
//!
//! Each grown region selects the points inside its footprint, drops returns
//! below the height threshold, then uses an Otsu split on the heights to
//! separate crown points from understory. The final crown is the convex hull
//! of the surviving points, topped by the highest of them.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::{debug, trace};
use rayon::prelude::*;

use crate::geometry::{convex_hull, Point2, Polygon};
use crate::otsu::otsu_threshold;
use crate::points::Point3;

/// Otsu input is capped at this many heights.
pub const MAX_OTSU_SAMPLE: usize = 300;
/// Regions with fewer surviving points are dropped.
pub const MIN_CROWN_POINTS: usize = 3;

/// A crown after point-based refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedCrown {
    /// Highest surviving point (first one on ties).
    pub apex: Point3,
    /// Convex hull of the surviving points.
    pub hull: Polygon,
    pub area: f64,
    pub n_points: usize,
}

/// Deterministic Otsu sample: heights sorted ascending, every k-th kept with
/// k = ⌈n / 300⌉. Short inputs come back sorted but otherwise untouched.
pub fn subsample_heights(heights: &[f64]) -> Vec<f64> {
    let mut sorted = heights.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    if sorted.len() <= MAX_OTSU_SAMPLE {
        return sorted;
    }
    let k = sorted.len().div_ceil(MAX_OTSU_SAMPLE);
    sorted.into_iter().step_by(k).collect()
}

/// Refine one region. Returns `None` when the region has fewer than
/// [`MIN_CROWN_POINTS`] points above `height_threshold` or no height variance.
pub fn refine_crown(footprint: &Polygon, points: &[Point3], height_threshold: f64) -> Option<RefinedCrown> {
    let (x0, y0, x1, y1) = footprint.bbox()?;
    let selected: Vec<Point3> = points
        .iter()
        .filter(|p| p.z > height_threshold)
        .filter(|p| p.x >= x0 && p.x <= x1 && p.y >= y0 && p.y <= y1)
        .filter(|p| footprint.contains(p.x, p.y))
        .copied()
        .collect();

    if selected.len() < MIN_CROWN_POINTS {
        trace!("region dropped: {} points above threshold", selected.len());
        return None;
    }
    let first_z = selected[0].z;
    if selected.iter().all(|p| p.z == first_z) {
        trace!("region dropped: no height variance");
        return None;
    }

    let heights: Vec<f64> = selected.iter().map(|p| p.z).collect();
    let crown: Vec<Point3> = match otsu_threshold(&subsample_heights(&heights)) {
        Some(t) => selected.into_iter().filter(|p| p.z >= t).collect(),
        None => selected,
    };

    let apex = crown
        .iter()
        .copied()
        .reduce(|best, p| if p.z > best.z { p } else { best })?;
    let xy: Vec<Point2> = crown.iter().map(|p| (p.x, p.y)).collect();
    let hull = convex_hull(&xy);
    let area = hull.area();

    Some(RefinedCrown {
        apex,
        hull,
        area,
        n_points: crown.len(),
    })
}

/// Refine every footprint in parallel; crowns with area ≤ `min_area` are
/// dropped. Output is ordered by label.
pub fn refine_crowns(
    footprints: &BTreeMap<u32, Polygon>,
    points: &[Point3],
    height_threshold: f64,
    min_area: f64,
) -> Vec<(u32, RefinedCrown)> {
    let regions: Vec<(&u32, &Polygon)> = footprints.iter().collect();
    let refined: Vec<(u32, RefinedCrown)> = regions
        .par_iter()
        .filter_map(|(label, footprint)| {
            refine_crown(footprint, points, height_threshold).map(|c| (**label, c))
        })
        .filter(|(_, c)| c.area > min_area)
        .collect();
    debug!(
        "crown refinement: {} of {} regions kept",
        refined.len(),
        footprints.len()
    );
    refined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon {
        Polygon {
            rings: vec![vec![(x0, y0), (x0 + side, y0), (x0 + side, y0 + side), (x0, y0 + side)]],
        }
    }

    /// Crown points high on a ring of radius `r`, plus low understory inside.
    fn tree(cx: f64, cy: f64) -> Vec<Point3> {
        let mut pts = Vec::new();
        for i in 0..40 {
            let a = i as f64 / 40.0 * std::f64::consts::TAU;
            pts.push(Point3::new(cx + 2.0 * a.cos(), cy + 2.0 * a.sin(), 15.0 + (i % 5) as f64 * 0.3));
        }
        for i in 0..40 {
            let a = i as f64 / 40.0 * std::f64::consts::TAU;
            pts.push(Point3::new(cx + 3.5 * a.cos(), cy + 3.5 * a.sin(), 3.0 + (i % 4) as f64 * 0.2));
        }
        pts.push(Point3::new(cx, cy, 18.0));
        pts
    }

    #[test]
    fn test_subsample_stride() {
        let heights: Vec<f64> = (0..1000).rev().map(|i| i as f64).collect();
        let s = subsample_heights(&heights);
        // k = ceil(1000 / 300) = 4
        assert_eq!(s.len(), 250);
        assert_eq!(&s[..3], &[0.0, 4.0, 8.0]);
        assert_eq!(subsample_heights(&[3.0, 1.0, 2.0]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_understory_removed_by_otsu() {
        let pts = tree(10.0, 10.0);
        let crown = refine_crown(&square(0.0, 0.0, 20.0), &pts, 2.0).unwrap();
        assert_eq!(crown.n_points, 41);
        assert_eq!(crown.apex, Point3::new(10.0, 10.0, 18.0));
        // hull of the radius-2 ring, not the radius-3.5 understory
        assert!(crown.area < std::f64::consts::PI * 4.0 + 1e-9);
        assert!(crown.area > 10.0);
    }

    #[test]
    fn test_too_few_points_or_flat_region_dropped() {
        let fp = square(0.0, 0.0, 10.0);
        let two = vec![Point3::new(1.0, 1.0, 5.0), Point3::new(2.0, 2.0, 6.0)];
        assert!(refine_crown(&fp, &two, 2.0).is_none());
        let flat = vec![
            Point3::new(1.0, 1.0, 5.0),
            Point3::new(2.0, 2.0, 5.0),
            Point3::new(3.0, 1.0, 5.0),
        ];
        assert!(refine_crown(&fp, &flat, 2.0).is_none());
        let low = vec![
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 1.5),
            Point3::new(3.0, 1.0, 1.9),
        ];
        assert!(refine_crown(&fp, &low, 2.0).is_none());
    }

    #[test]
    fn test_no_split_keeps_all_points() {
        let fp = square(0.0, 0.0, 10.0);
        let pts = vec![
            Point3::new(1.0, 1.0, 5.0),
            Point3::new(4.0, 1.0, 6.0),
            Point3::new(4.0, 4.0, 7.0),
            Point3::new(1.0, 4.0, 6.0),
        ];
        let crown = refine_crown(&fp, &pts, 2.0).unwrap();
        assert_eq!(crown.n_points, 4);
        assert_eq!(crown.area, 9.0);
        assert_eq!(crown.apex.z, 7.0);
    }

    #[test]
    fn test_points_outside_footprint_ignored() {
        let fp = square(0.0, 0.0, 10.0);
        let mut pts = vec![
            Point3::new(1.0, 1.0, 5.0),
            Point3::new(4.0, 1.0, 6.0),
            Point3::new(4.0, 4.0, 7.0),
        ];
        pts.push(Point3::new(50.0, 50.0, 30.0));
        let crown = refine_crown(&fp, &pts, 2.0).unwrap();
        assert_eq!(crown.apex.z, 7.0);
    }

    #[test]
    fn test_refine_crowns_drops_small_and_orders_by_label() {
        let mut footprints = BTreeMap::new();
        footprints.insert(2, square(20.0, 0.0, 20.0));
        footprints.insert(1, square(0.0, 0.0, 20.0));
        footprints.insert(3, square(50.0, 50.0, 2.0));
        let mut pts = tree(10.0, 10.0);
        pts.extend(tree(30.0, 10.0));
        // a tiny region: three points spanning less than one unit²
        pts.extend([
            Point3::new(50.5, 50.5, 5.0),
            Point3::new(50.9, 50.5, 6.0),
            Point3::new(50.5, 50.9, 7.0),
        ]);
        let crowns = refine_crowns(&footprints, &pts, 2.0, 1.0);
        let labels: Vec<u32> = crowns.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec![1, 2]);
    }

    #[test]
    fn test_point_on_shared_edge_joins_one_crown() {
        let mut footprints = BTreeMap::new();
        footprints.insert(1, square(0.0, 0.0, 10.0));
        footprints.insert(2, square(10.0, 0.0, 10.0));
        let mut pts = Vec::new();
        for x0 in [0.0, 10.0] {
            pts.extend([
                Point3::new(x0 + 2.0, 2.0, 5.0),
                Point3::new(x0 + 8.0, 2.0, 6.0),
                Point3::new(x0 + 8.0, 8.0, 7.0),
                Point3::new(x0 + 2.0, 8.0, 6.0),
            ]);
        }
        pts.push(Point3::new(10.0, 5.0, 8.0));

        let crowns = refine_crowns(&footprints, &pts, 2.0, 1.0);
        assert_eq!(crowns.len(), 2);
        let total: usize = crowns.iter().map(|(_, c)| c.n_points).sum();
        assert_eq!(total, 9);
        let owners: Vec<u32> = crowns
            .iter()
            .filter(|(_, c)| c.apex == Point3::new(10.0, 5.0, 8.0))
            .map(|(l, _)| *l)
            .collect();
        assert_eq!(owners, vec![2]);

        // same for a horizontal shared edge
        let below = square(0.0, 0.0, 10.0);
        let above = square(0.0, 10.0, 10.0);
        assert!(!below.contains(5.0, 10.0));
        assert!(above.contains(5.0, 10.0));
    }
}
