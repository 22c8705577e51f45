//! Planar geometry used around the segmentation core: polygonization of a
//! label grid, convex hull, area, point-in-polygon and WKT.
//!
//! Coordinates are map units of the source raster; no reprojection happens here.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::labels::LabelGrid;
use crate::raster::Raster;

pub type Point2 = (f64, f64);

/// Polygon made of closed rings (first vertex not repeated).
///
/// Rings are consistently oriented: outer boundaries counter-clockwise,
/// holes clockwise, so signed ring areas add up to the covered area.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub rings: Vec<Vec<Point2>>,
}

fn ring_signed_area(ring: &[Point2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..ring.len() {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % ring.len()];
        acc += x0 * y1 - x1 * y0;
    }
    0.5 * acc
}

impl Polygon {
    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(|r| r.is_empty())
    }

    pub fn area(&self) -> f64 {
        self.rings.iter().map(|r| ring_signed_area(r)).sum::<f64>().abs()
    }

    /// (xmin, ymin, xmax, ymax), `None` for an empty polygon.
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        let mut pts = self.rings.iter().flatten();
        let &(x0, y0) = pts.next()?;
        Some(pts.fold((x0, y0, x0, y0), |(a, b, c, d), &(x, y)| {
            (a.min(x), b.min(y), c.max(x), d.max(y))
        }))
    }

    /// Even-odd ray casting over every ring, so holes are excluded. Edges are
    /// half-open (left and bottom edges inside, right and top outside), so a
    /// point on an edge shared by two adjacent cells' outlines lies in exactly one.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        for ring in &self.rings {
            let n = ring.len();
            if n < 3 {
                continue;
            }
            let mut j = n - 1;
            for i in 0..n {
                let (xi, yi) = ring[i];
                let (xj, yj) = ring[j];
                if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// WKT `POLYGON`, largest ring first.
    pub fn to_wkt(&self) -> String {
        let mut rings: Vec<&Vec<Point2>> = self.rings.iter().filter(|r| !r.is_empty()).collect();
        if rings.is_empty() {
            return "POLYGON EMPTY".to_string();
        }
        rings.sort_by(|a, b| ring_signed_area(b).total_cmp(&ring_signed_area(a)));

        let mut wkt = String::from("POLYGON(");
        for (k, ring) in rings.iter().enumerate() {
            if k > 0 {
                wkt.push(',');
            }
            wkt.push('(');
            for (x, y) in ring.iter().chain(ring.first()) {
                if !wkt.ends_with('(') {
                    wkt.push(',');
                }
                let _ = write!(wkt, "{x:.2} {y:.2}");
            }
            wkt.push(')');
        }
        wkt.push(')');
        wkt
    }
}

/// One polygon per nonzero label, tracing the outline of each region's cells
/// in the world coordinates of `raster`.
pub fn polygonize(labels: &LabelGrid, raster: &Raster) -> BTreeMap<u32, Polygon> {
    labels
        .regions()
        .into_iter()
        .map(|(label, cells)| (label, region_outline(labels, label, &cells, raster)))
        .collect()
}

type Vertex = (usize, usize);

fn region_outline(labels: &LabelGrid, label: u32, cells: &[(usize, usize)], raster: &Raster) -> Polygon {
    // Boundary edges between grid vertices (row, col), walking clockwise on
    // screen around each cell, i.e. counter-clockwise once y points north.
    let mut edges: Vec<(Vertex, Vertex)> = Vec::new();
    for &(r, c) in cells {
        let (ri, ci) = (r as isize, c as isize);
        if labels.get_or_zero(ri - 1, ci) != label {
            edges.push(((r, c), (r, c + 1)));
        }
        if labels.get_or_zero(ri, ci + 1) != label {
            edges.push(((r, c + 1), (r + 1, c + 1)));
        }
        if labels.get_or_zero(ri + 1, ci) != label {
            edges.push(((r + 1, c + 1), (r + 1, c)));
        }
        if labels.get_or_zero(ri, ci - 1) != label {
            edges.push(((r + 1, c), (r, c)));
        }
    }

    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, (from, _)) in edges.iter().enumerate() {
        outgoing.entry(*from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let origin = edges[start].0;
        let mut ring = vec![origin];
        let mut current = edges[start].1;
        while current != origin {
            ring.push(current);
            let next = outgoing
                .get(&current)
                .and_then(|out| out.iter().copied().find(|e| !used[*e]));
            match next {
                Some(e) => {
                    used[e] = true;
                    current = edges[e].1;
                }
                None => break,
            }
        }
        let ring: Vec<Point2> = drop_collinear(&ring)
            .into_iter()
            .map(|(r, c)| raster.vertex_to_xy(r, c))
            .collect();
        rings.push(ring);
    }
    Polygon { rings }
}

/// Remove vertices lying on a straight run of an axis-aligned ring.
fn drop_collinear(ring: &[Vertex]) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring.to_vec();
    }
    (0..n)
        .filter(|&i| {
            let (pr, pc) = ring[(i + n - 1) % n];
            let (r, c) = ring[i];
            let (nr, nc) = ring[(i + 1) % n];
            !((pr == r && r == nr) || (pc == c && c == nc))
        })
        .map(|i| ring[i])
        .collect()
}

/// Convex hull (Andrew's monotone chain), counter-clockwise, collinear points dropped.
///
/// Fewer than three distinct non-collinear points give a degenerate ring of
/// area 0.
pub fn convex_hull(points: &[Point2]) -> Polygon {
    let mut pts: Vec<Point2> = points.to_vec();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();
    if pts.len() < 3 {
        return Polygon { rings: vec![pts] };
    }

    let mut lower: Vec<Point2> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point2> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    Polygon { rings: vec![lower] }
}

fn cross(o: Point2, a: Point2, b: Point2) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_grid(nrow: usize, ncol: usize) -> Raster {
        Raster::new(nrow, ncol, 0.0)
    }

    #[test]
    fn test_square_region_outline() {
        let mut labels = LabelGrid::new(5, 5);
        for r in 1..4 {
            for c in 1..4 {
                labels.set(r, c, 7);
            }
        }
        let polys = polygonize(&labels, &unit_grid(5, 5));
        let p = &polys[&7];
        assert_eq!(p.rings.len(), 1);
        assert_eq!(p.rings[0].len(), 4);
        assert_relative_eq!(p.area(), 9.0);
        assert!(p.contains(2.5, 2.5));
        assert!(!p.contains(0.5, 0.5));
        assert_eq!(p.bbox(), Some((1.0, 1.0, 4.0, 4.0)));
    }

    #[test]
    fn test_region_with_hole() {
        let mut labels = LabelGrid::new(5, 5);
        for r in 1..4 {
            for c in 1..4 {
                labels.set(r, c, 1);
            }
        }
        labels.set(2, 2, 0);
        let raster = unit_grid(5, 5).with_extent(0.0, 10.0, 0.0, 10.0);
        let p = &polygonize(&labels, &raster)[&1];
        assert_eq!(p.rings.len(), 2);
        assert_relative_eq!(p.area(), 8.0 * 4.0);
        let (hx, hy) = raster.rc_to_xy(2, 2);
        assert!(!p.contains(hx, hy));
        let (ix, iy) = raster.rc_to_xy(1, 1);
        assert!(p.contains(ix, iy));
    }

    #[test]
    fn test_l_shape_and_separate_labels() {
        let mut labels = LabelGrid::new(4, 6);
        labels.set(0, 0, 1);
        labels.set(1, 0, 1);
        labels.set(1, 1, 1);
        labels.set(2, 4, 2);
        let polys = polygonize(&labels, &unit_grid(4, 6));
        assert_eq!(polys.len(), 2);
        assert_relative_eq!(polys[&1].area(), 3.0);
        assert_eq!(polys[&1].rings[0].len(), 6);
        assert_relative_eq!(polys[&2].area(), 1.0);
    }

    #[test]
    fn test_convex_hull_square_with_interior_points() {
        let pts = vec![
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
            (1.0, 1.0),
            (1.0, 0.0),
            (0.5, 1.5),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.rings[0].len(), 4);
        assert_relative_eq!(hull.area(), 4.0);
        assert!(hull.contains(1.0, 1.0));
    }

    #[test]
    fn test_convex_hull_degenerate() {
        assert_eq!(convex_hull(&[(0.0, 0.0), (1.0, 1.0)]).area(), 0.0);
        assert_eq!(convex_hull(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).area(), 0.0);
        assert!(convex_hull(&[]).is_empty());
    }

    #[test]
    fn test_wkt() {
        let hull = convex_hull(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        assert_eq!(hull.to_wkt(), "POLYGON((0.00 0.00,1.00 0.00,0.00 1.00,0.00 0.00))");
        assert_eq!(Polygon::default().to_wkt(), "POLYGON EMPTY");
    }
}
