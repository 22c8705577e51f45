use approx::assert_relative_eq;
use crownseg::{
    allometry, detect_seeds, grow_regions, otsu_threshold, segment_from_imagery,
    segment_from_point_cloud, CrownError, GrowthParams, ImageryParams, ParameterSchedule, Point3,
    PointCloud, PointCloudParams, Raster, ScheduleBounds, Smoothing,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fixed_schedule(window: usize, radius: f64, max_height: f64) -> ParameterSchedule {
    ParameterSchedule::build(&ScheduleBounds {
        min_window: window,
        max_window: window,
        min_radius: radius,
        max_radius: radius,
        height_threshold: 0.0,
        max_height,
    })
    .unwrap()
}

fn imagery_params() -> ImageryParams {
    ImageryParams {
        window_size: 3,
        seed_threshold: 0.05,
        crown_threshold: 0.05,
        max_diameter: 10.0,
        min_digital_number: 0.5,
        smoothing: Smoothing::None,
        ..Default::default()
    }
}

/// 5×5 grid, single peak of 10 at the centre, every other cell at 1.
fn single_peak() -> Raster {
    let mut grid = Raster::new(5, 5, 1.0);
    grid.set(2, 2, 10.0);
    grid
}

/// 10×10 grid with two 3×3 bumps topped at 10 near opposite corners, floor 0.
fn two_peaks() -> Raster {
    let mut grid = Raster::new(10, 10, 0.0);
    for (pr, pc) in [(2usize, 2usize), (7, 7)] {
        for r in pr - 1..=pr + 1 {
            for c in pc - 1..=pc + 1 {
                grid.set(r, c, 8.0);
            }
        }
        grid.set(pr, pc, 10.0);
    }
    grid
}

#[test]
fn scenario_a_single_peak_single_crown() {
    init_logging();
    let grid = single_peak();
    let schedule = fixed_schedule(3, 5.0, 10.0);
    let seeds = detect_seeds(&grid, &schedule, 0.0);
    assert_eq!(seeds.len(), 1);
    let seed = seeds.get(1).unwrap();
    assert_eq!((seed.row, seed.col), (2, 2));

    let params = GrowthParams { seed_ratio: 0.05, crown_ratio: 0.05 };
    let grown = grow_regions(&grid, &seeds, &schedule, params).unwrap();
    let regions = grown.labels.regions();
    assert_eq!(regions.len(), 1);
    // every cell passes the ratios; corners are only reachable through border
    // cells, which do not expand
    assert_eq!(regions[&1].len(), 21);
    for corner in [(0, 0), (0, 4), (4, 0), (4, 4)] {
        assert_eq!(grown.labels.get(corner.0, corner.1), 0);
    }

    let crowns = segment_from_imagery(&grid, &imagery_params()).unwrap();
    assert_eq!(crowns.len(), 1);
    let crown = &crowns[0];
    assert_eq!(crown.id, 1);
    assert_eq!((crown.x, crown.y), (2.5, 2.5));
    assert_eq!(crown.height, Some(10.0));
    assert_relative_eq!(crown.area, 21.0);
}

#[test]
fn scenario_b_two_peaks_disjoint_crowns() {
    init_logging();
    let grid = two_peaks();
    let schedule = fixed_schedule(3, 5.0, 10.0);
    let seeds = detect_seeds(&grid, &schedule, 2.0);
    assert_eq!(seeds.len(), 2);

    let grown = grow_regions(&grid, &seeds, &schedule, GrowthParams::default()).unwrap();
    let regions = grown.labels.regions();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[&1].len(), 9);
    assert_eq!(regions[&2].len(), 9);
    assert!(regions[&1].iter().all(|cell| !regions[&2].contains(cell)));

    let params = ImageryParams {
        min_digital_number: 2.0,
        seed_threshold: 0.45,
        crown_threshold: 0.55,
        ..imagery_params()
    };
    let crowns = segment_from_imagery(&grid, &params).unwrap();
    assert_eq!(crowns.len(), 2);
    for c in &crowns {
        assert_relative_eq!(c.area, 9.0);
        assert_eq!(c.height, Some(10.0));
    }
}

#[test]
fn scenario_c_dbh() {
    let d = allometry::dbh(20.0, 5.0, 0).unwrap();
    assert!(d > 0.0);
    assert_eq!(d, allometry::dbh(20.0, 5.0, 0).unwrap());
    assert!(matches!(
        allometry::dbh(20.0, 5.0, 99),
        Err(CrownError::Configuration(_))
    ));
}

#[test]
fn scenario_d_identical_heights_no_split() {
    assert_eq!(otsu_threshold(&[17.0; 300]), None);
}

#[test]
fn otsu_threshold_between_clusters() {
    let mut values: Vec<f64> = (0..30).map(|i| 1.0 + (i % 6) as f64 * 0.1).collect();
    values.extend((0..30).map(|i| 20.0 + (i % 6) as f64 * 0.1));
    let t = otsu_threshold(&values).unwrap();
    assert!(t > 1.5 && t < 20.0);
}

#[test]
fn seed_detection_is_deterministic() {
    let grid = two_peaks();
    let schedule = fixed_schedule(3, 5.0, 10.0);
    let a = detect_seeds(&grid, &schedule, 2.0);
    let b = detect_seeds(&grid, &schedule, 2.0);
    assert_eq!(a, b);
}

#[test]
fn growth_sweeps_bounded_by_grid_diameter() {
    let grid = Raster::try_from_vec(
        30,
        30,
        (0..900)
            .map(|i| {
                let (r, c) = ((i / 30) as f64, (i % 30) as f64);
                (30.0 - ((r - 15.0).powi(2) + (c - 15.0).powi(2)).sqrt()).max(0.0)
            })
            .collect(),
    )
    .unwrap();
    let schedule = fixed_schedule(3, 100.0, 30.0);
    let seeds = detect_seeds(&grid, &schedule, 0.0);
    assert_eq!(seeds.len(), 1);
    let out = grow_regions(&grid, &seeds, &schedule, GrowthParams { seed_ratio: 0.0, crown_ratio: 0.0 })
        .unwrap();
    assert!(out.sweeps <= 30 + 30);
    assert!(out.labels.count(1) > 700);
}

#[test]
fn empty_results_are_not_errors() {
    let flat = Raster::new(8, 8, 0.0);
    assert!(segment_from_imagery(&flat, &imagery_params()).unwrap().is_empty());
}

#[test]
fn degenerate_inputs_rejected() {
    let bad = Raster {
        data: vec![1.0; 3],
        ..Raster::new(2, 2, 0.0)
    };
    assert!(matches!(
        segment_from_imagery(&bad, &imagery_params()),
        Err(CrownError::DegenerateInput(_))
    ));
    assert!(matches!(
        segment_from_point_cloud(&PointCloud::default(), &PointCloudParams::default()),
        Err(CrownError::DegenerateInput(_))
    ));
}

#[test]
fn configuration_checked_before_input() {
    let params = ImageryParams { window_size: 6, ..imagery_params() };
    assert!(matches!(
        segment_from_imagery(&single_peak(), &params),
        Err(CrownError::Configuration(_))
    ));
    let params = PointCloudParams { min_window_size: 2, ..Default::default() };
    assert!(matches!(
        segment_from_point_cloud(&PointCloud::default(), &params),
        Err(CrownError::Configuration(_))
    ));
}

#[test]
fn digital_numbers_have_no_height() {
    let params = ImageryParams { is_canopy_height_model: false, ..imagery_params() };
    let crowns = segment_from_imagery(&single_peak(), &params).unwrap();
    assert_eq!(crowns.len(), 1);
    assert_eq!(crowns[0].height, None);
}

/// Conical crown of height `h` and radius 3 m sampled every 0.25 m, with
/// low understory around it and ground returns on a 0.5 m lattice.
fn synthetic_tree(cx: f64, cy: f64, h: f64, points: &mut Vec<Point3>) {
    let steps = 24i32;
    for i in -steps..=steps {
        for j in -steps..=steps {
            let (dx, dy) = (i as f64 * 0.25, j as f64 * 0.25);
            let d = (dx * dx + dy * dy).sqrt();
            if d <= 3.0 {
                points.push(Point3::new(cx + dx, cy + dy, h - d / 3.0 * h * 0.4));
            } else if d <= 5.0 && (i + j) % 3 == 0 {
                points.push(Point3::new(cx + dx, cy + dy, 1.0 + (i.abs() % 3) as f64 * 0.2));
            }
        }
    }
}

#[test]
fn point_cloud_two_trees() {
    init_logging();
    let mut points = Vec::new();
    for i in 0..=80 {
        for j in 0..=40 {
            points.push(Point3::new(i as f64 * 0.5, j as f64 * 0.5 - 5.0, 0.0));
        }
    }
    synthetic_tree(10.0, 5.0, 20.0, &mut points);
    synthetic_tree(28.0, 5.0, 15.0, &mut points);
    let cloud = PointCloud::new(points).with_crs(Some("EPSG:2154".into()));

    let params = PointCloudParams {
        resolution: 0.5,
        min_window_size: 3,
        max_window_size: 9,
        min_diameter: 2.0,
        max_diameter: 8.0,
        height_threshold: 2.0,
        ..Default::default()
    };
    let mut crowns = segment_from_point_cloud(&cloud, &params).unwrap();
    assert_eq!(crowns.len(), 2);
    crowns.sort_by(|a, b| a.x.total_cmp(&b.x));

    assert_eq!((crowns[0].x, crowns[0].y), (10.0, 5.0));
    assert_eq!(crowns[0].height, Some(20.0));
    assert_eq!((crowns[1].x, crowns[1].y), (28.0, 5.0));
    assert_eq!(crowns[1].height, Some(15.0));
    for c in &crowns {
        assert!(c.area > 1.0);
        assert!(c.area < std::f64::consts::PI * 9.0);
        assert!(c.footprint.contains(c.x, c.y));
    }
}
