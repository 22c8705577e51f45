//! Crown delineation entry points.
//!
//! Imagery path: height grid → seeds → region growing → polygons.
//! Point-cloud path: points → highest-return grid → seeds → region growing →
//! polygons → per-crown point refinement.
//!
//! Parameters are validated up front; a run that finds no seed, or whose
//! regions are all filtered out, returns an empty crown set.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{CrownError, Result};
use crate::filter::Smoothing;
use crate::geometry::{polygonize, Polygon};
use crate::growth::{grow_regions, GrowthParams};
use crate::points::PointCloud;
use crate::raster::Raster;
use crate::refine::refine_crowns;
use crate::schedule::{ParameterSchedule, ScheduleBounds};
use crate::seeds::detect_seeds;

/// One delineated tree crown.
#[derive(Debug, Clone, PartialEq)]
pub struct CrownRecord {
    /// Seed id of the crown (1-based, scan order).
    pub id: u32,
    /// X coordinate of the apex (map units).
    pub x: f64,
    /// Y coordinate of the apex (map units).
    pub y: f64,
    /// Apex height; absent when the input grid holds digital numbers rather
    /// than heights.
    pub height: Option<f64>,
    /// Crown area in map units².
    pub area: f64,
    /// Crown outline in map units.
    pub footprint: Polygon,
}

impl CrownRecord {
    /// Diameter of the circle with the crown's area.
    pub fn crown_diameter(&self) -> f64 {
        2.0 * (self.area / std::f64::consts::PI).sqrt()
    }
}

fn check_area(min_crown_area: f64) -> Result<()> {
    if !(min_crown_area >= 0.0) {
        return Err(CrownError::config(format!(
            "minimum crown area must be >= 0, got {min_crown_area}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Imagery
// ---------------------------------------------------------------------------

/// Parameters of [`segment_from_imagery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageryParams {
    /// Seed search window (odd, ≥ 3 cells).
    pub window_size: usize,
    /// Neighbour must exceed seed height × this ratio.
    pub seed_threshold: f64,
    /// Neighbour must exceed crown mean × this ratio.
    pub crown_threshold: f64,
    /// Largest crown diameter (map units); bounds the growth radius.
    pub max_diameter: f64,
    /// Cells below this value are ground.
    pub min_digital_number: f64,
    /// Whether grid values are heights (reported on the crowns) or raw digital numbers.
    pub is_canopy_height_model: bool,
    /// Raster no-data value, normalized to 0.
    pub nodata: Option<f64>,
    pub smoothing: Smoothing,
    /// Crowns whose area does not exceed this are dropped.
    pub min_crown_area: f64,
}

impl Default for ImageryParams {
    fn default() -> Self {
        Self {
            window_size: 5,
            seed_threshold: 0.45,
            crown_threshold: 0.55,
            max_diameter: 10.0,
            min_digital_number: 2.0,
            is_canopy_height_model: true,
            nodata: None,
            smoothing: Smoothing::Median,
            min_crown_area: 1.0,
        }
    }
}

impl ImageryParams {
    fn growth(&self) -> GrowthParams {
        GrowthParams {
            seed_ratio: self.seed_threshold,
            crown_ratio: self.crown_threshold,
        }
    }

    fn schedule_bounds(&self, resolution: f64, max_height: f64) -> ScheduleBounds {
        let radius = self.max_diameter / 2.0 / resolution;
        ScheduleBounds {
            min_window: self.window_size,
            max_window: self.window_size,
            min_radius: radius,
            max_radius: radius,
            height_threshold: self.min_digital_number,
            max_height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.growth().validate()?;
        if !(self.max_diameter > 0.0) || !self.max_diameter.is_finite() {
            return Err(CrownError::config(format!(
                "max crown diameter must be positive, got {}",
                self.max_diameter
            )));
        }
        self.schedule_bounds(1.0, self.min_digital_number).validate()?;
        check_area(self.min_crown_area)
    }
}

/// Delineate crowns directly on a height (or digital-number) raster.
pub fn segment_from_imagery(raster: &Raster, params: &ImageryParams) -> Result<Vec<CrownRecord>> {
    params.validate()?;
    if raster.is_empty() || raster.data.len() != raster.len() {
        return Err(CrownError::degenerate(format!(
            "raster is {} x {} with {} values",
            raster.nrow,
            raster.ncol,
            raster.data.len()
        )));
    }

    let cleaned = raster.normalized(params.nodata, f64::NEG_INFINITY);
    let grid = params
        .smoothing
        .apply(&cleaned)
        .normalized(None, params.min_digital_number);

    let schedule =
        ParameterSchedule::build(&params.schedule_bounds(grid.res_x, grid.max_value()))?;
    let seeds = detect_seeds(&grid, &schedule, params.min_digital_number);
    if seeds.is_empty() {
        info!("imagery: no seed found on {} x {} grid", grid.nrow, grid.ncol);
        return Ok(Vec::new());
    }

    let grown = grow_regions(&grid, &seeds, &schedule, params.growth())?;
    let mut footprints = polygonize(&grown.labels, &grid);

    let crowns: Vec<CrownRecord> = seeds
        .iter()
        .filter_map(|seed| {
            let footprint = footprints.remove(&seed.id)?;
            let area = footprint.area();
            if area <= params.min_crown_area {
                return None;
            }
            let (x, y) = grid.rc_to_xy(seed.row, seed.col);
            Some(CrownRecord {
                id: seed.id,
                x,
                y,
                height: params.is_canopy_height_model.then_some(seed.height),
                area,
                footprint,
            })
        })
        .collect();

    info!(
        "imagery: {} seeds, {} crowns after {} sweeps",
        seeds.len(),
        crowns.len(),
        grown.sweeps
    );
    Ok(crowns)
}

// ---------------------------------------------------------------------------
// Point cloud
// ---------------------------------------------------------------------------

/// Parameters of [`segment_from_point_cloud`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudParams {
    /// Cell size of the rasterized canopy height model (map units).
    pub resolution: f64,
    pub min_window_size: usize,
    pub max_window_size: usize,
    pub seed_threshold: f64,
    pub crown_threshold: f64,
    /// Crown diameter range (map units); bounds the growth radius.
    pub min_diameter: f64,
    pub max_diameter: f64,
    /// Returns at or below this height are ground / understory.
    pub height_threshold: f64,
    /// Power applied to relative heights of the detection surface; 1 keeps it unchanged.
    pub contrast_exponent: f64,
    pub smoothing: Smoothing,
    /// Cells peeled off each region before its footprint is polygonized.
    pub footprint_margin: usize,
    /// Crowns whose area does not exceed this are dropped.
    pub min_crown_area: f64,
}

impl Default for PointCloudParams {
    fn default() -> Self {
        Self {
            resolution: 0.5,
            min_window_size: 3,
            max_window_size: 9,
            seed_threshold: 0.45,
            crown_threshold: 0.55,
            min_diameter: 1.0,
            max_diameter: 10.0,
            height_threshold: 2.0,
            contrast_exponent: 1.0,
            smoothing: Smoothing::Median,
            footprint_margin: 0,
            min_crown_area: 1.0,
        }
    }
}

impl PointCloudParams {
    fn growth(&self) -> GrowthParams {
        GrowthParams {
            seed_ratio: self.seed_threshold,
            crown_ratio: self.crown_threshold,
        }
    }

    fn schedule_bounds(&self, height_threshold: f64, max_height: f64) -> ScheduleBounds {
        ScheduleBounds {
            min_window: self.min_window_size,
            max_window: self.max_window_size,
            min_radius: self.min_diameter / 2.0 / self.resolution,
            max_radius: self.max_diameter / 2.0 / self.resolution,
            height_threshold,
            max_height,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.resolution > 0.0) || !self.resolution.is_finite() {
            return Err(CrownError::config(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.contrast_exponent > 0.0) || !self.contrast_exponent.is_finite() {
            return Err(CrownError::config(format!(
                "contrast exponent must be positive, got {}",
                self.contrast_exponent
            )));
        }
        self.growth().validate()?;
        self.schedule_bounds(self.height_threshold, self.height_threshold)
            .validate()?;
        check_area(self.min_crown_area)
    }
}

/// Contrast stretch `h ↦ hmax · (h / hmax)^γ`, identity for γ = 1 or flat grids.
fn stretch(h: f64, hmax: f64, gamma: f64) -> f64 {
    if h <= 0.0 || hmax <= 0.0 || gamma == 1.0 {
        h
    } else {
        hmax * (h / hmax).powf(gamma)
    }
}

/// Delineate crowns from a height-normalized point cloud.
pub fn segment_from_point_cloud(cloud: &PointCloud, params: &PointCloudParams) -> Result<Vec<CrownRecord>> {
    params.validate()?;
    if cloud.is_empty() {
        return Err(CrownError::degenerate("point cloud is empty"));
    }

    let chm = cloud.rasterize(params.resolution)?;
    let chm = params
        .smoothing
        .apply(&chm)
        .normalized(None, params.height_threshold);

    let hmax = chm.max_value();
    let gamma = params.contrast_exponent;
    let surface = chm.map(|h| stretch(h, hmax, gamma));
    let seed_floor = stretch(params.height_threshold, hmax, gamma);

    let schedule = ParameterSchedule::build(&params.schedule_bounds(seed_floor, surface.max_value()))?;
    let seeds = detect_seeds(&surface, &schedule, seed_floor);
    if seeds.is_empty() {
        info!(
            "point cloud: no seed found on {} x {} grid from {} points",
            surface.nrow,
            surface.ncol,
            cloud.len()
        );
        return Ok(Vec::new());
    }

    let grown = grow_regions(&surface, &seeds, &schedule, params.growth())?;
    let labels = grown.labels.eroded(params.footprint_margin);
    let footprints = polygonize(&labels, &surface);
    let refined = refine_crowns(
        &footprints,
        &cloud.points,
        params.height_threshold,
        params.min_crown_area,
    );

    let crowns: Vec<CrownRecord> = refined
        .into_iter()
        .map(|(id, c)| CrownRecord {
            id,
            x: c.apex.x,
            y: c.apex.y,
            height: Some(c.apex.z),
            area: c.area,
            footprint: c.hull,
        })
        .collect();

    info!(
        "point cloud: {} points, {} seeds, {} crowns after {} sweeps",
        cloud.len(),
        seeds.len(),
        crowns.len(),
        grown.sweeps
    );
    Ok(crowns)
}
