//! # crownseg: individual tree crown delineation
//!
//! Delineates tree crowns on a canopy height raster, or on a LiDAR point cloud
//! rasterized into one, by seeded region growing:
//!
//! - **Seed detection** with a search window that widens with tree height
//!   ([`detect_seeds`], [`ParameterSchedule`])
//! - **Region growing** under seed-ratio, crown-mean-ratio, ascent and
//!   growth-radius constraints ([`grow_regions`])
//! - **Crown refinement** on the LiDAR path: an Otsu split of each crown's
//!   point heights separates crown returns from understory ([`refine_crowns`])
//! - **Allometry** helpers turning crown height and diameter into stem
//!   diameter and biomass ([`allometry`])
//!
//! Entry points: [`segment_from_imagery`] and [`segment_from_point_cloud`].

pub mod allometry;
pub mod delineation;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod growth;
pub mod labels;
pub mod otsu;
pub mod points;
pub mod raster;
pub mod refine;
pub mod schedule;
pub mod seeds;

pub use delineation::{
    segment_from_imagery, segment_from_point_cloud, CrownRecord, ImageryParams, PointCloudParams,
};
pub use error::{CrownError, Result};
pub use filter::Smoothing;
pub use geometry::Polygon;
pub use growth::{grow_regions, GrowthOutcome, GrowthParams, RegionGrower};
pub use labels::LabelGrid;
pub use otsu::otsu_threshold;
pub use points::{Point3, PointCloud};
pub use raster::Raster;
pub use refine::{refine_crown, refine_crowns};
pub use schedule::{ParameterSchedule, ScheduleBounds, StepFunction};
pub use seeds::{detect_seeds, Seed, SeedTable};
