//! Tree crown delineation from a canopy height GeoTIFF or a LiDAR point CSV.
//!
//! Usage:
//!   crownseg imagery CHM.tif --window 5 --max-diameter 12
//!   crownseg lidar points.csv --resolution 0.5 --crown --biome 0
//!
//! Writes crowns.csv with columns id, x, y, h, area, diameter [, dbh] [, crown_wkt]

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use csv::Writer;
use log::{info, warn};
use serde::de::DeserializeOwned;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crownseg::{
    allometry, segment_from_imagery, segment_from_point_cloud, CrownRecord, ImageryParams, Point3,
    PointCloud, PointCloudParams, Raster,
};

/// GDAL_NODATA, stored as ASCII.
const GDAL_NODATA_TAG: u16 = 42113;

// ==========================================================================
// GeoTIFF input
// ==========================================================================

/// Resolution and origin from ModelPixelScale (33550) and ModelTiepoint (33922).
///
/// Returns (res_x, res_y, origin_x, origin_y); missing tags fall back to unit
/// cells at (0, 0).
fn geotiff_extent_from_decoder<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> (f64, f64, f64, f64) {
    let mut res = None;
    let mut origin = None;

    if let Ok(Some(scale_val)) = decoder.find_tag(Tag::ModelPixelScaleTag) {
        if let Ok(scale) = scale_val.into_f64_vec() {
            if scale.len() >= 2 {
                res = Some((scale[0], scale[1]));
            }
        }
    }
    if let Ok(Some(tie_val)) = decoder.find_tag(Tag::ModelTiepointTag) {
        if let Ok(tie) = tie_val.into_f64_vec() {
            if tie.len() >= 6 {
                origin = Some((tie[3], tie[4]));
            }
        }
    }

    if res.is_none() {
        warn!("ModelPixelScale tag (33550) missing, assuming 1 m cells");
    }
    if origin.is_none() {
        warn!("ModelTiepoint tag (33922) missing, assuming origin (0, 0)");
    }
    let (res_x, res_y) = res.unwrap_or((1.0, 1.0));
    let (origin_x, origin_y) = origin.unwrap_or((0.0, 0.0));
    (res_x, res_y, origin_x, origin_y)
}

fn gdal_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let value = decoder.find_tag(Tag::Unknown(GDAL_NODATA_TAG)).ok()??;
    value.into_string().ok()?.trim_end_matches('\0').trim().parse().ok()
}

/// Read one band of a GeoTIFF as a height grid; returns the grid and the
/// file's no-data value if it declares one.
fn load_geotiff(path: &Path, band: usize) -> Result<(Raster, Option<f64>)> {
    let file = File::open(path).with_context(|| format!("cannot open '{}'", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("'{}' is not a readable TIFF", path.display()))?;

    let (width, height) = decoder.dimensions()?;
    let ncol = width as usize;
    let nrow = height as usize;
    let (res_x, res_y, origin_x, origin_y) = geotiff_extent_from_decoder(&mut decoder);
    let nodata = gdal_nodata(&mut decoder);

    let raw: Vec<f64> = match decoder.read_image()? {
        DecodingResult::F64(v) => v,
        DecodingResult::F32(v) => v.iter().map(|x| *x as f64).collect(),
        DecodingResult::U16(v) => v.iter().map(|x| *x as f64).collect(),
        DecodingResult::U8(v) => v.iter().map(|x| *x as f64).collect(),
        DecodingResult::I16(v) => v.iter().map(|x| *x as f64).collect(),
        DecodingResult::I32(v) => v.iter().map(|x| *x as f64).collect(),
        _ => bail!("unsupported pixel format in '{}'", path.display()),
    };

    let total_pixels = nrow * ncol;
    if total_pixels == 0 {
        bail!("'{}' has no pixels", path.display());
    }
    let n_bands = raw.len() / total_pixels;
    if band >= n_bands {
        bail!("band {} requested but '{}' has {} band(s)", band, path.display(), n_bands);
    }
    let data: Vec<f64> = if n_bands > 1 {
        (0..total_pixels).map(|px| raw[px * n_bands + band]).collect()
    } else {
        raw
    };

    let xmin = origin_x;
    let ymax = origin_y;
    let raster = Raster::try_from_vec(nrow, ncol, data)?.with_extent(
        xmin,
        xmin + ncol as f64 * res_x,
        ymax - nrow as f64 * res_y,
        ymax,
    );
    info!(
        "'{}': {} x {} cells of {} x {} map units, {} band(s)",
        path.display(),
        ncol,
        nrow,
        res_x,
        res_y,
        n_bands
    );
    Ok((raster, nodata))
}

// ==========================================================================
// Point CSV input
// ==========================================================================

/// Points from a CSV with `x`, `y`, `z` header columns (other columns ignored).
fn load_points(path: &Path) -> Result<Vec<Point3>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("cannot open '{}'", path.display()))?;
    let mut points = Vec::new();
    for (i, record) in reader.deserialize::<Point3>().enumerate() {
        points.push(record.with_context(|| format!("bad point on line {}", i + 2))?);
    }
    info!("'{}': {} points", path.display(), points.len());
    Ok(points)
}

fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        None => Ok(T::default()),
        Some(p) => {
            let file = File::open(p).with_context(|| format!("cannot open config '{}'", p.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("invalid config '{}'", p.display()))
        }
    }
}

// ==========================================================================
// CSV export
// ==========================================================================

fn export_csv(crowns: &[CrownRecord], path: &Path, with_crown: bool, biome: Option<u32>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create '{}'", path.display()))?;
    let mut wtr = Writer::from_writer(BufWriter::new(file));

    let mut header = vec!["id", "x", "y", "h", "area", "diameter"];
    if biome.is_some() {
        header.push("dbh");
    }
    if with_crown {
        header.push("crown_wkt");
    }
    wtr.write_record(&header)?;

    for c in crowns {
        let diameter = c.crown_diameter();
        let mut row = vec![
            c.id.to_string(),
            format!("{:.2}", c.x),
            format!("{:.2}", c.y),
            c.height.map(|h| format!("{h:.2}")).unwrap_or_default(),
            format!("{:.2}", c.area),
            format!("{diameter:.2}"),
        ];
        if let Some(b) = biome {
            let dbh = match c.height {
                Some(h) if h > 0.0 => format!("{:.1}", allometry::dbh(h, diameter, b)?),
                _ => String::new(),
            };
            row.push(dbh);
        }
        if with_crown {
            row.push(c.footprint.to_wkt());
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

// ==========================================================================
// CLI (clap)
// ==========================================================================

#[derive(Parser, Debug)]
#[command(
    name = "crownseg",
    about = "Tree crown delineation on canopy height rasters and LiDAR point clouds",
    after_help = "Writes: id, x, y, h, area, diameter [, dbh] [, crown_wkt]"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output CSV file
    #[arg(long, short, global = true, default_value = "crowns.csv")]
    output: PathBuf,

    /// JSON parameter file; flags override its fields
    #[arg(long, global = true, value_name = "params.json")]
    config: Option<PathBuf>,

    /// Coordinate reference system tag of the input (e.g. EPSG:2154)
    #[arg(long, global = true)]
    crs: Option<String>,

    /// Export crown outlines as WKT
    #[arg(long, global = true)]
    crown: bool,

    /// Add a dbh column using this biome code (0 = global angiosperm fit)
    #[arg(long, global = true)]
    biome: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delineate crowns on a canopy height (or digital number) GeoTIFF
    Imagery(ImageryArgs),
    /// Delineate crowns on a height-normalized point cloud (CSV with x,y,z)
    Lidar(LidarArgs),
}

#[derive(Args, Debug)]
struct ImageryArgs {
    #[arg(value_name = "CHM.tif")]
    input: PathBuf,
    /// Band to read from multi-band files
    #[arg(long, default_value_t = 0)]
    band: usize,
    /// Seed search window (odd, cells)
    #[arg(long)]
    window: Option<usize>,
    /// Seed height ratio
    #[arg(long)]
    seed_threshold: Option<f64>,
    /// Crown mean height ratio
    #[arg(long)]
    crown_threshold: Option<f64>,
    /// Maximum crown diameter (map units)
    #[arg(long)]
    max_diameter: Option<f64>,
    /// Minimum value of a tree cell
    #[arg(long)]
    min_dn: Option<f64>,
    /// Values are digital numbers, not heights
    #[arg(long)]
    digital_numbers: bool,
}

#[derive(Args, Debug)]
struct LidarArgs {
    #[arg(value_name = "points.csv")]
    input: PathBuf,
    /// Raster cell size (map units)
    #[arg(long)]
    resolution: Option<f64>,
    #[arg(long)]
    min_window: Option<usize>,
    #[arg(long)]
    max_window: Option<usize>,
    #[arg(long)]
    seed_threshold: Option<f64>,
    #[arg(long)]
    crown_threshold: Option<f64>,
    #[arg(long)]
    min_diameter: Option<f64>,
    #[arg(long)]
    max_diameter: Option<f64>,
    /// Minimum height of a tree return
    #[arg(long)]
    hmin: Option<f64>,
    /// Contrast exponent of the detection surface
    #[arg(long)]
    contrast: Option<f64>,
}

fn run_imagery(args: &ImageryArgs, cli: &Cli) -> Result<Vec<CrownRecord>> {
    let mut params: ImageryParams = load_config(cli.config.as_deref())?;
    if let Some(v) = args.window {
        params.window_size = v;
    }
    if let Some(v) = args.seed_threshold {
        params.seed_threshold = v;
    }
    if let Some(v) = args.crown_threshold {
        params.crown_threshold = v;
    }
    if let Some(v) = args.max_diameter {
        params.max_diameter = v;
    }
    if let Some(v) = args.min_dn {
        params.min_digital_number = v;
    }
    if args.digital_numbers {
        params.is_canopy_height_model = false;
    }

    let (raster, nodata) = load_geotiff(&args.input, args.band)?;
    if params.nodata.is_none() {
        params.nodata = nodata;
    }
    let raster = raster.with_crs(cli.crs.clone());
    info!("parameters: {}", serde_json::to_string(&params)?);
    Ok(segment_from_imagery(&raster, &params)?)
}

fn run_lidar(args: &LidarArgs, cli: &Cli) -> Result<Vec<CrownRecord>> {
    let mut params: PointCloudParams = load_config(cli.config.as_deref())?;
    if let Some(v) = args.resolution {
        params.resolution = v;
    }
    if let Some(v) = args.min_window {
        params.min_window_size = v;
    }
    if let Some(v) = args.max_window {
        params.max_window_size = v;
    }
    if let Some(v) = args.seed_threshold {
        params.seed_threshold = v;
    }
    if let Some(v) = args.crown_threshold {
        params.crown_threshold = v;
    }
    if let Some(v) = args.min_diameter {
        params.min_diameter = v;
    }
    if let Some(v) = args.max_diameter {
        params.max_diameter = v;
    }
    if let Some(v) = args.hmin {
        params.height_threshold = v;
    }
    if let Some(v) = args.contrast {
        params.contrast_exponent = v;
    }

    let cloud = PointCloud::new(load_points(&args.input)?).with_crs(cli.crs.clone());
    info!("parameters: {}", serde_json::to_string(&params)?);
    Ok(segment_from_point_cloud(&cloud, &params)?)
}

fn log_summary(crowns: &[CrownRecord]) {
    if crowns.is_empty() {
        info!("no crown delineated");
        return;
    }
    let areas: Vec<f64> = crowns.iter().map(|c| c.area).collect();
    let heights: Vec<f64> = crowns.iter().filter_map(|c| c.height).collect();
    info!(
        "{} crowns, mean area {:.1}, total area {:.1}",
        crowns.len(),
        areas.iter().sum::<f64>() / areas.len() as f64,
        areas.iter().sum::<f64>()
    );
    if !heights.is_empty() {
        let h_min = heights.iter().cloned().fold(f64::INFINITY, f64::min);
        let h_max = heights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let h_mean = heights.iter().sum::<f64>() / heights.len() as f64;
        info!("heights: min={h_min:.1} mean={h_mean:.1} max={h_max:.1}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(b) = cli.biome {
        allometry::dbh(1.0, 1.0, b).context("--biome")?;
    }

    let t0 = std::time::Instant::now();
    let crowns = match &cli.command {
        Command::Imagery(args) => run_imagery(args, &cli)?,
        Command::Lidar(args) => run_lidar(args, &cli)?,
    };
    info!("delineation took {:.2}s", t0.elapsed().as_secs_f64());
    log_summary(&crowns);

    export_csv(&crowns, &cli.output, cli.crown, cli.biome)?;
    info!("{} rows written to '{}'", crowns.len(), cli.output.display());
    Ok(())
}
