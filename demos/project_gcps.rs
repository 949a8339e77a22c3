//! Ground Control Point Check
//!
//! Loads a camera environment descriptor, projects its ground control points
//! into the reference image and reports the reprojection error. The GCP
//! pixels are then projected back onto a flat plane at the mean GCP
//! elevation, as a quick sanity check of the inverse path.
//!
//! Usage:
//! ```bash
//! cargo run --example project_gcps -- \
//!   --environment samples/environment.txt \
//!   --spacing 1.0
//! ```

use camenv_tools::terrain::{GridTerrain, TerrainModel};
use camenv_tools::CameraEnvironment;
use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{info, warn};
use nalgebra::DMatrix;
use std::path::PathBuf;

/// Ground control point reprojection tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the camera environment descriptor (.txt or .yaml)
    #[arg(short = 'e', long)]
    environment: PathBuf,

    /// GCP file, overriding the one named by the descriptor
    #[arg(short = 'g', long)]
    gcps: Option<PathBuf>,

    /// Cell size of the flat check plane, in world units
    #[arg(short = 's', long, default_value_t = 1.0)]
    spacing: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let cli = Cli::parse();

    let env = CameraEnvironment::load(&cli.environment)?;
    env.report();

    let gcps = match &cli.gcps {
        Some(path) => camenv_tools::GroundControlPoints::load(path)?,
        None => env.ground_control_points()?,
    };
    let error = env.gcp_reprojection_error(&gcps)?;
    info!("GCP reprojection over {} points: {:?}", gcps.len(), error);

    // Flat plane spanning the GCPs, with a margin of ten cells
    let (mut min_x, mut max_x, mut min_y, mut max_y) =
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for p in gcps.world.column_iter() {
        min_x = min_x.min(p[0]);
        max_x = max_x.max(p[0]);
        min_y = min_y.min(p[1]);
        max_y = max_y.max(p[1]);
    }
    let elevation = gcps.world.row(2).mean();
    let margin = 10.0 * cli.spacing;
    let cols = ((max_x - min_x + 2.0 * margin) / cli.spacing).ceil() as usize + 1;
    let rows = ((max_y - min_y + 2.0 * margin) / cli.spacing).ceil() as usize + 1;
    let plane = TerrainModel::from_elevation(
        DMatrix::from_element(rows, cols, elevation),
        (min_x - margin, min_y - margin),
        cli.spacing,
    )?;

    let env = env.bind_terrain(GridTerrain::new(plane));
    let world = env.invproject(&gcps.pixels)?;
    for (i, (back, surveyed)) in world.column_iter().zip(gcps.world.column_iter()).enumerate() {
        if back[0].is_nan() {
            warn!("GCP {i}: pixel falls outside the check plane");
            continue;
        }
        let offset = (back.xy() - surveyed.xy()).norm();
        info!(
            "GCP {i}: surveyed ({:.2}, {:.2}), on plane ({:.2}, {:.2}), offset {:.3}",
            surveyed[0], surveyed[1], back[0], back[1], offset
        );
    }

    Ok(())
}
