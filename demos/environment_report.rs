//! Camera Environment Report
//!
//! Loads a camera environment descriptor and logs its summary. With
//! `--extent`, a flat terrain of that half-width is laid out below the camera,
//! the correspondence index is built over it and a grid of image pixels is
//! inverse-projected. The index can be exported as JSON.
//!
//! Usage:
//! ```bash
//! RUST_LOG=info cargo run --example environment_report -- \
//!   --environment samples/environment.yaml \
//!   --extent 60 --json output/correspondences.json
//! ```

use camenv_tools::geometry::sample_pixels;
use camenv_tools::terrain::{GridTerrain, TerrainModel};
use camenv_tools::CameraEnvironment;
use clap::Parser;
use log::info;
use nalgebra::DMatrix;
use std::path::PathBuf;

/// Camera environment report tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the camera environment descriptor (.txt or .yaml)
    #[arg(short = 'e', long)]
    environment: PathBuf,

    /// Half-width of a flat test terrain centred below the camera
    #[arg(long)]
    extent: Option<f64>,

    /// Elevation of the flat test terrain
    #[arg(long, default_value_t = 0.0)]
    elevation: f64,

    /// Grid spacing of the flat test terrain
    #[arg(long, default_value_t = 2.0)]
    spacing: f64,

    /// Number of pixels to inverse-project
    #[arg(short = 'n', long, default_value_t = 25)]
    num_points: usize,

    /// Write the correspondence index to this JSON file
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();

    let env = CameraEnvironment::load(&cli.environment)?;
    env.report();

    let Some(extent) = cli.extent else {
        return Ok(());
    };

    let [cx, cy, _] = env.pose().location;
    let cells = (2.0 * extent / cli.spacing).ceil() as usize + 1;
    let terrain = TerrainModel::from_elevation(
        DMatrix::from_element(cells, cells, cli.elevation),
        (cx - extent, cy - extent),
        cli.spacing,
    )?;
    let env = env.bind_terrain(GridTerrain::new(terrain));

    let projector = env.build_inverse_index()?;
    info!(
        "Index: {} correspondences from {} visible cells, {} triangles",
        projector.index().len(),
        projector.index().visible_cells(),
        projector.triangle_count()
    );

    let pixels = sample_pixels(env.resolution(), cli.num_points);
    let world = env.invproject(&pixels)?;
    let mut defined = 0;
    for (pixel, point) in pixels.column_iter().zip(world.column_iter()) {
        if point[0].is_nan() {
            info!("({:7.1}, {:7.1}) -> off terrain", pixel[0], pixel[1]);
        } else {
            defined += 1;
            info!(
                "({:7.1}, {:7.1}) -> ({:.2}, {:.2}, {:.2})",
                pixel[0], pixel[1], point[0], point[1], point[2]
            );
        }
    }
    info!("{defined} of {} pixels land on the terrain", pixels.ncols());

    if let Some(path) = &cli.json {
        projector.index().save_to_json(path)?;
        info!("Correspondences written to {}", path.display());
    }

    Ok(())
}
