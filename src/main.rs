//! arap-deform - drag pins on an image and warp it as rigidly as possible
//!
//! Loads an image, lays a deformation lattice over its foreground, replays
//! a script of pin/drag/unpin steps and writes the deformed result.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arap_deform::config::Config;
use arap_deform::overlay::{self, OutlineExport};
use arap_deform::script::Script;
use arap_deform::session::Session;

/// As-rigid-as-possible image deformation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input image (PNG or JPEG)
    input: PathBuf,

    /// TOML script of pin/drag/unpin/settle steps
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Where to write the deformed image
    #[arg(short, long, default_value = "deformed.png")]
    output: PathBuf,

    /// Also write the image with the lattice drawn over it
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Also write the cell outlines as JSON
    #[arg(long)]
    outlines: Option<PathBuf>,

    /// Extra frames to run after the script
    #[arg(long, default_value_t = 10)]
    settle: u32,

    /// Configuration file path (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("arap-deform v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => Config::load_or_create(path)?,
        None => Config::default(),
    };
    info!(
        "Lattice: {}px cells, pin weight {}, {:?} sampling",
        config.lattice.cell_size, config.lattice.pin_weight, config.projection.sampling
    );

    let mut session = Session::open(&args.input, &config)?;

    if let Some(path) = &args.script {
        let script = Script::load(path)?;
        if script.is_empty() {
            warn!("Script {:?} has no steps", path);
        }
        session.play(&script);
    }

    if let Some(stats) = session.settle(args.settle) {
        info!(
            "Final frame {}: {} cells projected, {} skipped in {:?}",
            stats.frame, stats.projected, stats.skipped, stats.elapsed
        );
    }

    session.source().save(&args.output)?;

    if let Some(path) = &args.overlay {
        let image = overlay::render(
            &session.source().to_image(),
            &session.outlines(),
            session.handles().iter(),
            session.handles().radius(),
        );
        overlay::save_overlay(path, &image)?;
    }

    if let Some(path) = &args.outlines {
        let cells = session.outlines();
        let export = OutlineExport {
            width: session.source().width(),
            height: session.source().height(),
            cells: &cells,
            handles: session.handles().iter().copied().collect(),
        };
        overlay::save_outlines(path, &export)?;
    }

    Ok(())
}
