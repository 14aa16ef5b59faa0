//! frame_filter - keep index ranges of an extracted frame directory
//!
//! Settings come from flags, the environment, or `data_maker.env`.

use anyhow::Result;
use bagframes::config;
use bagframes::filter::{self, FilterOptions};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the extracted frames.
    #[arg(long, env = "SOURCE_DIR")]
    source_dir: PathBuf,
    /// Ranges to keep, e.g. "[[0, 120], [300, 450]]".
    #[arg(long, env = "RANGES")]
    ranges: String,
    /// Frames per range unit; ranges are scaled by it and truncated.
    #[arg(long, env = "RATE")]
    rate: Option<f64>,
    /// Shortest trailing gap kept in inverse_filtered (default: one rate unit).
    #[arg(long, env = "MIN_GAP")]
    min_gap: Option<u64>,
    /// Also encode each side into <side>/video/<side>.mp4.
    #[arg(long, env = "MAKE_VIDEO")]
    video: bool,
    /// Video frame rate (default: the rate, else 30).
    #[arg(long, env = "VIDEO_FPS")]
    fps: Option<u32>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let env_file = config::load_env_file()?;
    let args = Args::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_module("bagframes", log::LevelFilter::Debug);
        logger.filter_module("frame_filter", log::LevelFilter::Debug);
    }
    logger.init();
    if let Some(path) = env_file {
        log::info!("loaded settings from {}", path.display());
    }

    let opts = FilterOptions {
        source_dir: args.source_dir,
        ranges: config::parse_ranges(&args.ranges)?,
        rate: args.rate,
        min_gap: args.min_gap,
        make_video: args.video,
        fps: args.fps,
        show_progress: std::io::stderr().is_terminal(),
    };
    log::info!("ranges to keep: {:?}", opts.ranges);

    let report = filter::run(&opts)?;
    log::info!(
        "kept {} and inverse {} of {} items",
        report.kept.copied,
        report.inverse.copied,
        report.total_items
    );
    for side in [&report.kept, &report.inverse] {
        if let Some(video) = &side.video {
            log::info!("video written to {}", video.display());
        }
    }
    Ok(())
}
