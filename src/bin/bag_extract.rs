//! bag_extract - extract camera images from a recorded bag
//!
//! Writes `<output_dir>/<camera>/Image_<seq>_sec<s>_nsec<ns>.jpg` for every
//! kept frame. FRAME_SKIP may come from the environment or `data_maker.env`.

use anyhow::Result;
use bagframes::extract::{self, ExtractOptions};
use bagframes::topics::{self, TopicNaming};
use bagframes::{bag, config};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Extracts images from ROS bags")]
struct Args {
    /// Bag to read: a ROS 2 bag directory, or a .bag, .mcap or .db3 file.
    bag_path: PathBuf,
    /// Directory for the extracted images; must be empty or missing.
    output_dir: PathBuf,
    /// Undistort frames with the camera calibration files.
    #[arg(short, long)]
    undistort: bool,
    /// Extract the compressed camera topics as well.
    #[arg(short, long)]
    compressed: bool,
    /// Directory containing one <camera>.yaml calibration file per camera.
    #[arg(short = 'p', long = "camera_info_path")]
    camera_info_path: Option<PathBuf>,
    /// Keep every Nth message of each topic.
    #[arg(long, env = "FRAME_SKIP", default_value_t = 1)]
    frame_skip: u32,
    /// Topic to extract (repeatable); replaces the default camera topics.
    #[arg(long = "topic")]
    topics: Vec<String>,
    /// Regex with a `key` group (camera and calibration name) and an optional
    /// `variant` group appended to the output directory name.
    #[arg(long, default_value = topics::DEFAULT_RULE)]
    topic_rule: String,
    /// Only count the images per topic.
    #[arg(long)]
    count_only: bool,
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
        logger.filter_module("bag_extract", log::LevelFilter::Debug);
    }
    logger.init();
    if let Some(path) = env_file {
        log::info!("loaded settings from {}", path.display());
    }
    log::info!("frame skip: {}", args.frame_skip);

    let topics = if args.topics.is_empty() {
        topics::default_topics(args.compressed)
    } else {
        args.topics
    };

    if args.count_only {
        let reader = bag::open(&args.bag_path)?;
        for (topic, count) in extract::count_images(reader.as_ref(), &topics)? {
            println!("{topic}: {count}");
        }
        return Ok(());
    }

    let opts = ExtractOptions {
        bag_path: args.bag_path,
        output_dir: args.output_dir,
        undistort: args.undistort,
        camera_info_path: args.camera_info_path,
        frame_skip: args.frame_skip,
        topics,
        naming: TopicNaming::new(&args.topic_rule)?,
        show_progress: std::io::stderr().is_terminal(),
    };
    let summary = extract::run(&opts)?;

    log::info!("extraction done in {:.2?}", summary.elapsed);
    for (topic, state) in &summary.per_topic {
        log::info!("{topic}: kept {} of {}", state.retained, state.seen);
    }
    log::info!("skipped {} frames", summary.skipped);
    log::info!("extracted {} frames", summary.extracted);
    Ok(())
}
