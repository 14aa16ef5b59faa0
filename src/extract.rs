//! Bag-to-image extraction: picks the camera topics present in a bag, thins
//! them with the frame-skip policy and writes each kept frame as a JPEG.

use crate::bag::{self, BagReader, TopicInfo};
use crate::calibration::{CalibrationStore, DirectoryStore, ProfileCache};
use crate::demux::{Demultiplexer, TopicState};
use crate::error::{Error, Result};
use crate::export::ImageMaterializer;
use crate::messages;
use crate::topics::TopicNaming;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub bag_path: PathBuf,
    pub output_dir: PathBuf,
    pub undistort: bool,
    pub camera_info_path: Option<PathBuf>,
    pub frame_skip: u32,
    /// Topics to extract when present in the bag.
    pub topics: Vec<String>,
    pub naming: TopicNaming,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractSummary {
    pub extracted: u64,
    pub skipped: u64,
    pub per_topic: BTreeMap<String, TopicState>,
    pub elapsed: Duration,
}

/// Refuses a populated output directory. Returns `true` when the directory
/// does not exist yet; nothing is created here.
pub fn check_output_dir(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }
    let mut entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    if entries.next().is_some() {
        return Err(Error::OutputNotEmpty(dir.to_path_buf()));
    }
    Ok(false)
}

/// Topics of `reader` that were asked for and carry images, in catalog order.
pub fn interest_topics<'r>(reader: &'r dyn BagReader, wanted: &[String]) -> Vec<&'r TopicInfo> {
    reader
        .topics()
        .iter()
        .filter(|t| wanted.iter().any(|w| *w == t.name))
        .filter(|t| {
            let image = messages::is_image_type(&t.msg_type);
            if !image {
                log::warn!("skipping {}: {} is not an image type", t.name, t.msg_type);
            }
            image
        })
        .collect()
}

fn progress_spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} images written ({elapsed})") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Checks the output directory, the bag and the calibration settings before
/// the output directory is created.
pub fn run(opts: &ExtractOptions) -> Result<ExtractSummary> {
    let missing = check_output_dir(&opts.output_dir)?;
    let reader = bag::open(&opts.bag_path)?;
    let store = if opts.undistort {
        let root = opts
            .camera_info_path
            .as_ref()
            .ok_or_else(|| Error::Config("--undistort needs --camera_info_path".into()))?;
        Some(DirectoryStore::new(root)?)
    } else {
        None
    };

    if missing {
        fs::create_dir_all(&opts.output_dir).map_err(|e| Error::io(&opts.output_dir, e))?;
    }
    log::debug!("output directory: {}", opts.output_dir.display());
    extract(reader.as_ref(), opts, store)
}

/// Runs the extraction over an open reader. With a calibration store, every
/// frame is undistorted; all calibration files are checked before the first
/// message is read.
pub fn extract<S: CalibrationStore>(
    reader: &dyn BagReader,
    opts: &ExtractOptions,
    store: Option<S>,
) -> Result<ExtractSummary> {
    let start = Instant::now();
    let interest = interest_topics(reader, &opts.topics);
    if interest.is_empty() {
        log::info!("no images to extract from this bag");
        return Ok(ExtractSummary::default());
    }
    for topic in &interest {
        log::info!("extracting {} ({})", topic.name, topic.msg_type);
    }

    opts.naming.validate(interest.iter().map(|t| t.name.as_str()))?;
    let profiles = match store {
        Some(store) => {
            let keys: BTreeSet<String> = interest
                .iter()
                .filter_map(|t| opts.naming.key(&t.name))
                .collect();
            let mut cache = ProfileCache::new(store);
            cache.preload(keys.iter().map(String::as_str))?;
            Some(cache)
        }
        None => None,
    };

    let catalog: HashMap<&str, &TopicInfo> =
        interest.iter().map(|t| (t.name.as_str(), *t)).collect();
    let mut demux = Demultiplexer::new(catalog.keys().copied(), opts.frame_skip)?;
    let mut materializer =
        ImageMaterializer::new(&opts.output_dir, opts.naming.clone(), profiles);

    let report_every = 1000 * u64::from(opts.frame_skip);
    let progress = progress_spinner(opts.show_progress);
    let mut extracted = 0u64;
    for retained in demux.process(reader.messages()) {
        let retained = retained?;
        let topic = catalog
            .get(retained.message.topic.as_str())
            .copied()
            .ok_or_else(|| Error::Bag(format!("unexpected topic {}", retained.message.topic)))?;
        materializer.materialize(&retained, topic)?;
        extracted += 1;
        progress.inc(1);
        if extracted % report_every == 0 {
            log::info!("processed {extracted} images");
        }
    }
    progress.finish_and_clear();

    let per_topic = interest
        .iter()
        .map(|t| (t.name.clone(), demux.state(&t.name).unwrap_or_default()))
        .collect();
    Ok(ExtractSummary {
        extracted,
        skipped: demux.skipped(),
        per_topic,
        elapsed: start.elapsed(),
    })
}

/// Number of messages on each wanted topic, without decoding anything.
pub fn count_images(reader: &dyn BagReader, wanted: &[String]) -> Result<BTreeMap<String, u64>> {
    let mut counts: BTreeMap<String, u64> = interest_topics(reader, wanted)
        .into_iter()
        .map(|t| (t.name.clone(), 0))
        .collect();
    for message in reader.messages() {
        let message = message?;
        if let Some(count) = counts.get_mut(&message.topic) {
            *count += 1;
        }
    }
    Ok(counts)
}
