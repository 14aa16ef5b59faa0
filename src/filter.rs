//! Frame-range filter: copies the selected positions of a directory listing to
//! `filtered/`, the complement to `inverse_filtered/`, and optionally encodes
//! each side into a video.

use crate::copier;
use crate::error::{Error, Result};
use crate::ranges::{self, RangeSet};
use crate::video;
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::path::PathBuf;

pub const FILTERED_DIR: &str = "filtered";
pub const INVERSE_DIR: &str = "inverse_filtered";
pub const VIDEO_DIR: &str = "video";

#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub source_dir: PathBuf,
    /// Configured `[start, end]` pairs, in index units or rate units.
    pub ranges: Vec<[f64; 2]>,
    /// Frames per configured unit. `None` means the pairs are already indices.
    pub rate: Option<f64>,
    /// Shortest trailing gap kept in the inverse set.
    pub min_gap: Option<u64>,
    pub make_video: bool,
    pub fps: Option<u32>,
    pub show_progress: bool,
}

impl FilterOptions {
    fn effective_min_gap(&self) -> u64 {
        self.min_gap
            .or_else(|| self.rate.map(|rate| rate.ceil() as u64))
            .unwrap_or(1)
    }

    fn effective_fps(&self) -> u32 {
        self.fps
            .or_else(|| self.rate.map(|rate| rate.round() as u32))
            .filter(|&fps| fps > 0)
            .unwrap_or(video::DEFAULT_FPS)
    }
}

#[derive(Debug, Clone)]
pub struct SideReport {
    pub dir: PathBuf,
    pub ranges: RangeSet,
    pub copied: u64,
    pub video: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FilterReport {
    pub total_items: usize,
    pub kept: SideReport,
    pub inverse: SideReport,
}

fn progress_bar(enabled: bool, message: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{msg:>10} [{bar:40}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}

/// Resolves the configured pairs into a range set over `total` items.
pub fn resolve_ranges(opts: &FilterOptions, total: usize) -> Result<RangeSet> {
    let set = ranges::scale(&opts.ranges, opts.rate)?;
    if set.max_end() <= total as u64 {
        return Ok(set);
    }
    if opts.rate.is_some() {
        log::warn!(
            "scaled ranges end at {} but only {} items exist; clamping",
            set.max_end(),
            total
        );
        return Ok(set.clamp(total as u64));
    }
    Err(Error::IndexOutOfRange {
        position: set.max_end() - 1,
        len: total,
    })
}

fn populate_side(
    name: &'static str,
    items: &[OsString],
    set: RangeSet,
    opts: &FilterOptions,
) -> Result<SideReport> {
    let dir = opts.source_dir.join(name);
    copier::recreate_dir(&dir)?;

    log::info!(
        "copying {} of {} items into {}",
        set.span(),
        items.len(),
        dir.display()
    );
    let copied = copier::copy_selected(
        items,
        &set,
        &opts.source_dir,
        &dir,
        &progress_bar(opts.show_progress, name),
    )?;
    if copied != set.span() {
        log::warn!("{name}: copied {copied} items, expected {}", set.span());
    }
    copier::write_summary(&dir, copied)?;

    let video = if opts.make_video {
        let output = dir.join(VIDEO_DIR).join(format!("{name}.mp4"));
        let frames = set.positions().map(|p| dir.join(&items[p as usize]));
        let bar = progress_bar(opts.show_progress, "encoding");
        bar.set_length(set.span());
        video::encode_sequence(frames, &output, opts.effective_fps(), &bar)?;
        Some(output)
    } else {
        None
    };

    Ok(SideReport {
        dir,
        ranges: set,
        copied,
        video,
    })
}

pub fn run(opts: &FilterOptions) -> Result<FilterReport> {
    log::info!("scanning {}", opts.source_dir.display());
    let items = copier::list_items(&opts.source_dir)?;
    log::info!("found {} items", items.len());

    let kept = resolve_ranges(opts, items.len())?;
    let inverse = kept.invert(items.len() as u64, opts.effective_min_gap());
    log::debug!("keeping {:?}", kept.ranges());
    log::debug!("inverse {:?}", inverse.ranges());

    let kept = populate_side(FILTERED_DIR, &items, kept, opts)?;
    let inverse = populate_side(INVERSE_DIR, &items, inverse, opts)?;
    Ok(FilterReport {
        total_items: items.len(),
        kept,
        inverse,
    })
}

