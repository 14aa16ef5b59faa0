//! Offline data preparation for camera datasets.
//!
//! - [`filter`] copies index ranges of an extracted frame directory (and their
//!   complement) into `filtered/` and `inverse_filtered/`, optionally as video.
//! - [`extract`] walks a recorded bag, thins each camera topic with a
//!   frame-skip policy and writes the kept frames as numbered JPEGs, optionally
//!   undistorted with per-camera calibration.

pub mod bag;
pub mod calibration;
pub mod config;
pub mod copier;
pub mod demux;
pub mod error;
pub mod export;
pub mod extract;
pub mod filter;
pub mod messages;
pub mod ranges;
pub mod topics;
pub mod video;

pub use error::{Error, Result};
pub use ranges::{Range, RangeSet};
