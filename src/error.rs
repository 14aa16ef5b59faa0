use std::path::PathBuf;
use thiserror::Error;

/// Every failure is fatal to the run; nothing here is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid range #{index}: {reason}")]
    InvalidRange { index: usize, reason: String },

    #[error("position {position} is out of range for {len} items")]
    IndexOutOfRange { position: u64, len: usize },

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("frame skip must be at least 1, got {0}")]
    InvalidFrameSkip(u32),

    #[error("topic naming: {0}")]
    TopicNaming(String),

    #[error("output directory {} exists and is not empty", .0.display())]
    OutputNotEmpty(PathBuf),

    #[error("input bag {} is not a db3, mcap or bag store", .0.display())]
    UnknownStore(PathBuf),

    #[error("bag read failed: {0}")]
    Bag(String),

    #[error("failed to decode {msg_type} message: {reason}")]
    Decode { msg_type: String, reason: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write image {}: {source}", path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("calibration {}: {reason}", path.display())]
    Calibration { path: PathBuf, reason: String },

    #[error("calibration missing or invalid for {} topic(s):\n{}", .0.len(), .0.join("\n"))]
    MissingCalibration(Vec<String>),

    #[error("video encoding failed: {0}")]
    Video(#[from] ffmpeg_next::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(msg_type: &str, reason: impl Into<String>) -> Self {
        Error::Decode {
            msg_type: msg_type.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
