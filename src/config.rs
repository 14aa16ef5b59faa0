use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_ENV_FILE: &str = "data_maker.env";
pub const ENV_FILE_VAR: &str = "DATA_MAKER_ENV";

/// Loads `KEY=VALUE` settings into the process environment. Variables already
/// set win over the file. Returns the file that was read, if any.
pub fn load_env_file() -> Result<Option<PathBuf>> {
    let path = std::env::var_os(ENV_FILE_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));
    load_env_file_from(&path)
}

pub fn load_env_file_from(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    dotenvy::from_path(path)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    Ok(Some(path.to_path_buf()))
}

/// Parses a `RANGES` value such as `[[0, 5], [10.5, 12]]`.
pub fn parse_ranges(raw: &str) -> Result<Vec<[f64; 2]>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Config("RANGES is empty".into()));
    }
    serde_json::from_str(raw)
        .map_err(|e| Error::Config(format!("RANGES must be a list of [start, end] pairs: {e}")))
}
