use crate::error::{Error, Result};
use crate::ranges::RangeSet;
use indicatif::ProgressBar;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

pub const SUMMARY_FILE: &str = "num_data.txt";

/// Names of the regular files directly under `dir`, sorted case-insensitively.
/// The position in this list is the only way items are addressed. Names are
/// kept as the OS returned them; only the sort looks at a lossy UTF-8 form.
pub fn list_items(dir: &Path) -> Result<Vec<OsString>> {
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        names.push(entry.file_name());
    }
    names.sort_by_cached_key(|name| (name.to_string_lossy().to_lowercase(), name.clone()));
    Ok(names)
}

/// Copies `items[p]` from `source_root` to `dest_root` for every position `p` of
/// `ranges`, in position order. Returns the number of files copied.
pub fn copy_selected(
    items: &[OsString],
    ranges: &RangeSet,
    source_root: &Path,
    dest_root: &Path,
    progress: &ProgressBar,
) -> Result<u64> {
    if let Some(position) = ranges.positions().find(|&p| p >= items.len() as u64) {
        return Err(Error::IndexOutOfRange {
            position,
            len: items.len(),
        });
    }

    progress.set_length(ranges.span());
    let mut count = 0;
    for position in ranges.positions() {
        let name = &items[position as usize];
        let from = source_root.join(name);
        fs::copy(&from, dest_root.join(name)).map_err(|e| Error::io(&from, e))?;
        count += 1;
        progress.inc(1);
    }
    progress.finish();
    Ok(count)
}

/// Deletes `dir` if it exists and creates it empty.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        log::info!("removing existing {}", dir.display());
        fs::remove_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

pub fn write_summary(dir: &Path, count: u64) -> Result<()> {
    let path = dir.join(SUMMARY_FILE);
    fs::write(&path, count.to_string()).map_err(|e| Error::io(&path, e))
}
