//! Sequential access to recorded logs: a topic catalog and a lazy, ordered
//! message stream. Readers release their file handles when dropped.

use crate::error::{Error, Result};
use crate::messages::Wire;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

mod mcap_file;
mod ros1;
mod sqlite;

pub use self::mcap_file::McapReader;
pub use self::ros1::Ros1Reader;
pub use self::sqlite::SqliteReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub msg_type: String,
    pub wire: Wire,
}

#[derive(Debug, Clone)]
pub struct BagMessage {
    pub topic: String,
    pub data: Vec<u8>,
    /// Receive time in nanoseconds.
    pub log_time: u64,
}

pub type MessageStream<'a> = Box<dyn Iterator<Item = Result<BagMessage>> + 'a>;

pub trait BagReader {
    fn topics(&self) -> &[TopicInfo];

    /// Every message in arrival order. A corrupt record surfaces as an `Err`
    /// item; callers are expected to stop there.
    fn messages(&self) -> MessageStream<'_>;

    fn topic(&self, name: &str) -> Option<&TopicInfo> {
        self.topics().iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite3,
    Mcap,
    Ros1,
}

fn kind_of(path: &Path) -> Option<StoreKind> {
    match path.extension()?.to_str()? {
        "db3" => Some(StoreKind::Sqlite3),
        "mcap" => Some(StoreKind::Mcap),
        "bag" => Some(StoreKind::Ros1),
        _ => None,
    }
}

const METADATA_FILE: &str = "metadata.yaml";

#[derive(Debug, Deserialize)]
struct Metadata {
    rosbag2_bagfile_information: BagfileInformation,
}

#[derive(Debug, Deserialize)]
struct BagfileInformation {
    #[serde(default)]
    relative_file_paths: Vec<String>,
}

/// Split file names in the order `metadata.yaml` lists them. Empty when the
/// file is missing or unreadable.
fn recorded_splits(dir: &Path) -> Vec<String> {
    let path = dir.join(METADATA_FILE);
    let Ok(text) = fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_yaml::from_str::<Metadata>(&text) {
        Ok(metadata) => metadata
            .rosbag2_bagfile_information
            .relative_file_paths
            .iter()
            .filter_map(|p| Path::new(p).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            log::warn!("ignoring {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// `run_10.db3` sorts as `("run_", Some(10))`, after `run_2.db3`.
fn split_number(path: &Path) -> (String, Option<u64>, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = stem[prefix.len()..].parse().ok();
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (prefix.to_string(), number, name)
}

/// Finds the store kind and the files to read, in recording order.
///
/// A directory is a ROS 2 bag: its `.db3` or `.mcap` files are the splits,
/// ordered as `metadata.yaml` lists them, then by split number. A plain file
/// is read on its own.
pub fn detect(path: &Path) -> Result<(StoreKind, Vec<PathBuf>)> {
    if path.is_file() {
        return match kind_of(path) {
            Some(kind) => Ok((kind, vec![path.to_path_buf()])),
            None => Err(Error::UnknownStore(path.to_path_buf())),
        };
    }
    if !path.is_dir() {
        return Err(Error::NotADirectory(path.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| Error::io(path, e))? {
        let entry = entry.map_err(|e| Error::io(path, e))?;
        let file = entry.path();
        if let Some(kind @ (StoreKind::Sqlite3 | StoreKind::Mcap)) = kind_of(&file) {
            files.push((kind, file));
        }
    }
    let recorded = recorded_splits(path);
    files.sort_by_cached_key(|(_, file)| {
        let (prefix, number, name) = split_number(file);
        let rank = recorded
            .iter()
            .position(|r| *r == name)
            .unwrap_or(usize::MAX);
        (rank, prefix, number, name)
    });

    let kind = match files.first() {
        Some((kind, _)) => *kind,
        None => return Err(Error::UnknownStore(path.to_path_buf())),
    };
    if files.iter().any(|(k, _)| *k != kind) {
        return Err(Error::Bag(format!(
            "{} mixes db3 and mcap files",
            path.display()
        )));
    }
    Ok((kind, files.into_iter().map(|(_, f)| f).collect()))
}

pub fn open(path: &Path) -> Result<Box<dyn BagReader>> {
    let (kind, files) = detect(path)?;
    log::info!("detected {kind:?} store with {} file(s)", files.len());
    let reader: Box<dyn BagReader> = match kind {
        StoreKind::Sqlite3 => Box::new(SqliteReader::open(&files)?),
        StoreKind::Mcap => Box::new(McapReader::open(&files)?),
        StoreKind::Ros1 => Box::new(Ros1Reader::open(&files[0])?),
    };
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ros2_directory_layouts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run_1.db3"), b"").unwrap();
        fs::write(dir.path().join("run_0.db3"), b"").unwrap();
        fs::write(dir.path().join("metadata.yaml"), b"").unwrap();
        let (kind, files) = detect(dir.path()).unwrap();
        assert_eq!(kind, StoreKind::Sqlite3);
        assert_eq!(
            files,
            vec![dir.path().join("run_0.db3"), dir.path().join("run_1.db3")]
        );
    }

    #[test]
    fn splits_are_ordered_by_number() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..=10 {
            fs::write(dir.path().join(format!("run_{i}.db3")), b"").unwrap();
        }
        let (_, files) = detect(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        let expected: Vec<String> = (0..=10).map(|i| format!("run_{i}.db3")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn metadata_order_wins_over_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_0.mcap", "a_0.mcap", "c_0.mcap"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::write(
            dir.path().join(METADATA_FILE),
            "rosbag2_bagfile_information:\n  version: 5\n  relative_file_paths:\n    - drive/b_0.mcap\n    - a_0.mcap\n",
        )
        .unwrap();
        let (kind, files) = detect(dir.path()).unwrap();
        assert_eq!(kind, StoreKind::Mcap);
        assert_eq!(
            files,
            vec![
                dir.path().join("b_0.mcap"),
                dir.path().join("a_0.mcap"),
                dir.path().join("c_0.mcap"),
            ]
        );
    }

    #[test]
    fn rejects_unknown_stores() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("metadata.yaml"), b"").unwrap();
        assert!(matches!(detect(dir.path()), Err(Error::UnknownStore(_))));

        let file = dir.path().join("log.txt");
        fs::write(&file, b"").unwrap();
        assert!(matches!(detect(&file), Err(Error::UnknownStore(_))));
    }

    #[test]
    fn single_files_are_detected_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("drive.bag");
        fs::write(&file, b"").unwrap();
        assert_eq!(detect(&file).unwrap(), (StoreKind::Ros1, vec![file]));
    }
}
