use super::{BagMessage, BagReader, MessageStream, TopicInfo};
use crate::error::{Error, Result};
use crate::messages::Wire;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

const PAGE_SIZE: i64 = 256;

struct Split {
    path: PathBuf,
    conn: Connection,
    /// `topics.id` to topic name, per file.
    topic_names: HashMap<i64, String>,
}

/// ROS 2 sqlite3 bag: one or more `.db3` splits.
pub struct SqliteReader {
    splits: Vec<Split>,
    topics: Vec<TopicInfo>,
}

fn db_error(path: &Path, e: rusqlite::Error) -> Error {
    Error::Bag(format!("{}: {e}", path.display()))
}

impl SqliteReader {
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut splits = Vec::with_capacity(paths.len());
        let mut topics: Vec<TopicInfo> = Vec::new();
        for path in paths {
            let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(|e| db_error(path, e))?;
            let mut topic_names = HashMap::new();
            {
                let mut stmt = conn
                    .prepare("SELECT id, name, type FROM topics ORDER BY id")
                    .map_err(|e| db_error(path, e))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })
                    .map_err(|e| db_error(path, e))?;
                for row in rows {
                    let (id, name, msg_type) = row.map_err(|e| db_error(path, e))?;
                    if !topics.iter().any(|t| t.name == name) {
                        topics.push(TopicInfo {
                            name: name.clone(),
                            msg_type,
                            wire: Wire::Cdr,
                        });
                    }
                    topic_names.insert(id, name);
                }
            }
            splits.push(Split {
                path: path.clone(),
                conn,
                topic_names,
            });
        }
        Ok(SqliteReader { splits, topics })
    }
}

/// Walks the `messages` table in `(timestamp, id)` order one page at a time,
/// so no statement outlives a single `next` call.
struct SplitMessages<'a> {
    split: &'a Split,
    after: (i64, i64),
    pending: VecDeque<BagMessage>,
    exhausted: bool,
}

impl SplitMessages<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let split = self.split;
        let mut stmt = split
            .conn
            .prepare_cached(
                "SELECT id, topic_id, timestamp, data FROM messages \
                 WHERE timestamp > ?1 OR (timestamp = ?1 AND id > ?2) \
                 ORDER BY timestamp, id LIMIT ?3",
            )
            .map_err(|e| db_error(&split.path, e))?;
        let rows = stmt
            .query_map(params![self.after.0, self.after.1, PAGE_SIZE], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(|e| db_error(&split.path, e))?;

        let mut fetched = 0;
        for row in rows {
            let (id, topic_id, timestamp, data) = row.map_err(|e| db_error(&split.path, e))?;
            fetched += 1;
            self.after = (timestamp, id);
            match split.topic_names.get(&topic_id) {
                Some(topic) => self.pending.push_back(BagMessage {
                    topic: topic.clone(),
                    data,
                    log_time: timestamp.max(0) as u64,
                }),
                None => log::debug!("message {id} has unknown topic id {topic_id}"),
            }
        }
        if fetched < PAGE_SIZE {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for SplitMessages<'_> {
    type Item = Result<BagMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Some(Ok(msg));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

impl BagReader for SqliteReader {
    fn topics(&self) -> &[TopicInfo] {
        &self.topics
    }

    fn messages(&self) -> MessageStream<'_> {
        Box::new(self.splits.iter().flat_map(|split| SplitMessages {
            split,
            after: (i64::MIN, i64::MIN),
            pending: VecDeque::new(),
            exhausted: false,
        }))
    }
}
