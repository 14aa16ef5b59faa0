use super::{BagMessage, BagReader, MessageStream, TopicInfo};
use crate::error::{Error, Result};
use crate::messages::Wire;
use rosbag::record_types::{Chunk, MessageData};
use rosbag::{ChunkRecord, IndexRecord, MessageRecord, RosBag};
use std::collections::HashMap;
use std::path::Path;

/// ROS 1 `.bag` file, memory mapped by the `rosbag` crate.
pub struct Ros1Reader {
    bag: RosBag,
    topics: Vec<TopicInfo>,
    connections: HashMap<u32, String>,
}

fn bag_error(e: impl std::fmt::Display) -> Error {
    Error::Bag(e.to_string())
}

impl Ros1Reader {
    pub fn open(path: &Path) -> Result<Self> {
        let bag = RosBag::new(path).map_err(|e| Error::Bag(format!("{}: {e}", path.display())))?;

        let mut topics: Vec<TopicInfo> = Vec::new();
        let mut connections = HashMap::new();
        for record in bag.index_records() {
            if let IndexRecord::Connection(conn) = record.map_err(bag_error)? {
                connections.insert(conn.id, conn.topic.to_string());
                if !topics.iter().any(|t| t.name == conn.topic) {
                    topics.push(TopicInfo {
                        name: conn.topic.to_string(),
                        msg_type: conn.tp.to_string(),
                        wire: Wire::Ros1,
                    });
                }
            }
        }
        log::debug!(
            "{}: {} connections on {} topics",
            path.display(),
            connections.len(),
            topics.len()
        );
        Ok(Ros1Reader {
            bag,
            topics,
            connections,
        })
    }
}

fn chunk_iter(bag: &RosBag) -> impl Iterator<Item = Result<Chunk<'_>>> {
    bag.chunk_records().filter_map(|r| match r {
        Ok(ChunkRecord::Chunk(chunk)) => Some(Ok(chunk)),
        Ok(_) => None,
        Err(e) => Some(Err(bag_error(e))),
    })
}

fn msg_iter<'a>(chunk: &'a Chunk) -> impl Iterator<Item = Result<MessageData<'a>>> {
    chunk.messages().filter_map(|m| match m {
        Ok(MessageRecord::MessageData(msg_data)) => Some(Ok(msg_data)),
        Ok(_) => None,
        Err(e) => Some(Err(bag_error(e))),
    })
}

/// Copies one chunk's messages out so the chunk can be released before the
/// next one is decompressed.
fn chunk_messages(chunk: &Chunk, connections: &HashMap<u32, String>) -> Vec<Result<BagMessage>> {
    let mut out = Vec::new();
    for msg in msg_iter(chunk) {
        match msg {
            Ok(msg_data) => match connections.get(&msg_data.conn_id) {
                Some(topic) => out.push(Ok(BagMessage {
                    topic: topic.clone(),
                    data: msg_data.data.to_vec(),
                    log_time: msg_data.time,
                })),
                None => log::debug!("message on unknown connection {}", msg_data.conn_id),
            },
            Err(e) => {
                out.push(Err(e));
                break;
            }
        }
    }
    out
}

impl BagReader for Ros1Reader {
    fn topics(&self) -> &[TopicInfo] {
        &self.topics
    }

    fn messages(&self) -> MessageStream<'_> {
        let connections = &self.connections;
        Box::new(chunk_iter(&self.bag).flat_map(move |chunk| match chunk {
            Ok(chunk) => chunk_messages(&chunk, connections),
            Err(e) => vec![Err(e)],
        }))
    }
}
