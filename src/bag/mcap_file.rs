use super::{BagMessage, BagReader, MessageStream, TopicInfo};
use crate::error::{Error, Result};
use crate::messages::Wire;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One or more `.mcap` files read back to back.
pub struct McapReader {
    files: Vec<(PathBuf, Mmap)>,
    topics: Vec<TopicInfo>,
}

fn map_mcap(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    // The mapping is read-only and the bag is not expected to change under us.
    unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))
}

fn wire_for(encoding: &str) -> Wire {
    if encoding == "ros1" {
        Wire::Ros1
    } else {
        Wire::Cdr
    }
}

fn add_channel(topics: &mut Vec<TopicInfo>, channel: &mcap::Channel) {
    if topics.iter().any(|t| t.name == channel.topic) {
        return;
    }
    let msg_type = channel
        .schema
        .as_ref()
        .map(|schema| schema.name.clone())
        .unwrap_or_default();
    topics.push(TopicInfo {
        name: channel.topic.clone(),
        msg_type,
        wire: wire_for(&channel.message_encoding),
    });
}

fn mcap_error(path: &Path, e: mcap::McapError) -> Error {
    Error::Bag(format!("{}: {e}", path.display()))
}

impl McapReader {
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        let mut topics = Vec::new();
        for path in paths {
            let mapped = map_mcap(path)?;
            match mcap::Summary::read(&mapped).map_err(|e| mcap_error(path, e))? {
                Some(summary) => {
                    let mut channels: Vec<_> = summary.channels.iter().collect();
                    channels.sort_by_key(|(id, _)| **id);
                    for (_, channel) in channels {
                        add_channel(&mut topics, channel);
                    }
                }
                None => {
                    log::warn!(
                        "{} has no summary section, scanning it for channels",
                        path.display()
                    );
                    for message in mcap::MessageStream::new(&mapped).map_err(|e| mcap_error(path, e))? {
                        let message = message.map_err(|e| mcap_error(path, e))?;
                        add_channel(&mut topics, &message.channel);
                    }
                }
            }
            files.push((path.clone(), mapped));
        }
        Ok(McapReader { files, topics })
    }
}

fn file_messages<'a>(path: &'a Path, mapped: &'a [u8]) -> MessageStream<'a> {
    match mcap::MessageStream::new(mapped) {
        Ok(stream) => Box::new(stream.map(move |message| -> Result<BagMessage> {
            let message = message.map_err(|e| mcap_error(path, e))?;
            Ok(BagMessage {
                topic: message.channel.topic.clone(),
                data: message.data.into_owned(),
                log_time: message.log_time,
            })
        })),
        Err(e) => Box::new(std::iter::once(Err(mcap_error(path, e)))),
    }
}

impl BagReader for McapReader {
    fn topics(&self) -> &[TopicInfo] {
        &self.topics
    }

    fn messages(&self) -> MessageStream<'_> {
        Box::new(
            self.files
                .iter()
                .flat_map(|(path, mapped)| file_messages(path, &mapped[..])),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcap::{Channel, Message, Schema, Writer};
    use std::borrow::Cow;
    use std::collections::BTreeMap;
    use std::io::BufWriter;
    use std::sync::Arc;

    fn channel(topic: &str, schema: &str, encoding: &str) -> Arc<Channel<'static>> {
        Arc::new(Channel {
            topic: topic.to_string(),
            schema: Some(Arc::new(Schema {
                name: schema.to_string(),
                encoding: "ros2msg".to_string(),
                data: Cow::Borrowed(&[]),
            })),
            message_encoding: encoding.to_string(),
            metadata: BTreeMap::new(),
        })
    }

    fn write_mcap(path: &Path, messages: &[(&Arc<Channel<'static>>, u64, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = Writer::new(BufWriter::new(file)).unwrap();
        for (sequence, (channel, log_time, data)) in messages.iter().enumerate() {
            writer
                .write(&Message {
                    channel: Arc::clone(channel),
                    sequence: sequence as u32,
                    log_time: *log_time,
                    publish_time: *log_time,
                    data: Cow::Borrowed(data),
                })
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn reads_catalog_and_messages_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive_0.mcap");
        let image = channel("/vimba_front/image", "sensor_msgs/msg/Image", "cdr");
        let imu = channel("/imu", "sensor_msgs/msg/Imu", "cdr");
        let legacy = channel("/vimba_rear/image", "sensor_msgs/Image", "ros1");
        write_mcap(
            &path,
            &[
                (&image, 10, &b"a"[..]),
                (&imu, 11, &b"b"[..]),
                (&legacy, 12, &b"c"[..]),
                (&image, 20, &b"d"[..]),
            ],
        );

        let reader = McapReader::open(&[path]).unwrap();
        assert_eq!(reader.topics().len(), 3);
        let front = reader.topic("/vimba_front/image").unwrap();
        assert_eq!(front.msg_type, "sensor_msgs/msg/Image");
        assert_eq!(front.wire, Wire::Cdr);
        assert_eq!(reader.topic("/vimba_rear/image").unwrap().wire, Wire::Ros1);

        let msgs: Vec<BagMessage> = reader.messages().collect::<Result<_>>().unwrap();
        let order: Vec<(&str, &[u8], u64)> = msgs
            .iter()
            .map(|m| (m.topic.as_str(), m.data.as_slice(), m.log_time))
            .collect();
        assert_eq!(
            order,
            vec![
                ("/vimba_front/image", &b"a"[..], 10),
                ("/imu", &b"b"[..], 11),
                ("/vimba_rear/image", &b"c"[..], 12),
                ("/vimba_front/image", &b"d"[..], 20),
            ]
        );
    }

    #[test]
    fn splits_are_read_back_to_back() {
        let dir = tempfile::tempdir().unwrap();
        let image = channel("/vimba_left/image", "sensor_msgs/msg/Image", "cdr");
        let first = dir.path().join("run_0.mcap");
        let second = dir.path().join("run_1.mcap");
        write_mcap(&first, &[(&image, 1, &b"x"[..])]);
        write_mcap(&second, &[(&image, 2, &b"y"[..])]);

        let reader = McapReader::open(&[first, second]).unwrap();
        assert_eq!(reader.topics().len(), 1);
        let data: Vec<Vec<u8>> = reader.messages().map(|m| m.unwrap().data).collect();
        assert_eq!(data, vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[test]
    fn garbage_is_a_bag_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mcap");
        std::fs::write(&path, b"not an mcap file").unwrap();
        assert!(matches!(McapReader::open(&[path]), Err(Error::Bag(_))));
    }
}
