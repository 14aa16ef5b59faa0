use crate::error::{Error, Result};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub const IMAGE_TYPE: &str = "sensor_msgs/Image";
pub const COMPRESSED_IMAGE_TYPE: &str = "sensor_msgs/CompressedImage";

/// Serialization used by the store a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    /// ROS 1: little endian, packed, length-prefixed strings.
    Ros1,
    /// ROS 2 CDR: encapsulation header, 4-byte alignment, NUL-terminated strings.
    Cdr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Time {
    pub sec: i32,
    pub nsec: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Always 0 for ROS 2 messages, which dropped the field.
    pub seq: u32,
    pub stamp: Time,
    pub frame_id: String,
}

#[derive(Debug, Clone)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    pub step: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub header: Header,
    pub format: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ImageMessage {
    Raw(Image),
    Compressed(CompressedImage),
}

impl ImageMessage {
    pub fn header(&self) -> &Header {
        match self {
            ImageMessage::Raw(img) => &img.header,
            ImageMessage::Compressed(img) => &img.header,
        }
    }
}

/// `sensor_msgs/msg/Image` and `sensor_msgs/Image` both become `sensor_msgs/Image`.
pub fn normalize_type(msg_type: &str) -> String {
    msg_type.replacen("/msg/", "/", 1)
}

pub fn is_image_type(msg_type: &str) -> bool {
    let normalized = normalize_type(msg_type);
    normalized == IMAGE_TYPE || normalized == COMPRESSED_IMAGE_TYPE
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    wire: Wire,
    big_endian: bool,
    msg_type: &'a str,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], wire: Wire, msg_type: &'a str) -> Result<Self> {
        let mut reader = Reader {
            cursor: Cursor::new(data),
            wire,
            big_endian: false,
            msg_type,
        };
        if wire == Wire::Cdr {
            let mut encapsulation = [0u8; 4];
            reader
                .cursor
                .read_exact(&mut encapsulation)
                .map_err(|e| reader.fail(e))?;
            reader.big_endian = match encapsulation[1] {
                0x00 | 0x02 => true,
                0x01 | 0x03 => false,
                kind => {
                    return Err(Error::decode(
                        msg_type,
                        format!("unsupported CDR encapsulation {kind:#04x}"),
                    ))
                }
            };
        }
        Ok(reader)
    }

    fn fail(&self, e: std::io::Error) -> Error {
        Error::decode(
            self.msg_type,
            format!("{e} at byte {}", self.cursor.position()),
        )
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    /// CDR aligns primitives relative to the end of the encapsulation header.
    fn align(&mut self, size: u64) {
        if self.wire == Wire::Cdr {
            let offset = self.cursor.position() - 4;
            let pad = (size - offset % size) % size;
            self.cursor.set_position(self.cursor.position() + pad);
        }
    }

    fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|e| self.fail(e))
    }

    fn u32(&mut self) -> Result<u32> {
        self.align(4);
        let value = if self.big_endian {
            self.cursor.read_u32::<BigEndian>()
        } else {
            self.cursor.read_u32::<LittleEndian>()
        };
        value.map_err(|e| self.fail(e))
    }

    fn i32(&mut self) -> Result<i32> {
        self.align(4);
        let value = if self.big_endian {
            self.cursor.read_i32::<BigEndian>()
        } else {
            self.cursor.read_i32::<LittleEndian>()
        };
        value.map_err(|e| self.fail(e))
    }

    fn bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > self.remaining() {
            return Err(Error::decode(
                self.msg_type,
                format!("{len} bytes announced, {} left", self.remaining()),
            ));
        }
        let mut buf = vec![0; len];
        self.cursor.read_exact(&mut buf).map_err(|e| self.fail(e))?;
        Ok(buf)
    }

    fn sequence(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    fn string(&mut self) -> Result<String> {
        let mut buf = self.sequence()?;
        if self.wire == Wire::Cdr && buf.last() == Some(&0) {
            buf.pop();
        }
        String::from_utf8(buf).map_err(|e| Error::decode(self.msg_type, e.to_string()))
    }

    fn header(&mut self) -> Result<Header> {
        let seq = match self.wire {
            Wire::Ros1 => self.u32()?,
            Wire::Cdr => 0,
        };
        Ok(Header {
            seq,
            stamp: Time {
                sec: self.i32()?,
                nsec: self.u32()?,
            },
            frame_id: self.string()?,
        })
    }
}

pub fn read_image(data: &[u8], wire: Wire) -> Result<Image> {
    let mut reader = Reader::new(data, wire, IMAGE_TYPE)?;
    Ok(Image {
        header: reader.header()?,
        height: reader.u32()?,
        width: reader.u32()?,
        encoding: reader.string()?,
        is_bigendian: reader.u8()? != 0,
        step: reader.u32()?,
        data: reader.sequence()?,
    })
}

pub fn read_compressed_image(data: &[u8], wire: Wire) -> Result<CompressedImage> {
    let mut reader = Reader::new(data, wire, COMPRESSED_IMAGE_TYPE)?;
    Ok(CompressedImage {
        header: reader.header()?,
        format: reader.string()?,
        data: reader.sequence()?,
    })
}

/// Decodes an image-bearing message according to its declared type.
pub fn read_image_message(msg_type: &str, data: &[u8], wire: Wire) -> Result<ImageMessage> {
    match normalize_type(msg_type).as_str() {
        IMAGE_TYPE => read_image(data, wire).map(ImageMessage::Raw),
        COMPRESSED_IMAGE_TYPE => read_compressed_image(data, wire).map(ImageMessage::Compressed),
        _ => Err(Error::decode(msg_type, "not an image message type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn cdr_string(out: &mut Vec<u8>, s: &str) {
        while (out.len() - 4) % 4 != 0 {
            out.push(0);
        }
        out.write_u32::<LittleEndian>(s.len() as u32 + 1).unwrap();
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }

    fn cdr_u32(out: &mut Vec<u8>, v: u32) {
        while (out.len() - 4) % 4 != 0 {
            out.push(0);
        }
        out.write_u32::<LittleEndian>(v).unwrap();
    }

    #[test]
    fn reads_cdr_image_with_padding() {
        let mut out = vec![0x00, 0x01, 0x00, 0x00];
        cdr_u32(&mut out, 1_700_000_000);
        cdr_u32(&mut out, 250);
        cdr_string(&mut out, "cam");
        cdr_u32(&mut out, 2);
        cdr_u32(&mut out, 1);
        cdr_string(&mut out, "bgr8");
        out.push(0);
        cdr_u32(&mut out, 3);
        cdr_u32(&mut out, 6);
        out.extend_from_slice(&[1, 2, 3, 4, 5, 6]);

        let msg = read_image_message("sensor_msgs/msg/Image", &out, Wire::Cdr).unwrap();
        let ImageMessage::Raw(img) = msg else {
            panic!("expected raw image");
        };
        assert_eq!(img.header.stamp, Time { sec: 1_700_000_000, nsec: 250 });
        assert_eq!(img.header.frame_id, "cam");
        assert_eq!((img.width, img.height, img.step), (1, 2, 3));
        assert_eq!(img.encoding, "bgr8");
        assert_eq!(img.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn reads_ros1_compressed_image() {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(7).unwrap();
        out.write_i32::<LittleEndian>(12).unwrap();
        out.write_u32::<LittleEndian>(34).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(4).unwrap();
        out.extend_from_slice(b"jpeg");
        out.write_u32::<LittleEndian>(3).unwrap();
        out.extend_from_slice(&[0xff, 0xd8, 0xff]);

        let msg = read_image_message("sensor_msgs/CompressedImage", &out, Wire::Ros1).unwrap();
        assert_eq!(msg.header().seq, 7);
        let ImageMessage::Compressed(img) = msg else {
            panic!("expected compressed image");
        };
        assert_eq!(img.format, "jpeg");
        assert_eq!(img.data, vec![0xff, 0xd8, 0xff]);
    }

    #[test]
    fn truncated_payload_is_a_decode_error() {
        let out = vec![0x00, 0x01, 0x00, 0x00, 1, 2];
        assert!(matches!(
            read_image(&out, Wire::Cdr),
            Err(Error::Decode { .. })
        ));

        let mut out = vec![0x00, 0x01, 0x00, 0x00];
        cdr_u32(&mut out, 0);
        cdr_u32(&mut out, 0);
        cdr_u32(&mut out, u32::MAX);
        assert!(matches!(
            read_image(&out, Wire::Cdr),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn normalizes_ros2_type_names() {
        assert_eq!(normalize_type("sensor_msgs/msg/CompressedImage"), COMPRESSED_IMAGE_TYPE);
        assert!(is_image_type("sensor_msgs/Image"));
        assert!(!is_image_type("sensor_msgs/msg/CameraInfo"));
    }
}
