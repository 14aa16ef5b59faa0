use crate::bag::TopicInfo;
use crate::calibration::{CalibrationStore, ProfileCache};
use crate::demux::Retained;
use crate::error::{Error, Result};
use crate::messages::{self, Image, ImageMessage, Time};
use crate::topics::TopicNaming;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub topic: String,
    pub sequence: u64,
    pub stamp: Time,
    pub image: RgbImage,
}

pub fn frame_file_name(sequence: u64, stamp: Time) -> String {
    format!(
        "Image_{:010}_sec{}_nsec{}.jpg",
        sequence, stamp.sec, stamp.nsec
    )
}

fn bytes_per_pixel(encoding: &str) -> Option<usize> {
    match encoding {
        "mono8" | "8UC1" => Some(1),
        "mono16" | "16UC1" => Some(2),
        "rgb8" | "bgr8" | "8UC3" => Some(3),
        "rgba8" | "bgra8" | "8UC4" => Some(4),
        _ => None,
    }
}

fn raw_to_rgb(img: &Image) -> Result<RgbImage> {
    let bpp = bytes_per_pixel(&img.encoding).ok_or_else(|| {
        Error::decode(
            messages::IMAGE_TYPE,
            format!("unsupported encoding {:?}", img.encoding),
        )
    })?;
    let (width, height, step) = (img.width as usize, img.height as usize, img.step as usize);
    if step < width * bpp || img.data.len() < step * height {
        return Err(Error::decode(
            messages::IMAGE_TYPE,
            format!(
                "{}x{} {} with step {} does not fit {} bytes",
                width,
                height,
                img.encoding,
                step,
                img.data.len()
            ),
        ));
    }

    Ok(RgbImage::from_fn(img.width, img.height, |x, y| {
        let offset = y as usize * step + x as usize * bpp;
        let px = &img.data[offset..offset + bpp];
        match img.encoding.as_str() {
            "rgb8" | "rgba8" => Rgb([px[0], px[1], px[2]]),
            "bgr8" | "8UC3" | "bgra8" | "8UC4" => Rgb([px[2], px[1], px[0]]),
            "mono16" | "16UC1" => {
                let high = if img.is_bigendian { px[0] } else { px[1] };
                Rgb([high, high, high])
            }
            _ => Rgb([px[0], px[0], px[0]]),
        }
    }))
}

/// Decodes a message into an RGB raster.
pub fn to_rgb(msg: &ImageMessage) -> Result<RgbImage> {
    match msg {
        ImageMessage::Raw(img) => raw_to_rgb(img),
        ImageMessage::Compressed(img) => image::load_from_memory(&img.data)
            .map(|decoded| decoded.to_rgb8())
            .map_err(|e| {
                Error::decode(
                    messages::COMPRESSED_IMAGE_TYPE,
                    format!("{} payload: {e}", img.format),
                )
            }),
    }
}

pub fn write_jpeg(path: &Path, image: &RgbImage, quality: u8) -> Result<()> {
    let fail = |source: ImageError| Error::ImageWrite {
        path: path.to_path_buf(),
        source,
    };
    let file = fs::File::create(path).map_err(|e| fail(ImageError::IoError(e)))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(image)
        .map_err(fail)?;
    writer.flush().map_err(|e| fail(ImageError::IoError(e)))
}

/// Turns retained messages into JPEG files under
/// `<output_root>/<topic directory>/Image_<sequence>_sec<s>_nsec<ns>.jpg`.
pub struct ImageMaterializer<S> {
    output_root: PathBuf,
    naming: TopicNaming,
    profiles: Option<ProfileCache<S>>,
    created: HashSet<String>,
    quality: u8,
}

impl<S: CalibrationStore> ImageMaterializer<S> {
    /// Frames are undistorted when `profiles` is given.
    pub fn new(
        output_root: impl Into<PathBuf>,
        naming: TopicNaming,
        profiles: Option<ProfileCache<S>>,
    ) -> Self {
        ImageMaterializer {
            output_root: output_root.into(),
            naming,
            profiles,
            created: HashSet::new(),
            quality: JPEG_QUALITY,
        }
    }

    fn key(&self, topic: &str) -> Result<String> {
        self.naming
            .key(topic)
            .ok_or_else(|| Error::TopicNaming(format!("no key for topic {topic}")))
    }

    pub fn decode(&mut self, frame: &Retained, topic: &TopicInfo) -> Result<ExtractedFrame> {
        let msg = messages::read_image_message(&topic.msg_type, &frame.message.data, topic.wire)?;
        let mut image = to_rgb(&msg)?;
        if self.profiles.is_some() {
            let key = self.key(&topic.name)?;
            if let Some(profiles) = self.profiles.as_mut() {
                image = profiles.undistort(&key, &image)?;
            }
        }
        Ok(ExtractedFrame {
            topic: topic.name.clone(),
            sequence: frame.sequence,
            stamp: msg.header().stamp,
            image,
        })
    }

    pub fn write(&mut self, frame: &ExtractedFrame) -> Result<PathBuf> {
        let dir_name = self.naming.dir_name(&frame.topic).ok_or_else(|| {
            Error::TopicNaming(format!("no directory for topic {}", frame.topic))
        })?;
        let dir = self.output_root.join(&dir_name);
        if !self.created.contains(&dir_name) {
            if !dir.is_dir() {
                log::debug!("creating directory {}", dir.display());
                fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
            }
            self.created.insert(dir_name);
        }
        let path = dir.join(frame_file_name(frame.sequence, frame.stamp));
        log::debug!("saving {}", path.display());
        write_jpeg(&path, &frame.image, self.quality)?;
        Ok(path)
    }

    pub fn materialize(&mut self, frame: &Retained, topic: &TopicInfo) -> Result<PathBuf> {
        let extracted = self.decode(frame, topic)?;
        self.write(&extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Header;

    fn raw(encoding: &str, width: u32, height: u32, step: u32, data: Vec<u8>) -> Image {
        Image {
            header: Header::default(),
            height,
            width,
            encoding: encoding.to_string(),
            is_bigendian: false,
            step,
            data,
        }
    }

    #[test]
    fn file_names_are_zero_padded() {
        let name = frame_file_name(42, Time { sec: 1_690_000_000, nsec: 5 });
        assert_eq!(name, "Image_0000000042_sec1690000000_nsec5.jpg");
    }

    #[test]
    fn bgr_is_swapped_and_step_padding_skipped() {
        let img = raw("bgr8", 2, 1, 8, vec![1, 2, 3, 4, 5, 6, 99, 99]);
        let rgb = raw_to_rgb(&img).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([6, 5, 4]));
    }

    #[test]
    fn mono16_keeps_high_byte() {
        let img = raw("mono16", 1, 1, 2, vec![0x34, 0x12]);
        assert_eq!(raw_to_rgb(&img).unwrap().get_pixel(0, 0), &Rgb([0x12, 0x12, 0x12]));
    }

    #[test]
    fn short_buffers_and_unknown_encodings_fail() {
        assert!(matches!(
            raw_to_rgb(&raw("rgb8", 2, 2, 6, vec![0; 11])),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            raw_to_rgb(&raw("bayer_rggb8", 1, 1, 1, vec![0])),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn jpeg_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let image = RgbImage::from_pixel(16, 8, Rgb([200, 10, 10]));
        write_jpeg(&path, &image, JPEG_QUALITY).unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (16, 8));
    }

    #[test]
    fn write_into_missing_parent_is_an_image_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.jpg");
        let image = RgbImage::new(2, 2);
        assert!(matches!(
            write_jpeg(&path, &image, JPEG_QUALITY),
            Err(Error::ImageWrite { .. })
        ));
    }
}
