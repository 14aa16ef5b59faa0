extern crate ffmpeg_next as ffmpeg;

use crate::error::{Error, Result};
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context, flag::Flags};
use ffmpeg::util::frame::Video;
use ffmpeg::{codec, encoder, Dictionary, Packet, Rational};
use image::RgbImage;
use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FPS: u32 = 30;

/// Fixed encoder flags, so every side of a run is encoded the same way.
const X264_OPTIONS: [(&str, &str); 3] = [("crf", "18"), ("preset", "medium"), ("profile", "high")];

fn load_rgb(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| Error::decode("video frame", format!("{}: {e}", path.display())))
}

fn fill_rgb_frame(frame: &mut Video, img: &RgbImage) {
    let stride = frame.stride(0);
    let row_len = frame.width() as usize * 3;
    let rows = frame.height() as usize;
    let data = frame.data_mut(0);
    for (y, row) in img
        .as_raw()
        .chunks_exact(img.width() as usize * 3)
        .take(rows)
        .enumerate()
    {
        data[y * stride..y * stride + row_len].copy_from_slice(&row[..row_len]);
    }
}

fn write_packets(
    encoder: &mut encoder::Video,
    octx: &mut ffmpeg::format::context::Output,
    encoder_time_base: Rational,
    stream_time_base: Rational,
) -> Result<()> {
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.rescale_ts(encoder_time_base, stream_time_base);
        packet.write_interleaved(octx)?;
    }
    Ok(())
}

/// Encodes the images at `frames` (in iteration order) into an H.264 mp4 at
/// `output`. The first frame fixes the video size, rounded down to even
/// dimensions; later frames of another size are resized to it.
pub fn encode_sequence<I>(frames: I, output: &Path, fps: u32, progress: &ProgressBar) -> Result<u64>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut frames = frames.into_iter();
    let Some(first_path) = frames.next() else {
        log::warn!("no frames to encode into {}", output.display());
        return Ok(0);
    };
    let first = load_rgb(&first_path)?;
    let width = first.width() & !1;
    let height = first.height() & !1;
    if width == 0 || height == 0 || fps == 0 {
        return Err(Error::Video(ffmpeg::Error::InvalidData));
    }

    ffmpeg::init()?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut octx = ffmpeg::format::output(&output)?;
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);
    let codec = encoder::find_by_name("libx264")
        .or_else(|| encoder::find(codec::Id::H264))
        .ok_or(ffmpeg::Error::EncoderNotFound)?;

    let encoder_time_base = Rational::new(1, fps as i32);
    let mut ost = octx.add_stream(codec)?;
    let mut setup = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()?;
    setup.set_width(width);
    setup.set_height(height);
    setup.set_format(Pixel::YUV420P);
    setup.set_time_base(encoder_time_base);
    setup.set_frame_rate(Some(Rational::new(fps as i32, 1)));
    if global_header {
        setup.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut options = Dictionary::new();
    for (key, value) in X264_OPTIONS {
        options.set(key, value);
    }
    let mut encoder = setup.open_with(options)?;
    ost.set_parameters(&encoder);

    octx.write_header()?;
    let stream_time_base = octx
        .stream(0)
        .ok_or(ffmpeg::Error::StreamNotFound)?
        .time_base();

    let mut scaler = Context::get(
        Pixel::RGB24,
        width,
        height,
        Pixel::YUV420P,
        width,
        height,
        Flags::BILINEAR,
    )?;
    let mut frame_rgb = Video::new(Pixel::RGB24, width, height);
    let mut frame_yuv = Video::empty();

    let mut count = 0u64;
    let mut next = Some(first);
    loop {
        let img = match next.take() {
            Some(img) => img,
            None => match frames.next() {
                Some(path) => load_rgb(&path)?,
                None => break,
            },
        };
        let fits = (width..=width + 1).contains(&img.width())
            && (height..=height + 1).contains(&img.height());
        let img = if fits {
            img
        } else {
            log::debug!(
                "resizing {}x{} frame to {width}x{height}",
                img.width(),
                img.height()
            );
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle)
        };

        fill_rgb_frame(&mut frame_rgb, &img);
        scaler.run(&frame_rgb, &mut frame_yuv)?;
        frame_yuv.set_pts(Some(count as i64));
        encoder.send_frame(&frame_yuv)?;
        write_packets(&mut encoder, &mut octx, encoder_time_base, stream_time_base)?;
        count += 1;
        progress.inc(1);
    }

    encoder.send_eof()?;
    write_packets(&mut encoder, &mut octx, encoder_time_base, stream_time_base)?;
    octx.write_trailer()?;
    progress.finish();
    log::info!("encoded {count} frames into {}", output.display());
    Ok(count)
}
