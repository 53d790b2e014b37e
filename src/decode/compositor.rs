//! Frame compositor: turns an uploaded frame file into a decoded ARGB
//! bitmap sized to the image's nominal dimensions, compositing over a
//! background color or background frame when one is configured
//! (spec.md §4.4 step 2).

use crate::decode::format::ChainDecoder;
use crate::decode::raw::load_raw_pixels;
use crate::error::CoreError;
use crate::ids::ImageId;
use crate::store::frame::{ArgbBuffer, FrameBackground, FrameFormat, FrameStatus};
use crate::store::image::Image;

/// Decodes frame `frame_index` of `image` into its `decoded` bitmap if it
/// isn't already loaded, resolving a `background_frame` reference first.
/// Cyclic references are broken by the `RamLoadingInProgress` sentinel,
/// mirroring the original's recursive-loading guard.
pub fn ensure_loaded(
    image: &mut Image,
    frame_index: u32,
    image_id: ImageId,
    cache_dir: &crate::cache_dir::CacheDir,
    decoder: &ChainDecoder,
) -> Result<(), CoreError> {
    if image.frame(frame_index).and_then(|f| f.decoded.as_ref()).is_some() {
        return Ok(());
    }

    {
        let frame = image
            .frame(frame_index)
            .ok_or_else(|| CoreError::NotFound(format!("no frame {frame_index}")))?;
        if !matches!(
            frame.status,
            FrameStatus::UploadingSuccess
                | FrameStatus::RamLoadingInProgress
                | FrameStatus::RamLoadingSuccess
                | FrameStatus::RamLoadingError
        ) {
            return Err(CoreError::Invalid(format!("frame {frame_index} not uploaded")));
        }
        if frame.status == FrameStatus::RamLoadingInProgress {
            return Err(CoreError::Invalid(format!(
                "recursive loading of image {image_id} frame {frame_index}"
            )));
        }
    }

    let disk_size_zero = image.frame(frame_index).map(|f| f.disk_size == 0).unwrap_or(true);
    if disk_size_zero {
        if let Some(frame) = image.frame_mut(frame_index) {
            frame.status = FrameStatus::RamLoadingError;
        }
        return Err(CoreError::BadFile(format!(
            "cached image deleted: image {image_id} frame {frame_index}"
        )));
    }

    image.frame_mut(frame_index).unwrap().status = FrameStatus::RamLoadingInProgress;

    let background_frame_index = match image.frame(frame_index).unwrap().background {
        FrameBackground::Frame(idx) => {
            if let Err(e) = ensure_loaded(image, idx, image_id, cache_dir, decoder) {
                image.frame_mut(frame_index).unwrap().status = FrameStatus::RamLoadingError;
                return Err(e);
            }
            Some(idx)
        }
        _ => None,
    };

    let (format, compression, width, height, offset_x, offset_y, background) = {
        let frame = image.frame(frame_index).unwrap();
        (
            frame.format,
            frame.compression,
            frame.data_pix_width,
            frame.data_pix_height,
            frame.offset_x,
            frame.offset_y,
            frame.background,
        )
    };

    let path = cache_dir.frame_path(image_id, frame_index);
    let frame_data = load_frame_data(&path, format, compression, width, height, decoder);
    let frame_data = match frame_data {
        Ok(buf) => buf,
        Err(e) => {
            image.frame_mut(frame_index).unwrap().status = FrameStatus::RamLoadingError;
            return Err(e);
        }
    };

    if frame_index == 1 && image.pix_width == 0 && image.pix_height == 0 {
        image.pix_width = frame_data.width;
        image.pix_height = frame_data.height;
    }
    let image_w = image.pix_width;
    let image_h = image.pix_height;

    let needs_compose = matches!(background, FrameBackground::Color(_))
        || background_frame_index.is_some()
        || image_w != frame_data.width
        || image_h != frame_data.height;

    let decoded = if needs_compose {
        let mut canvas = ArgbBuffer::new(image_w, image_h);
        match background {
            FrameBackground::Frame(_) => {
                if let Some(bg_idx) = background_frame_index {
                    if let Some(bg) = image.frame(bg_idx).and_then(|f| f.decoded.as_ref()) {
                        copy_into(&mut canvas, bg, 0, 0);
                    }
                }
            }
            FrameBackground::Color(rgba) => fill_color(&mut canvas, rgba),
            FrameBackground::None => {}
        }
        blend_into(&mut canvas, &frame_data, offset_x, offset_y);
        canvas
    } else {
        frame_data
    };

    let frame = image.frame_mut(frame_index).unwrap();
    frame.decoded = Some(decoded);
    frame.status = FrameStatus::RamLoadingSuccess;
    Ok(())
}

fn load_frame_data(
    path: &std::path::Path,
    format: FrameFormat,
    compression: crate::store::frame::Compression,
    width: u32,
    height: u32,
    decoder: &ChainDecoder,
) -> Result<ArgbBuffer, CoreError> {
    let try_general = matches!(format, FrameFormat::Auto | FrameFormat::GeneralDecoder);
    if try_general {
        if let Some(buf) = decoder.decode(path)? {
            return Ok(buf);
        }
        if format == FrameFormat::GeneralDecoder {
            return Err(CoreError::BadFile(format!("general decoder declined {}", path.display())));
        }
    }
    load_raw_pixels(path, format, compression, width, height)
}

/// 0xRRGGBBAA -> 0xAARRGGBB filled across the whole buffer.
fn fill_color(buf: &mut ArgbBuffer, rgba: u32) {
    let r = (rgba >> 24) & 0xFF;
    let g = (rgba >> 16) & 0xFF;
    let b = (rgba >> 8) & 0xFF;
    let a = rgba & 0xFF;
    let argb = (a << 24) | (r << 16) | (g << 8) | b;
    buf.pixels.fill(argb);
}

fn copy_into(dst: &mut ArgbBuffer, src: &ArgbBuffer, off_x: i32, off_y: i32) {
    for sy in 0..src.height {
        let dy = sy as i64 + off_y as i64;
        if dy < 0 || dy >= dst.height as i64 {
            continue;
        }
        for sx in 0..src.width {
            let dx = sx as i64 + off_x as i64;
            if dx < 0 || dx >= dst.width as i64 {
                continue;
            }
            dst.set(dx as u32, dy as u32, src.get(sx, sy));
        }
    }
}

fn blend_into(dst: &mut ArgbBuffer, src: &ArgbBuffer, off_x: i32, off_y: i32) {
    for sy in 0..src.height {
        let dy = sy as i64 + off_y as i64;
        if dy < 0 || dy >= dst.height as i64 {
            continue;
        }
        for sx in 0..src.width {
            let dx = sx as i64 + off_x as i64;
            if dx < 0 || dx >= dst.width as i64 {
                continue;
            }
            let top = src.get(sx, sy);
            let bottom = dst.get(dx as u32, dy as u32);
            dst.set(dx as u32, dy as u32, alpha_over(bottom, top));
        }
    }
}

/// Non-premultiplied "over" compositing of `top` onto `bottom`, both
/// 0xAARRGGBB.
fn alpha_over(bottom: u32, top: u32) -> u32 {
    let ta = (top >> 24) & 0xFF;
    if ta == 255 {
        return top;
    }
    if ta == 0 {
        return bottom;
    }
    let ba = (bottom >> 24) & 0xFF;
    let out_a = ta + ba * (255 - ta) / 255;
    if out_a == 0 {
        return 0;
    }
    let mix = |shift: u32| -> u32 {
        let tc = (top >> shift) & 0xFF;
        let bc = (bottom >> shift) & 0xFF;
        (tc * ta * 255 + bc * ba * (255 - ta)) / (out_a * 255)
    };
    (out_a << 24) | (mix(16) << 16) | (mix(8) << 8) | mix(0)
}
