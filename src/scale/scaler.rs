//! Row/column inference and pixmap production for a placement (spec.md
//! §4.5).

use crate::config::Limits;
use crate::error::CoreError;
use crate::render::{CompositorSurface, PixmapHandle};
use crate::store::frame::ArgbBuffer;
use crate::store::image::Image;
use crate::store::placement::{Placement, PlacementPixmap, ScaleMode};

fn ceil_div(a: u32, b: u32) -> u32 {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

/// Clamps the placement's source rect to the image bounds and fills in any
/// unset `rows`/`cols`, given cell metrics `(cw, ch)` in pixels.
pub fn infer_placement_size(placement: &mut Placement, image: &Image, cw: u32, ch: u32) {
    let image_w = image.pix_width;
    let image_h = image.pix_height;

    let mut src_x = placement.src_x.min(image_w);
    let mut src_y = placement.src_y.min(image_h);
    let mut src_w = placement.src_w.unwrap_or(0);
    let mut src_h = placement.src_h.unwrap_or(0);
    if src_w == 0 || src_x + src_w > image_w {
        src_w = image_w.saturating_sub(src_x);
    }
    if src_h == 0 || src_y + src_h > image_h {
        src_h = image_h.saturating_sub(src_y);
    }
    placement.src_x = src_x;
    placement.src_y = src_y;
    placement.src_w = Some(src_w);
    placement.src_h = Some(src_h);

    if placement.cols.is_some() && placement.rows.is_some() {
        return;
    }
    if src_w == 0 || src_h == 0 || cw == 0 || ch == 0 {
        return;
    }

    if placement.cols.is_none() && placement.rows.is_none() {
        placement.cols = Some(ceil_div(src_w, cw));
        placement.rows = Some(ceil_div(src_h, ch));
        return;
    }

    if placement.scale_mode == ScaleMode::Contain {
        if let Some(rows) = placement.rows {
            if placement.cols.is_none() {
                placement.cols = Some(ceil_div(src_w * rows * ch, src_h * cw));
                return;
            }
        }
        if let Some(cols) = placement.cols {
            if placement.rows.is_none() {
                placement.rows = Some(ceil_div(src_h * cols * cw, src_w * ch));
                return;
            }
        }
    } else {
        // Stretch/none with only one dimension given: derive the other from
        // the image's own aspect ratio directly (no box to fit to yet).
        if placement.cols.is_none() {
            placement.cols = Some(ceil_div(src_w, cw));
        }
        if placement.rows.is_none() {
            placement.rows = Some(ceil_div(src_h, ch));
        }
    }
}

/// Builds (or reuses) the scaled pixmap for `frame_index` of `placement`,
/// uploading it through `surface`. Returns the net RAM delta (new pixmap
/// bytes minus any freed).
pub fn load_pixmap(
    placement: &mut Placement,
    image: &Image,
    frame_index: u32,
    cw: u32,
    ch: u32,
    limits: &Limits,
    surface: &mut dyn CompositorSurface,
    now: crate::clock::Milliseconds,
) -> Result<i64, CoreError> {
    placement.touch(now);

    let mut freed = 0u64;
    if placement.scaled_cell != Some((cw, ch)) {
        freed += placement.clear_pixmaps();
        placement.scaled_cell = Some((cw, ch));
    }
    if placement.pixmap(frame_index).is_some() {
        return Ok(-(freed as i64));
    }

    let frame = image
        .frame(frame_index)
        .ok_or_else(|| CoreError::NotFound(format!("no frame {frame_index}")))?;
    let decoded = frame
        .decoded
        .as_ref()
        .ok_or_else(|| CoreError::Invalid(format!("frame {frame_index} not decoded")))?;

    infer_placement_size(placement, image, cw, ch);
    let cols = placement.cols.unwrap_or(1).max(1);
    let rows = placement.rows.unwrap_or(1).max(1);
    let scaled_w = cols * cw;
    let scaled_h = rows * ch;

    let byte_size = (scaled_w as u64) * (scaled_h as u64) * 4;
    if byte_size > limits.max_single_image_ram_size {
        return Err(CoreError::TooBig(format!(
            "placement {}x{} would need {byte_size} bytes > {}",
            scaled_w, scaled_h, limits.max_single_image_ram_size
        )));
    }

    let mut canvas = ArgbBuffer::new(scaled_w, scaled_h);
    let src_x = placement.src_x;
    let src_y = placement.src_y;
    let src_w = placement.src_w.unwrap_or(0);
    let src_h = placement.src_h.unwrap_or(0);

    if src_w > 0 && src_h > 0 {
        blit(decoded, &mut canvas, src_x, src_y, src_w, src_h, placement.scale_mode);
    }
    premultiply(&mut canvas);

    let handle = surface.upload_pixmap(&canvas);
    let pixmap = PlacementPixmap { handle, byte_size };
    freed += placement.set_pixmap(frame_index, pixmap);

    Ok(byte_size as i64 - freed as i64)
}

fn blit(
    src: &ArgbBuffer,
    dst: &mut ArgbBuffer,
    src_x: u32,
    src_y: u32,
    src_w: u32,
    src_h: u32,
    mode: ScaleMode,
) {
    let scaled_w = dst.width;
    let scaled_h = dst.height;
    let box_too_small = scaled_w < src_w || scaled_h < src_h;

    match mode {
        ScaleMode::Fill => {
            blend_region(src, dst, src_x, src_y, src_w, src_h, 0, 0, scaled_w, scaled_h)
        }
        ScaleMode::None | ScaleMode::NoneOrContain if mode == ScaleMode::None || !box_too_small => {
            blend_region(src, dst, src_x, src_y, src_w, src_h, 0, 0, src_w, src_h)
        }
        _ => {
            let (dest_x, dest_y, dest_w, dest_h) =
                if (scaled_w as u64) * (src_h as u64) > (src_w as u64) * (scaled_h as u64) {
                    let dest_h = scaled_h;
                    let dest_w = src_w * scaled_h / src_h;
                    let dest_x = (scaled_w.saturating_sub(dest_w)) / 2;
                    (dest_x, 0, dest_w, dest_h)
                } else {
                    let dest_w = scaled_w;
                    let dest_h = src_h * scaled_w / src_w;
                    let dest_y = (scaled_h.saturating_sub(dest_h)) / 2;
                    (0, dest_y, dest_w, dest_h)
                };
            blend_region(src, dst, src_x, src_y, src_w, src_h, dest_x, dest_y, dest_w, dest_h)
        }
    }
}

/// Nearest-neighbor resample of `src[src_x..][src_y..]` sized `src_w x
/// src_h` into `dst` at `(dest_x, dest_y)` sized `dest_w x dest_h`.
fn blend_region(
    src: &ArgbBuffer,
    dst: &mut ArgbBuffer,
    src_x: u32,
    src_y: u32,
    src_w: u32,
    src_h: u32,
    dest_x: u32,
    dest_y: u32,
    dest_w: u32,
    dest_h: u32,
) {
    if dest_w == 0 || dest_h == 0 {
        return;
    }
    for dy in 0..dest_h {
        let ty = dest_y + dy;
        if ty >= dst.height {
            continue;
        }
        let sy = src_y + (dy * src_h) / dest_h;
        if sy >= src.height {
            continue;
        }
        for dx in 0..dest_w {
            let tx = dest_x + dx;
            if tx >= dst.width {
                continue;
            }
            let sx = src_x + (dx * src_w) / dest_w;
            if sx >= src.width {
                continue;
            }
            dst.set(tx, ty, src.get(sx, sy));
        }
    }
}

fn premultiply(buf: &mut ArgbBuffer) {
    for p in buf.pixels.iter_mut() {
        let a = (*p >> 24) & 0xFF;
        if a == 0 {
            *p = 0;
        } else if a != 255 {
            let r = ((*p >> 16) & 0xFF) * a / 255;
            let g = ((*p >> 8) & 0xFF) * a / 255;
            let b = (*p & 0xFF) * a / 255;
            *p = (a << 24) | (r << 16) | (g << 8) | b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::null::NullSurface;
    use crate::store::frame::{Frame, FrameStatus};

    fn image_with_frame(w: u32, h: u32) -> Image {
        let mut img = Image::new(1, 0, 0);
        img.pix_width = w;
        img.pix_height = h;
        let mut f = Frame::new(1, 0);
        f.status = FrameStatus::RamLoadingSuccess;
        let mut buf = ArgbBuffer::new(w, h);
        buf.pixels.fill(0xFFFF0000);
        f.decoded = Some(buf);
        img.frames.push(f);
        img
    }

    #[test]
    fn infers_both_dims_from_image_size() {
        let img = image_with_frame(20, 10);
        let mut p = Placement::new(1, 0);
        infer_placement_size(&mut p, &img, 8, 16);
        assert_eq!(p.cols, Some(3));
        assert_eq!(p.rows, Some(1));
    }

    #[test]
    fn load_pixmap_rejects_oversized_request() {
        let img = image_with_frame(4, 4);
        let mut p = Placement::new(1, 0);
        p.cols = Some(100000);
        p.rows = Some(100000);
        let limits = Limits::default();
        let mut surface = NullSurface::default();
        let err = load_pixmap(&mut p, &img, 1, 8, 16, &limits, &mut surface, 0).unwrap_err();
        assert!(matches!(err, CoreError::TooBig(_)));
    }

    #[test]
    fn load_pixmap_reuses_existing_for_same_cell_metrics() {
        let img = image_with_frame(4, 4);
        let mut p = Placement::new(1, 0);
        p.cols = Some(1);
        p.rows = Some(1);
        let limits = Limits::default();
        let mut surface = NullSurface::default();
        let delta1 = load_pixmap(&mut p, &img, 1, 8, 16, &limits, &mut surface, 0).unwrap();
        assert!(delta1 > 0);
        let delta2 = load_pixmap(&mut p, &img, 1, 8, 16, &limits, &mut surface, 0).unwrap();
        assert_eq!(delta2, 0);
    }
}
