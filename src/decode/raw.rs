//! Raw pixel loader: reads a frame file as packed RGB24 or RGBA32 into an
//! ARGB32 buffer, optionally through a zlib inflater (spec.md §4.4 step 1).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;

use crate::error::CoreError;
use crate::store::frame::{ArgbBuffer, Compression, FrameFormat};

/// Reads `path` as `width x height` pixels in `format` (must be `Rgb24` or
/// `Rgba32`), decompressing with zlib first if `compression` requests it.
/// RGB input gets `alpha = 0xFF`.
pub fn load_raw_pixels(
    path: &Path,
    format: FrameFormat,
    compression: Compression,
    width: u32,
    height: u32,
) -> Result<ArgbBuffer, CoreError> {
    let pixel_size: usize = match format {
        FrameFormat::Rgb24 => 3,
        FrameFormat::Rgba32 => 4,
        _ => return Err(CoreError::Invalid("raw loader requires format 24 or 32".into())),
    };

    let file = File::open(path)
        .map_err(|e| CoreError::BadFile(format!("cannot open {}: {e}", path.display())))?;

    let total_pixels = (width as usize) * (height as usize);
    let needed_bytes = total_pixels * pixel_size;
    let bytes = match compression {
        Compression::None => read_exact_or_short(file, needed_bytes)?,
        Compression::Zlib => {
            let mut decoder = ZlibDecoder::new(file);
            let mut buf = Vec::with_capacity(needed_bytes);
            decoder
                .read_to_end(&mut buf)
                .map_err(|e| CoreError::BadFile(format!("zlib inflate failed: {e}")))?;
            buf
        }
    };

    let mut out = ArgbBuffer::new(width, height);
    let available_pixels = (bytes.len() / pixel_size).min(total_pixels);
    for i in 0..available_pixels {
        let byte_i = i * pixel_size;
        let r = bytes[byte_i];
        let g = bytes[byte_i + 1];
        let b = bytes[byte_i + 2];
        let a = if pixel_size == 4 { bytes[byte_i + 3] } else { 0xFF };
        out.pixels[i] =
            (b as u32) | ((g as u32) << 8) | ((r as u32) << 16) | ((a as u32) << 24);
    }
    Ok(out)
}

fn read_exact_or_short(mut file: File, needed: usize) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::with_capacity(needed);
    file.read_to_end(&mut buf)
        .map_err(|e| CoreError::BadFile(format!("read failed: {e}")))?;
    Ok(buf)
}
