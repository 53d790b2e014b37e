//! The "general decoder" (wire `format=100`/`format=0` fallback): hands a
//! frame file to an image-format codec instead of treating it as packed
//! raw pixels (spec.md §4.4 step 1).

use std::fs::File;
use std::path::Path;

use crate::error::CoreError;
use crate::store::frame::ArgbBuffer;

/// A pluggable image-format decoder. Declining (`Ok(None)`) tells the
/// caller to fall back to the raw RGB24/RGBA32 loader.
pub trait FormatDecoder {
    fn decode(&self, path: &Path) -> Result<Option<ArgbBuffer>, CoreError>;
}

/// Tries every decoder in order, returning the first one that doesn't
/// decline.
pub struct ChainDecoder {
    decoders: Vec<Box<dyn FormatDecoder>>,
}

impl ChainDecoder {
    pub fn new(decoders: Vec<Box<dyn FormatDecoder>>) -> Self {
        Self { decoders }
    }

    /// The chain built from compiled-in features: just [`PngDecoder`] when
    /// the `png_decoder` feature is enabled, empty otherwise.
    pub fn from_features() -> Self {
        #[allow(unused_mut)]
        let mut decoders: Vec<Box<dyn FormatDecoder>> = Vec::new();
        #[cfg(feature = "png_decoder")]
        decoders.push(Box::new(PngDecoder));
        Self { decoders }
    }

    pub fn decode(&self, path: &Path) -> Result<Option<ArgbBuffer>, CoreError> {
        for decoder in &self.decoders {
            if let Some(buf) = decoder.decode(path)? {
                return Ok(Some(buf));
            }
        }
        Ok(None)
    }
}

#[cfg(feature = "png_decoder")]
pub struct PngDecoder;

#[cfg(feature = "png_decoder")]
impl FormatDecoder for PngDecoder {
    fn decode(&self, path: &Path) -> Result<Option<ArgbBuffer>, CoreError> {
        let file = File::open(path)
            .map_err(|e| CoreError::BadFile(format!("cannot open {}: {e}", path.display())))?;
        let decoder = png::Decoder::new(file);
        let mut reader = match decoder.read_info() {
            Ok(r) => r,
            // Not a PNG (or a corrupt one); let the caller try raw pixels.
            Err(_) => return Ok(None),
        };

        let mut raw = vec![0u8; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut raw)
            .map_err(|e| CoreError::BadFile(format!("png decode failed: {e}")))?;
        let width = info.width;
        let height = info.height;

        let mut out = ArgbBuffer::new(width, height);
        let total = (width as usize) * (height as usize);
        match info.color_type {
            png::ColorType::Rgb => {
                for i in 0..total {
                    let b = i * 3;
                    let (r, g, bl) = (raw[b], raw[b + 1], raw[b + 2]);
                    out.pixels[i] = 0xFF00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | bl as u32;
                }
            }
            png::ColorType::Rgba => {
                for i in 0..total {
                    let b = i * 4;
                    let (r, g, bl, a) = (raw[b], raw[b + 1], raw[b + 2], raw[b + 3]);
                    out.pixels[i] =
                        ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | bl as u32;
                }
            }
            png::ColorType::Grayscale => {
                for i in 0..total {
                    let v = raw[i] as u32;
                    out.pixels[i] = 0xFF00_0000 | (v << 16) | (v << 8) | v;
                }
            }
            png::ColorType::GrayscaleAlpha => {
                for i in 0..total {
                    let b = i * 2;
                    let v = raw[b] as u32;
                    let a = raw[b + 1] as u32;
                    out.pixels[i] = (a << 24) | (v << 16) | (v << 8) | v;
                }
            }
            // Indexed PNGs would need the palette plumbed through; not
            // encountered in practice for this protocol, decline instead.
            png::ColorType::Indexed => return Ok(None),
        }
        Ok(Some(out))
    }
}

#[cfg(all(test, feature = "png_decoder"))]
mod tests {
    use super::*;

    #[test]
    fn declines_non_png_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-png");
        std::fs::write(&path, b"hello world").unwrap();
        let decoder = PngDecoder;
        assert!(decoder.decode(&path).unwrap().is_none());
    }

    #[test]
    fn chain_decoder_declines_when_empty() {
        let chain = ChainDecoder::new(Vec::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"whatever").unwrap();
        assert!(chain.decode(&path).unwrap().is_none());
    }
}
