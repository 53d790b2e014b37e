//! A single timestep of an [`super::Image`].

use crate::clock::Milliseconds;
use crate::error::UploadFailureReason;
use std::fs::File;

/// How the frame's on-disk bytes should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Try the general decoder first, fall back to raw RGBA32.
    Auto,
    Rgb24,
    Rgba32,
    /// Use the general (PNG/JPEG) decoder only.
    GeneralDecoder,
}

impl FrameFormat {
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(FrameFormat::Auto),
            24 => Some(FrameFormat::Rgb24),
            32 => Some(FrameFormat::Rgba32),
            100 => Some(FrameFormat::GeneralDecoder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
}

/// What the frame should be composited over before the frame bitmap itself
/// is blended/copied on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBackground {
    None,
    /// 0xRRGGBBAA.
    Color(u32),
    /// 1-based index of another frame in the same image.
    Frame(u32),
}

/// Lifecycle of a frame's upload and decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Uninitialized,
    Uploading,
    UploadingError,
    UploadingSuccess,
    /// Sentinel that guards against cyclic background-frame references
    /// (spec.md §4.4 step 2, §9).
    RamLoadingInProgress,
    RamLoadingSuccess,
    RamLoadingError,
}

impl FrameStatus {
    pub fn is_uploaded(&self) -> bool {
        matches!(
            self,
            FrameStatus::UploadingSuccess
                | FrameStatus::RamLoadingInProgress
                | FrameStatus::RamLoadingSuccess
                | FrameStatus::RamLoadingError
        )
    }
}

/// An in-RAM ARGB32 bitmap, premultiplication applied only at scale time
/// (spec.md scenario 1: "the server premultiplies only on scale").
#[derive(Debug, Clone)]
pub struct ArgbBuffer {
    pub width: u32,
    pub height: u32,
    /// 0xAARRGGBB per pixel, row-major.
    pub pixels: Vec<u32>,
}

impl ArgbBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![0; (width as usize) * (height as usize)] }
    }

    pub fn byte_size(&self) -> u64 {
        (self.pixels.len() * 4) as u64
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[(y as usize) * (self.width as usize) + (x as usize)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u32) {
        self.pixels[(y as usize) * (self.width as usize) + (x as usize)] = value;
    }
}

pub struct Frame {
    pub index: u32,
    pub format: FrameFormat,
    pub compression: Compression,
    pub expected_size: Option<u64>,
    pub data_pix_width: u32,
    pub data_pix_height: u32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub background: FrameBackground,
    pub blend: bool,
    /// Negative means gapless: crossed without consuming time.
    pub gap_ms: i32,
    pub quiet: u8,
    pub status: FrameStatus,
    pub uploading_failure: Option<UploadFailureReason>,
    pub disk_size: u64,
    pub write_handle: Option<File>,
    pub atime: Milliseconds,
    pub decoded: Option<ArgbBuffer>,
    /// Set once after a missing-cache-file decode error, so repeated
    /// render attempts don't keep re-downgrading/logging (spec.md §7).
    pub missing_file_reported: bool,
}

impl Frame {
    pub fn new(index: u32, now: Milliseconds) -> Self {
        Self {
            index,
            format: FrameFormat::Auto,
            compression: Compression::None,
            expected_size: None,
            data_pix_width: 0,
            data_pix_height: 0,
            offset_x: 0,
            offset_y: 0,
            background: FrameBackground::None,
            blend: true,
            gap_ms: 0,
            quiet: 0,
            status: FrameStatus::Uninitialized,
            uploading_failure: None,
            disk_size: 0,
            write_handle: None,
            atime: now,
            decoded: None,
            missing_file_reported: false,
        }
    }

    /// Milliseconds this frame contributes to the image's animation
    /// duration; gapless frames contribute nothing (spec.md §8).
    pub fn duration_contribution(&self) -> i64 {
        self.gap_ms.max(0) as i64
    }

    pub fn is_gapless(&self) -> bool {
        self.gap_ms <= 0
    }

    pub fn touch(&mut self, now: Milliseconds) {
        self.atime = now;
    }

    /// Drops the decoded bitmap, if any, returning its RAM footprint.
    pub fn unload_decoded(&mut self) -> u64 {
        self.decoded.take().map(|b| b.byte_size()).unwrap_or(0)
    }
}
