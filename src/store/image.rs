//! A logical image: an ordered sequence of frames and its placements.

use std::collections::HashMap;

use crate::clock::Milliseconds;
use crate::ids::{ImageId, PlacementId};
use crate::store::frame::Frame;
use crate::store::placement::Placement;

/// Playback state of an image's frame sequence (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    /// No animation control command has run yet.
    Unset,
    Stopped,
    Loading,
    Looping,
}

impl AnimationState {
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            1 => Some(AnimationState::Stopped),
            2 => Some(AnimationState::Loading),
            3 => Some(AnimationState::Looping),
            _ => None,
        }
    }
}

pub struct Image {
    pub image_id: ImageId,
    pub image_number: Option<u32>,
    pub frames: Vec<Frame>,
    pub placements: HashMap<PlacementId, Placement>,
    pub default_placement: Option<PlacementId>,
    pub pix_width: u32,
    pub pix_height: u32,
    pub animation_state: AnimationState,
    /// 1-based; 0 means "not yet touched by the scheduler".
    pub current_frame: u32,
    pub current_frame_time: Milliseconds,
    pub total_duration_ms: i64,
    pub next_redraw_ms: Milliseconds,
    pub last_redraw_ms: Milliseconds,
    pub total_disk_size: u64,
    pub atime: Milliseconds,
    /// Order tiebreaker shared with [`crate::store::context::Store::global_command_counter`].
    pub global_command_index: u64,
}

impl Image {
    pub fn new(image_id: ImageId, now: Milliseconds, global_command_index: u64) -> Self {
        Self {
            image_id,
            image_number: None,
            frames: Vec::new(),
            placements: HashMap::new(),
            default_placement: None,
            pix_width: 0,
            pix_height: 0,
            animation_state: AnimationState::Unset,
            current_frame: 0,
            current_frame_time: now,
            total_duration_ms: 0,
            next_redraw_ms: 0,
            last_redraw_ms: now,
            total_disk_size: 0,
            atime: now,
            global_command_index,
        }
    }

    pub fn touch(&mut self, now: Milliseconds) {
        self.atime = now;
    }

    /// Last frame index whose upload has actually finished; a half-uploaded
    /// trailing frame is hidden from the scheduler (spec.md §4.6).
    pub fn last_uploaded_frame_index(&self) -> u32 {
        let len = self.frames.len() as u32;
        if len == 0 {
            return 0;
        }
        if !self.frames[(len - 1) as usize].status.is_uploaded() {
            return len.saturating_sub(1);
        }
        len
    }

    pub fn frame(&self, index: u32) -> Option<&Frame> {
        index.checked_sub(1).and_then(|i| self.frames.get(i as usize))
    }

    pub fn frame_mut(&mut self, index: u32) -> Option<&mut Frame> {
        index.checked_sub(1).and_then(|i| self.frames.get_mut(i as usize))
    }

    pub fn recompute_total_duration(&mut self) {
        self.total_duration_ms = self.frames.iter().map(|f| f.duration_contribution()).sum();
    }

    pub fn recompute_disk_size(&mut self) {
        self.total_disk_size = self.frames.iter().map(|f| f.disk_size).sum();
    }
}
