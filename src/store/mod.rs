//! The in-memory data model: images, frames, placements, and the owning
//! [`context::Store`] that ties them together (spec.md §3).

pub mod context;
pub mod frame;
pub mod image;
pub mod placement;

pub use context::Store;
pub use frame::{ArgbBuffer, Frame, FrameBackground, FrameFormat, FrameStatus};
pub use image::{AnimationState, Image};
pub use placement::{Placement, PlacementPixmap, ScaleMode};
