//! Turning an uploaded frame file into a decoded ARGB bitmap.

pub mod compositor;
pub mod format;
pub mod raw;

pub use compositor::ensure_loaded;
pub use format::{ChainDecoder, FormatDecoder};
