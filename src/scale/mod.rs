//! Scaler/uploader: turns a decoded frame bitmap into a placement's
//! screen-sized pixmap.

pub mod scaler;

pub use scaler::{infer_placement_size, load_pixmap};
