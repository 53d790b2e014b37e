//! A terminal graphics protocol store: parses the wire command grammar,
//! manages the on-disk frame cache and in-memory decoded/scaled pixmaps,
//! drives the animation scheduler, and evicts under resource pressure.
//!
//! The crate never touches a terminal grid, a GPU, or the window system
//! directly — those live behind [`render::CompositorSurface`],
//! [`dispatch::CellCallback`], and [`dispatch::RedrawHook`], which the
//! embedding terminal implements.

pub mod animation;
pub mod base64;
pub mod cache_dir;
pub mod clock;
pub mod config;
pub mod debug;
pub mod decode;
pub mod dispatch;
pub mod drawlist;
pub mod error;
pub mod eviction;
pub mod ids;
pub mod protocol;
pub mod render;
pub mod scale;
pub mod store;

pub use config::Limits;
pub use dispatch::{dispatch, CellCallback, RedrawHook};
pub use error::{CoreError, Result};
pub use protocol::{parse, Command};
pub use store::Store;
