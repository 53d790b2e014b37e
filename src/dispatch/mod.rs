//! Applies parsed commands to the store (spec.md §4.2-§4.3, §4.9).

pub mod animation_cmd;
pub mod delete;
pub mod dispatcher;
pub mod placement_cmd;
pub mod transmit;

pub use delete::CellCallback;
pub use dispatcher::{dispatch, RedrawHook};
