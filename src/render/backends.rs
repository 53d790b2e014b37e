//! Concrete [`super::backend::CompositorSurface`] implementations.

pub mod null;
