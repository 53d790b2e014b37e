//! A no-op [`CompositorSurface`] useful for tests and headless operation.
//!
//! Mirrors the teacher's `render::backends::null::NullBackend`: it never
//! shows any pixels but exercises the same allocate/composite/free
//! contract real backends do, and records calls so tests can assert on
//! them.

use crate::render::backend::{CompositorSurface, PixmapHandle};
use crate::store::frame::ArgbBuffer;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeCall {
    pub pixmap: PixmapHandle,
    pub src_rect: (u32, u32, u32, u32),
    pub dst: (i32, i32),
    pub reverse: bool,
}

/// Test/headless compositor surface. Tracks which handles are currently
/// live so tests can assert the store never double-frees or uses a freed
/// pixmap.
#[derive(Default)]
pub struct NullSurface {
    next_id: u64,
    live: HashSet<PixmapHandle>,
    pub composites: Vec<CompositeCall>,
}

impl NullSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl CompositorSurface for NullSurface {
    fn upload_pixmap(&mut self, _pixels: &ArgbBuffer) -> PixmapHandle {
        self.next_id += 1;
        let handle = PixmapHandle::new(self.next_id);
        self.live.insert(handle);
        handle
    }

    fn composite(
        &mut self,
        pixmap: PixmapHandle,
        src_rect: (u32, u32, u32, u32),
        dst: (i32, i32),
        reverse: bool,
    ) {
        assert!(self.live.contains(&pixmap), "compositing a freed pixmap");
        self.composites.push(CompositeCall { pixmap, src_rect, dst, reverse });
    }

    fn free_pixmap(&mut self, pixmap: PixmapHandle) {
        assert!(self.live.remove(&pixmap), "double-free of a pixmap");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_live_pixmaps() {
        let mut surface = NullSurface::new();
        let buf = ArgbBuffer::new(1, 1);
        let handle = surface.upload_pixmap(&buf);
        assert_eq!(surface.live_count(), 1);
        surface.composite(handle, (0, 0, 1, 1), (0, 0), false);
        surface.free_pixmap(handle);
        assert_eq!(surface.live_count(), 0);
    }

    #[test]
    #[should_panic(expected = "double-free")]
    fn double_free_panics() {
        let mut surface = NullSurface::new();
        let buf = ArgbBuffer::new(1, 1);
        let handle = surface.upload_pixmap(&buf);
        surface.free_pixmap(handle);
        surface.free_pixmap(handle);
    }
}
