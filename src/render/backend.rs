//! Compositor surface abstraction.
//!
//! The store never touches a GPU or the window system directly; it talks
//! to whatever the outer terminal plugs in through [`CompositorSurface`]
//! (spec.md §6 "Compositor surface"). This mirrors the teacher's
//! `RenderBackend`/`ErasedSurface` split, minus anything GPU-specific we
//! have no use for here.

use crate::store::frame::ArgbBuffer;

/// Opaque handle to a pixmap the compositor owns. The store stores these
/// on [`crate::store::placement::Placement`] slots and never inspects the
/// contents; only [`CompositorSurface`] knows what `id` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixmapHandle(u64);

impl PixmapHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The interface the core consumes from the pixel compositor (spec.md §6):
/// allocate a pixmap, upload ARGB32 pixels to it, composite a rect of it to
/// the destination surface (optionally inverted), and free it.
pub trait CompositorSurface {
    /// Allocate a `width x height` 32bpp pixmap and upload `pixels`
    /// (premultiplied ARGB32, row-major). Returns a handle the store will
    /// hold until [`CompositorSurface::free_pixmap`] is called.
    fn upload_pixmap(&mut self, pixels: &ArgbBuffer) -> PixmapHandle;

    /// Composite `src_rect` of `pixmap` onto the destination surface at
    /// `(dst_x, dst_y)`. `reverse` requests the bitwise-inverted blend
    /// used for the cursor/selection highlight (spec.md §9: an
    /// approximation operating on premultiplied pixels, kept as-is).
    fn composite(
        &mut self,
        pixmap: PixmapHandle,
        src_rect: (u32, u32, u32, u32),
        dst: (i32, i32),
        reverse: bool,
    );

    /// Release a pixmap previously returned by `upload_pixmap`.
    fn free_pixmap(&mut self, pixmap: PixmapHandle);
}
