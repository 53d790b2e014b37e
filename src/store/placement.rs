//! A request to render a (possibly cropped, scaled) view of an image.

use crate::clock::Milliseconds;
use crate::ids::PlacementId;
use crate::render::PixmapHandle;

/// How the source rect is fit into `cols x rows` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    /// Stretch source to destination.
    Fill,
    /// Letterbox, preserving aspect ratio.
    Contain,
    /// Copy 1:1 at the origin, clipping if larger than the destination.
    None,
    /// `None` unless the destination is smaller in either axis, then `Contain`.
    NoneOrContain,
}

/// A scaled pixmap the compositor produced for one frame of a placement.
#[derive(Debug)]
pub struct PlacementPixmap {
    pub handle: PixmapHandle,
    pub byte_size: u64,
}

pub struct Placement {
    pub placement_id: PlacementId,
    /// Anchors Unicode placeholders elsewhere; the store never renders it.
    pub virtual_: bool,
    pub scale_mode: ScaleMode,
    pub rows: Option<u32>,
    pub cols: Option<u32>,
    pub src_x: u32,
    pub src_y: u32,
    /// `None` means "to the edge of the image".
    pub src_w: Option<u32>,
    pub src_h: Option<u32>,
    pub do_not_move_cursor: bool,
    pub atime: Milliseconds,
    /// Per-frame pixmap slots, 1-based frame index maps to `slot index - 1`.
    pub pixmaps: Vec<Option<PlacementPixmap>>,
    /// Cell metrics the current pixmaps were built for; a mismatch forces
    /// a full re-scale (spec.md §4.5).
    pub scaled_cell: Option<(u32, u32)>,
    /// Frame index that must not be evicted during the current render
    /// (spec.md §5, §9).
    pub protected_frame: Option<u32>,
}

impl Placement {
    pub fn new(placement_id: PlacementId, now: Milliseconds) -> Self {
        Self {
            placement_id,
            virtual_: false,
            scale_mode: ScaleMode::Contain,
            rows: None,
            cols: None,
            src_x: 0,
            src_y: 0,
            src_w: None,
            src_h: None,
            do_not_move_cursor: false,
            atime: now,
            pixmaps: Vec::new(),
            scaled_cell: None,
            protected_frame: None,
        }
    }

    pub fn touch(&mut self, now: Milliseconds) {
        self.atime = now;
    }

    pub fn pixmap_ram_size(&self) -> u64 {
        self.pixmaps.iter().flatten().map(|p| p.byte_size).sum()
    }

    /// Drops every pixmap (e.g. because the cell metrics changed),
    /// returning freed bytes.
    pub fn clear_pixmaps(&mut self) -> u64 {
        let freed = self.pixmap_ram_size();
        self.pixmaps.clear();
        self.scaled_cell = None;
        freed
    }

    fn ensure_slot(&mut self, frame_index: u32) {
        let needed = frame_index as usize;
        if self.pixmaps.len() < needed {
            self.pixmaps.resize_with(needed, || None);
        }
    }

    pub fn pixmap(&self, frame_index: u32) -> Option<&PlacementPixmap> {
        self.pixmaps.get((frame_index as usize).checked_sub(1)?)?.as_ref()
    }

    /// Sets the pixmap for `frame_index` (1-based), returning the bytes
    /// freed if one was already present.
    pub fn set_pixmap(&mut self, frame_index: u32, pixmap: PlacementPixmap) -> u64 {
        self.ensure_slot(frame_index);
        let slot = &mut self.pixmaps[(frame_index - 1) as usize];
        let freed = slot.take().map(|p| p.byte_size).unwrap_or(0);
        *slot = Some(pixmap);
        freed
    }

    /// Drops the pixmap for `frame_index`, returning its byte size if present.
    pub fn unload_pixmap(&mut self, frame_index: u32) -> u64 {
        match self.pixmaps.get_mut((frame_index as usize).saturating_sub(1)) {
            Some(slot) => slot.take().map(|p| p.byte_size).unwrap_or(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PixmapHandle;

    fn pm(size: u64) -> PlacementPixmap {
        PlacementPixmap { handle: PixmapHandle::new(1), byte_size: size }
    }

    #[test]
    fn set_and_unload_pixmap_tracks_ram() {
        let mut p = Placement::new(1, 0);
        assert_eq!(p.pixmap_ram_size(), 0);
        p.set_pixmap(2, pm(100));
        assert_eq!(p.pixmap_ram_size(), 100);
        assert_eq!(p.unload_pixmap(2), 100);
        assert_eq!(p.pixmap_ram_size(), 0);
        assert!(p.pixmap(2).is_none());
    }

    #[test]
    fn clear_pixmaps_resets_scaled_cell() {
        let mut p = Placement::new(1, 0);
        p.scaled_cell = Some((8, 16));
        p.set_pixmap(1, pm(50));
        let freed = p.clear_pixmaps();
        assert_eq!(freed, 50);
        assert!(p.scaled_cell.is_none());
        assert!(p.pixmaps.is_empty());
    }
}
