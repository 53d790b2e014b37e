//! State introspection: structured dumps and overlay/info-text rendering
//! for external debug tooling (spec.md §2 "Debug/introspection").
//!
//! The crate never touches pixels or spawns processes here; it only
//! produces text and descriptors for the outer terminal to display.

use std::fmt::Write as _;

use crate::clock::Milliseconds;
use crate::ids::{ImageId, PlacementId};
use crate::store::context::Store;

/// How much debug instrumentation is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    #[default]
    Off,
    /// Log dispatched commands and eviction activity.
    Log,
    /// `Log`, plus draw bounding-box overlays over every placement.
    LogAndBoxes,
}

impl DebugMode {
    pub fn logs(&self) -> bool {
        !matches!(self, DebugMode::Off)
    }

    pub fn draws_boxes(&self) -> bool {
        matches!(self, DebugMode::LogAndBoxes)
    }
}

/// Everything needed to render one placement's debug bounding box, without
/// the crate touching a single pixel itself (spec.md §4.11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBoxOverlay {
    pub image_id: ImageId,
    pub placement_id: PlacementId,
    pub col_start: u32,
    pub col_end: u32,
    pub row_start: u32,
    pub row_end: u32,
}

impl BoundingBoxOverlay {
    /// `i[/p] [c0:c1)x[r0:r1)`.
    pub fn label(&self) -> String {
        if self.placement_id != 0 {
            format!(
                "{}/{} [{}:{})x[{}:{})",
                self.image_id, self.placement_id, self.col_start, self.col_end, self.row_start, self.row_end
            )
        } else {
            format!("{} [{}:{})x[{}:{})", self.image_id, self.col_start, self.col_end, self.row_start, self.row_end)
        }
    }
}

/// The status line the original's overlay prints alongside the boxes.
pub fn status_line(store: &Store, cell_size: (u32, u32), redraw_delay_ms: i64, render_time_us: u64) -> String {
    format!(
        "images={} ram={}KiB disk={}KiB cell={}x{} redraw={}ms render={}us",
        store.image_count(),
        store.images_ram_size() / 1024,
        store.images_disk_size() / 1024,
        cell_size.0,
        cell_size.1,
        redraw_delay_ms,
        render_time_us,
    )
}

/// A structured text dump of every live image/frame/placement, mirroring
/// `gr_dump_state`'s stderr report: sizes, atimes, and status for each
/// entity plus a consistency check against the store's cached totals.
pub fn dump_state(store: &Store, now: Milliseconds) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "======= graphics store state dump =======");
    let _ = writeln!(out, "image count: {}", store.image_count());
    let _ = writeln!(out, "placement count: {}", store.placement_count());
    let _ = writeln!(out, "ram usage: {} KiB", store.images_ram_size() / 1024);
    let _ = writeln!(out, "disk usage: {} KiB", store.images_disk_size() / 1024);
    let _ = writeln!(out, "now: {now}");

    let mut computed_disk = 0u64;
    let mut computed_ram = 0u64;

    let mut ids: Vec<ImageId> = store.images.keys().copied().collect();
    ids.sort_unstable();
    for image_id in ids {
        let img = store.image(image_id).unwrap();
        let _ = writeln!(out, "----------------");
        let _ = writeln!(
            out,
            "image {image_id} number={:?} frames={} placements={} size={}x{} atime={} duration={}ms state={:?} cur_frame={}",
            img.image_number,
            img.frames.len(),
            img.placements.len(),
            img.pix_width,
            img.pix_height,
            img.atime,
            img.total_duration_ms,
            img.animation_state,
            img.current_frame,
        );

        let mut frame_disk = 0u64;
        for frame in &img.frames {
            let _ = writeln!(
                out,
                "    frame {} format={:?} status={:?} gap={}ms disk_size={} decoded={} atime={}",
                frame.index,
                frame.format,
                frame.status,
                frame.gap_ms,
                frame.disk_size,
                frame.decoded.is_some(),
                frame.atime,
            );
            frame_disk += frame.disk_size;
            computed_disk += frame.disk_size;
            if let Some(decoded) = &frame.decoded {
                computed_ram += decoded.byte_size();
            }
        }
        if frame_disk != img.total_disk_size {
            let _ = writeln!(
                out,
                "    ERROR: total_disk_size is {}, but computed value is {}",
                img.total_disk_size, frame_disk
            );
        }

        for placement in img.placements.values() {
            let _ = writeln!(
                out,
                "    placement {} virtual={} rows={:?} cols={:?} scale={:?} atime={} pixmap_ram={}",
                placement.placement_id,
                placement.virtual_,
                placement.rows,
                placement.cols,
                placement.scale_mode,
                placement.atime,
                placement.pixmap_ram_size(),
            );
            computed_ram += placement.pixmap_ram_size();
        }
    }

    if computed_ram != store.images_ram_size() {
        let _ = writeln!(
            out,
            "ERROR: images_ram_size is {}, but computed value is {}",
            store.images_ram_size(),
            computed_ram
        );
    }
    if computed_disk != store.images_disk_size() {
        let _ = writeln!(
            out,
            "ERROR: images_disk_size is {}, but computed value is {}",
            store.images_disk_size(),
            computed_disk
        );
    }
    let _ = writeln!(out, "===========================================");
    out
}

/// The info text the original writes to a temp file for its `less`-based
/// preview pager; spawning the pager itself is the outer terminal's job.
pub fn info_text(
    store: &Store,
    image_id: ImageId,
    placement_id: PlacementId,
    col: u32,
    row: u32,
    is_classic_placeholder: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "image_id = {image_id} = 0x{image_id:08X}");
    let _ = writeln!(out, "placement_id = {placement_id} = 0x{placement_id:08X}");
    let _ = writeln!(out, "column = {col}, row = {row}");
    let _ = writeln!(out, "placeholder = {}", if is_classic_placeholder { "classic" } else { "unicode" });

    match store.image(image_id) {
        Some(img) => {
            let _ = writeln!(
                out,
                "image: number={:?} size={}x{} frames={} state={:?}",
                img.image_number,
                img.pix_width,
                img.pix_height,
                img.frames.len(),
                img.animation_state,
            );
            if let Some(placement) = img.placements.get(&placement_id) {
                let _ = writeln!(
                    out,
                    "placement: virtual={} rows={:?} cols={:?} src=({},{}) {:?}x{:?} scale={:?}",
                    placement.virtual_,
                    placement.rows,
                    placement.cols,
                    placement.src_x,
                    placement.src_y,
                    placement.src_w,
                    placement.src_h,
                    placement.scale_mode,
                );
            } else {
                let _ = writeln!(out, "placement: not found");
            }
            let _ = writeln!(out, "frames:");
            for frame in &img.frames {
                let _ = writeln!(
                    out,
                    "  {} format={:?} status={:?} gap={}ms disk_size={}",
                    frame.index, frame.format, frame.status, frame.gap_ms, frame.disk_size
                );
            }
        }
        None => {
            let _ = writeln!(out, "image: not found");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    #[test]
    fn bounding_box_label_includes_placement_when_nonzero() {
        let overlay = BoundingBoxOverlay { image_id: 1, placement_id: 2, col_start: 0, col_end: 4, row_start: 0, row_end: 2 };
        assert_eq!(overlay.label(), "1/2 [0:4)x[0:2)");
    }

    #[test]
    fn bounding_box_label_omits_zero_placement() {
        let overlay = BoundingBoxOverlay { image_id: 1, placement_id: 0, col_start: 0, col_end: 4, row_start: 0, row_end: 2 };
        assert_eq!(overlay.label(), "1 [0:4)x[0:2)");
    }

    #[test]
    fn dump_state_reports_image_count() {
        let mut s = store();
        s.new_image(1);
        s.new_image(2);
        let dump = dump_state(&s, 0);
        assert!(dump.contains("image count: 2"));
    }

    #[test]
    fn info_text_reports_missing_image() {
        let s = store();
        let text = info_text(&s, 999, 0, 3, 4, true);
        assert!(text.contains("image: not found"));
        assert!(text.contains("column = 3, row = 4"));
    }

    #[test]
    fn debug_mode_levels() {
        assert!(!DebugMode::Off.logs());
        assert!(DebugMode::Log.logs());
        assert!(!DebugMode::Log.draws_boxes());
        assert!(DebugMode::LogAndBoxes.draws_boxes());
    }
}
