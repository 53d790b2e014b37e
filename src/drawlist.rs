//! Draw-list coalescer: accumulates requested image rectangles within one
//! redraw cycle, merging vertically adjacent stripes of the same placement,
//! and tracks per-row animation redraw deadlines (spec.md §4.7).

use crate::animation::{next_redraw_delay, NO_REDRAW_PENDING};
use crate::clock::Milliseconds;
use crate::ids::{ImageId, PlacementId};

const MAX_IMAGE_RECTS: usize = 20;

/// A rectangular piece of an image queued for drawing. Column/row ends are
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRect {
    pub image_id: ImageId,
    pub placement_id: PlacementId,
    pub screen_x_pix: i32,
    pub screen_y_pix: i32,
    pub screen_y_row: i32,
    pub img_start_col: i32,
    pub img_end_col: i32,
    pub img_start_row: i32,
    pub img_end_row: i32,
    pub cw: i32,
    pub ch: i32,
    pub reverse: bool,
}

impl ImageRect {
    fn bottom(&self) -> i32 {
        self.screen_y_pix + (self.img_end_row - self.img_start_row) * self.ch
    }

    fn is_empty(&self) -> bool {
        self.image_id == 0 || self.img_end_col - self.img_start_col <= 0
            || self.img_end_row - self.img_start_row <= 0
    }
}

/// Fixed-capacity ring of pending rectangles plus the per-row animation
/// redraw deadline map.
#[derive(Default)]
pub struct DrawList {
    slots: Vec<Option<ImageRect>>,
    next_redraw_times: Vec<Milliseconds>,
}

impl DrawList {
    pub fn new() -> Self {
        Self { slots: vec![None; MAX_IMAGE_RECTS], next_redraw_times: Vec::new() }
    }

    /// Queues `rect`. Returns a rect that had to be evicted to make room, if
    /// any — the caller must draw it before discarding it.
    pub fn append(&mut self, rect: ImageRect) -> Option<ImageRect> {
        if rect.is_empty() {
            return None;
        }

        let mut free_slot: Option<usize> = None;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                None => {
                    if free_slot.is_none() {
                        free_slot = Some(i);
                    }
                }
                Some(existing) => {
                    if existing.image_id == rect.image_id
                        && existing.placement_id == rect.placement_id
                        && existing.cw == rect.cw
                        && existing.ch == rect.ch
                        && existing.reverse == rect.reverse
                        && existing.img_end_row == rect.img_start_row
                        && existing.bottom() == rect.screen_y_pix
                        && existing.img_start_col == rect.img_start_col
                        && existing.img_end_col == rect.img_end_col
                        && existing.screen_x_pix == rect.screen_x_pix
                    {
                        existing.img_end_row = rect.img_end_row;
                        return None;
                    }
                }
            }
        }

        if let Some(i) = free_slot {
            self.slots[i] = Some(rect);
            return None;
        }

        // No free slot: flush whichever pending rect extends furthest down.
        let evict_index = self
            .slots
            .iter()
            .enumerate()
            .max_by_key(|(_, s)| s.as_ref().map(|r| r.bottom()).unwrap_or(i32::MIN))
            .map(|(i, _)| i)
            .unwrap();
        let evicted = self.slots[evict_index].take();
        self.slots[evict_index] = Some(rect);
        evicted
    }

    /// Drains every pending rect for the caller to draw, resetting the
    /// ring. Call at end-of-drawing.
    pub fn drain(&mut self) -> Vec<ImageRect> {
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }

    /// Records that the image owning row `row` next needs a redraw at
    /// `next_redraw`; keeps the earliest deadline seen for that row.
    pub fn update_next_redraw_time(&mut self, row: usize, next_redraw: Milliseconds) {
        if next_redraw == 0 {
            return;
        }
        if row >= self.next_redraw_times.len() {
            self.next_redraw_times.resize(row + 1, 0);
        }
        let slot = &mut self.next_redraw_times[row];
        if *slot == 0 || *slot > next_redraw {
            *slot = next_redraw;
        }
    }

    /// Marks screen rows whose redraw deadline has passed as dirty, zeroing
    /// their deadline. Call right after starting a draw.
    pub fn mark_dirty_animations(&mut self, dirty: &mut [bool], now: Milliseconds) {
        let rows = dirty.len();
        if rows < self.next_redraw_times.len() {
            self.next_redraw_times.truncate(rows);
        }
        for (i, d) in dirty.iter_mut().enumerate().take(self.next_redraw_times.len()) {
            if *d {
                self.next_redraw_times[i] = 0;
                continue;
            }
            let deadline = self.next_redraw_times[i];
            if deadline > 0 && deadline <= now {
                *d = true;
                self.next_redraw_times[i] = 0;
            }
        }
    }

    /// The global redraw delay after a finished draw: minimum over all
    /// per-row deadlines, floored at `min_delay_ms`. [`NO_REDRAW_PENDING`]
    /// if nothing is scheduled.
    pub fn finish_drawing(&self, now: Milliseconds, min_delay_ms: Milliseconds) -> i64 {
        next_redraw_delay(self.next_redraw_times.iter().copied(), now, min_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(image_id: u32, start_row: i32, end_row: i32, y_pix: i32, ch: i32) -> ImageRect {
        ImageRect {
            image_id,
            placement_id: 1,
            screen_x_pix: 0,
            screen_y_pix: y_pix,
            screen_y_row: start_row,
            img_start_col: 0,
            img_end_col: 1,
            img_start_row: start_row,
            img_end_row: end_row,
            cw: 8,
            ch,
            reverse: false,
        }
    }

    #[test]
    fn adjacent_stripes_merge() {
        let mut list = DrawList::new();
        assert!(list.append(rect(1, 0, 1, 0, 16)).is_none());
        assert!(list.append(rect(1, 1, 2, 16, 16)).is_none());
        let drained = list.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].img_end_row, 2);
    }

    #[test]
    fn non_adjacent_stripes_stay_separate() {
        let mut list = DrawList::new();
        list.append(rect(1, 0, 1, 0, 16));
        list.append(rect(1, 5, 6, 999, 16));
        assert_eq!(list.drain().len(), 2);
    }

    #[test]
    fn overflow_evicts_the_deepest_rect() {
        let mut list = DrawList::new();
        for i in 0..MAX_IMAGE_RECTS {
            list.append(rect((i + 1) as u32, 0, 1, (i as i32) * 100, 16));
        }
        let evicted = list.append(rect(999, 0, 1, 100_000, 16));
        assert!(evicted.is_some());
        assert_eq!(evicted.unwrap().image_id, (MAX_IMAGE_RECTS) as u32);
    }

    #[test]
    fn empty_rect_is_ignored() {
        let mut list = DrawList::new();
        assert!(list.append(rect(1, 0, 0, 0, 16)).is_none());
        assert!(list.drain().is_empty());
    }

    #[test]
    fn redraw_delay_reflects_earliest_row_deadline() {
        let mut list = DrawList::new();
        list.update_next_redraw_time(0, 500);
        list.update_next_redraw_time(1, 200);
        assert_eq!(list.finish_drawing(100, 1), 100);
    }

    #[test]
    fn no_pending_redraw_returns_sentinel() {
        let list = DrawList::new();
        assert_eq!(list.finish_drawing(0, 1), NO_REDRAW_PENDING);
    }
}
