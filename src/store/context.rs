//! The owning context: all live images, placements and frames, plus the
//! aggregate counters the rest of the crate enforces limits against.
//!
//! Modeled as a single struct passed explicitly (spec.md §9 "Shared mutable
//! store") rather than a process-global singleton, so multiple stores can
//! coexist in tests.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;

use crate::cache_dir::CacheDir;
use crate::clock::{Clock, Milliseconds, MonotonicClock};
use crate::ids::{self, ImageId, PlacementId};
use crate::render::CompositorSurface;
use crate::store::image::Image;
use crate::store::placement::Placement;

pub struct Store {
    pub images: HashMap<ImageId, Image>,
    pub cache_dir: CacheDir,
    clock: Box<dyn Clock>,
    /// Strictly increasing per applied command; breaks ties between images
    /// sharing an `image_number` and between eviction candidates with the
    /// same `atime` (spec.md §3, §4.8, §9).
    global_command_counter: u64,
    total_placement_count: usize,
    /// `(image_id, frame_index)` of a direct upload still awaiting its
    /// final chunk. Continuation chunks omit `i`/`I` and are recognized
    /// only by this (spec.md §4.3).
    active_direct_upload: Option<(ImageId, u32)>,
}

impl Store {
    /// Create a store with a real monotonic clock and a cache directory
    /// under `cache_parent` (e.g. `/tmp`).
    pub fn new(cache_parent: &Path) -> Result<Self> {
        Self::with_clock(cache_parent, Box::new(MonotonicClock::new()))
    }

    pub fn with_clock(cache_parent: &Path, clock: Box<dyn Clock>) -> Result<Self> {
        Ok(Self {
            images: HashMap::new(),
            cache_dir: CacheDir::create(cache_parent)?,
            clock,
            global_command_counter: 0,
            total_placement_count: 0,
            active_direct_upload: None,
        })
    }

    pub fn active_direct_upload(&self) -> Option<(ImageId, u32)> {
        self.active_direct_upload
    }

    pub fn set_active_direct_upload(&mut self, upload: Option<(ImageId, u32)>) {
        self.active_direct_upload = upload;
    }

    pub fn now(&self) -> Milliseconds {
        self.clock.now_ms()
    }

    /// Advances and returns the total command order counter. Call once per
    /// applied protocol command.
    pub fn next_command_index(&mut self) -> u64 {
        self.global_command_counter += 1;
        self.global_command_counter
    }

    pub fn command_index(&self) -> u64 {
        self.global_command_counter
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn image_mut(&mut self, id: ImageId) -> Option<&mut Image> {
        self.images.get_mut(&id)
    }

    /// Finds the most recently created live image with `image_number`,
    /// breaking ties by `global_command_index` (spec.md §3).
    pub fn image_by_number(&self, number: u32) -> Option<&Image> {
        self.images
            .values()
            .filter(|img| img.image_number == Some(number))
            .max_by_key(|img| img.global_command_index)
    }

    /// Creates a new image, deleting any existing image with the same id
    /// first. `id = 0` generates a fresh id.
    pub fn new_image(&mut self, id: ImageId) -> ImageId {
        let now = self.clock.now_ms();
        let command_index = self.global_command_counter;
        let id = if id == 0 {
            let existing: std::collections::HashSet<ImageId> = self.images.keys().copied().collect();
            ids::generate_image_id(|candidate| existing.contains(&candidate))
        } else {
            id
        };
        if self.images.contains_key(&id) {
            self.delete_image(id);
        }
        self.images.insert(id, Image::new(id, now, command_index));
        id
    }

    /// Creates a new placement on `image_id`, deleting any existing
    /// placement with the same id first. `id = 0` generates a fresh id.
    pub fn new_placement(&mut self, image_id: ImageId, id: PlacementId) -> Option<PlacementId> {
        let now = self.clock.now_ms();
        let img = self.images.get_mut(&image_id)?;
        let id = if id == 0 {
            let existing: std::collections::HashSet<PlacementId> = img.placements.keys().copied().collect();
            ids::generate_placement_id(|candidate| existing.contains(&candidate))
        } else {
            id
        };
        let existed = img.placements.insert(id, Placement::new(id, now)).is_some();
        if !existed {
            self.total_placement_count += 1;
        }
        if img.default_placement.is_none() {
            img.default_placement = Some(id);
        }
        Some(id)
    }

    pub fn delete_placement(&mut self, image_id: ImageId, placement_id: PlacementId) -> bool {
        let Some(img) = self.images.get_mut(&image_id) else { return false };
        let Some(_) = img.placements.remove(&placement_id) else { return false };
        self.total_placement_count -= 1;
        if img.default_placement == Some(placement_id) {
            img.default_placement = img.placements.keys().next().copied();
        }
        true
    }

    pub fn delete_image(&mut self, image_id: ImageId) -> bool {
        match self.images.remove(&image_id) {
            Some(img) => {
                self.total_placement_count -= img.placements.len();
                true
            }
            None => false,
        }
    }

    /// Releases every live pixmap on `image_id`'s placements through
    /// `surface`, removes every frame's cache file still on disk, then
    /// deletes the placement accounting (spec.md §4.9 teardown).
    pub fn teardown_placement(
        &mut self,
        image_id: ImageId,
        placement_id: PlacementId,
        surface: &mut dyn CompositorSurface,
    ) -> bool {
        if let Some(img) = self.images.get(&image_id) {
            if let Some(placement) = img.placements.get(&placement_id) {
                for pixmap in placement.pixmaps.iter().flatten() {
                    surface.free_pixmap(pixmap.handle);
                }
            }
        }
        self.delete_placement(image_id, placement_id)
    }

    /// Releases every live pixmap across `image_id`'s placements and every
    /// frame's cache file still on disk, then deletes the image (spec.md
    /// §4.9 teardown, grounded on the original's `gr_delete_image_keep_id`
    /// + `gr_delete_imagefile`).
    pub fn teardown_image(&mut self, image_id: ImageId, surface: &mut dyn CompositorSurface) -> bool {
        if let Some(img) = self.images.get(&image_id) {
            for frame in &img.frames {
                if frame.disk_size > 0 {
                    let _ = std::fs::remove_file(self.cache_dir.frame_path(image_id, frame.index));
                }
            }
            for placement in img.placements.values() {
                for pixmap in placement.pixmaps.iter().flatten() {
                    surface.free_pixmap(pixmap.handle);
                }
            }
        }
        self.delete_image(image_id)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn placement_count(&self) -> usize {
        self.total_placement_count
    }

    /// Sum of every frame's on-disk size, across every image. Exact by
    /// construction (spec.md §8).
    pub fn images_disk_size(&self) -> u64 {
        self.images.values().flat_map(|i| &i.frames).map(|f| f.disk_size).sum()
    }

    /// Sum of decoded-bitmap and scaled-pixmap RAM usage, across every
    /// image (spec.md §8).
    pub fn images_ram_size(&self) -> u64 {
        let decoded: u64 = self
            .images
            .values()
            .flat_map(|i| &i.frames)
            .filter_map(|f| f.decoded.as_ref())
            .map(|d| d.byte_size())
            .sum();
        let pixmaps: u64 = self
            .images
            .values()
            .flat_map(|i| i.placements.values())
            .map(|p| p.pixmap_ram_size())
            .sum();
        decoded + pixmaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::path::PathBuf;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    #[test]
    fn new_image_with_explicit_id_replaces_existing() {
        let mut s = store();
        let id = s.new_image(42);
        assert_eq!(id, 42);
        s.image_mut(42).unwrap().pix_width = 10;
        let id2 = s.new_image(42);
        assert_eq!(id2, 42);
        // Replacing the image resets its state.
        assert_eq!(s.image(42).unwrap().pix_width, 0);
    }

    #[test]
    fn generated_image_ids_are_unique() {
        let mut s = store();
        let a = s.new_image(0);
        let b = s.new_image(0);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn placement_count_tracks_create_and_delete() {
        let mut s = store();
        let img = s.new_image(1);
        assert_eq!(s.placement_count(), 0);
        let p1 = s.new_placement(img, 0).unwrap();
        assert_eq!(s.placement_count(), 1);
        s.new_placement(img, 0).unwrap();
        assert_eq!(s.placement_count(), 2);
        s.delete_placement(img, p1);
        assert_eq!(s.placement_count(), 1);
    }

    #[test]
    fn deleting_image_drops_its_placements_from_the_count() {
        let mut s = store();
        let img = s.new_image(1);
        s.new_placement(img, 0).unwrap();
        s.new_placement(img, 0).unwrap();
        assert_eq!(s.placement_count(), 2);
        s.delete_image(img);
        assert_eq!(s.placement_count(), 0);
        assert!(s.image(img).is_none());
    }

    #[test]
    fn cache_dir_is_created_under_parent() {
        let parent: PathBuf = std::env::temp_dir();
        let s = store();
        assert!(s.cache_dir.path().starts_with(&parent));
    }
}
