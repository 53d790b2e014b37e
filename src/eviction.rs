//! Bounded-resource eviction: enforces the four limits by scoring and
//! unloading assets (spec.md §4.8).

use rand::Rng;

use crate::clock::Milliseconds;
use crate::config::Limits;
use crate::ids::{ImageId, PlacementId};
use crate::render::CompositorSurface;
use crate::store::context::Store;

/// Runs every limit check in order, unloading or deleting until each is
/// back at or below its tolerated threshold. Mirrors `gr_check_limits`.
pub fn check_limits(store: &mut Store, limits: &Limits, surface: &mut dyn CompositorSurface, now: Milliseconds) {
    check_image_count(store, limits, surface);
    check_placement_count(store, limits, surface);
    check_disk_bytes(store, limits);
    check_ram_bytes(store, limits, surface, now);
}

fn check_image_count(store: &mut Store, limits: &Limits, surface: &mut dyn CompositorSurface) {
    let tolerated = limits.tolerated_count(limits.max_total_placements);
    if store.image_count() <= tolerated {
        return;
    }
    let mut ids: Vec<(ImageId, Milliseconds, u64)> = store
        .images
        .iter()
        .map(|(id, img)| (*id, img.atime, img.global_command_index))
        .collect();
    ids.sort_by_key(|(_, atime, idx)| (*atime, *idx));

    let to_delete = ids.len().saturating_sub(limits.max_total_placements);
    for (id, _, _) in ids.into_iter().take(to_delete) {
        store.teardown_image(id, surface);
    }
}

fn check_placement_count(store: &mut Store, limits: &Limits, surface: &mut dyn CompositorSurface) {
    let tolerated = limits.tolerated_count(limits.max_total_placements);
    if store.placement_count() <= tolerated {
        return;
    }
    let mut placements: Vec<(ImageId, PlacementId, Milliseconds, u64, bool)> = store
        .images
        .iter()
        .flat_map(|(image_id, img)| {
            img.placements.values().map(move |p| {
                (*image_id, p.placement_id, p.atime, img.global_command_index, p.protected_frame.is_some())
            })
        })
        .collect();
    placements.sort_by_key(|(_, _, atime, idx, _)| (*atime, *idx));

    let to_delete = placements.len().saturating_sub(limits.max_total_placements);
    for (image_id, placement_id, _, _, protected) in placements.into_iter().take(to_delete) {
        if protected {
            break;
        }
        store.teardown_placement(image_id, placement_id, surface);
    }
}

fn check_disk_bytes(store: &mut Store, limits: &Limits) {
    let tolerated = limits.tolerated(limits.total_file_cache_size);
    if store.images_disk_size() <= tolerated {
        return;
    }
    let mut frames: Vec<(ImageId, u32, Milliseconds, u64)> = store
        .images
        .iter()
        .flat_map(|(image_id, img)| {
            img.frames.iter().map(move |f| (*image_id, f.index, f.atime, img.global_command_index))
        })
        .collect();
    frames.sort_by_key(|(_, _, atime, idx)| (*atime, *idx));

    for (image_id, frame_index, _, _) in frames {
        if store.images_disk_size() <= limits.total_file_cache_size {
            break;
        }
        let path = store.cache_dir.frame_path(image_id, frame_index);
        if let Some(img) = store.image_mut(image_id) {
            if let Some(frame) = img.frame_mut(frame_index) {
                frame.disk_size = 0;
                frame.write_handle = None;
            }
            img.recompute_disk_size();
        }
        let _ = std::fs::remove_file(path);
    }
}

fn check_ram_bytes(store: &mut Store, limits: &Limits, surface: &mut dyn CompositorSurface, now: Milliseconds) {
    let tolerated = limits.tolerated(limits.max_total_ram_size);
    if store.images_ram_size() <= tolerated {
        return;
    }

    let mut objects = unloadable_objects(store, now);
    objects.sort_by_key(|o| o.score);

    for obj in objects {
        if store.images_ram_size() <= limits.max_total_ram_size {
            break;
        }
        unload(store, surface, &obj);
    }
}

#[derive(Debug, Clone, Copy)]
enum ObjectKind {
    DecodedFrame { image_id: ImageId, frame_index: u32 },
    Pixmap { image_id: ImageId, placement_id: PlacementId, frame_index: u32 },
}

#[derive(Debug, Clone, Copy)]
struct UnloadableObject {
    score: i64,
    kind: ObjectKind,
}

fn recency_threshold(total_duration_ms: i64) -> i64 {
    total_duration_ms * 2 + 1000
}

fn unloadable_objects(store: &Store, now: Milliseconds) -> Vec<UnloadableObject> {
    let mut rng = rand::rng();
    let mut out = Vec::new();
    for (image_id, img) in store.images.iter() {
        let threshold = recency_threshold(img.total_duration_ms);
        for frame in &img.frames {
            if frame.decoded.is_none() {
                continue;
            }
            let mut score = frame.atime;
            if frame.atime >= now - threshold {
                score = now + 1000 + rng.random_range(0..1000);
            }
            out.push(UnloadableObject {
                score,
                kind: ObjectKind::DecodedFrame { image_id: *image_id, frame_index: frame.index },
            });

            let num_frames = (img.frames.len() as i64).max(1);
            for placement in img.placements.values() {
                if placement.pixmap(frame.index).is_none() {
                    continue;
                }
                let atime = placement.atime.min(frame.atime);
                let mut score = atime;
                if atime >= now - threshold {
                    let mut dist = frame.index as i64 - img.current_frame as i64;
                    if dist < 0 {
                        dist += num_frames;
                    }
                    score = now + 1000 + (num_frames - dist) * 1000 / num_frames;
                    let decoded_size = frame.decoded.as_ref().map(|d| d.byte_size()).unwrap_or(0) as f64;
                    let pixmap_size =
                        placement.pixmap(frame.index).map(|p| p.byte_size).unwrap_or(0) as f64;
                    if decoded_size + pixmap_size > 0.0 {
                        let balance = decoded_size / (decoded_size + pixmap_size) - 0.5;
                        score += (2000.0 * balance) as i64;
                    }
                }
                out.push(UnloadableObject {
                    score,
                    kind: ObjectKind::Pixmap {
                        image_id: *image_id,
                        placement_id: placement.placement_id,
                        frame_index: frame.index,
                    },
                });
            }
        }
    }
    out
}

fn unload(store: &mut Store, surface: &mut dyn CompositorSurface, obj: &UnloadableObject) {
    match obj.kind {
        ObjectKind::DecodedFrame { image_id, frame_index } => {
            if let Some(img) = store.image_mut(image_id) {
                if let Some(frame) = img.frame_mut(frame_index) {
                    frame.unload_decoded();
                }
            }
        }
        ObjectKind::Pixmap { image_id, placement_id, frame_index } => {
            if let Some(img) = store.image_mut(image_id) {
                if let Some(placement) = img.placements.get_mut(&placement_id) {
                    if placement.protected_frame == Some(frame_index) {
                        return;
                    }
                    if let Some(pixmap) = placement.pixmap(frame_index) {
                        surface.free_pixmap(pixmap.handle);
                    }
                    placement.unload_pixmap(frame_index);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::render::backends::null::NullSurface;
    use crate::store::frame::{ArgbBuffer, Frame, FrameStatus};
    use crate::store::placement::{Placement, PlacementPixmap};
    use crate::render::PixmapHandle;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    #[test]
    fn image_count_evicts_oldest_first() {
        let mut store = store();
        let limits = Limits::builder().max_total_placements(1).excess_tolerance_ratio(0.0).build().unwrap();
        let a = store.new_image(0);
        store.image_mut(a).unwrap().atime = 1;
        let b = store.new_image(0);
        store.image_mut(b).unwrap().atime = 2;
        let mut surface = NullSurface::new();
        check_image_count(&mut store, &limits, &mut surface);
        assert!(store.image(a).is_none());
        assert!(store.image(b).is_some());
    }

    #[test]
    fn placement_count_stops_at_protected_frame() {
        let mut store = store();
        let limits = Limits::builder().max_total_placements(0).excess_tolerance_ratio(0.0).build().unwrap();
        let img = store.new_image(1);
        let p1 = store.new_placement(img, 0).unwrap();
        store.image_mut(img).unwrap().placements.get_mut(&p1).unwrap().protected_frame = Some(1);
        let mut surface = NullSurface::new();
        check_placement_count(&mut store, &limits, &mut surface);
        assert!(store.image(img).unwrap().placements.contains_key(&p1));
    }

    #[test]
    fn image_count_eviction_frees_pixmaps_and_cache_file() {
        let mut store = store();
        let limits = Limits::builder().max_total_placements(0).excess_tolerance_ratio(0.0).build().unwrap();
        let img_id = store.new_image(0);
        let path = store.cache_dir.frame_path(img_id, 1);
        std::fs::write(&path, b"data").unwrap();
        let mut surface = NullSurface::new();
        let handle = surface.upload_pixmap(&ArgbBuffer::new(1, 1));

        let placement_id = store.new_placement(img_id, 0).unwrap();
        let img = store.image_mut(img_id).unwrap();
        let mut f = Frame::new(1, 0);
        f.disk_size = 4;
        img.frames.push(f);
        img.placements.get_mut(&placement_id).unwrap().set_pixmap(1, PlacementPixmap { handle, byte_size: 4 });

        check_image_count(&mut store, &limits, &mut surface);
        assert!(store.image(img_id).is_none());
        assert!(!path.exists());
        assert_eq!(surface.live_count(), 0);
    }

    #[test]
    fn ram_bytes_unloads_lowest_score_first() {
        let mut store = store();
        let limits = Limits::builder()
            .max_total_ram_size(1)
            .excess_tolerance_ratio(0.0)
            .build()
            .unwrap();
        let img_id = store.new_image(1);
        let img = store.image_mut(img_id).unwrap();
        let mut f = Frame::new(1, 0);
        f.status = FrameStatus::RamLoadingSuccess;
        f.atime = -100_000;
        f.decoded = Some(ArgbBuffer::new(4, 4));
        img.frames.push(f);

        let mut surface = NullSurface::new();
        check_ram_bytes(&mut store, &limits, &mut surface, 0);
        assert!(store.image(img_id).unwrap().frame(1).unwrap().decoded.is_none());
    }

    #[test]
    fn ram_bytes_skips_pixmap_of_protected_frame() {
        let mut store = store();
        let limits = Limits::builder()
            .max_total_ram_size(1)
            .excess_tolerance_ratio(0.0)
            .build()
            .unwrap();
        let img_id = store.new_image(1);
        {
            let img = store.image_mut(img_id).unwrap();
            let mut f = Frame::new(1, 0);
            f.status = FrameStatus::RamLoadingSuccess;
            f.atime = -100_000;
            f.decoded = Some(ArgbBuffer::new(1, 1));
            img.frames.push(f);
            let mut p = Placement::new(1, 0);
            p.atime = -100_000;
            p.protected_frame = Some(1);
            p.set_pixmap(1, PlacementPixmap { handle: PixmapHandle::new(1), byte_size: 1_000_000 });
            img.placements.insert(1, p);
        }
        let mut surface = NullSurface::new();
        surface.upload_pixmap(&ArgbBuffer::new(1, 1));
        check_ram_bytes(&mut store, &limits, &mut surface, 0);
        assert!(store.image(img_id).unwrap().placements[&1].pixmap(1).is_some());
    }
}
