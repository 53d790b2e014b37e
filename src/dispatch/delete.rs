//! `d`: deletion, scope selection, and cell-clearing callback (spec.md
//! §4.9).

use crate::error::CoreError;
use crate::ids::{ImageId, PlacementId};
use crate::protocol::command::{Command, DeleteSpecifier};
use crate::protocol::response::{self, DispatchResult};
use crate::render::CompositorSurface;
use crate::store::context::Store;

/// Supplied by the outer terminal: told which placement's cells to clear
/// when a placement is torn down. The terminal decides, per cell, whether
/// to leave a Unicode-placeholder cell alone (spec.md §4.9, §6).
pub trait CellCallback {
    fn clear_placement(&mut self, image_id: ImageId, placement_id: PlacementId);
}

/// A [`CellCallback`] that does nothing; useful for tests and headless use.
impl CellCallback for () {
    fn clear_placement(&mut self, _image_id: ImageId, _placement_id: PlacementId) {}
}

/// `a=d`: tears down placements (and, on the uppercase specifier variants,
/// the owning image too) according to the scope selector.
pub fn handle_delete(
    store: &mut Store,
    cells: &mut dyn CellCallback,
    surface: &mut dyn CompositorSurface,
    cmd: &Command,
) -> Result<DispatchResult, CoreError> {
    let spec = cmd.delete_specifier.ok_or_else(|| CoreError::Invalid("d= requires a scope specifier".into()))?;

    match spec {
        DeleteSpecifier::All(delete_images) => {
            let ids: Vec<ImageId> = store.images.keys().copied().collect();
            for image_id in ids {
                delete_image_placements(store, cells, surface, image_id, delete_images);
            }
        }
        DeleteSpecifier::ById(delete_image_if_empty) => {
            if cmd.image_id == 0 {
                return Err(CoreError::Invalid("d=i/I requires i=".into()));
            }
            if cmd.placement_id != 0 {
                cells.clear_placement(cmd.image_id, cmd.placement_id);
                store.teardown_placement(cmd.image_id, cmd.placement_id, surface);
                let now_empty = store.image(cmd.image_id).map(|img| img.placements.is_empty()).unwrap_or(false);
                if delete_image_if_empty && now_empty {
                    store.teardown_image(cmd.image_id, surface);
                }
            } else {
                delete_image_placements(store, cells, surface, cmd.image_id, delete_image_if_empty);
            }
        }
        DeleteSpecifier::Newest(delete_images) => {
            if cmd.image_number == 0 {
                return Err(CoreError::Invalid("d=n/N requires I=".into()));
            }
            if let Some(image_id) = store.image_by_number(cmd.image_number).map(|img| img.image_id) {
                delete_image_placements(store, cells, surface, image_id, delete_images);
            }
        }
    }

    Ok(DispatchResult {
        reply: response::success(cmd.quiet, false, cmd.image_id, cmd.image_number, cmd.placement_id),
        placeholder: None,
    })
}

/// Clears every placement's cells on `image_id`, then either tears down the
/// whole image or just its placements (freeing pixmaps and cache files
/// either way).
fn delete_image_placements(
    store: &mut Store,
    cells: &mut dyn CellCallback,
    surface: &mut dyn CompositorSurface,
    image_id: ImageId,
    delete_image: bool,
) {
    let placement_ids: Vec<PlacementId> =
        store.image(image_id).map(|img| img.placements.keys().copied().collect()).unwrap_or_default();
    for placement_id in &placement_ids {
        cells.clear_placement(image_id, *placement_id);
    }
    if delete_image {
        store.teardown_image(image_id, surface);
    } else {
        for placement_id in placement_ids {
            store.teardown_placement(image_id, placement_id, surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::render::backends::null::NullSurface;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    #[test]
    fn deleting_by_id_removes_only_that_image() {
        let mut s = store();
        let a = s.new_image(1);
        let b = s.new_image(2);
        let mut surface = NullSurface::new();
        let mut cmd = Command { image_id: a, delete_specifier: Some(DeleteSpecifier::ById(true)), ..Default::default() };
        handle_delete(&mut s, &mut (), &mut surface, &cmd).unwrap();
        assert!(s.image(a).is_none());
        assert!(s.image(b).is_some());
        cmd.image_id = b;
    }

    #[test]
    fn deleting_by_id_frees_pixmaps_and_cache_file() {
        use crate::store::frame::{ArgbBuffer, Frame};
        use crate::store::placement::PlacementPixmap;

        let mut s = store();
        let img_id = s.new_image(1);
        let path = s.cache_dir.frame_path(img_id, 1);
        std::fs::write(&path, b"data").unwrap();
        let mut surface = NullSurface::new();
        let handle = surface.upload_pixmap(&ArgbBuffer::new(1, 1));

        let placement_id = s.new_placement(img_id, 0).unwrap();
        let img = s.image_mut(img_id).unwrap();
        let mut f = Frame::new(1, 0);
        f.disk_size = 4;
        img.frames.push(f);
        img.placements.get_mut(&placement_id).unwrap().set_pixmap(1, PlacementPixmap { handle, byte_size: 4 });

        let cmd = Command { image_id: img_id, delete_specifier: Some(DeleteSpecifier::ById(true)), ..Default::default() };
        handle_delete(&mut s, &mut (), &mut surface, &cmd).unwrap();

        assert!(s.image(img_id).is_none());
        assert!(!path.exists());
        assert_eq!(surface.live_count(), 0);
    }

    #[test]
    fn deleting_placement_only_keeps_image_unless_uppercase() {
        let mut s = store();
        let img = s.new_image(1);
        let p = s.new_placement(img, 0).unwrap();
        let mut surface = NullSurface::new();
        let cmd = Command {
            image_id: img,
            placement_id: p,
            delete_specifier: Some(DeleteSpecifier::ById(false)),
            ..Default::default()
        };
        handle_delete(&mut s, &mut (), &mut surface, &cmd).unwrap();
        assert!(s.image(img).is_some());
        assert!(!s.image(img).unwrap().placements.contains_key(&p));
    }

    #[test]
    fn second_delete_of_same_image_is_a_no_op() {
        let mut s = store();
        let img = s.new_image(1);
        let mut surface = NullSurface::new();
        let cmd = Command { image_id: img, delete_specifier: Some(DeleteSpecifier::ById(true)), ..Default::default() };
        handle_delete(&mut s, &mut (), &mut surface, &cmd).unwrap();
        assert!(handle_delete(&mut s, &mut (), &mut surface, &cmd).is_ok());
        assert!(s.image(img).is_none());
    }

    #[test]
    fn missing_specifier_is_invalid() {
        let mut s = store();
        let mut surface = NullSurface::new();
        let cmd = Command::default();
        assert!(handle_delete(&mut s, &mut (), &mut surface, &cmd).is_err());
    }
}
