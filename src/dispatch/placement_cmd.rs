//! `p`: creates or replaces a placement (spec.md §4.2, §4.5).

use crate::clock::Milliseconds;
use crate::error::CoreError;
use crate::ids::{ImageId, PlacementId};
use crate::protocol::command::Command;
use crate::protocol::response::{self, CreatePlaceholder, DispatchResult};
use crate::store::context::Store;

use super::dispatcher::resolve_image;

/// `a=p`: creates a placement on the image named by `i=`/`I=`, populating
/// its source rect and row/col hints straight from the command. Actual
/// pixmap production is deferred to the scaler, run lazily at render time
/// once cell metrics are known.
pub fn handle_put(store: &mut Store, cmd: &Command, now: Milliseconds) -> Result<DispatchResult, CoreError> {
    let image_id = resolve_image(store, cmd)?;
    let placement_id = create_placement(store, image_id, cmd, now)?;

    let img = store.image(image_id).unwrap();
    let placement = &img.placements[&placement_id];
    let placeholder = if placement.virtual_ {
        None
    } else {
        Some(CreatePlaceholder { image_id, placement_id })
    };

    Ok(DispatchResult {
        reply: response::success(cmd.quiet, false, image_id, cmd.image_number, placement_id),
        placeholder,
    })
}

/// Shared by `handle_put` and `T` (transmit-and-put, spec.md §4.2): creates
/// a placement on `image_id` using `cmd`'s fields, returning its id.
pub fn create_placement(
    store: &mut Store,
    image_id: ImageId,
    cmd: &Command,
    now: Milliseconds,
) -> Result<PlacementId, CoreError> {
    let placement_id = store
        .new_placement(image_id, cmd.placement_id)
        .ok_or_else(|| CoreError::NotFound(format!("no image {image_id}")))?;

    let img = store.image_mut(image_id).unwrap();
    let placement = img.placements.get_mut(&placement_id).unwrap();
    placement.virtual_ = cmd.virtual_;
    placement.do_not_move_cursor = cmd.do_not_move_cursor;
    placement.src_x = cmd.src_pix_x.max(0) as u32;
    placement.src_y = cmd.src_pix_y.max(0) as u32;
    placement.src_w = if cmd.src_pix_width > 0 { Some(cmd.src_pix_width as u32) } else { None };
    placement.src_h = if cmd.src_pix_height > 0 { Some(cmd.src_pix_height as u32) } else { None };
    placement.cols = if cmd.columns > 0 { Some(cmd.columns as u32) } else { None };
    placement.rows = if cmd.rows > 0 { Some(cmd.rows as u32) } else { None };
    placement.touch(now);

    Ok(placement_id)
}

/// `T` (transmit-and-put) reuses this directly after a successful first
/// transmission.
pub fn create_default_placement(store: &mut Store, image_id: ImageId, cmd: &Command) -> Result<PlacementId, CoreError> {
    let now = store.now();
    create_placement(store, image_id, cmd, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    #[test]
    fn put_creates_placement_with_source_rect() {
        let mut s = store();
        let img = s.new_image(1);
        let mut cmd = Command::default();
        cmd.image_id = img;
        cmd.columns = 4;
        let result = handle_put(&mut s, &cmd, 0).unwrap();
        assert!(result.placeholder.is_some());
        let placement = s.image(img).unwrap().placements.values().next().unwrap();
        assert_eq!(placement.cols, Some(4));
    }

    #[test]
    fn virtual_placement_gets_no_placeholder() {
        let mut s = store();
        let img = s.new_image(1);
        let mut cmd = Command::default();
        cmd.image_id = img;
        cmd.virtual_ = true;
        let result = handle_put(&mut s, &cmd, 0).unwrap();
        assert!(result.placeholder.is_none());
    }

    #[test]
    fn put_on_missing_image_is_not_found() {
        let mut s = store();
        let mut cmd = Command::default();
        cmd.image_id = 999;
        assert!(handle_put(&mut s, &cmd, 0).is_err());
    }
}
