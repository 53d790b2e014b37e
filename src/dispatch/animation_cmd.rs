//! `a=a`: animation control — play/pause/loop, current-frame override, and
//! retroactive per-frame gap edits (spec.md §4.2, §4.6).

use crate::clock::Milliseconds;
use crate::error::CoreError;
use crate::protocol::command::Command;
use crate::protocol::response::{self, DispatchResult};
use crate::store::context::Store;
use crate::store::image::AnimationState;

use super::dispatcher::resolve_image;

/// `a=a`: adjusts an image's animation state, current frame, and/or a
/// single frame's gap, any combination of which may be present at once.
pub fn handle_animation_control(store: &mut Store, cmd: &Command, now: Milliseconds) -> Result<DispatchResult, CoreError> {
    let image_id = resolve_image(store, cmd)?;

    if cmd.animation_state != 0 {
        if let Some(state) = AnimationState::from_wire(cmd.animation_state) {
            let img = store.image_mut(image_id).unwrap();
            img.animation_state = state;
        }
    }

    if cmd.current_frame != 0 {
        let img = store.image_mut(image_id).unwrap();
        let target = (cmd.current_frame as u32).min(img.last_uploaded_frame_index().max(1));
        img.current_frame = target;
        img.current_frame_time = now;
    }

    if cmd.edit_frame != 0 {
        let img = store.image_mut(image_id).unwrap();
        if let Some(frame) = img.frame_mut(cmd.edit_frame as u32) {
            frame.gap_ms = cmd.gap as i32;
        }
        img.recompute_total_duration();
    }

    // `v=` (loop count) has no effect: the scheduler in animation.rs always
    // loops indefinitely once AnimationState::Looping is set. Matches the
    // original decoder's own unimplemented loop-count handling.
    let _ = cmd.loops;

    store.image_mut(image_id).unwrap().touch(now);

    Ok(DispatchResult {
        reply: response::success(cmd.quiet, false, image_id, cmd.image_number, cmd.placement_id),
        placeholder: None,
    })
}
