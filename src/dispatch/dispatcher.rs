//! Top-level command dispatcher (spec.md §4.2).

use log::{debug, warn};

use crate::clock::Milliseconds;
use crate::config::Limits;
use crate::decode::ChainDecoder;
use crate::error::CoreError;
use crate::eviction::check_limits;
use crate::ids::ImageId;
use crate::protocol::command::{Action, Command};
use crate::protocol::response::{self, DispatchResult};
use crate::render::CompositorSurface;
use crate::store::context::Store;

use super::animation_cmd;
use super::delete::{self, CellCallback};
use super::placement_cmd;
use super::transmit;

/// Notified once an upload finishes, so the outer terminal can schedule a
/// redraw for that image (spec.md §6, "redraw-by-image-id hook").
pub trait RedrawHook {
    fn schedule_redraw(&mut self, image_id: ImageId);
}

impl RedrawHook for () {
    fn schedule_redraw(&mut self, _image_id: ImageId) {}
}

/// Resolves the image a command targets: `i=` if nonzero and live, else
/// the image currently registered under `I=`'s number, else not found.
pub(super) fn resolve_image(store: &Store, cmd: &Command) -> Result<ImageId, CoreError> {
    if cmd.image_id != 0 {
        return store
            .image(cmd.image_id)
            .map(|img| img.image_id)
            .ok_or_else(|| CoreError::NotFound(format!("no image with id {}", cmd.image_id)));
    }
    if cmd.image_number != 0 {
        return store
            .image_by_number(cmd.image_number)
            .map(|img| img.image_id)
            .ok_or_else(|| CoreError::NotFound(format!("no image with number {}", cmd.image_number)));
    }
    Err(CoreError::Invalid("command names no image".into()))
}

/// Whether `result` represents a command that may have produced or
/// completed an upload, and therefore warrants a redraw notification.
fn action_touches_pixels(cmd: &Command) -> bool {
    matches!(
        cmd.action,
        Some(Action::Transmit) | Some(Action::TransmitAndPut) | Some(Action::FrameAppend) | Some(Action::Put)
    ) || (cmd.action.is_none() && cmd.is_data_transmission)
}

/// Applies one parsed command to `store`, running eviction afterward
/// regardless of outcome (spec.md §4.8: every command is a checkpoint).
#[allow(clippy::too_many_arguments)]
pub fn dispatch(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    surface: &mut dyn CompositorSurface,
    cells: &mut dyn CellCallback,
    redraw: &mut dyn RedrawHook,
    cmd: &Command,
    now: Milliseconds,
) -> DispatchResult {
    store.next_command_index();

    if !cmd.errors.is_empty() {
        warn!("command parse errors: {:?}", cmd.errors);
        let result = DispatchResult {
            reply: response::error(
                cmd.quiet,
                cmd.image_id,
                cmd.image_number,
                cmd.placement_id,
                &format!("EINVAL: {}", cmd.errors.join("; ")),
            ),
            placeholder: None,
        };
        check_limits(store, limits, surface, now);
        return result;
    }

    let image_id = cmd.image_id;
    let outcome = match cmd.action {
        Some(Action::Transmit) | Some(Action::TransmitAndPut) | Some(Action::Query) => {
            transmit::handle_transmit(store, limits, decoder, surface, cmd, now)
        }
        Some(Action::FrameAppend) => transmit::handle_frame_append(store, limits, decoder, cmd, now),
        Some(Action::Put) => placement_cmd::handle_put(store, cmd, now),
        Some(Action::Delete) => delete::handle_delete(store, cells, surface, cmd),
        Some(Action::AnimationControl) => animation_cmd::handle_animation_control(store, cmd, now),
        None if cmd.is_data_transmission => transmit::handle_continuation(store, limits, decoder, cmd, now),
        None => Err(CoreError::Invalid("command has no action".into())),
    };

    let result = match outcome {
        Ok(ok) => {
            if ok.reply.is_none() && !action_touches_pixels(cmd) {
                // pending continuation, nothing to redraw yet
            } else if action_touches_pixels(cmd) {
                redraw.schedule_redraw(image_id);
            }
            ok
        }
        Err(e) => {
            debug!("command failed: {e}");
            DispatchResult {
                reply: response::error(cmd.quiet, cmd.image_id, cmd.image_number, cmd.placement_id, &e.to_string()),
                placeholder: None,
            }
        }
    };

    check_limits(store, limits, surface, now);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::decode::ChainDecoder;
    use crate::render::backends::null::NullSurface;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    #[test]
    fn resolve_image_prefers_explicit_id() {
        let mut s = store();
        let img = s.new_image(7);
        let mut cmd = Command::default();
        cmd.image_id = img;
        assert_eq!(resolve_image(&s, &cmd).unwrap(), img);
    }

    #[test]
    fn resolve_image_falls_back_to_number() {
        let mut s = store();
        let img = s.new_image(0);
        s.image_mut(img).unwrap().image_number = Some(7);
        let mut cmd = Command::default();
        cmd.image_number = 7;
        assert_eq!(resolve_image(&s, &cmd).unwrap(), img);
    }

    #[test]
    fn parse_errors_short_circuit_with_einval() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = Command::default();
        cmd.errors.push("bad key".into());
        let result = dispatch(&mut s, &limits, &decoder, &mut surface, &mut (), &mut (), &cmd, 0);
        let reply = result.reply.unwrap();
        assert!(reply.contains("EINVAL"));
    }

    #[test]
    fn missing_action_is_an_error() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let cmd = Command::default();
        let result = dispatch(&mut s, &limits, &decoder, &mut surface, &mut (), &mut (), &cmd, 0);
        assert!(result.reply.unwrap().starts_with("\x1b_G"));
    }
}
