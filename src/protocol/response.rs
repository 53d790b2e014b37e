//! Reply framing: the `ESC _G ... ; msg ESC \` envelope, quiet-level
//! suppression, and placeholder-creation signaling (spec.md §4.10).

use crate::ids::{ImageId, PlacementId};
use crate::protocol::command::Quiet;

/// A fully formatted protocol response, or `None` if quiet level / "more
/// data coming" suppressed it.
pub fn format_response(
    image_id: ImageId,
    image_number: u32,
    placement_id: PlacementId,
    message: &str,
) -> String {
    let mut out = String::from("\x1b_G");
    if image_id != 0 {
        out.push_str(&format!("i={image_id},"));
    }
    if image_number != 0 {
        out.push_str(&format!("I={image_number},"));
    }
    if placement_id != 0 {
        out.push_str(&format!("p={placement_id},"));
    }
    if out.ends_with(',') {
        out.pop();
    }
    out.push(';');
    out.push_str(message);
    out.push_str("\x1b\\");
    out
}

/// `OK`, suppressed when `quiet` hides success or a continuation chunk is
/// still pending (`more` set).
pub fn success(
    quiet: Quiet,
    more: bool,
    image_id: ImageId,
    image_number: u32,
    placement_id: PlacementId,
) -> Option<String> {
    if quiet != Quiet::Verbose || more {
        return None;
    }
    Some(format_response(image_id, image_number, placement_id, "OK"))
}

/// An error reply, suppressed only at the highest quiet level.
pub fn error(
    quiet: Quiet,
    image_id: ImageId,
    image_number: u32,
    placement_id: PlacementId,
    message: &str,
) -> Option<String> {
    if quiet == Quiet::SuppressAll {
        return None;
    }
    Some(format_response(image_id, image_number, placement_id, message))
}

/// A request, surfaced to the outer terminal, to create a Unicode
/// placeholder character for a virtual placement (spec.md §4.10). The
/// crate never touches the grid itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatePlaceholder {
    pub image_id: ImageId,
    pub placement_id: PlacementId,
}

/// What a dispatched command produced: a reply string to emit and,
/// optionally, a placeholder-creation request.
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    pub reply: Option<String>,
    pub placeholder: Option<CreatePlaceholder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_ok_with_all_ids() {
        let msg = format_response(1, 2, 3, "OK");
        assert_eq!(msg, "\x1b_Gi=1,I=2,p=3;OK\x1b\\");
    }

    #[test]
    fn omits_absent_ids() {
        let msg = format_response(1, 0, 0, "OK");
        assert_eq!(msg, "\x1b_Gi=1;OK\x1b\\");
    }

    #[test]
    fn success_suppressed_unless_verbose() {
        assert!(success(Quiet::SuppressSuccess, false, 1, 0, 0).is_none());
        assert!(success(Quiet::SuppressAll, false, 1, 0, 0).is_none());
        assert!(success(Quiet::Verbose, false, 1, 0, 0).is_some());
    }

    #[test]
    fn success_suppressed_by_more_pending() {
        assert!(success(Quiet::Verbose, true, 1, 0, 0).is_none());
    }

    #[test]
    fn error_suppressed_only_at_suppress_all() {
        assert!(error(Quiet::Verbose, 1, 0, 0, "EINVAL: x").is_some());
        assert!(error(Quiet::SuppressSuccess, 1, 0, 0, "EINVAL: x").is_some());
        assert!(error(Quiet::SuppressAll, 1, 0, 0, "EINVAL: x").is_none());
    }
}
