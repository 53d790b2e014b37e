//! Per-image frame scheduler (spec.md §4.6).

use crate::clock::Milliseconds;
use crate::store::image::{AnimationState, Image};

/// Advances `img`'s current frame to whatever it should be at `now`,
/// updating `current_frame_time` and `next_redraw_ms`. Call once per image
/// per redraw cycle.
pub fn update_frame(img: &mut Image, now: Milliseconds) {
    if img.current_frame == 0 {
        img.current_frame_time = now;
        img.current_frame = 1;
        let gap = img.frame(1).map(|f| f.gap_ms as i64).unwrap_or(0);
        img.next_redraw_ms = now + gap.max(1);
        return;
    }

    if matches!(img.animation_state, AnimationState::Unset | AnimationState::Stopped) {
        img.next_redraw_ms = 0;
        return;
    }

    let last_uploaded = img.last_uploaded_frame_index();
    if img.animation_state == AnimationState::Loading && img.current_frame == last_uploaded {
        img.next_redraw_ms = 0;
        return;
    }

    let mut passed_ms = now - img.current_frame_time;
    if img.animation_state == AnimationState::Looping
        && img.total_duration_ms > 0
        && passed_ms >= img.total_duration_ms
    {
        passed_ms %= img.total_duration_ms;
        img.current_frame_time = now - passed_ms;
    }

    let original_frame_index = img.current_frame;
    loop {
        let Some(frame) = img.frame(img.current_frame) else {
            img.current_frame = 1;
            img.current_frame_time = now;
            let gap = img.frame(1).map(|f| f.gap_ms as i64).unwrap_or(0);
            img.next_redraw_ms = now + gap.max(1);
            return;
        };
        let gap_ms = frame.gap_ms as i64;

        if gap_ms >= 0 && passed_ms < gap_ms {
            img.next_redraw_ms = img.current_frame_time + gap_ms.max(1);
            return;
        }

        passed_ms -= gap_ms.max(0);
        if img.current_frame >= last_uploaded {
            if img.animation_state == AnimationState::Loading {
                img.next_redraw_ms = 0;
                return;
            }
            img.current_frame = 1;
        } else {
            img.current_frame += 1;
        }

        if img.current_frame == original_frame_index {
            img.current_frame += 1;
            if img.current_frame > last_uploaded {
                img.current_frame = 1;
            }
            img.current_frame_time = now;
            let gap = img.frame(img.current_frame).map(|f| f.gap_ms as i64).unwrap_or(0);
            img.next_redraw_ms = now + gap.max(1);
            return;
        }

        img.current_frame_time += gap_ms.max(0);
    }
}

/// No pending redraw for any row; mirrors the original's `INT_MAX` sentinel.
pub const NO_REDRAW_PENDING: i64 = i64::MAX;

/// Folds per-row next-redraw deadlines into a single delay from `now`,
/// clamped below by `min_delay_ms` (spec.md §4.6/§4.7).
pub fn next_redraw_delay(
    row_deadlines: impl IntoIterator<Item = Milliseconds>,
    now: Milliseconds,
    min_delay_ms: Milliseconds,
) -> i64 {
    let mut best = NO_REDRAW_PENDING;
    for deadline in row_deadlines {
        if deadline > 0 {
            let delay = min_delay_ms.max(deadline - now);
            best = best.min(delay);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::frame::{Frame, FrameStatus};

    fn image_with_frames(gaps: &[i32], state: AnimationState) -> Image {
        let mut img = Image::new(1, 0, 0);
        img.animation_state = state;
        for (i, &gap) in gaps.iter().enumerate() {
            let mut f = Frame::new((i + 1) as u32, 0);
            f.gap_ms = gap;
            f.status = FrameStatus::UploadingSuccess;
            img.frames.push(f);
        }
        img.recompute_total_duration();
        img
    }

    #[test]
    fn first_touch_sets_frame_one() {
        let mut img = image_with_frames(&[100, 100], AnimationState::Looping);
        update_frame(&mut img, 0);
        assert_eq!(img.current_frame, 1);
        assert_eq!(img.next_redraw_ms, 100);
    }

    #[test]
    fn stopped_never_redraws() {
        let mut img = image_with_frames(&[100, 100], AnimationState::Stopped);
        img.current_frame = 1;
        img.current_frame_time = 0;
        update_frame(&mut img, 50);
        assert_eq!(img.next_redraw_ms, 0);
    }

    #[test]
    fn looping_wraps_to_first_frame() {
        let mut img = image_with_frames(&[100, 100], AnimationState::Looping);
        img.current_frame = 2;
        img.current_frame_time = 0;
        update_frame(&mut img, 150);
        assert_eq!(img.current_frame, 1);
    }

    #[test]
    fn loading_stalls_on_last_frame() {
        let mut img = image_with_frames(&[100, 100], AnimationState::Loading);
        img.current_frame = 2;
        img.current_frame_time = 0;
        update_frame(&mut img, 500);
        assert_eq!(img.current_frame, 2);
        assert_eq!(img.next_redraw_ms, 0);
    }

    #[test]
    fn gapless_frames_force_progress() {
        let mut img = image_with_frames(&[-1, -1], AnimationState::Looping);
        img.current_frame = 1;
        img.current_frame_time = 0;
        update_frame(&mut img, 0);
        // Cannot get stuck forever on gapless frames.
        assert!(img.current_frame == 1 || img.current_frame == 2);
    }

    #[test]
    fn redraw_delay_ignores_zero_deadlines_and_applies_floor() {
        let delay = next_redraw_delay(vec![0, 50, 200], 40, 10);
        assert_eq!(delay, 10);
    }

    #[test]
    fn redraw_delay_is_sentinel_when_nothing_pending() {
        let delay = next_redraw_delay(vec![0, 0], 0, 1);
        assert_eq!(delay, NO_REDRAW_PENDING);
    }
}
