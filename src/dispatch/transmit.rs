//! `t`/`T`/`q`/`f` handling: file/temp-file/direct media upload, size
//! verification, continuation chunks, and eager decode on completion
//! (spec.md §4.3, §4.4).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::{debug, warn};

use crate::base64::decode_all;
use crate::clock::Milliseconds;
use crate::config::Limits;
use crate::decode::{self, ChainDecoder};
use crate::error::{CoreError, UploadFailureReason};
use crate::ids::ImageId;
use crate::protocol::command::{Action, Command, TransmissionMedium};
use crate::protocol::response::{self, DispatchResult};
use crate::render::CompositorSurface;
use crate::store::frame::{Compression, Frame, FrameBackground, FrameFormat, FrameStatus};
use crate::store::context::Store;

/// Appends a new frame populated from the command's upload parameters,
/// either to a freshly (re)created image (`create_new`, for `t`/`T`/`q`) or
/// to an already-resolved existing one (for `f`, frame append).
fn begin_frame(store: &mut Store, cmd: &Command, image_id: ImageId, create_new: bool) -> Result<(ImageId, u32), CoreError> {
    let now = store.now();
    let image_id = if create_new { store.new_image(image_id) } else { image_id };
    if cmd.image_number != 0 {
        store.image_mut(image_id).unwrap().image_number = Some(cmd.image_number);
    }

    let format = FrameFormat::from_wire(cmd.format)
        .ok_or_else(|| CoreError::Invalid(format!("unsupported format {}", cmd.format)))?;
    let compression = if cmd.compression_zlib { Compression::Zlib } else { Compression::None };
    let background = if cmd.background_frame > 0 {
        FrameBackground::Frame(cmd.background_frame as u32)
    } else if cmd.background_color != 0 {
        FrameBackground::Color(cmd.background_color)
    } else {
        FrameBackground::None
    };

    let img = store.image_mut(image_id).unwrap();
    let index = img.frames.len() as u32 + 1;
    let mut frame = Frame::new(index, now);
    frame.format = format;
    frame.compression = compression;
    frame.expected_size = if cmd.size > 0 { Some(cmd.size as u64) } else { None };
    frame.data_pix_width = cmd.frame_pix_width.max(0) as u32;
    frame.data_pix_height = cmd.frame_pix_height.max(0) as u32;
    frame.offset_x = cmd.frame_dst_pix_x as i32;
    frame.offset_y = cmd.frame_dst_pix_y as i32;
    frame.background = background;
    frame.blend = !cmd.replace_instead_of_blending;
    frame.gap_ms = cmd.gap as i32;
    img.frames.push(frame);

    Ok((image_id, index))
}

/// Handles `a=t`/`a=T`/`a=q` and, by extension, `a=f` (frame append reuses
/// the same upload machinery via [`handle_frame_append`]).
pub fn handle_transmit(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    surface: &mut dyn CompositorSurface,
    cmd: &Command,
    now: Milliseconds,
) -> Result<DispatchResult, CoreError> {
    let is_query = cmd.action == Some(Action::Query);
    // A query must never clobber a real image living under the client's
    // id: it exercises the decode pipeline under a throwaway id and reports
    // the client's id back in the reply only.
    let target_image_id = if is_query { 0 } else { cmd.image_id };
    let (image_id, frame_index) = begin_frame(store, cmd, target_image_id, true)?;
    let result = upload_payload(store, limits, decoder, cmd, image_id, frame_index, now);

    if is_query {
        // Queries never persist: the image existed only to exercise the
        // decode pipeline and report back whether it would succeed.
        store.teardown_image(image_id, surface);
    }

    let reply_image_id = if is_query { cmd.image_id } else { image_id };

    match result {
        UploadOutcome::Pending => Ok(DispatchResult { reply: None, placeholder: None }),
        UploadOutcome::Done => {
            let mut placement_id = 0;
            if cmd.action == Some(Action::TransmitAndPut) && !is_query {
                placement_id = crate::dispatch::placement_cmd::create_default_placement(store, image_id, cmd)?;
            }
            Ok(DispatchResult {
                reply: response::success(cmd.quiet, false, reply_image_id, cmd.image_number, placement_id),
                placeholder: None,
            })
        }
        UploadOutcome::Failed(msg) => Ok(DispatchResult {
            reply: response::error(cmd.quiet, reply_image_id, cmd.image_number, 0, &msg),
            placeholder: None,
        }),
    }
}

/// `a=f`: append an additional frame to an existing image.
pub fn handle_frame_append(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    cmd: &Command,
    now: Milliseconds,
) -> Result<DispatchResult, CoreError> {
    if store.image(cmd.image_id).is_none() {
        return Err(CoreError::NotFound(format!("no image {}", cmd.image_id)));
    }
    let (image_id, frame_index) = begin_frame(store, cmd, cmd.image_id, false)?;
    let result = upload_payload(store, limits, decoder, cmd, image_id, frame_index, now);
    match result {
        UploadOutcome::Pending => Ok(DispatchResult { reply: None, placeholder: None }),
        UploadOutcome::Done => Ok(DispatchResult {
            reply: response::success(cmd.quiet, false, image_id, cmd.image_number, 0),
            placeholder: None,
        }),
        UploadOutcome::Failed(msg) => Ok(DispatchResult {
            reply: response::error(cmd.quiet, image_id, cmd.image_number, 0, &msg),
            placeholder: None,
        }),
    }
}

/// A continuation chunk: no action, no ids, direct medium, an upload in
/// flight. Recognized in the dispatcher before this is called.
pub fn handle_continuation(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    cmd: &Command,
    now: Milliseconds,
) -> Result<DispatchResult, CoreError> {
    let Some((image_id, frame_index)) = store.active_direct_upload() else {
        return Err(CoreError::Invalid("no upload in progress".into()));
    };
    match append_direct_chunk(store, limits, decoder, cmd, image_id, frame_index, now) {
        UploadOutcome::Pending => Ok(DispatchResult { reply: None, placeholder: None }),
        UploadOutcome::Done => Ok(DispatchResult {
            reply: response::success(cmd.quiet, false, image_id, 0, 0),
            placeholder: None,
        }),
        UploadOutcome::Failed(msg) => Ok(DispatchResult {
            reply: response::error(cmd.quiet, image_id, 0, 0, &msg),
            placeholder: None,
        }),
    }
}

enum UploadOutcome {
    Pending,
    Done,
    Failed(String),
}

fn upload_payload(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    cmd: &Command,
    image_id: ImageId,
    frame_index: u32,
    now: Milliseconds,
) -> UploadOutcome {
    match cmd.transmission_medium {
        Some(TransmissionMedium::Direct) | None => {
            append_direct_chunk(store, limits, decoder, cmd, image_id, frame_index, now)
        }
        Some(TransmissionMedium::File) => upload_from_path(store, limits, decoder, cmd, image_id, frame_index, now, false),
        Some(TransmissionMedium::TempFile) => upload_from_path(store, limits, decoder, cmd, image_id, frame_index, now, true),
    }
}

fn append_direct_chunk(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    cmd: &Command,
    image_id: ImageId,
    frame_index: u32,
    now: Milliseconds,
) -> UploadOutcome {
    let path = store.cache_dir.frame_path(image_id, frame_index);
    let bytes = decode_all(&cmd.payload);

    let already_failed = store
        .image(image_id)
        .and_then(|img| img.frame(frame_index))
        .and_then(|f| f.uploading_failure)
        .is_some();

    if !already_failed {
        let written = OpenOptions::new().create(true).append(true).open(&path).and_then(|mut f| {
            f.write_all(&bytes)?;
            Ok(())
        });
        if let Err(e) = written {
            warn!("cannot open cache file {}: {e}", path.display());
            latch_failure(store, image_id, frame_index, UploadFailureReason::CannotOpenCachedFile);
        }
    }

    if cmd.more != 0 {
        store.set_active_direct_upload(Some((image_id, frame_index)));
        return UploadOutcome::Pending;
    }
    store.set_active_direct_upload(None);
    finish_upload(store, limits, decoder, image_id, frame_index, &path, now)
}

fn upload_from_path(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    cmd: &Command,
    image_id: ImageId,
    frame_index: u32,
    now: Milliseconds,
    is_temp: bool,
) -> UploadOutcome {
    let dest = store.cache_dir.frame_path(image_id, frame_index);
    let decoded_path = decode_all(&cmd.payload);
    let Ok(source_path) = String::from_utf8(decoded_path) else {
        latch_failure(store, image_id, frame_index, UploadFailureReason::CannotCopyFile);
        return finish_upload(store, limits, decoder, image_id, frame_index, &dest, now);
    };
    let source_path = Path::new(&source_path);

    let meta = fs::metadata(source_path);
    let ok = match meta {
        Ok(m) if m.is_file() && m.len() > 0 && m.len() <= limits.max_single_image_file_size => {
            fs::copy(source_path, &dest).is_ok()
        }
        _ => false,
    };
    if !ok {
        latch_failure(store, image_id, frame_index, UploadFailureReason::CannotCopyFile);
    } else if is_temp && looks_like_protocol_tempfile(source_path) {
        let _ = fs::remove_file(source_path);
    }

    finish_upload(store, limits, decoder, image_id, frame_index, &dest, now)
}

fn looks_like_protocol_tempfile(path: &Path) -> bool {
    let under_tmp = path.starts_with(std::env::temp_dir())
        || std::env::var_os("TMPDIR").map(|d| path.starts_with(d)).unwrap_or(false);
    under_tmp && path.to_string_lossy().contains("graphics")
}

fn latch_failure(store: &mut Store, image_id: ImageId, frame_index: u32, reason: UploadFailureReason) {
    if let Some(frame) = store.image_mut(image_id).and_then(|img| img.frame_mut(frame_index)) {
        if frame.uploading_failure.is_none() {
            frame.uploading_failure = Some(reason);
            frame.status = FrameStatus::UploadingError;
        }
    }
}

fn finish_upload(
    store: &mut Store,
    limits: &Limits,
    decoder: &ChainDecoder,
    image_id: ImageId,
    frame_index: u32,
    path: &Path,
    now: Milliseconds,
) -> UploadOutcome {
    let already_failed = store
        .image(image_id)
        .and_then(|img| img.frame(frame_index))
        .and_then(|f| f.uploading_failure);
    if let Some(reason) = already_failed {
        return UploadOutcome::Failed(format!("EINVAL: {}", reason.message()));
    }

    let actual_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if actual_size > limits.max_single_image_file_size {
        let _ = fs::remove_file(path);
        latch_failure(store, image_id, frame_index, UploadFailureReason::OverSizeLimit);
        return UploadOutcome::Failed(format!("EFBIG: {}", UploadFailureReason::OverSizeLimit.message()));
    }
    if let Some(expected) = store.image(image_id).and_then(|img| img.frame(frame_index)).and_then(|f| f.expected_size) {
        if expected != actual_size {
            let _ = fs::remove_file(path);
            latch_failure(store, image_id, frame_index, UploadFailureReason::UnexpectedSize);
            return UploadOutcome::Failed(format!(
                "EINVAL: uploaded size {actual_size} doesn't match the expected size {expected}"
            ));
        }
    }

    {
        let img = store.image_mut(image_id).unwrap();
        let frame = img.frame_mut(frame_index).unwrap();
        frame.disk_size = actual_size;
        frame.status = FrameStatus::UploadingSuccess;
        frame.touch(now);
        img.recompute_disk_size();
    }

    let decode_result = {
        let img = store.images.get_mut(&image_id).unwrap();
        decode::ensure_loaded(img, frame_index, image_id, &store.cache_dir, decoder)
    };
    if let Err(e) = decode_result {
        debug!("decode of image {image_id} frame {frame_index} failed: {e}");
        if let Some(frame) = store.image_mut(image_id).and_then(|img| img.frame_mut(frame_index)) {
            frame.status = FrameStatus::RamLoadingError;
        }
        return UploadOutcome::Failed(e.to_string());
    }

    if let Some(img) = store.image_mut(image_id) {
        img.recompute_total_duration();
        for placement in img.placements.values_mut() {
            placement.scaled_cell = None;
        }
    }
    UploadOutcome::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::Limits;
    use crate::render::backends::null::NullSurface;
    use crate::store::frame::FrameStatus;

    fn store() -> Store {
        Store::with_clock(&std::env::temp_dir(), Box::new(FakeClock::new(0))).unwrap()
    }

    fn base_cmd() -> Command {
        Command { format: 32, frame_pix_width: 1, frame_pix_height: 1, size: 4, ..Default::default() }
    }

    #[test]
    fn direct_upload_happy_path_decodes_eagerly() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = base_cmd();
        cmd.payload = b"/wD/AA==".to_vec();
        let result = handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();
        assert!(result.reply.unwrap().contains("OK"));
    }

    #[test]
    fn size_mismatch_fails_upload() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = base_cmd();
        cmd.size = 999;
        cmd.payload = b"/wD/AA==".to_vec();
        let result = handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();
        assert!(result.reply.unwrap().contains("EINVAL"));
    }

    #[test]
    fn more_pending_suppresses_reply_until_final_chunk() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = base_cmd();
        cmd.payload = b"/w".to_vec();
        cmd.more = 1;
        let result = handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();
        assert!(result.reply.is_none());
        assert!(s.active_direct_upload().is_some());
    }

    #[test]
    fn query_action_discards_image_after_decode() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = base_cmd();
        cmd.action = Some(Action::Query);
        cmd.image_id = 42;
        cmd.payload = b"/wD/AA==".to_vec();
        let before = s.image_count();
        handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();
        assert_eq!(s.image_count(), before);
    }

    #[test]
    fn query_action_never_clobbers_a_real_image_under_the_same_id() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let real = s.new_image(42);
        s.image_mut(real).unwrap().pix_width = 99;

        let mut cmd = base_cmd();
        cmd.action = Some(Action::Query);
        cmd.image_id = 42;
        cmd.payload = b"/wD/AA==".to_vec();
        handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();

        assert!(s.image(42).is_some());
        assert_eq!(s.image(42).unwrap().pix_width, 99);
    }

    #[test]
    fn transmit_and_put_creates_placement_once_done() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = base_cmd();
        cmd.action = Some(Action::TransmitAndPut);
        cmd.payload = b"/wD/AA==".to_vec();
        let result = handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();
        assert!(result.reply.unwrap().contains("p="));
    }

    #[test]
    fn frame_append_requires_existing_image() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut cmd = base_cmd();
        cmd.action = Some(Action::FrameAppend);
        cmd.image_id = 7;
        assert!(handle_frame_append(&mut s, &limits, &decoder, &cmd, 0).is_err());
    }

    #[test]
    fn frame_append_adds_second_frame_to_same_image() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut first = base_cmd();
        first.payload = b"/wD/AA==".to_vec();
        let result = handle_transmit(&mut s, &limits, &decoder, &mut surface, &first, 0).unwrap();
        let reply = result.reply.unwrap();
        let image_id: u32 = reply
            .trim_start_matches("\x1b_G")
            .trim_end_matches("\x1b\\")
            .split(|c| c == ',' || c == ';')
            .find_map(|kv| kv.strip_prefix("i=").and_then(|v| v.parse().ok()))
            .unwrap();

        let mut second = base_cmd();
        second.action = Some(Action::FrameAppend);
        second.image_id = image_id;
        second.payload = b"/wD/AA==".to_vec();
        handle_frame_append(&mut s, &limits, &decoder, &second, 0).unwrap();

        assert_eq!(s.image(image_id).unwrap().frames.len(), 2);
    }

    #[test]
    fn failed_frame_has_error_status() {
        let mut s = store();
        let limits = Limits::default();
        let decoder = ChainDecoder::new(Vec::new());
        let mut surface = NullSurface::new();
        let mut cmd = base_cmd();
        cmd.size = 999;
        cmd.payload = b"/wD/AA==".to_vec();
        handle_transmit(&mut s, &limits, &decoder, &mut surface, &cmd, 0).unwrap();
        let img = s.images.values().next().unwrap();
        assert_eq!(img.frame(1).unwrap().status, FrameStatus::UploadingError);
    }
}
