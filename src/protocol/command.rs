//! The parsed command record (spec.md §3, §4.1).

use crate::ids::{ImageId, PlacementId};

/// `a=`. Which operation this command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Transmit,
    Query,
    TransmitAndPut,
    FrameAppend,
    Put,
    Delete,
    AnimationControl,
}

impl Action {
    pub fn from_char(c: u8) -> Option<Self> {
        match c {
            b't' => Some(Action::Transmit),
            b'q' => Some(Action::Query),
            b'T' => Some(Action::TransmitAndPut),
            b'f' => Some(Action::FrameAppend),
            b'p' => Some(Action::Put),
            b'd' => Some(Action::Delete),
            b'a' => Some(Action::AnimationControl),
            _ => None,
        }
    }
}

/// `t=`. Where the payload bytes actually come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMedium {
    Direct,
    File,
    TempFile,
}

impl TransmissionMedium {
    pub fn from_char(c: u8) -> Option<Self> {
        match c {
            b'd' => Some(TransmissionMedium::Direct),
            b'f' => Some(TransmissionMedium::File),
            b't' => Some(TransmissionMedium::TempFile),
            _ => None,
        }
    }
}

/// `d=`. Deletion scope specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSpecifier {
    /// `a`/`A` — every image (uppercase also frees placements' visible cells).
    All(bool),
    /// `i`/`I` — a specific image id, optionally by placement too.
    ById(bool),
    /// `n`/`N` — the most recently shown image at this cursor cell.
    Newest(bool),
}

impl DeleteSpecifier {
    pub fn from_char(c: u8) -> Option<Self> {
        match c {
            b'a' => Some(DeleteSpecifier::All(false)),
            b'A' => Some(DeleteSpecifier::All(true)),
            b'i' => Some(DeleteSpecifier::ById(false)),
            b'I' => Some(DeleteSpecifier::ById(true)),
            b'n' => Some(DeleteSpecifier::Newest(false)),
            b'N' => Some(DeleteSpecifier::Newest(true)),
            _ => None,
        }
    }
}

/// Reply suppression level, `q=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quiet {
    /// `q=0`: report both success and errors.
    #[default]
    Verbose,
    /// `q=1`: suppress `OK` but still report errors.
    SuppressSuccess,
    /// `q=2`: suppress every reply.
    SuppressAll,
}

impl Quiet {
    pub fn from_num(n: i64) -> Self {
        match n {
            1 => Quiet::SuppressSuccess,
            2 => Quiet::SuppressAll,
            _ => Quiet::Verbose,
        }
    }
}

/// A fully parsed command. Every field defaults to "unset"; unset numeric
/// fields read as `0`, matching the wire protocol's convention that `0`
/// means "not specified" for every key except where noted.
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub action: Option<Action>,
    pub quiet: Quiet,
    pub format: i64,
    pub compression_zlib: bool,
    pub transmission_medium: Option<TransmissionMedium>,
    pub delete_specifier: Option<DeleteSpecifier>,
    pub frame_pix_width: i64,
    pub frame_pix_height: i64,
    pub src_pix_x: i64,
    pub src_pix_y: i64,
    pub src_pix_width: i64,
    pub src_pix_height: i64,
    pub rows: i64,
    pub columns: i64,
    pub image_id: ImageId,
    pub image_number: u32,
    pub placement_id: PlacementId,
    pub more: i64,
    pub is_data_transmission: bool,
    pub size: i64,
    pub virtual_: bool,
    pub do_not_move_cursor: bool,
    pub frame_dst_pix_x: i64,
    pub frame_dst_pix_y: i64,
    pub replace_instead_of_blending: bool,
    pub background_color: u32,
    pub background_frame: i64,
    pub current_frame: i64,
    pub edit_frame: i64,
    pub gap: i64,
    pub animation_state: i64,
    pub loops: i64,
    pub payload: Vec<u8>,
    /// Diagnostics collected while parsing; parsing continues past these
    /// (spec.md §4.1 "best-effort").
    pub errors: Vec<String>,
}
