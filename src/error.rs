//! Typed, POSIX-flavored error surface.
//!
//! [`CoreError`] is what the protocol layer turns into a response prefix
//! (`EINVAL: ...`, `ENOENT: ...`, ...). Internal plumbing that never
//! crosses the protocol boundary (cache directory setup, raw file copies)
//! uses `anyhow::Result` instead, matching how the teacher keeps a single
//! public error enum but lets glue code return `anyhow::Result`.

use thiserror::Error;

/// A typed error with a POSIX-like kind, surfaced verbatim in protocol
/// replies as `"{kind}: {context}"`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Parse error, unknown key/action/medium/format, bad animation state.
    #[error("EINVAL: {0}")]
    Invalid(String),

    /// Referenced image/frame/placement not found.
    #[error("ENOENT: {0}")]
    NotFound(String),

    /// File inaccessible or decode failure.
    #[error("EBADF: {0}")]
    BadFile(String),

    /// Cannot open cache file for write.
    #[error("EIO: {0}")]
    Io(String),

    /// Upload exceeds per-image limit.
    #[error("EFBIG: {0}")]
    TooBig(String),
}

impl CoreError {
    /// The POSIX-like prefix this error renders as (`"EINVAL"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Invalid(_) => "EINVAL",
            CoreError::NotFound(_) => "ENOENT",
            CoreError::BadFile(_) => "EBADF",
            CoreError::Io(_) => "EIO",
            CoreError::TooBig(_) => "EFBIG",
        }
    }
}

/// Why a frame's direct/file upload failed. Persisted on the [`crate::store::Frame`]
/// so that continuation chunks of an already-failed upload stay quiet until
/// the terminating chunk, per spec.md §4.3/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFailureReason {
    OverSizeLimit,
    CannotOpenCachedFile,
    UnexpectedSize,
    CannotCopyFile,
}

impl UploadFailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            UploadFailureReason::OverSizeLimit => "image exceeds max_single_image_file_size",
            UploadFailureReason::CannotOpenCachedFile => "could not open cache file for writing",
            UploadFailureReason::UnexpectedSize => "uploaded size doesn't match the expected size",
            UploadFailureReason::CannotCopyFile => "could not copy the source file into the cache",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_prefix() {
        let e = CoreError::Invalid("bad key".into());
        assert_eq!(e.kind(), "EINVAL");
        assert_eq!(e.to_string(), "EINVAL: bad key");
    }
}
