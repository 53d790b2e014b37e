//! Process-private on-disk cache directory.
//!
//! A unique directory is created from a template path at init and removed
//! at shutdown (spec.md §6 "Cache layout"). Frame files are named
//! `img-III-FFF` where `III`/`FFF` are the (at-least-3-digit, zero-padded)
//! image id and frame index.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::ids::ImageId;

/// Owns the cache directory for the lifetime of the [`crate::store::Store`].
/// Dropping it removes the directory and everything in it, matching the
/// original's `gr_deinit` cleanup.
pub struct CacheDir {
    dir: TempDir,
}

impl CacheDir {
    /// Create a unique cache directory under `parent` (e.g. `/tmp`).
    pub fn create(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("termgfx-")
            .tempdir_in(parent)
            .with_context(|| format!("creating cache dir under {}", parent.display()))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the cache file for `(image_id, frame_index)`, whether or not
    /// it currently exists.
    pub fn frame_path(&self, image_id: ImageId, frame_index: u32) -> PathBuf {
        self.dir.path().join(frame_file_name(image_id, frame_index))
    }
}

fn frame_file_name(image_id: ImageId, frame_index: u32) -> String {
    format!("img-{:03}-{:03}", image_id, frame_index)
}
