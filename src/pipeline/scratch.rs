//! Transient storage for uploads while they are being analysed.
//!
//! Each analysis gets its own [`ScratchSpace`], a `TempDir` that is removed
//! when the value is dropped. That covers the success path, every `?` early
//! return and unwinding alike, so a failed analysis cannot leave images on
//! disk. Callers that want to observe removal errors call
//! [`ScratchSpace::close`] explicitly.

use crate::error::NutriError;
use crate::pipeline::input::{ImageKind, UploadedImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// A request-local scratch directory.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

/// An upload written to scratch storage.
#[derive(Debug, Clone)]
pub struct StagedImage {
    path: PathBuf,
    kind: ImageKind,
}

impl ScratchSpace {
    /// Create a fresh scratch directory, inside `parent` when given
    /// (created if missing), otherwise in the system temp directory.
    pub fn new(parent: Option<&Path>) -> Result<Self, NutriError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nutrilens-");

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| NutriError::ScratchIo {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| NutriError::ScratchIo {
            path: parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source: e,
        })?;

        debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Root of the scratch directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `image` into the scratch directory as `<slot>-<sanitised name>`.
    ///
    /// The slot keeps two uploads with the same file name from colliding.
    pub async fn stage(&self, slot: &str, image: &UploadedImage) -> Result<StagedImage, NutriError> {
        let name = format!("{}-{}", slot, sanitize_filename(image.filename()));
        let path = self.dir.path().join(name);

        tokio::fs::write(&path, image.bytes())
            .await
            .map_err(|e| NutriError::ScratchIo {
                path: path.clone(),
                source: e,
            })?;

        debug!("Staged {} bytes at {}", image.len(), path.display());
        Ok(StagedImage {
            path,
            kind: image.kind(),
        })
    }

    /// Remove the directory now, surfacing any removal error.
    pub fn close(self) -> Result<(), NutriError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|e| NutriError::ScratchIo { path, source: e })
    }
}

impl StagedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Read the staged bytes back for upload.
    pub async fn read(&self) -> Result<Vec<u8>, NutriError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| NutriError::ScratchIo {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Browser uploads may carry directory parts (`C:\Users\…\label.jpg`) or
/// arbitrary characters; only the final component survives, with anything
/// outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(last, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
