//! Input acquisition: turn a path, URL or uploaded buffer into an
//! [`UploadedImage`].
//!
//! Every image is validated twice before it goes anywhere near the network:
//! the file name must carry a `.jpg`, `.jpeg` or `.png` extension, and the
//! first bytes must be a JPEG or PNG signature. Catching a renamed GIF or an
//! HTML error page here gives the user a clear message instead of an opaque
//! `InvalidContent` from the analysis service a few seconds later.

use crate::error::NutriError;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Accepted file-name extensions, lower-case.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// The two image encodings the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// MIME type sent as the analysis request's `Content-Type`.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    /// Sniff the encoding from the payload's magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => Some(ImageKind::Jpeg),
            Ok(ImageFormat::Png) => Some(ImageKind::Png),
            _ => None,
        }
    }
}

/// An image supplied by the user: its name and its bytes.
///
/// Owned by the request that received it; the pipeline stages it to scratch
/// storage once and drops it with the request.
#[derive(Clone)]
pub struct UploadedImage {
    filename: String,
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl UploadedImage {
    /// Validate an in-memory upload.
    ///
    /// # Errors
    /// * [`NutriError::UnsupportedImage`] — extension is not jpg/jpeg/png
    /// * [`NutriError::NotAnImage`] — payload is not a JPEG or PNG
    pub fn from_bytes(
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Self, NutriError> {
        let filename = filename.into();
        let bytes = bytes.into();

        if !has_accepted_extension(&filename) {
            return Err(NutriError::UnsupportedImage { filename });
        }

        let kind = ImageKind::sniff(&bytes).ok_or_else(|| NutriError::NotAnImage {
            filename: filename.clone(),
            magic: bytes.iter().take(8).copied().collect(),
        })?;

        debug!("Accepted {} ({:?}, {} bytes)", filename, kind, bytes.len());
        Ok(Self {
            filename,
            bytes,
            kind,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("filename", &self.filename)
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Whether `filename` ends in one of [`ACCEPTED_EXTENSIONS`] (case-insensitive).
pub fn has_accepted_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ACCEPTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a user-supplied path or URL to an [`UploadedImage`].
pub async fn resolve_image(input: &str, timeout_secs: u64) -> Result<UploadedImage, NutriError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(NutriError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Read a local image, mapping I/O failures to input errors.
async fn read_local(path_str: &str) -> Result<UploadedImage, NutriError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => NutriError::PermissionDenied { path: path.clone() },
        _ => NutriError::FileNotFound { path: path.clone() },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| NutriError::InvalidInput {
            input: path_str.to_string(),
        })?;

    debug!("Read local image: {}", path.display());
    UploadedImage::from_bytes(filename, bytes)
}

/// Download an image URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedImage, NutriError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NutriError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            NutriError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            NutriError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(NutriError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = extract_filename(url, content_type.as_deref());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| NutriError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes as {}", bytes.len(), filename);
    UploadedImage::from_bytes(filename, bytes.to_vec())
}

/// Pick a file name for a downloaded image.
///
/// Uses the last URL path segment when it already has an accepted extension,
/// otherwise falls back to `downloaded.<ext>` guessed from the content type.
fn extract_filename(url: &str, content_type: Option<&str>) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if has_accepted_extension(last) {
                    return last.to_string();
                }
            }
        }
    }

    match content_type {
        Some(ct) if ct.starts_with("image/png") => "downloaded.png".to_string(),
        _ => "downloaded.jpg".to_string(),
    }
}
