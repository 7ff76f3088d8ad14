//! Pipeline stages for label analysis.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and the two remote backends can be swapped for fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ scratch ──▶ layout ──▶ format ──▶ llm
//! (path/URL) (tempdir)   (OCR)     (text)    (summary)
//! ```
//!
//! 1. [`input`]   — resolve a path, URL or upload to a validated JPEG/PNG
//! 2. [`scratch`] — stage uploads in a request-local directory, removed on drop
//! 3. [`layout`]  — submit to Document Intelligence and poll for lines/tables
//! 4. [`format`]  — flatten lines and rebuild table grids as tab-separated text
//! 5. [`llm`]     — persona + content → chat model → summary

pub(crate) mod http;

pub mod format;
pub mod input;
pub mod layout;
pub mod llm;
pub mod scratch;
