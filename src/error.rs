//! Error types for the imgconv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ImgConvError`]: **Fatal**: the surrounding operation cannot proceed
//!   at all (input file missing, output directory not writable, unknown
//!   encoding name, invalid configuration). Returned as `Err(ImgConvError)`
//!   from the file helpers and builders.
//!
//! * [`ItemError`]: **Non-fatal**: a single image failed (corrupt bytes,
//!   encoder refused the surface, bad request) but the rest of a batch is
//!   unaffected. Stored inside [`crate::output::ConversionOutcome::Failure`]
//!   so callers can inspect partial success.
//!
//! The core conversion path never returns `ImgConvError`; it only ever
//! produces outcomes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the imgconv library.
#[derive(Debug, Error)]
pub enum ImgConvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed part-way.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The encoding name or file type is not one of the supported encodings.
    #[error("Unsupported encoding '{name}' (supported: png, jpeg, webp, bmp, gif)")]
    UnsupportedEncoding { name: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output image file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output path is already taken and overwriting was not allowed.
    #[error("Output file '{path}' already exists\nChoose another output directory or allow overwriting.")]
    OutputExists { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Tag of an [`ItemError`], for callers that only branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Input bytes did not decode as a raster image.
    DecodeError,
    /// The surface could not be serialised to the requested encoding.
    EncodeError,
    /// Quality out of range or a non-positive maximum dimension.
    InvalidRequest,
    /// The batch was cancelled before this item started.
    Cancelled,
    /// The item did not finish within the batch's per-item timeout.
    Timeout,
    /// The worker running the item panicked.
    Internal,
}

/// A non-fatal error for a single image.
///
/// Carries a human-readable detail string retained for reporting.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ItemError {
    #[error("decode failed: {detail}")]
    Decode { detail: String },

    #[error("encode failed: {detail}")]
    Encode { detail: String },

    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },

    #[error("cancelled before processing")]
    Cancelled,

    #[error("timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl ItemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ItemError::Decode { .. } => ErrorKind::DecodeError,
            ItemError::Encode { .. } => ErrorKind::EncodeError,
            ItemError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ItemError::Cancelled => ErrorKind::Cancelled,
            ItemError::Timeout { .. } => ErrorKind::Timeout,
            ItemError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn decode(detail: impl Into<String>) -> Self {
        ItemError::Decode {
            detail: detail.into(),
        }
    }

    pub(crate) fn encode(detail: impl Into<String>) -> Self {
        ItemError::Encode {
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        ItemError::InvalidRequest {
            detail: detail.into(),
        }
    }
}
