//! Result types: assets, per-item outcomes and batch statistics.

use crate::config::Encoding;
use crate::error::{ImgConvError, ItemError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Pixel size of a decoded or encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An encoded image plus the metadata the pipeline needs.
///
/// Immutable once built. The pipeline borrows an input asset for the
/// duration of one call and hands back a freshly owned output asset.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    encoding: Encoding,
    name: String,
    dimensions: Option<Dimensions>,
}

impl ImageAsset {
    /// Wrap raw bytes with their declared encoding and originating name.
    pub fn new(bytes: impl Into<Vec<u8>>, encoding: Encoding, name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding,
            name: name.into(),
            dimensions: None,
        }
    }

    /// Wrap raw bytes, inferring the encoding from magic bytes first and the
    /// name's extension second.
    pub fn sniff(bytes: impl Into<Vec<u8>>, name: impl Into<String>) -> Result<Self, ImgConvError> {
        let bytes = bytes.into();
        let name = name.into();

        let from_magic = image::guess_format(&bytes)
            .ok()
            .and_then(Encoding::from_image_format);
        let encoding = match from_magic {
            Some(enc) => enc,
            None => {
                let ext = Path::new(&name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                ext.parse().map_err(|_| ImgConvError::UnsupportedEncoding {
                    name: if ext.is_empty() { name.clone() } else { ext.to_string() },
                })?
            }
        };

        Ok(Self::new(bytes, encoding, name))
    }

    pub(crate) fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pixel size, known for assets produced by the pipeline.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    /// `data:<mime>;base64,<payload>` form, ready for a download link.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.encoding.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }
}

impl fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAsset")
            .field("name", &self.name)
            .field("encoding", &self.encoding)
            .field("len", &self.bytes.len())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

/// Result of converting one asset: exactly one of success or failure.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Success {
        asset: ImageAsset,
        output_name: String,
    },
    Failure {
        input_name: String,
        error: ItemError,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }

    pub fn asset(&self) -> Option<&ImageAsset> {
        match self {
            ConversionOutcome::Success { asset, .. } => Some(asset),
            ConversionOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ItemError> {
        match self {
            ConversionOutcome::Success { .. } => None,
            ConversionOutcome::Failure { error, .. } => Some(error),
        }
    }

    pub(crate) fn from_result(input_name: String, result: Result<(ImageAsset, String), ItemError>) -> Self {
        match result {
            Ok((asset, output_name)) => ConversionOutcome::Success { asset, output_name },
            Err(error) => ConversionOutcome::Failure { input_name, error },
        }
    }

    /// Convert into a `Result`, for callers that want `?`.
    pub fn into_result(self) -> Result<(ImageAsset, String), ItemError> {
        match self {
            ConversionOutcome::Success { asset, output_name } => Ok((asset, output_name)),
            ConversionOutcome::Failure { error, .. } => Err(error),
        }
    }
}

/// Aggregate numbers for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Sum of input sizes in bytes.
    pub input_bytes: u64,
    /// Sum of successful output sizes in bytes.
    pub output_bytes: u64,
    pub duration_ms: u64,
}

impl BatchStats {
    /// Tally outcomes against the inputs' total byte size.
    pub fn from_outcomes(outcomes: &[ConversionOutcome], input_bytes: u64, duration_ms: u64) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            input_bytes,
            output_bytes: outcomes
                .iter()
                .filter_map(|o| o.asset())
                .map(|a| a.len() as u64)
                .sum(),
            duration_ms,
        }
    }
}

/// Derive the download name: input stem plus the encoding's extension.
pub fn output_name(input_name: &str, encoding: Encoding) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("converted");
    let safe_stem: String = stem
        .chars()
        .map(|ch| if ch == '/' || ch == '\\' { '_' } else { ch })
        .collect();
    format!("{safe_stem}.{}", encoding.extension())
}

/// Hands out output names that stay unique within one batch.
///
/// Inputs like `a.png` and `a.gif` both map to `a.png` under one encoding.
/// The first claim keeps the name; later claims get `-2`, `-3`, … inserted
/// before the extension. Names are compared case-insensitively so the
/// result is also safe on case-folding filesystems.
#[derive(Debug, Default)]
pub struct OutputNames {
    taken: HashSet<String>,
}

impl OutputNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or the first free numbered variant of it.
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_lowercase()) {
            return name.to_string();
        }

        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let ext = path.extension().and_then(|s| s.to_str());
        let mut n = 2u32;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            };
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
