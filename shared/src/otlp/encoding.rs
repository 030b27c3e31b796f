//! OTLP payload encodings.
//!
//! OTLP requests arrive either as binary protobuf or as the JSON mapping of
//! the same messages.

pub use prost::Message;
pub use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Wire encoding of an OTLP payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpEncoding {
    /// Binary protobuf.
    Protobuf,
    /// OTLP/JSON.
    Json,
}

impl OtlpEncoding {
    /// Picks the encoding from a file extension: `.json` is JSON, anything
    /// else is protobuf.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Protobuf,
        }
    }
}

/// Errors raised while decoding a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a valid protobuf message.
    #[error("Failed to decode protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// The payload is not valid OTLP/JSON.
    #[error("Failed to decode JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Decodes an OTLP message from `bytes`.
///
/// # Errors
///
/// Returns an error if the payload does not match `encoding`.
pub fn decode_request<T>(bytes: &[u8], encoding: OtlpEncoding) -> Result<T, DecodeError>
where
    T: Message + Default + DeserializeOwned,
{
    match encoding {
        OtlpEncoding::Protobuf => Ok(T::decode(bytes)?),
        OtlpEncoding::Json => Ok(serde_json::from_slice(bytes)?),
    }
}

/// Reads and decodes an OTLP message from a file, choosing the encoding
/// from its extension.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn decode_file<T>(path: &Path) -> Result<T, DecodeError>
where
    T: Message + Default + DeserializeOwned,
{
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_request(&bytes, OtlpEncoding::from_path(path))
}
