//! Error types for MVT decoding and encoding.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the readers and builders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Structural violation of the tile wire format.
    #[error("format error: {0}")]
    Format(String),

    /// Layer declared a version outside {1, 2}. Carries the observed version.
    #[error("unsupported vector tile layer version {0}")]
    Version(u64),

    /// Violation in a geometry command stream.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// A value accessed as the wrong scalar type, or a geometry decoded as
    /// the wrong geometry type.
    #[error("type error: {0}")]
    Type(&'static str),

    /// Tag index beyond the layer's key or value dictionary.
    #[error("index {0} out of range")]
    OutOfRange(u64),

    /// Builder precondition violation (programmer error).
    #[error("builder assertion: {0}")]
    Assert(&'static str),
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Format(e.to_string())
    }
}
