use thiserror::Error;

/// Why a save attempt did not produce a new buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveRejection {
    /// The record never loaded metadata (or loading failed).
    NothingLoaded,
    /// Not forced and nothing was edited since the last load/save.
    NotDirty,
    /// The serialized buffer came back empty.
    EmptyBuffer,
    /// The codec reported success but the output is implausibly small.
    Truncated { original: usize, produced: usize },
    /// The codec failed while re-opening or writing the buffer.
    Codec(String),
}

impl std::fmt::Display for SaveRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingLoaded => write!(f, "no metadata loaded"),
            Self::NotDirty => write!(f, "nothing to save"),
            Self::EmptyBuffer => write!(f, "serialized buffer is empty"),
            Self::Truncated { original, produced } => write!(
                f,
                "serialized buffer of {produced} bytes is implausibly small (original {original} bytes)"
            ),
            Self::Codec(msg) => write!(f, "codec error: {msg}"),
        }
    }
}

/// Errors surfaced by the metadata engine.
///
/// Every variant is recoverable: the record stays in a well-defined state
/// and the caller decides whether to retry, skip, or report.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("could not open container: {0}")]
    OpenFailure(String),

    #[error("no metadata available: {0}")]
    NoMetadata(String),

    #[error("write to {key} rejected: {reason}")]
    WriteRejected { key: String, reason: String },

    #[error("save rejected: {0}")]
    SaveRejected(SaveRejection),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MetadataError {
    pub(crate) fn rejected(key: &str, reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
