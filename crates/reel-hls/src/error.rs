#![forbid(unsafe_code)]

use thiserror::Error;

/// Manifest and subtitle document parsing errors.
///
/// Non-retryable and component-local: a document that fails to parse will
/// keep failing, so these never go through the retry path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A master document with zero variants, or a variant document with zero
    /// segments.
    #[error("manifest declares no playable content")]
    EmptyManifest,

    /// A numeric or structured field could not be parsed. Line numbers are
    /// 1-based.
    #[error("malformed field at line {line}")]
    MalformedField { line: usize },

    /// A URI could not be resolved against the document's base URL.
    #[error("unresolvable reference: {uri}")]
    InvalidReference { uri: String },
}

impl ParseError {
    pub fn malformed(line: usize) -> Self {
        Self::MalformedField { line }
    }

    pub fn invalid_reference(uri: impl Into<String>) -> Self {
        Self::InvalidReference { uri: uri.into() }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
