// File: ./src/error.rs
//! Error taxonomy of the aggregation engine.
//!
//! Only [`EngineError`] ever reaches a caller. [`BlockParseError`] is recovered
//! inside the extractor (the offending block is skipped) and exists as a type
//! so that record parsers and the normalizer can report *why* a block was
//! dropped in the debug log.
use thiserror::Error;

/// One malformed event block. Never surfaced past the extractor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockParseError {
    #[error("invalid event block: {0}")]
    Syntax(String),
    #[error("event block is not a key/value mapping")]
    NotAMapping,
    #[error("invalid value for '{field}': {reason}")]
    Field { field: String, reason: String },
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
}

/// Why a source reference could not be turned into a document identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Itinerary source '{0}' could not be found.")]
    NotFound(String),
    #[error("Itinerary source '{reference}' is ambiguous: {}", candidates.join(", "))]
    Ambiguous {
        reference: String,
        candidates: Vec<String>,
    },
    #[error("Could not list documents: {0}")]
    Listing(String),
}

/// Errors returned by the public engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The view's own configuration block is malformed.
    #[error("Could not parse itinerary spec: {0}")]
    SpecParse(String),

    /// A filter expression failed to compile.
    #[error("Invalid filter '{expression}': {reason}")]
    FilterSyntax { expression: String, reason: String },

    /// A source reference resolved to zero or several documents.
    #[error(transparent)]
    SourceResolution(#[from] ResolutionError),

    /// The document store failed while reading a source; the cache keeps
    /// serving the previous list.
    #[error("Could not read source '{source_id}': {message}")]
    Extraction { source_id: String, message: String },
}

impl EngineError {
    /// True for errors that prevent a view from being created at all.
    pub fn is_fatal_to_view(&self) -> bool {
        !matches!(self, EngineError::Extraction { .. })
    }
}
