//! Error types for scene document authoring

use thiserror::Error;

/// Main error type for the authoring core.
///
/// Every variant maps to a stable wire code via [`Error::code`]; the
/// wrapped message is carried through verbatim.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to open document: {0}")]
    OpenFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Save failed: {0}")]
    SaveFailed(String),

    #[error("Reference failed: {0}")]
    ReferenceFailed(String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Attribute failed: {0}")]
    AttributeFailed(String),

    #[error("Variant failed: {0}")]
    VariantFailed(String),

    #[error("Selection failed: {0}")]
    SelectionFailed(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wire code reported in `{code, message}` error records.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParams(_) => "invalid_params",
            Error::NotFound(_) => "not_found",
            Error::OpenFailed(_) => "open_failed",
            Error::ExportFailed(_) => "export_failed",
            Error::SaveFailed(_) => "save_failed",
            Error::ReferenceFailed(_) => "reference_failed",
            Error::BindFailed(_) => "bind_failed",
            Error::AttributeFailed(_) => "attribute_failed",
            Error::VariantFailed(_) => "variant_failed",
            Error::SelectionFailed(_) => "selection_failed",
            Error::CompositionFailed(_) => "composition_failed",
            Error::MissingDependency(_) => "missing_dependency",
            Error::UnknownMethod(_) => "unknown_method",
            Error::Io(_) => "io_error",
            Error::Json(_) => "bad_request",
        }
    }

    /// Shorthand for [`Error::InvalidParams`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParams(msg.into())
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Re-wrap a lower-level failure under a kind-specific variant, keeping
    /// invalid-params and not-found errors as they are.
    pub fn wrap(self, kind: fn(String) -> Error) -> Error {
        match self {
            Error::InvalidParams(_)
            | Error::NotFound(_)
            | Error::MissingDependency(_)
            | Error::UnknownMethod(_) => self,
            other => kind(other.to_string()),
        }
    }
}
