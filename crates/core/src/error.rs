use thiserror::Error;

/// Conversion pipeline error types.
///
/// The first three variants are client-caused and map to HTTP 422 at the
/// service boundary; `Internal` indicates a defect in a template definition
/// or the engine itself and maps to HTTP 500.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0}")]
    MalformedInput(String),

    #[error("Template '{root_template}' is not registered for input type '{input_type}'")]
    UnknownTemplate {
        root_template: String,
        input_type: String,
    },

    #[error("Required field '{field}' is missing from the source message")]
    MissingRequiredField { field: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    /// True for errors the caller can fix by correcting the request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ConversionError::Internal(_))
    }
}
