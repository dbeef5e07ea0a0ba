use thiserror::Error;

#[derive(Error, Debug)]
/// Template error
pub enum TemplateError {
    /// The document is not well-formed XML.
    #[error("Malformed XML: {0}")]
    Xml(String),

    /// Reading or writing the underlying file or stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The template cannot be applied the way it is declared.
    #[error("Template misuse: {0}")]
    Schema(String),

    /// A template function declined to produce a value for a field being written.
    #[error("Template function for <{field}> returned no value")]
    Undefined { field: String },

    #[cfg(feature = "json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
