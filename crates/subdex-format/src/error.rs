//! Error types for the format crate.

/// Errors that can occur while decoding or encoding an index file.
///
/// Every decode variant describes a structural problem with the file
/// content. The store treats all of them the same way: the file is reset.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The file bytes are not valid UTF-8.
    #[error("index file could not be decoded as UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The text is not well-formed JSON.
    #[error("index file has a JSON syntax error: {0}")]
    Syntax(String),

    /// The document root is not a JSON object.
    #[error("index file root is not an object")]
    NotAnObject,

    /// The required `subdirs` field is absent.
    #[error("index file lacks the required `subdirs` field")]
    MissingSubdirs,

    /// The `subdirs` field is present but is not an array.
    #[error("index file field `subdirs` should be an array")]
    SubdirsNotArray,

    /// Serializing an index failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for format results.
pub type FormatResult<T> = Result<T, FormatError>;
