/// Errors raised while building, validating or compiling a query specification.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A value does not have the shape the model expects.
    #[error("shape error: {0}")]
    Shape(String),

    /// A sub-value could not be encoded as JSON text.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A relation grammar string could not be parsed.
    #[error("parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },
}

impl QueryError {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        QueryError::Shape(message.into())
    }

    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        QueryError::Parse {
            position,
            message: message.into(),
        }
    }
}
