use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Failed to decode image for slot '{slot}': {message}")]
    ImageError { slot: String, message: String },

    /// The base document does not satisfy the table's preconditions.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid placement table: {0}")]
    InvalidTable(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OverlayError {
    /// True when the caller supplied something unusable, as opposed to a
    /// failure inside the PDF or image libraries.
    pub fn is_input_error(&self) -> bool {
        matches!(self, OverlayError::InvalidInput(_))
    }
}
