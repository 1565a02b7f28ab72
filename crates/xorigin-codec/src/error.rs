/// Errors that can occur while encoding or decoding blocks.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value has no JSON representation.
    #[error("message arguments must be serializable as JSON: {0}")]
    NotSerializable(#[source] serde_json::Error),

    /// The JSON text contains a code unit the legacy encoding cannot carry.
    #[error(
        "message arguments must be serializable as JSON: code unit U+{unit:04X} at index {index} is outside Latin-1"
    )]
    Unrepresentable { unit: u16, index: usize },

    /// The block does not hold valid JSON text.
    #[error("malformed block: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl CodecError {
    /// Whether the error was raised while encoding, before anything was sent.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CodecError::NotSerializable(_) | CodecError::Unrepresentable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
