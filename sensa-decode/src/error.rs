#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// No decoder is registered for the requested kind.
    #[error("decoder not found: {0}")]
    NotFound(String),
    /// The payload was recognized but is malformed. `payload` is the full
    /// offending input.
    #[error("{decoder}: {reason}: {}", hex::encode(.payload))]
    Format {
        decoder: &'static str,
        reason: String,
        payload: Vec<u8>,
    },
}

impl DecodeError {
    pub(crate) fn format(decoder: &'static str, reason: impl Into<String>, payload: &[u8]) -> Self {
        DecodeError::Format {
            decoder,
            reason: reason.into(),
            payload: payload.to_vec(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DecodeError::NotFound(_))
    }
}
