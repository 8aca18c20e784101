use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Protocol error: binary frames are not supported")]
    BinaryFrame,

    #[error("Protocol error: malformed message")]
    Malformed,

    #[error("Protocol error: invalid message id {0}")]
    InvalidMessageId(String),

    #[error("Protocol error: invalid argument JSON: {0}")]
    InvalidArguments(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_binary_frame() {
        let err = EnvelopeError::BinaryFrame;
        assert_eq!(
            err.to_string(),
            "Protocol error: binary frames are not supported"
        );
    }

    #[test]
    fn test_error_display_invalid_message_id() {
        let err = EnvelopeError::InvalidMessageId("0".to_string());
        assert_eq!(err.to_string(), "Protocol error: invalid message id 0");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: EnvelopeError = json_err.into();
        assert!(matches!(err, EnvelopeError::InvalidArguments(_)));
    }
}
