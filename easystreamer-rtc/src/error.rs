use thiserror::Error;

/// Errors raised by the media connection and the subscription manager
#[derive(Error, Debug)]
pub enum RtcError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("No free transceiver to bind stream {0}")]
    NoFreeTransceiver(String),

    #[error("Signaling failed: {0}")]
    Signaling(#[from] easystreamer_core::Error),

    #[error("Connection is closed")]
    Closed,
}

impl From<webrtc::Error> for RtcError {
    fn from(err: webrtc::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RtcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signaling_error_wraps_core_error() {
        let err: RtcError = easystreamer_core::Error::EmptyAnswer.into();
        assert!(matches!(err, RtcError::Signaling(easystreamer_core::Error::EmptyAnswer)));
        assert_eq!(
            err.to_string(),
            "Signaling failed: Session description must not be empty"
        );
    }
}
