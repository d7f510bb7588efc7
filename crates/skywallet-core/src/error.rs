//! Error types for the protocol stack.

use thiserror::Error;

use crate::config::ConfigError;
use crate::exchange::prompt::PromptError;
use crate::protocol::MessageKind;
use crate::signing::{SigningStage, TxRequestType};
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Transport closed after {received} of {expected} payload bytes")]
    TransportClosed { received: usize, expected: usize },

    #[error("Payload of {len} bytes does not fit in a 32-bit length field")]
    PayloadTooLarge { len: usize },

    #[error("Unknown message kind {0} on the wire")]
    UnknownMessageKind(u16),

    #[error("Unexpected message {actual} while waiting for {expected}")]
    UnexpectedMessageKind {
        actual: MessageKind,
        expected: String,
    },

    #[error("Device requested {requested} while signer is in stage {stage}")]
    ProtocolSequenceError {
        stage: SigningStage,
        requested: TxRequestType,
    },

    #[error("Device returned {actual} signatures for {expected} inputs")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("Device failure ({code:?}): {message}")]
    DeviceFailure { code: Option<i32>, message: String },

    #[error("No items left to page in stage {stage}")]
    EmptyPage { stage: SigningStage },

    #[error("Invalid index {index}: only {len} items")]
    InvalidIndex { index: usize, len: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Prompt failed: {0}")]
    Prompt(#[from] PromptError),

    #[error("Failed to decode {kind} payload: {source}")]
    Decode {
        kind: MessageKind,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Operation requires a {required} device")]
    WrongDeviceType { required: &'static str },

    #[error("Device sent a transaction request of unknown type {0:?}")]
    InvalidTxRequest(Option<i32>),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Whether the device itself reported the failure, as opposed to a
    /// transport, framing or protocol error on the host side.
    pub fn is_device_failure(&self) -> bool {
        matches!(self, DeviceError::DeviceFailure { .. })
    }
}

/// Result type alias using DeviceError.
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_failure_classification() {
        let err = DeviceError::DeviceFailure {
            code: Some(99),
            message: "PIN invalid".into(),
        };
        assert!(err.is_device_failure());
        assert_eq!(err.to_string(), "Device failure (Some(99)): PIN invalid");

        let err = DeviceError::MalformedFrame("missing magic".into());
        assert!(!err.is_device_failure());
    }
}
