//! Typed message envelope.

use std::fmt;

use prost::Message;

use super::kind::MessageKind;
use crate::error::{DeviceError, Result};

/// A message exchanged with the device: a kind plus its encoded payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: MessageKind,
    payload: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Envelope with no payload.
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Vec::new())
    }

    /// Encode a schema message as the payload.
    pub fn from_message<M: Message>(kind: MessageKind, message: &M) -> Self {
        Self::new(kind, message.encode_to_vec())
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (MessageKind, Vec<u8>) {
        (self.kind, self.payload)
    }

    /// Decode the payload as schema message `M`.
    pub fn decode<M: Message + Default>(&self) -> Result<M> {
        M::decode(self.payload.as_slice()).map_err(|source| DeviceError::Decode {
            kind: self.kind,
            source,
        })
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Envelope({}, {} bytes)", self.kind, self.payload.len())
    }
}
