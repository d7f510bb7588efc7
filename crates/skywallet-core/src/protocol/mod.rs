//! Protocol module - framing, message kinds and payload schema.

pub mod constants;
pub mod envelope;
pub mod frame;
pub mod kind;
pub mod messages;

pub use constants::*;
pub use envelope::Envelope;
pub use frame::{Frame, FrameDecoder, read_envelope, write_envelope};
pub use kind::MessageKind;
