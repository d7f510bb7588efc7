//! Message kind discriminants.
//!
//! The numeric values mirror the `MessageType` enumeration of the firmware's
//! protobuf schema. The set is closed: an unknown value on the wire is a
//! protocol error.

use std::fmt;

/// Generates the `MessageKind` enum together with its wire conversions.
macro_rules! message_kinds {
    ($($name:ident = $value:literal),+ $(,)?) => {
        /// Kind of a message exchanged with the device.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum MessageKind {
            $($name = $value),+
        }

        impl MessageKind {
            /// All known kinds, in wire order.
            pub const ALL: &'static [MessageKind] = &[$(MessageKind::$name),+];

            /// Wire value.
            pub const fn to_u16(self) -> u16 {
                self as u16
            }

            /// Parse a wire value, `None` for values outside the schema.
            pub const fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($value => Some(MessageKind::$name),)+
                    _ => None,
                }
            }

            /// Schema name of the kind.
            pub const fn name(self) -> &'static str {
                match self {
                    $(MessageKind::$name => stringify!($name)),+
                }
            }
        }
    };
}

message_kinds! {
    Initialize = 0,
    Ping = 1,
    Success = 2,
    Failure = 3,
    ChangePin = 4,
    WipeDevice = 5,
    FirmwareErase = 6,
    FirmwareUpload = 7,
    Entropy = 10,
    SignTx = 15,
    Features = 17,
    PinMatrixRequest = 18,
    PinMatrixAck = 19,
    Cancel = 20,
    TxRequest = 21,
    TxAck = 22,
    ApplySettings = 25,
    ButtonRequest = 26,
    ButtonAck = 27,
    BackupDevice = 34,
    EntropyRequest = 35,
    EntropyAck = 36,
    PassphraseRequest = 41,
    PassphraseAck = 42,
    RecoveryDevice = 45,
    WordRequest = 46,
    WordAck = 47,
    GetFeatures = 55,
    SetMnemonic = 113,
    SkycoinAddress = 114,
    ResponseSkycoinAddress = 115,
    SkycoinCheckMessageSignature = 116,
    SkycoinSignMessage = 117,
    ResponseSkycoinSignMessage = 118,
    GenerateMnemonic = 119,
    TransactionSign = 120,
    ResponseTransactionSign = 121,
    GetRawEntropy = 122,
    GetMixedEntropy = 123,
    BitcoinTxAck = 124,
}

impl MessageKind {
    /// Kinds that end every exchange regardless of the operation.
    pub fn is_universal_terminal(self) -> bool {
        matches!(self, MessageKind::Success | MessageKind::Failure)
    }

    /// Kinds the device sends to ask the host for more data.
    pub fn is_prompt(self) -> bool {
        matches!(
            self,
            MessageKind::ButtonRequest
                | MessageKind::PinMatrixRequest
                | MessageKind::PassphraseRequest
                | MessageKind::WordRequest
                | MessageKind::EntropyRequest
        )
    }
}

impl TryFrom<u16> for MessageKind {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        MessageKind::from_u16(value).ok_or(value)
    }
}

impl From<MessageKind> for u16 {
    fn from(kind: MessageKind) -> Self {
        kind.to_u16()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.to_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values_roundtrip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_u16(kind.to_u16()), Some(*kind));
        }
    }

    #[test]
    fn test_unknown_value_rejected() {
        assert_eq!(MessageKind::try_from(9999), Err(9999));
        assert_eq!(MessageKind::from_u16(11), None);
    }

    #[test]
    fn test_prompt_classification() {
        assert!(MessageKind::ButtonRequest.is_prompt());
        assert!(MessageKind::EntropyRequest.is_prompt());
        assert!(!MessageKind::ButtonAck.is_prompt());
        assert!(MessageKind::Failure.is_universal_terminal());
        assert!(!MessageKind::TxRequest.is_universal_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageKind::PinMatrixAck.to_string(), "PinMatrixAck(19)");
    }
}
