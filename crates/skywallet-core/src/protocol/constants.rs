//! Protocol constants shared with the Skywallet firmware.

// ============================================================================
// Device Identification
// ============================================================================

/// Skycoin Foundation USB Vendor ID
pub const SKYWALLET_VENDOR_ID: u16 = 0x313A;

/// Skywallet Product ID (firmware and bootloader)
pub const SKYWALLET_PRODUCT_ID: u16 = 0x0001;

/// WebUSB interface number.
pub const USB_INTERFACE: u8 = 0;

/// Interrupt IN endpoint (device -> host).
pub const USB_ENDPOINT_IN: u8 = 0x81;

/// Interrupt OUT endpoint (host -> device).
pub const USB_ENDPOINT_OUT: u8 = 0x01;

/// Default emulator endpoint (UDP).
pub const EMULATOR_ADDR: &str = "127.0.0.1:21324";

// ============================================================================
// Framing
// ============================================================================

/// Size of one transport frame.
pub const FRAME_SIZE: usize = 64;

/// Payload bytes carried by each frame after the marker byte.
pub const FRAME_BODY_SIZE: usize = FRAME_SIZE - 1;

/// First byte of every frame.
pub const FRAME_MARKER: u8 = b'?';

/// Magic that opens the first frame of a message.
pub const MESSAGE_MAGIC: [u8; 2] = *b"##";

/// Separator written after the length field.
pub const HEADER_SEPARATOR: u8 = b'\n';

/// Magic (2) + kind (2) + length (4) + separator (1).
pub const MESSAGE_HEADER_SIZE: usize = 9;

/// Offset inside the first frame where the declared payload starts.
///
/// The decoder reads the payload from the separator slot onwards.
pub const FIRST_PAYLOAD_OFFSET: usize = 1 + 2 + 2 + 4;

/// Upper bound on the buffer reserved up front for an incoming message.
pub const MAX_PAYLOAD_RESERVE: usize = FRAME_SIZE * 64;

// ============================================================================
// Transaction Signing
// ============================================================================

/// Inputs/outputs per signing round for current firmware.
pub const TX_PAGE_SIZE: usize = 8;

/// Inputs/outputs per signing round for legacy firmware.
pub const LEGACY_TX_PAGE_SIZE: usize = 7;

/// Coin name announced in `SignTx` for asset-native transactions.
pub const SKYCOIN_COIN_NAME: &str = "Skycoin";

/// Coin name announced in `SignTx` for UTXO-style transactions.
pub const BITCOIN_COIN_NAME: &str = "Bitcoin";

// ============================================================================
// Entropy
// ============================================================================

/// Host entropy sent in response to `EntropyRequest`.
pub const ENTROPY_ACK_SIZE: usize = 32;

/// Default chunk requested per `GetRawEntropy` / `GetMixedEntropy` round.
pub const ENTROPY_CHUNK_SIZE: u32 = 1024;
