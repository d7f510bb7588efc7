//! Payload schema.
//!
//! Hand-written `prost` messages. Field tags follow the firmware's protobuf
//! definitions so payloads are wire compatible in both directions.

use std::fmt;

use prost::Message;

// ---------------------------------------------------------------------------
// Generic replies and session control
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct Initialize {}

#[derive(Clone, PartialEq, Message)]
pub struct GetFeatures {}

#[derive(Clone, PartialEq, Message)]
pub struct Cancel {}

#[derive(Clone, PartialEq, Message)]
pub struct Ping {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Success {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Failure {
    #[prost(int32, optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Features {
    #[prost(string, optional, tag = "1")]
    pub vendor: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub major_version: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub minor_version: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub patch_version: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub bootloader_mode: Option<bool>,
    #[prost(string, optional, tag = "6")]
    pub device_id: Option<String>,
    #[prost(bool, optional, tag = "7")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub passphrase_protection: Option<bool>,
    #[prost(string, optional, tag = "9")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "12")]
    pub initialized: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "14")]
    pub bootloader_hash: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "16")]
    pub pin_cached: Option<bool>,
    #[prost(bool, optional, tag = "17")]
    pub passphrase_cached: Option<bool>,
    #[prost(bool, optional, tag = "18")]
    pub firmware_present: Option<bool>,
    #[prost(bool, optional, tag = "19")]
    pub needs_backup: Option<bool>,
    #[prost(string, optional, tag = "21")]
    pub model: Option<String>,
    #[prost(uint64, optional, tag = "30")]
    pub firmware_features: Option<u64>,
}

impl Features {
    /// Decoded `firmware_features` bit field, if the device reported one.
    pub fn firmware_flags(&self) -> Option<FirmwareFeatures> {
        self.firmware_features.map(FirmwareFeatures::from_bits)
    }

    /// `major.minor.patch`, missing parts shown as 0.
    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.major_version.unwrap_or(0),
            self.minor_version.unwrap_or(0),
            self.patch_version.unwrap_or(0)
        )
    }
}

/// Capability flags packed into the low byte of `Features.firmware_features`.
///
/// ```text
/// bit 0     get-entropy requires confirmation
/// bit 1     get-entropy enabled
/// bit 2     running on the emulator
/// bits 3-4  RDP level (0..=3)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareFeatures {
    pub require_get_entropy_confirm: bool,
    pub get_entropy_enabled: bool,
    pub is_emulator: bool,
    pub rdp_level: u8,
}

impl FirmwareFeatures {
    const REQUIRE_GET_ENTROPY_CONFIRM: u64 = 1 << 0;
    const GET_ENTROPY_ENABLED: u64 = 1 << 1;
    const IS_EMULATOR: u64 = 1 << 2;
    const RDP_SHIFT: u64 = 3;
    const RDP_MASK: u64 = 0b11;

    pub fn from_bits(bits: u64) -> Self {
        Self {
            require_get_entropy_confirm: bits & Self::REQUIRE_GET_ENTROPY_CONFIRM != 0,
            get_entropy_enabled: bits & Self::GET_ENTROPY_ENABLED != 0,
            is_emulator: bits & Self::IS_EMULATOR != 0,
            rdp_level: ((bits >> Self::RDP_SHIFT) & Self::RDP_MASK) as u8,
        }
    }

    /// Pack back into the wire representation. RDP levels above 3 are
    /// truncated to their low two bits.
    pub fn to_bits(&self) -> u64 {
        let mut bits = 0;
        if self.require_get_entropy_confirm {
            bits |= Self::REQUIRE_GET_ENTROPY_CONFIRM;
        }
        if self.get_entropy_enabled {
            bits |= Self::GET_ENTROPY_ENABLED;
        }
        if self.is_emulator {
            bits |= Self::IS_EMULATOR;
        }
        bits | ((u64::from(self.rdp_level) & Self::RDP_MASK) << Self::RDP_SHIFT)
    }

    /// Flash readout protection blocks memory access (RDP level 2).
    pub fn has_rdp_mem_protect(&self) -> bool {
        self.rdp_level == 2
    }
}

impl fmt::Display for FirmwareFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "require_get_entropy_confirm={} get_entropy_enabled={} is_emulator={} rdp_level={}",
            self.require_get_entropy_confirm, self.get_entropy_enabled, self.is_emulator, self.rdp_level
        )
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct ButtonRequest {
    #[prost(int32, optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub data: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ButtonAck {}

/// What the device is asking the PIN for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PinMatrixRequestType {
    Current = 1,
    NewFirst = 2,
    NewSecond = 3,
}

impl fmt::Display for PinMatrixRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinMatrixRequestType::Current => write!(f, "current PIN"),
            PinMatrixRequestType::NewFirst => write!(f, "new PIN"),
            PinMatrixRequestType::NewSecond => write!(f, "new PIN again"),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PinMatrixRequest {
    #[prost(enumeration = "PinMatrixRequestType", optional, tag = "1")]
    pub r#type: Option<i32>,
}

impl PinMatrixRequest {
    /// Request type, `Current` when absent or unknown.
    pub fn request_type(&self) -> PinMatrixRequestType {
        self.r#type
            .and_then(|raw| PinMatrixRequestType::try_from(raw).ok())
            .unwrap_or(PinMatrixRequestType::Current)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PinMatrixAck {
    #[prost(string, required, tag = "1")]
    pub pin: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct PassphraseRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct PassphraseAck {
    #[prost(string, required, tag = "1")]
    pub passphrase: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct WordRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct WordAck {
    #[prost(string, required, tag = "1")]
    pub word: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct EntropyRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct EntropyAck {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub entropy: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Device management
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct ApplySettings {
    #[prost(string, optional, tag = "1")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub use_passphrase: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChangePin {
    #[prost(bool, optional, tag = "1")]
    pub remove: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WipeDevice {}

#[derive(Clone, PartialEq, Message)]
pub struct BackupDevice {}

#[derive(Clone, PartialEq, Message)]
pub struct RecoveryDevice {
    #[prost(uint32, optional, tag = "1")]
    pub word_count: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub passphrase_protection: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub dry_run: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GenerateMnemonic {
    #[prost(uint32, optional, tag = "1")]
    pub word_count: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub passphrase_protection: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SetMnemonic {
    #[prost(string, required, tag = "1")]
    pub mnemonic: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct FirmwareErase {
    #[prost(uint32, optional, tag = "1")]
    pub length: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FirmwareUpload {
    #[prost(bytes = "vec", required, tag = "1")]
    pub payload: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub hash: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetRawEntropy {
    #[prost(uint32, required, tag = "1")]
    pub size: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetMixedEntropy {
    #[prost(uint32, required, tag = "1")]
    pub size: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Entropy {
    #[prost(bytes = "vec", required, tag = "1")]
    pub entropy: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Addresses and messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct SkycoinAddress {
    #[prost(uint32, required, tag = "1")]
    pub address_n: u32,
    #[prost(uint32, optional, tag = "2")]
    pub start_index: Option<u32>,
    #[prost(bool, optional, tag = "3")]
    pub confirm_address: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResponseSkycoinAddress {
    #[prost(string, repeated, tag = "1")]
    pub addresses: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SkycoinSignMessage {
    #[prost(uint32, required, tag = "1")]
    pub address_n: u32,
    #[prost(string, required, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResponseSkycoinSignMessage {
    #[prost(string, required, tag = "1")]
    pub signed_message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct SkycoinCheckMessageSignature {
    #[prost(string, required, tag = "1")]
    pub address: String,
    #[prost(string, required, tag = "2")]
    pub message: String,
    #[prost(string, required, tag = "3")]
    pub signature: String,
}

// ---------------------------------------------------------------------------
// Single-shot transaction signing
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct SkycoinTransactionInput {
    #[prost(string, required, tag = "1")]
    pub hash_in: String,
    #[prost(uint32, optional, tag = "2")]
    pub index: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SkycoinTransactionOutput {
    #[prost(string, required, tag = "1")]
    pub address: String,
    #[prost(uint64, required, tag = "2")]
    pub coin: u64,
    #[prost(uint64, required, tag = "3")]
    pub hour: u64,
    #[prost(uint32, optional, tag = "4")]
    pub address_index: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransactionSign {
    #[prost(uint32, required, tag = "1")]
    pub nb_in: u32,
    #[prost(uint32, required, tag = "2")]
    pub nb_out: u32,
    #[prost(message, repeated, tag = "3")]
    pub transaction_in: Vec<SkycoinTransactionInput>,
    #[prost(message, repeated, tag = "4")]
    pub transaction_out: Vec<SkycoinTransactionOutput>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ResponseTransactionSign {
    #[prost(string, repeated, tag = "1")]
    pub signatures: Vec<String>,
}

// ---------------------------------------------------------------------------
// Paginated transaction signing
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct SignTx {
    #[prost(uint32, required, tag = "1")]
    pub outputs_count: u32,
    #[prost(uint32, required, tag = "2")]
    pub inputs_count: u32,
    #[prost(string, optional, tag = "3")]
    pub coin_name: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub version: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub lock_time: Option<u32>,
    #[prost(string, optional, tag = "6")]
    pub tx_hash: Option<String>,
}

/// Which part of the transaction the device asks for next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
#[allow(clippy::upper_case_acronyms)]
pub enum TxRequestType {
    TXINPUT = 0,
    TXOUTPUT = 1,
    TXMETA = 2,
    TXFINISHED = 3,
}

impl fmt::Display for TxRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxRequestType::TXINPUT => "TXINPUT",
            TxRequestType::TXOUTPUT => "TXOUTPUT",
            TxRequestType::TXMETA => "TXMETA",
            TxRequestType::TXFINISHED => "TXFINISHED",
        };
        f.write_str(name)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TxRequestDetails {
    #[prost(uint32, optional, tag = "1")]
    pub request_index: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub tx_hash: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxSignResult {
    #[prost(uint32, optional, tag = "1")]
    pub signature_index: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub signature: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxRequest {
    #[prost(enumeration = "TxRequestType", optional, tag = "1")]
    pub request_type: Option<i32>,
    #[prost(message, optional, tag = "2")]
    pub details: Option<TxRequestDetails>,
    #[prost(message, repeated, tag = "3")]
    pub sign_result: Vec<TxSignResult>,
}

impl TxRequest {
    /// Requested part, `None` when absent or outside the enumeration.
    pub fn kind(&self) -> Option<TxRequestType> {
        self.request_type
            .and_then(|raw| TxRequestType::try_from(raw).ok())
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TxAckInput {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub address_n: Vec<u32>,
    #[prost(string, required, tag = "2")]
    pub hash_in: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxAckOutput {
    #[prost(string, required, tag = "1")]
    pub address: String,
    #[prost(uint32, repeated, packed = "false", tag = "2")]
    pub address_n: Vec<u32>,
    #[prost(uint64, required, tag = "3")]
    pub coins: u64,
    #[prost(uint64, required, tag = "4")]
    pub hours: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransactionType {
    #[prost(uint32, optional, tag = "1")]
    pub version: Option<u32>,
    #[prost(message, repeated, tag = "2")]
    pub inputs: Vec<TxAckInput>,
    #[prost(message, repeated, tag = "3")]
    pub outputs: Vec<TxAckOutput>,
    #[prost(uint32, optional, tag = "4")]
    pub lock_time: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxAck {
    #[prost(message, optional, tag = "1")]
    pub tx: Option<TransactionType>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BitcoinTxInput {
    #[prost(uint32, required, tag = "1")]
    pub address_n: u32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub prev_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BitcoinTxOutput {
    #[prost(string, required, tag = "1")]
    pub address: String,
    #[prost(uint64, required, tag = "2")]
    pub coin: u64,
    #[prost(uint32, optional, tag = "3")]
    pub address_index: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BitcoinTxAck {
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<BitcoinTxInput>,
    #[prost(message, repeated, tag = "2")]
    pub outputs: Vec<BitcoinTxOutput>,
}
