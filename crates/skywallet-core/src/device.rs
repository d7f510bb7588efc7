//! Device facade.
//!
//! One method per wallet operation. Every call opens its own session through
//! the connector, runs one exchange and releases the transport before
//! returning, whatever the outcome.

use std::io::Write;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::config::DeviceConfig;
use crate::error::{DeviceError, Result};
use crate::events::{DeviceEvent, DeviceObserver, TracingObserver};
use crate::exchange::{
    EntropySource, Exchange, PromptProvider, ScriptedPrompts, expect_kind, failure_error,
    stream_entropy,
};
use crate::protocol::messages::{
    ApplySettings, ChangePin, Features, FirmwareErase, FirmwareUpload, GenerateMnemonic, Ping,
    RecoveryDevice, ResponseSkycoinAddress, ResponseSkycoinSignMessage, ResponseTransactionSign,
    SetMnemonic, SkycoinAddress, SkycoinCheckMessageSignature, SkycoinSignMessage,
    SkycoinTransactionInput, SkycoinTransactionOutput, Success, TransactionSign,
};
use crate::protocol::{Envelope, MessageKind};
use crate::session::Session;
use crate::signing::{BitcoinSigner, BitcoinTransaction, SkycoinSigner, SkycoinTransaction};
use crate::transport::{Connector, DeviceTransport, DeviceType, TransportConnector};

/// Settings changed by `apply_settings`. `None` leaves a setting as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub label: Option<String>,
    pub language: Option<String>,
    pub use_passphrase: Option<bool>,
}

pub struct Device<C: Connector = TransportConnector> {
    connector: C,
    config: DeviceConfig,
    prompts: Arc<dyn PromptProvider>,
    observer: Arc<dyn DeviceObserver>,
}

impl Device<TransportConnector> {
    /// Device reached through the transport named by `config`.
    pub fn from_config(config: DeviceConfig) -> Self {
        Self::new(TransportConnector::new(config.clone()), config)
    }
}

impl<C: Connector> Device<C> {
    /// Prompts default to an empty script (every prompt fails as
    /// unavailable); events go to tracing.
    pub fn new(connector: C, config: DeviceConfig) -> Self {
        Self {
            connector,
            config,
            prompts: Arc::new(ScriptedPrompts::new()),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptProvider>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeviceObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn device_type(&self) -> DeviceType {
        self.connector.device_type()
    }

    /// Run `op` inside a fresh session. The transport is closed on every
    /// path; a close error is reported only when `op` succeeded.
    fn run<R>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&Exchange<'_, C::Transport>) -> Result<R>,
    ) -> Result<R> {
        let session = Session::open(&self.connector, self.observer.clone())?;
        let result = op(&Exchange::new(&session, self.prompts.as_ref()));
        let value = result?;
        session.close()?;
        self.observer.on_event(&DeviceEvent::Complete { operation });
        Ok(value)
    }

    /// Send `Initialize` and return the features the device answers with.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> Result<Features> {
        self.run("initialize", initialize)
    }

    #[instrument(skip(self))]
    pub fn get_features(&self) -> Result<Features> {
        self.run("get_features", |exchange| {
            let reply = exchange.call(
                &Envelope::empty(MessageKind::GetFeatures),
                &[MessageKind::Features],
            )?;
            Ok(expect_kind(reply, MessageKind::Features)?.decode()?)
        })
    }

    /// Echo `message` through the device.
    #[instrument(skip(self))]
    pub fn ping(&self, message: &str) -> Result<String> {
        self.run("ping", |exchange| {
            let request = Envelope::from_message(
                MessageKind::Ping,
                &Ping {
                    message: Some(message.to_string()),
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    /// Whether a device answers an empty `Ping` with `Success`.
    pub fn connected(&self) -> bool {
        let probe = self.run("connected", |exchange| {
            success_message(exchange.call(&Envelope::empty(MessageKind::Ping), &[])?)
        });
        match probe {
            Ok(_) => true,
            Err(e) => {
                info!(error = %e, "Device not reachable");
                false
            }
        }
    }

    /// Derive `count` addresses starting at `start_index`. With `confirm`
    /// the device shows the address and waits for a button press.
    #[instrument(skip(self))]
    pub fn address_gen(&self, count: u32, start_index: u32, confirm: bool) -> Result<Vec<String>> {
        self.run("address_gen", |exchange| {
            let request = Envelope::from_message(
                MessageKind::SkycoinAddress,
                &SkycoinAddress {
                    address_n: count,
                    start_index: Some(start_index),
                    confirm_address: Some(confirm),
                },
            );
            let reply = exchange.call(&request, &[MessageKind::ResponseSkycoinAddress])?;
            let response: ResponseSkycoinAddress =
                expect_kind(reply, MessageKind::ResponseSkycoinAddress)?.decode()?;
            Ok(response.addresses)
        })
    }

    #[instrument(skip(self))]
    pub fn apply_settings(&self, settings: &Settings) -> Result<String> {
        self.run("apply_settings", |exchange| {
            let request = Envelope::from_message(
                MessageKind::ApplySettings,
                &ApplySettings {
                    language: settings.language.clone(),
                    label: settings.label.clone(),
                    use_passphrase: settings.use_passphrase,
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    /// Walk the user through writing down the seed.
    #[instrument(skip(self))]
    pub fn backup(&self) -> Result<String> {
        self.run("backup", |exchange| {
            initialize(exchange)?;
            success_message(exchange.call(&Envelope::empty(MessageKind::BackupDevice), &[])?)
        })
    }

    /// Restore a seed word by word. `dry_run` only checks the words against
    /// the stored seed.
    #[instrument(skip(self))]
    pub fn recovery(
        &self,
        word_count: u32,
        passphrase_protection: bool,
        dry_run: bool,
    ) -> Result<String> {
        self.run("recovery", |exchange| {
            let request = Envelope::from_message(
                MessageKind::RecoveryDevice,
                &RecoveryDevice {
                    word_count: Some(word_count),
                    passphrase_protection: Some(passphrase_protection),
                    dry_run: Some(dry_run),
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    #[instrument(skip(self))]
    pub fn wipe(&self) -> Result<String> {
        self.run("wipe", |exchange| {
            initialize(exchange)?;
            success_message(exchange.call(&Envelope::empty(MessageKind::WipeDevice), &[])?)
        })
    }

    /// Set or change the PIN, or remove it with `remove`.
    #[instrument(skip(self))]
    pub fn change_pin(&self, remove: bool) -> Result<String> {
        self.run("change_pin", |exchange| {
            let request = Envelope::from_message(
                MessageKind::ChangePin,
                &ChangePin {
                    remove: Some(remove),
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    #[instrument(skip(self))]
    pub fn generate_mnemonic(&self, word_count: u32, passphrase_protection: bool) -> Result<String> {
        self.run("generate_mnemonic", |exchange| {
            let request = Envelope::from_message(
                MessageKind::GenerateMnemonic,
                &GenerateMnemonic {
                    word_count: Some(word_count),
                    passphrase_protection: Some(passphrase_protection),
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    #[instrument(skip_all)]
    pub fn set_mnemonic(&self, mnemonic: &str) -> Result<String> {
        self.run("set_mnemonic", |exchange| {
            let request = Envelope::from_message(
                MessageKind::SetMnemonic,
                &SetMnemonic {
                    mnemonic: mnemonic.to_string(),
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    /// Sign `message` with the key at `address_n`.
    #[instrument(skip(self, message))]
    pub fn sign_message(&self, address_n: u32, message: &str) -> Result<String> {
        self.run("sign_message", |exchange| {
            let request = Envelope::from_message(
                MessageKind::SkycoinSignMessage,
                &SkycoinSignMessage {
                    address_n,
                    message: message.to_string(),
                },
            );
            let reply = exchange.call(&request, &[MessageKind::ResponseSkycoinSignMessage])?;
            let response: ResponseSkycoinSignMessage =
                expect_kind(reply, MessageKind::ResponseSkycoinSignMessage)?.decode()?;
            Ok(response.signed_message)
        })
    }

    /// Ask the device whether `signature` over `message` belongs to
    /// `address`. A mismatch comes back as a device failure.
    #[instrument(skip(self, message, signature))]
    pub fn check_message_signature(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<String> {
        self.run("check_message_signature", |exchange| {
            let request = Envelope::from_message(
                MessageKind::SkycoinCheckMessageSignature,
                &SkycoinCheckMessageSignature {
                    address: address.to_string(),
                    message: message.to_string(),
                    signature: signature.to_string(),
                },
            );
            success_message(exchange.call(&request, &[])?)
        })
    }

    /// Sign a small transaction in one message.
    #[instrument(skip_all, fields(inputs = inputs.len(), outputs = outputs.len()))]
    pub fn transaction_sign(
        &self,
        inputs: &[SkycoinTransactionInput],
        outputs: &[SkycoinTransactionOutput],
    ) -> Result<Vec<String>> {
        self.run("transaction_sign", |exchange| {
            let request = Envelope::from_message(
                MessageKind::TransactionSign,
                &TransactionSign {
                    nb_in: inputs.len() as u32,
                    nb_out: outputs.len() as u32,
                    transaction_in: inputs.to_vec(),
                    transaction_out: outputs.to_vec(),
                },
            );
            let reply = exchange.call(&request, &[MessageKind::ResponseTransactionSign])?;
            let response: ResponseTransactionSign =
                expect_kind(reply, MessageKind::ResponseTransactionSign)?.decode()?;
            Ok(response.signatures)
        })
    }

    /// Sign an asset-native transaction of any size, paging by the
    /// configured page size.
    pub fn sign_skycoin_transaction(&self, tx: &SkycoinTransaction) -> Result<Vec<String>> {
        let page_size = self.config.page_size();
        self.run("sign_skycoin_transaction", |exchange| {
            SkycoinSigner::new(tx).sign(exchange, page_size)
        })
    }

    /// Sign a UTXO-style transaction of any size.
    pub fn sign_bitcoin_transaction(&self, tx: &BitcoinTransaction) -> Result<Vec<String>> {
        let page_size = self.config.page_size();
        self.run("sign_bitcoin_transaction", |exchange| {
            BitcoinSigner::new(tx).sign(exchange, page_size)
        })
    }

    /// Erase and reflash the firmware. USB only.
    ///
    /// The device asks for a final confirmation after the upload and reboots
    /// once it is given, so the closing `ButtonAck` gets no reply.
    #[instrument(skip_all, fields(len = firmware.len()))]
    pub fn firmware_upload(&self, firmware: &[u8]) -> Result<()> {
        if self.device_type() != DeviceType::Usb {
            return Err(DeviceError::WrongDeviceType { required: "USB" });
        }
        let length = u32::try_from(firmware.len())
            .map_err(|_| DeviceError::PayloadTooLarge { len: firmware.len() })?;
        let hash = Sha256::digest(firmware).to_vec();

        self.run("firmware_upload", |exchange| {
            initialize(exchange)?;

            info!(length, "Erasing firmware");
            let erase = Envelope::from_message(
                MessageKind::FirmwareErase,
                &FirmwareErase {
                    length: Some(length),
                },
            );
            success_message(exchange.call(&erase, &[])?)?;

            info!(hash = %hex::encode(&hash), "Uploading firmware");
            let upload = Envelope::from_message(
                MessageKind::FirmwareUpload,
                &FirmwareUpload {
                    payload: firmware.to_vec(),
                    hash: Some(hash.clone()),
                },
            );
            let reply = exchange.call(&upload, &[MessageKind::ButtonRequest])?;
            match reply.kind() {
                MessageKind::Failure => return Err(failure_error(&reply)),
                MessageKind::ButtonRequest => {
                    exchange
                        .session()
                        .send(&Envelope::empty(MessageKind::ButtonAck))?;
                }
                _ => {}
            }
            Ok(())
        })
    }

    /// Hardware RNG output, `total` bytes or fewer if the device stops early.
    pub fn raw_entropy(&self, total: usize) -> Result<Vec<u8>> {
        self.entropy(EntropySource::Raw, total)
    }

    /// Hardware RNG mixed with the device's entropy pool.
    pub fn mixed_entropy(&self, total: usize) -> Result<Vec<u8>> {
        self.entropy(EntropySource::Mixed, total)
    }

    fn entropy(&self, source: EntropySource, total: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(total);
        self.save_entropy(source, total, &mut buf)?;
        Ok(buf)
    }

    /// Stream entropy into `out`. Returns the bytes written.
    pub fn save_entropy<W: Write + ?Sized>(
        &self,
        source: EntropySource,
        total: usize,
        out: &mut W,
    ) -> Result<usize> {
        let chunk_size = self.config.entropy_chunk_size;
        self.run("entropy", |exchange| {
            stream_entropy(exchange, source, total, chunk_size, out)
        })
    }

    /// Abort whatever the device is waiting on.
    #[instrument(skip(self))]
    pub fn cancel(&self) -> Result<String> {
        self.run("cancel", |exchange| success_message(exchange.cancel()?))
    }
}

fn initialize<T: DeviceTransport>(exchange: &Exchange<'_, T>) -> Result<Features> {
    let reply = exchange.call(
        &Envelope::empty(MessageKind::Initialize),
        &[MessageKind::Features],
    )?;
    Ok(expect_kind(reply, MessageKind::Features)?.decode()?)
}

/// Message carried by a `Success` reply.
fn success_message(reply: Envelope) -> Result<String> {
    let success: Success = expect_kind(reply, MessageKind::Success)?.decode()?;
    Ok(success.message.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::protocol::messages::{Failure, PinMatrixAck, PinMatrixRequest, PinMatrixRequestType};
    use crate::transport::MockTransport;

    fn device(mock: &MockTransport, prompts: Arc<ScriptedPrompts>) -> Device<MockTransport> {
        Device::new(mock.clone(), DeviceConfig::default()).with_prompts(prompts)
    }

    fn success(mock: &MockTransport, message: &str) {
        mock.queue_message(
            MessageKind::Success,
            &Success {
                message: Some(message.into()),
            },
        );
    }

    #[test]
    fn test_address_gen_without_prompts() {
        let mock = MockTransport::new();
        mock.queue_message(
            MessageKind::ResponseSkycoinAddress,
            &ResponseSkycoinAddress {
                addresses: vec![
                    "2EU3JbveHdkxW6z5tdhbbB2kRAWvXC2pLzw".into(),
                    "zC8GAQGQBfwk7vtTxVoRG7iMperHNuyYPs".into(),
                ],
            },
        );
        let prompts = Arc::new(ScriptedPrompts::new());

        let addresses = device(&mock, prompts.clone())
            .address_gen(2, 0, false)
            .unwrap();

        assert_eq!(addresses.len(), 2);
        assert_eq!(prompts.total_prompts(), 0);
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![MessageKind::SkycoinAddress]
        );
    }

    #[test]
    fn test_pin_gated_transaction_sign() {
        let mock = MockTransport::new();
        mock.queue_message(
            MessageKind::PinMatrixRequest,
            &PinMatrixRequest {
                r#type: Some(PinMatrixRequestType::Current as i32),
            },
        );
        mock.queue_message(
            MessageKind::ResponseTransactionSign,
            &ResponseTransactionSign {
                signatures: vec!["3f2a".into()],
            },
        );
        let prompts = Arc::new(ScriptedPrompts::new().with_pin("1234"));

        let inputs = vec![SkycoinTransactionInput {
            hash_in: "181bd5656115172fe81451fae4fb56498a97744d89702e73da75ba91ed5200f9".into(),
            index: Some(0),
        }];
        let outputs = vec![SkycoinTransactionOutput {
            address: "K9TzLrgqz7uXn3QJHGxmzdRByAzH33J2ot".into(),
            coin: 100_000,
            hour: 2,
            address_index: None,
        }];
        let signatures = device(&mock, prompts.clone())
            .transaction_sign(&inputs, &outputs)
            .unwrap();

        assert!(!signatures.is_empty());
        assert_eq!(prompts.pin_prompts(), 1);
        let sent = mock.sent_envelopes().unwrap();
        assert_eq!(sent[1].kind(), MessageKind::PinMatrixAck);
        let ack: PinMatrixAck = sent[1].decode().unwrap();
        assert_eq!(ack.pin, "1234");
    }

    #[test]
    fn test_wipe_initializes_first() {
        let mock = MockTransport::new();
        mock.queue_message(MessageKind::Features, &Features::default());
        mock.queue_empty(MessageKind::ButtonRequest);
        success(&mock, "Device wiped");

        let message = device(&mock, Arc::new(ScriptedPrompts::new()))
            .wipe()
            .unwrap();

        assert_eq!(message, "Device wiped");
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![
                MessageKind::Initialize,
                MessageKind::WipeDevice,
                MessageKind::ButtonAck
            ]
        );
    }

    #[test]
    fn test_session_closed_after_each_operation() {
        let mock = MockTransport::new();
        success(&mock, "pong");
        mock.queue_message(
            MessageKind::Failure,
            &Failure {
                code: Some(3),
                message: Some("Not initialized".into()),
            },
        );
        let device = device(&mock, Arc::new(ScriptedPrompts::new()));

        assert_eq!(device.ping("pong").unwrap(), "pong");
        assert_eq!(mock.close_count(), 1);

        let err = device.backup().unwrap_err();
        assert!(err.is_device_failure());
        assert_eq!(mock.connection_count(), 2);
        assert_eq!(mock.close_count(), 2);
    }

    #[test]
    fn test_sign_message_returns_signature() {
        let mock = MockTransport::new();
        mock.queue_message(
            MessageKind::ResponseSkycoinSignMessage,
            &ResponseSkycoinSignMessage {
                signed_message: "6ebd63dd".into(),
            },
        );
        let signature = device(&mock, Arc::new(ScriptedPrompts::new()))
            .sign_message(0, "hello")
            .unwrap();
        assert_eq!(signature, "6ebd63dd");
    }

    #[test]
    fn test_bad_signature_is_device_failure() {
        let mock = MockTransport::new();
        mock.queue_message(
            MessageKind::Failure,
            &Failure {
                code: Some(99),
                message: Some("Address does not match".into()),
            },
        );
        let err = device(&mock, Arc::new(ScriptedPrompts::new()))
            .check_message_signature("2EU3JbveHdkxW6z5tdhbbB2kRAWvXC2pLzw", "hello", "00")
            .unwrap_err();
        match err {
            DeviceError::DeviceFailure { message, .. } => {
                assert_eq!(message, "Address does not match")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![MessageKind::SkycoinCheckMessageSignature]
        );
    }

    #[test]
    fn test_generate_mnemonic_with_confirmation() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::EntropyRequest);
        success(&mock, "Entropy accepted");
        mock.queue_empty(MessageKind::ButtonRequest);
        success(&mock, "Mnemonic successfully configured");
        let prompts = Arc::new(ScriptedPrompts::new());

        let message = device(&mock, prompts.clone())
            .generate_mnemonic(12, false)
            .unwrap();

        assert_eq!(message, "Mnemonic successfully configured");
        assert_eq!(prompts.button_prompts(), 1);
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![
                MessageKind::GenerateMnemonic,
                MessageKind::EntropyAck,
                MessageKind::GenerateMnemonic,
                MessageKind::ButtonAck
            ]
        );
    }

    #[test]
    fn test_recovery_feeds_words() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::WordRequest);
        mock.queue_empty(MessageKind::WordRequest);
        success(&mock, "Device recovered");
        let prompts = Arc::new(ScriptedPrompts::new().with_words(["abandon", "ability"]));

        device(&mock, prompts.clone())
            .recovery(12, false, true)
            .unwrap();
        assert_eq!(prompts.word_prompts(), 2);
    }

    #[test]
    fn test_firmware_upload_requires_usb() {
        let mock = MockTransport::new();
        let err = device(&mock, Arc::new(ScriptedPrompts::new()))
            .firmware_upload(&[0u8; 16])
            .unwrap_err();
        assert!(matches!(err, DeviceError::WrongDeviceType { required: "USB" }));
        assert_eq!(mock.connection_count(), 0);
    }

    #[test]
    fn test_firmware_upload_sequence() {
        let mock = MockTransport::with_device_type(DeviceType::Usb);
        mock.queue_message(MessageKind::Features, &Features::default());
        success(&mock, "Firmware erased");
        mock.queue_empty(MessageKind::ButtonRequest);
        let firmware = vec![0x5a; 300];

        device(&mock, Arc::new(ScriptedPrompts::new()))
            .firmware_upload(&firmware)
            .unwrap();

        let sent = mock.sent_envelopes().unwrap();
        let kinds: Vec<_> = sent.iter().map(Envelope::kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::Initialize,
                MessageKind::FirmwareErase,
                MessageKind::FirmwareUpload,
                MessageKind::ButtonAck
            ]
        );
        let upload: FirmwareUpload = sent[2].decode().unwrap();
        assert_eq!(upload.payload, firmware);
        assert_eq!(upload.hash, Some(Sha256::digest(&firmware).to_vec()));
        assert_eq!(mock.pending_reads(), 0);
    }

    #[test]
    fn test_firmware_hash_is_sha256_of_payload() {
        let mock = MockTransport::with_device_type(DeviceType::Usb);
        mock.queue_message(MessageKind::Features, &Features::default());
        success(&mock, "Firmware erased");
        mock.queue_empty(MessageKind::ButtonRequest);

        device(&mock, Arc::new(ScriptedPrompts::new()))
            .firmware_upload(b"abc")
            .unwrap();

        let sent = mock.sent_envelopes().unwrap();
        let upload: FirmwareUpload = sent[2].decode().unwrap();
        assert_eq!(
            hex::encode(upload.hash.unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_connected_probe() {
        let mock = MockTransport::new();
        success(&mock, "");
        let device = device(&mock, Arc::new(ScriptedPrompts::new()));
        assert!(device.connected());

        mock.disconnect();
        assert!(!device.connected());
    }

    #[test]
    fn test_entropy_uses_configured_chunk() {
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.queue_message(
                MessageKind::Entropy,
                &crate::protocol::messages::Entropy {
                    entropy: vec![7; 4],
                },
            );
        }
        let config = DeviceConfig {
            entropy_chunk_size: 4,
            ..DeviceConfig::default()
        };
        let observer = Arc::new(RecordingObserver::new());
        let device = Device::new(mock.clone(), config).with_observer(observer.clone());

        let entropy = device.mixed_entropy(12).unwrap();
        assert_eq!(entropy, vec![7; 12]);
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![MessageKind::GetMixedEntropy; 3]
        );
        assert!(observer.events().contains(&DeviceEvent::Complete {
            operation: "entropy"
        }));
    }
}
