//! Interactive exchange driver.
//!
//! Sends one initiating request and keeps answering the device's
//! intermediate prompts until a terminal message arrives:
//!
//! | Device sends         | Driver answers                                   |
//! |----------------------|--------------------------------------------------|
//! | `ButtonRequest`      | `ButtonAck`                                      |
//! | `PinMatrixRequest`   | `PinMatrixAck` with the caller's PIN             |
//! | `PassphraseRequest`  | `PassphraseAck` with the caller's passphrase     |
//! | `WordRequest`        | `WordAck` with one recovery word                 |
//! | `EntropyRequest`     | `EntropyAck`, then the original request again    |
//! | `Success`, `Failure` | returned to the caller                           |
//! | operation terminals  | returned to the caller                           |
//! | anything else        | `UnexpectedMessageKind`                          |

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

use super::prompt::{PromptError, PromptProvider};
use crate::error::{DeviceError, Result};
use crate::events::DeviceEvent;
use crate::protocol::constants::ENTROPY_ACK_SIZE;
use crate::protocol::messages::{
    ButtonRequest, EntropyAck, Failure, PassphraseAck, PinMatrixAck, PinMatrixRequest, WordAck,
};
use crate::protocol::{Envelope, MessageKind};
use crate::session::Session;
use crate::transport::DeviceTransport;

pub struct Exchange<'a, T: DeviceTransport> {
    session: &'a Session<T>,
    prompts: &'a dyn PromptProvider,
}

impl<'a, T: DeviceTransport> Exchange<'a, T> {
    pub fn new(session: &'a Session<T>, prompts: &'a dyn PromptProvider) -> Self {
        Self { session, prompts }
    }

    pub fn session(&self) -> &Session<T> {
        self.session
    }

    /// Send `request` and drive the dialogue until a terminal kind arrives.
    ///
    /// `Success` and `Failure` are always terminal; `terminals` adds the
    /// operation's own response kinds. The terminal envelope is returned
    /// undecoded, including `Failure`.
    pub fn call(&self, request: &Envelope, terminals: &[MessageKind]) -> Result<Envelope> {
        self.session.send(request)?;
        self.await_terminal(request, terminals)
    }

    /// Drive the dialogue for a request that has already been sent.
    fn await_terminal(&self, request: &Envelope, terminals: &[MessageKind]) -> Result<Envelope> {
        loop {
            let reply = self.session.receive()?;
            let kind = reply.kind();

            if kind.is_universal_terminal() || terminals.contains(&kind) {
                return Ok(reply);
            }

            if kind.is_prompt() {
                self.session
                    .observer()
                    .on_event(&DeviceEvent::PromptIssued { prompt: kind });
            }

            match kind {
                MessageKind::ButtonRequest => {
                    let button: ButtonRequest = reply.decode()?;
                    debug!(code = ?button.code, "Waiting for button confirmation");
                    self.ask(|p| p.button(&button))?;
                    self.session.send(&Envelope::empty(MessageKind::ButtonAck))?;
                }
                MessageKind::PinMatrixRequest => {
                    let pin_request: PinMatrixRequest = reply.decode()?;
                    let pin = self.ask(|p| p.pin(pin_request.request_type()))?;
                    self.session.send(&Envelope::from_message(
                        MessageKind::PinMatrixAck,
                        &PinMatrixAck { pin },
                    ))?;
                }
                MessageKind::PassphraseRequest => {
                    let passphrase = self.ask(|p| p.passphrase())?;
                    self.session.send(&Envelope::from_message(
                        MessageKind::PassphraseAck,
                        &PassphraseAck { passphrase },
                    ))?;
                }
                MessageKind::WordRequest => {
                    let word = self.ask(|p| p.word())?;
                    self.session.send(&Envelope::from_message(
                        MessageKind::WordAck,
                        &WordAck { word },
                    ))?;
                }
                MessageKind::EntropyRequest => {
                    if let Some(failure) = self.prime_entropy()? {
                        return Ok(failure);
                    }
                    debug!(kind = %request.kind(), "Resending request after entropy");
                    self.session.send(request)?;
                }
                _ => {
                    return Err(DeviceError::UnexpectedMessageKind {
                        actual: kind,
                        expected: describe_terminals(terminals),
                    });
                }
            }
        }
    }

    /// Answer an `EntropyRequest` with host randomness. Returns the device's
    /// reply when it is a `Failure`.
    fn prime_entropy(&self) -> Result<Option<Envelope>> {
        let mut entropy = vec![0u8; ENTROPY_ACK_SIZE];
        OsRng.fill_bytes(&mut entropy);
        self.session.send(&Envelope::from_message(
            MessageKind::EntropyAck,
            &EntropyAck {
                entropy: Some(entropy),
            },
        ))?;

        // The device acknowledges the entropy before the original request
        // can be retried; that acknowledgement is consumed here.
        let reply = self.session.receive()?;
        if reply.kind() == MessageKind::Failure {
            return Ok(Some(reply));
        }
        debug!(kind = %reply.kind(), "Entropy accepted");
        Ok(None)
    }

    /// Run a prompt, turning a user cancel into a device-side `Cancel`.
    fn ask<R>(&self, prompt: impl FnOnce(&dyn PromptProvider) -> std::result::Result<R, PromptError>) -> Result<R> {
        match prompt(self.prompts) {
            Ok(answer) => Ok(answer),
            Err(PromptError::Cancelled) => {
                self.cancel()?;
                Err(DeviceError::Cancelled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Abort the pending device operation. Returns the device's terminal
    /// reply to `Cancel`.
    pub fn cancel(&self) -> Result<Envelope> {
        warn!("Cancelling device operation");
        self.call(&Envelope::empty(MessageKind::Cancel), &[])
    }
}

fn describe_terminals(terminals: &[MessageKind]) -> String {
    let mut names: Vec<&str> = vec!["Success", "Failure"];
    names.extend(terminals.iter().map(|k| k.name()));
    names.join(" | ")
}

/// Turn a terminal reply into the device's failure, if it is one.
pub fn failure_error(envelope: &Envelope) -> DeviceError {
    match envelope.decode::<Failure>() {
        Ok(failure) => DeviceError::DeviceFailure {
            code: failure.code,
            message: failure.message.unwrap_or_default(),
        },
        Err(e) => e,
    }
}

/// Fail with `DeviceFailure` on `Failure`, with `UnexpectedMessageKind` on
/// anything other than `expected`; otherwise return the envelope.
pub fn expect_kind(envelope: Envelope, expected: MessageKind) -> Result<Envelope> {
    match envelope.kind() {
        kind if kind == expected => Ok(envelope),
        MessageKind::Failure => Err(failure_error(&envelope)),
        actual => Err(DeviceError::UnexpectedMessageKind {
            actual,
            expected: expected.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::NullObserver;
    use crate::exchange::prompt::ScriptedPrompts;
    use crate::protocol::messages::{PinMatrixRequestType, ResponseSkycoinAddress, Success};
    use crate::transport::MockTransport;

    fn session(mock: &MockTransport) -> Session<MockTransport> {
        Session::open(mock, Arc::new(NullObserver)).unwrap()
    }

    fn request() -> Envelope {
        Envelope::empty(MessageKind::GenerateMnemonic)
    }

    #[test]
    fn test_button_then_pin_then_success() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::ButtonRequest);
        mock.queue_message(
            MessageKind::PinMatrixRequest,
            &PinMatrixRequest {
                r#type: Some(PinMatrixRequestType::Current as i32),
            },
        );
        mock.queue_message(
            MessageKind::Success,
            &Success {
                message: Some("Settings applied".into()),
            },
        );

        let prompts = ScriptedPrompts::new().with_pin("1234");
        let session = session(&mock);
        let reply = Exchange::new(&session, &prompts)
            .call(&Envelope::empty(MessageKind::ApplySettings), &[])
            .unwrap();

        assert_eq!(reply.kind(), MessageKind::Success);
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![
                MessageKind::ApplySettings,
                MessageKind::ButtonAck,
                MessageKind::PinMatrixAck
            ]
        );
        assert_eq!(prompts.button_prompts(), 1);
        assert_eq!(prompts.pin_prompts(), 1);
        assert_eq!(mock.pending_reads(), 0);
    }

    #[test]
    fn test_pin_reaches_device() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::PinMatrixRequest);
        mock.queue_empty(MessageKind::Success);

        let prompts = ScriptedPrompts::new().with_pin("9157");
        let session = session(&mock);
        Exchange::new(&session, &prompts)
            .call(&Envelope::empty(MessageKind::BackupDevice), &[])
            .unwrap();

        let sent = mock.sent_envelopes().unwrap();
        let ack: PinMatrixAck = sent[1].decode().unwrap();
        assert_eq!(ack.pin, "9157");
    }

    #[test]
    fn test_operation_terminal_returned_undecoded() {
        let mock = MockTransport::new();
        let addresses = ResponseSkycoinAddress {
            addresses: vec!["2EU3JbveHdkxW6z5tdhbbB2kRAWvXC2pLzw".into()],
        };
        mock.queue_message(MessageKind::ResponseSkycoinAddress, &addresses);

        let prompts = ScriptedPrompts::new();
        let session = session(&mock);
        let reply = Exchange::new(&session, &prompts)
            .call(
                &Envelope::empty(MessageKind::SkycoinAddress),
                &[MessageKind::ResponseSkycoinAddress],
            )
            .unwrap();
        assert_eq!(reply.decode::<ResponseSkycoinAddress>().unwrap(), addresses);
        assert_eq!(prompts.total_prompts(), 0);
    }

    #[test]
    fn test_entropy_request_resends_original() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::EntropyRequest);
        mock.queue_empty(MessageKind::Success); // reply to EntropyAck
        mock.queue_empty(MessageKind::ButtonRequest);
        mock.queue_empty(MessageKind::Success);

        let prompts = ScriptedPrompts::new();
        let session = session(&mock);
        let reply = Exchange::new(&session, &prompts)
            .call(&request(), &[])
            .unwrap();

        assert_eq!(reply.kind(), MessageKind::Success);
        let sent = mock.sent_envelopes().unwrap();
        let kinds: Vec<_> = sent.iter().map(Envelope::kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::GenerateMnemonic,
                MessageKind::EntropyAck,
                MessageKind::GenerateMnemonic,
                MessageKind::ButtonAck
            ]
        );
        let ack: EntropyAck = sent[1].decode().unwrap();
        assert_eq!(ack.entropy.map(|e| e.len()), Some(ENTROPY_ACK_SIZE));
    }

    #[test]
    fn test_entropy_ack_failure_is_terminal() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::EntropyRequest);
        mock.queue_message(
            MessageKind::Failure,
            &Failure {
                code: Some(99),
                message: Some("Entropy rejected".into()),
            },
        );

        let prompts = ScriptedPrompts::new();
        let session = session(&mock);
        let reply = Exchange::new(&session, &prompts)
            .call(&request(), &[])
            .unwrap();
        assert_eq!(reply.kind(), MessageKind::Failure);
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![MessageKind::GenerateMnemonic, MessageKind::EntropyAck]
        );
    }

    #[test]
    fn test_unexpected_kind_stops_loop() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::Features);
        mock.queue_empty(MessageKind::Success);

        let prompts = ScriptedPrompts::new();
        let session = session(&mock);
        let err = Exchange::new(&session, &prompts)
            .call(&Envelope::empty(MessageKind::WipeDevice), &[])
            .unwrap_err();

        assert!(matches!(
            err,
            DeviceError::UnexpectedMessageKind {
                actual: MessageKind::Features,
                ..
            }
        ));
        // The trailing Success was never read.
        assert_eq!(mock.pending_reads(), 1);
    }

    #[test]
    fn test_recovery_words_one_per_request() {
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.queue_empty(MessageKind::WordRequest);
        }
        mock.queue_empty(MessageKind::Success);

        let prompts = ScriptedPrompts::new().with_words(["one", "two", "three"]);
        let session = session(&mock);
        Exchange::new(&session, &prompts)
            .call(&Envelope::empty(MessageKind::RecoveryDevice), &[])
            .unwrap();

        assert_eq!(prompts.word_prompts(), 3);
        let sent = mock.sent_envelopes().unwrap();
        let words: Vec<String> = sent[1..]
            .iter()
            .map(|e| e.decode::<WordAck>().unwrap().word)
            .collect();
        assert_eq!(words, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_cancelled_prompt_sends_cancel() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::PinMatrixRequest);
        mock.queue_message(
            MessageKind::Failure,
            &Failure {
                code: Some(4),
                message: Some("Action cancelled by user".into()),
            },
        );

        let prompts = ScriptedPrompts::cancelling();
        let session = session(&mock);
        let err = Exchange::new(&session, &prompts)
            .call(&Envelope::empty(MessageKind::WipeDevice), &[])
            .unwrap_err();

        assert!(matches!(err, DeviceError::Cancelled));
        assert_eq!(
            mock.sent_kinds().unwrap(),
            vec![MessageKind::WipeDevice, MessageKind::Cancel]
        );
    }

    #[test]
    fn test_missing_answer_is_prompt_error() {
        let mock = MockTransport::new();
        mock.queue_empty(MessageKind::PassphraseRequest);

        let prompts = ScriptedPrompts::new();
        let session = session(&mock);
        let err = Exchange::new(&session, &prompts)
            .call(&Envelope::empty(MessageKind::SkycoinAddress), &[])
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Prompt(PromptError::Unavailable("passphrase"))
        ));
    }

    #[test]
    fn test_expect_kind_maps_failure() {
        let failure = Envelope::from_message(
            MessageKind::Failure,
            &Failure {
                code: Some(7),
                message: Some("Firmware error".into()),
            },
        );
        let err = expect_kind(failure, MessageKind::Success).unwrap_err();
        assert!(err.is_device_failure());
        assert_eq!(err.to_string(), "Device failure (Some(7)): Firmware error");
    }
}
