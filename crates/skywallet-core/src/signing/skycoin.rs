//! Asset-native signer.
//!
//! Stages: inputs (hash) -> outputs (hash) -> inputs (signing) -> finished.
//! The first two rounds let the device compute the inner hash; signatures
//! arrive during the second pass over the inputs.

use tracing::instrument;

use super::{Dialect, PageAck, PendingTransaction, SigningStage, run};
use crate::error::{DeviceError, Result};
use crate::exchange::Exchange;
use crate::protocol::constants::SKYCOIN_COIN_NAME;
use crate::protocol::messages::{SignTx, TransactionType, TxAck, TxAckInput, TxAckOutput};
use crate::protocol::{Envelope, MessageKind};
use crate::transport::DeviceTransport;

/// Transaction to sign, in device order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkycoinTransaction {
    pub inputs: Vec<TxAckInput>,
    pub outputs: Vec<TxAckOutput>,
    pub version: u32,
    pub lock_time: u32,
    pub tx_hash: Option<String>,
}

pub struct SkycoinSigner<'a> {
    tx: &'a SkycoinTransaction,
}

impl<'a> SkycoinSigner<'a> {
    pub fn new(tx: &'a SkycoinTransaction) -> Self {
        Self { tx }
    }

    /// Stream the transaction and return one signature per input, in
    /// input order.
    #[instrument(skip_all, fields(inputs = self.tx.inputs.len(), outputs = self.tx.outputs.len()))]
    pub fn sign<T: DeviceTransport>(
        &self,
        exchange: &Exchange<'_, T>,
        page_size: usize,
    ) -> Result<Vec<String>> {
        run(exchange, self, page_size)
    }

    fn ack(&self, inputs: &[TxAckInput], outputs: &[TxAckOutput]) -> Envelope {
        Envelope::from_message(
            MessageKind::TxAck,
            &TxAck {
                tx: Some(TransactionType {
                    version: Some(self.tx.version),
                    inputs: inputs.to_vec(),
                    outputs: outputs.to_vec(),
                    lock_time: Some(self.tx.lock_time),
                }),
            },
        )
    }
}

impl Dialect for SkycoinSigner<'_> {
    const FIRST_STAGE: SigningStage = SigningStage::InputsForHash;
    const NAME: &'static str = "skycoin";

    fn start(&self) -> Envelope {
        Envelope::from_message(
            MessageKind::SignTx,
            &SignTx {
                outputs_count: self.tx.outputs.len() as u32,
                inputs_count: self.tx.inputs.len() as u32,
                coin_name: Some(SKYCOIN_COIN_NAME.to_string()),
                version: Some(self.tx.version),
                lock_time: Some(self.tx.lock_time),
                tx_hash: self.tx.tx_hash.clone(),
            },
        )
    }

    fn input_count(&self) -> usize {
        self.tx.inputs.len()
    }

    fn next_stage(stage: SigningStage) -> SigningStage {
        match stage {
            SigningStage::InputsForHash => SigningStage::OutputsForHash,
            SigningStage::OutputsForHash => SigningStage::InputsForSigning,
            _ => SigningStage::Finished,
        }
    }

    fn page(&self, state: &mut PendingTransaction) -> Result<PageAck> {
        match state.stage() {
            SigningStage::InputsForHash | SigningStage::InputsForSigning => {
                let page = state.next_page(&self.tx.inputs)?;
                Ok(PageAck::new(self.ack(page.items, &[]), &page))
            }
            SigningStage::OutputsForHash => {
                let page = state.next_page(&self.tx.outputs)?;
                Ok(PageAck::new(self.ack(&[], page.items), &page))
            }
            stage => Err(DeviceError::EmptyPage { stage }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::{DeviceEvent, RecordingObserver};
    use crate::exchange::ScriptedPrompts;
    use crate::protocol::messages::{Failure, TxRequest, TxRequestType, TxSignResult};
    use crate::session::Session;
    use crate::transport::MockTransport;

    fn transaction(inputs: usize, outputs: usize) -> SkycoinTransaction {
        SkycoinTransaction {
            inputs: (0..inputs)
                .map(|i| TxAckInput {
                    address_n: vec![i as u32],
                    hash_in: format!("{:064x}", i),
                })
                .collect(),
            outputs: (0..outputs)
                .map(|i| TxAckOutput {
                    address: format!("2M755W9o7933roLASK9PZTmqRsjQUsVen9y{}", i),
                    address_n: vec![],
                    coins: 1_000_000,
                    hours: 1,
                })
                .collect(),
            version: 1,
            lock_time: 0,
            tx_hash: None,
        }
    }

    fn queue_request(mock: &MockTransport, kind: TxRequestType, signatures: &[String]) {
        mock.queue_message(
            MessageKind::TxRequest,
            &TxRequest {
                request_type: Some(kind as i32),
                details: None,
                sign_result: signatures
                    .iter()
                    .enumerate()
                    .map(|(i, s)| TxSignResult {
                        signature_index: Some(i as u32),
                        signature: Some(s.clone()),
                    })
                    .collect(),
            },
        );
    }

    /// Script a well-behaved device for `inputs` x `outputs` at `page`.
    fn script_device(mock: &MockTransport, inputs: usize, outputs: usize, page: usize) {
        let pages = |n: usize| n.div_ceil(page);
        queue_request(mock, TxRequestType::TXINPUT, &[]);
        for _ in 1..pages(inputs) {
            queue_request(mock, TxRequestType::TXINPUT, &[]);
        }
        for _ in 0..pages(outputs) {
            queue_request(mock, TxRequestType::TXOUTPUT, &[]);
        }
        queue_request(mock, TxRequestType::TXINPUT, &[]);
        for p in 0..pages(inputs) {
            let start = p * page;
            let end = (start + page).min(inputs);
            let signatures: Vec<String> = (start..end).map(|i| format!("sig-{i}")).collect();
            let next = if end == inputs {
                TxRequestType::TXFINISHED
            } else {
                TxRequestType::TXINPUT
            };
            queue_request(mock, next, &signatures);
        }
    }

    fn sign(
        mock: &MockTransport,
        tx: &SkycoinTransaction,
        page_size: usize,
        observer: Arc<RecordingObserver>,
    ) -> Result<Vec<String>> {
        let session = Session::open(mock, observer)?;
        let prompts = ScriptedPrompts::new();
        let exchange = Exchange::new(&session, &prompts);
        SkycoinSigner::new(tx).sign(&exchange, page_size)
    }

    fn sent_acks(mock: &MockTransport) -> Vec<TransactionType> {
        mock.sent_envelopes()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == MessageKind::TxAck)
            .map(|e| e.decode::<TxAck>().unwrap().tx.unwrap())
            .collect()
    }

    #[test]
    fn test_twenty_inputs_page_eight() {
        let mock = MockTransport::new();
        script_device(&mock, 20, 20, 8);
        let tx = transaction(20, 20);
        let observer = Arc::new(RecordingObserver::new());

        let signatures = sign(&mock, &tx, 8, observer.clone()).unwrap();

        let expected: Vec<String> = (0..20).map(|i| format!("sig-{i}")).collect();
        assert_eq!(signatures, expected);

        let page_sizes: Vec<(usize, usize)> = sent_acks(&mock)
            .iter()
            .map(|t| (t.inputs.len(), t.outputs.len()))
            .collect();
        assert_eq!(
            page_sizes,
            vec![
                (8, 0),
                (8, 0),
                (4, 0),
                (0, 8),
                (0, 8),
                (0, 4),
                (8, 0),
                (8, 0),
                (4, 0)
            ]
        );

        let stages: Vec<(SigningStage, SigningStage)> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::StageChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                (SigningStage::InputsForHash, SigningStage::OutputsForHash),
                (SigningStage::OutputsForHash, SigningStage::InputsForSigning),
                (SigningStage::InputsForSigning, SigningStage::Finished),
            ]
        );
        assert_eq!(mock.pending_reads(), 0);
    }

    #[test]
    fn test_pages_preserve_order() {
        let mock = MockTransport::new();
        script_device(&mock, 10, 3, 7);
        let tx = transaction(10, 3);

        sign(&mock, &tx, 7, Arc::new(RecordingObserver::new())).unwrap();

        let acks = sent_acks(&mock);
        let first_pass: Vec<TxAckInput> = acks[..2]
            .iter()
            .flat_map(|t| t.inputs.clone())
            .collect();
        assert_eq!(first_pass, tx.inputs);
        assert_eq!(acks[2].outputs, tx.outputs);
        assert_eq!(acks[2].version, Some(1));
    }

    #[test]
    fn test_out_of_order_request_is_sequence_error() {
        let mock = MockTransport::new();
        // Device asks for outputs while inputs are still pending.
        queue_request(&mock, TxRequestType::TXOUTPUT, &[]);
        let tx = transaction(2, 2);

        let err = sign(&mock, &tx, 8, Arc::new(RecordingObserver::new())).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ProtocolSequenceError {
                stage: SigningStage::InputsForHash,
                requested: TxRequestType::TXOUTPUT
            }
        ));
        // Only SignTx went out.
        assert_eq!(mock.sent_kinds().unwrap(), vec![MessageKind::SignTx]);
    }

    #[test]
    fn test_failure_discards_signatures() {
        let mock = MockTransport::new();
        queue_request(&mock, TxRequestType::TXINPUT, &[]);
        queue_request(&mock, TxRequestType::TXOUTPUT, &[]);
        queue_request(&mock, TxRequestType::TXINPUT, &["early".to_string()]);
        mock.queue_message(
            MessageKind::Failure,
            &Failure {
                code: Some(99),
                message: Some("Signing failed".into()),
            },
        );
        let tx = transaction(2, 1);

        let err = sign(&mock, &tx, 8, Arc::new(RecordingObserver::new())).unwrap_err();
        match err {
            DeviceError::DeviceFailure { message, .. } => assert_eq!(message, "Signing failed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_signature_count_checked() {
        let mock = MockTransport::new();
        queue_request(&mock, TxRequestType::TXINPUT, &[]);
        queue_request(&mock, TxRequestType::TXOUTPUT, &[]);
        queue_request(&mock, TxRequestType::TXINPUT, &[]);
        queue_request(&mock, TxRequestType::TXFINISHED, &["only-one".to_string()]);
        let tx = transaction(2, 1);

        let err = sign(&mock, &tx, 8, Arc::new(RecordingObserver::new())).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::SignatureCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        let mock = MockTransport::new();
        mock.queue_message(
            MessageKind::TxRequest,
            &TxRequest {
                request_type: Some(17),
                ..Default::default()
            },
        );
        let tx = transaction(1, 1);
        let err = sign(&mock, &tx, 8, Arc::new(RecordingObserver::new())).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidTxRequest(Some(17))));
    }
}
