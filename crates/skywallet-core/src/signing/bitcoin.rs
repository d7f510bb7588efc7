//! UTXO-style signer.
//!
//! Stages: outputs -> inputs -> finished. Signatures come back with the
//! device's replies to input pages.

use tracing::instrument;

use super::{Dialect, PageAck, PendingTransaction, SigningStage, run};
use crate::error::{DeviceError, Result};
use crate::exchange::Exchange;
use crate::protocol::constants::BITCOIN_COIN_NAME;
use crate::protocol::messages::{BitcoinTxAck, BitcoinTxInput, BitcoinTxOutput, SignTx};
use crate::protocol::{Envelope, MessageKind};
use crate::transport::DeviceTransport;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitcoinTransaction {
    pub inputs: Vec<BitcoinTxInput>,
    pub outputs: Vec<BitcoinTxOutput>,
    pub version: u32,
    pub lock_time: u32,
    pub tx_hash: Option<String>,
}

pub struct BitcoinSigner<'a> {
    tx: &'a BitcoinTransaction,
}

impl<'a> BitcoinSigner<'a> {
    pub fn new(tx: &'a BitcoinTransaction) -> Self {
        Self { tx }
    }

    #[instrument(skip_all, fields(inputs = self.tx.inputs.len(), outputs = self.tx.outputs.len()))]
    pub fn sign<T: DeviceTransport>(
        &self,
        exchange: &Exchange<'_, T>,
        page_size: usize,
    ) -> Result<Vec<String>> {
        run(exchange, self, page_size)
    }
}

impl Dialect for BitcoinSigner<'_> {
    const FIRST_STAGE: SigningStage = SigningStage::Outputs;
    const NAME: &'static str = "bitcoin";

    fn start(&self) -> Envelope {
        Envelope::from_message(
            MessageKind::SignTx,
            &SignTx {
                outputs_count: self.tx.outputs.len() as u32,
                inputs_count: self.tx.inputs.len() as u32,
                coin_name: Some(BITCOIN_COIN_NAME.to_string()),
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
            SigningStage::Outputs => SigningStage::Inputs,
            _ => SigningStage::Finished,
        }
    }

    fn page(&self, state: &mut PendingTransaction) -> Result<PageAck> {
        match state.stage() {
            SigningStage::Outputs => {
                let page = state.next_page(&self.tx.outputs)?;
                let ack = BitcoinTxAck {
                    inputs: Vec::new(),
                    outputs: page.items.to_vec(),
                };
                Ok(PageAck::new(
                    Envelope::from_message(MessageKind::BitcoinTxAck, &ack),
                    &page,
                ))
            }
            SigningStage::Inputs => {
                let page = state.next_page(&self.tx.inputs)?;
                let ack = BitcoinTxAck {
                    inputs: page.items.to_vec(),
                    outputs: Vec::new(),
                };
                Ok(PageAck::new(
                    Envelope::from_message(MessageKind::BitcoinTxAck, &ack),
                    &page,
                ))
            }
            stage => Err(DeviceError::EmptyPage { stage }),
        }
    }
}
