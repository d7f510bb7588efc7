//! Paginated transaction signing.
//!
//! The device holds only a few inputs or outputs at a time, so a transaction
//! is streamed in pages. After every acknowledgement the device sends a
//! `TxRequest` naming what it wants next (`TXINPUT`, `TXOUTPUT` or
//! `TXFINISHED`); that discriminant drives the stage transitions and the
//! local stage only checks that the device and host agree.
//!
//! Two dialects share the machinery here:
//!
//! - asset-native (`skycoin`): inputs, outputs, inputs again, finished
//! - UTXO-style (`bitcoin`): outputs, inputs, finished

pub mod bitcoin;
pub mod page;
pub mod skycoin;

use std::fmt;

use tracing::{debug, info};

use crate::error::{DeviceError, Result};
use crate::events::DeviceEvent;
use crate::exchange::{Exchange, expect_kind};
use crate::protocol::messages::{TxRequest, TxSignResult};
use crate::protocol::{Envelope, MessageKind};
use crate::transport::DeviceTransport;

pub use crate::protocol::messages::TxRequestType;
pub use bitcoin::{BitcoinSigner, BitcoinTransaction};
pub use page::{Page, Pager};
pub use skycoin::{SkycoinSigner, SkycoinTransaction};

/// Phase of a signing run. Each stage accepts exactly one device request
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningStage {
    /// Asset-native: inputs for the inner hash.
    InputsForHash,
    /// Asset-native: outputs for the inner hash.
    OutputsForHash,
    /// Asset-native: inputs again, signatures come back.
    InputsForSigning,
    /// UTXO-style: outputs first.
    Outputs,
    /// UTXO-style: inputs, signatures come back.
    Inputs,
    /// Device reported the run complete.
    Finished,
}

impl SigningStage {
    /// Request type the device must send while in this stage.
    pub fn expected_request(self) -> TxRequestType {
        match self {
            SigningStage::InputsForHash
            | SigningStage::InputsForSigning
            | SigningStage::Inputs => TxRequestType::TXINPUT,
            SigningStage::OutputsForHash | SigningStage::Outputs => TxRequestType::TXOUTPUT,
            SigningStage::Finished => TxRequestType::TXFINISHED,
        }
    }
}

impl fmt::Display for SigningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningStage::InputsForHash => write!(f, "Inputs (hash)"),
            SigningStage::OutputsForHash => write!(f, "Outputs (hash)"),
            SigningStage::InputsForSigning => write!(f, "Inputs (signing)"),
            SigningStage::Outputs => write!(f, "Outputs"),
            SigningStage::Inputs => write!(f, "Inputs"),
            SigningStage::Finished => write!(f, "Finished"),
        }
    }
}

/// State of one signing run. Owned by the run and dropped with it.
#[derive(Debug)]
pub struct PendingTransaction {
    stage: SigningStage,
    pager: Pager,
    signatures: Vec<String>,
}

impl PendingTransaction {
    pub fn new(stage: SigningStage, page_size: usize) -> Self {
        Self {
            stage,
            pager: Pager::new(page_size),
            signatures: Vec::new(),
        }
    }

    pub fn stage(&self) -> SigningStage {
        self.stage
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// Check the device's request against the current stage. State is left
    /// untouched on mismatch.
    pub fn validate(&self, requested: TxRequestType) -> Result<()> {
        if requested != self.stage.expected_request() {
            return Err(DeviceError::ProtocolSequenceError {
                stage: self.stage,
                requested,
            });
        }
        Ok(())
    }

    /// Append signature records in the order the device emitted them. A
    /// record without a signature still counts, as an empty string.
    pub fn record_signatures(&mut self, results: &[TxSignResult]) {
        self.signatures
            .extend(results.iter().map(|r| r.signature.clone().unwrap_or_default()));
    }

    /// Next page of `items` for the current stage.
    pub fn next_page<'a, T>(&mut self, items: &'a [T]) -> Result<Page<'a, T>> {
        self.pager.next_page(self.stage, items)
    }

    fn advance(&mut self, to: SigningStage) {
        self.stage = to;
    }

    fn into_signatures(self) -> Vec<String> {
        self.signatures
    }
}

/// One signing dialect: how to start, how to page, in which order.
pub trait Dialect {
    /// Stage the run starts in.
    const FIRST_STAGE: SigningStage;

    /// Short name for logs and events.
    const NAME: &'static str;

    /// `SignTx` announcing the transaction.
    fn start(&self) -> Envelope;

    /// Signatures the device must return.
    fn input_count(&self) -> usize;

    /// Stage following `stage`.
    fn next_stage(stage: SigningStage) -> SigningStage;

    /// Build the acknowledgement for the current stage's next page.
    fn page(&self, state: &mut PendingTransaction) -> Result<PageAck>;
}

/// Acknowledgement carrying one page, plus where the page sits.
#[derive(Debug)]
pub struct PageAck {
    pub envelope: Envelope,
    pub start: usize,
    pub count: usize,
    pub last: bool,
}

impl PageAck {
    pub fn new<T>(envelope: Envelope, page: &Page<'_, T>) -> Self {
        Self {
            envelope,
            start: page.start,
            count: page.items.len(),
            last: page.last,
        }
    }
}

/// Run a signing session to completion.
///
/// Any `Failure` aborts the run; signatures collected so far are dropped.
pub fn run<T: DeviceTransport, D: Dialect>(
    exchange: &Exchange<'_, T>,
    dialect: &D,
    page_size: usize,
) -> Result<Vec<String>> {
    let observer = exchange.session().observer();
    let expected = dialect.input_count();
    let mut state = PendingTransaction::new(D::FIRST_STAGE, page_size);

    info!(dialect = D::NAME, inputs = expected, page_size, "Signing transaction");

    let mut reply = exchange.call(&dialect.start(), &[MessageKind::TxRequest])?;
    loop {
        let request: TxRequest = expect_kind(reply, MessageKind::TxRequest)?.decode()?;
        let requested = request
            .kind()
            .ok_or(DeviceError::InvalidTxRequest(request.request_type))?;
        state.validate(requested)?;

        if !request.sign_result.is_empty() {
            state.record_signatures(&request.sign_result);
            observer.on_event(&DeviceEvent::SignaturesReceived {
                received: state.signatures().len(),
                expected,
            });
        }

        if state.stage() == SigningStage::Finished {
            let actual = state.signatures().len();
            if actual != expected {
                return Err(DeviceError::SignatureCountMismatch { expected, actual });
            }
            info!(dialect = D::NAME, signatures = actual, "Signing finished");
            return Ok(state.into_signatures());
        }

        let stage = state.stage();
        let ack = dialect.page(&mut state)?;
        debug!(stage = %stage, start = ack.start, count = ack.count, last = ack.last, "Sending page");
        observer.on_event(&DeviceEvent::PageSent {
            stage,
            start: ack.start,
            count: ack.count,
        });

        if ack.last {
            let to = D::next_stage(stage);
            state.advance(to);
            observer.on_event(&DeviceEvent::StageChanged { from: stage, to });
        }

        reply = exchange.call(&ack.envelope, &[MessageKind::TxRequest])?;
    }
}
