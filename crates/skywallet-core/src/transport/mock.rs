//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prost::Message;
use tracing::warn;

use super::traits::{Connector, DeviceTransport, DeviceType, TransportError};
use crate::error::Result;
use crate::protocol::frame::{self, FrameDecoder};
use crate::protocol::{Envelope, FRAME_SIZE, MessageKind};

/// Scripted device: replies are queued up front, host writes are captured.
///
/// Clones share state, so a test keeps one handle for inspection while the
/// code under test owns another.
#[derive(Clone)]
pub struct MockTransport {
    /// Device frames returned on read, one frame per read.
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    device_type: DeviceType,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_device_type(DeviceType::Emulator)
    }

    pub fn with_device_type(device_type: DeviceType) -> Self {
        Self {
            inbound: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            device_type,
            connected: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue raw bytes to be returned by the next read.
    pub fn queue_raw(&self, bytes: &[u8]) {
        lock(&self.inbound).push_back(bytes.to_vec());
    }

    /// Queue a device reply, framed the way the firmware frames it. A reply
    /// too large to frame is not queued.
    pub fn queue_envelope(&self, envelope: &Envelope) {
        let frames = match frame::encode_device(envelope.kind(), envelope.payload()) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(kind = %envelope.kind(), "Reply not queued: {}", e);
                return;
            }
        };
        let mut inbound = lock(&self.inbound);
        for frame in frames {
            inbound.push_back(frame.to_vec());
        }
    }

    /// Queue a device reply carrying `message` as payload.
    pub fn queue_message<M: Message>(&self, kind: MessageKind, message: &M) {
        self.queue_envelope(&Envelope::from_message(kind, message));
    }

    /// Queue a device reply with no payload.
    pub fn queue_empty(&self, kind: MessageKind) {
        self.queue_envelope(&Envelope::empty(kind));
    }

    /// Frames still waiting to be read.
    pub fn pending_reads(&self) -> usize {
        lock(&self.inbound).len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        lock(&self.write_log).clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        lock(&self.write_log).clear();
    }

    /// Reassemble the captured writes into the envelopes the host sent.
    ///
    /// Payloads come back under the separator convention of the frame
    /// decoder: the first payload byte reads as `'\n'`.
    pub fn sent_envelopes(&self) -> Result<Vec<Envelope>> {
        let bytes: Vec<u8> = lock(&self.write_log).concat();
        let mut decoder = FrameDecoder::new();
        let mut sent = Vec::new();
        for frame in bytes.chunks(FRAME_SIZE) {
            if let Some(envelope) = decoder.push(frame)? {
                sent.push(envelope);
            }
        }
        Ok(sent)
    }

    /// Kinds of the envelopes the host sent, in order.
    pub fn sent_kinds(&self) -> Result<Vec<MessageKind>> {
        Ok(self
            .sent_envelopes()?
            .iter()
            .map(Envelope::kind)
            .collect())
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of transports handed out through `Connector::connect`.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of `close` calls received.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> std::result::Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTransport for MockTransport {
    fn write(&self, data: &[u8]) -> std::result::Result<usize, TransportError> {
        self.check_open()?;
        lock(&self.write_log).push(data.to_vec());
        Ok(data.len())
    }

    fn read(&self, buf: &mut [u8]) -> std::result::Result<usize, TransportError> {
        self.check_open()?;
        let mut inbound = lock(&self.inbound);
        let Some(mut chunk) = inbound.pop_front() else {
            // Script exhausted: behave like a closed stream.
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn close(&self) -> std::result::Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }
}

impl Connector for MockTransport {
    type Transport = MockTransport;

    fn connect(&self) -> std::result::Result<Self::Transport, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        Ok(self.clone())
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }
}
