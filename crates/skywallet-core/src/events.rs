//! Event system for UI decoupling.
//!
//! Lets the CLI (or any other front end) follow protocol progress without
//! the core depending on it.

use std::fmt;

use crate::protocol::MessageKind;
use crate::signing::SigningStage;
use crate::transport::DeviceType;

/// Message direction on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => write!(f, "TX"),
            Direction::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted while talking to the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Transport opened for one operation.
    SessionOpened { device_type: DeviceType },
    /// Transport released.
    SessionClosed,
    /// Envelope sent or received.
    Message {
        direction: Direction,
        kind: MessageKind,
        length: usize,
    },
    /// Device asked for user input.
    PromptIssued { prompt: MessageKind },
    /// Signing state machine moved on.
    StageChanged { from: SigningStage, to: SigningStage },
    /// One page of inputs or outputs acknowledged.
    PageSent {
        stage: SigningStage,
        start: usize,
        count: usize,
    },
    /// Signatures collected so far in a signing run.
    SignaturesReceived { received: usize, expected: usize },
    /// Entropy download progress.
    EntropyProgress { received: usize, total: usize },
    /// Operation returned successfully.
    Complete { operation: &'static str },
}

/// Observer trait for receiving device events.
pub trait DeviceObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DeviceEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DeviceObserver for NullObserver {
    fn on_event(&self, _event: &DeviceEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DeviceObserver for TracingObserver {
    fn on_event(&self, event: &DeviceEvent) {
        match event {
            DeviceEvent::SessionOpened { device_type } => {
                tracing::debug!(device_type = %device_type, "Session opened");
            }
            DeviceEvent::SessionClosed => {
                tracing::debug!("Session closed");
            }
            DeviceEvent::Message {
                direction,
                kind,
                length,
            } => {
                tracing::trace!(dir = %direction, kind = %kind, len = length, "Message");
            }
            DeviceEvent::PromptIssued { prompt } => {
                tracing::info!(prompt = %prompt, "Device is waiting for input");
            }
            DeviceEvent::StageChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Signing stage changed");
            }
            DeviceEvent::PageSent {
                stage,
                start,
                count,
            } => {
                tracing::debug!(stage = %stage, start = start, count = count, "Page sent");
            }
            DeviceEvent::SignaturesReceived { received, expected } => {
                tracing::debug!(received = received, expected = expected, "Signatures received");
            }
            DeviceEvent::EntropyProgress { received, total } => {
                let pct = if *total > 0 {
                    (*received * 100) / *total
                } else {
                    0
                };
                tracing::debug!(progress = %format!("{}%", pct), "Entropy");
            }
            DeviceEvent::Complete { operation } => {
                tracing::info!(operation = operation, "Operation complete");
            }
        }
    }
}

/// Observer that records every event, for tests and front ends that replay
/// them later.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<DeviceEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl DeviceObserver for RecordingObserver {
    fn on_event(&self, event: &DeviceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
