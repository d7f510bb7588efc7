//! Transport layer abstraction.
//!
//! Defines the `DeviceTransport` trait, a bidirectional byte stream to either
//! a physical device or the emulator, allowing different implementations
//! (nusb, UDP, mock).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Transport already closed")]
    Closed,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of device a transport talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    /// Physical device over WebUSB.
    #[default]
    Usb,
    /// Firmware emulator over a local UDP socket.
    Emulator,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Usb => write!(f, "USB"),
            DeviceType::Emulator => write!(f, "EMULATOR"),
        }
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USB" => Ok(DeviceType::Usb),
            "EMULATOR" => Ok(DeviceType::Emulator),
            other => Err(format!(
                "invalid device type {other:?}, valid options are USB or EMULATOR"
            )),
        }
    }
}

/// Abstract device transport.
///
/// A transport is owned by exactly one session and is never shared between
/// concurrent operations.
pub trait DeviceTransport: Send {
    /// Write raw bytes (one or more whole frames).
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes, blocking until data is available.
    ///
    /// Returns `Ok(0)` when the stream has ended.
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Release the underlying handle. Further I/O fails with `Closed`.
    fn close(&self) -> Result<(), TransportError>;

    /// Which kind of device this transport reaches.
    fn device_type(&self) -> DeviceType;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(data)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn device_type(&self) -> DeviceType {
        (**self).device_type()
    }
}

/// Opens a fresh transport for each logical operation.
pub trait Connector {
    type Transport: DeviceTransport;

    fn connect(&self) -> Result<Self::Transport, TransportError>;

    /// Device type the produced transports reach.
    fn device_type(&self) -> DeviceType;
}
