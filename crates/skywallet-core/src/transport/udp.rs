//! UDP transport to the firmware emulator.
//!
//! Each frame travels as one datagram.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::traits::{DeviceTransport, DeviceType, TransportError};

pub struct UdpTransport {
    socket: UdpSocket,
    timeout_ms: Option<u64>,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Connect to the emulator listening on `addr`.
    #[instrument(level = "info")]
    pub fn connect(addr: &str, read_timeout_ms: Option<u64>) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        socket
            .connect(addr)
            .map_err(|e| TransportError::OpenFailed(format!("{addr}: {e}")))?;
        socket.set_read_timeout(read_timeout_ms.map(Duration::from_millis))?;

        info!(addr = %addr, "Emulator socket ready");

        Ok(Self {
            socket,
            timeout_ms: read_timeout_ms,
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl DeviceTransport for UdpTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        self.check_open()?;
        let n = self
            .socket
            .send(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!(bytes_written = n, "Write complete");
        Ok(n)
    }

    #[instrument(skip(self, buf), fields(max_len = buf.len()))]
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.check_open()?;
        match self.socket.recv(buf) {
            Ok(n) => {
                debug!(bytes_read = n, "Read complete");
                Ok(n)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout {
                    timeout_ms: self.timeout_ms.unwrap_or(0),
                })
            }
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(TransportError::Disconnected)
            }
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Emulator
    }
}
