//! Session - one open transport for one logical operation.
//!
//! The transport is released when the session is closed or dropped, so every
//! exit path of an operation (success, device failure, protocol or transport
//! error) gives the handle back.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::Result;
use crate::events::{DeviceEvent, DeviceObserver, Direction};
use crate::protocol::{Envelope, read_envelope, write_envelope};
use crate::transport::{Connector, DeviceTransport, DeviceType};

pub struct Session<T: DeviceTransport> {
    transport: Option<T>,
    device_type: DeviceType,
    observer: Arc<dyn DeviceObserver>,
}

impl<T: DeviceTransport> Session<T> {
    /// Open a fresh transport through `connector`.
    #[instrument(skip_all, fields(device_type = %connector.device_type()))]
    pub fn open<C>(connector: &C, observer: Arc<dyn DeviceObserver>) -> Result<Self>
    where
        C: Connector<Transport = T>,
    {
        let transport = connector.connect()?;
        Ok(Self::from_transport(transport, observer))
    }

    /// Wrap an already open transport.
    pub fn from_transport(transport: T, observer: Arc<dyn DeviceObserver>) -> Self {
        let device_type = transport.device_type();
        observer.on_event(&DeviceEvent::SessionOpened { device_type });
        Self {
            transport: Some(transport),
            device_type,
            observer,
        }
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn observer(&self) -> &dyn DeviceObserver {
        self.observer.as_ref()
    }

    fn transport(&self) -> Result<&T> {
        self.transport
            .as_ref()
            .ok_or_else(|| crate::transport::TransportError::Closed.into())
    }

    /// Frame and write one envelope.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        write_envelope(self.transport()?, envelope)?;
        self.observer.on_event(&DeviceEvent::Message {
            direction: Direction::Tx,
            kind: envelope.kind(),
            length: envelope.payload().len(),
        });
        Ok(())
    }

    /// Read the next complete envelope.
    pub fn receive(&self) -> Result<Envelope> {
        let envelope = read_envelope(self.transport()?)?;
        self.observer.on_event(&DeviceEvent::Message {
            direction: Direction::Rx,
            kind: envelope.kind(),
            length: envelope.payload().len(),
        });
        Ok(envelope)
    }

    /// Close the transport, reporting any error.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.take() {
            transport.close()?;
            self.observer.on_event(&DeviceEvent::SessionClosed);
        }
        Ok(())
    }
}

impl<T: DeviceTransport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to close transport");
        }
    }
}
