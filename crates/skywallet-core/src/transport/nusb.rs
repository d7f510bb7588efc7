//! nusb-based USB transport implementation.

use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{In, Interrupt, Out};
use nusb::{MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{DeviceTransport, DeviceType, TransportError};
use crate::protocol::constants::{
    FRAME_SIZE, SKYWALLET_PRODUCT_ID, SKYWALLET_VENDOR_ID, USB_ENDPOINT_IN, USB_ENDPOINT_OUT,
    USB_INTERFACE,
};

/// WebUSB transport over the device's interrupt endpoints.
pub struct NusbTransport {
    reader: Mutex<Option<EndpointRead<Interrupt>>>,
    writer: Mutex<Option<EndpointWrite<Interrupt>>>,
    vid: u16,
    pid: u16,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NusbTransport {
    /// Open the first Skywallet found on the bus.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_ids(SKYWALLET_VENDOR_ID, SKYWALLET_PRODUCT_ID)
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(USB_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: USB_INTERFACE,
                message: e.to_string(),
            })?;

        let reader = interface
            .endpoint::<Interrupt, In>(USB_ENDPOINT_IN)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .reader(FRAME_SIZE);
        let writer = interface
            .endpoint::<Interrupt, Out>(USB_ENDPOINT_OUT)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .writer(FRAME_SIZE);

        info!(
            in_ep = %format!("0x{:02X}", USB_ENDPOINT_IN),
            out_ep = %format!("0x{:02X}", USB_ENDPOINT_OUT),
            "Device opened successfully"
        );

        Ok(Self {
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            vid,
            pid,
        })
    }

    pub fn vendor_id(&self) -> u16 {
        self.vid
    }

    pub fn product_id(&self) -> u16 {
        self.pid
    }
}

impl DeviceTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self, buf), fields(max_len = buf.len()))]
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut guard = lock(&self.reader);
        let reader = guard.as_mut().ok_or(TransportError::Closed)?;

        let n = reader
            .read(buf)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        debug!(bytes_read = n, "Read complete");
        Ok(n)
    }

    fn close(&self) -> Result<(), TransportError> {
        lock(&self.reader).take();
        lock(&self.writer).take();
        debug!("Interface released");
        Ok(())
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Usb
    }
}
