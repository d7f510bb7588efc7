//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;
pub mod udp;

pub use mock::MockTransport;
pub use self::nusb::NusbTransport;
pub use traits::{Connector, DeviceTransport, DeviceType, TransportError};
pub use udp::UdpTransport;

use crate::config::DeviceConfig;

/// Opens the transport named by a `DeviceConfig`: USB or emulator.
#[derive(Debug, Clone)]
pub struct TransportConnector {
    config: DeviceConfig,
}

impl TransportConnector {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

impl Connector for TransportConnector {
    type Transport = Box<dyn DeviceTransport>;

    fn connect(&self) -> Result<Self::Transport, TransportError> {
        match self.config.device_type {
            DeviceType::Usb => Ok(Box::new(NusbTransport::open_with_ids(
                self.config.vendor_id,
                self.config.product_id,
            )?)),
            DeviceType::Emulator => Ok(Box::new(UdpTransport::connect(
                &self.config.emulator_addr,
                self.config.read_timeout_ms,
            )?)),
        }
    }

    fn device_type(&self) -> DeviceType {
        self.config.device_type
    }
}
