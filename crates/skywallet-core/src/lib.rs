//! Skywallet-Core: host-side protocol stack for the Skywallet hardware wallet.
//!
//! Talks to a physical device over USB or to the firmware emulator over UDP,
//! using the wallet's 64-byte frame format and protobuf payloads.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, message kinds, frame codec, payload schema
//! - **Transport**: Byte stream abstraction (nusb, UDP emulator, mock)
//! - **Session**: One open transport for one operation
//! - **Exchange**: Prompt loop (button, PIN, passphrase, word, entropy) and
//!   streaming entropy
//! - **Signing**: Paginated transaction signing state machines
//! - **Events**: Observer pattern for UI decoupling
//! - **Device**: High-level facade, one method per wallet operation
//!
//! # Example
//!
//! ```no_run
//! use skywallet_core::{Device, DeviceConfig, DeviceType};
//!
//! let device = Device::from_config(DeviceConfig::for_device(DeviceType::Emulator));
//! let addresses = device.address_gen(2, 0, false).expect("address generation failed");
//! for address in addresses {
//!     println!("{address}");
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod exchange;
pub mod protocol;
pub mod session;
pub mod signing;
pub mod transport;

// Re-exports for convenience
pub use config::{ConfigError, DeviceConfig, ProtocolRevision};
pub use device::{Device, Settings};
pub use error::{DeviceError, Result};
pub use events::{DeviceEvent, DeviceObserver, NullObserver, TracingObserver};
pub use exchange::{EntropySource, Exchange, PromptError, PromptProvider, ScriptedPrompts};
pub use protocol::{Envelope, MessageKind};
pub use session::Session;
pub use signing::{BitcoinTransaction, SigningStage, SkycoinTransaction};
pub use transport::{
    Connector, DeviceTransport, DeviceType, MockTransport, NusbTransport, TransportConnector,
    TransportError, UdpTransport,
};
