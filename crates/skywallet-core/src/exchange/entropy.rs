//! Streaming entropy download.
//!
//! Bulk entropy is fetched in bounded chunks. Each round asks for
//! `min(chunk_size, remaining)` bytes; collection stops once the total has
//! been reached or the device answers with anything but `Entropy`.

use std::fmt;
use std::io::Write;

use tracing::{debug, instrument};

use super::driver::{Exchange, failure_error};
use crate::error::Result;
use crate::events::DeviceEvent;
use crate::protocol::messages::{Entropy, GetMixedEntropy, GetRawEntropy};
use crate::protocol::{Envelope, MessageKind};
use crate::transport::DeviceTransport;

/// Which entropy pool the device draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropySource {
    /// Hardware RNG output as is.
    Raw,
    /// Hardware RNG mixed with the device's internal entropy pool.
    Mixed,
}

impl EntropySource {
    fn request(self, size: u32) -> Envelope {
        match self {
            EntropySource::Raw => {
                Envelope::from_message(MessageKind::GetRawEntropy, &GetRawEntropy { size })
            }
            EntropySource::Mixed => {
                Envelope::from_message(MessageKind::GetMixedEntropy, &GetMixedEntropy { size })
            }
        }
    }
}

impl fmt::Display for EntropySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntropySource::Raw => write!(f, "raw"),
            EntropySource::Mixed => write!(f, "mixed"),
        }
    }
}

/// Download up to `total` bytes into `out`. Returns the number of bytes
/// written, which may fall short of `total` if the device stops early.
#[instrument(skip(exchange, out))]
pub fn stream_entropy<T, W>(
    exchange: &Exchange<'_, T>,
    source: EntropySource,
    total: usize,
    chunk_size: u32,
    out: &mut W,
) -> Result<usize>
where
    T: DeviceTransport,
    W: Write + ?Sized,
{
    let mut received = 0usize;
    while received < total {
        let remaining = u32::try_from(total - received).unwrap_or(u32::MAX);
        let size = chunk_size.min(remaining);

        let reply = exchange.call(&source.request(size), &[MessageKind::Entropy])?;
        match reply.kind() {
            MessageKind::Entropy => {}
            MessageKind::Failure => return Err(failure_error(&reply)),
            other => {
                debug!(kind = %other, "Device stopped sending entropy");
                break;
            }
        }

        let chunk: Entropy = reply.decode()?;
        if chunk.entropy.is_empty() {
            debug!("Device returned an empty chunk");
            break;
        }
        out.write_all(&chunk.entropy)?;
        received += chunk.entropy.len();

        exchange
            .session()
            .observer()
            .on_event(&DeviceEvent::EntropyProgress { received, total });
    }
    Ok(received)
}

/// Download up to `total` bytes into memory.
pub fn collect_entropy<T: DeviceTransport>(
    exchange: &Exchange<'_, T>,
    source: EntropySource,
    total: usize,
    chunk_size: u32,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(total);
    stream_entropy(exchange, source, total, chunk_size, &mut buf)?;
    Ok(buf)
}
