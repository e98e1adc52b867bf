//! Blocking bulk transport used for every exchange with the bridge.
//!
//! The protocol engines only need two primitives: push a command packet to the
//! bulk OUT endpoint and pull one reply from the bulk IN endpoint. They are
//! expressed by [`BulkTransport`] so that a session can run over `nusb` or over
//! an in-memory bridge in tests.

use crate::consts::SEG_SIZE;
use crate::error::{Error, Result};
use log::trace;
use nusb::transfer::{Buffer, Bulk, In, Out, TransferError};
use std::time::Duration;

/// A pair of bulk endpoint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Bulk IN endpoint (device -> host).
    pub bulk_in: u8,
    /// Bulk OUT endpoint (host -> device).
    pub bulk_out: u8,
}

impl Endpoints {
    /// Endpoint addresses the CH347 exposes on its bridge interface.
    pub const CH347_DEFAULT: Endpoints = Endpoints {
        bulk_in: 0x86,
        bulk_out: 0x06,
    };
}

/// Blocking access to the bulk endpoints of one USB interface.
pub trait BulkTransport {
    /// Writes `data` to the bulk OUT `endpoint`. Returns the number of bytes written.
    fn send(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Reads at most `buf.len()` bytes from the bulk IN `endpoint` into `buf`.
    /// Returns the number of bytes received.
    fn recv(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for Box<T> {
    fn send(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).send(endpoint, data, timeout)
    }

    fn recv(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).recv(endpoint, buf, timeout)
    }
}

/// One request/response round-trip.
///
/// Sends `out`, then, if `reply` is non-empty, zeroes it and reads one reply
/// into it. Returns the reply length (0 when no reply was requested). No
/// retries happen here.
pub(crate) fn exchange<T: BulkTransport + ?Sized>(
    transport: &mut T,
    endpoints: Endpoints,
    out: &[u8],
    reply: &mut [u8],
    timeout: Duration,
) -> Result<usize> {
    trace!("bulk OUT 0x{:02X}: {:02X?}", endpoints.bulk_out, out);
    let written = transport.send(endpoints.bulk_out, out, timeout)?;
    if written != out.len() {
        return Err(Error::ShortWrite {
            expected: out.len(),
            actual: written,
        });
    }
    if reply.is_empty() {
        return Ok(0);
    }

    reply.fill(0);
    let received = transport.recv(endpoints.bulk_in, reply, timeout)?;
    trace!(
        "bulk IN 0x{:02X} ({} bytes): {:02X?}",
        endpoints.bulk_in,
        received,
        &reply[..received]
    );
    Ok(received)
}

/// [`BulkTransport`] over a claimed `nusb` interface.
///
/// The interface must already be claimed (see
/// `nusb::Device::detach_and_claim_interface`); endpoints are opened per call.
pub struct NusbTransport {
    interface: nusb::Interface,
}

impl NusbTransport {
    /// Wraps an already claimed interface.
    pub fn new(interface: nusb::Interface) -> Self {
        Self { interface }
    }

    /// The wrapped interface.
    pub fn interface(&self) -> &nusb::Interface {
        &self.interface
    }
}

impl std::fmt::Debug for NusbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NusbTransport").finish_non_exhaustive()
    }
}

fn map_transfer_error(endpoint: u8, timeout: Duration, err: TransferError) -> Error {
    match err {
        // transfer_blocking cancels the transfer when the timeout expires
        TransferError::Cancelled => Error::Timeout {
            endpoint,
            timeout_ms: timeout.as_millis() as u64,
        },
        source => Error::Transfer { endpoint, source },
    }
}

impl BulkTransport for NusbTransport {
    fn send(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(Error::Usb)?;

        let mut transfer_buf = Buffer::new(data.len());
        transfer_buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(transfer_buf, timeout);
        completion
            .status
            .map_err(|e| map_transfer_error(endpoint, timeout, e))?;
        Ok(completion.actual_len)
    }

    fn recv(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut ep = self
            .interface
            .endpoint::<Bulk, In>(endpoint)
            .map_err(Error::Usb)?;

        // IN requests must cover whole packets; SEG_SIZE is a multiple of every bulk packet size.
        let requested = buf.len().next_multiple_of(SEG_SIZE);
        let completion = ep.transfer_blocking(Buffer::new(requested), timeout);
        completion
            .status
            .map_err(|e| map_transfer_error(endpoint, timeout, e))?;

        let actual_len = completion.actual_len;
        let data = completion.buffer.into_vec();
        let received = actual_len.min(buf.len()).min(data.len());
        buf[..received].copy_from_slice(&data[..received]);
        Ok(received)
    }
}
