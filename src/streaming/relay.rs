//! Single-slot hand-off from the capture loop to the encoder.
//!
//! A push only succeeds if the encoder is waiting at that moment; otherwise
//! the frame comes straight back to the caller. A successful push moves the
//! buffer to the encoder, and the acknowledgment moves it back once the
//! encoder has finished reading it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use super::rendezvous::Rendezvous;
use crate::camera::NegotiatedFormat;

/// Raw packed pixels plus the format they were captured in.
#[derive(Debug)]
pub struct RawFrame {
    data: Vec<u8>,
    format: NegotiatedFormat,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, format: NegotiatedFormat) -> Self {
        Self { data, format }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> NegotiatedFormat {
        self.format
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// A raw frame on loan to the encoder.
#[derive(Debug)]
pub struct Lease {
    frame: RawFrame,
    ack: oneshot::Sender<Vec<u8>>,
}

impl Lease {
    pub fn frame(&self) -> &RawFrame {
        &self.frame
    }

    /// Acknowledges the frame, returning its storage to the capture loop.
    pub fn release(self) {
        // The capture loop may already be gone; nothing to do then
        let _ = self.ack.send(self.frame.into_data());
    }
}

/// Why a push did not reach the encoder.
#[derive(Debug)]
pub enum Rejected {
    /// The encoder is busy; the frame is dropped.
    Busy(RawFrame),
    /// The encoder side no longer exists.
    Closed(RawFrame),
}

#[derive(Error, Debug)]
#[error("encoder dropped the frame without acknowledging it")]
pub struct AckLost;

/// Outstanding acknowledgment for a pushed frame.
pub struct PendingAck {
    rx: oneshot::Receiver<Vec<u8>>,
}

impl PendingAck {
    /// Blocks the current thread until the encoder releases the frame.
    ///
    /// Must not be called from within an async context.
    pub fn wait(self) -> Result<Vec<u8>, AckLost> {
        self.rx.blocking_recv().map_err(|_| AckLost)
    }
}

pub fn relay() -> (RelaySender, RelayReceiver) {
    let inner = Arc::new(Rendezvous::new());
    (
        RelaySender {
            inner: Arc::clone(&inner),
        },
        RelayReceiver { inner },
    )
}

/// Capture-loop end of the relay.
pub struct RelaySender {
    inner: Arc<Rendezvous<Lease>>,
}

impl RelaySender {
    /// Non-blocking push.
    pub fn push(&self, frame: RawFrame) -> Result<PendingAck, Rejected> {
        if self.inner.is_closed() {
            return Err(Rejected::Closed(frame));
        }

        let (ack, rx) = oneshot::channel();
        match self.inner.try_send(Lease { frame, ack }) {
            Ok(()) => Ok(PendingAck { rx }),
            Err(lease) => Err(Rejected::Busy(lease.frame)),
        }
    }
}

impl Drop for RelaySender {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Encoder end of the relay.
pub struct RelayReceiver {
    inner: Arc<Rendezvous<Lease>>,
}

impl RelayReceiver {
    pub async fn recv(&self) -> Option<Lease> {
        self.inner.recv().await
    }
}

impl Drop for RelayReceiver {
    fn drop(&mut self) {
        self.inner.close();
    }
}
