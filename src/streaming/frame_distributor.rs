//! Fan-out of encoded frames to stream consumers
//!
//! Frames are never buffered for a consumer. Each new frame goes to the
//! consumers that are waiting at that instant (up to a fixed bound); a
//! consumer busy writing the previous frame simply misses it. `Bytes` makes
//! every delivery a reference-count bump, not a copy.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use super::rendezvous::Rendezvous;

pub const DEFAULT_MAX_WAITERS: usize = 50;

/// One compressed frame. Immutable once built.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    seq: u64,
    jpeg: Bytes,
}

impl EncodedFrame {
    pub fn new(seq: u64, jpeg: Bytes) -> Self {
        Self { seq, jpeg }
    }

    /// Position in encode order, starting at 1
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn jpeg(&self) -> &Bytes {
        &self.jpeg
    }
}

/// Statistics for monitoring frame distribution
#[derive(Debug, Clone, Serialize)]
pub struct FrameStats {
    pub frames_distributed: u64,
    /// Individual consumer deliveries across all frames
    pub deliveries: u64,
    /// Frames that found nobody waiting and blocked for the next consumer
    pub guard_sends: u64,
    pub subscribers: usize,
    pub waiting: usize,
    pub max_waiters: usize,
}

pub struct FrameDistributor {
    slots: Rendezvous<EncodedFrame>,
    max_waiters: usize,
    frames_distributed: AtomicU64,
    deliveries: AtomicU64,
    guard_sends: AtomicU64,
    subscribers: AtomicUsize,
}

impl FrameDistributor {
    /// # Arguments
    /// * `max_waiters` - Upper bound on consumers served per frame
    pub fn new(max_waiters: usize) -> Self {
        let max_waiters = max_waiters.max(1);
        info!("Frame distributor created, serving up to {} consumers per frame", max_waiters);

        Self {
            slots: Rendezvous::new(),
            max_waiters,
            frames_distributed: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            guard_sends: AtomicU64::new(0),
            subscribers: AtomicUsize::new(0),
        }
    }

    /// Deliver `frame` to the consumers waiting right now.
    ///
    /// Returns the number of consumers that received it. If nobody was
    /// waiting, blocks until one consumer attaches and hands the frame to it,
    /// so the next client to connect is not starved.
    pub async fn distribute(&self, frame: EncodedFrame) -> usize {
        self.frames_distributed.fetch_add(1, Ordering::Relaxed);

        let delivered = self.slots.offer(&frame, self.max_waiters);
        if delivered > 0 {
            self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
            debug!(seq = frame.seq(), delivered, "Frame distributed");
            return delivered;
        }

        debug!(seq = frame.seq(), "No consumer waiting, holding frame");
        self.guard_sends.fetch_add(1, Ordering::Relaxed);
        self.slots.send(frame).await;
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        1
    }

    /// Attach a new stream consumer.
    pub fn subscribe(self: &Arc<Self>, client_id: impl Into<String>) -> FrameSubscriber {
        let client_id = client_id.into();
        let total = self.subscribers.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Stream consumer {} attached, total consumers: {}", client_id, total);

        FrameSubscriber {
            distributor: Arc::clone(self),
            client_id,
            frames_received: 0,
        }
    }

    /// Consumers currently blocked waiting for a frame
    pub fn waiting(&self) -> usize {
        self.slots.waiting()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            frames_distributed: self.frames_distributed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            guard_sends: self.guard_sends.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
            waiting: self.waiting(),
            max_waiters: self.max_waiters,
        }
    }
}

/// Consumer end held by one stream connection.
pub struct FrameSubscriber {
    distributor: Arc<FrameDistributor>,
    client_id: String,
    frames_received: u64,
}

impl FrameSubscriber {
    /// Wait for the next frame the distributor hands out.
    pub async fn recv(&mut self) -> Option<EncodedFrame> {
        let frame = self.distributor.slots.recv().await?;
        self.frames_received += 1;
        Some(frame)
    }

    /// Throw away one frame, which may have been held since before this
    /// consumer attached.
    pub async fn skip_stale(&mut self) {
        if let Some(frame) = self.distributor.slots.recv().await {
            debug!(client = %self.client_id, seq = frame.seq(), "Discarded stale frame");
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }
}

impl Drop for FrameSubscriber {
    fn drop(&mut self) {
        let remaining = self.distributor.subscribers.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(
            "Stream consumer {} detached after {} frames, total consumers: {}",
            self.client_id, self.frames_received, remaining
        );
    }
}
