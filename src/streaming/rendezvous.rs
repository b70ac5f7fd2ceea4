//! Unbuffered hand-off point between one producer and waiting consumers.
//!
//! A consumer that calls [`Rendezvous::recv`] registers a one-shot slot and
//! suspends. The producer can only hand an item to slots that are registered
//! at that instant; nothing is ever queued on the producer side. Slots whose
//! consumer has gone away are skipped and discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

pub struct Rendezvous<T> {
    slots: Mutex<VecDeque<oneshot::Sender<T>>>,
    attached: Notify,
    closed: AtomicBool,
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(VecDeque::new()),
            attached: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Waits for the producer to hand over an item.
    ///
    /// Returns `None` once the rendezvous is closed.
    pub async fn recv(&self) -> Option<T> {
        let rx = {
            let mut slots = self.slots.lock();
            if self.is_closed() {
                return None;
            }
            // drop slots whose consumer went away without being served
            slots.retain(|s| !s.is_closed());
            let (tx, rx) = oneshot::channel();
            slots.push_back(tx);
            rx
        };
        self.attached.notify_one();
        rx.await.ok()
    }

    /// Hands `item` to the longest-waiting live consumer, if any.
    pub fn try_send(&self, item: T) -> Result<(), T> {
        let mut slots = self.slots.lock();
        let mut item = item;
        while let Some(slot) = slots.pop_front() {
            match slot.send(item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
        }
        Err(item)
    }

    /// Hands a clone of `item` to up to `max` consumers waiting right now.
    ///
    /// The slot set is held for the whole pass, so a consumer that is served
    /// and immediately waits again is not served twice by the same call.
    pub fn offer(&self, item: &T, max: usize) -> usize
    where
        T: Clone,
    {
        let mut slots = self.slots.lock();
        let mut delivered = 0;
        while delivered < max {
            let Some(slot) = slots.pop_front() else {
                break;
            };
            if slot.send(item.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Blocks until some consumer takes `item`.
    pub async fn send(&self, item: T) {
        let mut item = item;
        loop {
            let attached = self.attached.notified();
            match self.try_send(item) {
                Ok(()) => return,
                Err(back) => item = back,
            }
            attached.await;
        }
    }

    /// Number of registered slots whose consumer is still listening.
    pub fn waiting(&self) -> usize {
        self.slots.lock().iter().filter(|s| !s.is_closed()).count()
    }

    /// Marks the rendezvous as finished and drops pending slots, waking
    /// their consumers with `None`.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        self.closed.store(true, Ordering::Release);
        slots.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, assert_ready_eq, task};

    #[test]
    fn test_try_send_without_waiter_returns_item() {
        let rv = Rendezvous::new();
        assert_eq!(rv.try_send(7u32), Err(7));
    }

    #[test]
    fn test_try_send_reaches_waiting_consumer() {
        let rv = Rendezvous::new();
        let mut rx = task::spawn(rv.recv());
        assert_pending!(rx.poll());
        assert_eq!(rv.waiting(), 1);

        assert_eq!(rv.try_send(1u32), Ok(()));
        assert_ready_eq!(rx.poll(), Some(1));
        assert_eq!(rv.waiting(), 0);
    }

    #[test]
    fn test_dropped_consumer_is_skipped() {
        let rv = Rendezvous::new();
        let mut gone = task::spawn(rv.recv());
        assert_pending!(gone.poll());
        drop(gone);

        let mut live = task::spawn(rv.recv());
        assert_pending!(live.poll());
        assert_eq!(rv.waiting(), 1);

        assert_eq!(rv.try_send(5u32), Ok(()));
        assert_ready_eq!(live.poll(), Some(5));
    }

    #[test]
    fn test_abandoned_waits_do_not_accumulate() {
        let rv: Rendezvous<u32> = Rendezvous::new();
        for _ in 0..1_000 {
            let mut rx = task::spawn(rv.recv());
            assert_pending!(rx.poll());
            drop(rx);
            assert!(rv.slots.lock().len() <= 1);
        }
        assert_eq!(rv.waiting(), 0);

        let mut live = task::spawn(rv.recv());
        assert_pending!(live.poll());
        assert_eq!(rv.slots.lock().len(), 1);
        assert_eq!(rv.try_send(8), Ok(()));
        assert_ready_eq!(live.poll(), Some(8));
    }

    #[test]
    fn test_offer_is_bounded() {
        let rv = Rendezvous::new();
        let mut a = task::spawn(rv.recv());
        let mut b = task::spawn(rv.recv());
        let mut c = task::spawn(rv.recv());
        assert_pending!(a.poll());
        assert_pending!(b.poll());
        assert_pending!(c.poll());

        assert_eq!(rv.offer(&9u32, 2), 2);
        assert_ready_eq!(a.poll(), Some(9));
        assert_ready_eq!(b.poll(), Some(9));
        assert_pending!(c.poll());
        assert_eq!(rv.waiting(), 1);
    }

    #[test]
    fn test_send_blocks_until_consumer_attaches() {
        let rv = Rendezvous::new();
        let mut send = task::spawn(rv.send(3u32));
        assert_pending!(send.poll());

        let mut rx = task::spawn(rv.recv());
        assert_pending!(rx.poll());
        assert!(send.is_woken());
        assert_ready!(send.poll());
        assert_ready_eq!(rx.poll(), Some(3));
    }

    #[test]
    fn test_close_discards_slots() {
        let rv: Rendezvous<u32> = Rendezvous::new();
        let mut rx = task::spawn(rv.recv());
        assert_pending!(rx.poll());
        rv.close();
        assert!(rv.is_closed());
        assert_ready_eq!(rx.poll(), None);

        let mut late = task::spawn(rv.recv());
        assert_ready_eq!(late.poll(), None);
        assert_eq!(rv.waiting(), 0);
    }
}
