//! Frame handoff between the ingest, pipeline, and relay loops.
//!
//! Two shapes cover every handoff in the service: a latest-value slot where
//! a slow consumer only ever sees the newest frame, and a small bounded ring
//! for the relay where brief downstream stalls are absorbed by dropping the
//! oldest frames first.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use pickcam_core::RgbFrame;

use crate::state::lock;

/// Frames the relay keeps queued before the oldest is dropped.
pub const RELAY_RING_CAPACITY: usize = 5;

/// Single-value slot with a version counter and a condvar.
///
/// Publishing overwrites whatever was there; consumers poll with
/// [`Slot::wait_newer`] and use the returned sequence number to tell a fresh
/// value from a timeout.
pub struct Slot<T> {
    inner: Mutex<SlotInner<T>>,
    cv: Condvar,
}

struct SlotInner<T> {
    value: Option<T>,
    seq: u64,
}

impl<T: Clone> Slot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                value: None,
                seq: 0,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn publish(&self, value: T) {
        let mut inner = lock(&self.inner);
        inner.value = Some(value);
        inner.seq += 1;
        self.cv.notify_all();
    }

    /// Clone of the newest value, if any was ever published.
    pub fn latest(&self) -> Option<T> {
        lock(&self.inner).value.clone()
    }

    /// Wait up to `timeout` for a value newer than `last_seq`.
    ///
    /// Always returns the newest stored value together with its sequence
    /// number; on timeout that is simply the value the caller already saw.
    pub fn wait_newer(&self, last_seq: u64, timeout: Duration) -> (Option<T>, u64) {
        let mut inner = lock(&self.inner);
        if inner.seq == last_seq {
            let (guard, _timed_out) = self
                .cv
                .wait_timeout(inner, timeout)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
        (inner.value.clone(), inner.seq)
    }
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Latest decoded capture frame, shared by the pipeline and display paths.
pub type FrameSlot = Slot<RgbFrame>;

/// Bounded FIFO of frames awaiting relay, oldest dropped on overflow.
#[derive(Default)]
pub struct RelayRing {
    inner: Mutex<VecDeque<RgbFrame>>,
}

impl RelayRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: RgbFrame) {
        let mut ring = lock(&self.inner);
        if ring.len() >= RELAY_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(frame);
    }

    pub fn pop(&self) -> Option<RgbFrame> {
        lock(&self.inner).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn tagged_frame(tag: u8) -> RgbFrame {
        let mut f = RgbFrame::new(2, 2);
        f.set(0, 0, [tag, 0, 0]);
        f
    }

    #[test]
    fn ring_drops_the_oldest_beyond_capacity() {
        let ring = RelayRing::new();
        for tag in 0..7u8 {
            ring.push(tagged_frame(tag));
        }
        assert_eq!(ring.len(), RELAY_RING_CAPACITY);
        // 0 and 1 were pushed out.
        let first = ring.pop().unwrap();
        assert_eq!(first.get(0, 0), [2, 0, 0]);
    }

    #[test]
    fn slot_returns_the_stored_value_after_timeout() {
        let slot = FrameSlot::new();
        slot.publish(tagged_frame(9));
        let (value, seq) = slot.wait_newer(0, Duration::from_millis(5));
        assert_eq!(seq, 1);
        assert_eq!(value.unwrap().get(0, 0), [9, 0, 0]);

        // Nothing newer than seq 1: timeout hands back the same frame.
        let (value, seq) = slot.wait_newer(1, Duration::from_millis(5));
        assert_eq!(seq, 1);
        assert!(value.is_some());
    }

    #[test]
    fn publish_wakes_a_parked_consumer() {
        let slot = Arc::new(FrameSlot::new());
        let consumer = Arc::clone(&slot);
        let handle =
            thread::spawn(move || consumer.wait_newer(0, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        slot.publish(tagged_frame(3));
        let (value, seq) = handle.join().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(value.unwrap().get(0, 0), [3, 0, 0]);
    }
}
