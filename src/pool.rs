//! Bounded single-producer/single-consumer pool of capture buffers.
//!
//! A fixed arena of [`MAX_BUFFERS`](crate::MAX_BUFFERS) slots and two
//! indices, each advanced by exactly one side: the acquisition thread
//! advances `write`, the draining thread advances `read`. Index handoff
//! uses Acquire/Release ordering, so no lock sits on the data path. The
//! pool holds at most `MAX_BUFFERS - 1` pending buffers; a push against a
//! full pool is rejected and counted. It never blocks the producer and
//! never overwrites unread data.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::{BUFFER_SIZE, MAX_BUFFERS};

struct Slot {
    bytes: Box<[u8]>,
    len: usize,
}

struct Shared {
    slots: Box<[UnsafeCell<Slot>]>,
    read: AtomicUsize,
    write: AtomicUsize,
    overflows: AtomicU64,
}

// Safety: a slot is written only by the producer, at an index the consumer
// cannot observe as ready until the Release store of `write`, and read only
// by the consumer, at an index the producer treats as occupied until the
// Release store of `read`. Producer and Consumer are unique handles, so
// each index has exactly one writer.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn pending(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        (write + MAX_BUFFERS - read) % MAX_BUFFERS
    }
}

/// Create a buffer pool, returning its producer and consumer halves.
pub fn pool() -> (Producer, Consumer) {
    let slots = (0..MAX_BUFFERS)
        .map(|_| {
            UnsafeCell::new(Slot {
                bytes: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
                len: 0,
            })
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(Shared {
        slots,
        read: AtomicUsize::new(0),
        write: AtomicUsize::new(0),
        overflows: AtomicU64::new(0),
    });
    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

/// Producer half of the pool; owned by the acquisition thread.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Publish one completed transfer into the pool.
    ///
    /// Returns `false` when the pool is full; the data is dropped and the
    /// overflow counter advances. Never blocks.
    pub fn push(&mut self, data: &[u8]) -> bool {
        let shared = &*self.shared;
        let write = shared.write.load(Ordering::Relaxed);
        let next = (write + 1) % MAX_BUFFERS;
        if next == shared.read.load(Ordering::Acquire) {
            shared.overflows.fetch_add(1, Ordering::Relaxed);
            warn!("capture buffer overflow, dropping {} bytes", data.len());
            return false;
        }
        // Sole writer of this slot until the Release store below.
        let slot = unsafe { &mut *shared.slots[write].get() };
        let n = data.len().min(slot.bytes.len());
        slot.bytes[..n].copy_from_slice(&data[..n]);
        slot.len = n;
        shared.write.store(next, Ordering::Release);
        true
    }

    /// Buffers published but not yet consumed.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    /// Buffers dropped because the pool was full.
    pub fn overflow_count(&self) -> u64 {
        self.shared.overflows.load(Ordering::Relaxed)
    }
}

/// Consumer half of the pool; owned by the draining thread.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Hand the oldest ready buffer to `f` and release its slot.
    ///
    /// Returns `None` when the pool is empty. Never blocks; an empty pool
    /// is a normal condition, not a wait.
    pub fn pop_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let shared = &*self.shared;
        let read = shared.read.load(Ordering::Relaxed);
        if read == shared.write.load(Ordering::Acquire) {
            return None;
        }
        // Sole reader of this slot until the Release store below.
        let slot = unsafe { &*shared.slots[read].get() };
        let result = f(&slot.bytes[..slot.len]);
        shared.read.store((read + 1) % MAX_BUFFERS, Ordering::Release);
        Some(result)
    }

    /// Buffers published but not yet consumed.
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    /// Buffers dropped because the pool was full.
    pub fn overflow_count(&self) -> u64 {
        self.shared.overflows.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn tagged(tag: u16) -> [u8; 4] {
        let b = tag.to_le_bytes();
        [b[0], b[1], 0xAA, 0x55]
    }

    #[test]
    fn pop_on_empty_pool_returns_none() {
        let (_producer, mut consumer) = pool();
        assert_eq!(consumer.pending(), 0);
        assert!(consumer.pop_with(|_| ()).is_none());
    }

    #[test]
    fn buffers_come_out_in_push_order() {
        let (mut producer, mut consumer) = pool();
        for tag in 0..5u16 {
            assert!(producer.push(&tagged(tag)));
        }
        for tag in 0..5u16 {
            let got = consumer.pop_with(|data| {
                assert_eq!(data.len(), 4);
                u16::from_le_bytes([data[0], data[1]])
            });
            assert_eq!(got, Some(tag));
        }
        assert!(consumer.pop_with(|_| ()).is_none());
    }

    #[test]
    fn push_against_full_pool_is_rejected_without_overwrite() {
        let (mut producer, mut consumer) = pool();
        for tag in 0..(MAX_BUFFERS as u16 - 1) {
            assert!(producer.push(&tagged(tag)));
        }
        assert_eq!(producer.pending(), MAX_BUFFERS - 1);

        assert!(!producer.push(&tagged(999)));
        assert_eq!(producer.overflow_count(), 1);
        assert_eq!(producer.pending(), MAX_BUFFERS - 1);

        // The rejected push must not have clobbered the oldest entry.
        let first = consumer.pop_with(|data| u16::from_le_bytes([data[0], data[1]]));
        assert_eq!(first, Some(0));
    }

    #[test]
    fn pending_count_stays_bounded_across_wraparound() {
        let (mut producer, mut consumer) = pool();
        for round in 0..(MAX_BUFFERS as u16 * 3) {
            assert!(producer.push(&tagged(round)));
            assert!(producer.pending() <= MAX_BUFFERS - 1);
            let got = consumer.pop_with(|data| u16::from_le_bytes([data[0], data[1]]));
            assert_eq!(got, Some(round));
        }
        assert_eq!(consumer.pending(), 0);
    }

    #[test]
    fn concurrent_producer_and_consumer_preserve_fifo() {
        const COUNT: u16 = 500;
        let (mut producer, mut consumer) = pool();

        let feeder = thread::spawn(move || {
            for tag in 0..COUNT {
                // Spin until the consumer frees a slot.
                while !producer.push(&tagged(tag)) {
                    thread::yield_now();
                }
            }
        });

        let mut seen = 0u16;
        while seen < COUNT {
            let got = consumer.pop_with(|data| u16::from_le_bytes([data[0], data[1]]));
            match got {
                Some(tag) => {
                    assert_eq!(tag, seen);
                    seen += 1;
                }
                None => thread::sleep(Duration::from_micros(50)),
            }
        }
        feeder.join().unwrap();
        assert_eq!(consumer.pending(), 0);
    }
}
