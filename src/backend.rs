//! Asynchronous transfer backends feeding the capture pipeline.
//!
//! Two designs cover the transport shapes in the field. [`WaitBackend`]
//! drives a fixed ring of transfer buffers with bounded per-completion
//! waits, slot by slot. [`EventBackend`] is fed completion events from a
//! transport-managed event loop and resubmits each slot as soon as its
//! event is processed. Both hand completed buffers to the same checked
//! pool push and recycle the transfer whether or not the pool accepted
//! the data, so capture continues across a slow consumer.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::{BUFFER_SIZE, MAX_BUFFERS};

/// Pause after cancelling transfers, letting cancellation settle before
/// the transport is released.
const CANCEL_SETTLE: Duration = Duration::from_millis(100);

/// Driver of the transfer cycle, independent of pool and thread plumbing.
pub trait TransferBackend: Send {
    /// Put the initial set of transfers in flight.
    fn prime(&mut self) -> Result<()>;

    /// Process one completion: hand the filled bytes to `publish`, then
    /// re-arm the transfer.
    ///
    /// `publish` returns `false` when the pool rejected the buffer; the
    /// transfer is recycled either way. [`Error::TransferTimeout`] means no
    /// completion arrived within the bound and is retryable.
    fn advance(&mut self, publish: &mut dyn FnMut(&[u8]) -> bool) -> Result<()>;

    /// Cancel outstanding transfers and release per-transfer resources.
    fn finalize(&mut self);
}

/// Completion status reported by an event-loop transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Transfer finished and its buffer holds valid data.
    Completed,
    /// Transfer finished with an error status.
    Failed,
}

/// One finished transfer, as delivered by an event-loop transport.
#[derive(Debug)]
pub struct TransferEvent {
    /// Slot the transfer belongs to; handed back on resubmission.
    pub slot: usize,
    pub status: TransferStatus,
    pub data: Vec<u8>,
}

/// Completion-wait backend.
///
/// Keeps `MAX_BUFFERS` transfer buffers in a fixed rotation; each
/// [`advance`](TransferBackend::advance) performs one bounded completion
/// wait into the next slot, publishes the result and re-arms the slot.
pub struct WaitBackend<T: Transport> {
    transport: T,
    slots: Vec<Box<[u8]>>,
    next: usize,
    timeout: Duration,
}

impl<T: Transport> WaitBackend<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        let slots = (0..MAX_BUFFERS)
            .map(|_| vec![0u8; BUFFER_SIZE].into_boxed_slice())
            .collect();
        Self {
            transport,
            slots,
            next: 0,
            timeout,
        }
    }
}

impl<T: Transport> TransferBackend for WaitBackend<T> {
    fn prime(&mut self) -> Result<()> {
        // Slot buffers are pre-allocated; the bounded wait in advance()
        // both arms and completes a transfer in one call.
        Ok(())
    }

    fn advance(&mut self, publish: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        let slot = self.next;
        let n = self.transport.read_transfer(&mut self.slots[slot], self.timeout)?;
        publish(&self.slots[slot][..n]);
        self.next = (slot + 1) % MAX_BUFFERS;
        Ok(())
    }

    fn finalize(&mut self) {
        self.transport.cancel_all();
        thread::sleep(CANCEL_SETTLE);
    }
}

/// Event-loop backend.
///
/// Completions arrive as [`TransferEvent`]s on a channel fed by the
/// transport's event loop; each processed event is published and its slot
/// resubmitted at once on the companion channel.
pub struct EventBackend {
    events: Receiver<TransferEvent>,
    submit: Sender<usize>,
    timeout: Duration,
}

impl EventBackend {
    pub fn new(events: Receiver<TransferEvent>, submit: Sender<usize>, timeout: Duration) -> Self {
        Self {
            events,
            submit,
            timeout,
        }
    }
}

impl TransferBackend for EventBackend {
    fn prime(&mut self) -> Result<()> {
        for slot in 0..MAX_BUFFERS {
            self.submit
                .send(slot)
                .map_err(|_| Error::Transport("event loop gone during initial submit".into()))?;
        }
        Ok(())
    }

    fn advance(&mut self, publish: &mut dyn FnMut(&[u8]) -> bool) -> Result<()> {
        let event = match self.events.recv_timeout(self.timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Err(Error::TransferTimeout),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Transport("transfer event loop terminated".into()))
            }
        };

        match event.status {
            TransferStatus::Completed => {
                publish(&event.data);
            }
            TransferStatus::Failed => warn!("bulk transfer failed in slot {}", event.slot),
        }

        // Resubmit regardless of status so the pipeline keeps its depth.
        if self.submit.send(event.slot).is_err() {
            debug!("resubmit of slot {} after event loop shutdown", event.slot);
        }
        Ok(())
    }

    fn finalize(&mut self) {
        // Drain events that completed after the stop signal; dropping the
        // backend closes both channels, which the event loop reads as
        // cancellation.
        while self.events.try_recv().is_ok() {}
    }
}
