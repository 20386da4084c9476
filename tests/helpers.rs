//! Test doubles for the acquisition pipeline: a scripted control/bulk
//! transport and a simulated event-loop adapter.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::bounded;
use sigmag::backend::{EventBackend, TransferEvent, TransferStatus};
use sigmag::transport::Transport;
use sigmag::{Error, Result, MAX_BUFFERS};

/// Register byte with the ENIQ bit set (I/Q sampling).
pub const REG_IQ: u8 = 0x08;
/// Register byte with the ENIQ bit clear (I sampling).
pub const REG_I: u8 = 0x00;

/// Route pipeline logs to the test harness; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted transport: vendor register reads answer from a fixed table,
/// bulk completions replay a queue of canned buffers. Once the queue is
/// empty every completion wait times out, like a bus gone quiet.
pub struct MockTransport {
    regs: [u8; 2],
    transfers: VecDeque<Vec<u8>>,
    control_failure: bool,
}

impl MockTransport {
    pub fn new(regs: [u8; 2]) -> Self {
        Self {
            regs,
            transfers: VecDeque::new(),
            control_failure: false,
        }
    }

    /// Queue canned bulk transfers, completed in order.
    pub fn with_transfers(mut self, transfers: Vec<Vec<u8>>) -> Self {
        self.transfers = transfers.into();
        self
    }

    /// Make every control request fail.
    pub fn failing_control(mut self) -> Self {
        self.control_failure = true;
        self
    }
}

impl Transport for MockTransport {
    fn control_read(&self, _request: u8, value: u16, _index: u16, buf: &mut [u8]) -> Result<usize> {
        if self.control_failure {
            return Err(Error::Transport("control endpoint stalled".into()));
        }
        let ch = (value >> 8) as usize;
        buf[0] = self.regs[ch];
        for b in &mut buf[1..] {
            *b = 0;
        }
        Ok(buf.len().min(4))
    }

    fn read_transfer(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.transfers.pop_front() {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => {
                thread::sleep(timeout);
                Err(Error::TransferTimeout)
            }
        }
    }

    fn cancel_all(&mut self) {}
}

/// Build an [`EventBackend`] wired to a simulated event loop.
///
/// The loop completes each submitted slot with the next scripted
/// `(status, data)` entry; once the script runs dry, submitted transfers
/// stay in flight forever. The loop thread exits when the backend (and
/// with it the submit channel) is dropped.
pub fn scripted_event_backend(
    script: Vec<(TransferStatus, Vec<u8>)>,
    timeout: Duration,
) -> (EventBackend, JoinHandle<()>) {
    let (event_tx, event_rx) = bounded::<TransferEvent>(MAX_BUFFERS * 2);
    let (submit_tx, submit_rx) = bounded::<usize>(MAX_BUFFERS * 2);

    let driver = thread::spawn(move || {
        let mut script = script.into_iter();
        while let Ok(slot) = submit_rx.recv() {
            match script.next() {
                Some((status, data)) => {
                    if event_tx.send(TransferEvent { slot, status, data }).is_err() {
                        break;
                    }
                }
                None => {
                    // Transfer never completes; the backend's bounded wait
                    // covers this slot from here on.
                }
            }
        }
    });

    (EventBackend::new(event_rx, submit_tx, timeout), driver)
}
