//! Device handle: open/close lifecycle, the acquisition thread, and the
//! pull-based drain API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thread_priority::{set_current_thread_priority, ThreadPriority};
use tracing::{debug, info, warn};

use crate::backend::{TransferBackend, WaitBackend};
use crate::decode::{decode_buffer, SampleFormat};
use crate::error::{Error, Result};
use crate::pool::{self, Consumer, Producer};
use crate::transport::{Transport, UsbTransport, REQ_REG_READ};
use crate::{lut, MAX_CHANNELS};

/// Bound for a single bulk-transfer completion wait.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(3);

/// Acquisition configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// USB bus number to match, -1 for any.
    pub bus: i32,
    /// USB port number to match, -1 for any.
    pub port: i32,
    /// Ask the OS for real-time scheduling on the acquisition thread.
    /// Failure to elevate is logged, not fatal: capture proceeds at
    /// default priority with a higher risk of drops.
    pub request_realtime_priority: bool,
    /// Bound for a single completion wait.
    pub transfer_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: -1,
            port: -1,
            request_realtime_priority: true,
            transfer_timeout: TRANSFER_TIMEOUT,
        }
    }
}

/// Handle to an open capture device.
///
/// Owns the acquisition thread and the consumer side of the buffer pool.
/// [`Device::close`] (or dropping the handle) stops capture and releases
/// the transport; the handle is consumed, so use-after-close does not
/// compile.
pub struct Device {
    formats: [SampleFormat; MAX_CHANNELS],
    consumer: Consumer,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Device {
    /// Open a front-end device by bus and port number (-1 matches any),
    /// negotiate per-channel sample formats, and start capturing.
    ///
    /// The full transfer pipeline is in flight when this returns.
    pub fn open(bus: i32, port: i32) -> Result<Self> {
        Self::open_with_config(Config {
            bus,
            port,
            ..Config::default()
        })
    }

    /// Open with explicit configuration.
    pub fn open_with_config(cfg: Config) -> Result<Self> {
        let transport = UsbTransport::open(cfg.bus, cfg.port)?;
        Self::open_with_transport(transport, cfg)
    }

    /// Run the acquisition pipeline over any transport implementation.
    ///
    /// This is the seam simulated adapters plug into; [`Device::open`] uses
    /// it with the rusb transport.
    pub fn open_with_transport<T: Transport + 'static>(transport: T, cfg: Config) -> Result<Self> {
        let formats = negotiate_formats(&transport)?;
        let backend = WaitBackend::new(transport, cfg.transfer_timeout);
        Self::open_with_backend(Box::new(backend), formats, &cfg)
    }

    /// Start the pipeline over a pre-built backend with known formats.
    pub fn open_with_backend(
        mut backend: Box<dyn TransferBackend>,
        formats: [SampleFormat; MAX_CHANNELS],
        cfg: &Config,
    ) -> Result<Self> {
        // Warm the quantization table before the producer starts.
        lut::table();

        backend.prime()?;

        let (producer, consumer) = pool::pool();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let request_rt = cfg.request_realtime_priority;

        let thread = thread::Builder::new()
            .name("sigmag-acquire".into())
            .spawn(move || {
                if request_rt {
                    raise_priority();
                }
                acquisition_loop(backend, producer, thread_running);
            })
            .map_err(|e| Error::Transport(format!("failed to spawn acquisition thread: {e}")))?;

        info!(?formats, "capture started");
        Ok(Self {
            formats,
            consumer,
            running,
            thread: Some(thread),
        })
    }

    /// Negotiated per-channel sample formats.
    pub fn formats(&self) -> [SampleFormat; MAX_CHANNELS] {
        self.formats
    }

    /// Buffers captured but not yet drained.
    pub fn pending(&self) -> usize {
        self.consumer.pending()
    }

    /// Buffers dropped because the consumer fell behind.
    pub fn overflow_count(&self) -> u64 {
        self.consumer.overflow_count()
    }

    /// Drain all ready buffers, appending decoded samples per channel.
    ///
    /// Each raw buffer is decoded independently for both channels
    /// according to the formats negotiated at open. Returns the number of
    /// bytes appended to each channel, `[0, 0]` when no new data is
    /// available. Never blocks.
    pub fn drain(&mut self, out: &mut [Vec<i8>; MAX_CHANNELS]) -> [usize; MAX_CHANNELS] {
        let mut counts = [0usize; MAX_CHANNELS];
        let formats = self.formats;

        while self
            .consumer
            .pop_with(|raw| {
                for ch in 0..MAX_CHANNELS {
                    counts[ch] += decode_buffer(raw, ch, formats[ch], &mut out[ch]);
                }
            })
            .is_some()
        {}

        counts
    }

    /// Stop capture and release the device.
    ///
    /// Signals the acquisition thread and joins it; every wait inside the
    /// loop carries the configured transfer timeout, so the join is
    /// bounded. In-flight transfers are cancelled and allowed to settle
    /// before the transport is released.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("acquisition thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read the RF front end's quantization-enable field for each channel and
/// derive the per-channel sample format.
pub fn negotiate_formats<T: Transport>(transport: &T) -> Result<[SampleFormat; MAX_CHANNELS]> {
    let mut formats = [SampleFormat::I; MAX_CHANNELS];

    for (ch, fmt) in formats.iter_mut().enumerate() {
        let mut data = [0u8; 4];
        let value = ((ch as u16) << 8) | 0x01;
        let n = transport
            .control_read(REQ_REG_READ, value, 0, &mut data)
            .map_err(|e| Error::FormatNegotiation(format!("channel {ch} register read: {e}")))?;
        if n == 0 {
            return Err(Error::FormatNegotiation(format!(
                "channel {ch}: empty register response"
            )));
        }
        // ENIQ field of the front end's configuration register
        *fmt = if (data[0] >> 3) & 1 == 1 {
            SampleFormat::Iq
        } else {
            SampleFormat::I
        };
    }

    Ok(formats)
}

fn raise_priority() {
    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(()) => debug!("acquisition thread scheduling raised to maximum"),
        Err(e) => warn!("failed to raise acquisition thread priority: {e:?}"),
    }
}

/// Body of the acquisition thread: drive the transfer cycle and publish
/// every completion until told to stop, then let the backend cancel and
/// settle. Capture faults are logged and retried; the pipeline outlives
/// any single lost buffer.
fn acquisition_loop(
    mut backend: Box<dyn TransferBackend>,
    mut producer: Producer,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        match backend.advance(&mut |data| producer.push(data)) {
            Ok(()) => {}
            Err(Error::TransferTimeout) => warn!("bulk transfer timeout"),
            Err(e) => warn!("bulk transfer error: {e}"),
        }
    }

    backend.finalize();
    debug!(
        overflows = producer.overflow_count(),
        "acquisition thread stopped"
    );
}
