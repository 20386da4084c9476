//! Pure-Rust acquisition driver for 2-bit sign-magnitude USB SDR front ends.
//!
//! # Overview
//!
//! `sigmag` owns a USB capture device and keeps a pipeline of bulk
//! transfers in flight on a dedicated real-time acquisition thread. Filled
//! transfers land in a bounded lock-free buffer pool; the application
//! drains the pool at its own pace and receives per-channel streams of
//! signed samples. The producer never blocks on the consumer: a slow
//! consumer costs dropped buffers, never a desynchronized sample clock.
//!
//! # Sample Format
//!
//! The front end packs both RF channels into each byte as 2-bit
//! sign-magnitude fields (`00→+1`, `01→+3`, `10→-1`, `11→-3`). Channel 0
//! occupies the low nibble (I then Q), channel 1 the high nibble. Whether a
//! channel carries I-only or I/Q samples is read from the RF front-end chip
//! when the device is opened.
//!
//! # Example
//!
//! ```no_run
//! use sigmag::Device;
//!
//! let mut device = Device::open(-1, -1)?;
//! let mut out = [Vec::new(), Vec::new()];
//! let counts = device.drain(&mut out);
//! println!("decoded {} / {} bytes", counts[0], counts[1]);
//! device.close();
//! # Ok::<(), sigmag::Error>(())
//! ```

pub mod backend;
pub mod decode;
pub mod device;
pub mod error;
mod lut;
pub mod pool;
pub mod transport;

pub use backend::{EventBackend, TransferBackend, TransferEvent, TransferStatus, WaitBackend};
pub use decode::SampleFormat;
pub use device::{Config, Device};
pub use error::{Error, Result};
pub use transport::{Transport, UsbTransport};

// Front-end device identifiers (USB VID/PID)
pub const DEVICE_VID: u16 = 0x04b4;
pub const DEVICE_PID: u16 = 0x1004;

/// Bulk IN endpoint carrying the digitized sample stream.
pub const BULK_EP: u8 = 0x86;

/// Number of RF channels the front end digitizes.
pub const MAX_CHANNELS: usize = 2;

/// Depth of the transfer pipeline. The buffer pool holds at most
/// `MAX_BUFFERS - 1` ready buffers.
pub const MAX_BUFFERS: usize = 16;

/// Size of a single bulk transfer in bytes.
pub const BUFFER_SIZE: usize = 1 << 16;
