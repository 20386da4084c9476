//! Decode engine: raw quantized capture buffers to per-channel signed
//! sample streams.

use crate::{lut, MAX_CHANNELS};

/// Per-channel sample format, negotiated with the RF front end at open.
///
/// Immutable for the life of a device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Full-precision passthrough. Only channel 0 can carry raw data;
    /// decoding a raw channel 1 produces nothing.
    Raw,
    /// I sampling: one 2-bit sample per channel per raw byte.
    I,
    /// I/Q sampling: 2-bit I and Q fields per channel per raw byte.
    Iq,
}

impl SampleFormat {
    /// Decoded bytes produced per raw byte.
    pub fn decoded_per_raw(self) -> usize {
        match self {
            SampleFormat::Raw | SampleFormat::I => 1,
            SampleFormat::Iq => 2,
        }
    }
}

/// Decode one raw capture buffer for `channel`, appending signed samples
/// to `out`.
///
/// Returns the number of bytes appended: `raw.len()` for [`SampleFormat::Raw`]
/// and [`SampleFormat::I`], `2 * raw.len()` for [`SampleFormat::Iq`] (I then
/// Q per raw byte), and 0 for raw data on a channel other than 0.
pub fn decode_buffer(raw: &[u8], channel: usize, format: SampleFormat, out: &mut Vec<i8>) -> usize {
    debug_assert!(channel < MAX_CHANNELS);
    let table = lut::table();

    match format {
        SampleFormat::Raw => {
            if channel != 0 {
                return 0;
            }
            out.extend(raw.iter().map(|&b| b as i8));
            raw.len()
        }
        SampleFormat::I => {
            let i_map = &table[channel][0];
            out.extend(raw.iter().map(|&b| i_map[b as usize]));
            raw.len()
        }
        SampleFormat::Iq => {
            let i_map = &table[channel][0];
            let q_map = &table[channel][1];
            out.reserve(raw.len() * 2);
            for &b in raw {
                out.push(i_map[b as usize]);
                out.push(q_map[b as usize]);
            }
            raw.len() * 2
        }
    }
}
