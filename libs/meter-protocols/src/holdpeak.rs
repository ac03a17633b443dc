//! Holdpeak multimeter protocol
//!
//! The meter streams 14-byte frames. Every byte carries its position tag in
//! the high nibble (0x1_ for the first byte up to 0xE_ for the last) and
//! LCD segment bits in the low nibble:
//!
//! ```text
//! byte:   0     1..8                 9      10     11    12     13
//!        [1x] [digit segment pairs] [µ]    [m]    [..]  [unit] [Ex]
//!              bit3 of byte 1 = sign, bit3 of bytes 3/5/7 = decimal point
//! ```
//!
//! Frames are decoded by [`calculate_value`]; [`HoldpeakDecoder`] finds the
//! frame boundaries in the raw byte stream.

use tracing::{debug, trace};

use crate::constants::{
    FRAME_END_TAG, FRAME_START_TAG, HOLDPEAK_FRAME_LEN, MAX_FRAME_BUFFER, NIBBLE_TAG_MASK,
};
use crate::decoder::DecodeOutput;
use crate::hex;
use crate::measurement::{Measurement, Unit};

/// Segment patterns of the digits 0-9 as `(high & 0x07, low & 0x0F)` pairs
pub const DIGIT_SEGMENTS: [(u8, u8); 10] = [
    (0x7, 0x0D),
    (0x0, 0x05),
    (0x5, 0x0B),
    (0x1, 0x0F),
    (0x2, 0x07),
    (0x3, 0x0E),
    (0x7, 0x0E),
    (0x1, 0x05),
    (0x7, 0x0F),
    (0x3, 0x0F),
];

/// Byte offsets of the first byte of each digit pair, most significant first
const DIGIT_OFFSETS: [usize; 4] = [1, 3, 5, 7];

const FLAG_BIT: u8 = 0x08;
const VOLT_BIT: u8 = 0x04;

/// Map a segment pair to its digit. Unrecognized patterns (blank, "L", ...) read as 0.
pub fn digit_from_segments(high: u8, low: u8) -> u8 {
    DIGIT_SEGMENTS
        .iter()
        .position(|&pair| pair == (high & 0x07, low & 0x0F))
        .map(|d| d as u8)
        .unwrap_or(0)
}

/// Decode one complete frame
///
/// Returns `None` unless the frame is exactly 14 bytes long. The scaling
/// flags are applied independently, so a frame with several decimal-point
/// or range bits set is divided by each of them in turn.
pub fn calculate_value(frame: &[u8]) -> Option<Measurement> {
    if frame.len() != HOLDPEAK_FRAME_LEN {
        return None;
    }

    let mut value: f32 = 0.0;
    for offset in DIGIT_OFFSETS {
        let digit = digit_from_segments(frame[offset], frame[offset + 1]);
        value = value * 10.0 + f32::from(digit);
    }

    if frame[1] & FLAG_BIT != 0 {
        value = -value;
    }

    // Decimal point
    if frame[3] & FLAG_BIT != 0 {
        value /= 1000.0;
    }
    if frame[5] & FLAG_BIT != 0 {
        value /= 100.0;
    }
    if frame[7] & FLAG_BIT != 0 {
        value /= 10.0;
    }

    // Range prefix: milli, then micro
    if frame[10] & FLAG_BIT != 0 {
        value /= 1000.0;
    }
    if frame[9] & FLAG_BIT != 0 {
        value /= 1000.0;
    }

    let unit = if frame[12] & FLAG_BIT != 0 {
        Unit::Ampere
    } else if frame[12] & VOLT_BIT != 0 {
        Unit::Volt
    } else {
        Unit::Unknown
    };

    Some(Measurement::new(value, unit))
}

/// Stream decoder for Holdpeak frames
///
/// Only the first frame completed within a chunk is decoded; bytes after its
/// end marker are dropped together with any further frames in that chunk.
#[derive(Debug, Default)]
pub struct HoldpeakDecoder {
    frame: Vec<u8>,
    last: Option<Measurement>,
}

impl HoldpeakDecoder {
    pub fn new() -> Self {
        Self {
            frame: Vec::with_capacity(HOLDPEAK_FRAME_LEN),
            last: None,
        }
    }

    /// Feed one chunk as delivered by the transport
    pub fn push(&mut self, chunk: &[u8]) -> DecodeOutput {
        let mut output = DecodeOutput::default();

        for (index, &byte) in chunk.iter().enumerate() {
            match byte & NIBBLE_TAG_MASK {
                FRAME_START_TAG => {
                    self.frame.clear();
                    self.frame.push(byte);
                },
                FRAME_END_TAG => {
                    self.frame.push(byte);
                    debug!(
                        hex_data = %hex::encode_upper(&self.frame),
                        length = self.frame.len(),
                        "[Holdpeak] Raw frame"
                    );

                    if let Some(measurement) = calculate_value(&self.frame) {
                        output.liveness += 1;
                        debug!("[Holdpeak] Value received: {}", measurement);

                        if self.last.as_ref() != Some(&measurement) {
                            self.last = Some(measurement.clone());
                            output.measurements.push(measurement);
                        }
                    }
                    self.frame.clear();

                    let dropped = chunk.len() - index - 1;
                    if dropped > 0 {
                        trace!("[Holdpeak] Dropped {} bytes after end marker", dropped);
                    }
                    break;
                },
                _ => {
                    self.frame.push(byte);
                    if self.frame.len() > MAX_FRAME_BUFFER {
                        debug!(
                            "[Holdpeak] Discarding {} bytes without end marker",
                            self.frame.len()
                        );
                        self.frame.clear();
                    }
                },
            }
        }

        output
    }

    /// Drop the in-progress frame
    pub fn clear_buffer(&mut self) {
        self.frame.clear();
    }

    /// Drop the in-progress frame and forget the last emitted value
    pub fn reset(&mut self) {
        self.frame.clear();
        self.last = None;
    }

    pub fn last_value(&self) -> Option<&Measurement> {
        self.last.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.frame.len()
    }
}
