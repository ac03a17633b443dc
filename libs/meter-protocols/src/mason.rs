//! Mason power-supply protocol
//!
//! The supply answers every `GETD\r` poll with a CR-terminated line and
//! acknowledges commands with `OK\r`. A reading line is nine characters long;
//! characters 4..8 hold the output current as `DD.DD` amperes.

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::constants::{ACK_LINE, LINE_DELIMITER, MAX_LINE_BUFFER, READING_LINE_LEN};
use crate::decoder::DecodeOutput;
use crate::measurement::{Measurement, Unit};

/// Stream decoder for Mason lines
#[derive(Debug, Default)]
pub struct MasonDecoder {
    buffer: BytesMut,
}

impl MasonDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64),
        }
    }

    /// Append a chunk and consume every complete line in the buffer
    pub fn push(&mut self, chunk: &[u8]) -> DecodeOutput {
        let mut output = DecodeOutput::default();
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == LINE_DELIMITER) {
            let line = self.buffer.split_to(pos + 1);
            let line = &line[..pos];
            debug!("[Mason] Line: {:?}", String::from_utf8_lossy(line));

            if line == ACK_LINE {
                output.liveness += 1;
            } else if let Some(measurement) = parse_reading(line) {
                output.measurements.push(measurement);
            } else {
                trace!("[Mason] Ignored line of {} bytes", line.len());
            }
        }

        if self.buffer.len() > MAX_LINE_BUFFER {
            debug!(
                "[Mason] Discarding {} bytes without delimiter",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        output
    }

    /// Drop any partial line
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Interpret a reading line
///
/// Characters 4..8 are reported as `"CC.CC"` whatever they contain. When
/// they do not form a number `value` is NaN and the reading is still emitted.
pub fn parse_reading(line: &[u8]) -> Option<Measurement> {
    if line.len() != READING_LINE_LEN {
        return None;
    }

    let field = &line[4..8];
    let reading = format!(
        "{}{}.{}{}",
        field[0] as char, field[1] as char, field[2] as char, field[3] as char
    );
    let value = reading.trim().parse::<f32>().unwrap_or(f32::NAN);

    Some(Measurement::with_reading(value, reading, Unit::Ampere))
}
