//! Decoder strategy selected from the configured device kind

use crate::holdpeak::HoldpeakDecoder;
use crate::kind::DeviceKind;
use crate::mason::MasonDecoder;
use crate::measurement::Measurement;

/// Result of feeding one chunk to a decoder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOutput {
    /// Number of valid inbound signals (decoded frames or acknowledgment lines)
    pub liveness: u32,
    /// Measurements to emit, in arrival order
    pub measurements: Vec<Measurement>,
}

/// Protocol decoder for one device
#[derive(Debug)]
pub enum Decoder {
    Holdpeak(HoldpeakDecoder),
    Mason(MasonDecoder),
}

impl Decoder {
    pub fn for_kind(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Holdpeak => Decoder::Holdpeak(HoldpeakDecoder::new()),
            DeviceKind::Mason => Decoder::Mason(MasonDecoder::new()),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Decoder::Holdpeak(_) => DeviceKind::Holdpeak,
            Decoder::Mason(_) => DeviceKind::Mason,
        }
    }

    /// Feed one chunk exactly as it was read from the transport
    pub fn push(&mut self, chunk: &[u8]) -> DecodeOutput {
        match self {
            Decoder::Holdpeak(decoder) => decoder.push(chunk),
            Decoder::Mason(decoder) => decoder.push(chunk),
        }
    }

    /// Discard partially received frame/line data
    pub fn clear_buffer(&mut self) {
        match self {
            Decoder::Holdpeak(decoder) => decoder.clear_buffer(),
            Decoder::Mason(decoder) => decoder.clear_buffer(),
        }
    }

    /// Return to the freshly started state
    pub fn reset(&mut self) {
        match self {
            Decoder::Holdpeak(decoder) => decoder.reset(),
            Decoder::Mason(decoder) => decoder.clear_buffer(),
        }
    }

    pub fn pending_len(&self) -> usize {
        match self {
            Decoder::Holdpeak(decoder) => decoder.pending_len(),
            Decoder::Mason(decoder) => decoder.pending_len(),
        }
    }
}
