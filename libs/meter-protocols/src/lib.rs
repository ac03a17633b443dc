//! Meter Protocol Implementations
//!
//! Decoders for the two serial instrument families supported by metersrv:
//!
//! - `holdpeak` - binary, nibble-framed multimeter protocol (Holdpeak HP-90EPC, 2400 baud)
//! - `mason` - ASCII, CR-delimited power-supply protocol (Mason HCS-3302, 9600 baud)
//!
//! # Architecture
//!
//! ```text
//! transport bytes ──► Decoder ──┬─► HoldpeakDecoder ──► calculate_value()
//!                               │
//!                               └─► MasonDecoder (CR-delimited lines)
//!                                        │
//!                                        ▼
//!                           DecodeOutput { liveness, measurements }
//! ```
//!
//! The decoders never fail: malformed input is dropped and the only
//! observable effect is the absence of liveness signals.

pub mod constants;
pub mod decoder;
pub mod hex;
pub mod holdpeak;
pub mod kind;
pub mod mason;
pub mod measurement;

pub use decoder::{DecodeOutput, Decoder};
pub use holdpeak::{calculate_value, HoldpeakDecoder};
pub use kind::{DeviceKind, ProtocolError};
pub use mason::MasonDecoder;
pub use measurement::{format_reading, Measurement, Unit};
