//! Transport layer
//!
//! The device talks to hardware only through [`Transport`]. The serial
//! implementation is used by the binary; the mock implementation backs the
//! tests.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::{MockTransport, MockTransportHandle};
pub use serial::SerialTransport;
pub use traits::{SerialSettings, Transport, TransportError, TransportStats};
