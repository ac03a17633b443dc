//! metersrv basic library
//!
//! Provides the functions shared by the service binary and its tests:
//! - logging functions
//! - startup banner and bootstrap helpers
//! - shutdown signal handling

pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use logging::LogConfig;
pub use service_bootstrap::ServiceInfo;
