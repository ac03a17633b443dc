//! Shared helpers for metersrv integration tests

#![allow(dead_code)]

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use metersrv::transport::{MockTransport, MockTransportHandle};
use metersrv::{Device, DeviceConfig, DeviceEvent, DeviceHandle, DeviceKind, DeviceSnapshot};

/// Holdpeak frame decoding to 1234 V
pub const FRAME_1234_VOLT: [u8; 14] = [
    0x10, 0x20, 0x35, 0x45, 0x5B, 0x61, 0x7F, 0x82, 0x97, 0xA0, 0xB0, 0xC0, 0xD4, 0xE0,
];

/// A spawned device wired to a mock transport
pub struct TestDevice {
    pub handle: DeviceHandle,
    pub port: MockTransportHandle,
    pub events: mpsc::UnboundedReceiver<DeviceEvent>,
    pub task: JoinHandle<DeviceSnapshot>,
}

pub fn spawn_device(kind: DeviceKind) -> TestDevice {
    let (transport, port) = MockTransport::new();
    let (tx, events) = mpsc::unbounded_channel();
    let config = DeviceConfig {
        kind,
        port: "/dev/ttyTEST0".to_string(),
        name: "Test".to_string(),
    };
    let (handle, task) = Device::new(config, transport, tx).spawn();

    TestDevice {
        handle,
        port,
        events,
        task,
    }
}

impl TestDevice {
    /// Next event, panicking if the loop has gone away
    pub async fn next_event(&mut self) -> DeviceEvent {
        self.events.recv().await.expect("device loop exited")
    }

    /// Next status text, skipping measurements
    pub async fn next_status(&mut self) -> &'static str {
        loop {
            if let Some(status) = self.next_event().await.status() {
                return status.as_str();
            }
        }
    }
}
