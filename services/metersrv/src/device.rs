//! Device orchestration
//!
//! A [`Device`] owns one transport, one decoder, the liveness watchdog and,
//! for polled instruments, the request scheduler. It is driven by a single
//! task: [`Device::run`] selects over control commands, inbound data and both
//! timers, and every handler runs to completion before the next selection,
//! so none of the state needs locking.
//!
//! ```text
//! DeviceHandle ──commands──► run() ──► start / stop / on / off
//!                              │
//!             transport.read() ├──► handle_data() ──► Decoder ──► DeviceEvent::Measurement
//!             watchdog tick    ├──► handle_watchdog_tick() ──► close + reopen on silence
//!             poll tick        └──► handle_poll_tick() ──► write poll command
//! ```

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use meter_protocols::{Decoder, DeviceKind};

use crate::config::DeviceConfig;
use crate::error::{MeterSrvError, Result};
use crate::events::{ConnectionState, DeviceEvent, DeviceStatus};
use crate::scheduler::RequestScheduler;
use crate::transport::{SerialSettings, Transport, TransportError, TransportStats};
use crate::watchdog::{LivenessCounter, Watchdog, WatchdogStats, WatchdogVerdict};

/// Size of a single transport read
const READ_CHUNK_SIZE: usize = 256;

/// Depth of the control command queue
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Control commands accepted by the device loop
#[derive(Debug)]
pub enum DeviceCommand {
    Start,
    Stop,
    On,
    Off,
    Snapshot(oneshot::Sender<DeviceSnapshot>),
    Shutdown,
}

/// Point-in-time view of a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub state: ConnectionState,
    pub running: bool,
    pub liveness: LivenessCounter,
    pub transport: TransportStats,
    pub watchdog: WatchdogStats,
    pub polls_sent: u64,
}

enum Activity {
    Data(std::result::Result<usize, TransportError>),
    WatchdogTick,
    PollTick,
}

/// One instrument connection
#[derive(Debug)]
pub struct Device<T: Transport> {
    config: DeviceConfig,
    settings: SerialSettings,
    transport: T,
    decoder: Decoder,
    watchdog: Watchdog,
    scheduler: RequestScheduler,
    state: ConnectionState,
    running: bool,
    events: mpsc::UnboundedSender<DeviceEvent>,
    read_buf: Vec<u8>,
}

impl<T: Transport> Device<T> {
    pub fn new(config: DeviceConfig, transport: T, events: mpsc::UnboundedSender<DeviceEvent>) -> Self {
        let settings = SerialSettings::for_device(&config);
        let decoder = Decoder::for_kind(config.kind);
        let scheduler = RequestScheduler::new(config.kind.poll_command());

        Self {
            config,
            settings,
            transport,
            decoder,
            watchdog: Watchdog::default(),
            scheduler,
            state: ConnectionState::Stopped,
            running: false,
            events,
            read_buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn kind(&self) -> DeviceKind {
        self.config.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn liveness(&self) -> LivenessCounter {
        self.watchdog.counter()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            state: self.state,
            running: self.running,
            liveness: self.watchdog.counter(),
            transport: self.transport.stats(),
            watchdog: self.watchdog.stats(),
            polls_sent: self.scheduler.sent(),
        }
    }

    fn emit(&self, event: DeviceEvent) {
        // A consumer that went away is not the device's problem
        let _ = self.events.send(event);
    }

    fn emit_status(&self, status: DeviceStatus) {
        debug!("[{}] Status: {}", self.config.name, status);
        self.emit(DeviceEvent::Status(status));
    }

    /// Open the port and arm the timers
    ///
    /// An open failure is reported as status "error" and left to the watchdog.
    pub async fn start(&mut self) {
        if self.running {
            warn!("[{}] Already started, ignoring start", self.config.name);
            return;
        }
        self.running = true;
        self.decoder.reset();

        info!(
            "[{}] Starting {} on {} @ {} baud",
            self.config.name,
            self.config.kind,
            self.settings.port,
            self.settings.baud_rate
        );

        match self.transport.open(&self.settings).await {
            Ok(()) => {
                self.state = ConnectionState::Started;
                self.emit_status(DeviceStatus::Started);
            },
            Err(e) => {
                error!("[{}] Failed to open {}: {}", self.config.name, self.settings.port, e);
                self.state = ConnectionState::Error;
                self.emit_status(DeviceStatus::Error);
            },
        }

        if self.scheduler.start() {
            debug!("[{}] Poll scheduler started", self.config.name);
        }
        self.watchdog.start();
    }

    /// Detach both timers, then close the port
    pub async fn stop(&mut self) {
        self.emit_status(DeviceStatus::Stopped);
        self.scheduler.stop();
        self.watchdog.stop();

        if let Err(e) = self.transport.close().await {
            warn!("[{}] Failed to close {}: {}", self.config.name, self.settings.port, e);
        }

        self.state = ConnectionState::Stopped;
        if self.running {
            info!("[{}] Stopped", self.config.name);
        }
        self.running = false;
    }

    /// Switch the supply output on; no-op for kinds without power control
    pub async fn on(&mut self) {
        self.send_power_command(self.config.kind.power_on_command(), "on")
            .await
    }

    /// Switch the supply output off; no-op for kinds without power control
    pub async fn off(&mut self) {
        self.send_power_command(self.config.kind.power_off_command(), "off")
            .await
    }

    async fn send_power_command(&mut self, command: Option<&'static [u8]>, label: &str) {
        let Some(command) = command else {
            debug!(
                "[{}] {} has no power control, ignoring {}",
                self.config.name, self.config.kind, label
            );
            return;
        };

        match self.transport.write(command).await {
            Ok(_) => info!("[{}] Output {}", self.config.name, label),
            Err(e) => warn!("[{}] Failed to switch output {}: {}", self.config.name, label, e),
        }
    }

    /// Feed one inbound chunk to the decoder
    pub fn handle_data(&mut self, chunk: &[u8]) {
        let output = self.decoder.push(chunk);
        self.watchdog.record(output.liveness);

        for measurement in output.measurements {
            debug!("[{}] Measurement: {}", self.config.name, measurement);
            self.emit(DeviceEvent::Measurement(measurement));
        }
    }

    /// Evaluate liveness and cycle the port after a silent period
    ///
    /// A port closed by a read error is reopened on this tick even if data
    /// arrived before the error.
    pub async fn handle_watchdog_tick(&mut self) {
        match self.watchdog.check() {
            WatchdogVerdict::Alive if self.transport.is_open() => {
                self.state = ConnectionState::Started;
                self.emit_status(DeviceStatus::Started);
                return;
            },
            WatchdogVerdict::Alive => {
                warn!(
                    "[{}] Port closed after read error, reopening {}",
                    self.config.name, self.settings.port
                );
            },
            WatchdogVerdict::Expired => {
                warn!(
                    "[{}] No data within {:?}, reopening {}",
                    self.config.name,
                    self.watchdog.period(),
                    self.settings.port
                );
            },
        }

        self.reconnect().await;
    }

    async fn reconnect(&mut self) {
        if self.transport.is_open() {
            if let Err(e) = self.transport.close().await {
                warn!("[{}] Failed to close {}: {}", self.config.name, self.settings.port, e);
            }
        }
        self.decoder.clear_buffer();

        match self.transport.open(&self.settings).await {
            Ok(()) => {
                self.watchdog.record_reconnect(true);
                self.state = ConnectionState::Reconnecting;
                self.emit_status(DeviceStatus::Reconnect);
            },
            Err(e) => {
                error!("[{}] Reconnect failed: {}", self.config.name, e);
                self.watchdog.record_reconnect(false);
                self.state = ConnectionState::Error;
                self.emit_status(DeviceStatus::Error);
            },
        }
    }

    /// Write the poll command if the port is open
    pub async fn handle_poll_tick(&mut self) {
        let Some(command) = self.scheduler.command() else {
            return;
        };
        if !self.transport.is_open() {
            debug!("[{}] Port closed, skipping poll", self.config.name);
            return;
        }

        match self.transport.write(command).await {
            Ok(_) => self.scheduler.record_sent(),
            Err(e) => warn!("[{}] Poll write failed: {}", self.config.name, e),
        }
    }

    async fn handle_read_result(&mut self, result: std::result::Result<usize, TransportError>) {
        let result = match result {
            Ok(0) => Err(TransportError::ConnectionLost("end of stream".to_string())),
            other => other,
        };

        match result {
            Ok(n) => {
                let chunk = self.read_buf[..n].to_vec();
                self.handle_data(&chunk);
            },
            Err(e) => {
                // The watchdog reopens the port on its next tick
                warn!("[{}] Read failed: {}, closing {}", self.config.name, e, self.settings.port);
                if let Err(e) = self.transport.close().await {
                    warn!("[{}] Failed to close {}: {}", self.config.name, self.settings.port, e);
                }
            },
        }
    }

    async fn next_activity(&mut self) -> Activity {
        let Self {
            transport,
            read_buf,
            watchdog,
            scheduler,
            ..
        } = self;

        let read = async {
            if transport.is_open() {
                transport.read(read_buf).await
            } else {
                std::future::pending().await
            }
        };

        tokio::select! {
            biased;
            result = read => Activity::Data(result),
            _ = watchdog.tick() => Activity::WatchdogTick,
            _ = scheduler.tick() => Activity::PollTick,
        }
    }

    async fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Start => self.start().await,
            DeviceCommand::Stop => self.stop().await,
            DeviceCommand::On => self.on().await,
            DeviceCommand::Off => self.off().await,
            DeviceCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            },
            // Handled by the loop
            DeviceCommand::Shutdown => {},
        }
    }

    /// Drive the device until shutdown or until every handle is dropped
    ///
    /// A running device is stopped before the loop exits.
    pub async fn run(mut self, mut commands: mpsc::Receiver<DeviceCommand>) -> DeviceSnapshot {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(DeviceCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                activity = self.next_activity() => match activity {
                    Activity::Data(result) => self.handle_read_result(result).await,
                    Activity::WatchdogTick => self.handle_watchdog_tick().await,
                    Activity::PollTick => self.handle_poll_tick().await,
                },
            }
        }

        if self.running {
            self.stop().await;
        }
        debug!("[{}] Device loop exited", self.config.name);
        self.snapshot()
    }
}

impl<T: Transport + 'static> Device<T> {
    /// Move the device onto its own task
    pub fn spawn(self) -> (DeviceHandle, JoinHandle<DeviceSnapshot>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let task = tokio::spawn(self.run(rx));
        (DeviceHandle { commands: tx }, task)
    }
}

/// Control handle for a spawned device
///
/// Dropping every handle stops the device and ends its task.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    commands: mpsc::Sender<DeviceCommand>,
}

impl DeviceHandle {
    async fn send(&self, command: DeviceCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MeterSrvError::state("device loop has exited"))
    }

    pub async fn start(&self) -> Result<()> {
        self.send(DeviceCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(DeviceCommand::Stop).await
    }

    pub async fn on(&self) -> Result<()> {
        self.send(DeviceCommand::On).await
    }

    pub async fn off(&self) -> Result<()> {
        self.send(DeviceCommand::Off).await
    }

    pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(DeviceCommand::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| MeterSrvError::state("device loop dropped the snapshot request"))
    }

    /// Stop the device if running and end its task
    pub async fn shutdown(&self) -> Result<()> {
        self.send(DeviceCommand::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, MockTransportHandle};
    use meter_protocols::Unit;
    use tracing_test::traced_test;

    const FRAME_1234_VOLT: [u8; 14] = [
        0x10, 0x20, 0x35, 0x45, 0x5B, 0x61, 0x7F, 0x82, 0x97, 0xA0, 0xB0, 0xC0, 0xD4, 0xE0,
    ];

    fn device(
        kind: DeviceKind,
    ) -> (
        Device<MockTransport>,
        MockTransportHandle,
        mpsc::UnboundedReceiver<DeviceEvent>,
    ) {
        let (transport, handle) = MockTransport::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let config = DeviceConfig {
            kind,
            port: "/dev/ttyUSB0".to_string(),
            name: "Bench".to_string(),
        };
        (Device::new(config, transport, tx), handle, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DeviceEvent>) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn statuses(events: &[DeviceEvent]) -> Vec<&'static str> {
        events
            .iter()
            .filter_map(|e| e.status())
            .map(|s| s.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_start_holdpeak() {
        let (mut device, handle, mut rx) = device(DeviceKind::Holdpeak);
        device.start().await;

        assert_eq!(device.state(), ConnectionState::Started);
        assert_eq!(statuses(&drain(&mut rx)), vec!["started"]);

        let settings = handle.last_settings().unwrap();
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 2400);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, 1);
        assert_eq!(settings.parity, "None");

        assert!(device.watchdog.is_running());
        assert!(!device.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_start_mason_arms_scheduler() {
        let (mut device, handle, _rx) = device(DeviceKind::Mason);
        device.start().await;

        assert_eq!(handle.last_settings().unwrap().baud_rate, 9600);
        assert!(device.scheduler.is_running());
        assert!(device.watchdog.is_running());
    }

    #[tokio::test]
    async fn test_start_open_failure() {
        let (mut device, handle, mut rx) = device(DeviceKind::Mason);
        handle.set_fail_open(true);
        device.start().await;

        assert_eq!(device.state(), ConnectionState::Error);
        assert_eq!(statuses(&drain(&mut rx)), vec!["error"]);
        // Recovery is left to the timers
        assert!(device.scheduler.is_running());
        assert!(device.watchdog.is_running());
    }

    #[tokio::test]
    async fn test_second_start_ignored() {
        let (mut device, handle, mut rx) = device(DeviceKind::Holdpeak);
        device.start().await;
        device.start().await;

        assert_eq!(handle.open_count(), 1);
        assert_eq!(statuses(&drain(&mut rx)), vec!["started"]);
    }

    #[tokio::test]
    async fn test_stop() {
        let (mut device, handle, mut rx) = device(DeviceKind::Mason);
        device.start().await;
        device.stop().await;

        assert_eq!(device.state(), ConnectionState::Stopped);
        assert!(!device.is_running());
        assert!(!handle.is_open());
        assert!(!device.scheduler.is_running());
        assert!(!device.watchdog.is_running());
        assert_eq!(statuses(&drain(&mut rx)), vec!["started", "stopped"]);
    }

    #[tokio::test]
    async fn test_power_commands() {
        let (mut device, handle, _rx) = device(DeviceKind::Mason);
        device.start().await;
        device.on().await;
        device.off().await;
        assert_eq!(handle.written(), vec![b"SOUT0\r".to_vec(), b"SOUT1\r".to_vec()]);

        let (mut device, handle, _rx) = self::device(DeviceKind::Holdpeak);
        device.start().await;
        device.on().await;
        device.off().await;
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_holdpeak_dedup() {
        let (mut device, _handle, mut rx) = device(DeviceKind::Holdpeak);
        device.start().await;
        drain(&mut rx);

        device.handle_data(&FRAME_1234_VOLT);
        device.handle_data(&FRAME_1234_VOLT);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        let measurement = events[0].measurement().unwrap();
        assert_eq!(measurement.reading, "1234");
        assert_eq!(measurement.unit, Unit::Volt);

        // Both frames count as liveness
        assert_eq!(device.liveness().current, 2);
    }

    #[tokio::test]
    async fn test_mason_lines() {
        let (mut device, _handle, mut rx) = device(DeviceKind::Mason);
        device.start().await;
        drain(&mut rx);

        device.handle_data(b"OK\r138012340\r138012340\r");

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].measurement().unwrap().reading, "12.34");
        assert_eq!(events[1].measurement().unwrap().unit, Unit::Ampere);
        assert_eq!(device.liveness().current, 1);
    }

    #[tokio::test]
    async fn test_watchdog_alive() {
        let (mut device, handle, mut rx) = device(DeviceKind::Mason);
        device.start().await;
        drain(&mut rx);

        device.handle_data(b"OK\r");
        device.handle_watchdog_tick().await;

        assert_eq!(device.state(), ConnectionState::Started);
        assert_eq!(statuses(&drain(&mut rx)), vec!["started"]);
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 0);
        assert_eq!(device.liveness().last_tick, 1);
    }

    #[tokio::test]
    async fn test_watchdog_expired_reconnects() {
        let (mut device, handle, mut rx) = device(DeviceKind::Holdpeak);
        device.start().await;
        drain(&mut rx);

        // Half a frame is pending when the period runs out
        device.handle_data(&FRAME_1234_VOLT[..6]);
        device.handle_watchdog_tick().await;

        assert_eq!(device.state(), ConnectionState::Reconnecting);
        assert_eq!(statuses(&drain(&mut rx)), vec!["reconnect"]);
        assert_eq!(handle.close_count(), 1);
        assert_eq!(handle.open_count(), 2);
        assert_eq!(device.decoder.pending_len(), 0);
        assert_eq!(handle.last_settings().unwrap().baud_rate, 2400);
    }

    #[tokio::test]
    async fn test_watchdog_expired_reopen_fails() {
        let (mut device, handle, mut rx) = device(DeviceKind::Mason);
        device.start().await;
        drain(&mut rx);

        handle.set_fail_open(true);
        device.handle_watchdog_tick().await;
        assert_eq!(device.state(), ConnectionState::Error);

        // Closed port: nothing to close, reopen is still attempted
        device.handle_watchdog_tick().await;
        assert_eq!(device.state(), ConnectionState::Error);
        assert_eq!(statuses(&drain(&mut rx)), vec!["error", "error"]);
        assert_eq!(handle.open_count(), 3);
        assert_eq!(handle.close_count(), 1);
        assert_eq!(device.snapshot().watchdog.failed_reconnects, 2);
    }

    #[tokio::test]
    async fn test_poll_tick() {
        let (mut device, handle, _rx) = device(DeviceKind::Mason);
        handle.set_fail_open(true);
        device.start().await;

        device.handle_poll_tick().await;
        assert!(handle.written().is_empty());

        handle.set_fail_open(false);
        device.handle_watchdog_tick().await;
        device.handle_poll_tick().await;
        assert_eq!(handle.written(), vec![b"GETD\r".to_vec()]);
        assert_eq!(device.snapshot().polls_sent, 1);
    }

    #[tokio::test]
    async fn test_read_error_closes_port() {
        let (mut device, handle, _rx) = device(DeviceKind::Holdpeak);
        device.start().await;

        device
            .handle_read_result(Err(TransportError::ReceiveFailed("overrun".to_string())))
            .await;
        assert!(!handle.is_open());
        assert_eq!(device.state(), ConnectionState::Started);
    }

    #[tokio::test]
    async fn test_repeated_stop() {
        let (mut device, handle, _rx) = device(DeviceKind::Mason);
        device.start().await;
        device.stop().await;

        assert!(!device.watchdog.is_running());
        assert!(!handle.is_open());
        // Stopping again only repeats the status
        device.stop().await;
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_read_error_after_data_reopens_on_next_tick() {
        let (mut device, handle, mut rx) = device(DeviceKind::Holdpeak);
        device.start().await;
        device.handle_data(&FRAME_1234_VOLT);
        drain(&mut rx);

        device
            .handle_read_result(Err(TransportError::ConnectionLost("unplugged".to_string())))
            .await;
        device.handle_watchdog_tick().await;

        assert_eq!(device.state(), ConnectionState::Reconnecting);
        assert_eq!(statuses(&drain(&mut rx)), vec!["reconnect"]);
        assert!(handle.is_open());
        assert_eq!(handle.open_count(), 2);
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test]
    async fn test_power_command_write_failure() {
        let (mut device, handle, mut rx) = device(DeviceKind::Mason);
        device.start().await;
        drain(&mut rx);

        handle.set_fail_write(true);
        device.on().await;
        device.off().await;

        assert!(handle.written().is_empty());
        assert_eq!(device.state(), ConnectionState::Started);
        assert!(drain(&mut rx).is_empty());

        handle.set_fail_write(false);
        device.on().await;
        assert_eq!(handle.written(), vec![b"SOUT0\r".to_vec()]);
    }

    #[tokio::test]
    async fn test_poll_write_failure_not_counted() {
        let (mut device, handle, _rx) = device(DeviceKind::Mason);
        device.start().await;

        device.handle_poll_tick().await;
        assert_eq!(device.snapshot().polls_sent, 1);

        handle.set_fail_write(true);
        device.handle_poll_tick().await;
        device.handle_poll_tick().await;
        assert_eq!(device.snapshot().polls_sent, 1);
        assert_eq!(handle.written(), vec![b"GETD\r".to_vec()]);
        // A failed write leaves the port to the watchdog
        assert!(handle.is_open());
        assert!(device.scheduler.is_running());

        handle.set_fail_write(false);
        device.handle_poll_tick().await;
        assert_eq!(device.snapshot().polls_sent, 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_poll_write_failure_logged() {
        let (mut device, handle, _rx) = device(DeviceKind::Mason);
        device.start().await;
        handle.set_fail_write(true);
        device.handle_poll_tick().await;

        assert!(logs_contain("Poll write failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_watchdog_expiry_logged() {
        let (mut device, _handle, _rx) = device(DeviceKind::Holdpeak);
        device.start().await;
        device.handle_watchdog_tick().await;

        assert!(logs_contain("No data within"));
        assert!(logs_contain("/dev/ttyUSB0"));
    }
}
