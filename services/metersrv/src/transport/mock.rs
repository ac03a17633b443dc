//! In-memory transport
//!
//! Stands in for the serial port in tests and dry runs. The paired
//! [`MockTransportHandle`] injects inbound chunks, records writes and makes
//! opens fail on demand.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::traits::{SerialSettings, Transport, TransportError, TransportStats};

#[derive(Debug)]
enum Inbound {
    Data(Vec<u8>),
    Error(TransportError),
}

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    fail_open: bool,
    fail_write: bool,
    /// Settings of every open call, successful or not
    opens: Vec<SerialSettings>,
    written: Vec<Vec<u8>>,
    stats: TransportStats,
}

/// In-memory transport implementation
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Test-side control of a [`MockTransport`]
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl MockTransport {
    pub fn new() -> (Self, MockTransportHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let (tx, rx) = mpsc::unbounded_channel();

        (
            Self {
                state: Arc::clone(&state),
                inbound: rx,
            },
            MockTransportHandle { state, inbound: tx },
        )
    }

    fn drain_inbound(&mut self) {
        let mut dropped = 0;
        while self.inbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("[Mock Transport] Dropped {} queued chunks on close", dropped);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "Mock Transport"
    }

    async fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.stats.record_open_attempt();
        state.opens.push(settings.clone());
        state.open = false;

        if state.fail_open {
            state.stats.record_open_failure();
            return Err(TransportError::ConnectionFailed(format!(
                "mock port {} unavailable",
                settings.port
            )));
        }

        state.open = true;
        state.stats.record_open_success();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let was_open = {
            let mut state = self.state.lock();
            let was_open = state.open;
            if was_open {
                state.open = false;
                state.stats.record_close();
            }
            was_open
        };
        if was_open {
            self.drain_inbound();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if state.fail_write {
            return Err(TransportError::SendFailed("mock write failure".to_string()));
        }
        state.written.push(data.to_vec());
        state.stats.record_bytes_sent(data.len());
        Ok(data.len())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }

        match self.inbound.recv().await {
            Some(Inbound::Data(chunk)) => {
                // Chunks larger than the buffer are truncated
                let len = chunk.len().min(buf.len());
                buf[..len].copy_from_slice(&chunk[..len]);
                self.state.lock().stats.record_bytes_received(len);
                Ok(len)
            },
            Some(Inbound::Error(e)) => Err(e),
            None => Err(TransportError::ConnectionLost(
                "mock handle dropped".to_string(),
            )),
        }
    }

    fn stats(&self) -> TransportStats {
        self.state.lock().stats.clone()
    }
}

impl MockTransportHandle {
    /// Queue one chunk, delivered by a single `read`
    pub fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
        let _ = self.inbound.send(Inbound::Data(chunk.into()));
    }

    /// Make the next `read` fail with `error`
    pub fn push_read_error(&self, error: TransportError) {
        let _ = self.inbound.send(Inbound::Error(error));
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.state.lock().fail_write = fail;
    }

    /// Every chunk written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Number of open calls, including failed ones
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    pub fn close_count(&self) -> u64 {
        self.state.lock().stats.closes
    }

    /// Settings passed to the most recent open
    pub fn last_settings(&self) -> Option<SerialSettings> {
        self.state.lock().opens.last().cloned()
    }
}
