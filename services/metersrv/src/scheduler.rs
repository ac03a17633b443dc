//! Poll request scheduler
//!
//! Polled instruments answer only when asked; the scheduler paces the poll
//! command. It is armed only for kinds that have a poll command.

use std::time::Duration;

use crate::ticker::Ticker;

/// Poll period
pub const POLL_PERIOD: Duration = Duration::from_millis(1000);

#[derive(Debug)]
pub struct RequestScheduler {
    ticker: Ticker,
    command: Option<&'static [u8]>,
    sent: u64,
}

impl RequestScheduler {
    pub fn new(command: Option<&'static [u8]>) -> Self {
        Self::with_period(command, POLL_PERIOD)
    }

    pub fn with_period(command: Option<&'static [u8]>, period: Duration) -> Self {
        Self {
            ticker: Ticker::new(period),
            command,
            sent: 0,
        }
    }

    /// Arm the timer; returns false when there is nothing to poll
    pub fn start(&mut self) -> bool {
        if self.command.is_none() {
            return false;
        }
        self.ticker.start();
        true
    }

    pub fn stop(&mut self) {
        self.ticker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub async fn tick(&mut self) {
        self.ticker.tick().await
    }

    pub fn command(&self) -> Option<&'static [u8]> {
        self.command
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    /// Poll commands written since creation
    pub fn sent(&self) -> u64 {
        self.sent
    }
}
