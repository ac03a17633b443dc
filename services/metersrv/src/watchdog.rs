//! Liveness watchdog
//!
//! The decoders report every valid inbound signal (a decoded frame or an
//! acknowledgment line) into a [`LivenessCounter`]. Every watchdog period the
//! device compares the counter with the value seen at the previous tick: any
//! advancement means the link is alive, none means the port gets cycled.

use std::time::Duration;

use crate::ticker::Ticker;

/// Watchdog period
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(5000);

/// Count of valid inbound signals plus the value sampled at the last tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessCounter {
    pub current: u64,
    pub last_tick: u64,
}

/// Outcome of one watchdog tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// The counter advanced since the previous tick
    Alive,
    /// No valid inbound signal during the whole period
    Expired,
}

impl LivenessCounter {
    pub fn record(&mut self, signals: u32) {
        self.current = self.current.wrapping_add(u64::from(signals));
    }

    /// Compare against the previous tick and remember the current value
    pub fn check(&mut self) -> WatchdogVerdict {
        if self.current != self.last_tick {
            self.last_tick = self.current;
            WatchdogVerdict::Alive
        } else {
            WatchdogVerdict::Expired
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counts kept across the device's lifetime, logged on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogStats {
    pub ticks: u64,
    pub expiries: u64,
    pub reconnects: u64,
    pub failed_reconnects: u64,
}

/// Watchdog timer plus liveness bookkeeping
#[derive(Debug)]
pub struct Watchdog {
    ticker: Ticker,
    counter: LivenessCounter,
    stats: WatchdogStats,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WATCHDOG_PERIOD)
    }
}

impl Watchdog {
    pub fn new(period: Duration) -> Self {
        Self {
            ticker: Ticker::new(period),
            counter: LivenessCounter::default(),
            stats: WatchdogStats::default(),
        }
    }

    /// Zero the counter and arm the timer
    pub fn start(&mut self) {
        self.counter.reset();
        self.ticker.start();
    }

    pub fn stop(&mut self) {
        self.ticker.stop();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    pub fn period(&self) -> Duration {
        self.ticker.period()
    }

    pub async fn tick(&mut self) {
        self.ticker.tick().await
    }

    pub fn record(&mut self, signals: u32) {
        self.counter.record(signals);
    }

    /// Evaluate one tick
    pub fn check(&mut self) -> WatchdogVerdict {
        self.stats.ticks += 1;
        let verdict = self.counter.check();
        if verdict == WatchdogVerdict::Expired {
            self.stats.expiries += 1;
        }
        verdict
    }

    pub fn record_reconnect(&mut self, success: bool) {
        if success {
            self.stats.reconnects += 1;
        } else {
            self.stats.failed_reconnects += 1;
        }
    }

    pub fn counter(&self) -> LivenessCounter {
        self.counter
    }

    pub fn stats(&self) -> WatchdogStats {
        self.stats
    }
}
