//! Link configuration

use std::time::Duration;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub const BAUD_RATE: u32 = 9600;
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(2_000);
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const PORT_READ_TIMEOUT: Duration = Duration::from_millis(50);

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Link Config
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Serial settings and exchange timing.
///
/// Framing is fixed at 8 data bits, no parity, 1 stop bit, no flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub baud_rate:         u32,
    pub response_timeout:  Duration,
    pub probe_timeout:     Duration,
    pub poll_interval:     Duration,
    pub port_read_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate:         BAUD_RATE,
            response_timeout:  RESPONSE_TIMEOUT,
            probe_timeout:     PROBE_TIMEOUT,
            poll_interval:     POLL_INTERVAL,
            port_read_timeout: PORT_READ_TIMEOUT,
        }
    }
}

impl LinkConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Zero is bumped to 1 ms so the poll loop always yields
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Blocking limit of a single read on the serial handle
    pub fn with_port_read_timeout(mut self, timeout: Duration) -> Self {
        self.port_read_timeout = timeout;
        self
    }
}
