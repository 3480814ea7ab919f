//! Failure reporting
//!
//! Single sink for every failure on the link. Failures are logged, counted and handed to an
//! optional hook. The public facade contract stays silent either way.

use tracing::{debug, warn};

use crate::error::{FailureKind, LinkError};

pub type ErrorHook = Box<dyn Fn(&LinkError) + Send>;

/// Counters and the last failure message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub exchanges:         u64,
    pub port_errors:       u64,
    pub probe_failures:    u64,
    pub timeouts:          u64,
    pub checksum_failures: u64,
    pub length_errors:     u64,
    pub controller_errors: u64,
    pub cancellations:     u64,
    pub last_error:        Option<String>,
}

impl DiagnosticsSnapshot {
    pub fn failures(&self) -> u64 {
        self.port_errors
            + self.probe_failures
            + self.timeouts
            + self.checksum_failures
            + self.length_errors
            + self.controller_errors
            + self.cancellations
    }
}

#[derive(Default)]
pub struct Diagnostics {
    counters: DiagnosticsSnapshot,
    hook:     Option<ErrorHook>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hook(&mut self, hook: impl Fn(&LinkError) + Send + 'static) {
        self.hook = Some(Box::new(hook));
    }

    pub fn clear_hook(&mut self) {
        self.hook = None;
    }

    pub fn record_exchange(&mut self) {
        self.counters.exchanges += 1;
    }

    pub fn report(&mut self, error: LinkError) {
        let kind = error.kind();

        // Probing ports that are not ours is routine during discovery
        if kind == FailureKind::Probe {
            debug!(?kind, "{error}");
        }
        else {
            warn!(?kind, "{error}");
        }

        let counter = match kind {
            FailureKind::Port => &mut self.counters.port_errors,
            FailureKind::Probe => &mut self.counters.probe_failures,
            FailureKind::Timeout => &mut self.counters.timeouts,
            FailureKind::Checksum => &mut self.counters.checksum_failures,
            FailureKind::Length => &mut self.counters.length_errors,
            FailureKind::Controller => &mut self.counters.controller_errors,
            FailureKind::Cancelled => &mut self.counters.cancellations,
        };
        *counter += 1;

        self.counters.last_error = Some(error.to_string());

        if let Some(hook) = &self.hook {
            hook(&error);
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.counters.clone()
    }

    pub fn reset(&mut self) {
        self.counters = DiagnosticsSnapshot::default();
    }
}

impl core::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("counters", &self.counters)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
