//! Motor controller facade
//!
//! The operation set exposed to whatever drives the stage. Every operation is a short,
//! strictly ordered sequence of catalog packets pushed through the session.
//!
//! Failures never reach the caller. Commands degrade to no-ops, position reads fall back to the
//! last good value, and every failure lands in the session diagnostics.

use crate::commands;
use crate::config::LinkConfig;
use crate::copley_decoder::*;
use crate::diagnostics::DiagnosticsSnapshot;
use crate::error::LinkError;
use crate::transport::{CancelToken, PortProvider, Session, SessionState, SystemPorts};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                        Connection Status
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl From<SessionState> for ConnectionStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Closed => Self::Disconnected,
            SessionState::Opening | SessionState::Probing => Self::Connecting,
            SessionState::Idle => Self::Connected,
        }
    }
}

impl core::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                        Motor Controller
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub struct MotorController<P: PortProvider = SystemPorts> {
    session:    Session<P>,
    last_known: [i32; Axis::COUNT],
}

impl MotorController<SystemPorts> {
    /// Controller on the machine's real serial ports
    pub fn new(config: LinkConfig) -> Self {
        Self::with_provider(SystemPorts, config)
    }
}

impl<P: PortProvider> MotorController<P> {
    pub fn with_provider(provider: P, config: LinkConfig) -> Self {
        Self {
            session:    Session::new(provider, config),
            last_known: [0; Axis::COUNT],
        }
    }

    // ———————————————————————————————————————————— Link ———————————————————————————————————————————

    /// `None` or an empty name scans every available port
    pub fn connect(&mut self, port: Option<&str>) -> bool {
        self.session.connect(port)
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Pings the controller, costs a round trip
    pub fn is_connected(&mut self) -> bool {
        self.begin();
        self.session.is_connected()
    }

    /// Cached state, no I/O
    pub fn status(&self) -> ConnectionStatus {
        self.session.state().into()
    }

    // ——————————————————————————————————————————— Motion ——————————————————————————————————————————

    /// Absolute trajectory mode, amplifier on, then homing. Steps are not verified.
    pub fn initialize_axis(&mut self, axis: Axis) {
        self.begin();
        self.send(&commands::set_trajectory_mode_absolute(axis));
        self.send(&commands::turn_on_amplifier(axis));
        self.send(&commands::start_homing(axis));
    }

    pub fn disable_axis(&mut self, axis: Axis) {
        self.begin();
        self.send(&commands::turn_off_amplifier(axis));
    }

    /// Absolute move to `position` encoder counts
    pub fn move_axis(&mut self, axis: Axis, position: i32) {
        self.begin();
        self.send(&commands::set_trajectory_mode_absolute(axis));
        self.send(&commands::set_position(axis, position));
        self.send(&commands::start_move(axis));
    }

    /// Actual position in encoder counts.
    ///
    /// Returns the last good reading when the response is missing, corrupt or the wrong size.
    pub fn get_position(&mut self, axis: Axis) -> i32 {
        self.begin();
        let response = self.send(&commands::read_position(axis));

        // Error replies are already counted by the session
        if CopleyDecoder::checksum_valid(&response) && response.error_code() == 0 {
            match CopleyDecoder::unpack_i32(&response.data) {
                Some(position) => self.last_known[axis.index()] = position,
                None if self.status() == ConnectionStatus::Connected => {
                    self.session.report(LinkError::UnexpectedLength {
                        expected: 4,
                        got:      response.data.len(),
                    });
                }
                None => {}
            }
        }

        self.last_known[axis.index()]
    }

    pub fn clear_faults(&mut self) {
        self.begin();
        self.send(&commands::clear_faults());
    }

    pub fn last_known_position(&self, axis: Axis) -> i32 {
        self.last_known[axis.index()]
    }

    // ——————————————————————————————————————— Observability ———————————————————————————————————————

    /// Fire it from another thread to abort the exchange in flight.
    /// The flag clears at the start of the next operation.
    pub fn cancel_token(&self) -> CancelToken {
        self.session.cancel_token()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.session.diagnostics()
    }

    pub fn set_error_hook(&mut self, hook: impl Fn(&LinkError) + Send + 'static) {
        self.session.diagnostics_mut().set_hook(hook);
    }

    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    // ——————————————————————————————————————————— Internals ———————————————————————————————————————

    fn begin(&mut self) {
        self.session.cancel_token().reset();
    }

    fn send(&mut self, packet: &Packet) -> Packet {
        if self.status() == ConnectionStatus::Disconnected {
            self.session.report(LinkError::NotConnected);
        }

        let timeout = self.session.config().response_timeout;
        self.session.exchange(packet, timeout)
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
