//! Transport session
//!
//! Owns the serial port, runs write-then-wait exchanges and probes ports for a Copley amplifier.
//!
//! Session states:
//! `Closed -> Opening -> Probing -> Idle -> Closed`
//!
//! The port handle lives in the session and is dropped, closing it, on every path back to
//! `Closed`. There is no request id on the wire, so a response always belongs to the last write.
//! `exchange` takes `&mut self` and waits for its response before returning, which keeps
//! exchanges strictly serialized.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::commands;
use crate::config::LinkConfig;
use crate::copley_decoder::*;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{LinkError, Result};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

const READ_BUFFER_SIZE: usize = 512;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Port Seams
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Byte level access to an open serial link
pub trait Link: Send {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Bytes waiting in the receive buffer
    fn available(&mut self) -> io::Result<usize>;

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn discard_input(&mut self) -> io::Result<()>;
}

/// Source of serial ports: enumeration and opening
pub trait PortProvider {
    type Port: Link;

    fn port_names(&self) -> Result<Vec<String>>;

    fn open(&self, name: &str, config: &LinkConfig) -> Result<Self::Port>;
}

// ———————————————————————————————————————— System Ports ———————————————————————————————————————————

/// Real serial ports through `serialport`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortProvider for SystemPorts {
    type Port = Box<dyn SerialPort>;

    fn port_names(&self) -> Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(LinkError::Enumerate)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, name: &str, config: &LinkConfig) -> Result<Self::Port> {
        serialport::new(name, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.port_read_timeout)
            .open()
            .map_err(|source| LinkError::Open {
                port: name.to_string(),
                source,
            })
    }
}

impl Link for Box<dyn SerialPort> {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        Ok(self.clear(ClearBuffer::Input)?)
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          Cancellation
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Shared abort flag for a waiting exchange. Clones observe the same flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Session
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No port held
    Closed,
    /// Port acquired, not yet verified
    Opening,
    /// Ping sent, waiting for the signature
    Probing,
    /// Verified controller, ready for commands
    Idle,
}

pub struct Session<P: PortProvider> {
    provider:    P,
    config:      LinkConfig,
    port:        Option<P::Port>,
    port_name:   Option<String>,
    state:       SessionState,
    cancel:      CancelToken,
    diagnostics: Diagnostics,
}

impl<P: PortProvider> Session<P> {
    pub fn new(provider: P, config: LinkConfig) -> Self {
        Self {
            provider,
            config,
            port: None,
            port_name: None,
            state: SessionState::Closed,
            cancel: CancelToken::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    // ——————————————————————————————————————————— Accessors ———————————————————————————————————————

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Token checked by every poll of a waiting exchange
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Routes a failure found outside the session through the same sink
    pub fn report(&mut self, error: LinkError) {
        self.diagnostics.report(error);
    }

    // ——————————————————————————————————————————— Lifecycle ———————————————————————————————————————

    /// Opens and probes `port`, or scans every available port when `None`.
    ///
    /// Calling it again on a verified session is a no-op. On success latched faults are cleared.
    pub fn connect(&mut self, port: Option<&str>) -> bool {
        if self.state == SessionState::Idle {
            return true;
        }

        self.cancel.reset();

        let result = match port.filter(|p| !p.is_empty()) {
            Some(name) => self.try_port(name),
            None => self.discover(),
        };

        match result {
            Ok(()) => {
                self.state = SessionState::Idle;
                info!(port = ?self.port_name, "Copley controller connected");

                let timeout = self.config.response_timeout;
                self.exchange(&commands::clear_faults(), timeout);
                true
            }
            Err(e) => {
                self.release();
                self.diagnostics.report(e);
                false
            }
        }
    }

    /// Closes the port if open. Safe to call at any time.
    pub fn disconnect(&mut self) {
        if self.port.is_some() {
            info!(port = ?self.port_name, "Disconnecting");
        }
        self.release();
    }

    /// Live check: pings the controller instead of trusting the cached state
    pub fn is_connected(&mut self) -> bool {
        if self.port.is_none() {
            return false;
        }

        self.cancel.reset();

        match self.probe() {
            Ok(()) => true,
            Err(e) => {
                self.diagnostics.report(e);
                false
            }
        }
    }

    // ——————————————————————————————————————————— Exchange ————————————————————————————————————————

    /// Writes `packet` and waits up to `timeout` for the response.
    pub fn exchange(&mut self, packet: &Packet, timeout: Duration) -> Packet {
        let cancel = self.cancel.clone();
        self.exchange_until(packet, Instant::now() + timeout, &cancel)
    }

    /// Writes `packet` and waits for the response until `deadline` or until `cancel` fires.
    ///
    /// Without a port the packet comes straight back. A timeout, cancellation or I/O failure
    /// yields whatever was collected, decoded with the short read rule.
    pub fn exchange_until(&mut self, packet: &Packet, deadline: Instant, cancel: &CancelToken) -> Packet {
        if self.port.is_none() {
            return packet.clone();
        }

        self.diagnostics.record_exchange();

        let started = Instant::now();
        let mut received = Vec::<u8>::with_capacity(HEADER_LEN + WORD_LEN * 4);

        if let Err(e) = self.transfer(packet, deadline, cancel, &mut received) {
            self.diagnostics.report(e);
            return CopleyDecoder::decode(&received);
        }

        let response = CopleyDecoder::decode(&received);
        let complete = CopleyDecoder::expected_len(&received).is_some_and(|len| received.len() >= len);

        if !complete {
            self.diagnostics.report(LinkError::Timeout {
                waited_ms: started.elapsed().as_millis() as u64,
                received:  received.len(),
            });
        }
        else if !CopleyDecoder::checksum_valid(&response) {
            self.diagnostics.report(LinkError::Checksum { response: received });
        }
        else if response.error_code() != 0 {
            self.diagnostics.report(LinkError::Controller {
                code: response.error_code(),
            });
        }

        response
    }

    // ——————————————————————————————————————————— Internals ———————————————————————————————————————

    fn discover(&mut self) -> Result<()> {
        let names = self.provider.port_names()?;
        let scanned = names.len();

        for name in names {
            match self.try_port(&name) {
                Ok(()) => return Ok(()),
                Err(e) => self.diagnostics.report(e),
            }
        }

        Err(LinkError::NoControllerFound { scanned })
    }

    /// Open, flush and probe one port. Releases it again on any failure.
    fn try_port(&mut self, name: &str) -> Result<()> {
        debug!(port = name, "Probing port");
        self.state = SessionState::Opening;

        let result = self.open_and_probe(name);
        if result.is_err() {
            self.release();
        }
        result
    }

    fn open_and_probe(&mut self, name: &str) -> Result<()> {
        let mut port = self.provider.open(name, &self.config)?;
        port.discard_input()?;

        self.port = Some(port);
        self.port_name = Some(name.to_string());
        self.state = SessionState::Probing;

        self.probe()
    }

    fn probe(&mut self) -> Result<()> {
        let timeout = self.config.probe_timeout;
        let response = self.exchange(&commands::ping(), timeout);
        let bytes = response.to_bytes();

        if bytes == PING_SIGNATURE {
            return Ok(());
        }

        Err(LinkError::ProbeMismatch {
            port:     self.port_name.clone().unwrap_or_default(),
            response: bytes,
        })
    }

    /// Write, then poll until the announced response length is in, the deadline passes or the
    /// exchange is cancelled. Once the header is in, a poll interval without new bytes also ends
    /// the wait. Everything left in the receive buffer is drained at the end.
    ///
    /// Bytes collected before a failure stay in `received`.
    fn transfer(
        &mut self,
        packet: &Packet,
        deadline: Instant,
        cancel: &CancelToken,
        received: &mut Vec<u8>,
    ) -> Result<()> {
        let port = self.port.as_mut().ok_or(LinkError::NotConnected)?;
        let poll_interval = self.config.poll_interval;

        if cancel.is_cancelled() {
            return Err(LinkError::Cancelled);
        }

        debug!("TX {packet}");
        port.send(&packet.to_bytes())?;

        let mut raw_read = [0u8; READ_BUFFER_SIZE];
        let mut polled_after_header = false;

        'poll: loop {
            if cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }

            let read = read_available(port, received, &mut raw_read)?;

            match CopleyDecoder::expected_len(received) {
                Some(len) if received.len() >= len => break 'poll,
                // Header in but the body stalled for a whole poll interval
                Some(_) if read == 0 && polled_after_header => break 'poll,
                Some(_) => polled_after_header = true,
                None => {}
            }

            let now = Instant::now();
            if now >= deadline {
                break 'poll;
            }
            sleep(poll_interval.min(deadline - now));
        }

        // Drain whatever else already arrived
        while read_available(port, received, &mut raw_read)? > 0 {}

        debug!("RX {:02X?}", received);
        Ok(())
    }

    fn release(&mut self) {
        // Dropping the handle closes the port
        self.port = None;
        self.port_name = None;
        self.state = SessionState::Closed;
    }
}

/// Reads what the port reports as waiting. Returns the number of bytes appended.
fn read_available<L: Link>(port: &mut L, buffer: &mut Vec<u8>, raw_read: &mut [u8]) -> Result<usize> {
    let waiting = port.available()?;
    if waiting == 0 {
        return Ok(0);
    }

    let want = waiting.min(raw_read.len());
    match port.receive(&mut raw_read[..want]) {
        Ok(n) => {
            buffer.extend_from_slice(&raw_read[..n]);
            Ok(n)
        }
        // Timeout > Ignore
        Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
        Err(e) => Err(e.into()),
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulatedPorts;

    fn fast_config() -> LinkConfig {
        LinkConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_probe_timeout(Duration::from_millis(50))
            .with_response_timeout(Duration::from_millis(50))
    }

    #[test]
    fn closed_session_passes_packets_through() {
        let mut session = Session::new(SimulatedPorts::with_controller("SIM0"), fast_config());
        let ping = commands::ping();

        assert_eq!(session.exchange(&ping, Duration::from_millis(10)), ping);
        assert_eq!(session.diagnostics().exchanges, 0);
    }

    #[test]
    fn connect_by_name_reaches_idle() {
        let mut session = Session::new(SimulatedPorts::with_controller("SIM0"), fast_config());

        assert!(session.connect(Some("SIM0")));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.port_name(), Some("SIM0"));
    }

    #[test]
    fn unknown_port_fails_and_stays_closed() {
        let mut session = Session::new(SimulatedPorts::with_controller("SIM0"), fast_config());

        assert!(!session.connect(Some("NOPE")));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.diagnostics().port_errors, 1);
    }

    #[test]
    fn disconnect_is_safe_when_closed() {
        let mut session = Session::new(SimulatedPorts::with_controller("SIM0"), fast_config());
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_connected());
    }

    #[test]
    fn cancelled_exchange_yields_zero_packet() {
        let mut session = Session::new(SimulatedPorts::with_controller("SIM0"), fast_config());
        assert!(session.connect(Some("SIM0")));

        let token = CancelToken::new();
        token.cancel();

        let deadline = Instant::now() + Duration::from_secs(5);
        let response = session.exchange_until(&commands::read_position(Axis::X), deadline, &token);

        assert!(response.is_empty());
        assert_eq!(session.diagnostics().cancellations, 1);
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }
}
