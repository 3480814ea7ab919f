//! Copley Binary Serial Link
//!
//! Drives a two axis Copley motor amplifier over RS-232 with the Copley binary protocol.
//!
//! Layers, leaves first:
//! - `copley_shared` / `copley_encoder` / `copley_decoder`: packet codec and XOR checksum
//! - `commands`: ready made packets for each operation
//! - `transport`: serial port lifecycle, probing and timed exchanges
//! - `controller`: the public operation set
//!
//! `simulation` provides an in-memory amplifier for tests and dry runs.

pub mod commands;
pub mod config;
pub mod controller;
pub mod copley_decoder;
pub mod copley_encoder;
pub mod copley_shared;
pub mod diagnostics;
pub mod error;
pub mod simulation;
pub mod stdio_helper;
pub mod transport;

pub use config::LinkConfig;
pub use controller::{ConnectionStatus, MotorController};
pub use copley_shared::{Axis, Packet};
pub use diagnostics::DiagnosticsSnapshot;
pub use error::{FailureKind, LinkError};
pub use transport::{CancelToken, Link, PortProvider, Session, SessionState, SystemPorts};
