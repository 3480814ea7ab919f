//! Scripted serial link double
//!
//! Every write pops the next canned reply (or falls back to the default reply). Writes are
//! recorded, and a write issued while a reply is still unread counts as an overlap.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use copley_serial_link::copley_encoder::*;
use copley_serial_link::error::{LinkError, Result};
use copley_serial_link::{Link, LinkConfig, PortProvider};

#[derive(Debug, Default)]
pub struct ScriptState {
    pub replies:       VecDeque<Option<Vec<u8>>>,
    pub default_reply: Option<Vec<u8>>,
    pub writes:        Vec<Vec<u8>>,
    pub opens:         usize,
    pub overlaps:      usize,
    /// Once the receive buffer runs dry, `available` fails like an unplugged adapter
    pub fail_when_drained: bool,
    awaiting_read:     bool,
}

#[derive(Debug, Default, Clone)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.0.lock().unwrap()
    }

    pub fn reply(&self, bytes: Vec<u8>) -> &Self {
        self.state().replies.push_back(Some(bytes));
        self
    }

    pub fn silence(&self) -> &Self {
        self.state().replies.push_back(None);
        self
    }

    /// Ping signature then the clear-faults acknowledgement
    pub fn handshake(&self) -> &Self {
        self.reply(PING_SIGNATURE.to_vec()).reply(ack())
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }
}

pub struct ScriptedLink {
    script: Script,
    rx:     VecDeque<u8>,
}

impl Link for ScriptedLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.script.state();
        if state.awaiting_read {
            state.overlaps += 1;
        }
        state.writes.push(bytes.to_vec());

        let reply = state.replies.pop_front().unwrap_or_else(|| state.default_reply.clone());
        if let Some(reply) = reply {
            self.rx.extend(reply);
        }
        state.awaiting_read = !self.rx.is_empty();
        Ok(())
    }

    fn available(&mut self) -> io::Result<usize> {
        if self.rx.is_empty() && self.script.state().fail_when_drained {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "adapter unplugged"));
        }
        Ok(self.rx.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        if self.rx.is_empty() {
            self.script.state().awaiting_read = false;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}

/// One port named `COM7` wired to the script
#[derive(Clone)]
pub struct ScriptedPorts {
    pub script: Script,
}

pub const SCRIPTED_PORT: &str = "COM7";

impl PortProvider for ScriptedPorts {
    type Port = ScriptedLink;

    fn port_names(&self) -> Result<Vec<String>> {
        Ok(vec![SCRIPTED_PORT.to_string()])
    }

    fn open(&self, name: &str, _config: &LinkConfig) -> Result<Self::Port> {
        if name != SCRIPTED_PORT {
            return Err(LinkError::Open {
                port:   name.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "No such port"),
            });
        }
        self.script.state().opens += 1;
        Ok(ScriptedLink {
            script: self.script.clone(),
            rx:     VecDeque::new(),
        })
    }
}

// ——————————————————————————————————————————— Helpers —————————————————————————————————————————————

pub fn fast_config() -> LinkConfig {
    LinkConfig::default()
        .with_poll_interval(Duration::from_millis(1))
        .with_probe_timeout(Duration::from_millis(30))
        .with_response_timeout(Duration::from_millis(30))
}

/// Well formed reply carrying `data`
pub fn response(data: &[u8]) -> Vec<u8> {
    response_with_code(data, 0)
}

pub fn response_with_code(data: &[u8], code: u8) -> Vec<u8> {
    let size = (data.len() / WORD_LEN) as u8;
    let packet = Packet {
        node: LOCAL_NODE,
        checksum: CopleyEncoder::checksum(LOCAL_NODE, size, code, data),
        data_size: size,
        opcode: code,
        data: data.to_vec(),
    };
    packet.to_bytes()
}

/// Empty success reply
pub fn ack() -> Vec<u8> {
    response(&[])
}
