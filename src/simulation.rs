//! Simulated Copley amplifier
//!
//! Answers binary protocol requests from an in-memory register file, and plugs into a
//! [`Session`](crate::transport::Session) through [`SimulatedPorts`]. Moves and homing complete
//! instantly.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::config::LinkConfig;
use crate::copley_decoder::CopleyDecoder;
use crate::copley_encoder::*;
use crate::error::{LinkError, Result};
use crate::transport::{Link, PortProvider};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Controller
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AxisRegisters {
    pub amplifier_state:  u16,
    pub profile_mode:     u16,
    pub position_command: i32,
    pub actual_position:  i32,
}

#[derive(Debug, Default)]
pub struct SimulatedController {
    axes:           [AxisRegisters; Axis::COUNT],
    latched_faults: u32,
    pending:        Vec<u8>,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registers(&self, axis: Axis) -> AxisRegisters {
        self.axes[axis.index()]
    }

    pub fn set_actual_position(&mut self, axis: Axis, position: i32) {
        self.axes[axis.index()].actual_position = position;
    }

    pub fn latched_faults(&self) -> u32 {
        self.latched_faults
    }

    pub fn latch_faults(&mut self, bits: u32) {
        self.latched_faults |= bits;
    }

    /// Accepts raw bytes from the host and returns the replies for every complete request.
    /// A partial request waits for the rest of its bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(bytes);

        let mut output = Vec::new();
        while let Some(len) = CopleyDecoder::expected_len(&self.pending) {
            if self.pending.len() < len {
                break;
            }

            let request: Vec<u8> = self.pending.drain(..len).collect();
            if let Some(reply) = self.respond(&CopleyDecoder::decode(&request)) {
                output.extend_from_slice(&reply);
            }
        }
        output
    }

    /// Reply to one request. Corrupt requests, other nodes and unknown variables get silence.
    pub fn respond(&mut self, request: &Packet) -> Option<Vec<u8>> {
        if !CopleyDecoder::checksum_valid(request) {
            debug!("SIM dropping corrupt request {request}");
            return None;
        }
        if request.node != LOCAL_NODE {
            return None;
        }

        let result = match Opcode::try_from(request.opcode).ok()? {
            Opcode::OperatingMode => CopleyEncoder::pack_u16(0).to_vec(),
            Opcode::GetVariable => {
                let id = Self::identifier(request)?;
                self.read(id)?
            }
            Opcode::SetVariable => {
                let id = Self::identifier(request)?;
                self.write(id, &request.data[WORD_LEN..])?;
                Vec::new()
            }
            Opcode::TrajectoryCommand => {
                let id = Self::identifier(request)?;
                self.trajectory(id)?;
                Vec::new()
            }
        };

        Some(Self::reply(&result))
    }

    fn identifier(request: &Packet) -> Option<VariableIdentifier> {
        let word = request.data.get(..WORD_LEN)?;
        Some(CopleyDecoder::unpack_variable_identifier([word[0], word[1]]))
    }

    fn axis_mut(&mut self, id: VariableIdentifier) -> Option<&mut AxisRegisters> {
        self.axes.get_mut(id.axis as usize)
    }

    fn read(&mut self, id: VariableIdentifier) -> Option<Vec<u8>> {
        let latched = self.latched_faults;
        let axis = self.axis_mut(id)?;

        let value = match id.number {
            variables::ACTUAL_POSITION => CopleyEncoder::pack_i32(axis.actual_position).to_vec(),
            variables::POSITION_COMMAND => CopleyEncoder::pack_i32(axis.position_command).to_vec(),
            variables::AMPLIFIER_STATE => CopleyEncoder::pack_u16(axis.amplifier_state).to_vec(),
            variables::TRAJECTORY_PROFILE_MODE => CopleyEncoder::pack_u16(axis.profile_mode).to_vec(),
            variables::LATCHED_FAULT_REGISTER => latched.to_be_bytes().to_vec(),
            _ => return None,
        };
        Some(value)
    }

    fn write(&mut self, id: VariableIdentifier, value: &[u8]) -> Option<()> {
        if id.number == variables::LATCHED_FAULT_REGISTER {
            // Writing a one clears that latched bit
            let bits = u32::from_be_bytes(value.try_into().ok()?);
            self.latched_faults &= !bits;
            return Some(());
        }

        let axis = self.axis_mut(id)?;
        match id.number {
            variables::POSITION_COMMAND => axis.position_command = CopleyDecoder::unpack_i32(value)?,
            variables::AMPLIFIER_STATE => axis.amplifier_state = CopleyDecoder::unpack_u16(value)?,
            variables::TRAJECTORY_PROFILE_MODE => axis.profile_mode = CopleyDecoder::unpack_u16(value)?,
            _ => return None,
        }
        Some(())
    }

    fn trajectory(&mut self, id: VariableIdentifier) -> Option<()> {
        let axis = self.axis_mut(id)?;
        match id.number {
            variables::START_MOVE => axis.actual_position = axis.position_command,
            variables::START_HOMING => {
                axis.actual_position = 0;
                axis.position_command = 0;
            }
            _ => return None,
        }
        Some(())
    }

    fn reply(result: &[u8]) -> Vec<u8> {
        let data_size = (result.len() / WORD_LEN) as u8;
        let packet = Packet {
            node: LOCAL_NODE,
            checksum: CopleyEncoder::checksum(LOCAL_NODE, data_size, 0, result),
            data_size,
            opcode: 0,
            data: result.to_vec(),
        };
        CopleyEncoder::encode(&packet)
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          Simulated Ports
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub type SharedController = Arc<Mutex<SimulatedController>>;

#[derive(Debug, Clone)]
pub enum SimulatedDevice {
    /// A Copley amplifier
    Controller(SharedController),
    /// Opens fine, never answers
    Silent,
    /// Open fails, e.g. access denied
    Unavailable,
}

#[derive(Debug)]
pub struct SimulatedPort {
    device: SimulatedDevice,
    rx:     VecDeque<u8>,
}

impl Link for SimulatedPort {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let SimulatedDevice::Controller(controller) = &self.device {
            let reply = lock(controller).feed(bytes);
            self.rx.extend(reply);
        }
        Ok(())
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(self.rx.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }
}

/// Named set of simulated ports, listed in insertion order
#[derive(Debug, Default, Clone)]
pub struct SimulatedPorts {
    ports: Vec<(String, SimulatedDevice)>,
    opens: Arc<AtomicUsize>,
}

impl SimulatedPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single port with a controller behind it
    pub fn with_controller(name: &str) -> Self {
        Self::new().add_controller(name)
    }

    pub fn add_controller(mut self, name: &str) -> Self {
        let controller = Arc::new(Mutex::new(SimulatedController::new()));
        self.ports.push((name.to_string(), SimulatedDevice::Controller(controller)));
        self
    }

    pub fn add_silent(mut self, name: &str) -> Self {
        self.ports.push((name.to_string(), SimulatedDevice::Silent));
        self
    }

    pub fn add_unavailable(mut self, name: &str) -> Self {
        self.ports.push((name.to_string(), SimulatedDevice::Unavailable));
        self
    }

    pub fn controller(&self, name: &str) -> Option<SharedController> {
        self.ports.iter().find_map(|(n, device)| match device {
            SimulatedDevice::Controller(c) if n == name => Some(c.clone()),
            _ => None,
        })
    }

    /// Successful opens so far, shared between clones
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl PortProvider for SimulatedPorts {
    type Port = SimulatedPort;

    fn port_names(&self) -> Result<Vec<String>> {
        Ok(self.ports.iter().map(|(name, _)| name.clone()).collect())
    }

    fn open(&self, name: &str, _config: &LinkConfig) -> Result<Self::Port> {
        let device = self
            .ports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, device)| device.clone());

        match device {
            Some(SimulatedDevice::Unavailable) => Err(LinkError::Open {
                port:   name.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "Access denied"),
            }),
            None => Err(LinkError::Open {
                port:   name.to_string(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "No such port"),
            }),
            Some(device) => {
                self.opens.fetch_add(1, Ordering::Relaxed);
                Ok(SimulatedPort {
                    device,
                    rx: VecDeque::new(),
                })
            }
        }
    }
}

pub fn lock(controller: &SharedController) -> MutexGuard<'_, SimulatedController> {
    controller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
