// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                       Copley Binary Protocol
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Copley Binary Serial Interface
///
/// Point to point RS-232 command/response protocol used by Copley motor amplifiers.
/// No framing markers, no length prefix, no CRC. Packet boundaries come from read timing.
/// Integrity is a single XOR checksum over the whole packet.
///
/// Packet Structure:
/// [NODE:1][CHECKSUM:1][SIZE:1][OPCODE:1]
/// [NODE:1][CHECKSUM:1][SIZE:1][OPCODE:1][DATA:SIZE*2]
///
/// In responses the opcode byte carries the controller error code (0 on success).
///
pub const HEADER_LEN: usize = 4;
pub const WORD_LEN: usize = 2;

/// XOR of every byte of a valid packet, checksum byte included
pub const CHECKSUM_RESULT: u8 = 0x5A;

/// Node byte for the directly connected amplifier
pub const LOCAL_NODE: u8 = 0x00;

pub const MAX_DATA_WORDS: usize = u8::MAX as usize;
pub const MAX_DATA_LEN: usize = MAX_DATA_WORDS * WORD_LEN;
pub const MAX_PACKET_SIZE: usize = HEADER_LEN + MAX_DATA_LEN;

/// Reply to a ping from a Copley amplifier: operating mode word 0x0000, error code 0
pub const PING_SIGNATURE: [u8; 6] = [0x00, 0x5B, 0x01, 0x00, 0x00, 0x00];

// ——————————————————————————————————————————— Opcodes —————————————————————————————————————————————

/// Command opcodes used by this link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    OperatingMode     = 0x07,
    GetVariable       = 0x0C,
    SetVariable       = 0x0D,
    TrajectoryCommand = 0x11,
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> core::result::Result<Self, <Opcode as TryFrom<u8>>::Error> {
        match value {
            v if v == Self::OperatingMode as u8 => Ok(Self::OperatingMode),
            v if v == Self::GetVariable as u8 => Ok(Self::GetVariable),
            v if v == Self::SetVariable as u8 => Ok(Self::SetVariable),
            v if v == Self::TrajectoryCommand as u8 => Ok(Self::TrajectoryCommand),
            _ => Err(()),
        }
    }
}

// —————————————————————————————————————————— Variables ————————————————————————————————————————————

/// Variable numbers and trajectory sub-commands addressed through the identifier word
pub mod variables {
    pub const LATCHED_FAULT_REGISTER: u16 = 0xA1;
    pub const TRAJECTORY_PROFILE_MODE: u16 = 0xC8;
    pub const POSITION_COMMAND: u16 = 0xCA;
    pub const AMPLIFIER_STATE: u16 = 0x24;
    pub const ACTUAL_POSITION: u16 = 0x17;

    // Trajectory command codes
    pub const START_MOVE: u16 = 0x01;
    pub const START_HOMING: u16 = 0x02;
}

/// Amplifier state value: servo mode, position loop driven by the trajectory generator
pub const AMPLIFIER_ENABLED: u16 = 0x0015;
pub const AMPLIFIER_DISABLED: u16 = 0x0000;

/// Trajectory profile mode value for absolute trapezoidal moves
pub const PROFILE_ABSOLUTE: u16 = 0x0000;

// ———————————————————————————————————————————— Axis ———————————————————————————————————————————————

/// Motion channels on a single amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];
    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub fn number(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Axis {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::X),
            1 => Ok(Self::Y),
            _ => Err(()),
        }
    }
}

impl core::str::FromStr for Axis {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" | "0" => Ok(Self::X),
            "y" | "1" => Ok(Self::Y),
            _ => Err(()),
        }
    }
}

impl core::fmt::Display for Axis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Y => write!(f, "Y"),
        }
    }
}

// ———————————————————————————————————— Variable Identifier ————————————————————————————————————————

/// 16 bit variable identifier word
///
///  Bits    Description
///  0-8     Variable number
///  9-11    Unused, zero
///  12      Bank (always active bank, zero)
///  13-15   Axis number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableIdentifier {
    pub axis:   u8,
    pub number: u16,
}

pub const VARIABLE_NUMBER_MASK: u16 = 0x01FF;
pub const AXIS_SHIFT: u32 = 13;
pub const AXIS_MASK: u16 = 0x07;

impl VariableIdentifier {
    pub fn new(axis: u8, number: u16) -> Self {
        Self {
            axis:   axis & AXIS_MASK as u8,
            number: number & VARIABLE_NUMBER_MASK,
        }
    }

    #[inline]
    pub fn word(&self) -> u16 {
        (self.number & VARIABLE_NUMBER_MASK) | ((self.axis as u16 & AXIS_MASK) << AXIS_SHIFT)
    }

    #[inline]
    pub fn from_word(word: u16) -> Self {
        Self {
            axis:   ((word >> AXIS_SHIFT) & AXIS_MASK) as u8,
            number: word & VARIABLE_NUMBER_MASK,
        }
    }
}

// ——————————————————————————————————————————— Packet ——————————————————————————————————————————————

/// Wire packet
///
/// `data_size` counts 16 bit words and is kept consistent by the builders in the encoder.
/// The decoder stores whatever came off the wire.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Packet {
    pub node:      u8,
    pub checksum:  u8,
    pub data_size: u8,
    pub opcode:    u8,
    pub data:      Vec<u8>,
}

impl Packet {
    /// Length on the wire
    #[inline]
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }

    /// Header then data, exactly as held. No consistency checks.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.extend_from_slice(&[self.node, self.checksum, self.data_size, self.opcode]);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// A decoded short read, or nothing at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Response error code. Only meaningful on packets read back from the amplifier.
    #[inline]
    pub fn error_code(&self) -> u8 {
        self.opcode
    }
}

impl core::fmt::Display for Packet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X}",
            self.node, self.checksum, self.data_size, self.opcode
        )?;
        for b in &self.data {
            write!(f, " {b:02X}")?;
        }
        Ok(())
    }
}
