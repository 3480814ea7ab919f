pub use crate::copley_shared::*;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          Copley Encoder
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub struct CopleyEncoder;

impl CopleyEncoder {
    /// Wire bytes: `[node, checksum, size, opcode, ...data]`
    ///
    /// The packet is written as is. Use the builders below to get a consistent checksum and size.
    #[inline]
    pub fn encode(packet: &Packet) -> Vec<u8> {
        debug_assert!(packet.data.len() % WORD_LEN == 0, "Data must be whole words");
        debug_assert!(packet.data.len() / WORD_LEN == packet.data_size as usize, "Size mismatch");

        packet.to_bytes()
    }

    /// Checksum byte that brings the XOR of the whole packet to `CHECKSUM_RESULT`
    #[inline]
    pub fn checksum(node: u8, data_size: u8, opcode: u8, data: &[u8]) -> u8 {
        xor_bytes(data) ^ node ^ data_size ^ opcode ^ CHECKSUM_RESULT
    }

    /// Big endian identifier word, high byte first
    #[inline]
    pub fn pack_variable_identifier(axis: u8, number: u16) -> [u8; WORD_LEN] {
        VariableIdentifier::new(axis, number).word().to_be_bytes()
    }

    /// 32 bit value as carried in a payload.
    /// The amplifier wants the native little endian bytes reversed, i.e. high byte first.
    #[inline]
    pub fn pack_i32(value: i32) -> [u8; 4] {
        let mut bytes = value.to_le_bytes();
        bytes.reverse();
        bytes
    }

    #[inline]
    pub fn pack_u16(value: u16) -> [u8; WORD_LEN] {
        value.to_be_bytes()
    }

    // ——————————————————————————————————————————— Builders ————————————————————————————————————————

    /// Packet for the local node with size and checksum filled in
    pub fn create_data_packet(opcode: Opcode, data: &[u8]) -> Packet {
        assert!(data.len() <= MAX_DATA_LEN, "Data larger than packet");
        assert!(data.len() % WORD_LEN == 0, "Data must be whole words");

        let data_size = (data.len() / WORD_LEN) as u8;
        let opcode = opcode as u8;

        Packet {
            node: LOCAL_NODE,
            checksum: Self::checksum(LOCAL_NODE, data_size, opcode, data),
            data_size,
            opcode,
            data: data.to_vec(),
        }
    }

    /// Opcode only, no payload
    #[inline]
    pub fn create_packet(opcode: Opcode) -> Packet {
        Self::create_data_packet(opcode, &[])
    }

    /// Identifier word followed by `value`
    pub fn create_variable_packet(axis: u8, opcode: Opcode, number: u16, value: &[u8]) -> Packet {
        let mut data = Vec::with_capacity(WORD_LEN + value.len());
        data.extend_from_slice(&Self::pack_variable_identifier(axis, number));
        data.extend_from_slice(value);

        Self::create_data_packet(opcode, &data)
    }
}

#[inline]
pub fn xor_bytes(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
