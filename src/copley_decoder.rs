pub use crate::copley_shared::*;

use crate::copley_encoder::xor_bytes;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          Copley Decoder
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub struct CopleyDecoder;

impl CopleyDecoder {
    /// Rebuilds a packet from raw bytes read off the wire.
    ///
    /// Anything shorter than a header decodes to the zero packet, which callers treat as
    /// "no response". The declared size is not checked against the data length here.
    pub fn decode(bytes: &[u8]) -> Packet {
        if bytes.len() < HEADER_LEN {
            return Packet::default();
        }

        Packet {
            node:      bytes[0],
            checksum:  bytes[1],
            data_size: bytes[2],
            opcode:    bytes[3],
            data:      bytes[HEADER_LEN..].to_vec(),
        }
    }

    /// XOR of header and data must equal `CHECKSUM_RESULT`
    #[inline]
    pub fn checksum_valid(packet: &Packet) -> bool {
        let header = packet.node ^ packet.checksum ^ packet.data_size ^ packet.opcode;
        header ^ xor_bytes(&packet.data) == CHECKSUM_RESULT
    }

    /// Total length announced by a header, `None` until a full header is present
    #[inline]
    pub fn expected_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        Some(HEADER_LEN + bytes[2] as usize * WORD_LEN)
    }

    #[inline]
    pub fn unpack_variable_identifier(bytes: [u8; WORD_LEN]) -> VariableIdentifier {
        VariableIdentifier::from_word(u16::from_be_bytes(bytes))
    }

    /// Reverses the wire bytes back to native order. Needs exactly four bytes.
    pub fn unpack_i32(data: &[u8]) -> Option<i32> {
        let mut bytes: [u8; 4] = data.try_into().ok()?;
        bytes.reverse();
        Some(i32::from_le_bytes(bytes))
    }

    pub fn unpack_u16(data: &[u8]) -> Option<u16> {
        Some(u16::from_be_bytes(data.try_into().ok()?))
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
