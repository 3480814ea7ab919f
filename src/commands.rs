//! Command catalog
//!
//! Ready to send packets for every operation the controller facade performs.
//! All builders are pure and address the local node, the axis lives in the identifier word.

use crate::copley_encoder::*;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Catalog
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Device discovery. Bare operating mode request, no payload.
pub fn ping() -> Packet {
    CopleyEncoder::create_packet(Opcode::OperatingMode)
}

pub fn set_trajectory_mode_absolute(axis: Axis) -> Packet {
    set_word(axis, variables::TRAJECTORY_PROFILE_MODE, PROFILE_ABSOLUTE)
}

pub fn turn_on_amplifier(axis: Axis) -> Packet {
    set_word(axis, variables::AMPLIFIER_STATE, AMPLIFIER_ENABLED)
}

pub fn turn_off_amplifier(axis: Axis) -> Packet {
    set_word(axis, variables::AMPLIFIER_STATE, AMPLIFIER_DISABLED)
}

pub fn start_homing(axis: Axis) -> Packet {
    trajectory(axis, variables::START_HOMING)
}

pub fn start_move(axis: Axis) -> Packet {
    trajectory(axis, variables::START_MOVE)
}

/// Response carries the actual position as 4 reversed bytes
pub fn read_position(axis: Axis) -> Packet {
    read_variable(axis, variables::ACTUAL_POSITION)
}

pub fn set_position(axis: Axis, position: i32) -> Packet {
    CopleyEncoder::create_variable_packet(
        axis.number(),
        Opcode::SetVariable,
        variables::POSITION_COMMAND,
        &CopleyEncoder::pack_i32(position),
    )
}

/// Writes ones to every bit of the latched fault register, which clears all latched faults.
/// Addressed to axis X, the register is shared by the drive.
pub fn clear_faults() -> Packet {
    CopleyEncoder::create_variable_packet(
        Axis::X.number(),
        Opcode::SetVariable,
        variables::LATCHED_FAULT_REGISTER,
        &[0xFF; 4],
    )
}

/// Get-variable request for an arbitrary variable number
pub fn read_variable(axis: Axis, number: u16) -> Packet {
    CopleyEncoder::create_variable_packet(axis.number(), Opcode::GetVariable, number, &[])
}

// ——————————————————————————————————————————— Helpers —————————————————————————————————————————————

fn set_word(axis: Axis, number: u16, value: u16) -> Packet {
    CopleyEncoder::create_variable_packet(
        axis.number(),
        Opcode::SetVariable,
        number,
        &CopleyEncoder::pack_u16(value),
    )
}

fn trajectory(axis: Axis, code: u16) -> Packet {
    CopleyEncoder::create_variable_packet(axis.number(), Opcode::TrajectoryCommand, code, &[])
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copley_decoder::CopleyDecoder;

    fn wire(packet: &Packet) -> Vec<u8> {
        CopleyEncoder::encode(packet)
    }

    #[test]
    fn ping_has_no_routing_and_no_payload() {
        assert_eq!(wire(&ping()), vec![0x00, 0x5D, 0x00, 0x07]);
    }

    #[test]
    fn amplifier_on_for_y() {
        // 0x24 | 1 << 13 = 0x2024, value 0x0015
        let p = turn_on_amplifier(Axis::Y);
        assert_eq!(p.opcode, Opcode::SetVariable as u8);
        assert_eq!(p.data, vec![0x20, 0x24, 0x00, 0x15]);
        assert_eq!(p.data_size, 2);
    }

    #[test]
    fn amplifier_off_and_absolute_mode_write_zero() {
        assert_eq!(turn_off_amplifier(Axis::X).data, vec![0x00, 0x24, 0x00, 0x00]);
        assert_eq!(set_trajectory_mode_absolute(Axis::X).data, vec![0x00, 0xC8, 0x00, 0x00]);
    }

    #[test]
    fn trajectory_commands_carry_only_the_identifier() {
        let home = start_homing(Axis::X);
        assert_eq!(home.opcode, Opcode::TrajectoryCommand as u8);
        assert_eq!(home.data, vec![0x00, 0x02]);

        let go = start_move(Axis::Y);
        assert_eq!(go.data, vec![0x20, 0x01]);
        assert_eq!(go.data_size, 1);
    }

    #[test]
    fn read_position_targets_actual_position() {
        let p = read_position(Axis::Y);
        assert_eq!(p.opcode, Opcode::GetVariable as u8);
        assert_eq!(p.data, vec![0x20, 0x17]);
    }

    #[test]
    fn set_position_reverses_value_bytes() {
        let p = set_position(Axis::X, 0x0102_0304);
        assert_eq!(&p.data[..2], &[0x00, 0xCA]);
        assert_eq!(&p.data[2..], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(CopleyDecoder::unpack_i32(&p.data[2..]), Some(0x0102_0304));
    }

    #[test]
    fn clear_faults_fills_every_value_byte() {
        let p = clear_faults();
        assert_eq!(p.data, vec![0x00, 0xA1, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(p.data_size, 3);
    }

    #[test]
    fn every_catalog_packet_has_a_valid_checksum() {
        let mut all = vec![ping(), clear_faults()];
        for axis in Axis::ALL {
            all.extend([
                set_trajectory_mode_absolute(axis),
                turn_on_amplifier(axis),
                turn_off_amplifier(axis),
                start_homing(axis),
                start_move(axis),
                read_position(axis),
                set_position(axis, -12_345),
            ]);
        }

        for packet in &all {
            assert_eq!(packet.node, LOCAL_NODE);
            assert!(CopleyDecoder::checksum_valid(packet), "{packet}");
        }
    }
}
