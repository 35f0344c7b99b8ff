//! The fixed 32-bit instruction layout shared by the compiler and the
//! execution engine: `{opcode:8, flags:8, immediate:16}`.

use super::opcode::VMOpcode;

bitflags::bitflags! {
    /// Per-instruction modifier bits.
    ///
    /// Only `SIGNED` is assigned today (it tells a comparison or shift
    /// handler to treat its operands as signed 32-bit values rather than
    /// unsigned). The remaining seven bits are reserved: an emitter MUST
    /// write them as zero, and the engine MAY ignore them if it finds
    /// them set anyway.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstructionFlags: u8 {
        /// Treat operands as signed 32-bit values.
        const SIGNED = 0b0000_0001;
    }
}

/// A single decoded VM instruction.
///
/// `Instruction` is a value type: encoding and decoding never fail on a
/// well-formed 32-bit word (the opcode byte is validated separately by
/// [`VMOpcode::decode`], since an `Instruction` may be constructed from a
/// byte whose opcode is not yet known to be valid — that check belongs to
/// the engine's fetch step, not to the encoding itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Raw opcode byte. Validate with [`VMOpcode::decode`] before dispatch.
    pub opcode: u8,
    /// Per-instruction modifier bits.
    pub flags: InstructionFlags,
    /// Operation-specific payload: constant, pin id, string id, jump
    /// offset, global/array id, or absolute call target.
    pub immediate: u16,
}

impl Instruction {
    /// Build an instruction from a known opcode, flags, and immediate.
    #[must_use]
    pub const fn new(opcode: VMOpcode, flags: InstructionFlags, immediate: u16) -> Self {
        Self {
            opcode: opcode.as_u8(),
            flags,
            immediate,
        }
    }

    /// Build a plain (no flags) instruction. The common case for the emitter.
    #[must_use]
    pub const fn plain(opcode: VMOpcode, immediate: u16) -> Self {
        Self::new(opcode, InstructionFlags::empty(), immediate)
    }

    /// Pack into the wire format: `(opcode << 24) | (flags << 16) | immediate`.
    #[must_use]
    pub fn encode(self) -> u32 {
        (u32::from(self.opcode) << 24) | (u32::from(self.flags.bits()) << 16) | u32::from(self.immediate)
    }

    /// Unpack a 32-bit word into its three fields.
    ///
    /// Reserved flag bits are preserved via `from_bits_truncate` rather
    /// than rejected, matching "VM MAY ignore reserved bits" in the ISA
    /// reference; strict validation of flag bits (when required, e.g. by
    /// a host-side linter) is a separate, explicit call to
    /// [`InstructionFlags::from_bits`].
    #[must_use]
    pub fn decode(word: u32) -> Self {
        let opcode = ((word >> 24) & 0xFF) as u8;
        let flags_byte = ((word >> 16) & 0xFF) as u8;
        let immediate = (word & 0xFFFF) as u16;
        Self {
            opcode,
            flags: InstructionFlags::from_bits_truncate(flags_byte),
            immediate,
        }
    }

    /// Whether `flags` carries [`InstructionFlags::SIGNED`].
    #[must_use]
    pub const fn is_signed(self) -> bool {
        self.flags.contains(InstructionFlags::SIGNED)
    }

    /// Validated opcode, or `None` if this instruction's raw byte is not a
    /// member of the closed opcode set.
    #[must_use]
    pub const fn decoded_opcode(self) -> Option<VMOpcode> {
        VMOpcode::decode(self.opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_admissible_field_combination() {
        for opcode in [0x00u8, 0x18, 0x3F, 0xFF] {
            for flags in [InstructionFlags::empty(), InstructionFlags::SIGNED] {
                for immediate in [0u16, 1, 32767, 32768, 65535] {
                    let instr = Instruction {
                        opcode,
                        flags,
                        immediate,
                    };
                    let decoded = Instruction::decode(instr.encode());
                    assert_eq!(decoded.opcode, opcode);
                    assert_eq!(decoded.flags, flags);
                    assert_eq!(decoded.immediate, immediate);
                }
            }
        }
    }

    #[test]
    fn decode_truncates_reserved_flag_bits() {
        // flags byte 0xFF: only bit 0 (SIGNED) is assigned.
        let word = (0x01u32 << 24) | (0xFFu32 << 16) | 0x0042;
        let instr = Instruction::decode(word);
        assert!(instr.is_signed());
        assert_eq!(instr.immediate, 0x0042);
    }

    #[test]
    fn plain_push_has_no_flags() {
        let instr = Instruction::plain(VMOpcode::Push, 65535);
        assert!(!instr.is_signed());
        assert_eq!(instr.immediate, 65535);
        assert_eq!(Instruction::decode(instr.encode()), instr);
    }
}
