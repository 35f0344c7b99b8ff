//! Pure encode/decode functions for the three on-disk/on-flash program
//! layouts. None of these functions perform I/O — reading the bytes from
//! a file or a flash region is the host's job.

use crc::{Crc, CRC_16_MODBUS};

/// The CRC-16 variant used by the auto-execution framing: reflected
/// input/output, polynomial `0x8005`, initial register `0xFFFF`, no
/// final XOR. This is bit-for-bit the bootloader's hand-rolled
/// `calculate_crc16` and happens to coincide with the standard
/// CRC-16/MODBUS catalog entry.
fn crc16(body: &[u8]) -> u16 {
    Crc::<u16>::new(&CRC_16_MODBUS).checksum(body)
}

#[cfg(test)]
use crate::isa::InstructionFlags;
use crate::isa::{Instruction, Program};

/// Magic value identifying a valid auto-execution program header.
pub const AUTO_EXEC_MAGIC: u32 = 0xC0DE_CAFE;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("truncated image")]
    Truncated,
    #[error("no program")]
    NoProgram,
    #[error("integrity failure")]
    IntegrityFailure,
}

/// Encode a program as a bare sequence of little-endian 32-bit words,
/// with no header of any kind.
#[must_use]
pub fn encode_plain(program: &Program) -> Vec<u8> {
    let mut out = Vec::with_capacity(program.len() * 4);
    for instr in program {
        out.extend_from_slice(&instr.encode().to_le_bytes());
    }
    out
}

/// Decode a plain image; fails only if the byte count is not a multiple
/// of 4.
pub fn decode_plain(bytes: &[u8]) -> Result<Program, ImageError> {
    if bytes.len() % 4 != 0 {
        return Err(ImageError::Truncated);
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            Instruction::decode(word)
        })
        .collect())
}

/// Encode the enhanced layout: a small header naming the instruction and
/// string counts, followed by the instruction stream, followed by the
/// string table (each string as a `u32` length prefix and raw bytes, no
/// terminator).
#[must_use]
pub fn encode_enhanced(program: &Program, strings: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(program.len() as u32).to_le_bytes());
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    out.extend_from_slice(&encode_plain(program));
    for s in strings {
        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
    }
    out
}

/// Decode an enhanced-layout body into its program and string table.
pub fn decode_enhanced(bytes: &[u8]) -> Result<(Program, Vec<String>), ImageError> {
    if bytes.len() < 8 {
        return Err(ImageError::Truncated);
    }
    let instruction_count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let string_count = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;

    let instr_bytes_len = instruction_count * 4;
    let instr_start = 8;
    let instr_end = instr_start + instr_bytes_len;
    if bytes.len() < instr_end {
        return Err(ImageError::Truncated);
    }
    let program = decode_plain(&bytes[instr_start..instr_end])?;

    let mut strings = Vec::with_capacity(string_count);
    let mut cursor = instr_end;
    for _ in 0..string_count {
        if bytes.len() < cursor + 4 {
            return Err(ImageError::Truncated);
        }
        let len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        if bytes.len() < cursor + len {
            return Err(ImageError::Truncated);
        }
        let s = String::from_utf8_lossy(&bytes[cursor..cursor + len]).into_owned();
        strings.push(s);
        cursor += len;
    }
    Ok((program, strings))
}

/// Wrap an enhanced-layout body with the auto-execution frame: magic,
/// body size, counts, and a CRC-16 over the body.
#[must_use]
pub fn encode_auto_exec(program: &Program, strings: &[String]) -> Vec<u8> {
    let body = encode_enhanced(program, strings);
    let crc = crc16(&body);

    let mut out = Vec::with_capacity(16 + body.len());
    out.extend_from_slice(&AUTO_EXEC_MAGIC.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&(program.len() as u32).to_le_bytes());
    out.extend_from_slice(&(strings.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Validate and decode an auto-execution-framed image: magic mismatch
/// is reported as "no program" (nothing was ever flashed), CRC mismatch
/// as "integrity failure" (something was flashed but is corrupt).
pub fn decode_auto_exec(bytes: &[u8]) -> Result<(Program, Vec<String>), ImageError> {
    if bytes.len() < 18 {
        return Err(ImageError::Truncated);
    }
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    if magic != AUTO_EXEC_MAGIC {
        return Err(ImageError::NoProgram);
    }
    let program_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let crc_stored = u16::from_le_bytes(bytes[16..18].try_into().unwrap());

    let body_start = 18;
    let body_end = body_start + program_size;
    if bytes.len() < body_end {
        return Err(ImageError::Truncated);
    }
    let body = &bytes[body_start..body_end];
    if crc16(body) != crc_stored {
        return Err(ImageError::IntegrityFailure);
    }
    decode_enhanced(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::VMOpcode;

    fn sample_program() -> Program {
        vec![
            Instruction::plain(VMOpcode::Push, 10),
            Instruction::new(VMOpcode::Push, InstructionFlags::SIGNED, 0xFFFB),
            Instruction::plain(VMOpcode::Add, 0),
            Instruction::plain(VMOpcode::Halt, 0),
        ]
    }

    #[test]
    fn plain_round_trips() {
        let program = sample_program();
        let bytes = encode_plain(&program);
        assert_eq!(decode_plain(&bytes).unwrap(), program);
    }

    #[test]
    fn plain_rejects_truncated_bytes() {
        assert_eq!(decode_plain(&[0u8; 3]), Err(ImageError::Truncated));
    }

    #[test]
    fn enhanced_round_trips_with_strings() {
        let program = sample_program();
        let strings = vec!["n=%d".to_string(), "done".to_string()];
        let bytes = encode_enhanced(&program, &strings);
        let (decoded_program, decoded_strings) = decode_enhanced(&bytes).unwrap();
        assert_eq!(decoded_program, program);
        assert_eq!(decoded_strings, strings);
    }

    #[test]
    fn auto_exec_round_trips() {
        let program = sample_program();
        let strings = vec!["hello".to_string()];
        let bytes = encode_auto_exec(&program, &strings);
        let (decoded_program, decoded_strings) = decode_auto_exec(&bytes).unwrap();
        assert_eq!(decoded_program, program);
        assert_eq!(decoded_strings, strings);
    }

    #[test]
    fn auto_exec_rejects_bad_magic() {
        let mut bytes = encode_auto_exec(&sample_program(), &[]);
        bytes[0] ^= 0xFF;
        assert_eq!(decode_auto_exec(&bytes), Err(ImageError::NoProgram));
    }

    #[test]
    fn auto_exec_rejects_corrupted_body() {
        let mut bytes = encode_auto_exec(&sample_program(), &[]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(decode_auto_exec(&bytes), Err(ImageError::IntegrityFailure));
    }
}
