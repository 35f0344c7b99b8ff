//! Control-flow opcode handlers: halt, unconditional/conditional jumps,
//! call, and return. These are the only handlers that ever ask the
//! dispatcher to move the program counter anywhere other than forward
//! by one.

use super::stack::Stack;
use super::HandlerResult;
use crate::error::VmError;
use crate::isa::VMOpcode;

pub fn dispatch(
    op: VMOpcode,
    immediate: u16,
    pc: u16,
    program_len: usize,
    stack: &mut Stack,
) -> Result<HandlerResult, VmError> {
    match op {
        VMOpcode::Halt => Ok(HandlerResult::Halt),

        VMOpcode::Jmp => Ok(HandlerResult::Jump(resolve_relative(pc, immediate, program_len)?)),

        VMOpcode::JmpTrue => {
            let condition = stack.pop()?;
            if condition != 0 {
                Ok(HandlerResult::Jump(resolve_relative(pc, immediate, program_len)?))
            } else {
                Ok(HandlerResult::Continue)
            }
        }

        VMOpcode::JmpFalse => {
            let condition = stack.pop()?;
            if condition == 0 {
                Ok(HandlerResult::Jump(resolve_relative(pc, immediate, program_len)?))
            } else {
                Ok(HandlerResult::Continue)
            }
        }

        VMOpcode::Call => {
            if usize::from(immediate) >= program_len {
                return Err(VmError::InvalidJump);
            }
            let return_pc = pc.checked_add(1).ok_or(VmError::InvalidJump)?;
            stack.push(i32::from(return_pc))?;
            Ok(HandlerResult::Jump(immediate))
        }

        VMOpcode::Ret => {
            let target = stack.pop()?;
            let target = u16::try_from(target).map_err(|_| VmError::InvalidJump)?;
            if usize::from(target) >= program_len {
                return Err(VmError::InvalidJump);
            }
            Ok(HandlerResult::Jump(target))
        }

        _ => unreachable!("control::dispatch called with non-control opcode {op:?}"),
    }
}

/// `JMP`/`JMP_TRUE`/`JMP_FALSE` offsets are relative to the instruction
/// following the jump, stored as a two's-complement 16-bit value.
fn resolve_relative(pc: u16, immediate: u16, program_len: usize) -> Result<u16, VmError> {
    let offset = immediate as i16;
    let next = i32::from(pc) + 1 + i32::from(offset);
    if next < 0 || next as usize >= program_len {
        return Err(VmError::InvalidJump);
    }
    Ok(next as u16)
}
