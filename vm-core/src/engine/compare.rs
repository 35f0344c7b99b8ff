//! Comparison opcode handlers.
//!
//! An opcode is compared as signed 32-bit either because it is one of
//! the dedicated `_SIGNED` variants, or because the instruction carries
//! the `SIGNED` flag regardless of which comparison opcode was used.

use super::stack::Stack;
use crate::error::VmError;
use crate::isa::VMOpcode;

pub fn dispatch(op: VMOpcode, signed_flag: bool, stack: &mut Stack) -> Result<(), VmError> {
    let (a, b) = stack.pop2()?;
    let signed = signed_flag || is_signed_variant(op);

    let result = if signed {
        match unsign(op) {
            VMOpcode::Eq => a == b,
            VMOpcode::Ne => a != b,
            VMOpcode::Lt => a < b,
            VMOpcode::Gt => a > b,
            VMOpcode::Le => a <= b,
            VMOpcode::Ge => a >= b,
            other => unreachable!("compare::dispatch called with non-comparison opcode {other:?}"),
        }
    } else {
        let (ua, ub) = (a as u32, b as u32);
        match op {
            VMOpcode::Eq => ua == ub,
            VMOpcode::Ne => ua != ub,
            VMOpcode::Lt => ua < ub,
            VMOpcode::Gt => ua > ub,
            VMOpcode::Le => ua <= ub,
            VMOpcode::Ge => ua >= ub,
            other => unreachable!("compare::dispatch called with non-comparison opcode {other:?}"),
        }
    };

    stack.push(i32::from(result))
}

fn is_signed_variant(op: VMOpcode) -> bool {
    matches!(
        op,
        VMOpcode::EqSigned
            | VMOpcode::NeSigned
            | VMOpcode::LtSigned
            | VMOpcode::GtSigned
            | VMOpcode::LeSigned
            | VMOpcode::GeSigned
    )
}

/// Map a `_SIGNED` variant back onto its base comparison for the `match`
/// above; unsigned opcodes pass through unchanged.
fn unsign(op: VMOpcode) -> VMOpcode {
    match op {
        VMOpcode::EqSigned => VMOpcode::Eq,
        VMOpcode::NeSigned => VMOpcode::Ne,
        VMOpcode::LtSigned => VMOpcode::Lt,
        VMOpcode::GtSigned => VMOpcode::Gt,
        VMOpcode::LeSigned => VMOpcode::Le,
        VMOpcode::GeSigned => VMOpcode::Ge,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(a: i32, b: i32) -> Stack {
        let mut stack = Stack::new();
        stack.push(a).unwrap();
        stack.push(b).unwrap();
        stack
    }

    #[test]
    fn unsigned_lt_treats_negative_as_large() {
        let mut stack = with(-1, 1);
        dispatch(VMOpcode::Lt, false, &mut stack).unwrap();
        assert_eq!(stack.pop(), Ok(0)); // -1 as u32 is huge, so -1 < 1 is false
    }

    #[test]
    fn signed_flag_overrides_unsigned_opcode() {
        let mut stack = with(-1, 1);
        dispatch(VMOpcode::Lt, true, &mut stack).unwrap();
        assert_eq!(stack.pop(), Ok(1));
    }

    #[test]
    fn dedicated_signed_variant_is_signed_without_flag() {
        let mut stack = with(-1, 1);
        dispatch(VMOpcode::LtSigned, false, &mut stack).unwrap();
        assert_eq!(stack.pop(), Ok(1));
    }

    #[test]
    fn eq_and_ne_are_sign_independent() {
        let mut stack = with(5, 5);
        dispatch(VMOpcode::Eq, false, &mut stack).unwrap();
        assert_eq!(stack.pop(), Ok(1));
    }
}
