//! Arduino HAL opcode handlers. Pin numbers and format arguments are
//! popped from the stack and handed to the `IoController`, which owns
//! validation and the actual backend call.

use super::stack::Stack;
use crate::error::VmError;
use crate::io::{IoController, MAX_PRINTF_ARGS};
use crate::isa::VMOpcode;

pub fn dispatch(
    op: VMOpcode,
    immediate: u16,
    stack: &mut Stack,
    io: &mut IoController,
) -> Result<(), VmError> {
    match op {
        VMOpcode::DigitalWrite => {
            let (pin, value) = stack.pop2()?;
            let pin = pin_from(pin)?;
            io.digital_write(pin, value)
        }
        VMOpcode::DigitalRead => {
            let pin = pin_from(stack.pop()?)?;
            let value = io.digital_read(pin)?;
            stack.push(value)
        }
        VMOpcode::AnalogWrite => {
            let (pin, value) = stack.pop2()?;
            let pin = pin_from(pin)?;
            io.analog_write(pin, value)
        }
        VMOpcode::AnalogRead => {
            let pin = pin_from(stack.pop()?)?;
            let value = io.analog_read(pin)?;
            stack.push(value)
        }
        VMOpcode::PinMode => {
            let (pin, mode) = stack.pop2()?;
            let pin = pin_from(pin)?;
            io.pin_mode(pin, mode)
        }
        VMOpcode::Delay => {
            let ns = stack.pop()?;
            let ns = u32::try_from(ns).map_err(|_| VmError::HardwareFault)?;
            io.delay(ns);
            Ok(())
        }
        VMOpcode::Millis => stack.push(io.millis() as i32),
        VMOpcode::Micros => stack.push(io.micros() as i32),
        VMOpcode::ButtonPressed => {
            let pin = pin_from(stack.pop()?)?;
            let level = io.digital_read(pin)?;
            stack.push(i32::from(level != 0))
        }
        VMOpcode::ButtonReleased => {
            let pin = pin_from(stack.pop()?)?;
            let level = io.digital_read(pin)?;
            stack.push(i32::from(level == 0))
        }
        VMOpcode::Printf => {
            let arg_count = stack.pop()?;
            let arg_count = usize::try_from(arg_count).map_err(|_| VmError::PrintfError)?;
            // Over capacity: drop the excess args (the most recently
            // pushed, i.e. the tail of the argument list) and format with
            // the first MAX_PRINTF_ARGS instead of trapping.
            let used = arg_count.min(MAX_PRINTF_ARGS);
            for _ in 0..(arg_count - used) {
                stack.pop()?;
            }
            let mut args = [0i32; MAX_PRINTF_ARGS];
            for slot in args.iter_mut().take(used).rev() {
                *slot = stack.pop()?;
            }
            io.printf(immediate, &args[..used])
        }
        _ => unreachable!("io_ops::dispatch called with non-io opcode {op:?}"),
    }
}

fn pin_from(value: i32) -> Result<u16, VmError> {
    u16::try_from(value).map_err(|_| VmError::HardwareFault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MockIoBackend;

    fn io_controller() -> IoController {
        IoController::new(Box::new(MockIoBackend::new()))
    }

    #[test]
    fn digital_write_then_read_round_trips() {
        let mut io = io_controller();
        let mut stack = Stack::new();
        stack.push(2).unwrap(); // pin
        stack.push(1).unwrap(); // value
        dispatch(VMOpcode::DigitalWrite, 0, &mut stack, &mut io).unwrap();

        stack.push(2).unwrap();
        dispatch(VMOpcode::DigitalRead, 0, &mut stack, &mut io).unwrap();
        assert_eq!(stack.pop(), Ok(1));
    }

    #[test]
    fn printf_pops_args_in_source_order() {
        let mut io = io_controller();
        let id = io.add_string("%d-%d").unwrap();
        let mut stack = Stack::new();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        stack.push(2).unwrap(); // arg_count
        dispatch(VMOpcode::Printf, id, &mut stack, &mut io).unwrap();
    }

    #[test]
    fn printf_clamps_arg_count_over_capacity() {
        let mut io = io_controller();
        let id = io.add_string("hi").unwrap();
        let mut stack = Stack::new();
        for v in 1..=9 {
            stack.push(v).unwrap();
        }
        stack.push(9).unwrap(); // arg_count: one past MAX_PRINTF_ARGS
        assert_eq!(dispatch(VMOpcode::Printf, id, &mut stack, &mut io), Ok(()));
        // The ninth (most recently pushed) arg was dropped along with the
        // other eight; nothing is left on the stack.
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
    }
}
