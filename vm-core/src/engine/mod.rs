//! The stack machine: opcode dispatch, program-counter control, and
//! stack-overflow/underflow/corruption detection.
//!
//! Dispatch is a single `match` on the opcode's category, split across one
//! module per instruction family, not a dynamic vtable or a
//! runtime-populated table — every opcode's numeric identity is known at
//! compile time via [`crate::isa::VMOpcode`].

mod alu;
mod compare;
mod control;
mod io_ops;
mod memory_ops;
mod stack;

use crate::error::VmError;
use crate::io::IoController;
use crate::isa::{Instruction, Program, VMOpcode};
use crate::memory::MemoryManager;

pub use stack::{Stack, STACK_SIZE};

/// Maximum address any single call frame's local variables may occupy.
const MAX_LOCALS: usize = 64;

/// What a handler asks the dispatcher to do with the program counter.
/// `Error` is not a variant here because handlers report failure through
/// `Result` instead — the dispatcher turns an `Err` into `last_error` and
/// a halted engine in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    /// Advance `pc` by one.
    Continue,
    /// Set `pc` to this absolute address (already bounds-checked).
    Jump(u16),
    /// Stop execution; no error.
    Halt,
}

/// One executed instruction, as reported to the facade for observer
/// notification. `pc` is the address the instruction was fetched from,
/// not the address execution continues at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub pc: u16,
    pub opcode: u8,
    pub operand: u16,
    pub halted: bool,
}

/// The stack machine itself: operand stack, program counter, the loaded
/// program, and the per-call local-variable frames.
///
/// Local variables are kept on a side stack of frames rather than
/// interleaved with the operand stack. The call contract described by
/// this crate's ISA reference uses a single-word return address with no
/// explicit frame-size opcode, so there is no wire-visible way to know
/// how many local slots a callee will touch until it touches them; a
/// growable per-call frame models that without re-deriving the known
/// fragility of packing locals onto the operand stack itself (see
/// `DESIGN.md`).
pub struct Engine {
    stack: Stack,
    pc: u16,
    program: Program,
    locals: Vec<Vec<i32>>,
    halted: bool,
    last_error: VmError,
    steps_executed: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Engine {
    /// Build an engine around `program`; call [`Engine::reset`] or just
    /// start stepping, `pc` begins at 0.
    #[must_use]
    pub fn new(program: Program) -> Self {
        Self {
            stack: Stack::new(),
            pc: 0,
            program,
            locals: Vec::new(),
            halted: false,
            last_error: VmError::None,
            steps_executed: 0,
        }
    }

    /// Replace the loaded program and return to the power-on state.
    pub fn load(&mut self, program: Program) {
        self.program = program;
        self.reset();
    }

    /// Clear the stack, locals, pc, halted flag, and error — but keep
    /// whatever program is currently loaded.
    pub fn reset(&mut self) {
        self.stack.reset();
        self.pc = 0;
        self.locals.clear();
        self.halted = false;
        self.last_error = VmError::None;
        self.steps_executed = 0;
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    #[must_use]
    pub fn sp(&self) -> usize {
        self.stack.sp()
    }

    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn last_error(&self) -> VmError {
        self.last_error
    }

    #[must_use]
    pub fn steps_executed(&self) -> u64 {
        self.steps_executed
    }

    #[must_use]
    pub fn program_len(&self) -> usize {
        self.program.len()
    }

    /// Read the value currently on top of the operand stack without
    /// popping it, e.g. to observe a `return` value after `HALT`.
    #[must_use]
    pub fn peek(&self) -> Option<i32> {
        if self.stack.sp() <= 1 {
            None
        } else {
            Some(self.stack_slot_unchecked())
        }
    }

    fn stack_slot_unchecked(&self) -> i32 {
        // Only used by `peek`, which has already checked `sp > 1`.
        let mut probe = self.stack.clone();
        probe.pop().unwrap_or(0)
    }

    /// Execute exactly one instruction.
    ///
    /// Returns the fetched instruction's `StepEvent` on success (whether
    /// or not it halted the engine), or the `VmError` that trapped
    /// execution. A trapped engine is left halted with `last_error` set;
    /// callers must `reset` before stepping again.
    pub fn step(&mut self, memory: &mut MemoryManager, io: &mut IoController) -> Result<StepEvent, VmError> {
        if self.halted {
            return Err(VmError::ExecutionFailed);
        }
        if usize::from(self.pc) >= self.program.len() {
            self.trap(VmError::ProgramNotLoaded);
            return Err(VmError::ProgramNotLoaded);
        }

        let instr = self.program[usize::from(self.pc)];
        let event = StepEvent {
            pc: self.pc,
            opcode: instr.opcode,
            operand: instr.immediate,
            halted: false,
        };

        let Some(op) = instr.decoded_opcode() else {
            self.trap(VmError::InvalidOpcode);
            return Err(VmError::InvalidOpcode);
        };
        if instr.opcode > crate::isa::MAX_OPCODE {
            self.trap(VmError::InvalidOpcode);
            return Err(VmError::InvalidOpcode);
        }

        match self.dispatch(op, instr, memory, io) {
            Ok(HandlerResult::Continue) => {
                self.pc = self.pc.wrapping_add(1);
                self.steps_executed += 1;
                log::trace!(target: "vm_core::engine", "pc={:#06x} op={} imm={}", event.pc, op.name(), event.operand);
                Ok(event)
            }
            Ok(HandlerResult::Jump(target)) => {
                self.pc = target;
                self.steps_executed += 1;
                log::trace!(target: "vm_core::engine", "pc={:#06x} op={} imm={} -> jump {target:#06x}", event.pc, op.name(), event.operand);
                Ok(event)
            }
            Ok(HandlerResult::Halt) => {
                self.halted = true;
                self.steps_executed += 1;
                log::trace!(target: "vm_core::engine", "pc={:#06x} op=HALT", event.pc);
                Ok(StepEvent { halted: true, ..event })
            }
            Err(e) => {
                self.trap(e);
                Err(e)
            }
        }
    }

    fn trap(&mut self, error: VmError) {
        self.halted = true;
        self.last_error = error;
        log::error!(target: "vm_core::engine", "trap at pc={:#06x}: {error}", self.pc);
    }

    fn dispatch(
        &mut self,
        op: VMOpcode,
        instr: Instruction,
        memory: &mut MemoryManager,
        io: &mut IoController,
    ) -> Result<HandlerResult, VmError> {
        use VMOpcode::*;
        match op {
            Push => {
                let value = if instr.is_signed() {
                    i32::from(instr.immediate as i16)
                } else {
                    i32::from(instr.immediate)
                };
                self.stack.push(value)?;
                Ok(HandlerResult::Continue)
            }
            Pop => {
                self.stack.pop()?;
                Ok(HandlerResult::Continue)
            }

            Halt | Jmp | JmpTrue | JmpFalse | Call | Ret => {
                let result = control::dispatch(op, instr.immediate, self.pc, self.program.len(), &mut self.stack)?;
                match op {
                    Call => self.locals.push(Vec::new()),
                    Ret => {
                        self.locals.pop();
                    }
                    _ => {}
                }
                Ok(result)
            }

            Add | Sub | Mul | Div | Mod | And | Or | Not | BitwiseAnd | BitwiseOr | BitwiseXor
            | BitwiseNot | ShiftLeft | ShiftRight => {
                alu::dispatch(op, &mut self.stack)?;
                Ok(HandlerResult::Continue)
            }

            Eq | Ne | Lt | Gt | Le | Ge | EqSigned | NeSigned | LtSigned | GtSigned | LeSigned
            | GeSigned => {
                compare::dispatch(op, instr.is_signed(), &mut self.stack)?;
                Ok(HandlerResult::Continue)
            }

            LoadGlobal | StoreGlobal | LoadArray | StoreArray | CreateArray => {
                memory_ops::dispatch(op, instr.immediate, &mut self.stack, memory)?;
                Ok(HandlerResult::Continue)
            }

            LoadLocal | StoreLocal => {
                self.dispatch_local(op, instr.immediate)?;
                Ok(HandlerResult::Continue)
            }

            DigitalWrite | DigitalRead | AnalogWrite | AnalogRead | Delay | PinMode | Printf
            | Millis | Micros | ButtonPressed | ButtonReleased => {
                io_ops::dispatch(op, instr.immediate, &mut self.stack, io)?;
                Ok(HandlerResult::Continue)
            }
        }
    }

    fn dispatch_local(&mut self, op: VMOpcode, immediate: u16) -> Result<(), VmError> {
        let idx = usize::from(immediate);
        if idx >= MAX_LOCALS {
            return Err(VmError::MemoryBounds);
        }
        let frame = self.locals.last_mut().ok_or(VmError::MemoryBounds)?;
        if idx >= frame.len() {
            frame.resize(idx + 1, 0);
        }
        match op {
            VMOpcode::LoadLocal => {
                let value = frame[idx];
                self.stack.push(value)
            }
            VMOpcode::StoreLocal => {
                let value = self.stack.pop()?;
                frame[idx] = value;
                Ok(())
            }
            _ => unreachable!("dispatch_local called with non-local opcode {op:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MockIoBackend;
    use crate::isa::InstructionFlags;

    fn run(program: Program) -> (Engine, MemoryManager, IoController) {
        let mut engine = Engine::new(program);
        let mut memory = MemoryManager::new();
        let mut io = IoController::new(Box::new(MockIoBackend::new()));
        loop {
            match engine.step(&mut memory, &mut io) {
                Ok(event) if event.halted => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        (engine, memory, io)
    }

    #[test]
    fn arithmetic_identity_10_plus_3_times_2_minus_5() {
        let program = vec![
            Instruction::plain(VMOpcode::Push, 10),
            Instruction::plain(VMOpcode::Push, 3),
            Instruction::plain(VMOpcode::Push, 2),
            Instruction::plain(VMOpcode::Mul, 0),
            Instruction::plain(VMOpcode::Add, 0),
            Instruction::plain(VMOpcode::Push, 5),
            Instruction::plain(VMOpcode::Sub, 0),
            Instruction::plain(VMOpcode::Halt, 0),
        ];
        let (engine, _, _) = run(program);
        assert!(engine.halted());
        assert_eq!(engine.last_error(), VmError::None);
        assert_eq!(engine.peek(), Some(11));
    }

    #[test]
    fn division_by_zero_traps() {
        let program = vec![
            Instruction::plain(VMOpcode::Push, 1),
            Instruction::plain(VMOpcode::Push, 0),
            Instruction::plain(VMOpcode::Div, 0),
            Instruction::plain(VMOpcode::Halt, 0),
        ];
        let (engine, _, _) = run(program);
        assert_eq!(engine.last_error(), VmError::DivisionByZero);
        assert!(engine.steps_executed() >= 3);
    }

    #[test]
    fn invalid_opcode_traps() {
        let program = vec![Instruction {
            opcode: 0x0A,
            flags: InstructionFlags::empty(),
            immediate: 0,
        }];
        let (engine, _, _) = run(program);
        assert_eq!(engine.last_error(), VmError::InvalidOpcode);
    }

    #[test]
    fn call_and_ret_preserve_pc_and_frame() {
        // main: CALL add_one; HALT
        // add_one: PUSH 1; ADD; RET  (expects one argument pre-pushed)
        let program = vec![
            Instruction::plain(VMOpcode::Push, 41),
            Instruction::plain(VMOpcode::Call, 3),
            Instruction::plain(VMOpcode::Halt, 0),
            Instruction::plain(VMOpcode::Push, 1),
            Instruction::plain(VMOpcode::Add, 0),
            Instruction::plain(VMOpcode::Ret, 0),
        ];
        let (engine, _, _) = run(program);
        assert_eq!(engine.last_error(), VmError::None);
        assert_eq!(engine.peek(), Some(42));
    }

    fn signed_push(value: i16) -> Instruction {
        Instruction::new(VMOpcode::Push, InstructionFlags::SIGNED, value as u16)
    }

    #[test]
    fn signed_push_sign_extends() {
        let program = vec![signed_push(-5), Instruction::plain(VMOpcode::Halt, 0)];
        let (engine, _, _) = run(program);
        assert_eq!(engine.peek(), Some(-5));
    }
}
