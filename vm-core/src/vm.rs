//! The facade: owns the engine, memory manager, and I/O controller in
//! construction order and drives them together, notifying observers as
//! it goes.

use std::time::Instant;

use crate::engine::Engine;
use crate::error::VmError;
use crate::io::{IoBackend, IoController};
use crate::isa::Program;
use crate::memory::MemoryManager;
use crate::observer::TelemetryObserver;

/// `Unloaded -> Loaded -> Running -> (Halted | Errored)`. `reset_vm`
/// returns any state to `Unloaded`; `Errored` is terminal until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Unloaded,
    Loaded,
    Running,
    Halted,
    Errored,
}

/// Postmortem snapshot for host-side validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticDump {
    pub pc: u16,
    pub sp: usize,
    pub instructions_executed: u64,
    pub last_error: VmError,
}

/// Owns the engine, memory manager, and I/O controller, in that
/// construction order; destruction reverses it by ordinary field drop
/// order since each is owned by value.
pub struct ComponentVm {
    engine: Engine,
    memory: MemoryManager,
    io: IoController,
    observers: Vec<Option<Box<dyn TelemetryObserver>>>,
    state: VmState,
}

/// Opaque handle returned by [`ComponentVm::add_observer`], needed to
/// remove that specific observer later without disturbing the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle(usize);

impl ComponentVm {
    /// Construct a VM around the given I/O backend with no program
    /// loaded yet.
    #[must_use]
    pub fn new(io_backend: Box<dyn IoBackend>) -> Self {
        Self {
            engine: Engine::default(),
            memory: MemoryManager::new(),
            io: IoController::new(io_backend),
            observers: Vec::new(),
            state: VmState::Unloaded,
        }
    }

    /// Load a program with no string table.
    pub fn load_program(&mut self, program: Program) {
        self.load_program_with_strings(program, Vec::new());
    }

    /// Load a program and its accompanying string table (from `printf`
    /// literals), replacing whatever was previously loaded.
    pub fn load_program_with_strings(&mut self, program: Program, strings: Vec<String>) {
        self.engine.load(program);
        self.memory.reset();
        self.io.load_strings(strings);
        self.state = VmState::Loaded;
    }

    /// Execute one instruction, notifying observers with the PC and
    /// opcode/operand actually fetched.
    pub fn execute_single_step(&mut self) -> Result<(), VmError> {
        match self.state {
            VmState::Unloaded => return Err(VmError::ProgramNotLoaded),
            VmState::Errored => return Err(self.engine.last_error()),
            _ => {}
        }
        self.state = VmState::Running;

        match self.engine.step(&mut self.memory, &mut self.io) {
            Ok(event) => {
                self.notify_instruction(event.pc, event.opcode, event.operand);
                self.state = if event.halted { VmState::Halted } else { VmState::Running };
                Ok(())
            }
            Err(e) => {
                self.state = VmState::Errored;
                Err(e)
            }
        }
    }

    /// Run to completion: single-step until the engine halts or traps.
    /// Notifies `on_execution_complete` exactly once, whether the run
    /// succeeded or trapped.
    pub fn execute_program(&mut self) -> Result<(), VmError> {
        match self.state {
            VmState::Unloaded => return Err(VmError::ProgramNotLoaded),
            VmState::Errored => return Err(self.engine.last_error()),
            _ => {}
        }
        let start = Instant::now();
        let mut result = Ok(());
        loop {
            match self.execute_single_step() {
                Ok(()) => {
                    if self.engine.halted() {
                        break;
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let total = self.engine.steps_executed();
        for observer in self.observers.iter_mut().flatten() {
            observer.on_execution_complete(total, elapsed_ms);
        }
        result
    }

    /// Reset the engine, memory, and I/O controller back to power-on
    /// state; notifies `on_vm_reset` on every registered observer.
    pub fn reset_vm(&mut self) {
        self.engine.reset();
        self.memory.reset();
        self.io.reset();
        self.state = VmState::Unloaded;
        for observer in self.observers.iter_mut().flatten() {
            observer.on_vm_reset();
        }
    }

    /// Register an observer; returns a handle for later removal.
    pub fn add_observer(&mut self, observer: Box<dyn TelemetryObserver>) -> ObserverHandle {
        self.observers.push(Some(observer));
        ObserverHandle(self.observers.len() - 1)
    }

    /// Remove a previously added observer. A no-op if already removed.
    pub fn remove_observer(&mut self, handle: ObserverHandle) {
        if let Some(slot) = self.observers.get_mut(handle.0) {
            *slot = None;
        }
    }

    /// Remove every registered observer.
    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    #[must_use]
    pub fn get_last_error(&self) -> VmError {
        self.engine.last_error()
    }

    #[must_use]
    pub fn get_error_string(&self) -> &'static str {
        self.engine.last_error().as_str()
    }

    #[must_use]
    pub fn state(&self) -> VmState {
        self.state
    }

    #[must_use]
    pub fn diagnostic_dump(&self) -> DiagnosticDump {
        DiagnosticDump {
            pc: self.engine.pc(),
            sp: self.engine.sp(),
            instructions_executed: self.engine.steps_executed(),
            last_error: self.engine.last_error(),
        }
    }

    /// The value on top of the operand stack, e.g. a `main` return
    /// value observed after `HALT`. Host-side test harnesses use this
    /// rather than reaching into the engine directly.
    #[must_use]
    pub fn peek_result(&self) -> Option<i32> {
        self.engine.peek()
    }

    /// The interned string table, for host-side inspection.
    #[must_use]
    pub fn string_table(&self) -> &crate::io::StringTable {
        self.io.strings()
    }

    /// The I/O backend, for host-side test harnesses that need to
    /// downcast back to a concrete type (e.g. `MockIoBackend`).
    pub fn io_backend_mut(&mut self) -> &mut dyn IoBackend {
        self.io.backend_mut()
    }

    fn notify_instruction(&mut self, pc: u16, opcode: u8, operand: u16) {
        for observer in self.observers.iter_mut().flatten() {
            observer.on_instruction_executed(pc, opcode, operand);
        }
    }
}
