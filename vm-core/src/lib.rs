//! Execution engine, memory model, and I/O mediation for a fixed-width
//! bytecode instruction set targeting microcontroller-class hardware.
//!
//! This crate does not parse or compile anything — see `vm-compiler` for
//! that. It takes an already-assembled [`isa::Program`] and runs it.

pub mod engine;
pub mod error;
pub mod image;
pub mod io;
pub mod isa;
pub mod memory;
pub mod observer;
mod vm;

pub use error::VmError;
pub use isa::{Instruction, InstructionFlags, Program, VMOpcode};
pub use observer::{BlackboxObserver, TelemetryObserver};
pub use vm::{ComponentVm, DiagnosticDump, ObserverHandle, VmState};
