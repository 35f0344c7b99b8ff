//! Translates a small typed program tree into the fixed-width bytecode
//! `vm-core` executes.
//!
//! This crate does not parse guest source text — see [`ast`] for the tree
//! shape it consumes instead — and it never runs the bytecode it emits.

pub mod ast;
mod emitter;
pub mod error;
pub mod symbol_table;

pub use emitter::emit_program;
pub use error::CompileError;
