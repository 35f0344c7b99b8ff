//! Tree-directed bytecode emission: walks a [`crate::ast::Program`] and
//! produces a flat instruction stream plus a string table, resolving
//! forward function references via backpatching. Diagnostics are
//! collected, never short-circuited, so one pass reports every problem.

mod expr;
mod stmt;

use std::collections::HashMap;

use vm_core::{Instruction, InstructionFlags, VMOpcode};

use crate::ast::{self, Type};
use crate::error::CompileError;
use crate::symbol_table::{SymbolClass, SymbolTable};

pub use vm_core::io::MAX_PRINTF_ARGS;

/// Compile a program tree into a linear instruction stream and its
/// accompanying string table, or every diagnostic collected along the way.
pub fn emit_program(program: &ast::Program) -> Result<(Vec<Instruction>, Vec<String>), Vec<CompileError>> {
    let mut emitter = BytecodeEmitter::new();
    emitter.run(program);
    if emitter.errors.is_empty() {
        Ok((emitter.instructions, emitter.strings))
    } else {
        Err(emitter.errors)
    }
}

pub(crate) struct BytecodeEmitter {
    instructions: Vec<Instruction>,
    strings: Vec<String>,
    symbols: SymbolTable,
    function_addresses: HashMap<String, u16>,
    /// Populated in a pre-pass over every function before any body is
    /// emitted, so a call site can tell whether the callee leaves a
    /// value on the stack regardless of declaration order.
    function_return_types: HashMap<String, Type>,
    call_placeholders: Vec<(usize, String)>,
    /// Local slot holding the saved return address for the function
    /// currently being emitted; consulted by every `return` statement.
    current_return_slot: Option<u16>,
    errors: Vec<CompileError>,
}

impl BytecodeEmitter {
    fn new() -> Self {
        Self {
            instructions: Vec::new(),
            strings: Vec::new(),
            symbols: SymbolTable::new(),
            function_addresses: HashMap::new(),
            function_return_types: HashMap::new(),
            call_placeholders: Vec::new(),
            current_return_slot: None,
            errors: Vec::new(),
        }
    }

    /// Whether evaluating `expr` for its side effects alone (as a bare
    /// expression statement) leaves a word on the operand stack that
    /// needs popping. Assignments and void calls consume everything
    /// they push; everything else leaves exactly one value behind.
    pub(super) fn expr_leaves_value(&self, expr: &ast::Expr) -> bool {
        match expr {
            ast::Expr::Assign { .. } => false,
            ast::Expr::Call { name, .. } => self.call_leaves_value(name),
            _ => true,
        }
    }

    fn call_leaves_value(&self, name: &str) -> bool {
        match name {
            "printf" | "digitalWrite" | "analogWrite" | "pinMode" | "delay" => false,
            "digitalRead" | "analogRead" | "millis" | "micros" => true,
            _ => !matches!(self.function_return_types.get(name), Some(Type::Void)),
        }
    }

    fn emit(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    /// Emit a jump instruction with a placeholder offset; returns its index
    /// for later patching via [`Self::patch_jump`].
    fn emit_jump_placeholder(&mut self, op: VMOpcode) -> usize {
        self.emit(Instruction::plain(op, 0))
    }

    /// Patch a previously emitted jump so it targets `target_index`,
    /// relative to the instruction following the jump.
    fn patch_jump(&mut self, placeholder: usize, target_index: usize) {
        let offset = target_index as i64 - (placeholder as i64 + 1);
        match i16::try_from(offset) {
            Ok(offset) => {
                let instr = &mut self.instructions[placeholder];
                instr.immediate = offset as u16;
            }
            Err(_) => self.errors.push(CompileError::JumpOffsetOutOfRange),
        }
    }

    /// Patch a jump to target the next instruction to be emitted.
    fn patch_jump_here(&mut self, placeholder: usize) {
        let here = self.instructions.len();
        self.patch_jump(placeholder, here);
    }

    fn emit_call_placeholder(&mut self, name: &str) {
        let index = self.emit(Instruction::plain(VMOpcode::Call, 0));
        self.call_placeholders.push((index, name.to_string()));
    }

    fn intern_string(&mut self, s: &str) -> u16 {
        let id = self.strings.len() as u16;
        self.strings.push(s.to_string());
        id
    }

    fn run(&mut self, program: &ast::Program) {
        for item in &program.items {
            if let ast::Item::Function(f) = item {
                self.function_return_types.insert(f.name.clone(), f.return_type);
            }
        }

        for item in &program.items {
            match item {
                ast::Item::GlobalVar { name, ty } => {
                    if let Err(e) = self.symbols.declare(name, SymbolClass::Variable, *ty) {
                        self.errors.push(e);
                    }
                }
                ast::Item::GlobalArray { name, ty, length } => {
                    match self.symbols.declare_array(name, *ty, *length) {
                        Ok(array_id) => {
                            self.emit(Instruction::plain(VMOpcode::Push, *length));
                            self.emit(Instruction::plain(VMOpcode::CreateArray, array_id));
                        }
                        Err(e) => self.errors.push(e),
                    }
                }
                ast::Item::Function(_) => {}
            }
        }

        let entry_name = program.items.iter().find_map(|item| match item {
            ast::Item::Function(f) if f.name == "main" => Some("main"),
            _ => None,
        });
        let entry_name = entry_name.or_else(|| {
            program.items.iter().find_map(|item| match item {
                ast::Item::Function(f) if f.name == "setup" => Some("setup"),
                _ => None,
            })
        });
        if let Some(name) = entry_name {
            self.emit_call_placeholder(name);
        }
        self.emit(Instruction::plain(VMOpcode::Halt, 0));

        for item in &program.items {
            if let ast::Item::Function(func) = item {
                self.emit_function(func);
            }
        }

        self.resolve_calls();
    }

    fn emit_function(&mut self, func: &ast::Function) {
        let start = self.instructions.len() as u16;
        self.function_addresses.insert(func.name.clone(), start);

        self.symbols.enter_scope();
        self.symbols.reset_stack_offset();

        let mut param_slots = Vec::with_capacity(func.params.len());
        for param in &func.params {
            match self.symbols.declare(&param.name, SymbolClass::Parameter, param.ty) {
                Ok(crate::symbol_table::Storage::Local(slot)) => param_slots.push(slot),
                Ok(_) => {}
                Err(e) => self.errors.push(e),
            }
        }
        // One more local slot, beyond the parameters, holds the return
        // address CALL pushed — the ISA has no spare register for it, and
        // stashing it in a local slot is the only way to free the operand
        // stack for the callee's own work before RET needs it back on top.
        let saved_return_slot = param_slots.len() as u16;
        let _ = self.symbols.declare("$return_addr", SymbolClass::Variable, Type::Int);

        self.emit(Instruction::plain(VMOpcode::StoreLocal, saved_return_slot));
        for slot in param_slots.iter().rev() {
            self.emit(Instruction::plain(VMOpcode::StoreLocal, *slot));
        }

        let previous_return_slot = self.current_return_slot.replace(saved_return_slot);
        for stmt in &func.body {
            self.emit_stmt(stmt);
        }
        self.current_return_slot = previous_return_slot;

        // Implicit `return;` for a function that falls off its body.
        self.emit(Instruction::plain(VMOpcode::LoadLocal, saved_return_slot));
        self.emit(Instruction::plain(VMOpcode::Ret, 0));

        self.symbols.exit_scope();
    }

    fn resolve_calls(&mut self) {
        let placeholders = std::mem::take(&mut self.call_placeholders);
        for (index, name) in placeholders {
            match self.function_addresses.get(&name) {
                Some(&address) => self.instructions[index].immediate = address,
                None => self.errors.push(CompileError::UndefinedFunction { name }),
            }
        }
    }
}

fn signed_push(value: i32) -> Instruction {
    if (0..=i32::from(u16::MAX)).contains(&value) {
        Instruction::plain(VMOpcode::Push, value as u16)
    } else {
        Instruction::new(VMOpcode::Push, InstructionFlags::SIGNED, value as i16 as u16)
    }
}
