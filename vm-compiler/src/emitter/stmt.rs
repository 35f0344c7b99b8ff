//! Statement emission: declarations, blocks, control flow, and `return`.

use vm_core::{Instruction, VMOpcode};

use super::BytecodeEmitter;
use crate::ast::Stmt;
use crate::symbol_table::SymbolClass;

impl BytecodeEmitter {
    pub(super) fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => {
                self.emit_expr(expr);
                // Assignments and void calls already consume everything
                // they push; only pop when something was left behind.
                if self.expr_leaves_value(expr) {
                    self.emit(Instruction::plain(VMOpcode::Pop, 0));
                }
            }
            Stmt::VarDecl { name, init } => {
                match self.symbols.declare(name, SymbolClass::Variable, crate::ast::Type::Int) {
                    Ok(storage) => {
                        if let Some(expr) = init {
                            self.emit_expr(expr);
                            self.emit_store_for(storage);
                        }
                    }
                    Err(e) => self.errors.push(e),
                }
            }
            Stmt::ArrayDecl { name, length } => {
                match self.symbols.declare_array(name, crate::ast::Type::Int, *length) {
                    Ok(array_id) => {
                        self.emit(Instruction::plain(VMOpcode::Push, *length));
                        self.emit(Instruction::plain(VMOpcode::CreateArray, array_id));
                    }
                    Err(e) => self.errors.push(e),
                }
            }
            Stmt::If { cond, then_branch, else_branch } => self.emit_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } => self.emit_while(cond, body),
            Stmt::Return(value) => self.emit_return(value.as_ref()),
            Stmt::Block(stmts) => {
                self.symbols.enter_scope();
                for stmt in stmts {
                    self.emit_stmt(stmt);
                }
                self.symbols.exit_scope();
            }
        }
    }

    fn emit_store_for(&mut self, storage: crate::symbol_table::Storage) {
        match storage {
            crate::symbol_table::Storage::Global(idx) => {
                self.emit(Instruction::plain(VMOpcode::StoreGlobal, idx));
            }
            crate::symbol_table::Storage::Local(idx) => {
                self.emit(Instruction::plain(VMOpcode::StoreLocal, idx));
            }
            _ => {}
        }
    }

    fn emit_if(&mut self, cond: &crate::ast::Expr, then_branch: &[Stmt], else_branch: Option<&[Stmt]>) {
        self.emit_expr(cond);
        let else_jump = self.emit_jump_placeholder(VMOpcode::JmpFalse);
        for stmt in then_branch {
            self.emit_stmt(stmt);
        }
        if let Some(else_stmts) = else_branch {
            let end_jump = self.emit_jump_placeholder(VMOpcode::Jmp);
            self.patch_jump_here(else_jump);
            for stmt in else_stmts {
                self.emit_stmt(stmt);
            }
            self.patch_jump_here(end_jump);
        } else {
            self.patch_jump_here(else_jump);
        }
    }

    fn emit_while(&mut self, cond: &crate::ast::Expr, body: &[Stmt]) {
        let loop_start = self.instructions.len();
        self.emit_expr(cond);
        let end_jump = self.emit_jump_placeholder(VMOpcode::JmpFalse);
        for stmt in body {
            self.emit_stmt(stmt);
        }
        let back_jump = self.emit_jump_placeholder(VMOpcode::Jmp);
        self.patch_jump(back_jump, loop_start);
        self.patch_jump_here(end_jump);
    }

    fn emit_return(&mut self, value: Option<&crate::ast::Expr>) {
        if let Some(expr) = value {
            self.emit_expr(expr);
        }
        let slot = self
            .current_return_slot
            .expect("return statement emitted outside a function body");
        self.emit(Instruction::plain(VMOpcode::LoadLocal, slot));
        self.emit(Instruction::plain(VMOpcode::Ret, 0));
    }
}
