//! Expression emission: literals, loads/stores, short-circuit logic,
//! ternary, and the Arduino built-in call surface.

use vm_core::{Instruction, InstructionFlags, VMOpcode};

use super::{signed_push, BytecodeEmitter, MAX_PRINTF_ARGS};
use crate::ast::{AssignOp, AssignTarget, BinOp, Expr, UnOp};
use crate::error::CompileError;
use crate::symbol_table::Storage;

const BUILTIN_NAMES: &[&str] = &[
    "pinMode",
    "digitalWrite",
    "digitalRead",
    "analogWrite",
    "analogRead",
    "delay",
    "millis",
    "micros",
    "printf",
];

fn binop_opcode(op: BinOp) -> VMOpcode {
    match op {
        BinOp::Add => VMOpcode::Add,
        BinOp::Sub => VMOpcode::Sub,
        BinOp::Mul => VMOpcode::Mul,
        BinOp::Div => VMOpcode::Div,
        BinOp::Mod => VMOpcode::Mod,
        BinOp::Eq => VMOpcode::Eq,
        BinOp::Ne => VMOpcode::Ne,
        BinOp::Lt => VMOpcode::Lt,
        BinOp::Gt => VMOpcode::Gt,
        BinOp::Le => VMOpcode::Le,
        BinOp::Ge => VMOpcode::Ge,
        BinOp::BitAnd => VMOpcode::BitwiseAnd,
        BinOp::BitOr => VMOpcode::BitwiseOr,
        BinOp::BitXor => VMOpcode::BitwiseXor,
        BinOp::Shl => VMOpcode::ShiftLeft,
        BinOp::Shr => VMOpcode::ShiftRight,
        BinOp::And | BinOp::Or => unreachable!("logical operators short-circuit, see emit_expr"),
    }
}

fn is_comparison(op: BinOp) -> bool {
    matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge)
}

fn compound_opcode(op: AssignOp) -> VMOpcode {
    match op {
        AssignOp::AddAssign => VMOpcode::Add,
        AssignOp::SubAssign => VMOpcode::Sub,
        AssignOp::MulAssign => VMOpcode::Mul,
        AssignOp::DivAssign => VMOpcode::Div,
        AssignOp::ModAssign => VMOpcode::Mod,
        AssignOp::AndAssign => VMOpcode::BitwiseAnd,
        AssignOp::OrAssign => VMOpcode::BitwiseOr,
        AssignOp::XorAssign => VMOpcode::BitwiseXor,
        AssignOp::ShlAssign => VMOpcode::ShiftLeft,
        AssignOp::ShrAssign => VMOpcode::ShiftRight,
        AssignOp::Assign => unreachable!("plain assignment has no combining opcode"),
    }
}

impl BytecodeEmitter {
    pub(super) fn emit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLiteral(value) => self.emit_literal(*value),
            Expr::StringLiteral(_) => {
                // Only meaningful as printf's first argument; handled there.
            }
            Expr::Ident(name) => self.emit_load_ident(name),
            Expr::ArrayIndex { name, index } => self.emit_array_load(name, index),
            Expr::Unary { op, expr } => self.emit_unary(*op, expr),
            Expr::Binary { op: BinOp::And, lhs, rhs } => self.emit_and(lhs, rhs),
            Expr::Binary { op: BinOp::Or, lhs, rhs } => self.emit_or(lhs, rhs),
            Expr::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs);
                self.emit_expr(rhs);
                let opcode = binop_opcode(*op);
                if is_comparison(*op) {
                    // The guest's only numeric type is a signed `int`.
                    self.emit(Instruction::new(opcode, InstructionFlags::SIGNED, 0));
                } else {
                    self.emit(Instruction::plain(opcode, 0));
                }
            }
            Expr::Ternary { cond, then_expr, else_expr } => self.emit_ternary(cond, then_expr, else_expr),
            Expr::Assign { target, op, value } => self.emit_assign(target, *op, value),
            Expr::Call { name, args } => self.emit_call(name, args),
        }
    }

    fn emit_literal(&mut self, value: i64) {
        if (0..=i64::from(u16::MAX)).contains(&value) {
            self.emit(Instruction::plain(VMOpcode::Push, value as u16));
        } else if (-32768..0).contains(&value) {
            self.emit(signed_push(value as i32));
        } else {
            self.errors.push(CompileError::LiteralOutOfRange(value));
        }
    }

    fn emit_load_ident(&mut self, name: &str) {
        match self.symbols.lookup(name).map(|s| s.storage) {
            Some(Storage::Global(idx)) => {
                self.emit(Instruction::plain(VMOpcode::LoadGlobal, idx));
            }
            Some(Storage::Local(idx)) => {
                self.emit(Instruction::plain(VMOpcode::LoadLocal, idx));
            }
            _ => self.errors.push(CompileError::UndefinedIdentifier { name: name.to_string() }),
        }
    }

    fn emit_store_ident(&mut self, name: &str) {
        match self.symbols.lookup(name).map(|s| s.storage) {
            Some(Storage::Global(idx)) => {
                self.emit(Instruction::plain(VMOpcode::StoreGlobal, idx));
            }
            Some(Storage::Local(idx)) => {
                self.emit(Instruction::plain(VMOpcode::StoreLocal, idx));
            }
            _ => self.errors.push(CompileError::UndefinedIdentifier { name: name.to_string() }),
        }
    }

    fn array_id(&mut self, name: &str) -> Option<u16> {
        match self.symbols.lookup(name).map(|s| s.storage) {
            Some(Storage::Array(id)) => Some(id),
            _ => {
                self.errors.push(CompileError::UndefinedIdentifier { name: name.to_string() });
                None
            }
        }
    }

    fn emit_array_load(&mut self, name: &str, index: &Expr) {
        self.emit_expr(index);
        if let Some(id) = self.array_id(name) {
            self.emit(Instruction::plain(VMOpcode::LoadArray, id));
        }
    }

    fn emit_unary(&mut self, op: UnOp, expr: &Expr) {
        // Constant-fold `- INTEGER` into a single PUSH, per the emission rules.
        if op == UnOp::Neg {
            if let Expr::IntLiteral(value) = expr {
                self.emit_literal(-value);
                return;
            }
        }
        self.emit_expr(expr);
        match op {
            UnOp::Neg => {
                // ADD/SUB pop `(a, b)` as `(earlier, later)`, so negating a
                // computed value (rather than folding a literal above) goes
                // through `x * -1` instead of fighting operand order on SUB.
                self.emit(signed_push(-1));
                self.emit(Instruction::plain(VMOpcode::Mul, 0));
            }
            UnOp::Not => {
                self.emit(Instruction::plain(VMOpcode::Not, 0));
            }
            UnOp::BitNot => {
                self.emit(Instruction::plain(VMOpcode::BitwiseNot, 0));
            }
        }
    }

    fn emit_and(&mut self, lhs: &Expr, rhs: &Expr) {
        self.emit_expr(lhs);
        let false_jump = self.emit_jump_placeholder(VMOpcode::JmpFalse);
        self.emit_expr(rhs);
        let end_jump = self.emit_jump_placeholder(VMOpcode::Jmp);
        self.patch_jump_here(false_jump);
        self.emit(Instruction::plain(VMOpcode::Push, 0));
        self.patch_jump_here(end_jump);
    }

    fn emit_or(&mut self, lhs: &Expr, rhs: &Expr) {
        self.emit_expr(lhs);
        let true_jump = self.emit_jump_placeholder(VMOpcode::JmpTrue);
        self.emit_expr(rhs);
        let end_jump = self.emit_jump_placeholder(VMOpcode::Jmp);
        self.patch_jump_here(true_jump);
        self.emit(Instruction::plain(VMOpcode::Push, 1));
        self.patch_jump_here(end_jump);
    }

    fn emit_ternary(&mut self, cond: &Expr, then_expr: &Expr, else_expr: &Expr) {
        self.emit_expr(cond);
        let else_jump = self.emit_jump_placeholder(VMOpcode::JmpFalse);
        self.emit_expr(then_expr);
        let end_jump = self.emit_jump_placeholder(VMOpcode::Jmp);
        self.patch_jump_here(else_jump);
        self.emit_expr(else_expr);
        self.patch_jump_here(end_jump);
    }

    fn emit_assign(&mut self, target: &AssignTarget, op: AssignOp, value: &Expr) {
        match (target, op) {
            (AssignTarget::Ident(name), AssignOp::Assign) => {
                self.emit_expr(value);
                self.emit_store_ident(name);
            }
            (AssignTarget::Ident(name), _) => {
                self.emit_load_ident(name);
                self.emit_expr(value);
                self.emit(Instruction::plain(compound_opcode(op), 0));
                self.emit_store_ident(name);
            }
            (AssignTarget::ArrayIndex { name, index }, AssignOp::Assign) => {
                self.emit_expr(index);
                self.emit_expr(value);
                if let Some(id) = self.array_id(name) {
                    self.emit(Instruction::plain(VMOpcode::StoreArray, id));
                }
            }
            (AssignTarget::ArrayIndex { name, index }, _) => {
                // No DUP/SWAP in this ISA: the index is evaluated twice, once
                // kept underneath for the eventual store and once consumed
                // by the load.
                self.emit_expr(index);
                self.emit_expr(index);
                if let Some(id) = self.array_id(name) {
                    self.emit(Instruction::plain(VMOpcode::LoadArray, id));
                    self.emit_expr(value);
                    self.emit(Instruction::plain(compound_opcode(op), 0));
                    self.emit(Instruction::plain(VMOpcode::StoreArray, id));
                }
            }
        }
    }

    fn emit_call(&mut self, name: &str, args: &[Expr]) {
        if name == "printf" {
            self.emit_printf(args);
            return;
        }
        if BUILTIN_NAMES.contains(&name) {
            self.emit_builtin(name, args);
            return;
        }
        for arg in args {
            self.emit_expr(arg);
        }
        self.emit_call_placeholder(name);
    }

    fn emit_builtin(&mut self, name: &str, args: &[Expr]) {
        match name {
            "delay" => {
                if let Some(arg) = args.first() {
                    self.emit_expr(arg);
                }
                // The guest passes milliseconds; DELAY consumes nanoseconds.
                // 1_000_000 doesn't fit in the 16-bit immediate, so the
                // factor is split into two representable pushes: 1000 * 1000.
                self.emit(Instruction::plain(VMOpcode::Push, 1_000));
                self.emit(Instruction::plain(VMOpcode::Mul, 0));
                self.emit(Instruction::plain(VMOpcode::Push, 1_000));
                self.emit(Instruction::plain(VMOpcode::Mul, 0));
                self.emit(Instruction::plain(VMOpcode::Delay, 0));
            }
            "millis" => {
                self.emit(Instruction::plain(VMOpcode::Millis, 0));
            }
            "micros" => {
                self.emit(Instruction::plain(VMOpcode::Micros, 0));
            }
            "pinMode" => {
                self.emit_args_reversed(args);
                self.emit(Instruction::plain(VMOpcode::PinMode, 0));
            }
            "digitalWrite" => {
                self.emit_args_reversed(args);
                self.emit(Instruction::plain(VMOpcode::DigitalWrite, 0));
            }
            "digitalRead" => {
                for arg in args {
                    self.emit_expr(arg);
                }
                self.emit(Instruction::plain(VMOpcode::DigitalRead, 0));
            }
            "analogWrite" => {
                self.emit_args_reversed(args);
                self.emit(Instruction::plain(VMOpcode::AnalogWrite, 0));
            }
            "analogRead" => {
                for arg in args {
                    self.emit_expr(arg);
                }
                self.emit(Instruction::plain(VMOpcode::AnalogRead, 0));
            }
            _ => unreachable!("emit_builtin called with non-builtin name {name}"),
        };
    }

    /// `pinMode`/`digitalWrite`/`analogWrite` pop `(value, pin)` in that
    /// order in `io_ops::dispatch`, i.e. pin pushed first.
    fn emit_args_reversed(&mut self, args: &[Expr]) {
        for arg in args {
            self.emit_expr(arg);
        }
    }

    fn emit_printf(&mut self, args: &[Expr]) {
        let Some(Expr::StringLiteral(fmt)) = args.first() else {
            self.errors.push(CompileError::PrintfFirstArgNotString);
            return;
        };
        let string_id = self.intern_string(fmt);
        let rest = &args[1..];
        if rest.len() > MAX_PRINTF_ARGS {
            self.errors.push(CompileError::TooManyPrintfArgs);
            return;
        }
        for arg in rest {
            self.emit_expr(arg);
        }
        self.emit(Instruction::plain(VMOpcode::Push, rest.len() as u16));
        self.emit(Instruction::plain(VMOpcode::Printf, string_id));
    }
}
