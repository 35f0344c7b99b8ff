//! The six end-to-end scenarios: hand-built `vm_compiler::ast` trees run
//! through the emitter and then through `ComponentVm`, with no parser
//! in between.

use vm_compiler::ast::*;
use vm_core::io::MockIoBackend;
use vm_core::{ComponentVm, VmError};

fn main_fn(body: Vec<Stmt>) -> Program {
    Program {
        items: vec![Item::Function(Function {
            name: "main".into(),
            return_type: Type::Int,
            params: vec![],
            body,
        })],
    }
}

fn vm_for(program: &Program) -> ComponentVm {
    let (instructions, strings) = vm_compiler::emit_program(program).expect("program should compile");
    let mut vm = ComponentVm::new(Box::new(MockIoBackend::new()));
    vm.load_program_with_strings(instructions, strings);
    vm
}

#[test]
fn scenario_1_arithmetic_identity() {
    // int main() { return 10 + 3 * 2 - 5; }
    let expr = Expr::Binary {
        op: BinOp::Sub,
        lhs: Box::new(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::IntLiteral(10)),
            rhs: Box::new(Expr::Binary {
                op: BinOp::Mul,
                lhs: Box::new(Expr::IntLiteral(3)),
                rhs: Box::new(Expr::IntLiteral(2)),
            }),
        }),
        rhs: Box::new(Expr::IntLiteral(5)),
    };
    let program = main_fn(vec![Stmt::Return(Some(expr))]);
    let mut vm = vm_for(&program);
    vm.execute_program().expect("halts successfully");
    assert_eq!(vm.peek_result(), Some(11));
}

#[test]
fn scenario_2_control_flow() {
    // int main() { int x = 0; if (1 < 2) x = 7; else x = 9; return x; }
    let program = main_fn(vec![
        Stmt::VarDecl { name: "x".into(), init: Some(Expr::IntLiteral(0)) },
        Stmt::If {
            cond: Expr::Binary {
                op: BinOp::Lt,
                lhs: Box::new(Expr::IntLiteral(1)),
                rhs: Box::new(Expr::IntLiteral(2)),
            },
            then_branch: vec![Stmt::Expr(Expr::Assign {
                target: AssignTarget::Ident("x".into()),
                op: AssignOp::Assign,
                value: Box::new(Expr::IntLiteral(7)),
            })],
            else_branch: Some(vec![Stmt::Expr(Expr::Assign {
                target: AssignTarget::Ident("x".into()),
                op: AssignOp::Assign,
                value: Box::new(Expr::IntLiteral(9)),
            })]),
        },
        Stmt::Return(Some(Expr::Ident("x".into()))),
    ]);
    let mut vm = vm_for(&program);
    vm.execute_program().expect("halts successfully");
    assert_eq!(vm.peek_result(), Some(7));
}

#[test]
fn scenario_3_loop_sum() {
    // int main() { int s=0; int i=1; while (i<=10) { s=s+i; i=i+1; } return s; }
    let program = main_fn(vec![
        Stmt::VarDecl { name: "s".into(), init: Some(Expr::IntLiteral(0)) },
        Stmt::VarDecl { name: "i".into(), init: Some(Expr::IntLiteral(1)) },
        Stmt::While {
            cond: Expr::Binary {
                op: BinOp::Le,
                lhs: Box::new(Expr::Ident("i".into())),
                rhs: Box::new(Expr::IntLiteral(10)),
            },
            body: vec![
                Stmt::Expr(Expr::Assign {
                    target: AssignTarget::Ident("s".into()),
                    op: AssignOp::Assign,
                    value: Box::new(Expr::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Expr::Ident("s".into())),
                        rhs: Box::new(Expr::Ident("i".into())),
                    }),
                }),
                Stmt::Expr(Expr::Assign {
                    target: AssignTarget::Ident("i".into()),
                    op: AssignOp::AddAssign,
                    value: Box::new(Expr::IntLiteral(1)),
                }),
            ],
        },
        Stmt::Return(Some(Expr::Ident("s".into()))),
    ]);
    let mut vm = vm_for(&program);
    vm.execute_program().expect("halts successfully");
    assert_eq!(vm.peek_result(), Some(55));
    assert!(vm.diagnostic_dump().instructions_executed > 40);
}

#[test]
fn scenario_4_array_round_trip() {
    // int a[3]; int main() { a[0]=10; a[1]=20; a[2]=30; return a[0]+a[1]+a[2]; }
    fn store(index: i64, value: i64) -> Stmt {
        Stmt::Expr(Expr::Assign {
            target: AssignTarget::ArrayIndex { name: "a".into(), index: Box::new(Expr::IntLiteral(index)) },
            op: AssignOp::Assign,
            value: Box::new(Expr::IntLiteral(value)),
        })
    }
    fn load(index: i64) -> Expr {
        Expr::ArrayIndex { name: "a".into(), index: Box::new(Expr::IntLiteral(index)) }
    }
    let program = Program {
        items: vec![
            Item::GlobalArray { name: "a".into(), ty: Type::Int, length: 3 },
            Item::Function(Function {
                name: "main".into(),
                return_type: Type::Int,
                params: vec![],
                body: vec![
                    store(0, 10),
                    store(1, 20),
                    store(2, 30),
                    Stmt::Return(Some(Expr::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Expr::Binary {
                            op: BinOp::Add,
                            lhs: Box::new(load(0)),
                            rhs: Box::new(load(1)),
                        }),
                        rhs: Box::new(load(2)),
                    })),
                ],
            }),
        ],
    };
    let mut vm = vm_for(&program);
    vm.execute_program().expect("halts successfully");
    assert_eq!(vm.peek_result(), Some(60));
}

#[test]
fn scenario_5_division_by_zero() {
    // int main() { int z=0; return 1/z; }
    let program = main_fn(vec![
        Stmt::VarDecl { name: "z".into(), init: Some(Expr::IntLiteral(0)) },
        Stmt::Return(Some(Expr::Binary {
            op: BinOp::Div,
            lhs: Box::new(Expr::IntLiteral(1)),
            rhs: Box::new(Expr::Ident("z".into())),
        })),
    ]);
    let mut vm = vm_for(&program);
    let err = vm.execute_program().expect_err("division by zero traps");
    assert_eq!(err, VmError::DivisionByZero);
    assert_eq!(vm.get_last_error(), VmError::DivisionByZero);
    assert!(vm.diagnostic_dump().instructions_executed >= 3);
}

#[test]
fn scenario_6_printf_trace() {
    // void setup() { printf("n=%d", 42); }
    let program = Program {
        items: vec![Item::Function(Function {
            name: "setup".into(),
            return_type: Type::Void,
            params: vec![],
            body: vec![Stmt::Expr(Expr::Call {
                name: "printf".into(),
                args: vec![Expr::StringLiteral("n=%d".into()), Expr::IntLiteral(42)],
            })],
        })],
    };
    let (instructions, strings) = vm_compiler::emit_program(&program).expect("program should compile");
    assert_eq!(strings.len(), 1);
    let executed_len = instructions.len() as u64;

    let mut vm = ComponentVm::new(Box::new(MockIoBackend::new()));
    vm.load_program_with_strings(instructions, strings);
    vm.execute_program().expect("halts successfully");

    let backend = vm
        .io_backend_mut()
        .as_any_mut()
        .downcast_mut::<MockIoBackend>()
        .expect("backend is the mock installed above");
    assert_eq!(backend.console, vec!["n=42".to_string()]);
    assert_eq!(vm.diagnostic_dump().instructions_executed, executed_len);
}
