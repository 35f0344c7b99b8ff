//! Diagnostics produced while compiling a program tree to bytecode.
//! Every fallible step in this crate returns one of these, collected
//! (never short-circuited) into a `Vec<CompileError>` by the emitter so
//! a single pass reports every problem it finds.

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("duplicate declaration")]
    DuplicateDeclaration { name: String },
    #[error("Undefined identifier")]
    UndefinedIdentifier { name: String },
    #[error("Undefined label")]
    UndefinedLabel { label: String },
    #[error("Undefined function")]
    UndefinedFunction { name: String },
    #[error("jump offset out of range")]
    JumpOffsetOutOfRange,
    #[error("call target out of range")]
    CallTargetOutOfRange,
    #[error("32-bit integer literal {0} is not representable in this revision's 16-bit immediate")]
    LiteralOutOfRange(i64),
    #[error("printf accepts at most 8 arguments")]
    TooManyPrintfArgs,
    #[error("the first argument to printf must be a string literal")]
    PrintfFirstArgNotString,
    #[error("array length must be in 1..=64")]
    ArrayLengthInvalid,
    #[error("no more than 16 arrays may be declared")]
    TooManyArrays,
}
