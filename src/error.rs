//! Fatal compilation errors.
//!
//! Every error aborts the compilation; the binary prints the message and
//! exits nonzero. Hash-key overflows are deliberately not represented here,
//! they only downgrade the affected caching mode.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("type {0} is ambiguous")]
    AmbiguousType(String),

    #[error("supertype not found: {0}")]
    UnknownSupertype(String),

    #[error("type {0} not defined")]
    UnknownType(String),

    #[error("object name {0} is ambiguous")]
    AmbiguousObject(String),

    #[error("object {0} not defined")]
    UnknownObject(String),

    #[error("variable name {0} is ambiguous")]
    AmbiguousVariable(String),

    #[error("variable {0} used but not defined")]
    UndefinedVariable(String),

    #[error("wrong number of parameters for variable {0}")]
    WrongParameterArity(String),

    #[error("CPF with same name exists already: {0}")]
    DuplicateCpf(String),

    #[error("no CPF defined for state fluent {0}")]
    MissingCpf(String),

    #[error("reward function exists already")]
    DuplicateReward,

    #[error("instance requires domain {required} but domain {given} was parsed")]
    DomainMismatch { required: String, given: String },

    #[error("found a precondition that evaluates to the constant \"false\"")]
    InfeasiblePrecondition,

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
