//! Compile a syntax tree into register bytecode.
//!
//! Compilation runs in two passes over each unit. [`scope`] decides where
//! every name lives, then [`generator`] walks the annotated tree and emits
//! [`bytecode::Code`]. See the [`bytecode`] module for what the output
//! looks like.
use thiserror::Error;

use crate::ast::{Lambda, Node};

pub mod bytecode;
pub mod generator;
pub mod scope;

pub use bytecode::{Code, Immediate, Instruction};
pub use generator::Generator;
pub use scope::Scope;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("cannot compile {0} yet")]
    Unsupported(&'static str),
    #[error("cannot apply {op} to {kind}, expected a local variable")]
    InvalidIncrement { op: &'static str, kind: &'static str },
    #[error("undefined variable `{0}`")]
    UndefinedVariable(Box<str>),
    #[error("`{0}` reached code generation without being resolved")]
    Unresolved(Box<str>),
    #[error("captured variable `{0}` is not available in the enclosing scope")]
    MissingCapture(Box<str>),
}

/// Compile a full program. The tree gets annotated with its bindings along
/// the way.
pub fn compile(node: &mut Node) -> Result<Code, CompileError> {
    Generator::generate_top(node)
}

/// Compile a lambda body on its own, resolving it first if needed
pub fn compile_lambda(lambda: &mut Lambda) -> Result<Code, CompileError> {
    if lambda.scope.is_none() {
        scope::resolve_lambda(lambda)?;
    }
    Ok(Generator::generate_lambda(lambda)?.into_code())
}
