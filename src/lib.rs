//! Front end for m13: turns a token stream into register bytecode.
//!
//! ```text
//! tokens -> parser -> ast -> compiler::scope -> compiler::generator -> Code
//! ```
//!
//! Lexing stays outside this crate. Anything producing [`token::Token`]s
//! terminated by [`token::TokenKind::Term`] can drive it.
use thiserror::Error;

pub mod ast;
pub mod compiler;
pub mod parser;
pub mod token;

pub use ast::Node;
pub use compiler::{Code, CompileError, Instruction};
pub use parser::{Grammar, ParseError, Precedence};
pub use token::{Token, TokenKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Parse and compile a token stream with the default grammar
pub fn compile(tokens: &[Token]) -> Result<Code, Error> {
    let mut node = parser::parse(tokens)?;
    Ok(compiler::compile(&mut node)?)
}

/// Parse and compile a token stream with a custom grammar
pub fn compile_with(grammar: &Grammar, tokens: &[Token]) -> Result<Code, Error> {
    let mut node = grammar.parse(tokens)?;
    Ok(compiler::compile(&mut node)?)
}
