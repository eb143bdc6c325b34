//! Parsing picks up where the lexer left off: a token stream goes in, a
//! syntax tree comes out.
//!
//! The grammar is built once from combinators in [`rule`] and is immutable
//! afterwards, so a single [`Grammar`] can serve any number of parses.
use std::sync::LazyLock;

use crate::{ast::Node, token::Token};

pub mod grammar;
pub mod precedence;
pub mod rule;

pub use precedence::Precedence;
pub use rule::{ActionError, GrammarError, ParseError};

#[derive(Debug)]
pub struct Grammar {
    rules: rule::RuleSet,
}

impl Grammar {
    pub fn new(precedence: Precedence) -> Result<Self, GrammarError> {
        Ok(Self {
            rules: grammar::build(precedence)?,
        })
    }

    /// Parse a whole token stream, which must end with [`TokenKind::Term`](crate::token::TokenKind::Term)
    pub fn parse(&self, tokens: &[Token]) -> Result<Node, ParseError> {
        into_tree(self.rules.parse(tokens)?)
    }
}

fn into_tree(value: rule::RuleValue) -> Result<Node, ParseError> {
    value.into_node().map_err(ParseError::Root)
}

static DEFAULT_GRAMMAR: LazyLock<Result<Grammar, GrammarError>> =
    LazyLock::new(|| Grammar::new(Precedence::default()));

/// The grammar with the default operator precedence
pub fn default_grammar() -> Result<&'static Grammar, GrammarError> {
    DEFAULT_GRAMMAR.as_ref().map_err(Clone::clone)
}

pub fn parse(tokens: &[Token]) -> Result<Node, ParseError> {
    default_grammar()?.parse(tokens)
}
