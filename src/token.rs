//! Tokens as handed over by the lexer.
//!
//! Lexing source text is not done here. Whatever produces the token stream
//! only has to respect this shape and finish the stream with [`TokenKind::Term`].
use std::ops::Range;

/// Byte range of a token in its source
pub type Span = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Integer,
    String,
    Atom,
    /// identifiers, and also operator names like `+` or `add`
    Word,
    /// `@name`
    IVar,
    True,
    False,
    Nil,
    Dot,
    Comma,
    Semi,
    Newline,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    /// `=>`
    Into,
    Equal,
    /// `++`
    Inc,
    /// `--`
    Dec,
    Import,
    Def,
    Class,
    Has,
    Is,
    If,
    While,
    Comment,
    /// end of input
    Term,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenValue {
    #[default]
    None,
    Int(i64),
    Str(Box<str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            value: TokenValue::None,
            span: 0..0,
        }
    }

    fn with_str(kind: TokenKind, text: impl AsRef<str>) -> Self {
        Self {
            kind,
            value: TokenValue::Str(Box::from(text.as_ref())),
            span: 0..0,
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            kind: TokenKind::Integer,
            value: TokenValue::Int(value),
            span: 0..0,
        }
    }

    pub fn word(text: impl AsRef<str>) -> Self {
        Self::with_str(TokenKind::Word, text)
    }

    pub fn string(text: impl AsRef<str>) -> Self {
        Self::with_str(TokenKind::String, text)
    }

    pub fn atom(text: impl AsRef<str>) -> Self {
        Self::with_str(TokenKind::Atom, text)
    }

    pub fn ivar(text: impl AsRef<str>) -> Self {
        Self::with_str(TokenKind::IVar, text)
    }

    pub fn comment(text: impl AsRef<str>) -> Self {
        Self::with_str(TokenKind::Comment, text)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            TokenValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }
}
