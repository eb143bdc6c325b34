//! A small backtracking combinator engine over a token slice.
//!
//! Rules form a DAG of [`Arc`]s. Recursion goes through [`Forward`] cells:
//! a rule body only holds a weak handle to the cell, the cell itself is owned
//! by the finished [`RuleSet`], so a cyclic grammar never becomes a cyclic
//! value graph.
//!
//! Forward references are also where memoization lives. Results are cached
//! per (forward, position) for the length of one parse, and a forward that
//! re-enters itself at the same position is grown from a seed, which lets
//! the grammar be written left-recursively (`expr . name`, `expr op expr`).
use core::fmt;
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    ast::Node,
    token::{Span, Token, TokenKind},
};

pub type RuleRef = Arc<Rule>;

/// Semantic action run over the value of a successful match
pub type Action = Arc<dyn Fn(RuleValue) -> Result<RuleValue, ActionError> + Send + Sync>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("forward rule {0} was never defined")]
    Unresolved(usize),
    #[error("forward rule {0} was defined twice")]
    Redefined(usize),
}

/// Failure raised from inside a semantic action. These never backtrack.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("can't assign to {0}")]
    Unassignable(&'static str),
    #[error("expected {expected}, found {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected {} at token {position}", describe(.found))]
    Unexpected {
        position: usize,
        found: Option<TokenKind>,
        span: Option<Span>,
    },
    #[error("invalid syntax at token {position}: {source}")]
    Action {
        position: usize,
        span: Option<Span>,
        source: ActionError,
    },
    /// the root rule matched but its value is not a syntax tree
    #[error("root rule did not produce a tree: {0}")]
    Root(#[source] ActionError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

fn describe(found: &Option<TokenKind>) -> String {
    match found {
        Some(kind) => format!("{kind:?}"),
        None => "end of input".to_string(),
    }
}

/// Untyped result of a match, taken apart again by the grammar actions
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RuleValue {
    /// an optional rule that matched nothing
    #[default]
    Nothing,
    Token(Token),
    Node(Node),
    Name(Box<str>),
    Names(Vec<Box<str>>),
    Seq(Vec<RuleValue>),
}

impl RuleValue {
    fn shape(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Token(_) => "token",
            Self::Node(_) => "node",
            Self::Name(_) => "name",
            Self::Names(_) => "name list",
            Self::Seq(_) => "sequence",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ActionError {
        ActionError::Shape {
            expected,
            found: self.shape(),
        }
    }

    pub fn into_token(self) -> Result<Token, ActionError> {
        match self {
            Self::Token(token) => Ok(token),
            other => Err(other.mismatch("token")),
        }
    }

    pub fn into_node(self) -> Result<Node, ActionError> {
        match self {
            Self::Node(node) => Ok(node),
            other => Err(other.mismatch("node")),
        }
    }

    pub fn into_seq(self) -> Result<Vec<RuleValue>, ActionError> {
        match self {
            Self::Seq(values) => Ok(values),
            other => Err(other.mismatch("sequence")),
        }
    }

    pub fn into_name(self) -> Result<Box<str>, ActionError> {
        match self {
            Self::Name(name) => Ok(name),
            other => Err(other.mismatch("name")),
        }
    }

    pub fn into_names(self) -> Result<Vec<Box<str>>, ActionError> {
        match self {
            Self::Names(names) => Ok(names),
            other => Err(other.mismatch("name list")),
        }
    }

    /// A sequence whose items are all nodes
    pub fn into_nodes(self) -> Result<Vec<Node>, ActionError> {
        self.into_seq()?
            .into_iter()
            .map(RuleValue::into_node)
            .collect()
    }

    /// The text carried by a token value (words, strings, atoms...)
    pub fn into_text(self) -> Result<Box<str>, ActionError> {
        let token = self.into_token()?;
        match token.value {
            crate::token::TokenValue::Str(text) => Ok(text),
            _ => Err(ActionError::Shape {
                expected: "text token",
                found: "token",
            }),
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

pub enum Rule {
    Terminal(TokenKind),
    Sequence(Vec<RuleRef>),
    /// ordered choice, first success wins
    Alternation(Vec<RuleRef>),
    Repeat {
        rule: RuleRef,
        min: usize,
        max: Option<usize>,
    },
    Map {
        rule: RuleRef,
        action: Action,
    },
    Forward(ForwardRef),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(kind) => write!(f, "{kind:?}"),
            Self::Sequence(rules) => f.debug_tuple("Seq").field(rules).finish(),
            Self::Alternation(rules) => f.debug_tuple("Or").field(rules).finish(),
            Self::Repeat { rule, min, max } => f
                .debug_struct("Repeat")
                .field("rule", rule)
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Map { rule, .. } => f.debug_tuple("Map").field(rule).finish(),
            // don't follow forwards, the graph is cyclic through them
            Self::Forward(fwd) => write!(f, "Forward({})", fwd.id),
        }
    }
}

pub fn token(kind: TokenKind) -> RuleRef {
    Arc::new(Rule::Terminal(kind))
}

pub fn seq(rules: impl Into<Vec<RuleRef>>) -> RuleRef {
    Arc::new(Rule::Sequence(rules.into()))
}

pub fn or(rules: impl Into<Vec<RuleRef>>) -> RuleRef {
    Arc::new(Rule::Alternation(rules.into()))
}

/// zero or more
pub fn star(rule: RuleRef) -> RuleRef {
    Arc::new(Rule::Repeat {
        rule,
        min: 0,
        max: None,
    })
}

/// one or more
pub fn plus(rule: RuleRef) -> RuleRef {
    Arc::new(Rule::Repeat {
        rule,
        min: 1,
        max: None,
    })
}

/// zero or one, yielding [`RuleValue::Nothing`] when absent
pub fn maybe(rule: RuleRef) -> RuleRef {
    Arc::new(Rule::Repeat {
        rule,
        min: 0,
        max: Some(1),
    })
}

pub fn map<F>(rule: RuleRef, action: F) -> RuleRef
where
    F: Fn(RuleValue) -> Result<RuleValue, ActionError> + Send + Sync + 'static,
{
    Arc::new(Rule::Map {
        rule,
        action: Arc::new(action),
    })
}

/// Sequence of `rules` whose item values are handed to `action`
pub fn map_seq<F>(rules: impl Into<Vec<RuleRef>>, action: F) -> RuleRef
where
    F: Fn(Vec<RuleValue>) -> Result<RuleValue, ActionError> + Send + Sync + 'static,
{
    map(seq(rules), move |value| action(value.into_seq()?))
}

/// Sequence that keeps only its `n`th item
pub fn nth(rules: impl Into<Vec<RuleRef>>, n: usize) -> RuleRef {
    map_seq(rules, move |values| {
        values.into_iter().nth(n).ok_or(ActionError::Shape {
            expected: "sequence item",
            found: "nothing",
        })
    })
}

/// Handle to a rule defined after it is first referenced
#[derive(Debug)]
pub struct Forward {
    id: usize,
    cell: Arc<OnceLock<RuleRef>>,
}

/// What rule bodies hold: a weak pointer to the forward's cell
#[derive(Debug, Clone)]
pub struct ForwardRef {
    id: usize,
    cell: Weak<OnceLock<RuleRef>>,
}

impl Forward {
    pub fn id(&self) -> usize {
        self.id
    }

    /// A rule that defers to whatever gets [`define`](Self::define)d here
    pub fn rule(&self) -> RuleRef {
        Arc::new(Rule::Forward(ForwardRef {
            id: self.id,
            cell: Arc::downgrade(&self.cell),
        }))
    }

    pub fn define(&self, rule: RuleRef) -> Result<(), GrammarError> {
        self.cell
            .set(rule)
            .map_err(|_| GrammarError::Redefined(self.id))
    }
}

/// Builder handing out forward cells. Keeps the cells alive until
/// [`finish`](Self::finish) moves them into the [`RuleSet`].
#[derive(Debug, Default)]
pub struct Rules {
    forwards: Vec<Arc<OnceLock<RuleRef>>>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self) -> Forward {
        let cell = Arc::new(OnceLock::new());
        self.forwards.push(cell.clone());
        Forward {
            id: self.forwards.len() - 1,
            cell,
        }
    }

    /// Seal the grammar. Every forward must have been defined by now.
    pub fn finish(self, root: RuleRef) -> Result<RuleSet, GrammarError> {
        if let Some(id) = self.forwards.iter().position(|cell| cell.get().is_none()) {
            return Err(GrammarError::Unresolved(id));
        }
        Ok(RuleSet {
            root,
            forwards: self.forwards,
        })
    }
}

/// A finished, immutable grammar
#[derive(Debug)]
pub struct RuleSet {
    root: RuleRef,
    /// owns the forward cells, rule bodies only hold weak handles
    forwards: Vec<Arc<OnceLock<RuleRef>>>,
}

impl RuleSet {
    /// Match the root against the whole token slice
    pub fn parse(&self, tokens: &[Token]) -> Result<RuleValue, ParseError> {
        log::trace!(
            "parsing {} tokens with {} forward rules",
            tokens.len(),
            self.forwards.len()
        );
        let mut state = State::new(tokens);
        match self.root.apply(0, &mut state)? {
            Some(m) if m.end == tokens.len() => Ok(m.value),
            Some(m) => {
                // matched, but something is left over
                state.reach(m.end);
                Err(state.unexpected())
            }
            None => Err(state.unexpected()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub value: RuleValue,
    /// position right after the last consumed token
    pub end: usize,
}

#[derive(Debug, Clone)]
enum Memo {
    /// being computed; `recursed` is set once it re-entered itself
    Pending { recursed: bool },
    Resolved(Option<Match>),
}

/// Per-parse state: the input, the forward memo table, and how far we got.
#[derive(Debug)]
pub struct State<'t> {
    tokens: &'t [Token],
    memo: HashMap<(usize, usize), Memo>,
    furthest: usize,
}

impl<'t> State<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            memo: HashMap::new(),
            furthest: 0,
        }
    }

    fn reach(&mut self, pos: usize) {
        self.furthest = self.furthest.max(pos);
    }

    fn span_at(&self, pos: usize) -> Option<Span> {
        self.tokens.get(pos).map(|t| t.span.clone())
    }

    fn unexpected(&self) -> ParseError {
        let error = ParseError::Unexpected {
            position: self.furthest,
            found: self.tokens.get(self.furthest).map(|t| t.kind),
            span: self.span_at(self.furthest),
        };
        log::debug!("parse failed: {error}");
        error
    }
}

impl Rule {
    /// Try to match at `pos`. `Ok(None)` is an ordinary failure the caller may
    /// backtrack from; `Err` aborts the whole parse.
    pub fn apply(&self, pos: usize, state: &mut State) -> Result<Option<Match>, ParseError> {
        match self {
            Self::Terminal(kind) => {
                state.reach(pos);
                Ok(state
                    .tokens
                    .get(pos)
                    .filter(|tok| tok.kind == *kind)
                    .map(|tok| Match {
                        value: RuleValue::Token(tok.clone()),
                        end: pos + 1,
                    }))
            }
            Self::Sequence(rules) => {
                let mut values = Vec::with_capacity(rules.len());
                let mut cursor = pos;
                for rule in rules {
                    let Some(m) = rule.apply(cursor, state)? else {
                        return Ok(None);
                    };
                    values.push(m.value);
                    cursor = m.end;
                }
                Ok(Some(Match {
                    value: RuleValue::Seq(values),
                    end: cursor,
                }))
            }
            Self::Alternation(rules) => {
                for rule in rules {
                    if let Some(m) = rule.apply(pos, state)? {
                        return Ok(Some(m));
                    }
                }
                Ok(None)
            }
            Self::Repeat { rule, min, max } => {
                let mut values = vec![];
                let mut cursor = pos;
                while max.map_or(true, |max| values.len() < max) {
                    let Some(m) = rule.apply(cursor, state)? else {
                        break;
                    };
                    let progressed = m.end > cursor;
                    values.push(m.value);
                    cursor = m.end;
                    if !progressed {
                        break;
                    }
                }
                if values.len() < *min {
                    return Ok(None);
                }
                let value = if *max == Some(1) {
                    values.pop().unwrap_or(RuleValue::Nothing)
                } else {
                    RuleValue::Seq(values)
                };
                Ok(Some(Match { value, end: cursor }))
            }
            Self::Map { rule, action } => {
                let Some(m) = rule.apply(pos, state)? else {
                    return Ok(None);
                };
                let value = action(m.value).map_err(|source| ParseError::Action {
                    position: pos,
                    span: state.span_at(pos),
                    source,
                })?;
                Ok(Some(Match { value, end: m.end }))
            }
            Self::Forward(fwd) => fwd.apply(pos, state),
        }
    }
}

impl ForwardRef {
    fn apply(&self, pos: usize, state: &mut State) -> Result<Option<Match>, ParseError> {
        let key = (self.id, pos);
        match state.memo.get_mut(&key) {
            Some(Memo::Pending { recursed }) => {
                *recursed = true;
                return Ok(None);
            }
            Some(Memo::Resolved(m)) => return Ok(m.clone()),
            None => {}
        }

        let unresolved = || ParseError::Grammar(GrammarError::Unresolved(self.id));
        let cell = self.cell.upgrade().ok_or_else(unresolved)?;
        let target = cell.get().ok_or_else(unresolved)?;

        state.memo.insert(key, Memo::Pending { recursed: false });
        let mut best = target.apply(pos, state)?;

        let recursed = matches!(
            state.memo.get(&key),
            Some(Memo::Pending { recursed: true })
        );
        if recursed {
            // grow the seed until the match stops getting longer
            while let Some(seed) = &best {
                let seed_end = seed.end;
                log::trace!("growing rule {} at {pos} past {seed_end}", self.id);
                state.memo.insert(key, Memo::Resolved(best.clone()));
                // other results at this position may have been built on the
                // previous seed
                state.memo.retain(|&(id, at), memo| {
                    at != pos || id == self.id || matches!(memo, Memo::Pending { .. })
                });
                match target.apply(pos, state)? {
                    Some(grown) if grown.end > seed_end => best = Some(grown),
                    _ => break,
                }
            }
        }

        state.memo.insert(key, Memo::Resolved(best.clone()));
        Ok(best)
    }
}
