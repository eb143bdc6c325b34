//! Syntax tree produced by the grammar actions.
//!
//! Nodes that name a variable carry an empty [`Binding`] slot that the scope
//! resolver fills in before code generation. Lambdas likewise get their
//! resolved [`Scope`] attached.
use crate::compiler::scope::Scope;

/// Where a resolved name lives at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// register index in the unit's frame
    Local(usize),
    /// index into the unit's ref table
    Ref(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Integer(i64),
    String(Box<str>),
    Atom(Box<str>),
    True,
    False,
    Nil,
    Variable(Variable),
    IVar(Box<str>),
    Op(Op),
    Attribute(Attribute),
    AttributeAssign(AttributeAssign),
    Call(Call),
    Invoke(Invoke),
    Block(Block),
    If(If),
    While(While),
    Inc(Box<Node>),
    Dec(Box<Node>),
    Assign(Assign),
    Lambda(Lambda),
    Import(Import),
    Definition(Definition),
    Class(ClassDefinition),
    Has(Has),
    Comment(Box<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Box<str>,
    pub binding: Option<Binding>,
}

/// A binary operator application, `left name right`
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub name: Box<str>,
    pub left: Box<Node>,
    pub right: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub receiver: Box<Node>,
    pub name: Box<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAssign {
    pub receiver: Box<Node>,
    pub name: Box<str>,
    pub value: Box<Node>,
}

/// `receiver.method(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Box<Node>,
    pub method: Box<str>,
    pub args: Vec<Node>,
}

/// `name(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    pub name: Box<str>,
    pub args: Vec<Node>,
    pub binding: Option<Binding>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub expressions: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub cond: Box<Node>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub cond: Box<Node>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub name: Box<str>,
    pub value: Box<Node>,
    pub binding: Option<Binding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Box<str>>,
    pub body: Box<Node>,
    pub scope: Option<Scope>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub path: Vec<Box<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: Box<str>,
    pub params: Vec<Box<str>>,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub name: Box<str>,
    pub body: Box<Node>,
}

/// `has @ivar is Trait...`
#[derive(Debug, Clone, PartialEq)]
pub struct Has {
    pub variable: Box<str>,
    pub traits: Vec<Box<str>>,
}

impl Node {
    /// Name of the node type, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Atom(_) => "atom",
            Self::True => "true",
            Self::False => "false",
            Self::Nil => "nil",
            Self::Variable(_) => "variable",
            Self::IVar(_) => "instance variable",
            Self::Op(_) => "operator",
            Self::Attribute(_) => "attribute",
            Self::AttributeAssign(_) => "attribute assignment",
            Self::Call(_) => "method call",
            Self::Invoke(_) => "invocation",
            Self::Block(_) => "block",
            Self::If(_) => "if",
            Self::While(_) => "while",
            Self::Inc(_) => "increment",
            Self::Dec(_) => "decrement",
            Self::Assign(_) => "assignment",
            Self::Lambda(_) => "lambda",
            Self::Import(_) => "import",
            Self::Definition(_) => "definition",
            Self::Class(_) => "class definition",
            Self::Has(_) => "has",
            Self::Comment(_) => "comment",
        }
    }

    pub fn variable(name: impl AsRef<str>) -> Self {
        Self::Variable(Variable {
            name: Box::from(name.as_ref()),
            binding: None,
        })
    }

    pub fn op(name: impl AsRef<str>, left: Node, right: Node) -> Self {
        Self::Op(Op {
            name: Box::from(name.as_ref()),
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn call(receiver: Node, method: impl AsRef<str>, args: Vec<Node>) -> Self {
        Self::Call(Call {
            receiver: Box::new(receiver),
            method: Box::from(method.as_ref()),
            args,
        })
    }

    pub fn invoke(name: impl AsRef<str>, args: Vec<Node>) -> Self {
        Self::Invoke(Invoke {
            name: Box::from(name.as_ref()),
            args,
            binding: None,
        })
    }

    pub fn assign(name: impl AsRef<str>, value: Node) -> Self {
        Self::Assign(Assign {
            name: Box::from(name.as_ref()),
            value: Box::new(value),
            binding: None,
        })
    }

    pub fn lambda<S: AsRef<str>>(params: impl IntoIterator<Item = S>, body: Node) -> Self {
        Self::Lambda(Lambda {
            params: params.into_iter().map(|p| Box::from(p.as_ref())).collect(),
            body: Box::new(body),
            scope: None,
        })
    }

    pub fn block(expressions: Vec<Node>) -> Self {
        Self::Block(Block { expressions })
    }
}
