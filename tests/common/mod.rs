//! Shared integration test tooling: a source lexer and a reference VM.
#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use logos::Logos;
use m13::{
    compiler::Immediate,
    token::{Token, TokenKind},
    Code, Instruction,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
enum Lexeme {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),
    #[regex(r#""[^"]*""#, |lex| { let s = lex.slice(); Box::<str>::from(&s[1..s.len() - 1]) })]
    String(Box<str>),
    #[regex(r":[A-Za-z_][A-Za-z0-9_]*", |lex| Box::<str>::from(&lex.slice()[1..]))]
    Atom(Box<str>),
    #[regex(r"@[A-Za-z_][A-Za-z0-9_]*", |lex| Box::<str>::from(&lex.slice()[1..]))]
    IVar(Box<str>),
    #[regex(r"#[^\n]*", |lex| Box::<str>::from(lex.slice()[1..].trim()))]
    Comment(Box<str>),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| Box::<str>::from(lex.slice()))]
    #[regex(r"[+\-*/<>=!%&|^]+", |lex| Box::<str>::from(lex.slice()))]
    Word(Box<str>),
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,
    #[token("import")]
    Import,
    #[token("def")]
    Def,
    #[token("class")]
    Class,
    #[token("has")]
    Has,
    #[token("is")]
    Is,
    #[token("if")]
    If,
    #[token("while")]
    While,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("\n")]
    Newline,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("=>", priority = 5)]
    Into,
    #[token("=", priority = 5)]
    Equal,
    #[token("++", priority = 5)]
    Inc,
    #[token("--", priority = 5)]
    Dec,
}

impl Lexeme {
    fn into_token(self) -> Token {
        use TokenKind as K;
        match self {
            Lexeme::Integer(i) => Token::integer(i),
            Lexeme::String(s) => Token::string(s),
            Lexeme::Atom(s) => Token::atom(s),
            Lexeme::IVar(s) => Token::ivar(s),
            Lexeme::Comment(s) => Token::comment(s),
            Lexeme::Word(s) => Token::word(s),
            Lexeme::True => Token::new(K::True),
            Lexeme::False => Token::new(K::False),
            Lexeme::Nil => Token::new(K::Nil),
            Lexeme::Import => Token::new(K::Import),
            Lexeme::Def => Token::new(K::Def),
            Lexeme::Class => Token::new(K::Class),
            Lexeme::Has => Token::new(K::Has),
            Lexeme::Is => Token::new(K::Is),
            Lexeme::If => Token::new(K::If),
            Lexeme::While => Token::new(K::While),
            Lexeme::Dot => Token::new(K::Dot),
            Lexeme::Comma => Token::new(K::Comma),
            Lexeme::Semi => Token::new(K::Semi),
            Lexeme::Newline => Token::new(K::Newline),
            Lexeme::OpenParen => Token::new(K::OpenParen),
            Lexeme::CloseParen => Token::new(K::CloseParen),
            Lexeme::OpenBrace => Token::new(K::OpenBrace),
            Lexeme::CloseBrace => Token::new(K::CloseBrace),
            Lexeme::Into => Token::new(K::Into),
            Lexeme::Equal => Token::new(K::Equal),
            Lexeme::Inc => Token::new(K::Inc),
            Lexeme::Dec => Token::new(K::Dec),
        }
    }
}

/// Lex `src` into a terminated token stream
pub fn lex(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    for (lexeme, span) in Lexeme::lexer(src).spanned() {
        let lexeme = lexeme.map_err(|()| format!("bad input at {span:?}"))?;
        tokens.push(lexeme.into_token().with_span(span));
    }
    tokens.push(Token::new(TokenKind::Term).with_span(src.len()..src.len()));
    Ok(tokens)
}

pub fn compile(src: &str) -> Result<Code, m13::Error> {
    init_logger();
    let tokens = lex(src).unwrap_or_else(|err| panic!("{err}"));
    m13::compile(&tokens)
}

type Cell<'c> = Rc<RefCell<Value<'c>>>;

#[derive(Debug, Clone)]
pub struct Closure<'c> {
    code: &'c Code,
    arity: usize,
    cells: Vec<Cell<'c>>,
}

#[derive(Debug, Clone)]
pub enum Value<'c> {
    Int(i64),
    Bool(bool),
    Nil,
    Str(Rc<str>),
    Atom(Rc<str>),
    Lambda(Rc<Closure<'c>>),
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Str(a), Value::Str(b)) | (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value<'_> {
    fn truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Nil)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("no method `{method}` on {receiver}")]
    NoMethod { receiver: String, method: String },
    #[error("cannot invoke {0}")]
    NotCallable(String),
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("register or slot {0} out of range")]
    OutOfRange(usize),
    #[error("malformed code at {0}")]
    Malformed(usize),
    #[error("ran out of fuel")]
    OutOfFuel,
}

/// A small register machine, just enough to check what the compiler emits.
pub struct Vm {
    fuel: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self { fuel: 100_000 }
    }
}

impl Vm {
    pub fn run<'c>(&mut self, code: &'c Code) -> Result<Value<'c>, VmError> {
        self.exec(code, vec![], vec![])
    }

    fn exec<'c>(
        &mut self,
        code: &'c Code,
        args: Vec<Value<'c>>,
        mut refs: Vec<Cell<'c>>,
    ) -> Result<Value<'c>, VmError> {
        let mut regs = vec![Value::Nil; code.num_regs.max(args.len())];
        for (reg, arg) in args.into_iter().enumerate() {
            regs[reg] = arg;
        }
        while refs.len() < code.num_refs {
            refs.push(Rc::new(RefCell::new(Value::Nil)));
        }

        let get = |regs: &[Value<'c>], reg: usize| -> Result<Value<'c>, VmError> {
            regs.get(reg).cloned().ok_or(VmError::OutOfRange(reg))
        };
        let cell = |refs: &[Cell<'c>], slot: usize| -> Result<Cell<'c>, VmError> {
            refs.get(slot).cloned().ok_or(VmError::OutOfRange(slot))
        };
        let literal = move |lit: usize| -> Result<&'c str, VmError> {
            code.literal(lit).ok_or(VmError::OutOfRange(lit))
        };

        let mut pc = 0;
        loop {
            self.fuel = self.fuel.checked_sub(1).ok_or(VmError::OutOfFuel)?;
            let insn = *code.instructions.get(pc).ok_or(VmError::Malformed(pc))?;
            pc += 1;

            match insn {
                Instruction::Store { dst, value } => {
                    regs[dst] = match value {
                        Immediate::Int(i) => Value::Int(i),
                        Immediate::Bool(b) => Value::Bool(b),
                        Immediate::Nil => Value::Nil,
                        Immediate::Str(lit) => Value::Str(Rc::from(literal(lit)?)),
                        Immediate::Atom(lit) => Value::Atom(Rc::from(literal(lit)?)),
                    }
                }
                Instruction::CallOp { dst, recv, lit } => {
                    let args = [get(&regs, recv + 1)?];
                    regs[dst] = send(&get(&regs, recv)?, literal(lit)?, &args)?;
                }
                Instruction::CallN {
                    dst,
                    recv,
                    argc,
                    lit,
                } => {
                    let args = (recv + 1..=recv + argc)
                        .map(|reg| get(&regs, reg))
                        .collect::<Result<Vec<_>, _>>()?;
                    regs[dst] = send(&get(&regs, recv)?, literal(lit)?, &args)?;
                }
                Instruction::Call0 { dst, recv, lit } => {
                    regs[dst] = send(&get(&regs, recv)?, literal(lit)?, &[])?;
                }
                Instruction::GotoIfFalse { cond, target } => {
                    if !get(&regs, cond)?.truthy() {
                        pc = target;
                    }
                }
                Instruction::Goto { target } => pc = target,
                Instruction::StoreLocal { local, src } => regs[local] = get(&regs, src)?,
                Instruction::StoreRef { slot, src } => {
                    *cell(&refs, slot)?.borrow_mut() = get(&regs, src)?;
                }
                Instruction::ReadLocal { dst, local } => regs[dst] = get(&regs, local)?,
                Instruction::ReadRef { dst, slot } => {
                    regs[dst] = cell(&refs, slot)?.borrow().clone();
                }
                Instruction::Invoke { dst, target, argc } => {
                    let Value::Lambda(closure) = get(&regs, target)? else {
                        return Err(VmError::NotCallable(format!("{:?}", regs[target])));
                    };
                    if closure.arity != argc {
                        return Err(VmError::Arity {
                            expected: closure.arity,
                            got: argc,
                        });
                    }
                    let args = (target + 1..=target + argc)
                        .map(|reg| get(&regs, reg))
                        .collect::<Result<Vec<_>, _>>()?;
                    regs[dst] = self.exec(closure.code, args, closure.cells.clone())?;
                }
                Instruction::CreateLambda {
                    dst,
                    arity,
                    refs: count,
                    code: idx,
                } => {
                    let mut cells = Vec::with_capacity(count);
                    for _ in 0..count {
                        let Some(Instruction::ReadRef { slot, .. }) = code.instructions.get(pc)
                        else {
                            return Err(VmError::Malformed(pc));
                        };
                        cells.push(cell(&refs, *slot)?);
                        pc += 1;
                    }
                    let sub = code.sub_code.get(idx).ok_or(VmError::OutOfRange(idx))?;
                    regs[dst] = Value::Lambda(Rc::new(Closure {
                        code: sub,
                        arity,
                        cells,
                    }));
                }
                Instruction::Return { src } => return get(&regs, src),
            }
        }
    }
}

fn send<'c>(receiver: &Value<'c>, method: &str, args: &[Value<'c>]) -> Result<Value<'c>, VmError> {
    let no_method = || VmError::NoMethod {
        receiver: format!("{receiver:?}"),
        method: method.to_string(),
    };
    match (receiver, method, args) {
        (Value::Int(i), "++", []) => Ok(Value::Int(i + 1)),
        (Value::Int(i), "--", []) => Ok(Value::Int(i - 1)),
        (Value::Int(a), op, [Value::Int(b)]) => match op {
            "+" | "add" => Ok(Value::Int(a + b)),
            "-" | "sub" => Ok(Value::Int(a - b)),
            "*" | "mul" => Ok(Value::Int(a * b)),
            "/" | "div" if *b != 0 => Ok(Value::Int(a / b)),
            "%" if *b != 0 => Ok(Value::Int(a % b)),
            "<" => Ok(Value::Bool(a < b)),
            ">" => Ok(Value::Bool(a > b)),
            "<=" => Ok(Value::Bool(a <= b)),
            ">=" => Ok(Value::Bool(a >= b)),
            "==" => Ok(Value::Bool(a == b)),
            "!=" => Ok(Value::Bool(a != b)),
            _ => Err(no_method()),
        },
        (Value::Str(a), "+", [Value::Str(b)]) => Ok(Value::Str(Rc::from(format!("{a}{b}")))),
        (Value::Str(s), "size", []) => Ok(Value::Int(s.chars().count() as i64)),
        (left, "==", [right]) => Ok(Value::Bool(left == right)),
        _ => Err(no_method()),
    }
}

/// Compile and run `src`, panicking on any failure
pub fn eval(src: &str) -> Value<'static> {
    let code = Box::leak(Box::new(
        compile(src).unwrap_or_else(|err| panic!("failed to compile {src:?}: {err}")),
    ));
    Vm::default()
        .run(code)
        .unwrap_or_else(|err| panic!("failed to run {src:?}: {err}"))
}
