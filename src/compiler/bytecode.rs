//! Instructions and compiled code units, as handed to the VM.
//!
//! Registers are absolute indices into the frame. Literal and sub-code
//! operands index into the owning [`Code`]'s tables.
//!
//! For example, `a = x => x + 3; a(4)` compiles to
//!
//! ```text
//! == CODE regs 3, refs 0 ==
//! 0000 CREATE_LAMBDA r1 arity 1, refs 0, code 0
//! 0001 STORE_LOCAL r0 <- r1
//! 0002 READ_LOCAL r1 <- r0
//! 0003 STORE r2 4
//! 0004 INVOKE r1 r1 args 1
//! 0005 RETURN r1
//! == (id: 0) CODE regs 3, refs 0 ==
//!   0000 READ_LOCAL r1 <- r0
//!   0001 STORE r2 3
//!   0002 CALL_OP r1 r1 lit 0
//!   0003 RETURN r1
//!   == LITERALS ==
//!   0: "+"
//! ```
use core::fmt;

pub type Reg = usize;

/// Value stored by [`Instruction::Store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    Int(i64),
    Bool(bool),
    Nil,
    /// literal table index
    Str(usize),
    /// literal table index
    Atom(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `dst = value`
    Store { dst: Reg, value: Immediate },
    /// `dst = recv.literal(recv + 1)`
    CallOp { dst: Reg, recv: Reg, lit: usize },
    /// `dst = recv.literal(recv + 1, ..., recv + argc)`
    CallN {
        dst: Reg,
        recv: Reg,
        argc: usize,
        lit: usize,
    },
    /// `dst = recv.literal()`
    Call0 { dst: Reg, recv: Reg, lit: usize },
    GotoIfFalse { cond: Reg, target: usize },
    Goto { target: usize },
    /// assignment to a local register
    StoreLocal { local: Reg, src: Reg },
    /// assignment through a ref cell
    StoreRef { slot: usize, src: Reg },
    ReadLocal { dst: Reg, local: Reg },
    ReadRef { dst: Reg, slot: usize },
    /// `dst = target(target + 1, ..., target + argc)`
    Invoke { dst: Reg, target: Reg, argc: usize },
    /// Build a closure over `code`. It is followed by `refs` capture
    /// operands, each a `ReadRef { dst: 0, slot }` naming the creating
    /// unit's ref cell to hand over, in the callee's ref order.
    CreateLambda {
        dst: Reg,
        arity: usize,
        refs: usize,
        code: usize,
    },
    Return { src: Reg },
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Nil => write!(f, "nil"),
            Self::Str(lit) => write!(f, "str lit {lit}"),
            Self::Atom(lit) => write!(f, "atom lit {lit}"),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Store { dst, value } => write!(f, "STORE r{dst} {value}"),
            Self::CallOp { dst, recv, lit } => write!(f, "CALL_OP r{dst} r{recv} lit {lit}"),
            Self::CallN {
                dst,
                recv,
                argc,
                lit,
            } => write!(f, "CALL_N r{dst} r{recv} args {argc} lit {lit}"),
            Self::Call0 { dst, recv, lit } => write!(f, "CALL_0 r{dst} r{recv} lit {lit}"),
            Self::GotoIfFalse { cond, target } => write!(f, "GOTO_IF_FALSE r{cond} {target:04}"),
            Self::Goto { target } => write!(f, "GOTO {target:04}"),
            Self::StoreLocal { local, src } => write!(f, "STORE_LOCAL r{local} <- r{src}"),
            Self::StoreRef { slot, src } => write!(f, "STORE_REF ref{slot} <- r{src}"),
            Self::ReadLocal { dst, local } => write!(f, "READ_LOCAL r{dst} <- r{local}"),
            Self::ReadRef { dst, slot } => write!(f, "READ_REF r{dst} <- ref{slot}"),
            Self::Invoke { dst, target, argc } => write!(f, "INVOKE r{dst} r{target} args {argc}"),
            Self::CreateLambda {
                dst,
                arity,
                refs,
                code,
            } => write!(f, "CREATE_LAMBDA r{dst} arity {arity}, refs {refs}, code {code}"),
            Self::Return { src } => write!(f, "RETURN r{src}"),
        }
    }
}

/// One compiled unit: the top level or a lambda body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    /// registers the frame needs, locals included
    pub num_regs: usize,
    /// ref cells the frame needs, captured ones first
    pub num_refs: usize,
    pub instructions: Vec<Instruction>,
    pub literals: Vec<Box<str>>,
    /// lambda bodies, addressed by [`Instruction::CreateLambda::code`]
    pub sub_code: Vec<Code>,
}

impl Code {
    pub fn literal(&self, idx: usize) -> Option<&str> {
        self.literals.get(idx).map(AsRef::as_ref)
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        for (pos, insn) in self.instructions.iter().enumerate() {
            writeln!(f, "{pad}{pos:04} {insn}")?;
        }
        if !self.literals.is_empty() {
            writeln!(f, "{pad}== LITERALS ==")?;
            for (idx, lit) in self.literals.iter().enumerate() {
                writeln!(f, "{pad}{idx}: {lit:?}")?;
            }
        }
        for (id, sub) in self.sub_code.iter().enumerate() {
            writeln!(
                f,
                "{pad}== (id: {id}) CODE regs {}, refs {} ==",
                sub.num_regs, sub.num_refs
            )?;
            sub.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== CODE regs {}, refs {} ==", self.num_regs, self.num_refs)?;
        self.write_indented(f, 0)
    }
}
