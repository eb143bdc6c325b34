//! Lowering of a resolved syntax tree into register bytecode.
//!
//! One [`Generator`] compiles one unit. Expression results always land in the
//! register at `sp`; sub-expressions borrow the registers above it and give
//! them back once they are done, so nothing leaks between statements.
use lasso::{Key, Rodeo};

use super::{
    bytecode::{Code, Immediate, Instruction, Reg},
    scope::{self, Scope},
    CompileError,
};
use crate::ast::{Binding, Lambda, Node};

#[derive(Debug)]
pub struct Generator {
    seq: Vec<Instruction>,
    sp: Reg,
    high_water: Reg,
    literals: Rodeo,
    sub_units: Vec<Generator>,
    scope: Scope,
}

impl Generator {
    fn new(scope: Scope) -> Self {
        let sp = scope.num_locals();
        Self {
            seq: vec![],
            sp,
            high_water: sp,
            literals: Rodeo::new(),
            sub_units: vec![],
            scope,
        }
    }

    /// Resolve and compile a whole program
    pub fn generate_top(node: &mut Node) -> Result<Code, CompileError> {
        let scope = scope::resolve_program(node)?;
        let mut generator = Self::new(scope);
        generator.generate(node)?;
        generator.emit_return();
        Ok(generator.into_code())
    }

    /// Compile the body of an already resolved lambda
    pub fn generate_lambda(lambda: &Lambda) -> Result<Self, CompileError> {
        let scope = lambda
            .scope
            .clone()
            .ok_or_else(|| CompileError::Unresolved("<lambda>".into()))?;
        let mut generator = Self::new(scope);

        for &(reg, slot) in generator.scope.boxed_params() {
            generator.seq.push(Instruction::StoreRef { slot, src: reg });
        }

        generator.generate(&lambda.body)?;
        generator.emit_return();
        Ok(generator)
    }

    pub fn into_code(self) -> Code {
        let code = Code {
            num_regs: self.high_water + 1,
            num_refs: self.scope.num_refs(),
            instructions: self.seq,
            literals: self.literals.strings().map(Box::from).collect(),
            sub_code: self.sub_units.into_iter().map(Self::into_code).collect(),
        };
        log::debug!(
            "finished unit: {} instructions, {} regs, {} refs",
            code.instructions.len(),
            code.num_regs,
            code.num_refs
        );
        code
    }

    fn literal(&mut self, name: &str) -> usize {
        self.literals.get_or_intern(name).into_usize()
    }

    fn emit(&mut self, insn: Instruction) -> usize {
        self.seq.push(insn);
        self.seq.len() - 1
    }

    fn emit_return(&mut self) {
        let src = self.scope.num_locals();
        self.emit(Instruction::Return { src });
    }

    fn store(&mut self, value: Immediate) {
        let dst = self.sp;
        self.emit(Instruction::Store { dst, value });
    }

    fn push(&mut self) {
        self.sp += 1;
        self.high_water = self.high_water.max(self.sp);
    }

    fn read(&mut self, name: &str, binding: Option<Binding>) -> Result<(), CompileError> {
        let dst = self.sp;
        match binding {
            Some(Binding::Local(local)) => self.emit(Instruction::ReadLocal { dst, local }),
            Some(Binding::Ref(slot)) => self.emit(Instruction::ReadRef { dst, slot }),
            None => return Err(CompileError::Unresolved(name.into())),
        };
        Ok(())
    }

    /// Generate each argument into the registers after `sp`, leaving `sp`
    /// where it was
    fn arguments(&mut self, args: &[Node]) -> Result<(), CompileError> {
        let base = self.sp;
        for arg in args {
            self.push();
            self.generate(arg)?;
        }
        self.sp = base;
        Ok(())
    }

    fn step(&mut self, receiver: &Node, op: &'static str) -> Result<(), CompileError> {
        let reg = match receiver {
            Node::Variable(var) => match var.binding {
                Some(Binding::Local(reg)) => reg,
                Some(Binding::Ref(_)) => {
                    return Err(CompileError::InvalidIncrement {
                        op,
                        kind: "captured variable",
                    })
                }
                None => return Err(CompileError::Unresolved(var.name.clone())),
            },
            other => {
                return Err(CompileError::InvalidIncrement {
                    op,
                    kind: other.kind(),
                })
            }
        };
        let lit = self.literal(op);
        self.emit(Instruction::Call0 {
            dst: reg,
            recv: reg,
            lit,
        });
        Ok(())
    }

    fn lambda(&mut self, lambda: &Lambda) -> Result<(), CompileError> {
        let sub = Self::generate_lambda(lambda)?;

        let slots = sub
            .scope
            .captured()
            .map(|name| {
                self.scope
                    .ref_index(name)
                    .ok_or_else(|| CompileError::MissingCapture(name.into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let code = self.sub_units.len();
        self.sub_units.push(sub);
        log::trace!("lambda sub-unit {code} captures {} refs", slots.len());

        let dst = self.sp;
        self.emit(Instruction::CreateLambda {
            dst,
            arity: lambda.params.len(),
            refs: slots.len(),
            code,
        });
        for slot in slots {
            self.emit(Instruction::ReadRef { dst: 0, slot });
        }
        Ok(())
    }

    /// Emit code leaving the value of `node` in the register at `sp`
    pub fn generate(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Integer(i) => self.store(Immediate::Int(*i)),
            Node::String(s) => {
                let lit = self.literal(s);
                self.store(Immediate::Str(lit));
            }
            Node::Atom(a) => {
                let lit = self.literal(a);
                self.store(Immediate::Atom(lit));
            }
            Node::True => self.store(Immediate::Bool(true)),
            Node::False => self.store(Immediate::Bool(false)),
            Node::Nil => self.store(Immediate::Nil),
            Node::Op(op) => {
                self.generate(&op.left)?;
                self.push();
                self.generate(&op.right)?;
                self.sp -= 1;

                let lit = self.literal(&op.name);
                let reg = self.sp;
                self.emit(Instruction::CallOp {
                    dst: reg,
                    recv: reg,
                    lit,
                });
            }
            Node::Call(call) => {
                self.generate(&call.receiver)?;
                self.arguments(&call.args)?;

                let lit = self.literal(&call.method);
                let reg = self.sp;
                self.emit(Instruction::CallN {
                    dst: reg,
                    recv: reg,
                    argc: call.args.len(),
                    lit,
                });
            }
            Node::Invoke(invoke) => {
                self.read(&invoke.name, invoke.binding)?;
                self.arguments(&invoke.args)?;

                let target = self.sp;
                self.emit(Instruction::Invoke {
                    dst: target,
                    target,
                    argc: invoke.args.len(),
                });
            }
            Node::Block(block) => {
                if block.expressions.is_empty() {
                    self.store(Immediate::Nil);
                }
                for expr in &block.expressions {
                    self.generate(expr)?;
                }
            }
            Node::If(cond) => {
                self.generate(&cond.cond)?;
                let reg = self.sp;
                let patch = self.emit(Instruction::GotoIfFalse {
                    cond: reg,
                    target: 0,
                });

                self.generate(&cond.body)?;

                self.seq[patch] = Instruction::GotoIfFalse {
                    cond: reg,
                    target: self.seq.len(),
                };
            }
            Node::While(w) => {
                let start = self.seq.len();
                self.generate(&w.cond)?;
                let reg = self.sp;
                let patch = self.emit(Instruction::GotoIfFalse {
                    cond: reg,
                    target: 0,
                });

                self.generate(&w.body)?;
                self.emit(Instruction::Goto { target: start });

                self.seq[patch] = Instruction::GotoIfFalse {
                    cond: reg,
                    target: self.seq.len(),
                };
            }
            Node::Inc(receiver) => self.step(receiver, "++")?,
            Node::Dec(receiver) => self.step(receiver, "--")?,
            Node::Assign(assign) => {
                self.generate(&assign.value)?;
                let src = self.sp;
                match assign.binding {
                    Some(Binding::Local(local)) => self.emit(Instruction::StoreLocal { local, src }),
                    Some(Binding::Ref(slot)) => self.emit(Instruction::StoreRef { slot, src }),
                    None => return Err(CompileError::Unresolved(assign.name.clone())),
                };
            }
            Node::Variable(var) => self.read(&var.name, var.binding)?,
            Node::Lambda(lambda) => self.lambda(lambda)?,
            Node::Comment(_) => {}
            Node::IVar(_)
            | Node::Attribute(_)
            | Node::AttributeAssign(_)
            | Node::Import(_)
            | Node::Definition(_)
            | Node::Class(_)
            | Node::Has(_) => return Err(CompileError::Unsupported(node.kind())),
        }
        Ok(())
    }
}
