//! Scope resolution: decides, per unit (the top level or one lambda body),
//! which names live in registers and which live in ref cells.
//!
//! A unit's ref table starts with the names it captures from its enclosing
//! unit, in first-use order. After those come its own variables that some
//! nested lambda captures ("boxed" names): those have to live in a cell so
//! both the unit and the closure see the same value.
use indexmap::{IndexMap, IndexSet};

use super::CompileError;
use crate::ast::{Binding, Lambda, Node};

/// The resolved, frozen scope of one unit
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    locals: IndexMap<Box<str>, usize>,
    refs: IndexSet<Box<str>>,
    captured: usize,
    /// parameters that are boxed, as (register, ref slot)
    boxed_params: Vec<(usize, usize)>,
}

impl Scope {
    /// Registers taken by locals; expression evaluation starts above them
    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn num_refs(&self) -> usize {
        self.refs.len()
    }

    /// Names this unit receives from its enclosing unit, in ref order
    pub fn captured(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().take(self.captured).map(AsRef::as_ref)
    }

    pub fn num_captured(&self) -> usize {
        self.captured
    }

    pub fn refs(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().map(AsRef::as_ref)
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, usize)> {
        self.locals.iter().map(|(name, reg)| (name.as_ref(), *reg))
    }

    pub fn local(&self, name: &str) -> Option<usize> {
        self.locals.get(name).copied()
    }

    pub fn ref_index(&self, name: &str) -> Option<usize> {
        self.refs.get_index_of(name)
    }

    /// Refs win over locals: a boxed parameter keeps its register for the
    /// incoming argument, but is used through its cell.
    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.ref_index(name)
            .map(Binding::Ref)
            .or_else(|| self.local(name).map(Binding::Local))
    }

    /// Parameters whose incoming register has to be copied into a cell on
    /// entry, as (register, ref slot)
    pub fn boxed_params(&self) -> &[(usize, usize)] {
        &self.boxed_params
    }
}

/// Names seen while walking one unit, before it is closed
#[derive(Debug, Default)]
struct Usage {
    assigned: IndexSet<Box<str>>,
    /// every name read here or captured by a nested lambda
    used: IndexSet<Box<str>>,
    /// names some nested lambda captures
    captured_by_children: IndexSet<Box<str>>,
}

impl Usage {
    fn declares(&self, params: &[Box<str>], name: &str) -> bool {
        params.iter().any(|p| **p == *name) || self.assigned.contains(name)
    }

    fn close(self, params: &[Box<str>]) -> Scope {
        let mut refs: IndexSet<Box<str>> = self
            .used
            .iter()
            .filter(|name| !self.declares(params, name))
            .cloned()
            .collect();
        let captured = refs.len();

        // parameters first, then assigned names, in first-occurrence order
        let declared = params.iter().chain(
            self.assigned
                .iter()
                .filter(|name| !params.contains(name)),
        );

        let mut locals = IndexMap::new();
        let mut boxed_params = vec![];
        for name in declared {
            let boxed = self.captured_by_children.contains(name);
            let is_param = params.contains(name);
            if boxed {
                let (slot, _) = refs.insert_full(name.clone());
                if is_param {
                    boxed_params.push((locals.len(), slot));
                }
            }
            if is_param || !boxed {
                let reg = locals.len();
                locals.insert(name.clone(), reg);
            }
        }

        Scope {
            locals,
            refs,
            captured,
            boxed_params,
        }
    }
}

/// Resolve the top level unit rooted at `node`, annotating every name in it
/// and in all nested lambdas.
pub fn resolve_program(node: &mut Node) -> Result<Scope, CompileError> {
    let mut usage = Usage::default();
    collect(node, &mut usage)?;
    let scope = usage.close(&[]);

    if let Some(name) = scope.captured().next() {
        return Err(CompileError::UndefinedVariable(Box::from(name)));
    }

    annotate(node, &scope)?;
    log::trace!(
        "resolved top level: {} locals, {} refs",
        scope.num_locals(),
        scope.num_refs()
    );
    Ok(scope)
}

/// Resolve a lambda in isolation, attaching its scope to it
pub fn resolve_lambda(lambda: &mut Lambda) -> Result<(), CompileError> {
    let mut usage = Usage::default();
    collect(&mut lambda.body, &mut usage)?;
    let scope = usage.close(&lambda.params);
    annotate(&mut lambda.body, &scope)?;
    lambda.scope = Some(scope);
    Ok(())
}

fn collect(node: &mut Node, usage: &mut Usage) -> Result<(), CompileError> {
    match node {
        Node::Variable(var) => {
            usage.used.insert(var.name.clone());
        }
        Node::Invoke(invoke) => {
            usage.used.insert(invoke.name.clone());
            for arg in &mut invoke.args {
                collect(arg, usage)?;
            }
        }
        Node::Assign(assign) => {
            usage.assigned.insert(assign.name.clone());
            collect(&mut assign.value, usage)?;
        }
        Node::Lambda(lambda) => {
            resolve_lambda(lambda)?;
            if let Some(scope) = &lambda.scope {
                for name in scope.captured() {
                    usage.used.insert(Box::from(name));
                    usage.captured_by_children.insert(Box::from(name));
                }
            }
        }
        Node::Op(op) => {
            collect(&mut op.left, usage)?;
            collect(&mut op.right, usage)?;
        }
        Node::Call(call) => {
            collect(&mut call.receiver, usage)?;
            for arg in &mut call.args {
                collect(arg, usage)?;
            }
        }
        Node::Block(block) => {
            for expr in &mut block.expressions {
                collect(expr, usage)?;
            }
        }
        Node::If(cond) => {
            collect(&mut cond.cond, usage)?;
            collect(&mut cond.body, usage)?;
        }
        Node::While(w) => {
            collect(&mut w.cond, usage)?;
            collect(&mut w.body, usage)?;
        }
        Node::Inc(recv) | Node::Dec(recv) => collect(recv, usage)?,
        Node::Attribute(attr) => collect(&mut attr.receiver, usage)?,
        Node::AttributeAssign(assign) => {
            collect(&mut assign.receiver, usage)?;
            collect(&mut assign.value, usage)?;
        }
        // literals, and structural nodes that the generator does not lower
        Node::Integer(_)
        | Node::String(_)
        | Node::Atom(_)
        | Node::True
        | Node::False
        | Node::Nil
        | Node::IVar(_)
        | Node::Import(_)
        | Node::Definition(_)
        | Node::Class(_)
        | Node::Has(_)
        | Node::Comment(_) => {}
    }
    Ok(())
}

fn bind(scope: &Scope, name: &str) -> Result<Binding, CompileError> {
    scope
        .binding(name)
        .ok_or_else(|| CompileError::UndefinedVariable(Box::from(name)))
}

/// Fill in bindings for one unit. Lambda bodies were already annotated
/// against their own scope while collecting.
fn annotate(node: &mut Node, scope: &Scope) -> Result<(), CompileError> {
    match node {
        Node::Variable(var) => var.binding = Some(bind(scope, &var.name)?),
        Node::Invoke(invoke) => {
            invoke.binding = Some(bind(scope, &invoke.name)?);
            for arg in &mut invoke.args {
                annotate(arg, scope)?;
            }
        }
        Node::Assign(assign) => {
            assign.binding = Some(bind(scope, &assign.name)?);
            annotate(&mut assign.value, scope)?;
        }
        Node::Lambda(_) => {}
        Node::Op(op) => {
            annotate(&mut op.left, scope)?;
            annotate(&mut op.right, scope)?;
        }
        Node::Call(call) => {
            annotate(&mut call.receiver, scope)?;
            for arg in &mut call.args {
                annotate(arg, scope)?;
            }
        }
        Node::Block(block) => {
            for expr in &mut block.expressions {
                annotate(expr, scope)?;
            }
        }
        Node::If(cond) => {
            annotate(&mut cond.cond, scope)?;
            annotate(&mut cond.body, scope)?;
        }
        Node::While(w) => {
            annotate(&mut w.cond, scope)?;
            annotate(&mut w.body, scope)?;
        }
        Node::Inc(recv) | Node::Dec(recv) => annotate(recv, scope)?,
        Node::Attribute(attr) => annotate(&mut attr.receiver, scope)?,
        Node::AttributeAssign(assign) => {
            annotate(&mut assign.receiver, scope)?;
            annotate(&mut assign.value, scope)?;
        }
        Node::Integer(_)
        | Node::String(_)
        | Node::Atom(_)
        | Node::True
        | Node::False
        | Node::Nil
        | Node::IVar(_)
        | Node::Import(_)
        | Node::Definition(_)
        | Node::Class(_)
        | Node::Has(_)
        | Node::Comment(_) => {}
    }
    Ok(())
}
