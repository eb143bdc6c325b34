//! The m13 grammar, declared on top of [`rule`](super::rule).
//!
//! Binary operators are parsed by one permissive right-recursive rule,
//! `expr OP expr`, and precedence is patched up afterwards by
//! [`reassociate`]. It only rotates once per reduction: the enclosing
//! reductions are what fix up longer chains, pairwise.
use std::sync::Arc;

use super::{
    precedence::Precedence,
    rule::{
        map, map_seq, maybe, nth, or, plus, star, token, ActionError, GrammarError, RuleRef,
        RuleSet, RuleValue, Rules,
    },
};
use crate::{
    ast::{self, Attribute, AttributeAssign, ClassDefinition, Definition, Lambda, Node, Op},
    token::TokenKind::{self, *},
};

fn take(values: &mut [RuleValue], idx: usize) -> RuleValue {
    values.get_mut(idx).map(std::mem::take).unwrap_or_default()
}

fn node(node: Node) -> RuleValue {
    RuleValue::Node(node)
}

/// `first (another)*` flattened into a single sequence
fn list_of(first: RuleRef, another: RuleRef) -> RuleRef {
    map_seq([first, star(another)], |mut v| {
        let mut items = vec![take(&mut v, 0)];
        items.extend(take(&mut v, 1).into_seq()?);
        Ok(RuleValue::Seq(items))
    })
}

fn names_of(value: RuleValue) -> Result<Vec<Box<str>>, ActionError> {
    value
        .into_seq()?
        .into_iter()
        .map(RuleValue::into_text)
        .collect()
}

fn separator() -> RuleRef {
    plus(or([token(Semi), token(Newline)]))
}

fn text_node(kind: TokenKind, build: fn(Box<str>) -> Node) -> RuleRef {
    map(token(kind), move |v| Ok(node(build(v.into_text()?))))
}

fn constant(kind: TokenKind, value: Node) -> RuleRef {
    map(token(kind), move |_| Ok(node(value.clone())))
}

fn keyword_name(kind: TokenKind, name: &'static str) -> RuleRef {
    map(token(kind), move |_| Ok(RuleValue::Name(Box::from(name))))
}

/// Rotate `left op (rl rop rr)` into `(left op rl) rop rr` when `op` binds
/// tighter than `rop`. One step only.
pub fn reassociate(precedence: &Precedence, left: Node, name: Box<str>, right: Node) -> Node {
    match right {
        Node::Op(inner) if precedence.of(&name) > precedence.of(&inner.name) => Node::Op(Op {
            name: inner.name,
            left: Box::new(Node::Op(Op {
                name,
                left: Box::new(left),
                right: inner.left,
            })),
            right: inner.right,
        }),
        right => Node::Op(Op {
            name,
            left: Box::new(left),
            right: Box::new(right),
        }),
    }
}

pub fn build(precedence: Precedence) -> Result<RuleSet, GrammarError> {
    let precedence = Arc::new(precedence);
    let mut r = Rules::new();

    let expr = r.forward();
    let stmt = r.forward();

    let stmt_list = list_of(stmt.rule(), nth([separator(), stmt.rule()], 1));

    let prim = or([
        map(token(Integer), |v| {
            let token = v.into_token()?;
            let value = token.as_int().ok_or(ActionError::Shape {
                expected: "integer value",
                found: "token",
            })?;
            Ok(node(Node::Integer(value)))
        }),
        text_node(String, Node::String),
        text_node(Atom, Node::Atom),
        map(token(Word), |v| Ok(node(Node::variable(v.into_text()?)))),
        text_node(IVar, Node::IVar),
        constant(True, Node::True),
        constant(False, Node::False),
        constant(Nil, Node::Nil),
    ]);

    let attr_name = or([
        map(token(Word), |v| Ok(RuleValue::Name(v.into_text()?))),
        keyword_name(Class, "class"),
        keyword_name(Import, "import"),
        keyword_name(Def, "def"),
        keyword_name(Has, "has"),
        keyword_name(Is, "is"),
        keyword_name(If, "if"),
        keyword_name(While, "while"),
    ]);

    let attr_access = map_seq([expr.rule(), token(Dot), attr_name], |mut v| {
        Ok(node(Node::Attribute(Attribute {
            receiver: Box::new(take(&mut v, 0).into_node()?),
            name: take(&mut v, 2).into_name()?,
        })))
    });

    let prim_call0 = map_seq(
        [
            expr.rule(),
            token(Dot),
            token(Word),
            token(OpenParen),
            token(CloseParen),
        ],
        |mut v| {
            Ok(node(Node::call(
                take(&mut v, 0).into_node()?,
                take(&mut v, 2).into_text()?,
                vec![],
            )))
        },
    );

    let arg_list = list_of(expr.rule(), nth([token(Comma), expr.rule()], 1));

    let prim_call_n = map_seq(
        [
            expr.rule(),
            token(Dot),
            token(Word),
            token(OpenParen),
            arg_list.clone(),
            token(CloseParen),
        ],
        |mut v| {
            Ok(node(Node::call(
                take(&mut v, 0).into_node()?,
                take(&mut v, 2).into_text()?,
                take(&mut v, 4).into_nodes()?,
            )))
        },
    );

    let invoke = map_seq(
        [
            token(Word),
            token(OpenParen),
            maybe(arg_list),
            token(CloseParen),
        ],
        |mut v| {
            let args = match take(&mut v, 2) {
                RuleValue::Nothing => vec![],
                args => args.into_nodes()?,
            };
            Ok(node(Node::invoke(take(&mut v, 0).into_text()?, args)))
        },
    );

    let brace_body = map_seq(
        [
            token(OpenBrace),
            maybe(separator()),
            maybe(stmt_list.clone()),
            maybe(separator()),
            token(CloseBrace),
        ],
        |mut v| {
            let expressions = match take(&mut v, 2) {
                RuleValue::Nothing => vec![],
                stmts => stmts.into_nodes()?,
            };
            Ok(node(Node::Block(ast::Block { expressions })))
        },
    );

    let lambda_body = or([brace_body.clone(), expr.rule()]);

    let lambda0 = map_seq([token(Into), lambda_body.clone()], |mut v| {
        Ok(node(Node::Lambda(Lambda {
            params: vec![],
            body: Box::new(take(&mut v, 1).into_node()?),
            scope: None,
        })))
    });

    let lambda1 = map_seq([token(Word), token(Into), lambda_body.clone()], |mut v| {
        Ok(node(Node::Lambda(Lambda {
            params: vec![take(&mut v, 0).into_text()?],
            body: Box::new(take(&mut v, 2).into_node()?),
            scope: None,
        })))
    });

    let arg_def_list = map_seq(
        [
            token(OpenParen),
            list_of(token(Word), nth([token(Comma), token(Word)], 1)),
            token(CloseParen),
        ],
        |mut v| Ok(RuleValue::Names(names_of(take(&mut v, 1))?)),
    );

    let lambda_n = map_seq(
        [arg_def_list.clone(), token(Into), lambda_body],
        |mut v| {
            Ok(node(Node::Lambda(Lambda {
                params: take(&mut v, 0).into_names()?,
                body: Box::new(take(&mut v, 2).into_node()?),
                scope: None,
            })))
        },
    );

    let op = map_seq([expr.rule(), token(Word), expr.rule()], move |mut v| {
        let left = take(&mut v, 0).into_node()?;
        let name = take(&mut v, 1).into_text()?;
        let right = take(&mut v, 2).into_node()?;
        Ok(node(reassociate(&precedence, left, name, right)))
    });

    // Left-recursive alternatives go before invoke and prim. Seed growth
    // stops at the first alternative that matches without getting longer.
    expr.define(or([
        lambda_n,
        lambda1,
        lambda0,
        prim_call_n,
        prim_call0,
        attr_access,
        op,
        invoke,
        prim,
    ]))?;

    let attr_assign = map_seq([expr.rule(), token(Equal), expr.rule()], |mut v| {
        let value = take(&mut v, 2).into_node()?;
        match take(&mut v, 0).into_node()? {
            Node::Variable(var) => Ok(node(Node::assign(var.name, value))),
            Node::Attribute(attr) => Ok(node(Node::AttributeAssign(AttributeAssign {
                receiver: attr.receiver,
                name: attr.name,
                value: Box::new(value),
            }))),
            other => Err(ActionError::Unassignable(other.kind())),
        }
    });

    let assign = map_seq([token(Word), token(Equal), expr.rule()], |mut v| {
        Ok(node(Node::assign(
            take(&mut v, 0).into_text()?,
            take(&mut v, 2).into_node()?,
        )))
    });

    let import_path = list_of(token(Word), nth([token(Dot), token(Word)], 1));

    let import = map_seq([token(Import), import_path], |mut v| {
        Ok(node(Node::Import(ast::Import {
            path: names_of(take(&mut v, 1))?,
        })))
    });

    let def = map_seq(
        [
            token(Def),
            token(Word),
            maybe(arg_def_list),
            brace_body.clone(),
        ],
        |mut v| {
            let params = match take(&mut v, 2) {
                RuleValue::Nothing => vec![],
                names => names.into_names()?,
            };
            Ok(node(Node::Definition(Definition {
                name: take(&mut v, 1).into_text()?,
                params,
                body: Box::new(take(&mut v, 3).into_node()?),
            })))
        },
    );

    let class = map_seq([token(Class), token(Word), brace_body.clone()], |mut v| {
        Ok(node(Node::Class(ClassDefinition {
            name: take(&mut v, 1).into_text()?,
            body: Box::new(take(&mut v, 2).into_node()?),
        })))
    });

    let comment = text_node(Comment, Node::Comment);

    let has_traits = map(plus(nth([token(Is), token(Word)], 1)), |v| {
        Ok(RuleValue::Names(names_of(v)?))
    });

    let has = map_seq([token(Has), token(IVar), maybe(has_traits)], |mut v| {
        let traits = match take(&mut v, 2) {
            RuleValue::Nothing => vec![],
            traits => traits.into_names()?,
        };
        Ok(node(Node::Has(ast::Has {
            variable: take(&mut v, 1).into_text()?,
            traits,
        })))
    });

    let if_ = map_seq([token(If), expr.rule(), brace_body.clone()], |mut v| {
        Ok(node(Node::If(ast::If {
            cond: Box::new(take(&mut v, 1).into_node()?),
            body: Box::new(take(&mut v, 2).into_node()?),
        })))
    });

    let while_ = map_seq([token(While), expr.rule(), brace_body], |mut v| {
        Ok(node(Node::While(ast::While {
            cond: Box::new(take(&mut v, 1).into_node()?),
            body: Box::new(take(&mut v, 2).into_node()?),
        })))
    });

    let inc = map_seq([expr.rule(), token(Inc)], |mut v| {
        Ok(node(Node::Inc(Box::new(take(&mut v, 0).into_node()?))))
    });

    let dec = map_seq([expr.rule(), token(Dec)], |mut v| {
        Ok(node(Node::Dec(Box::new(take(&mut v, 0).into_node()?))))
    });

    stmt.define(or([
        comment,
        import,
        class,
        def,
        has,
        if_,
        while_,
        attr_assign,
        assign,
        inc,
        dec,
        expr.rule(),
    ]))?;

    let root = map_seq(
        [maybe(separator()), stmt_list, maybe(separator()), token(Term)],
        |mut v| {
            let mut stmts = take(&mut v, 1).into_nodes()?;
            if stmts.len() == 1 {
                Ok(node(stmts.remove(0)))
            } else {
                Ok(node(Node::block(stmts)))
            }
        },
    );

    r.finish(root)
}
