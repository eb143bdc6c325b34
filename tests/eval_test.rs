mod common;

use arbitrary::Arbitrary;
use arbtest::arbtest;
use assert2::{check, let_assert};
use common::{compile, eval, lex, Value};
use m13::{compiler::CompileError, parser::ParseError, token::TokenKind, Error, Instruction};

#[test]
fn integer() {
    check!(eval("3") == Value::Int(3));
}

#[test]
fn lambda_with_a_local_parameter() {
    let code = compile("a = x => x + 3; a(4)").unwrap();
    let_assert!(
        Some(Instruction::CreateLambda { arity, refs, .. }) = code
            .instructions
            .iter()
            .find(|insn| matches!(insn, Instruction::CreateLambda { .. }))
    );
    check!(*arity == 1);
    check!(*refs == 0);
    check!(code.sub_code[0].num_refs == 0);

    check!(eval("a = x => x + 3; a(4)") == Value::Int(7));
}

#[test]
fn method_call() {
    let code = compile("3.add(4)").unwrap();
    let calls: Vec<_> = code
        .instructions
        .iter()
        .filter_map(|insn| match insn {
            Instruction::CallN { argc, lit, .. } => Some((*argc, code.literal(*lit))),
            _ => None,
        })
        .collect();
    check!(calls == [(1, Some("add"))]);

    check!(eval("3.add(4)") == Value::Int(7));
    check!(eval("10.sub(4).mul(2)") == Value::Int(12));
}

#[test]
fn assignment_and_step_tokens_are_not_operator_words() {
    let kinds = |src: &str| -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|token| token.kind).collect()
    };
    check!(
        kinds("a = b => a == b") == [
            TokenKind::Word,
            TokenKind::Equal,
            TokenKind::Word,
            TokenKind::Into,
            TokenKind::Word,
            TokenKind::Word,
            TokenKind::Word,
            TokenKind::Term
        ]
    );
    check!(
        kinds("i++ j-- <=") == [
            TokenKind::Word,
            TokenKind::Inc,
            TokenKind::Word,
            TokenKind::Dec,
            TokenKind::Word,
            TokenKind::Term
        ]
    );
}

#[test]
fn invocation_results_as_left_operands() {
    check!(eval("f = x => x; f(1) + 2") == Value::Int(3));
    check!(eval("f = x => x * 2; y = f(1) * 3; y") == Value::Int(6));
    check!(eval("f = x => x; f(5).add(2)") == Value::Int(7));
    check!(eval("f = => \"abc\"; f().size() - 1") == Value::Int(2));
    check!(eval("2 + \"ab\".size() * 3") == Value::Int(8));
}

#[test]
fn precedence() {
    check!(eval("1 + 2 * 3") == Value::Int(7));
    check!(eval("2 * 3 + 1") == Value::Int(7));
    check!(eval("1 - 2 - 3") == Value::Int(2));
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Op {
    Add,
    Mul,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Mul => "*",
        }
    }

    fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            Op::Add => a + b,
            Op::Mul => a * b,
        }
    }
}

#[test]
fn three_operand_chains_arbtest() {
    arbtest(|u| {
        let (a, b, c): (u8, u8, u8) = u.arbitrary()?;
        let (a, b, c) = (i64::from(a), i64::from(b), i64::from(c));
        let (first, second): (Op, Op) = u.arbitrary()?;

        let expected = match (first, second) {
            (Op::Add, Op::Mul) => first.apply(a, second.apply(b, c)),
            _ => second.apply(first.apply(a, b), c),
        };
        let src = format!("{a} {} {b} {} {c}", first.symbol(), second.symbol());
        check!(eval(&src) == Value::Int(expected), "{src}");
        Ok(())
    });
}

#[test]
fn literal_pool_is_shared_between_calls() {
    let code = compile("a = 1\nb = a + a + a\nb").unwrap();
    check!(code.literals.len() == 1);
    let ops = code
        .instructions
        .iter()
        .filter(|insn| matches!(insn, Instruction::CallOp { lit: 0, .. }))
        .count();
    check!(ops == 2);
}

#[test]
fn while_loop() {
    let src = "i = 0
s = 0
while i < 5 {
  s = s + i
  i++
}
s";
    check!(eval(src) == Value::Int(10));
}

#[test]
fn countdown() {
    check!(eval("n = 3; while n > 0 { n-- }; n") == Value::Int(0));
}

#[test]
fn if_without_else() {
    check!(eval("x = 1; if x < 2 { x = 5 }; x") == Value::Int(5));
    check!(eval("x = 1; if x > 2 { x = 5 }; x") == Value::Int(1));
}

#[test]
fn closures_share_the_captured_cell() {
    let src = "n = 10
get = => n
n = 20
get()";
    check!(eval(src) == Value::Int(20));
}

#[test]
fn closures_capture_through_nested_lambdas() {
    check!(eval("a = 7; f = => => a; g = f(); g()") == Value::Int(7));
    check!(eval("add = x => y => x + y; add3 = add(3); add3(4)") == Value::Int(7));
}

#[test]
fn recursion_through_a_captured_name() {
    let src = "fact = n => {
  r = 1
  if n > 1 { r = n * fact(n - 1) }
  r
}
fact(5)";
    check!(eval(src) == Value::Int(120));
}

#[test]
fn multiple_parameters() {
    check!(eval("f = (a, b) => a - b; f(10, 4)") == Value::Int(6));
}

#[test]
fn strings_and_atoms() {
    check!(eval("\"ab\" + \"cd\"") == Value::Str("abcd".into()));
    check!(eval("\"hello\".size()") == Value::Int(5));
    check!(eval(":ok == :ok") == Value::Bool(true));
}

#[test]
fn comments_are_ignored() {
    check!(eval("# setup\nx = 4\nx * x") == Value::Int(16));
}

#[test]
fn invalid_increment_fails_to_compile() {
    check!(
        compile("1 + 2++")
            == Err(Error::Compile(CompileError::InvalidIncrement {
                op: "++",
                kind: "operator"
            }))
    );
}

#[test]
fn undefined_variable_fails_to_compile() {
    check!(compile("x + 1") == Err(Error::Compile(CompileError::UndefinedVariable("x".into()))));
}

#[test]
fn unassignable_target_fails_to_parse() {
    let_assert!(Err(Error::Parse(ParseError::Action { position, .. })) = compile("3 = 4"));
    check!(position == 0);
}

#[test]
fn structural_statements_are_not_lowered() {
    check!(compile("import a.b") == Err(Error::Compile(CompileError::Unsupported("import"))));
    check!(
        compile("class Point { has @x }")
            == Err(Error::Compile(CompileError::Unsupported("class definition")))
    );
}
