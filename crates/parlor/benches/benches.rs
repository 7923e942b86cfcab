use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parlor::{Assoc, GrammarBuilder, Handler, LexerBuilder, ParsedGrammar, Parser, TokenHandler};
use serde_json::json;
use std::sync::Arc;

fn arithmetic_grammar() -> ParsedGrammar {
    let num = |v: &parlor::Value| v.as_f64().unwrap();
    let binop = |f: fn(f64, f64) -> f64| {
        Handler::native(move |_, args: Vec<parlor::Value>| Ok(json!(f(num(&args[0]), num(&args[2])))))
    };

    let mut g = GrammarBuilder::new();
    g.bnf(
        "E ::= E '+' T | E '-' T | T ;\n\
         T ::= T '*' F | T '/' F | F ;\n\
         F ::= '(' E ')' | 'num' ;",
        vec![
            binop(|a, b| a + b),
            binop(|a, b| a - b),
            Handler::builtin("first"),
            binop(|a, b| a * b),
            binop(|a, b| a / b),
            Handler::builtin("first"),
            Handler::native(|_, mut args| Ok(args.swap_remove(1))),
            Handler::builtin("first"),
        ],
    )
    .unwrap();
    g.operator(1, Assoc::Left, ["+", "-"]);
    g.operator(2, Assoc::Left, ["*", "/"]);
    g.build().unwrap()
}

fn arithmetic_lexer() -> parlor::Lexer {
    let mut b = LexerBuilder::new();
    b.skip(r"[ \t\r\n]+").unwrap();
    b.rule(
        "num",
        r"[0-9]+(?:\.[0-9]+)?",
        TokenHandler::builtin("number"),
    )
    .unwrap();
    for s in ["+", "-", "*", "/", "(", ")"] {
        b.literal(s, s);
    }
    b.build()
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("build_arithmetic_tables", |b| {
        b.iter(|| black_box(arithmetic_grammar()))
    });
}

fn bench_parse(c: &mut Criterion) {
    let grammar = Arc::new(arithmetic_grammar());
    let mut parser = Parser::new(grammar, arithmetic_lexer());
    let input = "(1 + 2) * 3 - 4 / 2 + (5 - 6) * (7 + 8)";
    c.bench_function("parse_arithmetic", |b| {
        b.iter(|| parser.parse(black_box(input)).unwrap())
    });
}

criterion_group!(benches, bench_build, bench_parse);
criterion_main!(benches);
