//! A small calculator driven by grammar text.
//!
//!     cargo run --example calculator -- "2 + 3 * (4 - 1)"

use parlor::{Assoc, GrammarBuilder, Handler, LexerBuilder, Parser, TokenHandler, Value};
use serde_json::json;
use std::sync::Arc;

fn num(v: &Value) -> f64 {
    v.as_f64().unwrap_or_default()
}

fn main() -> anyhow::Result<()> {
    let input = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "2 + 3 * 4".to_owned());

    let mut lexer = LexerBuilder::new();
    lexer.skip(r"[ \t\r\n]+")?;
    lexer.rule(
        "num",
        r"[0-9]+(?:\.[0-9]+)?",
        TokenHandler::builtin("number"),
    )?;
    for s in ["+", "-", "*", "/", "(", ")"] {
        lexer.literal(s, s);
    }

    let mut g = GrammarBuilder::new();
    g.bnf(
        "E ::= E '+' T | E '-' T | T ;\n\
         T ::= T '*' F | T '/' F | F ;\n\
         F ::= '(' E ')' | 'num' ;",
        vec![
            Handler::native(|_, args| Ok(json!(num(&args[0]) + num(&args[2])))),
            Handler::native(|_, args| Ok(json!(num(&args[0]) - num(&args[2])))),
            Handler::builtin("first"),
            Handler::native(|_, args| Ok(json!(num(&args[0]) * num(&args[2])))),
            Handler::native(|_, args| Ok(json!(num(&args[0]) / num(&args[2])))),
            Handler::builtin("first"),
            Handler::native(|_, mut args| Ok(args.swap_remove(1))),
            Handler::builtin("first"),
        ],
    )?;
    g.operator(1, Assoc::Left, ["+", "-"]);
    g.operator(2, Assoc::Left, ["*", "/"]);

    let grammar = g.build()?;
    eprintln!("tables: {} mode, {} states", grammar.mode(), grammar.state_count());

    let mut parser = Parser::new(Arc::new(grammar), lexer.build());
    let value = parser.parse(&input)?;
    println!("{} = {}", input, value);
    Ok(())
}
