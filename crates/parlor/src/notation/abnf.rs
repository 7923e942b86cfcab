//! The ABNF front-end.
//!
//! Rules are newline-terminated; a line whose first tokens are not
//! `name =` or `name =/` continues the previous rule. `=/` appends
//! alternatives to an already-defined rule and is the only way to mention a
//! head twice. `/` separates alternatives.
//!
//! Numeric values (`%d13.10`, `%x30-39`), repeat counts (`1*4`) and prose
//! (`<...>`) are recognized by the tokenizer but enter the production as
//! literal right-hand-side elements; their ABNF semantics are not
//! interpreted. Grouping and optional brackets are dropped.

use super::{handler_ref, string_value, tokenize, NotationError, TokenCursor};
use crate::grammar::{ComplexProduction, Term};
use crate::types::Set;
use parlor_runtime::{HandlerError, Lexer, LexerBuilder, TokenHandler, Value};

fn lexer() -> Result<Lexer, NotationError> {
    let mut b = LexerBuilder::new();
    b.skip(r"[ \t]+")?;
    b.skip(r";[^\r\n]*")?;
    b.rule("NL", r"\r\n|\n|\r", TokenHandler::builtin("null"))?;
    b.literal("INCDEF", "=/");
    b.literal("DEF", "=");
    b.rule(
        "NUMBER",
        r"%[bdxBDX][0-9A-Fa-f]+(?:(?:\.[0-9A-Fa-f]+)+|-[0-9A-Fa-f]+)?",
        TokenHandler::builtin("text"),
    )?;
    b.rule("REPEAT", r"[0-9]*\*[0-9]*|[0-9]+", TokenHandler::builtin("text"))?;
    b.rule("IDENT", r"[A-Za-z][A-Za-z0-9-]*", TokenHandler::builtin("text"))?;
    b.rule("STRING", r#""[^"]*""#, TokenHandler::native(strip_delimiters))?;
    b.rule("PROSE", r"<[^>]*>", TokenHandler::native(strip_delimiters))?;
    b.literal("LPAREN", "(");
    b.literal("RPAREN", ")");
    b.literal("LBRACK", "[");
    b.literal("RBRACK", "]");
    b.literal("ALT", "/");
    b.literal("CONCAT", ".");
    Ok(b.build())
}

/// ABNF strings and prose carry no escapes; drop the delimiters.
fn strip_delimiters(lexeme: &str, _: &[Option<&str>]) -> Result<Value, HandlerError> {
    Ok(Value::String(lexeme[1..lexeme.len() - 1].to_owned()))
}

pub(crate) fn parse(
    text: &str,
    base: usize,
    count: usize,
    existing_heads: &Set<String>,
) -> Result<Vec<ComplexProduction>, NotationError> {
    let mut lexer = lexer()?;
    let tokens = tokenize(&mut lexer, text)?;
    let mut cursor = TokenCursor::new(tokens);

    let mut defined: Set<String> = existing_heads.clone();
    let mut productions = Vec::new();
    let mut alternative = 0usize;

    skip_newlines(&mut cursor);
    while !cursor.at_end() {
        let head = string_value(cursor.expect("IDENT", "a rule name")?);

        let incremental = match cursor.peek_owned() {
            Some(t) if t.name == "DEF" => false,
            Some(t) if t.name == "INCDEF" => true,
            _ => return Err(cursor.unexpected("`=` or `=/`")),
        };
        cursor.advance();

        let already = defined.contains(&head);
        if incremental && !already {
            return Err(NotationError::MissingIncrementalBase { head });
        }
        if !incremental && already {
            return Err(NotationError::DuplicateRule { head });
        }
        defined.insert(head.clone());

        let mut body = Vec::new();
        let mut flush =
            |body: &mut Vec<Term>, alternative: &mut usize, productions: &mut Vec<_>| {
                productions.push(ComplexProduction {
                    head: head.clone(),
                    body: std::mem::take(body),
                    handler: handler_ref(*alternative, base, count),
                    incremental,
                });
                *alternative += 1;
            };

        loop {
            let Some(t) = cursor.peek_owned() else {
                break;
            };
            match t.name.as_str() {
                "NL" => {
                    skip_newlines(&mut cursor);
                    if cursor.at_end() || at_rule_start(&cursor) {
                        break;
                    }
                }
                "IDENT" => {
                    body.push(Term::Name(string_value(&t)));
                    cursor.advance();
                }
                "STRING" | "PROSE" | "NUMBER" | "REPEAT" => {
                    body.push(Term::Literal(string_value(&t)));
                    cursor.advance();
                }
                "ALT" => {
                    flush(&mut body, &mut alternative, &mut productions);
                    cursor.advance();
                }
                "LPAREN" | "RPAREN" | "LBRACK" | "RBRACK" | "CONCAT" => {
                    tracing::debug!(token = %t.lexeme, line = t.line, "ignoring unsupported ABNF construct");
                    cursor.advance();
                }
                _ => return Err(cursor.unexpected("an ABNF element")),
            }
        }
        flush(&mut body, &mut alternative, &mut productions);
    }

    Ok(productions)
}

fn skip_newlines(cursor: &mut TokenCursor) {
    while matches!(cursor.peek(), Some(t) if t.name == "NL") {
        cursor.advance();
    }
}

/// A rule begins with `name =` or `name =/`.
fn at_rule_start(cursor: &TokenCursor) -> bool {
    matches!(cursor.peek(), Some(t) if t.name == "IDENT")
        && matches!(cursor.peek_at(1), Some(t) if t.name == "DEF" || t.name == "INCDEF")
}
