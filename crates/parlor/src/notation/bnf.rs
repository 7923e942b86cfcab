//! The BNF front-end.

use super::{handler_ref, string_value, tokenize, NotationError, TokenCursor};
use crate::grammar::{ComplexProduction, Term};
use parlor_runtime::{HandlerError, Lexer, LexerBuilder, TokenHandler, Value};

pub(crate) fn lexer() -> Result<Lexer, NotationError> {
    let mut b = LexerBuilder::new();
    b.skip(r"[ \t\r\n]+")?;
    b.rule("IDENT", r"[A-Za-z_][A-Za-z0-9_]*", TokenHandler::builtin("text"))?;
    b.rule("IDENT", r"<(?:>>|[^>])*>", TokenHandler::native(decode_angle))?;
    b.rule(
        "STRING",
        r#""(?:\\.|[^"\\])*""#,
        TokenHandler::native(decode_double_quoted),
    )?;
    b.rule(
        "STRING",
        r"'(?:\\.|[^'\\])*'",
        TokenHandler::native(decode_single_quoted),
    )?;
    b.rule("DEF", r"::=|=|:", TokenHandler::builtin("text"))?;
    b.literal("OR", "|");
    b.literal("SEP", ";");
    Ok(b.build())
}

/// Strip the angle brackets and unescape `>>`.
pub(crate) fn decode_angle(lexeme: &str, _: &[Option<&str>]) -> Result<Value, HandlerError> {
    let inner = &lexeme[1..lexeme.len() - 1];
    Ok(Value::String(inner.replace(">>", ">")))
}

/// Double-quoted strings carry JSON escapes verbatim.
pub(crate) fn decode_double_quoted(lexeme: &str, _: &[Option<&str>]) -> Result<Value, HandlerError> {
    let decoded: String = serde_json::from_str(lexeme)
        .map_err(|e| HandlerError::new(format!("invalid string literal: {}", e)))?;
    Ok(Value::String(decoded))
}

/// Single-quoted strings are re-encoded to double-quoted form, with `'`
/// unescaped and bare `"` escaped, then decoded the same way.
pub(crate) fn decode_single_quoted(lexeme: &str, _: &[Option<&str>]) -> Result<Value, HandlerError> {
    let inner = &lexeme[1..lexeme.len() - 1];
    let reencoded = format!("\"{}\"", inner.replace("\\'", "'").replace('"', "\\\""));
    let decoded: String = serde_json::from_str(&reencoded)
        .map_err(|e| HandlerError::new(format!("invalid string literal: {}", e)))?;
    Ok(Value::String(decoded))
}

/// Parse BNF text into productions. Alternative `i` across the whole text is
/// wired to handler `base + i` while `i < count`.
pub(crate) fn parse(
    text: &str,
    base: usize,
    count: usize,
) -> Result<Vec<ComplexProduction>, NotationError> {
    let mut lexer = lexer()?;
    let tokens = tokenize(&mut lexer, text)?;
    let mut cursor = TokenCursor::new(tokens);

    let mut productions = Vec::new();
    let mut alternative = 0usize;

    while !cursor.at_end() {
        let head = string_value(cursor.expect("IDENT", "a production head")?);
        cursor.expect("DEF", "`::=`, `=` or `:`")?;

        loop {
            let mut body = Vec::new();
            loop {
                let Some(t) = cursor.peek_owned() else { break };
                match t.name.as_str() {
                    "IDENT" => {
                        // An identifier followed by a definition token opens
                        // the next production.
                        if matches!(cursor.peek_at(1), Some(t2) if t2.name == "DEF") {
                            break;
                        }
                        body.push(Term::Name(string_value(&t)));
                        cursor.advance();
                    }
                    "STRING" => {
                        body.push(Term::Literal(string_value(&t)));
                        cursor.advance();
                    }
                    _ => break,
                }
            }

            productions.push(ComplexProduction {
                head: head.clone(),
                body,
                handler: handler_ref(alternative, base, count),
                incremental: false,
            });
            alternative += 1;

            let Some(t) = cursor.peek_owned() else { break };
            match t.name.as_str() {
                "OR" => {
                    cursor.advance();
                }
                "SEP" => {
                    cursor.advance();
                    break;
                }
                _ => break,
            }
        }
    }

    Ok(productions)
}
