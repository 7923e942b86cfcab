//! The EBNF front-end.
//!
//! A superset of the BNF dialect: `( )` groups alternatives, `[ ]` marks an
//! optional element, `{ }` a repetition, and a postfix `* N` repeats the
//! preceding element N times. `?` is tokenized but rejected with a dedicated
//! diagnostic rather than silently guessed at.

use super::{handler_ref, string_value, tokenize, NotationError, TokenCursor};
use crate::grammar::{ComplexProduction, EbnfElement, EbnfKind, Term};
use parlor_runtime::{Lexer, LexerBuilder, TokenHandler};

fn lexer() -> Result<Lexer, NotationError> {
    let mut b = LexerBuilder::new();
    b.skip(r"[ \t\r\n]+")?;
    b.rule("IDENT", r"[A-Za-z_][A-Za-z0-9_]*", TokenHandler::builtin("text"))?;
    b.rule("IDENT", r"<(?:>>|[^>])*>", TokenHandler::native(super::bnf::decode_angle))?;
    b.rule(
        "STRING",
        r#""(?:\\.|[^"\\])*""#,
        TokenHandler::native(super::bnf::decode_double_quoted),
    )?;
    b.rule(
        "STRING",
        r"'(?:\\.|[^'\\])*'",
        TokenHandler::native(super::bnf::decode_single_quoted),
    )?;
    b.rule("NUMBER", r"[0-9]+", TokenHandler::builtin("text"))?;
    b.rule("DEF", r"::=|=|:", TokenHandler::builtin("text"))?;
    b.literal("OR", "|");
    b.literal("SEP", ";");
    b.literal("LPAREN", "(");
    b.literal("RPAREN", ")");
    b.literal("LBRACK", "[");
    b.literal("RBRACK", "]");
    b.literal("LBRACE", "{");
    b.literal("RBRACE", "}");
    b.literal("STAR", "*");
    b.literal("QMARK", "?");
    Ok(b.build())
}

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
            while let Some(term) = parse_term(&mut cursor)? {
                body.push(term);
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

/// One body element, with its optional `* N` postfix.
fn parse_term(cursor: &mut TokenCursor) -> Result<Option<Term>, NotationError> {
    let Some(token) = cursor.peek_owned() else {
        return Ok(None);
    };

    let term = match token.name.as_str() {
        "IDENT" => {
            if matches!(cursor.peek_at(1), Some(t) if t.name == "DEF") {
                return Ok(None);
            }
            cursor.advance();
            Term::Name(string_value(&token))
        }
        "STRING" => {
            cursor.advance();
            Term::Literal(string_value(&token))
        }
        "LPAREN" => {
            cursor.advance();
            let alternatives = parse_alternatives(cursor, "RPAREN")?;
            Term::Ebnf(EbnfElement {
                kind: EbnfKind::Group,
                alternatives,
                repeat: None,
            })
        }
        "LBRACK" => {
            cursor.advance();
            let alternatives = parse_alternatives(cursor, "RBRACK")?;
            Term::Ebnf(EbnfElement {
                kind: EbnfKind::Optional,
                alternatives,
                repeat: None,
            })
        }
        "LBRACE" => {
            cursor.advance();
            let alternatives = parse_alternatives(cursor, "RBRACE")?;
            if let Some(star) = cursor.peek_owned() {
                if star.name == "STAR" {
                    return Err(NotationError::MultiplicityOnRepeat {
                        line: star.line,
                        col: star.col,
                    });
                }
            }
            Term::Ebnf(EbnfElement {
                kind: EbnfKind::Repeat,
                alternatives,
                repeat: None,
            })
        }
        "QMARK" => {
            return Err(NotationError::UnsupportedQuestionMark {
                line: token.line,
                col: token.col,
            })
        }
        _ => return Ok(None),
    };

    Ok(Some(apply_multiplicity(cursor, term)?))
}

/// Attach a `* N` postfix if present.
fn apply_multiplicity(cursor: &mut TokenCursor, term: Term) -> Result<Term, NotationError> {
    match cursor.peek_owned() {
        Some(t) if t.name == "STAR" => {}
        Some(t) if t.name == "QMARK" => {
            return Err(NotationError::UnsupportedQuestionMark {
                line: t.line,
                col: t.col,
            })
        }
        _ => return Ok(term),
    }
    cursor.advance();

    let number = cursor.expect("NUMBER", "a repetition count after `*`")?;
    let n: usize = number.lexeme.parse().map_err(|_| NotationError::Unexpected {
        lexeme: number.lexeme.clone(),
        line: number.line,
        col: number.col,
        expected: "a repetition count".to_owned(),
    })?;

    Ok(match term {
        Term::Ebnf(mut element) => {
            element.repeat = Some(n);
            Term::Ebnf(element)
        }
        plain => Term::Ebnf(EbnfElement {
            kind: EbnfKind::Mult,
            alternatives: vec![vec![plain]],
            repeat: Some(n),
        }),
    })
}

fn parse_alternatives(
    cursor: &mut TokenCursor,
    closer: &str,
) -> Result<Vec<Vec<Term>>, NotationError> {
    let mut alternatives = Vec::new();
    loop {
        let mut body = Vec::new();
        while let Some(term) = parse_term(cursor)? {
            body.push(term);
        }
        alternatives.push(body);

        let Some(t) = cursor.peek_owned() else {
            return Err(cursor.unexpected("`|` or a closing bracket"));
        };
        if t.name == "OR" {
            cursor.advance();
        } else if t.name == closer {
            cursor.advance();
            return Ok(alternatives);
        } else {
            return Err(cursor.unexpected("`|` or a closing bracket"));
        }
    }
}
