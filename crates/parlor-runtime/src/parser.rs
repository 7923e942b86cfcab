//! The shift-reduce parse driver.

use crate::handler::{HandlerError, Shaped, Value};
use crate::lexer::{LexError, Lexer, Token};
use crate::table::{Action, ParsedGrammar};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token {} (state {state})", describe(.token))]
    UnexpectedToken { token: Token, state: u32 },

    #[error("unexpected end of input at position {pos} (state {state})")]
    UnexpectedEof { pos: usize, state: u32 },

    #[error("lexer produced token `{name}` which is not a terminal of this grammar")]
    UnknownTerminal { name: String, pos: usize },

    #[error("input rejected at {}: {message}", describe(.token))]
    Rejected {
        message: String,
        token: Token,
        state: u32,
    },

    #[error("internal: no goto from state {state} on symbol {symbol}")]
    MissingGoto { state: u32, symbol: u32 },

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("reduce handler failed: {0}")]
    Handler(#[from] HandlerError),
}

fn describe(token: &Token) -> String {
    format!(
        "`{}` at line {}, column {}",
        token.lexeme, token.line, token.col
    )
}

#[derive(Debug)]
struct Frame {
    state: u32,
    token: Token,
}

/// Drives the shift-reduce loop over a [`ParsedGrammar`] and a [`Lexer`].
///
/// The per-call state (stack and lookahead) lives inside [`Parser::parse`],
/// so a parser is restartable; the shared tables stay behind an `Arc` and may
/// back any number of parsers.
#[derive(Debug)]
pub struct Parser {
    grammar: Arc<ParsedGrammar>,
    lexer: Lexer,
}

impl Parser {
    pub fn new(grammar: Arc<ParsedGrammar>, lexer: Lexer) -> Self {
        Self { grammar, lexer }
    }

    pub fn grammar(&self) -> &ParsedGrammar {
        &self.grammar
    }

    pub fn parse(&mut self, input: &str) -> Result<Value, ParseError> {
        let mut ctx = Value::Null;
        self.parse_with(input, &mut ctx)
    }

    /// Parse `input`, exposing `ctx` to every reduce handler.
    pub fn parse_with(&mut self, input: &str, ctx: &mut Value) -> Result<Value, ParseError> {
        self.lexer.reset(input);

        let mut stack = vec![Frame {
            state: self.grammar.start_state,
            token: Token::synthetic("", Value::Null),
        }];
        let mut lookahead = self.lexer.next_token()?;

        loop {
            let state = stack.last().expect("stack is never empty").state;
            let terminal = self.terminal_index(&lookahead)?;
            let action = self
                .grammar
                .actions
                .get(&state)
                .and_then(|row| row.get(&terminal))
                .cloned();
            tracing::trace!(state, token = %lookahead.name, ?action);

            match action {
                None => {
                    return Err(if terminal == 0 {
                        ParseError::UnexpectedEof {
                            pos: lookahead.pos,
                            state,
                        }
                    } else {
                        ParseError::UnexpectedToken {
                            token: lookahead,
                            state,
                        }
                    });
                }

                Some(Action::Shift(next)) => {
                    let upcoming = self.lexer.next_token()?;
                    let token = std::mem::replace(&mut lookahead, upcoming);
                    stack.push(Frame { state: next, token });
                }

                Some(Action::Reduce {
                    head,
                    len,
                    production,
                }) => {
                    let split = stack.len() - len;
                    let args: Vec<Value> = stack.drain(split..).map(|f| f.token.value).collect();

                    let program = &self.grammar.programs[production as usize];
                    let value = match program.run(args)? {
                        Shaped::Value(value) => value,
                        Shaped::Args(args) => match program.handler {
                            Some(index) => self.grammar.handlers[index].invoke(ctx, args)?,
                            None => Value::Array(args),
                        },
                    };

                    let top = stack.last().expect("stack is never empty").state;
                    let next = self
                        .grammar
                        .goto(top, head)
                        .ok_or(ParseError::MissingGoto {
                            state: top,
                            symbol: head,
                        })?;
                    let name = self.grammar.symbols[head as usize].name.clone();
                    stack.push(Frame {
                        state: next,
                        token: Token::synthetic(name, value),
                    });
                }

                Some(Action::Accept) => {
                    let frame = stack.pop().expect("stack is never empty");
                    return Ok(frame.token.value);
                }

                Some(Action::Error(message)) => {
                    return Err(ParseError::Rejected {
                        message,
                        token: lookahead,
                        state,
                    });
                }
            }
        }
    }

    fn terminal_index(&self, token: &Token) -> Result<u32, ParseError> {
        if token.name == self.lexer.eof_name() {
            return Ok(0);
        }
        match self.grammar.symbols_table.get(&token.name) {
            Some(&id) if !self.grammar.symbols[id as usize].nonterminal => Ok(id),
            _ => Err(ParseError::UnknownTerminal {
                name: token.name.clone(),
                pos: token.pos,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ReduceProgram;
    use crate::lexer::{LexerBuilder, TokenHandler};
    use crate::table::{SymbolEntry, TableMode, TableParts};
    use crate::types::Map;
    use serde_json::json;

    // Hand-assembled tables for the grammar `S : a b`.
    //
    //   symbols: 0 $end, 1 a, 2 b, 3 S, 4 S'
    //   states:  0 { S' : . S, S : . a b }   shift a -> 1, goto S -> 3
    //            1 { S : a . b }             shift b -> 2
    //            2 { S : a b . }             reduce on $end
    //            3 { S' : S . }              accept on $end
    fn tiny_grammar() -> ParsedGrammar {
        let mut actions: Map<u32, Map<u32, Action>> = Map::default();
        let mut row: Map<u32, Action> = Map::default();
        row.insert(1, Action::Shift(1));
        actions.insert(0, row);
        let mut row: Map<u32, Action> = Map::default();
        row.insert(2, Action::Shift(2));
        actions.insert(1, row);
        let mut row: Map<u32, Action> = Map::default();
        row.insert(
            0,
            Action::Reduce {
                head: 3,
                len: 2,
                production: 0,
            },
        );
        actions.insert(2, row);
        let mut row: Map<u32, Action> = Map::default();
        row.insert(0, Action::Accept);
        actions.insert(3, row);

        let mut gotos: Map<u32, Map<u32, u32>> = Map::default();
        let mut row: Map<u32, u32> = Map::default();
        row.insert(3, 3);
        gotos.insert(0, row);

        let symbols = vec![
            SymbolEntry {
                name: "$end".into(),
                nonterminal: false,
            },
            SymbolEntry {
                name: "a".into(),
                nonterminal: false,
            },
            SymbolEntry {
                name: "b".into(),
                nonterminal: false,
            },
            SymbolEntry {
                name: "S".into(),
                nonterminal: true,
            },
            SymbolEntry {
                name: "S'".into(),
                nonterminal: true,
            },
        ];
        let mut symbols_table: Map<String, u32> = Map::default();
        for (i, s) in symbols.iter().enumerate() {
            symbols_table.insert(s.name.clone(), i as u32);
        }

        ParsedGrammar::new(TableParts {
            actions,
            gotos,
            start_state: 0,
            symbols,
            symbols_table,
            programs: vec![ReduceProgram::default(), ReduceProgram::default()],
            handlers: vec![],
            mode: TableMode::Slr,
        })
    }

    fn tiny_lexer() -> Lexer {
        let mut b = LexerBuilder::new();
        b.skip(r"[ ]+").unwrap();
        b.rule("a", r"a", TokenHandler::builtin("text")).unwrap();
        b.rule("b", r"b", TokenHandler::builtin("text")).unwrap();
        b.build()
    }

    #[test]
    fn accepts_and_reduces_with_identity() {
        let mut parser = Parser::new(Arc::new(tiny_grammar()), tiny_lexer());
        let value = parser.parse("a b").unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn rejects_unexpected_token() {
        let mut parser = Parser::new(Arc::new(tiny_grammar()), tiny_lexer());
        match parser.parse("b") {
            Err(ParseError::UnexpectedToken { token, state }) => {
                assert_eq!(token.name, "b");
                assert_eq!(state, 0);
            }
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn rejects_early_eof() {
        let mut parser = Parser::new(Arc::new(tiny_grammar()), tiny_lexer());
        assert!(matches!(
            parser.parse("a"),
            Err(ParseError::UnexpectedEof { state: 1, .. })
        ));
    }

    #[test]
    fn parser_is_restartable() {
        let mut parser = Parser::new(Arc::new(tiny_grammar()), tiny_lexer());
        assert!(parser.parse("a").is_err());
        assert_eq!(parser.parse("a b").unwrap(), json!(["a", "b"]));
    }
}
