//! Grammar notation front-ends.
//!
//! Each dialect tokenizes with a fixed, ordered rule list driven by the
//! runtime lexer engine (first match wins, anchored at the cursor), then a
//! hand-written pass over the token stream produces [`ComplexProduction`]s.
//!
//! [`ComplexProduction`]: crate::grammar::ComplexProduction

pub mod abnf;
pub mod bnf;
pub mod ebnf;

use parlor_runtime::{HandlerRef, LexError, Lexer, Token};

#[derive(Debug, thiserror::Error)]
pub enum NotationError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected `{lexeme}` at line {line}, column {col}: expected {expected}")]
    Unexpected {
        lexeme: String,
        line: u32,
        col: u32,
        expected: String,
    },

    #[error("unexpected end of grammar text: expected {expected}")]
    UnexpectedEnd { expected: String },

    #[error("`?` is not supported at line {line}, column {col}; use `[ ... ]` for optional elements")]
    UnsupportedQuestionMark { line: u32, col: u32 },

    #[error("a repetition count is not supported after `{{ }}` (line {line}, column {col})")]
    MultiplicityOnRepeat { line: u32, col: u32 },

    #[error("rule `{head}` is already defined; use `=/` to add alternatives")]
    DuplicateRule { head: String },

    #[error("`=/` requires an existing rule for `{head}`")]
    MissingIncrementalBase { head: String },
}

/// Drain a configured lexer over the whole grammar text.
pub(crate) fn tokenize(lexer: &mut Lexer, text: &str) -> Result<Vec<Token>, NotationError> {
    lexer.reset(text);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        if token.name == lexer.eof_name() {
            return Ok(tokens);
        }
        tokens.push(token);
    }
}

/// Wire alternative `index` of a front-end call to its handler slice.
pub(crate) fn handler_ref(index: usize, base: usize, count: usize) -> HandlerRef {
    if index < count {
        HandlerRef::Index(base + index)
    } else {
        HandlerRef::None
    }
}

/// Cursor over the token stream, shared by the hand-written parsers.
pub(crate) struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Owned copy of the current token, for matches that go on to mutate the
    /// cursor inside their arms.
    pub(crate) fn peek_owned(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    pub(crate) fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// Consume a token of the given kind or fail with a diagnostic.
    pub(crate) fn expect(&mut self, name: &str, expected: &str) -> Result<&Token, NotationError> {
        match self.tokens.get(self.pos) {
            Some(token) if token.name == name => {
                self.pos += 1;
                Ok(&self.tokens[self.pos - 1])
            }
            Some(token) => Err(NotationError::Unexpected {
                lexeme: token.lexeme.clone(),
                line: token.line,
                col: token.col,
                expected: expected.to_owned(),
            }),
            None => Err(NotationError::UnexpectedEnd {
                expected: expected.to_owned(),
            }),
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> NotationError {
        match self.peek() {
            Some(token) => NotationError::Unexpected {
                lexeme: token.lexeme.clone(),
                line: token.line,
                col: token.col,
                expected: expected.to_owned(),
            },
            None => NotationError::UnexpectedEnd {
                expected: expected.to_owned(),
            },
        }
    }
}

/// Extract the string value a token handler computed.
pub(crate) fn string_value(token: &Token) -> String {
    match token.value.as_str() {
        Some(s) => s.to_owned(),
        None => token.lexeme.clone(),
    }
}
