//! The regex-sticky lexer engine.
//!
//! A lexer owns an ordered list of rules. At each position the rules are
//! tried in order and the first one that matches wins; a rule matches either
//! as a literal prefix or as a regex anchored at the current offset. Longest
//! match is a consequence of rule ordering, not of backtracking.

use crate::handler::{HandlerError, Value};
use std::{fmt, io::SeekFrom, sync::Arc};

/// Signature of a token callback: the matched lexeme plus the capture groups
/// (group 0 is the whole match).
pub type TokenFn = dyn Fn(&str, &[Option<&str>]) -> Result<Value, HandlerError> + Send + Sync;

/// Renames a token after its value is computed, or discards it by returning
/// `None`, in which case scanning resumes past the match.
pub type SelectorFn = dyn Fn(&Value, &str) -> Option<String> + Send + Sync;

/// Computes the value of a matched token. Builtins survive serialization;
/// native closures do not.
#[derive(Clone)]
pub enum TokenHandler {
    Builtin(String),
    Native(Arc<TokenFn>),
}

impl TokenHandler {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Builtin(name.into())
    }

    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&str, &[Option<&str>]) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    fn invoke(&self, lexeme: &str, groups: &[Option<&str>]) -> Result<Value, HandlerError> {
        match self {
            Self::Builtin(name) => {
                let f = token_builtin(name).ok_or_else(|| {
                    HandlerError::new(format!("unknown builtin token handler `{}`", name))
                })?;
                f(lexeme, groups)
            }
            Self::Native(f) => f(lexeme, groups),
        }
    }
}

impl fmt::Debug for TokenHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(name) => f.debug_tuple("Builtin").field(name).finish(),
            Self::Native(..) => f.debug_struct("Native").finish_non_exhaustive(),
        }
    }
}

/// The fixed registry of serializable token handlers.
pub fn token_builtin(
    name: &str,
) -> Option<fn(&str, &[Option<&str>]) -> Result<Value, HandlerError>> {
    Some(match name {
        "text" => |lexeme, _| Ok(Value::String(lexeme.to_owned())),
        "number" => |lexeme, _| {
            let n: f64 = lexeme
                .parse()
                .map_err(|_| HandlerError::new(format!("`{}` is not a number", lexeme)))?;
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| HandlerError::new(format!("`{}` is not a finite number", lexeme)))
        },
        "null" => |_, _| Ok(Value::Null),
        _ => return None,
    })
}

#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    Literal(String),
    Regex { source: String, re: regex::Regex },
}

impl Pattern {
    pub(crate) fn regex(rule: &str, source: &str) -> Result<Self, LexError> {
        let re = regex::Regex::new(&format!(r"\A(?:{})", source)).map_err(|e| {
            LexError::BadPattern {
                rule: rule.to_owned(),
                source: e,
            }
        })?;
        Ok(Self::Regex {
            source: source.to_owned(),
            re,
        })
    }
}

#[derive(Clone)]
pub(crate) struct LexRule {
    pub(crate) name: Option<String>,
    pub(crate) pattern: Pattern,
    pub(crate) handler: TokenHandler,
    pub(crate) selector: Option<Arc<SelectorFn>>,
}

impl LexRule {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<skip>")
    }
}

impl fmt::Debug for LexRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// A lexed token, or the synthetic token a reduce pushes on the parse stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub name: String,
    pub lexeme: String,
    pub value: Value,
    pub pos: usize,
    pub line: u32,
    pub col: u32,
}

impl Token {
    pub fn synthetic(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            lexeme: String::new(),
            value,
            pos: 0,
            line: 0,
            col: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("unrecognized input at line {line}, column {col}: `{snippet}`")]
    UnknownToken {
        pos: usize,
        line: u32,
        col: u32,
        snippet: String,
    },

    #[error("rule `{rule}` matched without consuming input at position {pos}")]
    ZeroLengthMatch { rule: String, pos: usize },

    #[error("invalid pattern for rule `{rule}`")]
    BadPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("seek to {requested} is out of range for an input of {len} bytes")]
    SeekOutOfRange { requested: i64, len: usize },

    #[error("token rule `{rule}` failed at position {pos}: {source}")]
    Handler {
        rule: String,
        pos: usize,
        #[source]
        source: HandlerError,
    },
}

/// Accumulates lexer rules in dispatch order.
#[derive(Debug, Clone)]
pub struct LexerBuilder {
    rules: Vec<LexRule>,
    eof_name: String,
    eof_value: Value,
}

impl Default for LexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LexerBuilder {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            eof_name: "$end".to_owned(),
            eof_value: Value::Null,
        }
    }

    /// Append a regex rule producing tokens named `name`.
    pub fn rule(
        &mut self,
        name: &str,
        pattern: &str,
        handler: TokenHandler,
    ) -> Result<&mut Self, LexError> {
        let pattern = Pattern::regex(name, pattern)?;
        self.rules.push(LexRule {
            name: Some(name.to_owned()),
            pattern,
            handler,
            selector: None,
        });
        Ok(self)
    }

    /// Append a literal-string rule. The token's value is its text.
    pub fn literal(&mut self, name: &str, text: &str) -> &mut Self {
        self.rules.push(LexRule {
            name: Some(name.to_owned()),
            pattern: Pattern::Literal(text.to_owned()),
            handler: TokenHandler::builtin("text"),
            selector: None,
        });
        self
    }

    /// Append a discarding rule; whatever it matches never becomes a token.
    pub fn skip(&mut self, pattern: &str) -> Result<&mut Self, LexError> {
        let pattern = Pattern::regex("<skip>", pattern)?;
        self.rules.push(LexRule {
            name: None,
            pattern,
            handler: TokenHandler::builtin("null"),
            selector: None,
        });
        Ok(self)
    }

    /// Append a rule whose token name is decided per match by `selector`.
    pub fn rule_with_selector<F>(
        &mut self,
        pattern: &str,
        handler: TokenHandler,
        selector: F,
    ) -> Result<&mut Self, LexError>
    where
        F: Fn(&Value, &str) -> Option<String> + Send + Sync + 'static,
    {
        let pattern = Pattern::regex("<selector>", pattern)?;
        self.rules.push(LexRule {
            name: None,
            pattern,
            handler,
            selector: Some(Arc::new(selector)),
        });
        Ok(self)
    }

    /// Configure the end-of-input token.
    pub fn eof(&mut self, name: &str, value: Value) -> &mut Self {
        self.eof_name = name.to_owned();
        self.eof_value = value;
        self
    }

    /// Append every rule of `other` after this builder's rules.
    pub fn merge(&mut self, other: &LexerBuilder) -> &mut Self {
        self.rules.extend(other.rules.iter().cloned());
        self
    }

    pub fn build(&self) -> Lexer {
        Lexer {
            rules: Arc::from(self.rules.clone().into_boxed_slice()),
            eof_name: self.eof_name.clone(),
            eof_value: self.eof_value.clone(),
            input: String::new(),
            pos: 0,
            line_starts: vec![0],
        }
    }
}

/// The lexer engine. Restartable via [`Lexer::reset`]; one instance must not
/// be shared between concurrent `next_token` callers.
#[derive(Debug, Clone)]
pub struct Lexer {
    pub(crate) rules: Arc<[LexRule]>,
    pub(crate) eof_name: String,
    pub(crate) eof_value: Value,
    pub(crate) input: String,
    pub(crate) pos: usize,
    pub(crate) line_starts: Vec<usize>,
}

impl Lexer {
    /// Install a new input and rewind to its start.
    pub fn reset(&mut self, input: &str) {
        self.input = input.to_owned();
        self.pos = 0;
        self.line_starts = line_starts(&self.input);
    }

    pub fn eof_name(&self) -> &str {
        &self.eof_name
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor. Out-of-range targets are rejected immediately.
    pub fn seek(&mut self, from: SeekFrom) -> Result<usize, LexError> {
        let len = self.input.len();
        let requested = match from {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(delta) => len as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if requested < 0 || requested > len as i64 {
            return Err(LexError::SeekOutOfRange { requested, len });
        }
        self.pos = requested as usize;
        Ok(self.pos)
    }

    /// Line and column (1-based) of a byte offset, via binary search over the
    /// precomputed line-start table.
    pub fn line_col(&self, pos: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&start| start <= pos) - 1;
        let col = pos - self.line_starts[line];
        (line as u32 + 1, col as u32 + 1)
    }

    /// Report the next token without committing the position.
    pub fn peek(&mut self) -> Result<Token, LexError> {
        self.scan(false)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.scan(true)
    }

    fn scan(&mut self, advance: bool) -> Result<Token, LexError> {
        let mut pos = self.pos;
        'scan: loop {
            if pos >= self.input.len() {
                if advance {
                    self.pos = pos;
                }
                let (line, col) = self.line_col(self.input.len());
                return Ok(Token {
                    name: self.eof_name.clone(),
                    lexeme: String::new(),
                    value: self.eof_value.clone(),
                    pos: self.input.len(),
                    line,
                    col,
                });
            }

            let rest = &self.input[pos..];
            for rule in self.rules.iter() {
                let (len, caps) = match &rule.pattern {
                    Pattern::Literal(text) => {
                        if !rest.starts_with(text.as_str()) {
                            continue;
                        }
                        (text.len(), None)
                    }
                    Pattern::Regex { re, .. } => match re.captures(rest) {
                        Some(caps) => (caps.get(0).map_or(0, |m| m.end()), Some(caps)),
                        None => continue,
                    },
                };

                if len == 0 {
                    return Err(LexError::ZeroLengthMatch {
                        rule: rule.label().to_owned(),
                        pos,
                    });
                }

                let lexeme = &rest[..len];

                // Discarding rule: resume scanning past the match.
                if rule.name.is_none() && rule.selector.is_none() {
                    pos += len;
                    continue 'scan;
                }

                let groups: Vec<Option<&str>> = match &caps {
                    Some(caps) => caps.iter().map(|m| m.map(|m| m.as_str())).collect(),
                    None => vec![Some(lexeme)],
                };
                let value =
                    rule.handler
                        .invoke(lexeme, &groups)
                        .map_err(|source| LexError::Handler {
                            rule: rule.label().to_owned(),
                            pos,
                            source,
                        })?;

                let name = match &rule.selector {
                    Some(selector) => match selector(&value, lexeme) {
                        Some(name) => name,
                        None => {
                            pos += len;
                            continue 'scan;
                        }
                    },
                    None => rule.name.clone().unwrap_or_default(),
                };

                let (line, col) = self.line_col(pos);
                let token = Token {
                    name,
                    lexeme: lexeme.to_owned(),
                    value,
                    pos,
                    line,
                    col,
                };
                if advance {
                    self.pos = pos + len;
                } else {
                    self.pos = pos;
                }
                return Ok(token);
            }

            let (line, col) = self.line_col(pos);
            let snippet: String = rest.chars().take(16).collect();
            return Err(LexError::UnknownToken {
                pos,
                line,
                col,
                snippet,
            });
        }
    }
}

fn line_starts(input: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in input.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn word_lexer() -> Lexer {
        let mut b = LexerBuilder::new();
        b.skip(r"[ \t\n]+").unwrap();
        b.rule("word", r"[a-z]+", TokenHandler::builtin("text"))
            .unwrap();
        b.rule("num", r"[0-9]+", TokenHandler::builtin("number"))
            .unwrap();
        b.build()
    }

    fn names(lexer: &mut Lexer) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token.name == lexer.eof_name {
                return out;
            }
            out.push(token.name);
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut b = LexerBuilder::new();
        b.rule("ab", r"ab", TokenHandler::builtin("text")).unwrap();
        b.rule("a", r"a", TokenHandler::builtin("text")).unwrap();
        let mut lexer = b.build();
        lexer.reset("aba");
        assert_eq!(lexer.next_token().unwrap().name, "ab");
        assert_eq!(lexer.next_token().unwrap().name, "a");
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = word_lexer();
        lexer.reset("hi");
        assert_eq!(lexer.next_token().unwrap().name, "word");
        for _ in 0..3 {
            let token = lexer.next_token().unwrap();
            assert_eq!(token.name, "$end");
            assert_eq!(token.value, Value::Null);
        }
    }

    #[test]
    fn peek_does_not_advance() {
        let mut lexer = word_lexer();
        lexer.reset("one two");
        assert_eq!(lexer.peek().unwrap().lexeme, "one");
        assert_eq!(lexer.next_token().unwrap().lexeme, "one");
        assert_eq!(lexer.next_token().unwrap().lexeme, "two");
    }

    #[test]
    fn zero_length_match_is_fatal() {
        let mut b = LexerBuilder::new();
        b.rule("maybe", r"a*", TokenHandler::builtin("text"))
            .unwrap();
        let mut lexer = b.build();
        lexer.reset("b");
        assert!(matches!(
            lexer.next_token(),
            Err(LexError::ZeroLengthMatch { .. })
        ));
    }

    #[test]
    fn unknown_input_reports_position() {
        let mut lexer = word_lexer();
        lexer.reset("ok\n!bad");
        lexer.next_token().unwrap();
        match lexer.next_token() {
            Err(LexError::UnknownToken { line, col, .. }) => {
                assert_eq!((line, col), (2, 1));
            }
            other => panic!("expected UnknownToken, got {:?}", other),
        }
    }

    #[test]
    fn selector_renames_and_discards() {
        let mut b = LexerBuilder::new();
        b.skip(r"[ ]+").unwrap();
        b.rule_with_selector(
            r"[a-z]+",
            TokenHandler::builtin("text"),
            |_value, lexeme| match lexeme {
                "if" => Some("KW_IF".to_owned()),
                "skipme" => None,
                other => Some(other.to_uppercase()),
            },
        )
        .unwrap();
        let mut lexer = b.build();
        lexer.reset("if skipme foo");
        assert_eq!(names(&mut lexer), vec!["KW_IF", "FOO"]);
    }

    #[test]
    fn seek_rewinds_and_rejects_out_of_range() {
        let mut lexer = word_lexer();
        lexer.reset("abc");
        lexer.next_token().unwrap();
        lexer.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(lexer.next_token().unwrap().lexeme, "abc");
        assert!(matches!(
            lexer.seek(SeekFrom::Current(-10)),
            Err(LexError::SeekOutOfRange { .. })
        ));
        lexer.seek(SeekFrom::End(-1)).unwrap();
        assert_eq!(lexer.next_token().unwrap().lexeme, "c");
    }

    #[test]
    fn number_handler_produces_numbers() {
        let mut lexer = word_lexer();
        lexer.reset("42");
        assert_eq!(lexer.next_token().unwrap().value, json!(42.0));
    }

    #[test]
    fn merged_rules_dispatch_after_existing_ones() {
        let mut keywords = LexerBuilder::new();
        keywords.literal("KW_IF", "if");

        let mut b = LexerBuilder::new();
        b.skip(r"[ ]+").unwrap();
        b.merge(&keywords);
        b.rule("word", r"[a-z]+", TokenHandler::builtin("text"))
            .unwrap();
        let mut lexer = b.build();
        lexer.reset("if iffy");
        // The merged literal sits ahead of `word`, so it also claims the
        // prefix of "iffy"; ordering, not length, decides the match.
        assert_eq!(names(&mut lexer), vec!["KW_IF", "KW_IF", "word"]);
    }

    #[test]
    fn literal_rules_match_prefixes() {
        let mut b = LexerBuilder::new();
        b.literal("arrow", "->").literal("minus", "-");
        let mut lexer = b.build();
        lexer.reset("->-");
        assert_eq!(lexer.next_token().unwrap().name, "arrow");
        assert_eq!(lexer.next_token().unwrap().name, "minus");
    }
}
