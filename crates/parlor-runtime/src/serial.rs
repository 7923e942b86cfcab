//! Serialized forms of compiled artifacts.
//!
//! Both shapes are plain structured data and round-trip through
//! `serde_json`. Only builtin handlers survive serialization: a native
//! closure has no portable form, so it is rejected in strict mode and
//! replaced by the default handler (with a warning) in lenient mode.

use crate::handler::{builtin, Handler, ReduceProgram, Value};
use crate::lexer::{token_builtin, LexRule, Lexer, Pattern, TokenHandler};
use crate::table::{Action, ParsedGrammar, SymbolEntry, TableMode};
use crate::types::Map;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How to treat artifacts that cannot be fully serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializePolicy {
    /// Fail on the first native handler or selector.
    #[default]
    Strict,
    /// Substitute defaults, warn, and keep going.
    Lenient,
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("handler {index} is a native function and cannot be serialized")]
    NativeHandler { index: usize },

    #[error("lexer rule `{rule}` uses a native handler and cannot be serialized")]
    NativeTokenHandler { rule: String },

    #[error("lexer rule `{rule}` uses a name selector and cannot be serialized")]
    NativeSelector { rule: String },

    #[error("unknown builtin handler `{name}`")]
    UnknownBuiltin { name: String },

    #[error("handler index {index} is out of range ({count} handlers)")]
    BadHandlerIndex { index: usize, count: usize },

    #[error("invalid pattern in serialized lexer rule `{rule}`")]
    BadPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

// ---- lexer ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLexRule {
    pub name: Option<String>,
    pub pattern: String,
    pub is_regex: bool,
    pub handler: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLexer {
    pub records: Vec<SerializedLexRule>,
    pub eof_name: String,
    pub eof_value: Value,
}

impl Lexer {
    pub fn to_serialized(&self, policy: SerializePolicy) -> Result<SerializedLexer, SerializeError> {
        let mut records = Vec::with_capacity(self.rules.len());
        for rule in self.rules.iter() {
            let label = rule.name.as_deref().unwrap_or("<skip>").to_owned();

            let mut name = rule.name.clone();
            if rule.selector.is_some() {
                match policy {
                    SerializePolicy::Strict => {
                        return Err(SerializeError::NativeSelector { rule: label })
                    }
                    SerializePolicy::Lenient => {
                        tracing::warn!(rule = %label, "dropping name selector; rule becomes discarding");
                        name = None;
                    }
                }
            }

            let handler = match &rule.handler {
                TokenHandler::Builtin(builtin_name) => {
                    if token_builtin(builtin_name).is_none() {
                        return Err(SerializeError::UnknownBuiltin {
                            name: builtin_name.clone(),
                        });
                    }
                    builtin_name.clone()
                }
                TokenHandler::Native(..) => match policy {
                    SerializePolicy::Strict => {
                        return Err(SerializeError::NativeTokenHandler { rule: label })
                    }
                    SerializePolicy::Lenient => {
                        tracing::warn!(rule = %label, "replacing native token handler with `text`");
                        "text".to_owned()
                    }
                },
            };

            let (pattern, is_regex) = match &rule.pattern {
                Pattern::Literal(text) => (text.clone(), false),
                Pattern::Regex { source, .. } => (source.clone(), true),
            };

            records.push(SerializedLexRule {
                name,
                pattern,
                is_regex,
                handler,
            });
        }

        Ok(SerializedLexer {
            records,
            eof_name: self.eof_name.clone(),
            eof_value: self.eof_value.clone(),
        })
    }
}

impl SerializedLexer {
    pub fn into_lexer(self) -> Result<Lexer, SerializeError> {
        let mut rules = Vec::with_capacity(self.records.len());
        for record in self.records {
            let label = record.name.as_deref().unwrap_or("<skip>").to_owned();
            if token_builtin(&record.handler).is_none() {
                return Err(SerializeError::UnknownBuiltin {
                    name: record.handler,
                });
            }
            let pattern = if record.is_regex {
                match Pattern::regex(&label, &record.pattern) {
                    Ok(pattern) => pattern,
                    Err(crate::lexer::LexError::BadPattern { source, .. }) => {
                        return Err(SerializeError::BadPattern { rule: label, source })
                    }
                    Err(other) => unreachable!("Pattern::regex only fails with BadPattern: {other}"),
                }
            } else {
                Pattern::Literal(record.pattern)
            };
            rules.push(LexRule {
                name: record.name,
                pattern,
                handler: TokenHandler::Builtin(record.handler),
                selector: None,
            });
        }

        let mut lexer = Lexer {
            rules: Arc::from(rules.into_boxed_slice()),
            eof_name: self.eof_name,
            eof_value: self.eof_value,
            input: String::new(),
            pos: 0,
            line_starts: vec![0],
        };
        lexer.reset("");
        Ok(lexer)
    }
}

// ---- parser ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedParser {
    pub mode: TableMode,
    pub start_state: u32,
    pub action: Map<u32, Map<u32, Action>>,
    pub goto: Map<u32, Map<u32, u32>>,
    pub symbols: Vec<SymbolEntry>,
    pub symbols_table: Map<String, u32>,
    pub programs: Vec<ReduceProgram>,
    pub handlers: Vec<Option<String>>,
}

impl ParsedGrammar {
    pub fn to_serialized(
        &self,
        policy: SerializePolicy,
    ) -> Result<SerializedParser, SerializeError> {
        let mut handlers = Vec::with_capacity(self.handlers.len());
        for (index, handler) in self.handlers.iter().enumerate() {
            match handler {
                Handler::Builtin(name) => {
                    if builtin(name).is_none() {
                        return Err(SerializeError::UnknownBuiltin { name: name.clone() });
                    }
                    handlers.push(Some(name.clone()));
                }
                Handler::Native(..) => match policy {
                    SerializePolicy::Strict => {
                        return Err(SerializeError::NativeHandler { index })
                    }
                    SerializePolicy::Lenient => {
                        tracing::warn!(index, "replacing native reduce handler with `identity`");
                        handlers.push(Some("identity".to_owned()));
                    }
                },
            }
        }

        Ok(SerializedParser {
            mode: self.mode,
            start_state: self.start_state,
            action: self.actions.clone(),
            goto: self.gotos.clone(),
            symbols: self.symbols.clone(),
            symbols_table: self.symbols_table.clone(),
            programs: self.programs.clone(),
            handlers,
        })
    }
}

impl SerializedParser {
    pub fn into_grammar(self) -> Result<ParsedGrammar, SerializeError> {
        let count = self.handlers.len();
        for program in &self.programs {
            if let Some(index) = program.handler {
                if index >= count {
                    return Err(SerializeError::BadHandlerIndex { index, count });
                }
            }
        }

        let handlers = self
            .handlers
            .into_iter()
            .map(|name| {
                let name = name.unwrap_or_else(|| "identity".to_owned());
                if builtin(&name).is_none() {
                    return Err(SerializeError::UnknownBuiltin { name });
                }
                Ok(Handler::Builtin(name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParsedGrammar {
            actions: self.action,
            gotos: self.goto,
            start_state: self.start_state,
            symbols: self.symbols,
            symbols_table: self.symbols_table,
            programs: self.programs,
            handlers,
            mode: self.mode,
        })
    }
}
