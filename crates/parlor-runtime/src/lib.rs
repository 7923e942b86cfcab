//! Runtime engine for the `parlor` parser generator toolkit.
//!
//! This crate holds everything that is live while an input is being parsed:
//! the regex-sticky [`Lexer`], the frozen [`ParsedGrammar`] tables, the
//! reduce-handler machinery and the shift-reduce [`Parser`] driver, plus the
//! JSON-compatible serialized forms of both artifacts. Table construction
//! itself lives in the `parlor` crate.

pub mod handler;
pub mod lexer;
pub mod parser;
pub mod serial;
pub mod table;
pub mod types;

pub use crate::{
    handler::{Handler, HandlerError, HandlerModifier, HandlerRef, ReduceProgram, ShapeOp, Value},
    lexer::{LexError, Lexer, LexerBuilder, Token, TokenHandler},
    parser::{ParseError, Parser},
    serial::{SerializeError, SerializePolicy, SerializedLexer, SerializedParser},
    table::{Action, ParsedGrammar, SymbolEntry, TableMode, TableParts},
};
