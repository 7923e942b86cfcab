//! An LR(1)-family parser generator.
//!
//! `parlor` compiles a grammar given in BNF, EBNF or ABNF (or assembled
//! programmatically) into a deterministic pushdown automaton: LR(0), SLR,
//! LALR(1) or canonical LR(1) ACTION/GOTO tables with operator-precedence
//! conflict resolution. The tables are consumed by the runtime engine in
//! `parlor-runtime`, which also provides the regex-sticky lexer the parse
//! driver reads tokens from.

mod automaton;
mod first_follow;
mod lower;
mod tables;
mod types;
mod util;

pub mod grammar;
pub mod notation;

pub use crate::grammar::{
    Assoc, BuildError, ComplexProduction, ConflictFallback, EbnfElement, EbnfKind, GrammarBuilder,
    Operator, SimpleProduction, Symbol, SymbolRef, Term, EOF_NAME,
};
pub use crate::notation::NotationError;
pub use crate::tables::{ConflictError, ConflictItem};

pub use parlor_runtime as runtime;
pub use parlor_runtime::{
    Handler, HandlerError, LexError, Lexer, LexerBuilder, ParseError, ParsedGrammar, Parser,
    SerializePolicy, TableMode, Token, TokenHandler, Value,
};
