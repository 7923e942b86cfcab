//! Frozen parse tables.
//!
//! A [`ParsedGrammar`] is the immutable artifact a generator produces: the
//! ACTION and GOTO tables, the interned symbol table, the per-production
//! reduce programs and the user handler array. It is cheap to share behind an
//! `Arc` and safe to read from several threads at once.

use crate::handler::{Handler, ReduceProgram};
use crate::types::Map;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An entry of the ACTION table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Shift(u32),
    Reduce { head: u32, len: usize, production: u32 },
    Accept,
    /// An explicit rejection, e.g. from a non-associative operator.
    Error(String),
}

/// The table-construction algorithm a grammar was compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableMode {
    Lr0,
    Slr,
    Lalr,
    Lr1,
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lr0 => "LR(0)",
            Self::Slr => "SLR",
            Self::Lalr => "LALR(1)",
            Self::Lr1 => "LR(1)",
        })
    }
}

/// One interned symbol. Index 0 is always the end-of-input terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub name: String,
    pub nonterminal: bool,
}

/// Raw material for a [`ParsedGrammar`], filled in by a table generator.
#[derive(Debug, Default)]
pub struct TableParts {
    pub actions: Map<u32, Map<u32, Action>>,
    pub gotos: Map<u32, Map<u32, u32>>,
    pub start_state: u32,
    pub symbols: Vec<SymbolEntry>,
    pub symbols_table: Map<String, u32>,
    pub programs: Vec<ReduceProgram>,
    pub handlers: Vec<Handler>,
    pub mode: TableMode,
}

impl Default for TableMode {
    fn default() -> Self {
        Self::Slr
    }
}

/// The frozen output of a grammar build.
#[derive(Debug, Clone)]
pub struct ParsedGrammar {
    pub(crate) actions: Map<u32, Map<u32, Action>>,
    pub(crate) gotos: Map<u32, Map<u32, u32>>,
    pub(crate) start_state: u32,
    pub(crate) symbols: Vec<SymbolEntry>,
    pub(crate) symbols_table: Map<String, u32>,
    pub(crate) programs: Vec<ReduceProgram>,
    pub(crate) handlers: Vec<Handler>,
    pub(crate) mode: TableMode,
}

impl ParsedGrammar {
    pub fn new(parts: TableParts) -> Self {
        Self {
            actions: parts.actions,
            gotos: parts.gotos,
            start_state: parts.start_state,
            symbols: parts.symbols,
            symbols_table: parts.symbols_table,
            programs: parts.programs,
            handlers: parts.handlers,
            mode: parts.mode,
        }
    }

    /// The table mode that actually produced these tables. In auto mode this
    /// reports which fallback succeeded.
    pub fn mode(&self) -> TableMode {
        self.mode
    }

    pub fn start_state(&self) -> u32 {
        self.start_state
    }

    pub fn state_count(&self) -> usize {
        self.actions.len()
    }

    pub fn production_count(&self) -> usize {
        self.programs.len()
    }

    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    pub fn symbol_id(&self, name: &str) -> Option<u32> {
        self.symbols_table.get(name).copied()
    }

    pub fn action(&self, state: u32, terminal: u32) -> Option<&Action> {
        self.actions.get(&state)?.get(&terminal)
    }

    pub fn goto(&self, state: u32, nonterminal: u32) -> Option<u32> {
        self.gotos.get(&state)?.get(&nonterminal).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serde_round_trip() {
        let actions = vec![
            Action::Shift(7),
            Action::Reduce {
                head: 3,
                len: 2,
                production: 1,
            },
            Action::Accept,
            Action::Error("non-associative".to_owned()),
        ];
        let text = serde_json::to_string(&actions).unwrap();
        let back: Vec<Action> = serde_json::from_str(&text).unwrap();
        assert_eq!(actions, back);
    }

    #[test]
    fn integer_keyed_tables_survive_json() {
        let mut row: Map<u32, Action> = Map::default();
        row.insert(0, Action::Accept);
        row.insert(4, Action::Shift(2));
        let mut table: Map<u32, Map<u32, Action>> = Map::default();
        table.insert(1, row);

        let text = serde_json::to_string(&table).unwrap();
        let back: Map<u32, Map<u32, Action>> = serde_json::from_str(&text).unwrap();
        assert_eq!(table, back);
    }
}
