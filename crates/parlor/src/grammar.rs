//! Grammar types and the fluent builder.
//!
//! A [`GrammarBuilder`] accumulates productions (from the notation
//! front-ends or the programmatic API), operators and handlers. `build`
//! lowers EBNF constructs, interns every symbol into a single id space with
//! the end-of-input terminal at index 0, constructs the LR automaton for the
//! requested (or auto-selected) mode and freezes the result into a
//! [`ParsedGrammar`].

use crate::automaton;
use crate::first_follow::{FirstSets, FollowSets};
use crate::lower;
use crate::notation::{self, NotationError};
use crate::tables::{self, ConflictError};
use crate::types::{Map, Set};
use crate::util::{display_fn, fresh_name};
use parlor_runtime::{
    Handler, HandlerModifier, HandlerRef, ParsedGrammar, ReduceProgram, SymbolEntry, TableMode,
    TableParts,
};
use std::{fmt, sync::Arc};

/// Name of the reserved end-of-input terminal, interned at index 0.
pub const EOF_NAME: &str = "$end";

pub(crate) const EOF: u32 = 0;

/// A resolved grammar symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Terminal(String),
    Nonterminal(String),
    Epsilon,
}

impl Symbol {
    pub fn terminal(name: impl Into<String>) -> Self {
        Self::Terminal(name.into())
    }

    pub fn nonterminal(name: impl Into<String>) -> Self {
        Self::Nonterminal(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Terminal(name) | Self::Nonterminal(name) => Some(name),
            Self::Epsilon => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(..))
    }

    pub fn is_nonterminal(&self) -> bool {
        matches!(self, Self::Nonterminal(..))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(name) | Self::Nonterminal(name) => f.write_str(name),
            Self::Epsilon => f.write_str("ε"),
        }
    }
}

/// Operator associativity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Nonassoc => "nonassoc",
        })
    }
}

/// An operator declaration, keyed by terminal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub name: String,
    pub assoc: Assoc,
    pub priority: u16,
}

/// Precedence attached to an interned terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Precedence {
    pub(crate) priority: u16,
    pub(crate) assoc: Assoc,
}

/// A body item before symbol kinds are resolved. Quoted strings in grammar
/// text are always terminals; bare names become nonterminals exactly when
/// some production defines them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Name(String),
    Literal(String),
    Ebnf(EbnfElement),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Literal(name) => write!(f, "'{}'", name),
            Self::Ebnf(element) => fmt::Display::fmt(element, f),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EbnfKind {
    Group,
    Optional,
    Repeat,
    Mult,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EbnfElement {
    pub kind: EbnfKind,
    pub alternatives: Vec<Vec<Term>>,
    pub repeat: Option<usize>,
}

impl fmt::Display for EbnfElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.kind {
            EbnfKind::Optional => ("[", "]"),
            EbnfKind::Repeat => ("{", "}"),
            EbnfKind::Group | EbnfKind::Mult => ("(", ")"),
        };
        f.write_str(open)?;
        for (i, alternative) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" |")?;
            }
            for term in alternative {
                write!(f, " {}", term)?;
            }
        }
        write!(f, " {}", close)?;
        if let Some(n) = self.repeat {
            write!(f, " * {}", n)?;
        }
        Ok(())
    }
}

/// A production as emitted by the notation front-ends, possibly still
/// containing EBNF elements.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexProduction {
    pub head: String,
    pub body: Vec<Term>,
    pub handler: HandlerRef,
    pub incremental: bool,
}

/// A lowered body item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    Name(String),
    Literal(String),
}

impl SymbolRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Literal(name) => name,
        }
    }
}

/// A plain production, free of EBNF elements.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleProduction {
    pub head: String,
    pub body: Vec<SymbolRef>,
    pub handler: HandlerRef,
}

/// What to do with a shift/reduce conflict no operator can settle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ConflictFallback {
    Shift,
    Reduce,
    #[default]
    Error,
}

/// Overrides the default choice of a production's operator (the last body
/// terminal present in the operator table). Receives the head name and the
/// resolved body, returns the name of the terminal to take precedence from.
pub type OperatorFilter = dyn Fn(&str, &[Symbol]) -> Option<String> + Send + Sync;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("the grammar has no productions")]
    Empty,

    #[error("start symbol `{0}` is not a nonterminal of this grammar")]
    BadStart(String),

    #[error("symbol `{0}` is used both as a terminal and as a nonterminal")]
    KindConflict(String),

    #[error("handler index {index} is out of range ({count} handlers)")]
    BadHandlerIndex { index: usize, count: usize },

    #[error("internal: invalid production index during state merge")]
    InvalidProductionIndex,

    #[error("conflict in {mode} tables: {source}")]
    Conflict {
        mode: TableMode,
        #[source]
        source: ConflictError,
    },

    #[error("no table mode succeeded\n{}", render_attempts(.attempts))]
    AutoExhausted {
        attempts: Vec<(TableMode, ConflictError)>,
    },
}

fn render_attempts(attempts: &[(TableMode, ConflictError)]) -> String {
    attempts
        .iter()
        .map(|(mode, conflict)| format!("  {}: {}", mode, conflict))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accumulates a grammar and compiles it into parse tables.
#[derive(Clone, Default)]
pub struct GrammarBuilder {
    productions: Vec<ComplexProduction>,
    operators: Map<String, Operator>,
    handlers: Vec<Handler>,
    start: Option<String>,
    mode: Option<TableMode>,
    fallback: ConflictFallback,
    operator_filter: Option<Arc<OperatorFilter>>,
}

impl fmt::Debug for GrammarBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarBuilder")
            .field("productions", &self.productions)
            .field("operators", &self.operators)
            .field("handlers", &self.handlers.len())
            .field("start", &self.start)
            .field("mode", &self.mode)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append productions written in BNF. Alternative `i` of the text is
    /// wired to `handlers[i]`; alternatives beyond the handler list reduce
    /// with the identity.
    pub fn bnf(
        &mut self,
        text: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<&mut Self, NotationError> {
        let handlers: Vec<Handler> = handlers.into_iter().collect();
        let produced = notation::bnf::parse(text, self.handlers.len(), handlers.len())?;
        self.handlers.extend(handlers);
        self.productions.extend(produced);
        Ok(self)
    }

    /// Append productions written in EBNF.
    pub fn ebnf(
        &mut self,
        text: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<&mut Self, NotationError> {
        let handlers: Vec<Handler> = handlers.into_iter().collect();
        let produced = notation::ebnf::parse(text, self.handlers.len(), handlers.len())?;
        self.handlers.extend(handlers);
        self.productions.extend(produced);
        Ok(self)
    }

    /// Append productions written in ABNF. `=/` extends an existing rule;
    /// redefining a rule with plain `=` is an error.
    pub fn abnf(
        &mut self,
        text: &str,
        handlers: impl IntoIterator<Item = Handler>,
    ) -> Result<&mut Self, NotationError> {
        let handlers: Vec<Handler> = handlers.into_iter().collect();
        let heads = self.heads();
        let produced = notation::abnf::parse(text, self.handlers.len(), handlers.len(), &heads)?;
        self.handlers.extend(handlers);
        self.productions.extend(produced);
        Ok(self)
    }

    /// Append one production programmatically. `Symbol::Epsilon` items are
    /// dropped, so an all-epsilon body yields an empty production.
    pub fn production(
        &mut self,
        head: &str,
        body: impl IntoIterator<Item = Symbol>,
        handler: Option<Handler>,
    ) -> &mut Self {
        let handler = match handler {
            Some(h) => {
                self.handlers.push(h);
                HandlerRef::Index(self.handlers.len() - 1)
            }
            None => HandlerRef::None,
        };
        let body = body
            .into_iter()
            .filter_map(|symbol| match symbol {
                Symbol::Terminal(name) => Some(Term::Literal(name)),
                Symbol::Nonterminal(name) => Some(Term::Name(name)),
                Symbol::Epsilon => None,
            })
            .collect();
        self.productions.push(ComplexProduction {
            head: head.to_owned(),
            body,
            handler,
            incremental: false,
        });
        self
    }

    /// Declare operators sharing one precedence level.
    pub fn operator<'a>(
        &mut self,
        priority: u16,
        assoc: Assoc,
        names: impl IntoIterator<Item = &'a str>,
    ) -> &mut Self {
        for name in names {
            self.operators.insert(
                name.to_owned(),
                Operator {
                    name: name.to_owned(),
                    assoc,
                    priority,
                },
            );
        }
        self
    }

    pub fn start_symbol(&mut self, name: &str) -> &mut Self {
        self.start = Some(name.to_owned());
        self
    }

    /// Request a specific table mode instead of the SLR/LALR/LR1 fallback
    /// chain.
    pub fn mode(&mut self, mode: TableMode) -> &mut Self {
        self.mode = Some(mode);
        self
    }

    pub fn shift_reduce(&mut self, fallback: ConflictFallback) -> &mut Self {
        self.fallback = fallback;
        self
    }

    pub fn operator_filter<F>(&mut self, filter: F) -> &mut Self
    where
        F: Fn(&str, &[Symbol]) -> Option<String> + Send + Sync + 'static,
    {
        self.operator_filter = Some(Arc::new(filter));
        self
    }

    /// Append everything from `other`. Handler references are re-based onto
    /// this builder's handler array; `other`'s operators win on collision.
    pub fn merge(&mut self, other: &Self) -> &mut Self {
        let offset = self.handlers.len();
        for p in &other.productions {
            self.productions.push(ComplexProduction {
                head: p.head.clone(),
                body: p.body.clone(),
                handler: rebase(&p.handler, offset),
                incremental: p.incremental,
            });
        }
        self.handlers.extend(other.handlers.iter().cloned());
        for (name, op) in &other.operators {
            self.operators.insert(name.clone(), op.clone());
        }
        if self.start.is_none() {
            self.start.clone_from(&other.start);
        }
        self
    }

    pub fn heads(&self) -> Set<String> {
        self.productions.iter().map(|p| p.head.clone()).collect()
    }

    pub fn production_count(&self) -> usize {
        self.productions.len()
    }

    /// Render the accumulated productions and operators, one per line.
    pub fn display(&self) -> impl fmt::Display + '_ {
        display_fn(|f| {
            for p in &self.productions {
                write!(f, "{} :", p.head)?;
                for term in &p.body {
                    write!(f, " {}", term)?;
                }
                writeln!(f)?;
            }
            for op in self.operators.values() {
                writeln!(f, "opr {} {} {}", op.priority, op.assoc, op.name)?;
            }
            Ok(())
        })
    }

    /// Compile the accumulated grammar into frozen parse tables.
    pub fn build(&self) -> Result<ParsedGrammar, BuildError> {
        let span = tracing::debug_span!("build", productions = self.productions.len());
        let _entered = span.enter();

        if self.productions.is_empty() {
            return Err(BuildError::Empty);
        }

        let lowered = lower::lower(&self.productions);
        let compiled = self.compile(&lowered)?;

        let (modes, auto) = match self.mode {
            Some(mode) => (vec![mode], false),
            None => (vec![TableMode::Slr, TableMode::Lalr, TableMode::Lr1], true),
        };

        let mut attempts = Vec::new();
        for mode in modes {
            match self.attempt(&compiled, mode) {
                Ok(parts) => {
                    tracing::debug!(%mode, states = parts.actions.len(), "table construction succeeded");
                    return Ok(ParsedGrammar::new(parts));
                }
                Err(BuildError::Conflict { mode, source }) if auto => {
                    tracing::debug!(%mode, conflict = %source, "table mode failed");
                    attempts.push((mode, source));
                }
                Err(other) => return Err(other),
            }
        }
        Err(BuildError::AutoExhausted { attempts })
    }

    fn attempt(&self, g: &CompiledGrammar, mode: TableMode) -> Result<TableParts, BuildError> {
        let first = FirstSets::new(g);
        let automaton = automaton::build(g, mode, &first)?;
        let follow = matches!(mode, TableMode::Slr).then(|| FollowSets::new(g, &first));
        let (actions, gotos) = tables::emit(g, &automaton, mode, follow.as_ref(), self.fallback)
            .map_err(|source| BuildError::Conflict { mode, source })?;
        Ok(TableParts {
            actions,
            gotos,
            start_state: 0,
            symbols: g.symbols.clone(),
            symbols_table: g.table.clone(),
            programs: g.productions.iter().map(|p| p.program.clone()).collect(),
            handlers: self.handlers.clone(),
            mode,
        })
    }

    pub(crate) fn raw_productions(&self) -> &[ComplexProduction] {
        &self.productions
    }

    pub(crate) fn compile(&self, lowered: &[SimpleProduction]) -> Result<CompiledGrammar, BuildError> {
        let heads: Set<String> = lowered.iter().map(|p| p.head.clone()).collect();

        let mut symbols = vec![SymbolEntry {
            name: EOF_NAME.to_owned(),
            nonterminal: false,
        }];
        let mut table: Map<String, u32> = Map::default();
        table.insert(EOF_NAME.to_owned(), EOF);

        let mut productions = Vec::with_capacity(lowered.len() + 1);
        for p in lowered {
            let head = intern(&mut symbols, &mut table, &p.head, true)?;
            let mut body = Vec::with_capacity(p.body.len());
            for item in &p.body {
                let id = match item {
                    SymbolRef::Name(name) => {
                        intern(&mut symbols, &mut table, name, heads.contains(name))?
                    }
                    SymbolRef::Literal(name) => intern(&mut symbols, &mut table, name, false)?,
                };
                body.push(id);
            }
            check_handler_bounds(&p.handler, self.handlers.len())?;
            productions.push(Production {
                head,
                body,
                program: ReduceProgram::compile(&p.handler),
            });
        }

        // The default start symbol is the head of the first production as
        // written, not as lowered: rewriting may reorder the list.
        let start_name = match &self.start {
            Some(name) => name.clone(),
            None => self.productions[0].head.clone(),
        };
        let start = match table.get(&start_name) {
            Some(&id) if symbols[id as usize].nonterminal => id,
            _ => return Err(BuildError::BadStart(start_name)),
        };

        let taken: Set<String> = table.keys().cloned().collect();
        let augment_name = fresh_name("__GLOBAL", &taken);
        let augment_symbol = intern(&mut symbols, &mut table, &augment_name, true)?;
        productions.push(Production {
            head: augment_symbol,
            body: vec![start],
            program: ReduceProgram::default(),
        });
        let augment = (productions.len() - 1) as u32;

        let mut precedence: Map<u32, Precedence> = Map::default();
        for (name, op) in &self.operators {
            if let Some(&id) = table.get(name) {
                if !symbols[id as usize].nonterminal {
                    precedence.insert(
                        id,
                        Precedence {
                            priority: op.priority,
                            assoc: op.assoc,
                        },
                    );
                }
            }
        }

        let mut prod_operator = Vec::with_capacity(productions.len());
        for p in &productions {
            let operator = match &self.operator_filter {
                Some(filter) => {
                    let head_name = symbols[p.head as usize].name.as_str();
                    let body: Vec<Symbol> = p
                        .body
                        .iter()
                        .map(|&id| {
                            let entry = &symbols[id as usize];
                            if entry.nonterminal {
                                Symbol::Nonterminal(entry.name.clone())
                            } else {
                                Symbol::Terminal(entry.name.clone())
                            }
                        })
                        .collect();
                    filter(head_name, &body)
                        .and_then(|name| table.get(&name).copied())
                        .filter(|id| precedence.contains_key(id))
                }
                None => p
                    .body
                    .iter()
                    .rev()
                    .copied()
                    .find(|id| precedence.contains_key(id)),
            };
            prod_operator.push(operator);
        }

        Ok(CompiledGrammar {
            symbols,
            table,
            productions,
            augment,
            start,
            precedence,
            prod_operator,
        })
    }
}

fn intern(
    symbols: &mut Vec<SymbolEntry>,
    table: &mut Map<String, u32>,
    name: &str,
    nonterminal: bool,
) -> Result<u32, BuildError> {
    if let Some(&id) = table.get(name) {
        if symbols[id as usize].nonterminal != nonterminal {
            return Err(BuildError::KindConflict(name.to_owned()));
        }
        return Ok(id);
    }
    let id = symbols.len() as u32;
    symbols.push(SymbolEntry {
        name: name.to_owned(),
        nonterminal,
    });
    table.insert(name.to_owned(), id);
    Ok(id)
}

fn check_handler_bounds(handler: &HandlerRef, count: usize) -> Result<(), BuildError> {
    match handler {
        HandlerRef::None => Ok(()),
        HandlerRef::Index(index) => {
            if *index >= count {
                Err(BuildError::BadHandlerIndex {
                    index: *index,
                    count,
                })
            } else {
                Ok(())
            }
        }
        HandlerRef::Modifier(m) => check_handler_bounds(&m.next, count),
    }
}

fn rebase(handler: &HandlerRef, offset: usize) -> HandlerRef {
    match handler {
        HandlerRef::None => HandlerRef::None,
        HandlerRef::Index(index) => HandlerRef::Index(index + offset),
        HandlerRef::Modifier(m) => HandlerRef::Modifier(Box::new(HandlerModifier {
            op: m.op,
            next: rebase(&m.next, offset),
        })),
    }
}

// ---- compiled grammar (internal to table construction) ----

#[derive(Debug, Clone)]
pub(crate) struct Production {
    pub(crate) head: u32,
    pub(crate) body: Vec<u32>,
    pub(crate) program: ReduceProgram,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledGrammar {
    pub(crate) symbols: Vec<SymbolEntry>,
    pub(crate) table: Map<String, u32>,
    pub(crate) productions: Vec<Production>,
    /// Index of the synthetic `__GLOBAL : start` production.
    pub(crate) augment: u32,
    pub(crate) start: u32,
    pub(crate) precedence: Map<u32, Precedence>,
    pub(crate) prod_operator: Vec<Option<u32>>,
}

impl CompiledGrammar {
    pub(crate) fn is_terminal(&self, id: u32) -> bool {
        !self.symbols[id as usize].nonterminal
    }

    pub(crate) fn name(&self, id: u32) -> &str {
        &self.symbols[id as usize].name
    }

    pub(crate) fn terminal_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.nonterminal)
            .map(|(id, _)| id as u32)
    }

    pub(crate) fn render_item(&self, production: u32, dot: usize) -> String {
        let p = &self.productions[production as usize];
        let mut out = format!("{} :", self.name(p.head));
        for (i, &symbol) in p.body.iter().enumerate() {
            if i == dot {
                out.push_str(" .");
            }
            out.push(' ');
            out.push_str(self.name(symbol));
        }
        if dot == p.body.len() {
            out.push_str(" .");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interning_reserves_eof_and_detects_kind_conflicts() {
        let mut g = GrammarBuilder::new();
        g.production(
            "S",
            [Symbol::terminal("a"), Symbol::nonterminal("S")],
            None,
        );
        g.production("S", [Symbol::terminal("a")], None);
        let grammar = g.build().unwrap();
        assert_eq!(grammar.symbol_id(EOF_NAME), Some(0));
        assert_eq!(grammar.symbols()[0].nonterminal, false);

        let mut bad = GrammarBuilder::new();
        // `S` is a head, but also used as a forced terminal.
        bad.production("S", [Symbol::terminal("S")], None);
        assert!(matches!(bad.build(), Err(BuildError::KindConflict(name)) if name == "S"));
    }

    #[test]
    fn epsilon_items_vanish_from_bodies() {
        let mut g = GrammarBuilder::new();
        g.production("S", [Symbol::Epsilon], None);
        g.production("S", [Symbol::terminal("x")], None);
        let grammar = g.build().unwrap();
        // The epsilon alternative plus `x` plus the augment rule.
        assert_eq!(grammar.production_count(), 3);
    }

    #[test]
    fn augment_name_avoids_collisions() {
        let mut g = GrammarBuilder::new();
        g.production("__GLOBAL", [Symbol::terminal("a")], None);
        let grammar = g.build().unwrap();
        assert!(grammar.symbol_id("__GLOBAL_1").is_some());
    }

    #[test]
    fn merge_rebases_handler_indices() {
        let mut left = GrammarBuilder::new();
        left.production(
            "A",
            [Symbol::terminal("a")],
            Some(Handler::native(|_, _| Ok(json!("left")))),
        );

        let mut right = GrammarBuilder::new();
        right.production(
            "B",
            [Symbol::terminal("b")],
            Some(Handler::native(|_, _| Ok(json!("right")))),
        );

        left.merge(&right);
        assert_eq!(
            left.productions[1].handler,
            HandlerRef::Index(1),
            "merged handler must point past the existing array"
        );
        assert_eq!(left.handlers.len(), 2);
    }

    #[test]
    fn missing_start_symbol_defaults_to_first_head() {
        let mut g = GrammarBuilder::new();
        g.production("Top", [Symbol::terminal("t")], None);
        g.production("Other", [Symbol::terminal("o")], None);
        let grammar = g.build().unwrap();
        // Accept is reachable from `Top` only: parsing `o` alone must fail.
        assert!(grammar.symbol_id("Top").is_some());
    }

    #[test]
    fn display_renders_productions_and_operators() {
        let mut g = GrammarBuilder::new();
        g.production(
            "E",
            [
                Symbol::nonterminal("E"),
                Symbol::terminal("+"),
                Symbol::nonterminal("T"),
            ],
            None,
        );
        g.operator(1, Assoc::Left, ["+"]);
        let rendered = g.display().to_string();
        assert_eq!(rendered, "E : E '+' T\nopr 1 left +\n");
    }

    #[test]
    fn unknown_start_symbol_is_rejected() {
        let mut g = GrammarBuilder::new();
        g.production("S", [Symbol::terminal("a")], None);
        g.start_symbol("Missing");
        assert!(matches!(g.build(), Err(BuildError::BadStart(name)) if name == "Missing"));
    }
}
