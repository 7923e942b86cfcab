//! ACTION/GOTO emission and conflict resolution.

use crate::automaton::{Automaton, ItemCore, State};
use crate::first_follow::FollowSets;
use crate::grammar::{Assoc, CompiledGrammar, ConflictFallback, Precedence, EOF};
use crate::types::Map;
use parlor_runtime::{Action, TableMode};
use std::cmp::Ordering;

/// One of the two items involved in a conflict.
#[derive(Debug, Clone)]
pub struct ConflictItem {
    pub production: u32,
    pub dot: usize,
    pub rendered: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("shift/reduce conflict on `{terminal}` in state {state}: shift [{}] vs reduce [{}]", .shift.rendered, .reduce.rendered)]
    ShiftReduce {
        state: u32,
        terminal: String,
        shift: ConflictItem,
        reduce: ConflictItem,
    },

    #[error("reduce/reduce conflict on `{terminal}` in state {state}: [{}] vs [{}]", .first.rendered, .second.rendered)]
    ReduceReduce {
        state: u32,
        terminal: String,
        first: ConflictItem,
        second: ConflictItem,
    },

    #[error("shift/shift conflict on `{symbol}` in state {state}")]
    ShiftShift { state: u32, symbol: String },

    #[error("accept conflicts with another action on `{terminal}` in state {state}")]
    Accept { state: u32, terminal: String },
}

#[derive(Default)]
struct PendingAction {
    shift: Option<u32>,
    reduces: Vec<u32>,
}

type Tables = (Map<u32, Map<u32, Action>>, Map<u32, Map<u32, u32>>);

pub(crate) fn emit(
    g: &CompiledGrammar,
    automaton: &Automaton,
    mode: TableMode,
    follow: Option<&FollowSets>,
    fallback: ConflictFallback,
) -> Result<Tables, ConflictError> {
    let mut actions: Map<u32, Map<u32, Action>> = Map::default();
    let mut gotos: Map<u32, Map<u32, u32>> = Map::default();

    for (state_id, state) in automaton.states.iter().enumerate() {
        let state_id = state_id as u32;
        let mut pending: Map<u32, PendingAction> = Map::default();
        let mut goto_row: Map<u32, u32> = Map::default();

        for (&symbol, &target) in &state.edges {
            if g.is_terminal(symbol) {
                let entry = pending.entry(symbol).or_default();
                if let Some(previous) = entry.shift.replace(target) {
                    if previous != target {
                        return Err(ConflictError::ShiftShift {
                            state: state_id,
                            symbol: g.name(symbol).to_owned(),
                        });
                    }
                }
            } else {
                goto_row.insert(symbol, target);
            }
        }

        for (core, lookaheads) in &state.items {
            let p = &g.productions[core.production as usize];
            if core.dot < p.body.len() {
                continue;
            }
            if core.production == g.augment {
                pending.entry(EOF).or_default().reduces.push(core.production);
                continue;
            }
            match mode {
                TableMode::Lr0 => {
                    for t in g.terminal_ids() {
                        pending.entry(t).or_default().reduces.push(core.production);
                    }
                }
                TableMode::Slr => {
                    let follow = follow.expect("SLR emission requires FOLLOW sets");
                    for t in follow.get(p.head).iter() {
                        pending.entry(t).or_default().reduces.push(core.production);
                    }
                }
                TableMode::Lalr | TableMode::Lr1 => {
                    for t in lookaheads.iter() {
                        pending.entry(t).or_default().reduces.push(core.production);
                    }
                }
            }
        }

        let mut row: Map<u32, Action> = Map::default();
        for (terminal, pa) in pending {
            let action = resolve(g, state_id, state, terminal, pa, fallback)?;
            row.insert(terminal, action);
        }
        actions.insert(state_id, row);
        gotos.insert(state_id, goto_row);
    }

    Ok((actions, gotos))
}

fn reduce_action(g: &CompiledGrammar, production: u32) -> Action {
    let p = &g.productions[production as usize];
    Action::Reduce {
        head: p.head,
        len: p.body.len(),
        production,
    }
}

fn reduce_item(g: &CompiledGrammar, production: u32) -> ConflictItem {
    let dot = g.productions[production as usize].body.len();
    ConflictItem {
        production,
        dot,
        rendered: g.render_item(production, dot),
    }
}

/// The item justifying a shift of `terminal` in `state`.
fn shift_item(g: &CompiledGrammar, state: &State, terminal: u32) -> ConflictItem {
    let core = state
        .items
        .keys()
        .find(|core| {
            let p = &g.productions[core.production as usize];
            p.body.get(core.dot) == Some(&terminal)
        })
        .copied()
        .unwrap_or(ItemCore {
            production: 0,
            dot: 0,
        });
    ConflictItem {
        production: core.production,
        dot: core.dot,
        rendered: g.render_item(core.production, core.dot),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PrecDiff {
    Shift,
    Reduce,
    Neither,
}

fn compare_precs(shift: Option<Precedence>, reduce: Option<Precedence>) -> Option<PrecDiff> {
    match (shift, reduce) {
        (Some(s), Some(r)) => Some(match Ord::cmp(&s.priority, &r.priority) {
            Ordering::Greater => PrecDiff::Shift,
            Ordering::Less => PrecDiff::Reduce,
            Ordering::Equal => match s.assoc {
                Assoc::Left => PrecDiff::Reduce,
                Assoc::Right => PrecDiff::Shift,
                Assoc::Nonassoc => PrecDiff::Neither,
            },
        }),
        _ => None,
    }
}

fn resolve(
    g: &CompiledGrammar,
    state_id: u32,
    state: &State,
    terminal: u32,
    pending: PendingAction,
    fallback: ConflictFallback,
) -> Result<Action, ConflictError> {
    let PendingAction { shift, reduces } = pending;

    match (shift, &reduces[..]) {
        (Some(next), []) => Ok(Action::Shift(next)),

        (None, []) => unreachable!("pending action with no shift and no reduce"),

        (None, &[single]) if single == g.augment => Ok(Action::Accept),

        (None, &[single]) => Ok(reduce_action(g, single)),

        (None, &[a, b, ..]) => Err(ConflictError::ReduceReduce {
            state: state_id,
            terminal: g.name(terminal).to_owned(),
            first: reduce_item(g, a),
            second: reduce_item(g, b),
        }),

        (Some(next), reduces) => {
            if reduces.contains(&g.augment) {
                return Err(ConflictError::Accept {
                    state: state_id,
                    terminal: g.name(terminal).to_owned(),
                });
            }

            let shift_prec = g.precedence.get(&terminal).copied();
            let conflict = |reduce: u32| ConflictError::ShiftReduce {
                state: state_id,
                terminal: g.name(terminal).to_owned(),
                shift: shift_item(g, state, terminal),
                reduce: reduce_item(g, reduce),
            };

            let mut resolution: Option<Option<PrecDiff>> = None;
            for &reduce in reduces {
                let reduce_prec = g.prod_operator[reduce as usize]
                    .and_then(|op| g.precedence.get(&op))
                    .copied();
                let this = compare_precs(shift_prec, reduce_prec);
                match resolution {
                    None => resolution = Some(this),
                    Some(previous) if previous == this => {}
                    Some(..) => return Err(conflict(reduce)),
                }
            }

            match resolution.expect("at least one reduce candidate") {
                Some(PrecDiff::Shift) => Ok(Action::Shift(next)),
                Some(PrecDiff::Reduce) if reduces.len() == 1 => Ok(reduce_action(g, reduces[0])),
                Some(PrecDiff::Reduce) => Err(conflict(reduces[1])),
                Some(PrecDiff::Neither) => Ok(Action::Error("non-associative".to_owned())),
                None => match fallback {
                    ConflictFallback::Shift => Ok(Action::Shift(next)),
                    ConflictFallback::Reduce if reduces.len() == 1 => {
                        Ok(reduce_action(g, reduces[0]))
                    }
                    _ => Err(conflict(reduces[0])),
                },
            }
        }
    }
}
