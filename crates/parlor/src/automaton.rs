//! LR item-set construction.
//!
//! One generator covers all four table modes. LR(0) and SLR items carry
//! empty lookahead sets, so states with equal cores always coincide; LR(1)
//! reuses a state only when its lookaheads already cover the incoming ones;
//! LALR merges lookaheads into the kernel-equal state and re-derives its
//! successors whenever the merge changed anything.

use crate::first_follow::FirstSets;
use crate::grammar::{BuildError, CompiledGrammar, EOF};
use crate::types::{Map, Set, TerminalSet};
use crate::util::display_fn;
use parlor_runtime::TableMode;
use std::collections::{btree_map, BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// An LR(0) item: a production with a marker position in its body.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ItemCore {
    pub(crate) production: u32,
    pub(crate) dot: usize,
}

/// Items of one state with their lookahead sets (empty outside LALR/LR1).
/// The BTreeMap keeps the canonical ordering used for state identity.
pub(crate) type ItemSet = BTreeMap<ItemCore, TerminalSet>;

type ItemCores = BTreeSet<ItemCore>;

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) items: ItemSet,
    pub(crate) edges: Map<u32, u32>,
}

#[derive(Debug)]
pub(crate) struct Automaton {
    pub(crate) states: Vec<State>,
}

impl Automaton {
    #[allow(dead_code)]
    pub(crate) fn display<'g>(&'g self, g: &'g CompiledGrammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (id, state) in self.states.iter().enumerate() {
                writeln!(f, "#### state {:02}", id)?;
                for (core, lookaheads) in &state.items {
                    write!(f, "- {}", g.render_item(core.production, core.dot))?;
                    if !lookaheads.is_empty() {
                        write!(f, "  [")?;
                        for (i, t) in lookaheads.iter().enumerate() {
                            if i > 0 {
                                f.write_str(" ")?;
                            }
                            f.write_str(g.name(t))?;
                        }
                        f.write_str("]")?;
                    }
                    writeln!(f)?;
                }
                for (symbol, target) in &state.edges {
                    writeln!(f, "- {} -> {:02}", g.name(*symbol), target)?;
                }
            }
            Ok(())
        })
    }
}

pub(crate) fn build(
    g: &CompiledGrammar,
    mode: TableMode,
    first: &FirstSets,
) -> Result<Automaton, BuildError> {
    Generator::new(g, mode, first).run()
}

enum ItemSetDiff {
    Same,
    Compatible,
    Different,
}

fn compare_item_sets(mode: TableMode, old: &ItemSet, new: &ItemSet) -> ItemSetDiff {
    // Both sets are known to have equal cores.
    let covered = old
        .values()
        .zip(new.values())
        .all(|(old, new)| old.is_superset(new));
    if covered {
        return ItemSetDiff::Same;
    }
    match mode {
        TableMode::Lalr => ItemSetDiff::Compatible,
        _ => ItemSetDiff::Different,
    }
}

struct Generator<'g> {
    g: &'g CompiledGrammar,
    mode: TableMode,
    first: &'g FirstSets,
    pending: VecDeque<(u32, ItemSet, Option<u32>)>,
    nodes: Map<u32, (ItemSet, Map<u32, u32>)>,
    same_cores: Map<ItemCores, Set<u32>>,
    next_id: u32,
}

impl<'g> Generator<'g> {
    fn new(g: &'g CompiledGrammar, mode: TableMode, first: &'g FirstSets) -> Self {
        let mut seed = BTreeMap::new();
        let lookaheads = if tracks_lookaheads(mode) {
            Some(EOF).into_iter().collect()
        } else {
            TerminalSet::default()
        };
        seed.insert(
            ItemCore {
                production: g.augment,
                dot: 0,
            },
            lookaheads,
        );

        let mut pending = VecDeque::new();
        pending.push_back((0, seed, None));

        Self {
            g,
            mode,
            first,
            pending,
            nodes: Map::default(),
            same_cores: Map::default(),
            next_id: 1,
        }
    }

    fn run(mut self) -> Result<Automaton, BuildError> {
        self.populate()?;
        self.finalize()
    }

    fn populate(&mut self) -> Result<(), BuildError> {
        'dequeue: while let Some((new_id, mut item_set, prev)) = self.pending.pop_front() {
            self.expand_closures(&mut item_set);

            let cores: ItemCores = item_set.keys().copied().collect();

            // Look for a reusable state with the same cores.
            let candidates: Vec<u32> = self
                .same_cores
                .get(&cores)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            for orig_id in candidates {
                match compare_item_sets(self.mode, &self.nodes[&orig_id].0, &item_set) {
                    ItemSetDiff::Same => {}

                    ItemSetDiff::Compatible => {
                        // Merge the lookaheads into the existing state.
                        let mut modified = false;
                        let orig = &mut self.nodes[&orig_id];
                        for (core, lookaheads) in &item_set {
                            let target = orig
                                .0
                                .get_mut(core)
                                .ok_or(BuildError::InvalidProductionIndex)?;
                            let before = target.len();
                            target.union_with(lookaheads);
                            modified |= target.len() != before;
                        }

                        // New lookaheads may introduce new reduce actions in
                        // the successors, so re-derive them.
                        if modified {
                            let transitions = self.transitions(&item_set);
                            for (symbol, successor) in transitions {
                                let id = self.enqueue(successor, Some(orig_id));
                                self.nodes[&orig_id].1.insert(symbol, id);
                            }
                        }
                    }

                    ItemSetDiff::Different => continue,
                }

                // The id reserved at enqueue time is already recorded in the
                // predecessor's edges; point those at the reused state.
                if let Some(prev_id) = prev {
                    for edge in self.nodes[&prev_id].1.values_mut() {
                        if *edge == new_id {
                            *edge = orig_id;
                        }
                    }
                }

                continue 'dequeue;
            }

            let transitions = self.transitions(&item_set);
            let mut edges = Map::default();
            for (symbol, successor) in transitions {
                let id = self.enqueue(successor, Some(new_id));
                edges.insert(symbol, id);
            }

            self.nodes.insert(new_id, (item_set, edges));
            self.same_cores.entry(cores).or_default().insert(new_id);
        }

        Ok(())
    }

    fn enqueue(&mut self, item_set: ItemSet, prev: Option<u32>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back((id, item_set, prev));
        id
    }

    /// Closure expansion: for every `[X : ... . Y beta]` with nonterminal Y,
    /// add `[Y : . gamma]` for each production of Y, with lookaheads drawn
    /// from `First(beta lookaheads)` when the mode tracks them.
    fn expand_closures(&self, items: &mut ItemSet) {
        let tracks = tracks_lookaheads(self.mode);
        let mut changed = true;
        while changed {
            changed = false;

            let mut added: Map<ItemCore, TerminalSet> = Map::default();
            for (core, lookaheads) in items.iter() {
                let p = &self.g.productions[core.production as usize];
                let Some((&y, beta)) = p.body[core.dot..].split_first() else {
                    continue;
                };
                if self.g.is_terminal(y) {
                    continue;
                }

                let follow = if tracks {
                    self.first.first_of(beta, lookaheads)
                } else {
                    TerminalSet::default()
                };
                for (pid, candidate) in self.g.productions.iter().enumerate() {
                    if candidate.head != y {
                        continue;
                    }
                    added
                        .entry(ItemCore {
                            production: pid as u32,
                            dot: 0,
                        })
                        .or_default()
                        .union_with(&follow);
                }
            }

            for (core, lookaheads) in added {
                match items.entry(core) {
                    btree_map::Entry::Vacant(entry) => {
                        entry.insert(lookaheads);
                        changed = true;
                    }
                    btree_map::Entry::Occupied(mut entry) => {
                        let target = entry.get_mut();
                        let before = target.len();
                        target.union_with(&lookaheads);
                        changed |= target.len() != before;
                    }
                }
            }
        }
    }

    /// Unexpanded successor item sets, grouped by the transition label.
    fn transitions(&self, items: &ItemSet) -> Map<u32, ItemSet> {
        let mut out: Map<u32, ItemSet> = Map::default();
        for (core, lookaheads) in items {
            let p = &self.g.productions[core.production as usize];
            if core.dot >= p.body.len() {
                continue;
            }
            let label = p.body[core.dot];
            out.entry(label).or_default().insert(
                ItemCore {
                    production: core.production,
                    dot: core.dot + 1,
                },
                lookaheads.clone(),
            );
        }
        out
    }

    /// Merging leaves holes in the provisional id space; renumber densely.
    fn finalize(self) -> Result<Automaton, BuildError> {
        let mut remap: Map<u32, u32> = Map::default();
        for (index, &orig) in self.nodes.keys().enumerate() {
            remap.insert(orig, index as u32);
        }

        let mut states = Vec::with_capacity(self.nodes.len());
        for (_, (items, edges)) in self.nodes {
            let edges = edges
                .into_iter()
                .map(|(symbol, target)| (symbol, remap[&target]))
                .collect();
            states.push(State { items, edges });
        }
        Ok(Automaton { states })
    }
}

fn tracks_lookaheads(mode: TableMode) -> bool {
    matches!(mode, TableMode::Lalr | TableMode::Lr1)
}
