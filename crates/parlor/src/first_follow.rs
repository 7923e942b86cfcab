//! FIRST and FOLLOW set computation.

use crate::grammar::{CompiledGrammar, EOF};
use crate::types::{Map, TerminalSet};

#[derive(Debug)]
pub(crate) struct FirstSets {
    nullable: TerminalSet,
    map: Map<u32, TerminalSet>,
}

impl FirstSets {
    pub(crate) fn new(g: &CompiledGrammar) -> Self {
        let nullable = nullable_set(g);

        // First(t) = {t} for terminals, First(N) = {} to start with.
        let mut map: Map<u32, TerminalSet> = Map::default();
        for (id, symbol) in g.symbols.iter().enumerate() {
            let id = id as u32;
            if symbol.nonterminal {
                map.insert(id, TerminalSet::default());
            } else {
                map.insert(id, Some(id).into_iter().collect());
            }
        }

        // For X : Y1 Y2 ... Yn, scan the Yi until the first non-nullable one
        // and record First(X) ⊇ First(Yi) for each symbol scanned.
        struct Constraint {
            sup: u32,
            sub: u32,
        }
        let mut constraints = Vec::new();
        for p in &g.productions {
            for &symbol in &p.body {
                if symbol != p.head {
                    constraints.push(Constraint {
                        sup: p.head,
                        sub: symbol,
                    });
                }
                if !nullable.contains(symbol) {
                    break;
                }
            }
        }

        // Solve by iterating until no constraint adds anything new.
        let mut changed = true;
        while changed {
            changed = false;
            for Constraint { sup, sub } in &constraints {
                let subset = map[sub].clone();
                let superset = &mut map[sup];
                let before = superset.len();
                superset.union_with(&subset);
                changed |= superset.len() != before;
            }
        }

        Self { nullable, map }
    }

    pub(crate) fn is_nullable(&self, id: u32) -> bool {
        self.nullable.contains(id)
    }

    /// `First(prefix lookaheads)`.
    pub(crate) fn first_of(&self, prefix: &[u32], lookaheads: &TerminalSet) -> TerminalSet {
        let mut result = TerminalSet::default();
        for &symbol in prefix {
            result.union_with(&self.map[&symbol]);
            if !self.nullable.contains(symbol) {
                return result;
            }
        }
        result.union_with(lookaheads);
        result
    }
}

/// The nullable nonterminals of the grammar, by fixpoint.
fn nullable_set(g: &CompiledGrammar) -> TerminalSet {
    let mut nullable: TerminalSet = g
        .productions
        .iter()
        .filter(|p| p.body.is_empty())
        .map(|p| p.head)
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for p in &g.productions {
            if nullable.contains(p.head) {
                continue;
            }
            if p.body.iter().all(|s| nullable.contains(*s)) {
                changed = true;
                nullable.insert(p.head);
            }
        }
    }

    nullable
}

#[derive(Debug)]
pub(crate) struct FollowSets {
    map: Map<u32, TerminalSet>,
}

impl FollowSets {
    pub(crate) fn new(g: &CompiledGrammar, first: &FirstSets) -> Self {
        let mut map: Map<u32, TerminalSet> = Map::default();
        for (id, symbol) in g.symbols.iter().enumerate() {
            if symbol.nonterminal {
                map.insert(id as u32, TerminalSet::default());
            }
        }

        // The augmented start is followed by end-of-input only.
        let augment_head = g.productions[g.augment as usize].head;
        map[&augment_head].insert(EOF);

        let empty = TerminalSet::default();
        let mut changed = true;
        while changed {
            changed = false;
            for p in &g.productions {
                for (i, &symbol) in p.body.iter().enumerate() {
                    if g.is_terminal(symbol) {
                        continue;
                    }
                    let beta = &p.body[i + 1..];
                    let mut addition = first.first_of(beta, &empty);
                    if beta.iter().all(|s| first.is_nullable(*s)) {
                        addition.union_with(&map[&p.head]);
                    }
                    let follow = &mut map[&symbol];
                    let before = follow.len();
                    follow.union_with(&addition);
                    changed |= follow.len() != before;
                }
            }
        }

        Self { map }
    }

    pub(crate) fn get(&self, nonterminal: u32) -> &TerminalSet {
        &self.map[&nonterminal]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, Symbol};

    // E : E + T Opt | T ; T : n | ( E ) ; with a nullable suffix Opt : | x
    fn sample() -> GrammarBuilder {
        use Symbol::{Epsilon, Nonterminal as N, Terminal as T};
        let mut g = GrammarBuilder::new();
        g.production(
            "E",
            [N("E".into()), T("+".into()), N("T".into()), N("Opt".into())],
            None,
        );
        g.production("E", [N("T".into())], None);
        g.production("T", [T("n".into())], None);
        g.production("T", [T("(".into()), N("E".into()), T(")".into())], None);
        g.production("Opt", [Epsilon], None);
        g.production("Opt", [T("x".into())], None);
        g
    }

    #[test]
    fn first_and_follow_fixpoints() {
        let builder = sample();
        let lowered = crate::lower::lower(builder.raw_productions());
        let g = builder.compile(&lowered).unwrap();
        let first = FirstSets::new(&g);

        let id = |name: &str| g.table[name];
        let e = id("E");
        let t = id("T");
        let opt = id("Opt");

        assert!(first.is_nullable(opt));
        assert!(!first.is_nullable(e));

        let first_e: Vec<u32> = first.first_of(&[e], &TerminalSet::default()).iter().collect();
        assert!(first_e.contains(&id("n")));
        assert!(first_e.contains(&id("(")));
        assert!(!first_e.contains(&id("+")));

        let follow = FollowSets::new(&g, &first);
        // FOLLOW(E) includes +, ) and EOF.
        let follow_e = follow.get(e);
        assert!(follow_e.contains(id("+")));
        assert!(follow_e.contains(id(")")));
        assert!(follow_e.contains(EOF));
        // FOLLOW(T) inherits FOLLOW(E) through the nullable Opt suffix.
        let follow_t = follow.get(t);
        assert!(follow_t.contains(id("+")));
        assert!(follow_t.contains(EOF));
        assert!(follow_t.contains(id("x")));
    }
}
