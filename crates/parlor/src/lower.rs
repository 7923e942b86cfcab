//! EBNF to BNF lowering.
//!
//! A worklist rewrites the leftmost EBNF element of each production until
//! none remain. Every rewrite threads an argument-shaping adapter in front
//! of the production's previous handler reference, so the user callback
//! still observes the conceptual argument shape of the unlowered rule.
//! Because rewriting is leftmost-first, every slot index recorded in an
//! adapter refers to a prefix made of plain symbols only.

use crate::grammar::{
    ComplexProduction, EbnfElement, EbnfKind, SimpleProduction, SymbolRef, Term,
};
use crate::types::Set;
use crate::util::fresh_name;
use parlor_runtime::{HandlerRef, ShapeOp};
use std::collections::VecDeque;
use std::ops::RangeInclusive;

pub(crate) fn lower(productions: &[ComplexProduction]) -> Vec<SimpleProduction> {
    Lowering::new(productions).run()
}

struct Lowering {
    queue: VecDeque<ComplexProduction>,
    seen: Set<(String, Vec<Term>)>,
    taken: Set<String>,
    out: Vec<SimpleProduction>,
    synthesized: usize,
}

impl Lowering {
    fn new(productions: &[ComplexProduction]) -> Self {
        let mut taken = Set::default();
        for p in productions {
            taken.insert(p.head.clone());
            collect_names(&p.body, &mut taken);
        }

        let mut this = Self {
            queue: VecDeque::new(),
            seen: Set::default(),
            taken,
            out: Vec::new(),
            synthesized: 0,
        };
        for p in productions {
            this.push(p.clone());
        }
        this
    }

    fn run(mut self) -> Vec<SimpleProduction> {
        while let Some(p) = self.queue.pop_front() {
            match p.body.iter().position(|t| matches!(t, Term::Ebnf(..))) {
                None => {
                    let body = p
                        .body
                        .into_iter()
                        .map(|term| match term {
                            Term::Name(name) => SymbolRef::Name(name),
                            Term::Literal(name) => SymbolRef::Literal(name),
                            Term::Ebnf(..) => unreachable!("no elements left"),
                        })
                        .collect();
                    self.out.push(SimpleProduction {
                        head: p.head,
                        body,
                        handler: p.handler,
                    });
                }
                Some(index) => self.rewrite(p, index),
            }
        }
        self.out
    }

    /// Deduplicated worklist insertion, keyed by (head, body).
    fn push(&mut self, p: ComplexProduction) {
        let key = (p.head.clone(), p.body.clone());
        if self.seen.insert(key) {
            self.queue.push_back(p);
        }
    }

    fn rewrite(&mut self, p: ComplexProduction, index: usize) {
        let Term::Ebnf(element) = p.body[index].clone() else {
            unreachable!("rewrite target is an EBNF element");
        };

        match element.kind {
            EbnfKind::Optional => match element.repeat {
                None => {
                    // One production without the element, inserting an
                    // undefined at its slot, plus one per inner alternative.
                    let mut without = p.body.clone();
                    without.remove(index);
                    self.push(ComplexProduction {
                        head: p.head.clone(),
                        body: without,
                        handler: p.handler.clone().wrap(ShapeOp::Epsilon { slot: index }),
                        incremental: p.incremental,
                    });
                    for alternative in &element.alternatives {
                        self.push(spliced(&p, index, alternative, p.handler.clone()));
                    }
                }
                Some(n) => self.multiplicity(&p, index, &element.alternatives, 0..=n),
            },

            EbnfKind::Group | EbnfKind::Mult => match element.repeat {
                None => {
                    for alternative in &element.alternatives {
                        self.push(spliced(&p, index, alternative, p.handler.clone()));
                    }
                }
                Some(n) => self.multiplicity(&p, index, &element.alternatives, n..=n),
            },

            EbnfKind::Repeat => {
                // Head : alpha {X} beta  becomes
                //   pre : alpha            (collect)
                //   pre : pre X            (append)
                //   Head : pre beta        (apply @ index)
                let alpha = p.body[..index].to_vec();
                let beta = p.body[index + 1..].to_vec();

                let base = format!("{}_RPT_PRE_{}", p.head, self.synthesized);
                self.synthesized += 1;
                let pre = fresh_name(&base, &self.taken);
                self.taken.insert(pre.clone());

                self.push(ComplexProduction {
                    head: pre.clone(),
                    body: alpha,
                    handler: HandlerRef::None.wrap(ShapeOp::Collect),
                    incremental: false,
                });
                for alternative in &element.alternatives {
                    let mut body = vec![Term::Name(pre.clone())];
                    body.extend(alternative.iter().cloned());
                    self.push(ComplexProduction {
                        head: pre.clone(),
                        body,
                        handler: HandlerRef::None.wrap(ShapeOp::Append),
                        incremental: false,
                    });
                }

                let mut body = vec![Term::Name(pre)];
                body.extend(beta);
                self.push(ComplexProduction {
                    head: p.head.clone(),
                    body,
                    handler: p.handler.clone().wrap(ShapeOp::Apply { slot: index }),
                    incremental: p.incremental,
                });
            }
        }
    }

    /// Expand `element * N` (or `[element] * N`) into one production per
    /// copy count and alternative combination, grouping the copies into a
    /// single array argument.
    fn multiplicity(
        &mut self,
        p: &ComplexProduction,
        index: usize,
        alternatives: &[Vec<Term>],
        counts: RangeInclusive<usize>,
    ) {
        for count in counts {
            for combo in combinations(alternatives, count) {
                let handler = p.handler.clone().wrap(ShapeOp::Merge {
                    slot: index,
                    count: combo.len(),
                });
                self.push(spliced(p, index, &combo, handler));
            }
        }
    }
}

fn spliced(
    p: &ComplexProduction,
    index: usize,
    replacement: &[Term],
    handler: HandlerRef,
) -> ComplexProduction {
    let mut body = p.body.clone();
    body.splice(index..=index, replacement.iter().cloned());
    ComplexProduction {
        head: p.head.clone(),
        body,
        handler,
        incremental: p.incremental,
    }
}

/// Cartesian product of `count` picks from `alternatives`, concatenated.
fn combinations(alternatives: &[Vec<Term>], count: usize) -> Vec<Vec<Term>> {
    let mut acc = vec![Vec::new()];
    for _ in 0..count {
        let mut next = Vec::new();
        for prefix in &acc {
            for alternative in alternatives {
                let mut combo = prefix.clone();
                combo.extend(alternative.iter().cloned());
                next.push(combo);
            }
        }
        acc = next;
    }
    acc
}

fn collect_names(body: &[Term], taken: &mut Set<String>) {
    for term in body {
        match term {
            Term::Name(name) | Term::Literal(name) => {
                taken.insert(name.clone());
            }
            Term::Ebnf(element) => {
                for alternative in &element.alternatives {
                    collect_names(alternative, taken);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Term {
        Term::Name(n.to_owned())
    }

    fn lit(n: &str) -> Term {
        Term::Literal(n.to_owned())
    }

    fn production(head: &str, body: Vec<Term>) -> ComplexProduction {
        ComplexProduction {
            head: head.to_owned(),
            body,
            handler: HandlerRef::Index(0),
            incremental: false,
        }
    }

    fn bodies_of<'a>(out: &'a [SimpleProduction], head: &str) -> Vec<&'a SimpleProduction> {
        out.iter().filter(|p| p.head == head).collect()
    }

    #[test]
    fn group_lowers_to_one_production_per_alternative() {
        // S = X (A | B) Y
        let element = EbnfElement {
            kind: EbnfKind::Group,
            alternatives: vec![vec![lit("A")], vec![lit("B")]],
            repeat: None,
        };
        let out = lower(&[production(
            "S",
            vec![lit("X"), Term::Ebnf(element), lit("Y")],
        )]);

        let s = bodies_of(&out, "S");
        assert_eq!(s.len(), 2, "exactly two plain productions");
        assert_eq!(
            s[0].body,
            vec![
                SymbolRef::Literal("X".into()),
                SymbolRef::Literal("A".into()),
                SymbolRef::Literal("Y".into())
            ]
        );
        assert_eq!(
            s[1].body,
            vec![
                SymbolRef::Literal("X".into()),
                SymbolRef::Literal("B".into()),
                SymbolRef::Literal("Y".into())
            ]
        );
        // The group adds no adapter.
        assert_eq!(s[0].handler, HandlerRef::Index(0));
    }

    #[test]
    fn optional_splits_with_epsilon_adapter() {
        // S = A [B]
        let element = EbnfElement {
            kind: EbnfKind::Optional,
            alternatives: vec![vec![lit("B")]],
            repeat: None,
        };
        let out = lower(&[production("S", vec![lit("A"), Term::Ebnf(element)])]);

        let s = bodies_of(&out, "S");
        assert_eq!(s.len(), 2);
        let without = s
            .iter()
            .find(|p| p.body.len() == 1)
            .expect("production without the optional");
        assert_eq!(
            without.handler,
            HandlerRef::Index(0).wrap(ShapeOp::Epsilon { slot: 1 })
        );
        let with = s.iter().find(|p| p.body.len() == 2).unwrap();
        assert_eq!(with.handler, HandlerRef::Index(0));
    }

    #[test]
    fn repeat_synthesizes_collector_productions() {
        // S = A {B}
        let element = EbnfElement {
            kind: EbnfKind::Repeat,
            alternatives: vec![vec![lit("B")]],
            repeat: None,
        };
        let out = lower(&[production("S", vec![lit("A"), Term::Ebnf(element)])]);

        let pre = "S_RPT_PRE_0";
        let pre_bodies = bodies_of(&out, pre);
        assert_eq!(pre_bodies.len(), 2);
        assert_eq!(
            pre_bodies[0].handler,
            HandlerRef::None.wrap(ShapeOp::Collect)
        );
        assert_eq!(pre_bodies[0].body, vec![SymbolRef::Literal("A".into())]);
        assert_eq!(
            pre_bodies[1].handler,
            HandlerRef::None.wrap(ShapeOp::Append)
        );
        assert_eq!(
            pre_bodies[1].body,
            vec![SymbolRef::Name(pre.into()), SymbolRef::Literal("B".into())]
        );

        let s = bodies_of(&out, "S");
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].body, vec![SymbolRef::Name(pre.into())]);
        assert_eq!(
            s[0].handler,
            HandlerRef::Index(0).wrap(ShapeOp::Apply { slot: 1 })
        );
    }

    #[test]
    fn multiplicity_expands_copies_with_merge() {
        // S = [A] * 2
        let element = EbnfElement {
            kind: EbnfKind::Optional,
            alternatives: vec![vec![lit("A")]],
            repeat: Some(2),
        };
        let out = lower(&[production("S", vec![Term::Ebnf(element)])]);

        let s = bodies_of(&out, "S");
        assert_eq!(s.len(), 3, "zero, one and two copies");
        for (copies, p) in s.iter().enumerate() {
            assert_eq!(p.body.len(), copies);
            assert_eq!(
                p.handler,
                HandlerRef::Index(0).wrap(ShapeOp::Merge {
                    slot: 0,
                    count: copies,
                })
            );
        }
    }

    #[test]
    fn duplicate_rewrites_are_emitted_once() {
        // S = (A | A) B collapses to a single production.
        let element = EbnfElement {
            kind: EbnfKind::Group,
            alternatives: vec![vec![lit("A")], vec![lit("A")]],
            repeat: None,
        };
        let out = lower(&[production("S", vec![Term::Ebnf(element), lit("B")])]);
        assert_eq!(bodies_of(&out, "S").len(), 1);
    }

    #[test]
    fn synthesized_names_avoid_collisions() {
        let element = EbnfElement {
            kind: EbnfKind::Repeat,
            alternatives: vec![vec![lit("B")]],
            repeat: None,
        };
        let clash = production("S_RPT_PRE_0", vec![lit("x")]);
        let repeated = production("S", vec![Term::Ebnf(element)]);
        let out = lower(&[clash, repeated]);
        assert!(out.iter().any(|p| p.head == "S_RPT_PRE_0_1"));
    }

    #[test]
    fn nested_elements_lower_inside_out() {
        // S = [ (A | B) ]
        let group = EbnfElement {
            kind: EbnfKind::Group,
            alternatives: vec![vec![lit("A")], vec![lit("B")]],
            repeat: None,
        };
        let optional = EbnfElement {
            kind: EbnfKind::Optional,
            alternatives: vec![vec![Term::Ebnf(group)]],
            repeat: None,
        };
        let out = lower(&[production("S", vec![Term::Ebnf(optional)])]);
        let s = bodies_of(&out, "S");
        // Empty, A, and B.
        assert_eq!(s.len(), 3);
        assert!(s.iter().any(|p| p.body.is_empty()));
        assert!(s
            .iter()
            .any(|p| p.body == vec![SymbolRef::Literal("A".into())]));
        assert!(s
            .iter()
            .any(|p| p.body == vec![SymbolRef::Literal("B".into())]));
    }
}
