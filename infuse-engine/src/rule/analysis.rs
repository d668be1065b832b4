//! Static analyses run once per rule at load time.
//!
//! S-conditions record, for every quantifier, whether it is used
//! universally or existentially once negations are pushed inward.
//! That tells schedulers which changes may introduce a violation
//! (e.g., an addition under a universal quantifier) and which may
//! only hide one.
//!
//! RCRE sets map each pattern to the quantifiers over that pattern:
//! the only formula nodes whose CCT instances gain or lose branches
//! when the pattern changes.  Everything else a change touches is an
//! ancestor of one of those instances.
use super::formula::{Formula, FormulaId, FormulaKind};
use crate::context::ChangeType;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Polarity {
    /// FORALL under an even number of negations, or EXISTS under an
    /// odd number.
    Universal,
    /// The dual of `Universal`.
    Existential,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SCondition {
    pub pattern: String,
    pub quantifier: FormulaId,
    pub polarity: Polarity,
}

/// How changes to one pattern may move a rule's truth.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Sensitivity {
    pub universal: bool,
    pub existential: bool,
}

impl Sensitivity {
    fn observe(&mut self, polarity: Polarity) {
        match polarity {
            Polarity::Universal => self.universal = true,
            Polarity::Existential => self.existential = true,
        }
    }

    /// Returns true if a change of this type may turn a satisfied
    /// rule into a violated one.
    #[must_use]
    pub fn may_violate(self, change: ChangeType) -> bool {
        match change {
            ChangeType::Addition => self.universal,
            ChangeType::Deletion => self.existential,
            ChangeType::Update => self.universal || self.existential,
        }
    }

    /// Returns true if a change of this type may turn a violated rule
    /// into a satisfied one (and thus mask an earlier violation).
    #[must_use]
    pub fn may_satisfy(self, change: ChangeType) -> bool {
        match change {
            ChangeType::Addition => self.existential,
            ChangeType::Deletion => self.universal,
            ChangeType::Update => self.universal || self.existential,
        }
    }
}

/// Derives one `SCondition` per quantifier, in formula order.
#[must_use]
pub fn derive_s_conditions(formula: &Formula) -> Vec<SCondition> {
    let mut ret = Vec::new();
    let mut stack = vec![(formula.root(), false)];

    while let Some((id, negated)) = stack.pop() {
        match formula.kind(id) {
            FormulaKind::Forall { pattern, body, .. } => {
                ret.push(SCondition {
                    pattern: pattern.clone(),
                    quantifier: id,
                    polarity: if negated {
                        Polarity::Existential
                    } else {
                        Polarity::Universal
                    },
                });
                stack.push((*body, negated));
            }
            FormulaKind::Exists { pattern, body, .. } => {
                ret.push(SCondition {
                    pattern: pattern.clone(),
                    quantifier: id,
                    polarity: if negated {
                        Polarity::Universal
                    } else {
                        Polarity::Existential
                    },
                });
                stack.push((*body, negated));
            }
            FormulaKind::And(l, r) | FormulaKind::Or(l, r) => {
                stack.push((*l, negated));
                stack.push((*r, negated));
            }
            FormulaKind::Implies(l, r) => {
                stack.push((*l, !negated));
                stack.push((*r, negated));
            }
            FormulaKind::Not(c) => stack.push((*c, !negated)),
            FormulaKind::Atom { .. } => {}
        }
    }

    ret.sort();
    ret
}

/// Folds S-conditions into a per-pattern `Sensitivity`.
#[must_use]
pub fn sensitivities(conditions: &[SCondition]) -> BTreeMap<String, Sensitivity> {
    let mut ret: BTreeMap<String, Sensitivity> = BTreeMap::new();
    for condition in conditions {
        ret.entry(condition.pattern.clone())
            .or_default()
            .observe(condition.polarity);
    }

    ret
}

/// Derives, for each pattern, the quantifiers over that pattern,
/// outermost first.
#[must_use]
pub fn derive_rcre_sets(formula: &Formula) -> BTreeMap<String, Vec<FormulaId>> {
    let mut ret: BTreeMap<String, Vec<FormulaId>> = BTreeMap::new();
    for id in formula.ids() {
        if let Some((_, pattern, _)) = formula.kind(id).quantifier() {
            ret.entry(pattern.to_owned()).or_default().push(id);
        }
    }

    for quantifiers in ret.values_mut() {
        quantifiers.sort_by_key(|id| (formula.node(*id).depth(), *id));
    }

    ret
}

#[cfg(test)]
fn sample_formula() -> (Formula, FormulaId, FormulaId, FormulaId) {
    use super::formula::FormulaBuilder;

    // forall a in A: (not (exists b in B: eq(a, b))) implies (forall c in A: ok(c))
    let mut f = FormulaBuilder::new();
    let eq = f.atom("eq", &["a", "b"]);
    let exists_b = f.exists("b", "B", eq);
    let not_exists = f.not(exists_b);
    let ok = f.atom("ok", &["c"]);
    let forall_c = f.forall("c", "A", ok);
    let imp = f.implies(not_exists, forall_c);
    let forall_a = f.forall("a", "A", imp);

    (f.finish(forall_a).expect("ok"), forall_a, exists_b, forall_c)
}

#[test]
fn test_s_conditions() {
    let (formula, forall_a, exists_b, forall_c) = sample_formula();
    let conditions = derive_s_conditions(&formula);

    let polarity = |q: FormulaId| {
        conditions
            .iter()
            .find(|c| c.quantifier == q)
            .map(|c| c.polarity)
    };

    assert_eq!(conditions.len(), 3);
    assert_eq!(polarity(forall_a), Some(Polarity::Universal));
    assert_eq!(polarity(forall_c), Some(Polarity::Universal));
    // `exists b` sits under a NOT on the left of an IMPLIES: two
    // flips, so it is still used existentially.
    assert_eq!(polarity(exists_b), Some(Polarity::Existential));

    let sens = sensitivities(&conditions);
    assert!(sens["A"].may_violate(ChangeType::Addition));
    assert!(!sens["A"].may_violate(ChangeType::Deletion));
    assert!(sens["B"].may_violate(ChangeType::Deletion));
    assert!(sens["B"].may_satisfy(ChangeType::Addition));
    assert!(sens["B"].may_satisfy(ChangeType::Update));
}

#[test]
fn test_rcre_sets() {
    let (formula, forall_a, exists_b, forall_c) = sample_formula();
    let rcre = derive_rcre_sets(&formula);

    assert_eq!(rcre.len(), 2);
    assert_eq!(rcre["A"], vec![forall_a, forall_c]);
    assert_eq!(rcre["B"], vec![exists_b]);
}
