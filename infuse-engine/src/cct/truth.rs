//! Truth maintenance.  Atom truth is computed once, when the atom is
//! built: contexts are immutable, and an update replaces the branches
//! that bind the old context.  Every other node's truth is a function
//! of its children's.
use super::{Cct, NodeId};
use crate::rule::{Formula, FormulaKind};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::collections::BinaryHeap;

impl Cct {
    /// Recomputes `id`'s truth from its children.  Atoms keep the truth
    /// they were built with.
    pub(super) fn eval_node(&self, formula: &Formula, id: NodeId) -> bool {
        let node = self.node(id);
        let truth = |child: &NodeId| self.node(*child).truth;

        match formula.kind(node.formula) {
            FormulaKind::Forall { .. } | FormulaKind::And(..) => node.children.iter().all(truth),
            FormulaKind::Exists { .. } | FormulaKind::Or(..) => node.children.iter().any(truth),
            FormulaKind::Implies(..) => {
                !truth(&node.children[0]) || truth(&node.children[1])
            }
            FormulaKind::Not(_) => !truth(&node.children[0]),
            FormulaKind::Atom { .. } => node.truth,
        }
    }

    /// Re-derives truth over the affected set, deepest nodes first, and
    /// returns the number of nodes evaluated.
    pub fn evaluate_affected(&mut self, formula: &Formula) -> usize {
        let mut order: Vec<NodeId> = self
            .affected
            .iter()
            .copied()
            .filter(|id| self.is_live(*id))
            .collect();
        order.sort_by_key(|id| (Reverse(self.node(*id).depth), *id));

        for id in order.iter().copied() {
            let truth = self.eval_node(formula, id);
            self.node_mut(id).truth = truth;
        }

        self.touched += order.len();
        order.len()
    }

    /// Propagates truth upward from `seeds`.  Every live seed is
    /// re-evaluated; an ancestor only is when one of its children's
    /// truth changed.  Returns the number of nodes evaluated.
    pub fn propagate<I: IntoIterator<Item = NodeId>>(&mut self, formula: &Formula, seeds: I) -> usize {
        let mut queued: BTreeSet<NodeId> = BTreeSet::new();
        let mut worklist = BinaryHeap::new();
        for seed in seeds {
            if self.is_live(seed) && queued.insert(seed) {
                worklist.push((self.node(seed).depth, seed));
            }
        }

        let mut evaluated = 0;
        while let Some((_, id)) = worklist.pop() {
            let truth = self.eval_node(formula, id);
            let node = self.node_mut(id);
            let changed = node.truth != truth;
            node.truth = truth;
            evaluated += 1;

            if let (true, Some(parent)) = (changed, node.parent) {
                if queued.insert(parent) {
                    worklist.push((self.node(parent).depth, parent));
                }
            }
        }

        self.touched += evaluated;
        evaluated
    }
}

#[cfg(test)]
fn chain() -> (Formula, Cct, NodeId) {
    use crate::bfunc::FunctionTable;
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    // not (exists a in A: pos(a))
    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let exists = f.exists("a", "A", pos);
    let root = f.not(exists);
    let rule = Rule::new::<_, &str, &str>("r", f, root, []).expect("ok");

    let mut pool = ContextPool::new();
    pool.init_pattern_sets(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    pool.init_rule(&rule);
    pool.seed("A", Context::new("c1", [("x", "-1")]))
        .expect("ok");

    let functions = FunctionTable::new().with_fields("pos", &["x"], |v| v[0] == "1");
    let cct = Cct::build(rule.formula(), pool.view("r").expect("ok"), &functions).expect("ok");
    let exists_node = cct.get(cct.root()).expect("ok").children()[0];
    (rule.formula().clone(), cct, exists_node)
}

#[test]
fn test_evaluate_affected() {
    let (formula, mut cct, exists_node) = chain();
    assert!(cct.root_truth());

    // Flip the atom by hand, then let the affected set catch up.
    let atom = cct.get(exists_node).expect("ok").children()[0];
    cct.node_mut(atom).truth = true;
    cct.mark_affected(exists_node);

    assert_eq!(cct.affected().len(), 2);
    assert_eq!(cct.evaluate_affected(&formula), 2);
    assert!(!cct.root_truth());
}

#[test]
fn test_propagate_stops_early() {
    let (formula, mut cct, exists_node) = chain();

    // Nothing changed under the seed: only the seed is evaluated.
    assert_eq!(cct.propagate(&formula, vec![exists_node]), 1);
    assert!(cct.root_truth());

    let atom = cct.get(exists_node).expect("ok").children()[0];
    cct.node_mut(atom).truth = true;
    assert_eq!(cct.propagate(&formula, vec![exists_node]), 2);
    assert!(!cct.root_truth());
}
