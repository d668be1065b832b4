//! Link sets and substantial nodes.
//!
//! A child contributes to its parent when its truth is one of the
//! reasons for the parent's: the false children of a false AND, both
//! children of a true AND, the branches of a quantifier that agree
//! with it, etc.  The substantial nodes are the nodes reachable from
//! the root through contributing children, and a node's link set is
//! built from its contributing children's only.
use super::{Cct, NodeId};
use crate::link::{bind, cartesian, LinkSet};
use crate::rule::{Formula, FormulaKind};
use std::cmp::Reverse;
use std::collections::BTreeSet;

impl Cct {
    fn contributing(&self, formula: &Formula, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let truth = |child: NodeId| self.node(child).truth;
        let agreeing = |want: bool| -> Vec<NodeId> {
            node.children
                .iter()
                .copied()
                .filter(|c| truth(*c) == want)
                .collect()
        };

        match formula.kind(node.formula) {
            FormulaKind::Forall { .. } | FormulaKind::Exists { .. } => agreeing(node.truth),
            FormulaKind::And(..) if !node.truth => agreeing(false),
            FormulaKind::Or(..) if node.truth => agreeing(true),
            FormulaKind::Implies(..) if node.truth => {
                let (lhs, rhs) = (node.children[0], node.children[1]);
                let mut ret = Vec::new();
                if !truth(lhs) {
                    ret.push(lhs);
                }
                if truth(rhs) {
                    ret.push(rhs);
                }
                ret
            }
            FormulaKind::Atom { .. } => Vec::new(),
            _ => node.children.clone(),
        }
    }

    /// True for the nodes whose links are the product of their
    /// children's, rather than the union.
    fn is_product(&self, formula: &Formula, id: NodeId) -> bool {
        let node = self.node(id);
        match formula.kind(node.formula) {
            FormulaKind::And(..) => node.truth,
            FormulaKind::Or(..) | FormulaKind::Implies(..) => !node.truth,
            _ => false,
        }
    }

    /// Computes `id`'s link set from its contributing children's
    /// cached sets.
    fn combine(&self, formula: &Formula, id: NodeId) -> LinkSet {
        let children = self.contributing(formula, id);
        let cached = |child: NodeId| {
            self.node(child)
                .links
                .as_ref()
                .expect("contributing children have links")
        };

        if formula.kind(self.node(id).formula).quantifier().is_some() {
            let mut ret = LinkSet::new();
            for child in children {
                let binding = self
                    .node(child)
                    .binding
                    .as_ref()
                    .expect("branches are bound");
                ret.extend(bind(binding, cached(child)));
            }
            return ret;
        }

        if self.is_product(formula, id) {
            return children
                .into_iter()
                .fold(LinkSet::new(), |acc, child| cartesian(&acc, cached(child)));
        }

        let mut ret = LinkSet::new();
        for child in children {
            ret.extend(cached(child).iter().cloned());
        }
        ret
    }

    /// Recomputes the substantial flags from the root, and returns the
    /// substantial set.
    pub fn taint(&mut self, formula: &Formula) -> BTreeSet<NodeId> {
        for node in self.nodes.iter_mut().flatten() {
            node.substantial = false;
        }

        let mut ret = BTreeSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            ret.insert(id);
            stack.extend(self.contributing(formula, id));
        }

        for id in &ret {
            self.node_mut(*id).substantial = true;
        }

        ret
    }

    /// Returns the root's link set, filling stale caches first.
    ///
    /// With minimization, `previous` and `current` are the substantial
    /// sets before and after the round: caches of nodes that are no
    /// longer substantial are dropped, and only the caches the root
    /// actually depends on are refreshed.  Without minimization, every
    /// stale cache in the tree is refreshed, bottom-up.
    pub fn generate_links(
        &mut self,
        formula: &Formula,
        previous: &BTreeSet<NodeId>,
        current: &BTreeSet<NodeId>,
        minimize: bool,
    ) -> LinkSet {
        if minimize {
            for id in previous.difference(current) {
                if let Some(Some(node)) = self.nodes.get_mut(id.index()) {
                    node.links = None;
                }
            }

            self.ensure_links(formula, self.root);
        } else {
            let mut stale: Vec<(u32, NodeId)> = self
                .iter()
                .filter(|(_, node)| node.links.is_none())
                .map(|(id, node)| (node.depth, id))
                .collect();
            stale.sort_by_key(|(depth, id)| (Reverse(*depth), *id));

            for (_, id) in stale {
                let links = self.combine(formula, id);
                self.node_mut(id).links = Some(links);
            }
        }

        self.node(self.root).links.clone().unwrap_or_default()
    }

    fn ensure_links(&mut self, formula: &Formula, id: NodeId) {
        if self.node(id).links.is_some() {
            return;
        }

        for child in self.contributing(formula, id) {
            self.ensure_links(formula, child);
        }

        let links = self.combine(formula, id);
        self.node_mut(id).links = Some(links);
    }
}

#[cfg(test)]
fn and_or_fixture(values: &[(&str, &str, &str)]) -> (Formula, Cct) {
    use crate::bfunc::FunctionTable;
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    // exists a in A: exists b in B: pos(a) and pos(b)
    let mut f = FormulaBuilder::new();
    let pa = f.atom("pos", &["a"]);
    let pb = f.atom("pos", &["b"]);
    let both = f.and(pa, pb);
    let rule = Rule::new::<_, _, _>("r", f, both, [("a", "A"), ("b", "B")]).expect("ok");

    let mut pool = ContextPool::new();
    for p in ["A", "B"].iter() {
        pool.init_pattern_sets(Pattern::new::<_, &str>(p, []))
            .expect("ok");
    }
    pool.init_rule(&rule);
    for (pattern, id, x) in values {
        pool.seed(pattern, Context::new(id, [("x", *x)])).expect("ok");
    }

    let functions =
        FunctionTable::new().with_fields("pos", &["x"], |v| v[0].parse::<i64>().map_or(false, |x| x > 0));
    let cct = Cct::build(rule.formula(), pool.view("r").expect("ok"), &functions).expect("ok");
    (rule.formula().clone(), cct)
}

#[cfg(test)]
fn rendered(links: &LinkSet) -> Vec<String> {
    links
        .iter()
        .map(|assignment| {
            assignment
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("")
        })
        .collect()
}

#[test]
fn test_satisfied_links() {
    let (formula, mut cct) = and_or_fixture(&[("A", "c1", "1"), ("A", "c3", "-1"), ("B", "c2", "3")]);
    assert!(cct.root_truth());

    let links = cct.generate_links(&formula, &BTreeSet::new(), &BTreeSet::new(), false);
    // The false `a = c3` branch does not witness satisfaction.
    assert_eq!(rendered(&links), ["(a,c1)(b,c2)"]);
}

#[test]
fn test_violated_links() {
    let (formula, mut cct) = and_or_fixture(&[("A", "c1", "-1"), ("B", "c2", "3"), ("B", "c4", "-4")]);
    assert!(!cct.root_truth());

    let current = cct.taint(&formula);
    let links = cct.generate_links(&formula, &BTreeSet::new(), &current, true);
    assert_eq!(rendered(&links), ["(a,c1)(b,c2)", "(a,c1)(b,c4)"]);
    assert!(current.contains(&cct.root()));
    assert!(cct.get(cct.root()).expect("ok").is_substantial());
}

#[test]
fn test_minimized_links_agree() {
    let (formula, mut eager) = and_or_fixture(&[("A", "c1", "1"), ("A", "c3", "-1"), ("B", "c2", "3")]);
    let mut lazy = eager.clone();

    let expected = eager.generate_links(&formula, &BTreeSet::new(), &BTreeSet::new(), false);
    let current = lazy.taint(&formula);
    assert_eq!(lazy.generate_links(&formula, &BTreeSet::new(), &current, true), expected);

    // Only the substantial nodes were filled in.
    let filled = lazy.iter().filter(|(_, n)| n.links().is_some()).count();
    assert_eq!(filled, current.len());
    assert!(filled < eager.len());
}
