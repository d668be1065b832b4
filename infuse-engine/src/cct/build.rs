//! From-scratch instantiation of a formula over a rule's view.
//! Subtrees are built bottom-up: a node's truth is known as soon as
//! its last child is attached.
use super::{Cct, NodeId, RuntimeNode};
use crate::bfunc::{self, BehaviorFunctions};
use crate::context::RuleView;
use crate::link::Binding;
use crate::rule::{Formula, FormulaId, FormulaKind};
use crate::Error;
use std::sync::Arc;

impl Cct {
    /// Builds the whole tree for `formula` over `view`.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a behavior function fails.
    pub fn build(
        formula: &Formula,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
    ) -> Result<Self, Error> {
        let mut ret = Self::empty();
        ret.root = ret.build_subtree(
            formula,
            view,
            functions,
            formula.root(),
            None,
            None,
            0,
            &mut Vec::new(),
        )?;
        Ok(ret)
    }

    /// Builds an instance of `fid` under `parent` (which the caller
    /// must attach it to), with `env` in scope.  On failure, nothing
    /// built by this call is left in the arena.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn build_subtree(
        &mut self,
        formula: &Formula,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
        fid: FormulaId,
        parent: Option<NodeId>,
        binding: Option<Binding>,
        depth: u32,
        env: &mut Vec<Binding>,
    ) -> Result<NodeId, Error> {
        let quantifier = formula.kind(fid).quantifier().is_some();
        let id = self.alloc(RuntimeNode::new(fid, parent, binding, depth), quantifier);

        match self.fill(formula, view, functions, id, env) {
            Ok(()) => Ok(id),
            Err(e) => {
                self.free_subtree(id);
                Err(e)
            }
        }
    }

    fn fill(
        &mut self,
        formula: &Formula,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
        id: NodeId,
        env: &mut Vec<Binding>,
    ) -> Result<(), Error> {
        let fid = self.node(id).formula;
        let depth = self.node(id).depth;

        match formula.kind(fid) {
            FormulaKind::Forall { var, pattern, body }
            | FormulaKind::Exists { var, pattern, body } => {
                let contexts: Vec<Arc<_>> = view.live(pattern).cloned().collect();
                for context in contexts {
                    let binding = Binding::new(var, context);
                    env.push(binding.clone());
                    let child = self.build_subtree(
                        formula,
                        view,
                        functions,
                        *body,
                        Some(id),
                        Some(binding),
                        depth + 1,
                        env,
                    );
                    env.pop();
                    self.node_mut(id).children.push(child?);
                }
            }
            FormulaKind::Atom { function, params } => {
                let truth = bfunc::invoke(functions, function, params, env)?;
                self.node_mut(id).truth = truth;
            }
            kind => {
                for child in kind.children() {
                    let child = self.build_subtree(
                        formula,
                        view,
                        functions,
                        child,
                        Some(id),
                        None,
                        depth + 1,
                        env,
                    )?;
                    self.node_mut(id).children.push(child);
                }
            }
        }

        let truth = self.eval_node(formula, id);
        self.node_mut(id).truth = truth;
        Ok(())
    }
}

#[cfg(test)]
fn functions() -> crate::bfunc::FunctionTable {
    crate::bfunc::FunctionTable::new()
        .with_fields("pos", &["x"], |v| v[0].parse::<i64>().map_or(false, |x| x > 0))
        .with("fail", |_| Err("boom".into()))
}

#[test]
fn test_build_counts_branches() {
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let root = f.forall("a", "A", pos);
    let rule = Rule::new::<_, &str, &str>("r", f, root, []).expect("ok");

    let mut pool = ContextPool::new();
    pool.init_pattern_sets(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    pool.init_rule(&rule);
    pool.seed("A", Context::new("c1", [("x", "1")]))
        .expect("ok");
    pool.seed("A", Context::new("c2", [("x", "-1")]))
        .expect("ok");

    let cct = Cct::build(rule.formula(), pool.view("r").expect("ok"), &functions())
        .expect("ok");
    assert_eq!(cct.len(), 3);
    assert!(!cct.root_truth());

    let root = cct.get(cct.root()).expect("ok");
    assert_eq!(root.children().len(), 2);
    let first = cct.get(root.children()[0]).expect("ok");
    assert_eq!(first.binding().map(|b| b.context.id()), Some("c1"));
    // The branch root is the atom itself.
    assert!(first.is_truth());
}

#[test]
fn test_build_failure_leaves_nothing() {
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    let mut f = FormulaBuilder::new();
    let bad = f.atom("fail", &["a"]);
    let root = f.exists("a", "A", bad);
    let rule = Rule::new::<_, &str, &str>("r", f, root, []).expect("ok");

    let mut pool = ContextPool::new();
    pool.init_pattern_sets(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    pool.init_rule(&rule);
    pool.seed("A", Context::new("c1", [("x", "1")]))
        .expect("ok");

    let mut cct = Cct::empty();
    let result = cct.build_subtree(
        rule.formula(),
        pool.view("r").expect("ok"),
        &functions(),
        rule.formula().root(),
        None,
        None,
        0,
        &mut Vec::new(),
    );
    assert!(matches!(result, Err(Error::Function { .. })));
    assert!(cct.is_empty());
    assert_eq!(cct.instances(rule.formula().root()).count(), 0);
}
