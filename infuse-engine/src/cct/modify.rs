//! Incremental edits.  A round's net changes are turned into branch
//! removals and additions at the instances of the quantifiers over
//! the changed patterns (the rule's RCRE sets); everything else a
//! change can reach is an ancestor of one of these edit points.
use super::{Cct, NodeId};
use crate::bfunc::BehaviorFunctions;
use crate::context::{ChangeType, Context, ContextChange, RuleView};
use crate::link::Binding;
use crate::rule::{Formula, FormulaId};
use crate::Error;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// The branch edits of one round: removals are applied before
/// additions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Edits {
    removals: Vec<(String, String)>,
    additions: Vec<(String, Arc<Context>)>,
    changes: usize,
}

impl Edits {
    /// The edits for one change already applied to the view.
    #[must_use]
    pub fn from_change(change: &ContextChange) -> Self {
        let pattern = &change.pattern_id;
        let context = &change.context;
        let mut ret = Self {
            changes: 1,
            ..Self::default()
        };

        if matches!(change.change_type, ChangeType::Deletion | ChangeType::Update) {
            ret.removals
                .push((pattern.clone(), context.id().to_owned()));
        }

        if matches!(change.change_type, ChangeType::Addition | ChangeType::Update) {
            ret.additions.push((pattern.clone(), context.clone()));
        }

        ret
    }

    /// The edits for the net delta sets accumulated in `view`.
    #[must_use]
    pub fn from_view(view: &RuleView) -> Self {
        let mut ret = Self::default();
        for (pattern, deltas) in view.pending_deltas() {
            ret.changes += deltas.len();
            for id in deltas.deleted().keys().chain(deltas.updated().keys()) {
                ret.removals.push((pattern.clone(), id.clone()));
            }

            for context in deltas.added().values() {
                ret.additions.push((pattern.clone(), context.clone()));
            }
            for (_, new) in deltas.updated().values() {
                ret.additions.push((pattern.clone(), new.clone()));
            }
        }

        ret
    }

    /// Number of net context changes behind these edits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.removals
            .iter()
            .map(|(p, _)| p.as_str())
            .chain(self.additions.iter().map(|(p, _)| p.as_str()))
    }
}

/// How new branches are grafted onto their quantifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BranchMode {
    /// Build the branch in place, under its quantifier.
    Attached,
    /// Build the branch as a standalone unit, then attach it.
    Detached,
}

/// What `Cct::apply_edits` did.
#[derive(Clone, Debug, Default)]
pub struct EditReport {
    /// Quantifier instances that gained or lost a branch, with their
    /// truth before the round.
    pub edit_points: BTreeMap<NodeId, bool>,
    /// `(quantifier, new branch)`
    pub added: Vec<(NodeId, NodeId)>,
    /// `(quantifier, truth of the removed branch)`
    pub removed: Vec<(NodeId, bool)>,
}

impl EditReport {
    /// Returns true if the edits provably left the root's link set
    /// alone: every edit point kept its truth, and every branch that
    /// came or went disagreed with its quantifier (so never
    /// contributed to its links).  Only meaningful after truth has been
    /// re-evaluated.
    #[must_use]
    pub fn keeps_links(&self, cct: &Cct) -> bool {
        let truth = |id: NodeId| cct.get(id).map(|n| n.truth);

        self.edit_points
            .iter()
            .all(|(q, before)| truth(*q).map_or(true, |now| now == *before))
            && self
                .added
                .iter()
                .all(|(q, branch)| truth(*q) != truth(*branch))
            && self
                .removed
                .iter()
                .all(|(q, branch)| truth(*q).map_or(true, |now| now != *branch))
    }
}

impl Cct {
    /// Applies `edits` to the instances of the quantifiers in `rcre`.
    /// New branches are built from `view`, which must already reflect
    /// the round's changes.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a behavior function fails while building a
    /// new branch.  The tree is then missing that branch, and must be
    /// rebuilt.
    pub fn apply_edits(
        &mut self,
        formula: &Formula,
        rcre: &BTreeMap<String, Vec<FormulaId>>,
        edits: &Edits,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
        mode: BranchMode,
    ) -> Result<EditReport, Error> {
        let mut report = EditReport::default();
        let quantifiers = |pattern: &str| rcre.get(pattern).into_iter().flatten().copied();

        for (pattern, context_id) in &edits.removals {
            for fid in quantifiers(pattern) {
                let instances: Vec<NodeId> = self.instances(fid).collect();
                for q in instances {
                    // Outer removals may have freed inner instances.
                    if !self.is_live(q) {
                        continue;
                    }

                    let before = self.node(q).truth;
                    if let Some(truth) = self.remove_branch(q, context_id) {
                        report.edit_points.entry(q).or_insert(before);
                        report.removed.push((q, truth));
                    }
                }
            }
        }

        // Instances created while adding a branch are built from the
        // final view; only pre-existing instances need new branches.
        let mut existing: HashMap<FormulaId, Vec<NodeId>> = HashMap::new();
        for (pattern, _) in &edits.additions {
            for fid in quantifiers(pattern) {
                existing
                    .entry(fid)
                    .or_insert_with(|| self.instances(fid).collect());
            }
        }

        for (pattern, context) in &edits.additions {
            for fid in quantifiers(pattern) {
                for q in existing.get(&fid).into_iter().flatten().copied() {
                    let before = self.node(q).truth;
                    let branch = self.add_branch(formula, view, functions, q, context, mode)?;
                    report.edit_points.entry(q).or_insert(before);
                    report.added.push((q, branch));
                }
            }
        }

        Ok(report)
    }

    /// Detaches and frees the branch of `q` bound to `context_id`, and
    /// returns its truth.
    fn remove_branch(&mut self, q: NodeId, context_id: &str) -> Option<bool> {
        let position = self.branch_position(q, context_id).ok()?;
        let branch = self.node_mut(q).children.remove(position);
        let truth = self.node(branch).truth;

        trace!(node = q.index(), context = context_id, "remove branch");
        self.free_subtree(branch);
        self.mark_affected(q);
        Some(truth)
    }

    fn add_branch(
        &mut self,
        formula: &Formula,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
        q: NodeId,
        context: &Arc<Context>,
        mode: BranchMode,
    ) -> Result<NodeId, Error> {
        let (var, _, body) = formula
            .kind(self.node(q).formula)
            .quantifier()
            .expect("edit points are quantifiers");
        let binding = Binding::new(var, context.clone());
        let mut env = self.env(q);
        env.push(binding.clone());

        let parent = match mode {
            BranchMode::Attached => Some(q),
            BranchMode::Detached => None,
        };
        let depth = self.node(q).depth + 1;
        let branch = self.build_subtree(
            formula,
            view,
            functions,
            body,
            parent,
            Some(binding),
            depth,
            &mut env,
        )?;

        trace!(node = q.index(), context = context.id(), ?mode, "add branch");
        self.attach(q, branch);
        Ok(branch)
    }

    /// Grafts `branch` under `q`, keeping branches in context id order.
    fn attach(&mut self, q: NodeId, branch: NodeId) {
        let context_id = self
            .node(branch)
            .binding
            .as_ref()
            .map(|b| b.context.id().to_owned())
            .unwrap_or_default();
        let position = match self.branch_position(q, &context_id) {
            Ok(position) | Err(position) => position,
        };

        self.node_mut(branch).parent = Some(q);
        self.node_mut(q).children.insert(position, branch);
        self.mark_affected(q);
    }

    fn branch_position(&self, q: NodeId, context_id: &str) -> Result<usize, usize> {
        self.node(q).children.binary_search_by(|child| {
            self.node(*child)
                .binding
                .as_ref()
                .map_or("", |b| b.context.id())
                .cmp(context_id)
        })
    }
}

#[cfg(test)]
fn nested_fixture() -> (
    crate::rule::Rule,
    crate::context::ContextPool,
    crate::bfunc::FunctionTable,
) {
    use crate::bfunc::FunctionTable;
    use crate::context::{ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule};

    // forall a in A: exists b in A: ge(b, a)
    let mut f = FormulaBuilder::new();
    let ge = f.atom("ge", &["b", "a"]);
    let inner = f.exists("b", "A", ge);
    let root = f.forall("a", "A", inner);
    let rule = Rule::new::<_, &str, &str>("r", f, root, []).expect("ok");

    let mut pool = ContextPool::new();
    pool.init_pattern_sets(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    pool.init_rule(&rule);

    let functions = FunctionTable::new().with_fields("ge", &["x", "x"], |v| v[0] >= v[1]);
    (rule, pool, functions)
}

#[test]
fn test_nested_edits_match_rebuild() {
    let (rule, mut pool, functions) = nested_fixture();
    pool.seed("A", Context::new("c1", [("x", "1")])).expect("ok");

    let mut cct = Cct::build(rule.formula(), pool.view("r").expect("ok"), &functions).expect("ok");
    assert_eq!(cct.len(), 3);

    let change = ContextChange::addition("A", Context::new("c2", [("x", "2")]));
    pool.apply_change("r", &change).expect("ok");
    let view = pool.view("r").expect("ok");
    let report = cct
        .apply_edits(
            rule.formula(),
            rule.rcre_sets(),
            &Edits::from_change(&change),
            view,
            &functions,
            BranchMode::Attached,
        )
        .expect("ok");
    cct.evaluate_affected(rule.formula());

    // One new outer branch (with two inner branches), and one new
    // inner branch under the pre-existing `a = c1` instance.
    assert_eq!(report.added.len(), 2);
    let rebuilt = Cct::build(rule.formula(), view, &functions).expect("ok");
    assert_eq!(cct.len(), rebuilt.len());
    assert_eq!(cct.root_truth(), rebuilt.root_truth());
    assert!(cct.root_truth());
}

#[test]
fn test_removal_then_addition() {
    let (rule, mut pool, functions) = nested_fixture();
    pool.seed("A", Context::new("c1", [("x", "1")])).expect("ok");
    pool.seed("A", Context::new("c2", [("x", "2")])).expect("ok");

    let mut cct = Cct::build(rule.formula(), pool.view("r").expect("ok"), &functions).expect("ok");
    assert_eq!(cct.len(), 7);

    // Lower c2 below c1: the `a = c2` branch stays true (b = c2), and
    // the root stays true.
    let change = ContextChange::update("A", Context::new("c2", [("x", "0")]));
    pool.apply_change("r", &change).expect("ok");
    let view = pool.view("r").expect("ok");
    let report = cct
        .apply_edits(
            rule.formula(),
            rule.rcre_sets(),
            &Edits::from_change(&change),
            view,
            &functions,
            BranchMode::Detached,
        )
        .expect("ok");
    cct.evaluate_affected(rule.formula());
    cct.clean_affected();

    assert_eq!(report.removed.len(), 2);
    assert_eq!(cct.len(), 7);
    assert!(cct.root_truth());

    let root = cct.get(cct.root()).expect("ok");
    let ids: Vec<&str> = root
        .children()
        .iter()
        .filter_map(|c| cct.get(*c).and_then(|n| n.binding()).map(|b| b.context.id()))
        .collect();
    assert_eq!(ids, ["c1", "c2"]);
}
