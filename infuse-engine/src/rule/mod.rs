//! A `Rule` is a named formula over pattern-bound variables, along
//! with everything the checkers keep about it between rounds: its CCT
//! (once built), its last substantial set, and its link history.
//!
//! The static side (formula, S-conditions, RCRE sets) is computed by
//! `Rule::new` and never changes afterwards.
mod analysis;
mod formula;

pub use analysis::derive_rcre_sets;
pub use analysis::derive_s_conditions;
pub use analysis::sensitivities;
pub use analysis::Polarity;
pub use analysis::SCondition;
pub use analysis::Sensitivity;
pub use formula::Formula;
pub use formula::FormulaBuilder;
pub use formula::FormulaId;
pub use formula::FormulaKind;
pub use formula::FormulaNode;

use crate::bfunc::BehaviorFunctions;
use crate::cct::{BranchMode, Cct, EditReport, Edits, NodeId};
use crate::context::{ContextChange, PatternHandler, RuleView};
use crate::link::{typed_links, Link, LinkSet};
use crate::Error;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::trace;

/// One entry of a rule's link history.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinkRecord {
    pub truth: bool,
    pub links: BTreeSet<Link>,
}

#[derive(Clone, Debug)]
pub struct Rule {
    id: String,
    formula: Formula,
    var_pattern_map: BTreeMap<String, String>,
    patterns: BTreeSet<String>,
    s_conditions: Vec<SCondition>,
    sensitivity: BTreeMap<String, Sensitivity>,
    rcre_sets: BTreeMap<String, Vec<FormulaId>>,

    cct: Option<Cct>,
    substantial: BTreeSet<NodeId>,
    critical_set: BTreeSet<Link>,
    history: Vec<LinkRecord>,
}

impl Rule {
    /// Creates a rule named `id` whose formula is rooted at `root` in
    /// `builder`.  Variables used by atoms but not bound by any
    /// enclosing quantifier are bound existentially, outermost first in
    /// name order, to the pattern `var_pattern_map` assigns them.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the formula is malformed, if a free variable is
    /// missing from `var_pattern_map`, or if a variable is bound twice
    /// on the same path.
    pub fn new<I, K, V>(
        id: &str,
        mut builder: FormulaBuilder,
        root: FormulaId,
        var_pattern_map: I,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let var_pattern_map: BTreeMap<String, String> = var_pattern_map
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut scope = Scope::new(id);
        scope.scan(&builder, root)?;

        let mut root = root;
        for var in scope.free.iter().rev() {
            if scope.quantified.contains(var) {
                return Err(Error::ShadowedVariable {
                    rule: id.into(),
                    var: var.clone(),
                });
            }

            let pattern = var_pattern_map
                .get(var)
                .ok_or_else(|| Error::UnboundVariable {
                    rule: id.into(),
                    var: var.clone(),
                })?;
            root = builder.exists(var, pattern, root);
        }

        let formula = builder.finish(root)?;
        let s_conditions = derive_s_conditions(&formula);
        let sensitivity = sensitivities(&s_conditions);
        let rcre_sets = derive_rcre_sets(&formula);
        let patterns = rcre_sets.keys().cloned().collect();

        Ok(Self {
            id: id.into(),
            formula,
            var_pattern_map,
            patterns,
            s_conditions,
            sensitivity,
            rcre_sets,
            cct: None,
            substantial: BTreeSet::new(),
            critical_set: BTreeSet::new(),
            history: Vec::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    #[must_use]
    pub fn var_pattern_map(&self) -> &BTreeMap<String, String> {
        &self.var_pattern_map
    }

    /// Every pattern some quantifier of the rule ranges over.
    #[must_use]
    pub fn related_patterns(&self) -> &BTreeSet<String> {
        &self.patterns
    }

    #[must_use]
    pub fn s_conditions(&self) -> &[SCondition] {
        &self.s_conditions
    }

    #[must_use]
    pub fn rcre_sets(&self) -> &BTreeMap<String, Vec<FormulaId>> {
        &self.rcre_sets
    }

    /// How changes to `pattern` may move the rule's truth.
    #[must_use]
    pub fn sensitivity(&self, pattern: &str) -> Sensitivity {
        self.sensitivity.get(pattern).copied().unwrap_or_default()
    }

    /// Checks the rule against the registered patterns and the
    /// available behavior functions.
    ///
    /// # Errors
    ///
    /// Returns `Err` for quantifiers over unregistered patterns and
    /// atoms naming functions `functions` does not provide.
    pub fn validate(
        &self,
        patterns: &PatternHandler,
        functions: &dyn BehaviorFunctions,
    ) -> Result<(), Error> {
        if let Some(pattern) = self.patterns.iter().find(|p| !patterns.contains(p)) {
            return Err(Error::UnregisteredPattern {
                rule: self.id.clone(),
                pattern: pattern.clone(),
            });
        }

        for id in self.formula.ids() {
            if let FormulaKind::Atom { function, .. } = self.formula.kind(id) {
                if !functions.provides(function) {
                    return Err(Error::UnresolvedFunction {
                        rule: self.id.clone(),
                        function: function.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn is_cct_already(&self) -> bool {
        self.cct.is_some()
    }

    #[must_use]
    pub fn cct(&self) -> Option<&Cct> {
        self.cct.as_ref()
    }

    /// The root's truth, if the CCT is built.
    #[must_use]
    pub fn root_truth(&self) -> Option<bool> {
        self.cct.as_ref().map(Cct::root_truth)
    }

    /// (Re)builds the CCT from scratch over `view`, and returns its
    /// size.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a behavior function fails; the rule is then
    /// left without a CCT.
    pub fn build_cct(
        &mut self,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
    ) -> Result<usize, Error> {
        self.cct = None;
        let cct = Cct::build(&self.formula, view, functions)?;
        let size = cct.len();

        trace!(rule = %self.id, size, "built CCT");
        self.cct = Some(cct);
        Ok(size)
    }

    /// Drops the CCT, e.g., after a failed round left it out of sync
    /// with the view.  The next round rebuilds it.
    pub fn discard_cct(&mut self) {
        self.cct = None;
        self.substantial.clear();
    }

    /// Marks the instances of the quantifiers over `change`'s pattern
    /// (and their ancestors) as affected.
    pub fn update_affected_with_one_change(&mut self, change: &ContextChange) {
        self.mark_pattern(&change.pattern_id);
    }

    /// Same as `update_affected_with_one_change`, for every pattern with
    /// pending deltas in `view`.
    pub fn update_affected_with_changes(&mut self, view: &RuleView) {
        let patterns: Vec<String> = view.pending_deltas().map(|(p, _)| p.clone()).collect();
        for pattern in patterns {
            self.mark_pattern(&pattern);
        }
    }

    fn mark_pattern(&mut self, pattern: &str) {
        let cct = match self.cct.as_mut() {
            Some(cct) => cct,
            None => return,
        };

        for fid in self.rcre_sets.get(pattern).into_iter().flatten() {
            let instances: Vec<NodeId> = cct.instances(*fid).collect();
            for id in instances {
                cct.mark_affected(id);
            }
        }
    }

    /// Ends a round for this rule.  Safe to call on every exit path.
    pub fn clean_affected(&mut self) {
        if let Some(cct) = self.cct.as_mut() {
            cct.clean_affected();
        }
    }

    /// Patches the CCT for `edits`; `view` must reflect them already.
    ///
    /// # Errors
    ///
    /// Returns `Err(UnknownRule)` if the CCT is not built, or the
    /// behavior function error that interrupted the edits.
    pub fn modify_cct(
        &mut self,
        edits: &Edits,
        view: &RuleView,
        functions: &dyn BehaviorFunctions,
        mode: BranchMode,
    ) -> Result<EditReport, Error> {
        let cct = self
            .cct
            .as_mut()
            .ok_or_else(|| Error::UnknownRule(self.id.clone()))?;
        cct.apply_edits(&self.formula, &self.rcre_sets, edits, view, functions, mode)
    }

    /// Re-derives truth over the affected nodes, deepest first.
    pub fn truth_evaluation(&mut self) -> usize {
        match self.cct.as_mut() {
            Some(cct) => cct.evaluate_affected(&self.formula),
            None => 0,
        }
    }

    /// Propagates truth upward from the edit points in `report`,
    /// stopping wherever truth holds steady.
    pub fn propagate_truth(&mut self, report: &EditReport) -> usize {
        match self.cct.as_mut() {
            Some(cct) => cct.propagate(&self.formula, report.edit_points.keys().copied()),
            None => 0,
        }
    }

    /// Recomputes the substantial set.
    pub fn taint_scct(&mut self) -> BTreeSet<NodeId> {
        match self.cct.as_mut() {
            Some(cct) => cct.taint(&self.formula),
            None => BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn substantial_nodes(&self) -> &BTreeSet<NodeId> {
        &self.substantial
    }

    pub fn set_substantial_nodes(&mut self, nodes: BTreeSet<NodeId>) {
        self.substantial = nodes;
    }

    /// Generates the root's links from the CCT.  Returns `None` when
    /// the root's truth and links are the same as in the last recorded
    /// entry.
    pub fn links_generation(
        &mut self,
        previous: &BTreeSet<NodeId>,
        current: &BTreeSet<NodeId>,
        minimize: bool,
    ) -> Option<BTreeSet<Link>> {
        let cct = self.cct.as_mut()?;
        let truth = cct.root_truth();
        let links = cct.generate_links(&self.formula, previous, current, minimize);
        self.fresh_links(truth, &links)
    }

    /// Same as `links_generation`, for a link set computed elsewhere.
    #[must_use]
    pub fn fresh_links(&self, truth: bool, links: &LinkSet) -> Option<BTreeSet<Link>> {
        let typed = typed_links(truth, links);
        match self.history.last() {
            Some(last) if last.truth == truth && last.links == typed => None,
            _ => Some(typed),
        }
    }

    /// Appends a round's result to the history and the accumulated
    /// critical set.
    pub fn add_critical_set(&mut self, truth: bool, links: BTreeSet<Link>) {
        self.critical_set.extend(links.iter().cloned());
        self.history.push(LinkRecord { truth, links });
    }

    /// Every link ever recorded for the rule.
    #[must_use]
    pub fn critical_set(&self) -> &BTreeSet<Link> {
        &self.critical_set
    }

    #[must_use]
    pub fn history(&self) -> &[LinkRecord] {
        &self.history
    }
}

/// Walks a formula under construction, tracking bound variables.
struct Scope<'a> {
    rule: &'a str,
    bound: Vec<String>,
    free: BTreeSet<String>,
    quantified: BTreeSet<String>,
}

impl<'a> Scope<'a> {
    fn new(rule: &'a str) -> Self {
        Self {
            rule,
            bound: Vec::new(),
            free: BTreeSet::new(),
            quantified: BTreeSet::new(),
        }
    }

    fn scan(&mut self, builder: &FormulaBuilder, id: FormulaId) -> Result<(), Error> {
        let kind = builder
            .kind(id)
            .ok_or(Error::MalformedFormula("node out of range"))?;

        if let Some((var, _, body)) = kind.quantifier() {
            if self.bound.iter().any(|b| b == var) {
                return Err(Error::ShadowedVariable {
                    rule: self.rule.into(),
                    var: var.into(),
                });
            }

            self.quantified.insert(var.into());
            self.bound.push(var.into());
            let result = self.scan_child(builder, id, body);
            self.bound.pop();
            return result;
        }

        if let FormulaKind::Atom { params, .. } = kind {
            for param in params {
                if !self.bound.contains(param) {
                    self.free.insert(param.clone());
                }
            }
            return Ok(());
        }

        for child in kind.children() {
            self.scan_child(builder, id, child)?;
        }
        Ok(())
    }

    fn scan_child(
        &mut self,
        builder: &FormulaBuilder,
        parent: FormulaId,
        child: FormulaId,
    ) -> Result<(), Error> {
        if child >= parent {
            return Err(Error::MalformedFormula("child defined after its parent"));
        }
        self.scan(builder, child)
    }
}

/// Owns every `Rule` of a run, keyed on rule id.
#[derive(Clone, Debug, Default)]
pub struct RuleHandler {
    rules: BTreeMap<String, Rule>,
}

impl RuleHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `Err` when a rule with the same id already exists.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), Error> {
        if self.rules.contains_key(&rule.id) {
            return Err(Error::DuplicateRule(rule.id));
        }

        self.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Rule> {
        self.rules.get_mut(id)
    }

    /// Rules in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Ids of the rules that reference `pattern`, in id order.
    #[must_use]
    pub fn rules_for(&self, pattern: &str) -> Vec<String> {
        self.rules
            .values()
            .filter(|r| r.patterns.contains(pattern))
            .map(|r| r.id.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[test]
fn test_free_variables_are_existential() {
    let mut f = FormulaBuilder::new();
    let pa = f.atom("a_pos", &["a"]);
    let pb = f.atom("b_small", &["b"]);
    let both = f.and(pa, pb);
    let rule = Rule::new("R1", f, both, [("a", "A"), ("b", "B")]).expect("ok");

    let formula = rule.formula();
    match formula.kind(formula.root()) {
        FormulaKind::Exists { var, pattern, body } => {
            assert_eq!((var.as_str(), pattern.as_str()), ("a", "A"));
            assert_eq!(formula.kind(*body).quantifier(), Some(("b", "B", both)));
        }
        other => panic!("unexpected root {}", other),
    }

    let patterns: Vec<&str> = rule.related_patterns().iter().map(String::as_str).collect();
    assert_eq!(patterns, ["A", "B"]);
    assert!(rule.sensitivity("A").may_satisfy(crate::context::ChangeType::Addition));
    assert!(!rule.sensitivity("A").may_violate(crate::context::ChangeType::Addition));
}

#[test]
fn test_variable_errors() {
    let mut f = FormulaBuilder::new();
    let pa = f.atom("p", &["a", "b"]);
    let root = f.forall("b", "B", pa);
    assert_eq!(
        Rule::new::<_, &str, &str>("r", f, root, []).err(),
        Some(Error::UnboundVariable {
            rule: "r".into(),
            var: "a".into()
        })
    );

    let mut f = FormulaBuilder::new();
    let pa = f.atom("p", &["a"]);
    let inner = f.exists("a", "A", pa);
    let root = f.forall("a", "A", inner);
    assert!(matches!(
        Rule::new::<_, &str, &str>("r", f, root, []),
        Err(Error::ShadowedVariable { .. })
    ));

    // `a` is free on the left, and bound on the right.
    let mut f = FormulaBuilder::new();
    let lhs = f.atom("p", &["a"]);
    let pa = f.atom("p", &["a"]);
    let rhs = f.forall("a", "A", pa);
    let root = f.or(lhs, rhs);
    assert!(matches!(
        Rule::new("r", f, root, [("a", "A")]),
        Err(Error::ShadowedVariable { .. })
    ));
}

#[test]
fn test_validate() {
    use crate::bfunc::FunctionTable;
    use crate::context::Pattern;

    let mut f = FormulaBuilder::new();
    let pa = f.atom("p", &["a"]);
    let root = f.forall("a", "A", pa);
    let rule = Rule::new::<_, &str, &str>("r", f, root, []).expect("ok");

    let mut patterns = PatternHandler::new();
    let functions = FunctionTable::new().with("p", |_| Ok(true));
    assert!(matches!(
        rule.validate(&patterns, &functions),
        Err(Error::UnregisteredPattern { .. })
    ));

    patterns
        .add_pattern(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    assert_eq!(rule.validate(&patterns, &functions), Ok(()));
    assert!(matches!(
        rule.validate(&patterns, &FunctionTable::new()),
        Err(Error::UnresolvedFunction { .. })
    ));
}

#[test]
fn test_duplicate_rule() {
    let rule = |id: &str| {
        let mut f = FormulaBuilder::new();
        let pa = f.atom("p", &["a"]);
        let root = f.forall("a", "A", pa);
        Rule::new::<_, &str, &str>(id, f, root, []).expect("ok")
    };

    let mut handler = RuleHandler::new();
    handler.add_rule(rule("r1")).expect("ok");
    handler.add_rule(rule("r2")).expect("ok");
    assert_eq!(
        handler.add_rule(rule("r1")),
        Err(Error::DuplicateRule("r1".into()))
    );
    assert_eq!(handler.rules_for("A"), ["r1", "r2"]);
    assert!(handler.rules_for("B").is_empty());
}
