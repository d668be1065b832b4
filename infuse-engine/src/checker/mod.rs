//! Checkers run evaluation rounds.  A round applies one change (IMD)
//! or one rule's batch of changes to the pool, brings the rule's CCT
//! up to date, and records the root's `(truth, links)` when either
//! moved.
//!
//! Every technique shares the round protocol implemented by
//! `TechniqueChecker`; they only differ in how the CCT is brought up
//! to date (the `Evaluator`), and must all record the same history for
//! the same change sequence and round boundaries.
mod base;
mod conc;
mod ecc;
mod infuse;
mod pcc;

pub use base::Base;
pub use conc::ConC;
pub use ecc::Ecc;
pub use infuse::InfuseC;
pub use pcc::Pcc;

use crate::bfunc::BehaviorFunctions;
use crate::cct::{Edits, NodeId};
use crate::context::{ContextChange, ContextPool, RuleView};
use crate::link::LinkSet;
use crate::reference;
use crate::rule::{LinkRecord, Rule, RuleHandler, Sensitivity};
use crate::Error;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Technique {
    Ecc,
    Pcc,
    ConC,
    Base,
    InfuseC,
}

impl Technique {
    pub const ALL: [Technique; 5] = [
        Technique::Ecc,
        Technique::Pcc,
        Technique::ConC,
        Technique::Base,
        Technique::InfuseC,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Technique::Ecc => "ECC",
            Technique::Pcc => "PCC",
            Technique::ConC => "ConC",
            Technique::Base => "BASE",
            Technique::InfuseC => "INFUSE_C",
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Technique {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Error> {
        Technique::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::UnknownApproach(name.into()))
    }
}

/// The work an INFUSE round did, as reported to the INFUSE_S scheduler.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RoundCost {
    /// Net context changes in the round.
    pub changes: usize,
    /// CCT nodes created, freed or re-evaluated.
    pub nodes_touched: usize,
    pub rebuilt: bool,
}

/// Everything an `Evaluator` may look at or update in one round of one
/// rule.
pub struct Round<'a> {
    pub rule: &'a mut Rule,
    /// The rule's view, with the round's changes applied.
    pub view: &'a RuleView,
    pub functions: &'a dyn BehaviorFunctions,
    pub edits: &'a Edits,
    /// The change behind `edits`, for single-change rounds.
    pub change: Option<&'a ContextChange>,
}

impl Round<'_> {
    /// Marks the nodes the round's changes may affect.
    pub fn update_affected(&mut self) {
        match self.change {
            Some(change) => self.rule.update_affected_with_one_change(change),
            None => self.rule.update_affected_with_changes(self.view),
        }
    }
}

/// Where the round's root links come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Generate them from the (up to date) CCT.
    Cct,
    /// They were computed without the CCT.
    Reference { truth: bool, links: LinkSet },
    /// They provably did not change since the last round.
    Unchanged,
}

/// How a technique brings a rule's CCT up to date.
pub trait Evaluator {
    fn technique(&self) -> Technique;

    /// Updates `round.rule`'s CCT for the round's edits.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a behavior function fails.
    fn evaluate(&mut self, round: Round<'_>) -> Result<Outcome, Error>;

    fn last_cost(&self, _rule: &str) -> Option<RoundCost> {
        None
    }
}

/// The state every checker owns: rules, the pool of contexts, and the
/// behavior functions.
pub struct CheckerCore {
    rules: RuleHandler,
    pool: ContextPool,
    functions: Box<dyn BehaviorFunctions>,
    mg: bool,
}

impl CheckerCore {
    /// Validates `rules` against `pool`'s patterns and `functions`, and
    /// creates a pool view for each rule.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn new(
        rules: RuleHandler,
        mut pool: ContextPool,
        functions: Box<dyn BehaviorFunctions>,
        mg: bool,
    ) -> Result<Self, Error> {
        for rule in rules.iter() {
            rule.validate(pool.patterns(), functions.as_ref())?;
            pool.init_rule(rule);
        }

        Ok(Self {
            rules,
            pool,
            functions,
            mg,
        })
    }

    #[must_use]
    pub fn rules(&self) -> &RuleHandler {
        &self.rules
    }

    #[must_use]
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ContextPool {
        &mut self.pool
    }

    pub fn functions_mut(&mut self) -> &mut dyn BehaviorFunctions {
        self.functions.as_mut()
    }

    #[must_use]
    pub fn is_mg(&self) -> bool {
        self.mg
    }

    /// Ids of the rules that must see changes to `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `pattern` is not registered.
    pub fn rules_for(&self, pattern: &str) -> Result<Vec<String>, Error> {
        if !self.pool.patterns().contains(pattern) {
            return Err(Error::UnknownPattern {
                pattern: pattern.into(),
            });
        }

        Ok(self.rules.rules_for(pattern))
    }

    /// The current truth of `rule`: its CCT root's when built, else
    /// the formula's over the rule's view.
    ///
    /// # Errors
    ///
    /// Returns `Err` for unknown rules, or when a behavior function
    /// fails while evaluating an unbuilt rule.
    pub fn rule_truth(&self, rule: &str) -> Result<bool, Error> {
        let unknown = || Error::UnknownRule(rule.into());
        let found = self.rules.get(rule).ok_or_else(unknown)?;
        if let Some(truth) = found.root_truth() {
            return Ok(truth);
        }

        let view = self.pool.view(rule).ok_or_else(unknown)?;
        Ok(reference::evaluate(found.formula(), view, self.functions.as_ref())?.0)
    }
}

impl fmt::Debug for CheckerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerCore")
            .field("rules", &self.rules.ids().collect::<Vec<_>>())
            .field("mg", &self.mg)
            .finish()
    }
}

/// The checker interface schedulers drive.
pub trait Checker {
    fn technique(&self) -> Technique;

    fn core(&self) -> &CheckerCore;

    fn core_mut(&mut self) -> &mut CheckerCore;

    /// Builds and records every rule whose view already holds
    /// contexts (e.g., seeded before the stream starts).
    ///
    /// # Errors
    ///
    /// Returns the first error; the other rules are still initialised.
    fn check_init(&mut self) -> Result<(), Error>;

    /// Applies `change` and runs one round for every rule that
    /// references its pattern.
    ///
    /// # Errors
    ///
    /// Returns the first error; rules that did not fail are still
    /// checked.
    fn ctx_change_check_imd(&mut self, change: &ContextChange) -> Result<(), Error>;

    /// Applies `batch` to `rule` and runs a single round for it.  An
    /// empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error; failing changes are skipped, and the
    /// rest of the batch is still checked.
    fn ctx_change_check_batch(&mut self, rule: &str, batch: &[ContextChange])
        -> Result<(), Error>;

    /// The cost of `rule`'s last round, for techniques that track it.
    fn last_cost(&self, rule: &str) -> Option<RoundCost>;

    fn is_mg(&self) -> bool {
        self.core().is_mg()
    }

    fn rules(&self) -> &RuleHandler {
        self.core().rules()
    }

    /// # Errors
    ///
    /// Returns `Err` if `pattern` is not registered.
    fn rules_for(&self, pattern: &str) -> Result<Vec<String>, Error> {
        self.core().rules_for(pattern)
    }

    fn sensitivity(&self, rule: &str, pattern: &str) -> Sensitivity {
        self.rules()
            .get(rule)
            .map(|r| r.sensitivity(pattern))
            .unwrap_or_default()
    }

    fn is_cct_already(&self, rule: &str) -> bool {
        self.rules().get(rule).map_or(false, Rule::is_cct_already)
    }

    /// Every rule's link history.
    fn rule_links_map(&self) -> BTreeMap<&str, &[LinkRecord]> {
        self.rules().iter().map(|r| (r.id(), r.history())).collect()
    }

    /// `rule`'s last substantial set; only tracked with minimization.
    fn substantial_nodes(&self, rule: &str) -> Option<&BTreeSet<NodeId>> {
        if !self.is_mg() {
            return None;
        }

        self.rules().get(rule).map(Rule::substantial_nodes)
    }

    /// # Errors
    ///
    /// See `CheckerCore::rule_truth`.
    fn rule_truth(&self, rule: &str) -> Result<bool, Error> {
        self.core().rule_truth(rule)
    }

    /// Invokes the behavior functions' end-of-stream hook.
    fn end(&mut self) {
        self.core_mut().functions_mut().end();
    }
}

/// A `Checker` running the shared round protocol around an
/// `Evaluator`.
#[derive(Debug)]
pub struct TechniqueChecker<E> {
    core: CheckerCore,
    evaluator: E,
}

impl<E: Evaluator> TechniqueChecker<E> {
    pub fn new(core: CheckerCore, evaluator: E) -> Self {
        Self { core, evaluator }
    }

    fn round(
        &mut self,
        rule_id: &str,
        edits: &Edits,
        change: Option<&ContextChange>,
    ) -> Result<(), Error> {
        let technique = self.evaluator.technique();
        let mg = self.core.mg;
        let unknown = || Error::UnknownRule(rule_id.into());
        let rule = self.core.rules.get_mut(rule_id).ok_or_else(unknown)?;
        let view = self.core.pool.view(rule_id).ok_or_else(unknown)?;

        let result = self.evaluator.evaluate(Round {
            rule: &mut *rule,
            view,
            functions: self.core.functions.as_ref(),
            edits,
            change,
        });

        let result = result.map(|outcome| conclude(rule, outcome, mg, technique));
        rule.clean_affected();
        if let Err(e) = &result {
            warn!(rule = rule_id, %technique, error = %e, "round failed, dropping CCT");
            rule.discard_cct();
        }

        result
    }
}

/// Records the round's links, if they moved.
fn conclude(rule: &mut Rule, outcome: Outcome, minimize: bool, technique: Technique) {
    let previous = rule.substantial_nodes().clone();
    let current = if minimize {
        rule.taint_scct()
    } else {
        BTreeSet::new()
    };

    let truth = match &outcome {
        Outcome::Reference { truth, .. } => *truth,
        _ => rule.root_truth().unwrap_or_default(),
    };
    let fresh = match outcome {
        Outcome::Cct => rule.links_generation(&previous, &current, minimize),
        Outcome::Reference { links, .. } => rule.fresh_links(truth, &links),
        Outcome::Unchanged => None,
    };

    if minimize {
        rule.set_substantial_nodes(current);
    }

    debug!(
        rule = rule.id(),
        %technique,
        truth,
        links = ?fresh.as_ref().map(BTreeSet::len),
        "round"
    );
    if let Some(links) = fresh {
        rule.add_critical_set(truth, links);
    }
}

fn remember(failure: &mut Option<Error>, result: Result<(), Error>) {
    if let Err(e) = result {
        failure.get_or_insert(e);
    }
}

impl<E: Evaluator> Checker for TechniqueChecker<E> {
    fn technique(&self) -> Technique {
        self.evaluator.technique()
    }

    fn core(&self) -> &CheckerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut CheckerCore {
        &mut self.core
    }

    fn check_init(&mut self) -> Result<(), Error> {
        let seeded: Vec<String> = self
            .core
            .rules
            .ids()
            .filter(|id| self.core.pool.view(id).map_or(false, |v| !v.is_empty()))
            .map(str::to_owned)
            .collect();

        let mut failure = None;
        for rule in seeded {
            remember(&mut failure, self.round(&rule, &Edits::default(), None));
        }

        failure.map_or(Ok(()), Err)
    }

    fn ctx_change_check_imd(&mut self, change: &ContextChange) -> Result<(), Error> {
        let edits = Edits::from_change(change);
        let mut failure = None;

        for rule in self.core.rules_for(&change.pattern_id)? {
            let result = self
                .core
                .pool
                .apply_change(&rule, change)
                .and_then(|()| self.round(&rule, &edits, Some(change)));
            if let Err(e) = &result {
                warn!(%rule, %change, error = %e, "change rejected");
            }
            remember(&mut failure, result);
        }

        failure.map_or(Ok(()), Err)
    }

    fn ctx_change_check_batch(
        &mut self,
        rule: &str,
        batch: &[ContextChange],
    ) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        if self.core.rules.get(rule).is_none() {
            return Err(Error::UnknownRule(rule.into()));
        }

        // Deltas only ever hold the current round's changes.
        self.core.pool.clear_deltas(rule);

        let mut failure = None;
        for change in batch {
            let result = self.core.pool.apply_change_with_sets(rule, change);
            if let Err(e) = &result {
                warn!(%rule, %change, error = %e, "change skipped");
            }
            remember(&mut failure, result);
        }

        let edits = match self.core.pool.view(rule) {
            Some(view) => Edits::from_view(view),
            None => Edits::default(),
        };
        let result = self.round(rule, &edits, None);
        self.core.pool.clear_deltas(rule);
        remember(&mut failure, result);

        failure.map_or(Ok(()), Err)
    }

    fn last_cost(&self, rule: &str) -> Option<RoundCost> {
        self.evaluator.last_cost(rule)
    }
}

/// Creates the checker for `technique` around `core`.
#[must_use]
pub fn make_checker(technique: Technique, core: CheckerCore) -> Box<dyn Checker> {
    match technique {
        Technique::Ecc => Box::new(TechniqueChecker::new(core, Ecc)),
        Technique::Pcc => Box::new(TechniqueChecker::new(core, Pcc)),
        Technique::ConC => Box::new(TechniqueChecker::new(core, ConC)),
        Technique::Base => Box::new(TechniqueChecker::new(core, Base)),
        Technique::InfuseC => Box::new(TechniqueChecker::new(core, InfuseC::default())),
    }
}

#[test]
fn test_technique_names() {
    for technique in Technique::ALL.iter() {
        assert_eq!(technique.name().parse::<Technique>(), Ok(*technique));
    }

    assert!("GEAS".parse::<Technique>().is_err());
}
