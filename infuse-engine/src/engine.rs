//! The facade a driver holds on to: one approach, one scheduler, and
//! the checker behind it.
use crate::approach::Approach;
use crate::bfunc::BehaviorFunctions;
use crate::checker::{make_checker, Checker, CheckerCore};
use crate::context::{Context, ContextChange, ContextPool, Pattern};
use crate::link::Link;
use crate::rule::{LinkRecord, RuleHandler};
use crate::scheduler::{make_scheduler, Scheduler};
use crate::Error;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::info;

pub struct Engine {
    approach: Approach,
    scheduler: Box<dyn Scheduler>,
}

impl Engine {
    /// Registers `patterns`, validates `rules` against them and
    /// `functions`, and wires the checker and scheduler `approach`
    /// names.
    ///
    /// # Errors
    ///
    /// Returns the first setup error.
    pub fn new<I>(
        approach: Approach,
        patterns: I,
        rules: RuleHandler,
        functions: Box<dyn BehaviorFunctions>,
        mg: bool,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Pattern>,
    {
        let mut pool = ContextPool::new();
        for pattern in patterns {
            pool.init_pattern_sets(pattern)?;
        }

        info!(%approach, rules = rules.len(), mg, "engine ready");
        let core = CheckerCore::new(rules, pool, functions, mg)?;
        let checker = make_checker(approach.technique, core);
        Ok(Self {
            approach,
            scheduler: make_scheduler(approach.strategy, checker),
        })
    }

    #[must_use]
    pub fn approach(&self) -> Approach {
        self.approach
    }

    #[must_use]
    pub fn checker(&self) -> &dyn Checker {
        self.scheduler.checker()
    }

    pub fn checker_mut(&mut self) -> &mut dyn Checker {
        self.scheduler.checker_mut()
    }

    /// Adds `context` to `pattern` before the stream starts.  Call
    /// `check_init` once seeding is done.
    ///
    /// # Errors
    ///
    /// See `ContextPool::seed`.
    pub fn seed(&mut self, pattern: &str, context: Context) -> Result<(), Error> {
        self.scheduler
            .checker_mut()
            .core_mut()
            .pool_mut()
            .seed(pattern, context)
    }

    /// # Errors
    ///
    /// See `Checker::check_init`.
    pub fn check_init(&mut self) -> Result<(), Error> {
        self.scheduler.checker_mut().check_init()
    }

    /// Hands one change to the scheduler.
    ///
    /// # Errors
    ///
    /// Returns the first error of the rounds this change triggered.
    pub fn submit(&mut self, change: ContextChange) -> Result<(), Error> {
        self.scheduler.do_schedule(change)
    }

    /// Flushes whatever the scheduler still buffers.
    ///
    /// # Errors
    ///
    /// See `Scheduler::check_ends`.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.scheduler.check_ends()
    }

    /// Runs the behavior functions' end-of-stream hook.
    pub fn end(&mut self) {
        self.scheduler.checker_mut().end();
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.checker().rules().ids()
    }

    /// Each rule's latest result: the last history entry, or the
    /// current truth without links for rules never checked.
    ///
    /// # Errors
    ///
    /// Returns `Err` when a behavior function fails while evaluating
    /// an unchecked rule.
    pub fn results(&self) -> Result<BTreeMap<String, LinkRecord>, Error> {
        let mut ret = BTreeMap::new();
        for rule in self.checker().rules().iter() {
            let record = match rule.history().last() {
                Some(last) => last.clone(),
                None => LinkRecord {
                    truth: self.checker().rule_truth(rule.id())?,
                    links: BTreeSet::new(),
                },
            };
            ret.insert(rule.id().to_owned(), record);
        }

        Ok(ret)
    }

    #[must_use]
    pub fn history(&self, rule: &str) -> Option<&[LinkRecord]> {
        self.checker().rules().get(rule).map(|r| r.history())
    }

    #[must_use]
    pub fn critical_set(&self, rule: &str) -> Option<&BTreeSet<Link>> {
        self.checker().rules().get(rule).map(|r| r.critical_set())
    }

    /// # Errors
    ///
    /// See `CheckerCore::rule_truth`.
    pub fn rule_truth(&self, rule: &str) -> Result<bool, Error> {
        self.checker().rule_truth(rule)
    }

    /// Renders `rule`'s CCT, if built.  With minimization on, a
    /// violated rule only shows its substantial nodes.
    #[must_use]
    pub fn dump_cct(&self, rule: &str) -> Option<String> {
        let rule = self.checker().rules().get(rule)?;
        let cct = rule.cct()?;
        let substantial_only = self.checker().is_mg() && !cct.root_truth();
        Some(cct.show(rule.formula(), substantial_only))
    }
}

#[test]
fn test_engine_rejects_unknown_pattern() {
    use crate::bfunc::FunctionTable;
    use crate::rule::{FormulaBuilder, Rule};

    let mut f = FormulaBuilder::new();
    let atom = f.atom("yes", &["a"]);
    let body = f.forall("a", "A", atom);
    let mut rules = RuleHandler::new();
    rules
        .add_rule(Rule::new::<_, &str, &str>("r", f, body, []).expect("ok"))
        .expect("ok");

    let functions = Box::new(FunctionTable::new().with("yes", |_| Ok(true)));
    let result = Engine::new(Approach::INFUSE, Vec::new(), rules, functions, false);
    assert!(matches!(result, Err(Error::UnregisteredPattern { .. })));
}
