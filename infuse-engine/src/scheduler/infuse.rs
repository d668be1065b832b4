//! INFUSE_S: GEAS_ori's trigger, plus a per-rule batch cap that follows
//! the checker's reported per-change cost.
use super::{holds_violation, Batches, Scheduler, Strategy};
use crate::checker::{Checker, RoundCost};
use crate::context::ContextChange;
use crate::Error;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const INITIAL_CAP: usize = 8;
pub const MAX_CAP: usize = 64;

#[derive(Clone, Copy, Debug)]
struct Window {
    cap: usize,
    last: Option<RoundCost>,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            cap: INITIAL_CAP,
            last: None,
        }
    }
}

impl Window {
    fn observe(&mut self, cost: RoundCost) {
        if cost.changes == 0 {
            return;
        }

        if let Some(last) = self.last {
            // Compares nodes/changes without dividing.
            let now = cost.nodes_touched * last.changes;
            let before = last.nodes_touched * cost.changes;
            if now < before {
                self.cap = (self.cap * 2).min(MAX_CAP);
            } else if now > before {
                self.cap = (self.cap / 2).max(1);
            }
        }

        self.last = Some(cost);
    }
}

pub struct InfuseS {
    checker: Box<dyn Checker>,
    batches: Batches,
    windows: BTreeMap<String, Window>,
}

impl InfuseS {
    #[must_use]
    pub fn new(checker: Box<dyn Checker>) -> Self {
        Self {
            checker,
            batches: Batches::default(),
            windows: BTreeMap::new(),
        }
    }

    /// The current batch cap for `rule`.
    #[must_use]
    pub fn cap(&self, rule: &str) -> usize {
        self.windows.get(rule).map_or(INITIAL_CAP, |w| w.cap)
    }

    fn flush(&mut self, rule: &str) -> Result<(), Error> {
        // No round, no new cost to learn from.
        if self.batches.get(rule).is_empty() {
            return Ok(());
        }

        let result = self.batches.flush(rule, self.checker.as_mut());
        if let Some(cost) = self.checker.last_cost(rule) {
            let window = self.windows.entry(rule.to_owned()).or_default();
            let before = window.cap;
            window.observe(cost);
            if window.cap != before {
                debug!(%rule, from = before, to = window.cap, "batch cap moved");
            }
        }

        result
    }

    fn schedule_for(&mut self, rule: &str, change: &ContextChange) -> Result<(), Error> {
        let satisfies = self
            .checker
            .sensitivity(rule, &change.pattern_id)
            .may_satisfy(change.change_type);

        let mut result = Ok(());
        if satisfies
            && holds_violation(self.checker.as_ref(), rule, self.batches.get(rule), |_| true)
        {
            result = self.flush(rule);
        }

        let len = self.batches.push(rule, change.clone());
        if !self.checker.is_cct_already(rule) || len >= self.cap(rule) {
            result = result.and(self.flush(rule));
        }

        result
    }
}

impl Scheduler for InfuseS {
    fn strategy(&self) -> Strategy {
        Strategy::InfuseS
    }

    fn do_schedule(&mut self, change: ContextChange) -> Result<(), Error> {
        let mut failure = None;
        for rule in self.checker.rules_for(&change.pattern_id)? {
            if let Err(e) = self.schedule_for(&rule, &change) {
                warn!(%rule, %change, error = %e, "round failed");
                failure.get_or_insert(e);
            }
        }

        failure.map_or(Ok(()), Err)
    }

    fn check_ends(&mut self) -> Result<(), Error> {
        let mut failure = None;
        let pending: Vec<String> = self
            .checker
            .rules()
            .ids()
            .filter(|id| !self.batches.get(id).is_empty())
            .map(str::to_owned)
            .collect();

        for rule in pending {
            if let Err(e) = self.flush(&rule) {
                warn!(%rule, error = %e, "flush failed");
                failure.get_or_insert(e);
            }
        }

        failure.map_or(Ok(()), Err)
    }

    fn checker(&self) -> &dyn Checker {
        self.checker.as_ref()
    }

    fn checker_mut(&mut self) -> &mut dyn Checker {
        self.checker.as_mut()
    }
}

#[test]
fn test_window_adapts() {
    let cost = |changes, nodes_touched| RoundCost {
        changes,
        nodes_touched,
        rebuilt: false,
    };

    let mut window = Window::default();
    window.observe(cost(4, 40));
    assert_eq!(window.cap, INITIAL_CAP);

    window.observe(cost(8, 40));
    assert_eq!(window.cap, 2 * INITIAL_CAP);

    for _ in 0..10 {
        window.observe(cost(1, 1));
        window.observe(cost(2, 1));
    }
    assert_eq!(window.cap, MAX_CAP);

    window.observe(cost(1, 100));
    assert_eq!(window.cap, MAX_CAP / 2);

    window.observe(cost(0, 100));
    assert_eq!(window.cap, MAX_CAP / 2);

    for i in 1..=10 {
        window.observe(cost(1, 1000 * i));
    }
    assert_eq!(window.cap, 1);
}

#[test]
fn test_window_oscillates() {
    let cost = |changes, nodes_touched| RoundCost {
        changes,
        nodes_touched,
        rebuilt: false,
    };

    let mut window = Window::default();
    window.observe(cost(1, 100));
    for _ in 0..10 {
        window.observe(cost(1, 1000));
        assert_eq!(window.cap, INITIAL_CAP / 2);
        window.observe(cost(1, 100));
        assert_eq!(window.cap, INITIAL_CAP);
    }
}

#[cfg(test)]
fn seeded_checker() -> Box<dyn Checker> {
    use crate::bfunc::FunctionTable;
    use crate::checker::{make_checker, CheckerCore, Technique};
    use crate::context::{Context, ContextPool, Pattern};
    use crate::rule::{FormulaBuilder, Rule, RuleHandler};

    let mut f = FormulaBuilder::new();
    let atom = f.atom("yes", &["a"]);
    let body = f.forall("a", "A", atom);
    let mut rules = RuleHandler::new();
    rules
        .add_rule(Rule::new::<_, &str, &str>("r", f, body, []).expect("ok"))
        .expect("ok");

    let mut pool = ContextPool::new();
    pool.init_pattern_sets(Pattern::new::<_, &str>("A", []))
        .expect("ok");
    let functions = Box::new(FunctionTable::new().with("yes", |_| Ok(true)));
    let mut core = CheckerCore::new(rules, pool, functions, false).expect("ok");
    core.pool_mut()
        .seed("A", Context::new("c1", [("v", "1")]))
        .expect("ok");

    make_checker(Technique::InfuseC, core)
}

#[test]
fn test_empty_flush_learns_nothing() {
    use crate::context::Context;

    let mut checker = seeded_checker();
    checker.check_init().expect("ok");
    assert!(checker.last_cost("r").is_some());

    let mut scheduler = InfuseS::new(checker);
    scheduler.flush("r").expect("ok");
    assert!(scheduler.windows.get("r").is_none());

    scheduler
        .do_schedule(ContextChange::addition("A", Context::new("c2", [("v", "2")])))
        .expect("ok");
    assert_eq!(scheduler.batches.get("r").len(), 1);

    scheduler.check_ends().expect("ok");
    assert!(scheduler.batches.is_empty());
    let window = scheduler.windows.get("r").expect("observed");
    assert_eq!(window.last.map(|c| c.changes), Some(1));
    assert_eq!(window.cap, INITIAL_CAP);
}
