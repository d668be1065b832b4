//! Schedulers decide how changes are grouped into evaluation rounds.
//!
//! IMD hands every change to the checker as soon as it arrives.  The
//! batching schedulers (the GEAS family and INFUSE_S) keep one pending
//! batch per rule and flush it when a trigger fires, or at the end of
//! the stream.  Batching never changes where a rule ends up, only how
//! many rounds it takes to get there: within a batch, changes are
//! applied in arrival order.
mod geas;
mod imd;
mod infuse;

pub use geas::Geas;
pub use geas::Trigger;
pub use imd::Imd;
pub use infuse::InfuseS;

use crate::checker::Checker;
use crate::context::ContextChange;
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Strategy {
    Imd,
    GeasOri,
    GeasOptS,
    GeasOptC,
    InfuseS,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Imd,
        Strategy::GeasOri,
        Strategy::GeasOptS,
        Strategy::GeasOptC,
        Strategy::InfuseS,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Imd => "IMD",
            Strategy::GeasOri => "GEAS_ori",
            Strategy::GeasOptS => "GEAS_opt_s",
            Strategy::GeasOptC => "GEAS_opt_c",
            Strategy::InfuseS => "INFUSE_S",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Error> {
        Strategy::ALL
            .iter()
            .copied()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::UnknownApproach(name.into()))
    }
}

pub trait Scheduler {
    fn strategy(&self) -> Strategy;

    /// Takes one change from the stream.
    ///
    /// # Errors
    ///
    /// Returns the first error of the rounds this change triggered;
    /// rules that did not fail are unaffected.
    fn do_schedule(&mut self, change: ContextChange) -> Result<(), Error>;

    /// Flushes every pending batch.  Calling it again without new
    /// changes is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error; every batch is flushed regardless.
    fn check_ends(&mut self) -> Result<(), Error>;

    fn checker(&self) -> &dyn Checker;

    fn checker_mut(&mut self) -> &mut dyn Checker;
}

/// Pending per-rule batches.
#[derive(Clone, Debug, Default)]
pub struct Batches {
    pending: BTreeMap<String, Vec<ContextChange>>,
}

impl Batches {
    #[must_use]
    pub fn get(&self, rule: &str) -> &[ContextChange] {
        self.pending.get(rule).map_or(&[], Vec::as_slice)
    }

    pub fn push(&mut self, rule: &str, change: ContextChange) -> usize {
        let batch = self.pending.entry(rule.to_owned()).or_default();
        batch.push(change);
        batch.len()
    }

    /// Hands `rule`'s batch, if any, to `checker` for one round.
    ///
    /// # Errors
    ///
    /// Returns the checker's error.
    pub fn flush(&mut self, rule: &str, checker: &mut dyn Checker) -> Result<(), Error> {
        match self.pending.remove(rule) {
            Some(batch) if !batch.is_empty() => checker.ctx_change_check_batch(rule, &batch),
            _ => Ok(()),
        }
    }

    /// Flushes every batch in rule id order.
    ///
    /// # Errors
    ///
    /// Returns the first error.
    pub fn flush_all(&mut self, checker: &mut dyn Checker) -> Result<(), Error> {
        let mut failure = None;
        let rules: Vec<String> = self.pending.keys().cloned().collect();
        for rule in rules {
            if let Err(e) = self.flush(&rule, checker) {
                warn!(%rule, error = %e, "flush failed");
                failure.get_or_insert(e);
            }
        }

        failure.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }
}

/// Returns true if some change in `batch` that `relevant` selects may
/// violate `rule`.
fn holds_violation<F>(checker: &dyn Checker, rule: &str, batch: &[ContextChange], relevant: F) -> bool
where
    F: Fn(&ContextChange) -> bool,
{
    batch.iter().filter(|c| relevant(c)).any(|c| {
        checker
            .sensitivity(rule, &c.pattern_id)
            .may_violate(c.change_type)
    })
}

/// Wraps `checker` in the scheduler for `strategy`.
#[must_use]
pub fn make_scheduler(strategy: Strategy, checker: Box<dyn Checker>) -> Box<dyn Scheduler> {
    match strategy {
        Strategy::Imd => Box::new(Imd::new(checker)),
        Strategy::GeasOri => Box::new(Geas::new(checker, Trigger::Ori)),
        Strategy::GeasOptS => Box::new(Geas::new(checker, Trigger::SamePattern)),
        Strategy::GeasOptC => Box::new(Geas::new(checker, Trigger::SameContext)),
        Strategy::InfuseS => Box::new(InfuseS::new(checker)),
    }
}

#[test]
fn test_strategy_names() {
    for strategy in Strategy::ALL.iter() {
        assert_eq!(strategy.name().parse::<Strategy>(), Ok(*strategy));
    }

    assert!("GEAS".parse::<Strategy>().is_err());
}
