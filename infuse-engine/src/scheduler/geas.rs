//! The GEAS family: batch per rule, and flush before a change that may
//! satisfy the rule could mask a buffered change that may violate it.
use super::{holds_violation, Batches, Scheduler, Strategy};
use crate::checker::Checker;
use crate::context::ContextChange;
use crate::Error;
use tracing::{trace, warn};

/// Batch size limit for the narrowed triggers.
pub const OPT_CAP: usize = 32;

/// Which buffered changes a may-satisfy change is checked against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Trigger {
    /// Every buffered change.
    Ori,
    /// Buffered changes on the same pattern.
    SamePattern,
    /// Buffered changes on the same context.
    SameContext,
}

impl Trigger {
    fn relevant(self, incoming: &ContextChange, buffered: &ContextChange) -> bool {
        match self {
            Trigger::Ori => true,
            Trigger::SamePattern => buffered.pattern_id == incoming.pattern_id,
            Trigger::SameContext => {
                buffered.pattern_id == incoming.pattern_id
                    && buffered.context.id() == incoming.context.id()
            }
        }
    }

    fn cap(self) -> Option<usize> {
        match self {
            Trigger::Ori => None,
            Trigger::SamePattern | Trigger::SameContext => Some(OPT_CAP),
        }
    }
}

pub struct Geas {
    checker: Box<dyn Checker>,
    trigger: Trigger,
    batches: Batches,
}

impl Geas {
    #[must_use]
    pub fn new(checker: Box<dyn Checker>, trigger: Trigger) -> Self {
        Self {
            checker,
            trigger,
            batches: Batches::default(),
        }
    }

    fn schedule_for(&mut self, rule: &str, change: &ContextChange) -> Result<(), Error> {
        let trigger = self.trigger;
        let satisfies = self
            .checker
            .sensitivity(rule, &change.pattern_id)
            .may_satisfy(change.change_type);

        let mut result = Ok(());
        if satisfies
            && holds_violation(
                self.checker.as_ref(),
                rule,
                self.batches.get(rule),
                |buffered| trigger.relevant(change, buffered),
            )
        {
            trace!(%rule, %change, "violation pending, flushing");
            result = self.batches.flush(rule, self.checker.as_mut());
        }

        let len = self.batches.push(rule, change.clone());
        if trigger.cap().map_or(false, |cap| len >= cap) {
            trace!(%rule, len, "batch full, flushing");
            let flushed = self.batches.flush(rule, self.checker.as_mut());
            result = result.and(flushed);
        }

        result
    }
}

impl Scheduler for Geas {
    fn strategy(&self) -> Strategy {
        match self.trigger {
            Trigger::Ori => Strategy::GeasOri,
            Trigger::SamePattern => Strategy::GeasOptS,
            Trigger::SameContext => Strategy::GeasOptC,
        }
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
        self.batches.flush_all(self.checker.as_mut())
    }

    fn checker(&self) -> &dyn Checker {
        self.checker.as_ref()
    }

    fn checker_mut(&mut self) -> &mut dyn Checker {
        self.checker.as_mut()
    }
}
