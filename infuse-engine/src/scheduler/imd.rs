use super::{Scheduler, Strategy};
use crate::checker::Checker;
use crate::context::ContextChange;
use crate::Error;

/// Immediate scheduling: one round per change, in arrival order.
pub struct Imd {
    checker: Box<dyn Checker>,
}

impl Imd {
    #[must_use]
    pub fn new(checker: Box<dyn Checker>) -> Self {
        Self { checker }
    }
}

impl Scheduler for Imd {
    fn strategy(&self) -> Strategy {
        Strategy::Imd
    }

    fn do_schedule(&mut self, change: ContextChange) -> Result<(), Error> {
        self.checker.ctx_change_check_imd(&change)
    }

    fn check_ends(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn checker(&self) -> &dyn Checker {
        self.checker.as_ref()
    }

    fn checker_mut(&mut self) -> &mut dyn Checker {
        self.checker.as_mut()
    }
}
