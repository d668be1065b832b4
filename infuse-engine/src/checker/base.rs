//! BASE: the reference technique.  Truth and links come straight
//! from the formula and the view; the CCT is only rebuilt so that the
//! rule can still be inspected (root truth, dumps, substantial nodes).
use super::{Evaluator, Outcome, Round, Technique};
use crate::reference;
use crate::Error;

#[derive(Clone, Copy, Debug, Default)]
pub struct Base;

impl Evaluator for Base {
    fn technique(&self) -> Technique {
        Technique::Base
    }

    fn evaluate(&mut self, round: Round<'_>) -> Result<Outcome, Error> {
        let (truth, links) = reference::evaluate(round.rule.formula(), round.view, round.functions)?;
        round.rule.build_cct(round.view, round.functions)?;
        Ok(Outcome::Reference { truth, links })
    }
}
