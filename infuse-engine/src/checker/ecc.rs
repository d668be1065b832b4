//! ECC: every round rebuilds the rule's CCT from its view.  Simple,
//! and the fallback the incremental techniques use for a rule's first
//! round.
use super::{Evaluator, Outcome, Round, Technique};
use crate::Error;

#[derive(Clone, Copy, Debug, Default)]
pub struct Ecc;

impl Evaluator for Ecc {
    fn technique(&self) -> Technique {
        Technique::Ecc
    }

    fn evaluate(&mut self, round: Round<'_>) -> Result<Outcome, Error> {
        round.rule.build_cct(round.view, round.functions)?;
        Ok(Outcome::Cct)
    }
}
