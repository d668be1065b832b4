//! PCC: patches the CCT in place.  Each change adds or removes
//! branches at the instances of the quantifiers over its pattern, and
//! truth is re-derived over the affected nodes only.
use super::{Ecc, Evaluator, Outcome, Round, Technique};
use crate::cct::BranchMode;
use crate::Error;

#[derive(Clone, Copy, Debug, Default)]
pub struct Pcc;

impl Evaluator for Pcc {
    fn technique(&self) -> Technique {
        Technique::Pcc
    }

    fn evaluate(&mut self, mut round: Round<'_>) -> Result<Outcome, Error> {
        if !round.rule.is_cct_already() {
            return Ecc.evaluate(round);
        }

        round.update_affected();
        round
            .rule
            .modify_cct(round.edits, round.view, round.functions, BranchMode::Attached)?;
        round.rule.truth_evaluation();
        Ok(Outcome::Cct)
    }
}
