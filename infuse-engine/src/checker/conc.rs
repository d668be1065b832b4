//! ConC: same edits as PCC, but new branches are built and evaluated
//! as standalone units before they are grafted, and truth then flows
//! up from the edit points, stopping as soon as a node's truth holds.
use super::{Ecc, Evaluator, Outcome, Round, Technique};
use crate::cct::BranchMode;
use crate::Error;

#[derive(Clone, Copy, Debug, Default)]
pub struct ConC;

impl Evaluator for ConC {
    fn technique(&self) -> Technique {
        Technique::ConC
    }

    fn evaluate(&mut self, mut round: Round<'_>) -> Result<Outcome, Error> {
        if !round.rule.is_cct_already() {
            return Ecc.evaluate(round);
        }

        // Affected ancestors still lose their cached links, even when
        // propagation stops below them.
        round.update_affected();
        let report =
            round
                .rule
                .modify_cct(round.edits, round.view, round.functions, BranchMode::Detached)?;
        round.rule.propagate_truth(&report);
        Ok(Outcome::Cct)
    }
}
