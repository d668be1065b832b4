//! INFUSE_C: PCC's incremental edits, plus two cost decisions.
//!
//! When a round's net changes outnumber the contexts left in the
//! rule's view, patching costs more than starting over, so the CCT is
//! rebuilt instead.  When a patched round provably left the root's
//! links alone (every edit point kept its truth, and no branch that
//! came or went agreed with its quantifier), link generation is
//! skipped altogether.
//!
//! The cost of every round is kept for the INFUSE_S scheduler, which
//! sizes its batches from it.
use super::{Evaluator, Outcome, Round, RoundCost, Technique};
use crate::cct::BranchMode;
use crate::Error;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Clone, Debug, Default)]
pub struct InfuseC {
    costs: BTreeMap<String, RoundCost>,
}

impl Evaluator for InfuseC {
    fn technique(&self) -> Technique {
        Technique::InfuseC
    }

    fn evaluate(&mut self, mut round: Round<'_>) -> Result<Outcome, Error> {
        let changes = round.edits.len();
        let rule = round.rule.id().to_owned();

        if !round.rule.is_cct_already() || changes > round.view.len() {
            let size = round.rule.build_cct(round.view, round.functions)?;
            trace!(%rule, changes, size, "rebuilt");
            self.costs.insert(
                rule,
                RoundCost {
                    changes,
                    nodes_touched: size,
                    rebuilt: true,
                },
            );
            return Ok(Outcome::Cct);
        }

        round.update_affected();
        let report =
            round
                .rule
                .modify_cct(round.edits, round.view, round.functions, BranchMode::Attached)?;
        round.rule.truth_evaluation();

        let (deferred, touched) = match round.rule.cct() {
            Some(cct) => (
                !round.rule.history().is_empty() && report.keeps_links(cct),
                cct.touched(),
            ),
            None => (false, 0),
        };

        trace!(%rule, changes, touched, deferred, "patched");
        self.costs.insert(
            rule,
            RoundCost {
                changes,
                nodes_touched: touched,
                rebuilt: false,
            },
        );

        Ok(if deferred {
            Outcome::Unchanged
        } else {
            Outcome::Cct
        })
    }

    fn last_cost(&self, rule: &str) -> Option<RoundCost> {
        self.costs.get(rule).copied()
    }
}
