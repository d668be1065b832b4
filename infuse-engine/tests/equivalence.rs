//! Every technique, with or without minimization, under every
//! scheduler, must end up where a from-scratch evaluation does; under
//! the same round boundaries, techniques must also agree on every
//! intermediate record.
mod common;

use common::{expected, histories, run, steps, stream};
use infuse_engine::{Approach, Strategy as Scheduling, Technique};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn techniques_agree_round_by_round(steps in steps()) {
        let changes = stream(&steps);

        // These strategies cut rounds the same way for every technique.
        let strategies = [
            Scheduling::Imd,
            Scheduling::GeasOri,
            Scheduling::GeasOptS,
            Scheduling::GeasOptC,
        ];
        for strategy in strategies.iter() {
            let baseline = histories(&run(Approach::new(Technique::Ecc, *strategy), false, &changes));
            for technique in Technique::ALL.iter() {
                for mg in [false, true].iter() {
                    let engine = run(Approach::new(*technique, *strategy), *mg, &changes);
                    prop_assert_eq!(&histories(&engine), &baseline, "{} mg={}", engine.approach(), mg);
                }
            }
        }
    }

    #[test]
    fn every_approach_converges(steps in steps()) {
        let changes = stream(&steps);

        for technique in Technique::ALL.iter() {
            for strategy in Scheduling::ALL.iter() {
                for mg in [false, true].iter() {
                    let engine = run(Approach::new(*technique, *strategy), *mg, &changes);
                    prop_assert_eq!(
                        engine.results().expect("ok"),
                        expected(&engine),
                        "{} mg={}",
                        engine.approach(),
                        mg
                    );
                }
            }
        }
    }

    #[test]
    fn infuse_s_results_agree(steps in steps()) {
        let changes = stream(&steps);

        // Batch caps follow each technique's own costs, so only the
        // final records are comparable.
        let baseline = run(Approach::new(Technique::Ecc, Scheduling::InfuseS), false, &changes)
            .results()
            .expect("ok");
        for technique in Technique::ALL.iter() {
            for mg in [false, true].iter() {
                let engine = run(Approach::new(*technique, Scheduling::InfuseS), *mg, &changes);
                prop_assert_eq!(
                    engine.results().expect("ok"),
                    baseline.clone(),
                    "{} mg={}",
                    engine.approach(),
                    mg
                );
            }
        }
    }

    #[test]
    fn check_ends_is_idempotent(steps in steps()) {
        let changes = stream(&steps);

        let batching = [
            Scheduling::GeasOri,
            Scheduling::GeasOptS,
            Scheduling::GeasOptC,
            Scheduling::InfuseS,
        ];
        for strategy in batching.iter() {
            for technique in Technique::ALL.iter() {
                let mut engine = run(Approach::new(*technique, *strategy), true, &changes);
                let before = histories(&engine);
                let results = engine.results().expect("ok");
                engine.finish().expect("ok");
                prop_assert_eq!(histories(&engine), before, "{}", engine.approach());
                prop_assert_eq!(engine.results().expect("ok"), results, "{}", engine.approach());
            }
        }
    }
}
