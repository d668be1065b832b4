mod common;

use common::{ctx, engine, histories, run};
use infuse_engine::{
    Approach, Context, ContextChange, Engine, Error, FormulaBuilder, FunctionTable, LinkType,
    Pattern, Rule, RuleHandler, Strategy as Scheduling, Technique,
};

fn all_approaches() -> Vec<Approach> {
    let mut ret = Vec::new();
    for technique in Technique::ALL.iter() {
        for strategy in Scheduling::ALL.iter() {
            ret.push(Approach::new(*technique, *strategy));
        }
    }
    ret
}

/// `a_pos(a) and b_small(b)`, with `a` and `b` free.
fn r1(approach: Approach) -> Engine {
    let mut f = FormulaBuilder::new();
    let pa = f.atom("a_pos", &["a"]);
    let pb = f.atom("b_small", &["b"]);
    let both = f.and(pa, pb);
    let mut rules = RuleHandler::new();
    rules
        .add_rule(Rule::new("R1", f, both, [("a", "A"), ("b", "B")]).expect("ok"))
        .expect("ok");

    let functions = FunctionTable::new()
        .with_fields("a_pos", &["x"], |v| v[0].parse::<i64>().map_or(false, |x| x > 0))
        .with_fields("b_small", &["y"], |v| v[0].parse::<i64>().map_or(false, |y| y < 5));
    let patterns = vec![Pattern::new("A", ["x"]), Pattern::new("B", ["y"])];

    Engine::new(approach, patterns, rules, Box::new(functions), true).expect("ok")
}

#[test]
fn test_r1_scenario() {
    for approach in all_approaches() {
        let mut engine = r1(approach);
        engine.check_init().expect("ok");
        engine
            .submit(ContextChange::addition("A", Context::new("ctx1", [("x", "1")])))
            .expect("ok");
        engine
            .submit(ContextChange::addition("B", Context::new("ctx2", [("y", "3")])))
            .expect("ok");
        engine
            .submit(ContextChange::addition("A", Context::new("ctx3", [("x", "-1")])))
            .expect("ok");
        engine.finish().expect("ok");

        let results = engine.results().expect("ok");
        let record = &results["R1"];
        assert!(record.truth, "{}", approach);
        assert_eq!(record.links.len(), 1, "{}", approach);

        let link = record.links.iter().next().expect("one link");
        assert_eq!(link.kind(), LinkType::Satisfied);
        assert_eq!(link.context_of("a").map(|c| c.id()), Some("ctx1"));
        assert_eq!(link.context_of("b").map(|c| c.id()), Some("ctx2"));
        assert_eq!(
            link.to_string(),
            "SATISFIED,{(a,ctx1),(b,ctx2)}",
            "{}",
            approach
        );
    }
}

#[test]
fn test_add_delete_cancels() {
    let base = [
        ContextChange::addition("A", ctx("a1", 1)),
        ContextChange::addition("B", ctx("b1", 3)),
    ];
    let mut noisy = base.to_vec();
    noisy.push(ContextChange::addition("A", ctx("a2", -1)));
    noisy.push(ContextChange::deletion("A", ctx("a2", -1)));

    for approach in all_approaches() {
        let quiet = run(approach, false, &base);
        let noisy = run(approach, false, &noisy);
        assert_eq!(
            quiet.results().expect("ok"),
            noisy.results().expect("ok"),
            "{}",
            approach
        );
        for rule in quiet.rule_ids() {
            assert_eq!(
                quiet.checker().core().pool().view(rule),
                noisy.checker().core().pool().view(rule)
            );
        }
    }
}

#[test]
fn test_empty_batch_is_noop() {
    let changes = [
        ContextChange::addition("A", ctx("a1", 1)),
        ContextChange::addition("A", ctx("a2", 2)),
        ContextChange::addition("B", ctx("b1", 0)),
    ];

    for technique in Technique::ALL.iter() {
        let mut engine = run(Approach::new(*technique, Scheduling::GeasOri), true, &changes);
        let before = histories(&engine);
        let substantial = engine
            .checker()
            .substantial_nodes("nested")
            .cloned()
            .expect("minimizing");

        engine
            .checker_mut()
            .ctx_change_check_batch("nested", &[])
            .expect("ok");
        assert_eq!(histories(&engine), before);
        assert_eq!(
            engine.checker().substantial_nodes("nested"),
            Some(&substantial)
        );
    }
}

#[test]
fn test_bad_change_is_isolated() {
    for approach in all_approaches() {
        let mut engine = engine(approach, false);
        engine.check_init().expect("ok");
        engine
            .submit(ContextChange::addition("A", ctx("a1", 1)))
            .expect("ok");

        let missing = engine.submit(ContextChange::deletion("A", ctx("a9", 1)));
        let duplicate = engine.submit(ContextChange::addition("A", ctx("a1", 1)));
        let unknown = engine.submit(ContextChange::addition("C", ctx("c1", 1)));
        engine.finish().ok();

        // Batching schedulers only report once the batch is flushed.
        if approach.strategy == Scheduling::Imd {
            assert!(
                matches!(missing, Err(Error::MissingContext { .. })),
                "{}",
                approach
            );
            assert!(
                matches!(duplicate, Err(Error::DuplicateContext { .. })),
                "{}",
                approach
            );
        }
        assert!(matches!(unknown, Err(Error::UnknownPattern { .. })));

        engine
            .submit(ContextChange::addition("B", ctx("b1", 5)))
            .expect("ok");
        engine.finish().expect("ok");

        let results = engine.results().expect("ok");
        assert!(results["all_pos"].truth, "{}", approach);
        assert!(results["nested"].truth, "{}", approach);
        assert!(!results["same"].truth, "{}", approach);
    }
}

#[test]
fn test_update_changes_truth() {
    for approach in all_approaches() {
        let changes = [
            ContextChange::addition("A", ctx("a1", 1)),
            ContextChange::addition("A", ctx("a2", 2)),
            ContextChange::update("A", ctx("a2", -2)),
        ];
        let engine = run(approach, true, &changes);
        let results = engine.results().expect("ok");

        let all_pos = &results["all_pos"];
        assert!(!all_pos.truth, "{}", approach);
        let rendered: Vec<String> = all_pos.links.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["VIOLATED,{(a,a2)}".to_owned()], "{}", approach);
    }
}
