//! Shared fixtures: two patterns of integer-valued contexts, a handful
//! of rules exercising every formula kind, and a generator of valid
//! change streams.
#![allow(dead_code)]

use infuse_engine::{
    reference, typed_links, Approach, ChangeType, Context, ContextChange, Engine, FormulaBuilder,
    FunctionTable, LinkRecord, Pattern, Rule, RuleHandler,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

pub const PATTERNS: [&str; 2] = ["A", "B"];

fn value(v: &str) -> i64 {
    v.parse().unwrap_or_default()
}

pub fn functions() -> FunctionTable {
    FunctionTable::new()
        .with_fields("pos", &["v"], |v| value(v[0]) > 0)
        .with_fields("lt", &["v", "v"], |v| value(v[0]) < value(v[1]))
        .with_fields("eq", &["v", "v"], |v| value(v[0]) == value(v[1]))
}

pub fn patterns() -> Vec<Pattern> {
    PATTERNS.iter().map(|p| Pattern::new(p, ["v"])).collect()
}

/// Builds the rule set:
///
/// - `all_pos`: forall a in A: pos(a)
/// - `nested`: forall a in A: exists b in B: lt(a, b)
/// - `implies`: forall a in A: (pos(a) implies exists b in B: eq(a, b))
/// - `negated`: not (exists a in A: (pos(a) or exists b in B: lt(b, a)))
/// - `same`: forall x in A: exists y in A: lt(x, y)
/// - `free`: pos(a) and not pos(b), with a in A and b in B free
pub fn rules() -> RuleHandler {
    let mut rules = RuleHandler::new();
    let mut add = |rule: Rule| rules.add_rule(rule).expect("unique");

    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let root = f.forall("a", "A", pos);
    add(Rule::new::<_, &str, &str>("all_pos", f, root, []).expect("ok"));

    let mut f = FormulaBuilder::new();
    let lt = f.atom("lt", &["a", "b"]);
    let inner = f.exists("b", "B", lt);
    let root = f.forall("a", "A", inner);
    add(Rule::new::<_, &str, &str>("nested", f, root, []).expect("ok"));

    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let eq = f.atom("eq", &["a", "b"]);
    let witness = f.exists("b", "B", eq);
    let body = f.implies(pos, witness);
    let root = f.forall("a", "A", body);
    add(Rule::new::<_, &str, &str>("implies", f, root, []).expect("ok"));

    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let lt = f.atom("lt", &["b", "a"]);
    let smaller = f.exists("b", "B", lt);
    let either = f.or(pos, smaller);
    let some = f.exists("a", "A", either);
    let root = f.not(some);
    add(Rule::new::<_, &str, &str>("negated", f, root, []).expect("ok"));

    let mut f = FormulaBuilder::new();
    let lt = f.atom("lt", &["x", "y"]);
    let inner = f.exists("y", "A", lt);
    let root = f.forall("x", "A", inner);
    add(Rule::new::<_, &str, &str>("same", f, root, []).expect("ok"));

    let mut f = FormulaBuilder::new();
    let pa = f.atom("pos", &["a"]);
    let pb = f.atom("pos", &["b"]);
    let not_pb = f.not(pb);
    let root = f.and(pa, not_pb);
    add(Rule::new("free", f, root, [("a", "A"), ("b", "B")]).expect("ok"));

    rules
}

pub fn engine(approach: Approach, mg: bool) -> Engine {
    Engine::new(approach, patterns(), rules(), Box::new(functions()), mg).expect("valid setup")
}

pub fn ctx(id: &str, v: i64) -> Context {
    Context::new(id, [("v", v.to_string())])
}

/// One generated step: the pattern and id it touches, the value it
/// writes, and whether a live context is updated rather than deleted.
pub type Step = (usize, u8, i64, bool);

pub fn steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((0..PATTERNS.len(), 0u8..4, -2i64..4, any::<bool>()), 0..24)
}

/// Turns `steps` into a stream that only ever adds absent ids and
/// deletes or updates live ones.
pub fn stream(steps: &[Step]) -> Vec<ContextChange> {
    let mut live = BTreeSet::new();
    let mut ret = Vec::new();

    for (pattern, id, v, update) in steps {
        let pattern = PATTERNS[*pattern];
        let id = format!("{}{}", pattern.to_lowercase(), id);
        let change_type = if live.insert((pattern, id.clone())) {
            ChangeType::Addition
        } else if *update {
            ChangeType::Update
        } else {
            live.remove(&(pattern, id.clone()));
            ChangeType::Deletion
        };

        ret.push(ContextChange::new(change_type, pattern, ctx(&id, *v)));
    }

    ret
}

pub fn run(approach: Approach, mg: bool, changes: &[ContextChange]) -> Engine {
    let mut engine = engine(approach, mg);
    engine.check_init().expect("ok");
    for change in changes {
        engine.submit(change.clone()).expect("valid change");
    }
    engine.finish().expect("ok");
    engine
}

/// What every rule evaluates to from scratch over `engine`'s views.
pub fn expected(engine: &Engine) -> BTreeMap<String, LinkRecord> {
    let core = engine.checker().core();
    core.rules()
        .iter()
        .map(|rule| {
            let view = core.pool().view(rule.id()).expect("view");
            let (truth, links) =
                reference::evaluate(rule.formula(), view, &functions()).expect("ok");
            let record = LinkRecord {
                truth,
                links: typed_links(truth, &links),
            };
            (rule.id().to_owned(), record)
        })
        .collect()
}

pub fn histories(engine: &Engine) -> BTreeMap<String, Vec<LinkRecord>> {
    engine
        .rule_ids()
        .map(|id| (id.to_owned(), engine.history(id).expect("rule").to_vec()))
        .collect()
}
