//! What a run writes: per-rule result records (test mode), the
//! accumulated links (run mode), and CCT dumps.
use infuse_engine::{Engine, Error, Link, LinkRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ResultRecord {
    pub truth: bool,
    pub links: Vec<Vec<BindingRecord>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BindingRecord {
    pub var: String,
    pub value: ContextValue,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ContextValue {
    pub ctx_id: String,
    pub fields: BTreeMap<String, String>,
}

impl From<&LinkRecord> for ResultRecord {
    fn from(record: &LinkRecord) -> Self {
        Self {
            truth: record.truth,
            links: record.links.iter().map(bindings).collect(),
        }
    }
}

fn bindings(link: &Link) -> Vec<BindingRecord> {
    link.assignment()
        .iter()
        .map(|binding| BindingRecord {
            var: binding.var.clone(),
            value: ContextValue {
                ctx_id: binding.context.id().into(),
                fields: binding.context.fields().clone(),
            },
        })
        .collect()
}

/// Each rule's latest result, keyed on rule id.
///
/// # Errors
///
/// See `Engine::results`.
pub fn results(engine: &Engine) -> Result<BTreeMap<String, ResultRecord>, Error> {
    Ok(engine
        .results()?
        .iter()
        .map(|(rule, record)| (rule.clone(), ResultRecord::from(record)))
        .collect())
}

/// Writes the results as one pretty-printed JSON object.
///
/// # Errors
///
/// Returns `Err` if evaluating an unchecked rule or writing fails.
pub fn write_results<W: Write>(engine: &Engine, mut out: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut out, &results(engine)?)?;
    writeln!(out)?;
    Ok(())
}

/// Writes every link each rule ever reported, one per line as
/// `rule(KIND,{(var,ctx),...})`, violations first.
///
/// # Errors
///
/// Returns `Err` if writing fails.
pub fn write_links<W: Write>(engine: &Engine, mut out: W) -> io::Result<()> {
    for rule in engine.rule_ids() {
        // Links order on their kind first, so violations come out first.
        for link in engine.critical_set(rule).into_iter().flatten() {
            writeln!(out, "{}({})", rule, link)?;
        }
    }

    Ok(())
}

/// Writes each built rule's CCT under a `rule:` header.
///
/// # Errors
///
/// Returns `Err` if writing fails.
pub fn write_cct<W: Write>(engine: &Engine, mut out: W) -> io::Result<()> {
    for rule in engine.rule_ids() {
        if let Some(dump) = engine.dump_cct(rule) {
            writeln!(out, "{}:", rule)?;
            out.write_all(dump.as_bytes())?;
        }
    }

    Ok(())
}

#[cfg(test)]
fn scenario() -> Engine {
    use crate::config::{RuleSet, R1};
    use infuse_engine::{Approach, Context, ContextChange};

    let mut engine = RuleSet::parse(R1)
        .expect("ok")
        .engine(Approach::INFUSE, true)
        .expect("ok");
    engine.check_init().expect("ok");
    for change in [
        ContextChange::addition("A", Context::new("ctx1", [("x", "1")])),
        ContextChange::addition("B", Context::new("ctx2", [("y", "3")])),
        ContextChange::addition("A", Context::new("ctx3", [("x", "-1")])),
    ] {
        engine.submit(change).expect("ok");
    }
    engine.finish().expect("ok");
    engine
}

#[test]
fn test_results_json() {
    let engine = scenario();
    let json = serde_json::to_value(results(&engine).expect("ok")).expect("ok");

    assert_eq!(
        json["R1"],
        serde_json::json!({
            "truth": true,
            "links": [[
                { "var": "a", "value": { "ctx_id": "ctx1", "fields": { "x": "1" } } },
                { "var": "b", "value": { "ctx_id": "ctx2", "fields": { "y": "3" } } }
            ]]
        })
    );
    assert_eq!(json["all_a"]["truth"], serde_json::json!(false));
}

#[test]
fn test_links_text() {
    let engine = scenario();
    let mut out = Vec::new();
    write_links(&engine, &mut out).expect("ok");

    assert_eq!(
        String::from_utf8(out).expect("ok"),
        "R1(VIOLATED,{(a,ctx1)})\n\
         R1(SATISFIED,{(a,ctx1),(b,ctx2)})\n\
         all_a(VIOLATED,{(a,ctx3)})\n\
         all_a(SATISFIED,{(a,ctx1)})\n"
    );
}

#[test]
fn test_cct_dump() {
    let engine = scenario();
    let mut out = Vec::new();
    write_cct(&engine, &mut out).expect("ok");
    let text = String::from_utf8(out).expect("ok");

    assert!(text.starts_with("R1:\n"));
    // all_a is violated: only the failing branch is substantial.
    assert!(text.contains("all_a:\nforall a in A = false\n  [a=ctx3] "));
    assert!(!text.contains("[a=ctx1] bfunc"));
}
