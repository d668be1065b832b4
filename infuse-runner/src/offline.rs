//! Offline mode: changes come from a file, one record per line.
use crate::record;
use infuse_engine::{Context, Engine, Error};
use std::io::BufRead;
use tracing::{error, info};

/// Counters for a finished stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Records read, blank lines excluded.
    pub records: usize,
    /// Records that could not be decoded or checked.
    pub failures: usize,
}

/// Loads a pre-populated context pool into `engine`.  Call it before
/// `Engine::check_init`, which builds every rule that sees a seeded
/// context.
///
/// # Errors
///
/// Returns the first context the pool rejects; the contexts before it
/// stay seeded.
pub fn seed<I>(engine: &mut Engine, pool: I) -> Result<usize, Error>
where
    I: IntoIterator<Item = (String, Context)>,
{
    let mut count = 0;
    for (pattern, context) in pool {
        engine.seed(&pattern, context)?;
        count += 1;
    }

    info!(contexts = count, "context pool seeded");
    Ok(count)
}

/// Feeds every record of `input` to `engine`, then flushes it.
/// Records that fail to decode or check are logged and skipped.
///
/// # Errors
///
/// Returns `Err` only when reading `input` fails.
pub fn run<R: BufRead>(engine: &mut Engine, input: R) -> std::io::Result<Stats> {
    let mut stats = Stats::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        stats.records += 1;
        let lineno = index + 1;
        let change = match record::decode(text) {
            Ok(change) => change,
            Err(e) => {
                error!(lineno, error = %e, "bad record");
                stats.failures += 1;
                continue;
            }
        };

        if let Err(e) = engine.submit(change) {
            error!(lineno, error = %e, "change failed");
            stats.failures += 1;
        }
    }

    if let Err(e) = engine.finish() {
        error!(error = %e, "final flush failed");
    }

    info!(records = stats.records, failures = stats.failures, "offline stream done");
    Ok(stats)
}

#[test]
fn test_offline_skips_bad_lines() {
    use crate::config::{RuleSet, R1};

    let data = r#"{"changeType": "+", "patternId": "A", "context": {"contextId": "ctx1", "fields": {"x": 1}}}

not json
{"changeType": "-", "patternId": "A", "context": {"contextId": "nope"}}
{"changeType": "+", "patternId": "B", "context": {"contextId": "ctx2", "fields": {"y": 3}}}
"#;

    let mut engine = RuleSet::parse(R1)
        .expect("ok")
        .engine("ECC+IMD".parse().expect("ok"), false)
        .expect("ok");
    let stats = run(&mut engine, data.as_bytes()).expect("ok");

    assert_eq!(
        stats,
        Stats {
            records: 4,
            failures: 2
        }
    );
    assert!(engine.rule_truth("R1").expect("ok"));
}

#[test]
fn test_seed_sets_initial_truth() {
    use crate::config::{RuleSet, R1};

    let mut engine = RuleSet::parse(R1)
        .expect("ok")
        .engine("PCC+GEAS_ori".parse().expect("ok"), false)
        .expect("ok");
    let pool = record::decode_pool(
        r#"[{"pat_id": "A", "contexts": [{"ctx_id": "ctx1", "fields": {"x": 1}}, {"ctx_id": "ctx3", "fields": {"x": -1}}]}]"#,
    )
    .expect("ok");
    assert_eq!(seed(&mut engine, pool).expect("ok"), 2);
    engine.check_init().expect("ok");

    // all_a sees ctx3 right away; R1 still has no B to pair with.
    assert!(!engine.rule_truth("all_a").expect("ok"));
    assert_eq!(engine.history("all_a").map(<[_]>::len), Some(1));
    assert!(!engine.rule_truth("R1").expect("ok"));

    let dup = vec![("A".to_owned(), Context::new("ctx1", [("x", "2")]))];
    assert!(matches!(
        seed(&mut engine, dup),
        Err(Error::DuplicateContext { .. })
    ));
}
