use infuse_engine::{Approach, Context, ContextChange, Technique};
use infuse_runner::{offline, online, output, record, RuleSet, Stats};
use std::io::{BufReader, Write};
use std::time::Duration;
use tokio::net::UdpSocket;

const RULES: &str = r#"{
  "patterns": [{ "id": "room" }, { "id": "badge" }],
  "functions": [
    { "name": "same_room", "op": "eq", "lhs": { "param": 0, "field": "room" }, "rhs": { "param": 1, "field": "room" } },
    { "name": "cleared", "op": "ge", "lhs": { "param": 0, "field": "level" }, "rhs": { "value": 2 } }
  ],
  "rules": [
    {
      "id": "badged",
      "formula": {
        "forall": { "var": "p", "pattern": "badge", "body": {
          "implies": [
            { "not": { "atom": { "function": "cleared", "params": ["p"] } } },
            { "exists": { "var": "r", "pattern": "room", "body": {
              "atom": { "function": "same_room", "params": ["p", "r"] } } } }
          ]
        } }
      }
    }
  ]
}"#;

fn changes() -> Vec<ContextChange> {
    vec![
        ContextChange::addition("room", Context::new("lobby", [("room", "lobby")])),
        ContextChange::addition("badge", Context::new("ann", [("room", "lobby"), ("level", "1")])),
        ContextChange::addition("badge", Context::new("bob", [("room", "lab"), ("level", "1")])),
        ContextChange::update("badge", Context::new("bob", [("room", "lab"), ("level", "3")])),
        ContextChange::addition("badge", Context::new("cat", [("room", "vault"), ("level", "0")])),
        ContextChange::deletion("room", Context::new("lobby", [("room", "lobby")])),
    ]
}

fn rule_set(dir: &tempfile::TempDir) -> RuleSet {
    let path = dir.path().join("rules.json");
    std::fs::write(&path, RULES).expect("ok");
    RuleSet::load(&path).expect("ok")
}

#[test]
fn test_offline_file_matches_across_approaches() {
    let dir = tempfile::tempdir().expect("ok");
    let rules = rule_set(&dir);

    let path = dir.path().join("changes.txt");
    let mut file = std::fs::File::create(&path).expect("ok");
    for change in changes() {
        writeln!(file, "{}", record::encode(&change).expect("ok")).expect("ok");
        writeln!(file).expect("ok");
    }
    drop(file);

    let mut expected = None;
    for technique in Technique::ALL.iter() {
        for approach in [
            Approach::new(*technique, "IMD".parse().expect("ok")),
            Approach::new(*technique, "GEAS_opt_s".parse().expect("ok")),
            Approach::new(*technique, "INFUSE_S".parse().expect("ok")),
        ]
        .iter()
        {
            let mut engine = rules.engine(*approach, true).expect("ok");
            engine.check_init().expect("ok");
            let input = BufReader::new(std::fs::File::open(&path).expect("ok"));
            let stats = offline::run(&mut engine, input).expect("ok");
            assert_eq!(
                stats,
                Stats {
                    records: 6,
                    failures: 0
                }
            );

            let results = output::results(&engine).expect("ok");
            let record = &results["badged"];
            // ann lost her room; cat never had one.
            assert!(!record.truth, "{}", approach);
            let violators: Vec<&str> = record
                .links
                .iter()
                .map(|link| link[0].value.ctx_id.as_str())
                .collect();
            assert_eq!(violators, vec!["ann", "cat"], "{}", approach);

            match &expected {
                None => expected = Some(results),
                Some(expected) => assert_eq!(expected, &results, "{}", approach),
            }
        }
    }
}

const POOL: &str = r#"[
  { "pat_id": "room", "contexts": [{ "ctx_id": "lab", "fields": { "room": "lab" } }] },
  { "pat_id": "badge", "contexts": [{ "ctx_id": "dan", "fields": { "room": "vault", "level": 0 } }] }
]"#;

#[test]
fn test_seeded_pool_sets_initial_truth() {
    let dir = tempfile::tempdir().expect("ok");
    let rules = rule_set(&dir);
    let path = dir.path().join("pool.json");
    std::fs::write(&path, POOL).expect("ok");

    for approach in [Approach::INFUSE, Approach::INFUSE_BASE].iter() {
        let mut bare = rules.engine(*approach, false).expect("ok");
        bare.check_init().expect("ok");
        assert!(bare.rule_truth("badged").expect("ok"), "{}", approach);
        assert_eq!(bare.history("badged").map(<[_]>::len), Some(0));

        let mut engine = rules.engine(*approach, false).expect("ok");
        let pool = record::decode_pool(&std::fs::read_to_string(&path).expect("ok")).expect("ok");
        assert_eq!(offline::seed(&mut engine, pool).expect("ok"), 2);
        engine.check_init().expect("ok");

        // dan's vault is not a known room.
        let results = output::results(&engine).expect("ok");
        assert!(!results["badged"].truth, "{}", approach);
        assert_eq!(results["badged"].links.len(), 1);
        assert_eq!(results["badged"].links[0][0].value.ctx_id, "dan");

        for change in changes() {
            engine.submit(change).expect("ok");
        }
        engine.finish().expect("ok");

        // The seeded lab room covers bob from the start.
        let violators: Vec<String> = output::results(&engine).expect("ok")["badged"]
            .links
            .iter()
            .map(|link| link[0].value.ctx_id.clone())
            .collect();
        assert_eq!(violators, vec!["ann", "cat", "dan"], "{}", approach);
    }
}

#[tokio::test]
async fn test_online_stream() {
    let dir = tempfile::tempdir().expect("ok");
    let mut engine = rule_set(&dir).engine(Approach::INFUSE, false).expect("ok");
    engine.check_init().expect("ok");

    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("ok");
    let addr = socket.local_addr().expect("ok");
    let sender = UdpSocket::bind("127.0.0.1:0").await.expect("ok");

    let mut datagrams: Vec<Vec<u8>> = changes()
        .iter()
        .map(|change| {
            let mut bytes = record::encode(change).expect("ok").into_bytes();
            bytes.push(b'\n');
            bytes.resize(online::DATAGRAM_SIZE, 0);
            bytes
        })
        .collect();
    datagrams.insert(2, b"garbage".to_vec());

    let send = tokio::spawn(async move {
        for datagram in datagrams {
            sender.send_to(&datagram, addr).await.expect("ok");
        }
    });

    let stats = online::run(&mut engine, socket, Duration::from_millis(500)).await;
    send.await.expect("ok");

    assert_eq!(
        stats,
        Stats {
            records: 7,
            failures: 1
        }
    );
    assert!(!engine.rule_truth("badged").expect("ok"));
}
