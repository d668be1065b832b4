//! Change records, one JSON object per line or datagram:
//!
//! ```json
//! {"changeType": "+", "patternId": "A", "context": {"contextId": "ctx1", "fields": {"x": 1}}}
//! ```
//!
//! `+` adds, `-` deletes and `#` (or `update`) updates a context.
//!
//! A pre-populated context pool is a single JSON array, one entry per
//! pattern:
//!
//! ```json
//! [{"pat_id": "A", "contexts": [{"ctx_id": "ctx1", "fields": {"x": 1}}]}]
//! ```
use crate::config::scalar;
use infuse_engine::{ChangeType, Context, ContextChange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed change record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown change type `{0}`")]
    ChangeType(String),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub change_type: String,
    pub pattern_id: String,
    pub context: ContextRecord,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    pub context_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

fn change_type(marker: &str) -> Result<ChangeType, RecordError> {
    match marker {
        "+" => Ok(ChangeType::Addition),
        "-" => Ok(ChangeType::Deletion),
        "#" | "update" => Ok(ChangeType::Update),
        other => Err(RecordError::ChangeType(other.into())),
    }
}

impl ChangeRecord {
    /// # Errors
    ///
    /// Returns `Err` for unknown change types.
    pub fn into_change(self) -> Result<ContextChange, RecordError> {
        let change_type = change_type(&self.change_type)?;
        let fields = self
            .context
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), scalar(v)));
        let context = Context::new(&self.context.context_id, fields);
        Ok(ContextChange::new(change_type, &self.pattern_id, context))
    }
}

impl From<&ContextChange> for ChangeRecord {
    fn from(change: &ContextChange) -> Self {
        Self {
            change_type: change.change_type.marker().into(),
            pattern_id: change.pattern_id.clone(),
            context: ContextRecord {
                context_id: change.context.id().into(),
                fields: change
                    .context
                    .fields()
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect(),
            },
        }
    }
}

/// One pattern's contexts in a pre-populated pool.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoolRecord {
    pub pat_id: String,
    #[serde(default)]
    pub contexts: Vec<PoolContext>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PoolContext {
    pub ctx_id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl PoolContext {
    fn to_context(&self) -> Context {
        let fields = self.fields.iter().map(|(k, v)| (k.clone(), scalar(v)));
        Context::new(&self.ctx_id, fields)
    }
}

/// Decodes a context pool into `(pattern, context)` pairs, in file
/// order.
///
/// # Errors
///
/// Returns `Err` for malformed JSON.
pub fn decode_pool(text: &str) -> Result<Vec<(String, Context)>, RecordError> {
    let records: Vec<PoolRecord> = serde_json::from_str(text)?;
    Ok(records
        .iter()
        .flat_map(|record| {
            record
                .contexts
                .iter()
                .map(move |context| (record.pat_id.clone(), context.to_context()))
        })
        .collect())
}

/// Decodes one change record.
///
/// # Errors
///
/// Returns `Err` for malformed JSON and unknown change types.
pub fn decode(text: &str) -> Result<ContextChange, RecordError> {
    serde_json::from_str::<ChangeRecord>(text)?.into_change()
}

/// Encodes `change` as a single-line record.
///
/// # Errors
///
/// Returns `Err` if serialization fails.
pub fn encode(change: &ContextChange) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ChangeRecord::from(change))
}

#[test]
fn test_decode() {
    let change = decode(
        r##"{"changeType": "#", "patternId": "A", "context": {"contextId": "c1", "fields": {"x": 1, "name": "bob"}}}"##,
    )
    .expect("ok");

    assert_eq!(change.change_type, ChangeType::Update);
    assert_eq!(change.pattern_id, "A");
    assert_eq!(change.context.id(), "c1");
    assert_eq!(change.context.field("x"), Some("1"));
    assert_eq!(change.context.field("name"), Some("bob"));

    let alias = decode(r#"{"changeType": "update", "patternId": "A", "context": {"contextId": "c1"}}"#)
        .expect("ok");
    assert_eq!(alias.change_type, ChangeType::Update);
    assert!(alias.context.fields().is_empty());
}

#[test]
fn test_decode_errors() {
    assert!(matches!(
        decode(r#"{"changeType": "*", "patternId": "A", "context": {"contextId": "c1"}}"#),
        Err(RecordError::ChangeType(_))
    ));
    assert!(matches!(decode("{"), Err(RecordError::Json(_))));
    assert!(matches!(
        decode(r#"{"changeType": "+", "context": {"contextId": "c1"}}"#),
        Err(RecordError::Json(_))
    ));
}

#[test]
fn test_encode_decodes() {
    let change = ContextChange::deletion("B", Context::new("c2", [("y", "3")]));
    let line = encode(&change).expect("ok");

    assert!(!line.contains('\n'));
    assert_eq!(decode(&line).expect("ok"), change);
}

#[test]
fn test_decode_pool() {
    let pool = decode_pool(
        r#"[
  {"pat_id": "A", "contexts": [{"ctx_id": "ctx1", "fields": {"x": 1}}, {"ctx_id": "ctx2"}]},
  {"pat_id": "B", "contexts": []},
  {"pat_id": "C", "contexts": [{"ctx_id": "ctx3", "fields": {"name": "bob"}}]}
]"#,
    )
    .expect("ok");

    let ids: Vec<(&str, &str)> = pool.iter().map(|(p, c)| (p.as_str(), c.id())).collect();
    assert_eq!(ids, [("A", "ctx1"), ("A", "ctx2"), ("C", "ctx3")]);
    assert_eq!(pool[0].1.field("x"), Some("1"));
    assert!(pool[1].1.fields().is_empty());

    assert!(matches!(decode_pool(r#"{"pat_id": "A"}"#), Err(RecordError::Json(_))));
    assert!(matches!(
        decode_pool(r#"[{"contexts": []}]"#),
        Err(RecordError::Json(_))
    ));
}
