//! Contexts are the ground facts of the checker: immutable records of
//! some pattern, identified by a context id that is unique within
//! that pattern.  Changes to the world arrive as `ContextChange`s,
//! and each change is applied to the per-rule views kept in the
//! `ContextPool`.
//!
//! Contexts are shared by reference count: the pool, the CCT branches
//! that bind them, and the links recorded in a rule's history all
//! point at the same allocation.  Since a `Context` is never mutated
//! (an update supersedes it with a fresh one), a recorded link is a
//! stable snapshot even as the pool keeps moving.
mod pool;

pub use pool::ContextPool;
pub use pool::DeltaSets;
pub use pool::RuleView;

use crate::Error;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// One fact instance of a pattern.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Context {
    id: String,
    fields: BTreeMap<String, String>,
}

impl Context {
    #[must_use]
    pub fn new<I, K, V>(id: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChangeType {
    Addition,
    Deletion,
    Update,
}

impl ChangeType {
    /// The wire marker for this change type.
    #[must_use]
    pub fn marker(self) -> &'static str {
        match self {
            ChangeType::Addition => "+",
            ChangeType::Deletion => "-",
            ChangeType::Update => "#",
        }
    }
}

/// A delta event for one context of one pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContextChange {
    pub change_type: ChangeType,
    pub pattern_id: String,
    pub context: Arc<Context>,
}

impl ContextChange {
    #[must_use]
    pub fn new(change_type: ChangeType, pattern_id: &str, context: Context) -> Self {
        Self {
            change_type,
            pattern_id: pattern_id.into(),
            context: Arc::new(context),
        }
    }

    #[must_use]
    pub fn addition(pattern_id: &str, context: Context) -> Self {
        Self::new(ChangeType::Addition, pattern_id, context)
    }

    #[must_use]
    pub fn deletion(pattern_id: &str, context: Context) -> Self {
        Self::new(ChangeType::Deletion, pattern_id, context)
    }

    #[must_use]
    pub fn update(pattern_id: &str, context: Context) -> Self {
        Self::new(ChangeType::Update, pattern_id, context)
    }
}

impl fmt::Display for ContextChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}",
            self.change_type.marker(),
            self.pattern_id,
            self.context.id
        )
    }
}

/// A pattern is the schema of a family of contexts.  An empty field
/// list admits contexts with any fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    id: String,
    fields: BTreeSet<String>,
}

impl Pattern {
    #[must_use]
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(id: &str, fields: I) -> Self {
        Self {
            id: id.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Checks that `context` only carries fields declared by this
    /// pattern.
    ///
    /// # Errors
    ///
    /// Returns `Err(SchemaMismatch)` naming the first undeclared field.
    pub fn admit(&self, context: &Context) -> Result<(), Error> {
        if self.fields.is_empty() {
            return Ok(());
        }

        match context.fields.keys().find(|f| !self.fields.contains(*f)) {
            Some(field) => Err(Error::SchemaMismatch {
                pattern: self.id.clone(),
                context: context.id.clone(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Owns every `Pattern` known to a run, keyed on pattern id.
#[derive(Clone, Debug, Default)]
pub struct PatternHandler {
    patterns: BTreeMap<String, Pattern>,
}

impl PatternHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `Err` when a pattern with the same id already exists.
    pub fn add_pattern(&mut self, pattern: Pattern) -> Result<(), Error> {
        if self.patterns.contains_key(&pattern.id) {
            return Err(Error::DuplicatePattern(pattern.id));
        }

        self.patterns.insert(pattern.id.clone(), pattern);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.patterns.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.patterns.contains_key(id)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }
}

#[test]
fn test_pattern_schema() {
    let open = Pattern::new::<_, &str>("any", []);
    let strict = Pattern::new("loc", ["x", "y"]);

    let ok = Context::new("ctx_0", [("x", "1"), ("y", "2")]);
    let extra = Context::new("ctx_1", [("x", "1"), ("speed", "3")]);

    assert_eq!(open.admit(&extra), Ok(()));
    assert_eq!(strict.admit(&ok), Ok(()));
    assert_eq!(
        strict.admit(&extra),
        Err(Error::SchemaMismatch {
            pattern: "loc".into(),
            context: "ctx_1".into(),
            field: "speed".into(),
        })
    );
}

#[test]
fn test_duplicate_pattern() {
    let mut handler = PatternHandler::new();

    handler
        .add_pattern(Pattern::new::<_, &str>("a", []))
        .expect("ok");
    assert!(handler
        .add_pattern(Pattern::new::<_, &str>("a", []))
        .is_err());
    assert!(handler.contains("a"));
    assert!(!handler.contains("b"));
}

#[test]
fn test_change_display() {
    let change = ContextChange::deletion("loc", Context::new("ctx_3", [("x", "1")]));

    assert_eq!(change.to_string(), "-loc:ctx_3");
    assert_eq!(change.context.field("x"), Some("1"));
}
