//! The `ContextPool` keeps one `RuleView` per rule.  Rules consume
//! changes at different cadences (a batching scheduler may flush one
//! rule's changes long before another's), so each view owns both its
//! live contexts and the delta sets accumulated for its current
//! evaluation round.  Nothing is shared between views but the
//! `Arc<Context>` allocations themselves.
use super::{ChangeType, Context, ContextChange, Pattern, PatternHandler};
use crate::rule::Rule;
use crate::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Net changes to one pattern since the last time the round's
/// consumer cleared them.  Each context id appears in at most one of
/// the three sets: an addition followed by a deletion cancels out, a
/// deletion followed by an addition is an update, etc.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeltaSets {
    added: BTreeMap<String, Arc<Context>>,
    /// Deleted contexts, as they were before the round.
    deleted: BTreeMap<String, Arc<Context>>,
    /// Updated contexts: (value before the round, current value).
    updated: BTreeMap<String, (Arc<Context>, Arc<Context>)>,
}

impl DeltaSets {
    #[must_use]
    pub fn added(&self) -> &BTreeMap<String, Arc<Context>> {
        &self.added
    }

    #[must_use]
    pub fn deleted(&self) -> &BTreeMap<String, Arc<Context>> {
        &self.deleted
    }

    #[must_use]
    pub fn updated(&self) -> &BTreeMap<String, (Arc<Context>, Arc<Context>)> {
        &self.updated
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.updated.len()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.deleted.clear();
        self.updated.clear();
    }

    fn record_addition(&mut self, new: Arc<Context>) {
        let id = new.id().to_owned();
        match self.deleted.remove(&id) {
            Some(old) => {
                self.updated.insert(id, (old, new));
            }
            None => {
                self.added.insert(id, new);
            }
        }
    }

    fn record_deletion(&mut self, old: Arc<Context>) {
        let id = old.id().to_owned();
        if self.added.remove(&id).is_some() {
            return;
        }

        match self.updated.remove(&id) {
            Some((original, _)) => self.deleted.insert(id, original),
            None => self.deleted.insert(id, old),
        };
    }

    fn record_update(&mut self, old: Arc<Context>, new: Arc<Context>) {
        let id = new.id().to_owned();
        if let Some(slot) = self.added.get_mut(&id) {
            *slot = new;
            return;
        }

        match self.updated.get_mut(&id) {
            Some(slot) => slot.1 = new,
            None => {
                self.updated.insert(id, (old, new));
            }
        }
    }
}

/// One rule's window onto the pool: live contexts for each pattern
/// the rule references, plus that rule's delta sets.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuleView {
    live: BTreeMap<String, BTreeMap<String, Arc<Context>>>,
    deltas: BTreeMap<String, DeltaSets>,
}

impl RuleView {
    fn new<'a, I: IntoIterator<Item = &'a String>>(patterns: I) -> Self {
        let mut ret = Self::default();
        for pattern in patterns {
            ret.live.insert(pattern.clone(), BTreeMap::new());
            ret.deltas.insert(pattern.clone(), DeltaSets::default());
        }

        ret
    }

    /// Live contexts of `pattern`, in context id order.
    pub fn live(&self, pattern: &str) -> impl Iterator<Item = &Arc<Context>> {
        self.live.get(pattern).into_iter().flat_map(BTreeMap::values)
    }

    #[must_use]
    pub fn contains(&self, pattern: &str, context_id: &str) -> bool {
        self.live
            .get(pattern)
            .map_or(false, |m| m.contains_key(context_id))
    }

    /// Total number of live contexts across the view's patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn deltas(&self, pattern: &str) -> Option<&DeltaSets> {
        self.deltas.get(pattern)
    }

    /// Iterates over `(pattern, deltas)` for every pattern with a
    /// non-empty delta.
    pub fn pending_deltas(&self) -> impl Iterator<Item = (&String, &DeltaSets)> {
        self.deltas.iter().filter(|(_, d)| !d.is_empty())
    }

    /// Number of net changes accumulated in the round.
    #[must_use]
    pub fn delta_len(&self) -> usize {
        self.deltas.values().map(DeltaSets::len).sum()
    }

    pub fn clear_deltas(&mut self) {
        for deltas in self.deltas.values_mut() {
            deltas.clear();
        }
    }

    fn apply(
        &mut self,
        rule: &str,
        change: &ContextChange,
        record: bool,
    ) -> Result<(), Error> {
        let pattern = &change.pattern_id;
        let (live, deltas) = match (self.live.get_mut(pattern), self.deltas.get_mut(pattern)) {
            (Some(live), Some(deltas)) => (live, deltas),
            _ => {
                return Err(Error::UnknownPattern {
                    pattern: pattern.clone(),
                })
            }
        };

        let id = change.context.id();
        let missing = || Error::MissingContext {
            rule: rule.into(),
            pattern: pattern.clone(),
            context: id.into(),
        };

        match change.change_type {
            ChangeType::Addition => {
                if live.contains_key(id) {
                    return Err(Error::DuplicateContext {
                        rule: rule.into(),
                        pattern: pattern.clone(),
                        context: id.into(),
                    });
                }

                live.insert(id.into(), change.context.clone());
                if record {
                    deltas.record_addition(change.context.clone());
                }
            }
            ChangeType::Deletion => {
                let old = live.remove(id).ok_or_else(missing)?;
                if record {
                    deltas.record_deletion(old);
                }
            }
            ChangeType::Update => {
                let slot = live.get_mut(id).ok_or_else(missing)?;
                let old = std::mem::replace(slot, change.context.clone());
                if record {
                    deltas.record_update(old, change.context.clone());
                }
            }
        }

        Ok(())
    }
}

/// Live context storage for every rule, plus the registry of known
/// patterns.
#[derive(Clone, Debug, Default)]
pub struct ContextPool {
    patterns: PatternHandler,
    views: BTreeMap<String, RuleView>,
}

impl ContextPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pattern`; changes to unregistered patterns are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the pattern is already registered.
    pub fn init_pattern_sets(&mut self, pattern: Pattern) -> Result<(), Error> {
        self.patterns.add_pattern(pattern)
    }

    /// Creates the view (live and delta sets) for every pattern
    /// `rule` references.
    pub fn init_rule(&mut self, rule: &Rule) {
        self.views.insert(
            rule.id().to_owned(),
            RuleView::new(rule.related_patterns()),
        );
    }

    #[must_use]
    pub fn patterns(&self) -> &PatternHandler {
        &self.patterns
    }

    #[must_use]
    pub fn view(&self, rule: &str) -> Option<&RuleView> {
        self.views.get(rule)
    }

    /// Applies `change` to `rule`'s live contexts, without recording
    /// it in the delta sets.
    ///
    /// # Errors
    ///
    /// Returns `Err` for unregistered patterns, contexts that do not
    /// fit their pattern, additions of live ids, and deletions or
    /// updates of ids that are not live.  The view is unchanged on
    /// error.
    pub fn apply_change(&mut self, rule: &str, change: &ContextChange) -> Result<(), Error> {
        self.apply(rule, change, false)
    }

    /// Same as `apply_change`, but also accumulates the change into
    /// `rule`'s delta sets for batch consumers.
    ///
    /// # Errors
    ///
    /// See `apply_change`.
    pub fn apply_change_with_sets(
        &mut self,
        rule: &str,
        change: &ContextChange,
    ) -> Result<(), Error> {
        self.apply(rule, change, true)
    }

    fn apply(&mut self, rule: &str, change: &ContextChange, record: bool) -> Result<(), Error> {
        let pattern = self
            .patterns
            .get(&change.pattern_id)
            .ok_or_else(|| Error::UnknownPattern {
                pattern: change.pattern_id.clone(),
            })?;
        pattern.admit(&change.context)?;

        self.views
            .get_mut(rule)
            .ok_or_else(|| Error::UnknownRule(rule.into()))?
            .apply(rule, change, record)
    }

    #[must_use]
    pub fn add_set(&self, rule: &str, pattern: &str) -> Option<&BTreeMap<String, Arc<Context>>> {
        self.deltas(rule, pattern).map(DeltaSets::added)
    }

    #[must_use]
    pub fn del_set(&self, rule: &str, pattern: &str) -> Option<&BTreeMap<String, Arc<Context>>> {
        self.deltas(rule, pattern).map(DeltaSets::deleted)
    }

    #[must_use]
    pub fn upd_set(
        &self,
        rule: &str,
        pattern: &str,
    ) -> Option<&BTreeMap<String, (Arc<Context>, Arc<Context>)>> {
        self.deltas(rule, pattern).map(DeltaSets::updated)
    }

    fn deltas(&self, rule: &str, pattern: &str) -> Option<&DeltaSets> {
        self.views.get(rule)?.deltas(pattern)
    }

    /// Clears every delta set of `rule`.
    pub fn clear_deltas(&mut self, rule: &str) {
        if let Some(view) = self.views.get_mut(rule) {
            view.clear_deltas();
        }
    }

    /// Inserts `context` into every view that references `pattern`,
    /// bypassing the delta sets.  Seeded contexts are picked up by
    /// `Checker::check_init`.
    ///
    /// # Errors
    ///
    /// Same conditions as an addition through `apply_change`.  Every
    /// view is checked before any is touched, so no view is seeded on
    /// error.
    pub fn seed(&mut self, pattern: &str, context: Context) -> Result<(), Error> {
        self.patterns
            .get(pattern)
            .ok_or_else(|| Error::UnknownPattern {
                pattern: pattern.into(),
            })?
            .admit(&context)?;

        let rules: Vec<String> = self
            .views
            .iter()
            .filter(|(_, view)| view.live.contains_key(pattern))
            .map(|(rule, _)| rule.clone())
            .collect();

        if let Some(rule) = rules.iter().find(|r| {
            self.views
                .get(r.as_str())
                .map_or(false, |view| view.contains(pattern, context.id()))
        }) {
            return Err(Error::DuplicateContext {
                rule: rule.clone(),
                pattern: pattern.into(),
                context: context.id().into(),
            });
        }

        let change = ContextChange::addition(pattern, context);
        for rule in rules {
            self.apply_change(&rule, &change)?;
        }

        Ok(())
    }
}

#[cfg(test)]
fn test_pool(rule_patterns: &[&str]) -> ContextPool {
    let mut pool = ContextPool::new();
    for p in ["a", "b", "c"].iter() {
        pool.init_pattern_sets(Pattern::new::<_, &str>(p, []))
            .expect("ok");
    }

    let patterns: Vec<String> = rule_patterns.iter().map(|p| (*p).to_owned()).collect();
    pool.views.insert("r".into(), RuleView::new(&patterns));
    pool
}

#[cfg(test)]
fn ctx(id: &str, v: &str) -> Context {
    Context::new(id, [("v", v)])
}

#[test]
fn test_apply_change_happy_path() {
    let mut pool = test_pool(&["a", "b"]);

    pool.apply_change("r", &ContextChange::addition("a", ctx("c1", "1")))
        .expect("ok");
    pool.apply_change("r", &ContextChange::addition("a", ctx("c2", "2")))
        .expect("ok");
    pool.apply_change("r", &ContextChange::update("a", ctx("c1", "5")))
        .expect("ok");
    pool.apply_change("r", &ContextChange::deletion("a", ctx("c2", "2")))
        .expect("ok");

    let view = pool.view("r").expect("found");
    let live: Vec<_> = view.live("a").map(|c| c.field("v").unwrap_or("")).collect();
    assert_eq!(live, ["5"]);
    // Plain application never touches the deltas.
    assert_eq!(view.delta_len(), 0);
}

#[test]
fn test_apply_change_errors() {
    let mut pool = test_pool(&["a"]);

    // Deleting or updating something that is not there is an
    // upstream bug, and must be reported.
    assert_eq!(
        pool.apply_change("r", &ContextChange::deletion("a", ctx("c1", "1"))),
        Err(Error::MissingContext {
            rule: "r".into(),
            pattern: "a".into(),
            context: "c1".into(),
        })
    );
    assert!(pool
        .apply_change("r", &ContextChange::update("a", ctx("c1", "1")))
        .is_err());

    pool.apply_change("r", &ContextChange::addition("a", ctx("c1", "1")))
        .expect("ok");
    assert!(matches!(
        pool.apply_change("r", &ContextChange::addition("a", ctx("c1", "1"))),
        Err(Error::DuplicateContext { .. })
    ));

    // "zz" is not registered at all; "b" is registered but the rule
    // does not look at it.
    assert!(matches!(
        pool.apply_change("r", &ContextChange::addition("zz", ctx("c1", "1"))),
        Err(Error::UnknownPattern { .. })
    ));
    assert!(matches!(
        pool.apply_change("r", &ContextChange::addition("b", ctx("c1", "1"))),
        Err(Error::UnknownPattern { .. })
    ));
    assert!(matches!(
        pool.apply_change("nope", &ContextChange::addition("a", ctx("c9", "1"))),
        Err(Error::UnknownRule(_))
    ));
}

#[test]
fn test_delta_netting() {
    let mut pool = test_pool(&["a"]);

    pool.apply_change("r", &ContextChange::addition("a", ctx("old", "0")))
        .expect("ok");

    // add + delete cancels.
    pool.apply_change_with_sets("r", &ContextChange::addition("a", ctx("c1", "1")))
        .expect("ok");
    pool.apply_change_with_sets("r", &ContextChange::deletion("a", ctx("c1", "1")))
        .expect("ok");
    assert!(pool.view("r").expect("ok").deltas("a").expect("ok").is_empty());

    // add + update is still an addition, of the latest value.
    pool.apply_change_with_sets("r", &ContextChange::addition("a", ctx("c2", "1")))
        .expect("ok");
    pool.apply_change_with_sets("r", &ContextChange::update("a", ctx("c2", "2")))
        .expect("ok");
    let added = pool.add_set("r", "a").expect("ok");
    assert_eq!(added.len(), 1);
    assert_eq!(added["c2"].field("v"), Some("2"));

    // delete + add of a pre-existing context is an update.
    pool.apply_change_with_sets("r", &ContextChange::deletion("a", ctx("old", "0")))
        .expect("ok");
    pool.apply_change_with_sets("r", &ContextChange::addition("a", ctx("old", "9")))
        .expect("ok");
    assert!(pool.del_set("r", "a").expect("ok").is_empty());
    let (before, after) = &pool.upd_set("r", "a").expect("ok")["old"];
    assert_eq!(before.field("v"), Some("0"));
    assert_eq!(after.field("v"), Some("9"));

    // update + delete is a deletion of the original value.
    pool.apply_change_with_sets("r", &ContextChange::deletion("a", ctx("old", "9")))
        .expect("ok");
    assert!(pool.upd_set("r", "a").expect("ok").is_empty());
    assert_eq!(pool.del_set("r", "a").expect("ok")["old"].field("v"), Some("0"));

    pool.clear_deltas("r");
    assert_eq!(pool.view("r").expect("ok").delta_len(), 0);
}

#[test]
fn test_seed() {
    let mut pool = test_pool(&["a"]);

    pool.seed("a", ctx("c1", "1")).expect("ok");
    // Views that do not reference the pattern are left alone.
    pool.seed("b", ctx("c1", "1")).expect("ok");

    let view = pool.view("r").expect("ok");
    assert!(view.contains("a", "c1"));
    assert_eq!(view.len(), 1);
    assert_eq!(view.delta_len(), 0);
}

#[test]
fn test_seed_is_all_or_nothing() {
    let mut pool = test_pool(&["a"]);
    pool.views.insert("s".into(), RuleView::new(&["a".to_owned()]));
    pool.apply_change("s", &ContextChange::addition("a", ctx("c1", "1")))
        .expect("ok");

    assert_eq!(
        pool.seed("a", ctx("c1", "2")),
        Err(Error::DuplicateContext {
            rule: "s".into(),
            pattern: "a".into(),
            context: "c1".into(),
        })
    );
    // "r" sorts before "s", but must not have been seeded.
    assert!(!pool.view("r").expect("ok").contains("a", "c1"));
    assert_eq!(pool.view("s").expect("ok").live("a").count(), 1);

    assert!(matches!(
        pool.seed("zz", ctx("c2", "1")),
        Err(Error::UnknownPattern { .. })
    ));
}
