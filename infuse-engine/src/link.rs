//! Links are the witnesses a rule reports: sets of variable
//! bindings under which the rule is satisfied or violated.
//!
//! Every CCT node carries a `LinkSet` (a set of `Assignment`s) built
//! from its children's sets with two operators: `cartesian`, used
//! when both sides of a node contribute to its truth, and `bind`,
//! which records a quantifier branch's binding.  Only the root's set
//! is turned into typed `Link`s.
use crate::context::Context;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// One variable bound to one context.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Binding {
    pub var: String,
    pub context: Arc<Context>,
}

impl Binding {
    #[must_use]
    pub fn new(var: &str, context: Arc<Context>) -> Self {
        Self {
            var: var.into(),
            context,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.var, self.context.id())
    }
}

pub type Assignment = BTreeSet<Binding>;

pub type LinkSet = BTreeSet<Assignment>;

/// Pairwise union of the assignments in `lhs` and `rhs`.  An empty
/// set acts as the identity, so that a side without witnesses does
/// not erase the other side's.
#[must_use]
pub fn cartesian(lhs: &LinkSet, rhs: &LinkSet) -> LinkSet {
    if lhs.is_empty() {
        return rhs.clone();
    }

    if rhs.is_empty() {
        return lhs.clone();
    }

    let mut ret = LinkSet::new();
    for l in lhs {
        for r in rhs {
            ret.insert(l.union(r).cloned().collect());
        }
    }

    ret
}

/// Adds `binding` to every assignment in `links`, or returns the
/// singleton `{{binding}}` if `links` is empty.
#[must_use]
pub fn bind(binding: &Binding, links: &LinkSet) -> LinkSet {
    if links.is_empty() {
        let mut single = Assignment::new();
        single.insert(binding.clone());
        return std::iter::once(single).collect();
    }

    links
        .iter()
        .map(|assignment| {
            let mut extended = assignment.clone();
            extended.insert(binding.clone());
            extended
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LinkType {
    Violated,
    Satisfied,
}

impl LinkType {
    /// The type of the links a rule with root truth `truth` reports.
    #[must_use]
    pub fn of(truth: bool) -> Self {
        if truth {
            LinkType::Satisfied
        } else {
            LinkType::Violated
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LinkType::Violated => "VIOLATED",
            LinkType::Satisfied => "SATISFIED",
        }
    }
}

/// A typed witness.  Links hold their contexts by reference count
/// and are never modified once created.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Link {
    kind: LinkType,
    assignment: Assignment,
}

impl Link {
    #[must_use]
    pub fn new(kind: LinkType, assignment: Assignment) -> Self {
        Self { kind, assignment }
    }

    #[must_use]
    pub fn kind(&self) -> LinkType {
        self.kind
    }

    #[must_use]
    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Returns the context bound to `var` in this link.
    #[must_use]
    pub fn context_of(&self, var: &str) -> Option<&Arc<Context>> {
        self.assignment
            .iter()
            .find(|b| b.var == var)
            .map(|b| &b.context)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{{", self.kind.name())?;
        for (index, binding) in self.assignment.iter().enumerate() {
            if index > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", binding)?;
        }
        write!(f, "}}")
    }
}

/// Types every assignment in a root's link set according to the
/// root's truth.
#[must_use]
pub fn typed_links(truth: bool, links: &LinkSet) -> BTreeSet<Link> {
    let kind = LinkType::of(truth);
    links
        .iter()
        .map(|assignment| Link::new(kind, assignment.clone()))
        .collect()
}

#[cfg(test)]
fn binding(var: &str, id: &str) -> Binding {
    Binding::new(var, Arc::new(Context::new::<_, &str, &str>(id, [])))
}

#[test]
fn test_cartesian_identity() {
    let empty = LinkSet::new();
    let one = bind(&binding("a", "c1"), &empty);

    assert_eq!(cartesian(&empty, &empty), empty);
    assert_eq!(cartesian(&one, &empty), one);
    assert_eq!(cartesian(&empty, &one), one);
}

#[test]
fn test_cartesian_product() {
    let empty = LinkSet::new();
    let mut lhs = bind(&binding("a", "c1"), &empty);
    lhs.extend(bind(&binding("a", "c2"), &empty));
    let rhs = bind(&binding("b", "c3"), &empty);

    let product = cartesian(&lhs, &rhs);
    assert_eq!(product.len(), 2);
    for assignment in &product {
        assert_eq!(assignment.len(), 2);
        assert!(assignment.contains(&binding("b", "c3")));
    }
}

#[test]
fn test_bind_extends() {
    let empty = LinkSet::new();
    let inner = bind(&binding("b", "c3"), &empty);
    let outer = bind(&binding("a", "c1"), &inner);

    assert_eq!(outer.len(), 1);
    let only = outer.iter().next().expect("one");
    assert!(only.contains(&binding("a", "c1")));
    assert!(only.contains(&binding("b", "c3")));
}

#[test]
fn test_typed_links_display() {
    let empty = LinkSet::new();
    let set = bind(&binding("a", "c1"), &bind(&binding("b", "c2"), &empty));

    let links = typed_links(false, &set);
    let link = links.iter().next().expect("one");
    assert_eq!(link.kind(), LinkType::Violated);
    assert_eq!(link.to_string(), "VIOLATED,{(a,c1),(b,c2)}");
    assert_eq!(link.context_of("b").map(|c| c.id()), Some("c2"));
}
