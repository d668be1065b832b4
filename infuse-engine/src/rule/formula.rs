//! A rule's logical expression is stored as a flat arena of
//! `FormulaNode`s.  This is the static shape of the rule: the CCT
//! instantiates it once per variable binding, and the static analyses
//! (S-conditions, RCRE sets) only ever look at this arena, never at
//! the CCT.
use crate::Error;
use std::fmt;

/// Index of a node in its `Formula`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FormulaId(u32);

impl FormulaId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FormulaKind {
    /// True iff `body` holds for every live context of `pattern`
    /// bound to `var`.
    Forall {
        var: String,
        pattern: String,
        body: FormulaId,
    },
    /// True iff `body` holds for some live context of `pattern` bound
    /// to `var`.
    Exists {
        var: String,
        pattern: String,
        body: FormulaId,
    },
    And(FormulaId, FormulaId),
    Or(FormulaId, FormulaId),
    Implies(FormulaId, FormulaId),
    Not(FormulaId),
    /// A call to the behavior function `function`, with the contexts
    /// bound to `params` (in order).
    Atom { function: String, params: Vec<String> },
}

impl FormulaKind {
    /// Returns the quantified `(var, pattern, body)`, if this is a
    /// quantifier.
    #[must_use]
    pub fn quantifier(&self) -> Option<(&str, &str, FormulaId)> {
        match self {
            FormulaKind::Forall { var, pattern, body }
            | FormulaKind::Exists { var, pattern, body } => Some((var, pattern, *body)),
            _ => None,
        }
    }

    #[must_use]
    pub fn children(&self) -> Vec<FormulaId> {
        match self {
            FormulaKind::Forall { body, .. } | FormulaKind::Exists { body, .. } => vec![*body],
            FormulaKind::And(l, r) | FormulaKind::Or(l, r) | FormulaKind::Implies(l, r) => {
                vec![*l, *r]
            }
            FormulaKind::Not(c) => vec![*c],
            FormulaKind::Atom { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaKind::Forall { var, pattern, .. } => write!(f, "forall {} in {}", var, pattern),
            FormulaKind::Exists { var, pattern, .. } => write!(f, "exists {} in {}", var, pattern),
            FormulaKind::And(..) => write!(f, "and"),
            FormulaKind::Or(..) => write!(f, "or"),
            FormulaKind::Implies(..) => write!(f, "implies"),
            FormulaKind::Not(_) => write!(f, "not"),
            FormulaKind::Atom { function, params } => {
                write!(f, "bfunc {}({})", function, params.join(", "))
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormulaNode {
    kind: FormulaKind,
    parent: Option<FormulaId>,
    depth: u32,
}

impl FormulaNode {
    #[must_use]
    pub fn kind(&self) -> &FormulaKind {
        &self.kind
    }

    #[must_use]
    pub fn parent(&self) -> Option<FormulaId> {
        self.parent
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// Accumulates nodes bottom-up; `finish` checks that the nodes form
/// a single tree under the chosen root.
#[derive(Clone, Debug, Default)]
pub struct FormulaBuilder {
    kinds: Vec<FormulaKind>,
}

impl FormulaBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: FormulaKind) -> FormulaId {
        let id = FormulaId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    pub fn forall(&mut self, var: &str, pattern: &str, body: FormulaId) -> FormulaId {
        self.push(FormulaKind::Forall {
            var: var.into(),
            pattern: pattern.into(),
            body,
        })
    }

    pub fn exists(&mut self, var: &str, pattern: &str, body: FormulaId) -> FormulaId {
        self.push(FormulaKind::Exists {
            var: var.into(),
            pattern: pattern.into(),
            body,
        })
    }

    pub fn and(&mut self, lhs: FormulaId, rhs: FormulaId) -> FormulaId {
        self.push(FormulaKind::And(lhs, rhs))
    }

    pub fn or(&mut self, lhs: FormulaId, rhs: FormulaId) -> FormulaId {
        self.push(FormulaKind::Or(lhs, rhs))
    }

    pub fn implies(&mut self, lhs: FormulaId, rhs: FormulaId) -> FormulaId {
        self.push(FormulaKind::Implies(lhs, rhs))
    }

    pub fn not(&mut self, body: FormulaId) -> FormulaId {
        self.push(FormulaKind::Not(body))
    }

    pub fn atom(&mut self, function: &str, params: &[&str]) -> FormulaId {
        self.push(FormulaKind::Atom {
            function: function.into(),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
        })
    }

    #[must_use]
    pub fn kind(&self, id: FormulaId) -> Option<&FormulaKind> {
        self.kinds.get(id.index())
    }

    /// Freezes the nodes reachable from `root` into a `Formula`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a child reference is out of range, a node is
    /// shared between two parents, or a node is not reachable from
    /// `root`.
    pub fn finish(self, root: FormulaId) -> Result<Formula, Error> {
        let count = self.kinds.len();
        if root.index() >= count {
            return Err(Error::MalformedFormula("root out of range"));
        }

        let mut parents: Vec<Option<FormulaId>> = vec![None; count];
        for (index, kind) in self.kinds.iter().enumerate() {
            for child in kind.children() {
                // Ids from another builder could otherwise form cycles.
                if child.index() >= index {
                    return Err(Error::MalformedFormula("child defined after its parent"));
                }

                if child == root || parents[child.index()].is_some() {
                    return Err(Error::MalformedFormula("node has multiple parents"));
                }

                parents[child.index()] = Some(FormulaId(index as u32));
            }
        }

        // Children are always pushed before their parent, so a
        // reverse scan sees every parent before its children.
        let mut depths: Vec<Option<u32>> = vec![None; count];
        depths[root.index()] = Some(0);
        for index in (0..count).rev() {
            if let Some(parent) = parents[index] {
                depths[index] = depths[parent.index()].map(|d| d + 1);
            }
        }

        let mut nodes = Vec::with_capacity(count);
        for ((kind, parent), depth) in self.kinds.into_iter().zip(parents).zip(depths) {
            let depth = depth.ok_or(Error::MalformedFormula("node unreachable from root"))?;
            nodes.push(FormulaNode {
                kind,
                parent,
                depth,
            });
        }

        Ok(Formula { nodes, root })
    }
}

/// The frozen expression tree of one rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Formula {
    nodes: Vec<FormulaNode>,
    root: FormulaId,
}

impl Formula {
    #[must_use]
    pub fn root(&self) -> FormulaId {
        self.root
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this formula.
    #[must_use]
    pub fn node(&self, id: FormulaId) -> &FormulaNode {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn kind(&self, id: FormulaId) -> &FormulaKind {
        &self.node(id).kind
    }

    pub fn ids(&self) -> impl Iterator<Item = FormulaId> {
        (0..self.nodes.len() as u32).map(FormulaId)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[test]
fn test_finish_happy_path() {
    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let small = f.atom("small", &["b"]);
    let both = f.and(pos, small);
    let inner = f.exists("b", "B", both);
    let root = f.forall("a", "A", inner);

    let formula = f.finish(root).expect("ok");
    assert_eq!(formula.root(), root);
    assert_eq!(formula.node(root).depth(), 0);
    assert_eq!(formula.node(pos).depth(), 3);
    assert_eq!(formula.node(pos).parent(), Some(both));
    assert_eq!(formula.kind(inner).quantifier(), Some(("b", "B", both)));
    assert_eq!(formula.kind(pos).to_string(), "bfunc pos(a)");
}

#[test]
fn test_finish_shared_node() {
    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let root = f.and(pos, pos);

    assert!(f.finish(root).is_err());
}

#[test]
fn test_finish_unreachable_node() {
    let mut f = FormulaBuilder::new();
    let pos = f.atom("pos", &["a"]);
    let _dangling = f.atom("neg", &["a"]);
    let root = f.not(pos);

    assert!(f.finish(root).is_err());
}
