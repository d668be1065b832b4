//! The Consistency-Checking Tree is a rule's formula instantiated over
//! the rule's live contexts: every quantifier node has one child
//! ("branch") per live context of its pattern, and each branch is a
//! fresh instance of the quantifier's body with the variable bound to
//! that context.
//!
//! Nodes live in an arena and refer to each other by `NodeId`, so that
//! edits can detach and graft branches anywhere without fighting the
//! ownership graph.  Freed slots are only recycled once the current
//! round is over: until then, a `NodeId` recorded during the round
//! never aliases a different node.
mod build;
mod links;
mod modify;
mod show;
mod truth;

pub use modify::BranchMode;
pub use modify::EditReport;
pub use modify::Edits;

use crate::link::{Binding, LinkSet};
use crate::rule::FormulaId;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Index of a node in its `Cct`'s arena.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeNode {
    formula: FormulaId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Set on branch roots (the children of quantifier nodes).
    binding: Option<Binding>,
    depth: u32,
    truth: bool,
    /// Cached link set; `None` when stale.
    links: Option<LinkSet>,
    substantial: bool,
}

impl RuntimeNode {
    fn new(formula: FormulaId, parent: Option<NodeId>, binding: Option<Binding>, depth: u32) -> Self {
        Self {
            formula,
            parent,
            children: Vec::new(),
            binding,
            depth,
            truth: false,
            links: None,
            substantial: false,
        }
    }

    #[must_use]
    pub fn formula(&self) -> FormulaId {
        self.formula
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[must_use]
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn is_truth(&self) -> bool {
        self.truth
    }

    #[must_use]
    pub fn is_substantial(&self) -> bool {
        self.substantial
    }

    #[must_use]
    pub fn links(&self) -> Option<&LinkSet> {
        self.links.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct Cct {
    nodes: Vec<Option<RuntimeNode>>,
    free: Vec<NodeId>,
    /// Slots freed during the current round.
    released: Vec<NodeId>,
    root: NodeId,
    /// Live CCT instances of each quantifier.
    instances: HashMap<FormulaId, BTreeSet<NodeId>>,
    affected: BTreeSet<NodeId>,
    /// Nodes created, freed or re-evaluated in the current round.
    touched: usize,
}

impl Cct {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            released: Vec::new(),
            root: NodeId(0),
            instances: HashMap::new(),
            affected: BTreeSet::new(),
            touched: 0,
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn root_truth(&self) -> bool {
        self.node(self.root).truth
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&RuntimeNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len() - self.released.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live instances of the quantifier `formula`.
    pub fn instances(&self, formula: FormulaId) -> impl Iterator<Item = NodeId> + '_ {
        self.instances.get(&formula).into_iter().flatten().copied()
    }

    #[must_use]
    pub fn affected(&self) -> &BTreeSet<NodeId> {
        &self.affected
    }

    #[must_use]
    pub fn touched(&self) -> usize {
        self.touched
    }

    /// Marks `id` and its ancestors for re-evaluation, and drops their
    /// cached links.
    pub fn mark_affected(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(id) = cursor {
            if !self.affected.insert(id) {
                // Marked ancestors always have marked ancestors.
                break;
            }

            let node = self.node_mut(id);
            node.links = None;
            cursor = node.parent;
        }
    }

    /// Ends the round: forgets the affected set and recycles the slots
    /// freed during the round.
    pub fn clean_affected(&mut self) {
        self.affected.clear();
        self.free.append(&mut self.released);
        self.touched = 0;
    }

    /// Returns the bindings in scope at `id`, outermost first.
    #[must_use]
    pub fn env(&self, id: NodeId) -> Vec<Binding> {
        let mut ret = Vec::new();
        let mut cursor = Some(id);
        while let Some(id) = cursor {
            let node = self.node(id);
            if let Some(binding) = &node.binding {
                ret.push(binding.clone());
            }
            cursor = node.parent;
        }

        ret.reverse();
        ret
    }

    /// Iterates over live nodes, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &RuntimeNode)> {
        self.nodes.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|node| (NodeId(u32::try_from(index).expect("arena fits u32")), node))
        })
    }

    fn node(&self, id: NodeId) -> &RuntimeNode {
        self.get(id).expect("live CCT node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut RuntimeNode {
        self.nodes[id.index()].as_mut().expect("live CCT node")
    }

    fn alloc(&mut self, node: RuntimeNode, quantifier: bool) -> NodeId {
        let formula = node.formula;
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId(u32::try_from(self.nodes.len()).expect("CCT too large"));
                self.nodes.push(Some(node));
                id
            }
        };

        if quantifier {
            self.instances.entry(formula).or_default().insert(id);
        }

        self.touched += 1;
        id
    }

    /// Frees `id` and its descendants.  The caller is responsible for
    /// detaching `id` from its parent.
    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = match self.nodes[id.index()].take() {
                Some(node) => node,
                None => continue,
            };

            if let Some(instances) = self.instances.get_mut(&node.formula) {
                instances.remove(&id);
            }
            self.affected.remove(&id);
            self.released.push(id);
            self.touched += 1;
            stack.extend(node.children);
        }
    }
}
