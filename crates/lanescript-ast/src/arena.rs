//! Arena storage and tree surgery.
//!
//! The [`Ast`] owns every node of a script. Parent/child relationships are
//! index pairs kept in sync by the surgery methods below; nothing outside
//! this module can edit a child list or a parent link directly, so a stale
//! parent pointer cannot be produced by a transform.
//!
//! Removed nodes are never freed. They stay in the arena, detached and
//! unreachable from the root, which keeps every [`NodeId`] handed out
//! during a pass valid for the lifetime of the arena.
//!
//! # Invariants
//!
//! - A node appears in at most one parent list.
//! - `node.parent` names that list's owner and the list kind ([`Slot`]).
//! - The root never has a parent.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::{AstError, AstResult};
use crate::node::{Node, NodeId, NodeKind, ParentLink, Slot};

/// Arena-backed expression tree.
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    /// Create an arena holding a single root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root)],
            root: NodeId::new(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.nodes[0].children.is_empty()
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node's payload (kind, identifier, vector metadata).
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent()
    }

    /// Allocate a detached node. Structural lists of `node` are discarded.
    pub fn alloc(&mut self, mut node: Node) -> NodeId {
        node.children.clear();
        node.indexers.clear();
        node.depends_on.clear();
        node.parent = None;
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Allocate a node and append it to `parent`'s children.
    pub fn add(&mut self, parent: NodeId, node: Node) -> AstResult<NodeId> {
        let id = self.alloc(node);
        self.push_child(parent, id)?;
        Ok(id)
    }

    // ========================================================================
    // Attaching
    // ========================================================================

    pub fn push_child(&mut self, parent: NodeId, child: NodeId) -> AstResult<()> {
        let index = self.node(parent).children.len();
        self.insert_into(parent, Slot::Child, index, &[child])
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> AstResult<()> {
        self.insert_into(parent, Slot::Child, index, &[child])
    }

    /// Insert several detached nodes at `index`, keeping their order.
    pub fn insert_children(
        &mut self,
        parent: NodeId,
        index: usize,
        children: &[NodeId],
    ) -> AstResult<()> {
        self.insert_into(parent, Slot::Child, index, children)
    }

    pub fn push_indexer(&mut self, parent: NodeId, indexer: NodeId) -> AstResult<()> {
        let index = self.node(parent).indexers.len();
        self.insert_into(parent, Slot::Indexer, index, &[indexer])
    }

    pub fn push_dependency(&mut self, node: NodeId, dependency: NodeId) -> AstResult<()> {
        let index = self.node(node).depends_on.len();
        self.insert_into(node, Slot::Dependency, index, &[dependency])
    }

    /// Prepend dependencies, keeping their relative order.
    pub fn prepend_dependencies(&mut self, node: NodeId, dependencies: &[NodeId]) -> AstResult<()> {
        self.insert_into(node, Slot::Dependency, 0, dependencies)
    }

    fn insert_into(
        &mut self,
        parent: NodeId,
        slot: Slot,
        index: usize,
        nodes: &[NodeId],
    ) -> AstResult<()> {
        let len = self.list(parent, slot).len();
        if index > len {
            return Err(AstError::IndexOutOfRange {
                node: parent,
                index,
                len,
            });
        }
        for &id in nodes {
            self.check_attachable(parent, id)?;
        }
        for &id in nodes {
            self.nodes[id.index()].parent = Some(ParentLink { parent, slot });
        }
        self.list_mut(parent, slot)
            .splice(index..index, nodes.iter().copied());
        Ok(())
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> AstResult<()> {
        if child == self.root {
            return Err(AstError::RootAttach);
        }
        if self.node(child).parent.is_some() {
            return Err(AstError::NotDetached(child));
        }
        // Attaching an ancestor below itself would create a cycle.
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(AstError::Cycle { parent, child });
            }
            cursor = self.node(id).parent();
        }
        Ok(())
    }

    fn list(&self, id: NodeId, slot: Slot) -> &Vec<NodeId> {
        let node = self.node(id);
        match slot {
            Slot::Child => &node.children,
            Slot::Indexer => &node.indexers,
            Slot::Dependency => &node.depends_on,
        }
    }

    fn list_mut(&mut self, id: NodeId, slot: Slot) -> &mut Vec<NodeId> {
        let node = self.node_mut(id);
        match slot {
            Slot::Child => &mut node.children,
            Slot::Indexer => &mut node.indexers,
            Slot::Dependency => &mut node.depends_on,
        }
    }

    // ========================================================================
    // Detaching and replacing
    // ========================================================================

    /// Index of `id` inside the parent list it is stored in.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        let link = self.node(id).parent?;
        self.list(link.parent, link.slot)
            .iter()
            .position(|&entry| entry == id)
    }

    /// Remove `id` from its parent. The subtree stays intact below `id`.
    pub fn detach(&mut self, id: NodeId) -> AstResult<()> {
        let link = self.node(id).parent.ok_or(AstError::NotAttached(id))?;
        let index = self.position(id).ok_or(AstError::NotAttached(id))?;
        self.list_mut(link.parent, link.slot).remove(index);
        self.nodes[id.index()].parent = None;
        Ok(())
    }

    /// Put the detached node `new` in `old`'s place and detach `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> AstResult<()> {
        self.replace_with_many(old, &[new])
    }

    /// Splice `new` (detached, in order) into `old`'s place and detach `old`.
    pub fn replace_with_many(&mut self, old: NodeId, new: &[NodeId]) -> AstResult<()> {
        let link = self.node(old).parent.ok_or(AstError::NotAttached(old))?;
        let index = self.position(old).ok_or(AstError::NotAttached(old))?;
        self.detach(old)?;
        if let Err(err) = self.insert_into(link.parent, link.slot, index, new) {
            // Put `old` back so a failed splice leaves the tree unchanged.
            self.insert_into(link.parent, link.slot, index, &[old])?;
            return Err(err);
        }
        Ok(())
    }

    /// Replace children `range` of `parent` with `new`, returning the
    /// detached nodes that were removed.
    pub fn replace_range(
        &mut self,
        parent: NodeId,
        range: Range<usize>,
        new: &[NodeId],
    ) -> AstResult<Vec<NodeId>> {
        let len = self.node(parent).children.len();
        if range.start > range.end || range.end > len {
            return Err(AstError::IndexOutOfRange {
                node: parent,
                index: range.end,
                len,
            });
        }
        for &id in new {
            self.check_attachable(parent, id)?;
        }
        let removed: Vec<NodeId> = self
            .node_mut(parent)
            .children
            .splice(range, new.iter().copied())
            .collect();
        for &id in &removed {
            self.nodes[id.index()].parent = None;
        }
        for &id in new {
            self.nodes[id.index()].parent = Some(ParentLink {
                parent,
                slot: Slot::Child,
            });
        }
        Ok(removed)
    }

    /// Detach and return all children of `parent`.
    pub fn take_children(&mut self, parent: NodeId) -> Vec<NodeId> {
        self.take_list(parent, Slot::Child)
    }

    /// Detach and return all indexers of `parent`.
    pub fn take_indexers(&mut self, parent: NodeId) -> Vec<NodeId> {
        self.take_list(parent, Slot::Indexer)
    }

    /// Detach and return all dependencies of `node`.
    pub fn take_dependencies(&mut self, node: NodeId) -> Vec<NodeId> {
        self.take_list(node, Slot::Dependency)
    }

    fn take_list(&mut self, parent: NodeId, slot: Slot) -> Vec<NodeId> {
        let taken = std::mem::take(self.list_mut(parent, slot));
        for &id in &taken {
            self.nodes[id.index()].parent = None;
        }
        taken
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `id` is reachable from the root through parent links.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = id;
        loop {
            if cursor == self.root {
                return true;
            }
            match self.node(cursor).parent() {
                Some(parent) => cursor = parent,
                None => return false,
            }
        }
    }

    /// Nearest ancestor of `id` (excluding `id`) matching `predicate`.
    pub fn ancestor_where(&self, id: NodeId, predicate: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut cursor = self.node(id).parent();
        while let Some(current) = cursor {
            if predicate(self.node(current)) {
                return Some(current);
            }
            cursor = self.node(current).parent();
        }
        None
    }

    /// Pre-order list of `id` and everything below it: dependencies first,
    /// then children, then indexers.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let node = self.node(current);
            for &next in node
                .indexers
                .iter()
                .rev()
                .chain(node.children.iter().rev())
                .chain(node.depends_on.iter().rev())
            {
                stack.push(next);
            }
        }
        out
    }

    /// Deep-clone the subtree rooted at `id` into a detached copy.
    ///
    /// The copy is built by remapping the pre-order index list of the
    /// subtree, so each node is copied exactly once.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let originals = self.descendants(id);
        let base = self.nodes.len();
        let remap: HashMap<NodeId, NodeId> = originals
            .iter()
            .enumerate()
            .map(|(offset, &old)| (old, NodeId::new(base + offset)))
            .collect();
        let map_list = |list: &[NodeId]| -> Vec<NodeId> { list.iter().map(|c| remap[c]).collect() };

        let mut copies = Vec::with_capacity(originals.len());
        for &original in &originals {
            let source = self.node(original);
            let mut copy = source.clone();
            copy.children = map_list(&source.children);
            copy.indexers = map_list(&source.indexers);
            copy.depends_on = map_list(&source.depends_on);
            copy.parent = source.parent.and_then(|link| {
                remap.get(&link.parent).map(|&parent| ParentLink {
                    parent,
                    slot: link.slot,
                })
            });
            copies.push(copy);
        }
        // The clone's root is detached regardless of where the original lived.
        copies[0].parent = None;
        self.nodes.extend(copies);
        NodeId::new(base)
    }

    /// Check both directions of every link reachable from the root.
    pub fn validate(&self) -> AstResult<()> {
        if self.node(self.root).parent.is_some() {
            return Err(AstError::RootAttach);
        }
        for id in self.descendants(self.root) {
            let node = self.node(id);
            for (slot, list) in [
                (Slot::Child, &node.children),
                (Slot::Indexer, &node.indexers),
                (Slot::Dependency, &node.depends_on),
            ] {
                for &child in list {
                    let link = self.node(child).parent;
                    if link != Some(ParentLink { parent: id, slot }) {
                        return Err(AstError::StaleParent { node: child });
                    }
                }
            }
        }
        Ok(())
    }
}
