use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Handle to a node in a [`Forest`].
    ///
    /// Keys are generational: once a node is removed its key never resolves
    /// again, even if the slot is reused.
    pub struct NodeKey;
}

pub(crate) struct Node<T> {
    pub(crate) value: T,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) expanded: bool,
}

/// Arena-backed forest of value-carrying nodes.
///
/// Structural invariants (not a DAG):
/// - no cycles, each non-root node has exactly one parent;
/// - sibling order is significant and defines the depth-first pre-order
///   flat projection;
/// - node identity is the key handle, never payload equality.
///
/// Derived quantities (`level`, `total_size`, sibling links) are recomputed
/// from the children lists on every call; nothing structural is cached.
pub struct Forest<T> {
    nodes: SlotMap<NodeKey, Node<T>>,
    roots: Vec<NodeKey>,
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Forest<T> {
    /// Creates an empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            roots: Vec::new(),
        }
    }

    /// Returns the top-level nodes in order.
    #[must_use]
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Returns `true` if the node is still present in the arena.
    #[must_use]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Returns the number of live nodes, visible or not.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node's payload.
    #[must_use]
    pub fn value(&self, key: NodeKey) -> &T {
        &self.nodes[key].value
    }

    /// Returns the node's parent, or `None` for roots.
    #[must_use]
    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes[key].parent
    }

    /// Returns the node's children in order.
    #[must_use]
    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        &self.nodes[key].children
    }

    /// Returns `true` if the node has at least one child.
    #[must_use]
    pub fn has_children(&self, key: NodeKey) -> bool {
        !self.nodes[key].children.is_empty()
    }

    /// Returns whether the node's children contribute to the flat projection.
    #[must_use]
    pub fn expanded(&self, key: NodeKey) -> bool {
        self.nodes[key].expanded
    }

    /// Distance from the root level; 0 for roots.
    #[must_use]
    pub fn level(&self, key: NodeKey) -> u16 {
        let mut level = 0;
        let mut current = self.nodes[key].parent;
        while let Some(parent) = current {
            level += 1;
            current = self.nodes[parent].parent;
        }
        level
    }

    /// Number of flat slots the node's subtree occupies: one for the node
    /// itself plus, when expanded, the slots of all children.
    #[must_use]
    pub fn total_size(&self, key: NodeKey) -> usize {
        let node = &self.nodes[key];
        if !node.expanded {
            return 1;
        }
        1 + node
            .children
            .iter()
            .map(|&child| self.total_size(child))
            .sum::<usize>()
    }

    /// Total flat size of the forest.
    #[must_use]
    pub fn flat_len(&self) -> usize {
        self.roots.iter().map(|&root| self.total_size(root)).sum()
    }

    /// First child, if any.
    #[must_use]
    pub fn first_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes[key].children.first().copied()
    }

    /// Last child, if any.
    #[must_use]
    pub fn last_child(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes[key].children.last().copied()
    }

    /// Previous sibling within the parent's (or root) list.
    #[must_use]
    pub fn prev_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let siblings = self.sibling_list(key);
        let index = siblings.iter().position(|&k| k == key)?;
        index.checked_sub(1).map(|i| siblings[i])
    }

    /// Next sibling within the parent's (or root) list.
    #[must_use]
    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let siblings = self.sibling_list(key);
        let index = siblings.iter().position(|&k| k == key)?;
        siblings.get(index + 1).copied()
    }

    /// The ordered list the node belongs to: its parent's children, or the
    /// root list for top-level nodes.
    #[must_use]
    pub fn sibling_list(&self, key: NodeKey) -> &[NodeKey] {
        match self.nodes[key].parent {
            Some(parent) => &self.nodes[parent].children,
            None => &self.roots,
        }
    }

    /// Returns `true` if every strict ancestor is expanded, i.e. the node
    /// occupies a slot in the flat projection.
    #[must_use]
    pub fn is_projected(&self, key: NodeKey) -> bool {
        let mut current = self.nodes[key].parent;
        while let Some(parent) = current {
            let node = &self.nodes[parent];
            if !node.expanded {
                return false;
            }
            current = node.parent;
        }
        true
    }

    /// Returns `true` if the node's children occupy flat slots.
    #[must_use]
    pub fn children_projected(&self, key: NodeKey) -> bool {
        self.nodes[key].expanded && self.is_projected(key)
    }

    pub(crate) fn set_expanded(&mut self, key: NodeKey, expanded: bool) {
        self.nodes[key].expanded = expanded;
    }

    pub(crate) fn expand_all(&mut self) {
        let mut stack: Vec<NodeKey> = self.roots.clone();
        while let Some(key) = stack.pop() {
            let node = &mut self.nodes[key];
            node.expanded = true;
            stack.extend_from_slice(&node.children);
        }
    }

    /// Creates a node that is linked to its parent but not yet present in
    /// the parent's children list; the caller splices it in.
    pub(crate) fn insert_detached(&mut self, parent: Option<NodeKey>, value: T) -> NodeKey {
        self.nodes.insert(Node {
            value,
            parent,
            children: Vec::new(),
            expanded: true,
        })
    }

    pub(crate) fn add_root(&mut self, value: T) -> NodeKey {
        let key = self.insert_detached(None, value);
        self.roots.push(key);
        key
    }

    /// Replaces the node's children list wholesale.
    pub(crate) fn splice_children(&mut self, parent: NodeKey, children: Vec<NodeKey>) {
        self.nodes[parent].children = children;
    }

    /// The node and all its descendants in depth-first pre-order.
    pub(crate) fn subtree_keys(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut keys = Vec::new();
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            keys.push(current);
            // Reverse keeps pre-order; callers only need full coverage.
            for &child in self.nodes[current].children.iter().rev() {
                stack.push(child);
            }
        }
        keys
    }

    /// Drops a detached subtree from the arena. The caller must have removed
    /// the head node from its sibling list already.
    pub(crate) fn remove_subtree(&mut self, key: NodeKey) {
        for k in self.subtree_keys(key) {
            self.nodes.remove(k);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Forest<&'static str>, NodeKey, NodeKey, NodeKey, NodeKey) {
        let mut forest = Forest::new();
        let a = forest.add_root("a");
        let b = forest.insert_detached(Some(a), "b");
        let c = forest.insert_detached(Some(a), "c");
        let d = forest.insert_detached(Some(b), "d");
        forest.splice_children(a, vec![b, c]);
        forest.splice_children(b, vec![d]);
        (forest, a, b, c, d)
    }

    #[test]
    fn total_size_tracks_expansion() {
        let (mut forest, a, b, _, _) = sample();
        assert_eq!(forest.total_size(a), 4);
        assert_eq!(forest.flat_len(), 4);

        forest.set_expanded(b, false);
        assert_eq!(forest.total_size(b), 1);
        assert_eq!(forest.flat_len(), 3);

        forest.set_expanded(a, false);
        assert_eq!(forest.flat_len(), 1);
    }

    #[test]
    fn levels_and_siblings() {
        let (forest, a, b, c, d) = sample();
        assert_eq!(forest.level(a), 0);
        assert_eq!(forest.level(b), 1);
        assert_eq!(forest.level(d), 2);

        assert_eq!(forest.prev_sibling(c), Some(b));
        assert_eq!(forest.next_sibling(b), Some(c));
        assert_eq!(forest.next_sibling(c), None);
        assert_eq!(forest.first_child(a), Some(b));
        assert_eq!(forest.last_child(a), Some(c));
    }

    #[test]
    fn projection_respects_collapsed_ancestors() {
        let (mut forest, a, b, _, d) = sample();
        assert!(forest.is_projected(d));
        forest.set_expanded(a, false);
        assert!(!forest.is_projected(b));
        assert!(!forest.is_projected(d));
        // A collapsed node still occupies its own slot.
        assert!(forest.is_projected(a));
        assert!(!forest.children_projected(a));
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let (mut forest, a, b, c, d) = sample();
        forest.splice_children(a, vec![c]);
        forest.remove_subtree(b);
        assert!(!forest.contains(b));
        assert!(!forest.contains(d));
        assert!(forest.contains(a));
        assert!(forest.contains(c));
        assert_eq!(forest.node_count(), 2);
    }

    #[test]
    fn expand_all_reaches_every_node() {
        let (mut forest, a, b, _, _) = sample();
        forest.set_expanded(a, false);
        forest.set_expanded(b, false);
        forest.expand_all();
        assert_eq!(forest.flat_len(), 4);
    }
}
