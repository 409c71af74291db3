use crate::node::{Forest, NodeKey};

/// Flat position of the node in the depth-first pre-order projection.
///
/// Walks from the node towards the root level, accumulating the sizes of all
/// preceding siblings plus one slot per parent hop; preceding roots count at
/// the top level.
///
/// # Panics
///
/// The node must be projected (no collapsed ancestor); a hidden node has no
/// flat position.
#[must_use]
pub fn position_of<T>(forest: &Forest<T>, key: NodeKey) -> usize {
    assert!(
        forest.is_projected(key),
        "flat position requested for a node hidden by a collapsed ancestor"
    );
    let mut position = 0;
    let mut current = key;
    loop {
        let siblings = forest.sibling_list(current);
        let index = siblings
            .iter()
            .position(|&k| k == current)
            .expect("node present in its sibling list");
        position += siblings[..index]
            .iter()
            .map(|&k| forest.total_size(k))
            .sum::<usize>();
        match forest.parent(current) {
            Some(parent) => {
                position += 1;
                current = parent;
            }
            None => break,
        }
    }
    position
}

/// End-exclusive flat position just past the node's whole subtree.
///
/// `position_of(key)..position_after(key)` is the flat range the subtree
/// occupies.
#[must_use]
pub fn position_after<T>(forest: &Forest<T>, key: NodeKey) -> usize {
    position_of(forest, key) + forest.total_size(key)
}

/// Node occupying the given flat position.
///
/// Walks sibling spans forward from the first root and descends into the
/// span containing the position; expand-aware sizes avoid materializing the
/// flat sequence.
///
/// # Panics
///
/// `position` must be below [`Forest::flat_len`]; anything else is caller
/// misuse, not a recoverable condition.
#[must_use]
pub fn node_at<T>(forest: &Forest<T>, position: usize) -> NodeKey {
    assert!(
        position < forest.flat_len(),
        "position {position} out of range for forest of flat size {}",
        forest.flat_len()
    );
    let mut remaining = position;
    let mut level: &[NodeKey] = forest.roots();
    loop {
        let mut descend = None;
        for &key in level {
            if remaining == 0 {
                return key;
            }
            let size = forest.total_size(key);
            if remaining < size {
                descend = Some(key);
                break;
            }
            remaining -= size;
        }
        let key = descend.expect("position within forest bounds");
        // Consume the node's own slot and continue among its children.
        remaining -= 1;
        level = forest.children(key);
    }
}
