use futures::Stream;

/// Capability interface supplied by the application layer per tree
/// instance: the asynchronous child-data source plus the item comparison
/// predicates driving the diff.
///
/// A child stream may emit zero or more times, may emit an empty list, and
/// must stop emitting once dropped. An `Err` emission is logged and leaves
/// the subtree's children unchanged until a successful emission arrives.
pub trait TreeSource {
    /// Application payload carried by every node.
    type Item: Send + 'static;
    /// Failure type a child stream may emit.
    type Error: std::error::Error + Send + 'static;
    /// Stream of child-list emissions for one node.
    type Stream: Stream<Item = Result<Vec<Self::Item>, Self::Error>> + Send + 'static;

    /// Opens the child-list stream for a node's value.
    fn observe_children(&self, value: &Self::Item) -> Self::Stream;

    /// Whether an old/new pair denotes the same logical item, possibly
    /// moved or changed. Must be deterministic.
    fn same_identity(&self, old: &Self::Item, new: &Self::Item) -> bool;

    /// Whether a matched pair carries identical content. A content change
    /// replaces the whole subtree.
    fn same_content(&self, old: &Self::Item, new: &Self::Item) -> bool;
}
