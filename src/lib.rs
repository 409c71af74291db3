//! Flat-list adapter for trees whose children arrive over asynchronous
//! streams.
//!
//! [`TreeListAdapter`] owns a [`Forest`] of value-carrying nodes, keeps one
//! child-stream subscription per reachable node, diffs every emitted child
//! list against the current one, and translates the resulting tree edits
//! into the flat-position operations a virtualized list view consumes
//! (`range_inserted` / `range_removed` / `item_moved`).
//!
//! The application supplies a [`TreeSource`]: the child stream per value
//! plus the identity and content predicates driving the diff. Rendering is
//! entirely the caller's concern; the adapter only hands out flat rows via
//! [`TreeListAdapter::row_at`] and edit notifications via
//! [`ListUpdateCallback`].

mod adapter;
mod diff;
mod node;
mod position;
mod source;
mod subscription;

pub use adapter::{ListUpdateCallback, TreeListAdapter, TreeRow};
pub use diff::{EditOp, diff_siblings};
pub use node::{Forest, NodeKey};
pub use position::{node_at, position_after, position_of};
pub use source::TreeSource;
