use smallvec::SmallVec;
use tracing::debug;

use crate::diff::{EditOp, diff_siblings};
use crate::node::{Forest, NodeKey};
use crate::position::{node_at, position_of};
use crate::source::TreeSource;
use crate::subscription::{
    Emission, EmissionReceiver, EmissionSender, SubscriptionRegistry, emission_channel,
};

/// Render-edit protocol: the minimal operation set a virtualized list view
/// needs to update incrementally without a full reset.
///
/// Positions are flat indices in the view's own coordinates: each
/// notification assumes every earlier one of the same update has already
/// been applied, so a consumer that replays them literally over its row
/// list stays aligned with the adapter. A move relocates the head node's
/// row; its pre-move and post-move positions are reported.
pub trait ListUpdateCallback {
    /// A contiguous flat range appeared.
    fn range_inserted(&mut self, position: usize, count: usize);
    /// A contiguous flat range disappeared.
    fn range_removed(&mut self, position: usize, count: usize);
    /// A single row relocated.
    fn item_moved(&mut self, from: usize, to: usize);
    /// The whole projection changed; re-read everything.
    fn reset(&mut self);
}

/// A flat row handed to the renderer.
#[derive(Clone, Copy, Debug)]
pub struct TreeRow<'a, T> {
    /// Application payload of the node at this row.
    pub value: &'a T,
    /// Depth level, 0 for roots.
    pub level: u16,
    /// Whether the node's children contribute to the projection.
    pub expanded: bool,
    /// Whether the node currently has children.
    pub has_children: bool,
}

/// Projects a forest with asynchronously streamed children onto a flat,
/// linearly-indexed sequence.
///
/// The adapter is the single owner of the tree: every mutation happens
/// inside its `&mut self` methods. Child streams run on background tasks
/// and only push into an internal funnel; [`Self::tick`] (or
/// [`Self::drain`]) marshals one emission at a time onto the owner context,
/// so emissions for one node are processed in arrival order and nothing
/// interleaves between position capture and children splice.
pub struct TreeListAdapter<S: TreeSource> {
    forest: Forest<S::Item>,
    source: S,
    subs: SubscriptionRegistry,
    funnel_tx: EmissionSender<S::Item>,
    funnel_rx: EmissionReceiver<S::Item>,
}

/// Structural edit with sibling-index targets carried over from the diff
/// script (new-children coordinates, valid at its dispatch point).
enum OpRecord {
    Inserted {
        index: usize,
        keys: SmallVec<[NodeKey; 8]>,
    },
    Removed {
        keys: SmallVec<[NodeKey; 8]>,
    },
    Moved {
        key: NodeKey,
        to_index: usize,
    },
    Changed {
        index: usize,
        old: SmallVec<[NodeKey; 8]>,
        fresh: SmallVec<[NodeKey; 8]>,
    },
}

/// The renderer's view of one parent's children block while an update is
/// being dispatched.
///
/// Each notification must be expressed in the coordinates the renderer has
/// after applying the notifications already delivered for this emission.
/// The pre-edit tree is behind (earlier ops shifted it) and the post-splice
/// tree is ahead (later ops have not landed), so the translator replays its
/// own edits over this sibling/size list and reads every range from it.
/// Sibling subtree sizes cannot change mid-emission, which keeps the mirror
/// exact.
struct FlatMirror {
    /// Flat position of the first child slot (parent position + 1).
    base: usize,
    /// Current siblings in renderer order with their subtree sizes.
    entries: Vec<(NodeKey, usize)>,
}

impl FlatMirror {
    fn offset(&self, index: usize) -> usize {
        self.base + self.entries[..index].iter().map(|&(_, size)| size).sum::<usize>()
    }

    fn index_of(&self, key: NodeKey) -> usize {
        self.entries
            .iter()
            .position(|&(k, _)| k == key)
            .expect("dispatched node is tracked by the mirror")
    }

    /// Drops a contiguous sibling run; returns its flat start and length.
    fn remove_run(&mut self, keys: &[NodeKey]) -> (usize, usize) {
        let index = self.index_of(keys[0]);
        let run = index..index + keys.len();
        debug_assert!(
            self.entries[run.clone()]
                .iter()
                .map(|&(k, _)| k)
                .eq(keys.iter().copied()),
            "removal run not contiguous in the mirror"
        );
        let start = self.offset(index);
        let count = self.entries[run.clone()].iter().map(|&(_, size)| size).sum();
        self.entries.drain(run);
        (start, count)
    }

    /// Splices sized entries at the sibling index; returns the flat start
    /// and length of the inserted range.
    fn insert_run(&mut self, index: usize, entries: &[(NodeKey, usize)]) -> (usize, usize) {
        let start = self.offset(index);
        let count = entries.iter().map(|&(_, size)| size).sum();
        self.entries.splice(index..index, entries.iter().copied());
        (start, count)
    }

    /// Relocates one sibling to the given index; returns the head node's
    /// flat position before and after.
    fn move_entry(&mut self, key: NodeKey, to_index: usize) -> (usize, usize) {
        let from_index = self.index_of(key);
        let from = self.offset(from_index);
        let entry = self.entries.remove(from_index);
        let to = self.offset(to_index);
        self.entries.insert(to_index, entry);
        (from, to)
    }
}

impl<S: TreeSource> TreeListAdapter<S> {
    /// Creates an adapter over the given child-data source with an empty
    /// forest.
    pub fn new(source: S) -> Self {
        let (funnel_tx, funnel_rx) = emission_channel();
        Self {
            forest: Forest::new(),
            source,
            subs: SubscriptionRegistry::new(),
            funnel_tx,
            funnel_rx,
        }
    }

    /// Replaces the entire forest: tears down every subscription, builds
    /// fresh root nodes, subscribes each, and fires `reset`.
    ///
    /// Must run inside a tokio runtime context.
    pub fn set_roots(&mut self, items: Vec<S::Item>, cb: &mut impl ListUpdateCallback) {
        self.subs.stop_all();
        self.forest.clear();
        let keys: Vec<NodeKey> = items
            .into_iter()
            .map(|item| self.forest.add_root(item))
            .collect();
        for key in keys {
            self.start_observing(key);
        }
        cb.reset();
    }

    /// Total flat size of the forest.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.forest.flat_len()
    }

    /// Row data for rendering the given flat position.
    ///
    /// # Panics
    ///
    /// `position` must be below [`Self::item_count`].
    #[must_use]
    pub fn row_at(&self, position: usize) -> TreeRow<'_, S::Item> {
        let key = node_at(&self.forest, position);
        TreeRow {
            value: self.forest.value(key),
            level: self.forest.level(key),
            expanded: self.forest.expanded(key),
            has_children: self.forest.has_children(key),
        }
    }

    /// Node handle at the given flat position.
    #[must_use]
    pub fn key_at(&self, position: usize) -> NodeKey {
        node_at(&self.forest, position)
    }

    /// Flat position of a projected node.
    #[must_use]
    pub fn position_of(&self, key: NodeKey) -> usize {
        position_of(&self.forest, key)
    }

    /// Read access to the underlying forest.
    #[must_use]
    pub fn forest(&self) -> &Forest<S::Item> {
        &self.forest
    }

    /// Sets a node's expand flag, notifying the renderer about the
    /// descendant range that appears or disappears. Idempotent when the
    /// flag is unchanged; collapsing does not destroy or unsubscribe
    /// children, it only hides them.
    pub fn set_expanded(&mut self, key: NodeKey, expanded: bool, cb: &mut impl ListUpdateCallback) {
        if self.forest.expanded(key) == expanded {
            return;
        }
        let visible = self.forest.is_projected(key);
        if expanded {
            self.forest.set_expanded(key, true);
            if visible {
                let count = self.forest.total_size(key) - 1;
                if count > 0 {
                    cb.range_inserted(position_of(&self.forest, key) + 1, count);
                }
            }
        } else {
            // The descendant range must be measured before the flag flips.
            let count = self.forest.total_size(key) - 1;
            let start = if visible {
                position_of(&self.forest, key) + 1
            } else {
                0
            };
            self.forest.set_expanded(key, false);
            if visible && count > 0 {
                cb.range_removed(start, count);
            }
        }
    }

    /// Flips a node's expand flag.
    pub fn toggle(&mut self, key: NodeKey, cb: &mut impl ListUpdateCallback) {
        let expanded = self.forest.expanded(key);
        self.set_expanded(key, !expanded, cb);
    }

    /// Expands every node and fires `reset`.
    pub fn expand_all(&mut self, cb: &mut impl ListUpdateCallback) {
        self.forest.expand_all();
        cb.reset();
    }

    /// Tears down every subscription. The forest stays readable; no further
    /// emissions will be applied. This is the host-teardown signal.
    pub fn shutdown(&mut self) {
        self.subs.stop_all();
    }

    /// Number of live child-stream subscriptions (one per reachable node).
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subs.len()
    }

    /// Awaits the next child-list emission and applies it.
    ///
    /// Returns `false` if the emission was discarded as stale (its node was
    /// detached after the emission was queued).
    pub async fn tick(&mut self, cb: &mut impl ListUpdateCallback) -> bool {
        let emission = self
            .funnel_rx
            .recv()
            .await
            .expect("funnel sender is owned by the adapter");
        self.apply_emission(emission, cb)
    }

    /// Applies every queued emission without blocking; returns how many
    /// were applied (stale ones are discarded and not counted).
    pub fn drain(&mut self, cb: &mut impl ListUpdateCallback) -> usize {
        let mut applied = 0;
        while let Ok(emission) = self.funnel_rx.try_recv() {
            if self.apply_emission(emission, cb) {
                applied += 1;
            }
        }
        applied
    }

    fn start_observing(&mut self, key: NodeKey) {
        let stream = self.source.observe_children(self.forest.value(key));
        self.subs.start(key, stream, self.funnel_tx.clone());
    }

    fn stop_observing_subtree(&mut self, key: NodeKey) {
        for k in self.forest.subtree_keys(key) {
            self.subs.stop(k);
        }
    }

    /// Applies one child-list emission: capture, diff, splice, dispatch.
    fn apply_emission(
        &mut self,
        emission: Emission<S::Item>,
        cb: &mut impl ListUpdateCallback,
    ) -> bool {
        let Emission {
            key: parent,
            generation,
            children: new_items,
        } = emission;
        if !self.subs.accepts(parent, generation) || !self.forest.contains(parent) {
            debug!(?parent, "discarding stale emission for a detached node");
            return false;
        }

        let old_keys: Vec<NodeKey> = self.forest.children(parent).to_vec();

        // Sibling order and subtree sizes must be captured before the
        // splice: removed nodes cannot be mapped afterwards. The mirror
        // then keeps those coordinates current across the dispatch loop.
        let mut mirror = if self.forest.children_projected(parent) {
            Some(FlatMirror {
                base: position_of(&self.forest, parent) + 1,
                entries: old_keys
                    .iter()
                    .map(|&key| (key, self.forest.total_size(key)))
                    .collect(),
            })
        } else {
            None
        };

        let ops = {
            let old_values: Vec<&S::Item> =
                old_keys.iter().map(|&key| self.forest.value(key)).collect();
            diff_siblings(
                &old_values,
                &new_items,
                |&old, new| self.source.same_identity(old, new),
                |&old, new| self.source.same_content(old, new),
            )
        };
        if ops.is_empty() {
            return true;
        }

        // Structural pass: replay the script over a working key list,
        // creating fresh nodes for inserted and content-changed items, then
        // splice the result into the parent before any notification goes
        // out, so a renderer re-reading rows mid-dispatch sees the new
        // tree.
        let mut new_items: Vec<Option<S::Item>> = new_items.into_iter().map(Some).collect();
        let mut work = old_keys;
        let mut records = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                EditOp::Removed { position, count } => {
                    let keys: SmallVec<[NodeKey; 8]> =
                        work.drain(position..position + count).collect();
                    records.push(OpRecord::Removed { keys });
                }
                EditOp::Moved { from, to } => {
                    let key = work.remove(from);
                    work.insert(to, key);
                    records.push(OpRecord::Moved { key, to_index: to });
                }
                EditOp::Inserted { position, count } => {
                    let mut keys = SmallVec::new();
                    for offset in 0..count {
                        let item = new_items[position + offset]
                            .take()
                            .expect("each emitted item is spliced once");
                        let key = self.forest.insert_detached(Some(parent), item);
                        work.insert(position + offset, key);
                        keys.push(key);
                    }
                    records.push(OpRecord::Inserted {
                        index: position,
                        keys,
                    });
                }
                EditOp::Changed { position, count } => {
                    let mut old = SmallVec::new();
                    let mut fresh = SmallVec::new();
                    for offset in 0..count {
                        let item = new_items[position + offset]
                            .take()
                            .expect("each emitted item is spliced once");
                        let key = self.forest.insert_detached(Some(parent), item);
                        old.push(std::mem::replace(&mut work[position + offset], key));
                        fresh.push(key);
                    }
                    records.push(OpRecord::Changed {
                        index: position,
                        old,
                        fresh,
                    });
                }
            }
        }
        self.forest.splice_children(parent, work);

        // Dispatch: subscriptions change before the renderer hears about
        // the corresponding range, so a new subtree starts fetching its own
        // children immediately and a pruned one can never emit again.
        let dispatched = records.len();
        for record in records {
            match record {
                OpRecord::Removed { keys } => {
                    self.remove_run(&keys, mirror.as_mut(), cb);
                }
                OpRecord::Moved { key, to_index } => {
                    if let Some(mirror) = mirror.as_mut() {
                        let (from, to) = mirror.move_entry(key, to_index);
                        cb.item_moved(from, to);
                    }
                }
                OpRecord::Inserted { index, keys } => {
                    self.insert_run(index, &keys, mirror.as_mut(), cb);
                }
                OpRecord::Changed { index, old, fresh } => {
                    // Content change is structural replacement of the
                    // subtree: a remove-then-insert pair at the same flat
                    // location.
                    self.remove_run(&old, mirror.as_mut(), cb);
                    self.insert_run(index, &fresh, mirror.as_mut(), cb);
                }
            }
        }
        debug!(?parent, dispatched, "applied children update");
        true
    }

    fn remove_run(
        &mut self,
        keys: &[NodeKey],
        mirror: Option<&mut FlatMirror>,
        cb: &mut impl ListUpdateCallback,
    ) {
        for &key in keys {
            self.stop_observing_subtree(key);
        }
        if let Some(mirror) = mirror {
            let (start, count) = mirror.remove_run(keys);
            cb.range_removed(start, count);
        }
        for &key in keys {
            self.forest.remove_subtree(key);
        }
    }

    fn insert_run(
        &mut self,
        index: usize,
        keys: &[NodeKey],
        mirror: Option<&mut FlatMirror>,
        cb: &mut impl ListUpdateCallback,
    ) {
        for &key in keys {
            self.start_observing(key);
        }
        if let Some(mirror) = mirror {
            let entries: SmallVec<[(NodeKey, usize); 8]> = keys
                .iter()
                .map(|&key| (key, self.forest.total_size(key)))
                .collect();
            let (start, count) = mirror.insert_run(index, &entries);
            cb.range_inserted(start, count);
        }
    }
}
