use std::pin::pin;

use futures::{Stream, StreamExt};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::node::NodeKey;

/// One child-list delivery, marshaled onto the owner context through the
/// emission funnel.
pub(crate) struct Emission<T> {
    pub(crate) key: NodeKey,
    pub(crate) generation: u64,
    pub(crate) children: Vec<T>,
}

pub(crate) type EmissionSender<T> = mpsc::UnboundedSender<Emission<T>>;
pub(crate) type EmissionReceiver<T> = mpsc::UnboundedReceiver<Emission<T>>;

pub(crate) fn emission_channel<T>() -> (EmissionSender<T>, EmissionReceiver<T>) {
    mpsc::unbounded_channel()
}

struct Subscription {
    generation: u64,
    task: JoinHandle<()>,
}

/// Per-node subscription registry: {unsubscribed -> subscribed ->
/// (emission)* -> unsubscribed}.
///
/// Each subscribed node owns a forwarding task that pushes generation-
/// stamped emissions into the funnel. Stopping aborts the task; an emission
/// already queued when its node was stopped fails the [`Self::accepts`]
/// check and is discarded, which makes cancellation a hard guarantee rather
/// than best-effort.
pub(crate) struct SubscriptionRegistry {
    subs: FxHashMap<NodeKey, Subscription>,
    next_generation: u64,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            subs: FxHashMap::default(),
            next_generation: 0,
        }
    }

    /// Subscribes a node, spawning its forwarding task.
    ///
    /// Must run inside a tokio runtime context. The node must not already
    /// be subscribed.
    pub(crate) fn start<T, E, S>(&mut self, key: NodeKey, stream: S, tx: EmissionSender<T>)
    where
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
        S: Stream<Item = Result<Vec<T>, E>> + Send + 'static,
    {
        let generation = self.next_generation;
        self.next_generation += 1;
        let task = tokio::spawn(async move {
            let mut stream = pin!(stream);
            while let Some(result) = stream.next().await {
                match result {
                    Ok(children) => {
                        if tx
                            .send(Emission {
                                key,
                                generation,
                                children,
                            })
                            .is_err()
                        {
                            // Owner gone; nothing left to deliver to.
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(?key, %error, "child stream failed; keeping current children");
                    }
                }
            }
        });
        let previous = self.subs.insert(key, Subscription { generation, task });
        debug_assert!(previous.is_none(), "node subscribed twice");
        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    /// Unsubscribes a node: aborts its forwarding task and invalidates its
    /// generation.
    pub(crate) fn stop(&mut self, key: NodeKey) {
        if let Some(subscription) = self.subs.remove(&key) {
            subscription.task.abort();
        }
    }

    /// Whether an emission with this stamp is still current for the node.
    pub(crate) fn accepts(&self, key: NodeKey, generation: u64) -> bool {
        self.subs
            .get(&key)
            .is_some_and(|subscription| subscription.generation == generation)
    }

    pub(crate) fn stop_all(&mut self) {
        for (_, subscription) in self.subs.drain() {
            subscription.task.abort();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subs.len()
    }

    pub(crate) fn is_subscribed(&self, key: NodeKey) -> bool {
        self.subs.contains_key(&key)
    }

    #[cfg(test)]
    pub(crate) fn generation_of(&self, key: NodeKey) -> Option<u64> {
        self.subs.get(&key).map(|subscription| subscription.generation)
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
