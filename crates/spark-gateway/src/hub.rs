use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Payloads a viewer may have queued before further broadcasts to it are
/// dropped. A viewer this far behind is not reading its socket.
pub const VIEWER_QUEUE_CAPACITY: usize = 256;

type ViewerSet = HashMap<Uuid, mpsc::Sender<Bytes>>;

/// Outbound half of one live viewer connection.
///
/// The matching receiver yields every payload broadcast to the conversation
/// the handle joined, and returns `None` once the handle has left the hub.
pub struct ViewerHandle {
    id: Uuid,
    tx: mpsc::Sender<Bytes>,
}

impl ViewerHandle {
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(VIEWER_QUEUE_CAPACITY);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Registry of live viewers per conversation.
///
/// Entries exist only while a conversation has at least one viewer. Each
/// conversation lives in one map shard, so join/leave/broadcast on one
/// conversation never wait on activity in unrelated shards.
#[derive(Clone, Default)]
pub struct Hub {
    conversations: Arc<DashMap<Uuid, ViewerSet>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, conversation_id: Uuid, viewer: ViewerHandle) {
        let mut viewers = self.conversations.entry(conversation_id).or_default();
        viewers.insert(viewer.id, viewer.tx);
        debug!(
            "Viewer {} joined conversation {} ({} live)",
            viewer.id,
            conversation_id,
            viewers.len()
        );
    }

    /// Remove a viewer. Dropping its sender closes the viewer's receiver,
    /// which is what ends the connection's send loop. Returns whether the
    /// viewer was registered.
    pub fn leave(&self, conversation_id: Uuid, viewer_id: Uuid) -> bool {
        let Entry::Occupied(mut entry) = self.conversations.entry(conversation_id) else {
            return false;
        };

        let removed = entry.get_mut().remove(&viewer_id).is_some();
        if entry.get().is_empty() {
            entry.remove();
        }

        if removed {
            debug!("Viewer {} left conversation {}", viewer_id, conversation_id);
        }
        removed
    }

    /// Best-effort fan-out to every viewer of `conversation_id`.
    /// Never waits: a viewer whose queue is full or closed misses the payload.
    /// Returns the number of viewers the payload was queued for.
    pub fn broadcast(&self, conversation_id: Uuid, payload: Bytes) -> usize {
        let Some(viewers) = self.conversations.get(&conversation_id) else {
            trace!("No live viewers for conversation {}", conversation_id);
            return 0;
        };

        let mut delivered = 0;
        for (viewer_id, tx) in viewers.iter() {
            match tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => warn!(
                    "Dropping payload for viewer {} in conversation {}: queue full",
                    viewer_id, conversation_id
                ),
                Err(TrySendError::Closed(_)) => warn!(
                    "Dropping payload for viewer {} in conversation {}: connection closed",
                    viewer_id, conversation_id
                ),
            }
        }
        delivered
    }

    /// Number of conversations with at least one live viewer.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    pub fn viewer_count(&self, conversation_id: Uuid) -> usize {
        self.conversations
            .get(&conversation_id)
            .map_or(0, |viewers| viewers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_follows_membership() {
        let hub = Hub::new();
        let conv = Uuid::new_v4();
        let (h1, mut rx1) = ViewerHandle::channel();
        let (h2, mut rx2) = ViewerHandle::channel();
        let id1 = h1.id();
        let id2 = h2.id();

        hub.join(conv, h1);
        hub.join(conv, h2);
        assert_eq!(hub.broadcast(conv, Bytes::from_static(b"m")), 2);
        assert_eq!(rx1.try_recv().unwrap(), Bytes::from_static(b"m"));
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"m"));

        assert!(hub.leave(conv, id1));
        assert_eq!(hub.broadcast(conv, Bytes::from_static(b"m2")), 1);
        assert_eq!(rx2.try_recv().unwrap(), Bytes::from_static(b"m2"));
        // h1's sender was dropped on leave, so its stream is closed
        assert!(matches!(
            rx1.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        assert!(hub.leave(conv, id2));
        assert_eq!(hub.conversation_count(), 0);
        assert_eq!(hub.viewer_count(conv), 0);
    }

    #[test]
    fn conversations_are_isolated() {
        let hub = Hub::new();
        let (a, mut rx_a) = ViewerHandle::channel();
        let (b, mut rx_b) = ViewerHandle::channel();
        let conv_a = Uuid::new_v4();
        let conv_b = Uuid::new_v4();
        hub.join(conv_a, a);
        hub.join(conv_b, b);

        hub.broadcast(conv_a, Bytes::from_static(b"for a"));
        assert_eq!(rx_a.try_recv().unwrap(), Bytes::from_static(b"for a"));
        assert!(rx_b.try_recv().is_err());
        assert_eq!(hub.conversation_count(), 2);
    }

    #[test]
    fn closed_viewer_does_not_block_others() {
        let hub = Hub::new();
        let conv = Uuid::new_v4();
        let (dead, dead_rx) = ViewerHandle::channel();
        let (live, mut live_rx) = ViewerHandle::channel();
        hub.join(conv, dead);
        hub.join(conv, live);
        drop(dead_rx);

        assert_eq!(hub.broadcast(conv, Bytes::from_static(b"x")), 1);
        assert_eq!(live_rx.try_recv().unwrap(), Bytes::from_static(b"x"));
    }

    #[test]
    fn leave_of_unknown_viewer_is_a_no_op() {
        let hub = Hub::new();
        assert!(!hub.leave(Uuid::new_v4(), Uuid::new_v4()));
        assert_eq!(hub.broadcast(Uuid::new_v4(), Bytes::new()), 0);
    }

    #[test]
    fn payloads_arrive_in_broadcast_order() {
        let hub = Hub::new();
        let conv = Uuid::new_v4();
        let (viewer, mut rx) = ViewerHandle::channel();
        hub.join(conv, viewer);

        for i in 0..100u32 {
            hub.broadcast(conv, Bytes::from(i.to_string()));
        }
        for i in 0..100u32 {
            assert_eq!(rx.try_recv().unwrap(), Bytes::from(i.to_string()));
        }
    }

    #[test]
    fn stalled_viewer_stops_accepting_past_its_queue() {
        let hub = Hub::new();
        let conv = Uuid::new_v4();
        let (stalled, mut stalled_rx) = ViewerHandle::channel();
        let (live, mut live_rx) = ViewerHandle::channel();
        hub.join(conv, stalled);
        hub.join(conv, live);

        let mut queued_for_stalled = 0;
        for i in 0..VIEWER_QUEUE_CAPACITY * 4 {
            let delivered = hub.broadcast(conv, Bytes::from(vec![0u8; 1024]));
            queued_for_stalled += delivered.saturating_sub(1);
            // the live viewer keeps draining and never misses a payload
            assert!(live_rx.try_recv().is_ok(), "live viewer missed payload {}", i);
        }
        assert_eq!(queued_for_stalled, VIEWER_QUEUE_CAPACITY);

        let mut backlog = 0;
        while stalled_rx.try_recv().is_ok() {
            backlog += 1;
        }
        assert_eq!(backlog, VIEWER_QUEUE_CAPACITY);

        // once drained, the viewer receives again
        assert_eq!(hub.broadcast(conv, Bytes::from_static(b"again")), 2);
        assert_eq!(stalled_rx.try_recv().unwrap(), Bytes::from_static(b"again"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_join_leave_leaves_no_empty_entries() {
        let hub = Hub::new();
        let conversations: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();

        let mut tasks = Vec::new();
        for n in 0..64 {
            let hub = hub.clone();
            let conv = conversations[n % conversations.len()];
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (viewer, _rx) = ViewerHandle::channel();
                    let id = viewer.id();
                    hub.join(conv, viewer);
                    hub.broadcast(conv, Bytes::from_static(b"ping"));
                    tokio::task::yield_now().await;
                    assert!(hub.leave(conv, id));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(hub.conversation_count(), 0);
    }
}
