//! Shared queue of pending export nodes.
//!
//! Workers pull nodes until the queue is drained (every pushed node has been
//! completed and nothing new was pushed) or the run is aborted. Page ids are
//! deduplicated at push time so a page reachable twice is exported once.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashSet;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::page::ExportNode;

/// Unbounded multi-consumer node queue with drain detection.
#[derive(Debug)]
pub struct NodeQueue {
    sender: mpsc::UnboundedSender<ExportNode>,
    receiver: Mutex<mpsc::UnboundedReceiver<ExportNode>>,
    outstanding: AtomicUsize,
    drained: CancellationToken,
    seen: DashSet<String>,
}

impl Default for NodeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            outstanding: AtomicUsize::new(0),
            drained: CancellationToken::new(),
            seen: DashSet::new(),
        }
    }

    /// Enqueues `node` unless its page was already seen. Returns whether it was added.
    pub fn push(&self, node: ExportNode) -> bool {
        if !self.seen.insert(node.page_id.clone()) {
            trace!(page_id = %node.page_id, "page already queued");
            return false;
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(node).is_err() {
            self.complete();
            return false;
        }
        true
    }

    /// Marks a page id as seen without queueing it. Returns false if it already was.
    pub fn mark_seen(&self, page_id: &str) -> bool {
        self.seen.insert(page_id.to_string())
    }

    /// Marks one pulled node as finished.
    ///
    /// Children must be pushed before their parent is completed, otherwise
    /// the queue could report itself drained too early.
    pub fn complete(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.cancel();
        }
    }

    /// Signals drain right away when nothing was ever pushed.
    pub fn close_if_idle(&self) {
        if self.outstanding.load(Ordering::SeqCst) == 0 {
            self.drained.cancel();
        }
    }

    /// Nodes pushed but not yet completed.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Waits for the next node.
    ///
    /// Returns `None` once the queue is drained or `abort` is cancelled.
    pub async fn next(&self, abort: &CancellationToken) -> Option<ExportNode> {
        let mut receiver = tokio::select! {
            biased;
            () = abort.cancelled() => return None,
            () = self.drained.cancelled() => return None,
            guard = self.receiver.lock() => guard,
        };
        tokio::select! {
            biased;
            () = abort.cancelled() => None,
            () = self.drained.cancelled() => None,
            node = receiver.recv() => node,
        }
    }

    /// Removes and returns every node still waiting, for reporting after an abort.
    pub async fn drain_remaining(&self) -> Vec<ExportNode> {
        let mut receiver = self.receiver.lock().await;
        let mut remaining = Vec::new();
        while let Ok(node) = receiver.try_recv() {
            remaining.push(node);
        }
        remaining
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_push_deduplicates_page_ids() {
        let queue = NodeQueue::new();
        assert!(queue.push(ExportNode::root("1")));
        assert!(!queue.push(ExportNode::root("1")));
        assert_eq!(queue.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_next_returns_none_once_drained() {
        let queue = NodeQueue::new();
        let abort = CancellationToken::new();
        queue.push(ExportNode::root("1"));

        let node = queue.next(&abort).await.unwrap();
        assert_eq!(node.page_id, "1");
        queue.complete();

        let next = tokio::time::timeout(Duration::from_secs(1), queue.next(&abort)).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_idle_queue_closes_immediately() {
        let queue = NodeQueue::new();
        queue.close_if_idle();
        assert!(queue.next(&CancellationToken::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_waiting_worker_sees_child_pushed_before_parent_completes() {
        let queue = Arc::new(NodeQueue::new());
        let abort = CancellationToken::new();
        queue.push(ExportNode::root("1"));
        let _root = queue.next(&abort).await.unwrap();

        let waiter = {
            let queue = Arc::clone(&queue);
            let abort = abort.clone();
            tokio::spawn(async move { queue.next(&abort).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(ExportNode::root("2"));
        queue.complete();

        assert_eq!(waiter.await.unwrap().unwrap().page_id, "2");
    }

    #[tokio::test]
    async fn test_abort_stops_dispatch_and_leaves_nodes_for_drain() {
        let queue = NodeQueue::new();
        let abort = CancellationToken::new();
        queue.push(ExportNode::root("1"));
        queue.push(ExportNode::root("2"));
        abort.cancel();

        assert!(queue.next(&abort).await.is_none());
        let remaining = queue.drain_remaining().await;
        assert_eq!(remaining.len(), 2);
    }
}
