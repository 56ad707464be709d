//! Hand-off queues between pipeline stages
//!
//! Unbounded FIFO queues that, unlike an mpsc channel, can be drained by any
//! holder of a handle. Barge-in relies on that: the turn manager empties the
//! downstream queues before the new turn's first item is pushed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, watch};

/// Monotonic turn identifier stamped on every queue item
pub type TurnId = u64;

/// Text flowing from the turn manager to synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextItem {
    pub turn: TurnId,
    pub kind: TextKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextKind {
    /// A sentence or clause of the reply
    Text(String),
    /// End of the turn's text
    EndOfTurn,
}

impl TextItem {
    #[must_use]
    pub fn text(turn: TurnId, text: impl Into<String>) -> Self {
        Self {
            turn,
            kind: TextKind::Text(text.into()),
        }
    }

    #[must_use]
    pub const fn end_of_turn(turn: TurnId) -> Self {
        Self {
            turn,
            kind: TextKind::EndOfTurn,
        }
    }
}

/// Audio flowing from synthesis to playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioItem {
    pub turn: TurnId,
    pub kind: AudioKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioKind {
    /// Signed 16-bit little-endian mono PCM
    Chunk(Vec<u8>),
    /// End of the turn's audio
    EndOfTurn,
}

impl AudioItem {
    #[must_use]
    pub const fn chunk(turn: TurnId, pcm: Vec<u8>) -> Self {
        Self {
            turn,
            kind: AudioKind::Chunk(pcm),
        }
    }

    #[must_use]
    pub const fn end_of_turn(turn: TurnId) -> Self {
        Self {
            turn,
            kind: AudioKind::EndOfTurn,
        }
    }
}

/// A transcribed, wake-word-gated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
}

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: AtomicBool,
}

/// Unbounded, drainable FIFO queue with an async pop
pub struct HandoffQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> HandoffQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock can't leave the deque half-updated
        self.inner
            .items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Append an item; ownership moves to the queue
    ///
    /// Items pushed after [`close`](Self::close) are dropped.
    pub fn push(&self, item: T) {
        if self.is_closed() {
            return;
        }
        self.items().push_back(item);
        self.inner.notify.notify_one();
    }

    /// Take the oldest item without waiting
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    /// Wait for the oldest item
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Remove every queued item, returning how many were discarded
    pub fn drain(&self) -> usize {
        let mut items = self.items();
        let count = items.len();
        items.clear();
        count
    }

    /// Remove every queued item, returning the newest
    pub fn drain_latest(&self) -> Option<T> {
        let mut items = self.items();
        let latest = items.pop_back();
        items.clear();
        latest
    }

    /// Keep only the items matching `keep`, returning how many were removed
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut items = self.items();
        let before = items.len();
        items.retain(|item| keep(item));
        before - items.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Stop accepting items and wake any waiting consumer
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        // notify_waiters doesn't store a permit; cover a consumer between checks
        self.inner.notify.notify_one();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// The queues and signals connecting the stages
#[derive(Debug, Clone)]
pub struct PipelineQueues {
    pub intake: HandoffQueue<Utterance>,
    pub text: HandoffQueue<TextItem>,
    pub audio: HandoffQueue<AudioItem>,
    /// Current turn; bumped on every interrupt
    pub epoch: watch::Sender<TurnId>,
}

impl Default for PipelineQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineQueues {
    #[must_use]
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            intake: HandoffQueue::new(),
            text: HandoffQueue::new(),
            audio: HandoffQueue::new(),
            epoch,
        }
    }

    /// The turn currently allowed to produce output
    #[must_use]
    pub fn current_turn(&self) -> TurnId {
        *self.epoch.borrow()
    }

    /// Close every queue so blocked consumers return
    pub fn close_all(&self) {
        self.intake.close();
        self.text.close();
        self.audio.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let queue = HandoffQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.pop().await, Some(3));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = HandoffQueue::new();
        let producer = queue.clone();

        let consumer = tokio::spawn(async move { queue.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.push("late");

        assert_eq!(consumer.await.unwrap(), Some("late"));
    }

    #[tokio::test]
    async fn close_wakes_consumer() {
        let queue: HandoffQueue<u8> = HandoffQueue::new();
        let closer = queue.clone();

        let consumer = tokio::spawn(async move { queue.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        closer.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, None);

        closer.push(1);
        assert!(closer.is_empty());
    }

    #[test]
    fn drain_counts_and_latest() {
        let queue = HandoffQueue::new();
        for i in 0..4 {
            queue.push(i);
        }
        assert_eq!(queue.drain(), 4);
        assert_eq!(queue.drain(), 0);

        for i in 0..3 {
            queue.push(i);
        }
        assert_eq!(queue.drain_latest(), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn retain_removes_older_turns() {
        let queue = HandoffQueue::new();
        queue.push(AudioItem::chunk(1, vec![1]));
        queue.push(AudioItem::chunk(2, vec![2]));
        queue.push(AudioItem::end_of_turn(1));

        assert_eq!(queue.retain(|item| item.turn >= 2), 2);
        assert_eq!(queue.try_pop(), Some(AudioItem::chunk(2, vec![2])));
        assert!(queue.is_empty());
    }

    #[test]
    fn closed_queue_still_yields_remaining_items() {
        let queue = HandoffQueue::new();
        queue.push("first");
        queue.close();
        assert!(queue.is_closed());

        assert_eq!(tokio_test::block_on(queue.pop()), Some("first"));
        assert_eq!(tokio_test::block_on(queue.pop()), None);
    }

    #[test]
    fn epoch_starts_at_zero() {
        let queues = PipelineQueues::new();
        assert_eq!(queues.current_turn(), 0);
        queues.epoch.send_replace(3);
        assert_eq!(queues.current_turn(), 3);
    }
}
