//! Per-arc runner scheduler: at most one active agent run per [`SteeringKey`]
//! at a time. Additional messages for the same key are absorbed as mid-flight
//! context, queued as the next command, or compacted away.
//!
//! Grounded on the same `DashMap<Key, State>` + single-consumer shape used
//! throughout the channel and scheduler layers, generalised here into an
//! explicit per-key queue with a replaceable wake function rather than a
//! bounded mpsc channel, because `waitForNewItem`'s "replace cancels the
//! previous timer" semantics don't map cleanly onto a channel receiver.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::types::{RoomMessage, SteeringKey, WorkKind, WorkOutcome};

/// One message awaiting processing within a session.
pub struct QueuedWorkItem {
    pub message: RoomMessage,
    pub kind: WorkKind,
    /// Trigger id for command items; irrelevant for passives.
    pub trigger_id: Option<String>,
    settle: Option<oneshot::Sender<WorkOutcome>>,
}

impl QueuedWorkItem {
    fn settle(&mut self, outcome: WorkOutcome) {
        if let Some(tx) = self.settle.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// A completion signal the enqueueing caller awaits.
pub struct WorkHandle {
    pub key: SteeringKey,
    rx: oneshot::Receiver<WorkOutcome>,
}

impl WorkHandle {
    pub async fn wait(self) -> WorkOutcome {
        self.rx.await.unwrap_or_else(|_| WorkOutcome::Retry)
    }
}

/// Per-key session state: an ordered queue plus at most one wake function.
#[derive(Default)]
struct SessionState {
    queue: VecDeque<QueuedWorkItem>,
    wake: Option<oneshot::Sender<()>>,
}

/// Result of [`SteeringQueue::enqueue_command`].
pub struct EnqueueCommandResult {
    pub is_runner: bool,
    pub key: SteeringKey,
    pub handle: WorkHandle,
}

/// Result of [`SteeringQueue::enqueue_passive`].
pub struct EnqueuePassiveResult {
    pub queued: bool,
    pub is_proactive_runner: bool,
    pub key: SteeringKey,
    pub handle: Option<WorkHandle>,
}

/// Either a drained-as-context message or a settle signal for the next
/// command to process, returned by [`SteeringQueue::take_next_work_compacted`].
pub struct CompactedWork {
    /// Passives dropped ahead of the next command (already settled).
    pub dropped: u32,
    /// The next item to actually process, if any remains.
    pub next: Option<QueuedWorkItem>,
}

/// Scheduler enforcing at-most-one active agent run per [`SteeringKey`].
pub struct SteeringQueue {
    sessions: DashMap<SteeringKey, SessionState>,
}

impl Default for SteeringQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SteeringQueue {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// `true` iff a live session exists for `key` — exposed for the
    /// "at most one session per key" invariant check in tests.
    pub fn has_session(&self, key: &SteeringKey) -> bool {
        self.sessions.contains_key(key)
    }

    pub fn enqueue_command(
        &self,
        message: RoomMessage,
        trigger_id: String,
    ) -> EnqueueCommandResult {
        let key = SteeringKey::for_message(&message);
        let (tx, rx) = oneshot::channel();
        let item = QueuedWorkItem {
            message,
            kind: WorkKind::Command,
            trigger_id: Some(trigger_id),
            settle: Some(tx),
        };

        // `is_runner` must be decided inside the same entry guard that
        // inserts the item — checking `contains_key` beforehand lets two
        // concurrent first-enqueues for the same key both see "no session"
        // and both claim to be the runner.
        let is_runner = match self.sessions.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) => {
                let state = occ.get_mut();
                state.queue.push_back(item);
                if let Some(wake) = state.wake.take() {
                    let _ = wake.send(());
                }
                false
            }
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                let mut state = SessionState::default();
                state.queue.push_back(item);
                vac.insert(state);
                true
            }
        };

        EnqueueCommandResult {
            is_runner,
            key: key.clone(),
            handle: WorkHandle { key, rx },
        }
    }

    pub fn enqueue_passive(
        &self,
        message: RoomMessage,
        start_proactive: bool,
    ) -> EnqueuePassiveResult {
        let key = SteeringKey::for_message(&message);

        match self.sessions.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occ) => {
                let (tx, rx) = oneshot::channel();
                let item = QueuedWorkItem {
                    message,
                    kind: WorkKind::Passive,
                    trigger_id: None,
                    settle: Some(tx),
                };
                let state = occ.get_mut();
                state.queue.push_back(item);
                if let Some(wake) = state.wake.take() {
                    let _ = wake.send(());
                }
                EnqueuePassiveResult {
                    queued: true,
                    is_proactive_runner: false,
                    key: key.clone(),
                    handle: Some(WorkHandle { key, rx }),
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vac) => {
                if !start_proactive {
                    return EnqueuePassiveResult {
                        queued: false,
                        is_proactive_runner: false,
                        key,
                        handle: None,
                    };
                }

                let (tx, rx) = oneshot::channel();
                let item = QueuedWorkItem {
                    message,
                    kind: WorkKind::Passive,
                    trigger_id: None,
                    settle: Some(tx),
                };
                let mut state = SessionState::default();
                state.queue.push_back(item);
                vac.insert(state);

                EnqueuePassiveResult {
                    queued: true,
                    is_proactive_runner: true,
                    key: key.clone(),
                    handle: Some(WorkHandle { key, rx }),
                }
            }
        }
    }

    /// Drain all pending items as context messages, finishing each with no
    /// reply. Used by the runner between turns.
    pub fn drain_steering_context(&self, key: &SteeringKey) -> Vec<String> {
        let mut rendered = Vec::new();
        if let Some(mut entry) = self.sessions.get_mut(key) {
            while let Some(mut item) = entry.queue.pop_front() {
                rendered.push(format!("{}: {}", item.message.nick, item.message.content));
                item.settle(WorkOutcome::Finished);
            }
        }
        rendered
    }

    /// Wait for a new item to arrive, or for `timeout_ms` to elapse.
    /// Resolves immediately if the queue is already non-empty. Installing a
    /// new wake replaces (and thus cancels) any previous one.
    pub async fn wait_for_new_item(&self, key: &SteeringKey, timeout_ms: u64) -> WaitOutcome {
        let rx = {
            let mut entry = self.sessions.entry(key.clone()).or_default();
            if !entry.queue.is_empty() {
                return WaitOutcome::Woken;
            }
            let (tx, rx) = oneshot::channel();
            entry.wake = Some(tx);
            rx
        };

        match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(())) => WaitOutcome::Woken,
            Ok(Err(_)) => WaitOutcome::Timeout,
            Err(_) => WaitOutcome::Timeout,
        }
    }

    /// Scan for the first queued command, dropping (and finishing as
    /// no-reply) any passives ahead of it. If no command exists, compact
    /// down to the last passive and drop the rest.
    pub fn take_next_work_compacted(&self, key: &SteeringKey) -> CompactedWork {
        let mut dropped = 0u32;
        let mut entry = match self.sessions.get_mut(key) {
            Some(e) => e,
            None => return CompactedWork { dropped: 0, next: None },
        };

        let first_command_pos = entry
            .queue
            .iter()
            .position(|item| item.kind == WorkKind::Command);

        let next = if let Some(pos) = first_command_pos {
            for _ in 0..pos {
                if let Some(mut item) = entry.queue.pop_front() {
                    item.settle(WorkOutcome::Finished);
                    dropped += 1;
                }
            }
            entry.queue.pop_front()
        } else if !entry.queue.is_empty() {
            // Passive compaction: keep only the last.
            let last = entry.queue.pop_back();
            while let Some(mut item) = entry.queue.pop_front() {
                item.settle(WorkOutcome::Finished);
                dropped += 1;
            }
            last
        } else {
            None
        };

        if entry.queue.is_empty() && next.is_none() {
            drop(entry);
            self.sessions.remove(key);
        }

        CompactedWork { dropped, next }
    }

    /// Iteratively process all queued items via `process`, finishing each.
    pub async fn drain_session<F, Fut>(&self, key: &SteeringKey, mut process: F)
    where
        F: FnMut(RoomMessage, WorkKind) -> Fut,
        Fut: std::future::Future<Output = WorkOutcome>,
    {
        loop {
            let compacted = self.take_next_work_compacted(key);
            let Some(mut item) = compacted.next else { break };
            let outcome = process(item.message.clone(), item.kind).await;
            item.settle(outcome);
        }
    }

    /// Success path: remove the session, finish remaining passives with no
    /// reply, and fail remaining commands with the retry sentinel so their
    /// callers re-enter as new runners.
    pub fn release_session(&self, key: &SteeringKey) {
        if let Some((_, mut state)) = self.sessions.remove(key) {
            while let Some(mut item) = state.queue.pop_front() {
                match item.kind {
                    WorkKind::Passive => item.settle(WorkOutcome::Finished),
                    WorkKind::Command => item.settle(WorkOutcome::Retry),
                }
            }
            debug!(%key, "session released");
        }
    }

    /// Failure path: remove the session and fail every queued item with the
    /// supplied error.
    pub fn abort_session(&self, key: &SteeringKey, error: impl Into<String> + Clone) {
        if let Some((_, mut state)) = self.sessions.remove(key) {
            while let Some(mut item) = state.queue.pop_front() {
                item.settle(WorkOutcome::Failed(error.clone().into()));
            }
            debug!(%key, "session aborted");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Woken,
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(nick: &str, content: &str) -> RoomMessage {
        RoomMessage {
            server_tag: "irc".to_string(),
            channel_name: "test".to_string(),
            nick: nick.to_string(),
            mynick: "muaddib".to_string(),
            content: content.to_string(),
            platform_id: None,
            thread_id: None,
            thread_starter_id: None,
            secrets: Default::default(),
        }
    }

    #[test]
    fn at_most_one_session_per_key() {
        let q = SteeringQueue::new();
        let r1 = q.enqueue_command(msg("alice", "!s hi"), "!s".to_string());
        assert!(r1.is_runner);
        let r2 = q.enqueue_command(msg("alice", "!s again"), "!s".to_string());
        assert!(!r2.is_runner);
        assert_eq!(q.sessions.len(), 1);
    }

    #[tokio::test]
    async fn release_session_fails_commands_with_retry_and_succeeds_passives() {
        let q = SteeringQueue::new();
        let r1 = q.enqueue_command(msg("alice", "!s hi"), "!s".to_string());
        let passive = q.enqueue_passive(msg("bob", "lol"), false);
        assert!(passive.queued);
        let cmd2 = q.enqueue_command(msg("alice", "!s second"), "!s".to_string());

        q.release_session(&r1.key);

        let passive_outcome = passive.handle.unwrap().wait().await;
        assert!(matches!(passive_outcome, WorkOutcome::Finished));
        let cmd2_outcome = cmd2.handle.wait().await;
        assert!(matches!(cmd2_outcome, WorkOutcome::Retry));
        assert!(!q.has_session(&r1.key));
    }

    #[tokio::test]
    async fn passive_compaction_keeps_only_last_when_no_command() {
        let q = SteeringQueue::new();
        let r1 = q.enqueue_command(msg("alice", "!s hi"), "!s".to_string());
        let p1 = q.enqueue_passive(msg("bob", "one"), false);
        let p2 = q.enqueue_passive(msg("bob", "two"), false);
        let p3 = q.enqueue_passive(msg("bob", "three"), false);

        // Simulate runner draining its own first command, leaving only passives.
        let taken = q.take_next_work_compacted(&r1.key);
        assert!(matches!(taken.next.unwrap().kind, WorkKind::Command));

        let compacted = q.take_next_work_compacted(&r1.key);
        assert_eq!(compacted.dropped, 2);
        assert!(compacted.next.is_some());

        assert!(matches!(p1.handle.unwrap().wait().await, WorkOutcome::Finished));
        assert!(matches!(p2.handle.unwrap().wait().await, WorkOutcome::Finished));
        // p3 was the surviving `next` — never settled by take_next_work_compacted,
        // the caller (runner) is responsible for finishing it.
        drop(p3);
    }

    #[tokio::test]
    async fn wait_for_new_item_resolves_immediately_if_queue_nonempty() {
        let q = SteeringQueue::new();
        let key = SteeringKey { arc: "irc#test".into(), subject_nick: Some("alice".into()), thread_id: None };
        q.enqueue_passive(msg("alice", "hi"), true);
        let outcome = q.wait_for_new_item(&key, 50).await;
        assert_eq!(outcome, WaitOutcome::Woken);
    }

    #[tokio::test]
    async fn wait_for_new_item_times_out_on_empty_queue() {
        let q = SteeringQueue::new();
        let key = SteeringKey { arc: "irc#empty".into(), subject_nick: Some("nobody".into()), thread_id: None };
        let outcome = q.wait_for_new_item(&key, 20).await;
        assert_eq!(outcome, WaitOutcome::Timeout);
    }
}
