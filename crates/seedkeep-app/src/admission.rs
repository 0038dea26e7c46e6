//! Admission control over the shared pool of download slots.
//!
//! # Design
//! - A task either takes a slot immediately or waits in a FIFO queue behind a one-shot signal.
//! - Releasing a slot wakes waiters in submission order while capacity allows; with a
//!   per-requester cap the first waiter whose requester is under the cap goes next.
//! - A waiter whose ticket was dropped is skipped; it never becomes active.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use seedkeep_config::AdmissionConfig;
use seedkeep_torrent_core::{RequesterId, TaskId};
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome of an admission check.
#[derive(Debug)]
pub enum Admission {
    /// A slot was free; the task is active.
    Immediate,
    /// The pool is full; the task waits for the ticket to fire.
    Queued(AdmissionTicket),
}

impl Admission {
    /// Whether the task must wait for a slot.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Queue position of a waiting task.
#[derive(Debug)]
pub struct AdmissionTicket {
    task_id: TaskId,
    receiver: oneshot::Receiver<()>,
}

impl AdmissionTicket {
    /// Task the ticket belongs to.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait for the slot; `false` when the controller dropped the waiter instead.
    pub async fn released(self) -> bool {
        self.receiver.await.is_ok()
    }
}

struct Waiter {
    task_id: TaskId,
    requester: RequesterId,
    sender: oneshot::Sender<()>,
}

#[derive(Default)]
struct Slots {
    active: HashMap<TaskId, RequesterId>,
    waiters: VecDeque<Waiter>,
}

impl Slots {
    fn has_capacity(&self, limits: AdmissionConfig, requester: RequesterId) -> bool {
        let global = limits.max_active.is_none_or(|max| self.active.len() < max);
        let own = limits.per_requester.is_none_or(|cap| {
            self.active
                .values()
                .filter(|owner| **owner == requester)
                .count()
                < cap
        });
        global && own
    }

    fn release_waiters(&mut self, limits: AdmissionConfig) {
        while limits.max_active.is_none_or(|max| self.active.len() < max) {
            let Some(index) = self
                .waiters
                .iter()
                .position(|waiter| self.has_capacity(limits, waiter.requester))
            else {
                return;
            };
            let Some(waiter) = self.waiters.remove(index) else {
                return;
            };
            if waiter.sender.send(()).is_ok() {
                debug!(task_id = %waiter.task_id, "admission slot handed to waiter");
                self.active.insert(waiter.task_id, waiter.requester);
            } else {
                debug!(task_id = %waiter.task_id, "skipping abandoned admission waiter");
            }
        }
    }
}

/// Gatekeeper for concurrently active tasks.
pub struct AdmissionController {
    limits: AdmissionConfig,
    slots: Mutex<Slots>,
}

impl AdmissionController {
    /// Controller enforcing `limits`.
    #[must_use]
    pub fn new(limits: AdmissionConfig) -> Self {
        Self {
            limits,
            slots: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot for `task_id` or join the queue.
    pub fn check(&self, task_id: TaskId, requester: RequesterId) -> Admission {
        let mut slots = self.slots();
        if slots.active.contains_key(&task_id) {
            return Admission::Immediate;
        }
        if slots.has_capacity(self.limits, requester) {
            slots.active.insert(task_id, requester);
            return Admission::Immediate;
        }
        let (sender, receiver) = oneshot::channel();
        slots.waiters.push_back(Waiter {
            task_id,
            requester,
            sender,
        });
        debug!(task_id = %task_id, position = slots.waiters.len(), "task queued for admission");
        Admission::Queued(AdmissionTicket { task_id, receiver })
    }

    /// Free the slot held by `task_id` and hand freed capacity to waiters.
    ///
    /// Releasing a task that holds no slot only re-evaluates the queue.
    pub fn release(&self, task_id: TaskId) {
        let mut slots = self.slots();
        slots.active.remove(&task_id);
        slots.release_waiters(self.limits);
    }

    /// Withdraw `task_id` from the queue, or free its slot if it was already released.
    pub fn cancel(&self, task_id: TaskId) {
        let mut slots = self.slots();
        let before = slots.waiters.len();
        slots.waiters.retain(|waiter| waiter.task_id != task_id);
        if slots.waiters.len() == before {
            slots.active.remove(&task_id);
        }
        slots.release_waiters(self.limits);
    }

    /// Whether `task_id` currently holds a slot.
    #[must_use]
    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.slots().active.contains_key(&task_id)
    }

    /// Number of tasks holding a slot.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots().active.len()
    }

    /// Number of tasks waiting for a slot.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.slots().waiters.len()
    }
}
