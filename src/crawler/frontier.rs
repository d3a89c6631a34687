//! Deduplicating work frontier
//!
//! The frontier owns the pending queue, the visited set and the count of
//! tasks currently held by workers. All three live under one mutex:
//!
//! - `try_enqueue` checks and inserts into the visited set and pushes onto the
//!   queue in the same critical section, so two workers discovering the same
//!   identifier cannot both enqueue it.
//! - A task is marked in-flight when it is dequeued and released when its
//!   [`TaskLease`] drops, after the worker has enqueued its children. The
//!   frontier is drained only when the queue is empty and nothing is in
//!   flight, and that is checked under the lock right after the release.

use crate::crawler::task::{Task, TaskKey};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<Task>,
    visited: HashSet<TaskKey>,
    in_flight: usize,
    closed: bool,
}

impl FrontierState {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }
}

/// Work queue plus visited-identifier tracking for one run
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
}

/// A task checked out of the frontier
///
/// Dropping the lease marks the task finished. Children discovered while
/// processing it must be enqueued before the lease is dropped.
#[derive(Debug)]
pub struct TaskLease {
    task: Task,
    frontier: Arc<Frontier>,
}

impl TaskLease {
    pub fn task(&self) -> &Task {
        &self.task
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        self.frontier.release();
    }
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        // Poison is ignored: no mutation below can stop halfway
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueues a task unless its key has been seen before
    ///
    /// # Returns
    ///
    /// * `true` - The task was new and is now queued
    /// * `false` - The key was already visited, or the frontier is closed
    pub fn try_enqueue(&self, task: Task) -> bool {
        {
            let mut state = self.lock();
            if state.closed || !state.visited.insert(task.key()) {
                return false;
            }
            state.queue.push_back(task);
        }
        self.notify.notify_waiters();
        true
    }

    /// Waits for the next task
    ///
    /// # Returns
    ///
    /// * `Some(TaskLease)` - A task to process
    /// * `None` - The frontier is drained or closed
    pub async fn next_task(self: &Arc<Self>) -> Option<TaskLease> {
        loop {
            // Registered before inspecting the state so a notification sent
            // between the check and the await is not lost
            let notified = self.notify.notified();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(TaskLease {
                        task,
                        frontier: Arc::clone(self),
                    });
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            notified.await;
        }
    }

    fn release(&self) {
        let drained = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.is_drained()
        };
        if drained {
            tracing::debug!("Frontier drained");
            self.notify.notify_waiters();
        }
    }

    /// Resolves once no task is queued and none is in flight
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let state = self.lock();
                if state.is_drained() || state.closed {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Stops handing out tasks and refuses new ones
    ///
    /// Leases already held stay valid; their workers finish normally.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Returns true if no task is queued and none is in flight
    pub fn is_drained(&self) -> bool {
        self.lock().is_drained()
    }

    /// Returns true if the key was ever enqueued in this run
    pub fn is_visited(&self, key: &TaskKey) -> bool {
        self.lock().visited.contains(key)
    }

    /// Returns the number of queued tasks
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns the number of tasks currently held by workers
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Returns the number of distinct keys enqueued in this run
    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }
}
