// Copyright (C) 2024 The avctl-runtime Authors.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-(source, sink) queue state, owned exclusively by the processor actor.
//!
//! Nothing in this module is reachable from outside the actor loop; all of
//! it lives behind `Processor::queues` and is only ever touched from the
//! single task that owns a [`crate::processor::TaskProcessor`].

use std::collections::VecDeque;

/// Behavioural flags a queue is registered with, mirroring the C
/// `guint32 flags` bitset directly rather than introducing a builder for a
/// two-bit configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueueFlags(u32);

impl TaskQueueFlags {
    pub const NONE: TaskQueueFlags = TaskQueueFlags(0);
    /// Start processing the first task as soon as it's added, without
    /// waiting for an explicit `queue_start`.
    pub const AUTO_START: TaskQueueFlags = TaskQueueFlags(1 << 0);
    /// Once the queue drains and has no current task, remove it
    /// automatically instead of leaving it registered but idle.
    pub const AUTO_REMOVE: TaskQueueFlags = TaskQueueFlags(1 << 1);

    pub fn contains(self, other: TaskQueueFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TaskQueueFlags {
    type Output = TaskQueueFlags;
    fn bitor(self, rhs: TaskQueueFlags) -> TaskQueueFlags {
        TaskQueueFlags(self.0 | rhs.0)
    }
}

impl Default for TaskQueueFlags {
    fn default() -> Self {
        TaskQueueFlags::NONE
    }
}

/// Called to begin processing a task the queue has just made current.
pub type ProcessCb<T> = Box<dyn FnMut(&T) + Send>;
/// Called when a current task is cancelled while in flight.
pub type CancelCb<T> = Box<dyn FnMut(&T) + Send>;
/// Called exactly once per task, when it is removed from its queue for any
/// reason (completion, cancellation, bulk removal, or shutdown).
pub type DeleteCb<T> = Box<dyn FnMut(T) + Send>;
/// Called exactly once, after a queue has been fully quiesced and removed.
/// `cancelled` is `true` if the queue was disposed via a cancellation path
/// (explicit cancel, bulk removal, or shutdown) rather than by draining
/// normally.
pub type FinallyCb = Box<dyn FnOnce(bool) + Send>;

/// The live state of one registered queue.
pub(crate) struct QueueState<T: Send + 'static> {
    pub(crate) flags: TaskQueueFlags,
    pub(crate) pending: VecDeque<T>,
    pub(crate) current: Option<T>,
    /// Incremented every time a wake is scheduled; a handled wake message
    /// compares its captured generation against this field and is a no-op
    /// if they no longer match, modelling idle-source withdrawal without a
    /// real cancellable idle handle.
    pub(crate) generation: u64,
    /// `Some` while a wake is outstanding on the actor's own channel.
    pub(crate) scheduled: Option<u64>,
    /// Number of tasks currently being processed (0 or 1 for a FIFO queue,
    /// tracked explicitly so `on_task_completed` reads the same invariant
    /// the original `running_tasks` counter did).
    pub(crate) running: u32,
    /// Set once this queue has been asked to remove itself while its
    /// current task was still in flight; the queue survives until that
    /// task completes, then is dropped instead of continuing.
    pub(crate) defer_remove: bool,
    /// Latched the moment a cancellation has been observed on this queue,
    /// independent of whether disposal happens immediately or is deferred.
    /// Reported verbatim to `finally-cb`.
    pub(crate) cancelled: bool,
    pub(crate) process_cb: ProcessCb<T>,
    pub(crate) cancel_cb: CancelCb<T>,
    pub(crate) delete_cb: DeleteCb<T>,
}

impl<T: Send + 'static> QueueState<T> {
    pub(crate) fn new(
        flags: TaskQueueFlags,
        process_cb: ProcessCb<T>,
        cancel_cb: CancelCb<T>,
        delete_cb: DeleteCb<T>,
    ) -> Self {
        QueueState {
            flags,
            pending: VecDeque::new(),
            current: None,
            generation: 0,
            scheduled: None,
            running: 0,
            defer_remove: false,
            cancelled: false,
            process_cb,
            cancel_cb,
            delete_cb,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.current.is_none() && self.running == 0
    }

    /// Bumps the generation and returns the new value, to be captured by the
    /// wake message sent for this queue.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}
