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

//! The process-wide task processor.
//!
//! `TaskProcessor<T>` multiplexes named queues of opaque atoms `T` onto a
//! single logical event loop. The loop is modelled as an actor: one spawned
//! task owns every mutable field and drains an unbounded command channel
//! strictly in order, which is what makes "no locks because nothing is
//! concurrently accessible" true even though `ylong_runtime` schedules that
//! task on a multi-threaded pool. [`ProcessorHandle`] is the cheaply
//! cloneable front end every caller actually holds.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use ylong_runtime::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use ylong_runtime::sync::oneshot;

use crate::key::TaskQueueKey;
use crate::queue::{CancelCb, DeleteCb, FinallyCb, ProcessCb, QueueState, TaskQueueFlags};

type QId = (String, String);

/// Commands sent from [`ProcessorHandle`] onto the actor's own channel.
///
/// `Wake` is both how callers ask for a queue to be scheduled and how the
/// actor schedules itself on its own channel ("the event loop") — the two
/// are unified because an unbounded mpsc send is the only "run at next
/// idle tick" primitive available here.
enum Command<T: Send + 'static> {
    AddQueue {
        source: String,
        sink: String,
        flags: TaskQueueFlags,
        process_cb: ProcessCb<T>,
        cancel_cb: CancelCb<T>,
        delete_cb: DeleteCb<T>,
        reply: oneshot::Sender<()>,
    },
    AddTask {
        id: QId,
        atom: T,
    },
    QueueStart {
        id: QId,
    },
    TaskCompleted {
        id: QId,
    },
    CancelQueue {
        id: QId,
    },
    RemoveForSource {
        source: String,
    },
    RemoveForSink {
        sink: String,
    },
    LookupQueue {
        source: String,
        sink: String,
        reply: oneshot::Sender<bool>,
    },
    SetQuitting,
    SetFinally {
        id: QId,
        finally_cb: FinallyCb,
    },
    SetUserData {
        id: QId,
        data: Arc<dyn Any + Send + Sync>,
    },
    GetUserData {
        id: QId,
        reply: oneshot::Sender<Option<Arc<dyn Any + Send + Sync>>>,
    },
    /// Self-addressed wake: the scheduled head-of-line dispatch for `id`,
    /// tagged with the generation it was armed under so a withdrawn wake
    /// that already made it onto the channel is a silent no-op.
    Wake {
        id: QId,
        generation: u64,
    },
    /// Self-addressed wake carrying a queue's disposal `finally-cb`.
    Finally {
        cancelled: bool,
        finally_cb: FinallyCb,
    },
    /// Self-addressed wake carrying the processor's terminal `on-quit` hook.
    OnQuit(Box<dyn FnOnce() + Send>),
}

/// A cheaply cloneable, non-owning reference to a running [`TaskProcessor`].
///
/// Every operation is a message send (plus, for queries, a oneshot round
/// trip) onto the actor's channel; none of them touch processor state
/// directly, which is what keeps the single-event-loop invariant true
/// regardless of how many threads hold a handle.
pub struct ProcessorHandle<T: Send + 'static> {
    tx: UnboundedSender<Command<T>>,
}

impl<T: Send + 'static> Clone for ProcessorHandle<T> {
    fn clone(&self) -> Self {
        ProcessorHandle { tx: self.tx.clone() }
    }
}

impl<T: Send + 'static> ProcessorHandle<T> {
    fn send(&self, cmd: Command<T>) {
        if self.tx.send(cmd).is_err() {
            warn!("processor actor has shut down; dropping command");
        }
    }

    /// Registers a fresh queue and returns its stable key.
    pub async fn add_queue(
        &self,
        source: impl Into<String>,
        sink: impl Into<String>,
        flags: TaskQueueFlags,
        process_cb: ProcessCb<T>,
        cancel_cb: CancelCb<T>,
        delete_cb: DeleteCb<T>,
    ) -> TaskQueueKey<T> {
        let source = source.into();
        let sink = sink.into();
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddQueue {
            source: source.clone(),
            sink: sink.clone(),
            flags,
            process_cb,
            cancel_cb,
            delete_cb,
            reply,
        });
        let _ = rx.await;
        TaskQueueKey::new(source, sink, self.clone())
    }

    /// Appends `atom` to the queue's FIFO.
    pub fn add_task(&self, key: &TaskQueueKey<T>, atom: T) {
        self.send(Command::AddTask {
            id: (key.source.clone(), key.sink.clone()),
            atom,
        });
    }

    /// Idempotently schedules the queue if idle.
    pub fn queue_start(&self, key: &TaskQueueKey<T>) {
        self.send(Command::QueueStart {
            id: (key.source.clone(), key.sink.clone()),
        });
    }

    /// Signals that the queue's `current` task has finished.
    pub fn task_completed(&self, key: &TaskQueueKey<T>) {
        self.send(Command::TaskCompleted {
            id: (key.source.clone(), key.sink.clone()),
        });
    }

    /// Cancels one queue: drains pending tasks, interrupts `current`.
    pub fn cancel_queue(&self, key: &TaskQueueKey<T>) {
        self.send(Command::CancelQueue {
            id: (key.source.clone(), key.sink.clone()),
        });
    }

    /// Cancels and disposes every queue registered under `source`.
    pub fn remove_queues_for_source(&self, source: impl Into<String>) {
        self.send(Command::RemoveForSource { source: source.into() });
    }

    /// Cancels and disposes every queue registered under `sink`.
    pub fn remove_queues_for_sink(&self, sink: impl Into<String>) {
        self.send(Command::RemoveForSink { sink: sink.into() });
    }

    /// Returns the stable key for `(source, sink)` if that queue is
    /// currently registered.
    pub async fn lookup_queue(&self, source: impl Into<String>, sink: impl Into<String>) -> Option<TaskQueueKey<T>> {
        let source = source.into();
        let sink = sink.into();
        let (reply, rx) = oneshot::channel();
        self.send(Command::LookupQueue {
            source: source.clone(),
            sink: sink.clone(),
            reply,
        });
        match rx.await {
            Ok(true) => Some(TaskQueueKey::new(source, sink, self.clone())),
            _ => None,
        }
    }

    /// Latches process-wide shutdown.
    pub fn set_quitting(&self) {
        self.send(Command::SetQuitting);
    }

    /// Installs a queue's terminal disposal hook.
    pub fn set_finally(&self, key: &TaskQueueKey<T>, finally_cb: FinallyCb) {
        self.send(Command::SetFinally {
            id: (key.source.clone(), key.sink.clone()),
            finally_cb,
        });
    }

    /// Attaches opaque user data to a queue.
    pub fn set_user_data(&self, key: &TaskQueueKey<T>, data: Arc<dyn Any + Send + Sync>) {
        self.send(Command::SetUserData {
            id: (key.source.clone(), key.sink.clone()),
            data,
        });
    }

    /// Reads back a queue's opaque user data.
    pub async fn get_user_data(&self, key: &TaskQueueKey<T>) -> Option<Arc<dyn Any + Send + Sync>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetUserData {
            id: (key.source.clone(), key.sink.clone()),
            reply,
        });
        rx.await.unwrap_or(None)
    }
}

/// Owns all processor state and drives the actor loop. Construct with
/// [`TaskProcessor::new`] and obtain clonable front ends via
/// [`TaskProcessor::handle`]; call [`TaskProcessor::run`] once, spawned on
/// the runtime, to start the loop.
pub struct TaskProcessor<T: Send + 'static> {
    tx: UnboundedSender<Command<T>>,
    rx: UnboundedReceiver<Command<T>>,
    queues: HashMap<QId, QueueState<T>>,
    running: u32,
    quitting: bool,
    on_quit: Option<Box<dyn FnOnce() + Send>>,
    user_data: HashMap<QId, Arc<dyn Any + Send + Sync>>,
    finally_hooks: HashMap<QId, FinallyCb>,
}

impl<T: Send + 'static> TaskProcessor<T> {
    /// Creates an empty processor. `on_quit` fires exactly once, after
    /// `set_quitting` has been called and every in-flight task has drained.
    pub fn new(on_quit: impl FnOnce() + Send + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        TaskProcessor {
            tx,
            rx,
            queues: HashMap::new(),
            running: 0,
            quitting: false,
            on_quit: Some(Box::new(on_quit)),
            user_data: HashMap::new(),
            finally_hooks: HashMap::new(),
        }
    }

    /// A cloneable front end to this processor.
    pub fn handle(&self) -> ProcessorHandle<T> {
        ProcessorHandle { tx: self.tx.clone() }
    }

    /// Runs the actor loop to completion. Returns once the channel is
    /// closed (every [`ProcessorHandle`] has been dropped) and no wakes
    /// remain outstanding. Intended to be driven via `ylong_runtime::spawn`.
    pub async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Ok(cmd) => self.handle_command(cmd),
                Err(_) => break,
            }
        }
    }

    fn handle_command(&mut self, cmd: Command<T>) {
        match cmd {
            Command::AddQueue {
                source,
                sink,
                flags,
                process_cb,
                cancel_cb,
                delete_cb,
                reply,
            } => {
                let id = (source, sink);
                debug!("add_queue {:?}", id);
                self.queues
                    .insert(id, QueueState::new(flags, process_cb, cancel_cb, delete_cb));
                let _ = reply.send(());
            }
            Command::AddTask { id, atom } => self.add_task(id, atom),
            Command::QueueStart { id } => self.queue_start(&id),
            Command::TaskCompleted { id } => self.task_completed(&id),
            Command::CancelQueue { id } => self.cancel_queue(&id),
            Command::RemoveForSource { source } => self.remove_for(|k| k.0 == source),
            Command::RemoveForSink { sink } => self.remove_for(|k| k.1 == sink),
            Command::LookupQueue { source, sink, reply } => {
                let found = self.queues.contains_key(&(source, sink));
                let _ = reply.send(found);
            }
            Command::SetQuitting => self.set_quitting(),
            Command::SetFinally { id, finally_cb } => {
                // stored as a one-shot slot on the queue's finalization path;
                // queues here hold it inline via a side table keyed by id so
                // disposal can retrieve it regardless of which path removed
                // the queue.
                self.finally_hooks.insert(id, finally_cb);
            }
            Command::SetUserData { id, data } => {
                self.user_data.insert(id, data);
            }
            Command::GetUserData { id, reply } => {
                let _ = reply.send(self.user_data.get(&id).cloned());
            }
            Command::Wake { id, generation } => self.on_wake(&id, generation),
            Command::Finally { cancelled, finally_cb } => finally_cb(cancelled),
            Command::OnQuit(hook) => hook(),
        }
    }

    fn add_task(&mut self, id: QId, atom: T) {
        let should_start = match self.queues.get_mut(&id) {
            Some(q) if q.defer_remove => {
                warn!("add_task on deferred-remove queue {:?}; dropping atom", id);
                (q.delete_cb)(atom);
                false
            }
            Some(q) => {
                q.pending.push_back(atom);
                q.flags.contains(TaskQueueFlags::AUTO_START) && q.is_idle() && q.scheduled.is_none()
            }
            None => {
                warn!("add_task on unknown queue {:?}", id);
                false
            }
        };
        if should_start {
            self.schedule(&id);
        }
    }

    fn queue_start(&mut self, id: &QId) {
        let should_start = match self.queues.get(id) {
            Some(q) if q.defer_remove => false,
            Some(q) => q.is_idle() && q.scheduled.is_none(),
            None => false,
        };
        if should_start {
            self.schedule(id);
        }
    }

    fn schedule(&mut self, id: &QId) {
        let Some(q) = self.queues.get_mut(id) else { return };
        let generation = q.next_generation();
        q.scheduled = Some(generation);
        trace!("scheduled queue {:?} gen {}", id, generation);
        let tx = self.tx.clone();
        let id = id.clone();
        let _ = tx.send(Command::Wake { id, generation });
    }

    fn on_wake(&mut self, id: &QId, generation: u64) {
        let Some(q) = self.queues.get_mut(id) else { return };
        if q.scheduled != Some(generation) {
            trace!("stale wake for {:?} gen {} ignored", id, generation);
            return;
        }
        q.scheduled = None;
        q.cancelled = false;
        let Some(atom) = q.pending.pop_front() else { return };
        q.current = Some(atom);
        self.running += 1;
        q.running += 1;
        debug!("dispatching queue {:?}", id);
        let q = self.queues.get_mut(id).expect("queue present");
        let current_ref = q.current.as_ref().expect("just set");
        (q.process_cb)(current_ref);
    }

    fn task_completed(&mut self, id: &QId) {
        let Some(q) = self.queues.get_mut(id) else {
            warn!("task_completed on unknown queue {:?}", id);
            return;
        };
        let Some(atom) = q.current.take() else {
            warn!("task_completed with no current task on {:?}", id);
            return;
        };
        (q.delete_cb)(atom);
        q.running = q.running.saturating_sub(1);
        self.running = self.running.saturating_sub(1);
        debug!("task_completed {:?}, running now {}", id, self.running);

        if self.quitting && self.running == 0 {
            self.arm_on_quit();
            return;
        }

        let Some(q) = self.queues.get(id) else { return };
        if q.defer_remove {
            self.dispose(id);
        } else if !q.pending.is_empty() {
            self.schedule(id);
        } else if q.flags.contains(TaskQueueFlags::AUTO_REMOVE) {
            self.dispose(id);
        }
    }

    fn cancel_queue(&mut self, id: &QId) {
        let Some(q) = self.queues.get_mut(id) else { return };
        debug!("cancel_queue {:?}", id);
        q.cancelled = true;
        q.generation += 1; // invalidates any outstanding wake
        q.scheduled = None;
        let pending = std::mem::take(&mut q.pending);
        for atom in pending {
            (q.cancel_cb)(&atom);
            (q.delete_cb)(atom);
        }
        let has_current = q.current.is_some();
        if has_current {
            let current_ref = q.current.as_ref().expect("checked above");
            (q.cancel_cb)(current_ref);
        } else if q.flags.contains(TaskQueueFlags::AUTO_REMOVE) {
            self.dispose(id);
        }
    }

    fn remove_for(&mut self, matches: impl Fn(&QId) -> bool) {
        let ids: Vec<QId> = self.queues.keys().filter(|k| matches(k)).cloned().collect();
        for id in ids {
            self.cancel_queue(&id);
            let has_current = self.queues.get(&id).map(|q| q.current.is_some()).unwrap_or(false);
            if has_current {
                if let Some(q) = self.queues.get_mut(&id) {
                    q.defer_remove = true;
                }
            } else {
                self.dispose(&id);
            }
        }
    }

    fn set_quitting(&mut self) {
        if self.quitting {
            return;
        }
        self.quitting = true;
        debug!("set_quitting, running={}", self.running);
        if self.running > 0 {
            let ids: Vec<QId> = self.queues.keys().cloned().collect();
            for id in ids {
                self.cancel_queue(&id);
            }
        } else {
            self.arm_on_quit();
        }
    }

    fn arm_on_quit(&mut self) {
        if let Some(hook) = self.on_quit.take() {
            debug!("arming on_quit");
            let tx = self.tx.clone();
            let _ = tx.send(Command::OnQuit(hook));
        }
    }

    fn dispose(&mut self, id: &QId) {
        let Some(q) = self.queues.remove(id) else { return };
        debug!("disposing queue {:?}", id);
        let mut q = q;
        for atom in std::mem::take(&mut q.pending) {
            (q.delete_cb)(atom);
        }
        self.user_data.remove(id);
        if let Some(finally_cb) = self.finally_hooks.remove(id) {
            let tx = self.tx.clone();
            let _ = tx.send(Command::Finally {
                cancelled: q.cancelled,
                finally_cb,
            });
        }
    }
}
