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

//! Service-task: the canonical task-atom for a single asynchronous remote
//! action inside a task-queue.
//!
//! A service-task is deliberately the simplest of the three components: it
//! drives exactly one action, delivers exactly one completion, and reports
//! back to its queue. It exposes the four queue-hook entry points the
//! processor calls through `process-cb`/`cancel-cb`/`delete-cb`, plus the
//! transport-facing `begin_action_callback`.

use std::any::Any;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::processor::ProcessorHandle;
use crate::key::TaskQueueKey;
use crate::transport::{ActionCallback, ActionFn, ActionOutcome, CancelFn, OutstandingAction, WeakProxy};

struct Inner<D, P, R> {
    action: Option<ActionFn<P, R>>,
    action_cb: Option<ActionCallback<P, R>>,
    device: Arc<D>,
    proxy: WeakProxy<P>,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
    /// `true` from the moment `process` dispatches an async action until its
    /// completion has been handled; guards `begin_action_callback` against
    /// ever running twice for the same task.
    outstanding: bool,
    /// Latched by `cancel`. Suppresses the domain `action_cb` when the
    /// completion eventually lands, but never suppresses the `task_completed`
    /// signal itself — the queue still needs exactly one of those per task.
    cancelled: bool,
    /// The transport's cancellation hook for the in-flight action, if it
    /// supplied one. Taken and invoked by `cancel`.
    outstanding_cancel: Option<CancelFn>,
}

/// One remote action, driven to completion as a task-queue's `current`
/// atom. `T` is the queue's opaque atom type; `ServiceTask` is meant to be
/// embedded in (or referenced by) whatever `T` the ingress layer defines,
/// with its queue-hooks wired to the methods below.
pub struct ServiceTask<D, P, R> {
    inner: Arc<Mutex<Inner<D, P, R>>>,
}

impl<D, P, R> Clone for ServiceTask<D, P, R> {
    fn clone(&self) -> Self {
        ServiceTask { inner: self.inner.clone() }
    }
}

impl<D, P, R> ServiceTask<D, P, R>
where
    D: Send + Sync + 'static,
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new(
        action: ActionFn<P, R>,
        action_cb: ActionCallback<P, R>,
        device: Arc<D>,
        proxy: WeakProxy<P>,
        user_data: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        ServiceTask {
            inner: Arc::new(Mutex::new(Inner {
                action: Some(action),
                action_cb: Some(action_cb),
                device,
                proxy,
                user_data,
                outstanding: false,
                cancelled: false,
                outstanding_cancel: None,
            })),
        }
    }

    pub fn device(&self) -> Arc<D> {
        self.inner.lock().unwrap().device.clone()
    }

    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.lock().unwrap().user_data.clone()
    }

    /// **process** queue-hook: invokes the action function. If it returns
    /// an outstanding handle the task remains in flight and `key` is not
    /// signalled yet; otherwise `task_completed` is signalled immediately.
    pub fn process<Atom: Send + 'static>(&self, key: &TaskQueueKey<Atom>, processor: &ProcessorHandle<Atom>) {
        let (action, proxy_for_action) = {
            let mut guard = self.inner.lock().unwrap();
            let action = guard.action.take().expect("process called more than once");
            let proxy = guard.proxy.clone();
            (action, proxy)
        };

        let mut failed = false;
        let outcome = action(proxy_for_action, &mut failed);
        match outcome {
            ActionOutcome::Done => {
                debug!("service task completed synchronously (failed={failed})");
                processor.task_completed(key);
            }
            ActionOutcome::Pending(outstanding) => {
                let OutstandingAction { future, cancel } = outstanding;
                {
                    let mut guard = self.inner.lock().unwrap();
                    guard.outstanding = true;
                    guard.outstanding_cancel = cancel;
                }
                let inner = self.inner.clone();
                let key = key.clone();
                let processor = processor.clone();
                ylong_runtime::spawn(async move {
                    let result = future.await;
                    Self::begin_action_callback(inner, result, &key, &processor);
                });
            }
        }
    }

    /// **begin-action-callback**: the transport's completion entry point.
    /// Dispatches the user-supplied completion callback — unless `cancel`
    /// latched `cancelled` in the meantime, in which case the domain
    /// callback is suppressed — then signals `task_completed` on the owning
    /// queue either way. `task_completed` must fire exactly once per task
    /// regardless of cancellation, or the queue's `current` never clears.
    fn begin_action_callback<Atom: Send + 'static>(
        inner: Arc<Mutex<Inner<D, P, R>>>,
        result: R,
        key: &TaskQueueKey<Atom>,
        processor: &ProcessorHandle<Atom>,
    ) {
        let delivery = {
            let mut guard = inner.lock().unwrap();
            if !guard.outstanding {
                debug!("dropping duplicate service-task completion");
                return;
            }
            guard.outstanding = false;
            guard.outstanding_cancel = None;
            let cancelled = guard.cancelled;
            let cb = guard.action_cb.take();
            let proxy = guard.proxy.upgrade();
            (cancelled, cb, proxy)
        };
        let (cancelled, cb, proxy) = delivery;
        if cancelled {
            debug!("suppressing domain callback for a cancelled service task");
        } else if let Some(cb) = cb {
            cb(proxy, result);
        }
        processor.task_completed(key);
    }

    /// **cancel** queue-hook: asks the transport to cancel the outstanding
    /// action, if any, and latches `cancelled` so the eventual completion
    /// drops the domain callback. Does not itself signal `task_completed` —
    /// the eventual completion callback drives that, same as the processor's
    /// queue-cancellation protocol expects.
    pub fn cancel(&self) {
        let cancel_fn = {
            let mut guard = self.inner.lock().unwrap();
            if !guard.outstanding {
                return;
            }
            guard.cancelled = true;
            guard.outstanding_cancel.take()
        };
        if let Some(cancel_fn) = cancel_fn {
            cancel_fn();
        }
    }

    /// **delete** queue-hook: releases scoped data and the proxy
    /// observation. Idempotent since every field is already optional or
    /// trivially droppable.
    pub fn delete(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.action = None;
        guard.action_cb = None;
        guard.user_data = None;
        guard.outstanding_cancel = None;
        guard.proxy = WeakProxy::none();
    }
}
