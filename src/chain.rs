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

//! Chain-task: a sequencer over an ordered list of atoms, each either a
//! synchronous step or an asynchronous remote action, with a terminal
//! callback guaranteed to fire exactly once.
//!
//! A chain's mutable state is small and short-lived per transition, so
//! unlike the processor it is not modelled as its own actor; it is guarded
//! by a plain `Mutex` (the same shape the teacher uses for a single task's
//! progress fields) and advanced by spawning a fresh `ylong_runtime` task
//! for every transition, which is what stands in for "schedule on the event
//! loop" here.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::transport::{ActionCallback, ActionFn, ActionFuture, ActionOutcome, CancelFn, OutstandingAction, WeakProxy};

/// The chain's terminal callback: `(end-proxy upgraded, is-cancelled,
/// end-data)`.
pub type EndFn<P> = Box<dyn FnOnce(Option<Arc<P>>, bool, Option<Arc<dyn Any + Send + Sync>>) + Send>;

struct ChainAtom<D, P, R> {
    action: Option<ActionFn<P, R>>,
    action_cb: Option<ActionCallback<P, R>>,
    device: Arc<D>,
    proxy: WeakProxy<P>,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
}

struct EndSlot<P> {
    end_fn: EndFn<P>,
    end_proxy: WeakProxy<P>,
    end_data: Option<Arc<dyn Any + Send + Sync>>,
}

struct ChainInner<D, P, R> {
    atoms: VecDeque<ChainAtom<D, P, R>>,
    current: Option<ChainAtom<D, P, R>>,
    /// Bumped on every dispatch; an async completion arriving for a
    /// generation other than the current one is orphaned and dropped. This
    /// is what lets `cancel` clear `current` out from under an outstanding
    /// transport future without waiting for it.
    generation: u64,
    cancelled: bool,
    /// The transport's cancellation hook for whichever atom is currently
    /// outstanding, if it supplied one. Taken and invoked by `cancel`.
    outstanding_cancel: Option<CancelFn>,
    end: Option<EndSlot<P>>,
    end_scheduled: bool,
}

/// A sequence of atoms run strictly in order, each atom either completing
/// inline or asynchronously via the transport, terminating in exactly one
/// call to the installed end-func.
pub struct ChainTask<D, P, R> {
    inner: Arc<Mutex<ChainInner<D, P, R>>>,
}

impl<D, P, R> Clone for ChainTask<D, P, R> {
    fn clone(&self) -> Self {
        ChainTask { inner: self.inner.clone() }
    }
}

impl<D, P, R> Default for ChainTask<D, P, R>
where
    D: Send + Sync + 'static,
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D, P, R> ChainTask<D, P, R>
where
    D: Send + Sync + 'static,
    P: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Creates an empty chain.
    pub fn new() -> Self {
        ChainTask {
            inner: Arc::new(Mutex::new(ChainInner {
                atoms: VecDeque::new(),
                current: None,
                generation: 0,
                cancelled: false,
                outstanding_cancel: None,
                end: None,
                end_scheduled: false,
            })),
        }
    }

    /// Appends an atom. `proxy` is observed weakly: the atom never extends
    /// the remote proxy's lifetime, and reads as absent if the proxy is
    /// destroyed before this atom's action runs.
    pub fn add(
        &self,
        action: ActionFn<P, R>,
        device: Arc<D>,
        proxy: WeakProxy<P>,
        action_cb: ActionCallback<P, R>,
        user_data: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.atoms.push_back(ChainAtom {
            action: Some(action),
            action_cb: Some(action_cb),
            device,
            proxy,
            user_data,
        });
    }

    /// Installs the terminal callback, delivered exactly once.
    pub fn set_end(
        &self,
        end_fn: EndFn<P>,
        end_proxy: WeakProxy<P>,
        end_data: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.end = Some(EndSlot {
            end_fn,
            end_proxy,
            end_data,
        });
    }

    /// Begins or resumes sequencing. The first atom's action, if any, runs
    /// synchronously from this call; every subsequent transition yields to
    /// the event loop first.
    pub fn start(&self) {
        Self::advance(self.inner.clone());
    }

    /// Interrupts the chain. If an action is outstanding, directs the
    /// transport to cancel it (when it supplied a [`CancelFn`]) and clears
    /// the outstanding handle; its completion, if it still arrives, is
    /// recognised as orphaned (by generation) and dropped. A chain cancelled
    /// between atoms, with nothing outstanding, just latches `cancelled` and
    /// lets the next `start()` observe it — ported from
    /// `msu_chain_task_cancel`'s asymmetric behaviour.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.cancelled = true;
        if inner.current.is_some() {
            inner.generation = inner.generation.wrapping_add(1);
            inner.current = None;
            let cancel_fn = inner.outstanding_cancel.take();
            drop(inner);
            if let Some(cancel_fn) = cancel_fn {
                cancel_fn();
            }
            Self::schedule_wake(self.inner.clone());
        }
    }

    /// Releases every remaining atom and any end-func scoped data without
    /// invoking the end-func.
    pub fn delete(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.atoms.clear();
        inner.current = None;
        inner.outstanding_cancel = None;
        inner.end = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().unwrap().cancelled
    }

    /// The device owning the atom currently in flight, if any.
    pub fn get_device(&self) -> Option<Arc<D>> {
        self.inner.lock().unwrap().current.as_ref().map(|a| a.device.clone())
    }

    /// The user data of the atom currently in flight, if any.
    pub fn get_user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner
            .lock()
            .unwrap()
            .current
            .as_ref()
            .and_then(|a| a.user_data.clone())
    }

    /// The scoped data installed alongside the end-func.
    pub fn get_end_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.lock().unwrap().end.as_ref().and_then(|e| e.end_data.clone())
    }

    fn schedule_wake(inner_arc: Arc<Mutex<ChainInner<D, P, R>>>) {
        ylong_runtime::spawn(async move {
            Self::advance(inner_arc);
        });
    }

    /// Drives one transition: dispatch the next atom, or, once the list is
    /// drained (normally or by cancellation), deliver the end-func.
    fn advance(inner_arc: Arc<Mutex<ChainInner<D, P, R>>>) {
        let mut guard = inner_arc.lock().unwrap();
        if guard.current.is_some() {
            return;
        }
        if guard.cancelled {
            guard.atoms.clear();
        }
        if !guard.atoms.is_empty() {
            let mut atom = guard.atoms.pop_front().expect("checked non-empty");
            guard.generation = guard.generation.wrapping_add(1);
            let my_generation = guard.generation;
            let action = atom.action.take().expect("atom carries an action");
            let proxy_for_action = atom.proxy.clone();
            guard.current = Some(atom);
            guard.outstanding_cancel = None;
            drop(guard);

            let mut failed = false;
            let outcome = action(proxy_for_action, &mut failed);
            match outcome {
                ActionOutcome::Done => {
                    let mut guard = inner_arc.lock().unwrap();
                    if failed {
                        guard.cancelled = true;
                    }
                    guard.current = None;
                    drop(guard);
                    Self::schedule_wake(inner_arc);
                }
                ActionOutcome::Pending(outstanding) => {
                    let OutstandingAction { future, cancel } = outstanding;
                    {
                        let mut guard = inner_arc.lock().unwrap();
                        if failed {
                            guard.cancelled = true;
                        }
                        guard.outstanding_cancel = cancel;
                    }
                    let inner_arc2 = inner_arc.clone();
                    ylong_runtime::spawn(async move {
                        let result = future.await;
                        Self::complete(inner_arc2, my_generation, result);
                    });
                }
            }
            return;
        }

        if guard.end_scheduled {
            return;
        }
        let Some(end) = guard.end.take() else { return };
        guard.end_scheduled = true;
        let cancelled = guard.cancelled;
        drop(guard);
        debug!("chain draining, dispatching end-func (cancelled={cancelled})");
        ylong_runtime::spawn(async move {
            let proxy = end.end_proxy.upgrade();
            (end.end_fn)(proxy, cancelled, end.end_data);
        });
    }

    /// The transport's completion entry point for an async atom action.
    fn complete(inner_arc: Arc<Mutex<ChainInner<D, P, R>>>, generation: u64, result: R) {
        let delivery = {
            let mut guard = inner_arc.lock().unwrap();
            if guard.generation != generation || guard.current.is_none() {
                debug!("dropping orphaned chain completion for stale generation {generation}");
                return;
            }
            let mut atom = guard.current.take().expect("checked above");
            guard.outstanding_cancel = None;
            let cb = atom.action_cb.take().expect("async atom carries a callback");
            let proxy = atom.proxy.upgrade();
            Some((cb, proxy))
        };
        if let Some((cb, proxy)) = delivery {
            cb(proxy, result);
            Self::schedule_wake(inner_arc);
        }
    }
}
