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

//! The seam between this crate and its external collaborators.
//!
//! The core never talks to a remote device directly. It drives an action
//! function that is handed a [`WeakProxy`] onto whatever the action-transport
//! (the UPnP SOAP action client, out of scope here) considers a live remote
//! service proxy, and it routes the transport's eventual completion back to
//! a callback. Everything in this module is generic over the proxy type `P`
//! and the action/result payload type `R` so that the ingress layer can plug
//! in its own concrete types without this crate depending on them.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

/// A boxed, `'static` future yielding `T`, used for outstanding remote
/// actions so that [`ActionFn`] stays object-safe.
pub type ActionFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A non-owning observation of a remote proxy.
///
/// Proxies are owned externally (by the device registry); the core must
/// never extend their lifetime. Wrapping [`std::sync::Weak`] gives us that
/// for free: once the registry drops its `Arc<P>`, every `WeakProxy<P>`
/// observing it reads as `None` from that point on, with no explicit watch
/// registration or teardown required.
#[derive(Clone)]
pub struct WeakProxy<P: ?Sized>(Weak<P>);

impl<P: ?Sized> WeakProxy<P> {
    /// Takes a weak observation of `proxy`. The returned handle does not
    /// keep `proxy` alive.
    pub fn new(proxy: &Arc<P>) -> Self {
        WeakProxy(Arc::downgrade(proxy))
    }

    /// An observation that never resolves, for atoms with no proxy.
    pub fn none() -> Self {
        WeakProxy(Weak::new())
    }

    /// Attempts to recover a strong reference. Returns `None` if the proxy
    /// has already been destroyed by its owner.
    pub fn upgrade(&self) -> Option<Arc<P>> {
        self.0.upgrade()
    }

    /// `true` if the observed proxy is still alive.
    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl<P: ?Sized> Default for WeakProxy<P> {
    fn default() -> Self {
        Self::none()
    }
}

/// A callback the transport may hand back alongside a pending action so the
/// core can direct it to interrupt that action (the C side's
/// `gupnp_service_proxy_cancel_action(proxy, p_action)`). Absent if the
/// transport's particular action cannot be interrupted once begun.
pub type CancelFn = Box<dyn FnOnce() + Send>;

/// An action the transport has accepted but not yet resolved: the "outstanding
/// handle" of spec §6, bundling the eventual result with an optional way to
/// ask the transport to cancel it early.
pub struct OutstandingAction<R> {
    pub(crate) future: ActionFuture<R>,
    pub(crate) cancel: Option<CancelFn>,
}

impl<R> OutstandingAction<R> {
    /// An outstanding action with no cancellation hook; `cancel` on the
    /// enclosing chain/service-task will then only stop waiting on it, not
    /// interrupt it on the transport.
    pub fn new(future: ActionFuture<R>) -> Self {
        OutstandingAction { future, cancel: None }
    }

    /// An outstanding action the transport knows how to interrupt.
    pub fn with_cancel(future: ActionFuture<R>, cancel: CancelFn) -> Self {
        OutstandingAction {
            future,
            cancel: Some(cancel),
        }
    }
}

/// The result of invoking a chain or service action function.
pub enum ActionOutcome<R> {
    /// The action ran to completion synchronously (or failed before it could
    /// be dispatched); the caller should advance immediately rather than
    /// wait for a callback.
    Done,
    /// The transport accepted the action and will resolve it exactly once,
    /// asynchronously.
    Pending(OutstandingAction<R>),
}

/// One action function, as referenced by chain atoms and service tasks.
///
/// Mirrors the C signature `(task, proxy, &failed) -> outstanding-handle |
/// none`: the `task` argument is dropped in favour of ordinary closure
/// capture (idiomatic in Rust, and behaviourally identical since the C side
/// only ever used it to read back into the same atom's fields), and `failed`
/// becomes the `&mut bool` out-parameter below.
pub type ActionFn<P, R> = Box<dyn FnOnce(WeakProxy<P>, &mut bool) -> ActionOutcome<R> + Send>;

/// The completion callback invoked once an [`ActionFn`] resolves
/// asynchronously. `proxy` is `None` if the remote proxy was destroyed
/// before the transport could deliver its result.
pub type ActionCallback<P, R> = Box<dyn FnOnce(Option<Arc<P>>, R) + Send>;
