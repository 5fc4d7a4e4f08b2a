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

//! Asynchronous task-queue runtime backing a media-server control service.
//!
//! This crate owns the hard concurrency problem behind brokering client
//! requests onto remote UPnP AV content-directory actions: a process-wide
//! [`processor::TaskProcessor`] that multiplexes named queues onto a single
//! logical event loop, the [`service_task::ServiceTask`] that drives one
//! remote action with cooperative cancellation, and the
//! [`chain::ChainTask`] sequencer that runs a list of dependent actions with
//! release-on-all-paths cleanup.
//!
//! What this crate does *not* do: parse client method invocations, speak the
//! UPnP SOAP action transport, or discover/evict remote devices. Those are
//! external collaborators; this crate only defines the interfaces it
//! consumes from, and exposes to, them (see [`transport`]).
//!
//! ```no_run
//! use avctl_runtime::processor::TaskProcessor;
//! use avctl_runtime::queue::TaskQueueFlags;
//!
//! # ylong_runtime::block_on(async {
//! let processor = TaskProcessor::<&'static str>::new(|| {
//!     println!("processor drained, shutting down");
//! });
//! let handle = processor.handle();
//! ylong_runtime::spawn(processor.run());
//!
//! let key = handle
//!     .add_queue(
//!         "client-42",
//!         "device-7",
//!         TaskQueueFlags::AUTO_START | TaskQueueFlags::AUTO_REMOVE,
//!         Box::new(|_atom: &&'static str| {}),
//!         Box::new(|_atom: &&'static str| {}),
//!         Box::new(|_atom: &'static str| {}),
//!     )
//!     .await;
//! handle.add_task(&key, "browse-root");
//! # });
//! ```

#![warn(missing_docs, clippy::redundant_static_lifetimes)]
#![allow(clippy::new_without_default)]

pub mod chain;
pub mod error;
pub mod key;
pub mod processor;
pub mod queue;
pub mod service_task;
pub mod transport;

pub use chain::ChainTask;
pub use error::TaskError;
pub use key::TaskQueueKey;
pub use processor::{ProcessorHandle, TaskProcessor};
pub use queue::TaskQueueFlags;
pub use service_task::ServiceTask;
