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

//! Queue identity.
//!
//! A queue is identified by the `(source, sink)` pair it was registered
//! under, never by insertion order or an opaque handle. `TaskQueueKey`
//! captures that pair plus a back-reference to the owning processor so a
//! key can be used directly wherever the processor expects one, without the
//! caller having to keep a separate handle around.

use std::hash::{Hash, Hasher};

use crate::processor::ProcessorHandle;

/// Identifies one queue within a [`crate::processor::TaskProcessor`].
///
/// Equality and hashing consider only `source`/`sink`; the handle is along
/// for the ride so callers can round-trip a key straight back into the
/// processor's operations.
pub struct TaskQueueKey<T: Send + 'static> {
    pub(crate) source: String,
    pub(crate) sink: String,
    pub(crate) processor: ProcessorHandle<T>,
}

impl<T: Send + 'static> TaskQueueKey<T> {
    pub(crate) fn new(source: String, sink: String, processor: ProcessorHandle<T>) -> Self {
        TaskQueueKey {
            source,
            sink,
            processor,
        }
    }

    /// The source identifier this queue was registered under.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The sink identifier this queue was registered under.
    pub fn sink(&self) -> &str {
        &self.sink
    }

    /// The processor that owns this queue.
    pub fn processor(&self) -> &ProcessorHandle<T> {
        &self.processor
    }
}

impl<T: Send + 'static> Clone for TaskQueueKey<T> {
    fn clone(&self) -> Self {
        TaskQueueKey {
            source: self.source.clone(),
            sink: self.sink.clone(),
            processor: self.processor.clone(),
        }
    }
}

impl<T: Send + 'static> PartialEq for TaskQueueKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.sink == other.sink
    }
}

impl<T: Send + 'static> Eq for TaskQueueKey<T> {}

impl<T: Send + 'static> Hash for TaskQueueKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.sink.hash(state);
    }
}

impl<T: Send + 'static> std::fmt::Debug for TaskQueueKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueueKey")
            .field("source", &self.source)
            .field("sink", &self.sink)
            .finish()
    }
}
