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

use core::fmt;

/// Outcome routed to an atom's callback when its action does not complete
/// normally.
///
/// The core never retries and never interprets a domain-specific result; it
/// only distinguishes *why* a reply never arrived through the ordinary path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The task, chain, or queue was interrupted by cancellation, bulk
    /// removal, or shutdown.
    Cancelled,
    /// The task or chain was disposed before its reply was delivered.
    Died,
    /// The action function signalled failure before an outstanding action
    /// could be dispatched to the transport.
    ActionBeginFailed,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "task cancelled"),
            TaskError::Died => write!(f, "unable to complete command"),
            TaskError::ActionBeginFailed => write!(f, "action failed to begin"),
        }
    }
}

impl std::error::Error for TaskError {}
