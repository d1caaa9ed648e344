//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Ordered asynchronous write queue
//!
//! Every enqueued operation is chained behind the previous tail, so operations
//! run strictly one at a time in enqueue order no matter which task enqueued
//! them. Each link is spawned on the Tokio runtime as soon as it is enqueued;
//! callers may await the returned [`WriteHandle`] or simply drop it.

use crate::{ChannelError, Result};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Completion handle of an enqueued write. Cloneable, resolves once.
pub type WriteHandle = Shared<BoxFuture<'static, Result<()>>>;

struct QueueState {
    tail: WriteHandle,
    drained: bool,
}

/// Serializes asynchronous write operations.
///
/// Must be used from within a Tokio runtime.
pub struct WriteQueue {
    state: Mutex<QueueState>,
}

impl WriteQueue {
    /// Create an empty queue whose tail is already complete
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tail: future::ready(Ok(())).boxed().shared(),
                drained: false,
            }),
        }
    }

    /// Chain `operation` behind the current tail and return its handle.
    ///
    /// A failed predecessor does not prevent later operations from running.
    /// Once the queue is drained new operations are never executed; their
    /// handle resolves to [`ChannelError::Drained`] after the final tail.
    pub fn enqueue<F, Fut>(&self, operation: F) -> WriteHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let link = {
            let mut state = self.lock();
            let previous = state.tail.clone();
            if state.drained {
                trace!("write rejected by drained queue");
                return async move {
                    let _ = previous.await;
                    Err(ChannelError::Drained)
                }
                .boxed()
                .shared();
            }
            let link = async move {
                let _ = previous.await;
                operation().await
            }
            .boxed()
            .shared();
            state.tail = link.clone();
            link
        };
        tokio::spawn(link.clone());
        link
    }

    /// Stop accepting operations and return the handle of the final tail
    pub fn drain(&self) -> WriteHandle {
        let mut state = self.lock();
        state.drained = true;
        state.tail.clone()
    }

    /// Check if the queue was drained
    pub fn is_drained(&self) -> bool {
        self.lock().drained
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteQueue")
            .field("drained", &self.is_drained())
            .finish()
    }
}
