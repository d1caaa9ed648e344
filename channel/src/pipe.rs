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

//! Single-direction byte pipe

use crate::{ChannelError, Result};
use bytes::Bytes;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Bounded byte pipe with one logical writer and one logical reader.
///
/// Completing the writer lets the reader drain whatever was already written
/// and then observe end of stream. Aborting stops both sides immediately and
/// wakes any writer blocked on backpressure.
pub struct Pipe {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    receiver: AsyncMutex<mpsc::Receiver<Bytes>>,
    completed: CancellationToken,
    aborted: CancellationToken,
}

impl Pipe {
    /// Create a pipe buffering at most `capacity` pending buffers
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            completed: CancellationToken::new(),
            aborted: CancellationToken::new(),
        }
    }

    /// Write a buffer, waiting while the pipe is full.
    ///
    /// Empty buffers are accepted and dropped.
    pub async fn write(&self, data: Bytes) -> Result<()> {
        if self.aborted.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ChannelError::Completed)?;
        if data.is_empty() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = self.aborted.cancelled() => Err(ChannelError::Closed),
            sent = sender.send(data) => sent.map_err(|_| ChannelError::Closed),
        }
    }

    /// Read the next buffer.
    ///
    /// Returns `None` once the writer completed and every buffer was read, or
    /// as soon as the pipe is aborted.
    pub async fn read(&self) -> Option<Bytes> {
        let mut receiver = tokio::select! {
            biased;
            _ = self.aborted.cancelled() => return None,
            receiver = self.receiver.lock() => receiver,
        };
        tokio::select! {
            biased;
            data = receiver.recv() => data,
            _ = self.aborted.cancelled() => None,
        }
    }

    /// Read a buffer if one is ready without waiting.
    ///
    /// `Ok(None)` means the pipe is open but nothing is buffered.
    /// `Err(ChannelError::Completed)` means the stream has ended.
    pub fn try_read(&self) -> Result<Option<Bytes>> {
        if self.aborted.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let Ok(mut receiver) = self.receiver.try_lock() else {
            return Ok(None);
        };
        match receiver.try_recv() {
            Ok(data) => Ok(Some(data)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(ChannelError::Completed),
        }
    }

    /// Mark the writer complete. Buffered data remains readable.
    pub fn complete(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            trace!("pipe writer completed");
        }
        self.completed.cancel();
    }

    /// Stop the pipe. Pending and future reads and writes end immediately.
    pub fn abort(&self) {
        self.complete();
        if !self.aborted.is_cancelled() {
            trace!("pipe aborted");
        }
        self.aborted.cancel();
    }

    /// Check if the writer was completed
    pub fn is_completed(&self) -> bool {
        self.completed.is_cancelled()
    }

    /// Check if the pipe was aborted
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_cancelled()
    }

    /// Wait until the writer is completed
    pub async fn completed(&self) {
        self.completed.cancelled().await
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("completed", &self.is_completed())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
