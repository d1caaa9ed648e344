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

//! Logical connections and their registry bookkeeping
//!
//! A [`Connection`] is the handle an endpoint works with: it survives
//! transport reattachment (long-polling issues one HTTP request per poll) and
//! is cheap to clone. [`ConnectionState`] is the registry's view of the same
//! connection: liveness, the bound transport, the running application task
//! and the close callback.

use crate::transport::TransportAdapter;
use crate::{
    ConnectionId, ConnectionMetadata, Principal, Result, TransferFormat, TransportError,
    TransportKind,
};
use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use sockline_channel::{ChannelError, ChannelPair, WriteHandle, WriteQueue};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

/// Running endpoint invocation, awaitable from several places
pub type ApplicationTask = Shared<BoxFuture<'static, ()>>;

/// One-shot teardown run when a connection ends
pub type CloseCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct ConnectionInner {
    id: ConnectionId,
    channel: OnceLock<Arc<ChannelPair>>,
    sends: WriteQueue,
    metadata: RwLock<ConnectionMetadata>,
    created_at: Instant,
}

/// Logical connection handle given to endpoints.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection with no channel yet (reserved through `/getid`)
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                channel: OnceLock::new(),
                sends: WriteQueue::new(),
                metadata: RwLock::new(ConnectionMetadata::default()),
                created_at: Instant::now(),
            }),
        }
    }

    /// Create a connection already bound to `channel`
    pub(crate) fn with_channel(id: ConnectionId, channel: Arc<ChannelPair>) -> Self {
        let connection = Self::new(id);
        // Freshly built, so the cell is empty
        let _ = connection.inner.channel.set(channel);
        connection
    }

    /// Get the connection ID
    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    /// Get the channel pair, if a transport attached one
    pub fn channel(&self) -> Option<&Arc<ChannelPair>> {
        self.inner.channel.get()
    }

    /// Check if a channel is attached
    pub fn has_channel(&self) -> bool {
        self.inner.channel.get().is_some()
    }

    /// Bind the channel pair. A connection can be bound only once.
    pub(crate) fn attach(&self, channel: Arc<ChannelPair>) -> Result<()> {
        self.inner
            .channel
            .set(channel)
            .map_err(|_| TransportError::ConnectionInUse(self.inner.id.clone()))?;
        trace!(connection_id = %self.inner.id, "channel attached");
        Ok(())
    }

    /// Queue `data` for delivery to the client.
    ///
    /// Sends from every clone of this connection reach the client in the
    /// order they were queued. The returned handle resolves once the buffer
    /// was accepted by the output pipe; dropping it does not cancel the send.
    pub fn send(&self, data: impl Into<Bytes>) -> WriteHandle {
        let data = data.into();
        let channel = self.inner.channel.get().cloned();
        self.inner.sends.enqueue(move || async move {
            match channel {
                Some(channel) => channel.output().write(data).await,
                None => Err(ChannelError::Closed),
            }
        })
    }

    /// Receive the next buffer sent by the client.
    ///
    /// Returns `None` when the client side ended or no channel is attached.
    pub async fn receive(&self) -> Option<Bytes> {
        self.channel()?.input().read().await
    }

    /// Finish queued sends, then end both directions gracefully
    pub async fn close(&self) {
        let _ = self.inner.sends.drain().await;
        if let Some(channel) = self.channel() {
            channel.dispose();
        }
    }

    /// Stop both directions immediately
    pub fn abort(&self) {
        drop(self.inner.sends.drain());
        if let Some(channel) = self.channel() {
            channel.abort();
        }
    }

    /// Get a copy of the connection metadata
    pub fn metadata(&self) -> ConnectionMetadata {
        self.read_metadata().clone()
    }

    /// Get the bound transport
    pub fn transport(&self) -> Option<TransportKind> {
        self.read_metadata().transport
    }

    /// Get the negotiated transfer format
    pub fn format(&self) -> TransferFormat {
        self.read_metadata().format
    }

    /// Get the authenticated user, if any
    pub fn user(&self) -> Option<Principal> {
        self.read_metadata().user.clone()
    }

    /// When the connection was created
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    pub(crate) fn update_metadata(&self, update: impl FnOnce(&mut ConnectionMetadata)) {
        let mut metadata = self
            .inner
            .metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut metadata);
    }

    fn read_metadata(&self) -> std::sync::RwLockReadGuard<'_, ConnectionMetadata> {
        self.inner
            .metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("channel", &self.inner.channel.get())
            .field("metadata", &*self.read_metadata())
            .finish()
    }
}

/// Registry entry tracking the liveness of one connection
pub struct ConnectionState {
    connection: Connection,
    last_seen: Mutex<Instant>,
    active: AtomicBool,
    polling: AtomicBool,
    disposed: AtomicBool,
    close: Mutex<Option<CloseCallback>>,
    application: Mutex<Option<ApplicationTask>>,
    transport: Mutex<Option<TransportAdapter>>,
}

impl ConnectionState {
    pub(crate) fn new(connection: Connection, active: bool) -> Self {
        Self {
            connection,
            last_seen: Mutex::new(Instant::now()),
            active: AtomicBool::new(active),
            polling: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            close: Mutex::new(None),
            application: Mutex::new(None),
            transport: Mutex::new(None),
        }
    }

    /// Get the connection handle
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Get the connection ID
    pub fn id(&self) -> &ConnectionId {
        self.connection.id()
    }

    /// Last time a transport touched the connection
    pub fn last_seen(&self) -> Instant {
        *lock(&self.last_seen)
    }

    /// Refresh the last-seen timestamp
    pub fn touch(&self) {
        *lock(&self.last_seen) = Instant::now();
    }

    /// Check if a transport is currently serving the connection
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Check if the sweep may evict this connection
    pub fn is_evictable(&self, now: Instant, timeout: Duration) -> bool {
        !self.is_active() && now.saturating_duration_since(self.last_seen()) > timeout
    }

    /// Check if the connection was disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Claim the single in-flight poll slot
    pub(crate) fn try_begin_poll(&self) -> bool {
        self.polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_poll(&self) {
        self.polling.store(false, Ordering::Release);
    }

    pub(crate) fn set_close(&self, close: CloseCallback) {
        *lock(&self.close) = Some(close);
    }

    /// Run the close callback, at most once
    pub(crate) async fn close(&self) {
        let close = lock(&self.close).take();
        if let Some(close) = close {
            close().await;
        }
    }

    pub(crate) fn set_application(&self, application: ApplicationTask) {
        *lock(&self.application) = Some(application);
    }

    pub(crate) fn application(&self) -> Option<ApplicationTask> {
        lock(&self.application).clone()
    }

    pub(crate) fn set_transport(&self, transport: TransportAdapter) {
        *lock(&self.transport) = Some(transport);
    }

    /// Get the transport adapter bound to the connection
    pub fn transport(&self) -> Option<TransportAdapter> {
        lock(&self.transport).clone()
    }

    /// Tear the connection down after it left the registry.
    ///
    /// Aborts the transport and the channel, then runs the close callback in
    /// the background. Returns `false` if the connection was already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!(connection_id = %self.id(), "disposing connection");
        if let Some(transport) = lock(&self.transport).as_ref() {
            transport.abort();
        }
        self.connection.abort();
        let close = lock(&self.close).take();
        if let Some(close) = close {
            tokio::spawn(close());
        }
        true
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("id", self.id())
            .field("active", &self.is_active())
            .field("disposed", &self.is_disposed())
            .field("transport", &self.transport().map(|t| t.kind()))
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
