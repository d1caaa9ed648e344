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

//! Connection registry
//!
//! The registry owns every logical connection between HTTP requests:
//! - Reserving IDs for `/getid` and creating connections for persistent transports
//! - Lock-free lookup by connection ID
//! - Periodic sweep evicting connections inactive past the eviction timeout
//! - Disposing everything on shutdown
//!
//! Whoever removes an entry from the map owns its disposal, so each
//! connection is disposed exactly once even when the sweep races an explicit
//! removal.

use crate::{
    ConnectionId, ConnectionInfo, ConnectionState, TransportConfig, TransportMetrics,
    connection::Connection,
};
use dashmap::DashMap;
use sockline_channel::{ChannelOrigin, ChannelPair};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

struct RegistryInner {
    connections: DashMap<ConnectionId, Arc<ConnectionState>>,
    eviction_timeout: Duration,
    sweep_interval: Duration,
    channel_capacity: usize,
    metrics: Arc<TransportMetrics>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Concurrent registry of logical connections.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create a registry. Call [`start`](Self::start) to begin sweeping.
    pub fn new(config: &TransportConfig, metrics: Arc<TransportMetrics>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: DashMap::new(),
                eviction_timeout: config.eviction_timeout,
                sweep_interval: config.sweep_interval,
                channel_capacity: config.channel_capacity,
                metrics,
                shutdown: CancellationToken::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Start the periodic sweep. Calling it again has no effect.
    pub fn start(&self) {
        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() || self.inner.shutdown.is_cancelled() {
            return;
        }

        let registry = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = Weak::upgrade(&registry) else { break };
                        ConnectionRegistry { inner }.sweep();
                    }
                }
            }
            trace!("registry sweeper stopped");
        }));
        debug!(interval = ?period, "registry sweeper started");
    }

    /// Reserve a fresh ID with an empty connection and no channel
    pub fn reserve(&self) -> ConnectionId {
        let id = ConnectionId::generate();
        let state = ConnectionState::new(Connection::new(id.clone()), false);
        self.inner.connections.insert(id.clone(), Arc::new(state));
        self.inner.metrics.connection_reserved();
        debug!(connection_id = %id, "reserved connection id");
        id
    }

    /// Register a new active connection bound to `channel`
    pub fn create(&self, channel: Arc<ChannelPair>) -> Arc<ConnectionState> {
        let id = ConnectionId::generate();
        let state = Arc::new(ConnectionState::new(
            Connection::with_channel(id.clone(), channel),
            true,
        ));
        self.inner.connections.insert(id.clone(), state.clone());
        self.inner.metrics.connection_registered();
        debug!(connection_id = %id, "created connection");
        state
    }

    /// Build a channel pair sized by the configured capacity
    pub fn new_channel(&self, origin: ChannelOrigin) -> Arc<ChannelPair> {
        Arc::new(ChannelPair::new(origin, self.inner.channel_capacity))
    }

    /// Look a connection up by ID
    pub fn try_get(&self, id: &str) -> Option<Arc<ConnectionState>> {
        self.inner
            .connections
            .get(id)
            .map(|entry| entry.value().clone())
    }

    /// Check if a connection is registered
    pub fn contains(&self, id: &str) -> bool {
        self.inner.connections.contains_key(id)
    }

    /// Mark a connection inactive without refreshing its last-seen time
    pub fn mark_inactive(&self, id: &str) {
        if let Some(state) = self.try_get(id) {
            state.set_active(false);
        }
    }

    /// Remove a connection. The caller owns disposal of the returned state.
    pub fn remove(&self, id: &str) -> Option<Arc<ConnectionState>> {
        let (_, state) = self.inner.connections.remove(id)?;
        self.record_removal(&state);
        trace!(connection_id = %state.id(), "removed connection");
        Some(state)
    }

    /// Remove and dispose a connection
    pub fn remove_and_dispose(&self, id: &str) -> bool {
        match self.remove(id) {
            Some(state) => state.dispose(),
            None => false,
        }
    }

    /// Evict and dispose every inactive connection idle past the timeout.
    ///
    /// Returns the number of connections evicted.
    #[instrument(level = "trace", skip(self))]
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let timeout = self.inner.eviction_timeout;

        let stale: Vec<ConnectionId> = self
            .inner
            .connections
            .iter()
            .filter(|entry| entry.value().is_evictable(now, timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for id in stale {
            let removed = self
                .inner
                .connections
                .remove_if(&id, |_, state| state.is_evictable(now, timeout));
            if let Some((_, state)) = removed {
                self.record_removal(&state);
                if state.dispose() {
                    self.inner.metrics.connection_evicted();
                    debug!(connection_id = %id, "evicted inactive connection");
                    evicted += 1;
                }
            }
        }
        evicted
    }

    /// Stop sweeping and dispose every registered connection
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        let ids: Vec<ConnectionId> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let count = ids.len();
        for id in ids {
            self.remove_and_dispose(id.as_str());
        }
        info!(connections = count, "connection registry shut down");
    }

    /// Check if the registry was shut down
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of registered connections, reservations included
    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    /// Check if no connections are registered
    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }

    /// Get information about all connections
    pub fn connection_infos(&self) -> Vec<ConnectionInfo> {
        self.inner
            .connections
            .iter()
            .map(|entry| {
                let state = entry.value();
                ConnectionInfo {
                    id: state.id().clone(),
                    transport: state.connection().transport(),
                    active: state.is_active(),
                    created_at: state.connection().created_at(),
                    last_seen: state.last_seen(),
                }
            })
            .collect()
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> &Arc<TransportMetrics> {
        &self.inner.metrics
    }

    fn record_removal(&self, state: &ConnectionState) {
        self.inner
            .metrics
            .connection_closed(state.connection().created_at().elapsed());
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("eviction_timeout", &self.inner.eviction_timeout)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tracing_test::traced_test;

    fn registry() -> ConnectionRegistry {
        let config = TransportConfig::default()
            .with_eviction_timeout(Duration::from_secs(30))
            .with_sweep_interval(Duration::from_secs(1));
        ConnectionRegistry::new(&config, Arc::new(TransportMetrics::new()))
    }

    #[tokio::test]
    async fn test_reserve_and_create_are_unique() {
        let registry = registry();
        let mut ids = HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(registry.reserve()));
            let state = registry.create(registry.new_channel(ChannelOrigin::Duplex));
            assert!(ids.insert(state.id().clone()));
        }
        assert_eq!(registry.len(), 200);
        assert_eq!(registry.metrics().registered_connections(), 200);
    }

    #[tokio::test]
    async fn test_reserved_entry_has_no_channel() {
        let registry = registry();
        let id = registry.reserve();
        let state = registry.try_get(id.as_str()).unwrap();
        assert!(!state.connection().has_channel());
        assert!(!state.is_active());
        assert!(registry.try_get("missing").is_none());
    }

    #[tokio::test]
    async fn test_created_entry_is_active() {
        let registry = registry();
        let state = registry.create(registry.new_channel(ChannelOrigin::Http));
        assert!(state.is_active());
        assert!(state.connection().has_channel());
        assert!(registry.contains(state.id().as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_inactive_keeps_last_seen() {
        let registry = registry();
        let state = registry.create(registry.new_channel(ChannelOrigin::Http));
        let seen = state.last_seen();

        tokio::time::advance(Duration::from_secs(5)).await;
        registry.mark_inactive(state.id().as_str());

        assert!(!state.is_active());
        assert_eq!(state.last_seen(), seen);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_sweep_evicts_stale_inactive_only() {
        let registry = registry();
        let stale = registry.create(registry.new_channel(ChannelOrigin::Http));
        let busy = registry.create(registry.new_channel(ChannelOrigin::Http));
        let reserved = registry.reserve();
        stale.set_active(false);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(registry.sweep(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(registry.sweep(), 2);

        assert!(!registry.contains(stale.id().as_str()));
        assert!(!registry.contains(reserved.as_str()));
        assert!(registry.contains(busy.id().as_str()));
        assert!(stale.is_disposed());
        assert!(stale.connection().channel().unwrap().output().is_aborted());
        assert_eq!(registry.metrics().snapshot().evictions, 2);
        assert!(logs_contain("evicted inactive connection"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_postpones_eviction() {
        let registry = registry();
        let state = registry.create(registry.new_channel(ChannelOrigin::Http));
        state.set_active(false);

        tokio::time::advance(Duration::from_secs(20)).await;
        state.touch();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registry.sweep(), 0);
        assert!(registry.contains(state.id().as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep() {
        let registry = registry();
        registry.start();
        let id = registry.reserve();

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert!(!registry.contains(id.as_str()));
        registry.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_removal_disposes_once() {
        let config = TransportConfig::default().with_eviction_timeout(Duration::from_millis(1));
        let registry = ConnectionRegistry::new(&config, Arc::new(TransportMetrics::new()));
        let states: Vec<_> = (0..64)
            .map(|_| {
                let state = registry.create(registry.new_channel(ChannelOrigin::Http));
                state.set_active(false);
                state
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.sweep() })
        };
        let remover = {
            let registry = registry.clone();
            let ids: Vec<_> = states.iter().map(|s| s.id().clone()).collect();
            tokio::spawn(async move {
                ids.iter()
                    .filter(|id| registry.remove_and_dispose(id.as_str()))
                    .count()
            })
        };

        let evicted = sweeper.await.unwrap();
        let removed = remover.await.unwrap();
        assert_eq!(evicted + removed, states.len());
        assert!(registry.is_empty());
        assert!(states.iter().all(|state| state.is_disposed()));
        assert_eq!(registry.metrics().registered_connections(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_disposes_everything() {
        let registry = registry();
        registry.start();
        let state = registry.create(registry.new_channel(ChannelOrigin::Duplex));
        registry.reserve();

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert!(registry.is_shutdown());
        assert!(state.is_disposed());
    }
}
