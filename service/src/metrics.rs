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

//! Lock-free transport metrics
//!
//! Every recording method updates the local atomics and forwards the same
//! event to the `metrics` facade under the `sockline.*` namespace, so hosts
//! can install any exporter while tests read [`TransportMetrics::snapshot`].

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free transport metrics
#[derive(Debug)]
pub struct TransportMetrics {
    // Connection lifecycle
    total_connections: AtomicU64,
    registered_connections: AtomicU64,
    reservations: AtomicU64,
    evictions: AtomicU64,

    // Throughput
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,

    // Long polling
    polls: AtomicU64,
    poll_timeouts: AtomicU64,

    // Errors
    transport_errors: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,
    closed_connections: AtomicU64,

    started_at: Instant,
}

impl Default for TransportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            registered_connections: AtomicU64::new(0),
            reservations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            polls: AtomicU64::new(0),
            poll_timeouts: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            closed_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record an ID reserved through `/getid`
    pub fn connection_reserved(&self) {
        self.reservations.fetch_add(1, Ordering::Relaxed);
        self.registered_connections.fetch_add(1, Ordering::Relaxed);
        counter!("sockline.connections.reserved").increment(1);
        gauge!("sockline.connections.registered").increment(1.0);
    }

    /// Record a connection created directly by a persistent transport
    pub fn connection_registered(&self) {
        self.registered_connections.fetch_add(1, Ordering::Relaxed);
        gauge!("sockline.connections.registered").increment(1.0);
    }

    /// Record a transport binding to a connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        counter!("sockline.connections.total").increment(1);
    }

    /// Record a connection leaving the registry
    pub fn connection_closed(&self, duration: Duration) {
        self.registered_connections.fetch_sub(1, Ordering::Relaxed);
        self.closed_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("sockline.connections.registered").decrement(1.0);
        histogram!("sockline.connections.duration").record(duration.as_secs_f64());
    }

    /// Record a connection evicted by the sweep
    pub fn connection_evicted(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        counter!("sockline.connections.evicted").increment(1);
    }

    /// Get the number of connections currently in the registry
    pub fn registered_connections(&self) -> u64 {
        self.registered_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of transport bindings
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record a buffer delivered to a client
    pub fn message_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("sockline.messages.sent").increment(1);
        counter!("sockline.bytes.sent").increment(bytes as u64);
    }

    /// Record a buffer received from a client
    pub fn message_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        counter!("sockline.messages.received").increment(1);
        counter!("sockline.bytes.received").increment(bytes as u64);
    }

    // Long polling

    /// Record a completed poll request
    pub fn poll_completed(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        counter!("sockline.polls.total").increment(1);
    }

    /// Record a poll that returned empty after waiting
    pub fn poll_timed_out(&self) {
        self.poll_timeouts.fetch_add(1, Ordering::Relaxed);
        counter!("sockline.polls.timeouts").increment(1);
    }

    // Error tracking

    /// Record a transport level failure
    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        counter!("sockline.errors.transport").increment(1);
    }

    // Snapshot

    /// Get a point-in-time view of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            registered_connections: self.registered_connections.load(Ordering::Relaxed),
            reservations: self.reservations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self.closed_connections.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of transport metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total transport bindings since start
    pub total_connections: u64,
    /// Connections currently in the registry, reserved ones included
    pub registered_connections: u64,
    /// IDs handed out by `/getid`
    pub reservations: u64,
    /// Connections removed by the inactivity sweep
    pub evictions: u64,
    /// Total bytes delivered to clients
    pub bytes_sent: u64,
    /// Total bytes received from clients
    pub bytes_received: u64,
    /// Total buffers delivered to clients
    pub messages_sent: u64,
    /// Total buffers received from clients
    pub messages_received: u64,
    /// Completed poll requests
    pub polls: u64,
    /// Polls that returned empty after the poll timeout
    pub poll_timeouts: u64,
    /// Transport level failures
    pub transport_errors: u64,
    /// Time since the metrics were created
    pub uptime: Duration,
    /// Average lifetime of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate bytes per second (sent)
    pub fn bytes_sent_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_sent as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate bytes per second (received)
    pub fn bytes_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.bytes_received as f64 / self.uptime.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_connection_tracking() {
        let metrics = TransportMetrics::new();
        metrics.connection_reserved();
        metrics.connection_registered();
        metrics.connection_opened();
        assert_eq!(metrics.registered_connections(), 2);
        assert_eq!(metrics.total_connections(), 1);

        metrics.connection_closed(Duration::from_secs(2));
        metrics.connection_evicted();
        metrics.connection_closed(Duration::from_secs(4));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.registered_connections, 0);
        assert_eq!(snapshot.reservations, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.avg_connection_duration, Duration::from_secs(3));
    }

    #[test]
    fn test_throughput_tracking() {
        let metrics = TransportMetrics::new();
        metrics.message_sent(10);
        metrics.message_sent(5);
        metrics.message_received(7);
        metrics.poll_completed();
        metrics.poll_timed_out();
        metrics.transport_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.bytes_received, 7);
        assert_eq!(snapshot.polls, 1);
        assert_eq!(snapshot.poll_timeouts, 1);
        assert_eq!(snapshot.transport_errors, 1);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(TransportMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.message_received(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().bytes_received, 8000);
    }
}
