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

//! Dispatcher and registry configuration

use crate::{Result, TransportError, TransportKind};
use std::time::Duration;

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Path prefix under which the transport routes are mounted (`""` or `/x`)
    pub base_path: String,
    /// How long a connection may stay inactive before it is evicted
    pub eviction_timeout: Duration,
    /// How often the registry sweeps for stale connections
    pub sweep_interval: Duration,
    /// How long a long-poll waits for output before returning empty
    pub poll_timeout: Duration,
    /// How long to wait for the client to answer a WebSocket close frame
    pub websocket_close_timeout: Duration,
    /// Number of buffers each pipe holds before writers wait
    pub channel_capacity: usize,
    /// Transports this dispatcher accepts
    pub transports: Vec<TransportKind>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            eviction_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(90),
            websocket_close_timeout: Duration::from_secs(5),
            channel_capacity: 32,
            transports: TransportKind::ALL.to_vec(),
        }
    }
}

impl TransportConfig {
    /// Create a configuration mounted at `base_path`
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Default::default()
        }
    }

    /// Set the route prefix
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set the inactivity eviction timeout
    pub fn with_eviction_timeout(mut self, timeout: Duration) -> Self {
        self.eviction_timeout = timeout;
        self
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the long-poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the WebSocket close handshake timeout
    pub fn with_websocket_close_timeout(mut self, timeout: Duration) -> Self {
        self.websocket_close_timeout = timeout;
        self
    }

    /// Set the per-pipe buffer capacity
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Restrict the accepted transports
    pub fn with_transports(mut self, transports: impl IntoIterator<Item = TransportKind>) -> Self {
        self.transports = transports.into_iter().collect();
        self
    }

    /// Check if a transport is accepted
    pub fn is_enabled(&self, kind: TransportKind) -> bool {
        self.transports.contains(&kind)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(TransportError::Config(format!(
                "base_path must start with '/': {}",
                self.base_path
            )));
        }
        if self.base_path.ends_with('/') {
            return Err(TransportError::Config(format!(
                "base_path must not end with '/': {}",
                self.base_path
            )));
        }
        if self.eviction_timeout.is_zero() {
            return Err(TransportError::Config(
                "eviction_timeout must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(TransportError::Config(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }
        if self.poll_timeout.is_zero() {
            return Err(TransportError::Config(
                "poll_timeout must be greater than 0".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(TransportError::Config(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.transports.is_empty() {
            return Err(TransportError::Config(
                "at least one transport must be enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the full path of a transport route
    pub(crate) fn route(&self, suffix: &str) -> String {
        format!("{}/{}", self.base_path, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.base_path, "");
        assert_eq!(config.eviction_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.poll_timeout, Duration::from_secs(90));
        assert_eq!(config.transports, TransportKind::ALL.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = TransportConfig::new("/sockets")
            .with_eviction_timeout(Duration::from_secs(10))
            .with_sweep_interval(Duration::from_millis(250))
            .with_poll_timeout(Duration::from_secs(5))
            .with_websocket_close_timeout(Duration::from_secs(1))
            .with_channel_capacity(8)
            .with_transports([TransportKind::WebSockets]);

        assert_eq!(config.base_path, "/sockets");
        assert_eq!(config.eviction_timeout, Duration::from_secs(10));
        assert_eq!(config.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.poll_timeout, Duration::from_secs(5));
        assert_eq!(config.websocket_close_timeout, Duration::from_secs(1));
        assert_eq!(config.channel_capacity, 8);
        assert!(config.is_enabled(TransportKind::WebSockets));
        assert!(!config.is_enabled(TransportKind::LongPolling));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_route() {
        assert_eq!(TransportConfig::default().route("poll"), "/poll");
        assert_eq!(TransportConfig::new("/chat").route("ws"), "/chat/ws");
    }

    #[test]
    fn test_validation() {
        assert!(TransportConfig::new("chat").validate().is_err());
        assert!(TransportConfig::new("/chat/").validate().is_err());
        assert!(
            TransportConfig::default()
                .with_eviction_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            TransportConfig::default()
                .with_poll_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            TransportConfig::default()
                .with_channel_capacity(0)
                .validate()
                .is_err()
        );
        assert!(
            TransportConfig::default()
                .with_transports([])
                .validate()
                .is_err()
        );
    }
}
