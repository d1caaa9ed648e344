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

//! Core types for Sockline connections

use crate::TransportError;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque identifier of a logical connection.
///
/// Generated from a random v4 UUID, so it is unguessable and never reused
/// within a process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    /// Generate a fresh random connection ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

/// Transport carrying a logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Full-duplex WebSocket
    WebSockets,
    /// Server-Sent Events stream plus `/send` for input
    ServerSentEvents,
    /// Repeated `/poll` requests plus `/send` for input
    LongPolling,
}

impl TransportKind {
    /// Every supported transport
    pub const ALL: [TransportKind; 3] = [
        TransportKind::WebSockets,
        TransportKind::ServerSentEvents,
        TransportKind::LongPolling,
    ];

    /// Get the transport name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSockets => "WebSockets",
            Self::ServerSentEvents => "ServerSentEvents",
            Self::LongPolling => "LongPolling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How payloads are framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferFormat {
    /// UTF-8 text frames
    #[default]
    Text,
    /// Opaque binary frames
    Binary,
}

impl TransferFormat {
    /// Get the format name as used in query strings
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }

    /// Content type used for HTTP response bodies carrying this format
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Binary => "application/octet-stream",
        }
    }
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferFormat {
    type Err = TransportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("text") {
            Ok(Self::Text)
        } else if value.eq_ignore_ascii_case("binary") {
            Ok(Self::Binary)
        } else {
            Err(TransportError::InvalidFormat(value.to_string()))
        }
    }
}

/// Authenticated identity attached to a connection.
///
/// A host's authentication layer inserts a `Principal` as a request
/// extension; the dispatcher copies it into the connection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// User name
    pub name: String,
}

impl Principal {
    /// Create a principal for the named user
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Per-connection metadata visible to the endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMetadata {
    /// Transport that bound the connection
    pub transport: Option<TransportKind>,
    /// Requested transfer format
    pub format: TransferFormat,
    /// Raw `formatType` query value, if present
    pub format_type: Option<String>,
    /// Authenticated user, if any
    pub user: Option<Principal>,
}

/// Connection information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// Bound transport, `None` while only reserved
    pub transport: Option<TransportKind>,
    /// Whether a transport is currently attached
    pub active: bool,
    /// When the connection was created
    pub created_at: Instant,
    /// Last time a transport touched the connection
    pub last_seen: Instant,
}

impl ConnectionInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_connection_id_generation() {
        let ids: HashSet<ConnectionId> = (0..1000).map(|_| ConnectionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        for id in &ids {
            assert_eq!(id.as_str().len(), 36);
            assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
        }
    }

    #[test]
    fn test_connection_id_lookup_by_str() {
        let id = ConnectionId::from("abc");
        let ids: HashSet<ConnectionId> = [id.clone()].into_iter().collect();
        assert!(ids.contains("abc"));
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn test_transfer_format_parse() {
        assert_eq!("text".parse::<TransferFormat>().unwrap(), TransferFormat::Text);
        assert_eq!("Binary".parse::<TransferFormat>().unwrap(), TransferFormat::Binary);
        assert!(matches!(
            "json".parse::<TransferFormat>(),
            Err(TransportError::InvalidFormat(value)) if value == "json"
        ));
        assert_eq!(TransferFormat::default(), TransferFormat::Text);
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::WebSockets.to_string(), "WebSockets");
        assert_eq!(TransportKind::ServerSentEvents.to_string(), "ServerSentEvents");
        assert_eq!(TransportKind::LongPolling.to_string(), "LongPolling");
        assert_eq!(TransportKind::ALL.len(), 3);
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = ConnectionMetadata::default();
        assert_eq!(metadata.transport, None);
        assert_eq!(metadata.format, TransferFormat::Text);
        assert!(metadata.user.is_none());
    }
}
