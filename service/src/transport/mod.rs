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

//! Transport adapters
//!
//! Each adapter pumps bytes between one client-facing transport and the
//! connection's [`ChannelPair`](sockline_channel::ChannelPair). The dispatcher
//! stores the adapter in the connection state so it can be aborted from
//! elsewhere (eviction, DELETE termination, shutdown).

mod long_polling;
mod sse;
mod websockets;

pub use long_polling::{LongPollingTransport, PollOutcome};
pub use sse::{ServerSentEventsTransport, format_event};
pub use websockets::WebSocketsTransport;

use crate::TransportKind;

/// Transport bound to a connection
#[derive(Debug, Clone)]
pub enum TransportAdapter {
    /// Full-duplex WebSocket
    WebSockets(WebSocketsTransport),
    /// Server-Sent Events stream
    ServerSentEvents(ServerSentEventsTransport),
    /// Long-polling
    LongPolling(LongPollingTransport),
}

impl TransportAdapter {
    /// Get the transport kind
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportAdapter::WebSockets(_) => TransportKind::WebSockets,
            TransportAdapter::ServerSentEvents(_) => TransportKind::ServerSentEvents,
            TransportAdapter::LongPolling(_) => TransportKind::LongPolling,
        }
    }

    /// Stop the transport's pump
    pub fn abort(&self) {
        match self {
            TransportAdapter::WebSockets(transport) => transport.abort(),
            TransportAdapter::ServerSentEvents(transport) => transport.abort(),
            TransportAdapter::LongPolling(transport) => transport.abort(),
        }
    }

    /// Check if the transport was aborted
    pub fn is_aborted(&self) -> bool {
        match self {
            TransportAdapter::WebSockets(transport) => transport.is_aborted(),
            TransportAdapter::ServerSentEvents(transport) => transport.is_aborted(),
            TransportAdapter::LongPolling(transport) => transport.is_aborted(),
        }
    }
}

impl From<WebSocketsTransport> for TransportAdapter {
    fn from(transport: WebSocketsTransport) -> Self {
        TransportAdapter::WebSockets(transport)
    }
}

impl From<ServerSentEventsTransport> for TransportAdapter {
    fn from(transport: ServerSentEventsTransport) -> Self {
        TransportAdapter::ServerSentEvents(transport)
    }
}

impl From<LongPollingTransport> for TransportAdapter {
    fn from(transport: LongPollingTransport) -> Self {
        TransportAdapter::LongPolling(transport)
    }
}
