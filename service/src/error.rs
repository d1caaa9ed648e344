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

//! Error types for Sockline transports

use crate::types::{ConnectionId, TransportKind};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use sockline_channel::ChannelError;
use thiserror::Error;
use tracing::{debug, warn};

/// Result type for operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport error types
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error from the listener or socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel operation failed
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// No connection is registered under the requested ID
    #[error("Unknown connection id")]
    UnknownConnection(ConnectionId),

    /// The connection was closed while the request was in flight
    #[error("Connection closed")]
    ConnectionClosed(ConnectionId),

    /// The request did not carry a connection ID
    #[error("Connection ID required")]
    MissingConnectionId,

    /// The connection has no channel accepting HTTP input
    #[error("No channel")]
    NoChannel(ConnectionId),

    /// The connection is already bound to a transport
    #[error("Connection is already attached to a transport")]
    ConnectionInUse(ConnectionId),

    /// Another poll for the connection is still outstanding
    #[error("A poll is already in progress for this connection")]
    PollInProgress(ConnectionId),

    /// A request tried to reach a connection through a different transport
    #[error("Cannot change transports mid-connection")]
    TransportMismatch(ConnectionId),

    /// The transport is disabled for this dispatcher
    #[error("{0} transport not supported by this endpoint")]
    UnsupportedTransport(TransportKind),

    /// The `format` query value is not recognised
    #[error("Invalid transfer format: {0}")]
    InvalidFormat(String),

    /// DELETE termination attempted on a connection that is not long-polling
    #[error("Cannot terminate this connection using the DELETE endpoint.")]
    NotLongPolling(ConnectionId),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Check if the error was caused by the client request
    pub fn is_caller_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if the error is related to a specific connection
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            TransportError::UnknownConnection(id)
            | TransportError::ConnectionClosed(id)
            | TransportError::NoChannel(id)
            | TransportError::ConnectionInUse(id)
            | TransportError::PollInProgress(id)
            | TransportError::TransportMismatch(id)
            | TransportError::NotLongPolling(id) => Some(id),
            _ => None,
        }
    }

    /// HTTP status reported to the client
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransportError::UnknownConnection(_)
            | TransportError::ConnectionClosed(_)
            | TransportError::UnsupportedTransport(_) => StatusCode::NOT_FOUND,
            TransportError::MissingConnectionId
            | TransportError::NoChannel(_)
            | TransportError::TransportMismatch(_)
            | TransportError::InvalidFormat(_)
            | TransportError::NotLongPolling(_) => StatusCode::BAD_REQUEST,
            TransportError::ConnectionInUse(_) | TransportError::PollInProgress(_) => {
                StatusCode::CONFLICT
            }
            TransportError::Channel(error) if error.is_closed() => StatusCode::NOT_FOUND,
            TransportError::Channel(_) | TransportError::Io(_) | TransportError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_caller_error() {
            debug!(
                connection_id = ?self.connection_id(),
                %status,
                error = %self,
                "rejected request"
            );
        } else {
            warn!(connection_id = ?self.connection_id(), %status, error = %self, "request failed");
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
