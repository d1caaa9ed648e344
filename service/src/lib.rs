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

//! Sockline Service
//!
//! Durable logical connections carried over whichever HTTP transport a client
//! can use: WebSockets, Server-Sent Events or long-polling. Application code
//! implements [`Endpoint`] once and sees the same [`Connection`] API no
//! matter which transport is underneath.
//!
//! - Connections survive transport reattachment; long-polling binds a new
//!   HTTP request to the same connection on every poll
//! - Lock-free registry with periodic eviction of inactive connections
//! - Ordered sends from any number of tasks
//! - Lock-free metrics mirrored to the `metrics` facade
//!
//! # Architecture
//!
//! ```text
//! Dispatcher (axum routes)
//!     ↓
//! ConnectionRegistry → ConnectionState → Connection → ChannelPair
//!     ↓
//! TransportAdapter (WebSockets | ServerSentEvents | LongPolling)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sockline_service::{Connection, Dispatcher, Endpoint, TransportConfig};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Endpoint for Echo {
//!     async fn on_connected(&self, connection: Connection) {
//!         while let Some(message) = connection.receive().await {
//!             let _ = connection.send(message).await;
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Dispatcher::new(TransportConfig::new("/echo"), Arc::new(Echo))?;
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, dispatcher.router()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod dispatcher;
mod endpoint;
mod error;
mod metrics;
mod registry;
pub mod transport;
mod types;

pub use config::TransportConfig;
pub use connection::{ApplicationTask, CloseCallback, Connection, ConnectionState};
pub use dispatcher::{ConnectionQuery, Dispatcher};
pub use endpoint::{Endpoint, FnEndpoint, endpoint_fn};
pub use error::{Result, TransportError};
pub use crate::metrics::{MetricsSnapshot, TransportMetrics};
pub use registry::ConnectionRegistry;
pub use transport::TransportAdapter;
pub use types::{
    ConnectionId, ConnectionInfo, ConnectionMetadata, Principal, TransferFormat, TransportKind,
};
