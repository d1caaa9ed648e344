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

//! HTTP dispatcher
//!
//! Routes, relative to the configured base path:
//!
//! | Method | Path     | Purpose                                          |
//! |--------|----------|--------------------------------------------------|
//! | GET    | `/getid` | Reserve a connection ID (long-polling)           |
//! | POST   | `/send`  | Client to application bytes for HTTP transports  |
//! | GET    | `/sse`   | Server-Sent Events stream                        |
//! | GET    | `/ws`    | WebSocket upgrade                                |
//! | GET    | `/poll`  | Long-poll for application to client bytes        |
//! | DELETE | `/poll`  | Terminate a long-polling connection              |
//!
//! WebSockets and Server-Sent Events are persistent: one request carries the
//! whole connection, and whichever of the endpoint or the transport finishes
//! first decides how the other is shut down. Long-polling spreads a
//! connection over many requests; its endpoint task and close callback live in
//! the connection state between polls.

use crate::connection::{ApplicationTask, ConnectionState};
use crate::transport::{
    LongPollingTransport, PollOutcome, ServerSentEventsTransport, TransportAdapter,
    WebSocketsTransport,
};
use crate::{
    Connection, ConnectionRegistry, Endpoint, Principal, Result, TransferFormat, TransportConfig,
    TransportError, TransportKind, TransportMetrics,
};
use axum::Router;
use axum::body::Body;
use axum::extract::{Extension, Query, State, WebSocketUpgrade};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use futures::FutureExt;
use futures_util::stream;
use serde::Deserialize;
use sockline_channel::{ChannelOrigin, ChannelPair};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};

/// Query parameters shared by the transport routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionQuery {
    /// Connection ID
    pub id: Option<String>,
    /// Transfer format, `text` or `binary`
    pub format: Option<String>,
    /// Opaque format hint passed through to the endpoint
    #[serde(rename = "formatType")]
    pub format_type: Option<String>,
}

impl ConnectionQuery {
    fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(TransportError::MissingConnectionId)
    }

    fn transfer_format(&self) -> Result<TransferFormat> {
        match self.format.as_deref() {
            None | Some("") => Ok(TransferFormat::default()),
            Some(format) => format.parse(),
        }
    }
}

struct DispatcherInner {
    config: TransportConfig,
    registry: ConnectionRegistry,
    endpoint: Arc<dyn Endpoint>,
    metrics: Arc<TransportMetrics>,
}

/// Routes transport requests to logical connections and runs the endpoint.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Create a dispatcher and start the registry sweep.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: TransportConfig, endpoint: Arc<dyn Endpoint>) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(TransportMetrics::new());
        let registry = ConnectionRegistry::new(&config, metrics.clone());
        registry.start();
        info!(
            base_path = %config.base_path,
            transports = ?config.transports,
            "dispatcher ready"
        );
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                config,
                registry,
                endpoint,
                metrics,
            }),
        })
    }

    /// Build the axum router serving every transport route
    pub fn router(&self) -> Router {
        let config = &self.inner.config;
        Router::new()
            .route(&config.route("getid"), get(get_id))
            .route(&config.route("send"), post(send))
            .route(&config.route("sse"), get(server_sent_events))
            .route(&config.route("ws"), get(websockets))
            .route(&config.route("poll"), get(poll).delete(terminate))
            .with_state(self.clone())
    }

    /// Get the connection registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> Arc<TransportMetrics> {
        self.inner.metrics.clone()
    }

    /// Get the configuration
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Dispose every connection and stop the sweep
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher");
        self.inner.registry.shutdown().await;
        info!("Dispatcher shutdown complete");
    }

    fn ensure_enabled(&self, kind: TransportKind) -> Result<()> {
        if self.inner.config.is_enabled(kind) {
            Ok(())
        } else {
            Err(TransportError::UnsupportedTransport(kind))
        }
    }

    /// Check that `state` is still the live registry entry for its ID
    fn is_registered(&self, state: &ConnectionState) -> bool {
        !state.is_disposed() && self.inner.registry.contains(state.id().as_str())
    }

    /// Find or create the connection a persistent transport binds to
    fn bind_persistent(
        &self,
        query: &ConnectionQuery,
        kind: TransportKind,
        origin: ChannelOrigin,
        user: Option<Principal>,
    ) -> Result<(Arc<ConnectionState>, Arc<ChannelPair>)> {
        self.ensure_enabled(kind)?;
        let format = query.transfer_format()?;
        if kind == TransportKind::ServerSentEvents && format == TransferFormat::Binary {
            return Err(TransportError::InvalidFormat(
                "binary is not supported by server-sent events".to_string(),
            ));
        }

        let registry = &self.inner.registry;
        let reserved = query.id.as_deref().and_then(|id| registry.try_get(id));
        let (state, channel) = match reserved {
            Some(state) => {
                let channel = registry.new_channel(origin);
                state.connection().attach(channel.clone())?;
                state.set_active(true);
                state.touch();
                if !self.is_registered(&state) {
                    debug!(connection_id = %state.id(), "reservation evicted while binding");
                    state.connection().abort();
                    let channel = registry.new_channel(origin);
                    (registry.create(channel.clone()), channel)
                } else {
                    (state, channel)
                }
            }
            None => {
                let channel = registry.new_channel(origin);
                (registry.create(channel.clone()), channel)
            }
        };
        state.connection().update_metadata(|metadata| {
            metadata.transport = Some(kind);
            metadata.format = format;
            metadata.format_type = query.format_type.clone();
            metadata.user = user;
        });
        self.inner.metrics.connection_opened();
        debug!(connection_id = %state.id(), transport = %kind, "connection bound");
        Ok((state, channel))
    }

    /// Run a persistent transport alongside the endpoint until both finish
    #[instrument(
        level = "debug",
        skip_all,
        fields(connection_id = %state.id(), transport = %adapter.kind())
    )]
    async fn run_persistent<F>(
        self,
        state: Arc<ConnectionState>,
        adapter: TransportAdapter,
        transport: F,
    ) where
        F: Future<Output = ()> + Send,
    {
        let connection = state.connection().clone();
        state.set_transport(adapter);
        let application = self.spawn_endpoint(connection.clone());
        state.set_application(application.clone());
        tokio::pin!(transport);

        tokio::select! {
            _ = &mut transport => {
                debug!("transport ended before the application");
                connection.abort();
                application.await;
            }
            _ = application.clone() => {
                debug!("application ended before the transport");
                // Queued sends drain only while the transport keeps reading
                let closing = connection.close();
                tokio::pin!(closing);
                tokio::select! {
                    _ = &mut closing => transport.await,
                    _ = &mut transport => {
                        debug!("transport ended while closing");
                        connection.abort();
                        closing.await;
                    }
                }
            }
        }

        self.inner.registry.remove_and_dispose(connection.id().as_str());
        debug!("connection finished");
    }

    /// Start the endpoint on its own task
    fn spawn_endpoint(&self, connection: Connection) -> ApplicationTask {
        let endpoint = self.inner.endpoint.clone();
        let id = connection.id().clone();
        tokio::spawn(async move { endpoint.on_connected(connection).await }.in_current_span())
            .map(move |joined| {
                if let Err(error) = joined {
                    warn!(connection_id = %id, %error, "endpoint task failed");
                }
            })
            .boxed()
            .shared()
    }

    /// Bind a reserved connection to long-polling on its first poll
    fn start_long_polling(
        &self,
        state: &ConnectionState,
        query: &ConnectionQuery,
        user: Option<Principal>,
    ) -> Result<(LongPollingTransport, ApplicationTask)> {
        let format = query.transfer_format()?;
        let channel = self.inner.registry.new_channel(ChannelOrigin::Http);
        let connection = state.connection().clone();
        connection.attach(channel.clone())?;
        connection.update_metadata(|metadata| {
            metadata.transport = Some(TransportKind::LongPolling);
            metadata.format = format;
            metadata.format_type = query.format_type.clone();
            metadata.user = user;
        });

        let transport = LongPollingTransport::new(
            connection.id().clone(),
            channel,
            self.inner.config.poll_timeout,
            self.metrics(),
        );
        state.set_transport(transport.clone().into());
        if !self.is_registered(state) {
            debug!(connection_id = %state.id(), "reservation evicted while binding");
            transport.abort();
            connection.abort();
            return Err(TransportError::UnknownConnection(state.id().clone()));
        }

        let application = self.spawn_endpoint(connection.clone());
        state.set_application(application.clone());
        let finished = application.clone();
        state.set_close(Box::new(move || {
            async move {
                connection.close().await;
                finished.await;
            }
            .boxed()
        }));

        self.inner.metrics.connection_opened();
        debug!(connection_id = %state.id(), "long-polling connection started");
        Ok((transport, application))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

/// Releases a connection's poll slot when the poll request ends, however it
/// ends. Once the poll is bound, also marks the connection inactive.
struct PollGuard<'a> {
    registry: &'a ConnectionRegistry,
    state: &'a ConnectionState,
    bound: bool,
}

impl PollGuard<'_> {
    fn bind(&mut self) {
        self.bound = true;
        self.state.set_active(true);
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        if self.bound {
            self.state.touch();
            self.registry.mark_inactive(self.state.id().as_str());
        }
        self.state.end_poll();
    }
}

fn principal(user: Option<Extension<Principal>>) -> Option<Principal> {
    user.map(|Extension(user)| user)
}

async fn get_id(State(dispatcher): State<Dispatcher>) -> Response {
    let id = dispatcher.registry().reserve();
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        id.to_string(),
    )
        .into_response()
}

async fn send(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<ConnectionQuery>,
    body: Bytes,
) -> Result<StatusCode> {
    let id = query.require_id()?;
    let state = dispatcher
        .registry()
        .try_get(id)
        .ok_or_else(|| TransportError::UnknownConnection(id.into()))?;
    let channel = state
        .connection()
        .channel()
        .filter(|channel| channel.origin() == ChannelOrigin::Http)
        .cloned()
        .ok_or_else(|| TransportError::NoChannel(state.id().clone()))?;

    let length = body.len();
    channel
        .input()
        .write(body)
        .await
        .map_err(|_| TransportError::ConnectionClosed(state.id().clone()))?;
    dispatcher.metrics().message_received(length);
    Ok(StatusCode::OK)
}

async fn server_sent_events(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<ConnectionQuery>,
    user: Option<Extension<Principal>>,
) -> Result<Response> {
    let (state, channel) = dispatcher.bind_persistent(
        &query,
        TransportKind::ServerSentEvents,
        ChannelOrigin::Http,
        principal(user),
    )?;
    let transport =
        ServerSentEventsTransport::new(state.id().clone(), channel, dispatcher.metrics());
    let adapter = TransportAdapter::from(transport.clone());
    let (frames, body) = mpsc::channel::<Bytes>(dispatcher.config().channel_capacity);

    tokio::spawn(dispatcher.clone().run_persistent(state, adapter, async move {
        transport.process_request(frames).await
    }));

    let body = stream::unfold(body, |mut body| async move {
        body.recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame), body))
    });
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

async fn websockets(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<ConnectionQuery>,
    user: Option<Extension<Principal>>,
    upgrade: WebSocketUpgrade,
) -> Result<Response> {
    let (state, channel) = dispatcher.bind_persistent(
        &query,
        TransportKind::WebSockets,
        ChannelOrigin::Duplex,
        principal(user),
    )?;
    let transport = WebSocketsTransport::new(
        state.id().clone(),
        channel,
        state.connection().format(),
        dispatcher.config().websocket_close_timeout,
        dispatcher.metrics(),
    );
    let adapter = TransportAdapter::from(transport.clone());
    let registry = dispatcher.registry().clone();
    let failed = state.id().clone();

    Ok(upgrade
        .on_failed_upgrade(move |error| {
            warn!(connection_id = %failed, %error, "websocket upgrade failed");
            registry.remove_and_dispose(failed.as_str());
        })
        .on_upgrade(move |socket| {
            dispatcher.run_persistent(state, adapter, async move {
                transport.process_request(socket).await
            })
        }))
}

async fn poll(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<ConnectionQuery>,
    user: Option<Extension<Principal>>,
) -> Result<Response> {
    dispatcher.ensure_enabled(TransportKind::LongPolling)?;
    let id = query.require_id()?;
    let state = dispatcher
        .registry()
        .try_get(id)
        .ok_or_else(|| TransportError::UnknownConnection(id.into()))?;
    if !state.try_begin_poll() {
        return Err(TransportError::PollInProgress(state.id().clone()));
    }
    let mut guard = PollGuard {
        registry: dispatcher.registry(),
        state: &state,
        bound: false,
    };

    let first = !state.connection().has_channel();
    let (transport, application) = if first {
        // Active before binding so the sweep cannot evict the reservation
        guard.bind();
        match dispatcher.start_long_polling(&state, &query, principal(user)) {
            Ok(started) => started,
            Err(error @ TransportError::ConnectionInUse(_)) => {
                // Another transport won the reservation and owns its liveness
                guard.bound = false;
                return Err(error);
            }
            Err(error) => return Err(error),
        }
    } else {
        match (state.transport(), state.application()) {
            (Some(TransportAdapter::LongPolling(transport)), Some(application)) => {
                (transport, application)
            }
            _ => return Err(TransportError::TransportMismatch(state.id().clone())),
        }
    };
    if !first {
        guard.bind();
    }

    let request = transport.process_request(!first);
    tokio::pin!(request);
    let outcome = tokio::select! {
        biased;
        outcome = &mut request => outcome,
        _ = application.clone() => {
            debug!(connection_id = %state.id(), "application ended during poll");
            // Later polls drain what the application left queued
            let closing = state.clone();
            tokio::spawn(async move { closing.close().await });
            request.await
        }
    };

    let response = match outcome {
        PollOutcome::Data(data) => {
            let content_type = HeaderValue::from_static(state.connection().format().content_type());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_LENGTH, HeaderValue::from(data.len())),
                ],
                data,
            )
                .into_response()
        }
        PollOutcome::Empty => StatusCode::OK.into_response(),
        PollOutcome::Ended => {
            debug!(connection_id = %state.id(), "long-polling connection ended");
            dispatcher.registry().remove_and_dispose(state.id().as_str());
            StatusCode::NO_CONTENT.into_response()
        }
    };
    Ok(response)
}

async fn terminate(
    State(dispatcher): State<Dispatcher>,
    Query(query): Query<ConnectionQuery>,
) -> Result<Response> {
    let id = query.require_id()?;
    let state = dispatcher
        .registry()
        .try_get(id)
        .ok_or_else(|| TransportError::UnknownConnection(id.into()))?;
    let Some(TransportAdapter::LongPolling(transport)) = state.transport() else {
        return Err(TransportError::NotLongPolling(state.id().clone()));
    };

    info!(connection_id = %state.id(), "terminating long-polling connection");
    transport.abort();
    dispatcher.registry().remove_and_dispose(id);
    Ok((
        StatusCode::ACCEPTED,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "",
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(0));
        let endpoint = {
            let started = started.clone();
            endpoint_fn(move |_connection: Connection| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let dispatcher =
            Dispatcher::new(TransportConfig::new("/sockets"), Arc::new(endpoint)).unwrap();
        (dispatcher, started)
    }

    #[tokio::test]
    async fn test_evicted_reservation_does_not_start_long_polling() {
        let (dispatcher, started) = counting_dispatcher();
        let id = dispatcher.registry().reserve();
        let state = dispatcher.registry().try_get(id.as_str()).unwrap();

        // Evicted after the poll looked it up
        assert!(dispatcher.registry().remove_and_dispose(id.as_str()));
        state.set_active(true);

        let result = dispatcher.start_long_polling(&state, &ConnectionQuery::default(), None);
        assert!(matches!(result, Err(TransportError::UnknownConnection(_))));
        assert!(state.connection().channel().unwrap().output().is_aborted());
        assert!(state.transport().unwrap().is_aborted());

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert!(dispatcher.registry().is_empty());
    }

    #[tokio::test]
    async fn test_registered_reservation_starts_long_polling() {
        let (dispatcher, started) = counting_dispatcher();
        let id = dispatcher.registry().reserve();
        let state = dispatcher.registry().try_get(id.as_str()).unwrap();

        let (transport, application) = dispatcher
            .start_long_polling(&state, &ConnectionQuery::default(), None)
            .unwrap();
        application.await;

        assert!(!transport.is_aborted());
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(state.connection().transport(), Some(TransportKind::LongPolling));
    }

    #[tokio::test]
    async fn test_reserved_id_binds_persistent_transport() {
        let (dispatcher, _started) = counting_dispatcher();
        let id = dispatcher.registry().reserve();
        let query = ConnectionQuery {
            id: Some(id.to_string()),
            ..ConnectionQuery::default()
        };

        let (state, channel) = dispatcher
            .bind_persistent(
                &query,
                TransportKind::ServerSentEvents,
                ChannelOrigin::Http,
                None,
            )
            .unwrap();
        assert_eq!(state.id(), &id);
        assert!(state.is_active());
        assert!(Arc::ptr_eq(state.connection().channel().unwrap(), &channel));
    }
}
