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

//! Application endpoint contract

use crate::Connection;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Application logic served over a logical connection.
///
/// The dispatcher calls [`on_connected`](Endpoint::on_connected) once per
/// connection, as soon as a transport binds it. The connection ends when the
/// returned future completes: pending sends are flushed and the client sees
/// end of stream.
///
/// # Example
///
/// ```no_run
/// use sockline_service::{Connection, Endpoint};
/// use async_trait::async_trait;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Endpoint for Echo {
///     async fn on_connected(&self, connection: Connection) {
///         while let Some(message) = connection.receive().await {
///             if connection.send(message).await.is_err() {
///                 break;
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    /// Serve one connection until the application is done with it
    async fn on_connected(&self, connection: Connection);
}

/// Closure-based endpoint
///
/// # Example
///
/// ```no_run
/// use sockline_service::endpoint_fn;
///
/// let endpoint = endpoint_fn(|connection| async move {
///     let _ = connection.send("hello").await;
/// });
/// ```
pub struct FnEndpoint<F> {
    callback: F,
}

/// Wrap an async closure as an [`Endpoint`]
pub fn endpoint_fn<F, Fut>(callback: F) -> FnEndpoint<F>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnEndpoint { callback }
}

#[async_trait]
impl<F, Fut> Endpoint for FnEndpoint<F>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_connected(&self, connection: Connection) {
        (self.callback)(connection).await
    }
}

impl<F> fmt::Debug for FnEndpoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEndpoint").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fn_endpoint_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint: Arc<dyn Endpoint> = {
            let calls = calls.clone();
            Arc::new(endpoint_fn(move |_connection| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            }))
        };

        endpoint
            .on_connected(Connection::new(ConnectionId::generate()))
            .await;
        endpoint
            .on_connected(Connection::new(ConnectionId::generate()))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
