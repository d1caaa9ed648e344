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

//! Sockline transport host
//!
//! Serves the WebSockets, Server-Sent Events and long-polling transports
//! under one base path and echoes every message back to its sender.
//!
//! ```bash
//! sockline-server --bind 0.0.0.0:8080 --transports websockets,long-polling
//! ```

mod cli;
mod echo;

use crate::cli::Cli;
use crate::echo::EchoEndpoint;
use clap::Parser;
use sockline_service::Dispatcher;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let dispatcher = Dispatcher::new(cli.transport_config(), Arc::new(EchoEndpoint))?;
    let listener = TcpListener::bind(cli.bind).await?;
    info!(address = %listener.local_addr()?, base_path = %cli.base_path, "listening");

    let shutdown = {
        let dispatcher = dispatcher.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", err);
            }
            info!("shutting down");
            for connection in dispatcher.registry().connection_infos() {
                info!(
                    connection_id = %connection.id,
                    transport = ?connection.transport,
                    active = connection.active,
                    age = ?connection.duration(),
                    idle = ?connection.idle_duration(),
                    "closing connection"
                );
            }
            dispatcher.shutdown().await;
        }
    };

    axum::serve(listener, dispatcher.router())
        .with_graceful_shutdown(shutdown)
        .await?;

    let stats = dispatcher.metrics().snapshot();
    info!(
        total_connections = stats.total_connections,
        messages_sent = stats.messages_sent,
        messages_received = stats.messages_received,
        bytes_sent_per_sec = stats.bytes_sent_per_sec(),
        bytes_received_per_sec = stats.bytes_received_per_sec(),
        "server stopped"
    );
    Ok(())
}
