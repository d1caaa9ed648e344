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

//! Echo endpoint

use async_trait::async_trait;
use sockline_service::{Connection, Endpoint};
use tracing::{debug, info};

/// Writes every received message back to the same connection
#[derive(Debug, Default)]
pub struct EchoEndpoint;

#[async_trait]
impl Endpoint for EchoEndpoint {
    async fn on_connected(&self, connection: Connection) {
        info!(
            connection_id = %connection.id(),
            transport = ?connection.transport(),
            "client connected"
        );
        while let Some(message) = connection.receive().await {
            if connection.send(message).await.is_err() {
                debug!(connection_id = %connection.id(), "echo failed, output closed");
                break;
            }
        }
        info!(connection_id = %connection.id(), "client disconnected");
    }
}
