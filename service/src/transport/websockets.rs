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

//! WebSocket transport

use crate::{ConnectionId, TransferFormat, TransportMetrics};
use axum::extract::ws::{CloseFrame, Message, close_code};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sockline_channel::ChannelPair;
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Full-duplex WebSocket adapter
#[derive(Debug, Clone)]
pub struct WebSocketsTransport {
    connection_id: ConnectionId,
    channel: Arc<ChannelPair>,
    format: TransferFormat,
    close_timeout: Duration,
    metrics: Arc<TransportMetrics>,
    aborted: CancellationToken,
}

impl WebSocketsTransport {
    /// Create an adapter pumping between a socket and `channel`
    pub fn new(
        connection_id: ConnectionId,
        channel: Arc<ChannelPair>,
        format: TransferFormat,
        close_timeout: Duration,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            connection_id,
            channel,
            format,
            close_timeout,
            metrics,
            aborted: CancellationToken::new(),
        }
    }

    /// Run the receive and send loops over `socket` until either side ends.
    ///
    /// When the output ends first a close frame (1000) is sent and the client
    /// gets `close_timeout` to answer it. The input pipe is completed on
    /// return.
    #[instrument(level = "debug", skip_all, fields(connection_id = %self.connection_id))]
    pub async fn process_request<S, E>(&self, socket: S)
    where
        S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Send + Unpin,
        E: Display + Send,
    {
        let (sink, stream) = socket.split();
        let receiving = self.receive_loop(stream);
        let sending = self.send_loop(sink);
        tokio::pin!(receiving, sending);

        tokio::select! {
            _ = &mut receiving => debug!("client closed the websocket"),
            _ = &mut sending => {
                if timeout(self.close_timeout, &mut receiving).await.is_err() {
                    debug!("client did not answer the close frame in time");
                }
            }
            _ = self.aborted.cancelled() => debug!("websocket transport aborted"),
        }
        self.channel.input().complete();
    }

    async fn receive_loop<St, E>(&self, mut stream: St)
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display + Send,
    {
        while let Some(frame) = stream.next().await {
            let payload = match frame {
                Ok(Message::Text(text)) => Bytes::from(text),
                Ok(Message::Binary(data)) => Bytes::from(data),
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "received close frame");
                    break;
                }
                Err(error) => {
                    debug!(%error, "websocket receive failed");
                    self.metrics.transport_error();
                    break;
                }
            };
            let length = payload.len();
            if self.channel.input().write(payload).await.is_err() {
                break;
            }
            self.metrics.message_received(length);
        }
    }

    async fn send_loop<Si>(&self, mut sink: Si)
    where
        Si: Sink<Message> + Unpin,
        Si::Error: Display,
    {
        let mut close = CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Borrowed(""),
        };
        while let Some(buffer) = self.channel.output().read().await {
            let length = buffer.len();
            let message = match self.format {
                TransferFormat::Binary => Message::Binary(buffer.to_vec()),
                TransferFormat::Text => match String::from_utf8(buffer.to_vec()) {
                    Ok(text) => Message::Text(text),
                    Err(error) => {
                        warn!(%error, "output is not valid UTF-8 on a text websocket");
                        close = CloseFrame {
                            code: close_code::INVALID,
                            reason: Cow::Borrowed("Payload is not valid UTF-8"),
                        };
                        break;
                    }
                },
            };
            if let Err(error) = sink.send(message).await {
                debug!(%error, "websocket send failed");
                self.metrics.transport_error();
                return;
            }
            self.metrics.message_sent(length);
        }
        if let Err(error) = sink.send(Message::Close(Some(close))).await {
            debug!(%error, "failed to send close frame");
        }
    }

    /// Stop both loops
    pub fn abort(&self) {
        self.aborted.cancel();
    }

    /// Check if the adapter was aborted
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_cancelled()
    }
}
