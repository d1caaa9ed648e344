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

//! Server-Sent Events transport

use crate::{ConnectionId, TransportMetrics};
use bytes::{Bytes, BytesMut};
use sockline_channel::{ChannelError, ChannelPair, WriteQueue};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Frame `payload` as one SSE event: a `data: ` line per payload line and a
/// terminating blank line.
pub fn format_event(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(payload.len() + 8);
    for line in payload.split(|byte| *byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(line);
        frame.extend_from_slice(b"\n");
    }
    frame.extend_from_slice(b"\n");
    frame.freeze()
}

/// Server-Sent Events adapter. Client input arrives through `/send`.
#[derive(Debug, Clone)]
pub struct ServerSentEventsTransport {
    connection_id: ConnectionId,
    channel: Arc<ChannelPair>,
    writes: Arc<WriteQueue>,
    metrics: Arc<TransportMetrics>,
    aborted: CancellationToken,
}

impl ServerSentEventsTransport {
    /// Create an adapter streaming `channel`'s output
    pub fn new(
        connection_id: ConnectionId,
        channel: Arc<ChannelPair>,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            connection_id,
            channel,
            writes: Arc::new(WriteQueue::new()),
            metrics,
            aborted: CancellationToken::new(),
        }
    }

    /// Pump output into the response body until the output ends, the client
    /// disconnects or the adapter is aborted.
    ///
    /// Frames go through an ordered write queue which is drained before
    /// returning, so every accepted frame reaches the body.
    #[instrument(level = "debug", skip_all, fields(connection_id = %self.connection_id))]
    pub async fn process_request(&self, body: mpsc::Sender<Bytes>) {
        loop {
            let buffer = tokio::select! {
                biased;
                _ = self.aborted.cancelled() => {
                    debug!("event stream aborted");
                    break;
                }
                _ = body.closed() => {
                    debug!("client disconnected from event stream");
                    break;
                }
                buffer = self.channel.output().read() => buffer,
            };
            let Some(buffer) = buffer else {
                debug!("event stream output ended");
                break;
            };

            let length = buffer.len();
            let frame = format_event(&buffer);
            let sender = body.clone();
            let aborted = self.aborted.clone();
            let written = self.writes.enqueue(move || async move {
                tokio::select! {
                    biased;
                    _ = aborted.cancelled() => Err(ChannelError::Closed),
                    sent = sender.send(frame) => sent.map_err(|_| ChannelError::Closed),
                }
            });
            match written.await {
                Ok(()) => self.metrics.message_sent(length),
                Err(_) if self.aborted.is_cancelled() => {
                    debug!("event stream aborted while writing");
                    break;
                }
                Err(_) => {
                    self.metrics.transport_error();
                    break;
                }
            }
        }
        let _ = self.writes.drain().await;
    }

    /// Stop the pump
    pub fn abort(&self) {
        self.aborted.cancel();
    }

    /// Check if the adapter was aborted
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockline_channel::ChannelOrigin;
    use tokio::time::{Duration, timeout};

    fn transport() -> (ServerSentEventsTransport, Arc<ChannelPair>) {
        let channel = Arc::new(ChannelPair::new(ChannelOrigin::Http, 4));
        let transport = ServerSentEventsTransport::new(
            ConnectionId::generate(),
            channel.clone(),
            Arc::new(TransportMetrics::new()),
        );
        (transport, channel)
    }

    #[test]
    fn test_format_single_line() {
        assert_eq!(format_event(b"hello"), Bytes::from_static(b"data: hello\n\n"));
    }

    #[test]
    fn test_format_multi_line() {
        assert_eq!(
            format_event(b"one\r\ntwo\nthree"),
            Bytes::from_static(b"data: one\ndata: two\ndata: three\n\n")
        );
    }

    #[tokio::test]
    async fn test_streams_output_as_events() {
        let (transport, channel) = transport();
        let (body, mut frames) = mpsc::channel(8);
        let pump = tokio::spawn({
            let transport = transport.clone();
            async move { transport.process_request(body).await }
        });

        channel.output().write(Bytes::from_static(b"a")).await.unwrap();
        channel.output().write(Bytes::from_static(b"b")).await.unwrap();
        channel.dispose();

        timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();
        assert_eq!(frames.recv().await, Some(Bytes::from_static(b"data: a\n\n")));
        assert_eq!(frames.recv().await, Some(Bytes::from_static(b"data: b\n\n")));
        assert_eq!(frames.recv().await, None);
    }

    #[tokio::test]
    async fn test_client_disconnect_ends_pump() {
        let (transport, _channel) = transport();
        let (body, frames) = mpsc::channel(8);
        drop(frames);
        timeout(Duration::from_secs(1), transport.process_request(body))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_abort_ends_pump_blocked_on_stalled_client() {
        let (transport, channel) = transport();
        let (body, _frames) = mpsc::channel(1);
        let pump = tokio::spawn({
            let transport = transport.clone();
            async move { transport.process_request(body).await }
        });

        channel.output().write(Bytes::from_static(b"fills")).await.unwrap();
        channel.output().write(Bytes::from_static(b"stalls")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.abort();
        channel.abort();

        timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_abort_ends_pump() {
        let (transport, _channel) = transport();
        let (body, _frames) = mpsc::channel(8);
        let pump = tokio::spawn({
            let transport = transport.clone();
            async move { transport.process_request(body).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.abort();
        timeout(Duration::from_secs(1), pump).await.unwrap().unwrap();
        assert!(transport.is_aborted());
    }
}
