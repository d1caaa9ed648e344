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

//! Long-polling transport

use crate::{ConnectionId, TransportMetrics};
use bytes::Bytes;
use sockline_channel::ChannelPair;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Result of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A buffer of output for the client
    Data(Bytes),
    /// Nothing to deliver yet; the client should poll again
    Empty,
    /// The connection is over; the client must stop polling
    Ended,
}

/// Long-polling adapter. One instance serves every poll of a connection.
#[derive(Debug, Clone)]
pub struct LongPollingTransport {
    connection_id: ConnectionId,
    channel: Arc<ChannelPair>,
    poll_timeout: Duration,
    metrics: Arc<TransportMetrics>,
    aborted: CancellationToken,
}

impl LongPollingTransport {
    /// Create an adapter reading from `channel`'s output
    pub fn new(
        connection_id: ConnectionId,
        channel: Arc<ChannelPair>,
        poll_timeout: Duration,
        metrics: Arc<TransportMetrics>,
    ) -> Self {
        Self {
            connection_id,
            channel,
            poll_timeout,
            metrics,
            aborted: CancellationToken::new(),
        }
    }

    /// Serve one poll.
    ///
    /// The first poll of a connection passes `wait = false` and returns
    /// whatever is buffered right now. Later polls wait up to the poll timeout
    /// for output. Once the output ends, the adapter aborts itself and every
    /// later poll reports [`PollOutcome::Ended`].
    #[instrument(level = "debug", skip(self), fields(connection_id = %self.connection_id))]
    pub async fn process_request(&self, wait: bool) -> PollOutcome {
        if self.aborted.is_cancelled() {
            return PollOutcome::Ended;
        }
        let output = self.channel.output();

        let outcome = if wait {
            tokio::select! {
                biased;
                _ = self.aborted.cancelled() => PollOutcome::Ended,
                read = tokio::time::timeout(self.poll_timeout, output.read()) => match read {
                    Ok(Some(data)) => PollOutcome::Data(data),
                    Ok(None) => PollOutcome::Ended,
                    Err(_) => {
                        trace!("poll timed out");
                        self.metrics.poll_timed_out();
                        PollOutcome::Empty
                    }
                },
            }
        } else {
            match output.try_read() {
                Ok(Some(data)) => PollOutcome::Data(data),
                Ok(None) => PollOutcome::Empty,
                Err(_) => PollOutcome::Ended,
            }
        };

        match &outcome {
            PollOutcome::Data(data) => self.metrics.message_sent(data.len()),
            PollOutcome::Ended => {
                debug!("long-polling output ended");
                self.abort();
            }
            PollOutcome::Empty => {}
        }
        self.metrics.poll_completed();
        outcome
    }

    /// Stop serving polls; an in-flight poll returns [`PollOutcome::Ended`]
    pub fn abort(&self) {
        self.aborted.cancel();
    }

    /// Check if the adapter was aborted
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_cancelled()
    }
}
