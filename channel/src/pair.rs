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

//! Paired input/output pipes of a logical connection

use crate::Pipe;
use std::fmt;

/// How client to application bytes reach a channel pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrigin {
    /// Input arrives through separate HTTP requests (`/send`)
    Http,
    /// Input arrives on the same duplex socket as output (WebSockets)
    Duplex,
}

/// Input and output pipes bound to one logical connection.
///
/// The transport writes `input` and reads `output`; the application does the
/// reverse.
pub struct ChannelPair {
    input: Pipe,
    output: Pipe,
    origin: ChannelOrigin,
}

impl ChannelPair {
    /// Create a pair whose pipes each buffer up to `capacity` buffers
    pub fn new(origin: ChannelOrigin, capacity: usize) -> Self {
        Self {
            input: Pipe::new(capacity),
            output: Pipe::new(capacity),
            origin,
        }
    }

    /// Client to application pipe
    pub fn input(&self) -> &Pipe {
        &self.input
    }

    /// Application to client pipe
    pub fn output(&self) -> &Pipe {
        &self.output
    }

    /// Where input for this pair originates
    pub fn origin(&self) -> ChannelOrigin {
        self.origin
    }

    /// Gracefully end both directions. Buffered data remains readable.
    pub fn dispose(&self) {
        self.input.complete();
        self.output.complete();
    }

    /// Stop both directions immediately
    pub fn abort(&self) {
        self.input.abort();
        self.output.abort();
    }

    /// Check if both writers were completed
    pub fn is_disposed(&self) -> bool {
        self.input.is_completed() && self.output.is_completed()
    }
}

impl fmt::Debug for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPair")
            .field("origin", &self.origin)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelError;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_directions_are_independent() {
        let pair = ChannelPair::new(ChannelOrigin::Duplex, 4);
        pair.input().write(Bytes::from_static(b"in")).await.unwrap();
        pair.output().write(Bytes::from_static(b"out")).await.unwrap();

        assert_eq!(pair.output().read().await, Some(Bytes::from_static(b"out")));
        assert_eq!(pair.input().read().await, Some(Bytes::from_static(b"in")));
        assert_eq!(pair.origin(), ChannelOrigin::Duplex);
    }

    #[tokio::test]
    async fn test_dispose_keeps_buffered_output() {
        let pair = ChannelPair::new(ChannelOrigin::Http, 4);
        pair.output().write(Bytes::from_static(b"bye")).await.unwrap();
        pair.dispose();

        assert!(pair.is_disposed());
        assert_eq!(pair.output().read().await, Some(Bytes::from_static(b"bye")));
        assert_eq!(pair.output().read().await, None);
        assert_eq!(pair.input().read().await, None);
    }

    #[tokio::test]
    async fn test_abort_rejects_writes() {
        let pair = ChannelPair::new(ChannelOrigin::Http, 4);
        pair.abort();

        assert_eq!(
            pair.input().write(Bytes::from_static(b"x")).await,
            Err(ChannelError::Closed)
        );
        assert_eq!(
            pair.output().write(Bytes::from_static(b"x")).await,
            Err(ChannelError::Closed)
        );
    }
}
