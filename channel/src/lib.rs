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

//! Sockline Channels
//!
//! Byte plumbing shared by every Sockline transport:
//!
//! - [`Pipe`]: a bounded, single-direction byte pipe with a writer that can be
//!   completed (graceful end of stream) or aborted (hard stop).
//! - [`ChannelPair`]: the two pipes of a logical connection. `input` carries
//!   client to application traffic, `output` carries application to client.
//! - [`WriteQueue`]: an ordered queue of asynchronous write operations that
//!   runs each operation only after its predecessor finished.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use sockline_channel::{ChannelOrigin, ChannelPair};
//!
//! # async fn example() {
//! let pair = ChannelPair::new(ChannelOrigin::Http, 16);
//! pair.input().write(Bytes::from_static(b"hello")).await.unwrap();
//! assert_eq!(pair.input().read().await, Some(Bytes::from_static(b"hello")));
//! pair.dispose();
//! # }
//! ```

mod error;
mod pair;
mod pipe;
mod queue;

pub use error::{ChannelError, Result};
pub use pair::{ChannelOrigin, ChannelPair};
pub use pipe::Pipe;
pub use queue::{WriteHandle, WriteQueue};
