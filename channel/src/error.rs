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

//! Error types for channel operations

use thiserror::Error;

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Channel error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The writer side of the pipe was completed; no further writes are accepted
    #[error("Channel writer completed")]
    Completed,

    /// The pipe was aborted or its reader is gone
    #[error("Channel closed")]
    Closed,

    /// The write queue was drained and accepts no new operations
    #[error("Write queue drained")]
    Drained,
}

impl ChannelError {
    /// Check if the error means the channel will never accept data again
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Completed | ChannelError::Closed)
    }
}
