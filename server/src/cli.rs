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

//! Command line options

use clap::{Parser, ValueEnum};
use sockline_service::{TransportConfig, TransportKind};
use std::net::SocketAddr;
use std::time::Duration;

/// Transport selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Websockets,
    Sse,
    LongPolling,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Websockets => TransportKind::WebSockets,
            TransportArg::Sse => TransportKind::ServerSentEvents,
            TransportArg::LongPolling => TransportKind::LongPolling,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sockline-server")]
#[command(about = "Logical connection transport host with an echo endpoint")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "SOCKLINE_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Path prefix for the transport routes
    #[arg(long, env = "SOCKLINE_BASE_PATH", default_value = "/sockets")]
    pub base_path: String,

    /// Seconds an inactive connection survives before eviction
    #[arg(long, default_value_t = 30)]
    pub eviction_timeout_secs: u64,

    /// Seconds a long poll waits for data
    #[arg(long, default_value_t = 90)]
    pub poll_timeout_secs: u64,

    /// Enabled transports
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values = ["websockets", "sse", "long-polling"]
    )]
    pub transports: Vec<TransportArg>,
}

impl Cli {
    /// Build the transport configuration described by these options
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.base_path.clone())
            .with_eviction_timeout(Duration::from_secs(self.eviction_timeout_secs))
            .with_poll_timeout(Duration::from_secs(self.poll_timeout_secs))
            .with_transports(self.transports.iter().copied().map(TransportKind::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["sockline-server"]);
        let config = cli.transport_config();

        assert_eq!(cli.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.base_path, "/sockets");
        assert_eq!(config.eviction_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_timeout, Duration::from_secs(90));
        assert_eq!(config.transports, TransportKind::ALL.to_vec());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transport_list() {
        let cli = Cli::parse_from([
            "sockline-server",
            "--transports",
            "sse,long-polling",
            "--base-path",
            "/chat",
        ]);
        let config = cli.transport_config();

        assert!(!config.is_enabled(TransportKind::WebSockets));
        assert!(config.is_enabled(TransportKind::ServerSentEvents));
        assert!(config.is_enabled(TransportKind::LongPolling));
        assert_eq!(config.base_path, "/chat");
    }

    #[test]
    fn test_rejects_unknown_transport() {
        let parsed = Cli::try_parse_from(["sockline-server", "--transports", "carrier-pigeon"]);
        assert!(parsed.is_err());
    }
}
