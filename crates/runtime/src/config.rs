/*
Copyright 2024-2025 The Graphbridge Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

/// Runtime configuration for `serve`.
#[derive(Parser, Debug, Clone)]
#[clap(rename_all = "kebab-case")]
pub struct Config {
    /// Directory holding the schema project.
    #[arg(long, value_name = "DIR", default_value = "./schema", help_heading = "Schema")]
    pub schema_root: PathBuf,

    /// Root package for generated services and messages.
    #[arg(long, value_name = "NAME", default_value = "bridge", help_heading = "Schema")]
    pub root_package: String,

    /// Address the GraphQL HTTP endpoint binds to.
    #[arg(
        long,
        value_name = "BIND_ADDRESS",
        default_value = "127.0.0.1:8080",
        help_heading = "HTTP"
    )]
    pub http_bind_address: SocketAddr,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 30, help_heading = "HTTP")]
    pub request_timeout: u64,

    /// Maximum accepted HTTP body size in bytes.
    #[arg(
        long,
        value_name = "BYTES",
        default_value_t = 2 * 1024 * 1024,
        help_heading = "HTTP"
    )]
    pub max_body_bytes: usize,

    /// Serve the rendered client schema on GET /graphql/schema.
    #[arg(long, default_value_t = true, action = ArgAction::Set, help_heading = "HTTP")]
    pub introspection: bool,

    /// Inbound header names forwarded verbatim to backends (repeatable).
    #[arg(
        long = "forward-header",
        value_name = "NAME",
        action = ArgAction::Append,
        help_heading = "HTTP"
    )]
    pub forward_headers: Vec<String>,

    /// Backend endpoint mapping, ServiceFullName=host:port; `*` is the
    /// default for services without a specific mapping (repeatable).
    #[arg(
        long = "backend",
        value_name = "SERVICE=HOST:PORT",
        action = ArgAction::Append,
        value_parser = parse_backend,
        help_heading = "Backends"
    )]
    pub backends: Vec<(String, String)>,

    /// Maximum pooled connections per backend endpoint.
    #[arg(long, default_value_t = 8, help_heading = "Backends")]
    pub max_conns_per_endpoint: usize,

    /// Default RPC timeout in seconds; request deadlines are capped by it.
    #[arg(long, value_name = "SECONDS", default_value_t = 10, help_heading = "Backends")]
    pub rpc_timeout: u64,

    /// Enable Prometheus metrics on this address. (disabled by default)
    #[arg(long, value_name = "BIND_ADDRESS", help_heading = "Metrics")]
    pub metrics: Option<SocketAddr>,
}

impl Config {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout)
    }
}

fn parse_backend(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((service, endpoint)) if !service.is_empty() && !endpoint.is_empty() => {
            Ok((service.to_string(), endpoint.to_string()))
        }
        _ => Err("Invalid backend mapping. Use ServiceFullName=host:port".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_mapping_parses() {
        assert_eq!(
            parse_backend("demo.UsersService=localhost:4000"),
            Ok(("demo.UsersService".to_string(), "localhost:4000".to_string()))
        );
        assert_eq!(
            parse_backend("*=localhost:4000"),
            Ok(("*".to_string(), "localhost:4000".to_string()))
        );
        assert!(parse_backend("nonsense").is_err());
        assert!(parse_backend("=x").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["bridged"]);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.rpc_timeout(), Duration::from_secs(10));
        assert!(config.backends.is_empty());
        assert!(config.introspection);
    }
}
