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

//! Per-request context assembly: request id, deadline, forwarded metadata.

use http::HeaderMap;
use rpc_client::CallContext;

use crate::config::Config;

/// Builds the call context carried through the executor and the transport. A
/// fresh request id is synthesized per request; inbound headers named in the
/// configuration are forwarded verbatim with lowercased names.
#[must_use]
pub fn build_call_context(config: &Config, headers: &HeaderMap) -> CallContext {
    let request_id = uuid::Uuid::new_v4().to_string();

    let mut metadata = Vec::new();
    for name in &config.forward_headers {
        let lowered = name.to_ascii_lowercase();
        if let Some(value) = headers.get(&lowered) {
            if let Ok(value) = value.to_str() {
                metadata.push((lowered, value.to_string()));
            } else {
                tracing::debug!("Skipping forwarded header with non-ASCII value: {lowered}");
            }
        }
    }

    CallContext::new(request_id)
        .with_timeout(config.request_timeout())
        .with_metadata(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_forwarded_headers_are_selected_and_lowercased() {
        let config = Config::parse_from([
            "bridged",
            "--forward-header",
            "X-Tenant",
            "--forward-header",
            "Accept-Language",
        ]);
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant", "acme".parse().expect("header value"));
        headers.insert("x-secret", "nope".parse().expect("header value"));

        let ctx = build_call_context(&config, &headers);
        assert_eq!(ctx.metadata, vec![("x-tenant".to_string(), "acme".to_string())]);
        assert!(!ctx.request_id.is_empty());
        assert!(ctx.deadline.is_some());
    }
}
