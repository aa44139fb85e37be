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

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{CallContext, Error, NoEndpointsSnafu, Result};

/// A backend address in `host:port` form.
pub type Endpoint = Arc<str>;

/// Resolves the endpoints a service's calls may be dispatched to.
#[async_trait]
pub trait EndpointProvider: Send + Sync {
    /// Returns the candidate endpoints for `service_full_name`. An empty
    /// result is an error, never an empty list.
    async fn endpoints(&self, ctx: &CallContext, service_full_name: &str) -> Result<Vec<Endpoint>>;
}

/// Endpoint provider over a fixed map, with `*` matched only when the
/// specific service name is absent. The map is copied on construction;
/// lookups take shared access only.
#[derive(Debug, Default, Clone)]
pub struct StaticEndpointProvider {
    backends: HashMap<String, Vec<Endpoint>>,
}

/// Wildcard service name matched when no specific entry exists.
pub const WILDCARD_SERVICE: &str = "*";

impl StaticEndpointProvider {
    #[must_use]
    pub fn new(backends: HashMap<String, Vec<String>>) -> Self {
        let backends = backends
            .into_iter()
            .map(|(service, endpoints)| {
                let endpoints = endpoints.into_iter().map(Endpoint::from).collect();
                (service, endpoints)
            })
            .collect();
        StaticEndpointProvider { backends }
    }

    /// Builds the provider from repeated `service=endpoint` pairs, appending
    /// endpoints that name the same service.
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut backends: HashMap<String, Vec<Endpoint>> = HashMap::new();
        for (service, endpoint) in pairs {
            backends
                .entry(service)
                .or_default()
                .push(Endpoint::from(endpoint));
        }
        StaticEndpointProvider { backends }
    }
}

#[async_trait]
impl EndpointProvider for StaticEndpointProvider {
    async fn endpoints(
        &self,
        _ctx: &CallContext,
        service_full_name: &str,
    ) -> Result<Vec<Endpoint>> {
        let found = self
            .backends
            .get(service_full_name)
            .or_else(|| self.backends.get(WILDCARD_SERVICE))
            .filter(|endpoints| !endpoints.is_empty());
        match found {
            Some(endpoints) => Ok(endpoints.clone()),
            None => NoEndpointsSnafu {
                service: service_full_name.to_string(),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticEndpointProvider {
        StaticEndpointProvider::from_pairs(vec![
            (
                "demo.UsersService".to_string(),
                "users-a:4000".to_string(),
            ),
            (
                "demo.UsersService".to_string(),
                "users-b:4000".to_string(),
            ),
            ("*".to_string(), "fallback:4000".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_specific_service_wins_over_wildcard() {
        let ctx = CallContext::new("r1");
        let endpoints = provider()
            .endpoints(&ctx, "demo.UsersService")
            .await
            .expect("resolves");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].as_ref(), "users-a:4000");
    }

    #[tokio::test]
    async fn test_wildcard_applies_when_specific_absent() {
        let ctx = CallContext::new("r1");
        let endpoints = provider()
            .endpoints(&ctx, "demo.PostsService")
            .await
            .expect("resolves");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].as_ref(), "fallback:4000");
    }

    #[tokio::test]
    async fn test_missing_service_is_an_explicit_error() {
        let ctx = CallContext::new("r1");
        let provider = StaticEndpointProvider::default();
        let err = provider
            .endpoints(&ctx, "demo.UsersService")
            .await
            .expect_err("no endpoints");
        assert!(matches!(err, Error::NoEndpoints { .. }));
    }
}
