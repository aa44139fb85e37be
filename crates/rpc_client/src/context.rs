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

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request context threaded from the front end through the executor down
/// to every backend call.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Synthesized per-request identifier, always forwarded as
    /// `x-request-id`.
    pub request_id: Arc<str>,
    /// Absolute deadline for the whole request, if any.
    pub deadline: Option<Instant>,
    /// Inbound headers selected for forwarding, keys lowercased.
    pub metadata: Vec<(String, String)>,
}

impl CallContext {
    #[must_use]
    pub fn new(request_id: impl Into<Arc<str>>) -> Self {
        CallContext {
            request_id: request_id.into(),
            deadline: None,
            metadata: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Vec<(String, String)>) -> Self {
        self.metadata = metadata
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        self
    }

    /// Time left until the deadline; `None` when no deadline is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_without_deadline_never_expires() {
        let ctx = CallContext::new("r1");
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_expired());
    }

    #[test]
    fn test_expired_deadline_is_detected() {
        let ctx = CallContext::new("r1").with_deadline(Instant::now() - Duration::from_secs(1));
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_metadata_keys_are_lowercased() {
        let ctx = CallContext::new("r1")
            .with_metadata(vec![("X-Tenant".to_string(), "acme".to_string())]);
        assert_eq!(ctx.metadata[0].0, "x-tenant");
    }
}
