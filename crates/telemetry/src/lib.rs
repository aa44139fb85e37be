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

//! In-process publish/subscribe bus for bridge telemetry.
//!
//! The transport publishes a record before and after every backend call; the
//! executor publishes a record around every GraphQL operation. Subscribers are
//! optional: publishing with no receivers is a no-op. The bus is injected as a
//! construction parameter of the transport and the executor rather than held
//! in global state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

pub mod metrics;

const DEFAULT_BUS_CAPACITY: usize = 256;

/// A record published immediately before a backend RPC is dispatched.
#[derive(Debug, Clone)]
pub struct CallStart {
    pub request_id: Arc<str>,
    pub service: Arc<str>,
    pub method: Arc<str>,
    pub target: Arc<str>,
}

/// A record published when a backend RPC completes, successfully or not.
#[derive(Debug, Clone)]
pub struct CallFinish {
    pub request_id: Arc<str>,
    pub service: Arc<str>,
    pub method: Arc<str>,
    pub target: Arc<str>,
    pub duration: Duration,
    /// Canonical gRPC status code name, `OK` on success.
    pub status: Arc<str>,
    pub error: Option<String>,
}

/// A record published when a GraphQL operation begins executing.
#[derive(Debug, Clone)]
pub struct OperationStart {
    pub request_id: Arc<str>,
    pub operation_name: Option<Arc<str>>,
    pub operation_kind: OperationKind,
}

/// A record published when a GraphQL operation finishes executing.
#[derive(Debug, Clone)]
pub struct OperationFinish {
    pub request_id: Arc<str>,
    pub operation_name: Option<Arc<str>>,
    pub operation_kind: OperationKind,
    pub duration: Duration,
    pub error_count: usize,
    /// Number of backend RPCs issued while executing the operation.
    pub rpc_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    CallStart(CallStart),
    CallFinish(CallFinish),
    OperationStart(OperationStart),
    OperationFinish(OperationFinish),
}

/// Broadcast bus for [`Event`]s.
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Publishes an event to all current subscribers. Events published while
    /// no subscriber is attached are dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_a_noop() {
        let bus = EventBus::default();
        bus.publish(Event::OperationStart(OperationStart {
            request_id: "r1".into(),
            operation_name: None,
            operation_kind: OperationKind::Query,
        }));
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(Event::CallStart(CallStart {
            request_id: "r1".into(),
            service: "demo.UsersService".into(),
            method: "ResolveQueryUsers".into(),
            target: "localhost:4000".into(),
        }));

        match rx.recv().await {
            Ok(Event::CallStart(start)) => {
                assert_eq!(start.service.as_ref(), "demo.UsersService");
                assert_eq!(start.method.as_ref(), "ResolveQueryUsers");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
