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

//! Dynamic RPC client: resolves endpoints per service, pools channels per
//! endpoint, and issues unary calls by fully-qualified method name with
//! messages built from descriptors at runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use prost_reflect::DescriptorPool;
use rand::Rng;
use snafu::prelude::*;
use telemetry::{CallFinish, CallStart, Event, EventBus};
use tonic::metadata::{MetadataKey, MetadataValue};

pub mod codec;
pub mod context;
pub mod convert;
pub mod endpoints;
pub mod pool;

pub use context::CallContext;
pub use endpoints::{Endpoint, EndpointProvider, StaticEndpointProvider, WILDCARD_SERVICE};
pub use pool::ConnectionPool;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The transport has been closed"))]
    TransportClosed,

    #[snafu(display(
        "No endpoints configured for service {service}. Add a backend mapping or a `*` default."
    ))]
    NoEndpoints { service: String },

    #[snafu(display("Invalid endpoint address {endpoint}: {source}"))]
    InvalidEndpoint {
        endpoint: String,
        source: tonic::transport::Error,
    },

    #[snafu(display("Unable to build the request message: {source}"))]
    EncodeRequest { source: serde_json::Error },

    #[snafu(display("Unable to render the response message: {source}"))]
    DecodeResponse { source: serde_json::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical gRPC status codes, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl From<tonic::Code> for StatusCode {
    fn from(code: tonic::Code) -> Self {
        match code {
            tonic::Code::Ok => StatusCode::Ok,
            tonic::Code::Cancelled => StatusCode::Cancelled,
            tonic::Code::Unknown => StatusCode::Unknown,
            tonic::Code::InvalidArgument => StatusCode::InvalidArgument,
            tonic::Code::DeadlineExceeded => StatusCode::DeadlineExceeded,
            tonic::Code::NotFound => StatusCode::NotFound,
            tonic::Code::AlreadyExists => StatusCode::AlreadyExists,
            tonic::Code::PermissionDenied => StatusCode::PermissionDenied,
            tonic::Code::ResourceExhausted => StatusCode::ResourceExhausted,
            tonic::Code::FailedPrecondition => StatusCode::FailedPrecondition,
            tonic::Code::Aborted => StatusCode::Aborted,
            tonic::Code::OutOfRange => StatusCode::OutOfRange,
            tonic::Code::Unimplemented => StatusCode::Unimplemented,
            tonic::Code::Internal => StatusCode::Internal,
            tonic::Code::Unavailable => StatusCode::Unavailable,
            tonic::Code::DataLoss => StatusCode::DataLoss,
            tonic::Code::Unauthenticated => StatusCode::Unauthenticated,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed backend call, as observed by the executor.
#[derive(Debug, Clone)]
pub struct CallError {
    pub code: StatusCode,
    pub message: String,
}

impl CallError {
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        CallError {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CallError {}

/// The seam between the executor and the transport. Requests and responses
/// are JSON values with snake_case proto field names; implementations own
/// message materialization.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn call(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, CallError>;
}

#[derive(Debug, Clone)]
pub struct RpcClientOptions {
    pub max_conns_per_endpoint: usize,
    pub default_timeout: Duration,
}

impl Default for RpcClientOptions {
    fn default() -> Self {
        RpcClientOptions {
            max_conns_per_endpoint: 8,
            default_timeout: Duration::from_secs(10),
        }
    }
}

/// The production [`Dispatch`] implementation.
pub struct RpcClient {
    descriptors: DescriptorPool,
    endpoints: Arc<dyn EndpointProvider>,
    pool: ConnectionPool,
    default_timeout: Duration,
    bus: EventBus,
    closed: AtomicBool,
}

impl RpcClient {
    #[must_use]
    pub fn new(
        descriptors: DescriptorPool,
        endpoints: Arc<dyn EndpointProvider>,
        options: RpcClientOptions,
        bus: EventBus,
    ) -> Self {
        RpcClient {
            descriptors,
            endpoints,
            pool: ConnectionPool::new(options.max_conns_per_endpoint),
            default_timeout: options.default_timeout,
            bus,
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the transport: subsequent calls fail fast and pooled channels
    /// are released.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.pool.close();
    }

    fn effective_timeout(&self, ctx: &CallContext) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining.min(self.default_timeout),
            None => self.default_timeout,
        }
    }

    async fn dispatch(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, CallError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CallError::new(
                StatusCode::Unavailable,
                "transport is closed",
            ));
        }
        let timeout = self.effective_timeout(ctx);
        if timeout.is_zero() {
            return Err(CallError::new(
                StatusCode::DeadlineExceeded,
                "request deadline exceeded before dispatch",
            ));
        }

        let descriptor = self
            .descriptors
            .get_service_by_name(service)
            .and_then(|s| s.methods().find(|m| m.name() == method))
            .ok_or_else(|| {
                CallError::new(
                    StatusCode::Internal,
                    format!("service {service} has no method {method}"),
                )
            })?;

        let candidates = self
            .endpoints
            .endpoints(ctx, service)
            .await
            .map_err(|e| CallError::new(StatusCode::Unavailable, e.to_string()))?;
        if candidates.is_empty() {
            return Err(CallError::new(
                StatusCode::Unavailable,
                format!("no endpoints resolved for service {service}"),
            ));
        }
        let target = {
            let index = rand::thread_rng().gen_range(0..candidates.len());
            Arc::clone(&candidates[index])
        };

        let message = convert::json_to_message(descriptor.input(), &request)
            .map_err(|e| CallError::new(StatusCode::Internal, e.to_string()))?;

        let lease = self
            .pool
            .acquire(&target)
            .await
            .map_err(|e| CallError::new(StatusCode::Unavailable, e.to_string()))?;

        self.bus.publish(Event::CallStart(CallStart {
            request_id: Arc::clone(&ctx.request_id),
            service: Arc::from(service),
            method: Arc::from(method),
            target: Arc::clone(&target),
        }));
        let started = Instant::now();

        let outcome = self
            .invoke(ctx, &descriptor, service, method, message, &lease, timeout)
            .await;

        let duration = started.elapsed();
        let (status, error, reusable) = match &outcome {
            Ok(_) => (StatusCode::Ok, None, true),
            Err(e) => (
                e.code,
                Some(e.message.clone()),
                // A channel that failed at the transport level is likely
                // broken; status errors from the server leave it healthy.
                e.code != StatusCode::Unavailable,
            ),
        };
        self.pool.release(lease, reusable);
        self.bus.publish(Event::CallFinish(CallFinish {
            request_id: Arc::clone(&ctx.request_id),
            service: Arc::from(service),
            method: Arc::from(method),
            target,
            duration,
            status: Arc::from(status.as_str()),
            error,
        }));

        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        ctx: &CallContext,
        descriptor: &prost_reflect::MethodDescriptor,
        service: &str,
        method: &str,
        message: prost_reflect::DynamicMessage,
        lease: &pool::Lease,
        timeout: Duration,
    ) -> Result<serde_json::Value, CallError> {
        let path = http::uri::PathAndQuery::try_from(format!("/{service}/{method}"))
            .map_err(|e| CallError::new(StatusCode::Internal, e.to_string()))?;

        let mut grpc = tonic::client::Grpc::new(lease.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| CallError::new(StatusCode::Unavailable, e.to_string()))?;

        let mut request = tonic::Request::new(message);
        request.set_timeout(timeout);
        let metadata = request.metadata_mut();
        if let Ok(value) = MetadataValue::try_from(ctx.request_id.as_ref()) {
            metadata.insert("x-request-id", value);
        }
        for (key, value) in &ctx.metadata {
            let Ok(key) = MetadataKey::from_bytes(key.as_bytes()) else {
                tracing::debug!("Skipping forwarded header with invalid name: {key}");
                continue;
            };
            let Ok(value) = MetadataValue::try_from(value.as_str()) else {
                tracing::debug!("Skipping forwarded header with non-ASCII value: {key}");
                continue;
            };
            metadata.insert(key, value);
        }

        let codec = codec::DynamicCodec::new(descriptor.output());
        let response = tokio::time::timeout(timeout, grpc.unary(request, path, codec))
            .await
            .map_err(|_| {
                CallError::new(
                    StatusCode::DeadlineExceeded,
                    format!("call to /{service}/{method} timed out after {timeout:?}"),
                )
            })?
            .map_err(|status| CallError::new(status.code().into(), status.message().to_string()))?;

        convert::message_to_json(&response.into_inner())
            .map_err(|e| CallError::new(StatusCode::Internal, e.to_string()))
    }
}

#[async_trait]
impl Dispatch for RpcClient {
    async fn call(
        &self,
        ctx: &CallContext,
        service: &str,
        method: &str,
        request: serde_json::Value,
    ) -> Result<serde_json::Value, CallError> {
        self.dispatch(ctx, service, method, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_names_are_canonical() {
        assert_eq!(StatusCode::from(tonic::Code::Unavailable).as_str(), "UNAVAILABLE");
        assert_eq!(
            StatusCode::from(tonic::Code::DeadlineExceeded).as_str(),
            "DEADLINE_EXCEEDED"
        );
        assert_eq!(StatusCode::from(tonic::Code::Ok).as_str(), "OK");
    }

    #[tokio::test]
    async fn test_closed_client_fails_fast() {
        let client = RpcClient::new(
            DescriptorPool::new(),
            Arc::new(StaticEndpointProvider::default()),
            RpcClientOptions::default(),
            EventBus::default(),
        );
        client.close();
        let ctx = CallContext::new("r1");
        let err = client
            .call(&ctx, "demo.UsersService", "ResolveQueryUsers", serde_json::json!({}))
            .await
            .expect_err("closed transport");
        assert_eq!(err.code, StatusCode::Unavailable);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_before_dispatch() {
        let client = RpcClient::new(
            DescriptorPool::new(),
            Arc::new(StaticEndpointProvider::default()),
            RpcClientOptions::default(),
            EventBus::default(),
        );
        let ctx = CallContext::new("r1")
            .with_deadline(std::time::Instant::now() - Duration::from_secs(1));
        let err = client
            .call(&ctx, "demo.UsersService", "ResolveQueryUsers", serde_json::json!({}))
            .await
            .expect_err("expired deadline");
        assert_eq!(err.code, StatusCode::DeadlineExceeded);
    }
}
