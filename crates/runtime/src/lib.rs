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

//! The bridge runtime: owns the compiled project and its derived views, wires
//! the executor to the transport, and serves the HTTP front end.

use std::net::SocketAddr;
use std::sync::Arc;

use executor::Executor;
use rpc_client::Dispatch;
use schema::Project;
use snafu::prelude::*;
use telemetry::EventBus;

pub mod config;
pub mod request;

mod http;
mod metrics_server;

pub use config::Config;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to bind the HTTP listener on {address}: {source}"))]
    UnableToBindHttp {
        address: SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("The HTTP server failed: {source}"))]
    UnableToServeHttp { source: std::io::Error },

    #[snafu(display("Unable to bind the metrics listener on {address}: {source}"))]
    UnableToBindMetrics {
        address: SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("The metrics server failed: {source}"))]
    UnableToServeMetrics { source: std::io::Error },

    #[snafu(display("{source}"))]
    UnableToJoinTask { source: tokio::task::JoinError },

    #[snafu(display("A runtime cannot be built without a {component}"))]
    MissingComponent { component: &'static str },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub struct Runtime {
    project: Arc<Project>,
    executor: Arc<Executor>,
    client_schema: Arc<str>,
    bus: EventBus,
    metrics_endpoint: Option<SocketAddr>,
    prometheus_registry: Option<prometheus::Registry>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("project", &self.project)
            .field("client_schema", &self.client_schema)
            .field("bus", &self.bus)
            .field("metrics_endpoint", &self.metrics_endpoint)
            .field("prometheus_registry", &self.prometheus_registry)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    #[must_use]
    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// The rendered, directive-free client schema.
    #[must_use]
    pub fn client_schema(&self) -> &str {
        &self.client_schema
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Starts the HTTP server and, when configured, the Prometheus metrics
    /// server. Resolves when the servers shut down.
    pub async fn start_servers(self: Arc<Self>, config: Config) -> Result<()> {
        let config = Arc::new(config);

        let http_server = tokio::spawn(http::start(Arc::clone(&self), Arc::clone(&config)));

        let metrics_endpoint = self.metrics_endpoint;
        let prometheus_registry = self.prometheus_registry.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start(metrics_endpoint, prometheus_registry).await {
                tracing::error!("Prometheus metrics server error: {e}");
            }
        });

        tokio::select! {
            http_res = http_server => {
                match http_res {
                    Ok(res) => res,
                    Err(source) => Err(Error::UnableToJoinTask { source }),
                }
            },
            () = shutdown_signal() => {
                tracing::info!("Goodbye!");
                Ok(())
            },
        }
    }
}

#[derive(Default)]
pub struct RuntimeBuilder {
    project: Option<Arc<Project>>,
    dispatcher: Option<Arc<dyn Dispatch>>,
    bus: Option<EventBus>,
    metrics_endpoint: Option<SocketAddr>,
    prometheus_registry: Option<prometheus::Registry>,
}

impl RuntimeBuilder {
    #[must_use]
    pub fn with_project(mut self, project: Arc<Project>) -> Self {
        self.project = Some(project);
        self
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_metrics_server_opt(
        mut self,
        endpoint: Option<SocketAddr>,
        registry: Option<prometheus::Registry>,
    ) -> Self {
        self.metrics_endpoint = endpoint;
        self.prometheus_registry = registry;
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let project = self.project.context(MissingComponentSnafu {
            component: "schema project",
        })?;
        let dispatcher = self.dispatcher.context(MissingComponentSnafu {
            component: "dispatcher",
        })?;
        let bus = self.bus.unwrap_or_default();

        let client_schema: Arc<str> =
            Arc::from(projection::sdl::render_client_schema(&project));
        let executor = Arc::new(Executor::new(
            Arc::clone(&project),
            dispatcher,
            bus.clone(),
        ));

        Ok(Runtime {
            project,
            executor,
            client_schema,
            bus,
            metrics_endpoint: self.metrics_endpoint,
            prometheus_registry: self.prometheus_registry,
        })
    }
}

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to listen for the ctrl-c signal: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Unable to listen for the terminate signal: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rpc_client::{CallContext, CallError};

    struct NullDispatcher;

    #[async_trait]
    impl Dispatch for NullDispatcher {
        async fn call(
            &self,
            _ctx: &CallContext,
            _service: &str,
            _method: &str,
            _request: serde_json::Value,
        ) -> Result<serde_json::Value, CallError> {
            Ok(serde_json::json!({"data": null}))
        }
    }

    fn sample_project() -> Arc<Project> {
        let sources = vec![schema::SchemaSource::new(
            "users.graphql",
            "type User @loader { id: ID! @id name: String }\ntype Query { users: [User] }",
        )];
        Arc::new(Project::from_sources("demo", sources).expect("compiles"))
    }

    #[test]
    fn test_builder_requires_project_and_dispatcher() {
        let err = Runtime::builder().build().expect_err("missing parts");
        assert!(matches!(err, Error::MissingComponent { .. }));
    }

    #[test]
    fn test_builder_renders_client_schema() {
        let runtime = Runtime::builder()
            .with_project(sample_project())
            .with_dispatcher(Arc::new(NullDispatcher))
            .build()
            .expect("builds");
        assert!(runtime.client_schema().contains("type User"));
        assert!(!runtime.client_schema().contains('@'));
    }
}
