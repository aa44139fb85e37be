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

//! The HTTP face of the bridge: `POST /graphql` accepting single or batched
//! request envelopes, a health probe, and (optionally) the client schema.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Bytes, Extension, Router};
use executor::{ExecutionResult, GraphqlError};
use serde::Deserialize;
use snafu::prelude::*;

use crate::config::Config;
use crate::{request, Runtime, UnableToBindHttpSnafu, UnableToServeHttpSnafu};

pub(crate) async fn start(
    runtime: Arc<Runtime>,
    config: Arc<Config>,
) -> Result<(), crate::Error> {
    let address = config.http_bind_address;
    let router = routes(runtime, config);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .context(UnableToBindHttpSnafu { address })?;
    tracing::info!("GraphQL HTTP endpoint listening on {address}");
    axum::serve(listener, router)
        .with_graceful_shutdown(crate::shutdown_signal())
        .await
        .context(UnableToServeHttpSnafu)
}

pub(crate) fn routes(runtime: Arc<Runtime>, config: Arc<Config>) -> Router {
    let mut router = Router::new()
        .route("/graphql", post(graphql))
        .route("/health", get(|| async { "ok\n" }));

    if config.introspection {
        router = router.route("/graphql/schema", get(client_schema));
    }

    router
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(runtime))
        .layer(Extension(config))
}

/// One GraphQL request as carried over HTTP.
#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    query: String,
    #[serde(rename = "operationName")]
    operation_name: Option<String>,
    variables: Option<serde_json::Map<String, serde_json::Value>>,
    #[allow(dead_code)]
    extensions: Option<serde_json::Value>,
}

/// A POST body is one envelope or a JSON array of envelopes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Single(RequestEnvelope),
    Batch(Vec<RequestEnvelope>),
}

async fn graphql(
    Extension(runtime): Extension<Arc<Runtime>>,
    Extension(config): Extension<Arc<Config>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: Payload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!("Malformed GraphQL request body: {e}");
            return malformed(format!("Malformed request body: {e}"));
        }
    };

    match payload {
        Payload::Single(envelope) => {
            let result = execute_one(&runtime, &config, &headers, envelope).await;
            json_response(StatusCode::OK, &result)
        }
        Payload::Batch(envelopes) => {
            if envelopes.is_empty() {
                return malformed("Batched requests must contain at least one operation");
            }
            let runs = envelopes
                .into_iter()
                .map(|envelope| execute_one(&runtime, &config, &headers, envelope));
            let results = futures::future::join_all(runs).await;
            json_response(StatusCode::OK, &results)
        }
    }
}

async fn execute_one(
    runtime: &Runtime,
    config: &Config,
    headers: &HeaderMap,
    envelope: RequestEnvelope,
) -> ExecutionResult {
    let ctx = request::build_call_context(config, headers);
    runtime
        .executor()
        .execute(
            &envelope.query,
            envelope.operation_name.as_deref(),
            envelope.variables.as_ref(),
            &ctx,
        )
        .await
}

async fn client_schema(Extension(runtime): Extension<Arc<Runtime>>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/graphql")],
        runtime.client_schema().to_string(),
    )
        .into_response()
}

fn malformed(message: impl Into<String>) -> Response {
    let result = ExecutionResult::request_error(GraphqlError::new(message));
    json_response(StatusCode::BAD_REQUEST, &result)
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Unable to serialize a GraphQL response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
