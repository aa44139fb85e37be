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

//! Optional Prometheus scrape endpoint.

use std::net::SocketAddr;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Router};
use prometheus::{Encoder, TextEncoder};
use snafu::prelude::*;

use crate::{UnableToBindMetricsSnafu, UnableToServeMetricsSnafu};

pub(crate) async fn start(
    address: Option<SocketAddr>,
    registry: Option<prometheus::Registry>,
) -> Result<(), crate::Error> {
    let (Some(address), Some(registry)) = (address, registry) else {
        return Ok(());
    };
    let router = Router::new()
        .route("/metrics", get(scrape))
        .layer(Extension(registry));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .context(UnableToBindMetricsSnafu { address })?;
    tracing::info!("Prometheus metrics listening on {address}");
    axum::serve(listener, router)
        .await
        .context(UnableToServeMetricsSnafu)
}

async fn scrape(Extension(registry): Extension<prometheus::Registry>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Unable to encode Prometheus metrics: {e}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
