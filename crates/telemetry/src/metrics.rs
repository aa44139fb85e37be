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

//! Translates bus events into OpenTelemetry instruments.

use std::sync::LazyLock;

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};
use tokio::sync::broadcast::error::RecvError;

use crate::{Event, EventBus};

pub(crate) mod rpc {
    use super::{global, Counter, Histogram, LazyLock, Meter};

    pub(crate) static RPC_METER: LazyLock<Meter> = LazyLock::new(|| global::meter("rpc_client"));

    pub(crate) static CALLS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
        RPC_METER
            .u64_counter("rpc_calls_total")
            .with_description("Number of backend RPC calls issued by the bridge.")
            .build()
    });

    pub(crate) static CALL_DURATION_MS: LazyLock<Histogram<f64>> = LazyLock::new(|| {
        RPC_METER
            .f64_histogram("rpc_call_duration_ms")
            .with_description("Duration in milliseconds of backend RPC calls.")
            .with_unit("ms")
            .build()
    });
}

pub(crate) mod graphql {
    use super::{global, Counter, Histogram, LazyLock, Meter};

    pub(crate) static GRAPHQL_METER: LazyLock<Meter> = LazyLock::new(|| global::meter("executor"));

    pub(crate) static OPERATIONS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
        GRAPHQL_METER
            .u64_counter("graphql_operations_total")
            .with_description("Number of GraphQL operations executed.")
            .build()
    });

    pub(crate) static OPERATION_DURATION_MS: LazyLock<Histogram<f64>> = LazyLock::new(|| {
        GRAPHQL_METER
            .f64_histogram("graphql_operation_duration_ms")
            .with_description("Duration in milliseconds of GraphQL operation execution.")
            .with_unit("ms")
            .build()
    });

    pub(crate) static FIELD_ERRORS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
        GRAPHQL_METER
            .u64_counter("graphql_field_errors_total")
            .with_description("Number of field errors collected across operations.")
            .build()
    });
}

/// Subscribes to the bus and records every event into the process-wide meter
/// provider. Returns the background task driving the subscription.
pub fn attach(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => record(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Telemetry subscriber lagged, dropped {missed} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn record(event: &Event) {
    match event {
        Event::CallStart(_) | Event::OperationStart(_) => {}
        Event::CallFinish(finish) => {
            let labels = [
                KeyValue::new("service", finish.service.to_string()),
                KeyValue::new("method", finish.method.to_string()),
                KeyValue::new("status", finish.status.to_string()),
            ];
            rpc::CALLS_TOTAL.add(1, &labels);
            rpc::CALL_DURATION_MS.record(finish.duration.as_secs_f64() * 1000.0, &labels);
        }
        Event::OperationFinish(finish) => {
            let labels = [
                KeyValue::new("kind", finish.operation_kind.as_str()),
                KeyValue::new("errors", (finish.error_count > 0).to_string()),
            ];
            graphql::OPERATIONS_TOTAL.add(1, &labels);
            graphql::OPERATION_DURATION_MS
                .record(finish.duration.as_secs_f64() * 1000.0, &labels);
            if finish.error_count > 0 {
                graphql::FIELD_ERRORS_TOTAL.add(finish.error_count as u64, &labels);
            }
        }
    }
}
