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

//! Breadth-first GraphQL execution over the bridge schema.
//!
//! One [`Executor`] serves many concurrent requests; each call to
//! [`Executor::execute`] owns its per-request state and is single-threaded
//! cooperative. Backend work suspends only at depth barriers, where every
//! `(parent type, field)` bucket flushes as one batched RPC.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use graphql_parser::query as ast;
use rpc_client::{CallContext, Dispatch};
use schema::Project;
use telemetry::{Event, EventBus, OperationFinish, OperationKind, OperationStart};

mod collect;
mod engine;
mod error;
mod input;

pub use error::{ExecutionResult, GraphqlError, Location, PathSegment, ResponsePath};
pub use rpc_client::{CallError, StatusCode};

type Document = ast::Document<'static, String>;

pub struct Executor {
    project: Arc<Project>,
    dispatcher: Arc<dyn Dispatch>,
    bus: EventBus,
}

impl Executor {
    #[must_use]
    pub fn new(project: Arc<Project>, dispatcher: Arc<dyn Dispatch>, bus: EventBus) -> Self {
        Executor {
            project,
            dispatcher,
            bus,
        }
    }

    #[must_use]
    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    /// Parses and executes one GraphQL request. Request-level failures (parse
    /// errors, unknown operations, bad variables) return `errors` with no
    /// `data`; execution failures return partial `data` plus `errors`.
    pub async fn execute(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: Option<&serde_json::Map<String, serde_json::Value>>,
        ctx: &CallContext,
    ) -> ExecutionResult {
        let document = match ast::parse_query::<String>(query) {
            Ok(document) => document.into_static(),
            Err(e) => {
                return ExecutionResult::request_error(GraphqlError::new(format!(
                    "Unable to parse the query: {e}"
                )))
            }
        };

        let (operation, fragments) = match select_operation(&document, operation_name) {
            Ok(selected) => selected,
            Err(message) => return ExecutionResult::request_error(GraphqlError::new(message)),
        };

        let (kind, selection_set, variable_definitions, name) = match operation {
            Operation::Query {
                selection_set,
                variable_definitions,
                name,
            } => (
                OperationKind::Query,
                selection_set,
                variable_definitions,
                name,
            ),
            Operation::Mutation {
                selection_set,
                variable_definitions,
                name,
            } => (
                OperationKind::Mutation,
                selection_set,
                variable_definitions,
                name,
            ),
        };

        let root_type = match kind {
            OperationKind::Query => self.project.query(),
            OperationKind::Mutation => match self.project.mutation() {
                Some(mutation) => mutation,
                None => {
                    return ExecutionResult::request_error(GraphqlError::new(
                        "The schema does not define a mutation type",
                    ))
                }
            },
        };

        let empty = serde_json::Map::new();
        let provided = variables.unwrap_or(&empty);
        let variables =
            match input::coerce_variable_values(&self.project, variable_definitions, provided) {
                Ok(variables) => variables,
                Err(message) => {
                    return ExecutionResult::request_error(GraphqlError::new(message))
                }
            };

        let operation_name: Option<Arc<str>> = name.map(Arc::from);
        self.bus.publish(Event::OperationStart(OperationStart {
            request_id: Arc::clone(&ctx.request_id),
            operation_name: operation_name.clone(),
            operation_kind: kind,
        }));
        let started = Instant::now();

        let execution = engine::Execution::new(
            &self.project,
            self.dispatcher.as_ref(),
            ctx,
            fragments,
            variables,
        );
        let serial = kind == OperationKind::Mutation;
        let (data, errors, rpc_count) = execution.run(root_type, selection_set, serial).await;

        self.bus.publish(Event::OperationFinish(OperationFinish {
            request_id: Arc::clone(&ctx.request_id),
            operation_name,
            operation_kind: kind,
            duration: started.elapsed(),
            error_count: errors.len(),
            rpc_count,
        }));
        if !errors.is_empty() {
            tracing::debug!(
                request_id = %ctx.request_id,
                "GraphQL operation finished with {} error(s) and {} RPC(s)",
                errors.len(),
                rpc_count
            );
        }

        ExecutionResult {
            data: Some(data),
            errors,
        }
    }
}

enum Operation<'d> {
    Query {
        name: Option<&'d str>,
        selection_set: &'d ast::SelectionSet<'static, String>,
        variable_definitions: &'d [ast::VariableDefinition<'static, String>],
    },
    Mutation {
        name: Option<&'d str>,
        selection_set: &'d ast::SelectionSet<'static, String>,
        variable_definitions: &'d [ast::VariableDefinition<'static, String>],
    },
}

#[allow(clippy::type_complexity)]
fn select_operation<'d>(
    document: &'d Document,
    operation_name: Option<&str>,
) -> Result<(Operation<'d>, collect::Fragments<'d>), String> {
    let mut fragments: collect::Fragments<'d> = HashMap::new();
    let mut operations: Vec<(Option<&'d str>, &'d ast::OperationDefinition<'static, String>)> =
        Vec::new();

    for definition in &document.definitions {
        match definition {
            ast::Definition::Fragment(fragment) => {
                fragments.insert(fragment.name.as_str(), fragment);
            }
            ast::Definition::Operation(operation) => {
                let name = match operation {
                    ast::OperationDefinition::SelectionSet(_) => None,
                    ast::OperationDefinition::Query(q) => q.name.as_deref(),
                    ast::OperationDefinition::Mutation(m) => m.name.as_deref(),
                    ast::OperationDefinition::Subscription(s) => s.name.as_deref(),
                };
                operations.push((name, operation));
            }
        }
    }

    let selected = match operation_name {
        Some(wanted) => operations
            .iter()
            .find(|(name, _)| *name == Some(wanted))
            .ok_or_else(|| format!("Unknown operation {wanted}"))?,
        None => match operations.len() {
            0 => return Err("The document contains no operations".to_string()),
            1 => &operations[0],
            _ => {
                return Err(
                    "Must provide operationName when the document contains multiple operations"
                        .to_string(),
                )
            }
        },
    };

    let operation = match selected.1 {
        ast::OperationDefinition::SelectionSet(selection_set) => Operation::Query {
            name: None,
            selection_set,
            variable_definitions: &[],
        },
        ast::OperationDefinition::Query(query) => Operation::Query {
            name: query.name.as_deref(),
            selection_set: &query.selection_set,
            variable_definitions: &query.variable_definitions,
        },
        ast::OperationDefinition::Mutation(mutation) => Operation::Mutation {
            name: mutation.name.as_deref(),
            selection_set: &mutation.selection_set,
            variable_definitions: &mutation.variable_definitions,
        },
        ast::OperationDefinition::Subscription(_) => {
            return Err("Subscriptions are not supported".to_string())
        }
    };

    Ok((operation, fragments))
}
