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

//! The breadth-first batching engine.
//!
//! A depth holds a FIFO of field plans. Synchronous plans (source reads,
//! `__typename`) complete immediately and enqueue their children at the next
//! depth; RPC-bound plans park in a bucket keyed by `(parent type, field)`.
//! Once the FIFO drains, every bucket issues exactly one RPC (batch-capable
//! fields) or one RPC per plan (non-batch), all buckets concurrently; results
//! demultiplex positionally and enqueue children at the next depth.

use std::collections::VecDeque;
use std::sync::Arc;

use graphql_parser::query as ast;
use indexmap::IndexMap;
use rpc_client::{CallContext, CallError, Dispatch, StatusCode};
use schema::{naming, FieldDef, FieldRole, Project, TypeDef, TypeKind, TypeRef};
use serde_json::Value as Json;

use crate::collect::{self, Fragments, Variables};
use crate::error::{GraphqlError, PathSegment, ResponsePath};
use crate::input;

type AstField = ast::Field<'static, String>;
type SelectionSet = ast::SelectionSet<'static, String>;

enum PlanField<'a> {
    Typename,
    Introspection(&'a str),
    Def(&'a FieldDef),
}

/// One pending field evaluation.
struct FieldPlan<'a> {
    parent_type: &'a TypeDef,
    /// The parent's source value; `Null` for root plans.
    parent: Arc<Json>,
    field: PlanField<'a>,
    /// Field nodes merged under one response key.
    nodes: Vec<&'a AstField>,
    path: ResponsePath,
    /// Nearest strictly-enclosing response position whose type is nullable;
    /// `None` means errors propagate to the whole `data`.
    rest: Option<ResponsePath>,
    position: graphql_parser::Pos,
}

enum Flow {
    Done,
    /// The value at this position is null and the position is non-null; the
    /// caller must null out an enclosing nullable position.
    Propagate,
}

pub(crate) struct Execution<'a> {
    pub project: &'a Project,
    pub dispatcher: &'a dyn Dispatch,
    pub ctx: &'a CallContext,
    pub fragments: Fragments<'a>,
    pub variables: Variables,
    pub data: Json,
    pub data_nulled: bool,
    pub errors: Vec<GraphqlError>,
    pub rpc_count: usize,
}

impl<'a> Execution<'a> {
    pub(crate) fn new(
        project: &'a Project,
        dispatcher: &'a dyn Dispatch,
        ctx: &'a CallContext,
        fragments: Fragments<'a>,
        variables: Variables,
    ) -> Self {
        Execution {
            project,
            dispatcher,
            ctx,
            fragments,
            variables,
            data: Json::Object(serde_json::Map::new()),
            data_nulled: false,
            errors: Vec::new(),
            rpc_count: 0,
        }
    }

    /// Executes the operation's root selection set. Mutations run their root
    /// fields serially in document order; queries run them within one
    /// breadth-first pass.
    pub(crate) async fn run(
        mut self,
        root_type: &'a TypeDef,
        selection_set: &'a SelectionSet,
        serial: bool,
    ) -> (Json, Vec<GraphqlError>, usize) {
        let grouped = match collect::collect_fields(
            self.project,
            root_type,
            &[selection_set],
            &self.fragments,
            &self.variables,
        ) {
            Ok(grouped) => grouped,
            Err(message) => {
                self.errors.push(GraphqlError::new(message));
                return (Json::Null, self.errors, self.rpc_count);
            }
        };

        let parent = Arc::new(Json::Null);
        let mut plans = Vec::with_capacity(grouped.len());
        for (key, nodes) in grouped {
            self.write(
                &[PathSegment::Field(key.clone())],
                Json::Null,
            );
            let path = vec![PathSegment::Field(key)];
            if let Some(plan) = self.make_plan(root_type, Arc::clone(&parent), nodes, path, None) {
                plans.push(plan);
            }
        }

        if serial {
            for plan in plans {
                self.run_depths(vec![plan]).await;
            }
        } else {
            self.run_depths(plans).await;
        }

        (self.data, self.errors, self.rpc_count)
    }

    async fn run_depths(&mut self, initial: Vec<FieldPlan<'a>>) {
        let mut current: VecDeque<FieldPlan<'a>> = initial.into();
        while !current.is_empty() {
            let mut next: Vec<FieldPlan<'a>> = Vec::new();
            let mut buckets: IndexMap<(Arc<str>, String), Vec<FieldPlan<'a>>> = IndexMap::new();

            while let Some(plan) = current.pop_front() {
                match &plan.field {
                    PlanField::Typename => {
                        let name = Json::String(plan.parent_type.name.to_string());
                        self.write(&plan.path, name);
                    }
                    PlanField::Introspection(name) => {
                        let error = GraphqlError::new(format!(
                            "{name} is not supported; the client schema is served separately"
                        ))
                        .at(plan.path.clone())
                        .locate(plan.position);
                        self.errors.push(error);
                    }
                    PlanField::Def(def) => match def.role {
                        FieldRole::Source | FieldRole::Internal => {
                            self.complete_source(plan, &mut next);
                        }
                        FieldRole::Load | FieldRole::Resolve => {
                            let key = (Arc::clone(&plan.parent_type.name), def.name.clone());
                            buckets.entry(key).or_default().push(plan);
                        }
                    },
                }
            }

            if !buckets.is_empty() {
                if self.ctx.is_expired() {
                    // Outstanding work includes the next-depth plans that
                    // synchronous completions already enqueued this depth;
                    // their placeholders are written, so they need errors
                    // too, not just the bucketed plans.
                    self.cancel_pending(buckets.into_values().flatten().chain(next));
                    return;
                }
                let prepared: Vec<PreparedBucket<'a>> = buckets
                    .into_values()
                    .filter_map(|plans| self.prepare_bucket(plans))
                    .collect();
                self.rpc_count += prepared.iter().map(PreparedBucket::call_count).sum::<usize>();

                let dispatcher = self.dispatcher;
                let ctx = self.ctx;
                let drained = futures::future::join_all(
                    prepared
                        .into_iter()
                        .map(|bucket| drain_bucket(dispatcher, ctx, bucket)),
                )
                .await;
                for bucket in drained {
                    for (plan, outcome) in bucket {
                        self.complete_rpc(plan, outcome, &mut next);
                    }
                }
            }

            current = next.into();
        }
    }

    /// Deadline reached: discard every pending plan, recording one
    /// cancellation error per suspended field.
    fn cancel_pending(&mut self, plans: impl IntoIterator<Item = FieldPlan<'a>>) {
        for plan in plans {
            let error = GraphqlError::new("request cancelled: deadline exceeded")
                .at(plan.path.clone())
                .locate(plan.position)
                .with_code(StatusCode::Cancelled.as_str());
            self.errors.push(error);
            self.null_field(&plan);
        }
    }

    fn complete_source(&mut self, plan: FieldPlan<'a>, next: &mut Vec<FieldPlan<'a>>) {
        let PlanField::Def(def) = plan.field else {
            unreachable!("complete_source is only called for IR-backed plans");
        };
        let value = plan
            .parent
            .get(naming::proto_field_name(&def.name))
            .cloned()
            .unwrap_or(Json::Null);
        let flow = self.complete_value(
            def,
            &plan.nodes,
            &def.ty,
            value,
            &plan.path,
            &plan.rest,
            plan.position,
            next,
        );
        if matches!(flow, Flow::Propagate) {
            self.null_out(&plan.rest);
        }
    }

    fn complete_rpc(
        &mut self,
        plan: FieldPlan<'a>,
        outcome: Result<Json, CallError>,
        next: &mut Vec<FieldPlan<'a>>,
    ) {
        let PlanField::Def(def) = plan.field else {
            unreachable!("RPC plans are always IR-backed");
        };
        match outcome {
            Ok(value) => {
                let flow = self.complete_value(
                    def,
                    &plan.nodes,
                    &def.ty,
                    value,
                    &plan.path,
                    &plan.rest,
                    plan.position,
                    next,
                );
                if matches!(flow, Flow::Propagate) {
                    self.null_out(&plan.rest);
                }
            }
            Err(call_error) => {
                let error = GraphqlError::new(call_error.message.clone())
                    .at(plan.path.clone())
                    .locate(plan.position)
                    .with_code(call_error.code.as_str());
                self.errors.push(error);
                if def.ty.is_non_null() {
                    self.null_out(&plan.rest);
                } else {
                    self.write(&plan.path, Json::Null);
                }
            }
        }
    }

    fn null_field(&mut self, plan: &FieldPlan<'a>) {
        let non_null = match &plan.field {
            PlanField::Def(def) => def.ty.is_non_null(),
            _ => false,
        };
        if non_null {
            self.null_out(&plan.rest);
        } else {
            self.write(&plan.path, Json::Null);
        }
    }

    /// Completes a fetched or read value against its declared type, writing
    /// into the response tree and enqueuing child plans.
    #[allow(clippy::too_many_arguments)]
    fn complete_value(
        &mut self,
        def: &'a FieldDef,
        nodes: &[&'a AstField],
        ty: &'a TypeRef,
        value: Json,
        path: &ResponsePath,
        inherited_rest: &Option<ResponsePath>,
        position: graphql_parser::Pos,
        next: &mut Vec<FieldPlan<'a>>,
    ) -> Flow {
        let non_null = ty.is_non_null();
        let inner = ty.nullable();

        if value.is_null() {
            return self.null_value(def, non_null, path, position);
        }

        // The position a null may rest at, for everything nested below here.
        let rest_below = if non_null {
            inherited_rest.clone()
        } else {
            Some(path.clone())
        };

        match inner {
            TypeRef::List(element) => {
                let Json::Array(items) = value else {
                    return self.type_mismatch(def, non_null, path, position, "a list");
                };
                self.write(path, Json::Array(vec![Json::Null; items.len()]));
                let mut poisoned = false;
                for (index, item) in items.into_iter().enumerate() {
                    let mut element_path = path.clone();
                    element_path.push(PathSegment::Index(index));
                    let flow = self.complete_value(
                        def,
                        nodes,
                        element,
                        item,
                        &element_path,
                        &rest_below,
                        position,
                        next,
                    );
                    if matches!(flow, Flow::Propagate) {
                        poisoned = true;
                    }
                }
                if poisoned {
                    if non_null {
                        return Flow::Propagate;
                    }
                    self.write(path, Json::Null);
                }
                Flow::Done
            }
            TypeRef::Named(name) => {
                if self.project.is_scalar(name) {
                    return self.complete_scalar(def, nodes, name, non_null, value, path, position);
                }
                let Some(target) = self.project.get(name) else {
                    return self.type_mismatch(def, non_null, path, position, "a known type");
                };
                match target.kind {
                    TypeKind::Enum => {
                        self.complete_enum(def, target, non_null, value, path, position)
                    }
                    TypeKind::Object => self.complete_object(
                        def, nodes, target, non_null, value, path, &rest_below, position, next,
                    ),
                    _ => self.type_mismatch(def, non_null, path, position, "a concrete type"),
                }
            }
            TypeRef::NonNull(_) => unreachable!("nullable() strips the non-null wrapper"),
        }
    }

    fn null_value(
        &mut self,
        def: &FieldDef,
        non_null: bool,
        path: &ResponsePath,
        position: graphql_parser::Pos,
    ) -> Flow {
        if non_null {
            let error = GraphqlError::new(format!(
                "Cannot return null for non-nullable field {}",
                def.name
            ))
            .at(path.clone())
            .locate(position);
            self.errors.push(error);
            Flow::Propagate
        } else {
            self.write(path, Json::Null);
            Flow::Done
        }
    }

    fn type_mismatch(
        &mut self,
        def: &FieldDef,
        non_null: bool,
        path: &ResponsePath,
        position: graphql_parser::Pos,
        expected: &str,
    ) -> Flow {
        let error = GraphqlError::new(format!(
            "Field {} resolved to a value that is not {expected}",
            def.name
        ))
        .at(path.clone())
        .locate(position);
        self.errors.push(error);
        if non_null {
            Flow::Propagate
        } else {
            self.write(path, Json::Null);
            Flow::Done
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_scalar(
        &mut self,
        def: &FieldDef,
        nodes: &[&'a AstField],
        name: &str,
        non_null: bool,
        value: Json,
        path: &ResponsePath,
        position: graphql_parser::Pos,
    ) -> Flow {
        if nodes.iter().any(|n| !n.selection_set.items.is_empty()) {
            return self.type_mismatch(def, non_null, path, position, "selectable (scalars have no subfields)");
        }
        match coerce_scalar_output(self.project, name, value) {
            Ok(coerced) => {
                self.write(path, coerced);
                Flow::Done
            }
            Err(reason) => {
                let error = GraphqlError::new(format!(
                    "Field {} produced an invalid {name}: {reason}",
                    def.name
                ))
                .at(path.clone())
                .locate(position);
                self.errors.push(error);
                if non_null {
                    Flow::Propagate
                } else {
                    self.write(path, Json::Null);
                    Flow::Done
                }
            }
        }
    }

    fn complete_enum(
        &mut self,
        def: &FieldDef,
        target: &TypeDef,
        non_null: bool,
        value: Json,
        path: &ResponsePath,
        position: graphql_parser::Pos,
    ) -> Flow {
        let Json::String(member) = &value else {
            return self.type_mismatch(def, non_null, path, position, "an enum value");
        };
        // The generated zero value means the backend left the field unset.
        if *member == naming::enum_unspecified_value(&target.name) {
            return self.null_value(def, non_null, path, position);
        }
        if target.values.iter().any(|v| &v.name == member) {
            self.write(path, value);
            Flow::Done
        } else {
            let error = GraphqlError::new(format!(
                "Value {member} is not a member of enum {}",
                target.name
            ))
            .at(path.clone())
            .locate(position);
            self.errors.push(error);
            if non_null {
                Flow::Propagate
            } else {
                self.write(path, Json::Null);
                Flow::Done
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_object(
        &mut self,
        def: &FieldDef,
        nodes: &[&'a AstField],
        target: &'a TypeDef,
        non_null: bool,
        value: Json,
        path: &ResponsePath,
        rest_below: &Option<ResponsePath>,
        position: graphql_parser::Pos,
        next: &mut Vec<FieldPlan<'a>>,
    ) -> Flow {
        if !value.is_object() {
            return self.type_mismatch(def, non_null, path, position, "an object");
        }
        let selection_sets: Vec<&'a SelectionSet> =
            nodes.iter().map(|n| &n.selection_set).collect();
        if selection_sets.iter().all(|s| s.items.is_empty()) {
            return self.type_mismatch(
                def,
                non_null,
                path,
                position,
                "a leaf (object fields need a selection of subfields)",
            );
        }
        let grouped = match collect::collect_fields(
            self.project,
            target,
            &selection_sets,
            &self.fragments,
            &self.variables,
        ) {
            Ok(grouped) => grouped,
            Err(message) => {
                self.errors
                    .push(GraphqlError::new(message).at(path.clone()).locate(position));
                return if non_null {
                    Flow::Propagate
                } else {
                    self.write(path, Json::Null);
                    Flow::Done
                };
            }
        };

        // Pre-insert every response key so field order follows the query
        // even though children complete at later depths.
        let mut placeholder = serde_json::Map::new();
        for key in grouped.keys() {
            placeholder.insert(key.clone(), Json::Null);
        }
        self.write(path, Json::Object(placeholder));

        let parent = Arc::new(value);
        for (key, child_nodes) in grouped {
            let mut child_path = path.clone();
            child_path.push(PathSegment::Field(key));
            if let Some(plan) = self.make_plan(
                target,
                Arc::clone(&parent),
                child_nodes,
                child_path,
                rest_below.clone(),
            ) {
                next.push(plan);
            }
        }
        Flow::Done
    }

    fn make_plan(
        &mut self,
        parent_type: &'a TypeDef,
        parent: Arc<Json>,
        nodes: Vec<&'a AstField>,
        path: ResponsePath,
        rest: Option<ResponsePath>,
    ) -> Option<FieldPlan<'a>> {
        let first = nodes[0];
        let field = match first.name.as_str() {
            "__typename" => PlanField::Typename,
            "__schema" | "__type" => PlanField::Introspection(first.name.as_str()),
            name => match parent_type.field(name) {
                // Internal fields feed request mappings but are not part of
                // the client-facing surface.
                Some(def) if def.role != FieldRole::Internal => PlanField::Def(def),
                _ => {
                    let error = GraphqlError::new(format!(
                        "Cannot query field {name} on type {}",
                        parent_type.name
                    ))
                    .at(path)
                    .locate(first.position);
                    self.errors.push(error);
                    return None;
                }
            },
        };
        Some(FieldPlan {
            parent_type,
            parent,
            field,
            position: first.position,
            nodes,
            path,
            rest,
        })
    }

    /// Builds the per-plan request messages for one bucket. Plans whose
    /// arguments fail to coerce complete immediately as field errors.
    fn prepare_bucket(&mut self, plans: Vec<FieldPlan<'a>>) -> Option<PreparedBucket<'a>> {
        let def = match &plans[0].field {
            PlanField::Def(def) => *def,
            _ => unreachable!("buckets only hold IR-backed plans"),
        };
        let parent_type = plans[0].parent_type;

        let (service, method, batch, dedup) = match def.role {
            FieldRole::Load => {
                let target = self
                    .project
                    .get(def.ty.unwrapped())
                    .unwrap_or_else(|| unreachable!("load targets are validated"));
                let loader = target
                    .loader_for(&def.loader_keys)
                    .unwrap_or_else(|| unreachable!("load fields match a validated loader"));
                (
                    Arc::clone(&target.service),
                    loader.rpc_name.clone(),
                    loader.batch,
                    true,
                )
            }
            FieldRole::Resolve => (
                Arc::clone(&def.service),
                naming::resolver_rpc_name(&parent_type.name, &def.name, def.batch),
                def.batch,
                false,
            ),
            _ => unreachable!("buckets only hold RPC-bound plans"),
        };

        let mut ready = Vec::with_capacity(plans.len());
        for plan in plans {
            match self.build_request(def, &plan) {
                Ok(request) => ready.push((plan, request)),
                Err(message) => {
                    let error = GraphqlError::new(message)
                        .at(plan.path.clone())
                        .locate(plan.position);
                    self.errors.push(error);
                    self.null_field(&plan);
                }
            }
        }
        if ready.is_empty() {
            return None;
        }
        Some(PreparedBucket {
            plans: ready,
            service,
            method,
            batch,
            dedup,
        })
    }

    fn build_request(&self, def: &FieldDef, plan: &FieldPlan<'a>) -> Result<Json, String> {
        let mut request = serde_json::Map::new();
        if def.role == FieldRole::Resolve {
            let args =
                input::coerce_argument_values(self.project, def, plan.nodes[0], &self.variables)?;
            for (name, value) in args {
                request.insert(naming::proto_field_name(&name), value);
            }
        }
        for binding in &def.mapping {
            let request_name = naming::proto_field_name(&binding.request_field);
            if request.contains_key(&request_name) {
                continue;
            }
            let value = plan
                .parent
                .get(naming::proto_field_name(&binding.parent_field))
                .cloned()
                .unwrap_or(Json::Null);
            request.insert(request_name, value);
        }
        Ok(Json::Object(request))
    }

    fn null_out(&mut self, rest: &Option<ResponsePath>) {
        match rest {
            None => {
                self.data = Json::Null;
                self.data_nulled = true;
            }
            Some(path) => self.write(path, Json::Null),
        }
    }

    /// Writes a value at a response path. Writes into positions that were
    /// already nulled away silently vanish.
    fn write(&mut self, path: &[PathSegment], value: Json) {
        if self.data_nulled {
            return;
        }
        let Some((last, prefix)) = path.split_last() else {
            self.data = value;
            return;
        };
        let mut current = &mut self.data;
        for segment in prefix {
            current = match segment {
                PathSegment::Field(key) => match current {
                    Json::Object(map) => match map.get_mut(key) {
                        Some(slot) => slot,
                        None => return,
                    },
                    _ => return,
                },
                PathSegment::Index(index) => match current {
                    Json::Array(items) => match items.get_mut(*index) {
                        Some(slot) => slot,
                        None => return,
                    },
                    _ => return,
                },
            };
        }
        match (last, current) {
            (PathSegment::Field(key), Json::Object(map)) => {
                map.insert(key.clone(), value);
            }
            (PathSegment::Index(index), Json::Array(items)) => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = value;
                }
            }
            _ => {}
        }
    }
}

struct PreparedBucket<'a> {
    plans: Vec<(FieldPlan<'a>, Json)>,
    service: Arc<str>,
    method: String,
    batch: bool,
    /// Loader buckets carry distinct key messages only.
    dedup: bool,
}

impl PreparedBucket<'_> {
    fn call_count(&self) -> usize {
        if self.batch {
            1
        } else {
            self.plans.len()
        }
    }
}

/// Issues the bucket's RPC(s) and pairs each plan with its outcome.
async fn drain_bucket<'a>(
    dispatcher: &dyn Dispatch,
    ctx: &CallContext,
    bucket: PreparedBucket<'a>,
) -> Vec<(FieldPlan<'a>, Result<Json, CallError>)> {
    let PreparedBucket {
        plans,
        service,
        method,
        batch,
        dedup,
    } = bucket;

    if !batch {
        let calls = plans.into_iter().map(|(plan, request)| {
            let service = Arc::clone(&service);
            let method = method.clone();
            async move {
                let outcome = dispatcher
                    .call(ctx, &service, &method, request)
                    .await
                    .map(|response| response.get("data").cloned().unwrap_or(Json::Null));
                (plan, outcome)
            }
        });
        return futures::future::join_all(calls).await;
    }

    // Batch dispatch: one RPC for the whole bucket, results matched by
    // position. Loader buckets dedup identical key tuples first.
    let mut requests: Vec<Json> = Vec::new();
    let mut slots: Vec<usize> = Vec::with_capacity(plans.len());
    for (_, request) in &plans {
        let slot = if dedup {
            requests.iter().position(|existing| existing == request)
        } else {
            None
        };
        match slot {
            Some(index) => slots.push(index),
            None => {
                requests.push(request.clone());
                slots.push(requests.len() - 1);
            }
        }
    }

    let envelope = serde_json::json!({ "batches": requests });
    let expected = requests.len();
    let outcome = dispatcher.call(ctx, &service, &method, envelope).await;

    let per_slot: Vec<Result<Json, CallError>> = match outcome {
        Ok(response) => match response.get("batches") {
            Some(Json::Array(batches)) if batches.len() == expected => batches
                .iter()
                .map(|item| Ok(item.get("data").cloned().unwrap_or(Json::Null)))
                .collect(),
            _ => {
                let error = CallError::new(
                    StatusCode::Internal,
                    format!(
                        "batch response from {method} did not contain {expected} elements"
                    ),
                );
                (0..expected).map(|_| Err(error.clone())).collect()
            }
        },
        Err(error) => (0..expected).map(|_| Err(error.clone())).collect(),
    };

    plans
        .into_iter()
        .zip(slots)
        .map(|((plan, _), slot)| (plan, per_slot[slot].clone()))
        .collect()
}

fn coerce_scalar_output(project: &Project, name: &str, value: Json) -> Result<Json, String> {
    use schema::ScalarKind as K;
    let kind = project.scalar_kind(name).unwrap_or(K::String);
    match kind {
        K::String | K::Bytes => match value {
            Json::String(_) => Ok(value),
            Json::Number(n) if name == "ID" => Ok(Json::String(n.to_string())),
            other => Err(format!("expected a string, got {other}")),
        },
        K::Bool => match value {
            Json::Bool(_) => Ok(value),
            other => Err(format!("expected a boolean, got {other}")),
        },
        K::Int32 | K::Int64 | K::UInt32 | K::UInt64 => match &value {
            Json::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            // proto3 JSON renders 64-bit integers as strings.
            Json::String(s) => s
                .parse::<i64>()
                .map(Json::from)
                .map_err(|_| format!("expected an integer, got {s:?}")),
            other => Err(format!("expected an integer, got {other}")),
        },
        K::Float | K::Double => match &value {
            Json::Number(_) => Ok(value),
            Json::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .ok_or_else(|| format!("expected a number, got {s:?}")),
            other => Err(format!("expected a number, got {other}")),
        },
    }
}
