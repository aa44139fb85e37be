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

//! Whole-project validation: reference integrity, projection constraints,
//! and the acyclicity of the file dependency graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use snafu::prelude::*;

use crate::ir::{FieldDef, FieldRole, Project, TypeDef, TypeKind};
use crate::loader::TypeRefUse;
use crate::naming;
use crate::{
    AbstractFieldTypeSnafu, EmptyRootTypeSnafu, Error, FieldNameCollisionSnafu,
    InvalidArgumentTypeSnafu, InvalidInputFieldTypeSnafu, MissingQueryTypeSnafu,
    NoVisibleFieldsSnafu, Result, SourceSpan, UnknownTypeSnafu,
};

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

pub(crate) fn run(project: &mut Project, refs: &[TypeRefUse]) -> Result<()> {
    check_references(project, refs)?;
    check_roots(project)?;
    for def in project.types.values() {
        match def.kind {
            TypeKind::Object => check_object(project, def)?,
            TypeKind::Input => check_input(project, def)?,
            _ => {}
        }
    }
    let imports = check_file_graph(project, refs)?;
    for file in &mut project.files {
        if let Some(deps) = imports.get(file.path.as_ref()) {
            file.imports = deps.iter().cloned().collect();
        }
    }
    Ok(())
}

fn is_builtin(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}

fn check_references(project: &Project, refs: &[TypeRefUse]) -> Result<()> {
    for r in refs {
        ensure!(
            is_builtin(&r.name) || project.types.contains_key(r.name.as_str()),
            UnknownTypeSnafu {
                span: r.span.clone(),
                name: r.name.clone(),
            }
        );
    }
    Ok(())
}

fn check_roots(project: &Project) -> Result<()> {
    let query = project
        .types
        .get(&project.query_type)
        .filter(|t| t.kind == TypeKind::Object)
        .context(MissingQueryTypeSnafu)?;
    ensure!(
        !query.fields.is_empty(),
        EmptyRootTypeSnafu {
            type_name: query.name.to_string(),
        }
    );
    if let Some(mutation) = project.mutation() {
        ensure!(
            !mutation.fields.is_empty(),
            EmptyRootTypeSnafu {
                type_name: mutation.name.to_string(),
            }
        );
    }
    Ok(())
}

fn field_span(field: &FieldDef) -> SourceSpan {
    SourceSpan {
        file: Arc::clone(&field.file),
        line: field.position.line,
        column: field.position.column,
    }
}

fn check_object(project: &Project, def: &TypeDef) -> Result<()> {
    // A type whose every field is @internal cannot be rendered into the
    // client schema.
    ensure!(
        def.fields.iter().any(|f| f.role != FieldRole::Internal),
        NoVisibleFieldsSnafu {
            span: SourceSpan {
                file: Arc::clone(&def.file),
                line: def.position.line,
                column: def.position.column,
            },
            type_name: def.name.to_string(),
        }
    );
    for field in &def.fields {
        check_output_type(project, def, field)?;
        for arg in &field.args {
            let target = arg.ty.unwrapped();
            if let Some(target_def) = project.get(target) {
                let ok = matches!(
                    target_def.kind,
                    TypeKind::Scalar | TypeKind::Enum | TypeKind::Input
                );
                ensure!(
                    ok,
                    InvalidArgumentTypeSnafu {
                        span: field_span(field),
                        arg: arg.name.clone(),
                        target: target.to_string(),
                        kind: target_def.kind.as_str(),
                    }
                );
            }
        }
        if field.role == FieldRole::Resolve {
            check_request_names(def, field)?;
        }
    }

    // Stored fields become the {Type}Source message; their snake_case names
    // must be pairwise distinct.
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for field in def.fields.iter().filter(|f| f.is_stored()) {
        let proto_name = naming::proto_field_name(&field.name);
        if let Some(first) = seen.get(&proto_name) {
            return FieldNameCollisionSnafu {
                span: field_span(field),
                type_name: def.name.to_string(),
                first: (*first).to_string(),
                second: field.name.clone(),
                proto_name,
            }
            .fail();
        }
        seen.insert(proto_name, &field.name);
    }
    Ok(())
}

fn check_output_type(project: &Project, def: &TypeDef, field: &FieldDef) -> Result<()> {
    let target = field.ty.unwrapped();
    let Some(target_def) = project.get(target) else {
        return Ok(()); // built-in scalar; existence already checked
    };
    let abstract_or_input = match target_def.kind {
        TypeKind::Interface | TypeKind::Union => true,
        TypeKind::Input => true,
        TypeKind::Object | TypeKind::Enum | TypeKind::Scalar => false,
    };
    ensure!(
        !abstract_or_input,
        AbstractFieldTypeSnafu {
            span: field_span(field),
            type_name: def.name.to_string(),
            field: field.name.clone(),
            target: target.to_string(),
        }
    );
    Ok(())
}

/// The resolver request message carries the GraphQL arguments plus the mapped
/// parent fields; all of them share one proto namespace.
fn check_request_names(def: &TypeDef, field: &FieldDef) -> Result<()> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    let request_names = field
        .args
        .iter()
        .map(|a| a.name.clone())
        .chain(field.mapping.iter().map(|b| b.request_field.clone()));
    for name in request_names {
        let proto_name = naming::proto_field_name(&name);
        if let Some(first) = seen.get(&proto_name) {
            if *first == name {
                continue; // an argument deliberately shadowing the mapped field
            }
            return FieldNameCollisionSnafu {
                span: field_span(field),
                type_name: format!("{}.{} request", def.name, field.name),
                first: first.clone(),
                second: name,
                proto_name,
            }
            .fail();
        }
        seen.insert(proto_name, name);
    }
    Ok(())
}

fn check_input(project: &Project, def: &TypeDef) -> Result<()> {
    for field in &def.fields {
        let target = field.ty.unwrapped();
        if let Some(target_def) = project.get(target) {
            let ok = matches!(
                target_def.kind,
                TypeKind::Scalar | TypeKind::Enum | TypeKind::Input
            );
            ensure!(
                ok,
                InvalidInputFieldTypeSnafu {
                    span: field_span(field),
                    field: field.name.clone(),
                    target: target.to_string(),
                    kind: target_def.kind.as_str(),
                }
            );
        }
    }
    Ok(())
}

/// Builds the file dependency graph from every recorded type reference and
/// rejects cycles, including cycles that only arise through `extend` blocks.
/// Returns the per-file import sets.
fn check_file_graph(
    project: &Project,
    refs: &[TypeRefUse],
) -> Result<HashMap<String, BTreeSet<Arc<str>>>> {
    let mut edges: HashMap<String, BTreeSet<Arc<str>>> = HashMap::new();
    for file in &project.files {
        edges.entry(file.path.to_string()).or_default();
    }
    for r in refs {
        let Some(target) = project.types.get(r.name.as_str()) else {
            continue;
        };
        if target.file != r.file {
            edges
                .entry(r.file.to_string())
                .or_default()
                .insert(Arc::clone(&target.file));
        }
    }

    // Message placement induces dependencies the raw reference graph misses:
    // a stored field lands in the {Type}Source message of the type's own
    // file even when an extension declared it elsewhere, and a resolver
    // request carries its mapped parent fields into the declaring file.
    for def in project.types.values() {
        if def.kind != TypeKind::Object {
            continue;
        }
        for field in &def.fields {
            match field.role {
                FieldRole::Source | FieldRole::Internal => {
                    if let Some(target) = project.types.get(field.ty.unwrapped()) {
                        if target.file != def.file {
                            edges
                                .entry(def.file.to_string())
                                .or_default()
                                .insert(Arc::clone(&target.file));
                        }
                    }
                }
                FieldRole::Resolve => {
                    for binding in &field.mapping {
                        let Some(parent_field) = def.field(&binding.parent_field) else {
                            continue;
                        };
                        if let Some(target) = project.types.get(parent_field.ty.unwrapped()) {
                            if target.file != field.file {
                                edges
                                    .entry(field.file.to_string())
                                    .or_default()
                                    .insert(Arc::clone(&target.file));
                            }
                        }
                    }
                }
                FieldRole::Load => {}
            }
        }
    }

    // Iterative three-color DFS over files in sorted order for a stable
    // cycle report.
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        InProgress,
        Done,
    }
    let mut states: HashMap<&str, State> = edges
        .keys()
        .map(|k| (k.as_str(), State::Unvisited))
        .collect();

    let mut order: Vec<&str> = edges.keys().map(String::as_str).collect();
    order.sort_unstable();

    for start in order {
        if states[start] != State::Unvisited {
            continue;
        }
        let mut stack: Vec<(&str, Vec<&str>)> = vec![(start, neighbors(&edges, start))];
        states.insert(start, State::InProgress);
        while !stack.is_empty() {
            let next = stack
                .last_mut()
                .and_then(|(_, pending)| pending.pop());
            match next {
                Some(next) => match states.get(next).copied().unwrap_or(State::Unvisited) {
                    State::Unvisited => {
                        states.insert(next, State::InProgress);
                        let next_neighbors = neighbors(&edges, next);
                        stack.push((next, next_neighbors));
                    }
                    State::InProgress => {
                        let mut cycle: Vec<String> = stack
                            .iter()
                            .map(|(n, _)| *n)
                            .skip_while(|n| *n != next)
                            .map(str::to_string)
                            .collect();
                        cycle.push(next.to_string());
                        return Err(Error::FileCycle { cycle });
                    }
                    State::Done => {}
                },
                None => {
                    if let Some((node, _)) = stack.pop() {
                        states.insert(node, State::Done);
                    }
                }
            }
        }
    }

    Ok(edges)
}

fn neighbors<'g>(
    edges: &'g HashMap<String, BTreeSet<Arc<str>>>,
    node: &str,
) -> Vec<&'g str> {
    edges
        .get(node)
        .map(|set| set.iter().map(|s| s.as_ref()).rev().collect())
        .unwrap_or_default()
}
