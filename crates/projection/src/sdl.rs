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

//! Renders the client-facing schema: all bridge directives stripped,
//! `@internal` fields removed, descriptions preserved. Types are emitted in
//! alphabetical order so output is stable for a fixed project.

use std::fmt::Write as _;

use schema::{FieldDef, FieldRole, InputValueDef, Project, TypeDef, TypeKind};

/// Renders the full client schema document.
#[must_use]
pub fn render_client_schema(project: &Project) -> String {
    let mut out = String::new();

    let custom_roots = project.query_type.as_ref() != "Query"
        || project
            .mutation_type
            .as_deref()
            .is_some_and(|m| m != "Mutation");
    if custom_roots {
        let _ = writeln!(out, "schema {{");
        let _ = writeln!(out, "  query: {}", project.query_type);
        if let Some(mutation) = &project.mutation_type {
            let _ = writeln!(out, "  mutation: {mutation}");
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
    }

    let mut types: Vec<&TypeDef> = project.types().collect();
    types.sort_by(|a, b| a.name.cmp(&b.name));

    let mut first = true;
    for def in types {
        if !first {
            let _ = writeln!(out);
        }
        first = false;
        render_type(&mut out, def);
    }
    out
}

fn render_type(out: &mut String, def: &TypeDef) {
    render_description(out, def.description.as_deref(), "");
    match def.kind {
        TypeKind::Object | TypeKind::Interface => {
            let keyword = if def.kind == TypeKind::Object {
                "type"
            } else {
                "interface"
            };
            let implements = if def.interfaces.is_empty() {
                String::new()
            } else {
                let names: Vec<&str> = def.interfaces.iter().map(AsRef::as_ref).collect();
                format!(" implements {}", names.join(" & "))
            };
            let _ = writeln!(out, "{keyword} {}{implements} {{", def.name);
            for field in def.fields.iter().filter(|f| f.role != FieldRole::Internal) {
                render_field(out, field);
            }
            let _ = writeln!(out, "}}");
        }
        TypeKind::Union => {
            let members: Vec<&str> = def.members.iter().map(AsRef::as_ref).collect();
            let _ = writeln!(out, "union {} = {}", def.name, members.join(" | "));
        }
        TypeKind::Enum => {
            let _ = writeln!(out, "enum {} {{", def.name);
            for value in &def.values {
                render_description(out, value.description.as_deref(), "  ");
                let _ = writeln!(out, "  {}", value.name);
            }
            let _ = writeln!(out, "}}");
        }
        TypeKind::Scalar => {
            let _ = writeln!(out, "scalar {}", def.name);
        }
        TypeKind::Input => {
            let _ = writeln!(out, "input {} {{", def.name);
            for field in &def.fields {
                render_description(out, field.description.as_deref(), "  ");
                let default = render_default(field.default_value.as_ref());
                let _ = writeln!(out, "  {}: {}{default}", field.name, field.ty);
            }
            let _ = writeln!(out, "}}");
        }
    }
}

fn render_field(out: &mut String, field: &FieldDef) {
    render_description(out, field.description.as_deref(), "  ");
    let args = render_arguments(&field.args);
    let _ = writeln!(out, "  {}{args}: {}", field.name, field.ty);
}

fn render_arguments(args: &[InputValueDef]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = args
        .iter()
        .map(|arg| {
            let default = render_default(arg.default_value.as_ref());
            format!("{}: {}{default}", arg.name, arg.ty)
        })
        .collect();
    format!("({})", rendered.join(", "))
}

fn render_default(default: Option<&serde_json::Value>) -> String {
    match default {
        Some(value) => format!(" = {}", render_value(value)),
        None => String::new(),
    }
}

fn render_value(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}: {}", render_value(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

fn render_description(out: &mut String, description: Option<&str>, indent: &str) {
    let Some(description) = description else {
        return;
    };
    let _ = writeln!(out, "{indent}\"\"\"");
    for line in description.lines() {
        let _ = writeln!(out, "{indent}{line}");
    }
    let _ = writeln!(out, "{indent}\"\"\"");
}
