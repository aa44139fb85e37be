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

//! Renders the catalog as proto3 text, one file per service. Output is a pure
//! function of the catalog; compiling the same IR twice yields byte-identical
//! files.

use std::fmt::Write as _;

use crate::catalog::{EnumDef, FieldKind, MessageDef, ProtoFile};

/// Renders one proto file.
#[must_use]
pub fn render_file(file: &ProtoFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "syntax = \"proto3\";");
    let _ = writeln!(out);
    let _ = writeln!(out, "package {};", file.package);
    if !file.imports.is_empty() {
        let _ = writeln!(out);
        for import in &file.imports {
            let _ = writeln!(out, "import \"{import}\";");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "service {} {{", file.service.name);
    for method in &file.service.methods {
        let _ = writeln!(
            out,
            "  rpc {}({}) returns ({});",
            method.name, method.request, method.response
        );
    }
    let _ = writeln!(out, "}}");

    for message in &file.messages {
        let _ = writeln!(out);
        render_message(&mut out, file, message);
    }
    for enum_def in &file.enums {
        let _ = writeln!(out);
        render_enum(&mut out, enum_def);
    }
    out
}

fn render_message(out: &mut String, file: &ProtoFile, message: &MessageDef) {
    if let Some(description) = &message.description {
        for line in description.lines() {
            let _ = writeln!(out, "// {line}");
        }
    }
    let _ = writeln!(out, "message {} {{", message.name);
    for field in &message.fields {
        let label = if field.repeated {
            "repeated "
        } else if field.optional {
            "optional "
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  {label}{} {} = {};",
            type_name(file, &field.kind),
            field.name,
            field.number
        );
    }
    let _ = writeln!(out, "}}");
}

fn render_enum(out: &mut String, enum_def: &EnumDef) {
    if let Some(description) = &enum_def.description {
        for line in description.lines() {
            let _ = writeln!(out, "// {line}");
        }
    }
    let _ = writeln!(out, "enum {} {{", enum_def.name);
    for (name, number) in &enum_def.values {
        let _ = writeln!(out, "  {name} = {number};");
    }
    let _ = writeln!(out, "}}");
}

fn type_name(file: &ProtoFile, kind: &FieldKind) -> String {
    match kind {
        FieldKind::Scalar(scalar) => scalar.proto_name().to_string(),
        FieldKind::Enum { package, name } | FieldKind::Message { package, name } => {
            if package.as_ref() == file.package.as_ref() {
                name.clone()
            } else {
                format!("{package}.{name}")
            }
        }
    }
}
