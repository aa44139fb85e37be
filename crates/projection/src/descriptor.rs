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

//! Assembles a `prost_reflect::DescriptorPool` from the catalog so the
//! transport can build and decode messages reflectively, with no generated
//! stubs.

use std::collections::{BTreeMap, BTreeSet};

use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto,
};
use schema::ScalarKind;
use snafu::prelude::*;

use crate::catalog::{Catalog, FieldKind, MessageDef, ProtoFile};
use crate::{DescriptorSnafu, Result};

/// Builds the descriptor pool for the whole catalog. Files are registered in
/// dependency order, which the acyclic import graph guarantees exists.
pub fn build_pool(catalog: &Catalog) -> Result<DescriptorPool> {
    let mut by_name: BTreeMap<String, FileDescriptorProto> = catalog
        .files
        .iter()
        .map(|file| (file.proto_path.clone(), file_descriptor(file)))
        .collect();

    let mut ordered = Vec::with_capacity(by_name.len());
    let mut registered: BTreeSet<String> = BTreeSet::new();
    while !by_name.is_empty() {
        let ready: Vec<String> = by_name
            .iter()
            .filter(|(_, fd)| fd.dependency.iter().all(|d| registered.contains(d)))
            .map(|(name, _)| name.clone())
            .collect();
        debug_assert!(
            !ready.is_empty(),
            "import graph is validated acyclic at compile time"
        );
        if ready.is_empty() {
            break;
        }
        for name in ready {
            if let Some(fd) = by_name.remove(&name) {
                ordered.push(fd);
                registered.insert(name);
            }
        }
    }

    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_protos(ordered)
        .context(DescriptorSnafu)?;
    Ok(pool)
}

fn file_descriptor(file: &ProtoFile) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(file.proto_path.clone()),
        package: Some(file.package.to_string()),
        dependency: file.imports.clone(),
        message_type: file.messages.iter().map(message_descriptor).collect(),
        enum_type: file
            .enums
            .iter()
            .map(|e| EnumDescriptorProto {
                name: Some(e.name.clone()),
                value: e
                    .values
                    .iter()
                    .map(|(name, number)| EnumValueDescriptorProto {
                        name: Some(name.clone()),
                        number: Some(*number),
                        options: None,
                    })
                    .collect(),
                ..Default::default()
            })
            .collect(),
        service: vec![ServiceDescriptorProto {
            name: Some(file.service.name.to_string()),
            method: file
                .service
                .methods
                .iter()
                .map(|m| MethodDescriptorProto {
                    name: Some(m.name.clone()),
                    input_type: Some(format!(".{}.{}", file.package, m.request)),
                    output_type: Some(format!(".{}.{}", file.package, m.response)),
                    ..Default::default()
                })
                .collect(),
            options: None,
        }],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

fn message_descriptor(message: &MessageDef) -> DescriptorProto {
    let mut fields = Vec::with_capacity(message.fields.len());
    let mut oneofs: Vec<OneofDescriptorProto> = Vec::new();

    for field in &message.fields {
        let (r#type, type_name) = match &field.kind {
            FieldKind::Scalar(kind) => (scalar_type(*kind), None),
            FieldKind::Enum { package, name } => {
                (Type::Enum, Some(format!(".{package}.{name}")))
            }
            FieldKind::Message { package, name } => {
                (Type::Message, Some(format!(".{package}.{name}")))
            }
        };
        let label = if field.repeated {
            Label::Repeated
        } else {
            Label::Optional
        };

        // proto3 explicit presence requires a synthetic oneof per field.
        let oneof_index = if field.optional {
            oneofs.push(OneofDescriptorProto {
                name: Some(format!("_{}", field.name)),
                options: None,
            });
            Some(i32::try_from(oneofs.len()).unwrap_or(1) - 1)
        } else {
            None
        };

        fields.push(FieldDescriptorProto {
            name: Some(field.name.clone()),
            number: Some(field.number),
            label: Some(label as i32),
            r#type: Some(r#type as i32),
            type_name,
            oneof_index,
            proto3_optional: field.optional.then_some(true),
            ..Default::default()
        });
    }

    DescriptorProto {
        name: Some(message.name.clone()),
        field: fields,
        oneof_decl: oneofs,
        ..Default::default()
    }
}

fn scalar_type(kind: ScalarKind) -> Type {
    match kind {
        ScalarKind::String => Type::String,
        ScalarKind::Bool => Type::Bool,
        ScalarKind::Bytes => Type::Bytes,
        ScalarKind::Int32 => Type::Int32,
        ScalarKind::Int64 => Type::Int64,
        ScalarKind::UInt32 => Type::Uint32,
        ScalarKind::UInt64 => Type::Uint64,
        ScalarKind::Float => Type::Float,
        ScalarKind::Double => Type::Double,
    }
}
