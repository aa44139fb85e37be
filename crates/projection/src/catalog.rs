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

//! Projects the schema IR to the RPC service/message catalog.
//!
//! One schema file becomes one proto file with one service. Source messages
//! and request messages are hash-numbered (see [`crate::numbering`]); batch
//! and response envelopes number sequentially from 1.

use std::sync::Arc;

use schema::naming;
use schema::{FieldDef, FieldRole, Project, ScalarKind, TypeDef, TypeKind, TypeRef};
use snafu::prelude::*;

use crate::numbering::NumberAllocator;
use crate::{
    AbstractProjectionSnafu, NestedListSnafu, NumberSpaceExhaustedSnafu, Result,
};

/// The derived, immutable RPC catalog.
#[derive(Debug)]
pub struct Catalog {
    pub files: Vec<ProtoFile>,
}

#[derive(Debug)]
pub struct ProtoFile {
    /// Schema file this service came from, relative to the schema root.
    pub schema_path: Arc<str>,
    /// Output path of the rendered proto file, e.g. `social/posts.proto`.
    pub proto_path: String,
    pub package: Arc<str>,
    pub service: ServiceDef,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    /// Proto paths of imported files, sorted.
    pub imports: Vec<String>,
}

#[derive(Debug)]
pub struct ServiceDef {
    pub name: Arc<str>,
    pub full_name: Arc<str>,
    pub methods: Vec<MethodDef>,
}

#[derive(Debug)]
pub struct MethodDef {
    pub name: String,
    pub request: String,
    pub response: String,
    pub batch: bool,
}

#[derive(Debug)]
pub struct MessageDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<MessageField>,
}

#[derive(Debug, Clone)]
pub struct MessageField {
    /// snake_case proto name.
    pub name: String,
    pub number: i32,
    pub kind: FieldKind,
    pub repeated: bool,
    /// Explicit presence (`optional` keyword) for nullable scalar fields.
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Enum { package: Arc<str>, name: String },
    Message { package: Arc<str>, name: String },
}

#[derive(Debug)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    /// `(value name, number)`; a generated `<NAME>_UNSPECIFIED = 0` leads.
    pub values: Vec<(String, i32)>,
}

impl Catalog {
    /// Projects the compiled IR. For a fixed project, the catalog is
    /// byte-stable: iteration follows the IR's sorted file order and
    /// declaration order throughout.
    pub fn project(project: &Project) -> Result<Catalog> {
        let mut files = Vec::with_capacity(project.files().len());
        for file in project.files() {
            files.push(project_file(project, file)?);
        }
        Ok(Catalog { files })
    }

    #[must_use]
    pub fn file(&self, schema_path: &str) -> Option<&ProtoFile> {
        self.files
            .iter()
            .find(|f| f.schema_path.as_ref() == schema_path)
    }

    /// Total number of RPC methods across all services.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.files.iter().map(|f| f.service.methods.len()).sum()
    }
}

pub(crate) fn proto_path_for(schema_path: &str) -> String {
    match schema_path.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.proto"),
        None => format!("{schema_path}.proto"),
    }
}

fn project_file(project: &Project, file: &schema::FileInfo) -> Result<ProtoFile> {
    let mut messages: Vec<MessageDef> = Vec::new();
    let mut enums: Vec<EnumDef> = Vec::new();
    let mut methods: Vec<MethodDef> = Vec::new();

    for def in project.types() {
        if def.file != file.path {
            // Resolver RPCs live with the file that declared the field, which
            // may extend a type defined elsewhere.
            collect_foreign_resolvers(project, file, def, &mut messages, &mut methods)?;
            continue;
        }
        match def.kind {
            TypeKind::Object if project.is_root_type(&def.name) => {
                collect_resolvers(project, file, def, &mut messages, &mut methods)?;
            }
            TypeKind::Object => {
                messages.push(source_message(project, def)?);
                for loader in &def.loaders {
                    collect_loader(project, def, loader, &mut messages, &mut methods)?;
                }
                collect_resolvers(project, file, def, &mut messages, &mut methods)?;
            }
            TypeKind::Input => {
                messages.push(input_message(project, def)?);
            }
            TypeKind::Enum => {
                enums.push(enum_def(def));
            }
            TypeKind::Scalar | TypeKind::Interface | TypeKind::Union => {}
        }
    }

    messages.sort_by(|a, b| a.name.cmp(&b.name));
    enums.sort_by(|a, b| a.name.cmp(&b.name));
    methods.sort_by(|a, b| a.name.cmp(&b.name));

    let imports = file
        .imports
        .iter()
        .map(|path| proto_path_for(path))
        .collect();

    Ok(ProtoFile {
        schema_path: Arc::clone(&file.path),
        proto_path: proto_path_for(&file.path),
        package: Arc::clone(&file.package),
        service: ServiceDef {
            name: Arc::clone(&file.service_name),
            full_name: Arc::clone(&file.service),
            methods,
        },
        messages,
        enums,
        imports,
    })
}

/// Resolver RPCs declared by `file` on types that live in other files.
fn collect_foreign_resolvers(
    project: &Project,
    file: &schema::FileInfo,
    def: &TypeDef,
    messages: &mut Vec<MessageDef>,
    methods: &mut Vec<MethodDef>,
) -> Result<()> {
    if def.kind != TypeKind::Object {
        return Ok(());
    }
    collect_resolvers(project, file, def, messages, methods)
}

fn collect_resolvers(
    project: &Project,
    file: &schema::FileInfo,
    def: &TypeDef,
    messages: &mut Vec<MessageDef>,
    methods: &mut Vec<MethodDef>,
) -> Result<()> {
    for field in &def.fields {
        if field.role != FieldRole::Resolve || field.service != file.service {
            continue;
        }
        let base = naming::resolver_rpc_name(&def.name, &field.name, false);

        let request = resolver_request_message(project, def, field, &base)?;
        let data_kind = output_kind(project, &field.ty, &request.name, "data")?;
        let response = response_message(&base, data_kind);

        if field.batch {
            let batch_name = naming::resolver_rpc_name(&def.name, &field.name, true);
            // Inner messages live in the declaring file's package, which for
            // extension-declared resolvers differs from the parent type's.
            let (batch_request, batch_response) =
                batch_envelopes(&batch_name, &base, Arc::clone(&file.package));
            methods.push(MethodDef {
                name: batch_name,
                request: batch_request.name.clone(),
                response: batch_response.name.clone(),
                batch: true,
            });
            messages.push(batch_request);
            messages.push(batch_response);
        } else {
            methods.push(MethodDef {
                name: base.clone(),
                request: request.name.clone(),
                response: response.name.clone(),
                batch: false,
            });
        }
        messages.push(request);
        messages.push(response);
    }
    Ok(())
}

fn collect_loader(
    project: &Project,
    def: &TypeDef,
    loader: &schema::LoaderDescriptor,
    messages: &mut Vec<MessageDef>,
    methods: &mut Vec<MethodDef>,
) -> Result<()> {
    let base = naming::loader_rpc_name(&def.name, &loader.keys, false);

    let mut allocator = NumberAllocator::new();
    let mut fields = Vec::with_capacity(loader.keys.len());
    let request_name = format!("{base}Request");
    for key in &loader.keys {
        let key_field = def
            .field(key)
            .unwrap_or_else(|| unreachable!("loader keys are validated against stored fields"));
        fields.push(message_field(
            project,
            &mut allocator,
            &request_name,
            key,
            &key_field.ty,
        )?);
    }
    let request = MessageDef {
        name: request_name,
        description: None,
        fields,
    };

    let data_kind = FieldKind::Message {
        package: Arc::clone(&def.package),
        name: format!("{}Source", def.name),
    };
    let response = response_message(&base, (data_kind, false));

    if loader.batch {
        let (batch_request, batch_response) =
            batch_envelopes(&loader.rpc_name, &base, Arc::clone(&def.package));
        methods.push(MethodDef {
            name: loader.rpc_name.clone(),
            request: batch_request.name.clone(),
            response: batch_response.name.clone(),
            batch: true,
        });
        messages.push(batch_request);
        messages.push(batch_response);
    } else {
        methods.push(MethodDef {
            name: loader.rpc_name.clone(),
            request: request.name.clone(),
            response: response.name.clone(),
            batch: false,
        });
    }
    messages.push(request);
    messages.push(response);
    Ok(())
}

/// `{Type}Source`: every field that is neither LOAD nor RESOLVE, including
/// `@internal` ones.
fn source_message(project: &Project, def: &TypeDef) -> Result<MessageDef> {
    let name = format!("{}Source", def.name);
    let mut allocator = NumberAllocator::new();
    let mut fields = Vec::new();
    for field in def.fields.iter().filter(|f| f.is_stored()) {
        fields.push(message_field(
            project,
            &mut allocator,
            &name,
            &field.name,
            &field.ty,
        )?);
    }
    Ok(MessageDef {
        name,
        description: def.description.clone(),
        fields,
    })
}

fn input_message(project: &Project, def: &TypeDef) -> Result<MessageDef> {
    let mut allocator = NumberAllocator::new();
    let mut fields = Vec::new();
    for field in &def.fields {
        fields.push(message_field(
            project,
            &mut allocator,
            &def.name,
            &field.name,
            &field.ty,
        )?);
    }
    Ok(MessageDef {
        name: def.name.to_string(),
        description: def.description.clone(),
        fields,
    })
}

/// GraphQL arguments plus the mapped parent fields.
fn resolver_request_message(
    project: &Project,
    def: &TypeDef,
    field: &FieldDef,
    base: &str,
) -> Result<MessageDef> {
    let name = format!("{base}Request");
    let mut allocator = NumberAllocator::new();
    let mut fields = Vec::new();
    for arg in &field.args {
        fields.push(message_field(
            project,
            &mut allocator,
            &name,
            &arg.name,
            &arg.ty,
        )?);
    }
    for binding in &field.mapping {
        if field
            .args
            .iter()
            .any(|a| a.name == binding.request_field)
        {
            continue;
        }
        let parent_field = def
            .field(&binding.parent_field)
            .unwrap_or_else(|| unreachable!("mappings are validated against stored fields"));
        fields.push(message_field(
            project,
            &mut allocator,
            &name,
            &binding.request_field,
            &parent_field.ty,
        )?);
    }
    Ok(MessageDef {
        name,
        description: None,
        fields,
    })
}

fn response_message(base: &str, data: (FieldKind, bool)) -> MessageDef {
    let (kind, repeated) = data;
    MessageDef {
        name: format!("{base}Response"),
        description: None,
        fields: vec![MessageField {
            name: "data".to_string(),
            number: 1,
            kind,
            repeated,
            optional: false,
        }],
    }
}

fn batch_envelopes(batch_name: &str, base: &str, package: Arc<str>) -> (MessageDef, MessageDef) {
    let request = MessageDef {
        name: format!("{batch_name}Request"),
        description: None,
        fields: vec![MessageField {
            name: "batches".to_string(),
            number: 1,
            kind: FieldKind::Message {
                package: Arc::clone(&package),
                name: format!("{base}Request"),
            },
            repeated: true,
            optional: false,
        }],
    };
    let response = MessageDef {
        name: format!("{batch_name}Response"),
        description: None,
        fields: vec![MessageField {
            name: "batches".to_string(),
            number: 1,
            kind: FieldKind::Message {
                package,
                name: format!("{base}Response"),
            },
            repeated: true,
            optional: false,
        }],
    };
    (request, response)
}

fn message_field(
    project: &Project,
    allocator: &mut NumberAllocator,
    message: &str,
    graphql_name: &str,
    ty: &TypeRef,
) -> Result<MessageField> {
    let proto_name = naming::proto_field_name(graphql_name);
    let number = allocator
        .allocate(&proto_name)
        .context(NumberSpaceExhaustedSnafu {
            message: message.to_string(),
        })?;
    let (kind, repeated) = output_kind(project, ty, message, graphql_name)?;
    let optional = !repeated
        && !ty.is_non_null()
        && matches!(kind, FieldKind::Scalar(_) | FieldKind::Enum { .. });
    Ok(MessageField {
        name: proto_name,
        number,
        kind,
        repeated,
        optional,
    })
}

/// Maps a declared GraphQL type to a proto field kind plus list-ness. Nested
/// lists have no direct proto representation and are rejected.
fn output_kind(
    project: &Project,
    ty: &TypeRef,
    message: &str,
    field: &str,
) -> Result<(FieldKind, bool)> {
    let inner = ty.nullable();
    match inner {
        TypeRef::List(element) => {
            let element = element.nullable();
            ensure!(
                !matches!(element, TypeRef::List(_)),
                NestedListSnafu {
                    message: message.to_string(),
                    field: field.to_string(),
                }
            );
            let (kind, repeated) = output_kind(project, element, message, field)?;
            ensure!(
                !repeated,
                NestedListSnafu {
                    message: message.to_string(),
                    field: field.to_string(),
                }
            );
            Ok((kind, true))
        }
        TypeRef::Named(name) => named_kind(project, name, message, field).map(|k| (k, false)),
        TypeRef::NonNull(_) => {
            unreachable!("nullable() strips the non-null wrapper")
        }
    }
}

fn named_kind(project: &Project, name: &str, message: &str, field: &str) -> Result<FieldKind> {
    if let Some(def) = project.get(name) {
        return match def.kind {
            TypeKind::Scalar => Ok(FieldKind::Scalar(
                def.scalar.unwrap_or(ScalarKind::String),
            )),
            TypeKind::Enum => Ok(FieldKind::Enum {
                package: Arc::clone(&def.package),
                name: def.name.to_string(),
            }),
            TypeKind::Object => Ok(FieldKind::Message {
                package: Arc::clone(&def.package),
                name: format!("{}Source", def.name),
            }),
            TypeKind::Input => Ok(FieldKind::Message {
                package: Arc::clone(&def.package),
                name: def.name.to_string(),
            }),
            TypeKind::Interface | TypeKind::Union => AbstractProjectionSnafu {
                message: message.to_string(),
                field: field.to_string(),
                target: name.to_string(),
            }
            .fail(),
        };
    }
    let kind = ScalarKind::for_builtin(name)
        .unwrap_or_else(|| unreachable!("unknown types are rejected during validation"));
    Ok(FieldKind::Scalar(kind))
}

fn enum_def(def: &TypeDef) -> EnumDef {
    let mut values = Vec::with_capacity(def.values.len() + 1);
    values.push((naming::enum_unspecified_value(&def.name), 0));
    for (idx, value) in def.values.iter().enumerate() {
        values.push((value.name.clone(), i32::try_from(idx).unwrap_or(i32::MAX) + 1));
    }
    EnumDef {
        name: def.name.to_string(),
        description: def.description.clone(),
        values,
    }
}
