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

//! Multi-file schema loading: parse every file, merge `extend` blocks into
//! their base definitions, interpret directives, and hand the merged picture
//! to validation.

use std::collections::HashSet;
use std::sync::Arc;

use graphql_parser::schema as ast;
use indexmap::IndexMap;
use snafu::prelude::*;

use crate::directives::{self, LoadArgs};
use crate::ir::{
    EnumValueDef, FieldDef, FieldRole, FileInfo, InputValueDef, LoaderDescriptor, Project,
    ScalarKind, SourcePos, TypeDef, TypeKind, TypeRef,
};
use crate::naming;
use crate::validate;
use crate::{
    BatchOnRootTypeSnafu, DefaultKeyDerivationSnafu, DirectiveArgumentSnafu,
    DirectiveConflictSnafu, DuplicateEnumValueSnafu, DuplicateFieldSnafu, DuplicateLoaderSnafu,
    DuplicateTypeSnafu, ExtendKindMismatchSnafu, ExtendUnknownTypeSnafu,
    InvalidDefaultValueSnafu, LoadFieldHasArgumentsSnafu, LoadTargetNotObjectSnafu,
    LoaderKeyInvalidSnafu, MappingParentFieldSnafu, NoMatchingLoaderSnafu, ParseSnafu, Result,
    SchemaSource, SourceSpan, SubscriptionUnsupportedSnafu,
};

type AstDirective<'a> = ast::Directive<'a, String>;
type AstEnumValue<'a> = ast::EnumValue<'a, String>;
type AstField<'a> = ast::Field<'a, String>;
type AstInputValue<'a> = ast::InputValue<'a, String>;
type AstType<'a> = ast::Type<'a, String>;
type AstValue<'a> = ast::Value<'a, String>;

/// A type reference made by some file, kept for reference-integrity checking
/// and the file dependency graph.
pub(crate) struct TypeRefUse {
    pub file: Arc<str>,
    pub name: String,
    pub span: SourceSpan,
}

struct FileCtx {
    path: Arc<str>,
    package: Arc<str>,
    service_name: Arc<str>,
    service: Arc<str>,
}

struct PendingField<'a> {
    ast: &'a AstField<'a>,
    file: Arc<str>,
    service: Arc<str>,
}

struct Pending<'a> {
    name: Arc<str>,
    kind: TypeKind,
    description: Option<String>,
    position: graphql_parser::Pos,
    file: Arc<str>,
    service: Arc<str>,
    package: Arc<str>,
    interfaces: Vec<Arc<str>>,
    members: Vec<Arc<str>>,
    enum_values: Vec<(&'a AstEnumValue<'a>, Arc<str>)>,
    scalar_directives: Vec<(&'a [AstDirective<'a>], Arc<str>)>,
    loader_directives: Vec<(&'a [AstDirective<'a>], Arc<str>)>,
    plain_directives: Vec<(&'a [AstDirective<'a>], Arc<str>)>,
    fields: Vec<PendingField<'a>>,
    input_fields: Vec<(&'a AstInputValue<'a>, Arc<str>)>,
}

impl<'a> Pending<'a> {
    fn new(ctx: &FileCtx, name: &str, kind: TypeKind, position: graphql_parser::Pos) -> Self {
        Pending {
            name: Arc::from(name),
            kind,
            description: None,
            position,
            file: Arc::clone(&ctx.path),
            service: Arc::clone(&ctx.service),
            package: Arc::clone(&ctx.package),
            interfaces: Vec::new(),
            members: Vec::new(),
            enum_values: Vec::new(),
            scalar_directives: Vec::new(),
            loader_directives: Vec::new(),
            plain_directives: Vec::new(),
            fields: Vec::new(),
            input_fields: Vec::new(),
        }
    }
}

pub(crate) fn build(root_package: &str, mut sources: Vec<SchemaSource>) -> Result<Project> {
    sources.sort_by(|a, b| a.path.cmp(&b.path));

    let mut contexts = Vec::with_capacity(sources.len());
    for source in &sources {
        let (package, service_name) = naming::service_parts(&source.path, root_package);
        let service = format!("{package}.{service_name}");
        contexts.push(FileCtx {
            path: Arc::clone(&source.path),
            package: Arc::from(package),
            service_name: Arc::from(service_name),
            service: Arc::from(service),
        });
    }

    let mut documents = Vec::with_capacity(sources.len());
    for source in &sources {
        let doc = ast::parse_schema::<String>(&source.text).context(ParseSnafu {
            file: Arc::clone(&source.path),
        })?;
        documents.push(doc);
    }

    let mut pending: IndexMap<Arc<str>, Pending<'_>> = IndexMap::new();
    let mut refs: Vec<TypeRefUse> = Vec::new();
    let mut query_override: Option<String> = None;
    let mut mutation_override: Option<String> = None;

    // Pass 1: register every definition.
    for (ctx, doc) in contexts.iter().zip(documents.iter()) {
        for definition in &doc.definitions {
            match definition {
                ast::Definition::SchemaDefinition(schema_def) => {
                    ensure!(
                        schema_def.subscription.is_none(),
                        SubscriptionUnsupportedSnafu {
                            span: SourceSpan::new(&ctx.path, schema_def.position),
                        }
                    );
                    if let Some(query) = &schema_def.query {
                        query_override = Some(query.clone());
                        record_name_ref(&mut refs, ctx, query, schema_def.position);
                    }
                    if let Some(mutation) = &schema_def.mutation {
                        mutation_override = Some(mutation.clone());
                        record_name_ref(&mut refs, ctx, mutation, schema_def.position);
                    }
                }
                ast::Definition::TypeDefinition(type_def) => {
                    register_definition(&mut pending, &mut refs, ctx, type_def)?;
                }
                ast::Definition::TypeExtension(_) => {}
                // Directive definitions exist only so editors can validate the
                // bridge directives; they carry no information of their own.
                ast::Definition::DirectiveDefinition(_) => {}
            }
        }
    }

    // Pass 2: merge extensions into their base definitions.
    for (ctx, doc) in contexts.iter().zip(documents.iter()) {
        for definition in &doc.definitions {
            if let ast::Definition::TypeExtension(extension) = definition {
                apply_extension(&mut pending, &mut refs, ctx, extension)?;
            }
        }
    }

    let query_type: Arc<str> = Arc::from(query_override.as_deref().unwrap_or("Query"));
    let mutation_name = mutation_override.unwrap_or_else(|| "Mutation".to_string());
    let mutation_type: Option<Arc<str>> = if pending.contains_key(mutation_name.as_str()) {
        Some(Arc::from(mutation_name.as_str()))
    } else {
        None
    };

    // Pass 3: build every type; LOAD fields keep their raw mapping for now.
    let mut types: IndexMap<Arc<str>, TypeDef> = IndexMap::new();
    let mut load_fixups: Vec<(Arc<str>, usize, LoadArgs)> = Vec::new();
    for (name, p) in &pending {
        let is_root = query_type.as_ref() == name.as_ref()
            || mutation_type.as_deref() == Some(name.as_ref());
        let (def, loads) = build_type(p, is_root)?;
        for (field_idx, args) in loads {
            load_fixups.push((Arc::clone(name), field_idx, args));
        }
        types.insert(Arc::clone(name), def);
    }

    // Pass 4: match every LOAD field against a loader on its target type.
    apply_load_fixups(&mut types, load_fixups)?;

    let files = contexts
        .iter()
        .map(|ctx| FileInfo {
            path: Arc::clone(&ctx.path),
            package: Arc::clone(&ctx.package),
            service_name: Arc::clone(&ctx.service_name),
            service: Arc::clone(&ctx.service),
            imports: Vec::new(),
        })
        .collect();

    let mut project = Project {
        root_package: Arc::from(root_package),
        types,
        files,
        query_type,
        mutation_type,
    };

    validate::run(&mut project, &refs)?;
    Ok(project)
}

fn record_name_ref(refs: &mut Vec<TypeRefUse>, ctx: &FileCtx, name: &str, pos: graphql_parser::Pos) {
    refs.push(TypeRefUse {
        file: Arc::clone(&ctx.path),
        name: name.to_string(),
        span: SourceSpan::new(&ctx.path, pos),
    });
}

fn record_type_ref(
    refs: &mut Vec<TypeRefUse>,
    file: &Arc<str>,
    ty: &AstType<'_>,
    pos: graphql_parser::Pos,
) {
    match ty {
        ast::Type::NamedType(name) => refs.push(TypeRefUse {
            file: Arc::clone(file),
            name: name.clone(),
            span: SourceSpan::new(file, pos),
        }),
        ast::Type::ListType(inner) | ast::Type::NonNullType(inner) => {
            record_type_ref(refs, file, inner, pos);
        }
    }
}

fn register_definition<'a>(
    pending: &mut IndexMap<Arc<str>, Pending<'a>>,
    refs: &mut Vec<TypeRefUse>,
    ctx: &FileCtx,
    type_def: &'a ast::TypeDefinition<'a, String>,
) -> Result<()> {
    let (name, position) = match type_def {
        ast::TypeDefinition::Scalar(t) => (&t.name, t.position),
        ast::TypeDefinition::Object(t) => (&t.name, t.position),
        ast::TypeDefinition::Interface(t) => (&t.name, t.position),
        ast::TypeDefinition::Union(t) => (&t.name, t.position),
        ast::TypeDefinition::Enum(t) => (&t.name, t.position),
        ast::TypeDefinition::InputObject(t) => (&t.name, t.position),
    };
    if let Some(existing) = pending.get(name.as_str()) {
        return DuplicateTypeSnafu {
            span: SourceSpan::new(&ctx.path, position),
            name: name.clone(),
            other_file: Arc::clone(&existing.file),
        }
        .fail();
    }

    let mut p;
    match type_def {
        ast::TypeDefinition::Scalar(t) => {
            p = Pending::new(ctx, &t.name, TypeKind::Scalar, t.position);
            p.description.clone_from(&t.description);
            p.scalar_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
        }
        ast::TypeDefinition::Object(t) => {
            p = Pending::new(ctx, &t.name, TypeKind::Object, t.position);
            p.description.clone_from(&t.description);
            p.loader_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for interface in &t.implements_interfaces {
                p.interfaces.push(Arc::from(interface.as_str()));
                record_name_ref(refs, ctx, interface, t.position);
            }
            for field in &t.fields {
                record_field_refs(refs, &ctx.path, field);
                p.fields.push(PendingField {
                    ast: field,
                    file: Arc::clone(&ctx.path),
                    service: Arc::clone(&ctx.service),
                });
            }
        }
        ast::TypeDefinition::Interface(t) => {
            p = Pending::new(ctx, &t.name, TypeKind::Interface, t.position);
            p.description.clone_from(&t.description);
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for field in &t.fields {
                record_field_refs(refs, &ctx.path, field);
                p.fields.push(PendingField {
                    ast: field,
                    file: Arc::clone(&ctx.path),
                    service: Arc::clone(&ctx.service),
                });
            }
        }
        ast::TypeDefinition::Union(t) => {
            p = Pending::new(ctx, &t.name, TypeKind::Union, t.position);
            p.description.clone_from(&t.description);
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for member in &t.types {
                p.members.push(Arc::from(member.as_str()));
                record_name_ref(refs, ctx, member, t.position);
            }
        }
        ast::TypeDefinition::Enum(t) => {
            p = Pending::new(ctx, &t.name, TypeKind::Enum, t.position);
            p.description.clone_from(&t.description);
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for value in &t.values {
                p.enum_values.push((value, Arc::clone(&ctx.path)));
            }
        }
        ast::TypeDefinition::InputObject(t) => {
            p = Pending::new(ctx, &t.name, TypeKind::Input, t.position);
            p.description.clone_from(&t.description);
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for field in &t.fields {
                record_type_ref(refs, &ctx.path, &field.value_type, field.position);
                p.input_fields.push((field, Arc::clone(&ctx.path)));
            }
        }
    }
    pending.insert(Arc::clone(&p.name), p);
    Ok(())
}

fn apply_extension<'a>(
    pending: &mut IndexMap<Arc<str>, Pending<'a>>,
    refs: &mut Vec<TypeRefUse>,
    ctx: &FileCtx,
    extension: &'a ast::TypeExtension<'a, String>,
) -> Result<()> {
    let (name, position, kind) = match extension {
        ast::TypeExtension::Scalar(t) => (&t.name, t.position, TypeKind::Scalar),
        ast::TypeExtension::Object(t) => (&t.name, t.position, TypeKind::Object),
        ast::TypeExtension::Interface(t) => (&t.name, t.position, TypeKind::Interface),
        ast::TypeExtension::Union(t) => (&t.name, t.position, TypeKind::Union),
        ast::TypeExtension::Enum(t) => (&t.name, t.position, TypeKind::Enum),
        ast::TypeExtension::InputObject(t) => (&t.name, t.position, TypeKind::Input),
    };
    let span = SourceSpan::new(&ctx.path, position);

    // The extension target deliberately creates no dependency edge: extending
    // a foreign type is the reverse-reference mechanism. Types referenced by
    // the extension's own fields still do.
    let Some(p) = pending.get_mut(name.as_str()) else {
        return ExtendUnknownTypeSnafu {
            span,
            name: name.clone(),
        }
        .fail();
    };
    ensure!(
        p.kind == kind,
        ExtendKindMismatchSnafu {
            span,
            name: name.clone(),
            kind: p.kind.as_str(),
        }
    );

    match extension {
        ast::TypeExtension::Scalar(t) => {
            p.scalar_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
        }
        ast::TypeExtension::Object(t) => {
            p.loader_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for interface in &t.implements_interfaces {
                p.interfaces.push(Arc::from(interface.as_str()));
                record_name_ref(refs, ctx, interface, t.position);
            }
            for field in &t.fields {
                record_field_refs(refs, &ctx.path, field);
                p.fields.push(PendingField {
                    ast: field,
                    file: Arc::clone(&ctx.path),
                    service: Arc::clone(&ctx.service),
                });
            }
        }
        ast::TypeExtension::Interface(t) => {
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for field in &t.fields {
                record_field_refs(refs, &ctx.path, field);
                p.fields.push(PendingField {
                    ast: field,
                    file: Arc::clone(&ctx.path),
                    service: Arc::clone(&ctx.service),
                });
            }
        }
        ast::TypeExtension::Union(t) => {
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for member in &t.types {
                p.members.push(Arc::from(member.as_str()));
                record_name_ref(refs, ctx, member, t.position);
            }
        }
        ast::TypeExtension::Enum(t) => {
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for value in &t.values {
                p.enum_values.push((value, Arc::clone(&ctx.path)));
            }
        }
        ast::TypeExtension::InputObject(t) => {
            p.plain_directives
                .push((t.directives.as_slice(), Arc::clone(&ctx.path)));
            for field in &t.fields {
                record_type_ref(refs, &ctx.path, &field.value_type, field.position);
                p.input_fields.push((field, Arc::clone(&ctx.path)));
            }
        }
    }
    Ok(())
}

fn record_field_refs(refs: &mut Vec<TypeRefUse>, file: &Arc<str>, field: &AstField<'_>) {
    record_type_ref(refs, file, &field.field_type, field.position);
    for arg in &field.arguments {
        record_type_ref(refs, file, &arg.value_type, arg.position);
    }
}

fn build_type(p: &Pending<'_>, is_root: bool) -> Result<(TypeDef, Vec<(usize, LoadArgs)>)> {
    let mut def = TypeDef {
        name: Arc::clone(&p.name),
        kind: p.kind,
        description: p.description.clone(),
        fields: Vec::new(),
        loaders: Vec::new(),
        interfaces: p.interfaces.clone(),
        members: p.members.clone(),
        values: Vec::new(),
        scalar: None,
        file: Arc::clone(&p.file),
        service: Arc::clone(&p.service),
        package: Arc::clone(&p.package),
        position: SourcePos {
            line: p.position.line,
            column: p.position.column,
        },
    };
    let mut loads = Vec::new();

    match p.kind {
        TypeKind::Object => {
            build_object_fields(p, is_root, &mut def, &mut loads)?;
            build_loaders(p, is_root, &mut def)?;
        }
        TypeKind::Interface => {
            for (directives, file) in &p.plain_directives {
                directives::expect_none(file, directives)?;
            }
            for pf in &p.fields {
                directives::expect_none(&pf.file, &pf.ast.directives)?;
                let field = convert_plain_field(pf)?;
                ensure_unique_field(&def, &field, pf)?;
                def.fields.push(field);
            }
        }
        TypeKind::Union | TypeKind::Enum => {
            for (directives, file) in &p.plain_directives {
                directives::expect_none(file, directives)?;
            }
            for (value, file) in &p.enum_values {
                directives::expect_none(file, &value.directives)?;
                if def.values.iter().any(|v| v.name == value.name) {
                    return DuplicateEnumValueSnafu {
                        span: SourceSpan::new(file, value.position),
                        type_name: p.name.to_string(),
                        value: value.name.clone(),
                    }
                    .fail();
                }
                def.values.push(EnumValueDef {
                    name: value.name.clone(),
                    description: value.description.clone(),
                });
            }
        }
        TypeKind::Scalar => {
            let mut kind = None;
            for (directives, file) in &p.scalar_directives {
                if let Some(mapped) = directives::scalar_mapping(file, directives)? {
                    kind = Some(mapped);
                }
            }
            def.scalar = Some(kind.unwrap_or(ScalarKind::String));
        }
        TypeKind::Input => {
            for (directives, file) in &p.plain_directives {
                directives::expect_none(file, directives)?;
            }
            for (input_field, file) in &p.input_fields {
                directives::expect_none(file, &input_field.directives)?;
                let span = SourceSpan::new(file, input_field.position);
                if def.fields.iter().any(|f| f.name == input_field.name) {
                    return DuplicateFieldSnafu {
                        span,
                        type_name: p.name.to_string(),
                        field: input_field.name.clone(),
                    }
                    .fail();
                }
                let default_value = input_field
                    .default_value
                    .as_ref()
                    .map(|v| ast_value_to_json(v, &span))
                    .transpose()?;
                def.fields.push(FieldDef {
                    name: input_field.name.clone(),
                    description: input_field.description.clone(),
                    ty: convert_type(&input_field.value_type),
                    args: Vec::new(),
                    role: FieldRole::Source,
                    batch: false,
                    is_id: false,
                    default_value,
                    mapping: Vec::new(),
                    loader_keys: Vec::new(),
                    service: Arc::clone(&p.service),
                    file: Arc::clone(file),
                    position: SourcePos {
                        line: input_field.position.line,
                        column: input_field.position.column,
                    },
                });
            }
        }
    }

    Ok((def, loads))
}

fn build_object_fields(
    p: &Pending<'_>,
    is_root: bool,
    def: &mut TypeDef,
    loads: &mut Vec<(usize, LoadArgs)>,
) -> Result<()> {
    struct Parsed {
        resolve: Option<directives::ResolveArgs>,
    }
    let mut parsed: Vec<Parsed> = Vec::with_capacity(p.fields.len());

    for pf in &p.fields {
        let span = SourceSpan::new(&pf.file, pf.ast.position);
        let dirs = directives::field_directives(&pf.file, &pf.ast.directives)?;
        ensure!(
            dirs.load.is_none() || dirs.resolve.is_none(),
            DirectiveConflictSnafu {
                span: span.clone(),
                field: pf.ast.name.clone(),
            }
        );
        if (dirs.id || dirs.internal) && (dirs.load.is_some() || dirs.resolve.is_some()) {
            return DirectiveArgumentSnafu {
                span,
                directive: if dirs.id { "id" } else { "internal" },
                reason: "only stored fields can carry this directive".to_string(),
            }
            .fail();
        }
        if is_root && (dirs.id || dirs.internal) {
            return DirectiveArgumentSnafu {
                span,
                directive: if dirs.id { "id" } else { "internal" },
                reason: "not allowed on root type fields".to_string(),
            }
            .fail();
        }

        let role = if dirs.load.is_some() {
            FieldRole::Load
        } else if dirs.resolve.is_some() || is_root {
            FieldRole::Resolve
        } else if dirs.internal {
            FieldRole::Internal
        } else {
            FieldRole::Source
        };

        let mut field = FieldDef {
            name: pf.ast.name.clone(),
            description: pf.ast.description.clone(),
            ty: convert_type(&pf.ast.field_type),
            args: convert_arguments(pf)?,
            role,
            batch: false,
            is_id: dirs.id,
            default_value: None,
            mapping: Vec::new(),
            loader_keys: Vec::new(),
            service: Arc::clone(&pf.service),
            file: Arc::clone(&pf.file),
            position: SourcePos {
                line: pf.ast.position.line,
                column: pf.ast.position.column,
            },
        };
        if role == FieldRole::Load {
            ensure!(
                field.args.is_empty(),
                LoadFieldHasArgumentsSnafu {
                    span: span.clone(),
                    field: field.name.clone(),
                }
            );
        }
        ensure_unique_field(def, &field, pf)?;

        if let Some(resolve) = &dirs.resolve {
            if resolve.batch && is_root {
                return BatchOnRootTypeSnafu {
                    span,
                    type_name: p.name.to_string(),
                }
                .fail();
            }
            field.batch = resolve.batch;
        }

        if let Some(load_args) = dirs.load {
            loads.push((def.fields.len(), load_args));
        }
        parsed.push(Parsed {
            resolve: dirs.resolve,
        });
        def.fields.push(field);
    }

    // Resolve mappings need the full field list: the implicit form pulls in
    // every @id field of the parent.
    let id_fields: Vec<String> = def
        .fields
        .iter()
        .filter(|f| f.is_id && f.is_stored())
        .map(|f| f.name.clone())
        .collect();
    let stored: HashSet<String> = def
        .fields
        .iter()
        .filter(|f| f.is_stored())
        .map(|f| f.name.clone())
        .collect();

    for (idx, parsed_field) in parsed.iter().enumerate() {
        let field = &def.fields[idx];
        if field.role != FieldRole::Resolve {
            continue;
        }
        let span = SourceSpan::new(&field.file, graphql_parser::Pos {
            line: field.position.line,
            column: field.position.column,
        });
        let mut mapping = match parsed_field.resolve.as_ref().and_then(|r| r.with.clone()) {
            Some(explicit) => {
                for binding in &explicit {
                    ensure!(
                        stored.contains(&binding.parent_field),
                        MappingParentFieldSnafu {
                            span: span.clone(),
                            field: field.name.clone(),
                            parent_field: binding.parent_field.clone(),
                            parent: p.name.to_string(),
                        }
                    );
                }
                explicit
            }
            None => id_fields
                .iter()
                .map(|name| crate::ir::FieldBinding {
                    request_field: name.clone(),
                    parent_field: name.clone(),
                })
                .collect(),
        };
        mapping.sort_by(|a, b| a.request_field.cmp(&b.request_field));
        def.fields[idx].mapping = mapping;
    }

    Ok(())
}

fn build_loaders(p: &Pending<'_>, is_root: bool, def: &mut TypeDef) -> Result<()> {
    for (directive_slice, file) in &p.loader_directives {
        for args in directives::loader_directives(file, directive_slice)? {
            if is_root {
                return DirectiveArgumentSnafu {
                    span: args.span,
                    directive: "loader",
                    reason: "not allowed on root types".to_string(),
                }
                .fail();
            }
            let mut keys = match args.keys {
                Some(keys) => keys,
                None => default_loader_keys(def).context(DefaultKeyDerivationSnafu {
                    span: args.span.clone(),
                    type_name: p.name.to_string(),
                })?,
            };
            keys.sort();
            keys.dedup();
            for key in &keys {
                let valid = def.field(key).is_some_and(FieldDef::is_stored);
                ensure!(
                    valid,
                    LoaderKeyInvalidSnafu {
                        span: args.span.clone(),
                        type_name: p.name.to_string(),
                        key: key.clone(),
                    }
                );
            }
            if def.loaders.iter().any(|l| l.keys == keys) {
                return DuplicateLoaderSnafu {
                    span: args.span,
                    type_name: p.name.to_string(),
                    keys,
                }
                .fail();
            }
            let rpc_name = naming::loader_rpc_name(&p.name, &keys, args.batch);
            def.loaders.push(LoaderDescriptor {
                keys,
                batch: args.batch,
                rpc_name,
            });
        }
    }
    Ok(())
}

fn default_loader_keys(def: &TypeDef) -> Option<Vec<String>> {
    let ids: Vec<String> = def
        .fields
        .iter()
        .filter(|f| f.is_id && f.is_stored())
        .map(|f| f.name.clone())
        .collect();
    if !ids.is_empty() {
        return Some(ids);
    }
    def.field("id")
        .filter(|f| f.is_stored())
        .map(|f| vec![f.name.clone()])
}

fn apply_load_fixups(
    types: &mut IndexMap<Arc<str>, TypeDef>,
    fixups: Vec<(Arc<str>, usize, LoadArgs)>,
) -> Result<()> {
    struct Fixup {
        type_name: Arc<str>,
        field_idx: usize,
        batch: bool,
        loader_keys: Vec<String>,
        mapping: Vec<crate::ir::FieldBinding>,
    }

    let mut updates = Vec::with_capacity(fixups.len());
    for (type_name, field_idx, args) in fixups {
        let parent = &types[&type_name];
        let field = &parent.fields[field_idx];
        let span = SourceSpan::new(&field.file, graphql_parser::Pos {
            line: field.position.line,
            column: field.position.column,
        });

        for binding in &args.with {
            let valid = parent
                .field(&binding.parent_field)
                .is_some_and(FieldDef::is_stored);
            ensure!(
                valid,
                MappingParentFieldSnafu {
                    span: span.clone(),
                    field: field.name.clone(),
                    parent_field: binding.parent_field.clone(),
                    parent: type_name.to_string(),
                }
            );
        }

        let target_name = field.ty.unwrapped().to_string();
        let target = types
            .get(target_name.as_str())
            .filter(|t| t.kind == TypeKind::Object)
            .context(LoadTargetNotObjectSnafu {
                span: span.clone(),
                field: field.name.clone(),
                target: target_name.clone(),
            })?;

        let mut keys: Vec<String> = args.with.iter().map(|b| b.request_field.clone()).collect();
        keys.sort();
        let loader = target.loader_for(&keys).context(NoMatchingLoaderSnafu {
            span: span.clone(),
            field: field.name.clone(),
            target: target_name.clone(),
            keys: keys.clone(),
        })?;

        let mut mapping = args.with;
        mapping.sort_by(|a, b| a.request_field.cmp(&b.request_field));
        updates.push(Fixup {
            type_name,
            field_idx,
            batch: loader.batch,
            loader_keys: loader.keys.clone(),
            mapping,
        });
    }

    for fixup in updates {
        let field = &mut types[&fixup.type_name].fields[fixup.field_idx];
        field.batch = fixup.batch;
        field.loader_keys = fixup.loader_keys;
        field.mapping = fixup.mapping;
    }
    Ok(())
}

fn ensure_unique_field(def: &TypeDef, field: &FieldDef, pf: &PendingField<'_>) -> Result<()> {
    if def.fields.iter().any(|f| f.name == field.name) {
        return DuplicateFieldSnafu {
            span: SourceSpan::new(&pf.file, pf.ast.position),
            type_name: def.name.to_string(),
            field: field.name.clone(),
        }
        .fail();
    }
    Ok(())
}

fn convert_plain_field(pf: &PendingField<'_>) -> Result<FieldDef> {
    Ok(FieldDef {
        name: pf.ast.name.clone(),
        description: pf.ast.description.clone(),
        ty: convert_type(&pf.ast.field_type),
        args: convert_arguments(pf)?,
        role: FieldRole::Source,
        batch: false,
        is_id: false,
        default_value: None,
        mapping: Vec::new(),
        loader_keys: Vec::new(),
        service: Arc::clone(&pf.service),
        file: Arc::clone(&pf.file),
        position: SourcePos {
            line: pf.ast.position.line,
            column: pf.ast.position.column,
        },
    })
}

fn convert_arguments(pf: &PendingField<'_>) -> Result<Vec<InputValueDef>> {
    pf.ast
        .arguments
        .iter()
        .map(|arg| {
            let default_value = arg
                .default_value
                .as_ref()
                .map(|v| ast_value_to_json(v, &SourceSpan::new(&pf.file, arg.position)))
                .transpose()?;
            Ok(InputValueDef {
                name: arg.name.clone(),
                description: arg.description.clone(),
                ty: convert_type(&arg.value_type),
                default_value,
            })
        })
        .collect()
}

fn convert_type(ty: &AstType<'_>) -> TypeRef {
    match ty {
        ast::Type::NamedType(name) => TypeRef::Named(Arc::from(name.as_str())),
        ast::Type::ListType(inner) => TypeRef::List(Box::new(convert_type(inner))),
        ast::Type::NonNullType(inner) => TypeRef::NonNull(Box::new(convert_type(inner))),
    }
}

fn ast_value_to_json(value: &AstValue<'_>, span: &SourceSpan) -> Result<serde_json::Value> {
    use serde_json::Value as Json;
    Ok(match value {
        ast::Value::Variable(name) => {
            return InvalidDefaultValueSnafu {
                span: span.clone(),
                reason: format!("variable ${name} is not allowed in schema defaults"),
            }
            .fail()
        }
        ast::Value::Int(n) => {
            let n = n.as_i64().context(InvalidDefaultValueSnafu {
                span: span.clone(),
                reason: "integer out of range".to_string(),
            })?;
            Json::from(n)
        }
        ast::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .context(InvalidDefaultValueSnafu {
                span: span.clone(),
                reason: "non-finite float".to_string(),
            })?,
        ast::Value::String(s) => Json::String(s.clone()),
        ast::Value::Boolean(b) => Json::Bool(*b),
        ast::Value::Null => Json::Null,
        ast::Value::Enum(name) => Json::String(name.clone()),
        ast::Value::List(items) => Json::Array(
            items
                .iter()
                .map(|item| ast_value_to_json(item, span))
                .collect::<Result<_>>()?,
        ),
        ast::Value::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), ast_value_to_json(v, span)?)))
                .collect::<Result<_>>()?,
        ),
    })
}
