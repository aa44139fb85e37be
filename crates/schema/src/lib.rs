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

//! Loads a directory of directive-annotated GraphQL schema files and compiles
//! them into the immutable project IR shared by the projector and the
//! executor.
//!
//! Each schema file is one backing service; `extend type` blocks let a file
//! attach fields to types owned by another file. The file-reference graph is
//! required to be acyclic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::prelude::*;

pub mod ir;
pub mod naming;

mod directives;
mod loader;
mod validate;

pub use ir::{
    EnumValueDef, FieldBinding, FieldDef, FieldRole, FileInfo, InputValueDef, LoaderDescriptor,
    Project, ScalarKind, SourcePos, TypeDef, TypeKind, TypeRef,
};

/// Points a compilation error at a schema file location.
#[derive(Debug, Clone)]
pub struct SourceSpan {
    pub file: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl SourceSpan {
    pub(crate) fn new(file: &Arc<str>, pos: graphql_parser::Pos) -> Self {
        SourceSpan {
            file: Arc::clone(file),
            line: pos.line,
            column: pos.column,
        }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read schema directory {}: {source}", path.display()))]
    ReadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to read schema file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("No schema files found under {}", root.display()))]
    NoSchemaFiles { root: PathBuf },

    #[snafu(display("{file}: {source}"))]
    Parse {
        file: Arc<str>,
        source: graphql_parser::schema::ParseError,
    },

    #[snafu(display("{span}: Type {name} is already defined in {other_file}"))]
    DuplicateType {
        span: SourceSpan,
        name: String,
        other_file: Arc<str>,
    },

    #[snafu(display("{span}: Cannot extend unknown type {name}"))]
    ExtendUnknownType { span: SourceSpan, name: String },

    #[snafu(display("{span}: Extension of {name} does not match its {kind} definition"))]
    ExtendKindMismatch {
        span: SourceSpan,
        name: String,
        kind: &'static str,
    },

    #[snafu(display("{span}: Unknown type {name}"))]
    UnknownType { span: SourceSpan, name: String },

    #[snafu(display("{span}: Unknown directive @{name}"))]
    UnknownDirective { span: SourceSpan, name: String },

    #[snafu(display("{span}: Invalid @{directive} directive: {reason}"))]
    DirectiveArgument {
        span: SourceSpan,
        directive: &'static str,
        reason: String,
    },

    #[snafu(display("{span}: Field {field} cannot be both @load and @resolve"))]
    DirectiveConflict { span: SourceSpan, field: String },

    #[snafu(display("{span}: @load field {field} must not declare arguments"))]
    LoadFieldHasArguments { span: SourceSpan, field: String },

    #[snafu(display("{span}: @load field {field} targets {target}, which is not an object type"))]
    LoadTargetNotObject {
        span: SourceSpan,
        field: String,
        target: String,
    },

    #[snafu(display(
        "{span}: {target} declares no loader with key tuple ({keys}) required by field {field}",
        keys = keys.join(", ")
    ))]
    NoMatchingLoader {
        span: SourceSpan,
        field: String,
        target: String,
        keys: Vec<String>,
    },

    #[snafu(display(
        "{span}: Mapping for field {field} references {parent_field}, which is not a stored field of {parent}"
    ))]
    MappingParentField {
        span: SourceSpan,
        field: String,
        parent_field: String,
        parent: String,
    },

    #[snafu(display("{span}: @loader key {key} is not a stored field of {type_name}"))]
    LoaderKeyInvalid {
        span: SourceSpan,
        type_name: String,
        key: String,
    },

    #[snafu(display(
        "{span}: Cannot derive a default loader key for {type_name}: mark fields with @id or declare an id field"
    ))]
    DefaultKeyDerivation {
        span: SourceSpan,
        type_name: String,
    },

    #[snafu(display(
        "{span}: Duplicate loader key tuple ({keys}) on {type_name}",
        keys = keys.join(", ")
    ))]
    DuplicateLoader {
        span: SourceSpan,
        type_name: String,
        keys: Vec<String>,
    },

    #[snafu(display("{span}: Duplicate field {field} on type {type_name}"))]
    DuplicateField {
        span: SourceSpan,
        type_name: String,
        field: String,
    },

    #[snafu(display(
        "{span}: Fields {first} and {second} of {type_name} map to the same proto field name {proto_name}"
    ))]
    FieldNameCollision {
        span: SourceSpan,
        type_name: String,
        first: String,
        second: String,
        proto_name: String,
    },

    #[snafu(display(
        "{span}: Field {field} of {type_name} has abstract type {target}; interface and union values have no backend message representation"
    ))]
    AbstractFieldType {
        span: SourceSpan,
        type_name: String,
        field: String,
        target: String,
    },

    #[snafu(display("{span}: Input field {field} may not reference {target} ({kind} type)"))]
    InvalidInputFieldType {
        span: SourceSpan,
        field: String,
        target: String,
        kind: &'static str,
    },

    #[snafu(display("{span}: Argument {arg} may not reference {target} ({kind} type)"))]
    InvalidArgumentType {
        span: SourceSpan,
        arg: String,
        target: String,
        kind: &'static str,
    },

    #[snafu(display("{span}: Duplicate enum value {value} on {type_name}"))]
    DuplicateEnumValue {
        span: SourceSpan,
        type_name: String,
        value: String,
    },

    #[snafu(display("{span}: Invalid default value: {reason}"))]
    InvalidDefaultValue { span: SourceSpan, reason: String },

    #[snafu(display("{span}: Batch resolvers are not supported on root type {type_name}"))]
    BatchOnRootType {
        span: SourceSpan,
        type_name: String,
    },

    #[snafu(display("{span}: Subscriptions are not supported"))]
    SubscriptionUnsupported { span: SourceSpan },

    #[snafu(display("{span}: Type {type_name} has no client-visible fields"))]
    NoVisibleFields {
        span: SourceSpan,
        type_name: String,
    },

    #[snafu(display("The schema project defines no Query type"))]
    MissingQueryType,

    #[snafu(display("Root type {type_name} has no fields after stitching"))]
    EmptyRootType { type_name: String },

    #[snafu(display(
        "Schema files form a dependency cycle: {cycle}. Break the cycle by moving a type or an extension",
        cycle = cycle.join(" -> ")
    ))]
    FileCycle { cycle: Vec<String> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// One schema file: its root-relative path and its contents.
#[derive(Debug, Clone)]
pub struct SchemaSource {
    pub path: Arc<str>,
    pub text: String,
}

impl SchemaSource {
    #[must_use]
    pub fn new(path: impl Into<Arc<str>>, text: impl Into<String>) -> Self {
        SchemaSource {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Reads every `.graphql`/`.gql` file under `root` and compiles the project.
pub fn compile(root: &Path, root_package: &str) -> Result<Project> {
    let mut sources = Vec::new();
    collect_sources(root, root, &mut sources)?;
    ensure!(
        !sources.is_empty(),
        NoSchemaFilesSnafu {
            root: root.to_path_buf()
        }
    );
    tracing::debug!(
        "Compiling {} schema files under {}",
        sources.len(),
        root.display()
    );
    Project::from_sources(root_package, sources)
}

impl Project {
    /// Compiles a set of in-memory schema sources into the project IR.
    pub fn from_sources(root_package: &str, sources: Vec<SchemaSource>) -> Result<Project> {
        loader::build(root_package, sources)
    }
}

fn collect_sources(root: &Path, dir: &Path, out: &mut Vec<SchemaSource>) -> Result<()> {
    let entries = std::fs::read_dir(dir).context(ReadDirectorySnafu {
        path: dir.to_path_buf(),
    })?;
    for entry in entries {
        let entry = entry.context(ReadDirectorySnafu {
            path: dir.to_path_buf(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_sources(root, &path, out)?;
            continue;
        }
        let is_schema = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "graphql" || e == "gql");
        if !is_schema {
            continue;
        }
        let text = std::fs::read_to_string(&path).context(ReadFileSnafu { path: path.clone() })?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        out.push(SchemaSource::new(relative, text));
    }
    Ok(())
}
