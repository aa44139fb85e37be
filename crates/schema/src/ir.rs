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

//! The compiled, immutable project IR.
//!
//! Everything in here is read-only after [`crate::Project::from_sources`]
//! returns and is shared process-wide behind an `Arc`.

use std::sync::Arc;

use indexmap::IndexMap;

/// Position of a definition inside its schema file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Enum,
    Scalar,
    Input,
}

impl TypeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Object => "object",
            TypeKind::Interface => "interface",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::Scalar => "scalar",
            TypeKind::Input => "input",
        }
    }
}

/// A declared GraphQL type reference with its nullability and list wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(Arc<str>),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    /// The innermost named type, through all list and non-null wrappers.
    #[must_use]
    pub fn unwrapped(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::NonNull(inner) | TypeRef::List(inner) => inner.unwrapped(),
        }
    }

    #[must_use]
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// Strips one outer non-null wrapper, if present.
    #[must_use]
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }

    /// True when, after stripping an outer non-null, this is a list type.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.nullable(), TypeRef::List(_))
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// How a field obtains its value at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Read by name from the parent's source message.
    Source,
    /// Like [`FieldRole::Source`], but hidden from the client schema.
    Internal,
    /// Resolved through a loader declared on the field's target type.
    Load,
    /// Resolved through a dedicated RPC on the declaring service.
    Resolve,
}

/// One entry of a request-composition mapping: the request message field and
/// the parent field its value is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub request_field: String,
    pub parent_field: String,
}

/// The protobuf scalar kind a GraphQL scalar maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Bool,
    Bytes,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
}

impl ScalarKind {
    #[must_use]
    pub fn proto_name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Bool => "bool",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::UInt32 => "uint32",
            ScalarKind::UInt64 => "uint64",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ScalarKind::String),
            "bool" => Some(ScalarKind::Bool),
            "bytes" => Some(ScalarKind::Bytes),
            "int32" => Some(ScalarKind::Int32),
            "int64" => Some(ScalarKind::Int64),
            "uint32" => Some(ScalarKind::UInt32),
            "uint64" => Some(ScalarKind::UInt64),
            "float" => Some(ScalarKind::Float),
            "double" => Some(ScalarKind::Double),
            _ => None,
        }
    }

    /// Default backend mapping for the five built-in GraphQL scalars.
    #[must_use]
    pub fn for_builtin(name: &str) -> Option<Self> {
        match name {
            "ID" | "String" => Some(ScalarKind::String),
            "Int" => Some(ScalarKind::Int64),
            "Float" => Some(ScalarKind::Double),
            "Boolean" => Some(ScalarKind::Bool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub args: Vec<InputValueDef>,
    pub role: FieldRole,
    /// Whether RPCs for this field coalesce into per-depth batches.
    pub batch: bool,
    pub is_id: bool,
    /// Default value, for input object fields only.
    pub default_value: Option<serde_json::Value>,
    /// Request composition for LOAD and RESOLVE fields.
    pub mapping: Vec<FieldBinding>,
    /// For LOAD fields: the sorted key tuple of the matched loader.
    pub loader_keys: Vec<String>,
    /// Fully-qualified service that resolves this field.
    pub service: Arc<str>,
    /// Relative path of the file that declared this field.
    pub file: Arc<str>,
    pub position: SourcePos,
}

impl FieldDef {
    /// Whether the field appears in source messages (and therefore can be
    /// referenced by request mappings and loader keys).
    #[must_use]
    pub fn is_stored(&self) -> bool {
        matches!(self.role, FieldRole::Source | FieldRole::Internal)
    }
}

#[derive(Debug, Clone)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
}

/// A key a type can be loaded by, with the RPC derived for it.
#[derive(Debug, Clone)]
pub struct LoaderDescriptor {
    /// Field names forming the key, sorted alphabetically.
    pub keys: Vec<String>,
    pub batch: bool,
    pub rpc_name: String,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: Arc<str>,
    pub kind: TypeKind,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub loaders: Vec<LoaderDescriptor>,
    pub interfaces: Vec<Arc<str>>,
    pub members: Vec<Arc<str>>,
    pub values: Vec<EnumValueDef>,
    /// For SCALAR types: the backend mapping, after `@mapScalar`.
    pub scalar: Option<ScalarKind>,
    pub file: Arc<str>,
    pub service: Arc<str>,
    pub package: Arc<str>,
    pub position: SourcePos,
}

impl TypeDef {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The loader whose key tuple equals `keys` (both sides sorted).
    #[must_use]
    pub fn loader_for(&self, keys: &[String]) -> Option<&LoaderDescriptor> {
        self.loaders.iter().find(|l| l.keys == keys)
    }
}

/// One schema file and the service it projects to.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path relative to the schema root, forward slashes.
    pub path: Arc<str>,
    /// Proto package, root package plus directory components.
    pub package: Arc<str>,
    /// Service short name, `PascalCase(base name) + "Service"`.
    pub service_name: Arc<str>,
    /// `{package}.{service_name}`.
    pub service: Arc<str>,
    /// Files this file depends on, sorted, excluding itself.
    pub imports: Vec<Arc<str>>,
}

/// The compiled schema project. Immutable after compilation.
#[derive(Debug)]
pub struct Project {
    pub root_package: Arc<str>,
    pub(crate) types: IndexMap<Arc<str>, TypeDef>,
    pub(crate) files: Vec<FileInfo>,
    pub query_type: Arc<str>,
    pub mutation_type: Option<Arc<str>>,
}

impl Project {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    #[must_use]
    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileInfo> {
        self.files.iter().find(|f| f.path.as_ref() == path)
    }

    #[must_use]
    pub fn query(&self) -> &TypeDef {
        self.types
            .get(&self.query_type)
            .unwrap_or_else(|| unreachable!("validated root type is always present"))
    }

    #[must_use]
    pub fn mutation(&self) -> Option<&TypeDef> {
        self.mutation_type.as_ref().and_then(|n| self.types.get(n))
    }

    #[must_use]
    pub fn is_root_type(&self, name: &str) -> bool {
        self.query_type.as_ref() == name
            || self.mutation_type.as_deref().is_some_and(|m| m == name)
    }

    /// Backend scalar kind for a named type, covering built-in scalars that
    /// have no explicit definition.
    #[must_use]
    pub fn scalar_kind(&self, name: &str) -> Option<ScalarKind> {
        if let Some(def) = self.types.get(name) {
            return def.scalar;
        }
        ScalarKind::for_builtin(name)
    }

    /// Whether `name` refers to a scalar, declared or built-in.
    #[must_use]
    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalar_kind(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_unwrapping() {
        let ty = TypeRef::NonNull(Box::new(TypeRef::List(Box::new(TypeRef::NonNull(
            Box::new(TypeRef::Named("User".into())),
        )))));
        assert_eq!(ty.unwrapped(), "User");
        assert!(ty.is_non_null());
        assert!(ty.is_list());
        assert_eq!(ty.to_string(), "[User!]!");
    }

    #[test]
    fn test_builtin_scalar_defaults() {
        assert_eq!(ScalarKind::for_builtin("ID"), Some(ScalarKind::String));
        assert_eq!(ScalarKind::for_builtin("Int"), Some(ScalarKind::Int64));
        assert_eq!(ScalarKind::for_builtin("Float"), Some(ScalarKind::Double));
        assert_eq!(ScalarKind::for_builtin("Boolean"), Some(ScalarKind::Bool));
        assert_eq!(ScalarKind::for_builtin("DateTime"), None);
    }

    #[test]
    fn test_scalar_kind_parse_rejects_unknown() {
        assert_eq!(ScalarKind::parse("string"), Some(ScalarKind::String));
        assert_eq!(ScalarKind::parse("sint64"), None);
    }
}
