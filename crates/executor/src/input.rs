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

//! Input coercion: variables against their declared types, then field
//! arguments against the IR's argument definitions.

use std::collections::HashMap;

use graphql_parser::query as ast;
use schema::{FieldDef, Project, TypeDef, TypeKind, TypeRef};
use serde_json::Value as Json;

use crate::collect::Variables;

type AstType<'a> = ast::Type<'a, String>;
type AstValue<'a> = ast::Value<'a, String>;
type VariableDefinition<'a> = ast::VariableDefinition<'a, String>;

/// Coerces the request's variable values against the operation's variable
/// definitions. Errors are request-level.
pub(crate) fn coerce_variable_values(
    project: &Project,
    definitions: &[VariableDefinition<'_>],
    provided: &serde_json::Map<String, Json>,
) -> Result<Variables, String> {
    let mut coerced = HashMap::new();
    for definition in definitions {
        let ty = convert_type(&definition.var_type);
        let name = definition.name.as_str();
        match provided.get(name) {
            Some(value) => {
                let value = coerce_input_value(project, &ty, value.clone())
                    .map_err(|reason| format!("Variable ${name}: {reason}"))?;
                coerced.insert(name.to_string(), value);
            }
            None => {
                if let Some(default) = &definition.default_value {
                    let default = literal_to_json(default, &HashMap::new())
                        .map_err(|reason| format!("Variable ${name} default: {reason}"))?;
                    coerced.insert(name.to_string(), default);
                } else if ty.is_non_null() {
                    return Err(format!(
                        "Variable ${name} of required type {ty} was not provided"
                    ));
                }
            }
        }
    }
    Ok(coerced)
}

/// Coerces the arguments of one field selection. Returns GraphQL-named
/// argument values; errors are field errors.
pub(crate) fn coerce_argument_values(
    project: &Project,
    field_def: &FieldDef,
    field: &ast::Field<'_, String>,
    variables: &Variables,
) -> Result<serde_json::Map<String, Json>, String> {
    for (name, _) in &field.arguments {
        if !field_def.args.iter().any(|a| &a.name == name) {
            return Err(format!(
                "Unknown argument {name} on field {}",
                field_def.name
            ));
        }
    }

    let mut out = serde_json::Map::new();
    for arg_def in &field_def.args {
        let supplied = field
            .arguments
            .iter()
            .find(|(name, _)| name == &arg_def.name)
            .map(|(_, value)| value);
        let resolved = match supplied {
            // A variable that was not provided behaves like an omitted
            // argument.
            Some(AstValue::Variable(var)) if !variables.contains_key(var.as_str()) => None,
            Some(value) => Some(literal_to_json(value, variables)?),
            None => None,
        };
        match resolved {
            Some(value) => {
                let value = coerce_input_value(project, &arg_def.ty, value)
                    .map_err(|reason| format!("Argument {}: {reason}", arg_def.name))?;
                out.insert(arg_def.name.clone(), value);
            }
            None => {
                if let Some(default) = &arg_def.default_value {
                    out.insert(arg_def.name.clone(), default.clone());
                } else if arg_def.ty.is_non_null() {
                    return Err(format!(
                        "Missing required argument {} of type {}",
                        arg_def.name, arg_def.ty
                    ));
                }
            }
        }
    }
    Ok(out)
}

/// Converts a literal (possibly containing variables) to JSON.
pub(crate) fn literal_to_json(
    value: &AstValue<'_>,
    variables: &Variables,
) -> Result<Json, String> {
    Ok(match value {
        AstValue::Variable(name) => variables
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| format!("Variable ${name} is not defined"))?,
        AstValue::Int(n) => {
            let n = n.as_i64().ok_or_else(|| "integer out of range".to_string())?;
            Json::from(n)
        }
        AstValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| "non-finite float".to_string())?,
        AstValue::String(s) => Json::String(s.clone()),
        AstValue::Boolean(b) => Json::Bool(*b),
        AstValue::Null => Json::Null,
        AstValue::Enum(name) => Json::String(name.clone()),
        AstValue::List(items) => Json::Array(
            items
                .iter()
                .map(|item| literal_to_json(item, variables))
                .collect::<Result<_, _>>()?,
        ),
        AstValue::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), literal_to_json(item, variables)?);
            }
            Json::Object(out)
        }
    })
}

/// Validates and coerces a JSON value against a declared input type.
pub(crate) fn coerce_input_value(
    project: &Project,
    ty: &TypeRef,
    value: Json,
) -> Result<Json, String> {
    if value.is_null() {
        if ty.is_non_null() {
            return Err(format!("null is not allowed for type {ty}"));
        }
        return Ok(Json::Null);
    }
    match ty.nullable() {
        TypeRef::List(element) => {
            // A non-list value coerces to a single-element list.
            let items = match value {
                Json::Array(items) => items,
                other => vec![other],
            };
            let items = items
                .into_iter()
                .map(|item| coerce_input_value(project, element, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Json::Array(items))
        }
        TypeRef::Named(name) => coerce_named_input(project, name, value),
        TypeRef::NonNull(_) => unreachable!("nullable() strips the non-null wrapper"),
    }
}

fn coerce_named_input(project: &Project, name: &str, value: Json) -> Result<Json, String> {
    if let Some(def) = project.get(name) {
        return match def.kind {
            TypeKind::Input => coerce_input_object(project, def, value),
            TypeKind::Enum => {
                let Json::String(member) = &value else {
                    return Err(format!("expected an enum value of {name}"));
                };
                if def.values.iter().any(|v| &v.name == member) {
                    Ok(value)
                } else {
                    Err(format!("{member} is not a member of enum {name}"))
                }
            }
            TypeKind::Scalar => coerce_scalar_input(name, project, value),
            _ => Err(format!("{name} is not an input type")),
        };
    }
    coerce_builtin_scalar(name, value)
}

fn coerce_input_object(project: &Project, def: &TypeDef, value: Json) -> Result<Json, String> {
    let Json::Object(provided) = value else {
        return Err(format!("expected an input object of type {}", def.name));
    };
    for key in provided.keys() {
        if def.field(key).is_none() {
            return Err(format!("unknown field {key} on input type {}", def.name));
        }
    }
    let mut out = serde_json::Map::new();
    for field in &def.fields {
        match provided.get(&field.name) {
            Some(value) => {
                let value = coerce_input_value(project, &field.ty, value.clone())
                    .map_err(|reason| format!("field {}: {reason}", field.name))?;
                out.insert(field.name.clone(), value);
            }
            None => {
                if let Some(default) = &field.default_value {
                    out.insert(field.name.clone(), default.clone());
                } else if field.ty.is_non_null() {
                    return Err(format!(
                        "missing required field {} on input type {}",
                        field.name, def.name
                    ));
                }
            }
        }
    }
    Ok(Json::Object(out))
}

fn coerce_scalar_input(name: &str, project: &Project, value: Json) -> Result<Json, String> {
    use schema::ScalarKind;
    let kind = project
        .scalar_kind(name)
        .unwrap_or(schema::ScalarKind::String);
    match kind {
        ScalarKind::String | ScalarKind::Bytes => match value {
            Json::String(_) => Ok(value),
            other => Err(format!("expected a string for scalar {name}, got {other}")),
        },
        ScalarKind::Bool => match value {
            Json::Bool(_) => Ok(value),
            other => Err(format!("expected a boolean for scalar {name}, got {other}")),
        },
        ScalarKind::Int32 | ScalarKind::Int64 | ScalarKind::UInt32 | ScalarKind::UInt64 => {
            match &value {
                Json::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
                other => Err(format!("expected an integer for scalar {name}, got {other}")),
            }
        }
        ScalarKind::Float | ScalarKind::Double => match &value {
            Json::Number(_) => Ok(value),
            other => Err(format!("expected a number for scalar {name}, got {other}")),
        },
    }
}

fn coerce_builtin_scalar(name: &str, value: Json) -> Result<Json, String> {
    match name {
        "Int" => match &value {
            Json::Number(n) if n.is_i64() => Ok(value),
            other => Err(format!("expected an Int, got {other}")),
        },
        "Float" => match &value {
            Json::Number(_) => Ok(value),
            other => Err(format!("expected a Float, got {other}")),
        },
        "String" => match value {
            Json::String(_) => Ok(value),
            other => Err(format!("expected a String, got {other}")),
        },
        "Boolean" => match value {
            Json::Bool(_) => Ok(value),
            other => Err(format!("expected a Boolean, got {other}")),
        },
        "ID" => match value {
            Json::String(_) => Ok(value),
            Json::Number(n) => Ok(Json::String(n.to_string())),
            other => Err(format!("expected an ID, got {other}")),
        },
        other => Err(format!("unknown type {other}")),
    }
}

fn convert_type(ty: &AstType<'_>) -> TypeRef {
    match ty {
        ast::Type::NamedType(name) => TypeRef::Named(std::sync::Arc::from(name.as_str())),
        ast::Type::ListType(inner) => TypeRef::List(Box::new(convert_type(inner))),
        ast::Type::NonNullType(inner) => TypeRef::NonNull(Box::new(convert_type(inner))),
    }
}
