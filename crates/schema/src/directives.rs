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

//! Interpretation of the six bridge directives. The client schema never sees
//! any of these; they exist purely to drive the RPC projection.

use std::sync::Arc;

use graphql_parser::schema as ast;

use crate::ir::{FieldBinding, ScalarKind};
use crate::{DirectiveArgumentSnafu, Error, Result, SourceSpan, UnknownDirectiveSnafu};

type Directive<'a> = ast::Directive<'a, String>;
type Value<'a> = ast::Value<'a, String>;

/// Parsed field-level bridge directives.
#[derive(Debug, Default)]
pub(crate) struct FieldDirectives {
    pub id: bool,
    pub internal: bool,
    pub load: Option<LoadArgs>,
    pub resolve: Option<ResolveArgs>,
}

/// `@load(with: {parentField: "keyField"})`, normalized so that
/// `request_field` is the loader key and `parent_field` the field it is read
/// from.
#[derive(Debug)]
pub(crate) struct LoadArgs {
    pub with: Vec<FieldBinding>,
}

/// `@resolve(with: {requestField: "parentField"}, batch: false)`.
#[derive(Debug)]
pub(crate) struct ResolveArgs {
    pub with: Option<Vec<FieldBinding>>,
    pub batch: bool,
}

/// One `@loader(key: ..., keys: [...], batch: true)` declaration.
#[derive(Debug)]
pub(crate) struct LoaderArgs {
    pub keys: Option<Vec<String>>,
    pub batch: bool,
    pub span: SourceSpan,
}

pub(crate) fn field_directives(
    file: &Arc<str>,
    directives: &[Directive<'_>],
) -> Result<FieldDirectives> {
    let mut out = FieldDirectives::default();
    for directive in directives {
        let span = SourceSpan::new(file, directive.position);
        match directive.name.as_str() {
            "id" => {
                expect_no_arguments(directive, &span, "id")?;
                out.id = true;
            }
            "internal" => {
                expect_no_arguments(directive, &span, "internal")?;
                out.internal = true;
            }
            "load" => {
                let with = object_argument(directive, &span, "load", "with")?.ok_or_else(|| {
                    argument_error(&span, "load", "a with argument is required")
                })?;
                // @load maps parent fields (left) to loader key fields (right).
                let with = with
                    .into_iter()
                    .map(|(parent_field, request_field)| FieldBinding {
                        request_field,
                        parent_field,
                    })
                    .collect();
                out.load = Some(LoadArgs { with });
            }
            "resolve" => {
                let with = object_argument(directive, &span, "resolve", "with")?.map(|pairs| {
                    pairs
                        .into_iter()
                        .map(|(request_field, parent_field)| FieldBinding {
                            request_field,
                            parent_field,
                        })
                        .collect()
                });
                let batch = bool_argument(directive, &span, "resolve", "batch")?.unwrap_or(false);
                out.resolve = Some(ResolveArgs { with, batch });
            }
            other => {
                return UnknownDirectiveSnafu {
                    span,
                    name: other.to_string(),
                }
                .fail()
            }
        }
    }
    Ok(out)
}

pub(crate) fn loader_directives(
    file: &Arc<str>,
    directives: &[Directive<'_>],
) -> Result<Vec<LoaderArgs>> {
    let mut out = Vec::new();
    for directive in directives {
        let span = SourceSpan::new(file, directive.position);
        match directive.name.as_str() {
            "loader" => {
                let key = string_argument(directive, &span, "loader", "key")?;
                let keys = string_list_argument(directive, &span, "loader", "keys")?;
                if key.is_some() && keys.is_some() {
                    return Err(argument_error(
                        &span,
                        "loader",
                        "key and keys are mutually exclusive",
                    ));
                }
                let batch = bool_argument(directive, &span, "loader", "batch")?.unwrap_or(true);
                let keys = key.map(|k| vec![k]).or(keys);
                out.push(LoaderArgs { keys, batch, span });
            }
            other => {
                return UnknownDirectiveSnafu {
                    span,
                    name: other.to_string(),
                }
                .fail()
            }
        }
    }
    Ok(out)
}

pub(crate) fn scalar_mapping(
    file: &Arc<str>,
    directives: &[Directive<'_>],
) -> Result<Option<ScalarKind>> {
    let mut mapping = None;
    for directive in directives {
        let span = SourceSpan::new(file, directive.position);
        match directive.name.as_str() {
            "mapScalar" => {
                let value = string_argument(directive, &span, "mapScalar", "toProtobuf")?
                    .ok_or_else(|| {
                        argument_error(&span, "mapScalar", "a toProtobuf argument is required")
                    })?;
                let kind = ScalarKind::parse(&value).ok_or_else(|| {
                    argument_error(
                        &span,
                        "mapScalar",
                        &format!("unsupported protobuf kind {value}"),
                    )
                })?;
                mapping = Some(kind);
            }
            other => {
                return UnknownDirectiveSnafu {
                    span,
                    name: other.to_string(),
                }
                .fail()
            }
        }
    }
    Ok(mapping)
}

/// Rejects every bridge directive; used for locations (interfaces, unions,
/// enums, inputs) where none apply.
pub(crate) fn expect_none(file: &Arc<str>, directives: &[Directive<'_>]) -> Result<()> {
    if let Some(directive) = directives.first() {
        let span = SourceSpan::new(file, directive.position);
        return UnknownDirectiveSnafu {
            span,
            name: directive.name.clone(),
        }
        .fail();
    }
    Ok(())
}

fn expect_no_arguments(
    directive: &Directive<'_>,
    span: &SourceSpan,
    name: &'static str,
) -> Result<()> {
    if directive.arguments.is_empty() {
        Ok(())
    } else {
        Err(argument_error(span, name, "takes no arguments"))
    }
}

fn find_argument<'d, 'a>(directive: &'d Directive<'a>, name: &str) -> Option<&'d Value<'a>> {
    directive
        .arguments
        .iter()
        .find(|(arg, _)| arg == name)
        .map(|(_, value)| value)
}

fn string_argument(
    directive: &Directive<'_>,
    span: &SourceSpan,
    directive_name: &'static str,
    name: &str,
) -> Result<Option<String>> {
    match find_argument(directive, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(argument_error(
            span,
            directive_name,
            &format!("{name} must be a string"),
        )),
    }
}

fn bool_argument(
    directive: &Directive<'_>,
    span: &SourceSpan,
    directive_name: &'static str,
    name: &str,
) -> Result<Option<bool>> {
    match find_argument(directive, name) {
        None => Ok(None),
        Some(Value::Boolean(b)) => Ok(Some(*b)),
        Some(_) => Err(argument_error(
            span,
            directive_name,
            &format!("{name} must be a boolean"),
        )),
    }
}

fn string_list_argument(
    directive: &Directive<'_>,
    span: &SourceSpan,
    directive_name: &'static str,
    name: &str,
) -> Result<Option<Vec<String>>> {
    match find_argument(directive, name) {
        None => Ok(None),
        Some(Value::List(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    _ => {
                        return Err(argument_error(
                            span,
                            directive_name,
                            &format!("{name} must be a list of strings"),
                        ))
                    }
                }
            }
            Ok(Some(out))
        }
        Some(_) => Err(argument_error(
            span,
            directive_name,
            &format!("{name} must be a list of strings"),
        )),
    }
}

/// Reads an object-valued argument as ordered `(key, string value)` pairs.
fn object_argument(
    directive: &Directive<'_>,
    span: &SourceSpan,
    directive_name: &'static str,
    name: &str,
) -> Result<Option<Vec<(String, String)>>> {
    match find_argument(directive, name) {
        None => Ok(None),
        Some(Value::Object(map)) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, value) in map {
                match value {
                    Value::String(s) => out.push((key.clone(), s.clone())),
                    _ => {
                        return Err(argument_error(
                            span,
                            directive_name,
                            &format!("{name} values must be field-name strings"),
                        ))
                    }
                }
            }
            Ok(Some(out))
        }
        Some(_) => Err(argument_error(
            span,
            directive_name,
            &format!("{name} must be an object"),
        )),
    }
}

fn argument_error(span: &SourceSpan, directive: &'static str, reason: &str) -> Error {
    DirectiveArgumentSnafu {
        span: span.clone(),
        directive,
        reason: reason.to_string(),
    }
    .build()
}
