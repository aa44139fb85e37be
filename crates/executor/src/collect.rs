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

//! Field collection: groups the selections of a type by response key,
//! expanding fragment spreads and inline fragments and honoring
//! `@skip`/`@include`.

use std::collections::{HashMap, HashSet};

use graphql_parser::query as ast;
use indexmap::IndexMap;
use schema::{Project, TypeDef, TypeKind};

type AstField = ast::Field<'static, String>;
type Directive = ast::Directive<'static, String>;
type FragmentDefinition = ast::FragmentDefinition<'static, String>;
type SelectionSet = ast::SelectionSet<'static, String>;

pub(crate) type Fragments<'a> = HashMap<&'a str, &'a FragmentDefinition>;
pub(crate) type Variables = HashMap<String, serde_json::Value>;

/// Collects the fields selected on `parent_type` across one or more merged
/// selection sets, in selection order keyed by response key.
pub(crate) fn collect_fields<'a>(
    project: &Project,
    parent_type: &TypeDef,
    selection_sets: &[&'a SelectionSet],
    fragments: &Fragments<'a>,
    variables: &Variables,
) -> Result<IndexMap<String, Vec<&'a AstField>>, String> {
    let mut grouped: IndexMap<String, Vec<&'a AstField>> = IndexMap::new();
    let mut visited = HashSet::new();
    for selection_set in selection_sets {
        collect_into(
            project,
            parent_type,
            selection_set,
            fragments,
            variables,
            &mut visited,
            &mut grouped,
        )?;
    }
    Ok(grouped)
}

fn collect_into<'a>(
    project: &Project,
    parent_type: &TypeDef,
    selection_set: &'a SelectionSet,
    fragments: &Fragments<'a>,
    variables: &Variables,
    visited: &mut HashSet<&'a str>,
    grouped: &mut IndexMap<String, Vec<&'a AstField>>,
) -> Result<(), String> {
    for selection in &selection_set.items {
        match selection {
            ast::Selection::Field(field) => {
                if !should_include(&field.directives, variables)? {
                    continue;
                }
                let key = field.alias.as_ref().unwrap_or(&field.name).clone();
                grouped.entry(key).or_default().push(field);
            }
            ast::Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, variables)? {
                    continue;
                }
                let fragment = fragments
                    .get(spread.fragment_name.as_str())
                    .ok_or_else(|| format!("Unknown fragment {}", spread.fragment_name))?;
                if !visited.insert(spread.fragment_name.as_str()) {
                    return Err(format!(
                        "Fragment {} spreads into itself",
                        spread.fragment_name
                    ));
                }
                let ast::TypeCondition::On(condition) = &fragment.type_condition;
                if fragment_applies(project, parent_type, condition) {
                    collect_into(
                        project,
                        parent_type,
                        &fragment.selection_set,
                        fragments,
                        variables,
                        visited,
                        grouped,
                    )?;
                }
                visited.remove(spread.fragment_name.as_str());
            }
            ast::Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, variables)? {
                    continue;
                }
                let applies = match &inline.type_condition {
                    Some(ast::TypeCondition::On(condition)) => {
                        fragment_applies(project, parent_type, condition)
                    }
                    None => true,
                };
                if applies {
                    collect_into(
                        project,
                        parent_type,
                        &inline.selection_set,
                        fragments,
                        variables,
                        visited,
                        grouped,
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// A fragment condition applies when it names the object type itself, an
/// interface it implements, or a union it belongs to.
fn fragment_applies(project: &Project, parent_type: &TypeDef, condition: &str) -> bool {
    if parent_type.name.as_ref() == condition {
        return true;
    }
    if parent_type
        .interfaces
        .iter()
        .any(|i| i.as_ref() == condition)
    {
        return true;
    }
    if let Some(candidate) = project.get(condition) {
        if candidate.kind == TypeKind::Union {
            return candidate
                .members
                .iter()
                .any(|m| m.as_ref() == parent_type.name.as_ref());
        }
    }
    false
}

fn should_include(directives: &[Directive], variables: &Variables) -> Result<bool, String> {
    for directive in directives {
        let invert = match directive.name.as_str() {
            "skip" => true,
            "include" => false,
            _ => continue,
        };
        let condition = directive
            .arguments
            .iter()
            .find(|(name, _)| name == "if")
            .map(|(_, value)| value)
            .ok_or_else(|| format!("@{} requires an `if` argument", directive.name))?;
        let condition = match condition {
            ast::Value::Boolean(b) => *b,
            ast::Value::Variable(name) => match variables.get(name.as_str()) {
                Some(serde_json::Value::Bool(b)) => *b,
                _ => {
                    return Err(format!(
                        "@{} `if` argument must be a boolean, got variable ${name}",
                        directive.name
                    ))
                }
            },
            _ => {
                return Err(format!(
                    "@{} `if` argument must be a boolean",
                    directive.name
                ))
            }
        };
        if condition == invert {
            return Ok(false);
        }
    }
    Ok(true)
}
