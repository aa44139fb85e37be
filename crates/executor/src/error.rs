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

//! Spec-shaped GraphQL errors and response paths.

use serde::{Serialize, Serializer};

/// One step of a response path: a field response key or a list index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PathSegment::Field(name) => serializer.serialize_str(name),
            PathSegment::Index(index) => serializer.serialize_u64(*index as u64),
        }
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

pub type ResponsePath = Vec<PathSegment>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl From<graphql_parser::Pos> for Location {
    fn from(pos: graphql_parser::Pos) -> Self {
        Location {
            line: pos.line,
            column: pos.column,
        }
    }
}

/// A field or request error in the response's `errors` list.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: ResponsePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl GraphqlError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        GraphqlError {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }

    #[must_use]
    pub fn at(mut self, path: ResponsePath) -> Self {
        self.path = path;
        self
    }

    #[must_use]
    pub fn locate(mut self, pos: graphql_parser::Pos) -> Self {
        self.locations.push(pos.into());
        self
    }

    /// Attaches `extensions.code`, e.g. a gRPC status code name.
    #[must_use]
    pub fn with_code(mut self, code: &str) -> Self {
        let extensions = self.extensions.get_or_insert_with(serde_json::Map::new);
        extensions.insert(
            "code".to_string(),
            serde_json::Value::String(code.to_string()),
        );
        self
    }
}

/// The result of executing (or failing to execute) one operation.
#[derive(Debug)]
pub struct ExecutionResult {
    /// `None` when execution never began (request-level failure); `Some`,
    /// possibly `Value::Null`, once execution started.
    pub data: Option<serde_json::Value>,
    pub errors: Vec<GraphqlError>,
}

impl ExecutionResult {
    #[must_use]
    pub fn request_error(error: GraphqlError) -> Self {
        ExecutionResult {
            data: None,
            errors: vec![error],
        }
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        if let Some(data) = &self.data {
            map.serialize_entry("data", data)?;
        }
        if !self.errors.is_empty() {
            map.serialize_entry("errors", &self.errors)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_serialization_shape() {
        let error = GraphqlError::new("boom")
            .at(vec![
                PathSegment::Field("users".to_string()),
                PathSegment::Index(2),
                PathSegment::Field("posts".to_string()),
            ])
            .with_code("UNAVAILABLE");
        let value = serde_json::to_value(&error).expect("serializes");
        assert_eq!(
            value,
            json!({
                "message": "boom",
                "path": ["users", 2, "posts"],
                "extensions": {"code": "UNAVAILABLE"},
            })
        );
    }

    #[test]
    fn test_request_error_has_no_data_key() {
        let result = ExecutionResult::request_error(GraphqlError::new("malformed"));
        let value = serde_json::to_value(&result).expect("serializes");
        assert_eq!(value, json!({"errors": [{"message": "malformed"}]}));
    }

    #[test]
    fn test_partial_data_keeps_both_keys() {
        let result = ExecutionResult {
            data: Some(json!({"users": null})),
            errors: vec![GraphqlError::new("downstream")],
        };
        let value = serde_json::to_value(&result).expect("serializes");
        assert_eq!(value["data"], json!({"users": null}));
        assert_eq!(value["errors"][0]["message"], json!("downstream"));
    }
}
