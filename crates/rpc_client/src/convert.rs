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

//! JSON boundary of the transport. The executor works entirely in
//! `serde_json::Value` space with snake_case proto field names; messages are
//! materialized against descriptors only here.

use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor, SerializeOptions};
use snafu::prelude::*;

use crate::{DecodeResponseSnafu, EncodeRequestSnafu, Result};

/// Builds a request message from its JSON form. Field names may be either
/// the proto names (snake_case) or the proto3 JSON names.
pub fn json_to_message(
    descriptor: MessageDescriptor,
    value: &serde_json::Value,
) -> Result<DynamicMessage> {
    let options = DeserializeOptions::new().deny_unknown_fields(true);
    DynamicMessage::deserialize_with_options(descriptor, value.clone(), &options)
        .context(EncodeRequestSnafu)
}

/// Renders a response message as JSON with proto field names, keeping unset
/// presence fields as explicit nulls so the executor can observe loader
/// misses.
pub fn message_to_json(message: &DynamicMessage) -> Result<serde_json::Value> {
    let options = SerializeOptions::new()
        .use_proto_field_name(true)
        .skip_default_fields(false);
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::new(&mut buf);
    message
        .serialize_with_options(&mut serializer, &options)
        .context(DecodeResponseSnafu)?;
    serde_json::from_slice(&buf).context(DecodeResponseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_reflect::DescriptorPool;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
    use serde_json::json;

    fn test_pool() -> DescriptorPool {
        let file = FileDescriptorProto {
            name: Some("test.proto".to_string()),
            package: Some("test".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("LoadUserByIdRequest".to_string()),
                field: vec![
                    FieldDescriptorProto {
                        name: Some("id".to_string()),
                        number: Some(1),
                        label: Some(Label::Optional as i32),
                        r#type: Some(Type::String as i32),
                        ..Default::default()
                    },
                    FieldDescriptorProto {
                        name: Some("age".to_string()),
                        number: Some(2),
                        label: Some(Label::Optional as i32),
                        r#type: Some(Type::Int64 as i32),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            syntax: Some("proto3".to_string()),
            ..Default::default()
        };
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_protos(vec![file])
            .expect("test descriptor registers");
        pool
    }

    #[test]
    fn test_round_trips_snake_case_fields() {
        let descriptor = test_pool()
            .get_message_by_name("test.LoadUserByIdRequest")
            .expect("message registered");

        let message =
            json_to_message(descriptor, &json!({"id": "u1", "age": 42})).expect("builds");
        let back = message_to_json(&message).expect("renders");

        assert_eq!(back["id"], json!("u1"));
        // proto3 JSON renders 64-bit integers as strings.
        assert_eq!(back["age"], json!("42"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let descriptor = test_pool()
            .get_message_by_name("test.LoadUserByIdRequest")
            .expect("message registered");
        let err = json_to_message(descriptor, &json!({"ghost": 1})).expect_err("unknown field");
        assert!(matches!(err, crate::Error::EncodeRequest { .. }));
    }
}
