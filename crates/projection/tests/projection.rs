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

use std::collections::BTreeSet;

use projection::numbering::{MAX_FIELD_NUMBER, RESERVED_RANGE};
use projection::{proto, sdl, Catalog};
use schema::{Project, SchemaSource};

fn sample_sources() -> Vec<SchemaSource> {
    vec![
        SchemaSource::new(
            "users.graphql",
            r#"
"""The account directory."""
type User @loader @loader(key: "email", batch: false) {
  id: ID! @id
  name: String!
  email: String!
  age: Int
  isActive: Boolean
  createdAt: String
  updatedAt: String
  organizationId: ID @internal
  organization: Organization @load(with: {organizationId: "id"})
  profile: Profile @resolve(batch: true)
}

type Query {
  users: [User!]
  user(id: ID!): User
}
"#,
        ),
        SchemaSource::new(
            "posts.graphql",
            r#"
type Post @loader {
  id: ID! @id
  title: String!
  body: String
  authorId: ID! @internal
  author: User @load(with: {authorId: "id"})
}

extend type User {
  posts: [Post!] @resolve(batch: true)
}

extend type Query {
  posts: [Post!] @resolve
}
"#,
        ),
        SchemaSource::new(
            "comments.graphql",
            r#"
type Comment @loader {
  id: ID! @id
  body: String!
  postId: ID! @internal
}

extend type Post {
  comments: [Comment!] @resolve(batch: true)
}
"#,
        ),
        SchemaSource::new(
            "organizations.graphql",
            r#"
type Organization @loader {
  id: ID! @id
  name: String!
}
"#,
        ),
        SchemaSource::new(
            "profiles.graphql",
            r#"
type Profile @loader(keys: ["userId"]) {
  id: ID! @id
  userId: ID! @internal
  bio: String
  avatarUrl: String
}
"#,
        ),
    ]
}

fn compile_catalog() -> (Project, Catalog) {
    let project = Project::from_sources("demo", sample_sources()).expect("sample compiles");
    let catalog = Catalog::project(&project).expect("catalog projects");
    (project, catalog)
}

#[test]
fn test_field_numbers_distinct_and_outside_reserved_window() {
    let (_, catalog) = compile_catalog();
    for file in &catalog.files {
        for message in &file.messages {
            let mut seen = BTreeSet::new();
            for field in &message.fields {
                assert!(
                    (1..=MAX_FIELD_NUMBER).contains(&field.number),
                    "{}.{} = {} out of range",
                    message.name,
                    field.name,
                    field.number
                );
                assert!(
                    !RESERVED_RANGE.contains(&field.number),
                    "{}.{} = {} in the reserved window",
                    message.name,
                    field.name,
                    field.number
                );
                assert!(
                    seen.insert(field.number),
                    "{}.{} reuses number {}",
                    message.name,
                    field.name,
                    field.number
                );
            }
        }
    }
}

#[test]
fn test_user_source_numbering_is_deterministic() {
    let (_, first) = compile_catalog();
    let (_, second) = compile_catalog();

    let numbers = |catalog: &Catalog| -> Vec<(String, i32)> {
        let file = catalog.file("users.graphql").expect("users proto");
        let message = file
            .messages
            .iter()
            .find(|m| m.name == "UserSource")
            .expect("UserSource message");
        message
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.number))
            .collect()
    };

    let first_numbers = numbers(&first);
    assert_eq!(first_numbers, numbers(&second));
    assert_eq!(first_numbers.len(), 8);
    let names: Vec<&str> = first_numbers.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "id",
            "name",
            "email",
            "age",
            "is_active",
            "created_at",
            "updated_at",
            "organization_id",
        ]
    );
}

#[test]
fn test_rendered_proto_is_idempotent() {
    let (_, first) = compile_catalog();
    let (_, second) = compile_catalog();
    for (a, b) in first.files.iter().zip(second.files.iter()) {
        assert_eq!(proto::render_file(a), proto::render_file(b));
    }
}

#[test]
fn test_expected_rpc_surface() {
    let (_, catalog) = compile_catalog();

    let methods = |path: &str| -> Vec<String> {
        catalog
            .file(path)
            .unwrap_or_else(|| panic!("{path} missing"))
            .service
            .methods
            .iter()
            .map(|m| m.name.clone())
            .collect()
    };

    assert_eq!(
        methods("users.graphql"),
        vec![
            "BatchLoadUserById",
            "BatchResolveUserProfile",
            "LoadUserByEmail",
            "ResolveQueryUser",
            "ResolveQueryUsers",
        ]
    );
    assert_eq!(
        methods("posts.graphql"),
        vec!["BatchLoadPostById", "BatchResolveUserPosts", "ResolveQueryPosts"]
    );
    assert_eq!(
        methods("comments.graphql"),
        vec!["BatchLoadCommentById", "BatchResolvePostComments"]
    );
    assert_eq!(methods("organizations.graphql"), vec!["BatchLoadOrganizationById"]);
    assert_eq!(methods("profiles.graphql"), vec!["BatchLoadProfileByUserId"]);
}

#[test]
fn test_envelope_messages_number_sequentially() {
    let (_, catalog) = compile_catalog();
    let users = catalog.file("users.graphql").expect("users proto");

    let batch_request = users
        .messages
        .iter()
        .find(|m| m.name == "BatchLoadUserByIdRequest")
        .expect("batch request envelope");
    assert_eq!(batch_request.fields.len(), 1);
    assert_eq!(batch_request.fields[0].name, "batches");
    assert_eq!(batch_request.fields[0].number, 1);
    assert!(batch_request.fields[0].repeated);

    let response = users
        .messages
        .iter()
        .find(|m| m.name == "LoadUserByIdResponse")
        .expect("loader response");
    assert_eq!(response.fields.len(), 1);
    assert_eq!(response.fields[0].name, "data");
    assert_eq!(response.fields[0].number, 1);
    assert!(!response.fields[0].repeated);
}

#[test]
fn test_proto_imports_follow_schema_imports() {
    let (_, catalog) = compile_catalog();
    let users = catalog.file("users.graphql").expect("users proto");
    assert_eq!(
        users.imports,
        vec!["organizations.proto".to_string(), "profiles.proto".to_string()]
    );
    let rendered = proto::render_file(users);
    assert!(rendered.contains("import \"organizations.proto\";"));
    assert!(rendered.contains("package demo;"));
    assert!(rendered.contains("service UsersService {"));
}

#[test]
fn test_descriptor_pool_builds_and_resolves() {
    let (_, catalog) = compile_catalog();
    let pool = projection::descriptor::build_pool(&catalog).expect("pool builds");

    let service = pool
        .get_service_by_name("demo.UsersService")
        .expect("users service registered");
    let method = service
        .methods()
        .find(|m| m.name() == "BatchLoadUserById")
        .expect("batch loader method");
    assert_eq!(method.input().name(), "BatchLoadUserByIdRequest");
    assert_eq!(method.output().name(), "BatchLoadUserByIdResponse");

    let source = pool
        .get_message_by_name("demo.UserSource")
        .expect("UserSource registered");
    let field = source
        .get_field_by_name("organization_id")
        .expect("internal field retained in source message");
    assert!(field.number() > 0);
}

#[test]
fn test_client_schema_strips_bridge_surface() {
    let (project, _) = compile_catalog();
    let rendered = sdl::render_client_schema(&project);

    assert!(!rendered.contains('@'), "directives must be stripped");
    assert!(
        !rendered.contains("organizationId"),
        "internal fields must be hidden"
    );
    assert!(rendered.contains("The account directory."));

    let parsed =
        graphql_parser::parse_schema::<String>(&rendered).expect("rendered SDL reparses");
    drop(parsed);
}

#[test]
fn test_client_schema_round_trip_preserves_visible_shape() {
    let (project, _) = compile_catalog();
    let rendered = sdl::render_client_schema(&project);
    let parsed = graphql_parser::parse_schema::<String>(&rendered).expect("parses");

    let mut parsed_fields: BTreeSet<String> = BTreeSet::new();
    for def in &parsed.definitions {
        if let graphql_parser::schema::Definition::TypeDefinition(
            graphql_parser::schema::TypeDefinition::Object(obj),
        ) = def
        {
            for field in &obj.fields {
                parsed_fields.insert(format!("{}.{}", obj.name, field.name));
            }
        }
    }

    let mut expected: BTreeSet<String> = BTreeSet::new();
    for def in project.types() {
        if def.kind == schema::TypeKind::Object {
            for field in def
                .fields
                .iter()
                .filter(|f| f.role != schema::FieldRole::Internal)
            {
                expected.insert(format!("{}.{}", def.name, field.name));
            }
        }
    }
    assert_eq!(parsed_fields, expected);
}
