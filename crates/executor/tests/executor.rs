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

//! End-to-end executor scenarios against an in-process backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use executor::Executor;
use rpc_client::{CallContext, CallError, Dispatch, StatusCode};
use schema::{Project, SchemaSource};
use serde_json::{json, Value as Json};
use telemetry::EventBus;

fn sample_project() -> Arc<Project> {
    let sources = vec![
        SchemaSource::new(
            "users.graphql",
            r#"
type User @loader @loader(key: "email", batch: false) {
  id: ID! @id
  name: String!
  email: String!
  age: Int
  isActive: Boolean
  createdAt: String
  updatedAt: String
  organizationId: ID @internal
  settings: Settings
  organization: Organization @load(with: {organizationId: "id"})
  profile: Profile @resolve(batch: true)
}

type Settings {
  theme: String
  locale: String
}

type Query {
  users: [User!]
  user(id: ID!): User
  userStrict(id: ID!): User!
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
    ];
    Arc::new(Project::from_sources("demo", sources).expect("sample project compiles"))
}

#[derive(Debug, Clone)]
struct RecordedCall {
    service: String,
    method: String,
    request: Json,
}

/// In-process backend covering the sample services, with per-method failure
/// injection.
#[derive(Default)]
struct MockBackend {
    calls: Mutex<Vec<RecordedCall>>,
    failures: HashMap<String, StatusCode>,
    /// Overrides the stored body of comment c1.
    break_comment_body: bool,
    /// Added before answering any call, to walk past a deadline mid-request.
    delay: Option<std::time::Duration>,
}

impl MockBackend {
    fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn fail(mut self, method: &str, code: StatusCode) -> Self {
        self.failures.insert(method.to_string(), code);
        self
    }

    fn users(&self) -> Vec<Json> {
        vec![
            json!({
                "id": "u1", "name": "Ada", "email": "ada@example.com",
                // int64 fields arrive as strings on the wire
                "age": "29", "is_active": true,
                "created_at": "2024-01-01", "updated_at": "2024-06-01",
                "organization_id": "o1",
                "settings": {"theme": "dark", "locale": "en"},
            }),
            json!({
                "id": "u2", "name": "Grace", "email": "grace@example.com",
                "age": 47, "is_active": false,
                "created_at": "2024-02-01", "updated_at": "2024-06-02",
                "organization_id": "o1",
                "settings": {"theme": "light", "locale": "en"},
            }),
            json!({
                "id": "u3", "name": "Edsger", "email": "edsger@example.com",
                "age": null, "is_active": true,
                "created_at": "2024-03-01", "updated_at": "2024-06-03",
                "organization_id": "o2",
                "settings": {"theme": "dark", "locale": "nl"},
            }),
        ]
    }

    fn organization(&self, id: &str) -> Json {
        match id {
            "o1" => json!({"id": "o1", "name": "Acme"}),
            "o2" => json!({"id": "o2", "name": "Globex"}),
            _ => Json::Null,
        }
    }

    fn posts_for(&self, user_id: &str) -> Json {
        match user_id {
            "u1" => json!([
                {"id": "p1", "title": "Hello", "body": "first", "author_id": "u1"},
                {"id": "p2", "title": "Again", "body": null, "author_id": "u1"},
            ]),
            "u2" => json!([
                {"id": "p3", "title": "Notes", "body": "short", "author_id": "u2"},
            ]),
            _ => json!([]),
        }
    }

    fn comments_for(&self, post_id: &str) -> Json {
        let c1_body = if self.break_comment_body {
            Json::Null
        } else {
            json!("nice")
        };
        match post_id {
            "p1" => json!([
                {"id": "c1", "body": c1_body, "post_id": "p1"},
                {"id": "c2", "body": "agreed", "post_id": "p1"},
            ]),
            "p3" => json!([
                {"id": "c3", "body": "hm", "post_id": "p3"},
            ]),
            _ => json!([]),
        }
    }

    fn profile_for(&self, user_id: &str) -> Json {
        json!({
            "id": format!("pr-{user_id}"),
            "user_id": user_id,
            "bio": format!("bio of {user_id}"),
            "avatar_url": null,
        })
    }

    fn answer(&self, method: &str, request: &Json) -> Result<Json, CallError> {
        let id_of = |req: &Json| {
            req.get("id")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let batches = |req: &Json| -> Vec<Json> {
            req.get("batches")
                .and_then(Json::as_array)
                .cloned()
                .unwrap_or_default()
        };
        Ok(match method {
            "ResolveQueryUsers" => json!({"data": self.users()}),
            "ResolveQueryUser" | "ResolveQueryUserStrict" => {
                let wanted = id_of(request);
                let found = self
                    .users()
                    .into_iter()
                    .find(|u| u["id"] == json!(wanted))
                    .unwrap_or(Json::Null);
                json!({"data": found})
            }
            "ResolveQueryPosts" => json!({"data": ([self.posts_for("u1"), self.posts_for("u2")]
                .iter()
                .flat_map(|p| p.as_array().cloned().unwrap_or_default())
                .collect::<Vec<_>>())}),
            "BatchLoadOrganizationById" => {
                let data: Vec<Json> = batches(request)
                    .iter()
                    .map(|b| json!({"data": self.organization(&id_of(b))}))
                    .collect();
                json!({"batches": data})
            }
            "LoadUserByEmail" => {
                let wanted = request
                    .get("email")
                    .and_then(Json::as_str)
                    .unwrap_or_default();
                let found = self
                    .users()
                    .into_iter()
                    .find(|u| u["email"] == json!(wanted))
                    .unwrap_or(Json::Null);
                json!({"data": found})
            }
            "BatchResolveUserPosts" => {
                let data: Vec<Json> = batches(request)
                    .iter()
                    .map(|b| json!({"data": self.posts_for(&id_of(b))}))
                    .collect();
                json!({"batches": data})
            }
            "BatchResolvePostComments" => {
                let data: Vec<Json> = batches(request)
                    .iter()
                    .map(|b| json!({"data": self.comments_for(&id_of(b))}))
                    .collect();
                json!({"batches": data})
            }
            "BatchResolveUserProfile" => {
                let data: Vec<Json> = batches(request)
                    .iter()
                    .map(|b| json!({"data": self.profile_for(&id_of(b))}))
                    .collect();
                json!({"batches": data})
            }
            other => {
                return Err(CallError::new(
                    StatusCode::Unimplemented,
                    format!("mock backend has no method {other}"),
                ))
            }
        })
    }
}

#[async_trait]
impl Dispatch for MockBackend {
    async fn call(
        &self,
        _ctx: &CallContext,
        service: &str,
        method: &str,
        request: Json,
    ) -> Result<Json, CallError> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            service: service.to_string(),
            method: method.to_string(),
            request: request.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(code) = self.failures.get(method) {
            return Err(CallError::new(*code, format!("{method} is down")));
        }
        self.answer(method, &request)
    }
}

fn harness(backend: MockBackend) -> (Executor, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    let executor = Executor::new(
        sample_project(),
        Arc::clone(&backend) as Arc<dyn Dispatch>,
        EventBus::default(),
    );
    (executor, backend)
}

async fn run(executor: &Executor, query: &str) -> executor::ExecutionResult {
    let ctx = CallContext::new("test-request");
    executor.execute(query, None, None, &ctx).await
}

#[tokio::test]
async fn test_s1_root_query_single_rpc() {
    let (executor, backend) = harness(MockBackend::default());
    let result = run(&executor, "{ users { id name } }").await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data present");
    let users = data["users"].as_array().expect("users is a list");
    assert_eq!(users.len(), 3);
    assert_eq!(users[0], json!({"id": "u1", "name": "Ada"}));
    assert_eq!(users[2]["name"], json!("Edsger"));

    let calls = backend.recorded();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "ResolveQueryUsers");
    assert_eq!(calls[0].service, "demo.UsersService");
}

#[tokio::test]
async fn test_s2_load_batches_distinct_keys() {
    let (executor, backend) = harness(MockBackend::default());
    let result = run(
        &executor,
        "{ users { id author: organization { name } } }",
    )
    .await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data present");
    assert_eq!(data["users"][0]["author"]["name"], json!("Acme"));
    assert_eq!(data["users"][1]["author"]["name"], json!("Acme"));
    assert_eq!(data["users"][2]["author"]["name"], json!("Globex"));

    let calls = backend.recorded();
    assert_eq!(calls.len(), 2, "exactly two RPCs: {calls:?}");
    assert_eq!(calls[0].method, "ResolveQueryUsers");
    assert_eq!(calls[1].method, "BatchLoadOrganizationById");
    assert_eq!(calls[1].service, "demo.OrganizationsService");
    // Three users, two distinct organization ids.
    let batches = calls[1].request["batches"].as_array().expect("batches");
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], json!({"id": "o1"}));
    assert_eq!(batches[1], json!({"id": "o2"}));
}

#[tokio::test]
async fn test_s3_one_batched_rpc_per_depth() {
    let (executor, backend) = harness(MockBackend::default());
    let result = run(&executor, "{ users { posts { comments { id } } } }").await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let calls = backend.recorded();
    let methods: Vec<&str> = calls.iter().map(|c| c.method.as_str()).collect();
    assert_eq!(
        methods,
        vec![
            "ResolveQueryUsers",
            "BatchResolveUserPosts",
            "BatchResolvePostComments",
        ]
    );

    // Plan order equals request-batch order equals response-batch order.
    let post_batches = calls[1].request["batches"].as_array().expect("batches");
    assert_eq!(
        post_batches,
        &vec![json!({"id": "u1"}), json!({"id": "u2"}), json!({"id": "u3"})]
    );
    let comment_batches = calls[2].request["batches"].as_array().expect("batches");
    assert_eq!(
        comment_batches,
        &vec![json!({"id": "p1"}), json!({"id": "p2"}), json!({"id": "p3"})]
    );

    let data = result.data.expect("data present");
    assert_eq!(data["users"][0]["posts"][0]["comments"][0]["id"], json!("c1"));
    assert_eq!(data["users"][2]["posts"], json!([]));
}

#[tokio::test]
async fn test_s4_loader_miss_is_null_without_errors() {
    let (executor, _) = harness(MockBackend::default());
    let result = run(&executor, r#"{ user(id: "missing") { id name } }"#).await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.data.expect("data")["user"], Json::Null);
}

#[tokio::test]
async fn test_s4_non_null_miss_nulls_data_with_path() {
    let (executor, _) = harness(MockBackend::default());
    let result = run(&executor, r#"{ userStrict(id: "missing") { id name } }"#).await;

    assert_eq!(result.data, Some(Json::Null), "data collapses to null");
    assert_eq!(result.errors.len(), 1);
    let path = serde_json::to_value(&result.errors[0].path).expect("path");
    assert_eq!(path, json!(["userStrict"]));
}

#[tokio::test]
async fn test_s6_batch_backend_error_fans_out() {
    let (executor, backend) =
        harness(MockBackend::default().fail("BatchResolveUserPosts", StatusCode::Unavailable));
    let result = run(&executor, "{ users { id posts { id } } }").await;

    let data = result.data.expect("partial data");
    let users = data["users"].as_array().expect("users survive");
    assert_eq!(users.len(), 3);
    for user in users {
        assert_eq!(user["posts"], Json::Null);
    }

    assert_eq!(result.errors.len(), 3, "one error per suspended field");
    for error in &result.errors {
        let extensions = error.extensions.as_ref().expect("extensions");
        assert_eq!(extensions["code"], json!("UNAVAILABLE"));
    }
    let calls = backend.recorded();
    assert_eq!(calls.len(), 2, "the failing bucket is one RPC");
}

#[tokio::test]
async fn test_depth2_non_null_violation_stops_at_nullable_list() {
    let (executor, _) = harness(MockBackend {
        break_comment_body: true,
        ..MockBackend::default()
    });
    let result = run(&executor, "{ users { id posts { id comments { id body } } } }").await;

    let data = result.data.expect("partial data");
    // c1.body is null but Comment.body is String!; the element is non-null,
    // so the error climbs to the nearest nullable position: the comments
    // list itself.
    assert_eq!(data["users"][0]["posts"][0]["comments"], Json::Null);
    // Sibling posts keep their comments.
    assert_eq!(
        data["users"][1]["posts"][0]["comments"][0]["id"],
        json!("c3")
    );
    assert_eq!(result.errors.len(), 1);
    let path = serde_json::to_value(&result.errors[0].path).expect("path");
    assert_eq!(
        path,
        json!(["users", 0, "posts", 0, "comments", 0, "body"])
    );
}

#[tokio::test]
async fn test_aliases_fragments_and_skip() {
    let (executor, _) = harness(MockBackend::default());
    let ctx = CallContext::new("test-request");
    let query = r#"
        query Names($noEmail: Boolean!) {
          everyone: users {
            ...Who
            ... on User { active: isActive }
            email @skip(if: $noEmail)
          }
        }
        fragment Who on User { id name }
    "#;
    let mut variables = serde_json::Map::new();
    variables.insert("noEmail".to_string(), json!(true));
    let result = executor
        .execute(query, Some("Names"), Some(&variables), &ctx)
        .await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data");
    let first = &data["everyone"][0];
    assert_eq!(first["id"], json!("u1"));
    assert_eq!(first["name"], json!("Ada"));
    assert_eq!(first["active"], json!(true));
    assert!(first.get("email").is_none(), "skipped field is absent");
}

#[tokio::test]
async fn test_variables_feed_resolver_arguments() {
    let (executor, backend) = harness(MockBackend::default());
    let ctx = CallContext::new("test-request");
    let mut variables = serde_json::Map::new();
    variables.insert("id".to_string(), json!("u2"));
    let result = executor
        .execute(
            "query One($id: ID!) { user(id: $id) { name age } }",
            None,
            Some(&variables),
            &ctx,
        )
        .await;

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data");
    assert_eq!(data["user"]["name"], json!("Grace"));
    assert_eq!(data["user"]["age"], json!(47));

    let calls = backend.recorded();
    assert_eq!(calls[0].request, json!({"id": "u2"}));
}

#[tokio::test]
async fn test_missing_required_variable_is_a_request_error() {
    let (executor, backend) = harness(MockBackend::default());
    let ctx = CallContext::new("test-request");
    let result = executor
        .execute("query One($id: ID!) { user(id: $id) { name } }", None, None, &ctx)
        .await;

    assert!(result.data.is_none(), "no data key on request errors");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("$id"));
    assert!(backend.recorded().is_empty(), "nothing was dispatched");
}

#[tokio::test]
async fn test_int64_string_coercion() {
    let (executor, _) = harness(MockBackend::default());
    let result = run(&executor, "{ users { age } }").await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data");
    // "29" on the wire coerces to the number 29; a true null stays null.
    assert_eq!(data["users"][0]["age"], json!(29));
    assert_eq!(data["users"][2]["age"], Json::Null);
}

#[tokio::test]
async fn test_typename_resolves_statically() {
    let (executor, backend) = harness(MockBackend::default());
    let result = run(&executor, "{ __typename users { __typename id } }").await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data");
    assert_eq!(data["__typename"], json!("Query"));
    assert_eq!(data["users"][0]["__typename"], json!("User"));
    assert_eq!(backend.recorded().len(), 1, "__typename issues no RPC");
}

#[tokio::test]
async fn test_internal_fields_are_not_queryable() {
    let (executor, _) = harness(MockBackend::default());
    let result = run(&executor, "{ users { id organizationId } }").await;
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("organizationId"));
}

#[tokio::test]
async fn test_multiple_operations_require_a_name() {
    let (executor, _) = harness(MockBackend::default());
    let ctx = CallContext::new("test-request");
    let result = executor
        .execute("query A { users { id } } query B { users { name } }", None, None, &ctx)
        .await;
    assert!(result.data.is_none());
    assert!(result.errors[0].message.contains("operationName"));

    let named = executor
        .execute(
            "query A { users { id } } query B { users { name } }",
            Some("B"),
            None,
            &ctx,
        )
        .await;
    assert!(named.errors.is_empty());
    assert_eq!(named.data.expect("data")["users"][0], json!({"name": "Ada"}));
}

#[tokio::test]
async fn test_mutation_without_mutation_type_is_rejected() {
    let (executor, _) = harness(MockBackend::default());
    let ctx = CallContext::new("test-request");
    let result = executor
        .execute("mutation { createUser { id } }", None, None, &ctx)
        .await;
    assert!(result.data.is_none());
    assert!(result.errors[0].message.contains("mutation"));
}

#[tokio::test]
async fn test_expired_deadline_cancels_pending_buckets() {
    let (executor, backend) = harness(MockBackend::default());
    let ctx = CallContext::new("test-request")
        .with_deadline(std::time::Instant::now() - std::time::Duration::from_secs(1));
    let result = executor.execute("{ users { id } }", None, None, &ctx).await;

    assert!(backend.recorded().is_empty(), "no RPC after the deadline");
    assert_eq!(result.errors.len(), 1);
    let extensions = result.errors[0].extensions.as_ref().expect("extensions");
    assert_eq!(extensions["code"], json!("CANCELLED"));
}

#[tokio::test]
async fn test_cancellation_covers_sync_children_between_depths() {
    // The deadline passes while the depth-1 RPC is in flight. At depth 2 the
    // synchronous `settings` objects complete and enqueue their `theme`
    // children before the expiry check, while `organization` lands in a
    // bucket; both kinds of outstanding work must surface cancellation
    // errors.
    let (executor, backend) = harness(MockBackend {
        delay: Some(std::time::Duration::from_millis(80)),
        ..MockBackend::default()
    });
    let ctx = CallContext::new("test-request")
        .with_timeout(std::time::Duration::from_millis(30));
    let result = executor
        .execute(
            "{ users { settings { theme } organization { name } } }",
            None,
            None,
            &ctx,
        )
        .await;

    let calls = backend.recorded();
    assert_eq!(calls.len(), 1, "only the depth-1 RPC was dispatched");
    assert_eq!(calls[0].method, "ResolveQueryUsers");

    let data = result.data.expect("partial data");
    let users = data["users"].as_array().expect("users survive");
    assert_eq!(users.len(), 3);
    for user in users {
        assert_eq!(user["settings"], json!({"theme": null}));
        assert_eq!(user["organization"], Json::Null);
    }

    // One error per discarded organization plan plus one per discarded
    // theme plan.
    assert_eq!(result.errors.len(), 6, "{:?}", result.errors);
    for error in &result.errors {
        let extensions = error.extensions.as_ref().expect("extensions");
        assert_eq!(extensions["code"], json!("CANCELLED"));
    }
    let paths: Vec<serde_json::Value> = result
        .errors
        .iter()
        .map(|e| serde_json::to_value(&e.path).expect("path"))
        .collect();
    assert!(paths.contains(&json!(["users", 0, "organization"])));
    assert!(paths.contains(&json!(["users", 0, "settings", "theme"])));
}

#[tokio::test]
async fn test_field_order_follows_the_query() {
    let (executor, _) = harness(MockBackend::default());
    let result = run(
        &executor,
        "{ users { organization { name } id name } }",
    )
    .await;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    let data = result.data.expect("data");
    let keys: Vec<&String> = data["users"][0]
        .as_object()
        .expect("user object")
        .keys()
        .collect();
    assert_eq!(keys, ["organization", "id", "name"]);
}
