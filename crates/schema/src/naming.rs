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

//! Deterministic naming shared by the compiler, the projector, and the
//! executor. RPC and service names derived here are part of the backend
//! contract and must never depend on iteration order.

use heck::{ToSnakeCase, ToUpperCamelCase};

/// Uppercases the first character, preserving the rest of the name verbatim.
/// `organizationId` becomes `OrganizationId`, not `Organizationid`.
#[must_use]
pub fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// `Load{Type}By{Keys}` or `BatchLoad{Type}By{Keys}`; `keys` must already be
/// sorted alphabetically.
#[must_use]
pub fn loader_rpc_name(type_name: &str, keys: &[String], batch: bool) -> String {
    let mut name = String::new();
    if batch {
        name.push_str("Batch");
    }
    name.push_str("Load");
    name.push_str(type_name);
    name.push_str("By");
    for key in keys {
        name.push_str(&upper_first(key));
    }
    name
}

/// `Resolve{Type}{Field}` or `BatchResolve{Type}{Field}`.
#[must_use]
pub fn resolver_rpc_name(type_name: &str, field_name: &str, batch: bool) -> String {
    let prefix = if batch { "BatchResolve" } else { "Resolve" };
    format!("{prefix}{type_name}{}", upper_first(field_name))
}

/// Proto message field name for a GraphQL field.
#[must_use]
pub fn proto_field_name(graphql_name: &str) -> String {
    graphql_name.to_snake_case()
}

/// The generated zero value of a projected enum, e.g. `ROLE_UNSPECIFIED`.
/// On the wire it stands for "unset".
#[must_use]
pub fn enum_unspecified_value(enum_name: &str) -> String {
    use heck::ToShoutySnakeCase;
    format!("{}_UNSPECIFIED", enum_name.to_shouty_snake_case())
}

/// Splits a root-relative schema file path into the proto package and the
/// service short name. Directory separators become package dots; the base
/// name becomes `PascalCase + "Service"`.
#[must_use]
pub fn service_parts(relative_path: &str, root_package: &str) -> (String, String) {
    let normalized = relative_path.replace('\\', "/");
    let (dir, base) = match normalized.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, normalized.as_str()),
    };
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);

    let mut package = root_package.to_string();
    if let Some(dir) = dir {
        for component in dir.split('/').filter(|c| !c.is_empty()) {
            package.push('.');
            package.push_str(&component.to_snake_case());
        }
    }

    let service_name = format!("{}Service", stem.to_upper_camel_case());
    (package, service_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_first_preserves_camel_case() {
        assert_eq!(upper_first("organizationId"), "OrganizationId");
        assert_eq!(upper_first("id"), "Id");
        assert_eq!(upper_first(""), "");
    }

    #[test]
    fn test_loader_rpc_names() {
        assert_eq!(
            loader_rpc_name("User", &["id".to_string()], false),
            "LoadUserById"
        );
        assert_eq!(
            loader_rpc_name(
                "Profile",
                &["organizationId".to_string(), "userId".to_string()],
                true
            ),
            "BatchLoadProfileByOrganizationIdUserId"
        );
    }

    #[test]
    fn test_resolver_rpc_names() {
        assert_eq!(resolver_rpc_name("Query", "users", false), "ResolveQueryUsers");
        assert_eq!(resolver_rpc_name("User", "posts", true), "BatchResolveUserPosts");
    }

    #[test]
    fn test_service_parts() {
        assert_eq!(
            service_parts("users.graphql", "demo"),
            ("demo".to_string(), "UsersService".to_string())
        );
        assert_eq!(
            service_parts("social/posts.graphql", "demo"),
            ("demo.social".to_string(), "PostsService".to_string())
        );
        assert_eq!(
            service_parts("user_accounts.graphql", "demo"),
            ("demo".to_string(), "UserAccountsService".to_string())
        );
    }

    #[test]
    fn test_proto_field_names() {
        assert_eq!(proto_field_name("organizationId"), "organization_id");
        assert_eq!(proto_field_name("isActive"), "is_active");
        assert_eq!(proto_field_name("id"), "id");
    }
}
