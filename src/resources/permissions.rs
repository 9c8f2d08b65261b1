// This file is part of the terraform-provider-sonarqube project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeSet;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, Schema,
};
use tf_provider::value::{Value, ValueEmpty, ValueList};
use tracing::debug;

use crate::client::{Client, ClientHandle, Error, Query};
use crate::utils::{
    conflicting, exactly_one_of, replace_on_change, OrDiagnostic, StrValue, WithSchema,
};

/// Group permissions that SonarQube reports on every scope
const GLOBAL_ONLY_PERMISSIONS: [&str; 2] = ["applicationcreator", "portfoliocreator"];

/// `sonarqube_permissions`: permissions of a user or a group
///
/// The permissions apply globally, on a project, or on a permission template.
#[derive(Debug, Clone)]
pub struct PermissionsResource {
    client: ClientHandle,
}

impl PermissionsResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PermissionsState {
    pub id: Value<String>,
    pub login_name: Value<String>,
    pub group_name: Value<String>,
    pub project_key: Value<String>,
    pub template_id: Value<String>,
    pub template_name: Value<String>,
    pub permissions: ValueList<Value<String>>,
}

impl WithSchema for PermissionsState {
    fn schema() -> Schema {
        let optional = |description: &str| Attribute {
            attr_type: AttributeType::String,
            description: Description::plain(description),
            constraint: AttributeConstraint::Optional,
            ..Default::default()
        };
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Random id of the permission set"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "login_name" => optional("Login of the user, exclusive with `group_name`"),
                    "group_name" => optional("Name of the group, exclusive with `login_name`"),
                    "project_key" => optional("Key of the project the permissions apply to"),
                    "template_id" => optional("Id of the permission template the permissions apply to"),
                    "template_name" => optional("Name of the permission template the permissions apply to"),
                    "permissions" => Attribute {
                        attr_type: AttributeType::List(AttributeType::String.into()),
                        description: Description::plain("Permissions to grant"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube permissions of a user or a group"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Principal<'s> {
    User(&'s str),
    Group(&'s str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target<'s> {
    Direct(Option<&'s str>),
    TemplateId(&'s str),
    TemplateName(&'s str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Add,
    Remove,
    List,
}

impl PermissionsState {
    fn principal(&self) -> Principal<'_> {
        match self.login_name.non_empty() {
            Some(login) => Principal::User(login),
            None => Principal::Group(self.group_name.or_empty()),
        }
    }

    fn target(&self) -> Target<'_> {
        if let Some(id) = self.template_id.non_empty() {
            Target::TemplateId(id)
        } else if let Some(name) = self.template_name.non_empty() {
            Target::TemplateName(name)
        } else {
            Target::Direct(self.project_key.non_empty())
        }
    }

    fn permission_names(&self) -> impl Iterator<Item = &str> {
        self.permissions
            .iter()
            .flatten()
            .filter_map(|permission| permission.non_empty())
    }
}

/// Endpoint for `action` on the principal kind and target
fn endpoint(principal: Principal, target: Target, action: Action) -> &'static str {
    let template = !matches!(target, Target::Direct(_));
    match (principal, template, action) {
        (Principal::User(_), false, Action::Add) => "api/permissions/add_user",
        (Principal::User(_), true, Action::Add) => "api/permissions/add_user_to_template",
        (Principal::User(_), false, Action::Remove) => "api/permissions/remove_user",
        (Principal::User(_), true, Action::Remove) => "api/permissions/remove_user_from_template",
        (Principal::User(_), false, Action::List) => "api/permissions/users",
        (Principal::User(_), true, Action::List) => "api/permissions/template_users",
        (Principal::Group(_), false, Action::Add) => "api/permissions/add_group",
        (Principal::Group(_), true, Action::Add) => "api/permissions/add_group_to_template",
        (Principal::Group(_), false, Action::Remove) => "api/permissions/remove_group",
        (Principal::Group(_), true, Action::Remove) => {
            "api/permissions/remove_group_from_template"
        }
        (Principal::Group(_), false, Action::List) => "api/permissions/groups",
        (Principal::Group(_), true, Action::List) => "api/permissions/template_groups",
    }
}

fn scope_query(target: Target) -> Query {
    match target {
        Target::Direct(project) => Query::new().with_opt("projectKey", project),
        Target::TemplateId(id) => Query::new().with("templateId", id),
        Target::TemplateName(name) => Query::new().with("templateName", name),
    }
}

fn principal_query(principal: Principal, target: Target) -> Query {
    let query = scope_query(target);
    match principal {
        Principal::User(login) => query.with("login", login),
        Principal::Group(name) => query.with("groupName", name),
    }
}

#[derive(Debug, Deserialize)]
struct PermissionEntry {
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    permissions: Vec<String>,
}

impl PermissionEntry {
    /// Login for users, name for groups
    fn principal(&self) -> &str {
        self.login.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
struct PermissionList {
    #[serde(default)]
    users: Vec<PermissionEntry>,
    #[serde(default)]
    groups: Vec<PermissionEntry>,
}

/// Apply `action` for every permission of the state, stopping at the first failure
async fn apply(client: &Client, state: &PermissionsState, action: Action) -> Result<(), Error> {
    let principal = state.principal();
    let target = state.target();
    let path = endpoint(principal, target, action);
    for permission in state.permission_names() {
        debug!(%path, %permission, ?principal, "Applying permission");
        let query = principal_query(principal, target).with("permission", permission);
        client.post(path, &query, StatusCode::NO_CONTENT).await?;
    }
    Ok(())
}

/// Read the permissions currently granted to the principal
async fn fetch(client: &Client, state: &PermissionsState) -> Result<PermissionsState, Error> {
    let principal = state.principal();
    let target = state.target();
    let list: PermissionList = client
        .get(
            endpoint(principal, target, Action::List),
            &scope_query(target).with("ps", "100"),
        )
        .await?;

    let (name, kind) = match principal {
        Principal::User(login) => (login, "User permissions"),
        Principal::Group(name) => (name, "Group permissions"),
    };
    let entry = list
        .users
        .into_iter()
        .chain(list.groups)
        .find(|entry| entry.principal().eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::not_found(kind, name))?;

    let mut permissions = entry.permissions;
    if let Principal::Group(_) = principal {
        permissions.retain(|permission| !GLOBAL_ONLY_PERMISSIONS.contains(&permission.as_str()));
    }

    // Keep the configured order when the granted set is the same
    let granted = permissions.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let known = state.permission_names().collect::<BTreeSet<_>>();
    let permissions = if granted == known {
        state.permissions.clone()
    } else {
        Value::Value(permissions.into_iter().map(Value::Value).collect())
    };

    Ok(PermissionsState {
        permissions,
        ..state.clone()
    })
}

#[async_trait]
impl Resource for PermissionsResource {
    type State<'a> = PermissionsState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(PermissionsState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        exactly_one_of(
            diags,
            &[
                ("login_name", &config.login_name),
                ("group_name", &config.group_name),
            ],
        );
        conflicting(
            diags,
            &[
                ("project_key", &config.project_key),
                ("template_id", &config.template_id),
                ("template_name", &config.template_name),
            ],
        );
        if let Value::Value(permissions) = &config.permissions {
            if permissions.is_empty() {
                diags.error_short(
                    "At least one permission is required",
                    AttributePath::new("permissions"),
                );
            }
            for (i, permission) in permissions.iter().enumerate() {
                if matches!(permission, Value::Value(p) if p.is_empty()) || permission.is_null() {
                    diags.error_short(
                        "Permission cannot be empty",
                        AttributePath::new("permissions").index(i as i64),
                    );
                }
            }
        }

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let state = fetch(&client, &state)
            .await
            .or_diagnostic(diags, "Failed to read permissions")?;
        Some((state, private_state))
    }

    async fn plan_create<'a>(
        &self,
        _diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = proposed_state;
        state.id = Value::Unknown;
        Some((state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let mut trigger_replace = vec![];
        for (name, prior, proposed) in [
            ("login_name", &prior_state.login_name, &proposed_state.login_name),
            ("group_name", &prior_state.group_name, &proposed_state.group_name),
            ("project_key", &prior_state.project_key, &proposed_state.project_key),
            ("template_id", &prior_state.template_id, &proposed_state.template_id),
            ("template_name", &prior_state.template_name, &proposed_state.template_name),
        ] {
            replace_on_change(&mut trigger_replace, name, prior, proposed);
        }
        replace_on_change(
            &mut trigger_replace,
            "permissions",
            &prior_state.permissions,
            &proposed_state.permissions,
        );

        let mut state = proposed_state;
        state.id = if trigger_replace.is_empty() {
            prior_state.id
        } else {
            Value::Unknown
        };
        Some((state, prior_private_state, trigger_replace))
    }

    async fn plan_destroy<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        apply(&client, &planned_state, Action::Add)
            .await
            .or_diagnostic(diags, "Failed to create permissions")?;

        let mut state = fetch(&client, &planned_state)
            .await
            .or_diagnostic(diags, "Failed to read permissions")?;
        state.id = Value::Value(
            thread_rng()
                .sample_iter(&Alphanumeric)
                .take(30)
                .map(char::from)
                .collect(),
        );
        Some((state, planned_private_state))
    }

    async fn update<'a>(
        &self,
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        // Every attribute forces a replacement
        Some((planned_state, planned_private_state))
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let client = self.client.get(diags).await?;
        apply(&client, &prior_state, Action::Remove)
            .await
            .or_diagnostic(diags, "Failed to delete permissions")
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::{Diagnostics, Resource};
    use tf_provider::value::Value;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{endpoint, Action, PermissionsResource, PermissionsState, Principal, Target};
    use crate::client::testing::handle;

    fn permissions(list: &[&str]) -> Value<Vec<Value<String>>> {
        Value::Value(list.iter().map(|p| Value::Value(p.to_string())).collect())
    }

    #[test]
    fn endpoint_selection() {
        let user = Principal::User("jdoe");
        let group = Principal::Group("devs");
        let direct = Target::Direct(None);
        let template = Target::TemplateName("default");

        assert_eq!(endpoint(user, direct, Action::Add), "api/permissions/add_user");
        assert_eq!(
            endpoint(user, template, Action::Add),
            "api/permissions/add_user_to_template"
        );
        assert_eq!(endpoint(group, direct, Action::Add), "api/permissions/add_group");
        assert_eq!(
            endpoint(group, Target::TemplateId("AU-1"), Action::Remove),
            "api/permissions/remove_group_from_template"
        );
        assert_eq!(
            endpoint(user, Target::Direct(Some("p")), Action::List),
            "api/permissions/users"
        );
        assert_eq!(
            endpoint(group, template, Action::List),
            "api/permissions/template_groups"
        );
    }

    #[tokio::test]
    async fn validation() {
        let server = MockServer::start().await;
        let resource = PermissionsResource::new(handle(&server));

        let mut diags = Diagnostics::default();
        let config = PermissionsState {
            login_name: Value::Value("jdoe".into()),
            group_name: Value::Value("devs".into()),
            project_key: Value::Value("p".into()),
            template_name: Value::Value("t".into()),
            permissions: permissions(&[]),
            ..Default::default()
        };
        assert!(resource.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 3);

        let mut diags = Diagnostics::default();
        let config = PermissionsState {
            group_name: Value::Value("devs".into()),
            project_key: Value::Value("p".into()),
            permissions: permissions(&["admin"]),
            ..Default::default()
        };
        assert!(resource.validate(&mut diags, config).await.is_some());
    }

    #[tokio::test]
    async fn create_group_project_permissions() {
        let server = MockServer::start().await;
        for permission in ["admin", "scan"] {
            Mock::given(method("POST"))
                .and(path("/api/permissions/add_group"))
                .and(query_param("groupName", "devs"))
                .and(query_param("projectKey", "my-project"))
                .and(query_param("permission", permission))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/api/permissions/groups"))
            .and(query_param("projectKey", "my-project"))
            .and(query_param("ps", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"paging":{"pageIndex":1,"pageSize":100,"total":1},
                    "groups":[{"id":"AU-1","name":"Devs","permissions":["scan","admin","applicationcreator"]}]}"#,
            ))
            .mount(&server)
            .await;

        let resource = PermissionsResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let planned = PermissionsState {
            id: Value::Unknown,
            group_name: Value::Value("devs".into()),
            project_key: Value::Value("my-project".into()),
            permissions: permissions(&["admin", "scan"]),
            ..Default::default()
        };
        let (state, _) = resource
            .create(
                &mut diags,
                planned.clone(),
                planned,
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();
        assert!(diags.errors.is_empty(), "{diags:?}");
        assert_eq!(state.permissions, permissions(&["admin", "scan"]));
        assert_eq!(state.group_name, Value::Value("devs".into()));
        match &state.id {
            Value::Value(id) => assert_eq!(id.len(), 30),
            other => panic!("unexpected id {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_template_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/permissions/add_user_to_template"))
            .and(query_param("login", "jdoe"))
            .and(query_param("templateName", "default"))
            .and(query_param_is_missing("projectKey"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/permissions/template_users"))
            .and(query_param("templateName", "default"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"users":[{"login":"jdoe","name":"John","permissions":["codeviewer","user"]}]}"#,
            ))
            .mount(&server)
            .await;

        let resource = PermissionsResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let planned = PermissionsState {
            id: Value::Unknown,
            login_name: Value::Value("jdoe".into()),
            template_name: Value::Value("default".into()),
            permissions: permissions(&["codeviewer"]),
            ..Default::default()
        };
        let (state, _) = resource
            .create(
                &mut diags,
                planned.clone(),
                planned,
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();
        // Drift is reported as returned by the server
        assert_eq!(state.permissions, permissions(&["codeviewer", "user"]));
    }

    #[tokio::test]
    async fn missing_principal_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/permissions/users"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"users":[]}"#))
            .mount(&server)
            .await;

        let resource = PermissionsResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let state = PermissionsState {
            id: Value::Value("x".into()),
            login_name: Value::Value("jdoe".into()),
            permissions: permissions(&["admin"]),
            ..Default::default()
        };
        assert!(resource
            .read(&mut diags, state, Default::default(), Default::default())
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn destroy_removes_each_permission() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/permissions/remove_user"))
            .and(query_param("login", "jdoe"))
            .respond_with(ResponseTemplate::new(204))
            .expect(2)
            .mount(&server)
            .await;

        let resource = PermissionsResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let state = PermissionsState {
            id: Value::Value("x".into()),
            login_name: Value::Value("jdoe".into()),
            permissions: permissions(&["admin", "gateadmin"]),
            ..Default::default()
        };
        assert!(resource
            .destroy(&mut diags, state, Default::default(), Default::default())
            .await
            .is_some());
    }
}
