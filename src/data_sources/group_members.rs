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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, DataSource, Diagnostics};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, Schema,
};
use tf_provider::value::{Value, ValueEmpty, ValueList};
use tracing::debug;

use crate::client::{Client, ClientHandle, Error, Query};
use crate::utils::{OrDiagnostic, StrValue, WithSchema};

/// `sonarqube_group_members`: members of a group, optionally filtered by login
#[derive(Debug, Clone)]
pub struct GroupMembersDataSource {
    client: ClientHandle,
}

impl GroupMembersDataSource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupMembersState {
    pub id: Value<String>,
    pub group: Value<String>,
    pub login_name: Value<String>,
    pub members: ValueList<Value<GroupMember>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupMember {
    pub login_name: Value<String>,
    pub name: Value<String>,
}

impl WithSchema for GroupMembersState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("`group/login_name`"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "group" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Name of the group"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "login_name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Limit the search to a specific user"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                    "members" => Attribute {
                        attr_type: AttributeType::AttributeList(map! {
                            "login_name" => Attribute {
                                attr_type: AttributeType::String,
                                description: Description::plain("Login of the user"),
                                constraint: AttributeConstraint::Computed,
                                ..Default::default()
                            },
                            "name" => Attribute {
                                attr_type: AttributeType::String,
                                description: Description::plain("Name of the user"),
                                constraint: AttributeConstraint::Computed,
                                ..Default::default()
                            },
                        }),
                        description: Description::plain("Members of the group"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                },
                description: Description::plain("Members of a SonarQube group"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Members {
    users: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
    #[serde(default)]
    name: String,
}

async fn fetch(client: &Client, group: &str, login: Option<&str>) -> Result<Vec<Member>, Error> {
    let members: Members = client
        .get(
            "api/user_groups/users",
            &Query::new()
                .with("name", group)
                .with("ps", "500")
                .with_opt("q", login),
        )
        .await?;
    Ok(members.users)
}

#[async_trait]
impl DataSource for GroupMembersDataSource {
    type State<'a> = GroupMembersState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(GroupMembersState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if matches!(&config.group, Value::Value(group) if group.is_empty()) {
            diags.error_short("`group` must not be empty", AttributePath::new("group"));
            return None;
        }
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let client = self.client.get(diags).await?;
        let group = config.group.or_empty();
        let login = config.login_name.non_empty();
        let members = fetch(&client, group, login)
            .await
            .or_diagnostic(diags, "Failed to read group members")?;
        debug!(%group, count = members.len(), "Read group members");

        let id = format!("{}/{}", group, login.unwrap_or_default());
        let mut state = config;
        state.id = Value::Value(id);
        state.members = Value::Value(
            members
                .into_iter()
                .map(|member| {
                    Value::Value(GroupMember {
                        login_name: Value::Value(member.login),
                        name: Value::Value(member.name),
                    })
                })
                .collect(),
        );
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::{DataSource, Diagnostics};
    use tf_provider::value::Value;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{GroupMember, GroupMembersDataSource, GroupMembersState};
    use crate::client::testing::handle;

    fn member(login: &str, name: &str) -> Value<GroupMember> {
        Value::Value(GroupMember {
            login_name: Value::Value(login.into()),
            name: Value::Value(name.into()),
        })
    }

    #[tokio::test]
    async fn empty_group_is_invalid() {
        let server = MockServer::start().await;
        let data_source = GroupMembersDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let config = GroupMembersState {
            group: Value::Value(String::new()),
            ..Default::default()
        };
        assert!(data_source.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 1);

        let mut diags = Diagnostics::default();
        let config = GroupMembersState {
            group: Value::Unknown,
            ..Default::default()
        };
        assert!(data_source.validate(&mut diags, config).await.is_some());
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn list_members() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user_groups/users"))
            .and(query_param("name", "devs"))
            .and(query_param("ps", "500"))
            .and(query_param_is_missing("q"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"users":[{"login":"jdoe","name":"John Doe","selected":true},{"login":"asmith","name":"Alice Smith","selected":true}],"p":1,"ps":500,"total":2}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = GroupMembersDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let config = GroupMembersState {
            group: Value::Value("devs".into()),
            ..Default::default()
        };
        let state = data_source
            .read(&mut diags, config, Default::default())
            .await
            .unwrap();
        assert!(diags.errors.is_empty(), "{diags:?}");
        assert_eq!(state.id, Value::Value("devs/".into()));
        assert_eq!(
            state.members,
            Value::Value(vec![
                member("jdoe", "John Doe"),
                member("asmith", "Alice Smith"),
            ])
        );
    }

    #[tokio::test]
    async fn filter_by_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user_groups/users"))
            .and(query_param("q", "jdoe"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"users":[{"login":"jdoe","name":"John Doe"}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = GroupMembersDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let config = GroupMembersState {
            group: Value::Value("devs".into()),
            login_name: Value::Value("jdoe".into()),
            ..Default::default()
        };
        let state = data_source
            .read(&mut diags, config, Default::default())
            .await
            .unwrap();
        assert_eq!(state.id, Value::Value("devs/jdoe".into()));
        assert_eq!(state.members, Value::Value(vec![member("jdoe", "John Doe")]));
    }

    #[tokio::test]
    async fn unknown_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user_groups/users"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"errors":[{"msg":"No group with name 'ghosts'"}]}"#,
            ))
            .mount(&server)
            .await;

        let data_source = GroupMembersDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let config = GroupMembersState {
            group: Value::Value("ghosts".into()),
            ..Default::default()
        };
        let state = data_source.read(&mut diags, config, Default::default()).await;
        assert!(state.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
