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
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, Schema,
};
use tf_provider::value::{Value, ValueEmpty};
use tracing::debug;

use crate::client::{Client, ClientHandle, Error, Query};
use crate::utils::{exactly_one_of, replace_on_change, rsplit_id, OrDiagnostic, StrValue, WithSchema};

/// `sonarqube_qualitygate_usergroup_association`: permission of a user or a
/// group to edit a quality gate
#[derive(Debug, Clone)]
pub struct QualityGateUserGroupAssociationResource {
    client: ClientHandle,
}

impl QualityGateUserGroupAssociationResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityGateUserGroupAssociationState {
    pub id: Value<String>,
    pub gatename: Value<String>,
    pub group_name: Value<String>,
    pub login_name: Value<String>,
}

impl WithSchema for QualityGateUserGroupAssociationState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("`gatename/group_name` or `gatename/login_name`"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "gatename" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Name of the quality gate"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "group_name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Group allowed to edit the quality gate"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                    "login_name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("User allowed to edit the quality gate"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain(
                    "Allow a user or a group to edit a quality gate (SonarQube 9.2 and later)",
                ),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Member {
    Group(String),
    User(String),
}

impl Member {
    fn from_state(state: &QualityGateUserGroupAssociationState) -> Option<Self> {
        match (state.group_name.non_empty(), state.login_name.non_empty()) {
            (Some(group), _) => Some(Member::Group(group.to_owned())),
            (None, Some(login)) => Some(Member::User(login.to_owned())),
            (None, None) => None,
        }
    }

    fn name(&self) -> &str {
        match self {
            Member::Group(name) | Member::User(name) => name,
        }
    }

    /// Endpoint for `add`, `remove` or `search`
    fn endpoint(&self, action: &str) -> String {
        let kind = match self {
            Member::Group(_) => "group",
            Member::User(_) => "user",
        };
        if action == "search" {
            format!("api/qualitygates/search_{}s", kind)
        } else {
            format!("api/qualitygates/{}_{}", action, kind)
        }
    }

    fn query(&self, gate: &str) -> Query {
        let query = Query::new().with("gateName", gate);
        match self {
            Member::Group(name) => query.with("groupName", name.as_str()),
            Member::User(login) => query.with("login", login.as_str()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Selected {
    groups: Vec<SelectedGroup>,
    users: Vec<SelectedUser>,
}

#[derive(Debug, Deserialize)]
struct SelectedGroup {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SelectedUser {
    login: String,
}

fn check_version(client: &Client) -> Result<(), Error> {
    if client.version().at_least(9, 2) {
        Ok(())
    } else {
        Err(Error::Unsupported(format!(
            "Quality gate permissions require SonarQube 9.2 or later (found {})",
            client.version()
        )))
    }
}

async fn fetch(
    client: &Client,
    gate: &str,
    member: &Member,
) -> Result<QualityGateUserGroupAssociationState, Error> {
    check_version(client)?;
    let selected: Selected = client
        .get(
            &member.endpoint("search"),
            &Query::new()
                .with("gateName", gate)
                .with("selected", "selected")
                .with("q", member.name()),
        )
        .await?;
    let found = match member {
        Member::Group(name) => selected.groups.iter().any(|group| &group.name == name),
        Member::User(login) => selected.users.iter().any(|user| &user.login == login),
    };
    if !found {
        return Err(Error::not_found(
            "Quality gate permission",
            format!("{}/{}", gate, member.name()),
        ));
    }
    let (group_name, login_name) = match member {
        Member::Group(name) => (Value::Value(name.clone()), Value::Null),
        Member::User(login) => (Value::Null, Value::Value(login.clone())),
    };
    Ok(QualityGateUserGroupAssociationState {
        id: Value::Value(format!("{}/{}", gate, member.name())),
        gatename: Value::Value(gate.to_owned()),
        group_name,
        login_name,
    })
}

#[async_trait]
impl Resource for QualityGateUserGroupAssociationResource {
    type State<'a> = QualityGateUserGroupAssociationState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(QualityGateUserGroupAssociationState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        exactly_one_of(
            diags,
            &[
                ("group_name", &config.group_name),
                ("login_name", &config.login_name),
            ],
        );
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
        let Some(gate) = state.gatename.non_empty() else {
            diags.error_short("`gatename` is not set", AttributePath::new("gatename"));
            return None;
        };
        let Some(member) = Member::from_state(&state) else {
            diags.root_error_short("Neither `group_name` nor `login_name` is set");
            return None;
        };
        let state = fetch(&client, gate, &member)
            .await
            .or_diagnostic(diags, "Failed to read quality gate permission")?;
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
        state.id = match (state.gatename.non_empty(), Member::from_state(&state)) {
            (Some(gate), Some(member)) => Value::Value(format!("{}/{}", gate, member.name())),
            _ => Value::Unknown,
        };
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
            ("gatename", &prior_state.gatename, &proposed_state.gatename),
            ("group_name", &prior_state.group_name, &proposed_state.group_name),
            ("login_name", &prior_state.login_name, &proposed_state.login_name),
        ] {
            replace_on_change(&mut trigger_replace, name, prior, proposed);
        }
        let mut state = proposed_state;
        if !trigger_replace.is_empty() {
            state.id = Value::Unknown;
        }
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
        check_version(&client).or_diagnostic(diags, "Failed to create quality gate permission")?;
        let Some(member) = Member::from_state(&planned_state) else {
            diags.root_error_short("Neither `group_name` nor `login_name` is set");
            return None;
        };
        let gate = planned_state.gatename.or_empty();
        debug!(%gate, member = member.name(), "Granting quality gate permission");
        client
            .post(
                &member.endpoint("add"),
                &member.query(gate),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to create quality gate permission")?;

        let state = fetch(&client, gate, &member)
            .await
            .or_diagnostic(diags, "Failed to read quality gate permission")?;
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
        let Some(member) = Member::from_state(&prior_state) else {
            diags.root_error_short("Neither `group_name` nor `login_name` is set");
            return None;
        };
        let gate = prior_state.gatename.or_empty();
        debug!(%gate, member = member.name(), "Revoking quality gate permission");
        client
            .post(
                &member.endpoint("remove"),
                &member.query(gate),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to delete quality gate permission")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let [gate, name] = rsplit_id(diags, &id, "gatename/member")?;
        // Groups first, then users
        let state = match fetch(&client, &gate, &Member::Group(name.clone())).await {
            Err(Error::NotFound { .. }) => fetch(&client, &gate, &Member::User(name)).await,
            result => result,
        }
        .or_diagnostic(diags, "Failed to import quality gate permission")?;
        Some((state, Default::default()))
    }
}
