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
use tracing::{debug, warn};

use crate::client::{Client, ClientHandle, Error, Query};
use crate::utils::{value_or_null, OrDiagnostic, StrValue, WithSchema};

/// `sonarqube_group`: a user group
#[derive(Debug, Clone)]
pub struct GroupResource {
    client: ClientHandle,
}

impl GroupResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub description: Value<String>,
}

impl WithSchema for GroupState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Id of the group, or its name on servers that no longer expose ids"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Name of the group"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "description" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Description of the group"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube user group"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Group {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct GroupSearch {
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Debug, Deserialize)]
struct GroupCreated {
    group: Group,
}

/// Find the group by id, or by name when the server does not expose ids (10.0+)
async fn fetch(client: &Client, id: &str, name: &str) -> Result<GroupState, Error> {
    let search: GroupSearch = client
        .get(
            "api/user_groups/search",
            &Query::new().with("ps", "500").with("q", name),
        )
        .await?;

    let group = search
        .groups
        .into_iter()
        .find(|group| {
            matches!(&group.id, Some(group_id) if !id.is_empty() && group_id == id)
                || group.name == name
        })
        .ok_or_else(|| Error::not_found("Group", name))?;

    let id = match group.id {
        Some(group_id) if !group_id.is_empty() => group_id,
        _ if !id.is_empty() => id.to_owned(),
        _ => group.name.clone(),
    };
    Ok(GroupState {
        id: Value::Value(id),
        name: Value::Value(group.name),
        description: value_or_null(group.description),
    })
}

#[async_trait]
impl Resource for GroupResource {
    type State<'a> = GroupState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(GroupState::schema())
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let name = state.name.or_empty();
        // A group deleted outside Terraform leaves the state
        let state = match fetch(&client, state.id.or_empty(), name).await {
            Err(Error::NotFound { .. }) => {
                warn!(%name, "Group not found, removing it from the state");
                return None;
            }
            result => result.or_diagnostic(diags, "Failed to read group")?,
        };
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
        let mut state = proposed_state;
        // Renaming keeps the id on 9.x, but it is the name on 10.0+
        if state.name != prior_state.name {
            state.id = Value::Unknown;
        }
        Some((state, prior_private_state, vec![]))
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
        let name = planned_state.name.or_empty();
        debug!(%name, "Creating group");

        let created: GroupCreated = client
            .post_json(
                "api/user_groups/create",
                &Query::new()
                    .with("name", name)
                    .with("description", planned_state.description.or_empty()),
                StatusCode::OK,
            )
            .await
            .or_diagnostic(diags, "Failed to create group")?;

        let id = created.group.id.unwrap_or_default();
        let state = fetch(&client, &id, name)
            .await
            .or_diagnostic(diags, "Failed to read group")?;
        Some((state, planned_private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let current_name = prior_state.name.or_empty();
        let name = planned_state.name.or_empty();
        debug!(%current_name, %name, "Updating group");

        let mut query = Query::new().with("currentName", current_name);
        if name != current_name {
            query.push("name", name);
        }
        query.push("description", planned_state.description.or_empty());
        client
            .post("api/user_groups/update", &query, StatusCode::OK)
            .await
            .or_diagnostic(diags, "Failed to update group")?;

        let id = if name == current_name {
            prior_state.id.or_empty()
        } else {
            ""
        };
        let state = fetch(&client, id, name)
            .await
            .or_diagnostic(diags, "Failed to read group")?;
        Some((state, planned_private_state))
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let client = self.client.get(diags).await?;
        let name = prior_state.name.or_empty();
        debug!(%name, "Deleting group");
        client
            .post(
                "api/user_groups/delete",
                &Query::new().with("name", name),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to delete group")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let state = fetch(&client, "", &id)
            .await
            .or_diagnostic(diags, "Failed to import group")?;
        Some((state, Default::default()))
    }
}
