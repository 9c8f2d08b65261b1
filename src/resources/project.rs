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
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, Resource};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, Schema,
};
use tf_provider::value::{Value, ValueEmpty, ValueList};
use tracing::debug;

use crate::client::{Client, ClientHandle, Error, Query};
use crate::utils::{replace_on_change, OrDiagnostic, StrValue, WithSchema};

const VISIBILITIES: [&str; 2] = ["public", "private"];

/// `sonarqube_project`
#[derive(Debug, Clone)]
pub struct ProjectResource {
    client: ClientHandle,
}

impl ProjectResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub project: Value<String>,
    pub visibility: Value<String>,
    pub tags: ValueList<Value<String>>,
}

impl ProjectState {
    /// Configured tags, unknown and null entries left out
    fn tag_list(&self) -> Vec<&str> {
        self.tags
            .iter()
            .flatten()
            .filter_map(|tag| tag.as_ref_option().map(String::as_str))
            .collect()
    }
}

impl WithSchema for ProjectState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Key of the project"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Name of the project"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "project" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Key of the project"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "visibility" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("`public` or `private`, defaults to the server setting"),
                        constraint: AttributeConstraint::OptionalComputed,
                        ..Default::default()
                    },
                    "tags" => Attribute {
                        attr_type: AttributeType::List(AttributeType::String.into()),
                        description: Description::plain("Tags of the project"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube project"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ComponentShow {
    component: Component,
}

#[derive(Debug, Deserialize)]
struct Component {
    key: String,
    name: String,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Read a project back; `known` gives the tag order and nullness to keep
async fn fetch(client: &Client, key: &str, known: &ProjectState) -> Result<ProjectState, Error> {
    let show: ComponentShow = client
        .get("api/components/show", &Query::new().with("component", key))
        .await?;
    let component = show.component;

    let known_tags: BTreeSet<&str> = known.tag_list().into_iter().collect();
    let remote_tags: BTreeSet<&str> = component.tags.iter().map(String::as_str).collect();
    let tags = if component.tags.is_empty() && !known.tags.is_value() {
        Value::Null
    } else if known_tags == remote_tags {
        known.tags.clone()
    } else {
        Value::Value(component.tags.into_iter().map(Value::Value).collect())
    };

    Ok(ProjectState {
        id: Value::Value(component.key.clone()),
        name: Value::Value(component.name),
        project: Value::Value(component.key),
        visibility: component
            .visibility
            .map(Value::Value)
            .unwrap_or_else(|| known.visibility.clone()),
        tags,
    })
}

async fn set_tags(client: &Client, key: &str, tags: &[&str]) -> Result<(), Error> {
    debug!(project = %key, tags = ?tags, "Setting project tags");
    client
        .post(
            "api/project_tags/set",
            &Query::new().with("project", key).with("tags", tags.join(",")),
            StatusCode::NO_CONTENT,
        )
        .await
}

#[async_trait]
impl Resource for ProjectResource {
    type State<'a> = ProjectState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(ProjectState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if let Value::Value(visibility) = &config.visibility {
            if !VISIBILITIES.contains(&visibility.as_str()) {
                diags.error(
                    "Invalid visibility",
                    format!("`{}` is not one of `public` or `private`", visibility),
                    AttributePath::new("visibility"),
                );
            }
        }
        for (i, tag) in config.tags.iter().flatten().enumerate() {
            if matches!(tag, Value::Value(tag) if tag.is_empty() || tag.contains(',')) {
                diags.error_short(
                    "Tags must be non-empty and must not contain `,`",
                    AttributePath::new("tags").index(i as i64),
                );
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
        let state = fetch(&client, state.id.or_empty(), &state)
            .await
            .or_diagnostic(diags, "Failed to read project")?;
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
        state.id = state.project.clone();
        if state.visibility.is_null() {
            state.visibility = Value::Unknown;
        }
        Some((state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        _diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let mut trigger_replace = vec![];
        replace_on_change(&mut trigger_replace, "name", &prior_state.name, &proposed_state.name);
        replace_on_change(
            &mut trigger_replace,
            "project",
            &prior_state.project,
            &proposed_state.project,
        );
        let mut state = proposed_state;
        state.id = state.project.clone();
        if config_state.visibility.is_null() {
            state.visibility = if trigger_replace.is_empty() {
                prior_state.visibility
            } else {
                Value::Unknown
            };
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
        let key = planned_state.project.or_empty();
        debug!(project = %key, "Creating project");
        let _: serde_json::Value = client
            .post_json(
                "api/projects/create",
                &Query::new()
                    .with("name", planned_state.name.or_empty())
                    .with("project", key)
                    .with_opt("visibility", planned_state.visibility.non_empty()),
                StatusCode::OK,
            )
            .await
            .or_diagnostic(diags, "Failed to create project")?;

        let tags = planned_state.tag_list();
        if !tags.is_empty() {
            set_tags(&client, key, &tags)
                .await
                .or_diagnostic(diags, "Failed to set project tags")?;
        }

        let state = fetch(&client, key, &planned_state)
            .await
            .or_diagnostic(diags, "Failed to read project")?;
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
        let key = planned_state.project.or_empty();

        if let Some(visibility) = planned_state.visibility.non_empty() {
            if prior_state.visibility.non_empty() != Some(visibility) {
                debug!(project = %key, %visibility, "Updating project visibility");
                client
                    .post(
                        "api/projects/update_visibility",
                        &Query::new()
                            .with("project", key)
                            .with("visibility", visibility),
                        StatusCode::NO_CONTENT,
                    )
                    .await
                    .or_diagnostic(diags, "Failed to update project visibility")?;
            }
        }

        let tags = planned_state.tag_list();
        if tags != prior_state.tag_list() {
            set_tags(&client, key, &tags)
                .await
                .or_diagnostic(diags, "Failed to set project tags")?;
        }

        let state = fetch(&client, key, &planned_state)
            .await
            .or_diagnostic(diags, "Failed to read project")?;
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
        let key = prior_state.project.or_empty();
        debug!(project = %key, "Deleting project");
        client
            .post(
                "api/projects/delete",
                &Query::new().with("project", key),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to delete project")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let state = fetch(&client, &id, &ProjectState::default())
            .await
            .or_diagnostic(diags, "Failed to import project")?;
        Some((state, Default::default()))
    }
}
