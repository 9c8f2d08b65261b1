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
use crate::utils::{replace_on_change, OrDiagnostic, StrValue, WithSchema};

/// `sonarqube_qualitygate_project_association`
#[derive(Debug, Clone)]
pub struct QualityGateProjectAssociationResource {
    client: ClientHandle,
}

impl QualityGateProjectAssociationResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityGateProjectAssociationState {
    pub id: Value<String>,
    pub gatename: Value<String>,
    pub gateid: Value<String>,
    pub projectkey: Value<String>,
}

impl WithSchema for QualityGateProjectAssociationState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("`gatename/projectkey`"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "gatename" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Name of the quality gate"),
                        constraint: AttributeConstraint::OptionalComputed,
                        ..Default::default()
                    },
                    "gateid" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Id of the quality gate, use `gatename` instead"),
                        constraint: AttributeConstraint::Optional,
                        deprecated: true,
                        ..Default::default()
                    },
                    "projectkey" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Key of the project"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                },
                description: Description::plain("Association of a quality gate to a project"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QualityGateByProject {
    quality_gate: QualityGate,
}

#[derive(Debug, Deserialize)]
struct QualityGate {
    name: String,
}

/// Project key of an id `gatename/projectkey`; gate names may contain `/`
fn project_of(id: &str) -> Option<&str> {
    id.rsplit_once('/')
        .map(|(_, project)| project)
        .filter(|project| !project.is_empty())
}

async fn fetch(
    client: &Client,
    project: &str,
    gateid: &Value<String>,
) -> Result<QualityGateProjectAssociationState, Error> {
    let association: QualityGateByProject = client
        .get(
            "api/qualitygates/get_by_project",
            &Query::new().with("project", project),
        )
        .await?;
    let gatename = association.quality_gate.name;
    Ok(QualityGateProjectAssociationState {
        id: Value::Value(format!("{}/{}", gatename, project)),
        gatename: Value::Value(gatename),
        gateid: gateid.clone(),
        projectkey: Value::Value(project.to_owned()),
    })
}

#[async_trait]
impl Resource for QualityGateProjectAssociationResource {
    type State<'a> = QualityGateProjectAssociationState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(QualityGateProjectAssociationState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if config.gatename.is_null() && config.gateid.is_null() {
            diags.root_error_short("One of `gatename` or `gateid` must be set");
        }
        if config.gateid.is_value() {
            diags.warning_short(
                "`gateid` is deprecated, use `gatename` instead",
                AttributePath::new("gateid"),
            );
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
        let Some(project) = project_of(state.id.or_empty()) else {
            diags.root_error(
                "Invalid resource id",
                format!("Id `{}` is not in the format `gatename/projectkey`", state.id.or_empty()),
            );
            return None;
        };
        let state = fetch(&client, project, &state.gateid)
            .await
            .or_diagnostic(diags, "Failed to read quality gate association")?;
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
        if state.gatename.is_null() {
            state.gatename = Value::Unknown;
        }
        state.id = match (&state.gatename, &state.projectkey) {
            (Value::Value(gate), Value::Value(project)) => {
                Value::Value(format!("{}/{}", gate, project))
            }
            _ => Value::Unknown,
        };
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
        // A computed gate name only follows the configured id
        if config_state.gatename.is_value() {
            replace_on_change(
                &mut trigger_replace,
                "gatename",
                &prior_state.gatename,
                &proposed_state.gatename,
            );
        }
        replace_on_change(
            &mut trigger_replace,
            "gateid",
            &prior_state.gateid,
            &proposed_state.gateid,
        );
        replace_on_change(
            &mut trigger_replace,
            "projectkey",
            &prior_state.projectkey,
            &proposed_state.projectkey,
        );
        let mut state = proposed_state;
        if !trigger_replace.is_empty() {
            if config_state.gatename.is_null() {
                state.gatename = Value::Unknown;
            }
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
        let project = planned_state.projectkey.or_empty();
        let query = match planned_state.gatename.non_empty() {
            Some(gate) => Query::new().with("gateName", gate),
            None => Query::new().with("gateId", planned_state.gateid.or_empty()),
        }
        .with("projectKey", project);
        debug!(%project, "Selecting quality gate");
        client
            .post("api/qualitygates/select", &query, StatusCode::NO_CONTENT)
            .await
            .or_diagnostic(diags, "Failed to associate quality gate")?;

        let state = fetch(&client, project, &planned_state.gateid)
            .await
            .or_diagnostic(diags, "Failed to read quality gate association")?;
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
        let project = prior_state.projectkey.or_empty();
        debug!(%project, "Deselecting quality gate");
        client
            .post(
                "api/qualitygates/deselect",
                &Query::new()
                    .with("gateName", prior_state.gatename.or_empty())
                    .with("projectKey", project),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to remove quality gate association")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let Some(project) = project_of(&id) else {
            diags.root_error(
                "Invalid resource id",
                format!("Id `{}` is not in the format `gatename/projectkey`", id),
            );
            return None;
        };
        let state = fetch(&client, project, &Value::Null)
            .await
            .or_diagnostic(diags, "Failed to import quality gate association")?;
        Some((state, Default::default()))
    }
}
