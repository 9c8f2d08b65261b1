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
use crate::utils::{replace_on_change, split_id, OrDiagnostic, StrValue, WithSchema};

const MAX_LENGTH: usize = 100;

/// `sonarqube_qualityprofile_project_association`
#[derive(Debug, Clone)]
pub struct QualityProfileProjectAssociationResource {
    client: ClientHandle,
}

impl QualityProfileProjectAssociationResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityProfileProjectAssociationState {
    pub id: Value<String>,
    pub quality_profile: Value<String>,
    pub project: Value<String>,
    pub language: Value<String>,
}

impl QualityProfileProjectAssociationState {
    fn query(&self) -> Query {
        Query::new()
            .with("language", self.language.or_empty())
            .with("project", self.project.or_empty())
            .with("qualityProfile", self.quality_profile.or_empty())
    }
}

impl WithSchema for QualityProfileProjectAssociationState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("`quality_profile/project/language`"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "quality_profile" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Quality profile name"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "project" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Project key"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "language" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Quality profile language"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                },
                description: Description::plain("Association of a quality profile to a project"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Profiles {
    profiles: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    key: String,
    name: String,
    language: String,
}

#[derive(Debug, Deserialize)]
struct ProfileProjects {
    results: Vec<ProfileProject>,
}

#[derive(Debug, Deserialize)]
struct ProfileProject {
    key: String,
}

async fn fetch(
    client: &Client,
    profile: &str,
    project: &str,
    language: &str,
) -> Result<QualityProfileProjectAssociationState, Error> {
    let id = format!("{}/{}/{}", profile, project, language);
    let profiles: Profiles = client
        .get(
            "api/qualityprofiles/search",
            &Query::new().with("language", language),
        )
        .await?;
    let Some(profile) = profiles
        .profiles
        .into_iter()
        .find(|candidate| candidate.name == profile && candidate.language == language)
    else {
        return Err(Error::not_found("Quality profile", format!("{}/{}", profile, language)));
    };

    let projects: ProfileProjects = client
        .get(
            "api/qualityprofiles/projects",
            &Query::new()
                .with("key", profile.key.as_str())
                .with("q", project)
                .with("ps", "500"),
        )
        .await?;
    if !projects.results.iter().any(|result| result.key == project) {
        return Err(Error::not_found("Quality profile association", id));
    }

    Ok(QualityProfileProjectAssociationState {
        id: Value::Value(id),
        quality_profile: Value::Value(profile.name),
        project: Value::Value(project.to_owned()),
        language: Value::Value(profile.language),
    })
}

#[async_trait]
impl Resource for QualityProfileProjectAssociationResource {
    type State<'a> = QualityProfileProjectAssociationState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(QualityProfileProjectAssociationState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        for (name, value) in [
            ("quality_profile", &config.quality_profile),
            ("project", &config.project),
        ] {
            if let Value::Value(value) = value {
                if value.chars().count() > MAX_LENGTH {
                    diags.error(
                        "Value too long",
                        format!("`{}` must be at most {} characters", name, MAX_LENGTH),
                        AttributePath::new(name),
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
        let [profile, project, language] =
            split_id(diags, state.id.or_empty(), "quality_profile/project/language")?;
        let state = fetch(&client, &profile, &project, &language)
            .await
            .or_diagnostic(diags, "Failed to read quality profile association")?;
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
        state.id = match (&state.quality_profile, &state.project, &state.language) {
            (Value::Value(profile), Value::Value(project), Value::Value(language)) => {
                Value::Value(format!("{}/{}/{}", profile, project, language))
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
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>, Vec<AttributePath>)> {
        let mut trigger_replace = vec![];
        for (name, prior, proposed) in [
            ("quality_profile", &prior_state.quality_profile, &proposed_state.quality_profile),
            ("project", &prior_state.project, &proposed_state.project),
            ("language", &prior_state.language, &proposed_state.language),
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
        let profile = planned_state.quality_profile.or_empty();
        let project = planned_state.project.or_empty();
        let language = planned_state.language.or_empty();
        debug!(%profile, %project, %language, "Associating quality profile");
        client
            .post(
                "api/qualityprofiles/add_project",
                &planned_state.query(),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to associate quality profile")?;

        let state = fetch(&client, profile, project, language)
            .await
            .or_diagnostic(diags, "Failed to read quality profile association")?;
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
        debug!(id = %prior_state.id.or_empty(), "Removing quality profile association");
        client
            .post(
                "api/qualityprofiles/remove_project",
                &prior_state.query(),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to remove quality profile association")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let [profile, project, language] =
            split_id(diags, &id, "quality_profile/project/language")?;
        let state = fetch(&client, &profile, &project, &language)
            .await
            .or_diagnostic(diags, "Failed to import quality profile association")?;
        Some((state, Default::default()))
    }
}
