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

/// `sonarqube_github_binding`: binding of a project to a GitHub repository
#[derive(Debug, Clone)]
pub struct GithubBindingResource {
    client: ClientHandle,
}

impl GithubBindingResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GithubBindingState {
    pub id: Value<String>,
    pub alm_setting: Value<String>,
    pub project: Value<String>,
    pub repository: Value<String>,
    pub monorepo: Value<String>,
    pub summary_comment_enabled: Value<String>,
}

impl WithSchema for GithubBindingState {
    fn schema() -> Schema {
        let required = |description: &str| Attribute {
            attr_type: AttributeType::String,
            description: Description::plain(description),
            constraint: AttributeConstraint::Required,
            ..Default::default()
        };
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("`project/repository`"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "alm_setting" => required("Key of the GitHub ALM setting"),
                    "project" => required("Key of the project"),
                    "repository" => required("Repository, as `organization/name`"),
                    "monorepo" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Is the project part of a monorepo (default: false)"),
                        constraint: AttributeConstraint::OptionalComputed,
                        ..Default::default()
                    },
                    "summary_comment_enabled" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Post a summary comment on pull requests (default: true)"),
                        constraint: AttributeConstraint::OptionalComputed,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube binding between a project and a GitHub repository"),
                ..Default::default()
            },
        }
    }
}

impl GithubBindingState {
    fn with_defaults(mut self) -> Self {
        if self.monorepo.is_null() {
            self.monorepo = Value::Value("false".into());
        }
        if self.summary_comment_enabled.is_null() {
            self.summary_comment_enabled = Value::Value("true".into());
        }
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Binding {
    key: String,
    alm: String,
    #[serde(default)]
    repository: String,
    #[serde(default)]
    summary_comment_enabled: bool,
    #[serde(default)]
    monorepo: bool,
}

/// Bindings require a commercial edition
fn check_edition(client: &Client) -> Result<(), Error> {
    if client.edition().eq_ignore_ascii_case("community") {
        Err(Error::Unsupported(format!(
            "GitHub bindings are not supported by the Community edition of SonarQube (version {})",
            client.version()
        )))
    } else {
        Ok(())
    }
}

async fn fetch(client: &Client, project: &str, repository: &str) -> Result<GithubBindingState, Error> {
    check_edition(client)?;
    let binding: Binding = client
        .get(
            "api/alm_settings/get_binding",
            &Query::new().with("project", project),
        )
        .await?;
    if binding.repository != repository || binding.alm != "github" {
        return Err(Error::not_found(
            "GitHub binding",
            format!("{}/{}", project, repository),
        ));
    }
    Ok(GithubBindingState {
        id: Value::Value(format!("{}/{}", project, repository)),
        alm_setting: Value::Value(binding.key),
        project: Value::Value(project.to_owned()),
        repository: Value::Value(binding.repository),
        monorepo: Value::Value(binding.monorepo.to_string()),
        summary_comment_enabled: Value::Value(binding.summary_comment_enabled.to_string()),
    })
}

#[async_trait]
impl Resource for GithubBindingResource {
    type State<'a> = GithubBindingState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(GithubBindingState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        for (name, value) in [
            ("monorepo", &config.monorepo),
            ("summary_comment_enabled", &config.summary_comment_enabled),
        ] {
            if let Value::Value(flag) = value {
                if flag != "true" && flag != "false" {
                    diags.error_short(
                        format!("`{}` must be \"true\" or \"false\"", name),
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
        let [project, repository] = split_id(diags, state.id.or_empty(), "project/repository")?;
        let state = fetch(&client, &project, &repository)
            .await
            .or_diagnostic(diags, "Failed to read GitHub binding")?;
        Some((state, private_state))
    }

    async fn plan_create<'a>(
        &self,
        _diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = proposed_state.with_defaults();
        state.id = match (&state.project, &state.repository) {
            (Value::Value(project), Value::Value(repository)) => {
                Value::Value(format!("{}/{}", project, repository))
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
        let state = proposed_state.with_defaults();
        let mut trigger_replace = vec![];
        for (name, prior, proposed) in [
            ("alm_setting", &prior_state.alm_setting, &state.alm_setting),
            ("project", &prior_state.project, &state.project),
            ("repository", &prior_state.repository, &state.repository),
            ("monorepo", &prior_state.monorepo, &state.monorepo),
            (
                "summary_comment_enabled",
                &prior_state.summary_comment_enabled,
                &state.summary_comment_enabled,
            ),
        ] {
            replace_on_change(&mut trigger_replace, name, prior, proposed);
        }
        let mut state = state;
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
        check_edition(&client).or_diagnostic(diags, "Failed to create GitHub binding")?;

        let project = planned_state.project.or_empty();
        let repository = planned_state.repository.or_empty();
        debug!(%project, %repository, "Binding project to GitHub");
        client
            .post(
                "api/alm_settings/set_github_binding",
                &Query::new()
                    .with("almSetting", planned_state.alm_setting.or_empty())
                    .with("monorepo", planned_state.monorepo.or_empty())
                    .with("project", project)
                    .with("repository", repository)
                    .with(
                        "summaryCommentEnabled",
                        planned_state.summary_comment_enabled.or_empty(),
                    ),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to create GitHub binding")?;

        let state = fetch(&client, project, repository)
            .await
            .or_diagnostic(diags, "Failed to read GitHub binding")?;
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
        check_edition(&client).or_diagnostic(diags, "Failed to delete GitHub binding")?;
        let project = prior_state.project.or_empty();
        debug!(%project, "Unbinding project from GitHub");
        client
            .post(
                "api/alm_settings/delete_binding",
                &Query::new().with("project", project),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to delete GitHub binding")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let [project, repository] = split_id(diags, &id, "project/repository")?;
        let state = fetch(&client, &project, &repository)
            .await
            .or_diagnostic(diags, "Failed to import GitHub binding")?;
        Some((state, Default::default()))
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::{Diagnostics, Resource};
    use tf_provider::value::Value;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{GithubBindingResource, GithubBindingState};
    use crate::client::testing::{handle, handle_for};

    const BINDING: &str = r#"{"key":"gh","alm":"github","repository":"acme/api","url":"https://api.github.com","summaryCommentEnabled":true,"monorepo":false}"#;

    fn config() -> GithubBindingState {
        GithubBindingState {
            id: Value::Null,
            alm_setting: Value::Value("gh".into()),
            project: Value::Value("api".into()),
            repository: Value::Value("acme/api".into()),
            monorepo: Value::Null,
            summary_comment_enabled: Value::Null,
        }
    }

    #[tokio::test]
    async fn community_edition_is_refused() {
        let server = MockServer::start().await;
        let resource = GithubBindingResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let (planned, _) = resource
            .plan_create(&mut diags, config(), config(), Default::default())
            .await
            .unwrap();
        assert!(resource
            .create(
                &mut diags,
                planned.clone(),
                planned,
                Default::default(),
                Default::default()
            )
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_with_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/alm_settings/set_github_binding"))
            .and(query_param("almSetting", "gh"))
            .and(query_param("project", "api"))
            .and(query_param("repository", "acme/api"))
            .and(query_param("monorepo", "false"))
            .and(query_param("summaryCommentEnabled", "true"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/alm_settings/get_binding"))
            .and(query_param("project", "api"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BINDING))
            .mount(&server)
            .await;

        let resource = GithubBindingResource::new(handle_for(&server, "Developer", "10.4"));
        let mut diags = Diagnostics::default();
        let (planned, _) = resource
            .plan_create(&mut diags, config(), config(), Default::default())
            .await
            .unwrap();
        assert_eq!(planned.id, Value::Value("api/acme/api".into()));
        let (state, _) = resource
            .create(
                &mut diags,
                planned.clone(),
                planned.clone(),
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();
        assert!(diags.errors.is_empty(), "{diags:?}");
        assert_eq!(state, planned);
    }

    #[tokio::test]
    async fn import_checks_repository() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/alm_settings/get_binding"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BINDING))
            .mount(&server)
            .await;

        let resource = GithubBindingResource::new(handle_for(&server, "enterprise", "9.9"));
        let mut diags = Diagnostics::default();
        let (state, _) = resource
            .import(&mut diags, "api/acme/api".into())
            .await
            .unwrap();
        assert_eq!(state.alm_setting, Value::Value("gh".into()));

        assert!(resource
            .import(&mut diags, "api/acme/other".into())
            .await
            .is_none());
        assert!(resource.import(&mut diags, "api".into()).await.is_none());
        assert_eq!(diags.errors.len(), 2);
    }
}
