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
use crate::utils::{replace_on_change, value_or_null, OrDiagnostic, StrValue, WithSchema};

/// `sonarqube_webhook`: a global or project webhook
#[derive(Debug, Clone)]
pub struct WebhookResource {
    client: ClientHandle,
}

impl WebhookResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WebhookState {
    pub id: Value<String>,
    pub name: Value<String>,
    pub url: Value<String>,
    pub secret: Value<String>,
    pub project: Value<String>,
}

impl WithSchema for WebhookState {
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
                        description: Description::plain("Key of the webhook"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "name" => required("Name of the webhook"),
                    "url" => required("Url called by the webhook"),
                    "secret" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Secret used to sign the payloads"),
                        constraint: AttributeConstraint::OptionalComputed,
                        sensitive: true,
                        ..Default::default()
                    },
                    "project" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("The key of the project that will own the webhook"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube webhook"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Webhook {
    key: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    // Only returned before 10.1
    #[serde(default)]
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookCreated {
    webhook: Webhook,
}

#[derive(Debug, Deserialize)]
struct WebhookList {
    #[serde(default)]
    webhooks: Vec<Webhook>,
}

/// List the webhooks of the scope and pick the one with the state id
///
/// `project` and `secret` are not part of the listing on recent servers:
/// they are carried over from `state`.
async fn fetch(client: &Client, state: &WebhookState) -> Result<WebhookState, Error> {
    let key = state.id.or_empty();
    let list: WebhookList = client
        .get(
            "api/webhooks/list",
            &Query::new().with_opt("project", state.project.non_empty()),
        )
        .await?;

    let webhook = list
        .webhooks
        .into_iter()
        .find(|webhook| webhook.key == key)
        .ok_or_else(|| Error::not_found("Webhook", key))?;

    let secret = match &state.secret {
        Value::Value(secret) if !secret.is_empty() => Value::Value(secret.clone()),
        _ => value_or_null(webhook.secret.unwrap_or_default()),
    };
    Ok(WebhookState {
        id: Value::Value(webhook.key),
        name: Value::Value(webhook.name),
        url: Value::Value(webhook.url),
        secret,
        project: state.project.clone(),
    })
}

#[async_trait]
impl Resource for WebhookResource {
    type State<'a> = WebhookState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(WebhookState::schema())
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
        let state = fetch(&client, &state)
            .await
            .or_diagnostic(diags, "Failed to read webhook")?;
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
        if state.secret.is_null() {
            state.secret = Value::Unknown;
        }
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
        replace_on_change(
            &mut trigger_replace,
            "project",
            &prior_state.project,
            &proposed_state.project,
        );
        let mut state = proposed_state;
        if trigger_replace.is_empty() {
            state.id = prior_state.id;
        } else {
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
        debug!(name = planned_state.name.or_empty(), "Creating webhook");

        let created: WebhookCreated = client
            .post_json(
                "api/webhooks/create",
                &Query::new()
                    .with("name", planned_state.name.or_empty())
                    .with("url", planned_state.url.or_empty())
                    .with_opt("secret", planned_state.secret.non_empty())
                    .with_opt("project", planned_state.project.non_empty()),
                StatusCode::OK,
            )
            .await
            .or_diagnostic(diags, "Failed to create webhook")?;

        let mut state = planned_state;
        state.id = Value::Value(created.webhook.key);
        if state.secret.is_unknown() {
            state.secret = Value::Null;
        }
        let state = fetch(&client, &state)
            .await
            .or_diagnostic(diags, "Failed to read webhook")?;
        Some((state, planned_private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let key = planned_state.id.or_empty();
        debug!(%key, "Updating webhook");

        client
            .post(
                "api/webhooks/update",
                &Query::new()
                    .with("webhook", key)
                    .with("name", planned_state.name.or_empty())
                    .with("url", planned_state.url.or_empty())
                    .with_opt("project", planned_state.project.non_empty())
                    .with_opt("secret", planned_state.secret.non_empty()),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to update webhook")?;

        let state = fetch(&client, &planned_state)
            .await
            .or_diagnostic(diags, "Failed to read webhook")?;
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
        let key = prior_state.id.or_empty();
        debug!(%key, "Deleting webhook");
        client
            .post(
                "api/webhooks/delete",
                &Query::new().with("webhook", key),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to delete webhook")
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let client = self.client.get(diags).await?;
        let (key, project) = match id.split_once('/') {
            Some((key, project)) => (key, value_or_null(project)),
            None => (id.as_str(), Value::Null),
        };
        let state = WebhookState {
            id: Value::Value(key.to_owned()),
            project,
            ..Default::default()
        };
        let state = fetch(&client, &state)
            .await
            .or_diagnostic(diags, "Failed to import webhook")?;
        Some((state, Default::default()))
    }
}
