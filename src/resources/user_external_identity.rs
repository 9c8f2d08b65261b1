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

/// `sonarqube_user_external_identity`: moves an externally authenticated user
/// to another identity provider
///
/// The server stays authoritative for the identity once set: read and delete
/// do not touch it.
#[derive(Debug, Clone)]
pub struct UserExternalIdentityResource {
    client: ClientHandle,
}

impl UserExternalIdentityResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserExternalIdentityState {
    pub id: Value<String>,
    pub login_name: Value<String>,
    pub external_identity: Value<String>,
    pub external_provider: Value<String>,
}

impl WithSchema for UserExternalIdentityState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Login of the user"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "login_name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Login of the user, must not be a local user"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "external_identity" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("New identity of the user in the external provider"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "external_provider" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("New identity provider (eg: `saml`, `github`, `LDAP_default`)"),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                },
                description: Description::plain("External identity of a SonarQube user"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct Users {
    users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
    #[serde(default)]
    local: bool,
}

async fn check_external(client: &Client, login: &str) -> Result<(), Error> {
    let users: Users = client
        .get("api/users/search", &Query::new().with("q", login))
        .await?;
    match users.users.iter().find(|user| user.login == login) {
        None => Err(Error::not_found("User", login)),
        Some(user) if user.local => Err(Error::Unsupported(format!(
            "User `{}` is a local user, only external users can change identity provider",
            login
        ))),
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl Resource for UserExternalIdentityResource {
    type State<'a> = UserExternalIdentityState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(UserExternalIdentityState::schema())
    }

    async fn validate<'a>(&self, _diags: &mut Diagnostics, _config: Self::State<'a>) -> Option<()> {
        Some(())
    }

    async fn read<'a>(
        &self,
        _diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
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
        state.id = state.login_name.clone();
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
            ("external_identity", &prior_state.external_identity, &proposed_state.external_identity),
            ("external_provider", &prior_state.external_provider, &proposed_state.external_provider),
        ] {
            replace_on_change(&mut trigger_replace, name, prior, proposed);
        }
        let mut state = proposed_state;
        state.id = state.login_name.clone();
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
        let login = planned_state.login_name.or_empty();
        check_external(&client, login)
            .await
            .or_diagnostic(diags, "Failed to set external identity")?;

        debug!(%login, provider = %planned_state.external_provider.or_empty(), "Updating identity provider");
        client
            .post(
                "api/users/update_identity_provider",
                &Query::new()
                    .with("login", login)
                    .with("newExternalIdentity", planned_state.external_identity.or_empty())
                    .with("newExternalProvider", planned_state.external_provider.or_empty()),
                StatusCode::NO_CONTENT,
            )
            .await
            .or_diagnostic(diags, "Failed to set external identity")?;

        let mut state = planned_state;
        state.id = state.login_name.clone();
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
        _diags: &mut Diagnostics,
        _prior_state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        Some(())
    }
}
