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

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tf_provider::{map, AttributePath, Diagnostics, DynamicDataSource, DynamicResource, Provider};
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, Schema,
};
use tf_provider::value::{Value, ValueEmpty};
use tracing::info;

use crate::client::{Client, ClientHandle, Credentials};
use crate::data_sources::{GroupMembersDataSource, UserTokensDataSource};
use crate::resources::{
    AlmGithubResource, GithubBindingResource, GroupResource, NewCodePeriodResource,
    PermissionsResource, ProjectResource, QualityGateProjectAssociationResource,
    QualityGateUserGroupAssociationResource, QualityProfileProjectAssociationResource,
    UserExternalIdentityResource, WebhookResource,
};
use crate::utils::{OrDiagnostic, StrValue};
use crate::version::ServerVersion;

#[derive(Debug, Default, Clone)]
pub struct SonarqubeProvider {
    client: ClientHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub host: Value<String>,
    pub user: Value<String>,
    pub pass: Value<String>,
    pub token: Value<String>,
    pub installed_version: Value<String>,
    pub installed_edition: Value<String>,
    pub tls_insecure_skip_verify: Value<bool>,
}

/// Take the configured value, falling back to the environment variable `env`
fn resolve(value: &Value<String>, env: &str) -> Option<String> {
    value
        .non_empty()
        .map(str::to_owned)
        .or_else(|| std::env::var(env).ok().filter(|s| !s.is_empty()))
}

impl ProviderConfig {
    fn credentials(&self) -> Credentials {
        if let Some(token) = resolve(&self.token, "SONAR_TOKEN") {
            return Credentials::Token(token);
        }
        match (
            resolve(&self.user, "SONAR_USER"),
            resolve(&self.pass, "SONAR_PASS"),
        ) {
            (Some(user), pass) => Credentials::Basic {
                user,
                pass: pass.unwrap_or_default(),
            },
            (None, _) => Credentials::Anonymous,
        }
    }
}

#[async_trait]
impl Provider for SonarqubeProvider {
    type Config<'a> = ProviderConfig;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        let string_attribute = |description: &str, sensitive: bool| Attribute {
            attr_type: AttributeType::String,
            description: Description::plain(description),
            constraint: AttributeConstraint::Optional,
            sensitive,
            ..Default::default()
        };
        Some(Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "host" => string_attribute("SonarQube server url (env: SONAR_HOST)", false),
                    "user" => string_attribute("SonarQube user (env: SONAR_USER)", false),
                    "pass" => string_attribute("SonarQube password (env: SONAR_PASS)", true),
                    "token" => string_attribute("SonarQube user token (env: SONAR_TOKEN)", true),
                    "installed_version" => string_attribute(
                        "SonarQube version, discovered from the server if unset (env: SONAR_INSTALLED_VERSION)",
                        false,
                    ),
                    "installed_edition" => string_attribute(
                        "SonarQube edition, discovered from the server if unset (env: SONAR_INSTALLED_EDITION)",
                        false,
                    ),
                    "tls_insecure_skip_verify" => Attribute {
                        attr_type: AttributeType::Bool,
                        description: Description::plain("Accept invalid TLS certificates"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube"),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::Config<'a>) -> Option<()> {
        if config.token.non_empty().is_some()
            && (config.user.non_empty().is_some() || config.pass.non_empty().is_some())
        {
            diags.error_short(
                "`token` cannot be used together with `user` and `pass`",
                AttributePath::new("token"),
            );
        }
        if config.user.non_empty().is_some() && config.pass.is_null() {
            diags.error_short("`pass` is required with `user`", AttributePath::new("pass"));
        }
        if let Some(version) = config.installed_version.non_empty() {
            if let Err(err) = version.parse::<ServerVersion>() {
                diags.error_short(err.to_string(), AttributePath::new("installed_version"));
            }
        }

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let Some(host) = resolve(&config.host, "SONAR_HOST") else {
            diags.error(
                "SonarQube host is not configured",
                "Set `host` or the SONAR_HOST environment variable",
                AttributePath::new("host"),
            );
            return None;
        };
        let insecure = matches!(config.tls_insecure_skip_verify, Value::Value(true));

        let client = Client::new(&host, config.credentials(), insecure)
            .or_diagnostic(diags, "Failed to create the SonarQube client")?;

        let version = match resolve(&config.installed_version, "SONAR_INSTALLED_VERSION") {
            Some(version) => version
                .parse::<ServerVersion>()
                .or_diagnostic(diags, "Invalid SonarQube version")?,
            None => client
                .fetch_version()
                .await
                .or_diagnostic(diags, "Failed to read the SonarQube version")?,
        };
        let edition = match resolve(&config.installed_edition, "SONAR_INSTALLED_EDITION") {
            Some(edition) => edition,
            None => client
                .fetch_edition()
                .await
                .or_diagnostic(diags, "Failed to read the SonarQube edition")?,
        };

        info!(%host, %version, %edition, %terraform_version, "SonarQube provider configured");
        self.client.set(client.with_server(edition, version)).await;
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicResource>>> {
        let client = &self.client;
        Some(map! {
            "group" => GroupResource::new(client.clone()),
            "webhook" => WebhookResource::new(client.clone()),
            "permissions" => PermissionsResource::new(client.clone()),
            "new_code_periods" => NewCodePeriodResource::new(client.clone()),
            "alm_github" => AlmGithubResource::new(client.clone()),
            "github_binding" => GithubBindingResource::new(client.clone()),
            "qualitygate_project_association" => QualityGateProjectAssociationResource::new(client.clone()),
            "qualitygate_usergroup_association" => QualityGateUserGroupAssociationResource::new(client.clone()),
            "qualityprofile_project_association" => QualityProfileProjectAssociationResource::new(client.clone()),
            "user_external_identity" => UserExternalIdentityResource::new(client.clone()),
            "project" => ProjectResource::new(client.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<HashMap<String, Box<dyn DynamicDataSource>>> {
        Some(map! {
            "group_members" => GroupMembersDataSource::new(self.client.clone()),
            "user_tokens" => UserTokensDataSource::new(self.client.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::{Diagnostics, Provider};
    use tf_provider::value::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ProviderConfig, SonarqubeProvider};
    use crate::client::Credentials;

    fn set(s: &str) -> Value<String> {
        Value::Value(s.to_owned())
    }

    #[tokio::test]
    async fn token_conflicts_with_user() {
        let provider = SonarqubeProvider::default();
        let mut diags = Diagnostics::default();
        let config = ProviderConfig {
            token: set("squ_x"),
            user: set("admin"),
            pass: set("admin"),
            ..Default::default()
        };
        assert!(provider.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn user_requires_pass() {
        let provider = SonarqubeProvider::default();
        let mut diags = Diagnostics::default();
        let config = ProviderConfig {
            user: set("admin"),
            ..Default::default()
        };
        assert!(provider.validate(&mut diags, config).await.is_none());
    }

    #[test]
    fn configured_credentials_win() {
        let config = ProviderConfig {
            token: set("squ_x"),
            ..Default::default()
        };
        assert_eq!(config.credentials(), Credentials::Token("squ_x".into()));

        let config = ProviderConfig {
            user: set("admin"),
            pass: set("secret"),
            ..Default::default()
        };
        assert_eq!(
            config.credentials(),
            Credentials::Basic {
                user: "admin".into(),
                pass: "secret".into()
            }
        );
    }

    #[tokio::test]
    async fn configure_discovers_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/server/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string("9.9.4.87374"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = SonarqubeProvider::default();
        let mut diags = Diagnostics::default();
        let config = ProviderConfig {
            host: set(&server.uri()),
            token: set("squ_x"),
            installed_edition: set("enterprise"),
            ..Default::default()
        };
        assert!(provider
            .configure(&mut diags, "1.7.0".into(), config)
            .await
            .is_some());

        let client = provider.client.get(&mut diags).await.unwrap();
        assert_eq!(client.edition(), "enterprise");
        assert_eq!(client.version().to_string(), "9.9.4.87374");
        assert!(diags.errors.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_is_an_error() {
        let provider = SonarqubeProvider::default();
        let mut diags = Diagnostics::default();
        assert!(provider.client.get(&mut diags).await.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
