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
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;

use crate::client::{Client, ClientHandle, Error, Query};
use crate::utils::{value_or_null, OrDiagnostic, StrValue, WithSchema};

/// `sonarqube_user_tokens`: tokens of a user, the current one by default
#[derive(Debug, Clone)]
pub struct UserTokensDataSource {
    client: ClientHandle,
}

impl UserTokensDataSource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserTokensState {
    pub id: Value<String>,
    pub login_name: Value<String>,
    pub user_tokens: ValueList<Value<UserToken>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserToken {
    pub id: Value<String>,
    pub name: Value<String>,
    #[serde(rename = "type")]
    pub token_type: Value<String>,
    pub created_at: Value<String>,
    pub expiration_date: Value<String>,
    pub project_key: Value<String>,
}

impl WithSchema for UserTokensState {
    fn schema() -> Schema {
        let computed = |description: &'static str| Attribute {
            attr_type: AttributeType::String,
            description: Description::plain(description),
            constraint: AttributeConstraint::Computed,
            ..Default::default()
        };
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => computed("Login of the user owning the tokens"),
                    "login_name" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain(
                            "Login of an active user, the current user if unset",
                        ),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                    "user_tokens" => Attribute {
                        attr_type: AttributeType::AttributeList(map! {
                            "id" => computed("`login/name`"),
                            "name" => computed("Name of the token"),
                            "type" => computed("Type of the token"),
                            "created_at" => computed("Creation date, `YYYY-MM-DD`"),
                            "expiration_date" => computed("Expiration date, `YYYY-MM-DD`"),
                            "project_key" => computed("Only project the token can analyze"),
                        }),
                        description: Description::plain("Tokens of the user"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                },
                description: Description::plain("Tokens of a SonarQube user"),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tokens {
    login: String,
    user_tokens: Vec<Token>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Token {
    name: String,
    #[serde(default, rename = "type")]
    token_type: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    expiration_date: String,
    #[serde(default)]
    project: Option<TokenProject>,
}

#[derive(Debug, Deserialize)]
struct TokenProject {
    key: String,
}

/// Keep the date part of a server timestamp (eg: `2024-03-01T10:24:05+0100`),
/// in the timestamp's own offset
fn date_of(timestamp: &str) -> Result<Value<String>, Error> {
    if timestamp.is_empty() {
        return Ok(Value::Null);
    }
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
    );
    let parsed = OffsetDateTime::parse(timestamp, format).map_err(|source| Error::Date {
        value: timestamp.to_owned(),
        source,
    })?;
    Ok(Value::Value(parsed.date().to_string()))
}

fn user_token(login: &str, token: Token) -> Result<UserToken, Error> {
    Ok(UserToken {
        id: Value::Value(format!("{}/{}", login, token.name)),
        created_at: date_of(&token.created_at)?,
        expiration_date: date_of(&token.expiration_date)?,
        project_key: token
            .project
            .map(|project| value_or_null(project.key))
            .unwrap_or(Value::Null),
        token_type: value_or_null(token.token_type),
        name: Value::Value(token.name),
    })
}

async fn fetch(client: &Client, login: Option<&str>) -> Result<(String, Vec<UserToken>), Error> {
    let tokens: Tokens = client
        .get(
            "api/user_tokens/search",
            &Query::new().with_opt("login", login),
        )
        .await?;
    let login = tokens.login;
    let user_tokens = tokens
        .user_tokens
        .into_iter()
        .map(|token| user_token(&login, token))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((login, user_tokens))
}

#[async_trait]
impl DataSource for UserTokensDataSource {
    type State<'a> = UserTokensState;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(UserTokensState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        if matches!(&config.login_name, Value::Value(login) if login.is_empty()) {
            diags.error_short(
                "`login_name` must not be empty, leave it unset for the current user",
                AttributePath::new("login_name"),
            );
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
        let (login, tokens) = fetch(&client, config.login_name.non_empty())
            .await
            .or_diagnostic(diags, "Failed to read user tokens")?;
        debug!(%login, count = tokens.len(), "Read user tokens");

        let mut state = config;
        state.id = Value::Value(login);
        state.user_tokens = Value::Value(tokens.into_iter().map(Value::Value).collect());
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::{DataSource, Diagnostics};
    use tf_provider::value::Value;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{date_of, UserToken, UserTokensDataSource, UserTokensState};
    use crate::client::testing::handle;

    #[tokio::test]
    async fn empty_login_is_invalid() {
        let server = MockServer::start().await;
        let data_source = UserTokensDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let config = UserTokensState {
            login_name: Value::Value(String::new()),
            ..Default::default()
        };
        assert!(data_source.validate(&mut diags, config).await.is_none());
        assert_eq!(diags.errors.len(), 1);

        let mut diags = Diagnostics::default();
        assert!(data_source
            .validate(&mut diags, UserTokensState::default())
            .await
            .is_some());
    }

    #[test]
    fn dates_keep_their_offset() {
        assert_eq!(
            date_of("2024-03-01T10:24:05+0100").unwrap(),
            Value::Value("2024-03-01".into())
        );
        assert_eq!(
            date_of("2024-03-01T23:30:00-0500").unwrap(),
            Value::Value("2024-03-01".into())
        );
        assert_eq!(date_of("").unwrap(), Value::Null);
        assert!(date_of("2024-03-01").is_err());
    }

    #[tokio::test]
    async fn list_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user_tokens/search"))
            .and(query_param("login", "jdoe"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"login":"jdoe","userTokens":[
                    {"name":"ci","type":"PROJECT_ANALYSIS_TOKEN","createdAt":"2024-01-05T09:00:00+0000","expirationDate":"2025-01-05T00:00:00+0000","project":{"key":"api","name":"API"}},
                    {"name":"laptop","type":"USER_TOKEN","createdAt":"2023-11-20T18:12:41+0100"}
                ]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let data_source = UserTokensDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let config = UserTokensState {
            login_name: Value::Value("jdoe".into()),
            ..Default::default()
        };
        let state = data_source
            .read(&mut diags, config, Default::default())
            .await
            .unwrap();
        assert!(diags.errors.is_empty(), "{diags:?}");
        assert_eq!(state.id, Value::Value("jdoe".into()));
        assert_eq!(
            state.user_tokens,
            Value::Value(vec![
                Value::Value(UserToken {
                    id: Value::Value("jdoe/ci".into()),
                    name: Value::Value("ci".into()),
                    token_type: Value::Value("PROJECT_ANALYSIS_TOKEN".into()),
                    created_at: Value::Value("2024-01-05".into()),
                    expiration_date: Value::Value("2025-01-05".into()),
                    project_key: Value::Value("api".into()),
                }),
                Value::Value(UserToken {
                    id: Value::Value("jdoe/laptop".into()),
                    name: Value::Value("laptop".into()),
                    token_type: Value::Value("USER_TOKEN".into()),
                    created_at: Value::Value("2023-11-20".into()),
                    expiration_date: Value::Null,
                    project_key: Value::Null,
                }),
            ])
        );
    }

    #[tokio::test]
    async fn current_user_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user_tokens/search"))
            .and(query_param_is_missing("login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"login":"admin","userTokens":[]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let data_source = UserTokensDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, UserTokensState::default(), Default::default())
            .await
            .unwrap();
        assert_eq!(state.id, Value::Value("admin".into()));
        assert_eq!(state.user_tokens, Value::Value(vec![]));
    }

    #[tokio::test]
    async fn malformed_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user_tokens/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"login":"admin","userTokens":[{"name":"ci","createdAt":"yesterday"}]}"#,
            ))
            .mount(&server)
            .await;

        let data_source = UserTokensDataSource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, UserTokensState::default(), Default::default())
            .await;
        assert!(state.is_none());
        assert_eq!(diags.errors.len(), 1);
    }
}
