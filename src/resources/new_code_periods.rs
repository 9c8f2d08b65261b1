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

use std::fmt::Display;
use std::str::FromStr;

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

/// `sonarqube_new_code_periods`: new code definition of the instance, a project or a branch
#[derive(Debug, Clone)]
pub struct NewCodePeriodResource {
    client: ClientHandle,
}

impl NewCodePeriodResource {
    pub fn new(client: ClientHandle) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NewCodePeriodState {
    pub id: Value<String>,
    pub branch: Value<String>,
    pub project: Value<String>,
    #[serde(rename = "type")]
    pub period_type: Value<String>,
    pub value: Value<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    SpecificAnalysis,
    PreviousVersion,
    NumberOfDays,
    ReferenceBranch,
}

impl PeriodType {
    const ALL: [PeriodType; 4] = [
        PeriodType::SpecificAnalysis,
        PeriodType::PreviousVersion,
        PeriodType::NumberOfDays,
        PeriodType::ReferenceBranch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::SpecificAnalysis => "SPECIFIC_ANALYSIS",
            PeriodType::PreviousVersion => "PREVIOUS_VERSION",
            PeriodType::NumberOfDays => "NUMBER_OF_DAYS",
            PeriodType::ReferenceBranch => "REFERENCE_BRANCH",
        }
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|period_type| period_type.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "`{}` is not one of {}",
                    s,
                    Self::ALL.map(PeriodType::as_str).join(", ")
                )
            })
    }
}

impl Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WithSchema for NewCodePeriodState {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Scope of the new code period"),
                        constraint: AttributeConstraint::Computed,
                        ..Default::default()
                    },
                    "branch" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Branch the new code period applies to, requires `project`"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                    "project" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Project the new code period applies to"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                    "type" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain(
                            "One of SPECIFIC_ANALYSIS, PREVIOUS_VERSION, NUMBER_OF_DAYS, REFERENCE_BRANCH",
                        ),
                        constraint: AttributeConstraint::Required,
                        ..Default::default()
                    },
                    "value" => Attribute {
                        attr_type: AttributeType::String,
                        description: Description::plain("Analysis key, number of days, or reference branch"),
                        constraint: AttributeConstraint::Optional,
                        ..Default::default()
                    },
                },
                description: Description::plain("SonarQube new code period"),
                ..Default::default()
            },
        }
    }
}

impl NewCodePeriodState {
    /// `newCodePeriod[/branch][/project]`
    fn scope_id(&self) -> String {
        let mut id = String::from("newCodePeriod");
        for part in [self.branch.non_empty(), self.project.non_empty()]
            .into_iter()
            .flatten()
        {
            id.push('/');
            id.push_str(part);
        }
        id
    }

    fn scope_query(&self) -> Query {
        Query::new()
            .with_opt("branch", self.branch.non_empty())
            .with_opt("project", self.project.non_empty())
    }

    /// Check the combination of type, value and scope
    ///
    /// Unknown attributes are skipped.
    fn check(&self, diags: &mut Diagnostics) {
        if self.period_type.is_unknown() || self.value.is_unknown() {
            return;
        }
        let period_type = match self.period_type.or_empty().parse::<PeriodType>() {
            Ok(period_type) => period_type,
            Err(err) => {
                diags.error_short(err, AttributePath::new("type"));
                return;
            }
        };
        let value = self.value.non_empty();
        match (period_type, value) {
            (PeriodType::PreviousVersion, Some(_)) => diags.error_short(
                "`value` must not be set for PREVIOUS_VERSION",
                AttributePath::new("value"),
            ),
            (PeriodType::PreviousVersion, None) => (),
            (_, None) => diags.error_short(
                format!("`value` is required for {}", period_type),
                AttributePath::new("value"),
            ),
            (PeriodType::NumberOfDays, Some(days))
                if !days.chars().all(|c| c.is_ascii_digit()) =>
            {
                diags.error_short(
                    "`value` must be a number of days for NUMBER_OF_DAYS",
                    AttributePath::new("value"),
                )
            }
            _ => (),
        }

        if self.branch.is_unknown() || self.project.is_unknown() {
            return;
        }
        let branch = self.branch.non_empty();
        let project = self.project.non_empty();
        if branch.is_some() && project.is_none() {
            diags.error_short("`branch` requires `project`", AttributePath::new("project"));
        }
        match period_type {
            PeriodType::SpecificAnalysis if branch.is_none() => diags.error_short(
                "`branch` is required for SPECIFIC_ANALYSIS",
                AttributePath::new("branch"),
            ),
            PeriodType::ReferenceBranch if branch.is_none() && project.is_none() => diags
                .error_short(
                    "`branch` or `project` is required for REFERENCE_BRANCH",
                    AttributePath::new("project"),
                ),
            _ => (),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewCodePeriod {
    #[serde(default)]
    project_key: String,
    #[serde(default)]
    branch_key: String,
    #[serde(rename = "type")]
    period_type: String,
    #[serde(default)]
    value: String,
}

async fn fetch(client: &Client, state: &NewCodePeriodState) -> Result<NewCodePeriodState, Error> {
    let period: NewCodePeriod = client
        .get("api/new_code_periods/show", &state.scope_query())
        .await?;

    if period.branch_key != state.branch.or_empty() || period.project_key != state.project.or_empty()
    {
        return Err(Error::not_found("New code period", state.scope_id()));
    }
    let value = match period.period_type.as_str() {
        "PREVIOUS_VERSION" => Value::Null,
        _ => value_or_null(period.value),
    };
    Ok(NewCodePeriodState {
        id: Value::Value(state.scope_id()),
        branch: state.branch.clone(),
        project: state.project.clone(),
        period_type: Value::Value(period.period_type),
        value,
    })
}

async fn set(client: &Client, state: &NewCodePeriodState) -> Result<NewCodePeriodState, Error> {
    debug!(
        scope = %state.scope_id(),
        period_type = state.period_type.or_empty(),
        "Setting new code period"
    );
    let query = Query::new()
        .with("type", state.period_type.or_empty())
        .with_opt("branch", state.branch.non_empty())
        .with_opt("project", state.project.non_empty())
        .with_opt("value", state.value.non_empty());
    client
        .post("api/new_code_periods/set", &query, StatusCode::OK)
        .await?;
    fetch(client, state).await
}

#[async_trait]
impl Resource for NewCodePeriodResource {
    type State<'a> = NewCodePeriodState;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(NewCodePeriodState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        config.check(diags);
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
        let state = fetch(&client, &state)
            .await
            .or_diagnostic(diags, "Failed to read new code period")?;
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
        state.id = if state.branch.is_unknown() || state.project.is_unknown() {
            Value::Unknown
        } else {
            Value::Value(state.scope_id())
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
        replace_on_change(
            &mut trigger_replace,
            "branch",
            &prior_state.branch,
            &proposed_state.branch,
        );
        replace_on_change(
            &mut trigger_replace,
            "project",
            &prior_state.project,
            &proposed_state.project,
        );
        let mut state = proposed_state;
        state.id = if trigger_replace.is_empty() {
            prior_state.id
        } else if state.branch.is_unknown() || state.project.is_unknown() {
            Value::Unknown
        } else {
            Value::Value(state.scope_id())
        };
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
        let state = set(&client, &planned_state)
            .await
            .or_diagnostic(diags, "Failed to set new code period")?;
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
        let state = set(&client, &planned_state)
            .await
            .or_diagnostic(diags, "Failed to update new code period")?;
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
        debug!(scope = %prior_state.scope_id(), "Unsetting new code period");
        client
            .post(
                "api/new_code_periods/unset",
                &prior_state.scope_query(),
                StatusCode::OK,
            )
            .await
            .or_diagnostic(diags, "Failed to unset new code period")
    }
}

#[cfg(test)]
mod tests {
    use tf_provider::{Diagnostics, Resource};
    use tf_provider::value::Value;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{NewCodePeriodResource, NewCodePeriodState};
    use crate::client::testing::handle;

    fn config(period_type: &str, value: Option<&str>, branch: Option<&str>, project: Option<&str>) -> NewCodePeriodState {
        let opt = |s: Option<&str>| s.map_or(Value::Null, |s| Value::Value(s.to_owned()));
        NewCodePeriodState {
            id: Value::Null,
            branch: opt(branch),
            project: opt(project),
            period_type: Value::Value(period_type.to_owned()),
            value: opt(value),
        }
    }

    fn errors(state: NewCodePeriodState) -> usize {
        let mut diags = Diagnostics::default();
        state.check(&mut diags);
        diags.errors.len()
    }

    #[test]
    fn validation() {
        assert_eq!(errors(config("PREVIOUS_VERSION", None, None, None)), 0);
        assert_eq!(errors(config("PREVIOUS_VERSION", Some("1"), None, None)), 1);
        assert_eq!(errors(config("NUMBER_OF_DAYS", Some("30"), None, Some("p"))), 0);
        assert_eq!(errors(config("NUMBER_OF_DAYS", Some("30d"), None, None)), 1);
        assert_eq!(errors(config("NUMBER_OF_DAYS", None, None, None)), 1);
        assert_eq!(errors(config("SPECIFIC_ANALYSIS", Some("AX-1"), None, Some("p"))), 1);
        assert_eq!(errors(config("SPECIFIC_ANALYSIS", Some("AX-1"), Some("main"), Some("p"))), 0);
        assert_eq!(errors(config("REFERENCE_BRANCH", Some("main"), None, None)), 1);
        assert_eq!(errors(config("REFERENCE_BRANCH", Some("main"), None, Some("p"))), 0);
        assert_eq!(errors(config("REFERENCE_BRANCH", Some("main"), Some("dev"), None)), 1);
        assert_eq!(errors(config("LAST_WEEK", Some("7"), None, None)), 1);
    }

    #[test]
    fn unknown_values_are_not_checked() {
        let mut state = config("NUMBER_OF_DAYS", None, None, None);
        state.value = Value::Unknown;
        assert_eq!(errors(state), 0);
    }

    #[test]
    fn scope_id() {
        assert_eq!(config("PREVIOUS_VERSION", None, None, None).scope_id(), "newCodePeriod");
        assert_eq!(
            config("PREVIOUS_VERSION", None, Some("dev"), Some("p")).scope_id(),
            "newCodePeriod/dev/p"
        );
    }

    #[tokio::test]
    async fn set_project_period() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/new_code_periods/set"))
            .and(query_param("type", "NUMBER_OF_DAYS"))
            .and(query_param("project", "p"))
            .and(query_param("value", "30"))
            .and(query_param_is_missing("branch"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/new_code_periods/show"))
            .and(query_param("project", "p"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"projectKey":"p","type":"NUMBER_OF_DAYS","value":"30","inherited":false}"#,
            ))
            .mount(&server)
            .await;

        let resource = NewCodePeriodResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let planned = config("NUMBER_OF_DAYS", Some("30"), None, Some("p"));
        let (state, _) = resource
            .create(
                &mut diags,
                planned.clone(),
                planned,
                Default::default(),
                Default::default(),
            )
            .await
            .unwrap();
        assert!(diags.errors.is_empty(), "{diags:?}");
        assert_eq!(state.id, Value::Value("newCodePeriod/p".into()));
        assert_eq!(state.value, Value::Value("30".into()));
    }

    #[tokio::test]
    async fn inherited_scope_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/new_code_periods/show"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"type":"PREVIOUS_VERSION","inherited":true}"#,
            ))
            .mount(&server)
            .await;

        let resource = NewCodePeriodResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let state = config("PREVIOUS_VERSION", None, None, Some("p"));
        assert!(resource
            .read(&mut diags, state, Default::default(), Default::default())
            .await
            .is_none());
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn unset_branch_period() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/new_code_periods/unset"))
            .and(query_param("branch", "dev"))
            .and(query_param("project", "p"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let resource = NewCodePeriodResource::new(handle(&server));
        let mut diags = Diagnostics::default();
        let state = config("SPECIFIC_ANALYSIS", Some("AX-1"), Some("dev"), Some("p"));
        assert!(resource
            .destroy(&mut diags, state, Default::default(), Default::default())
            .await
            .is_some());
    }
}
