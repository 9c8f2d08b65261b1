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

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Error raised while talking to a SonarQube server
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid SonarQube url `{url}`: {reason}")]
    Url { url: String, reason: String },
    #[error("Failed to build the http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Failed to call {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} answered {status} instead of {expected}: {message}")]
    Status {
        path: String,
        status: StatusCode,
        expected: StatusCode,
        message: String,
    },
    #[error("Failed to decode the response of {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid SonarQube version `{0}`")]
    Version(String),
    #[error("{kind} `{key}` was not found")]
    NotFound { kind: &'static str, key: String },
    #[error("{0}")]
    Unsupported(String),
    #[error("Invalid date `{value}`: {source}")]
    Date {
        value: String,
        #[source]
        source: time::error::Parse,
    },
}

impl Error {
    pub fn not_found<K: Into<String>>(kind: &'static str, key: K) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    msg: String,
}

/// Extract the human readable message from a SonarQube error body
///
/// SonarQube answers `{"errors":[{"msg":"..."}]}` on failures. When the body
/// has another shape, it is returned as is.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|err| err.msg)
            .collect::<Vec<_>>()
            .join(", "),
        _ => body.trim().to_owned(),
    }
}
