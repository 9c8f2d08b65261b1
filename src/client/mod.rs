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

//! SonarQube REST client shared by every resource and data source

use std::fmt::Debug;
use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use tf_provider::Diagnostics;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::version::ServerVersion;

mod error;

pub use error::Error;

/// Credentials used to authenticate against the server
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// User token, sent as the basic auth user with an empty password
    Token(String),
    /// Login and password
    Basic { user: String, pass: String },
    #[default]
    Anonymous,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(***)"),
            Credentials::Basic { user, .. } => write!(f, "Basic({}, ***)", user),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// URL-encoded query parameters of a request, in insertion order
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Query(Vec<(&'static str, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter
    pub fn with<V: Into<String>>(mut self, key: &'static str, value: V) -> Self {
        self.push(key, value);
        self
    }

    /// Append a parameter only if the value is present
    pub fn with_opt<V: Into<String>>(mut self, key: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    pub fn push<V: Into<String>>(&mut self, key: &'static str, value: V) -> &mut Self {
        self.0.push((key, value.into()));
        self
    }
}

/// Connection to a SonarQube server
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    edition: String,
    version: ServerVersion,
}

#[derive(Debug, Deserialize)]
struct NavigationGlobal {
    #[serde(default)]
    edition: Option<String>,
}

impl Client {
    /// Create a client for the server at `host`
    ///
    /// The edition defaults to `community` and the version is unknown until
    /// [`Client::with_server`] is called.
    pub fn new(host: &str, credentials: Credentials, insecure: bool) -> Result<Self, Error> {
        let base_url = Url::parse(host).map_err(|err| Error::Url {
            url: host.to_owned(),
            reason: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Url {
                url: host.to_owned(),
                reason: "not a base url".to_owned(),
            });
        }
        if insecure {
            warn!(%host, "TLS certificate verification is disabled");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("terraform-provider-sonarqube/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            http,
            base_url,
            credentials,
            edition: "community".to_owned(),
            version: ServerVersion::default(),
        })
    }

    /// Record the edition and version of the server
    pub fn with_server(mut self, edition: String, version: ServerVersion) -> Self {
        self.edition = edition;
        self.version = version;
        self
    }

    /// Edition of the server (`community`, `developer`, `enterprise`, `datacenter`)
    pub fn edition(&self) -> &str {
        &self.edition
    }

    pub fn version(&self) -> &ServerVersion {
        &self.version
    }

    /// Query the server version from `/api/server/version`
    pub async fn fetch_version(&self) -> Result<ServerVersion, Error> {
        const PATH: &str = "api/server/version";
        let response = self
            .send(Method::GET, PATH, &Query::new(), StatusCode::OK)
            .await?;
        let body = response.text().await.map_err(|source| Error::Transport {
            path: PATH.to_owned(),
            source,
        })?;
        body.parse()
    }

    /// Query the server edition from `/api/navigation/global`
    pub async fn fetch_edition(&self) -> Result<String, Error> {
        let global: NavigationGlobal = self.get("api/navigation/global", &Query::new()).await?;
        Ok(global.edition.unwrap_or_else(|| "community".to_owned()))
    }

    /// GET `path` and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T, Error> {
        let response = self.send(Method::GET, path, query, StatusCode::OK).await?;
        decode(path, response).await
    }

    /// POST `path` and discard the body
    pub async fn post(&self, path: &str, query: &Query, expected: StatusCode) -> Result<(), Error> {
        self.send(Method::POST, path, query, expected).await?;
        Ok(())
    }

    /// POST `path` and decode the JSON body
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
        expected: StatusCode,
    ) -> Result<T, Error> {
        let response = self.send(Method::POST, path, query, expected).await?;
        decode(path, response).await
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let full_path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&full_path);
        url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        expected: StatusCode,
    ) -> Result<reqwest::Response, Error> {
        let url = self.url(path);
        debug!(%method, %url, params = ?query.0.iter().map(|(k, _)| *k).collect::<Vec<_>>(), "Calling SonarQube");

        let mut request = self.http.request(method, url).query(&query.0);
        request = match &self.credentials {
            Credentials::Token(token) => request.basic_auth(token, Option::<&str>::None),
            Credentials::Basic { user, pass } => request.basic_auth(user, Some(pass)),
            Credentials::Anonymous => request,
        };

        let response = request.send().await.map_err(|source| Error::Transport {
            path: path.to_owned(),
            source,
        })?;

        let status = response.status();
        if status != expected {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                path: path.to_owned(),
                status,
                expected,
                message: error::error_message(&body),
            });
        }
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T, Error> {
    let body = response.text().await.map_err(|source| Error::Transport {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| Error::Decode {
        path: path.to_owned(),
        source,
    })
}

/// Shared slot holding the client once the provider has been configured
///
/// Resources are instantiated before `configure` runs, so they keep a handle
/// and resolve the client on every call.
#[derive(Debug, Clone, Default)]
pub struct ClientHandle(Arc<RwLock<Option<Arc<Client>>>>);

impl ClientHandle {
    /// Create a handle that is already configured
    #[cfg(test)]
    pub fn configured(client: Client) -> Self {
        Self(Arc::new(RwLock::new(Some(Arc::new(client)))))
    }

    pub async fn set(&self, client: Client) {
        *self.0.write().await = Some(Arc::new(client));
    }

    /// Get the client, or record an error if the provider is not configured
    pub async fn get(&self, diags: &mut Diagnostics) -> Option<Arc<Client>> {
        let client = self.0.read().await.clone();
        if client.is_none() {
            diags.root_error(
                "Provider is not configured",
                "The SonarQube provider must be configured before managing resources",
            );
        }
        client
    }
}


#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde::Deserialize;
    use wiremock::matchers::{basic_auth, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{Client, Credentials, Error, Query};

    #[derive(Debug, Deserialize)]
    struct Pong {
        value: String,
    }

    #[test]
    fn url_keeps_base_path() {
        let client = Client::new("https://sonar.example.com/sonar/", Credentials::default(), false)
            .unwrap();
        assert_eq!(
            client.url("api/webhooks/list").as_str(),
            "https://sonar.example.com/sonar/api/webhooks/list"
        );
        let client =
            Client::new("https://sonar.example.com", Credentials::default(), false).unwrap();
        assert_eq!(
            client.url("/api/webhooks/list").as_str(),
            "https://sonar.example.com/api/webhooks/list"
        );
    }

    #[test]
    fn invalid_host() {
        assert!(matches!(
            Client::new("not a url", Credentials::default(), false),
            Err(Error::Url { .. })
        ));
    }

    #[tokio::test]
    async fn get_sends_query_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .and(query_param("q", "a b"))
            .and(basic_auth("squ_token", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"value":"pong"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            Client::new(&server.uri(), Credentials::Token("squ_token".into()), false).unwrap();
        let pong: Pong = client
            .get("api/ping", &Query::new().with("q", "a b"))
            .await
            .unwrap();
        assert_eq!(pong.value, "pong");
    }

    #[tokio::test]
    async fn unexpected_status_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/user_groups/delete"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(r#"{"errors":[{"msg":"No group with name 'foo'"}]}"#),
            )
            .mount(&server)
            .await;

        let client = Client::new(&server.uri(), Credentials::default(), false).unwrap();
        let err = client
            .post(
                "api/user_groups/delete",
                &Query::new().with("name", "foo"),
                StatusCode::NO_CONTENT,
            )
            .await
            .unwrap_err();
        match err {
            Error::Status {
                status, message, ..
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "No group with name 'foo'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = Client::new(&server.uri(), Credentials::default(), false).unwrap();
        let err = client
            .get::<Pong>("api/ping", &Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn discover_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/server/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string("10.4.1.88267"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/navigation/global"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"edition":"developer"}"#),
            )
            .mount(&server)
            .await;

        let client = Client::new(&server.uri(), Credentials::default(), false).unwrap();
        let version = client.fetch_version().await.unwrap();
        assert_eq!(version.to_string(), "10.4.1.88267");
        assert_eq!(client.fetch_edition().await.unwrap(), "developer");
    }
}
