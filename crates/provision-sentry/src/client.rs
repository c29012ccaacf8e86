use std::collections::HashSet;
use std::time::Duration;

use provision_core::{ProvisionError, SentryConfig};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LINK};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Project, ProjectKey, RuleSummary};

/// Bearer-authenticated client for the Sentry REST API.
///
/// All paths are relative to the configured API root
/// (`https://sentry.io/api/0` by default). Organization-scoped calls use the
/// organization from [`SentryConfig`].
///
/// # Examples
///
/// ```
/// use provision_core::SentryConfig;
/// use provision_sentry::SentryClient;
///
/// let config = SentryConfig {
///     auth_token: Some("sntrys_test".into()),
///     organization: Some("acme".into()),
///     ..SentryConfig::default()
/// };
/// let client = SentryClient::new(&config).unwrap();
/// assert_eq!(client.organization(), "acme");
/// ```
pub struct SentryClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    organization: String,
}

impl SentryClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Config`] if the token or organization is
    /// missing, or [`ProvisionError::Request`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &SentryConfig) -> Result<Self, ProvisionError> {
        let token = config.auth_token()?.to_string();
        let organization = config.organization()?.to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("sentry-provision/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            organization,
        })
    }

    /// Organization slug used for scoped paths.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Perform one request and fail on any non-2xx status.
    ///
    /// `cursor` is sent as the `cursor` query parameter when present.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Http`] for a non-success status (with the
    /// response body), or [`ProvisionError::Request`] on transport failure.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        cursor: Option<&str>,
    ) -> Result<Response, ProvisionError> {
        let url = format!("{}{path}", self.base_url);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, %url, cursor = ?cursor, "sending Sentry API request");
        let response = request
            .send()
            .await
            .map_err(|e| ProvisionError::Request(format!("{method} {url}: {e}")))?;

        let status = response.status();
        debug!(%method, %url, %status, "received Sentry API response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// `GET` a single JSON document.
    ///
    /// # Errors
    ///
    /// See [`SentryClient::send`]; also [`ProvisionError::Serialization`] if
    /// the body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProvisionError> {
        let response = self.send(Method::GET, path, None, None).await?;
        decode(response).await
    }

    /// `GET` a list endpoint, following `Link: rel="next"` cursors until the
    /// server reports no further results. Pages are concatenated in order.
    /// A cursor that was already followed ends the walk.
    ///
    /// # Errors
    ///
    /// Fails on the first page that fails; earlier pages are discarded.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, ProvisionError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let response = self
                .send(Method::GET, path, None, cursor.as_deref())
                .await?;
            let next = next_cursor(response.headers());
            let page: Vec<T> = decode(response).await?;
            debug!(path, page_len = page.len(), "fetched page");
            items.extend(page);

            let Some(next) = next else { break };
            if !seen.insert(next.clone()) {
                warn!(path, cursor = %next, "server repeated pagination cursor, stopping");
                break;
            }
            cursor = Some(next);
        }

        Ok(items)
    }

    /// `POST` a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// See [`SentryClient::send`].
    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ProvisionError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        let response = self.send(Method::POST, path, Some(&body), None).await?;
        decode(response).await
    }

    /// List every project visible to the token.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ProvisionError> {
        self.get_paginated("/projects/").await
    }

    /// List the issue alert rules of a project.
    pub async fn list_rules(&self, app: &str) -> Result<Vec<RuleSummary>, ProvisionError> {
        let path = format!("/projects/{}/{app}/rules/", self.organization);
        self.get_paginated(&path).await
    }

    /// Fetch one alert rule.
    pub async fn fetch_rule(&self, app: &str, rule_id: &str) -> Result<RuleSummary, ProvisionError> {
        let path = format!("/projects/{}/{app}/rules/{rule_id}/", self.organization);
        self.get_json(&path).await
    }

    /// Create an alert rule on a project.
    pub async fn create_rule<B>(&self, app: &str, payload: &B) -> Result<RuleSummary, ProvisionError>
    where
        B: Serialize + ?Sized,
    {
        let path = format!("/projects/{}/{app}/rules/", self.organization);
        self.post_json(&path, payload).await
    }

    /// Delete an alert rule.
    ///
    /// Returns `Ok(false)` when the API rejects the deletion (for example a
    /// rule that does not exist) instead of failing.
    ///
    /// # Errors
    ///
    /// Only transport failures are returned as errors.
    pub async fn delete_rule(&self, app: &str, rule_id: &str) -> Result<bool, ProvisionError> {
        let path = format!("/projects/{}/{app}/rules/{rule_id}/", self.organization);
        match self.send(Method::DELETE, &path, None, None).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_http() => {
                warn!(app, rule_id, error = %err, "failed to delete rule");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Create a project under `team`, with Sentry's default alert rules.
    pub async fn create_project(
        &self,
        team: &str,
        name: &str,
        platform: &str,
    ) -> Result<Project, ProvisionError> {
        let path = format!("/teams/{}/{team}/projects/", self.organization);
        let body = serde_json::json!({
            "name": name,
            "platform": platform,
            "default_rules": true,
        });
        self.post_json(&path, &body).await
    }

    /// List the client keys of a project.
    pub async fn list_keys(&self, app: &str) -> Result<Vec<ProjectKey>, ProvisionError> {
        let path = format!("/projects/{}/{app}/keys/", self.organization);
        self.get_paginated(&path).await
    }

    /// Create a new client key on a project.
    pub async fn create_key(&self, app: &str) -> Result<ProjectKey, ProvisionError> {
        let path = format!("/projects/{}/{app}/keys/", self.organization);
        self.post_json(&path, &serde_json::json!({})).await
    }

    /// Give `team` access to a project.
    pub async fn link_team(&self, app: &str, team: &str) -> Result<Project, ProvisionError> {
        let path = format!("/projects/{}/{app}/teams/{team}/", self.organization);
        self.post_json(&path, &serde_json::json!({})).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ProvisionError> {
    let text = response
        .text()
        .await
        .map_err(|e| ProvisionError::Request(format!("failed to read response: {e}")))?;
    Ok(serde_json::from_str(&text)?)
}

/// One entry of a `Link` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    /// Target URL.
    pub url: String,
    /// `rel` parameter (`next`, `previous`).
    pub rel: Option<String>,
    /// Sentry's `results` parameter: whether the target page has items.
    pub results: bool,
    /// Sentry's `cursor` parameter.
    pub cursor: Option<String>,
}

/// Parse a Sentry `Link` header.
///
/// # Examples
///
/// ```
/// use provision_sentry::client::parse_link_header;
///
/// let header = r#"<https://sentry.io/api/0/projects/?&cursor=0:0:1>; rel="previous"; results="false"; cursor="0:0:1", <https://sentry.io/api/0/projects/?&cursor=0:100:0>; rel="next"; results="true"; cursor="0:100:0""#;
/// let links = parse_link_header(header);
/// assert_eq!(links.len(), 2);
/// assert_eq!(links[1].rel.as_deref(), Some("next"));
/// assert!(links[1].results);
/// assert_eq!(links[1].cursor.as_deref(), Some("0:100:0"));
/// ```
pub fn parse_link_header(value: &str) -> Vec<LinkEntry> {
    value
        .split('<')
        .skip(1)
        .filter_map(|part| {
            let (url, params) = part.split_once('>')?;
            let mut entry = LinkEntry {
                url: url.trim().to_string(),
                rel: None,
                results: false,
                cursor: None,
            };
            for param in params.split(';') {
                let param = param.trim().trim_end_matches(',').trim();
                let Some((key, val)) = param.split_once('=') else {
                    continue;
                };
                let val = val.trim().trim_matches('"');
                match key.trim() {
                    "rel" => entry.rel = Some(val.to_string()),
                    "results" => entry.results = val.eq_ignore_ascii_case("true"),
                    "cursor" => entry.cursor = Some(val.to_string()),
                    _ => {}
                }
            }
            Some(entry)
        })
        .collect()
}

/// Cursor of the next page, if the server says it has results.
fn next_cursor(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;
    parse_link_header(value)
        .into_iter()
        .find(|link| link.rel.as_deref() == Some("next") && link.results)
        .and_then(|link| link.cursor)
}
