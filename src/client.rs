use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::config::{AuthConfig, Config, OrgConfig};
use crate::error::{PortalError, Result};
use crate::http::{self, format_request_error, ResponseData};

const ACCEPT: &str = "application/json, text/plain, */*";
const ORG_HEADER: &str = "X-Apigee-Org";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<Value>,
    error_description: Option<Value>,
}

/// Identity providers are not consistent about the shape of `error`.
fn render_error_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// REST client for one organization's portal APIs.
///
/// Logs in lazily on the first request and reuses the bearer token for the
/// rest of the run. Concurrent first requests share a single login; a failed
/// login is remembered too, so it is never retried.
pub struct PortalClient {
    http: Client,
    org: OrgConfig,
    auth: AuthConfig,
    base_url: String,
    login_timeout: Duration,
    token: OnceCell<std::result::Result<String, String>>,
    limiter: Option<Arc<Semaphore>>,
    cancel: CancelSignal,
}

impl PortalClient {
    /// Fails before any network activity unless `org` points at the supported
    /// cloud control plane with complete credentials.
    pub fn new(
        config: &Config,
        org: &OrgConfig,
        section: &str,
        cancel: CancelSignal,
    ) -> Result<Self> {
        org.check(section)?;
        let http = http::build_client(config)?;
        Ok(Self::from_parts(
            http,
            org.clone(),
            config.auth.clone(),
            &org.portal_url,
            Duration::from_secs(config.http.login_timeout),
            config.export.max_concurrency,
            cancel,
        ))
    }

    fn from_parts(
        http: Client,
        org: OrgConfig,
        auth: AuthConfig,
        base_url: &str,
        login_timeout: Duration,
        max_concurrency: usize,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            http,
            org,
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
            login_timeout,
            token: OnceCell::new(),
            limiter: (max_concurrency > 0).then(|| Arc::new(Semaphore::new(max_concurrency))),
            cancel,
        }
    }

    pub fn org(&self) -> &str {
        &self.org.org
    }

    pub async fn ensure_token(&self) -> Result<String> {
        self.token
            .get_or_init(|| async {
                self.login().await.map_err(|e| match e {
                    PortalError::Auth(message) => message,
                    other => other.to_string(),
                })
            })
            .await
            .clone()
            .map_err(PortalError::Auth)
    }

    async fn login(&self) -> Result<String> {
        info!(org = %self.org.org, user = %self.org.username, "requesting access token");

        let form = [
            ("username", self.org.username.as_str()),
            ("password", self.org.password.as_str()),
            ("grant_type", "password"),
        ];
        let response = self
            .http
            .post(&self.auth.login_url)
            .header("Accept", "application/json")
            .basic_auth(&self.auth.client_id, Some(&self.auth.client_secret))
            .form(&form)
            .timeout(self.login_timeout)
            .send()
            .await
            .map_err(|e| PortalError::Auth(format_request_error(e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| PortalError::Auth(format_request_error(e)))?;
        let token: TokenResponse = serde_json::from_slice(&body).map_err(|_| {
            PortalError::Auth(format!("login returned HTTP {} with a non-JSON body", status))
        })?;

        if let Some(error) = token.error.filter(|e| !e.is_null()) {
            let error = render_error_field(&error);
            return Err(PortalError::Auth(
                match token.error_description.filter(|d| !d.is_null()) {
                    Some(description) => format!("{}: {}", error, render_error_field(&description)),
                    None => error,
                },
            ));
        }
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PortalError::Auth(format!("login returned HTTP {} without a token", status)))
    }

    /// Issue an authenticated request against the portal base URL and return
    /// the raw response. Interpreting the status and body is up to the caller.
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        headers: &[(&str, String)],
        body: Option<String>,
    ) -> Result<ResponseData> {
        if self.cancel.is_cancelled() {
            return Err(PortalError::Cancelled);
        }
        let request = async {
            let token = self.ensure_token().await?;

            let mut merged: Vec<(&str, String)> = headers.to_vec();
            if !merged.iter().any(|(k, _)| k.eq_ignore_ascii_case("accept")) {
                merged.push(("Accept", ACCEPT.to_string()));
            }
            merged.push((ORG_HEADER, self.org.org.clone()));
            merged.push(("Authorization", format!("Bearer {}", token)));

            let _permit = match self.limiter {
                Some(ref limiter) => Some(
                    limiter
                        .acquire()
                        .await
                        .map_err(|_| PortalError::Cancelled)?,
                ),
                None => None,
            };

            let url = format!("{}{}", self.base_url, path);
            let response = http::send_request(&self.http, method, &url, &merged, body)
                .await
                .map_err(PortalError::Transport)?;
            debug!(
                path,
                status = response.status,
                duration_ms = response.duration_ms,
                "portal request"
            );
            Ok::<_, PortalError>(response)
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PortalError::Cancelled),
            result = request => result,
        }
    }

    /// GET `path` and parse the body as JSON. Non-2xx statuses are errors.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.call(path, Method::GET, &[], None).await?;
        if !response.is_success() {
            return Err(PortalError::Status {
                status: response.status,
                path: path.to_string(),
            });
        }
        serde_json::from_slice(&response.body).map_err(|source| PortalError::Parse {
            path: path.to_string(),
            source,
        })
    }
}
