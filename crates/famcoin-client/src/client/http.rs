//! HTTP layer: status mapping, bounded retry, credential renewal.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{Credentials, Session};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::types::{AuthResponse, RefreshRequest};

use super::helpers::parse_error_message;

/// One logical API call. Cloned per attempt.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<serde_json::Value>,
    pub retries: u32,
    /// Renew credentials once on 401. Off for the auth endpoints themselves.
    pub renew_on_401: bool,
}

impl ApiRequest {
    pub(crate) fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retries: 0,
            renew_on_401: true,
        }
    }

    pub(crate) fn query(mut self, query: Vec<(&'static str, String)>) -> Self {
        self.query = query;
        self
    }

    pub(crate) fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ClientResult<Self> {
        let value = serde_json::to_value(body).map_err(|e| ClientError::InvalidResponse {
            message: format!("failed to encode request body: {}", e),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub(crate) fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub(crate) fn without_renewal(mut self) -> Self {
        self.renew_on_401 = false;
        self
    }
}

/// HTTP backend for making requests (holds reqwest client, session, config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) session: Session,
    pub(crate) config: ClientConfig,
}

impl HttpBackend {
    /// Send and decode a JSON body.
    pub(crate) async fn json<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let response = self.send(&request).await?;
        response
            .json()
            .await
            .map_err(|e| body_error(e, &request.path))
    }

    /// Send and discard the body.
    pub(crate) async fn empty(&self, request: ApiRequest) -> ClientResult<()> {
        self.send(&request).await.map(|_| ())
    }

    /// Send with bearer credential; on 401 renew exactly once and retry once.
    pub(crate) async fn send(&self, request: &ApiRequest) -> ClientResult<reqwest::Response> {
        let token = self.session.access_token().await?;

        match self.send_with_retries(request, token.as_deref()).await {
            Err(err @ ClientError::Unauthorized { .. }) if request.renew_on_401 => {
                let renewed = self.renew(token.as_deref(), err).await?;
                debug!(path = %request.path, "retrying request with renewed credentials");
                self.send_with_retries(request, Some(&renewed)).await
            }
            other => other,
        }
    }

    async fn send_with_retries(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let mut retries = 0;

        loop {
            match self.send_once(request, token).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < request.retries => {
                    retries += 1;
                    let delay = self.config.retry_delay();

                    warn!(
                        error = %e,
                        path = %request.path,
                        retry = retries,
                        max_retries = request.retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_error_message(&body);

        match status {
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized {
                message: message.unwrap_or_else(|| "invalid or expired credential".to_string()),
            }),
            _ => Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }

    /// Renew the access credential using the stored refresh credential.
    ///
    /// Single-flight: a caller that waited on the lock while another renewal
    /// succeeded reuses the fresh token instead of refreshing again. Without a
    /// refresh credential the original error is returned; a failed refresh
    /// returns the refresh error. Both paths clear stored credentials.
    async fn renew(&self, failed_token: Option<&str>, original: ClientError) -> ClientResult<String> {
        let _guard = self.session.lock_renewal().await;
        let store = self.session.store();

        let current = store.credentials().await?;
        if let (Some(current), Some(failed)) = (&current, failed_token) {
            if current.access_token != failed {
                debug!("credentials renewed concurrently, reusing");
                return Ok(current.access_token.clone());
            }
        }

        let refresh_token = match current {
            Some(c) if !c.refresh_token.is_empty() => c.refresh_token,
            _ => {
                warn!("no refresh credential, signing out");
                store.clear().await?;
                return Err(original);
            }
        };

        match self.post_refresh(&refresh_token).await {
            Ok(response) => {
                store.set_credentials(Credentials::from(&response)).await?;
                if let Some(user) = response.user {
                    store.set_user(user).await?;
                }
                info!("renewed access credential");
                Ok(response.access_token)
            }
            Err(e) => {
                warn!(error = %e, "credential renewal failed, signing out");
                store.clear().await?;
                Err(e)
            }
        }
    }

    pub(crate) async fn post_refresh(&self, refresh_token: &str) -> ClientResult<AuthResponse> {
        let request = ApiRequest::new(Method::POST, "/auth/refresh")
            .json(&RefreshRequest { refresh_token })?
            .without_renewal();

        let response = self.send_once(&request, None).await?;
        response
            .json()
            .await
            .map_err(|e| body_error(e, "refresh"))
    }
}

/// Only a body that arrived and failed to parse is an invalid response; a
/// timeout or dropped connection while reading it keeps its own kind.
fn body_error(err: reqwest::Error, what: &str) -> ClientError {
    if err.is_decode() && !err.is_timeout() {
        ClientError::InvalidResponse {
            message: format!("failed to parse {} response: {}", what, err),
        }
    } else {
        ClientError::from(err)
    }
}
