//! Typed API client for the famcoin backend.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.
//! Reads use the configured query retry count, writes the mutation retry count.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use tracing::debug;

use crate::auth::{CredentialStore, MemoryCredentialStore, Session};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::types::{
    AmountRequest, AuthResponse, AvatarRequest, CreateChildRequest, CreateRedemptionRequest,
    CreateRewardRequest, CreateTaskRequest, Gamification, LoginRequest, Notification,
    RegisterRequest, Redemption, RedemptionStatus, RejectRedemptionRequest, RejectTaskRequest,
    Reward, Savings, Task, TaskAssignment, Transaction, User, Wallet,
};

mod helpers;
mod http;

use helpers::child_query;
use http::{ApiRequest, HttpBackend};

pub const CLIENT_USER_AGENT: &str = concat!("famcoin-client/", env!("CARGO_PKG_VERSION"));

/// API client. Cheap to clone; clones share the connection pool and session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpBackend,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_store(config, Arc::new(MemoryCredentialStore::from_env()))
    }

    pub fn with_store(config: ClientConfig, store: Arc<dyn CredentialStore>) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(default_headers)
            .build()
            .map_err(|e| ClientError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = config.url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::Config {
                message: format!("API URL must be http(s): {}", config.url),
            });
        }

        Ok(Self {
            http: HttpBackend {
                client,
                base_url,
                session: Session::new(store),
                config,
            },
        })
    }

    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }

    pub fn session(&self) -> &Session {
        &self.http.session
    }

    fn read(&self, path: impl Into<String>) -> ApiRequest {
        ApiRequest::new(Method::GET, path).retries(self.http.config.query_retries)
    }

    fn write(&self, method: Method, path: impl Into<String>) -> ApiRequest {
        ApiRequest::new(method, path).retries(self.http.config.mutation_retries)
    }

    // ---- auth ----

    /// Sign in and persist the credential pair and user.
    pub async fn login(&self, request: &LoginRequest) -> ClientResult<AuthResponse> {
        debug!(email = %request.email, "logging in");
        let req = self
            .write(Method::POST, "/auth/login")
            .json(request)?
            .without_renewal();
        let response: AuthResponse = self.http.json(req).await?;
        self.http.session.save(&response).await?;
        Ok(response)
    }

    /// Register a parent account and persist the credential pair and user.
    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<AuthResponse> {
        debug!(email = %request.email, "registering parent account");
        let req = self
            .write(Method::POST, "/auth/register")
            .json(request)?
            .without_renewal();
        let response: AuthResponse = self.http.json(req).await?;
        self.http.session.save(&response).await?;
        Ok(response)
    }

    /// Explicit refresh with a given refresh credential; persists the result.
    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<AuthResponse> {
        let response = self.http.post_refresh(refresh_token).await?;
        self.http.session.save(&response).await?;
        Ok(response)
    }

    /// Clear stored credentials and user.
    pub async fn logout(&self) -> ClientResult<()> {
        debug!("logging out");
        self.http.session.clear().await
    }

    pub async fn me(&self) -> ClientResult<User> {
        let user: User = self.http.json(self.read("/users/me")).await?;
        self.http.session.store().set_user(user.clone()).await?;
        Ok(user)
    }

    // ---- users / children ----

    pub async fn create_child(&self, request: &CreateChildRequest) -> ClientResult<User> {
        let req = self.write(Method::POST, "/users/children").json(request)?;
        self.http.json(req).await
    }

    pub async fn list_children(&self) -> ClientResult<Vec<User>> {
        self.http.json(self.read("/users/children")).await
    }

    pub async fn delete_child(&self, child_id: &str) -> ClientResult<()> {
        let req = self.write(Method::DELETE, format!("/users/children/{}", child_id));
        self.http.empty(req).await
    }

    pub async fn update_avatar(&self, avatar_url: &str) -> ClientResult<User> {
        let req = self
            .write(Method::PATCH, "/users/avatar")
            .json(&AvatarRequest { avatar_url })?;
        self.http.json(req).await
    }

    // ---- tasks ----

    pub async fn create_task(&self, request: &CreateTaskRequest) -> ClientResult<Task> {
        let req = self.write(Method::POST, "/tasks").json(request)?;
        self.http.json(req).await
    }

    /// Parents see every assignment in the family, children only their own.
    pub async fn list_tasks(&self) -> ClientResult<Vec<TaskAssignment>> {
        self.http.json(self.read("/tasks")).await
    }

    pub async fn complete_task(&self, assignment_id: &str) -> ClientResult<TaskAssignment> {
        self.task_action(assignment_id, "complete").await
    }

    pub async fn approve_task(&self, assignment_id: &str) -> ClientResult<TaskAssignment> {
        self.task_action(assignment_id, "approve").await
    }

    pub async fn reject_task(
        &self,
        assignment_id: &str,
        reason: &str,
    ) -> ClientResult<TaskAssignment> {
        let req = self
            .write(Method::POST, format!("/tasks/{}/reject", assignment_id))
            .json(&RejectTaskRequest {
                rejection_reason: reason,
            })?;
        self.http.json(req).await
    }

    pub async fn retry_task(&self, assignment_id: &str) -> ClientResult<TaskAssignment> {
        self.task_action(assignment_id, "retry").await
    }

    pub async fn delete_task(&self, assignment_id: &str) -> ClientResult<()> {
        let req = self.write(Method::DELETE, format!("/tasks/{}", assignment_id));
        self.http.empty(req).await
    }

    async fn task_action(&self, assignment_id: &str, action: &str) -> ClientResult<TaskAssignment> {
        let req = self.write(Method::POST, format!("/tasks/{}/{}", assignment_id, action));
        self.http.json(req).await
    }

    // ---- rewards ----

    pub async fn create_reward(&self, request: &CreateRewardRequest) -> ClientResult<Reward> {
        let req = self.write(Method::POST, "/rewards").json(request)?;
        self.http.json(req).await
    }

    pub async fn list_rewards(&self, active_only: Option<bool>) -> ClientResult<Vec<Reward>> {
        let query = active_only
            .map(|a| vec![("activeOnly", a.to_string())])
            .unwrap_or_default();
        self.http.json(self.read("/rewards").query(query)).await
    }

    pub async fn toggle_reward(&self, reward_id: &str) -> ClientResult<Reward> {
        let req = self.write(Method::PATCH, format!("/rewards/{}/toggle", reward_id));
        self.http.json(req).await
    }

    pub async fn delete_reward(&self, reward_id: &str) -> ClientResult<()> {
        let req = self.write(Method::DELETE, format!("/rewards/{}", reward_id));
        self.http.empty(req).await
    }

    // ---- redemptions ----

    pub async fn request_redemption(&self, reward_id: &str) -> ClientResult<Redemption> {
        let req = self
            .write(Method::POST, "/rewards/redemptions")
            .json(&CreateRedemptionRequest { reward_id })?;
        self.http.json(req).await
    }

    pub async fn list_redemptions(
        &self,
        status: Option<RedemptionStatus>,
    ) -> ClientResult<Vec<Redemption>> {
        let query = status
            .map(|s| vec![("status", s.as_str().to_string())])
            .unwrap_or_default();
        self.http
            .json(self.read("/rewards/redemptions").query(query))
            .await
    }

    pub async fn approve_redemption(&self, redemption_id: &str) -> ClientResult<Redemption> {
        let req = self.write(
            Method::POST,
            format!("/rewards/redemptions/{}/approve", redemption_id),
        );
        self.http.json(req).await
    }

    pub async fn reject_redemption(
        &self,
        redemption_id: &str,
        reason: &str,
    ) -> ClientResult<Redemption> {
        let req = self
            .write(
                Method::POST,
                format!("/rewards/redemptions/{}/reject", redemption_id),
            )
            .json(&RejectRedemptionRequest {
                rejection_reason: reason,
            })?;
        self.http.json(req).await
    }

    // ---- wallet / savings ----

    pub async fn wallet(&self, child_id: Option<&str>) -> ClientResult<Wallet> {
        self.http
            .json(self.read("/wallet").query(child_query(child_id)))
            .await
    }

    pub async fn transactions(
        &self,
        child_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> ClientResult<Vec<Transaction>> {
        let mut query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        query.extend(child_query(child_id));
        self.http
            .json(self.read("/wallet/transactions").query(query))
            .await
    }

    pub async fn savings(&self, child_id: Option<&str>) -> ClientResult<Savings> {
        self.http
            .json(self.read("/savings").query(child_query(child_id)))
            .await
    }

    pub async fn deposit_savings(&self, amount: i64, child_id: Option<&str>) -> ClientResult<Savings> {
        self.savings_move("/savings/deposit", amount, child_id).await
    }

    pub async fn withdraw_savings(
        &self,
        amount: i64,
        child_id: Option<&str>,
    ) -> ClientResult<Savings> {
        self.savings_move("/savings/withdraw", amount, child_id).await
    }

    async fn savings_move(
        &self,
        path: &str,
        amount: i64,
        child_id: Option<&str>,
    ) -> ClientResult<Savings> {
        let req = self
            .write(Method::POST, path)
            .query(child_query(child_id))
            .json(&AmountRequest { amount })?;
        self.http.json(req).await
    }

    // ---- gamification ----

    pub async fn gamification(&self, child_id: Option<&str>) -> ClientResult<Gamification> {
        self.http
            .json(self.read("/gamification").query(child_query(child_id)))
            .await
    }

    // ---- notifications ----

    pub async fn notifications(&self) -> ClientResult<Vec<Notification>> {
        self.http.json(self.read("/notifications")).await
    }

    pub async fn unread_count(&self) -> ClientResult<u64> {
        self.http.json(self.read("/notifications/unread-count")).await
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> ClientResult<()> {
        let req = self.write(
            Method::PATCH,
            format!("/notifications/{}/read", notification_id),
        );
        self.http.empty(req).await
    }

    pub async fn mark_all_notifications_read(&self) -> ClientResult<()> {
        let req = self.write(Method::PATCH, "/notifications/read-all");
        self.http.empty(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_url() {
        let config = ClientConfig::default().with_url("ftp://famcoin.test");
        let result = ApiClient::with_store(config, Arc::new(MemoryCredentialStore::new()));
        assert!(matches!(result, Err(ClientError::Config { .. })));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let config = ClientConfig::default().with_url("https://famcoin.test/api/");
        let client = ApiClient::with_store(config, Arc::new(MemoryCredentialStore::new())).unwrap();
        assert_eq!(client.base_url(), "https://famcoin.test/api");
    }
}
