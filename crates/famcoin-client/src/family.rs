//! Domain facade: every read as a mounted query, every write as a mutation.
//!
//! [`FamilyClient`] pairs an [`ApiClient`] with a [`QueryCache`]. Reads return
//! a [`QueryObserver`] keyed by [`crate::keys`]; writes go through
//! [`QueryCache::mutate`] so the invalidation table in [`crate::mutation`]
//! is applied on success.

use std::time::Duration;

use tracing::{debug, info};

use crate::cache::{QueryCache, QueryObserver, QueryOptions};
use crate::client::ApiClient;
use crate::config::{CacheConfig, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::keys::{self, TaskFilter, TransactionPage};
use crate::mutation::Mutation;
use crate::types::{
    AuthResponse, CreateChildRequest, CreateRewardRequest, CreateTaskRequest, Gamification,
    LoginRequest, Notification, Redemption, RedemptionStatus, RegisterRequest, Reward, Savings,
    Task, TaskAssignment, Transaction, User, Wallet,
};

/// Current-user record freshness.
pub const CURRENT_USER_STALE_TIME: Duration = Duration::from_secs(10 * 60);

/// Unread badge freshness.
pub const UNREAD_COUNT_STALE_TIME: Duration = Duration::from_secs(30);

/// API client bound to a query cache.
#[derive(Debug, Clone)]
pub struct FamilyClient {
    api: ApiClient,
    cache: QueryCache,
}

impl FamilyClient {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    /// Client and cache from `FAMCOIN_*` environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Ok(Self::new(
            ApiClient::new(ClientConfig::from_env())?,
            QueryCache::new(CacheConfig::default()),
        ))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn polling(&self) -> QueryOptions {
        QueryOptions::default().with_refetch_interval(self.cache.config().poll_interval())
    }

    // ---- session ----

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<AuthResponse> {
        let response = self
            .api
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.seed_user(&response);
        Ok(response)
    }

    pub async fn register(&self, request: &RegisterRequest) -> ClientResult<AuthResponse> {
        let response = self.api.register(request).await?;
        self.seed_user(&response);
        Ok(response)
    }

    fn seed_user(&self, response: &AuthResponse) {
        if let Some(user) = &response.user {
            self.cache.set_query_data(&keys::current_user(), user.clone());
        }
    }

    /// Sign out: drop stored credentials and every cached query.
    pub async fn logout(&self) -> ClientResult<()> {
        self.api.logout().await?;
        self.cache.clear();
        info!("signed out");
        Ok(())
    }

    // ---- queries ----

    pub fn current_user(&self) -> QueryObserver<User> {
        let api = self.api.clone();
        QueryObserver::new(
            &self.cache,
            keys::current_user(),
            QueryOptions::default().with_stale_time(CURRENT_USER_STALE_TIME),
            move || {
                let api = api.clone();
                async move { api.me().await }
            },
        )
    }

    pub fn children(&self) -> QueryObserver<Vec<User>> {
        let api = self.api.clone();
        QueryObserver::new(
            &self.cache,
            keys::children(),
            QueryOptions::default(),
            move || {
                let api = api.clone();
                async move { api.list_children().await }
            },
        )
    }

    /// Task assignments matching `filter`, polled while mounted.
    ///
    /// The endpoint returns every visible assignment; the filter is applied
    /// here and is part of the key.
    pub fn tasks(&self, filter: TaskFilter) -> QueryObserver<Vec<TaskAssignment>> {
        let api = self.api.clone();
        let key = keys::task_list(&filter);
        QueryObserver::new(&self.cache, key, self.polling(), move || {
            let api = api.clone();
            let filter = filter.clone();
            async move {
                let all = api.list_tasks().await?;
                Ok(apply_task_filter(all, &filter))
            }
        })
    }

    pub fn rewards(&self, active_only: Option<bool>) -> QueryObserver<Vec<Reward>> {
        let api = self.api.clone();
        QueryObserver::new(
            &self.cache,
            keys::reward_list(active_only),
            QueryOptions::default(),
            move || {
                let api = api.clone();
                async move { api.list_rewards(active_only).await }
            },
        )
    }

    /// Redemptions, polled while mounted when listing pending ones.
    pub fn redemptions(&self, status: Option<RedemptionStatus>) -> QueryObserver<Vec<Redemption>> {
        let api = self.api.clone();
        let options = match status {
            Some(RedemptionStatus::Pending) => self.polling(),
            _ => QueryOptions::default(),
        };
        QueryObserver::new(
            &self.cache,
            keys::redemption_list(status),
            options,
            move || {
                let api = api.clone();
                async move { api.list_redemptions(status).await }
            },
        )
    }

    pub fn pending_redemptions(&self) -> QueryObserver<Vec<Redemption>> {
        self.redemptions(Some(RedemptionStatus::Pending))
    }

    pub fn wallet(&self, child_id: Option<&str>) -> QueryObserver<Wallet> {
        let api = self.api.clone();
        let child = child_id.map(str::to_string);
        QueryObserver::new(
            &self.cache,
            keys::wallet_balance(child_id),
            QueryOptions::default(),
            move || {
                let api = api.clone();
                let child = child.clone();
                async move { api.wallet(child.as_deref()).await }
            },
        )
    }

    pub fn transactions(&self, page: TransactionPage) -> QueryObserver<Vec<Transaction>> {
        let api = self.api.clone();
        let key = keys::wallet_transactions(&page);
        QueryObserver::new(&self.cache, key, QueryOptions::default(), move || {
            let api = api.clone();
            let page = page.clone();
            async move {
                api.transactions(page.child_id.as_deref(), page.limit, page.offset)
                    .await
            }
        })
    }

    pub fn savings(&self, child_id: Option<&str>) -> QueryObserver<Savings> {
        let api = self.api.clone();
        let child = child_id.map(str::to_string);
        QueryObserver::new(
            &self.cache,
            keys::savings_balance(child_id),
            QueryOptions::default(),
            move || {
                let api = api.clone();
                let child = child.clone();
                async move { api.savings(child.as_deref()).await }
            },
        )
    }

    pub fn gamification(&self, child_id: Option<&str>) -> QueryObserver<Gamification> {
        let api = self.api.clone();
        let child = child_id.map(str::to_string);
        QueryObserver::new(
            &self.cache,
            keys::gamification(child_id),
            QueryOptions::default(),
            move || {
                let api = api.clone();
                let child = child.clone();
                async move { api.gamification(child.as_deref()).await }
            },
        )
    }

    pub fn notifications(&self) -> QueryObserver<Vec<Notification>> {
        let api = self.api.clone();
        QueryObserver::new(
            &self.cache,
            keys::notification_list(),
            QueryOptions::default(),
            move || {
                let api = api.clone();
                async move { api.notifications().await }
            },
        )
    }

    pub fn unread_count(&self) -> QueryObserver<u64> {
        let api = self.api.clone();
        QueryObserver::new(
            &self.cache,
            keys::unread_count(),
            QueryOptions::default().with_stale_time(UNREAD_COUNT_STALE_TIME),
            move || {
                let api = api.clone();
                async move { api.unread_count().await }
            },
        )
    }

    // ---- mutations: children ----

    pub async fn create_child(&self, request: &CreateChildRequest) -> ClientResult<User> {
        self.cache
            .mutate(Mutation::CreateChild, self.api.create_child(request))
            .await
    }

    pub async fn delete_child(&self, child_id: &str) -> ClientResult<()> {
        self.cache
            .mutate(Mutation::DeleteChild, self.api.delete_child(child_id))
            .await
    }

    pub async fn update_avatar(&self, avatar_url: &str) -> ClientResult<User> {
        self.cache
            .mutate(Mutation::UpdateAvatar, self.api.update_avatar(avatar_url))
            .await
    }

    // ---- mutations: tasks ----

    pub async fn create_task(&self, request: &CreateTaskRequest) -> ClientResult<Task> {
        self.cache
            .mutate(Mutation::CreateTask, self.api.create_task(request))
            .await
    }

    pub async fn complete_task(&self, assignment_id: &str) -> ClientResult<TaskAssignment> {
        self.cache
            .mutate(Mutation::CompleteTask, self.api.complete_task(assignment_id))
            .await
    }

    pub async fn approve_task(&self, assignment_id: &str) -> ClientResult<TaskAssignment> {
        self.cache
            .mutate(Mutation::ApproveTask, self.api.approve_task(assignment_id))
            .await
    }

    pub async fn reject_task(&self, assignment_id: &str, reason: &str) -> ClientResult<TaskAssignment> {
        self.cache
            .mutate(
                Mutation::RejectTask,
                self.api.reject_task(assignment_id, reason),
            )
            .await
    }

    pub async fn retry_task(&self, assignment_id: &str) -> ClientResult<TaskAssignment> {
        self.cache
            .mutate(Mutation::RetryTask, self.api.retry_task(assignment_id))
            .await
    }

    pub async fn delete_task(&self, assignment_id: &str) -> ClientResult<()> {
        self.cache
            .mutate(Mutation::DeleteTask, self.api.delete_task(assignment_id))
            .await
    }

    // ---- mutations: rewards ----

    pub async fn create_reward(&self, request: &CreateRewardRequest) -> ClientResult<Reward> {
        self.cache
            .mutate(Mutation::CreateReward, self.api.create_reward(request))
            .await
    }

    pub async fn toggle_reward(&self, reward_id: &str) -> ClientResult<Reward> {
        self.cache
            .mutate(Mutation::ToggleReward, self.api.toggle_reward(reward_id))
            .await
    }

    pub async fn delete_reward(&self, reward_id: &str) -> ClientResult<()> {
        self.cache
            .mutate(Mutation::DeleteReward, self.api.delete_reward(reward_id))
            .await
    }

    // ---- mutations: redemptions ----

    /// Request a reward for the signed-in child.
    ///
    /// Checks the wallet balance through the cache first. When it cannot cover
    /// the reward the call fails with [`ClientError::InsufficientBalance`]
    /// without contacting the server or invalidating anything.
    ///
    /// A balance invalidated by an earlier write is refetched before the check.
    pub async fn request_redemption(&self, reward: &Reward) -> ClientResult<Redemption> {
        let observer = self.wallet(None);
        let wallet = if self.cache.is_invalidated(observer.key()) {
            observer.refetch().await?
        } else {
            observer.data().await?
        };
        if wallet.balance < reward.coin_cost {
            debug!(
                reward = %reward.id,
                balance = wallet.balance,
                cost = reward.coin_cost,
                "redemption blocked by balance"
            );
            return Err(ClientError::InsufficientBalance {
                balance: wallet.balance,
                cost: reward.coin_cost,
            });
        }

        self.cache
            .mutate(
                Mutation::RequestRedemption,
                self.api.request_redemption(&reward.id),
            )
            .await
    }

    pub async fn approve_redemption(&self, redemption_id: &str) -> ClientResult<Redemption> {
        self.cache
            .mutate(
                Mutation::ApproveRedemption,
                self.api.approve_redemption(redemption_id),
            )
            .await
    }

    pub async fn reject_redemption(&self, redemption_id: &str, reason: &str) -> ClientResult<Redemption> {
        self.cache
            .mutate(
                Mutation::RejectRedemption,
                self.api.reject_redemption(redemption_id, reason),
            )
            .await
    }

    // ---- mutations: savings ----

    pub async fn deposit_savings(&self, amount: i64, child_id: Option<&str>) -> ClientResult<Savings> {
        self.cache
            .mutate(
                Mutation::DepositSavings,
                self.api.deposit_savings(amount, child_id),
            )
            .await
    }

    pub async fn withdraw_savings(&self, amount: i64, child_id: Option<&str>) -> ClientResult<Savings> {
        self.cache
            .mutate(
                Mutation::WithdrawSavings,
                self.api.withdraw_savings(amount, child_id),
            )
            .await
    }

    // ---- mutations: notifications ----

    pub async fn mark_notification_read(&self, notification_id: &str) -> ClientResult<()> {
        self.cache
            .mutate(
                Mutation::MarkNotificationRead,
                self.api.mark_notification_read(notification_id),
            )
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> ClientResult<()> {
        self.cache
            .mutate(
                Mutation::MarkAllNotificationsRead,
                self.api.mark_all_notifications_read(),
            )
            .await
    }
}

fn apply_task_filter(tasks: Vec<TaskAssignment>, filter: &TaskFilter) -> Vec<TaskAssignment> {
    tasks
        .into_iter()
        .filter(|t| filter.child_id.as_ref().map_or(true, |c| &t.child_id == c))
        .filter(|t| filter.status.map_or(true, |s| t.status == s))
        .collect()
}
