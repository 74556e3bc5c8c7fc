//! Mutation → invalidation table and the mutation runner.
//!
//! Which cached data a write can change is a fixed table, not inferred
//! dependency tracking. [`Mutation::invalidates`] is that table;
//! [`QueryCache::mutate`] applies it after a write succeeds.

use std::future::Future;

use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::error::ClientResult;
use crate::keys::{self, Domain, QueryKey};

/// Every state-changing operation the client performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    CreateChild,
    DeleteChild,
    UpdateAvatar,
    CreateTask,
    CompleteTask,
    ApproveTask,
    RejectTask,
    RetryTask,
    DeleteTask,
    CreateReward,
    ToggleReward,
    DeleteReward,
    RequestRedemption,
    ApproveRedemption,
    RejectRedemption,
    DepositSavings,
    WithdrawSavings,
    MarkNotificationRead,
    MarkAllNotificationsRead,
}

/// A cache region a mutation can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// The children list (and each child under it).
    Children,
    /// The signed-in user's record.
    CurrentUser,
    Tasks,
    Rewards,
    Redemptions,
    Wallet,
    Savings,
    Gamification,
    Notifications,
}

impl Scope {
    /// Key prefix covering this scope.
    pub fn key(&self) -> QueryKey {
        match self {
            Self::Children => keys::children(),
            Self::CurrentUser => keys::current_user(),
            Self::Tasks => Domain::Tasks.root(),
            Self::Rewards => Domain::Rewards.root(),
            Self::Redemptions => Domain::Redemptions.root(),
            Self::Wallet => Domain::Wallet.root(),
            Self::Savings => Domain::Savings.root(),
            Self::Gamification => Domain::Gamification.root(),
            Self::Notifications => Domain::Notifications.root(),
        }
    }
}

impl Mutation {
    pub const ALL: [Mutation; 19] = [
        Mutation::CreateChild,
        Mutation::DeleteChild,
        Mutation::UpdateAvatar,
        Mutation::CreateTask,
        Mutation::CompleteTask,
        Mutation::ApproveTask,
        Mutation::RejectTask,
        Mutation::RetryTask,
        Mutation::DeleteTask,
        Mutation::CreateReward,
        Mutation::ToggleReward,
        Mutation::DeleteReward,
        Mutation::RequestRedemption,
        Mutation::ApproveRedemption,
        Mutation::RejectRedemption,
        Mutation::DepositSavings,
        Mutation::WithdrawSavings,
        Mutation::MarkNotificationRead,
        Mutation::MarkAllNotificationsRead,
    ];

    /// Scopes made stale when this mutation succeeds.
    pub fn invalidates(&self) -> &'static [Scope] {
        use Scope::*;
        match self {
            // deleting a child may orphan its assignments
            Self::CreateChild | Self::DeleteChild => &[Children, Tasks],
            Self::UpdateAvatar => &[CurrentUser],
            Self::CreateTask | Self::RetryTask | Self::DeleteTask => &[Tasks],
            Self::CompleteTask => &[Tasks, Gamification, Notifications],
            Self::ApproveTask => &[Tasks, Wallet, Gamification, Notifications],
            Self::RejectTask => &[Tasks, Notifications],
            Self::CreateReward | Self::ToggleReward | Self::DeleteReward => &[Rewards],
            Self::RequestRedemption => &[Redemptions, Wallet, Notifications],
            Self::ApproveRedemption => &[Redemptions, Notifications],
            Self::RejectRedemption => &[Redemptions, Wallet, Notifications],
            Self::DepositSavings | Self::WithdrawSavings => &[Savings, Wallet],
            Self::MarkNotificationRead | Self::MarkAllNotificationsRead => &[Notifications],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateChild => "create_child",
            Self::DeleteChild => "delete_child",
            Self::UpdateAvatar => "update_avatar",
            Self::CreateTask => "create_task",
            Self::CompleteTask => "complete_task",
            Self::ApproveTask => "approve_task",
            Self::RejectTask => "reject_task",
            Self::RetryTask => "retry_task",
            Self::DeleteTask => "delete_task",
            Self::CreateReward => "create_reward",
            Self::ToggleReward => "toggle_reward",
            Self::DeleteReward => "delete_reward",
            Self::RequestRedemption => "request_redemption",
            Self::ApproveRedemption => "approve_redemption",
            Self::RejectRedemption => "reject_redemption",
            Self::DepositSavings => "deposit_savings",
            Self::WithdrawSavings => "withdraw_savings",
            Self::MarkNotificationRead => "mark_notification_read",
            Self::MarkAllNotificationsRead => "mark_all_notifications_read",
        }
    }
}

impl QueryCache {
    /// Run a write and apply its invalidations on success.
    ///
    /// Paused while offline. On failure nothing is invalidated and the error
    /// is returned untouched.
    pub async fn mutate<T, Fut>(&self, mutation: Mutation, write: Fut) -> ClientResult<T>
    where
        Fut: Future<Output = ClientResult<T>>,
    {
        self.mutate_with(mutation, write, |_| {}).await
    }

    /// Like [`QueryCache::mutate`], running `on_success` after invalidation.
    pub async fn mutate_with<T, Fut, S>(
        &self,
        mutation: Mutation,
        write: Fut,
        on_success: S,
    ) -> ClientResult<T>
    where
        Fut: Future<Output = ClientResult<T>>,
        S: FnOnce(&T),
    {
        self.wait_online().await;

        match write.await {
            Ok(value) => {
                let mut invalidated = 0;
                for scope in mutation.invalidates() {
                    invalidated += self.invalidate(&scope.key()).len();
                }
                debug!(
                    mutation = mutation.name(),
                    scopes = mutation.invalidates().len(),
                    entries = invalidated,
                    "mutation succeeded"
                );
                on_success(&value);
                Ok(value)
            }
            Err(e) => {
                warn!(mutation = mutation.name(), error = %e, "mutation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::collections::BTreeSet;

    fn scopes(m: Mutation) -> BTreeSet<Scope> {
        m.invalidates().iter().copied().collect()
    }

    #[test]
    fn test_approve_task_invalidates_exactly() {
        let expected: BTreeSet<Scope> = [
            Scope::Tasks,
            Scope::Wallet,
            Scope::Gamification,
            Scope::Notifications,
        ]
        .into_iter()
        .collect();
        assert_eq!(scopes(Mutation::ApproveTask), expected);
    }

    #[test]
    fn test_reject_redemption_invalidates_exactly() {
        let expected: BTreeSet<Scope> = [Scope::Redemptions, Scope::Wallet, Scope::Notifications]
            .into_iter()
            .collect();
        assert_eq!(scopes(Mutation::RejectRedemption), expected);
    }

    #[test]
    fn test_approve_redemption_leaves_wallet_alone() {
        assert!(!scopes(Mutation::ApproveRedemption).contains(&Scope::Wallet));
    }

    #[test]
    fn test_table_has_no_duplicates_and_is_never_empty() {
        for m in Mutation::ALL {
            let list = m.invalidates();
            assert!(!list.is_empty(), "{} invalidates nothing", m.name());
            assert_eq!(list.len(), scopes(m).len(), "{} repeats a scope", m.name());
        }
    }

    #[test]
    fn test_child_lifecycle_touches_tasks() {
        for m in [Mutation::CreateChild, Mutation::DeleteChild] {
            assert_eq!(
                scopes(m),
                [Scope::Children, Scope::Tasks].into_iter().collect()
            );
        }
        assert_eq!(scopes(Mutation::UpdateAvatar), [Scope::CurrentUser].into_iter().collect());
    }

    #[tokio::test]
    async fn test_success_callback_sees_invalidated_scopes() {
        let cache = QueryCache::default();
        let wallet = keys::wallet_balance(None);
        let rewards = keys::reward_list(None);
        cache.set_query_data(&wallet, 100_i64);
        cache.set_query_data(&rewards, 1_u32);

        let mut seen = None;
        let result = cache
            .mutate_with(Mutation::ApproveTask, async { Ok(7_u32) }, |value| {
                seen = Some((*value, cache.is_stale(&wallet), cache.is_stale(&rewards)));
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(seen, Some((7, true, false)));
    }

    #[tokio::test]
    async fn test_failed_write_skips_callback_and_invalidation() {
        let cache = QueryCache::default();
        let wallet = keys::wallet_balance(None);
        cache.set_query_data(&wallet, 100_i64);

        let mut called = false;
        let err = cache
            .mutate_with(
                Mutation::ApproveTask,
                async {
                    Err::<(), _>(ClientError::Api {
                        status: 409,
                        message: Some("Task already approved".to_string()),
                    })
                },
                |_| called = true,
            )
            .await
            .unwrap_err();

        assert!(!called);
        assert_eq!(
            err,
            ClientError::Api {
                status: 409,
                message: Some("Task already approved".to_string())
            }
        );
        assert!(!cache.is_stale(&wallet));
        assert!(!cache.is_invalidated(&wallet));
    }

    #[test]
    fn test_scope_keys_are_roots_except_user_records() {
        assert!(Scope::Wallet.key().is_root());
        assert!(!Scope::Children.key().is_root());
        assert_eq!(Scope::CurrentUser.key(), keys::current_user());
    }
}
