//! Hierarchical cache keys.
//!
//! Every cacheable read has a [`QueryKey`]: a domain root followed by a
//! discriminator and the filter values the read depends on. Keys compare by
//! value, so two reads with equal filters always share one cache entry.
//! A key is "under" another when the other is a prefix of it, which is what
//! root invalidation relies on.
//!
//! Optional filters never disappear from a key: an unset filter is encoded as
//! [`KeyPart::Absent`], which is distinct from every concrete value.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::{RedemptionStatus, TaskStatus};

/// Remote resource categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Auth,
    Users,
    Tasks,
    Rewards,
    Redemptions,
    Wallet,
    Savings,
    Gamification,
    Notifications,
}

impl Domain {
    pub const ALL: [Domain; 9] = [
        Domain::Auth,
        Domain::Users,
        Domain::Tasks,
        Domain::Rewards,
        Domain::Redemptions,
        Domain::Wallet,
        Domain::Savings,
        Domain::Gamification,
        Domain::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Users => "users",
            Self::Tasks => "tasks",
            Self::Rewards => "rewards",
            Self::Redemptions => "redemptions",
            Self::Wallet => "wallet",
            Self::Savings => "savings",
            Self::Gamification => "gamification",
            Self::Notifications => "notifications",
        }
    }

    /// Root key scoping every query of this domain.
    pub fn root(&self) -> QueryKey {
        QueryKey {
            domain: *self,
            parts: Vec::new(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One segment of a key below the domain root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    /// Fixed discriminator such as `list` or `balance`.
    Tag(&'static str),
    Str(String),
    Num(u64),
    Bool(bool),
    /// An optional filter that was not set.
    Absent,
    /// Named filter values; ordered map so field order never matters.
    Filter(BTreeMap<&'static str, KeyPart>),
}

impl KeyPart {
    pub fn opt_str(value: Option<&str>) -> Self {
        value.map_or(Self::Absent, |v| Self::Str(v.to_string()))
    }

    pub fn opt_num(value: Option<u64>) -> Self {
        value.map_or(Self::Absent, Self::Num)
    }

    pub fn opt_bool(value: Option<bool>) -> Self {
        value.map_or(Self::Absent, Self::Bool)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Num(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Absent => f.write_str("~"),
            Self::Filter(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", name, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Canonical cache identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    domain: Domain,
    parts: Vec<KeyPart>,
}

impl QueryKey {
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Extend this key by one segment.
    pub fn child(&self, part: KeyPart) -> Self {
        let mut parts = self.parts.clone();
        parts.push(part);
        Self {
            domain: self.domain,
            parts,
        }
    }

    /// Whether `self` is `prefix` or nested under it.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.domain == prefix.domain && self.parts.starts_with(&prefix.parts)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.domain)?;
        for part in &self.parts {
            write!(f, ", {}", part)?;
        }
        f.write_str("]")
    }
}

/// Task list filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TaskFilter {
    pub child_id: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn for_child(child_id: impl Into<String>) -> Self {
        Self {
            child_id: Some(child_id.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Transaction history page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionPage {
    pub child_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for TransactionPage {
    fn default() -> Self {
        Self {
            child_id: None,
            limit: 20,
            offset: 0,
        }
    }
}

fn filter<const N: usize>(fields: [(&'static str, KeyPart); N]) -> KeyPart {
    KeyPart::Filter(fields.into_iter().collect())
}

// ---- key constructors, one per cacheable read ----

pub fn current_user() -> QueryKey {
    Domain::Auth.root().child(KeyPart::Tag("me"))
}

pub fn children() -> QueryKey {
    Domain::Users.root().child(KeyPart::Tag("children"))
}

pub fn child(id: &str) -> QueryKey {
    children().child(KeyPart::Str(id.to_string()))
}

pub fn task_list(f: &TaskFilter) -> QueryKey {
    Domain::Tasks.root().child(KeyPart::Tag("list")).child(filter([
        ("childId", KeyPart::opt_str(f.child_id.as_deref())),
        (
            "status",
            f.status
                .map_or(KeyPart::Absent, |s| KeyPart::Tag(s.as_str())),
        ),
    ]))
}

pub fn task_detail(id: &str) -> QueryKey {
    Domain::Tasks
        .root()
        .child(KeyPart::Tag("detail"))
        .child(KeyPart::Str(id.to_string()))
}

pub fn reward_list(active_only: Option<bool>) -> QueryKey {
    Domain::Rewards
        .root()
        .child(KeyPart::Tag("list"))
        .child(filter([("activeOnly", KeyPart::opt_bool(active_only))]))
}

pub fn redemption_list(status: Option<RedemptionStatus>) -> QueryKey {
    Domain::Redemptions
        .root()
        .child(KeyPart::Tag("list"))
        .child(filter([(
            "status",
            status.map_or(KeyPart::Absent, |s| KeyPart::Tag(s.as_str())),
        )]))
}

pub fn wallet_balance(child_id: Option<&str>) -> QueryKey {
    Domain::Wallet
        .root()
        .child(KeyPart::Tag("balance"))
        .child(KeyPart::opt_str(child_id))
}

pub fn wallet_transactions(page: &TransactionPage) -> QueryKey {
    Domain::Wallet
        .root()
        .child(KeyPart::Tag("transactions"))
        .child(filter([
            ("childId", KeyPart::opt_str(page.child_id.as_deref())),
            ("limit", KeyPart::Num(u64::from(page.limit))),
            ("offset", KeyPart::Num(u64::from(page.offset))),
        ]))
}

pub fn savings_balance(child_id: Option<&str>) -> QueryKey {
    Domain::Savings
        .root()
        .child(KeyPart::Tag("balance"))
        .child(KeyPart::opt_str(child_id))
}

pub fn gamification(child_id: Option<&str>) -> QueryKey {
    Domain::Gamification
        .root()
        .child(KeyPart::Tag("data"))
        .child(KeyPart::opt_str(child_id))
}

pub fn notification_list() -> QueryKey {
    Domain::Notifications.root().child(KeyPart::Tag("list"))
}

pub fn unread_count() -> QueryKey {
    Domain::Notifications.root().child(KeyPart::Tag("unread"))
}
