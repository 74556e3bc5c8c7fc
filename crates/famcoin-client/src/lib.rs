//! Client data layer for the famcoin family chores service.
//!
//! Parents assign chores, children earn coins and XP for them and spend coins
//! on rewards. This crate is everything a front-end needs to talk to that
//! backend:
//!
//! - Typed HTTP client for every endpoint with bearer auth
//! - Transparent one-shot credential renewal on 401
//! - Query cache with hierarchical keys and stale-while-revalidate reads
//! - Fixed mutation → invalidation table
//! - Refetch on staleness, screen focus, reconnect and polling
//!
//! # Quick Start
//!
//! ```no_run
//! use famcoin_client::{keys::TaskFilter, FamilyClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let family = FamilyClient::from_env()?;
//! family.login("parent@example.com", "secret").await?;
//!
//! let tasks = family.tasks(TaskFilter::default());
//! for assignment in tasks.data().await? {
//!     println!("{} {:?}", assignment.task.title, assignment.status);
//! }
//!
//! // approving pays out: tasks, wallet, gamification and notifications go stale
//! family.approve_task("assignment-1").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `FAMCOIN_API_URL` | API base URL (default: `http://localhost:8080/api`) |
//! | `FAMCOIN_TIMEOUT_MS` | Request timeout in milliseconds (default: 10000) |
//! | `FAMCOIN_QUERY_RETRIES` | Retries for reads on transient failure (default: 2) |
//! | `FAMCOIN_MUTATION_RETRIES` | Retries for writes on transient failure (default: 1) |
//! | `FAMCOIN_ACCESS_TOKEN` | Seed access credential |
//! | `FAMCOIN_REFRESH_TOKEN` | Seed refresh credential |

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod family;
pub mod keys;
pub mod mutation;
pub mod types;

// Re-export main types
pub use auth::{CredentialStore, Credentials, MemoryCredentialStore, Session};
pub use cache::{QueryCache, QueryObserver, QueryOptions, Refetch, ScreenFocus};
pub use client::{ApiClient, CLIENT_USER_AGENT};
pub use config::{CacheConfig, ClientConfig, MIN_POLL_INTERVAL};
pub use error::{ClientError, ClientResult};
pub use family::FamilyClient;
pub use keys::{Domain, KeyPart, QueryKey};
pub use mutation::{Mutation, Scope};
pub use types::{
    AuthResponse, Badge, Gamification, Notification, NotificationType, Redemption,
    RedemptionStatus, Reward, Role, Savings, Task, TaskAssignment, TaskStatus, Transaction, User,
    Wallet,
};
