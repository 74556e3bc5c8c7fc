//! Credential storage for the API client.
//!
//! The client keeps a bearer credential pair (access + refresh) and the
//! last-known current user in a key-value area owned by the host app. The
//! [`CredentialStore`] trait is that seam; [`MemoryCredentialStore`] is the
//! in-process implementation used by the CLI and tests.
//!
//! Renewal itself lives in the HTTP layer; [`Session`] only serializes it so
//! concurrent 401s share one refresh call.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::ClientResult;
use crate::types::{AuthResponse, User};

/// Access + refresh credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

impl From<&AuthResponse> for Credentials {
    fn from(response: &AuthResponse) -> Self {
        Self::new(&response.access_token, &response.refresh_token)
    }
}

/// Persistent key-value area for credentials and the current user.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    async fn credentials(&self) -> ClientResult<Option<Credentials>>;

    async fn set_credentials(&self, credentials: Credentials) -> ClientResult<()>;

    async fn user(&self) -> ClientResult<Option<User>>;

    async fn set_user(&self, user: User) -> ClientResult<()>;

    /// Remove credentials and user together.
    async fn clear(&self) -> ClientResult<()>;
}

#[derive(Debug, Default)]
struct StoredAuth {
    credentials: Option<Credentials>,
    user: Option<User>,
}

/// In-memory credential store. Nothing survives process exit.
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    inner: Arc<RwLock<StoredAuth>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing credential pair.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoredAuth {
                credentials: Some(credentials),
                user: None,
            })),
        }
    }

    /// Seed from `FAMCOIN_ACCESS_TOKEN` / `FAMCOIN_REFRESH_TOKEN`.
    ///
    /// An empty access token counts as unset.
    pub fn from_env() -> Self {
        match std::env::var("FAMCOIN_ACCESS_TOKEN") {
            Ok(access) if !access.is_empty() => {
                let refresh = std::env::var("FAMCOIN_REFRESH_TOKEN").unwrap_or_default();
                Self::with_credentials(Credentials::new(access, refresh))
            }
            _ => Self::new(),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn credentials(&self) -> ClientResult<Option<Credentials>> {
        Ok(self.inner.read().await.credentials.clone())
    }

    async fn set_credentials(&self, credentials: Credentials) -> ClientResult<()> {
        self.inner.write().await.credentials = Some(credentials);
        Ok(())
    }

    async fn user(&self) -> ClientResult<Option<User>> {
        Ok(self.inner.read().await.user.clone())
    }

    async fn set_user(&self, user: User) -> ClientResult<()> {
        self.inner.write().await.user = Some(user);
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        let mut stored = self.inner.write().await;
        stored.credentials = None;
        stored.user = None;
        Ok(())
    }
}

/// Shared handle on the credential store plus the renewal lock.
#[derive(Debug, Clone)]
pub struct Session {
    store: Arc<dyn CredentialStore>,
    renew_lock: Arc<Mutex<()>>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            renew_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Current access token, if signed in.
    pub async fn access_token(&self) -> ClientResult<Option<String>> {
        Ok(self.store.credentials().await?.map(|c| c.access_token))
    }

    pub async fn is_authenticated(&self) -> ClientResult<bool> {
        Ok(self.store.credentials().await?.is_some())
    }

    /// Persist a login/register/refresh response.
    pub async fn save(&self, response: &AuthResponse) -> ClientResult<()> {
        self.store.set_credentials(Credentials::from(response)).await?;
        if let Some(user) = &response.user {
            self.store.set_user(user.clone()).await?;
        }
        Ok(())
    }

    pub async fn clear(&self) -> ClientResult<()> {
        self.store.clear().await
    }

    pub(crate) async fn lock_renewal(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.renew_lock.lock().await
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::from_env()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serial_test::serial;

    fn parent() -> User {
        User {
            id: "p-1".to_string(),
            name: "Ana".to_string(),
            email: Some("ana@example.com".to_string()),
            role: Role::Parent,
            family_id: Some("f-1".to_string()),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_clear() {
        let session = Session::new(Arc::new(MemoryCredentialStore::new()));
        assert!(!session.is_authenticated().await.unwrap());

        let response = AuthResponse {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            user: Some(parent()),
        };
        session.save(&response).await.unwrap();

        assert_eq!(
            session.access_token().await.unwrap(),
            Some("access".to_string())
        );
        assert_eq!(session.store().user().await.unwrap(), Some(parent()));

        session.clear().await.unwrap();
        assert!(session.store().credentials().await.unwrap().is_none());
        assert!(session.store().user().await.unwrap().is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = Credentials::new("secret-access", "secret-refresh");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secret"));
    }

    #[tokio::test]
    #[serial]
    async fn test_from_env_seeds_credentials() {
        std::env::set_var("FAMCOIN_ACCESS_TOKEN", "env-access");
        std::env::set_var("FAMCOIN_REFRESH_TOKEN", "env-refresh");
        let store = MemoryCredentialStore::from_env();
        std::env::remove_var("FAMCOIN_ACCESS_TOKEN");
        std::env::remove_var("FAMCOIN_REFRESH_TOKEN");

        let creds = store.credentials().await.unwrap().unwrap();
        assert_eq!(creds.access_token, "env-access");
        assert_eq!(creds.refresh_token, "env-refresh");
    }

    #[tokio::test]
    #[serial]
    async fn test_from_env_empty_token() {
        std::env::set_var("FAMCOIN_ACCESS_TOKEN", "");
        let store = MemoryCredentialStore::from_env();
        std::env::remove_var("FAMCOIN_ACCESS_TOKEN");

        assert!(store.credentials().await.unwrap().is_none());
    }
}
