//! In-memory session store.
//!
//! Sessions map an opaque id (carried in a cookie) to the signed-in identity. Pending
//! OAuth `state` values are kept alongside so the callback can be matched to a login
//! this service actually started.

use crate::config::AppConfig;
use crate::types::UserProfile;
use moka::future::Cache;
use std::fmt;
use std::time::Duration as StdDuration;
use uuid::Uuid;

const LOGIN_STATE_TTL: StdDuration = StdDuration::from_secs(10 * 60);
const LOGIN_STATE_CAPACITY: u64 = 10_000;

/// The authenticated user and the token used for upstream calls on their behalf.
#[derive(Clone)]
pub struct Identity {
    pub profile: UserProfile,
    pub access_token: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("profile", &self.profile)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, Identity>,
    login_states: Cache<String, ()>,
}

impl SessionStore {
    pub fn new(config: &AppConfig) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.session_max_capacity)
            .time_to_live(config.session_ttl())
            .build();

        let login_states = Cache::builder()
            .max_capacity(LOGIN_STATE_CAPACITY)
            .time_to_live(LOGIN_STATE_TTL)
            .build();

        Self {
            sessions,
            login_states,
        }
    }

    /// Stores `identity` under a fresh random session id and returns the id.
    pub async fn create(&self, identity: Identity) -> String {
        let session_id = Uuid::new_v4().simple().to_string();
        tracing::info!(login = %identity.profile.login, "Created session");
        self.sessions.insert(session_id.clone(), identity).await;
        session_id
    }

    pub async fn get(&self, session_id: &str) -> Option<Identity> {
        self.sessions.get(session_id).await
    }

    pub async fn remember_login_state(&self, state: String) {
        self.login_states.insert(state, ()).await;
    }

    /// Consumes a pending login state. Returns false if it was never issued or already used.
    pub async fn take_login_state(&self, state: &str) -> bool {
        self.login_states.remove(state).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(login: &str) -> Identity {
        Identity {
            profile: UserProfile {
                id: 1,
                login: login.to_string(),
                name: None,
                avatar_url: None,
                html_url: None,
            },
            access_token: "gho_secret".to_string(),
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(&AppConfig::with_credentials(
            "id",
            "secret",
            "http://localhost:5000/auth/github/callback",
        ))
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let store = store();
        let id = store.create(identity("octocat")).await;

        let found = store.get(&id).await.expect("session should exist");
        assert_eq!(found.profile.login, "octocat");
        assert!(store.get("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let store = store();
        let a = store.create(identity("a")).await;
        let b = store.create(identity("b")).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_login_state_is_single_use() {
        let store = store();
        store.remember_login_state("abc".to_string()).await;

        assert!(store.take_login_state("abc").await);
        assert!(!store.take_login_state("abc").await);
        assert!(!store.take_login_state("never-issued").await);
    }

    #[test]
    fn test_identity_debug_hides_token() {
        let rendered = format!("{:?}", identity("octocat"));
        assert!(rendered.contains("octocat"));
        assert!(!rendered.contains("gho_secret"));
    }
}
