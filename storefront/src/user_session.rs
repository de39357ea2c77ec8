use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use shared::{AuthResponse, LoginRequest, RegisterRequest, UserProfile};
use tracing::{debug, error, info, warn};

use crate::api::{ApiResult, AuthApi};
use crate::error::Result;
use crate::notify::Notifier;
use crate::store::{keys, or_empty_if_corrupt, Storage, StorageError, StorageExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Loading,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserSession {
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub is_loading: bool,
}

impl UserSession {
    pub fn logged(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.logged() {
            SessionState::Authenticated
        } else if self.is_loading {
            SessionState::Loading
        } else {
            SessionState::Anonymous
        }
    }
}

/// Owns the authenticated user and its token.
///
/// The pair is always written to and removed from storage together. Cloning
/// is cheap and every clone observes the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    session: Mutex<UserSession>,
    storage: Arc<dyn Storage>,
    auth: Arc<dyn AuthApi>,
    notifier: Arc<dyn Notifier>,
}

impl SessionManager {
    /// Restores the session from storage. A user persisted without a token
    /// is dropped; a token without a user waits for [`Self::load_user_profile`].
    pub fn load(
        storage: Arc<dyn Storage>,
        auth: Arc<dyn AuthApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let token = or_empty_if_corrupt(storage.get(keys::TOKEN), None)?
            .filter(|token| !token.is_empty());
        let mut user = or_empty_if_corrupt(storage.get_json::<UserProfile>(keys::USER), None)?;
        if user.is_some() && token.is_none() {
            warn!("Persisted user without token, clearing it");
            storage.remove(keys::USER)?;
            user = None;
        }
        debug!(
            has_user = user.is_some(),
            has_token = token.is_some(),
            "Session restored from storage"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                session: Mutex::new(UserSession {
                    user,
                    token,
                    is_loading: false,
                }),
                storage,
                auth,
                notifier,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, UserSession> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> UserSession {
        self.lock().clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.lock().user.as_ref().is_some_and(|user| user.is_admin)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    fn set_loading(&self, is_loading: bool) {
        self.lock().is_loading = is_loading;
    }

    /// Storage first, memory second, both under the caller's session lock.
    fn persist_auth(
        &self,
        session: &mut UserSession,
        user: &UserProfile,
        token: &str,
    ) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(user).map_err(|source| StorageError::Malformed {
            key: keys::USER.to_owned(),
            source,
        })?;
        self.inner.storage.set_many(&[
            (keys::USER, serialized),
            (keys::TOKEN, token.to_owned()),
        ])?;
        session.user = Some(user.clone());
        session.token = Some(token.to_owned());
        Ok(())
    }

    fn clear_auth(&self, session: &mut UserSession) {
        if let Err(error) = self
            .inner
            .storage
            .remove_many(&[keys::USER, keys::TOKEN])
        {
            error!(?error, "Failed to remove session from storage");
        }
        session.user = None;
        session.token = None;
    }

    fn complete_authentication(
        &self,
        response: ApiResult<AuthResponse>,
        success: &str,
    ) -> Result<UserProfile> {
        let mut session = self.lock();
        session.is_loading = false;
        let outcome: Result<UserProfile> = match response {
            Ok(AuthResponse { user, token }) => self
                .persist_auth(&mut session, &user, &token)
                .map(|_| user)
                .map_err(Into::into),
            Err(error) => Err(error.into()),
        };
        drop(session);
        match &outcome {
            Ok(user) => {
                info!(user_id = %user.id, "User authenticated");
                self.inner.notifier.success(success);
            }
            Err(error) => {
                warn!(?error, "Authentication failed");
                self.inner.notifier.error(&error.to_string());
            }
        }
        outcome
    }

    pub async fn login(&self, email: &str, password: SecretString) -> Result<UserProfile> {
        info!(email = %email, "User login attempt");
        self.set_loading(true);
        let request = LoginRequest {
            email: email.to_owned(),
            password,
        };
        let response = self.inner.auth.login(&request).await;
        self.complete_authentication(response, "Login successful!")
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: SecretString,
    ) -> Result<UserProfile> {
        info!(email = %email, "User register attempt");
        self.set_loading(true);
        let request = RegisterRequest {
            name: name.to_owned(),
            email: email.to_owned(),
            password,
        };
        let response = self.inner.auth.register(&request).await;
        self.complete_authentication(response, "Registration successful!")
    }

    /// Local only; nothing can make it fail.
    pub fn logout(&self) {
        self.clear_auth(&mut self.lock());
        info!("User logged out");
        self.inner.notifier.info("Logged out");
    }

    /// Logs out locally first, then tells the server about the old token.
    pub async fn logout_remote(&self) {
        let token = self.token();
        self.logout();
        if let Some(token) = token {
            if let Err(error) = self.inner.auth.logout(&token).await {
                warn!(?error, "Server logout failed, local session already cleared");
            }
        }
    }

    /// Resolves the user behind a persisted token. Does nothing unless a
    /// token is held without a user. Any failure clears the session.
    pub async fn load_user_profile(&self) -> Option<UserProfile> {
        let token = {
            let session = self.lock();
            match (&session.token, &session.user) {
                (Some(token), None) => token.clone(),
                _ => return session.user.clone(),
            }
        };
        self.set_loading(true);
        let user = self.refresh_profile(token).await;
        self.set_loading(false);
        user
    }

    /// Re-checks the held token against the server even when a user is
    /// already cached. Used by the periodic revalidation.
    pub async fn revalidate(&self) -> Option<UserProfile> {
        let (token, resolved) = {
            let session = self.lock();
            match &session.token {
                Some(token) => (token.clone(), session.user.is_some()),
                None => return None,
            }
        };
        if resolved {
            return self.refresh_profile(token).await;
        }
        self.load_user_profile().await
    }

    /// On-demand profile refresh; failures clear the session without
    /// notifying anyone.
    pub async fn sync_user(&self) -> Option<UserProfile> {
        match self.token() {
            Some(token) => self.refresh_profile(token).await,
            None => {
                self.clear_auth(&mut self.lock());
                None
            }
        }
    }

    /// The token check and the resulting write happen under one lock, so a
    /// logout or login racing the fetch always wins.
    async fn refresh_profile(&self, token: String) -> Option<UserProfile> {
        let result = self.inner.auth.profile(&token).await;
        let mut session = self.lock();
        if session.token.as_deref() != Some(token.as_str()) {
            debug!("Session changed while fetching profile, discarding result");
            return session.user.clone();
        }
        match result {
            Ok(profile) => match self.persist_auth(&mut session, &profile, &token) {
                Ok(()) => {
                    debug!(user_id = %profile.id, "Session validated");
                    Some(profile)
                }
                Err(error) => {
                    error!(?error, "Failed to persist validated session");
                    session.user.clone()
                }
            },
            Err(error) => {
                warn!(?error, "Session validation failed, clearing session");
                self.clear_auth(&mut session);
                None
            }
        }
    }
}
