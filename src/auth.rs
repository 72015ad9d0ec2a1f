//! Sign-up, sign-in and session tracking for the hosted backend.

use crate::errors::Error;
use crate::repository::remote_check as check;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

/// The identity service behind [`AuthSession`].
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The session already held (or persisted) by the provider, if any.
    async fn get_session(&self) -> Result<Option<Session>, Error>;

    /// Registers an account. Returns `None` when the account still needs confirming.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, Error>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error>;

    async fn sign_out(&self) -> Result<(), Error>;

    /// Every session change, including ones the caller did not initiate.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Uninitialized,
    Loading,
    Authenticated(User),
    Anonymous,
    Errored(String),
}

#[derive(Debug)]
struct AuthInner {
    state: AuthState,
    session: Option<Session>,
    loading: bool,
    error: Option<String>,
}

impl AuthInner {
    fn apply_session(&mut self, session: Option<Session>) {
        self.state = match &session {
            Some(session) => AuthState::Authenticated(session.user.clone()),
            None => AuthState::Anonymous,
        };
        self.session = session;
    }
}

/// Process-scoped auth state machine.
///
/// `init` moves `Uninitialized → Loading → Authenticated | Anonymous`
/// (or `Errored`), then follows the provider's change notifications for the
/// rest of the process.
#[derive(Clone)]
pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    inner: Arc<RwLock<AuthInner>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            inner: Arc::new(RwLock::new(AuthInner {
                state: AuthState::Uninitialized,
                session: None,
                loading: false,
                error: None,
            })),
        }
    }

    pub async fn init(&self) {
        {
            let mut inner = self.inner.write().await;
            if inner.state != AuthState::Uninitialized {
                return;
            }
            inner.state = AuthState::Loading;
            inner.loading = true;
            inner.error = None;
        }

        let result = self.provider.get_session().await;
        {
            let mut inner = self.inner.write().await;
            match result {
                Ok(session) => {
                    info!(signed_in = session.is_some(), "auth session initialised");
                    inner.apply_session(session);
                }
                Err(err) => {
                    error!("failed to initialise auth session: {err}");
                    let message = err.to_string();
                    inner.state = AuthState::Errored(message.clone());
                    inner.error = Some(message);
                }
            }
            inner.loading = false;
        }

        let mut changes = self.provider.subscribe();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let session = changes.borrow_and_update().clone();
                debug!(signed_in = session.is_some(), "auth session changed");
                inner.write().await.apply_session(session);
            }
        });
    }

    pub async fn state(&self) -> AuthState {
        self.inner.read().await.state.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.inner
            .read()
            .await
            .session
            .as_ref()
            .map(|session| session.user.clone())
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.read().await.session.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(self.state().await, AuthState::Authenticated(_))
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.read().await.loading
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.error.clone()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, Error> {
        self.begin().await;
        let result = self.provider.sign_up(email, password).await;
        let mut inner = self.inner.write().await;
        inner.loading = false;
        match result {
            Ok(Some(session)) => {
                inner.apply_session(Some(session.clone()));
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!("sign up failed: {err}");
                inner.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        self.begin().await;
        let result = self.provider.sign_in_with_password(email, password).await;
        let mut inner = self.inner.write().await;
        inner.loading = false;
        match result {
            Ok(session) => {
                info!(user_id = %session.user.id, "signed in");
                inner.apply_session(Some(session.clone()));
                Ok(session)
            }
            Err(err) => {
                warn!("sign in failed: {err}");
                inner.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), Error> {
        {
            self.inner.write().await.loading = true;
        }
        let result = self.provider.sign_out().await;
        let mut inner = self.inner.write().await;
        inner.loading = false;
        match result {
            Ok(()) => {
                info!("signed out");
                inner.apply_session(None);
                Ok(())
            }
            Err(err) => {
                warn!("sign out failed: {err}");
                inner.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn begin(&self) {
        let mut inner = self.inner.write().await;
        inner.loading = true;
        inner.error = None;
    }
}

/// Hosted auth endpoints (`/auth/v1/*`), optionally persisting the session to disk.
pub struct RemoteAuth {
    client: Client,
    base_url: String,
    api_key: String,
    session_path: Option<PathBuf>,
    sender: watch::Sender<Option<Session>>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl RemoteAuth {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        session_path: Option<PathBuf>,
    ) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session_path,
            sender,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    async fn store_session(&self, session: Option<Session>) -> Result<(), Error> {
        if let Some(path) = &self.session_path {
            match &session {
                Some(session) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        fs::create_dir_all(parent).await?;
                    }
                    fs::write(path, serde_json::to_vec(session)?).await?;
                }
                None => match fs::remove_file(path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                },
            }
        }
        self.sender.send_replace(session);
        Ok(())
    }

    async fn load_session(&self) -> Option<Session> {
        let path = self.session_path.as_ref()?;
        match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(session) => Some(session),
                Err(err) => {
                    error!("failed to parse session file: {err}");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                error!("failed to read session file: {err}");
                None
            }
        }
    }
}

#[async_trait]
impl AuthProvider for RemoteAuth {
    async fn get_session(&self) -> Result<Option<Session>, Error> {
        let current = self.sender.borrow().clone();
        if current.is_some() {
            return Ok(current);
        }
        let session = self.load_session().await;
        if session.is_some() {
            self.sender.send_replace(session.clone());
        }
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, Error> {
        let response = self
            .client
            .post(self.endpoint("signup"))
            .header("apikey", &self.api_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let body: serde_json::Value = check(response).await?.json().await?;
        // Without an access token the account is waiting for email confirmation.
        let session = serde_json::from_value::<Session>(body).ok();
        if session.is_some() {
            self.store_session(session.clone()).await?;
        }
        Ok(session)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, Error> {
        let response = self
            .client
            .post(self.endpoint("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let session: Session = match check(response).await {
            Ok(response) => response.json().await?,
            Err(Error::Backend { message, .. }) => return Err(Error::Auth(message)),
            Err(err) => return Err(err),
        };
        self.store_session(Some(session.clone())).await?;
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        let current = self.sender.borrow().clone();
        if let Some(session) = current {
            let response = self
                .client
                .post(self.endpoint("logout"))
                .header("apikey", &self.api_key)
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            check(response).await?;
        }
        self.store_session(None).await
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sender.subscribe()
    }
}
