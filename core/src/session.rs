//! # Controller Session
//!
//! A [`Session`] is an explicit value handed to every controller call. It owns the
//! credentials needed to log in again and the current token.
//!
//! Tokens carry a generation number. A caller that sees a token expire asks for a
//! refresh *of that generation*; the first caller performs the login while the others
//! wait on the refresh lock and then pick up the token it produced. A failed refresh is
//! remembered for its generation so waiting callers fail with it instead of each
//! trying again.

use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use serde::Deserialize;
use snmpkey_common::error::AuthError;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Tokens this close to their expiry are refreshed before use.
pub const EXPIRY_GRACE: Duration = Duration::from_secs(30);

pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    generation: u64,
    expires_at: Option<SystemTime>,
}

impl Token {
    fn new(value: String, generation: u64) -> Self {
        let expires_at = jwt_expiry(&value);
        Self {
            value,
            generation,
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Tokens without a readable expiry are only ever refreshed after a 401.
    pub fn is_expired(&self, grace: Duration) -> bool {
        match self.expires_at {
            Some(exp) => SystemTime::now() + grace >= exp,
            None => false,
        }
    }
}

#[derive(Default)]
struct RefreshState {
    failed: Option<(u64, AuthError)>,
}

pub struct Session {
    base_url: String,
    credentials: Credentials,
    token: RwLock<Token>,
    refresh: Mutex<RefreshState>,
}

impl Session {
    pub fn new(base_url: impl Into<String>, credentials: Credentials, token: String) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            token: RwLock::new(Token::new(token, 0)),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn token(&self) -> Token {
        self.token.read().await.clone()
    }

    /// Replaces `stale` with a fresh token, running `login` at most once per generation.
    pub async fn refresh<F, Fut>(&self, stale: &Token, login: F) -> Result<Token, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        let mut state = self.refresh.lock().await;

        {
            let current = self.token.read().await;
            if current.generation != stale.generation {
                debug!(generation = current.generation, "session already refreshed");
                return Ok(current.clone());
            }
        }

        if let Some((generation, err)) = &state.failed
            && *generation == stale.generation
        {
            return Err(AuthError::RefreshFailed(err.to_string()));
        }

        debug!(generation = stale.generation, "refreshing controller session");
        match login().await {
            Ok(value) => {
                let fresh = Token::new(value, stale.generation + 1);
                *self.token.write().await = fresh.clone();
                state.failed = None;
                Ok(fresh)
            }
            Err(err) => {
                warn!("session refresh failed: {err}");
                state.failed = Some((stale.generation, err.clone()));
                Err(err)
            }
        }
    }
}

/// Shows where the session points and as whom, never the password or the token.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("username", &self.credentials.username)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

/// Reads the `exp` claim of a JWT without verifying it.
fn jwt_expiry(token: &str) -> Option<SystemTime> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    claims.exp.map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
