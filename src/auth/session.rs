use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::{IdentityProvider, Session, SessionGate};

/// Sign-in lifecycle.
///
/// `SignedOut -> Authenticating -> SignedIn`, falling back to `SignedOut`
/// when every attempt fails or the provider reports the user signed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    Authenticating,
    SignedIn,
}

/// Capped retry with linear backoff: attempt `n` failing waits `step * n`
/// before attempt `n + 1`. No wait after the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            step: Duration::from_secs(1),
        }
    }
}

struct Inner {
    state: AuthState,
    session: Option<Session>,
}

/// Owns the anonymous session and its sign-in state machine.
///
/// Always handed out as an `Arc` so an expiry noticed by the gate can start
/// the background re-sign-in itself.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    policy: RetryPolicy,
    inner: Mutex<Inner>,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Arc<Self> {
        Self::with_policy(provider, RetryPolicy::default())
    }

    pub fn with_policy(provider: Arc<dyn IdentityProvider>, policy: RetryPolicy) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            provider,
            policy,
            inner: Mutex::new(Inner {
                state: AuthState::SignedOut,
                session: None,
            }),
            this: this.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.lock().state
    }

    /// Uid of the held session, if any.
    pub fn uid(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.uid.clone())
    }

    /// Signs in, retrying per the policy. Returns whether a session is held
    /// afterwards.
    ///
    /// Returns `false` immediately if another sign-in is already running, and
    /// `true` immediately if a usable session already exists.
    pub async fn sign_in(&self) -> bool {
        {
            let mut inner = self.lock();
            match inner.state {
                AuthState::Authenticating => return false,
                AuthState::SignedIn
                    if inner
                        .session
                        .as_ref()
                        .is_some_and(|s| !s.is_expired(Utc::now())) =>
                {
                    return true
                }
                _ => {}
            }
            inner.state = AuthState::Authenticating;
            inner.session = None;
        }

        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            match self.provider.sign_in_anonymously().await {
                Ok(session) => {
                    tracing::info!(uid = %session.uid, attempt, "Signed in anonymously");
                    let mut inner = self.lock();
                    inner.state = AuthState::SignedIn;
                    inner.session = Some(session);
                    return true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, max_attempts = attempts, "Anonymous sign-in failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.step * attempt).await;
                    }
                }
            }
        }

        tracing::error!(attempts, "Giving up on anonymous sign-in");
        self.lock().state = AuthState::SignedOut;
        false
    }

    /// Reacts to a signed-out notification from the provider: drops the
    /// session and starts a fresh sign-in in the background.
    ///
    /// A sign-in already in flight is left alone; the spawned task then
    /// returns `false` straight away.
    pub fn handle_signed_out(self: &Arc<Self>) -> JoinHandle<bool> {
        {
            let mut inner = self.lock();
            if inner.state != AuthState::Authenticating {
                tracing::info!("Session signed out, re-authenticating");
                inner.state = AuthState::SignedOut;
                inner.session = None;
            }
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.sign_in().await })
    }
}

impl SessionGate for SessionManager {
    /// `true` only for a held, unexpired session.
    ///
    /// The call that first sees the session expired moves the manager to
    /// `SignedOut` and starts one background sign-in; later calls find it
    /// `SignedOut` or `Authenticating` and start nothing.
    fn is_usable(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.state != AuthState::SignedIn {
                return false;
            }
            if inner
                .session
                .as_ref()
                .is_some_and(|s| !s.is_expired(Utc::now()))
            {
                return true;
            }
            tracing::info!("Session expired, re-authenticating");
            inner.state = AuthState::SignedOut;
            inner.session = None;
        }

        match (self.this.upgrade(), tokio::runtime::Handle::try_current()) {
            (Some(manager), Ok(runtime)) => {
                runtime.spawn(async move { manager.sign_in().await });
            }
            _ => tracing::warn!("No runtime for background re-sign-in; waiting for the next sign_in call"),
        }
        false
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds. The first session
    /// issued lives `first_lifetime`, later ones an hour.
    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
        first_lifetime: chrono::Duration,
    }

    impl FlakyProvider {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                first_lifetime: chrono::Duration::hours(1),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for FlakyProvider {
        async fn sign_in_anonymously(&self) -> Result<Session, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(AuthError::HttpStatus(503));
            }
            let lifetime = if n == self.failures {
                self.first_lifetime
            } else {
                chrono::Duration::hours(1)
            };
            Ok(Session {
                uid: format!("anon-{n}"),
                id_token: SecretString::from("token".to_owned()),
                refresh_token: None,
                expires_at: Utc::now() + lifetime,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_linear_backoff() {
        let provider = Arc::new(FlakyProvider::new(2));
        let manager = SessionManager::new(provider.clone());

        let started = tokio::time::Instant::now();
        assert!(manager.sign_in().await);

        assert_eq!(provider.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(manager.state(), AuthState::SignedIn);
        assert!(manager.is_usable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let provider = Arc::new(FlakyProvider::new(u32::MAX));
        let manager = SessionManager::new(provider.clone());

        let started = tokio::time::Instant::now();
        assert!(!manager.sign_in().await);

        assert_eq!(provider.calls(), 3);
        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(manager.state(), AuthState::SignedOut);
        assert!(!manager.is_usable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_out_notification_re_authenticates() {
        let provider = Arc::new(FlakyProvider::new(0));
        let manager = SessionManager::new(provider.clone());
        assert!(manager.sign_in().await);

        let handle = manager.handle_signed_out();
        assert!(handle.await.unwrap());
        assert_eq!(provider.calls(), 2);
        assert_eq!(manager.uid(), Some("anon-1".to_owned()));
    }

    #[tokio::test]
    async fn test_existing_session_is_reused() {
        let provider = Arc::new(FlakyProvider::new(0));
        let manager = SessionManager::new(provider.clone());
        assert!(manager.sign_in().await);
        assert!(manager.sign_in().await);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_signs_in_again_once() {
        let mut provider = FlakyProvider::new(0);
        provider.first_lifetime = chrono::Duration::seconds(-1);
        let provider = Arc::new(provider);
        let manager = SessionManager::new(provider.clone());
        assert!(manager.sign_in().await);

        assert!(!manager.is_usable());
        assert_eq!(manager.state(), AuthState::SignedOut);
        // Already signed out; no second background sign-in.
        assert!(!manager.is_usable());

        for _ in 0..100 {
            if manager.state() == AuthState::SignedIn {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(provider.calls(), 2);
        assert!(manager.is_usable());
        assert_eq!(manager.uid(), Some("anon-1".to_owned()));
    }

    #[test]
    fn test_expired_session_outside_runtime_waits_for_sign_in() {
        let mut provider = FlakyProvider::new(0);
        provider.first_lifetime = chrono::Duration::seconds(-1);
        let provider = Arc::new(provider);
        let manager = SessionManager::new(provider.clone());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        assert!(runtime.block_on(manager.sign_in()));

        assert!(!manager.is_usable());
        assert_eq!(manager.state(), AuthState::SignedOut);
        assert_eq!(provider.calls(), 1);

        assert!(runtime.block_on(manager.sign_in()));
        assert!(manager.is_usable());
    }
}
