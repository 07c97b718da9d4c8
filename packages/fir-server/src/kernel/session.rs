//! Ownership and self-healing of the single portal session.
//!
//! The whole service drives exactly one live browser session. This
//! manager guarantees that callers never observe a session that is
//! mid-initialization, that a dead or detached session is rebuilt before
//! use, and that no two automation operations ever run concurrently
//! against the session it owns.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portal_automation::{AutomationError, PortalDriver, PortalSession};
use thiserror::Error;
use tokio::sync::{Mutex as OperationGate, OwnedMutexGuard};

/// Attempts per bootstrap step before giving up on initialization.
const BOOTSTRAP_ATTEMPTS: u32 = 3;
/// Fixed pause between bootstrap attempts.
const BOOTSTRAP_BACKOFF: Duration = Duration::from_secs(5);

const OPEN_TIMEOUT: Duration = Duration::from_secs(90);
const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(90);
const LANGUAGE_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Process-wide session lifecycle. Not persisted; rebuilt from
/// `Uninitialized` on every process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Degraded,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Degraded => "degraded",
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    /// `acquire` before any successful initialization.
    #[error("portal session not initialized")]
    NotInitialized,

    /// Initialization exhausted its retry budget.
    #[error("portal unreachable: {0}")]
    SiteUnavailable(AutomationError),
}

struct Inner {
    state: SessionState,
    session: Option<Arc<dyn PortalSession>>,
    logged_in: bool,
}

/// Exclusive access to the live session for one logical automation
/// operation (or one district pass of a crawl). Holding the lease keeps
/// every other automation caller out of the shared page.
pub struct SessionLease {
    session: Arc<dyn PortalSession>,
    _permit: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn session(&self) -> &Arc<dyn PortalSession> {
        &self.session
    }
}

pub struct SessionManager {
    driver: Arc<dyn PortalDriver>,
    inner: Mutex<Inner>,
    gate: Arc<OperationGate<()>>,
    step_backoff: Duration,
}

/// Clears the `Initializing` flag if initialization unwinds without
/// reaching a verdict (error or cancellation alike).
struct InitGuard<'a> {
    inner: &'a Mutex<Inner>,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::Initializing {
            inner.state = SessionState::Degraded;
            inner.session = None;
        }
    }
}

impl SessionManager {
    pub fn new(driver: Arc<dyn PortalDriver>) -> Self {
        Self::with_backoff(driver, BOOTSTRAP_BACKOFF)
    }

    pub fn with_backoff(driver: Arc<dyn PortalDriver>, step_backoff: Duration) -> Self {
        Self {
            driver,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                session: None,
                logged_in: false,
            }),
            gate: Arc::new(OperationGate::new(())),
            step_backoff,
        }
    }

    /// Drive the session to `Ready`.
    ///
    /// Fast no-op when already ready and live. When another caller is
    /// initializing, this is also a no-op — callers poll readiness rather
    /// than piling a second login flow onto the session. Otherwise runs
    /// the full login-navigation sequence and lands in `Ready` or
    /// `Degraded`.
    pub async fn ensure_ready(&self) -> Result<(), SessionError> {
        let live_session = {
            let inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Initializing => return Ok(()),
                SessionState::Ready => inner.session.clone(),
                _ => None,
            }
        };
        if let Some(session) = live_session {
            if session.is_alive().await {
                return Ok(());
            }
            tracing::warn!("portal session found dead, re-initializing");
            self.mark_lost();
        }

        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Initializing => return Ok(()),
                SessionState::Ready => return Ok(()),
                _ => {
                    inner.state = SessionState::Initializing;
                    inner.session = None;
                    inner.logged_in = false;
                }
            }
        }

        let guard = InitGuard { inner: &self.inner };
        match self.bootstrap().await {
            Ok(session) => {
                let mut inner = self.inner.lock().unwrap();
                inner.state = SessionState::Ready;
                inner.session = Some(session);
                drop(inner);
                drop(guard);
                tracing::info!("portal session ready");
                Ok(())
            }
            Err(err) => {
                drop(guard);
                tracing::error!(error = %err, "portal session initialization failed");
                Err(SessionError::SiteUnavailable(err))
            }
        }
    }

    /// Open a fresh session and walk it to the FIR search entry page.
    async fn bootstrap(&self) -> Result<Arc<dyn PortalSession>, AutomationError> {
        let session = self
            .retry_step("open session", OPEN_TIMEOUT, || self.driver.open_session())
            .await?;

        self.retry_step("navigate home", NAVIGATE_TIMEOUT, || session.navigate_home())
            .await?;

        // The portal works in either language; don't fail the whole
        // bootstrap over a missed postback here.
        match tokio::time::timeout(LANGUAGE_TIMEOUT, session.switch_language()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "language switch skipped"),
            Err(_) => tracing::warn!("language switch timed out, continuing"),
        }

        self.retry_step("open FIR search", SEARCH_PAGE_TIMEOUT, || {
            session.open_fir_search()
        })
        .await?;

        Ok(session)
    }

    async fn retry_step<T, F, Fut>(
        &self,
        step: &'static str,
        step_timeout: Duration,
        mut op: F,
    ) -> Result<T, AutomationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AutomationError>>,
    {
        let mut last_err = AutomationError::SiteUnavailable;
        for attempt in 1..=BOOTSTRAP_ATTEMPTS {
            match tokio::time::timeout(step_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    tracing::warn!(step, attempt, error = %err, "bootstrap step failed");
                    last_err = err;
                }
                Err(_) => {
                    tracing::warn!(step, attempt, "bootstrap step timed out");
                    last_err = AutomationError::Timeout { op: step };
                }
            }
            if attempt < BOOTSTRAP_ATTEMPTS {
                tokio::time::sleep(self.step_backoff).await;
            }
        }
        Err(last_err)
    }

    /// Current handle; fails fast if the session was never initialized.
    pub fn acquire(&self) -> Result<Arc<dyn PortalSession>, SessionError> {
        self.inner
            .lock()
            .unwrap()
            .session
            .clone()
            .ok_or(SessionError::NotInitialized)
    }

    /// Acquire the session for one automation operation, healing a dead
    /// session first and taking the operation gate so no other caller can
    /// touch the page until the lease drops.
    pub async fn lease(&self) -> Result<SessionLease, SessionError> {
        let session = self.acquire()?;
        if !session.is_alive().await {
            tracing::warn!("portal session lost, running full re-initialization");
            self.mark_lost();
            self.ensure_ready().await?;
        }
        let session = self.acquire()?;
        let permit = self.gate.clone().lock_owned().await;
        Ok(SessionLease {
            session,
            _permit: permit,
        })
    }

    /// Record a detected session loss: `Ready -> Degraded`.
    pub fn mark_lost(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::Ready {
            inner.state = SessionState::Degraded;
        }
        inner.session = None;
        inner.logged_in = false;
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.lock().unwrap().logged_in
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.inner.lock().unwrap().logged_in = logged_in;
    }
}
