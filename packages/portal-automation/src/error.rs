use thiserror::Error;

/// Failures surfaced by portal automation calls.
///
/// Every operation against the portal can be slow and can fail
/// transiently; callers decide whether to retry, re-initialize the
/// session, or give up on the current run.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// The portal itself is unreachable or not serving pages.
    #[error("source website not responding")]
    SiteUnavailable,

    /// A single operation exceeded its time budget.
    #[error("operation '{op}' timed out")]
    Timeout { op: &'static str },

    /// The browser session behind the handle is gone (closed, detached,
    /// or expired on the driver side).
    #[error("portal session lost")]
    SessionLost,

    /// The driver reported that an expected page element never appeared.
    #[error("portal page element missing: {0}")]
    ElementMissing(String),

    /// Transport or protocol failure talking to the browser driver.
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl AutomationError {
    /// Whether this failure means the session handle is dead and a full
    /// re-initialization is required before retrying.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, AutomationError::SessionLost)
    }
}
