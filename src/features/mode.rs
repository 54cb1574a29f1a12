//! Execution-mode state machine.
//!
//! A run starts `Automated` (no visible browser surface) and may escalate to
//! `Assisted` (visible window, awaiting human action) at most once, when a
//! challenge is detected. Escalation tears the current session down and
//! restarts from navigation; once assisted, the rest of the run stays
//! assisted, and a further challenge suspends in place until a human clears
//! it or the bounded wait expires. Modeling this as an explicit two-state
//! machine bounds retries structurally — there is no self-restart recursion
//! to run away.

use chromiumoxide::Page;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::core::config::POLL_INTERVAL_MS;
use crate::core::SearchError;
use crate::features::challenge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Headless execution, no human-observable surface.
    Automated,
    /// Headed execution; a person can see the window and clear challenges.
    Assisted,
}

impl ExecutionMode {
    pub fn is_assisted(&self) -> bool {
        matches!(self, ExecutionMode::Assisted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Automated => "automated",
            ExecutionMode::Assisted => "assisted",
        }
    }
}

/// Tracks the single permitted `Automated → Assisted` transition of a run.
#[derive(Debug)]
pub struct ModeController {
    mode: ExecutionMode,
    escalated: bool,
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: ExecutionMode::Automated,
            escalated: false,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Whether the escalation transition is still available.
    pub fn can_escalate(&self) -> bool {
        !self.escalated && self.mode == ExecutionMode::Automated
    }

    /// Fire the one-shot `Automated → Assisted` transition. Returns `false`
    /// when the transition has already been spent.
    pub fn escalate(&mut self) -> bool {
        if !self.can_escalate() {
            return false;
        }
        self.mode = ExecutionMode::Assisted;
        self.escalated = true;
        info!("mode: escalating to assisted execution");
        true
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

/// Assisted-mode suspension: poll until the page navigates away from every
/// challenge-marker URL, bounded by `timeout`.
///
/// Resolves as soon as the live location is clear; a bounded wait that
/// expires surfaces as [`SearchError::ChallengeUnresolved`].
pub async fn wait_for_challenge_resolution(
    page: &Page,
    timeout: Duration,
) -> Result<(), SearchError> {
    let start = Instant::now();
    info!(
        "mode: challenge visible — waiting up to {}s for human resolution",
        timeout.as_secs()
    );
    loop {
        let url = challenge::current_url(page).await;
        if !challenge::is_challenge_url(&url) {
            info!(
                "mode: challenge cleared after {}s",
                start.elapsed().as_secs()
            );
            return Ok(());
        }
        if start.elapsed() >= timeout {
            warn!("mode: challenge still present after {}s", timeout.as_secs());
            return Err(SearchError::ChallengeUnresolved);
        }
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_automated() {
        let ctl = ModeController::new();
        assert_eq!(ctl.mode(), ExecutionMode::Automated);
        assert!(ctl.can_escalate());
    }

    #[test]
    fn escalates_exactly_once() {
        let mut ctl = ModeController::new();
        assert!(ctl.escalate());
        assert_eq!(ctl.mode(), ExecutionMode::Assisted);
        assert!(!ctl.can_escalate());
        assert!(!ctl.escalate());
        assert_eq!(ctl.mode(), ExecutionMode::Assisted);
    }

    #[test]
    fn assisted_never_returns_to_automated() {
        let mut ctl = ModeController::new();
        ctl.escalate();
        for _ in 0..3 {
            assert!(!ctl.escalate());
            assert!(ctl.mode().is_assisted());
        }
    }
}
