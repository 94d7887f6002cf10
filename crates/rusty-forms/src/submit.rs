// File: src/submit.rs
// Purpose: SubmissionController - Idle -> Validating -> {Accepted, Rejected}

use serde::Serialize;
use std::fmt;

/// Where a submission stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitState {
    #[default]
    Idle,
    Validating,
    /// Zero errors after every awaited evaluation settled; the callback ran
    Accepted,
    /// Errors remain and are left in the error map for display
    Rejected,
}

impl fmt::Display for SubmitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitState::Idle => write!(f, "idle"),
            SubmitState::Validating => write!(f, "validating"),
            SubmitState::Accepted => write!(f, "accepted"),
            SubmitState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Answer to a submit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRequest {
    /// A new validation pass was started
    Started,
    /// A pass is already running; this request joins it
    Coalesced,
}

/// Tracks the submit state machine. The form drives the transitions.
#[derive(Debug, Clone, Default)]
pub struct SubmissionController {
    state: SubmitState,
    attempts: u32,
    coalesced: u32,
}

impl SubmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SubmitState {
        self.state
    }

    /// Number of passes started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Requests folded into a running pass
    pub fn coalesced(&self) -> u32 {
        self.coalesced
    }

    pub fn is_validating(&self) -> bool {
        self.state == SubmitState::Validating
    }

    pub fn request(&mut self) -> SubmitRequest {
        if self.is_validating() {
            self.coalesced += 1;
            return SubmitRequest::Coalesced;
        }
        self.state = SubmitState::Validating;
        self.attempts += 1;
        SubmitRequest::Started
    }

    /// Settle the running pass. Has no effect unless validating.
    pub fn decide(&mut self, error_count: usize) -> SubmitState {
        if self.is_validating() {
            self.state = if error_count == 0 {
                SubmitState::Accepted
            } else {
                SubmitState::Rejected
            };
            tracing::info!("Submission #{} {} ({} errors)", self.attempts, self.state, error_count);
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_with_no_errors() {
        let mut controller = SubmissionController::new();
        assert_eq!(controller.state(), SubmitState::Idle);

        assert_eq!(controller.request(), SubmitRequest::Started);
        assert_eq!(controller.state(), SubmitState::Validating);
        assert_eq!(controller.decide(0), SubmitState::Accepted);
    }

    #[test]
    fn test_reject_with_errors() {
        let mut controller = SubmissionController::new();
        controller.request();
        assert_eq!(controller.decide(2), SubmitState::Rejected);
    }

    #[test]
    fn test_requests_while_validating_are_coalesced() {
        let mut controller = SubmissionController::new();
        assert_eq!(controller.request(), SubmitRequest::Started);
        assert_eq!(controller.request(), SubmitRequest::Coalesced);
        assert_eq!(controller.request(), SubmitRequest::Coalesced);

        assert_eq!(controller.attempts(), 1);
        assert_eq!(controller.coalesced(), 2);
    }

    #[test]
    fn test_decide_outside_validation_is_noop() {
        let mut controller = SubmissionController::new();
        assert_eq!(controller.decide(0), SubmitState::Idle);

        controller.request();
        controller.decide(1);
        assert_eq!(controller.decide(0), SubmitState::Rejected);

        assert_eq!(controller.request(), SubmitRequest::Started);
        assert_eq!(controller.attempts(), 2);
    }
}
