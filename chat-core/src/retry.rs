//! One-shot retry policy for mutating calls.
//!
//! A mutating call that is rejected because its anti-forgery ticket went
//! stale may be retried exactly once, after a fresh ticket is acquired. Any
//! other failure, or a second consecutive stale-ticket rejection, is
//! surfaced to the caller. Network failures are never retried since the
//! first attempt may have reached the server.

use chatify_types::GatewayError;

/// Where a mutating call is in its retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketAttempt {
    /// First attempt with the current ticket.
    #[default]
    First,
    /// Resent once with a freshly acquired ticket.
    Retried,
}

/// What the caller should do after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Acquire a fresh ticket and resend.
    Reacquire,
    /// Give up and return the error.
    Surface,
}

impl TicketAttempt {
    /// Start a new mutating call.
    pub fn new() -> Self {
        Self::First
    }

    /// Process a rejection and return the next attempt state plus decision.
    pub fn on_rejection(self, error: &GatewayError) -> (Self, RetryDecision) {
        match self {
            Self::First if error.is_stale_ticket() => (Self::Retried, RetryDecision::Reacquire),
            state => (state, RetryDecision::Surface),
        }
    }

    /// Number of sends made so far, counting the current one.
    pub fn sends(&self) -> u32 {
        match self {
            Self::First => 1,
            Self::Retried => 2,
        }
    }
}
