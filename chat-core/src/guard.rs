//! Session guard for protected views.
//!
//! By default the guard only checks that a credential is present. It does
//! not ask the server whether the token is still valid. With
//! [`ExpiryPolicy::JwtExp`] it additionally inspects the token's `exp`
//! claim; tokens that cannot be decoded are let through.

use chatify_types::Credential;
use serde::{Deserialize, Serialize};

use crate::claims::TokenClaims;

/// How much the guard trusts a held credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Any credential is accepted.
    #[default]
    Presence,
    /// Credentials whose JWT `exp` claim has passed are rejected.
    JwtExp,
}

/// Why the guard sent the caller to the login entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    /// No credential is held.
    NoCredential,
    /// The credential's token has expired.
    Expired,
}

/// Outcome of guarding a protected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Mount the view.
    Proceed,
    /// Go to the authentication entry point instead.
    Redirect(RedirectReason),
}

impl GuardDecision {
    /// Check whether the view may be mounted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Proceed)
    }
}

/// Decide whether a protected view may be mounted.
pub fn check(credential: Option<&Credential>, policy: ExpiryPolicy, now_secs: u64) -> GuardDecision {
    let Some(credential) = credential else {
        return GuardDecision::Redirect(RedirectReason::NoCredential);
    };
    match policy {
        ExpiryPolicy::Presence => GuardDecision::Proceed,
        ExpiryPolicy::JwtExp => match TokenClaims::decode(credential.token.expose()) {
            Some(claims) if claims.is_expired(now_secs) => {
                GuardDecision::Redirect(RedirectReason::Expired)
            }
            _ => GuardDecision::Proceed,
        },
    }
}
