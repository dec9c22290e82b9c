//! Structural inspection of bearer tokens.
//!
//! The API issues JWTs. The payload segment is decoded without verifying
//! the signature; the result is only used to fill identity fields the login
//! response left out and, when enabled, to check the `exp` claim.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chatify_types::wire::{PartialProfile, WireId};
use serde::Deserialize;

/// Claims carried in the token payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Account id.
    pub id: Option<WireId>,
    /// Username.
    pub user: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar reference.
    pub avatar: Option<String>,
    /// Expiry, seconds since the unix epoch.
    pub exp: Option<u64>,
}

impl TokenClaims {
    /// Decode the payload segment of a JWT.
    ///
    /// Returns `None` for anything that is not a three-segment token with a
    /// base64url JSON payload.
    pub fn decode(token: &str) -> Option<Self> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return None;
        };
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Identity fields found in the claims.
    pub fn to_partial_profile(&self) -> PartialProfile {
        PartialProfile {
            user_id: self.id.as_ref().map(WireId::to_text),
            username: self.user.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Check whether the token has expired at `now_secs`.
    ///
    /// Tokens without an `exp` claim never expire.
    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.exp.is_some_and(|exp| exp <= now_secs)
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}
