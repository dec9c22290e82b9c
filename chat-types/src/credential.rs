//! Credential and anti-forgery ticket types.
//!
//! Secret values never appear in `Debug` output. The bearer token is
//! zeroized when dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::UserId;

/// Opaque bearer token carried on every authenticated request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Intentionally opaque debug to avoid logging secrets
impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken([REDACTED])")
    }
}

/// Identity fields of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Account id.
    pub user_id: UserId,
    /// Login / display name.
    pub username: String,
    /// Email address, if known.
    pub email: Option<String>,
    /// Avatar reference (usually a URL), if any.
    pub avatar: Option<String>,
}

/// Entry in the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// Account id.
    pub user_id: UserId,
    /// Username.
    pub username: String,
    /// Avatar reference, if any.
    pub avatar: Option<String>,
}

/// The current authentication credential: token plus identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token.
    pub token: BearerToken,
    /// Identity of the token holder.
    pub profile: Profile,
}

impl Credential {
    /// Create a credential from a token and profile.
    pub fn new(token: BearerToken, profile: Profile) -> Self {
        Self { token, profile }
    }

    /// Flatten into the persisted record.
    pub fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            token: self.token.expose().to_string(),
            user_id: self.profile.user_id.as_str().to_string(),
            user_name: self.profile.username.clone(),
            email: self.profile.email.clone(),
            avatar: self.profile.avatar.clone(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token)
            .field("profile", &self.profile)
            .finish()
    }
}

/// Minimal field set persisted for session restore.
///
/// Field names match the keys the web client kept in local storage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    /// Bearer token.
    pub token: String,
    /// Account id.
    pub user_id: String,
    /// Username.
    pub user_name: String,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl CredentialRecord {
    /// Rebuild a credential. Returns `None` if the token or user id is blank.
    pub fn into_credential(self) -> Option<Credential> {
        if self.token.trim().is_empty() || self.user_id.trim().is_empty() {
            return None;
        }
        Some(Credential::new(
            BearerToken::new(self.token.clone()),
            Profile {
                user_id: UserId::new(self.user_id.clone()),
                username: self.user_name.clone(),
                email: self.email.clone(),
                avatar: self.avatar.clone(),
            },
        ))
    }
}

impl Drop for CredentialRecord {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}

/// Short-lived anti-forgery ticket required on mutating calls.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfTicket {
    value: String,
    acquired_at: u64,
}

impl CsrfTicket {
    /// Create a ticket acquired at the given unix-millisecond time.
    pub fn new(value: impl Into<String>, acquired_at: u64) -> Self {
        Self {
            value: value.into(),
            acquired_at,
        }
    }

    /// Raw value for the `X-CSRF-Token` header.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Acquisition time in unix milliseconds.
    pub fn acquired_at(&self) -> u64 {
        self.acquired_at
    }
}

impl fmt::Debug for CsrfTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfTicket")
            .field("value", &"[REDACTED]")
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new(
            BearerToken::new("secret-token"),
            Profile {
                user_id: UserId::new("7"),
                username: "alice".into(),
                email: Some("alice@example.com".into()),
                avatar: None,
            },
        )
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", credential());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn debug_redacts_ticket() {
        let ticket = CsrfTicket::new("csrf-value", 5);
        let debug = format!("{:?}", ticket);
        assert!(!debug.contains("csrf-value"));
        assert_eq!(ticket.value(), "csrf-value");
        assert_eq!(ticket.acquired_at(), 5);
    }

    #[test]
    fn record_uses_storage_keys() {
        let json = serde_json::to_value(credential().to_record()).unwrap();
        assert_eq!(json["token"], "secret-token");
        assert_eq!(json["userId"], "7");
        assert_eq!(json["userName"], "alice");
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("avatar").is_none());
    }

    #[test]
    fn record_restores_credential() {
        let original = credential();
        let restored = original.to_record().into_credential().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn blank_record_restores_nothing() {
        let record = CredentialRecord {
            token: "  ".into(),
            user_id: "7".into(),
            user_name: "alice".into(),
            email: None,
            avatar: None,
        };
        assert!(record.into_credential().is_none());
    }
}
