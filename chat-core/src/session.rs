//! Session state machine for the chat engine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! credential lifecycle. It takes events as input and produces a new state
//! plus a list of actions to execute.
//!
//! Every transition that changes who is signed in also advances the
//! [`Epoch`]. Results of requests issued under an older epoch are discarded
//! by the client, since in-flight requests cannot be cancelled.

use chatify_types::{Credential, Profile};

/// Monotonic counter identifying one signed-in (or signed-out) period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    /// Numeric value of the epoch.
    pub fn value(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Credential lifecycle - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No credential.
    SignedOut {
        /// Current epoch.
        epoch: Epoch,
    },
    /// A credential is held.
    SignedIn {
        /// The credential in use.
        credential: Credential,
        /// Current epoch.
        epoch: Epoch,
    },
}

impl SessionState {
    /// Create a new state machine in the SignedOut state.
    pub fn new() -> Self {
        Self::SignedOut {
            epoch: Epoch::default(),
        }
    }

    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: SessionEvent) -> (Self, Vec<SessionAction>) {
        match (self, event) {
            // Restoring never overrides a live session, and the credential
            // came from the cache so it is not written back.
            (Self::SignedOut { epoch }, SessionEvent::Restored(credential)) => (
                Self::SignedIn {
                    credential,
                    epoch: epoch.next(),
                },
                vec![SessionAction::Notify],
            ),

            (state, SessionEvent::SignedIn(credential)) => (
                Self::SignedIn {
                    credential,
                    epoch: state.epoch().next(),
                },
                vec![
                    SessionAction::PersistCredential,
                    SessionAction::DropTicket,
                    SessionAction::ResetMessages,
                    SessionAction::Notify,
                ],
            ),

            (Self::SignedIn { credential, epoch }, SessionEvent::ProfileUpdated(profile))
                if credential.profile.user_id == profile.user_id =>
            {
                let credential = Credential::new(credential.token.clone(), profile);
                (
                    Self::SignedIn { credential, epoch },
                    vec![SessionAction::PersistCredential, SessionAction::Notify],
                )
            }

            (Self::SignedIn { epoch, .. }, SessionEvent::SignedOut | SessionEvent::AccountDeleted) => (
                Self::SignedOut {
                    epoch: epoch.next(),
                },
                vec![
                    SessionAction::ClearCache,
                    SessionAction::DropTicket,
                    SessionAction::ResetMessages,
                    SessionAction::Notify,
                ],
            ),

            // Signing out while signed out still wipes whatever is cached.
            (Self::SignedOut { epoch }, SessionEvent::SignedOut | SessionEvent::AccountDeleted) => {
                (Self::SignedOut { epoch }, vec![SessionAction::ClearCache])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Current epoch.
    pub fn epoch(&self) -> Epoch {
        match self {
            Self::SignedOut { epoch } | Self::SignedIn { epoch, .. } => *epoch,
        }
    }

    /// The credential, if signed in.
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::SignedIn { credential, .. } => Some(credential),
            Self::SignedOut { .. } => None,
        }
    }

    /// Check if a credential is held.
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn { .. })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events in the credential lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A credential was read from the local cache at startup.
    Restored(Credential),
    /// Login succeeded.
    SignedIn(Credential),
    /// Fresh profile fields for the signed-in user.
    ProfileUpdated(Profile),
    /// Explicit logout.
    SignedOut,
    /// The account was deleted on the server.
    AccountDeleted,
}

/// Actions to be executed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Write the current credential to the cache.
    PersistCredential,
    /// Remove the cached credential.
    ClearCache,
    /// Forget the current anti-forgery ticket.
    DropTicket,
    /// Clear the message store.
    ResetMessages,
    /// Notify subscribers of the new state.
    Notify,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatify_types::{BearerToken, UserId};

    fn credential(token: &str) -> Credential {
        Credential::new(
            BearerToken::new(token),
            Profile {
                user_id: UserId::new("u1"),
                username: "alice".into(),
                email: None,
                avatar: None,
            },
        )
    }

    #[test]
    fn starts_signed_out() {
        let state = SessionState::new();
        assert!(!state.is_signed_in());
        assert_eq!(state.epoch().value(), 0);
    }

    #[test]
    fn sign_in_persists_and_advances_epoch() {
        let (state, actions) = SessionState::new().on_event(SessionEvent::SignedIn(credential("t1")));

        assert!(state.is_signed_in());
        assert_eq!(state.epoch().value(), 1);
        assert!(actions.contains(&SessionAction::PersistCredential));
        assert!(actions.contains(&SessionAction::Notify));
    }

    #[test]
    fn restore_does_not_persist() {
        let (state, actions) = SessionState::new().on_event(SessionEvent::Restored(credential("t1")));

        assert!(state.is_signed_in());
        assert_eq!(actions, vec![SessionAction::Notify]);
    }

    #[test]
    fn restore_never_overrides_live_session() {
        let (state, _) = SessionState::new().on_event(SessionEvent::SignedIn(credential("live")));
        let (state, actions) = state.on_event(SessionEvent::Restored(credential("cached")));

        assert!(actions.is_empty());
        assert_eq!(state.credential().unwrap().token.expose(), "live");
    }

    #[test]
    fn sign_out_clears_everything() {
        let (state, _) = SessionState::new().on_event(SessionEvent::SignedIn(credential("t1")));
        let (state, actions) = state.on_event(SessionEvent::SignedOut);

        assert!(!state.is_signed_in());
        assert_eq!(state.epoch().value(), 2);
        for action in [
            SessionAction::ClearCache,
            SessionAction::DropTicket,
            SessionAction::ResetMessages,
            SessionAction::Notify,
        ] {
            assert!(actions.contains(&action));
        }
    }

    #[test]
    fn account_deletion_behaves_like_sign_out() {
        let (state, _) = SessionState::new().on_event(SessionEvent::SignedIn(credential("t1")));
        let (a, a_actions) = state.clone().on_event(SessionEvent::SignedOut);
        let (b, b_actions) = state.on_event(SessionEvent::AccountDeleted);

        assert_eq!(a, b);
        assert_eq!(a_actions, b_actions);
    }

    #[test]
    fn relogin_advances_epoch() {
        let (state, _) = SessionState::new().on_event(SessionEvent::SignedIn(credential("t1")));
        let before = state.epoch();
        let (state, actions) = state.on_event(SessionEvent::SignedIn(credential("t2")));

        assert!(state.epoch() > before);
        assert!(actions.contains(&SessionAction::ResetMessages));
    }

    #[test]
    fn profile_update_keeps_epoch_and_token() {
        let (state, _) = SessionState::new().on_event(SessionEvent::SignedIn(credential("t1")));
        let epoch = state.epoch();
        let (state, actions) = state.on_event(SessionEvent::ProfileUpdated(Profile {
            user_id: UserId::new("u1"),
            username: "alice".into(),
            email: Some("a@example.com".into()),
            avatar: None,
        }));

        assert_eq!(state.epoch(), epoch);
        let credential = state.credential().unwrap();
        assert_eq!(credential.token.expose(), "t1");
        assert_eq!(credential.profile.email.as_deref(), Some("a@example.com"));
        assert!(actions.contains(&SessionAction::PersistCredential));
    }

    #[test]
    fn profile_update_for_other_user_is_ignored() {
        let (state, _) = SessionState::new().on_event(SessionEvent::SignedIn(credential("t1")));
        let (state, actions) = state.on_event(SessionEvent::ProfileUpdated(Profile {
            user_id: UserId::new("someone-else"),
            username: "mallory".into(),
            email: None,
            avatar: None,
        }));

        assert!(actions.is_empty());
        assert_eq!(state.credential().unwrap().profile.username, "alice");
    }

    #[test]
    fn sign_out_when_signed_out_only_clears_cache() {
        let (state, actions) = SessionState::new().on_event(SessionEvent::SignedOut);
        assert_eq!(state.epoch().value(), 0);
        assert_eq!(actions, vec![SessionAction::ClearCache]);
    }
}
