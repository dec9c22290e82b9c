//! Remote gateway abstraction for Chatify.
//!
//! This module provides a pluggable boundary between the client and the
//! chat server (HTTP for production, mock for testing).
//!
//! # Design
//!
//! Every method is one request. Implementations validate response shapes
//! before returning, so callers only ever see domain types or a
//! [`GatewayError`]. Nothing here retries; the retry budget for stale
//! tickets is applied by [`crate::csrf::CsrfManager`].
//!
//! # Example
//!
//! ```ignore
//! let gateway = MockGateway::new();
//! let ticket = gateway.acquire_session_ticket(&token).await?;
//! let sent = gateway
//!     .send_message(&token, &ticket, "hi", &ConversationId::new("c1"))
//!     .await?;
//! ```

mod http;
mod mock;

pub use http::HttpGateway;
pub use mock::{GatewayCall, MockGateway, Operation};

use async_trait::async_trait;
use chatify_types::wire::PartialProfile;
use chatify_types::{
    BearerToken, ConversationId, CsrfTicket, GatewayError, Message, MessageId, Profile, UserId,
    UserSummary,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// What a successful login hands back.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    /// The bearer token for later calls.
    pub token: BearerToken,
    /// Identity fields the server included, if any.
    pub profile: PartialProfile,
}

/// Fields submitted when creating an account.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Registration {
    /// Desired username.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Password in clear text, wiped on drop.
    pub password: String,
    /// Optional avatar reference.
    pub avatar: Option<String>,
}

impl Registration {
    /// Create a registration without an avatar.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            avatar: None,
        }
    }

    /// Attach an avatar reference.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("avatar", &self.avatar)
            .finish()
    }
}

/// Gateway trait for talking to the chat server.
///
/// Authenticated calls take the bearer token explicitly so that each
/// request uses the credential held at the moment it was issued.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Obtain a ticket for the unauthenticated calls (login, register).
    async fn acquire_anonymous_ticket(&self) -> Result<CsrfTicket, GatewayError>;

    /// Obtain a ticket bound to the signed-in session.
    async fn acquire_session_ticket(&self, token: &BearerToken)
        -> Result<CsrfTicket, GatewayError>;

    /// Exchange username and password for a bearer token.
    async fn login(
        &self,
        ticket: &CsrfTicket,
        username: &str,
        password: &str,
    ) -> Result<LoginGrant, GatewayError>;

    /// Create an account. Does not sign in.
    async fn register(
        &self,
        ticket: &CsrfTicket,
        registration: &Registration,
    ) -> Result<(), GatewayError>;

    /// Fetch a conversation's messages in server order.
    async fn fetch_messages(
        &self,
        token: &BearerToken,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, GatewayError>;

    /// Post a message and return it with its server id.
    async fn send_message(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
        content: &str,
        conversation_id: &ConversationId,
    ) -> Result<Message, GatewayError>;

    /// Delete a message by server id.
    async fn delete_message(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
        id: &MessageId,
    ) -> Result<(), GatewayError>;

    /// Fetch a user's profile, or the caller's own when `user_id` is `None`.
    async fn fetch_user_profile(
        &self,
        token: &BearerToken,
        user_id: Option<&UserId>,
    ) -> Result<Profile, GatewayError>;

    /// List every user in the directory.
    async fn list_users(&self, token: &BearerToken) -> Result<Vec<UserSummary>, GatewayError>;

    /// Delete the caller's account.
    async fn delete_account(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
    ) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_debug_redacts_password() {
        let registration = Registration::new("amy", "amy@example.com", "hunter2").with_avatar("a.png");
        let debug = format!("{:?}", registration);

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("a.png"));
    }
}
