//! Mock gateway for testing.
//!
//! Holds an in-memory model of the server, records every call, and allows
//! forcing failures or holding a response back until the test releases it.

use super::{Gateway, LoginGrant, Registration};
use async_trait::async_trait;
use chatify_types::wire::PartialProfile;
use chatify_types::{
    AuthFailure, BearerToken, ConversationId, CsrfTicket, DeliveryState, GatewayError, Message,
    MessageId, Profile, UserId, UserSummary,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Gateway operations, used to target forced failures and held responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `acquire_anonymous_ticket`
    AnonymousTicket,
    /// `acquire_session_ticket`
    SessionTicket,
    /// `login`
    Login,
    /// `register`
    Register,
    /// `fetch_messages`
    FetchMessages,
    /// `send_message`
    SendMessage,
    /// `delete_message`
    DeleteMessage,
    /// `fetch_user_profile`
    FetchProfile,
    /// `list_users`
    ListUsers,
    /// `delete_account`
    DeleteAccount,
}

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// Anonymous ticket request.
    AnonymousTicket,
    /// Session ticket request.
    SessionTicket {
        /// Bearer token sent.
        token: String,
    },
    /// Login attempt.
    Login {
        /// Ticket sent.
        ticket: String,
        /// Username sent.
        username: String,
    },
    /// Registration attempt.
    Register {
        /// Ticket sent.
        ticket: String,
        /// Username sent.
        username: String,
    },
    /// Message fetch.
    FetchMessages {
        /// Bearer token sent.
        token: String,
        /// Conversation requested.
        conversation_id: String,
    },
    /// Message send.
    SendMessage {
        /// Bearer token sent.
        token: String,
        /// Ticket sent.
        ticket: String,
        /// Content sent.
        content: String,
        /// Target conversation.
        conversation_id: String,
    },
    /// Message delete.
    DeleteMessage {
        /// Bearer token sent.
        token: String,
        /// Ticket sent.
        ticket: String,
        /// Message id.
        id: String,
    },
    /// Profile fetch (`None` for own profile).
    FetchProfile {
        /// Bearer token sent.
        token: String,
        /// Requested user.
        user_id: Option<String>,
    },
    /// Directory listing.
    ListUsers {
        /// Bearer token sent.
        token: String,
    },
    /// Account deletion.
    DeleteAccount {
        /// Bearer token sent.
        token: String,
        /// Ticket sent.
        ticket: String,
    },
}

/// Mock gateway for testing.
///
/// Clones share state, so a test can keep a handle while the client owns
/// another.
#[derive(Debug, Default)]
pub struct MockGateway {
    inner: Arc<Mutex<MockGatewayInner>>,
}

#[derive(Debug, Default)]
struct MockGatewayInner {
    calls: Vec<GatewayCall>,
    conversations: HashMap<ConversationId, Vec<Message>>,
    logins: VecDeque<LoginGrant>,
    current_user: Option<Profile>,
    profiles: HashMap<UserId, Profile>,
    users: Vec<UserSummary>,
    failures: HashMap<Operation, VecDeque<GatewayError>>,
    gates: HashMap<Operation, VecDeque<oneshot::Receiver<()>>>,
    tickets_issued: u64,
    messages_created: u64,
}

impl MockGateway {
    /// Create a new mock gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockGatewayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the server-side message list of a conversation.
    pub fn set_messages(&self, conversation_id: &ConversationId, messages: Vec<Message>) {
        let mut inner = self.lock();
        inner
            .conversations
            .insert(conversation_id.clone(), messages);
    }

    /// Server-side message list of a conversation.
    pub fn server_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let inner = self.lock();
        inner
            .conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Queue the grant returned by the next successful `login()`.
    pub fn queue_login(&self, token: &str, profile: PartialProfile) {
        let mut inner = self.lock();
        inner.logins.push_back(LoginGrant {
            token: BearerToken::new(token),
            profile,
        });
    }

    /// Set the profile the server considers the caller, and list it.
    pub fn set_current_user(&self, profile: Profile) {
        let mut inner = self.lock();
        inner
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        inner.current_user = Some(profile);
    }

    /// Add a profile reachable by id and listed in the directory.
    pub fn add_user(&self, profile: Profile) {
        let mut inner = self.lock();
        inner.users.push(UserSummary {
            user_id: profile.user_id.clone(),
            username: profile.username.clone(),
            avatar: profile.avatar.clone(),
        });
        inner.profiles.insert(profile.user_id.clone(), profile);
    }

    /// Cause the next call of `operation` to fail with `error`.
    ///
    /// Failures queue up, so calling this twice fails the next two calls.
    pub fn fail_next(&self, operation: Operation, error: GatewayError) {
        let mut inner = self.lock();
        inner
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Cause the next `send_message()` to fail with the given error.
    pub fn fail_next_send(&self, error: GatewayError) {
        self.fail_next(Operation::SendMessage, error);
    }

    /// Cause the next `delete_message()` to fail with the given error.
    pub fn fail_next_delete(&self, error: GatewayError) {
        self.fail_next(Operation::DeleteMessage, error);
    }

    /// Cause the next `fetch_messages()` to fail with the given error.
    pub fn fail_next_fetch(&self, error: GatewayError) {
        self.fail_next(Operation::FetchMessages, error);
    }

    /// Hold the response of the next call of `operation` until the returned
    /// sender fires (or is dropped).
    pub fn hold_next(&self, operation: Operation) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.gates.entry(operation).or_default().push_back(rx);
        tx
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<GatewayCall> {
        let inner = self.lock();
        inner.calls.clone()
    }

    /// Number of recorded calls of `operation`.
    pub fn count(&self, operation: Operation) -> usize {
        let inner = self.lock();
        inner
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Get the last call that was recorded.
    pub fn last_call(&self) -> Option<GatewayCall> {
        let inner = self.lock();
        inner.calls.last().cloned()
    }

    /// Clear all state (calls, data, failures, gates).
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = MockGatewayInner::default();
    }

    /// Record the call, then take its forced failure and gate, if any.
    fn begin(
        &self,
        call: GatewayCall,
    ) -> (Option<GatewayError>, Option<oneshot::Receiver<()>>) {
        let operation = call.operation();
        let mut inner = self.lock();
        inner.calls.push(call);
        let failure = inner
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        let gate = inner.gates.get_mut(&operation).and_then(VecDeque::pop_front);
        (failure, gate)
    }

    async fn enter(&self, call: GatewayCall) -> Result<(), GatewayError> {
        let (failure, gate) = self.begin(call);
        if let Some(gate) = gate {
            // A dropped sender releases the response too.
            let _ = gate.await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn issue_ticket(&self, prefix: &str) -> CsrfTicket {
        let mut inner = self.lock();
        inner.tickets_issued += 1;
        CsrfTicket::new(format!("{}-{}", prefix, inner.tickets_issued), 0)
    }
}

impl Clone for MockGateway {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl GatewayCall {
    /// The operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            GatewayCall::AnonymousTicket => Operation::AnonymousTicket,
            GatewayCall::SessionTicket { .. } => Operation::SessionTicket,
            GatewayCall::Login { .. } => Operation::Login,
            GatewayCall::Register { .. } => Operation::Register,
            GatewayCall::FetchMessages { .. } => Operation::FetchMessages,
            GatewayCall::SendMessage { .. } => Operation::SendMessage,
            GatewayCall::DeleteMessage { .. } => Operation::DeleteMessage,
            GatewayCall::FetchProfile { .. } => Operation::FetchProfile,
            GatewayCall::ListUsers { .. } => Operation::ListUsers,
            GatewayCall::DeleteAccount { .. } => Operation::DeleteAccount,
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn acquire_anonymous_ticket(&self) -> Result<CsrfTicket, GatewayError> {
        self.enter(GatewayCall::AnonymousTicket).await?;
        Ok(self.issue_ticket("anon"))
    }

    async fn acquire_session_ticket(
        &self,
        token: &BearerToken,
    ) -> Result<CsrfTicket, GatewayError> {
        self.enter(GatewayCall::SessionTicket {
            token: token.expose().to_string(),
        })
        .await?;
        Ok(self.issue_ticket("ticket"))
    }

    async fn login(
        &self,
        ticket: &CsrfTicket,
        username: &str,
        _password: &str,
    ) -> Result<LoginGrant, GatewayError> {
        self.enter(GatewayCall::Login {
            ticket: ticket.value().to_string(),
            username: username.to_string(),
        })
        .await?;
        let mut inner = self.lock();
        inner
            .logins
            .pop_front()
            .ok_or(GatewayError::Auth(AuthFailure::CredentialRejected))
    }

    async fn register(
        &self,
        ticket: &CsrfTicket,
        registration: &Registration,
    ) -> Result<(), GatewayError> {
        self.enter(GatewayCall::Register {
            ticket: ticket.value().to_string(),
            username: registration.username.clone(),
        })
        .await?;
        let inner = self.lock();
        if inner
            .users
            .iter()
            .any(|u| u.username == registration.username)
        {
            return Err(GatewayError::Validation("username already taken".into()));
        }
        Ok(())
    }

    async fn fetch_messages(
        &self,
        token: &BearerToken,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, GatewayError> {
        // Snapshot at issue time so a held response reflects that moment.
        let snapshot = self.server_messages(conversation_id);
        self.enter(GatewayCall::FetchMessages {
            token: token.expose().to_string(),
            conversation_id: conversation_id.as_str().to_string(),
        })
        .await?;
        Ok(snapshot)
    }

    async fn send_message(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
        content: &str,
        conversation_id: &ConversationId,
    ) -> Result<Message, GatewayError> {
        self.enter(GatewayCall::SendMessage {
            token: token.expose().to_string(),
            ticket: ticket.value().to_string(),
            content: content.to_string(),
            conversation_id: conversation_id.as_str().to_string(),
        })
        .await?;

        let mut inner = self.lock();
        inner.messages_created += 1;
        let (sender_id, sender_display_name) = match &inner.current_user {
            Some(profile) => (profile.user_id.clone(), profile.username.clone()),
            None => (UserId::new("unknown"), "unknown".to_string()),
        };
        let message = Message {
            id: Some(MessageId::new(format!("m{}", inner.messages_created))),
            conversation_id: conversation_id.clone(),
            sender_id,
            sender_display_name,
            content: content.to_string(),
            created_at: inner.messages_created,
            delivery_state: DeliveryState::Confirmed,
        };
        inner
            .conversations
            .entry(conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn delete_message(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
        id: &MessageId,
    ) -> Result<(), GatewayError> {
        self.enter(GatewayCall::DeleteMessage {
            token: token.expose().to_string(),
            ticket: ticket.value().to_string(),
            id: id.as_str().to_string(),
        })
        .await?;

        let mut inner = self.lock();
        let mut found = false;
        for messages in inner.conversations.values_mut() {
            let before = messages.len();
            messages.retain(|m| m.id.as_ref() != Some(id));
            found |= messages.len() != before;
        }
        if found {
            Ok(())
        } else {
            Err(GatewayError::NotFound(format!("message {}", id)))
        }
    }

    async fn fetch_user_profile(
        &self,
        token: &BearerToken,
        user_id: Option<&UserId>,
    ) -> Result<Profile, GatewayError> {
        self.enter(GatewayCall::FetchProfile {
            token: token.expose().to_string(),
            user_id: user_id.map(|id| id.as_str().to_string()),
        })
        .await?;

        let inner = self.lock();
        let profile = match user_id {
            Some(id) => inner.profiles.get(id).cloned(),
            None => inner.current_user.clone(),
        };
        profile.ok_or_else(|| GatewayError::NotFound("user".into()))
    }

    async fn list_users(&self, token: &BearerToken) -> Result<Vec<UserSummary>, GatewayError> {
        self.enter(GatewayCall::ListUsers {
            token: token.expose().to_string(),
        })
        .await?;
        let inner = self.lock();
        Ok(inner.users.clone())
    }

    async fn delete_account(
        &self,
        token: &BearerToken,
        ticket: &CsrfTicket,
    ) -> Result<(), GatewayError> {
        self.enter(GatewayCall::DeleteAccount {
            token: token.expose().to_string(),
            ticket: ticket.value().to_string(),
        })
        .await?;
        let mut inner = self.lock();
        if let Some(profile) = inner.current_user.take() {
            inner.profiles.remove(&profile.user_id);
            inner.users.retain(|u| u.user_id != profile.user_id);
        }
        Ok(())
    }
}
