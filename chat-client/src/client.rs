//! ChatClient - the main interface for Chatify.
//!
//! This module provides [`ChatClient`], the API applications use to sign
//! in, open a conversation, and send or delete messages.
//!
//! # Architecture
//!
//! ChatClient keeps the pure state (from chatify-core) behind async locks
//! and performs the actual I/O via the Gateway trait.
//!
//! ```text
//! Application → ChatClient → Gateway → Network
//!                   ↓
//!              chatify-core (MessageStore, SessionState, TicketAttempt)
//! ```
//!
//! Sends and deletes are optimistic: the list changes first, the server
//! call follows, and the outcome is reconciled by [`Handle`]. Each result
//! is applied only if the session epoch it was issued under is still
//! current; snapshots additionally require their conversation activation
//! to be current.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use chatify_core::{
    content, directory, guard, ContentError, Epoch, GuardDecision, Handle, MessageStore,
    RedirectReason, SessionAction, SnapshotOutcome, StoreError, TokenClaims,
};
use chatify_types::{
    BearerToken, Conversation, ConversationId, Credential, GatewayError, Message, MessageId,
    Profile, UserId, UserSummary,
};

use crate::config::ClientConfig;
use crate::credentials::{
    CredentialCache, CredentialStore, FileCredentialCache, MemoryCredentialCache,
};
use crate::csrf::CsrfManager;
use crate::gateway::{Gateway, HttpGateway, Registration};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No credential is held.
    #[error("not signed in")]
    NotAuthenticated,

    /// No conversation is open.
    #[error("no active conversation")]
    NoActiveConversation,

    /// No Failed message with this handle.
    #[error("no failed message for {0}")]
    UnknownHandle(Handle),

    /// Message content rejected before sending.
    #[error("invalid content: {0}")]
    Content(#[from] ContentError),

    /// Remote call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoActiveConversation => ClientError::NoActiveConversation,
        }
    }
}

/// Result of a send after the server answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The entry is Confirmed with this server id.
    Confirmed(MessageId),
    /// The entry is Failed and can be retried or discarded.
    Failed(GatewayError),
    /// The result arrived after the session or list moved on and was dropped.
    Discarded,
}

/// What happened to one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Handle of the list entry.
    pub handle: Handle,
    /// Final state of the send.
    pub outcome: SendOutcome,
}

/// Result of a successful (or ignored) delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The message is gone locally and on the server.
    Removed,
    /// No visible message had this id.
    AlreadyRemoved,
    /// The result arrived after the session ended and was dropped.
    Discarded,
}

/// Result of opening a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    /// The conversation that was opened.
    pub conversation_id: ConversationId,
    /// How the fetched snapshot was applied.
    pub outcome: SnapshotOutcome,
}

/// The main chat client.
///
/// Owns the credential store, ticket manager and message store. Safe to
/// share between tasks; operations may overlap.
pub struct ChatClient<G: Gateway> {
    config: ClientConfig,
    gateway: Arc<G>,
    credentials: CredentialStore,
    csrf: CsrfManager<G>,
    store: Mutex<MessageStore>,
}

impl ChatClient<HttpGateway> {
    /// Create a client talking HTTP to the configured server.
    ///
    /// The credential is persisted to `config.credential_cache` if set,
    /// otherwise kept in memory.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let gateway = HttpGateway::from_config(&config)?;
        let cache: Arc<dyn CredentialCache> = match &config.credential_cache {
            Some(path) => Arc::new(FileCredentialCache::new(path.clone())),
            None => Arc::new(MemoryCredentialCache::new()),
        };
        Ok(Self::new(config, gateway, cache))
    }
}

impl<G: Gateway> ChatClient<G> {
    /// Create a new ChatClient.
    pub fn new(config: ClientConfig, gateway: G, cache: Arc<dyn CredentialCache>) -> Self {
        let gateway = Arc::new(gateway);
        Self {
            config,
            csrf: CsrfManager::new(Arc::clone(&gateway)),
            gateway,
            credentials: CredentialStore::new(cache),
            store: Mutex::new(MessageStore::new()),
        }
    }

    // ===========================================
    // Session
    // ===========================================

    /// Load the cached credential. Call once at startup.
    pub async fn restore(&self) -> Option<Credential> {
        let restored = self.credentials.restore().await;
        if let Some(credential) = &restored {
            tracing::info!("restored session for {}", credential.profile.username);
        }
        restored
    }

    /// Decide whether a protected view may be mounted.
    ///
    /// An expired token (only detected with
    /// [`chatify_core::ExpiryPolicy::JwtExp`]) is cleared before redirecting.
    pub async fn guard(&self) -> GuardDecision {
        let credential = self.credentials.get();
        let now_secs = crate::unix_millis() / 1000;
        let decision = guard::check(credential.as_ref(), self.config.expiry_policy, now_secs);
        if decision == GuardDecision::Redirect(RedirectReason::Expired) {
            tracing::info!("session token expired, signing out");
            self.logout().await;
        }
        decision
    }

    /// Sign in with username and password.
    ///
    /// Identity fields missing from the response are taken from the token's
    /// claims. Replaces any current session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Profile, ClientError> {
        let ticket = self.csrf.acquire_anonymous().await?;
        let grant = self.gateway.login(&ticket, username, password).await?;

        let claims = TokenClaims::decode(grant.token.expose())
            .map(|claims| claims.to_partial_profile())
            .unwrap_or_default();
        let profile = grant
            .profile
            .or(claims)
            .into_profile()
            .map_err(GatewayError::from)?;

        let actions = self
            .credentials
            .set(Credential::new(grant.token, profile.clone()))
            .await;
        self.run_session_actions(actions).await;
        tracing::info!("signed in as {}", profile.username);
        Ok(profile)
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, registration: &Registration) -> Result<(), ClientError> {
        let ticket = self.csrf.acquire_anonymous().await?;
        self.gateway.register(&ticket, registration).await?;
        tracing::info!("registered {}", registration.username);
        Ok(())
    }

    /// Sign out and drop all session state.
    ///
    /// Results of requests still in flight are discarded when they arrive.
    pub async fn logout(&self) {
        let actions = self.credentials.clear().await;
        self.run_session_actions(actions).await;
        tracing::info!("signed out");
    }

    /// Delete the signed-in account, then sign out.
    pub async fn delete_account(&self) -> Result<(), ClientError> {
        let (credential, epoch) = self.require_session().await?;
        let token = &credential.token;
        let gateway = self.gateway.as_ref();
        self.csrf
            .run_mutation(token, |ticket| async move {
                gateway.delete_account(token, &ticket).await
            })
            .await?;

        if self.credentials.epoch().await == epoch {
            let actions = self.credentials.account_deleted().await;
            self.run_session_actions(actions).await;
            tracing::info!("account deleted");
        }
        Ok(())
    }

    /// The current credential, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.credentials.get()
    }

    /// Watch credential changes (sign-in, profile refresh, sign-out).
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.credentials.subscribe()
    }

    // ===========================================
    // Conversations
    // ===========================================

    /// Open a conversation and load its messages.
    ///
    /// With `None`, a new conversation id is minted. Reopening the active
    /// conversation after its snapshot loaded does nothing. A fetch failure
    /// is returned; the conversation stays open and can be reopened to try
    /// again.
    pub async fn open_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> Result<OpenReport, ClientError> {
        let (credential, epoch) = self.require_session().await?;
        let conversation_id = conversation_id.unwrap_or_else(ConversationId::generate);

        let activation = {
            let mut store = self.store.lock().await;
            match store.current_activation() {
                Some(current) if current.conversation_id() == &conversation_id => {
                    if store.is_loaded() {
                        return Ok(OpenReport {
                            conversation_id,
                            outcome: SnapshotOutcome::AlreadyLoaded,
                        });
                    }
                    current
                }
                _ => store.activate(conversation_id.clone()),
            }
        };

        // Mutations need a ticket later; failing here must not block reading.
        if let Err(e) = self.csrf.acquire_session(&credential.token).await {
            tracing::warn!("could not acquire session ticket: {}", e);
        }

        let result = self
            .gateway
            .fetch_messages(&credential.token, &conversation_id)
            .await;

        let mut store = self.store.lock().await;
        if self.credentials.epoch().await != epoch || !store.is_current(&activation) {
            tracing::debug!("discarding stale snapshot for {}", conversation_id);
            return Ok(OpenReport {
                conversation_id,
                outcome: SnapshotOutcome::Stale,
            });
        }
        match result {
            Ok(list) => {
                let outcome = store.apply_snapshot(&activation, list);
                tracing::debug!("opened {}: {:?}", conversation_id, outcome);
                Ok(OpenReport {
                    conversation_id,
                    outcome,
                })
            }
            Err(e) => {
                tracing::warn!("failed to fetch messages for {}: {}", conversation_id, e);
                Err(e.into())
            }
        }
    }

    /// Start a conversation with the given participants under a new id.
    pub async fn start_conversation(
        &self,
        participant_ids: Vec<UserId>,
    ) -> Result<Conversation, ClientError> {
        let conversation = Conversation::start(participant_ids);
        self.open_conversation(Some(conversation.id.clone())).await?;
        Ok(conversation)
    }

    /// The active conversation id.
    pub async fn active_conversation(&self) -> Option<ConversationId> {
        self.store.lock().await.active_conversation().cloned()
    }

    /// The visible message list, in order.
    pub async fn messages(&self) -> Vec<Message> {
        self.store.lock().await.messages()
    }

    /// The visible message list paired with each entry's handle.
    pub async fn entries(&self) -> Vec<(Handle, Message)> {
        let store = self.store.lock().await;
        store.handles().into_iter().zip(store.messages()).collect()
    }

    // ===========================================
    // Messages
    // ===========================================

    /// Send a message to the active conversation.
    ///
    /// A Pending entry is appended before the server call. Content that is
    /// empty after trimming is rejected without touching the list.
    pub async fn send(&self, raw: &str) -> Result<SendReport, ClientError> {
        let content = content::prepare(raw)?;
        let (credential, epoch) = self.require_session().await?;

        let (handle, conversation_id) = {
            let mut store = self.store.lock().await;
            let conversation_id = store
                .active_conversation()
                .cloned()
                .ok_or(ClientError::NoActiveConversation)?;
            let handle =
                store.append_optimistic(content.clone(), &credential.profile, crate::unix_millis())?;
            (handle, conversation_id)
        };

        let outcome = self
            .deliver(handle, &credential.token, epoch, &conversation_id, &content)
            .await;
        Ok(SendReport { handle, outcome })
    }

    /// Resend a Failed message in place.
    pub async fn retry(&self, handle: Handle) -> Result<SendReport, ClientError> {
        let (credential, epoch) = self.require_session().await?;

        let (content, conversation_id) = {
            let mut store = self.store.lock().await;
            let conversation_id = store
                .active_conversation()
                .cloned()
                .ok_or(ClientError::NoActiveConversation)?;
            let content = store
                .retry(handle)
                .ok_or(ClientError::UnknownHandle(handle))?;
            (content, conversation_id)
        };

        let outcome = self
            .deliver(handle, &credential.token, epoch, &conversation_id, &content)
            .await;
        Ok(SendReport { handle, outcome })
    }

    /// Drop a Failed message from the list without sending it.
    pub async fn discard(&self, handle: Handle) -> Result<Message, ClientError> {
        self.store
            .lock()
            .await
            .discard(handle)
            .ok_or(ClientError::UnknownHandle(handle))
    }

    /// Delete a confirmed message.
    ///
    /// The message disappears at once. If the server call fails it is put
    /// back at its original position and the error is returned. A message
    /// the server no longer has counts as removed.
    pub async fn delete(&self, id: &MessageId) -> Result<DeleteOutcome, ClientError> {
        let (credential, epoch) = self.require_session().await?;

        let Some(removal) = self.store.lock().await.remove(id) else {
            return Ok(DeleteOutcome::AlreadyRemoved);
        };

        let token = &credential.token;
        let gateway = self.gateway.as_ref();
        let result = self
            .csrf
            .run_mutation(token, |ticket| async move {
                gateway.delete_message(token, &ticket, id).await
            })
            .await;

        let mut store = self.store.lock().await;
        if self.credentials.epoch().await != epoch {
            tracing::debug!("discarding delete result for {} from previous session", id);
            return Ok(DeleteOutcome::Discarded);
        }
        match result {
            Ok(()) => Ok(DeleteOutcome::Removed),
            Err(GatewayError::NotFound(_)) => {
                tracing::debug!("message {} was already gone on the server", id);
                Ok(DeleteOutcome::Removed)
            }
            Err(e) => {
                if store.restore(removal) {
                    tracing::warn!("delete of {} failed, restored: {}", id, e);
                } else {
                    tracing::warn!("delete of {} failed: {}", id, e);
                }
                Err(e.into())
            }
        }
    }

    // ===========================================
    // Users
    // ===========================================

    /// The signed-in user's profile.
    ///
    /// Served from the credential when username and email are known;
    /// otherwise fetched and written back into the credential.
    pub async fn profile(&self) -> Result<Profile, ClientError> {
        let (credential, epoch) = self.require_session().await?;
        let cached = &credential.profile;
        if !cached.username.is_empty() && cached.email.is_some() {
            return Ok(cached.clone());
        }

        let fetched = self
            .gateway
            .fetch_user_profile(&credential.token, None)
            .await?;
        if self.credentials.epoch().await == epoch {
            let actions = self.credentials.update_profile(fetched.clone()).await;
            self.run_session_actions(actions).await;
        }
        Ok(fetched)
    }

    /// Another user's profile.
    pub async fn user_profile(&self, user_id: &UserId) -> Result<Profile, ClientError> {
        let (credential, _) = self.require_session().await?;
        Ok(self
            .gateway
            .fetch_user_profile(&credential.token, Some(user_id))
            .await?)
    }

    /// Directory users whose name contains `filter`, ignoring case.
    pub async fn users(&self, filter: &str) -> Result<Vec<UserSummary>, ClientError> {
        let (credential, _) = self.require_session().await?;
        let users = self.gateway.list_users(&credential.token).await?;
        Ok(directory::filter_users(users, filter))
    }

    /// Get a reference to the underlying gateway (for testing).
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    // ===========================================
    // Internals
    // ===========================================

    async fn require_session(&self) -> Result<(Credential, Epoch), ClientError> {
        match self.credentials.session().await {
            (Some(credential), epoch) => Ok((credential, epoch)),
            (None, _) => Err(ClientError::NotAuthenticated),
        }
    }

    async fn run_session_actions(&self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::DropTicket => self.csrf.invalidate().await,
                SessionAction::ResetMessages => self.store.lock().await.reset(),
                // Persistence and notification happen inside the store.
                _ => {}
            }
        }
    }

    async fn deliver(
        &self,
        handle: Handle,
        token: &BearerToken,
        epoch: Epoch,
        conversation_id: &ConversationId,
        content: &str,
    ) -> SendOutcome {
        let gateway = self.gateway.as_ref();
        let result = self
            .csrf
            .run_mutation(token, |ticket| async move {
                gateway
                    .send_message(token, &ticket, content, conversation_id)
                    .await
            })
            .await;

        let mut store = self.store.lock().await;
        if self.credentials.epoch().await != epoch {
            tracing::debug!("discarding send result for {} from previous session", handle);
            return SendOutcome::Discarded;
        }
        match result {
            Ok(message) => match message.id.clone() {
                Some(id) if store.confirm(handle, message) => SendOutcome::Confirmed(id),
                Some(_) => SendOutcome::Discarded,
                None => {
                    store.mark_failed(handle);
                    SendOutcome::Failed(GatewayError::Validation(
                        "server returned a message without id".into(),
                    ))
                }
            },
            Err(e) => {
                if store.mark_failed(handle) {
                    tracing::warn!("send of {} failed: {}", handle, e);
                    SendOutcome::Failed(e)
                } else {
                    SendOutcome::Discarded
                }
            }
        }
    }
}

impl<G: Gateway> std::fmt::Debug for ChatClient<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
