//! # chatify-client
//!
//! Client library for the Chatify message sync engine.
//!
//! This crate performs the I/O that `chatify-core` leaves out: it talks to
//! the chat server through a [`Gateway`], persists the credential through a
//! [`CredentialCache`], and applies results to the core state machines.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chatify_client::{ChatClient, ClientConfig, ConversationId};
//!
//! let client = ChatClient::from_config(ClientConfig::default())?;
//! client.restore().await;
//! if !client.guard().await.is_allowed() {
//!     client.login("alice", "secret").await?;
//! }
//!
//! client.open_conversation(Some(ConversationId::new("c1"))).await?;
//! let report = client.send("hi").await?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ChatClient ─┬─ CredentialStore ── CredentialCache (file / memory)
//!             ├─ CsrfManager ─────┐
//!             ├─ MessageStore     ├── Gateway (HTTP / mock)
//!             └───────────────────┘
//! ```
//!
//! Requests cannot be cancelled. Every result is checked against the
//! session epoch and conversation activation it was issued under, and is
//! dropped if either has moved on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod csrf;
pub mod gateway;

pub use client::{ChatClient, ClientError, DeleteOutcome, OpenReport, SendOutcome, SendReport};
pub use config::{ClientConfig, ConfigError};
pub use credentials::{
    CacheError, CredentialCache, CredentialStore, FileCredentialCache, MemoryCredentialCache,
};
pub use csrf::CsrfManager;
pub use gateway::{Gateway, HttpGateway, LoginGrant, MockGateway, Registration};

// Re-export the layers below so applications need a single dependency.
pub use chatify_core::{ExpiryPolicy, GuardDecision, Handle, RedirectReason, SnapshotOutcome};
pub use chatify_types::{
    AuthFailure, Conversation, ConversationId, Credential, DeliveryState, GatewayError, Message,
    MessageId, Profile, UserId, UserSummary,
};

/// Current wall-clock time in unix milliseconds.
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
