//! # chatify-types
//!
//! Shared types for the Chatify message sync engine.
//!
//! This crate provides the foundational types used across all crates:
//! - [`MessageId`], [`ConversationId`], [`UserId`] - Identity types
//! - [`Message`], [`Conversation`], [`DeliveryState`] - Conversation data
//! - [`Credential`], [`CsrfTicket`], [`Profile`] - Session material
//! - [`wire`] - JSON schemas validated at the network boundary
//! - [`GatewayError`] - Error taxonomy for remote calls

#![warn(missing_docs)]
#![warn(clippy::all)]

mod credential;
mod error;
mod ids;
mod message;
pub mod wire;

pub use credential::{
    BearerToken, Credential, CredentialRecord, CsrfTicket, Profile, UserSummary,
};
pub use error::{AuthFailure, GatewayError, SchemaError};
pub use ids::{ConversationId, MessageId, UserId};
pub use message::{Conversation, DeliveryState, Message};
