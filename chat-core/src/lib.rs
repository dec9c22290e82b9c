//! # chatify-core
//!
//! Pure logic for the Chatify message sync engine (no I/O, instant tests).
//!
//! This crate implements the state machines and reconciliation rules
//! without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`store`]: the ordered message list and its optimistic reconciliation
//! - [`session`]: credential lifecycle and epochs
//! - [`retry`]: the one-shot stale-ticket retry budget
//! - [`guard`]: the session guard for protected views
//!
//! The actual I/O (HTTP, credential cache) is performed by `chatify-client`,
//! which interprets the results of these modules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod claims;
pub mod content;
pub mod directory;
pub mod guard;
pub mod retry;
pub mod session;
pub mod store;

pub use claims::TokenClaims;
pub use content::ContentError;
pub use guard::{ExpiryPolicy, GuardDecision, RedirectReason};
pub use retry::{RetryDecision, TicketAttempt};
pub use session::{Epoch, SessionAction, SessionEvent, SessionState};
pub use store::{Activation, Handle, MessageStore, Removal, SnapshotOutcome, StoreError};
