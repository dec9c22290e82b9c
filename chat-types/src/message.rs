//! Conversation and message types.

use serde::{Deserialize, Serialize};

use crate::{ConversationId, MessageId, UserId};

/// Delivery state of a message in the local list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Created locally, awaiting server acknowledgement.
    Pending,
    /// Acknowledged by the server; carries a server id.
    Confirmed,
    /// Rejected by the server or never delivered.
    Failed,
}

/// A chat message.
///
/// `id` stays `None` until the server confirms the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id (None while Pending or Failed).
    pub id: Option<MessageId>,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Display name of the author at the time of writing.
    pub sender_display_name: String,
    /// Message body.
    pub content: String,
    /// Creation time in unix milliseconds.
    pub created_at: u64,
    /// Local delivery state.
    pub delivery_state: DeliveryState,
}

impl Message {
    /// Create a local Pending message with no server id.
    pub fn pending(
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_display_name: impl Into<String>,
        content: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: None,
            conversation_id,
            sender_id,
            sender_display_name: sender_display_name.into(),
            content: content.into(),
            created_at,
            delivery_state: DeliveryState::Pending,
        }
    }

    /// Check whether the message has been confirmed by the server.
    pub fn is_confirmed(&self) -> bool {
        self.delivery_state == DeliveryState::Confirmed
    }
}

/// A conversation between a set of participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Users taking part in the conversation.
    pub participant_ids: Vec<UserId>,
}

impl Conversation {
    /// Create a conversation with an existing id.
    pub fn new(id: ConversationId, participant_ids: Vec<UserId>) -> Self {
        Self {
            id,
            participant_ids,
        }
    }

    /// Create a conversation with a freshly minted client-side id.
    pub fn start(participant_ids: Vec<UserId>) -> Self {
        Self::new(ConversationId::generate(), participant_ids)
    }
}
