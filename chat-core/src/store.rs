//! Conversation message store for the chat engine.
//!
//! This module owns the ordered, user-visible message list of the active
//! conversation and reconciles optimistic local state with server results:
//! - Every entry carries a [`Handle`], a client-side correlation id
//! - Sends append a Pending entry and later confirm or fail it by handle
//! - Deletes remove immediately and can be rolled back with a [`Removal`]
//! - Snapshots are tagged with the [`Activation`] they were requested for
//!
//! List order is insertion order. The store never sorts by timestamp.
//! Nothing here performs I/O; the client interprets the results.

use chatify_types::{ConversationId, DeliveryState, Message, MessageId, Profile};

/// Client-side correlation id linking a list entry to later outcomes.
///
/// Handles are unique for the lifetime of a store, across activations, so
/// a handle minted for a previous conversation never matches a new entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Numeric value of the handle.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Provisional id shown for entries the server has not confirmed.
    pub fn provisional_id(&self) -> String {
        format!("local-{}", self.0)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.provisional_id())
    }
}

/// Tag identifying one activation of a conversation.
///
/// Requests issued for a conversation carry the activation that was current
/// when they were issued; results are applied only if it still is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    conversation_id: ConversationId,
    generation: u64,
}

impl Activation {
    /// Conversation this activation belongs to.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Generation counter value.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of applying a tagged snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The list was replaced.
    Applied {
        /// Number of messages loaded.
        count: usize,
    },
    /// The activation is no longer current; the snapshot was dropped.
    Stale,
    /// A snapshot was already loaded for this activation.
    AlreadyLoaded,
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No conversation is active.
    #[error("no active conversation")]
    NoActiveConversation,
}

/// A removed entry, kept so the removal can be rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    index: usize,
    generation: u64,
    handle: Handle,
    message: Message,
}

impl Removal {
    /// Index the entry occupied before removal.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The removed message.
    pub fn message(&self) -> &Message {
        &self.message
    }
}

#[derive(Debug, Clone)]
struct Entry {
    handle: Handle,
    message: Message,
}

/// Ordered message list of the active conversation.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: Vec<Entry>,
    active: Option<ConversationId>,
    generation: u64,
    next_handle: u64,
    snapshot_loaded: bool,
}

impl MessageStore {
    /// Create an empty store with no active conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `conversation_id` the active conversation.
    ///
    /// Clears the list and starts a new generation. Any activation handed out
    /// earlier stops being current.
    pub fn activate(&mut self, conversation_id: ConversationId) -> Activation {
        self.generation = self.generation.saturating_add(1);
        self.entries.clear();
        self.snapshot_loaded = false;
        self.active = Some(conversation_id.clone());
        Activation {
            conversation_id,
            generation: self.generation,
        }
    }

    /// The activation currently in effect, if any.
    pub fn current_activation(&self) -> Option<Activation> {
        self.active.as_ref().map(|conversation_id| Activation {
            conversation_id: conversation_id.clone(),
            generation: self.generation,
        })
    }

    /// Check whether `activation` is still the one in effect.
    pub fn is_current(&self, activation: &Activation) -> bool {
        activation.generation == self.generation
            && self.active.as_ref() == Some(&activation.conversation_id)
    }

    /// The active conversation id.
    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Check whether a snapshot has been loaded for the current activation.
    pub fn is_loaded(&self) -> bool {
        self.snapshot_loaded
    }

    /// Drop all state: no active conversation, empty list, new generation.
    pub fn reset(&mut self) {
        self.generation = self.generation.saturating_add(1);
        self.entries.clear();
        self.active = None;
        self.snapshot_loaded = false;
    }

    /// Replace the whole list with server-confirmed order.
    pub fn load_snapshot(&mut self, list: Vec<Message>) {
        self.entries.clear();
        self.entries.reserve(list.len());
        for message in list {
            let handle = self.mint_handle();
            self.entries.push(Entry { handle, message });
        }
        self.snapshot_loaded = true;
    }

    /// Apply a snapshot fetched for `activation`.
    ///
    /// The snapshot is dropped if the activation is no longer current or if
    /// a snapshot was already loaded for it.
    pub fn apply_snapshot(&mut self, activation: &Activation, list: Vec<Message>) -> SnapshotOutcome {
        if !self.is_current(activation) {
            return SnapshotOutcome::Stale;
        }
        if self.snapshot_loaded {
            return SnapshotOutcome::AlreadyLoaded;
        }
        let count = list.len();
        // Sends issued before the snapshot arrived stay behind it, unless the
        // snapshot already contains their confirmed id.
        let local: Vec<Entry> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| match e.message.id.as_ref() {
                Some(id) => !list.iter().any(|m| m.id.as_ref() == Some(id)),
                None => true,
            })
            .collect();
        self.load_snapshot(list);
        self.entries.extend(local);
        SnapshotOutcome::Applied { count }
    }

    /// Insert a Pending message authored by `author` at the tail.
    pub fn append_optimistic(
        &mut self,
        content: impl Into<String>,
        author: &Profile,
        now_ms: u64,
    ) -> Result<Handle, StoreError> {
        let conversation_id = self
            .active
            .clone()
            .ok_or(StoreError::NoActiveConversation)?;
        let message = Message::pending(
            conversation_id,
            author.user_id.clone(),
            author.username.clone(),
            content,
            now_ms,
        );
        let handle = self.mint_handle();
        self.entries.push(Entry { handle, message });
        Ok(handle)
    }

    /// Replace the Pending entry for `handle` with the server's message.
    ///
    /// Returns `false` (and changes nothing) if the handle is gone or the
    /// entry is not Pending. If another entry already carries the server id
    /// the Pending entry is dropped instead, so each id appears once.
    ///
    /// When the server echoed only the author id as display name, the
    /// Pending entry's display name is kept.
    pub fn confirm(&mut self, handle: Handle, server_message: Message) -> bool {
        let Some(index) = self.position_of(handle) else {
            return false;
        };
        if self.entries[index].message.delivery_state != DeliveryState::Pending {
            return false;
        }

        let duplicate = server_message.id.as_ref().is_some_and(|id| {
            self.entries
                .iter()
                .any(|e| e.handle != handle && e.message.id.as_ref() == Some(id))
        });
        if duplicate {
            self.entries.remove(index);
            return true;
        }

        let mut message = server_message;
        message.delivery_state = DeliveryState::Confirmed;
        let pending = &mut self.entries[index].message;
        if message.sender_id == pending.sender_id
            && message.sender_display_name == message.sender_id.as_str()
        {
            message.sender_display_name = std::mem::take(&mut pending.sender_display_name);
        }
        *pending = message;
        true
    }

    /// Move the Pending entry for `handle` to Failed, in place.
    pub fn mark_failed(&mut self, handle: Handle) -> bool {
        match self.entry_mut(handle) {
            Some(entry) if entry.message.delivery_state == DeliveryState::Pending => {
                entry.message.delivery_state = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Move a Failed entry back to Pending for a resend.
    ///
    /// Returns the content to resend, or `None` if the entry is not Failed.
    pub fn retry(&mut self, handle: Handle) -> Option<String> {
        match self.entry_mut(handle) {
            Some(entry) if entry.message.delivery_state == DeliveryState::Failed => {
                entry.message.delivery_state = DeliveryState::Pending;
                Some(entry.message.content.clone())
            }
            _ => None,
        }
    }

    /// Drop a Failed entry from the list.
    pub fn discard(&mut self, handle: Handle) -> Option<Message> {
        let index = self.position_of(handle)?;
        if self.entries[index].message.delivery_state != DeliveryState::Failed {
            return None;
        }
        Some(self.entries.remove(index).message)
    }

    /// Remove the confirmed message with server id `id`.
    ///
    /// Returns `None` if no entry carries that id, which makes a second
    /// removal of the same id a no-op.
    pub fn remove(&mut self, id: &MessageId) -> Option<Removal> {
        let index = self
            .entries
            .iter()
            .position(|e| e.message.id.as_ref() == Some(id))?;
        let entry = self.entries.remove(index);
        Some(Removal {
            index,
            generation: self.generation,
            handle: entry.handle,
            message: entry.message,
        })
    }

    /// Reinsert a removed entry at its original index.
    ///
    /// The index is clamped to the current length; concurrent inserts make
    /// the position approximate. Returns `false` if the removal belongs to a
    /// previous activation or the id is already present again.
    pub fn restore(&mut self, removal: Removal) -> bool {
        if removal.generation != self.generation {
            return false;
        }
        if let Some(id) = removal.message.id.as_ref() {
            if self.contains(id) {
                return false;
            }
        }
        let index = removal.index.min(self.entries.len());
        self.entries.insert(
            index,
            Entry {
                handle: removal.handle,
                message: removal.message,
            },
        );
        true
    }

    /// Check whether an entry carries server id `id`.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries
            .iter()
            .any(|e| e.message.id.as_ref() == Some(id))
    }

    /// The message for `handle`, if still present.
    pub fn get(&self, handle: Handle) -> Option<&Message> {
        self.entries
            .iter()
            .find(|e| e.handle == handle)
            .map(|e| &e.message)
    }

    /// Snapshot of the visible list, in order.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    /// Handles of the visible list, in order.
    pub fn handles(&self) -> Vec<Handle> {
        self.entries.iter().map(|e| e.handle).collect()
    }

    /// Number of visible messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mint_handle(&mut self) -> Handle {
        self.next_handle = self.next_handle.saturating_add(1);
        Handle(self.next_handle)
    }

    fn position_of(&self, handle: Handle) -> Option<usize> {
        self.entries.iter().position(|e| e.handle == handle)
    }

    fn entry_mut(&mut self, handle: Handle) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.handle == handle)
    }
}
