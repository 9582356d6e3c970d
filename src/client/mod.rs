//! Consumer-side reconciliation of pushed events with request/response
//! results.
//!
//! The transport does not guarantee that arrival order matches chronological
//! order, and the same message can reach a client through both the push
//! connection and a send acknowledgment. [`ConversationView`] merges both
//! streams keyed by message identity and keeps the rendered sequence sorted
//! by creation time.

use std::collections::{HashSet, VecDeque};

use crate::db::models::Message;

const RENDERED_ID_CAP: usize = 500;
const MESSAGE_CAP: usize = 1000;

/// Fixed-capacity insertion-ordered id set with O(1) membership. When full,
/// inserting evicts the oldest id.
#[derive(Debug)]
pub struct BoundedIdSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl BoundedIdSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn remove(&mut self, id: &str) {
        if self.ids.remove(id) {
            self.order.retain(|tracked| tracked != id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// The active conversation as a client renders it: the message sequence for
/// one `{authenticated user, selected peer}` pair plus the set of already
/// rendered message ids.
pub struct ConversationView {
    auth_user_id: String,
    peer_id: String,
    messages: Vec<Message>,
    rendered: BoundedIdSet,
}

impl ConversationView {
    pub fn new(auth_user_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self {
            auth_user_id: auth_user_id.into(),
            peer_id: peer_id.into(),
            messages: Vec::new(),
            rendered: BoundedIdSet::new(RENDERED_ID_CAP),
        }
    }

    /// Merge one message from either the push stream or a send
    /// acknowledgment. Returns true if the view changed.
    pub fn apply_message(&mut self, message: Message) -> bool {
        if self.rendered.contains(&message.id) {
            return false;
        }
        if !self.belongs_to_conversation(&message) {
            return false;
        }

        self.rendered.insert(&message.id);
        self.messages.push(message);
        // Stable sort: ties on created_at keep their prior relative order.
        self.messages.sort_by_key(|m| m.created_at);

        while self.messages.len() > MESSAGE_CAP {
            self.messages.remove(0);
        }
        true
    }

    /// Handle a `messageDeleted` event. Idempotent when the id is absent.
    pub fn apply_deletion(&mut self, message_id: &str) {
        self.messages.retain(|m| m.id != message_id);
        self.rendered.remove(message_id);
    }

    /// Replace the view from a full history fetch.
    pub fn set_messages(&mut self, history: Vec<Message>) {
        self.messages = history;
        self.messages.sort_by_key(|m| m.created_at);
        while self.messages.len() > MESSAGE_CAP {
            self.messages.remove(0);
        }

        self.rendered = BoundedIdSet::new(RENDERED_ID_CAP);
        for message in &self.messages {
            self.rendered.insert(&message.id);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn belongs_to_conversation(&self, message: &Message) -> bool {
        (message.sender_id == self.auth_user_id && message.receiver_id == self.peer_id)
            || (message.sender_id == self.peer_id && message.receiver_id == self.auth_user_id)
    }
}
