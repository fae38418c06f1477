//! Durable stores for conversations, messages and support tickets
//!
//! Every mutation is a single atomic operation on the backing store
//! (conditional update, increment, grow-only set append). Callers never
//! load a document, mutate it and write it back.
//!
//! - [`PgChatStore`] / [`PgSupportStore`]: Postgres implementations
//! - [`MemoryStore`]: in-process implementation of all three traits used by
//!   tests and database-less local runs

use async_trait::async_trait;
use tourline_shared::{
    Conversation, ConversationKind, Feedback, GroupInfo, Message, NewMessage,
    NewSupportMessage, Role, StoreResult, SupportMessage, SupportTicket,
};
use uuid::Uuid;

mod memory;
mod pg_chat;
mod pg_support;

pub use memory::MemoryStore;
pub use pg_chat::PgChatStore;
pub use pg_support::PgSupportStore;

/// Conversation about to be created
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub kind: ConversationKind,
    /// Ordered participant ids; the first entry is the creator
    pub participants: Vec<Uuid>,
    pub group_info: Option<GroupInfo>,
}

/// Stable key for the single private conversation between two users
pub fn private_key(a: Uuid, b: Uuid) -> String {
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert(&self, conversation: NewConversation) -> StoreResult<Conversation>;

    /// Return the private conversation between `a` and `b`, creating it if missing
    async fn get_or_create_private(&self, a: Uuid, b: Uuid) -> StoreResult<Conversation>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Conversations the user takes part in and has not hidden, most recent first
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;

    /// Append a message with `seen_by = {sender}`, advance the last-message
    /// cache and bump the unread counter of every active participant other
    /// than the sender, all in one atomic step.
    ///
    /// The cache never moves backwards: an older message does not replace a
    /// newer one when two sends race.
    async fn post_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// Add `reader` to `seen_by` of every message they did not send and have
    /// not seen yet, and zero their counter, in one atomic step. Returns the
    /// ids that changed.
    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> StoreResult<Vec<Uuid>>;

    /// Refresh the cached preview if `message_id` is the cached last message
    async fn refresh_preview(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        preview: &str,
    ) -> StoreResult<()>;

    async fn hide_for(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    /// Add a participant, or reactivate one who left with a fresh unread counter
    async fn add_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    /// Mark an active participant as left. Returns false if they were not active.
    async fn mark_left(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Message>>;

    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<Message>>;

    /// One page of history visible to `viewer`, oldest first within the page.
    /// Page 1 holds the newest messages.
    async fn page(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>>;

    /// Replace the user's reaction on a message; `None` clears it
    async fn set_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: Option<String>,
    ) -> StoreResult<Option<Message>>;

    /// Edit content if `sender_id` is the original sender
    async fn edit(
        &self,
        message_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<Message>>;

    async fn hide_for(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait SupportStore: Send + Sync {
    /// Create a waiting ticket seeded with a system message carrying the
    /// issue description. Returns `None` if the user already has an open ticket.
    async fn create_ticket(
        &self,
        requesting_user: Uuid,
        subject: &str,
        description: &str,
    ) -> StoreResult<Option<(SupportTicket, SupportMessage)>>;

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<SupportTicket>>;

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SupportTicket>>;

    /// Waiting tickets plus tickets assigned to this staff member
    async fn list_for_staff(&self, staff_id: Uuid) -> StoreResult<Vec<SupportTicket>>;

    /// Assign a waiting ticket to staff and activate it. `None` if it was not waiting.
    async fn claim(&self, id: Uuid, staff_id: Uuid) -> StoreResult<Option<SupportTicket>>;

    /// Close an open ticket. `None` if it was already closed.
    async fn close(&self, id: Uuid, closed_by: Role) -> StoreResult<Option<SupportTicket>>;

    /// Store feedback on a closed ticket without feedback. `None` otherwise.
    async fn submit_feedback(
        &self,
        id: Uuid,
        feedback: Feedback,
    ) -> StoreResult<Option<SupportTicket>>;

    /// Append a message and bump the unread counter of `notify`.
    ///
    /// With `require_open` the append only happens while the ticket is not
    /// closed; `None` is returned otherwise.
    async fn append_message(
        &self,
        message: NewSupportMessage,
        notify: Option<Role>,
        require_open: bool,
    ) -> StoreResult<Option<SupportMessage>>;

    async fn get_message(&self, id: Uuid) -> StoreResult<Option<SupportMessage>>;

    async fn messages(&self, ticket_id: Uuid, page: u32, limit: u32)
        -> StoreResult<Vec<SupportMessage>>;

    /// Add `reader` to `seen_by` of every ticket message they did not write
    /// and zero the counter of `role`, in one atomic step. Returns the ids
    /// that changed.
    async fn mark_ticket_read(&self, id: Uuid, role: Role, reader: Uuid) -> StoreResult<Vec<Uuid>>;
}
