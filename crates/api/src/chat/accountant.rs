//! Unread and delivery accounting
//!
//! Sits between the message log and the conversation/ticket records: every
//! append or read goes through here so the counters and `seen_by` sets move
//! together, using only atomic store operations.

use std::sync::Arc;
use tourline_shared::{Message, NewMessage, NewSupportMessage, Role, StoreResult, SupportMessage};
use uuid::Uuid;

use crate::store::{ConversationStore, SupportStore};

/// The side whose unread counter a ticket message bumps
pub fn counterpart(role: Role) -> Role {
    match role {
        Role::User => Role::Staff,
        Role::Staff => Role::User,
    }
}

#[derive(Clone)]
pub struct UnreadAccountant {
    conversations: Arc<dyn ConversationStore>,
    support: Arc<dyn SupportStore>,
}

impl UnreadAccountant {
    pub fn new(conversations: Arc<dyn ConversationStore>, support: Arc<dyn SupportStore>) -> Self {
        Self {
            conversations,
            support,
        }
    }

    /// Append a chat message. The last-message cache and every other active
    /// participant's counter move in the same store operation, so a
    /// concurrent read never sees the message without its increment.
    pub async fn message_sent(&self, message: NewMessage) -> StoreResult<Message> {
        self.conversations.post_message(message).await
    }

    /// Mark everything the reader has not sent as seen and zero their
    /// counter. Idempotent; returns the message ids that changed.
    pub async fn conversation_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> StoreResult<Vec<Uuid>> {
        self.conversations.mark_read(conversation_id, reader_id).await
    }

    /// Append a ticket message written by `role`, bumping the other side's
    /// counter. `None` if the ticket closed first.
    pub async fn ticket_message(
        &self,
        message: NewSupportMessage,
        role: Role,
    ) -> StoreResult<Option<SupportMessage>> {
        self.support
            .append_message(message, Some(counterpart(role)), true)
            .await
    }

    /// Append an audit marker. Markers do not count as unread.
    pub async fn ticket_marker(
        &self,
        ticket_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<SupportMessage>> {
        self.support
            .append_message(NewSupportMessage::system(ticket_id, content), None, false)
            .await
    }

    /// Same contract as [`Self::conversation_read`], counted per side
    pub async fn ticket_read(
        &self,
        ticket_id: Uuid,
        role: Role,
        reader_id: Uuid,
    ) -> StoreResult<Vec<Uuid>> {
        self.support
            .mark_ticket_read(ticket_id, role, reader_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tourline_shared::{MessageKind, SenderType};

    fn accountant(store: &MemoryStore) -> UnreadAccountant {
        let store = Arc::new(store.clone());
        UnreadAccountant::new(store.clone(), store)
    }

    #[tokio::test]
    async fn test_read_is_idempotent() {
        let store = MemoryStore::new();
        let acc = accountant(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.get_or_create_private(a, b).await.unwrap();

        let msg = acc
            .message_sent(NewMessage {
                conversation_id: conv.id,
                sender_id: a,
                content: "hello".into(),
                kind: MessageKind::Text,
                reply_to: None,
            })
            .await
            .unwrap();

        let conv = ConversationStore::get(&store, conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread_counts.get(&b), 1);
        assert_eq!(conv.unread_counts.get(&a), 0);
        assert_eq!(conv.last_message.unwrap().message_id, msg.id);

        assert_eq!(acc.conversation_read(conv.id, b).await.unwrap(), vec![msg.id]);
        assert!(acc.conversation_read(conv.id, b).await.unwrap().is_empty());

        let conv = ConversationStore::get(&store, conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread_counts.get(&b), 0);
    }

    #[tokio::test]
    async fn test_ticket_counters_keyed_by_role() {
        let store = MemoryStore::new();
        let acc = accountant(&store);
        let user = Uuid::new_v4();
        let (ticket, _) = store
            .create_ticket(user, "Lost voucher", "I cannot find my voucher")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ticket.unread_count.staff, 1);

        let reply = NewSupportMessage {
            ticket_id: ticket.id,
            sender_id: Some(user),
            sender_type: SenderType::User,
            content: "any news?".into(),
            reply_to: None,
        };
        acc.ticket_message(reply, Role::User).await.unwrap().unwrap();
        acc.ticket_marker(ticket.id, "staff joined").await.unwrap().unwrap();

        let ticket = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(ticket.unread_count.staff, 2);
        assert_eq!(ticket.unread_count.user, 0);

        let staff = Uuid::new_v4();
        let seen = acc.ticket_read(ticket.id, Role::Staff, staff).await.unwrap();
        assert_eq!(seen.len(), 3);
        let ticket = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(ticket.unread_count.for_role(Role::Staff), 0);
        assert_eq!(ticket.unread_count.for_role(Role::User), 0);
    }
}
