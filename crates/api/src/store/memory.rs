//! In-memory store
//!
//! Each operation takes the write lock once, so every mutation is atomic
//! with respect to concurrent callers, mirroring the conditional updates of
//! the Postgres stores.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tourline_shared::{
    Conversation, ConversationKind, Feedback, LastMessage, Message, NewMessage,
    NewSupportMessage, Participant, Role, SenderType, StoreResult, SupportMessage, SupportTicket,
    TicketStatus, TicketUnread, UnreadCounts,
};
use uuid::Uuid;

use super::{
    private_key, ConversationStore, MessageStore, NewConversation, SupportStore,
};

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    private_index: HashMap<String, Uuid>,
    messages: HashMap<Uuid, Message>,
    /// conversation id -> message ids in append order
    conversation_log: HashMap<Uuid, Vec<Uuid>>,
    tickets: HashMap<Uuid, SupportTicket>,
    support_messages: HashMap<Uuid, SupportMessage>,
    /// ticket id -> message ids in append order
    ticket_log: HashMap<Uuid, Vec<Uuid>>,
    seq: i64,
}

impl Inner {
    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn create_conversation(&mut self, new: NewConversation) -> Conversation {
        let now = OffsetDateTime::now_utc();
        let mut unread_counts = UnreadCounts::new();
        let mut participants: Vec<Participant> = Vec::with_capacity(new.participants.len());
        for user_id in new.participants {
            if participants.iter().any(|p| p.user_id == user_id) {
                continue;
            }
            unread_counts.set(user_id, 0);
            participants.push(Participant {
                user_id,
                joined_at: now,
                left_at: None,
            });
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: new.kind,
            participants,
            unread_counts,
            last_message: None,
            deleted_for: BTreeSet::new(),
            group_info: new.group_info,
            created_at: now,
            updated_at: now,
        };
        self.conversations
            .insert(conversation.id, conversation.clone());
        conversation
    }
}

/// In-process implementation of every store trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages appended to a conversation, including hidden ones
    pub async fn message_count(&self, conversation_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner
            .conversation_log
            .get(&conversation_id)
            .map(|log| log.len())
            .unwrap_or(0)
    }
}

fn sort_by_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        let a_at = a.last_message.as_ref().map(|m| m.created_at).unwrap_or(a.created_at);
        let b_at = b.last_message.as_ref().map(|m| m.created_at).unwrap_or(b.created_at);
        b_at.cmp(&a_at)
    });
}

/// Slice one page out of an ordered log, newest page first, oldest first within it
fn page_of<T: Clone>(items: Vec<T>, page: u32, limit: u32) -> Vec<T> {
    let limit = limit.max(1) as usize;
    let skip = (page.max(1) as usize - 1) * limit;
    let mut out: Vec<T> = items.into_iter().rev().skip(skip).take(limit).collect();
    out.reverse();
    out
}

fn stored_support_message(
    message: NewSupportMessage,
    seq: i64,
    created_at: OffsetDateTime,
) -> SupportMessage {
    SupportMessage {
        id: Uuid::new_v4(),
        ticket_id: message.ticket_id,
        sender_id: message.sender_id,
        sender_type: message.sender_type,
        kind: message.kind(),
        seen_by: message.seen_by(),
        is_system_message: message.sender_type == SenderType::System,
        content: message.content,
        reply_to: message.reply_to,
        reactions: Vec::new(),
        deleted_for: BTreeSet::new(),
        edited: false,
        edited_at: None,
        seq,
        created_at,
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert(&self, conversation: NewConversation) -> StoreResult<Conversation> {
        let mut inner = self.inner.write().await;
        Ok(inner.create_conversation(conversation))
    }

    async fn get_or_create_private(&self, a: Uuid, b: Uuid) -> StoreResult<Conversation> {
        let key = private_key(a, b);
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner
            .private_index
            .get(&key)
            .and_then(|id| inner.conversations.get(id))
        {
            return Ok(existing.clone());
        }

        let conversation = inner.create_conversation(NewConversation {
            kind: ConversationKind::Private,
            participants: vec![a, b],
            group_info: None,
        });
        inner.private_index.insert(key, conversation.id);
        Ok(conversation)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let mut list: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.participants.iter().any(|p| p.user_id == user_id))
            .filter(|c| !c.is_hidden_for(&user_id))
            .cloned()
            .collect();
        sort_by_activity(&mut list);
        Ok(list)
    }

    async fn post_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq();
        let stored = Message {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            kind: message.kind,
            reply_to: message.reply_to,
            reactions: Vec::new(),
            seen_by: BTreeSet::from([message.sender_id]),
            deleted_for: BTreeSet::new(),
            edited: false,
            edited_at: None,
            seq,
            created_at: OffsetDateTime::now_utc(),
        };

        if let Some(conversation) = inner.conversations.get_mut(&stored.conversation_id) {
            let is_newer = conversation
                .last_message
                .as_ref()
                .map(|current| current.seq < stored.seq)
                .unwrap_or(true);
            if is_newer {
                conversation.last_message = Some(LastMessage::from_message(&stored));
                conversation.deleted_for.clear();
            }

            let recipients: Vec<Uuid> = conversation
                .participants
                .iter()
                .filter(|p| p.is_active() && p.user_id != stored.sender_id)
                .map(|p| p.user_id)
                .collect();
            for user_id in recipients {
                conversation.unread_counts.increment(user_id);
            }
            conversation.updated_at = stored.created_at;
        }

        inner
            .conversation_log
            .entry(stored.conversation_id)
            .or_default()
            .push(stored.id);
        inner.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut inner = self.inner.write().await;
        let ids = inner
            .conversation_log
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default();

        let mut changed = Vec::new();
        for id in ids {
            if let Some(message) = inner.messages.get_mut(&id) {
                if message.sender_id != reader && message.seen_by.insert(reader) {
                    changed.push(id);
                }
            }
        }

        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            if conversation.unread_counts.contains(&reader) {
                conversation.unread_counts.set(reader, 0);
            }
        }
        Ok(changed)
    }

    async fn refresh_preview(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        preview: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(last) = inner
            .conversations
            .get_mut(&conversation_id)
            .and_then(|c| c.last_message.as_mut())
        {
            if last.message_id == message_id {
                last.preview = preview.to_string();
            }
        }
        Ok(())
    }

    async fn hide_for(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.deleted_for.insert(user_id);
        }
        Ok(())
    }

    async fn add_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let Some(conversation) = inner.conversations.get_mut(&conversation_id) else {
            return Ok(());
        };

        let now = OffsetDateTime::now_utc();
        match conversation
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
        {
            Some(existing) if existing.is_active() => return Ok(()),
            Some(existing) => {
                existing.left_at = None;
                existing.joined_at = now;
            }
            None => conversation.participants.push(Participant {
                user_id,
                joined_at: now,
                left_at: None,
            }),
        }
        conversation.unread_counts.set(user_id, 0);
        conversation.updated_at = now;
        Ok(())
    }

    async fn mark_left(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(conversation) = inner.conversations.get_mut(&conversation_id) else {
            return Ok(false);
        };
        let now = OffsetDateTime::now_utc();
        let Some(participant) = conversation
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id && p.is_active())
        else {
            return Ok(false);
        };
        participant.left_at = Some(now);
        conversation.unread_counts.remove(&user_id);
        conversation.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect())
    }

    async fn page(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let visible: Vec<Message> = inner
            .conversation_log
            .get(&conversation_id)
            .map(|log| {
                log.iter()
                    .filter_map(|id| inner.messages.get(id))
                    .filter(|m| !m.is_deleted_for(&viewer))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page_of(visible, page, limit))
    }

    async fn set_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: Option<String>,
    ) -> StoreResult<Option<Message>> {
        let mut inner = self.inner.write().await;
        Ok(inner.messages.get_mut(&message_id).map(|message| {
            message.apply_reaction(user_id, reaction);
            message.clone()
        }))
    }

    async fn edit(
        &self,
        message_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<Message>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .messages
            .get_mut(&message_id)
            .filter(|m| m.sender_id == sender_id)
            .map(|message| {
                message.content = content.to_string();
                message.edited = true;
                message.edited_at = Some(OffsetDateTime::now_utc());
                message.clone()
            }))
    }

    async fn hide_for(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(message) = inner.messages.get_mut(&message_id) {
            message.deleted_for.insert(user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl SupportStore for MemoryStore {
    async fn create_ticket(
        &self,
        requesting_user: Uuid,
        subject: &str,
        description: &str,
    ) -> StoreResult<Option<(SupportTicket, SupportMessage)>> {
        let mut inner = self.inner.write().await;
        let has_open = inner
            .tickets
            .values()
            .any(|t| t.requesting_user == requesting_user && t.status.is_open());
        if has_open {
            return Ok(None);
        }

        let now = OffsetDateTime::now_utc();
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            requesting_user,
            subject: subject.to_string(),
            status: TicketStatus::Waiting,
            assigned_staff: None,
            unread_count: TicketUnread { user: 0, staff: 1 },
            feedback: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            closed_by: None,
        };

        let seq = inner.next_seq();
        let seed = stored_support_message(
            NewSupportMessage::system(ticket.id, description),
            seq,
            now,
        );

        inner.ticket_log.insert(ticket.id, vec![seed.id]);
        inner.support_messages.insert(seed.id, seed.clone());
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(Some((ticket, seed)))
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<SupportTicket>> {
        let inner = self.inner.read().await;
        Ok(inner.tickets.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SupportTicket>> {
        let inner = self.inner.read().await;
        let mut list: Vec<SupportTicket> = inner
            .tickets
            .values()
            .filter(|t| t.requesting_user == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(list)
    }

    async fn list_for_staff(&self, staff_id: Uuid) -> StoreResult<Vec<SupportTicket>> {
        let inner = self.inner.read().await;
        let mut list: Vec<SupportTicket> = inner
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Waiting || t.is_assigned_to(&staff_id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(list)
    }

    async fn claim(&self, id: Uuid, staff_id: Uuid) -> StoreResult<Option<SupportTicket>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .tickets
            .get_mut(&id)
            .filter(|t| t.status == TicketStatus::Waiting)
            .map(|ticket| {
                ticket.status = TicketStatus::Active;
                ticket.assigned_staff = Some(staff_id);
                ticket.updated_at = OffsetDateTime::now_utc();
                ticket.clone()
            }))
    }

    async fn close(&self, id: Uuid, closed_by: Role) -> StoreResult<Option<SupportTicket>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .tickets
            .get_mut(&id)
            .filter(|t| t.status.is_open())
            .map(|ticket| {
                let now = OffsetDateTime::now_utc();
                ticket.status = TicketStatus::Closed;
                ticket.closed_at = Some(now);
                ticket.closed_by = Some(closed_by);
                ticket.updated_at = now;
                ticket.clone()
            }))
    }

    async fn submit_feedback(
        &self,
        id: Uuid,
        feedback: Feedback,
    ) -> StoreResult<Option<SupportTicket>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .tickets
            .get_mut(&id)
            .filter(|t| t.status == TicketStatus::Closed && t.feedback.is_none())
            .map(|ticket| {
                ticket.feedback = Some(feedback);
                ticket.updated_at = OffsetDateTime::now_utc();
                ticket.clone()
            }))
    }

    async fn append_message(
        &self,
        message: NewSupportMessage,
        notify: Option<Role>,
        require_open: bool,
    ) -> StoreResult<Option<SupportMessage>> {
        let mut inner = self.inner.write().await;
        let now = OffsetDateTime::now_utc();
        {
            let Some(ticket) = inner.tickets.get_mut(&message.ticket_id) else {
                return Ok(None);
            };
            if require_open && !ticket.status.is_open() {
                return Ok(None);
            }
            match notify {
                Some(Role::User) => ticket.unread_count.user += 1,
                Some(Role::Staff) => ticket.unread_count.staff += 1,
                None => {}
            }
            ticket.updated_at = now;
        }

        let seq = inner.next_seq();
        let stored = stored_support_message(message, seq, now);
        inner
            .ticket_log
            .entry(stored.ticket_id)
            .or_default()
            .push(stored.id);
        inner.support_messages.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn get_message(&self, id: Uuid) -> StoreResult<Option<SupportMessage>> {
        let inner = self.inner.read().await;
        Ok(inner.support_messages.get(&id).cloned())
    }

    async fn messages(
        &self,
        ticket_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<SupportMessage>> {
        let inner = self.inner.read().await;
        let all: Vec<SupportMessage> = inner
            .ticket_log
            .get(&ticket_id)
            .map(|log| {
                log.iter()
                    .filter_map(|id| inner.support_messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(page_of(all, page, limit))
    }

    async fn mark_ticket_read(&self, id: Uuid, role: Role, reader: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut inner = self.inner.write().await;
        let ids = inner.ticket_log.get(&id).cloned().unwrap_or_default();

        let mut changed = Vec::new();
        for message_id in ids {
            if let Some(message) = inner.support_messages.get_mut(&message_id) {
                if message.sender_id != Some(reader) && message.seen_by.insert(reader) {
                    changed.push(message_id);
                }
            }
        }

        if let Some(ticket) = inner.tickets.get_mut(&id) {
            match role {
                Role::User => ticket.unread_count.user = 0,
                Role::Staff => ticket.unread_count.staff = 0,
            }
        }
        Ok(changed)
    }
}
