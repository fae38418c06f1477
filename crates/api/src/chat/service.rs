//! Conversation operations
//!
//! Each operation validates access, performs atomic store mutations through
//! the stores or the [`UnreadAccountant`], and returns the events to fan out.
//! Nothing here talks to sockets directly.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tourline_shared::{
    preview, ChatError, ChatResult, Conversation, ConversationKind, GroupInfo, Message,
    MessageKind, NewMessage,
};
use uuid::Uuid;

use super::{Limits, UnreadAccountant};
use crate::store::{ConversationStore, MessageStore, NewConversation};
use crate::websocket::events::{Delivery, MessagePayload, Outcome, ServerEvent};
use crate::websocket::room::RoomKey;

const GROUP_NAME_MAX_CHARS: usize = 100;
const REACTION_MAX_CHARS: usize = 32;

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub content: String,
    pub kind: MessageKind,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreateGroup {
    pub name: String,
    pub avatar: Option<String>,
    /// Other members; the creator is added automatically
    pub participants: Vec<Uuid>,
}

/// What a history reader sees of a replied-to message
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRef {
    pub message_id: Uuid,
    /// False when the target is gone or hidden from the reader
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl ReplyRef {
    fn available(target: &Message) -> Self {
        Self {
            message_id: target.id,
            available: true,
            sender_id: Some(target.sender_id),
            preview: Some(preview(&target.content)),
        }
    }

    fn unavailable(message_id: Uuid) -> Self {
        Self {
            message_id,
            available: false,
            sender_id: None,
            preview: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryMessage {
    #[serde(flatten)]
    pub message: Message,
    pub reply: Option<ReplyRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub conversation_id: Uuid,
    pub page: u32,
    pub limit: u32,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    accountant: UnreadAccountant,
    limits: Limits,
}

fn require_active(conversation: &Conversation, user_id: Uuid) -> ChatResult<()> {
    if conversation.is_active_participant(&user_id) {
        Ok(())
    } else {
        Err(ChatError::access_denied("Not a participant in this conversation"))
    }
}

/// Current or former participant
fn require_member(conversation: &Conversation, user_id: Uuid) -> ChatResult<()> {
    if conversation.participants.iter().any(|p| p.user_id == user_id) {
        Ok(())
    } else {
        Err(ChatError::access_denied("Not a participant in this conversation"))
    }
}

fn inbox_update(conversation: &Conversation, user_id: Uuid) -> Delivery {
    Delivery::to(
        RoomKey::Inbox(user_id),
        ServerEvent::ConversationUpdated {
            conversation_id: conversation.id,
            last_message: conversation.last_message.clone(),
            unread_count: conversation.unread_counts.get(&user_id),
        },
    )
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        accountant: UnreadAccountant,
        limits: Limits,
    ) -> Self {
        Self {
            conversations,
            messages,
            accountant,
            limits,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub async fn find(&self, conversation_id: Uuid) -> ChatResult<Option<Conversation>> {
        Ok(self.conversations.get(conversation_id).await?)
    }

    async fn load(&self, conversation_id: Uuid) -> ChatResult<Conversation> {
        self.find(conversation_id)
            .await?
            .ok_or_else(|| ChatError::not_found("Conversation not found"))
    }

    /// A message the user may see: exists and not hidden from them
    async fn load_visible_message(&self, message_id: Uuid, user_id: Uuid) -> ChatResult<Message> {
        match self.messages.get(message_id).await? {
            Some(message) if !message.is_deleted_for(&user_id) => Ok(message),
            _ => Err(ChatError::not_found("Message not found")),
        }
    }

    /// Whether the user may join the conversation's room
    pub fn can_access(conversation: &Conversation, user_id: Uuid) -> bool {
        conversation.is_active_participant(&user_id)
    }

    pub async fn list(&self, user_id: Uuid) -> ChatResult<Vec<Conversation>> {
        Ok(self.conversations.list_for_user(user_id).await?)
    }

    pub async fn get(&self, conversation_id: Uuid, user_id: Uuid) -> ChatResult<Conversation> {
        let conversation = self.load(conversation_id).await?;
        require_member(&conversation, user_id)?;
        Ok(conversation)
    }

    pub async fn start_private(&self, user_id: Uuid, other_id: Uuid) -> ChatResult<Conversation> {
        if user_id == other_id {
            return Err(ChatError::validation(
                "Cannot start a conversation with yourself",
            ));
        }
        let conversation = self
            .conversations
            .get_or_create_private(user_id, other_id)
            .await?;
        tracing::debug!(conversation_id = %conversation.id, "Private conversation resolved");
        Ok(conversation)
    }

    pub async fn create_group(
        &self,
        creator_id: Uuid,
        input: CreateGroup,
    ) -> ChatResult<Outcome<Conversation>> {
        let name = input.name.trim();
        if name.is_empty() || name.chars().count() > GROUP_NAME_MAX_CHARS {
            return Err(ChatError::validation(format!(
                "Group name must be 1 to {} characters",
                GROUP_NAME_MAX_CHARS
            )));
        }

        let mut participants = vec![creator_id];
        for user_id in input.participants {
            if !participants.contains(&user_id) {
                participants.push(user_id);
            }
        }
        if participants.len() < 2 {
            return Err(ChatError::validation(
                "A group needs at least two participants",
            ));
        }

        let conversation = self
            .conversations
            .insert(NewConversation {
                kind: ConversationKind::Group,
                participants,
                group_info: Some(GroupInfo {
                    name: name.to_string(),
                    avatar: input.avatar,
                    created_by: creator_id,
                    admins: vec![creator_id],
                }),
            })
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            created_by = %creator_id,
            participants = conversation.participants.len(),
            "Group conversation created"
        );

        let deliveries = conversation
            .active_participant_ids()
            .into_iter()
            .map(|user_id| inbox_update(&conversation, user_id))
            .collect();
        Ok(Outcome::new(conversation, deliveries))
    }

    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        user_id: Uuid,
    ) -> ChatResult<Outcome<Conversation>> {
        let conversation = self.load(conversation_id).await?;
        if conversation.kind != ConversationKind::Group {
            return Err(ChatError::invalid_state(
                "Participants can only be added to group conversations",
            ));
        }
        require_active(&conversation, actor_id)?;
        if !conversation.is_admin(&actor_id) {
            return Err(ChatError::access_denied(
                "Only group admins can add participants",
            ));
        }
        if conversation.is_active_participant(&user_id) {
            return Ok(Outcome::quiet(conversation));
        }

        self.conversations
            .add_participant(conversation_id, user_id)
            .await?;
        let conversation = self.load(conversation_id).await?;
        let deliveries = vec![inbox_update(&conversation, user_id)];
        Ok(Outcome::new(conversation, deliveries))
    }

    /// Leave a group; the participant is kept for history with `left_at` set
    pub async fn leave(&self, conversation_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        let conversation = self.load(conversation_id).await?;
        if conversation.kind == ConversationKind::Private {
            return Err(ChatError::invalid_state(
                "Private conversations cannot be left",
            ));
        }
        if !self.conversations.mark_left(conversation_id, user_id).await? {
            return Err(ChatError::access_denied("Not an active participant"));
        }
        tracing::info!(conversation_id = %conversation_id, user_id = %user_id, "Participant left group");
        Ok(())
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        input: SendMessage,
    ) -> ChatResult<Outcome<Message>> {
        let conversation = self.load(conversation_id).await?;
        require_active(&conversation, sender_id)?;

        if input.kind == MessageKind::System {
            return Err(ChatError::validation("System messages cannot be sent"));
        }
        let content = self.limits.content(&input.content)?;

        if let Some(reply_id) = input.reply_to {
            match self.messages.get(reply_id).await? {
                Some(target)
                    if target.conversation_id == conversation_id
                        && !target.is_deleted_for(&sender_id) => {}
                _ => {
                    return Err(ChatError::validation(
                        "Reply target not found in this conversation",
                    ))
                }
            }
        }

        let message = self
            .accountant
            .message_sent(NewMessage {
                conversation_id,
                sender_id,
                content,
                kind: input.kind,
                reply_to: input.reply_to,
            })
            .await?;

        // Re-read for the counters the increment produced
        let conversation = self.find(conversation_id).await?.unwrap_or(conversation);

        let mut deliveries = vec![Delivery::to(
            RoomKey::Conversation(conversation_id),
            ServerEvent::NewMessage {
                conversation_id,
                message: MessagePayload::Chat(message.clone()),
            },
        )];
        deliveries.extend(
            conversation
                .active_participant_ids()
                .into_iter()
                .filter(|user_id| *user_id != sender_id)
                .map(|user_id| inbox_update(&conversation, user_id)),
        );

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            seq = message.seq,
            "Message sent"
        );
        Ok(Outcome::new(message, deliveries))
    }

    pub async fn mark_as_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> ChatResult<Outcome<Vec<Uuid>>> {
        let conversation = self.load(conversation_id).await?;
        require_active(&conversation, reader_id)?;

        let changed = self
            .accountant
            .conversation_read(conversation_id, reader_id)
            .await?;

        let mut deliveries = Vec::with_capacity(2);
        if !changed.is_empty() {
            deliveries.push(Delivery::to(
                RoomKey::Conversation(conversation_id),
                ServerEvent::MessagesRead {
                    conversation_id,
                    reader_id,
                    message_ids: changed.clone(),
                },
            ));
        }
        deliveries.push(Delivery::to(
            RoomKey::Inbox(reader_id),
            ServerEvent::ConversationUpdated {
                conversation_id,
                last_message: conversation.last_message.clone(),
                unread_count: 0,
            },
        ));
        Ok(Outcome::new(changed, deliveries))
    }

    /// Replace the caller's reaction; `None` or blank clears it
    pub async fn react(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: Option<String>,
    ) -> ChatResult<Outcome<Message>> {
        let reaction = reaction
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if let Some(r) = &reaction {
            if r.chars().count() > REACTION_MAX_CHARS {
                return Err(ChatError::validation("Reaction is too long"));
            }
        }

        let message = self.load_visible_message(message_id, user_id).await?;
        let conversation = self.load(message.conversation_id).await?;
        require_active(&conversation, user_id)?;

        let updated = self
            .messages
            .set_reaction(message_id, user_id, reaction)
            .await?
            .ok_or_else(|| ChatError::not_found("Message not found"))?;

        let deliveries = vec![Delivery::to(
            RoomKey::Conversation(updated.conversation_id),
            ServerEvent::MessageUpdated {
                conversation_id: updated.conversation_id,
                message: updated.clone(),
            },
        )];
        Ok(Outcome::new(updated, deliveries))
    }

    /// Edit content. Only the original sender may edit; read state is untouched.
    pub async fn edit(
        &self,
        message_id: Uuid,
        editor_id: Uuid,
        content: &str,
    ) -> ChatResult<Outcome<Message>> {
        let message = self.load_visible_message(message_id, editor_id).await?;
        if message.sender_id != editor_id {
            return Err(ChatError::access_denied(
                "Only the sender can edit a message",
            ));
        }
        let content = self.limits.content(content)?;
        let conversation = self.load(message.conversation_id).await?;
        require_active(&conversation, editor_id)?;

        let updated = self
            .messages
            .edit(message_id, editor_id, &content)
            .await?
            .ok_or_else(|| ChatError::access_denied("Only the sender can edit a message"))?;

        if conversation.last_message.as_ref().map(|l| l.message_id) == Some(updated.id) {
            self.conversations
                .refresh_preview(conversation.id, updated.id, &preview(&updated.content))
                .await?;
        }

        let deliveries = vec![Delivery::to(
            RoomKey::Conversation(conversation.id),
            ServerEvent::MessageUpdated {
                conversation_id: conversation.id,
                message: updated.clone(),
            },
        )];
        Ok(Outcome::new(updated, deliveries))
    }

    /// Hide a message from the caller only
    pub async fn delete_message(&self, message_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("Message not found"))?;
        let conversation = self.load(message.conversation_id).await?;
        require_member(&conversation, user_id)?;
        self.messages.hide_for(message_id, user_id).await?;
        Ok(())
    }

    /// Hide a conversation from the caller's list until new activity
    pub async fn delete_conversation(&self, conversation_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        let conversation = self.load(conversation_id).await?;
        require_member(&conversation, user_id)?;
        self.conversations.hide_for(conversation_id, user_id).await?;
        Ok(())
    }

    /// One page of history as the viewer sees it. Never marks anything as read.
    pub async fn history(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ChatResult<HistoryPage> {
        let conversation = self.load(conversation_id).await?;
        require_member(&conversation, viewer_id)?;
        let (page, limit) = self.limits.page(page, limit);

        let messages = self
            .messages
            .page(conversation_id, viewer_id, page, limit)
            .await?;

        let reply_ids: Vec<Uuid> = messages
            .iter()
            .filter_map(|m| m.reply_to)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let targets: HashMap<Uuid, Message> = self
            .messages
            .get_many(&reply_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let messages = messages
            .into_iter()
            .map(|message| {
                let reply = message.reply_to.map(|id| match targets.get(&id) {
                    Some(target)
                        if target.conversation_id == conversation_id
                            && !target.is_deleted_for(&viewer_id) =>
                    {
                        ReplyRef::available(target)
                    }
                    _ => ReplyRef::unavailable(id),
                });
                HistoryMessage { message, reply }
            })
            .collect();

        Ok(HistoryPage {
            conversation_id,
            page,
            limit,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service(store: &MemoryStore) -> ChatService {
        let shared = Arc::new(store.clone());
        ChatService::new(
            shared.clone(),
            shared.clone(),
            UnreadAccountant::new(shared.clone(), shared),
            Limits::default(),
        )
    }

    fn text(content: &str) -> SendMessage {
        SendMessage {
            content: content.to_string(),
            kind: MessageKind::Text,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn test_send_updates_unread_and_fans_out() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();

        let outcome = chat.send_message(conv.id, a, text(" hello ")).await.unwrap();
        assert_eq!(outcome.value.content, "hello");
        assert!(outcome.value.seen_by.contains(&a));

        assert_eq!(outcome.deliveries.len(), 2);
        assert_eq!(outcome.deliveries[0].room, RoomKey::Conversation(conv.id));
        assert_eq!(outcome.deliveries[1].room, RoomKey::Inbox(b));
        assert!(matches!(
            outcome.deliveries[1].event,
            ServerEvent::ConversationUpdated { unread_count: 1, .. }
        ));

        let conv = chat.get(conv.id, a).await.unwrap();
        assert_eq!(conv.unread_counts.get(&b), 1);
        assert_eq!(conv.unread_counts.get(&a), 0);
        assert_eq!(
            conv.last_message.map(|l| l.message_id),
            Some(outcome.value.id)
        );
    }

    #[tokio::test]
    async fn test_send_rejections() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();

        assert!(matches!(
            chat.send_message(conv.id, outsider, text("hi")).await,
            Err(ChatError::AccessDenied(_))
        ));
        assert!(matches!(
            chat.send_message(conv.id, a, text("   ")).await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            chat.send_message(Uuid::new_v4(), a, text("hi")).await,
            Err(ChatError::NotFound(_))
        ));
        let system = SendMessage {
            kind: MessageKind::System,
            ..text("hi")
        };
        assert!(matches!(
            chat.send_message(conv.id, a, system).await,
            Err(ChatError::Validation(_))
        ));
        assert_eq!(store.message_count(conv.id).await, 0);
    }

    #[tokio::test]
    async fn test_mark_as_read_is_idempotent() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();
        chat.send_message(conv.id, a, text("one")).await.unwrap();
        chat.send_message(conv.id, a, text("two")).await.unwrap();

        let first = chat.mark_as_read(conv.id, b).await.unwrap();
        assert_eq!(first.value.len(), 2);
        assert!(matches!(
            first.deliveries[0].event,
            ServerEvent::MessagesRead { .. }
        ));

        let second = chat.mark_as_read(conv.id, b).await.unwrap();
        assert!(second.value.is_empty());
        assert_eq!(second.deliveries.len(), 1);

        let conv = chat.get(conv.id, b).await.unwrap();
        assert_eq!(conv.unread_counts.get(&b), 0);
    }

    #[tokio::test]
    async fn test_history_does_not_mark_read() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();
        chat.send_message(conv.id, a, text("one")).await.unwrap();

        let page = chat.history(conv.id, b, None, None).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert!(!page.messages[0].message.seen_by.contains(&b));
        assert_eq!(chat.get(conv.id, b).await.unwrap().unread_counts.get(&b), 1);
    }

    #[tokio::test]
    async fn test_edit_only_by_sender_and_refreshes_preview() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();
        let sent = chat.send_message(conv.id, a, text("helo")).await.unwrap().value;

        assert!(matches!(
            chat.edit(sent.id, b, "hijack").await,
            Err(ChatError::AccessDenied(_))
        ));

        let edited = chat.edit(sent.id, a, "hello").await.unwrap().value;
        assert!(edited.edited);
        assert!(edited.edited_at.is_some());
        assert_eq!(edited.seen_by, sent.seen_by);

        let conv = chat.get(conv.id, a).await.unwrap();
        assert_eq!(conv.last_message.unwrap().preview, "hello");
        assert_eq!(conv.unread_counts.get(&b), 1);
    }

    #[tokio::test]
    async fn test_reaction_replaces_previous() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();
        let sent = chat.send_message(conv.id, a, text("trip booked")).await.unwrap().value;

        chat.react(sent.id, b, Some("like".into())).await.unwrap();
        let msg = chat.react(sent.id, b, Some("love".into())).await.unwrap().value;
        assert_eq!(msg.reactions.iter().filter(|r| r.user_id == b).count(), 1);
        assert_eq!(msg.reaction_of(&b), Some("love"));

        let msg = chat.react(sent.id, b, None).await.unwrap().value;
        assert!(msg.reactions.is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete_and_dangling_reply() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();
        let original = chat.send_message(conv.id, a, text("original")).await.unwrap().value;
        let reply = SendMessage {
            reply_to: Some(original.id),
            ..text("reply")
        };
        chat.send_message(conv.id, b, reply).await.unwrap();

        chat.delete_message(original.id, b).await.unwrap();

        let for_b = chat.history(conv.id, b, None, None).await.unwrap();
        assert_eq!(for_b.messages.len(), 1);
        let reply_ref = for_b.messages[0].reply.as_ref().unwrap();
        assert!(!reply_ref.available);

        let for_a = chat.history(conv.id, a, None, None).await.unwrap();
        assert_eq!(for_a.messages.len(), 2);
        assert!(for_a.messages[1].reply.as_ref().unwrap().available);
    }

    #[tokio::test]
    async fn test_group_admin_rules_and_leave() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (owner, member, newcomer) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(matches!(
            chat.create_group(
                owner,
                CreateGroup {
                    name: "Alps".into(),
                    avatar: None,
                    participants: vec![owner],
                }
            )
            .await,
            Err(ChatError::Validation(_))
        ));

        let group = chat
            .create_group(
                owner,
                CreateGroup {
                    name: "Alps trip".into(),
                    avatar: None,
                    participants: vec![member],
                },
            )
            .await
            .unwrap()
            .value;
        assert!(group.is_admin(&owner));

        assert!(matches!(
            chat.add_participant(group.id, member, newcomer).await,
            Err(ChatError::AccessDenied(_))
        ));
        let group = chat.add_participant(group.id, owner, newcomer).await.unwrap().value;
        assert!(group.is_active_participant(&newcomer));

        chat.leave(group.id, member).await.unwrap();
        assert!(matches!(
            chat.leave(group.id, member).await,
            Err(ChatError::AccessDenied(_))
        ));

        let sent = chat.send_message(group.id, owner, text("hi all")).await.unwrap();
        let inboxes: Vec<RoomKey> = sent.deliveries.iter().map(|d| d.room).collect();
        assert!(inboxes.contains(&RoomKey::Inbox(newcomer)));
        assert!(!inboxes.contains(&RoomKey::Inbox(member)));

        let private = chat.start_private(owner, member).await.unwrap();
        assert!(matches!(
            chat.leave(private.id, owner).await,
            Err(ChatError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_hidden_conversation_returns_on_new_message() {
        let store = MemoryStore::new();
        let chat = service(&store);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = chat.start_private(a, b).await.unwrap();
        chat.send_message(conv.id, a, text("hi")).await.unwrap();

        chat.delete_conversation(conv.id, b).await.unwrap();
        assert!(chat.list(b).await.unwrap().is_empty());
        assert_eq!(chat.list(a).await.unwrap().len(), 1);

        chat.send_message(conv.id, a, text("still there?")).await.unwrap();
        assert_eq!(chat.list(b).await.unwrap().len(), 1);
    }
}
