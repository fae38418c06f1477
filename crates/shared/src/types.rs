//! Common types used across Tourline conversations

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum characters kept in a conversation's last-message preview
pub const PREVIEW_MAX_CHARS: usize = 120;

// =============================================================================
// Identity
// =============================================================================

/// Role a connection or request acts under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Staff => "staff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn staff(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Staff,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Private,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// Per-participant unread counters keyed by user id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnreadCounts(BTreeMap<Uuid, u32>);

impl UnreadCounts {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Count for a user; absent entries read as zero
    pub fn get(&self, user_id: &Uuid) -> u32 {
        self.0.get(user_id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, user_id: Uuid, count: u32) {
        self.0.insert(user_id, count);
    }

    pub fn increment(&mut self, user_id: Uuid) {
        let entry = self.0.entry(user_id).or_insert(0);
        *entry = entry.saturating_add(1);
    }

    pub fn remove(&mut self, user_id: &Uuid) {
        self.0.remove(user_id);
    }

    pub fn contains(&self, user_id: &Uuid) -> bool {
        self.0.contains_key(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &u32)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub left_at: Option<OffsetDateTime>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

/// Denormalized copy of the newest message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: Uuid,
    pub preview: String,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Store sequence of the cached message; the cache only moves forward
    pub seq: i64,
}

impl LastMessage {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id,
            preview: preview(&message.content),
            sender_id: message.sender_id,
            kind: message.kind,
            created_at: message.created_at,
            seq: message.seq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub avatar: Option<String>,
    pub created_by: Uuid,
    pub admins: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: Vec<Participant>,
    pub unread_counts: UnreadCounts,
    pub last_message: Option<LastMessage>,
    pub deleted_for: BTreeSet<Uuid>,
    pub group_info: Option<GroupInfo>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    pub fn is_active_participant(&self, user_id: &Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.user_id == *user_id && p.is_active())
    }

    pub fn active_participant_ids(&self) -> Vec<Uuid> {
        self.participants
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.user_id)
            .collect()
    }

    pub fn is_hidden_for(&self, user_id: &Uuid) -> bool {
        self.deleted_for.contains(user_id)
    }

    pub fn is_admin(&self, user_id: &Uuid) -> bool {
        self.group_info
            .as_ref()
            .map(|g| g.admins.contains(user_id))
            .unwrap_or(false)
    }
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Video,
    Audio,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    /// Opaque reaction identifier chosen by the client
    pub reaction: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub reply_to: Option<Uuid>,
    pub reactions: Vec<Reaction>,
    pub seen_by: BTreeSet<Uuid>,
    #[serde(skip)]
    pub deleted_for: BTreeSet<Uuid>,
    pub edited: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn is_deleted_for(&self, user_id: &Uuid) -> bool {
        self.deleted_for.contains(user_id)
    }

    /// Replace the user's reaction: drop any prior one, then add the new one if given
    pub fn apply_reaction(&mut self, user_id: Uuid, reaction: Option<String>) {
        self.reactions.retain(|r| r.user_id != user_id);
        if let Some(reaction) = reaction {
            self.reactions.push(Reaction { user_id, reaction });
        }
    }

    pub fn reaction_of(&self, user_id: &Uuid) -> Option<&str> {
        self.reactions
            .iter()
            .find(|r| r.user_id == *user_id)
            .map(|r| r.reaction.as_str())
    }
}

/// Message about to be appended; id, sequence and timestamps come from the store
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub reply_to: Option<Uuid>,
}

// =============================================================================
// Support tickets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Waiting,
    Active,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    User,
    Staff,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Staff => "staff",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "staff" => Some(Self::Staff),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl From<Role> for SenderType {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Staff => Self::Staff,
        }
    }
}

/// Ticket unread counters, one per side of the conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUnread {
    pub user: u32,
    pub staff: u32,
}

impl TicketUnread {
    pub fn for_role(&self, role: Role) -> u32 {
        match role {
            Role::User => self.user,
            Role::Staff => self.staff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub is_resolved: bool,
    pub rating: u8,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub requesting_user: Uuid,
    pub subject: String,
    pub status: TicketStatus,
    pub assigned_staff: Option<Uuid>,
    pub unread_count: TicketUnread,
    pub feedback: Option<Feedback>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    pub closed_by: Option<Role>,
}

impl SupportTicket {
    pub fn is_owner(&self, user_id: &Uuid) -> bool {
        self.requesting_user == *user_id
    }

    pub fn is_assigned_to(&self, staff_id: &Uuid) -> bool {
        self.assigned_staff.as_ref() == Some(staff_id)
    }

    /// Owner or assigned staff
    pub fn is_party(&self, identity: &Identity) -> bool {
        match identity.role {
            Role::User => self.is_owner(&identity.user_id),
            Role::Staff => self.is_assigned_to(&identity.user_id),
        }
    }
}

/// Ticket message: the chat message shape plus who wrote it
#[derive(Debug, Clone, Serialize)]
pub struct SupportMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: SenderType,
    pub content: String,
    pub kind: MessageKind,
    pub is_system_message: bool,
    pub reply_to: Option<Uuid>,
    pub reactions: Vec<Reaction>,
    pub seen_by: BTreeSet<Uuid>,
    #[serde(skip)]
    pub deleted_for: BTreeSet<Uuid>,
    pub edited: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSupportMessage {
    pub ticket_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender_type: SenderType,
    pub content: String,
    pub reply_to: Option<Uuid>,
}

impl NewSupportMessage {
    /// Markers are system messages; everything people write is text
    pub fn kind(&self) -> MessageKind {
        match self.sender_type {
            SenderType::System => MessageKind::System,
            SenderType::User | SenderType::Staff => MessageKind::Text,
        }
    }

    /// Initial `seen_by`: the author, if there is one
    pub fn seen_by(&self) -> BTreeSet<Uuid> {
        self.sender_id.into_iter().collect()
    }

    pub fn system(ticket_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            ticket_id,
            sender_id: None,
            sender_type: SenderType::System,
            content: content.into(),
            reply_to: None,
        }
    }
}

/// Truncate message content for list previews on a char boundary
pub fn preview(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
