//! Postgres conversation and message store

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;
use tourline_shared::{
    Conversation, ConversationKind, GroupInfo, LastMessage, Message, MessageKind, NewMessage,
    Participant, Reaction, StoreError, StoreResult, UnreadCounts,
};
use uuid::Uuid;

use super::{private_key, ConversationStore, MessageStore, NewConversation};

const CONVERSATION_COLUMNS: &str = r#"
    c.id, c.kind, c.group_name, c.group_avatar, c.group_created_by, c.group_admins,
    c.deleted_for, c.last_message_id, c.last_message_preview, c.last_message_sender,
    c.last_message_kind, c.last_message_at, c.last_message_seq, c.created_at, c.updated_at
"#;

const MESSAGE_COLUMNS: &str = r#"
    id, seq, conversation_id, sender_id, content, kind, reply_to,
    seen_by, deleted_for, edited, edited_at, created_at
"#;

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    kind: String,
    group_name: Option<String>,
    group_avatar: Option<String>,
    group_created_by: Option<Uuid>,
    group_admins: Vec<Uuid>,
    deleted_for: Vec<Uuid>,
    last_message_id: Option<Uuid>,
    last_message_preview: Option<String>,
    last_message_sender: Option<Uuid>,
    last_message_kind: Option<String>,
    last_message_at: Option<OffsetDateTime>,
    last_message_seq: Option<i64>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct ParticipantRow {
    conversation_id: Uuid,
    user_id: Uuid,
    joined_at: OffsetDateTime,
    left_at: Option<OffsetDateTime>,
    unread_count: i32,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    seq: i64,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    kind: String,
    reply_to: Option<Uuid>,
    seen_by: Vec<Uuid>,
    deleted_for: Vec<Uuid>,
    edited: bool,
    edited_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
struct ReactionRow {
    message_id: Uuid,
    user_id: Uuid,
    reaction: String,
}

fn parse_kind(raw: &str) -> StoreResult<MessageKind> {
    MessageKind::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("message kind '{}'", raw)))
}

impl ConversationRow {
    fn into_conversation(self, participants: Vec<ParticipantRow>) -> StoreResult<Conversation> {
        let kind = ConversationKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("conversation kind '{}'", self.kind)))?;

        let last_message = match (
            self.last_message_id,
            self.last_message_sender,
            self.last_message_kind,
            self.last_message_at,
            self.last_message_seq,
        ) {
            (Some(message_id), Some(sender_id), Some(kind), Some(created_at), Some(seq)) => {
                Some(LastMessage {
                    message_id,
                    preview: self.last_message_preview.unwrap_or_default(),
                    sender_id,
                    kind: parse_kind(&kind)?,
                    created_at,
                    seq,
                })
            }
            _ => None,
        };

        let group_info = match (kind, self.group_name, self.group_created_by) {
            (ConversationKind::Group, Some(name), Some(created_by)) => Some(GroupInfo {
                name,
                avatar: self.group_avatar,
                created_by,
                admins: self.group_admins,
            }),
            _ => None,
        };

        let mut unread_counts = UnreadCounts::new();
        let participants = participants
            .into_iter()
            .map(|p| {
                if p.left_at.is_none() {
                    unread_counts.set(p.user_id, p.unread_count.max(0) as u32);
                }
                Participant {
                    user_id: p.user_id,
                    joined_at: p.joined_at,
                    left_at: p.left_at,
                }
            })
            .collect();

        Ok(Conversation {
            id: self.id,
            kind,
            participants,
            unread_counts,
            last_message,
            deleted_for: self.deleted_for.into_iter().collect(),
            group_info,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl MessageRow {
    fn into_message(self, reactions: Vec<Reaction>) -> StoreResult<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            kind: parse_kind(&self.kind)?,
            reply_to: self.reply_to,
            reactions,
            seen_by: self.seen_by.into_iter().collect::<BTreeSet<_>>(),
            deleted_for: self.deleted_for.into_iter().collect::<BTreeSet<_>>(),
            edited: self.edited,
            edited_at: self.edited_at,
            seq: self.seq,
            created_at: self.created_at,
        })
    }
}

/// Postgres-backed [`ConversationStore`] and [`MessageStore`]
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_conversations(&self, rows: Vec<ConversationRow>) -> StoreResult<Vec<Conversation>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let participant_rows: Vec<ParticipantRow> = sqlx::query_as(
            r#"
            SELECT conversation_id, user_id, joined_at, left_at, unread_count
            FROM conversation_participants
            WHERE conversation_id = ANY($1)
            ORDER BY conversation_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_conversation: HashMap<Uuid, Vec<ParticipantRow>> = HashMap::new();
        for row in participant_rows {
            by_conversation.entry(row.conversation_id).or_default().push(row);
        }

        rows.into_iter()
            .map(|row| {
                let participants = by_conversation.remove(&row.id).unwrap_or_default();
                row.into_conversation(participants)
            })
            .collect()
    }

    async fn load_messages(&self, rows: Vec<MessageRow>) -> StoreResult<Vec<Message>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let reaction_rows: Vec<ReactionRow> = sqlx::query_as(
            r#"
            SELECT message_id, user_id, reaction
            FROM message_reactions
            WHERE message_id = ANY($1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for row in reaction_rows {
            by_message.entry(row.message_id).or_default().push(Reaction {
                user_id: row.user_id,
                reaction: row.reaction,
            });
        }

        rows.into_iter()
            .map(|row| {
                let reactions = by_message.remove(&row.id).unwrap_or_default();
                row.into_message(reactions)
            })
            .collect()
    }

    async fn fetch_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM conversations c WHERE c.id = $1",
            CONVERSATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.load_conversations(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

async fn insert_participants(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    conversation_id: Uuid,
    participants: &[Uuid],
) -> Result<(), sqlx::Error> {
    let mut position = 0i32;
    let mut seen = BTreeSet::new();
    for user_id in participants {
        if !seen.insert(*user_id) {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, position)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(position)
        .execute(&mut **tx)
        .await?;
        position += 1;
    }
    Ok(())
}

#[async_trait]
impl ConversationStore for PgChatStore {
    async fn insert(&self, conversation: NewConversation) -> StoreResult<Conversation> {
        let mut tx = self.pool.begin().await?;

        let group = conversation.group_info.as_ref();
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO conversations (kind, group_name, group_avatar, group_created_by, group_admins)
            VALUES ($1, $2, $3, $4, COALESCE($5, '{}'::uuid[]))
            RETURNING id
            "#,
        )
        .bind(conversation.kind.as_str())
        .bind(group.map(|g| g.name.clone()))
        .bind(group.and_then(|g| g.avatar.clone()))
        .bind(group.map(|g| g.created_by))
        .bind(group.map(|g| g.admins.clone()))
        .fetch_one(&mut *tx)
        .await?;

        insert_participants(&mut tx, id, &conversation.participants).await?;
        tx.commit().await?;

        self.fetch_conversation(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("conversation {} vanished after insert", id)))
    }

    async fn get_or_create_private(&self, a: Uuid, b: Uuid) -> StoreResult<Conversation> {
        let key = private_key(a, b);
        let mut tx = self.pool.begin().await?;

        // A concurrent creator holding the same key makes this wait, then skip
        let created: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO conversations (kind, private_key)
            VALUES ('private', $1)
            ON CONFLICT (private_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match created {
            Some(id) => {
                insert_participants(&mut tx, id, &[a, b]).await?;
                id
            }
            None => {
                sqlx::query_scalar("SELECT id FROM conversations WHERE private_key = $1")
                    .bind(&key)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };
        tx.commit().await?;

        self.fetch_conversation(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("private conversation {} missing", id)))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        self.fetch_conversation(id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.user_id = $1
              AND NOT ($1 = ANY(c.deleted_for))
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC
            "#,
            CONVERSATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.load_conversations(rows).await
    }

    async fn post_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes sends and reads of one conversation
        sqlx::query("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(message.conversation_id)
            .fetch_optional(&mut *tx)
            .await?;

        let row: MessageRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO messages (conversation_id, sender_id, content, kind, reply_to, seen_by)
            VALUES ($1, $2, $3, $4, $5, ARRAY[$2]::uuid[])
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.reply_to)
        .fetch_one(&mut *tx)
        .await?;
        let stored = row.into_message(Vec::new())?;
        let last = LastMessage::from_message(&stored);

        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_id = $2,
                last_message_preview = $3,
                last_message_sender = $4,
                last_message_kind = $5,
                last_message_at = $6,
                last_message_seq = $7,
                deleted_for = '{}',
                updated_at = NOW()
            WHERE id = $1
              AND (last_message_seq IS NULL OR last_message_seq < $7)
            "#,
        )
        .bind(stored.conversation_id)
        .bind(last.message_id)
        .bind(&last.preview)
        .bind(last.sender_id)
        .bind(last.kind.as_str())
        .bind(last.created_at)
        .bind(last.seq)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = unread_count + 1
            WHERE conversation_id = $1
              AND user_id <> $2
              AND left_at IS NULL
            "#,
        )
        .bind(stored.conversation_id)
        .bind(stored.sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE messages
            SET seen_by = array_append(seen_by, $2)
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND NOT ($2 = ANY(seen_by))
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(reader)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = 0
            WHERE conversation_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ids)
    }

    async fn refresh_preview(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        preview: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_preview = $3
            WHERE id = $1 AND last_message_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(preview)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hide_for(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE conversations
            SET deleted_for = array_append(deleted_for, $2)
            WHERE id = $1 AND NOT ($2 = ANY(deleted_for))
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_participant(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, position)
            VALUES (
                $1, $2,
                (SELECT COALESCE(MAX(position), -1) + 1
                 FROM conversation_participants WHERE conversation_id = $1)
            )
            ON CONFLICT (conversation_id, user_id) DO UPDATE
            SET left_at = NULL, unread_count = 0, joined_at = NOW()
            WHERE conversation_participants.left_at IS NOT NULL
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_left(&self, conversation_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversation_participants
            SET left_at = NOW(), unread_count = 0
            WHERE conversation_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MessageStore for PgChatStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.get_many(&[id]).await?.pop())
    }

    async fn get_many(&self, ids: &[Uuid]) -> StoreResult<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages WHERE id = ANY($1) ORDER BY seq ASC",
            MESSAGE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        self.load_messages(rows).await
    }

    async fn page(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        let limit = i64::from(limit.max(1));
        let offset = (i64::from(page.max(1)) - 1) * limit;

        let mut rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM messages
            WHERE conversation_id = $1
              AND NOT ($2 = ANY(deleted_for))
            ORDER BY seq DESC
            LIMIT $3 OFFSET $4
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(conversation_id)
        .bind(viewer)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        self.load_messages(rows).await
    }

    async fn set_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        reaction: Option<String>,
    ) -> StoreResult<Option<Message>> {
        match reaction {
            Some(reaction) => {
                sqlx::query(
                    r#"
                    INSERT INTO message_reactions (message_id, user_id, reaction)
                    SELECT $1, $2, $3
                    WHERE EXISTS (SELECT 1 FROM messages WHERE id = $1)
                    ON CONFLICT (message_id, user_id) DO UPDATE
                    SET reaction = EXCLUDED.reaction, created_at = NOW()
                    "#,
                )
                .bind(message_id)
                .bind(user_id)
                .bind(reaction)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2")
                    .bind(message_id)
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        MessageStore::get(self, message_id).await
    }

    async fn edit(
        &self,
        message_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            r#"
            UPDATE messages
            SET content = $3, edited = TRUE, edited_at = NOW()
            WHERE id = $1 AND sender_id = $2
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .bind(sender_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.load_messages(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn hide_for(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET deleted_for = array_append(deleted_for, $2)
            WHERE id = $1 AND NOT ($2 = ANY(deleted_for))
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
