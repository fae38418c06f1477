//! Postgres support ticket store

use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use tourline_shared::{
    Feedback, MessageKind, NewSupportMessage, Reaction, Role, SenderType, StoreError,
    StoreResult, SupportMessage, SupportTicket, TicketStatus, TicketUnread,
};
use uuid::Uuid;

use super::SupportStore;

const TICKET_COLUMNS: &str = r#"
    id, requesting_user, subject, status, assigned_staff, user_unread, staff_unread,
    feedback_resolved, feedback_rating, feedback_comment, feedback_submitted_at,
    created_at, updated_at, closed_at, closed_by
"#;

const MESSAGE_COLUMNS: &str = r#"
    id, seq, ticket_id, sender_id, sender_type, content, kind, is_system_message, reply_to,
    reactions, seen_by, deleted_for, edited, edited_at, created_at
"#;

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    requesting_user: Uuid,
    subject: String,
    status: String,
    assigned_staff: Option<Uuid>,
    user_unread: i32,
    staff_unread: i32,
    feedback_resolved: Option<bool>,
    feedback_rating: Option<i16>,
    feedback_comment: Option<String>,
    feedback_submitted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    closed_at: Option<OffsetDateTime>,
    closed_by: Option<String>,
}

impl TryFrom<TicketRow> for SupportTicket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = TicketStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("ticket status '{}'", row.status)))?;
        let closed_by = row
            .closed_by
            .as_deref()
            .map(|raw| {
                Role::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("closed_by '{}'", raw)))
            })
            .transpose()?;

        let feedback = match (row.feedback_resolved, row.feedback_rating, row.feedback_submitted_at) {
            (Some(is_resolved), Some(rating), Some(submitted_at)) => Some(Feedback {
                is_resolved,
                rating: u8::try_from(rating)
                    .map_err(|_| StoreError::Corrupt(format!("feedback rating {}", rating)))?,
                comment: row.feedback_comment,
                submitted_at,
            }),
            _ => None,
        };

        Ok(SupportTicket {
            id: row.id,
            requesting_user: row.requesting_user,
            subject: row.subject,
            status,
            assigned_staff: row.assigned_staff,
            unread_count: TicketUnread {
                user: row.user_unread.max(0) as u32,
                staff: row.staff_unread.max(0) as u32,
            },
            feedback,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
            closed_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct SupportMessageRow {
    id: Uuid,
    seq: i64,
    ticket_id: Uuid,
    sender_id: Option<Uuid>,
    sender_type: String,
    content: String,
    kind: String,
    is_system_message: bool,
    reply_to: Option<Uuid>,
    reactions: Json<Vec<Reaction>>,
    seen_by: Vec<Uuid>,
    deleted_for: Vec<Uuid>,
    edited: bool,
    edited_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<SupportMessageRow> for SupportMessage {
    type Error = StoreError;

    fn try_from(row: SupportMessageRow) -> Result<Self, Self::Error> {
        let sender_type = SenderType::parse(&row.sender_type)
            .ok_or_else(|| StoreError::Corrupt(format!("sender type '{}'", row.sender_type)))?;
        let kind = MessageKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("message kind '{}'", row.kind)))?;
        Ok(SupportMessage {
            id: row.id,
            ticket_id: row.ticket_id,
            sender_id: row.sender_id,
            sender_type,
            content: row.content,
            kind,
            is_system_message: row.is_system_message,
            reply_to: row.reply_to,
            reactions: row.reactions.0,
            seen_by: row.seen_by.into_iter().collect(),
            deleted_for: row.deleted_for.into_iter().collect(),
            edited: row.edited,
            edited_at: row.edited_at,
            seq: row.seq,
            created_at: row.created_at,
        })
    }
}

fn tickets(rows: Vec<TicketRow>) -> StoreResult<Vec<SupportTicket>> {
    rows.into_iter().map(SupportTicket::try_from).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Postgres-backed [`SupportStore`]
#[derive(Clone)]
pub struct PgSupportStore {
    pool: PgPool,
}

impl PgSupportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_ticket(&self, sql: &str, id: Uuid) -> StoreResult<Option<SupportTicket>> {
        let row: Option<TicketRow> = sqlx::query_as(sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(SupportTicket::try_from).transpose()
    }
}

#[async_trait]
impl SupportStore for PgSupportStore {
    async fn create_ticket(
        &self,
        requesting_user: Uuid,
        subject: &str,
        description: &str,
    ) -> StoreResult<Option<(SupportTicket, SupportMessage)>> {
        let mut tx = self.pool.begin().await?;

        let inserted: Result<TicketRow, sqlx::Error> = sqlx::query_as(&format!(
            r#"
            INSERT INTO support_tickets (requesting_user, subject, staff_unread)
            VALUES ($1, $2, 1)
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(requesting_user)
        .bind(subject)
        .fetch_one(&mut *tx)
        .await;

        let ticket_row = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let seed_row: SupportMessageRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO support_messages (ticket_id, sender_type, content, kind, is_system_message)
            VALUES ($1, 'system', $2, 'system', TRUE)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(ticket_row.id)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some((
            SupportTicket::try_from(ticket_row)?,
            SupportMessage::try_from(seed_row)?,
        )))
    }

    async fn get_ticket(&self, id: Uuid) -> StoreResult<Option<SupportTicket>> {
        self.fetch_ticket(
            &format!("SELECT {} FROM support_tickets WHERE id = $1", TICKET_COLUMNS),
            id,
        )
        .await
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<SupportTicket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM support_tickets
            WHERE requesting_user = $1
            ORDER BY updated_at DESC
            "#,
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        tickets(rows)
    }

    async fn list_for_staff(&self, staff_id: Uuid) -> StoreResult<Vec<SupportTicket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM support_tickets
            WHERE status = 'waiting' OR assigned_staff = $1
            ORDER BY updated_at DESC
            "#,
            TICKET_COLUMNS
        ))
        .bind(staff_id)
        .fetch_all(&self.pool)
        .await?;
        tickets(rows)
    }

    async fn claim(&self, id: Uuid, staff_id: Uuid) -> StoreResult<Option<SupportTicket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE support_tickets
            SET status = 'active', assigned_staff = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'waiting'
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SupportTicket::try_from).transpose()
    }

    async fn close(&self, id: Uuid, closed_by: Role) -> StoreResult<Option<SupportTicket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE support_tickets
            SET status = 'closed', closed_at = NOW(), closed_by = $2, updated_at = NOW()
            WHERE id = $1 AND status <> 'closed'
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(closed_by.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(SupportTicket::try_from).transpose()
    }

    async fn submit_feedback(
        &self,
        id: Uuid,
        feedback: Feedback,
    ) -> StoreResult<Option<SupportTicket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE support_tickets
            SET feedback_resolved = $2,
                feedback_rating = $3,
                feedback_comment = $4,
                feedback_submitted_at = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'closed' AND feedback_submitted_at IS NULL
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(feedback.is_resolved)
        .bind(i16::from(feedback.rating))
        .bind(&feedback.comment)
        .bind(feedback.submitted_at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SupportTicket::try_from).transpose()
    }

    async fn append_message(
        &self,
        message: NewSupportMessage,
        notify: Option<Role>,
        require_open: bool,
    ) -> StoreResult<Option<SupportMessage>> {
        // The ticket update gates the insert, so a message can never land on a
        // ticket that closed concurrently when `require_open` is set.
        let row: Option<SupportMessageRow> = sqlx::query_as(&format!(
            r#"
            WITH touched AS (
                UPDATE support_tickets
                SET user_unread = user_unread + CASE WHEN $6 = 'user' THEN 1 ELSE 0 END,
                    staff_unread = staff_unread + CASE WHEN $6 = 'staff' THEN 1 ELSE 0 END,
                    updated_at = NOW()
                WHERE id = $1 AND (NOT $7 OR status <> 'closed')
                RETURNING id
            )
            INSERT INTO support_messages
                (ticket_id, sender_id, sender_type, content, kind, is_system_message, reply_to,
                 seen_by)
            SELECT touched.id, $2, $3, $4, $8, $3 = 'system', $5, $9
            FROM touched
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message.ticket_id)
        .bind(message.sender_id)
        .bind(message.sender_type.as_str())
        .bind(&message.content)
        .bind(message.reply_to)
        .bind(notify.map(|r| r.as_str()))
        .bind(require_open)
        .bind(message.kind().as_str())
        .bind(message.seen_by().into_iter().collect::<Vec<Uuid>>())
        .fetch_optional(&self.pool)
        .await?;
        row.map(SupportMessage::try_from).transpose()
    }

    async fn get_message(&self, id: Uuid) -> StoreResult<Option<SupportMessage>> {
        let row: Option<SupportMessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM support_messages WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SupportMessage::try_from).transpose()
    }

    async fn messages(
        &self,
        ticket_id: Uuid,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<SupportMessage>> {
        let limit = i64::from(limit.max(1));
        let offset = (i64::from(page.max(1)) - 1) * limit;

        let mut rows: Vec<SupportMessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM support_messages
            WHERE ticket_id = $1
            ORDER BY seq DESC
            LIMIT $2 OFFSET $3
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(ticket_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        rows.into_iter().map(SupportMessage::try_from).collect()
    }

    async fn mark_ticket_read(&self, id: Uuid, role: Role, reader: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        // Same row the append CTE updates, so reads and appends serialize
        sqlx::query("SELECT id FROM support_tickets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE support_messages
            SET seen_by = array_append(seen_by, $2)
            WHERE ticket_id = $1
              AND sender_id IS DISTINCT FROM $2
              AND NOT ($2 = ANY(seen_by))
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(reader)
        .fetch_all(&mut *tx)
        .await?;

        let sql = match role {
            Role::User => "UPDATE support_tickets SET user_unread = 0 WHERE id = $1",
            Role::Staff => "UPDATE support_tickets SET staff_unread = 0 WHERE id = $1",
        };
        sqlx::query(sql).bind(id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(ids)
    }
}
