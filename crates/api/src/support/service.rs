//! Support ticket operations

use serde::Serialize;
use std::sync::Arc;
use tourline_shared::{
    ChatError, ChatResult, Feedback, Identity, NewSupportMessage, Role, SupportMessage,
    SupportTicket, TicketStatus,
};
use time::OffsetDateTime;
use uuid::Uuid;

use super::state_machine::{self, Join};
use crate::chat::{Limits, UnreadAccountant};
use crate::notifications::{category, NotificationEvent, Notifier};
use crate::store::SupportStore;
use crate::websocket::events::{Delivery, MessagePayload, Outcome, ServerEvent};
use crate::websocket::room::RoomKey;

const SUBJECT_MAX_CHARS: usize = 200;
const COMMENT_MAX_CHARS: usize = 2000;

pub const STAFF_JOINED: &str = "A support agent has joined the conversation";
pub const CONVERSATION_CLOSED: &str = "This conversation has been closed";

#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub subject: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SubmitFeedback {
    pub is_resolved: bool,
    pub rating: u8,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketHistory {
    pub ticket_id: Uuid,
    pub page: u32,
    pub limit: u32,
    pub messages: Vec<SupportMessage>,
}

#[derive(Clone)]
pub struct SupportService {
    store: Arc<dyn SupportStore>,
    accountant: UnreadAccountant,
    notifier: Notifier,
    limits: Limits,
}

fn ticket_updated(room: RoomKey, ticket: &SupportTicket) -> Delivery {
    Delivery::to(
        room,
        ServerEvent::TicketUpdated {
            ticket: ticket.clone(),
        },
    )
}

fn new_message(message: &SupportMessage) -> Delivery {
    Delivery::to(
        RoomKey::Support(message.ticket_id),
        ServerEvent::NewMessage {
            conversation_id: message.ticket_id,
            message: MessagePayload::Support(message.clone()),
        },
    )
}

/// Where the given side of a ticket hears about it outside the ticket room.
/// Staff are reached in their inbox once assigned, through the staff room before.
fn side_room(ticket: &SupportTicket, role: Role) -> RoomKey {
    match (role, ticket.assigned_staff) {
        (Role::User, _) => RoomKey::Inbox(ticket.requesting_user),
        (Role::Staff, Some(staff_id)) => RoomKey::Inbox(staff_id),
        (Role::Staff, None) => RoomKey::Staff,
    }
}

fn require_party(ticket: &SupportTicket, identity: &Identity) -> ChatResult<()> {
    if ticket.is_party(identity) {
        Ok(())
    } else {
        Err(ChatError::access_denied(
            "Not a party to this support conversation",
        ))
    }
}

impl SupportService {
    pub fn new(
        store: Arc<dyn SupportStore>,
        accountant: UnreadAccountant,
        notifier: Notifier,
        limits: Limits,
    ) -> Self {
        Self {
            store,
            accountant,
            notifier,
            limits,
        }
    }

    pub async fn find(&self, ticket_id: Uuid) -> ChatResult<Option<SupportTicket>> {
        Ok(self.store.get_ticket(ticket_id).await?)
    }

    async fn load(&self, ticket_id: Uuid) -> ChatResult<SupportTicket> {
        self.find(ticket_id)
            .await?
            .ok_or_else(|| ChatError::not_found("Support conversation not found"))
    }

    /// Owner and assigned staff may join the ticket room and write to it
    pub fn can_access(ticket: &SupportTicket, identity: &Identity) -> bool {
        ticket.is_party(identity)
    }

    /// Anyone who may act on the ticket, plus any staff member while it waits
    pub fn can_view(ticket: &SupportTicket, identity: &Identity) -> bool {
        ticket.is_party(identity)
            || (identity.is_staff() && ticket.status == TicketStatus::Waiting)
    }

    pub async fn create(
        &self,
        identity: &Identity,
        input: CreateTicket,
    ) -> ChatResult<Outcome<SupportTicket>> {
        if identity.is_staff() {
            return Err(ChatError::access_denied(
                "Only users can open support conversations",
            ));
        }
        let subject = input.subject.trim();
        if subject.is_empty() || subject.chars().count() > SUBJECT_MAX_CHARS {
            return Err(ChatError::validation(format!(
                "Subject must be 1 to {} characters",
                SUBJECT_MAX_CHARS
            )));
        }
        let description = self.limits.content(&input.description)?;

        let (ticket, seed) = self
            .store
            .create_ticket(identity.user_id, subject, &description)
            .await?
            .ok_or_else(|| {
                ChatError::invalid_state("You already have an open support conversation")
            })?;

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %identity.user_id,
            "Support conversation opened"
        );

        self.notifier
            .publish(NotificationEvent::new(
                category::SUPPORT_REQUEST,
                "New support request",
                ticket.subject.clone(),
                serde_json::json!({
                    "ticket_id": ticket.id,
                    "user_id": ticket.requesting_user,
                    "seed_message_id": seed.id,
                }),
            ))
            .await;

        let deliveries = vec![
            ticket_updated(RoomKey::Staff, &ticket),
            ticket_updated(RoomKey::Inbox(ticket.requesting_user), &ticket),
        ];
        Ok(Outcome::new(ticket, deliveries))
    }

    /// Staff claims a waiting ticket, or re-enters one already assigned to them
    pub async fn join(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
    ) -> ChatResult<Outcome<SupportTicket>> {
        if !identity.is_staff() {
            return Err(ChatError::access_denied(
                "Only staff can join support conversations",
            ));
        }
        let ticket = self.load(ticket_id).await?;
        if state_machine::join(&ticket, identity.user_id)? == Join::Rejoin {
            return Ok(Outcome::quiet(ticket));
        }

        // Another staff member may have claimed it since the snapshot
        let claimed = self
            .store
            .claim(ticket_id, identity.user_id)
            .await?
            .ok_or_else(|| {
                ChatError::invalid_state("Support conversation was claimed by another staff member")
            })?;
        let marker = self.accountant.ticket_marker(ticket_id, STAFF_JOINED).await?;
        let ticket = self.find(ticket_id).await?.unwrap_or(claimed);

        tracing::info!(ticket_id = %ticket_id, staff_id = %identity.user_id, "Support conversation claimed");

        let mut deliveries = Vec::with_capacity(3);
        if let Some(marker) = &marker {
            deliveries.push(new_message(marker));
        }
        deliveries.push(ticket_updated(RoomKey::Staff, &ticket));
        deliveries.push(ticket_updated(RoomKey::Inbox(ticket.requesting_user), &ticket));
        Ok(Outcome::new(ticket, deliveries))
    }

    pub async fn close(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
    ) -> ChatResult<Outcome<SupportTicket>> {
        let ticket = self.load(ticket_id).await?;
        require_party(&ticket, identity)?;
        state_machine::close(&ticket)?;

        let closed = self
            .store
            .close(ticket_id, identity.role)
            .await?
            .ok_or_else(|| ChatError::invalid_state("Support conversation is already closed"))?;
        let marker = self
            .accountant
            .ticket_marker(ticket_id, CONVERSATION_CLOSED)
            .await?;
        let ticket = self.find(ticket_id).await?.unwrap_or(closed);

        tracing::info!(
            ticket_id = %ticket_id,
            closed_by = identity.role.as_str(),
            "Support conversation closed"
        );

        let mut deliveries = Vec::with_capacity(3);
        if let Some(marker) = &marker {
            deliveries.push(new_message(marker));
        }
        deliveries.push(ticket_updated(RoomKey::Staff, &ticket));
        deliveries.push(ticket_updated(RoomKey::Inbox(ticket.requesting_user), &ticket));
        Ok(Outcome::new(ticket, deliveries))
    }

    pub async fn send(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        content: &str,
        reply_to: Option<Uuid>,
    ) -> ChatResult<Outcome<SupportMessage>> {
        let ticket = self.load(ticket_id).await?;
        require_party(&ticket, identity)?;
        state_machine::send(&ticket)?;
        let content = self.limits.content(content)?;

        if let Some(reply_id) = reply_to {
            match self.store.get_message(reply_id).await? {
                Some(target) if target.ticket_id == ticket_id && !target.is_system_message => {}
                _ => {
                    return Err(ChatError::validation(
                        "Reply target not found in this support conversation",
                    ))
                }
            }
        }

        let message = self
            .accountant
            .ticket_message(
                NewSupportMessage {
                    ticket_id,
                    sender_id: Some(identity.user_id),
                    sender_type: identity.role.into(),
                    content,
                    reply_to,
                },
                identity.role,
            )
            .await?
            // Closed between the snapshot and the conditional append
            .ok_or(ChatError::TicketClosed)?;
        let ticket = self.find(ticket_id).await?.unwrap_or(ticket);

        let counterpart = crate::chat::counterpart(identity.role);
        let deliveries = vec![
            new_message(&message),
            ticket_updated(side_room(&ticket, counterpart), &ticket),
        ];
        Ok(Outcome::new(message, deliveries))
    }

    pub async fn mark_read(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
    ) -> ChatResult<Outcome<SupportTicket>> {
        let ticket = self.load(ticket_id).await?;
        require_party(&ticket, identity)?;
        let changed = self
            .accountant
            .ticket_read(ticket_id, identity.role, identity.user_id)
            .await?;
        let ticket = self.find(ticket_id).await?.unwrap_or(ticket);

        let mut deliveries = Vec::with_capacity(2);
        if !changed.is_empty() {
            deliveries.push(Delivery::to(
                RoomKey::Support(ticket_id),
                ServerEvent::MessagesRead {
                    conversation_id: ticket_id,
                    reader_id: identity.user_id,
                    message_ids: changed,
                },
            ));
        }
        deliveries.push(ticket_updated(RoomKey::Inbox(identity.user_id), &ticket));
        Ok(Outcome::new(ticket, deliveries))
    }

    pub async fn feedback(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        input: SubmitFeedback,
    ) -> ChatResult<Outcome<SupportTicket>> {
        let ticket = self.load(ticket_id).await?;
        if identity.is_staff() || !ticket.is_owner(&identity.user_id) {
            return Err(ChatError::access_denied(
                "Only the requesting user can leave feedback",
            ));
        }
        state_machine::feedback(&ticket, input.rating)?;

        let comment = input
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > COMMENT_MAX_CHARS)
        {
            return Err(ChatError::validation(format!(
                "Comment exceeds {} characters",
                COMMENT_MAX_CHARS
            )));
        }

        let feedback = Feedback {
            is_resolved: input.is_resolved,
            rating: input.rating,
            comment,
            submitted_at: OffsetDateTime::now_utc(),
        };
        let ticket = self
            .store
            .submit_feedback(ticket_id, feedback)
            .await?
            .ok_or_else(|| ChatError::invalid_state("Feedback was already submitted"))?;

        self.notifier
            .publish(NotificationEvent::new(
                category::SUPPORT_FEEDBACK,
                "Support feedback received",
                format!("Rated {}/{}", input.rating, state_machine::RATING_MAX),
                serde_json::json!({
                    "ticket_id": ticket.id,
                    "assigned_staff": ticket.assigned_staff,
                    "rating": input.rating,
                    "is_resolved": input.is_resolved,
                }),
            ))
            .await;

        let deliveries = vec![ticket_updated(side_room(&ticket, Role::Staff), &ticket)];
        Ok(Outcome::new(ticket, deliveries))
    }

    /// Own tickets for users; the waiting queue plus own assignments for staff
    pub async fn list(&self, identity: &Identity) -> ChatResult<Vec<SupportTicket>> {
        let tickets = match identity.role {
            Role::User => self.store.list_for_user(identity.user_id).await?,
            Role::Staff => self.store.list_for_staff(identity.user_id).await?,
        };
        Ok(tickets)
    }

    pub async fn get(&self, identity: &Identity, ticket_id: Uuid) -> ChatResult<SupportTicket> {
        let ticket = self.load(ticket_id).await?;
        if !Self::can_view(&ticket, identity) {
            return Err(ChatError::access_denied(
                "Not a party to this support conversation",
            ));
        }
        Ok(ticket)
    }

    pub async fn messages(
        &self,
        identity: &Identity,
        ticket_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ChatResult<TicketHistory> {
        self.get(identity, ticket_id).await?;
        let (page, limit) = self.limits.page(page, limit);
        let messages = self.store.messages(ticket_id, page, limit).await?;
        Ok(TicketHistory {
            ticket_id,
            page,
            limit,
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{MemoryQueue, NotificationQueue};
    use crate::store::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        support: SupportService,
        queue: Arc<MemoryQueue>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let support = SupportService::new(
            store.clone(),
            UnreadAccountant::new(store.clone(), store.clone()),
            Notifier::new(queue.clone(), "staff"),
            Limits::default(),
        );
        Fixture { support, queue }
    }

    fn request() -> CreateTicket {
        CreateTicket {
            subject: "Refund".into(),
            description: "My tour was cancelled".into(),
        }
    }

    #[tokio::test]
    async fn test_create_publishes_and_rejects_second_open_ticket() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());

        let outcome = f.support.create(&user, request()).await.unwrap();
        assert_eq!(outcome.value.status, TicketStatus::Waiting);
        assert_eq!(outcome.value.unread_count.staff, 1);
        assert_eq!(outcome.deliveries[0].room, RoomKey::Staff);

        let queued = f
            .queue
            .dequeue("staff", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(queued.category, category::SUPPORT_REQUEST);

        assert!(matches!(
            f.support.create(&user, request()).await,
            Err(ChatError::InvalidState(_))
        ));

        let staff = Identity::staff(Uuid::new_v4());
        assert!(matches!(
            f.support.create(&staff, request()).await,
            Err(ChatError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_create_succeeds_when_broker_is_down() {
        let f = fixture();
        f.queue.set_available(false);
        let user = Identity::user(Uuid::new_v4());
        assert!(f.support.create(&user, request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_claims_once() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());
        let staff = Identity::staff(Uuid::new_v4());
        let rival = Identity::staff(Uuid::new_v4());
        let ticket = f.support.create(&user, request()).await.unwrap().value;

        let joined = f.support.join(&staff, ticket.id).await.unwrap();
        assert_eq!(joined.value.status, TicketStatus::Active);
        assert!(joined.value.is_assigned_to(&staff.user_id));
        assert!(matches!(
            joined.deliveries[0].event,
            ServerEvent::NewMessage { .. }
        ));

        // Rejoin by the same staff member is quiet
        let again = f.support.join(&staff, ticket.id).await.unwrap();
        assert!(again.deliveries.is_empty());

        assert!(matches!(
            f.support.join(&rival, ticket.id).await,
            Err(ChatError::InvalidState(_))
        ));
        assert!(matches!(
            f.support.join(&user, ticket.id).await,
            Err(ChatError::AccessDenied(_))
        ));

        let history = f.support.messages(&user, ticket.id, None, None).await.unwrap();
        let markers: Vec<&str> = history
            .messages
            .iter()
            .filter(|m| m.is_system_message)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(markers, vec!["My tour was cancelled", STAFF_JOINED]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_joins_have_one_winner() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());
        let ticket_id = f.support.create(&user, request()).await.unwrap().value.id;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let support = f.support.clone();
            let staff = Identity::staff(Uuid::new_v4());
            handles.push(tokio::spawn(async move {
                support.join(&staff, ticket_id).await.map(|o| o.value)
            }));
        }

        let mut winners = Vec::new();
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(ticket) => winners.push(ticket),
                Err(ChatError::InvalidState(_)) => losers += 1,
                Err(other) => panic!("unexpected join error: {:?}", other),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(losers, 1);
        assert_eq!(winners[0].status, TicketStatus::Active);

        // Exactly one join marker made it into the log
        let history = f.support.messages(&user, ticket_id, None, None).await.unwrap();
        let joined = history
            .messages
            .iter()
            .filter(|m| m.content == STAFF_JOINED)
            .count();
        assert_eq!(joined, 1);
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());
        let staff = Identity::staff(Uuid::new_v4());
        let ticket = f.support.create(&user, request()).await.unwrap().value;
        f.support.join(&staff, ticket.id).await.unwrap();

        let sent = f
            .support
            .send(&staff, ticket.id, "Looking into it", None)
            .await
            .unwrap();
        assert_eq!(sent.deliveries[1].room, RoomKey::Inbox(user.user_id));

        let closed = f.support.close(&user, ticket.id).await.unwrap().value;
        assert_eq!(closed.status, TicketStatus::Closed);
        assert_eq!(closed.closed_by, Some(Role::User));
        assert!(closed.closed_at.is_some());

        assert!(matches!(
            f.support.send(&staff, ticket.id, "one more thing", None).await,
            Err(ChatError::TicketClosed)
        ));
        assert!(matches!(
            f.support.close(&staff, ticket.id).await,
            Err(ChatError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_unread_by_role_and_read() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());
        let staff = Identity::staff(Uuid::new_v4());
        let ticket = f.support.create(&user, request()).await.unwrap().value;
        f.support.join(&staff, ticket.id).await.unwrap();

        f.support.send(&user, ticket.id, "hello?", None).await.unwrap();
        f.support.send(&staff, ticket.id, "hi", None).await.unwrap();

        let ticket = f.support.get(&user, ticket.id).await.unwrap();
        assert_eq!(ticket.unread_count.staff, 2);
        assert_eq!(ticket.unread_count.user, 1);

        let read = f.support.mark_read(&staff, ticket.id).await.unwrap();
        assert_eq!(read.value.unread_count.staff, 0);
        assert_eq!(read.value.unread_count.user, 1);
        assert!(read.deliveries.iter().any(|d| matches!(
            &d.event,
            ServerEvent::MessagesRead { reader_id, message_ids, .. }
                if *reader_id == staff.user_id && message_ids.len() == 3
        )));

        // Only the other side's messages gain the reader
        let history = f.support.messages(&staff, ticket.id, None, None).await.unwrap();
        for message in &history.messages {
            let authored = message.sender_id == Some(staff.user_id);
            assert_eq!(message.seen_by.contains(&staff.user_id), !authored);
        }

        let again = f.support.mark_read(&staff, ticket.id).await.unwrap();
        assert_eq!(again.deliveries.len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_flow() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());
        let staff = Identity::staff(Uuid::new_v4());
        let ticket = f.support.create(&user, request()).await.unwrap().value;
        let input = SubmitFeedback {
            is_resolved: true,
            rating: 5,
            comment: Some("  great help ".into()),
        };

        assert!(matches!(
            f.support.feedback(&user, ticket.id, input.clone()).await,
            Err(ChatError::InvalidState(_))
        ));
        let out_of_range = SubmitFeedback {
            rating: 0,
            ..input.clone()
        };
        assert!(matches!(
            f.support.feedback(&user, ticket.id, out_of_range.clone()).await,
            Err(ChatError::InvalidState(_))
        ));

        f.support.close(&user, ticket.id).await.unwrap();
        assert!(matches!(
            f.support.feedback(&user, ticket.id, out_of_range).await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            f.support.feedback(&staff, ticket.id, input.clone()).await,
            Err(ChatError::AccessDenied(_))
        ));

        let rated = f.support.feedback(&user, ticket.id, input.clone()).await.unwrap().value;
        let feedback = rated.feedback.unwrap();
        assert_eq!(feedback.rating, 5);
        assert_eq!(feedback.comment.as_deref(), Some("great help"));

        assert!(matches!(
            f.support.feedback(&user, ticket.id, input).await,
            Err(ChatError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_visibility_rules() {
        let f = fixture();
        let user = Identity::user(Uuid::new_v4());
        let stranger = Identity::user(Uuid::new_v4());
        let staff = Identity::staff(Uuid::new_v4());
        let other_staff = Identity::staff(Uuid::new_v4());
        let ticket = f.support.create(&user, request()).await.unwrap().value;

        assert!(f.support.get(&other_staff, ticket.id).await.is_ok());
        assert!(matches!(
            f.support.get(&stranger, ticket.id).await,
            Err(ChatError::AccessDenied(_))
        ));

        f.support.join(&staff, ticket.id).await.unwrap();
        assert!(matches!(
            f.support.get(&other_staff, ticket.id).await,
            Err(ChatError::AccessDenied(_))
        ));
        assert_eq!(f.support.list(&other_staff).await.unwrap().len(), 0);
        assert_eq!(f.support.list(&staff).await.unwrap().len(), 1);
    }
}
