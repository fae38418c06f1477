//! Support ticket lifecycle
//!
//! ```text
//! waiting --staff joins--> active --either party closes--> closed --feedback--> closed+feedback
//!    \_____________________either party closes_____________/
//! ```
//!
//! These checks run against a snapshot; the store repeats the precondition
//! in its conditional update so a racing transition still loses cleanly.

use tourline_shared::{ChatError, ChatResult, SupportTicket, TicketStatus};
use uuid::Uuid;

pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;

/// What a staff join does to the ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// Waiting ticket: assign and activate
    Claim,
    /// Already assigned to the same staff member: nothing to change
    Rejoin,
}

pub fn join(ticket: &SupportTicket, staff_id: Uuid) -> ChatResult<Join> {
    match ticket.status {
        TicketStatus::Waiting => Ok(Join::Claim),
        TicketStatus::Active if ticket.is_assigned_to(&staff_id) => Ok(Join::Rejoin),
        TicketStatus::Active => Err(ChatError::invalid_state(
            "Support conversation already claimed by another staff member",
        )),
        TicketStatus::Closed => Err(ChatError::invalid_state(
            "Support conversation is already closed",
        )),
    }
}

pub fn close(ticket: &SupportTicket) -> ChatResult<()> {
    if ticket.status.is_open() {
        Ok(())
    } else {
        Err(ChatError::invalid_state(
            "Support conversation is already closed",
        ))
    }
}

/// Messages may be added until the ticket closes
pub fn send(ticket: &SupportTicket) -> ChatResult<()> {
    if ticket.status.is_open() {
        Ok(())
    } else {
        Err(ChatError::TicketClosed)
    }
}

/// Lifecycle first: an open ticket rejects feedback whatever the rating
pub fn feedback(ticket: &SupportTicket, rating: u8) -> ChatResult<()> {
    if ticket.status != TicketStatus::Closed {
        return Err(ChatError::invalid_state(
            "Feedback can only be given on a closed support conversation",
        ));
    }
    if ticket.feedback.is_some() {
        return Err(ChatError::invalid_state("Feedback was already submitted"));
    }
    if !(RATING_MIN..=RATING_MAX).contains(&rating) {
        return Err(ChatError::validation(format!(
            "Rating must be between {} and {}",
            RATING_MIN, RATING_MAX
        )));
    }
    Ok(())
}
