//! Support tickets between a user and the staff team

mod service;
pub mod state_machine;

pub use service::{
    CreateTicket, SubmitFeedback, SupportService, TicketHistory, CONVERSATION_CLOSED,
    STAFF_JOINED,
};
