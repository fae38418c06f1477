//! Private and group messaging

mod accountant;
mod service;

pub use accountant::{counterpart, UnreadAccountant};
pub use service::{
    ChatService, CreateGroup, HistoryMessage, HistoryPage, ReplyRef, SendMessage,
};

use tourline_shared::{ChatError, ChatResult};

/// Limits applied to user-supplied content and paging
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub message_max_length: usize,
    pub history_page_limit_max: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            message_max_length: 5000,
            history_page_limit_max: 100,
        }
    }
}

impl Limits {
    /// Trim content and reject empty or oversized input
    pub fn content(&self, content: &str) -> ChatResult<String> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ChatError::validation("Message content cannot be empty"));
        }
        if trimmed.chars().count() > self.message_max_length {
            return Err(ChatError::validation(format!(
                "Message content exceeds {} characters",
                self.message_max_length
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Normalize paging input: page starts at 1, limit within 1..=max
    pub fn page(&self, page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(50)
            .clamp(1, self.history_page_limit_max.max(1));
        (page, limit)
    }
}
