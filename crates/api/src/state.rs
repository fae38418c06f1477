//! Application state shared across handlers

use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::StaffTokenVerifier;
use crate::chat::{ChatService, Limits, UnreadAccountant};
use crate::config::Config;
use crate::notifications::{NotificationQueue, Notifier};
use crate::store::{
    ConversationStore, MemoryStore, MessageStore, PgChatStore, PgSupportStore, SupportStore,
};
use crate::support::SupportService;
use crate::websocket::Gateway;

/// Backing stores for the conversation services
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub support: Arc<dyn SupportStore>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            conversations: store.clone(),
            messages: store.clone(),
            support: store,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        let chat = Arc::new(PgChatStore::new(pool.clone()));
        Self {
            conversations: chat.clone(),
            messages: chat,
            support: Arc::new(PgSupportStore::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: StaffTokenVerifier,
    pub chat: ChatService,
    pub support: SupportService,
    pub gateway: Gateway,
    pub notifier: Notifier,
    /// Present when running against Postgres
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Stores,
        queue: Arc<dyn NotificationQueue>,
        pool: Option<PgPool>,
    ) -> Self {
        let limits = Limits {
            message_max_length: config.message_max_length,
            history_page_limit_max: config.history_page_limit_max,
        };
        let accountant =
            UnreadAccountant::new(stores.conversations.clone(), stores.support.clone());
        let notifier = Notifier::new(queue, config.notification_channel.clone());

        Self {
            verifier: StaffTokenVerifier::new(&config.staff_jwt_secret),
            chat: ChatService::new(
                stores.conversations,
                stores.messages,
                accountant.clone(),
                limits,
            ),
            support: SupportService::new(stores.support, accountant, notifier.clone(), limits),
            gateway: Gateway::new(),
            notifier,
            pool,
            config: Arc::new(config),
        }
    }

    /// State backed by in-memory stores
    pub fn in_memory(config: Config, queue: Arc<dyn NotificationQueue>) -> Self {
        Self::new(config, Stores::memory(), queue, None)
    }

    pub async fn database_healthy(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => true,
        }
    }
}
