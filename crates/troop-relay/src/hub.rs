//! Shared relay state.

use std::sync::Arc;

use troop_store::OrgStore;

use crate::config::ServerConfig;
use crate::handlers::EventHandlers;
use crate::lifecycle::LifecycleManager;
use crate::presence::PresenceRegistry;
use crate::router::TopicRouter;

/// Everything a WebSocket session needs, shared across sessions via `Arc`.
#[derive(Debug)]
pub struct RelayHub {
    /// Who is online.
    pub presence: Arc<PresenceRegistry>,
    /// Topic subscriptions.
    pub router: Arc<TopicRouter>,
    /// Connect/disconnect transitions.
    pub lifecycle: LifecycleManager,
    /// Inbound event dispatch.
    pub handlers: EventHandlers,
}

impl RelayHub {
    /// Wire a hub over `store`.
    pub fn new(store: Arc<dyn OrgStore>, config: &ServerConfig) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let router = Arc::new(TopicRouter::new());
        Self {
            lifecycle: LifecycleManager::new(presence.clone(), router.clone(), store.clone()),
            handlers: EventHandlers::new(store, router.clone(), config.max_message_chars),
            presence,
            router,
        }
    }
}
