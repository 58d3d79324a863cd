use std::sync::Arc;
use std::time::Instant;

use crate::buffer::SharedBuffer;
use crate::config::ServerConfig;
use crate::flush::FlushController;
use crate::storage::{PersistenceGateway, RecordStore};
use crate::sync::{BroadcastDispatcher, SubscriptionRegistry};

/// Main server state shared across all handlers
pub struct ServerState {
    pub config: ServerConfig,
    pub registry: SubscriptionRegistry,
    pub controller: Arc<FlushController>,
    /// Present only when records are stored in this process
    pub record_store: Option<Arc<dyn RecordStore>>,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        buffer: Arc<dyn SharedBuffer>,
        gateway: Arc<dyn PersistenceGateway>,
        record_store: Option<Arc<dyn RecordStore>>,
    ) -> Self {
        let registry = SubscriptionRegistry::with_capacity(config.max_subscribers);
        let controller = Arc::new(FlushController::new(
            buffer,
            gateway,
            BroadcastDispatcher::new(registry.clone()),
            config.flush_config(),
        ));

        Self {
            config,
            registry,
            controller,
            record_store,
            start_time: Instant::now(),
        }
    }

    pub fn buffer(&self) -> &Arc<dyn SharedBuffer> {
        self.controller.buffer()
    }

    pub fn dispatcher(&self) -> &BroadcastDispatcher {
        self.controller.dispatcher()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
