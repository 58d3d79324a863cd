pub mod buffer;
pub mod cli;
pub mod config;
pub mod flush;
pub mod handlers;
pub mod ingest;
pub mod state;
pub mod storage;
pub mod sync;
pub mod telemetry;

pub use buffer::{MemoryBuffer, RedisBuffer, SharedBuffer};
pub use config::ServerConfig;
pub use flush::{FlushConfig, FlushController, FlushOutcome};
pub use state::ServerState;
pub use sync::{BroadcastDispatcher, SubscriptionRegistry};
