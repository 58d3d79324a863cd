mod memory;
mod postgres;
mod store_api;
mod traits;

pub use memory::MemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use store_api::StoreApiGateway;
pub use traits::{PersistenceGateway, RecordStore, StorageError, StorageResult};
