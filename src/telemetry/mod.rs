mod types;

pub use types::{
    parse_timestamp, Accelerometer, AgentData, Gps, OwnerId, PersistedRecord, QueueEntry, Record,
    RecordError, RecordId, RoadState,
};
