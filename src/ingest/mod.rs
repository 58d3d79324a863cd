mod http;
mod mqtt;

pub use http::{ingest_record, IngestResponse};
pub use mqtt::{MqttIngest, MqttSettings};
