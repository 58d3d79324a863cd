use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

use crate::storage::traits::{PersistenceGateway, StorageError, StorageResult};
use crate::telemetry::{PersistedRecord, Record};

/// Persistence gateway that forwards batches to a remote Store API
pub struct StoreApiGateway {
    client: Client,
    records_url: String,
}

impl StoreApiGateway {
    pub fn new(base_url: &str, timeout: Duration) -> StorageResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            records_url: format!("{}/api/records", base_url.trim_end_matches('/')),
        })
    }

    pub fn records_url(&self) -> &str {
        &self.records_url
    }
}

#[async_trait]
impl PersistenceGateway for StoreApiGateway {
    async fn store(&self, batch: &[Record]) -> StorageResult<Vec<PersistedRecord>> {
        debug!("Posting {} records to {}", batch.len(), self.records_url);

        let response = self.client.post(&self.records_url).json(batch).send().await?;
        let status = response.status();

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Store API returned status {}: {}", status, detail);
            return Err(StorageError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let persisted: Vec<PersistedRecord> = response.json().await?;
        if persisted.len() != batch.len() {
            return Err(StorageError::CountMismatch {
                expected: batch.len(),
                returned: persisted.len(),
            });
        }
        Ok(persisted)
    }
}
