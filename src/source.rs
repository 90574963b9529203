//! Record source: one GET of the whole user batch.

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::error::FetchError;
use crate::types::UserRecord;

/// Where a run's records come from.
#[trait_variant::make(RecordSource: Send)]
#[allow(dead_code)]
pub trait LocalRecordSource {
    /// Fetch the full batch, in server order.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<UserRecord>, FetchError>;
}

pub struct HttpSource {
    http: Client,
    url: Url,
}

impl HttpSource {
    pub fn new(http: Client, url: Url) -> Self {
        Self { http, url }
    }

    async fn get_users(&self) -> Result<Vec<UserRecord>, FetchError> {
        let response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(FetchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<failed to read response body>".to_string()),
            });
        }

        let body = response.bytes().await.map_err(FetchError::Request)?;
        serde_json::from_slice(&body).map_err(FetchError::Decode)
    }
}

impl RecordSource for HttpSource {
    #[instrument(name = "fetch_users", skip_all, fields(url = %self.url))]
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<UserRecord>, FetchError> {
        let users = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = self.get_users() => result?,
        };

        debug!(count = users.len(), "Fetched users");
        Ok(users)
    }
}
