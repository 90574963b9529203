//! Record sink: one POST per delivery attempt.

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::error::DeliveryError;
use crate::types::UserRecord;

/// Where matching records are forwarded to.
#[trait_variant::make(RecordSink: Send)]
#[allow(dead_code)]
pub trait LocalRecordSink {
    /// Make exactly one delivery attempt for `record`.
    async fn deliver(
        &self,
        cancel: &CancellationToken,
        record: &UserRecord,
    ) -> Result<(), DeliveryError>;
}

pub struct HttpSink {
    http: Client,
    url: Url,
}

impl HttpSink {
    pub fn new(http: Client, url: Url) -> Self {
        Self { http, url }
    }

    async fn post(&self, record: &UserRecord) -> Result<(), DeliveryError> {
        // `.json()` also sets `Content-Type: application/json`
        let response = self
            .http
            .post(self.url.clone())
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

impl RecordSink for HttpSink {
    #[instrument(name = "post_user", skip_all, fields(email = %record.email))]
    async fn deliver(
        &self,
        cancel: &CancellationToken,
        record: &UserRecord,
    ) -> Result<(), DeliveryError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
            result = self.post(record) => {
                debug!(ok = result.is_ok(), "Delivery attempt finished");
                result
            }
        }
    }
}
