//! HTTP completion callbacks

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crewplan_core::store::{CallbackNotifier, CompletionNotice};
use crewplan_core::{Error, Result};

const PROVIDER: &str = "callback";

/// POSTs the analysis summary as JSON to the request's callback URL
#[derive(Debug, Clone)]
pub struct HttpCallbackNotifier {
    client: reqwest::Client,
}

impl HttpCallbackNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("crewplan/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    async fn notify(&self, notice: &CompletionNotice) -> Result<()> {
        let response = self
            .client
            .post(&notice.callback_url)
            .json(&notice.summary)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                execution_id = %notice.summary.execution_id,
                status = status.as_u16(),
                "Callback endpoint rejected the notice"
            );
            return Err(Error::provider(PROVIDER, format!("callback returned {}", status)));
        }

        debug!(execution_id = %notice.summary.execution_id, "Delivered completion callback");
        Ok(())
    }
}
