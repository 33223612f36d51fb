//! HTTP-backed proposal provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crewplan_core::pipeline::{ProposalProvider, ProposalRequest, RawProposal};

use crate::renderer::ConflictPromptRenderer;
use crate::response::parse_proposals;
use crate::{Error, Result};

/// Connection settings for the generative proposal service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Full URL proposals are POSTed to; no provider is used when unset
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    /// Overrides the built-in conflict prompt
    pub prompt_template: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "default".to_string(),
            timeout_secs: 30,
            temperature: 0.2,
            prompt_template: None,
        }
    }
}

/// Sends the rendered prompt and the structured conflict to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpProposalProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    renderer: ConflictPromptRenderer,
}

impl HttpProposalProvider {
    pub const NAME: &'static str = "http";

    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| Error::Configuration("provider endpoint is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(format!("crewplan/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let renderer = match &config.prompt_template {
            Some(template) => ConflictPromptRenderer::with_template(template)?,
            None => ConflictPromptRenderer::new()?,
        };

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            renderer,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request_proposals(&self, request: &ProposalRequest) -> Result<Vec<RawProposal>> {
        let prompt = self.renderer.render(request)?;
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "prompt": prompt,
            "context": ConflictPromptRenderer::context(request),
        });

        let mut http_request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(
                conflict_id = %request.conflict.id,
                status = status.as_u16(),
                "Proposal service returned non-success status"
            );
            let body: String = text.chars().take(200).collect();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let proposals = parse_proposals(&text)?;
        debug!(
            execution_id = %request.execution_id,
            conflict_id = %request.conflict.id,
            count = proposals.len(),
            "Received proposals"
        );
        Ok(proposals)
    }
}

#[async_trait]
impl ProposalProvider for HttpProposalProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn propose(&self, request: &ProposalRequest) -> crewplan_core::Result<Vec<RawProposal>> {
        self.request_proposals(request)
            .await
            .map_err(|e| e.into_core(Self::NAME))
    }
}
