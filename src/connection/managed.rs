//! Managed-database provider client.
//!
//! Managed databases are provisioned by the hosting platform; the
//! application stores only the provider's external identifier. A short-lived
//! connection string is exchanged for that identifier on every request.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ManagedConnectionInfo, ManagedDatabaseApi};
use crate::db::Database;
use crate::error::{AgentError, AgentResult};

/// States in which the provider can hand out a working connection string.
const AVAILABLE_STATES: &[&str] = &["available", "ready", "active", "running"];

#[derive(Debug, Deserialize)]
struct ProviderConnectionResponse {
    #[serde(default)]
    status: String,
    #[serde(alias = "connectionString", alias = "connection_uri")]
    connection_string: Option<String>,
}

/// HTTP client for the provider's connection endpoint.
pub struct ProviderApi {
    db: Database,
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl ProviderApi {
    pub fn new(db: Database, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            db,
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn fetch_connection_string(&self, external_id: &str) -> AgentResult<String> {
        let base_url = self.base_url.as_deref().ok_or_else(|| {
            AgentError::Configuration("MANAGED_DB_API_URL is not configured".into())
        })?;
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AgentError::Configuration("MANAGED_DB_API_KEY is not configured".into())
        })?;
        let url = format!(
            "{}/v1/databases/{}/connection",
            base_url.trim_end_matches('/'),
            urlencoding::encode(external_id)
        );

        let res = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| AgentError::UpstreamUnavailable(format!("Provider API unreachable: {}", e)))?;

        let status = res.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::NotFound(format!(
                "Managed database {} not found at provider",
                external_id
            )));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(status = %status, external_id, "provider API error");
            return Err(AgentError::UpstreamUnavailable(format!(
                "Provider API error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ProviderConnectionResponse = res.json().await.map_err(|e| {
            AgentError::UpstreamUnavailable(format!("Invalid provider response: {}", e))
        })?;
        parse_provider_response(parsed)
    }
}

fn parse_provider_response(parsed: ProviderConnectionResponse) -> AgentResult<String> {
    let state = parsed.status.to_ascii_lowercase();
    if !state.is_empty() && !AVAILABLE_STATES.contains(&state.as_str()) {
        return Err(AgentError::UpstreamUnavailable(format!(
            "Database is not available (status: {})",
            parsed.status
        )));
    }
    parsed
        .connection_string
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            AgentError::UpstreamUnavailable("Provider returned no connection string".into())
        })
}

#[async_trait]
impl ManagedDatabaseApi for ProviderApi {
    async fn connection_info_for(&self, database_id: Uuid) -> AgentResult<Option<ManagedConnectionInfo>> {
        let record = match self.db.get_managed_database(database_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        let connection_string = self.fetch_connection_string(&record.external_id).await?;
        info!(database_id = %database_id, name = %record.name, "managed connection issued");
        Ok(Some(ManagedConnectionInfo {
            project_id: record.project_id,
            connection_string,
        }))
    }
}
