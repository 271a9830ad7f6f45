//! GitHub REST API client for Actions runs and logs.
//!
//! API Documentation: <https://docs.github.com/en/rest/actions/workflow-runs>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use super::models::{WorkflowRun, WorkflowRunsPage};
use super::{CiProvider, RunQuery};
use crate::error::TriageError;

/// Base URL for the GitHub REST API.
pub const API_BASE_URL: &str = "https://api.github.com";

/// API version header value.
const API_VERSION: &str = "2022-11-28";

/// Default timeout for API requests. Log archives can be large.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// How a response status should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    /// JSON metadata endpoints
    Metadata,
    /// Log archive downloads
    Logs,
}

/// GitHub Actions client authenticated with a bearer token.
#[derive(Clone)]
pub struct GitHubClient {
    /// HTTP client.
    client: Client,
    /// API base URL, without trailing slash.
    base_url: String,
    /// Bearer token.
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client for the public GitHub API.
    ///
    /// # Errors
    /// Returns error if the token is empty or the HTTP client cannot be created.
    pub fn new(token: impl Into<String>) -> Result<Self, TriageError> {
        Self::with_base_url(token, API_BASE_URL)
    }

    /// Create a client against a custom API root (GitHub Enterprise, tests).
    ///
    /// # Errors
    /// Returns error if the token is empty or the HTTP client cannot be created.
    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, TriageError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(TriageError::Config(
                "GitHub token is required".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// URL of the runs listing for a workflow.
    fn runs_url(&self, query: &RunQuery) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/runs",
            self.base_url,
            query.repository,
            urlencoding::encode(&query.workflow)
        )
    }

    /// Attach auth and API headers.
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Make an authenticated GET request and decode the JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TriageError> {
        let response = self.authorized(builder).send().await?;
        let response = Self::check_status(response, Transport::Metadata).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Failed to parse GitHub response");
            TriageError::Serialization(e)
        })
    }

    /// Map non-success statuses to errors, per transport.
    async fn check_status(
        response: reqwest::Response,
        transport: Transport,
    ) -> Result<reqwest::Response, TriageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status, transport, url, text))
    }
}

/// Turn a failed status into the matching error.
fn classify_status(
    status: StatusCode,
    transport: Transport,
    url: String,
    message: String,
) -> TriageError {
    match (status, transport) {
        (StatusCode::NOT_FOUND, _) | (StatusCode::GONE, Transport::Logs) => {
            TriageError::NotFound(url)
        }
        (StatusCode::UNAUTHORIZED, _) => TriageError::Unauthorized(message),
        _ => TriageError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl CiProvider for GitHubClient {
    async fn list_runs_page(
        &self,
        query: &RunQuery,
        page: u32,
    ) -> Result<WorkflowRunsPage, TriageError> {
        let url = self.runs_url(query);
        debug!(url = %url, page, "Listing workflow runs");

        let created = format!(
            ">={}",
            query.created_since.format("%Y-%m-%dT%H:%M:%SZ")
        );
        let mut params: Vec<(&str, String)> = vec![
            ("created", created),
            ("per_page", query.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(status) = query.status.as_query() {
            params.push(("status", status.to_string()));
        }

        self.get_json(self.client.get(&url).query(&params)).await
    }

    async fn get_attempt(&self, attempt_url: &str) -> Result<WorkflowRun, TriageError> {
        debug!(url = %attempt_url, "Resolving run attempt");
        self.get_json(self.client.get(attempt_url)).await
    }

    async fn download_logs(&self, logs_url: &str) -> Result<Vec<u8>, TriageError> {
        debug!(url = %logs_url, "Downloading log archive");

        // The endpoint answers with a redirect to short-lived blob storage;
        // reqwest follows it and drops the Authorization header cross-origin.
        let response = self
            .authorized(self.client.get(logs_url))
            .send()
            .await?;
        let response = Self::check_status(response, Transport::Logs).await?;
        let bytes = response.bytes().await?;

        debug!(url = %logs_url, size = bytes.len(), "Downloaded log archive");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::RunStatusFilter;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_new_client_requires_token() {
        let result = GitHubClient::new("  ");
        assert!(matches!(result, Err(TriageError::Config(_))));
    }

    #[test]
    fn test_runs_url_encodes_workflow() {
        let client = GitHubClient::with_base_url("token", "http://localhost:1234/").unwrap();
        let query = RunQuery {
            repository: "octo/widgets".to_string(),
            workflow: "ci tests.yml".to_string(),
            created_since: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            status: RunStatusFilter::Failure,
            per_page: 100,
        };
        assert_eq!(
            client.runs_url(&query),
            "http://localhost:1234/repos/octo/widgets/actions/workflows/ci%20tests.yml/runs"
        );
    }

    #[test]
    fn test_classify_status_per_transport() {
        let gone_logs = classify_status(
            StatusCode::GONE,
            Transport::Logs,
            "logs".to_string(),
            String::new(),
        );
        assert!(matches!(gone_logs, TriageError::NotFound(_)));

        let gone_metadata = classify_status(
            StatusCode::GONE,
            Transport::Metadata,
            "run".to_string(),
            String::new(),
        );
        assert!(matches!(gone_metadata, TriageError::Api { status: 410, .. }));

        let missing = classify_status(
            StatusCode::NOT_FOUND,
            Transport::Metadata,
            "run".to_string(),
            String::new(),
        );
        assert!(matches!(missing, TriageError::NotFound(_)));

        let unauthorized = classify_status(
            StatusCode::UNAUTHORIZED,
            Transport::Logs,
            "logs".to_string(),
            "Bad credentials".to_string(),
        );
        assert!(matches!(unauthorized, TriageError::Unauthorized(_)));
    }
}
