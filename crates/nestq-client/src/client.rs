use nestq_query::{ApiClientParams, ApiGetResponse, build_query_params};
use serde::de::DeserializeOwned;
use ureq::Agent;

use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};

/// Blocking client issuing compiled query parameters against a list API.
#[derive(Clone)]
pub struct ApiClient {
    agent: Agent,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(config.timeout()))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join the base URL and `path` with exactly one `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET path` with `params` compiled into query parameters, decoding the
    /// body as an [`ApiGetResponse`].
    pub fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &ApiClientParams,
    ) -> Result<ApiGetResponse<T>, ClientError> {
        let query = build_query_params(params)?;
        let url = self.url(path);
        tracing::debug!(%url, params = query.len(), "issuing list request");

        let mut response = self
            .agent
            .get(url.as_str())
            .header("accept", "application/json")
            .query_pairs(query.iter().map(|(k, v)| (*k, v.as_str())))
            .call()?;

        let status = response.status();
        let body = response.body_mut().read_to_string()?;
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "list request failed");
            return Err(TransportError::Status { status, body }.into());
        }

        Ok(serde_json::from_str(&body)?)
    }
}
