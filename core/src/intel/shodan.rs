use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use exposr_common::scan::{Candidate, Signature};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::IntelligenceSource;
use crate::error::IntelError;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<SearchMatch>,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    ip_str: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Shodan host search client. One page of matches per query.
pub struct ShodanClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ShodanClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self, IntelError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(format!("exposr/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/shodan/host/search", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IntelligenceSource for ShodanClient {
    async fn query(&self, signature: &Signature) -> Result<Vec<Candidate>, IntelError> {
        let query: String = signature.search_query();
        debug!(%query, "querying shodan");

        let res = self
            .http
            .get(self.search_url())
            .query(&[("key", self.api_key.as_str()), ("query", query.as_str())])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        let response = parse_search_response(status, &body)?;
        debug!(total = response.total, page = response.matches.len(), "shodan search returned");

        Ok(candidates_from(response, signature))
    }
}

fn parse_search_response(status: StatusCode, body: &str) -> Result<SearchResponse, IntelError> {
    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| status.to_string());
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IntelError::Authentication(message),
            StatusCode::TOO_MANY_REQUESTS => IntelError::RateLimit(message),
            _ => IntelError::Query(message),
        });
    }

    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| IntelError::Query(format!("malformed search response: {e}")))?;
    if let Some(error) = response.error {
        return Err(IntelError::Query(error));
    }
    Ok(response)
}

fn candidates_from(response: SearchResponse, signature: &Signature) -> Vec<Candidate> {
    response
        .matches
        .into_iter()
        .filter_map(|m| match m.ip_str.parse::<IpAddr>() {
            Ok(address) => Some(Candidate::new(address, signature.clone())),
            Err(_) => {
                warn!(ip_str = %m.ip_str, "skipping match with unparsable address");
                None
            }
        })
        .collect()
}
