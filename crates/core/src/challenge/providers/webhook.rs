//! Generic webhook DNS record client
//!
//! Delegates TXT record management to an HTTP service implementing:
//!
//! ```text
//! GET {url}/records?name={fqdn}&type=TXT
//! Response: {"records": [{"record_id": "...", "name": "...", "value": "..."}]}
//!
//! POST {url}/records
//! Request:  {"name": "_acme-challenge.example.com", "record_type": "TXT",
//!            "record_value": "...", "ttl": 600}
//! Response: {"record_id": "..."}
//!
//! DELETE {url}/records/{record_id}?name={fqdn}
//! Response: 2xx, or 404 if the record is already gone
//! ```
//!
//! The token is sent as `Bearer <token>`, in `Authorization` unless a
//! custom header name is configured.

use std::time::Duration;

use async_trait::async_trait;
use certkeeper_config::Secret;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::challenge::dns01::{DnsClientError, DnsRecordClient, DnsResult, TxtRecord};
use crate::http;

/// Webhook DNS client
#[derive(Debug)]
pub struct WebhookClient {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
    token: Option<Secret>,
}

impl WebhookClient {
    /// Create a new webhook client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL for the webhook API
    /// * `auth_header` - Optional custom auth header name (e.g., "X-API-Key")
    /// * `token` - Optional bearer token
    /// * `timeout` - Request timeout
    pub fn new(
        base_url: &str,
        auth_header: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http::build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
            token: token.map(Secret::new),
        })
    }

    /// Add authentication to a request
    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.auth_header, &self.token) {
            (Some(header), Some(token)) => {
                request.header(header.as_str(), format!("Bearer {}", token.expose()))
            }
            (None, Some(token)) => request.bearer_auth(token.expose()),
            _ => request,
        }
    }
}

#[async_trait]
impl DnsRecordClient for WebhookClient {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn find_txt_records(&self, fqdn: &str) -> DnsResult<Vec<TxtRecord>> {
        let request = self
            .client
            .get(format!("{}/records", self.base_url))
            .query(&[("name", fqdn), ("type", "TXT")]);

        let response = self
            .add_auth(request)
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        // No records under that name yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        let found: ListRecordsResponse = response.json().await.map_err(|e| {
            DnsClientError::Transport(format!("Failed to parse webhook response: {}", e))
        })?;

        Ok(found
            .records
            .into_iter()
            .filter(|r| r.name.is_empty() || r.name == fqdn)
            .map(|r| TxtRecord {
                id: r.record_id,
                fqdn: fqdn.to_string(),
                value: r.value,
            })
            .collect())
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str, ttl: u32) -> DnsResult<String> {
        debug!(record = %fqdn, url = %self.base_url, "Creating TXT record via webhook");

        let request = self
            .client
            .post(format!("{}/records", self.base_url))
            .json(&CreateRecordRequest {
                name: fqdn,
                record_type: "TXT",
                record_value: value,
                ttl,
            });

        let response = self
            .add_auth(request)
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        let created: CreateRecordResponse = response.json().await.map_err(|e| {
            DnsClientError::Transport(format!("Failed to parse webhook response: {}", e))
        })?;

        debug!(record_id = %created.record_id, "TXT record created via webhook");
        Ok(created.record_id)
    }

    async fn delete_txt_record(&self, fqdn: &str, record_id: &str) -> DnsResult<()> {
        debug!(record = %fqdn, record_id = %record_id, "Deleting TXT record via webhook");

        let request = self
            .client
            .delete(format!("{}/records/{}", self.base_url, record_id))
            .query(&[("name", fqdn)]);

        let response = self
            .add_auth(request)
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        // 404 is acceptable - record might already be deleted
        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        debug!(record_id = %record_id, "TXT record deleted via webhook");
        Ok(())
    }
}

// Webhook API types

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    name: &'a str,
    record_type: &'a str,
    record_value: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    record_id: String,
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<ListedRecord>,
}

#[derive(Debug, Deserialize)]
struct ListedRecord {
    record_id: String,
    #[serde(default)]
    name: String,
    value: String,
}
