//! Cloudflare DNS record client (API v4)
//!
//! API documentation: <https://developers.cloudflare.com/api/resources/dns/>

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_config::Secret;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::challenge::dns01::{DnsClientError, DnsRecordClient, DnsResult, TxtRecord};
use crate::http;

/// Cloudflare DNS client
#[derive(Debug)]
pub struct CloudflareClient {
    client: Client,
    token: Secret,
    api_url: String,
    /// Fixed zone, skipping zone discovery
    zone_id: Option<String>,
    /// Cache of record name -> zone id
    zone_cache: RwLock<HashMap<String, String>>,
}

impl CloudflareClient {
    pub fn new(
        token: &str,
        zone_id: Option<String>,
        api_url: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http::build_client(timeout)?,
            token: Secret::new(token),
            api_url: api_url.trim_end_matches('/').to_string(),
            zone_id,
            zone_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Zone id for `fqdn`, walking up the parents with `GET /zones?name=`
    async fn zone_id_for(&self, fqdn: &str) -> DnsResult<String> {
        if let Some(zone_id) = &self.zone_id {
            return Ok(zone_id.clone());
        }

        {
            let cache = self.zone_cache.read();
            if let Some(zone_id) = cache.get(fqdn) {
                trace!(record = %fqdn, zone_id = %zone_id, "Zone found in cache");
                return Ok(zone_id.clone());
            }
        }

        let mut candidate = fqdn;
        while let Some(pos) = candidate.find('.') {
            candidate = &candidate[pos + 1..];
            // Never query a bare TLD
            if !candidate.contains('.') {
                break;
            }

            let zones: Vec<ApiZone> = self
                .get(format!("{}/zones", self.api_url), &[("name", candidate)])
                .await?;

            if let Some(zone) = zones.into_iter().find(|z| z.name == candidate) {
                debug!(record = %fqdn, zone_id = %zone.id, zone_name = %zone.name, "Found zone for record");
                self.zone_cache
                    .write()
                    .insert(fqdn.to_string(), zone.id.clone());
                return Ok(zone.id);
            }
        }

        Err(DnsClientError::ZoneNotFound {
            domain: fqdn.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: String, query: &[(&str, &str)]) -> DnsResult<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        parse_envelope(response).await
    }
}

/// Unwrap Cloudflare's `{success, errors, result}` envelope
async fn parse_envelope<T: DeserializeOwned>(response: reqwest::Response) -> DnsResult<T> {
    if !response.status().is_success() {
        return Err(DnsClientError::from_response(response).await);
    }

    let status = response.status().as_u16();
    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| DnsClientError::Transport(format!("Failed to parse Cloudflare response: {}", e)))?;

    match envelope.result {
        Some(result) if envelope.success => Ok(result),
        _ => Err(DnsClientError::Api {
            status,
            message: envelope
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; "),
        }),
    }
}

#[async_trait]
impl DnsRecordClient for CloudflareClient {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn find_txt_records(&self, fqdn: &str) -> DnsResult<Vec<TxtRecord>> {
        let zone_id = self.zone_id_for(fqdn).await?;

        let records: Vec<ApiRecord> = self
            .get(
                format!("{}/zones/{}/dns_records", self.api_url, zone_id),
                &[("type", "TXT"), ("name", fqdn)],
            )
            .await?;

        Ok(records
            .into_iter()
            .filter(|r| r.name == fqdn)
            .map(|r| TxtRecord {
                id: r.id,
                fqdn: fqdn.to_string(),
                value: r.content.trim_matches('"').to_string(),
            })
            .collect())
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str, ttl: u32) -> DnsResult<String> {
        let zone_id = self.zone_id_for(fqdn).await?;

        debug!(zone_id = %zone_id, record = %fqdn, "Creating TXT record");

        let response = self
            .client
            .post(format!("{}/zones/{}/dns_records", self.api_url, zone_id))
            .bearer_auth(self.token.expose())
            .json(&CreateRecordRequest {
                r#type: "TXT",
                name: fqdn,
                content: value,
                ttl,
            })
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        let created: ApiRecord = parse_envelope(response).await?;
        debug!(record_id = %created.id, "TXT record created successfully");
        Ok(created.id)
    }

    async fn delete_txt_record(&self, fqdn: &str, record_id: &str) -> DnsResult<()> {
        let zone_id = self.zone_id_for(fqdn).await?;

        debug!(zone_id = %zone_id, record_id = %record_id, "Deleting TXT record");

        let response = self
            .client
            .delete(format!(
                "{}/zones/{}/dns_records/{}",
                self.api_url, zone_id, record_id
            ))
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        let _: serde_json::Value = parse_envelope(response).await?;
        Ok(())
    }
}

// Cloudflare API types

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    r#type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}
