//! Hetzner DNS record client
//!
//! Uses the Hetzner DNS API to manage TXT records for DNS-01 challenges.
//! API documentation: <https://dns.hetzner.com/api-docs>

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_config::Secret;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::challenge::dns01::{DnsClientError, DnsRecordClient, DnsResult, TxtRecord};
use crate::http;

/// Hetzner DNS client
#[derive(Debug)]
pub struct HetznerClient {
    client: Client,
    token: Secret,
    api_url: String,
    /// Cache of domain -> zone mappings
    zone_cache: RwLock<HashMap<String, Zone>>,
}

impl HetznerClient {
    /// Create a new Hetzner DNS client
    ///
    /// # Arguments
    ///
    /// * `token` - Hetzner DNS API token
    /// * `api_url` - API base URL (`https://dns.hetzner.com/api/v1`)
    /// * `timeout` - Request timeout
    pub fn new(token: &str, api_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http::build_client(timeout)?,
            token: Secret::new(token),
            api_url: api_url.trim_end_matches('/').to_string(),
            zone_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Find the zone managing `fqdn`
    async fn zone_for(&self, fqdn: &str) -> DnsResult<Zone> {
        {
            let cache = self.zone_cache.read();
            if let Some(zone) = cache.get(fqdn) {
                trace!(record = %fqdn, zone_id = %zone.id, "Zone found in cache");
                return Ok(zone.clone());
            }
        }

        let zones = self.list_zones().await?;
        let zone = find_matching_zone(fqdn, &zones)
            .cloned()
            .ok_or_else(|| DnsClientError::ZoneNotFound {
                domain: fqdn.to_string(),
            })?;

        debug!(record = %fqdn, zone_id = %zone.id, zone_name = %zone.name, "Found zone for record");
        self.zone_cache
            .write()
            .insert(fqdn.to_string(), zone.clone());
        Ok(zone)
    }

    /// List all zones from Hetzner API
    async fn list_zones(&self) -> DnsResult<Vec<Zone>> {
        let response = self
            .client
            .get(format!("{}/zones", self.api_url))
            .header("Auth-API-Token", self.token.expose())
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        let zones: ZonesResponse = response
            .json()
            .await
            .map_err(|e| DnsClientError::Transport(format!("Failed to parse zones response: {}", e)))?;

        Ok(zones.zones)
    }
}

#[async_trait]
impl DnsRecordClient for HetznerClient {
    fn name(&self) -> &'static str {
        "hetzner"
    }

    async fn find_txt_records(&self, fqdn: &str) -> DnsResult<Vec<TxtRecord>> {
        let zone = self.zone_for(fqdn).await?;
        let relative_name = record_name_for_zone(fqdn, &zone.name);

        let response = self
            .client
            .get(format!("{}/records", self.api_url))
            .query(&[("zone_id", zone.id.as_str())])
            .header("Auth-API-Token", self.token.expose())
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        let records: RecordsResponse = response.json().await.map_err(|e| {
            DnsClientError::Transport(format!("Failed to parse records response: {}", e))
        })?;

        Ok(records
            .records
            .into_iter()
            .filter(|r| r.r#type == "TXT" && r.name == relative_name)
            .map(|r| TxtRecord {
                id: r.id,
                fqdn: fqdn.to_string(),
                value: r.value.trim_matches('"').to_string(),
            })
            .collect())
    }

    async fn create_txt_record(&self, fqdn: &str, value: &str, ttl: u32) -> DnsResult<String> {
        let zone = self.zone_for(fqdn).await?;
        let relative_name = record_name_for_zone(fqdn, &zone.name);

        debug!(
            zone_id = %zone.id,
            record_name = %relative_name,
            "Creating TXT record"
        );

        let request = CreateRecordRequest {
            zone_id: &zone.id,
            name: &relative_name,
            r#type: "TXT",
            value,
            ttl,
        };

        let response = self
            .client
            .post(format!("{}/records", self.api_url))
            .header("Auth-API-Token", self.token.expose())
            .json(&request)
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        let created: RecordResponse = response.json().await.map_err(|e| {
            DnsClientError::Transport(format!("Failed to parse record response: {}", e))
        })?;

        debug!(record_id = %created.record.id, "TXT record created successfully");
        Ok(created.record.id)
    }

    async fn delete_txt_record(&self, _fqdn: &str, record_id: &str) -> DnsResult<()> {
        debug!(record_id = %record_id, "Deleting TXT record");

        let response = self
            .client
            .delete(format!("{}/records/{}", self.api_url, record_id))
            .header("Auth-API-Token", self.token.expose())
            .send()
            .await
            .map_err(DnsClientError::from_reqwest)?;

        // 404 is fine - record might already be deleted
        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(DnsClientError::from_response(response).await);
        }

        debug!(record_id = %record_id, "TXT record deleted successfully");
        Ok(())
    }
}

/// Find the zone for a name: exact match first, then parent domains
fn find_matching_zone<'a>(fqdn: &str, zones: &'a [Zone]) -> Option<&'a Zone> {
    let mut current = fqdn;
    loop {
        if let Some(zone) = zones.iter().find(|z| z.name == current) {
            return Some(zone);
        }
        let pos = current.find('.')?;
        current = &current[pos + 1..];
    }
}

/// Extract record name relative to zone
fn record_name_for_zone(fqdn: &str, zone_name: &str) -> String {
    if fqdn == zone_name {
        "@".to_string()
    } else if let Some(stripped) = fqdn.strip_suffix(&format!(".{}", zone_name)) {
        stripped.to_string()
    } else {
        fqdn.to_string()
    }
}

// Hetzner API types

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    zones: Vec<Zone>,
}

#[derive(Debug, Clone, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<ApiRecord>,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    r#type: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    zone_id: &'a str,
    name: &'a str,
    r#type: &'a str,
    value: &'a str,
    ttl: u32,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    record: CreatedRecord,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: String,
}
