//! Generic webhook deploy target
//!
//! POSTs the material as JSON to a configured URL:
//!
//! ```text
//! POST {url}
//! {
//!   "certificate": "<PEM chain>",
//!   "privateKey": "<PEM key>",
//!   "commonName": "example.com",
//!   "subjectAltNames": ["example.com"],
//!   "serialNumber": "...",
//!   "notAfter": "2025-01-01T00:00:00Z",
//!   "fingerprint": "..."
//! }
//! ```
//!
//! A 2xx answer is success. If the body is JSON with an `id` field, it is
//! reported as the `resourceId` metadata entry.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_config::Secret;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::deploy::material::CertificateMaterial;
use crate::deploy::provider::{DeployError, DeployTarget, DeploymentResult};
use crate::http;

/// Webhook deploy target
#[derive(Debug)]
pub struct WebhookTarget {
    client: Client,
    url: String,
    headers: BTreeMap<String, String>,
    token: Option<Secret>,
}

impl WebhookTarget {
    pub fn new(
        url: &str,
        headers: BTreeMap<String, String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http::build_client(timeout)?,
            url: url.to_string(),
            headers,
            token: token.map(Secret::new),
        })
    }
}

#[async_trait]
impl DeployTarget for WebhookTarget {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn target(&self) -> String {
        self.url.clone()
    }

    async fn install(&self, material: &CertificateMaterial) -> Result<DeploymentResult, DeployError> {
        let payload = WebhookPayload {
            certificate: material.certificate_pem(),
            private_key: material.private_key_pem(),
            common_name: material.common_name(),
            subject_alt_names: material.subject_alt_names(),
            serial_number: material.serial(),
            not_after: material.not_after(),
            fingerprint: material.fingerprint(),
        };

        let mut request = self.client.post(&self.url).json(&payload);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        debug!(url = %self.url, "Posting certificate to webhook");

        let response = request.send().await.map_err(DeployError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(DeployError::from_response(response, &self.url).await);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let mut result = DeploymentResult::new(self.name())
            .with_metadata("status", status.to_string())
            .with_metadata("fingerprint", material.fingerprint());

        if let Ok(answer) = serde_json::from_str::<Value>(&body) {
            match answer.get("id") {
                Some(Value::String(id)) => result = result.with_metadata("resourceId", id.clone()),
                Some(Value::Number(id)) => result = result.with_metadata("resourceId", id.to_string()),
                _ => {}
            }
        }

        Ok(result)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    certificate: &'a str,
    private_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    common_name: Option<&'a str>,
    subject_alt_names: &'a [String],
    serial_number: &'a str,
    not_after: DateTime<Utc>,
    fingerprint: &'a str,
}
