//! Alibaba Cloud Function Compute 3.0 custom domain target
//!
//! Replaces the certificate of an FC custom domain in one
//! `UpdateCustomDomain` call, after reading the current domain config with
//! `GetCustomDomain` so that routing, TLS and auth settings are carried
//! over unchanged. HTTPS is added to the domain protocol if missing.
//!
//! Requests are signed with ACS3-HMAC-SHA256:
//! <https://www.alibabacloud.com/help/en/sdk/product-overview/v3-request-structure-and-signature>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_config::Secret;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::deploy::material::CertificateMaterial;
use crate::deploy::provider::{DeployError, DeployTarget, DeploymentResult};
use crate::http;

/// FC 3.0 API version
pub const FC_API_VERSION: &str = "2023-03-30";

const SIGNATURE_ALGORITHM: &str = "ACS3-HMAC-SHA256";

/// Custom domain settings carried over from the current config
const PRESERVED_FIELDS: &[&str] = &["routeConfig", "authConfig", "tlsConfig", "wafConfig"];

type HmacSha256 = Hmac<Sha256>;

/// Function Compute custom domain deploy target
#[derive(Debug)]
pub struct AliyunFcTarget {
    client: Client,
    access_key_id: String,
    access_key_secret: Secret,
    endpoint: String,
    host: String,
    domain: String,
}

impl AliyunFcTarget {
    pub fn new(
        access_key_id: &str,
        access_key_secret: &str,
        endpoint: &str,
        domain: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let host = endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(endpoint.as_str())
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            client: http::build_client(timeout)?,
            access_key_id: access_key_id.to_string(),
            access_key_secret: Secret::new(access_key_secret),
            endpoint,
            host,
            domain: domain.trim().to_string(),
        })
    }

    fn domain_path(&self) -> String {
        format!(
            "/{}/custom-domains/{}",
            FC_API_VERSION,
            percent_encode(&self.domain)
        )
    }

    /// Send a signed request and decode the JSON answer
    async fn call(
        &self,
        method: Method,
        action: &str,
        body: Option<&Value>,
    ) -> Result<Value, DeployError> {
        let path = self.domain_path();
        let payload = match body {
            Some(body) => serde_json::to_vec(body)
                .map_err(|e| DeployError::Deployment(format!("failed to encode request: {}", e)))?,
            None => Vec::new(),
        };

        let signer = RequestSigner {
            access_key_id: &self.access_key_id,
            access_key_secret: self.access_key_secret.expose(),
            host: &self.host,
        };
        let headers = signer.sign(
            method.as_str(),
            &path,
            action,
            &payload,
            body.is_some(),
            &Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            &uuid::Uuid::new_v4().to_string(),
        );

        trace!(action = %action, path = %path, "Calling Function Compute API");

        let mut request = self
            .client
            .request(method, format!("{}{}", self.endpoint, path));
        for (name, value) in &headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if body.is_some() {
            request = request.body(payload);
        }

        let response = request.send().await.map_err(DeployError::from_reqwest)?;
        if !response.status().is_success() {
            let target = format!("custom domain '{}'", self.domain);
            return Err(DeployError::from_response(response, &target).await);
        }

        response
            .json()
            .await
            .map_err(|e| DeployError::Deployment(format!("failed to parse {} response: {}", action, e)))
    }
}

#[async_trait]
impl DeployTarget for AliyunFcTarget {
    fn name(&self) -> &'static str {
        "aliyun-fc"
    }

    fn target(&self) -> String {
        format!("{}/{}", self.host, self.domain)
    }

    async fn install(&self, material: &CertificateMaterial) -> Result<DeploymentResult, DeployError> {
        let current = self.call(Method::GET, "GetCustomDomain", None).await?;

        let protocol = with_https(current.get("protocol").and_then(Value::as_str));
        let cert_name = material.resource_name();

        let mut update = Map::new();
        for field in PRESERVED_FIELDS {
            if let Some(value) = current.get(*field).filter(|v| !v.is_null()) {
                update.insert(field.to_string(), value.clone());
            }
        }
        update.insert("protocol".to_string(), Value::String(protocol.clone()));
        update.insert(
            "certConfig".to_string(),
            serde_json::to_value(CertConfig {
                cert_name: &cert_name,
                certificate: material.certificate_pem(),
                private_key: material.private_key_pem(),
            })
            .map_err(|e| DeployError::Deployment(format!("failed to encode certConfig: {}", e)))?,
        );

        debug!(domain = %self.domain, cert_name = %cert_name, protocol = %protocol, "Updating custom domain certificate");

        let updated = self
            .call(Method::PUT, "UpdateCustomDomain", Some(&Value::Object(update)))
            .await?;

        let mut result = DeploymentResult::new(self.name())
            .with_metadata("domain", self.domain.clone())
            .with_metadata("certName", cert_name)
            .with_metadata("protocol", protocol)
            .with_metadata("fingerprint", material.fingerprint());
        if let Some(modified) = updated.get("lastModifiedTime").and_then(Value::as_str) {
            result = result.with_metadata("lastModifiedTime", modified);
        }
        Ok(result)
    }
}

/// Ensure the domain protocol serves HTTPS
fn with_https(protocol: Option<&str>) -> String {
    match protocol.map(str::trim) {
        Some(p) if p.split(',').any(|part| part.trim() == "HTTPS") => p.to_string(),
        Some(p) if !p.is_empty() => format!("{},HTTPS", p),
        _ => "HTTPS".to_string(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertConfig<'a> {
    cert_name: &'a str,
    certificate: &'a str,
    private_key: &'a str,
}

/// ACS3-HMAC-SHA256 request signer
struct RequestSigner<'a> {
    access_key_id: &'a str,
    access_key_secret: &'a str,
    host: &'a str,
}

impl RequestSigner<'_> {
    /// Headers to send, including `authorization`
    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        method: &str,
        path: &str,
        action: &str,
        payload: &[u8],
        json_body: bool,
        date: &str,
        nonce: &str,
    ) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.host.to_string());
        headers.insert("x-acs-action".to_string(), action.to_string());
        headers.insert("x-acs-version".to_string(), FC_API_VERSION.to_string());
        headers.insert("x-acs-date".to_string(), date.to_string());
        headers.insert("x-acs-signature-nonce".to_string(), nonce.to_string());
        headers.insert(
            "x-acs-content-sha256".to_string(),
            hex::encode(Sha256::digest(payload)),
        );
        if json_body {
            headers.insert("content-type".to_string(), "application/json".to_string());
        }

        let (canonical, signed_headers) = canonical_request(method, path, "", &headers);
        let string_to_sign = format!(
            "{}\n{}",
            SIGNATURE_ALGORITHM,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(
            self.access_key_secret.as_bytes(),
            string_to_sign.as_bytes(),
        ));

        headers.insert(
            "authorization".to_string(),
            format!(
                "{} Credential={},SignedHeaders={},Signature={}",
                SIGNATURE_ALGORITHM, self.access_key_id, signed_headers, signature
            ),
        );
        headers
    }
}

/// Build the canonical request and the signed header list
///
/// `headers` must hold lowercase names; a `BTreeMap` keeps them sorted.
fn canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &BTreeMap<String, String>,
) -> (String, String) {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
    let payload_hash = headers
        .get("x-acs-content-sha256")
        .cloned()
        .unwrap_or_default();

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
    );
    (canonical, signed_headers)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 3986 percent-encoding of everything but unreserved characters
fn percent_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
