//! Alibaba Cloud OSS bucket CNAME target
//!
//! Binds the certificate to a custom domain already attached to a bucket
//! with a single `PutCname` call. `Force` is set so an existing certificate
//! on the domain is replaced.
//!
//! ```text
//! POST https://{bucket}.oss-{region}.aliyuncs.com/?cname&comp=add
//! <BucketCnameConfiguration>
//!   <Cname>
//!     <Domain>cdn.example.com</Domain>
//!     <CertificateConfiguration>
//!       <Certificate>...</Certificate>
//!       <PrivateKey>...</PrivateKey>
//!       <Force>true</Force>
//!     </CertificateConfiguration>
//!   </Cname>
//! </BucketCnameConfiguration>
//! ```
//!
//! Requests carry the OSS header signature (HMAC-SHA1 over the verb, the
//! content type, the date and the bucket resource).

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use certkeeper_config::Secret;
use chrono::Utc;
use hmac::{Hmac, Mac};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use reqwest::Client;
use sha1::Sha1;
use tracing::debug;

use crate::deploy::material::CertificateMaterial;
use crate::deploy::provider::{DeployError, DeployTarget, DeploymentResult};
use crate::http;

const CONTENT_TYPE: &str = "application/xml";

/// Sub-resources of the bind call, in signing order
const PUT_CNAME_QUERY: &str = "cname&comp=add";

type HmacSha1 = Hmac<Sha1>;

/// OSS bucket custom domain deploy target
#[derive(Debug)]
pub struct AliyunOssTarget {
    client: Client,
    access_key_id: String,
    access_key_secret: Secret,
    endpoint: String,
    bucket: String,
    domain: String,
}

impl AliyunOssTarget {
    pub fn new(
        access_key_id: &str,
        access_key_secret: &str,
        endpoint: &str,
        bucket: &str,
        domain: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http::build_client(timeout)?,
            access_key_id: access_key_id.to_string(),
            access_key_secret: Secret::new(access_key_secret),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim().to_string(),
            domain: domain.trim().to_string(),
        })
    }

    fn authorization(&self, date: &str) -> String {
        let string_to_sign = string_to_sign("POST", CONTENT_TYPE, date, &self.bucket);
        let mut mac = match HmacSha1::new_from_slice(self.access_key_secret.expose().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA1 accepts any key length"),
        };
        mac.update(string_to_sign.as_bytes());
        format!(
            "OSS {}:{}",
            self.access_key_id,
            STANDARD.encode(mac.finalize().into_bytes())
        )
    }
}

#[async_trait]
impl DeployTarget for AliyunOssTarget {
    fn name(&self) -> &'static str {
        "aliyun-oss"
    }

    fn target(&self) -> String {
        format!("{}/{}", self.bucket, self.domain)
    }

    async fn install(&self, material: &CertificateMaterial) -> Result<DeploymentResult, DeployError> {
        let body = cname_configuration(
            &self.domain,
            material.certificate_pem(),
            material.private_key_pem(),
        )?;
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        debug!(bucket = %self.bucket, domain = %self.domain, "Binding certificate to bucket CNAME");

        let response = self
            .client
            .post(format!("{}/?{}", self.endpoint, PUT_CNAME_QUERY))
            .header("Content-Type", CONTENT_TYPE)
            .header("Date", date.as_str())
            .header("Authorization", self.authorization(&date))
            .body(body)
            .send()
            .await
            .map_err(DeployError::from_reqwest)?;

        if !response.status().is_success() {
            let target = format!("bucket '{}' domain '{}'", self.bucket, self.domain);
            return Err(DeployError::from_response(response, &target).await);
        }

        let mut result = DeploymentResult::new(self.name())
            .with_metadata("bucket", self.bucket.clone())
            .with_metadata("domain", self.domain.clone())
            .with_metadata("fingerprint", material.fingerprint());
        if let Some(request_id) = response
            .headers()
            .get("x-oss-request-id")
            .and_then(|v| v.to_str().ok())
        {
            result = result.with_metadata("requestId", request_id);
        }
        Ok(result)
    }
}

/// OSS header signature input for a bucket-level call without MD5 or
/// `x-oss-*` headers
fn string_to_sign(verb: &str, content_type: &str, date: &str, bucket: &str) -> String {
    format!(
        "{}\n\n{}\n{}\n/{}/?{}",
        verb, content_type, date, bucket, PUT_CNAME_QUERY
    )
}

/// `PutCname` request body
fn cname_configuration(
    domain: &str,
    certificate: &str,
    private_key: &str,
) -> Result<Vec<u8>, DeployError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut write = |event: Event<'_>| {
        writer
            .write_event(event)
            .map_err(|e| DeployError::Deployment(format!("failed to encode CNAME request: {}", e)))
    };

    write(Event::Start(BytesStart::new("BucketCnameConfiguration")))?;
    write(Event::Start(BytesStart::new("Cname")))?;
    write(Event::Start(BytesStart::new("Domain")))?;
    write(Event::Text(BytesText::new(domain)))?;
    write(Event::End(BytesEnd::new("Domain")))?;
    write(Event::Start(BytesStart::new("CertificateConfiguration")))?;
    for (name, value) in [
        ("Certificate", certificate),
        ("PrivateKey", private_key),
        ("Force", "true"),
    ] {
        write(Event::Start(BytesStart::new(name)))?;
        write(Event::Text(BytesText::new(value)))?;
        write(Event::End(BytesEnd::new(name)))?;
    }
    write(Event::End(BytesEnd::new("CertificateConfiguration")))?;
    write(Event::End(BytesEnd::new("Cname")))?;
    write(Event::End(BytesEnd::new("BucketCnameConfiguration")))?;

    Ok(writer.into_inner().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_sign_layout() {
        assert_eq!(
            string_to_sign("POST", CONTENT_TYPE, "Mon, 01 Jan 2024 00:00:00 GMT", "assets"),
            "POST\n\napplication/xml\nMon, 01 Jan 2024 00:00:00 GMT\n/assets/?cname&comp=add"
        );
    }

    #[test]
    fn test_authorization_header() {
        let target = AliyunOssTarget::new(
            "ak",
            "sk",
            "http://127.0.0.1:9000",
            "assets",
            "cdn.example.com",
            Duration::from_secs(5),
        )
        .unwrap();

        let date = "Mon, 01 Jan 2024 00:00:00 GMT";
        let header = target.authorization(date);
        assert_eq!(header, target.authorization(date));
        assert_ne!(header, target.authorization("Tue, 02 Jan 2024 00:00:00 GMT"));

        let signature = header.strip_prefix("OSS ak:").unwrap();
        // Base64 of a 20-byte SHA-1 MAC
        assert_eq!(STANDARD.decode(signature).unwrap().len(), 20);
    }

    #[test]
    fn test_cname_configuration_escapes_values() {
        let body = cname_configuration("cdn.example.com", "CERT<&>", "KEY").unwrap();
        let body = String::from_utf8(body).unwrap();

        assert_eq!(
            body,
            "<BucketCnameConfiguration><Cname><Domain>cdn.example.com</Domain>\
             <CertificateConfiguration><Certificate>CERT&lt;&amp;&gt;</Certificate>\
             <PrivateKey>KEY</PrivateKey><Force>true</Force></CertificateConfiguration>\
             </Cname></BucketCnameConfiguration>"
        );
    }
}
