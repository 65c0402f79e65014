//! Deployment providers against mock vendor APIs and a temp directory

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, header_exists, header_regex, method, path,
    query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certkeeper_common::{Classify, ErrorKind};
use certkeeper_config::ProviderConfig;
use certkeeper_core::deploy::{
    DeployContext, DeploymentProvider, DeploymentProviderRegistry, SslDeployer,
};

use common::{self_signed, CountingTarget};

const FC_DOMAIN_PATH: &str = "/2023-03-30/custom-domains/api.example.com";

fn create(provider: &str, config: serde_json::Value) -> Arc<dyn DeploymentProvider> {
    DeploymentProviderRegistry::with_builtin()
        .create(&ProviderConfig::new(provider, config))
        .unwrap()
}

fn aliyun(server: &MockServer) -> Arc<dyn DeploymentProvider> {
    create(
        "aliyun-fc",
        json!({
            "accessKeyId": "ak-id",
            "accessKeySecret": "ak-secret",
            "region": "cn-hangzhou",
            "domain": "api.example.com",
            "endpoint": server.uri(),
        }),
    )
}

fn aliyun_oss(server: &MockServer) -> Arc<dyn DeploymentProvider> {
    create(
        "aliyun-oss",
        json!({
            "accessKeyId": "ak-id",
            "accessKeySecret": "ak-secret",
            "region": "cn-hangzhou",
            "bucket": "assets",
            "domain": "cdn.example.com",
            "endpoint": server.uri(),
        }),
    )
}

fn webhook(server: &MockServer) -> Arc<dyn DeploymentProvider> {
    create(
        "webhook",
        json!({
            "url": format!("{}/certificates", server.uri()),
            "headers": { "X-Tenant": "acme" },
            "token": "hook-token",
        }),
    )
}

#[tokio::test]
async fn test_mismatched_key_never_reaches_target() {
    let (cert, _) = self_signed(&["api.example.com"]);
    let (_, other_key) = self_signed(&["other.example.com"]);
    let target = CountingTarget::new();
    let deployer = SslDeployer::new(target.clone());

    let err = deployer
        .deploy(&DeployContext::new(), &cert, &other_key)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCertificateMaterial);
    assert!(!err.kind().is_retryable());
    assert_eq!(target.installs(), 0);

    let err = deployer
        .deploy(&DeployContext::new(), "not a certificate", &other_key)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCertificateMaterial);
    assert_eq!(target.installs(), 0);
}

#[tokio::test]
async fn test_matching_material_is_installed_once() {
    let (cert, key) = self_signed(&["api.example.com"]);
    let target = CountingTarget::new();
    let deployer = SslDeployer::new(target.clone());

    let result = deployer
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(result.provider, "counting");
    assert_eq!(target.installs(), 1);
    assert_eq!(deployer.resource_key(), "counting:memory");
}

#[tokio::test]
async fn test_cancelled_context_skips_install() {
    let (cert, key) = self_signed(&["api.example.com"]);
    let target = CountingTarget::new();
    let deployer = SslDeployer::new(target.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = DeployContext::new().with_cancellation(cancel);

    let err = deployer.deploy(&ctx, &cert, &key).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(target.installs(), 0);
}

// ============================================================================
// aliyun-fc
// ============================================================================

#[tokio::test]
async fn test_aliyun_fc_replaces_certificate_and_enables_https() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed(&["api.example.com"]);

    Mock::given(method("GET"))
        .and(path(FC_DOMAIN_PATH))
        .and(header("x-acs-action", "GetCustomDomain"))
        .and(header("x-acs-version", "2023-03-30"))
        .and(header_regex(
            "authorization",
            r"^ACS3-HMAC-SHA256 Credential=ak-id,SignedHeaders=[a-z0-9;-]+,Signature=[0-9a-f]{64}$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domainName": "api.example.com",
            "protocol": "HTTP",
            "routeConfig": { "routes": [{ "path": "/*", "functionName": "api" }] },
            "certConfig": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path(FC_DOMAIN_PATH))
        .and(header("x-acs-action", "UpdateCustomDomain"))
        .and(header_regex("authorization", r"^ACS3-HMAC-SHA256 Credential=ak-id,"))
        .and(body_partial_json(json!({
            "protocol": "HTTP,HTTPS",
            "routeConfig": { "routes": [{ "path": "/*", "functionName": "api" }] },
            "certConfig": { "certificate": cert, "privateKey": key },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domainName": "api.example.com",
            "lastModifiedTime": "2024-06-01T10:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = aliyun(&server);
    let result = provider
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(result.provider, "aliyun-fc");
    assert_eq!(result.metadata["domain"], "api.example.com");
    assert_eq!(result.metadata["protocol"], "HTTP,HTTPS");
    assert!(result.metadata["certName"].starts_with("certkeeper-"));
    assert_eq!(result.metadata["lastModifiedTime"], "2024-06-01T10:00:00Z");
}

#[tokio::test]
async fn test_aliyun_fc_unknown_domain_is_target_not_found() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed(&["api.example.com"]);

    Mock::given(method("GET"))
        .and(path(FC_DOMAIN_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "Code": "DomainNameNotFound",
            "Message": "custom domain does not exist",
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = aliyun(&server)
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TargetNotFound);
    assert!(!err.kind().is_retryable());
    assert!(err.to_string().contains("api.example.com"));
}

#[tokio::test]
async fn test_aliyun_fc_rejected_credentials() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed(&["api.example.com"]);

    Mock::given(method("GET"))
        .and(path(FC_DOMAIN_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "Code": "InvalidAccessKeyId.NotFound",
        })))
        .mount(&server)
        .await;

    let err = aliyun(&server)
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert!(!err.to_string().contains("ak-secret"));
}

// ============================================================================
// aliyun-oss
// ============================================================================

#[tokio::test]
async fn test_aliyun_oss_binds_certificate_to_cname() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed(&["cdn.example.com"]);

    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("comp", "add"))
        .and(header("content-type", "application/xml"))
        .and(header_exists("date"))
        .and(header_regex("authorization", r"^OSS ak-id:[A-Za-z0-9+/]{27}=$"))
        .and(body_string_contains("<Domain>cdn.example.com</Domain>"))
        .and(body_string_contains("<Force>true</Force>"))
        .and(body_string_contains("-----BEGIN CERTIFICATE-----"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-oss-request-id", "req-1"))
        .expect(1)
        .mount(&server)
        .await;

    let result = aliyun_oss(&server)
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(result.provider, "aliyun-oss");
    assert_eq!(result.metadata["bucket"], "assets");
    assert_eq!(result.metadata["domain"], "cdn.example.com");
    assert_eq!(result.metadata["requestId"], "req-1");
}

#[tokio::test]
async fn test_aliyun_oss_status_mapping() {
    let (cert, key) = self_signed(&["cdn.example.com"]);

    let cases = [
        (403, "SignatureDoesNotMatch", ErrorKind::Authentication),
        (404, "NoSuchBucket", ErrorKind::TargetNotFound),
        (500, "InternalError", ErrorKind::Deployment),
    ];

    for (status, code, kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string(format!(
                "<Error><Code>{}</Code><Message>rejected</Message></Error>",
                code
            )))
            .expect(1)
            .mount(&server)
            .await;

        let err = aliyun_oss(&server)
            .deploy(&DeployContext::new(), &cert, &key)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "unexpected kind for {}", err);
        assert!(!err.to_string().contains("ak-secret"));
    }
}

#[tokio::test]
async fn test_aliyun_oss_mismatched_key_is_not_sent() {
    let server = MockServer::start().await;
    let (cert, _) = self_signed(&["cdn.example.com"]);
    let (_, other_key) = self_signed(&["other.example.com"]);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = aliyun_oss(&server)
        .deploy(&DeployContext::new(), &cert, &other_key)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCertificateMaterial);
}

// ============================================================================
// webhook
// ============================================================================

#[tokio::test]
async fn test_webhook_posts_material_and_reports_resource_id() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed(&["api.example.com", "www.example.com"]);

    Mock::given(method("POST"))
        .and(path("/certificates"))
        .and(header("authorization", "Bearer hook-token"))
        .and(header("x-tenant", "acme"))
        .and(body_partial_json(json!({
            "certificate": cert,
            "privateKey": key,
            "subjectAltNames": ["api.example.com", "www.example.com"],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&server)
        .await;

    let result = webhook(&server)
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(result.provider, "webhook");
    assert_eq!(result.metadata["status"], "201");
    assert_eq!(result.metadata["resourceId"], "42");
    assert_eq!(result.metadata["fingerprint"].len(), 64);
}

#[tokio::test]
async fn test_webhook_status_mapping() {
    let (cert, key) = self_signed(&["api.example.com"]);

    let cases = [
        (ResponseTemplate::new(401), ErrorKind::Authentication, None),
        (ResponseTemplate::new(404), ErrorKind::TargetNotFound, None),
        (
            ResponseTemplate::new(429).insert_header("Retry-After", "5"),
            ErrorKind::RateLimited,
            Some(Duration::from_secs(5)),
        ),
        (ResponseTemplate::new(502), ErrorKind::Deployment, None),
    ];

    for (response, kind, retry_after) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/certificates"))
            .respond_with(response)
            .mount(&server)
            .await;

        let err = webhook(&server)
            .deploy(&DeployContext::new(), &cert, &key)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "unexpected kind for {}", err);
        assert_eq!(err.retry_after(), retry_after);
    }
}

#[tokio::test]
async fn test_webhook_deadline_from_context() {
    let server = MockServer::start().await;
    let (cert, key) = self_signed(&["api.example.com"]);

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let ctx = DeployContext::new().with_timeout(Duration::from_millis(100));
    let err = webhook(&server).deploy(&ctx, &cert, &key).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(err.to_string().contains("deadline"));
}

// ============================================================================
// local
// ============================================================================

#[tokio::test]
async fn test_local_writes_files() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("tls").join("cert.pem");
    let key_path = dir.path().join("tls").join("key.pem");
    let (cert, key) = self_signed(&["api.example.com"]);

    let provider = create(
        "local",
        json!({ "certPath": cert_path, "keyPath": key_path }),
    );
    assert_eq!(
        provider.resource_key(),
        format!("local:{}", cert_path.display())
    );

    let result = provider
        .deploy(&DeployContext::new(), &cert, &key)
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(std::fs::read_to_string(&cert_path).unwrap(), cert);
    assert_eq!(std::fs::read_to_string(&key_path).unwrap(), key);

    // A renewed certificate replaces both files
    let (cert2, key2) = self_signed(&["api.example.com"]);
    provider
        .deploy(&DeployContext::new(), &cert2, &key2)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&cert_path).unwrap(), cert2);
    assert_eq!(std::fs::read_to_string(&key_path).unwrap(), key2);
}
