//! Integration tests for tiered asset resolution and the run cache.

use std::sync::Arc;
use std::time::Duration;

use exporter_core::assets::{AssetKind, AssetReference, AssetResolver, PageAssets, ResolutionError};
use exporter_core::auth::{Credentials, SecretToken};
use exporter_core::client::{ApiClient, ClientConfig, RetryPolicy};
use exporter_core::layout::ExportLayout;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::{PNG, attachment_json, client, listing, mount_listing, mount_png};

fn resolver(client: &ApiClient, root: &TempDir) -> AssetResolver {
    AssetResolver::new(client, ExportLayout::new(root.path()))
}

fn reference(raw: &str, kind: AssetKind) -> AssetReference {
    AssetReference::from_url(raw, kind).unwrap()
}

// ==================== URL qualification ====================

#[tokio::test]
async fn test_relative_reference_is_fetched_under_site_context_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/download/attachments/3/diagram.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG, "image/png"))
        .expect(2)
        .mount(&server)
        .await;

    let config = ClientConfig::new(Url::parse(&format!("{}/wiki", server.uri())).unwrap())
        .retry_policy(RetryPolicy::with_max_attempts(1))
        .rate_limit(Duration::ZERO);
    let client = ApiClient::new(config).unwrap();
    let temp = TempDir::new().unwrap();
    let page = PageAssets::new("3", None);

    // Without and with the context path already in the reference.
    let bare = resolver(&client, &temp)
        .resolve(&reference("/download/attachments/3/diagram.png", AssetKind::EmbeddedImage), &page)
        .await
        .unwrap();
    let other = TempDir::new().unwrap();
    let prefixed = resolver(&client, &other)
        .resolve(
            &reference("/wiki/download/attachments/3/diagram.png?version=2&amp;api=v2", AssetKind::EmbeddedImage),
            &page,
        )
        .await
        .unwrap();

    assert_eq!(bare.source, "direct");
    assert_eq!(prefixed.source, "direct");
    assert_eq!(bare.file_name, "3_diagram.png");
}

// ==================== Body validation ====================

#[tokio::test]
async fn test_login_page_served_as_image_falls_back_to_context_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/attachments/8/chart.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(&b"<!DOCTYPE html><html>sign in</html>"[..], "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, "/rest/api/content/8/child/attachment", vec![attachment_json("8", "Chart.PNG")]).await;
    mount_png(&server, "/download/attachments/8/Chart.PNG").await;

    let temp = TempDir::new().unwrap();
    let resolver = resolver(&client(&server), &temp);
    let asset = resolver
        .resolve(&reference("/download/attachments/8/chart.png", AssetKind::EmbeddedImage), &PageAssets::new("8", None))
        .await
        .unwrap();

    assert_eq!(asset.source, "context-page");
    assert_eq!(asset.content_type, "image/png");
    assert_eq!(std::fs::read(&asset.path).unwrap(), PNG);
}

#[tokio::test]
async fn test_every_tier_failing_reports_unresolved() {
    let server = MockServer::start().await;
    mount_listing(&server, "/rest/api/content/8/child/attachment", Vec::new()).await;

    let temp = TempDir::new().unwrap();
    let resolver = resolver(&client(&server), &temp);
    let error = resolver
        .resolve(&reference("/download/attachments/8/gone.png", AssetKind::Attachment), &PageAssets::new("8", None))
        .await
        .unwrap_err();

    match error {
        ResolutionError::Unresolved { filename, contexts, .. } => {
            assert_eq!(filename, "gone.png");
            assert_eq!(contexts, vec!["direct".to_string(), "page 8".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!temp.path().join("_images").join("8_gone.png").exists());
}

// ==================== Coalescing ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_one_asset_fetch_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/attachments/1/shared.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PNG, "image/png")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let resolver = Arc::new(resolver(&client(&server), &temp));
    let mut handles = Vec::new();
    for page_id in ["1", "2", "3", "4", "5", "6", "7", "8"] {
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            let shared = AssetReference::from_url("/download/attachments/1/shared.png", AssetKind::EmbeddedImage).unwrap();
            resolver.resolve(&shared, &PageAssets::new(page_id, None)).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(results[0].file_name, "1_shared.png");

    let stats = resolver.cache_stats();
    assert_eq!(stats.resolutions, 1);
    assert_eq!(stats.hits, 7);
}

#[tokio::test]
async fn test_memoized_failure_is_not_retried_within_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/2/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(Vec::new())))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let resolver = resolver(&client(&server), &temp);
    let missing = reference("/download/attachments/2/missing.png", AssetKind::Attachment);
    let page = PageAssets::new("2", None);
    assert!(resolver.resolve(&missing, &page).await.is_err());
    assert!(resolver.resolve(&missing, &page).await.is_err());
}

// ==================== External images ====================

#[tokio::test]
async fn test_external_image_fetched_without_credentials() {
    let server = MockServer::start().await;
    mount_png(&server, "/cdn/badge.png").await;

    let config = ClientConfig::new(Url::parse(&server.uri()).unwrap())
        .credentials(Credentials::Bearer(SecretToken::new("s3cret")))
        .retry_policy(RetryPolicy::with_max_attempts(1))
        .rate_limit(Duration::ZERO);
    let client = ApiClient::new(config).unwrap();
    let temp = TempDir::new().unwrap();
    let external = reference(&format!("{}/cdn/badge.png", server.uri()), AssetKind::External);
    let asset = resolver(&client, &temp)
        .resolve(&external, &PageAssets::new("42", None))
        .await
        .unwrap();

    assert_eq!(asset.file_name, "42-1-badge.png");
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}
