//! Shared helpers for integration tests: a mock site built on wiremock.

#![allow(dead_code)]

use std::time::Duration;

use exporter_core::client::{ApiClient, ClientConfig, RetryPolicy};
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Smallest body that passes the PNG magic check.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n0000";

/// Client with a single attempt and no pacing.
pub fn client(server: &MockServer) -> ApiClient {
    client_with(server, RetryPolicy::with_max_attempts(1))
}

/// Client with the given retry policy and no pacing.
pub fn client_with(server: &MockServer, policy: RetryPolicy) -> ApiClient {
    let config = ClientConfig::new(Url::parse(&server.uri()).unwrap())
        .retry_policy(policy)
        .rate_limit(Duration::ZERO);
    ApiClient::new(config).unwrap()
}

/// A list-endpoint envelope without a next link.
pub fn listing(results: Vec<Value>) -> Value {
    let size = results.len();
    json!({ "results": results, "start": 0, "limit": 250, "size": size, "_links": {} })
}

/// A page document as returned with `expand=body.export_view,ancestors,space,version`.
pub fn page_json(id: &str, title: &str, ancestors: &[&str], body: &str) -> Value {
    let ancestors: Vec<Value> = ancestors.iter().map(|a| json!({ "id": a })).collect();
    json!({
        "id": id,
        "type": "page",
        "title": title,
        "ancestors": ancestors,
        "space": { "key": "DOC" },
        "version": { "number": 1 },
        "body": { "export_view": { "value": body } },
        "_links": { "webui": format!("/spaces/DOC/pages/{id}") }
    })
}

/// A child entry of a children listing.
pub fn child_json(id: &str, title: &str) -> Value {
    json!({ "id": id, "type": "page", "title": title })
}

/// An attachment entry of an attachment listing.
pub fn attachment_json(page_id: &str, title: &str) -> Value {
    json!({
        "id": format!("att-{title}"),
        "type": "attachment",
        "title": title,
        "_links": { "download": format!("/download/attachments/{page_id}/{title}?version=1&api=v2") }
    })
}

/// One page of a mock site.
pub struct MockPage<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub ancestors: &'a [&'a str],
    pub body: &'a str,
    pub children: &'a [(&'a str, &'a str)],
}

impl<'a> MockPage<'a> {
    pub fn new(id: &'a str, title: &'a str, ancestors: &'a [&'a str]) -> Self {
        Self {
            id,
            title,
            ancestors,
            body: "<p>content</p>",
            children: &[],
        }
    }

    pub fn body(mut self, body: &'a str) -> Self {
        self.body = body;
        self
    }

    pub fn children(mut self, children: &'a [(&'a str, &'a str)]) -> Self {
        self.children = children;
        self
    }

    /// Mounts the page, its children listing, and empty label and attachment listings.
    pub async fn mount(self, server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("/rest/api/content/{}", self.id)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(page_json(self.id, self.title, self.ancestors, self.body)),
            )
            .mount(server)
            .await;
        mount_listing(
            server,
            &format!("/rest/api/content/{}/child/page", self.id),
            self.children.iter().map(|(id, title)| child_json(id, title)).collect(),
        )
        .await;
        mount_listing(server, &format!("/rest/api/content/{}/label", self.id), Vec::new()).await;
        mount_listing(server, &format!("/rest/api/content/{}/child/attachment", self.id), Vec::new()).await;
    }
}

/// Mounts a single-page listing at `list_path`.
pub async fn mount_listing(server: &MockServer, list_path: &str, results: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(results)))
        .mount(server)
        .await;
}

/// Mounts a PNG file at `file_path`.
pub async fn mount_png(server: &MockServer, file_path: &str) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG, "image/png"))
        .mount(server)
        .await;
}
