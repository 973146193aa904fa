//! Typed wrappers for the read-only origin endpoints the exporter consumes.

use futures_util::stream::{BoxStream, TryStreamExt};
use reqwest::Method;
use tracing::{debug, instrument};

use super::api::ApiClient;
use super::constants::PAGE_EXPAND;
use super::error::RequestError;
use super::models::{Content, Label, Space};

impl ApiClient {
    /// Fetches a page with its export-view body, ancestors, space and version.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the page cannot be fetched or decoded.
    #[instrument(skip(self))]
    pub async fn get_page(&self, page_id: &str) -> Result<Content, RequestError> {
        let path = format!("/rest/api/content/{}", urlencoding::encode(page_id));
        self.get_json(&path, &[("expand", PAGE_EXPAND)]).await
    }

    /// Lists direct child pages, all result pages concatenated.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered.
    #[instrument(skip(self))]
    pub async fn list_children(&self, page_id: &str) -> Result<Vec<Content>, RequestError> {
        let path = format!("/rest/api/content/{}/child/page", urlencoding::encode(page_id));
        self.collect_all(&path, &[]).await
    }

    /// Streams the attachments of a page lazily across all result pages.
    #[must_use]
    pub fn attachments(&self, page_id: &str) -> BoxStream<'static, Result<Content, RequestError>> {
        let path = format!("/rest/api/content/{}/child/attachment", urlencoding::encode(page_id));
        self.paginate(&path, &[])
    }

    /// Lists every attachment of a page.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered.
    #[instrument(skip(self))]
    pub async fn list_attachments(&self, page_id: &str) -> Result<Vec<Content>, RequestError> {
        self.attachments(page_id).try_collect().await
    }

    /// Finds an attachment by file name (case-insensitive) on one page.
    ///
    /// Keeps requesting result pages until a match is found or the listing
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered while listing.
    #[instrument(skip(self))]
    pub async fn find_attachment(&self, page_id: &str, filename: &str) -> Result<Option<Content>, RequestError> {
        let wanted = filename.to_lowercase();
        let mut stream = self.attachments(page_id);
        let mut scanned = 0usize;
        while let Some(attachment) = stream.try_next().await? {
            scanned += 1;
            if attachment.title.to_lowercase() == wanted {
                debug!(scanned, attachment_id = %attachment.id, "attachment found");
                return Ok(Some(attachment));
            }
        }
        debug!(scanned, "attachment not listed");
        Ok(None)
    }

    /// Lists label names of a page.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered.
    #[instrument(skip(self))]
    pub async fn list_labels(&self, page_id: &str) -> Result<Vec<String>, RequestError> {
        let path = format!("/rest/api/content/{}/label", urlencoding::encode(page_id));
        let labels: Vec<Label> = self.collect_all(&path, &[]).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    /// Lists every space visible to the credentials.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered.
    #[instrument(skip(self))]
    pub async fn list_spaces(&self) -> Result<Vec<Space>, RequestError> {
        self.collect_all("/rest/api/space", &[]).await
    }

    /// Lists every page of a space with its ancestors.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered.
    #[instrument(skip(self))]
    pub async fn list_space_pages(&self, space_key: &str) -> Result<Vec<Content>, RequestError> {
        let path = format!("/rest/api/space/{}/content/page", urlencoding::encode(space_key));
        self.collect_all(&path, &[("expand", "ancestors")]).await
    }

    /// Looks up pages by exact title within a space.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered.
    #[instrument(skip(self))]
    pub async fn find_pages_by_title(&self, space_key: &str, title: &str) -> Result<Vec<Content>, RequestError> {
        self.collect_all(
            "/rest/api/content",
            &[("spaceKey", space_key), ("title", title), ("type", "page")],
        )
        .await
    }

    /// Verifies the credentials with a cheap authenticated call.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::AuthExpired`] (or whatever else failed) when
    /// the origin does not accept the credentials.
    #[instrument(skip(self))]
    pub async fn probe_auth(&self) -> Result<(), RequestError> {
        self.request(Method::GET, "/rest/api/space", &[("limit", "1")], None)
            .await?
            .json::<serde_json::Value>()?;
        debug!("credentials accepted");
        Ok(())
    }
}
