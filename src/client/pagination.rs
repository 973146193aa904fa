//! Offset pagination over list endpoints.
//!
//! Every list endpoint returns `{ results, start, limit, size, _links.next }`.
//! [`ApiClient::paginate`] hides that behind a lazy stream of items: the next
//! page is requested only when the consumer has drained the current one, and
//! the stream ends when the origin stops advertising a `next` link or
//! returns an empty page.

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};

use super::api::ApiClient;
use super::constants::MAX_PAGE_SIZE;
use super::error::RequestError;
use super::models::PagedResult;

/// Where the next page starts.
struct Cursor {
    client: ApiClient,
    path: String,
    params: Vec<(String, String)>,
    start: u64,
    finished: bool,
}

impl Cursor {
    async fn next_page<T: DeserializeOwned>(&mut self) -> Result<Option<Vec<T>>, RequestError> {
        if self.finished {
            return Ok(None);
        }

        let start = self.start.to_string();
        let mut params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        params.push(("start", &start));

        let page: PagedResult<T> = self.client.get_json(&self.path, &params).await?;
        let returned = page.returned();
        trace!(path = %self.path, start = self.start, returned, has_next = page.has_next(), "fetched page");

        if returned == 0 || page.results.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        self.start += returned;
        self.finished = !page.has_next();
        Ok(Some(page.results))
    }
}

impl ApiClient {
    /// Lazily yields every item of a paginated list endpoint, in order.
    ///
    /// `limit` defaults to the origin maximum unless `params` sets it. Each
    /// call starts from offset zero, so the stream is restartable by calling
    /// again.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use exporter_core::client::{ApiClient, ClientConfig, Label, normalize_site};
    /// use futures_util::TryStreamExt;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = ApiClient::new(ClientConfig::new(normalize_site("acme")?))?;
    /// let mut labels = client.paginate::<Label>("/rest/api/content/42/label", &[]);
    /// while let Some(label) = labels.try_next().await? {
    ///     println!("{}", label.name);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn paginate<T>(&self, path: &str, params: &[(&str, &str)]) -> BoxStream<'static, Result<T, RequestError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut owned: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        if !owned.iter().any(|(k, _)| k == "limit") {
            owned.push(("limit".to_string(), MAX_PAGE_SIZE.to_string()));
        }

        let cursor = Cursor {
            client: self.clone(),
            path: path.to_string(),
            params: owned,
            start: 0,
            finished: false,
        };

        stream::try_unfold(cursor, |mut cursor| async move {
            let page = cursor.next_page::<T>().await?;
            Ok(page.map(|items| (items, cursor)))
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<T, RequestError>)))
        .try_flatten()
        .boxed()
    }

    /// Collects every item of a paginated list endpoint.
    ///
    /// # Errors
    ///
    /// Returns the first [`RequestError`] encountered; partial results are dropped.
    #[instrument(skip(self, params))]
    pub async fn collect_all<T>(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<T>, RequestError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let items: Vec<T> = self.paginate(path, params).try_collect().await?;
        debug!(count = items.len(), "collected all pages");
        Ok(items)
    }
}
