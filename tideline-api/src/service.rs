//! The `topic/data` service: cluster registry and request mapping.

use std::collections::BTreeMap;

use tideline_broker::BrokerClient;
use tideline_browser::{PageOptions, RecordBrowser, SearchPredicate};
use tideline_core::PartitionId;
use tracing::debug;

use crate::dto::{TopicDataRequest, TopicDataResponse};
use crate::error::{ApiError, ApiResult};

/// Serves `topic/data` requests for a set of clusters.
///
/// Each cluster id maps to its own [`RecordBrowser`].
pub struct TopicDataService<B: BrokerClient + ?Sized> {
    clusters: BTreeMap<String, RecordBrowser<B>>,
}

impl<B: BrokerClient + ?Sized> Default for TopicDataService<B> {
    fn default() -> Self {
        Self {
            clusters: BTreeMap::new(),
        }
    }
}

impl<B: BrokerClient + ?Sized> TopicDataService<B> {
    /// Creates a service with no clusters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the browser of a cluster, replacing any previous one.
    pub fn register(&mut self, cluster_id: impl Into<String>, browser: RecordBrowser<B>) {
        self.clusters.insert(cluster_id.into(), browser);
    }

    /// Returns the registered cluster ids in order.
    pub fn cluster_ids(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    /// Fetches one page.
    ///
    /// # Errors
    /// Returns an error carrying the status the endpoint should answer with.
    pub async fn fetch(&self, request: &TopicDataRequest) -> ApiResult<TopicDataResponse> {
        let browser =
            self.clusters
                .get(&request.cluster_id)
                .ok_or_else(|| ApiError::ClusterNotFound {
                    cluster: request.cluster_id.clone(),
                })?;

        let options = page_options(request)?;
        debug!(
            cluster = %request.cluster_id,
            topic = %request.topic_id,
            sort = ?options.sort,
            resumed = options.cursor.is_some(),
            "Fetching topic data"
        );

        let page = browser.fetch_page(&request.topic_id, options).await?;
        Ok(TopicDataResponse::from(page))
    }
}

/// Maps a request onto browsing options.
///
/// # Errors
/// Returns `BadRequest` for an unparsable timestamp or search expression.
pub fn page_options(request: &TopicDataRequest) -> ApiResult<PageOptions> {
    let search = match request.search.as_deref() {
        Some(expr) => SearchPredicate::parse(expr)?,
        None => SearchPredicate::match_all(),
    };

    Ok(PageOptions {
        sort: request.sort.into(),
        partition: request.partition.map(PartitionId::new),
        timestamp_lower_bound: request
            .timestamp
            .as_ref()
            .map(crate::dto::TimestampParam::resolve)
            .transpose()?,
        search,
        cursor: request.after.clone(),
        page_number: request.page_number,
        page_size: request.page_size,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tideline_broker::MemoryBroker;
    use tideline_browser::{BrowserConfig, SortDirection};
    use tideline_core::Timestamp;

    use super::*;
    use crate::demo::seed_demo_topic;
    use crate::dto::{Payload, SortOrder, TimestampParam};

    async fn service() -> TopicDataService<MemoryBroker> {
        let broker = MemoryBroker::new();
        seed_demo_topic(&broker, "orders", 2, 5).await.unwrap();
        let browser = RecordBrowser::new(Arc::new(broker), BrowserConfig::for_testing()).unwrap();

        let mut service = TopicDataService::new();
        service.register("local", browser);
        service
    }

    #[test]
    fn test_page_options_mapping() {
        let request = TopicDataRequest {
            sort: SortOrder::Newest,
            partition: Some(3),
            timestamp: Some(TimestampParam::Millis(500)),
            search: Some("value~paid".to_string()),
            page_size: Some(20),
            ..TopicDataRequest::new("local", "orders")
        };
        let options = page_options(&request).unwrap();

        assert_eq!(options.sort, SortDirection::Desc);
        assert_eq!(options.partition, Some(PartitionId::new(3)));
        assert_eq!(options.timestamp_lower_bound, Some(Timestamp::from_millis(500)));
        assert_eq!(options.search.clauses().len(), 1);
        assert_eq!(options.page_size, Some(20));
    }

    #[test]
    fn test_bad_search_is_bad_request() {
        let request = TopicDataRequest {
            search: Some("key=a && ".to_string()),
            ..TopicDataRequest::new("local", "orders")
        };
        assert_eq!(page_options(&request).unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_browse_all_pages() {
        let service = service().await;
        let mut request = TopicDataRequest {
            page_size: Some(4),
            ..TopicDataRequest::new("local", "orders")
        };

        let mut total = 0;
        let mut pages = 0;
        loop {
            let response = service.fetch(&request).await.unwrap();
            pages += 1;
            total += response.results.len();
            assert_eq!(response.page, pages);
            match request.next_page(&response) {
                Some(next) => request = next,
                None => break,
            }
        }
        assert_eq!(total, 10);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_search_over_api() {
        let service = service().await;
        let request = TopicDataRequest {
            search: Some("key=order-3".to_string()),
            ..TopicDataRequest::new("local", "orders")
        };
        let response = service.fetch(&request).await.unwrap();

        assert_eq!(response.results.len(), 2);
        for record in &response.results {
            assert_eq!(record.key, Some(Payload::Utf8("order-3".to_string())));
        }
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let service = service().await;

        let err = service
            .fetch(&TopicDataRequest::new("prod", "orders"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = service
            .fetch(&TopicDataRequest::new("local", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let expired = TopicDataRequest {
            after: Some("bm90LWEtdG9rZW4".to_string()),
            ..TopicDataRequest::new("local", "orders")
        };
        let err = service.fetch(&expired).await.unwrap_err();
        assert_eq!(err.status_code(), 410);

        let oversized = TopicDataRequest {
            page_size: Some(5_000),
            ..TopicDataRequest::new("local", "orders")
        };
        let err = service.fetch(&oversized).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_cluster_ids() {
        let service = service().await;
        assert_eq!(service.cluster_ids().collect::<Vec<_>>(), vec!["local"]);
    }
}
