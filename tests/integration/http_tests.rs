//! Crawls against a wiremock server through the default HTTP fetcher

use crate::common::{test_config, RecordingSink};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tidepool::crawler::{ProducerError, ProducerResult};
use tidepool::output::SqliteSink;
use tidepool::{Callback, Crawler, Output, Producer, Response, WorkItem};
use tokio::time::timeout;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Follows the `links` array of JSON pages and records their titles
struct JsonLinks {
    base: String,
}

impl JsonLinks {
    fn request(&self, path: &str) -> ProducerResult<WorkItem> {
        Ok(WorkItem::builder(
            format!("{}{}", self.base, path),
            Callback::new(self.identity(), "page"),
        )
        .build()?)
    }
}

impl Producer for JsonLinks {
    fn identity(&self) -> String {
        "JsonLinks|test".to_string()
    }

    fn start(&self) -> ProducerResult<Vec<Output>> {
        Ok(vec![self.request("/")?.into()])
    }

    fn parse(&self, _callback: &str, response: &Response, item: &WorkItem) -> ProducerResult<Vec<Output>> {
        let body = response.json().map_err(|e| ProducerError::Parse {
            target: item.target().to_string(),
            message: e.to_string(),
        })?;

        let mut outputs = vec![Output::from(tidepool::Artifact::new(json!({
            "path": item.target().path(),
            "title": body["title"],
        })))];
        for link in body["links"].as_array().into_iter().flatten() {
            if let Some(link) = link.as_str() {
                outputs.push(self.request(link)?.into());
            }
        }
        Ok(outputs)
    }
}

fn page(title: &str, links: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "title": title, "links": links }))
}

async fn mount_page(server: &MockServer, at: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_over_http() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page("Home", &["/a", "/b"])).await;
    mount_page(&server, "/a", page("A", &["/", "/b"])).await;
    mount_page(&server, "/b", page("B", &[])).await;

    let database = Arc::new(SqliteSink::in_memory().unwrap());
    let recording = RecordingSink::new("pages");
    let crawler = Crawler::builder(test_config(4))
        .producer(Arc::new(JsonLinks { base: server.uri() }))
        .sink(database.clone())
        .sink(recording.clone())
        .build()
        .unwrap();

    crawler.start_producers();
    timeout(Duration::from_secs(10), crawler.wait_idle())
        .await
        .expect("crawl did not go idle")
        .unwrap();
    crawler.flush_sinks().await;

    assert_eq!(recording.paths(), vec!["/", "/a", "/b"]);
    assert_eq!(database.count().unwrap(), 3);
    assert_eq!(database.payloads_for("JsonLinks|test").unwrap().len(), 3);

    let stats = crawler.stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.duplicates, 2);

    crawler.shutdown().await;
}

#[tokio::test]
async fn test_retry_status_is_retried_until_served() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", page("Home", &[])).await;

    let mut config = test_config(1);
    config.http.retry_wait = 50;
    config.http.user_agent = "tidepool-test".to_string();
    let recording = RecordingSink::new("pages");
    let crawler = Crawler::builder(config)
        .producer(Arc::new(JsonLinks { base: server.uri() }))
        .sink(recording.clone())
        .build()
        .unwrap();

    crawler.start_producers();
    timeout(Duration::from_secs(10), crawler.wait_idle())
        .await
        .expect("crawl did not go idle")
        .unwrap();
    crawler.flush_sinks().await;

    assert_eq!(recording.paths(), vec!["/"]);
    let stats = crawler.stats();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.completed, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    crawler.shutdown().await;
}

#[tokio::test]
async fn test_missing_page_is_abandoned() {
    let server = MockServer::start().await;
    mount_page(&server, "/", page("Home", &["/missing"])).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .and(header("user-agent", "tidepool-test"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(2);
    config.http.user_agent = "tidepool-test".to_string();
    let crawler = Crawler::builder(config)
        .producer(Arc::new(JsonLinks { base: server.uri() }))
        .build()
        .unwrap();

    crawler.start_producers();
    timeout(Duration::from_secs(10), crawler.wait_idle())
        .await
        .expect("crawl did not go idle")
        .unwrap();

    let stats = crawler.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.abandoned, 1);

    let last = crawler.history(1);
    assert_eq!(last[0].outcome.label(), "abandoned");

    crawler.shutdown().await;
}
