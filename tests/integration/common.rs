//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tidepool::config::Config;
use tidepool::crawler::{ProducerError, ProducerResult};
use tidepool::output::SinkResult;
use tidepool::{
    Artifact, Callback, FetchOutcome, Fetcher, Output, Producer, Response, Sink, WorkItem,
};

pub const BASE: &str = "https://example.test";

/// Config with a fast tick and the given concurrency cap
pub fn test_config(max_concurrency: u32) -> Config {
    let mut config = Config::default();
    config.scheduler.max_concurrency = max_concurrency;
    config.scheduler.tick = 10;
    config
}

pub fn request(producer: &str, path: &str) -> WorkItem {
    WorkItem::builder(format!("{}{}", BASE, path), Callback::new(producer, "parse"))
        .build()
        .unwrap()
}

pub fn success(item: &WorkItem) -> FetchOutcome {
    FetchOutcome::Success(Response::ok(item.target().as_str(), ""))
}

type RespondFn = dyn Fn(&WorkItem, usize) -> FetchOutcome + Send + Sync;

/// Fetcher answering from a closure of (item, attempt number for its path)
pub struct TestFetcher {
    respond: Box<RespondFn>,
    delay: Duration,
    log: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl TestFetcher {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&WorkItem, usize) -> FetchOutcome + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, respond)
    }

    pub fn with_delay<F>(delay: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(&WorkItem, usize) -> FetchOutcome + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            delay,
            log: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    /// Always succeeds
    pub fn succeeding() -> Arc<Self> {
        Self::new(|item, _| success(item))
    }

    /// Paths in the order they were fetched
    pub fn order(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn attempts(&self, path: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    /// Most fetches observed running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for TestFetcher {
    async fn fetch(&self, item: &WorkItem) -> FetchOutcome {
        let path = item.target().path().to_string();
        let attempt = {
            let mut log = self.log.lock().unwrap();
            log.push(path.clone());
            log.iter().filter(|p| **p == path).count()
        };

        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        (self.respond)(item, attempt)
    }
}

type ParseFn = dyn Fn(&str, &WorkItem) -> ProducerResult<Vec<Output>> + Send + Sync;

/// Producer whose parse step is a closure of (identity, item)
pub struct TestSpider {
    name: String,
    seeds: Vec<String>,
    parse: Box<ParseFn>,
}

impl TestSpider {
    pub fn new<F>(name: &str, seeds: &[&str], parse: F) -> Arc<Self>
    where
        F: Fn(&str, &WorkItem) -> ProducerResult<Vec<Output>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            seeds: seeds.iter().map(|s| s.to_string()).collect(),
            parse: Box::new(parse),
        })
    }

    /// Emits one artifact per response and nothing else
    pub fn collecting(name: &str, seeds: &[&str]) -> Arc<Self> {
        Self::new(name, seeds, |_, item| Ok(vec![Output::from(page_artifact(item))]))
    }

    pub fn identity_of(name: &str) -> String {
        format!("TestSpider|{}", name)
    }
}

impl Producer for TestSpider {
    fn identity(&self) -> String {
        Self::identity_of(&self.name)
    }

    fn start(&self) -> ProducerResult<Vec<Output>> {
        let identity = self.identity();
        Ok(self
            .seeds
            .iter()
            .map(|path| Output::from(request(&identity, path)))
            .collect())
    }

    fn parse(&self, callback: &str, _response: &Response, item: &WorkItem) -> ProducerResult<Vec<Output>> {
        if callback != "parse" {
            return Err(ProducerError::UnknownCallback {
                producer: self.identity(),
                callback: callback.to_string(),
            });
        }
        (self.parse)(&self.identity(), item)
    }
}

pub fn page_artifact(item: &WorkItem) -> Artifact {
    Artifact::new(json!({ "path": item.target().path() })).with_name("page")
}

/// Sink keeping everything it is given; optionally refuses one path
pub struct RecordingSink {
    name: String,
    saved: Mutex<Vec<Artifact>>,
    refuse: Option<String>,
}

impl RecordingSink {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            saved: Mutex::new(Vec::new()),
            refuse: None,
        })
    }

    pub fn refusing(name: &str, path: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            saved: Mutex::new(Vec::new()),
            refuse: Some(path.to_string()),
        })
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .saved
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| a.payload["path"].as_str().map(str::to_string))
            .collect();
        paths.sort();
        paths
    }

    pub fn saved(&self) -> Vec<Artifact> {
        self.saved.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn identity(&self) -> String {
        format!("recording:{}", self.name)
    }

    fn save(&self, artifact: &Artifact) -> SinkResult<()> {
        if let Some(refused) = &self.refuse {
            if artifact.payload["path"].as_str() == Some(refused.as_str()) {
                return Err(tidepool::output::SinkError::Write(format!("refused {}", refused)));
            }
        }
        self.saved.lock().unwrap().push(artifact.clone());
        Ok(())
    }
}
