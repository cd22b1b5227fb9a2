//! Crawler coordinator - the running scheduler
//!
//! This module wires the scheduler core to the outside world:
//! - A dispatch loop that moves ready items into execution on every tick
//! - One task per in-flight fetch
//! - A routing loop that classifies outcomes and runs producer callbacks
//! - Submission of producer output and fan-out of artifacts to sinks
//! - Pausing, stopping, snapshot save and load

use crate::config::Config;
use crate::crawler::fetcher::{FetchOutcome, Fetcher, HttpFetcher, Response};
use crate::crawler::producer::{Output, Producer, ProducerRegistry, ProducerResult};
use crate::crawler::router::{Completion, RouteDecision};
use crate::crawler::scheduler::{Admission, Dispatch, ItemInfo, Scheduler};
use crate::item::{Artifact, WorkItem};
use crate::output::{SchedulerStats, Sink, SinkDispatcher};
use crate::state::{HistoryEntry, Tags};
use crate::storage::{
    DirectoryStore, PendingRecord, SchedulerSnapshot, SnapshotManifest, SnapshotStore,
};
use crate::{Result, TidepoolError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Options for [`Crawler::save`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Stop in-flight items and push them back to the head of the queue
    /// instead of waiting for them to finish
    pub fast: bool,

    /// Unpause the scheduler once the snapshot is written
    pub resume_after: bool,
}

impl SaveOptions {
    pub fn fast() -> Self {
        Self {
            fast: true,
            ..Self::default()
        }
    }

    pub fn resume_after(mut self) -> Self {
        self.resume_after = true;
        self
    }
}

/// What happened to a batch of submitted outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub admitted: usize,
    pub duplicates: usize,
    pub artifacts: usize,
    /// Work items naming a producer that is not registered
    pub rejected: usize,
}

impl SubmitReport {
    fn merge(&mut self, other: SubmitReport) {
        self.admitted += other.admitted;
        self.duplicates += other.duplicates;
        self.artifacts += other.artifacts;
        self.rejected += other.rejected;
    }
}

/// Outcome of [`Crawler::load`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub manifest: SnapshotManifest,
    /// Pending records admitted into the queue
    pub admitted: usize,
    /// Pending records already known to the dedup index
    pub duplicates: usize,
    /// Pending records whose producer is not registered
    pub unknown_producer: usize,
    /// Pending records that could not be rebuilt
    pub invalid: usize,
    pub fingerprints: usize,
    pub tags: usize,
}

struct Shared {
    config: Config,
    config_hash: Option<String>,
    scheduler: Mutex<Scheduler>,
    fetcher: Arc<dyn Fetcher>,
    producers: ProducerRegistry,
    sinks: SinkDispatcher,
    tags: Tags,
    /// Wakes the dispatch loop ahead of its next tick
    wake: Notify,
    /// Signalled whenever the in-flight set shrinks or a routing finishes
    settled: Notify,
    completions: mpsc::UnboundedSender<Completion>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Moves ready items into execution
    fn dispatch_ready(self: &Arc<Self>) {
        let batch = self.scheduler().take_ready(Instant::now());
        for Dispatch { item, token } in batch {
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                let id = item.id();
                let outcome = shared.execute(item).await;
                shared.finish(id, token, outcome);
            });
        }
    }

    /// Runs the fetch on its own task so a panicking fetcher still yields an outcome
    async fn execute(&self, item: WorkItem) -> FetchOutcome {
        let fetcher = Arc::clone(&self.fetcher);
        let label = item.label();
        match tokio::spawn(async move { fetcher.fetch(&item).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(item = %label, "Fetcher failed: {}", e);
                FetchOutcome::fatal(format!("fetcher failed: {}", e))
            }
        }
    }

    fn finish(&self, item_id: u64, token: u64, outcome: FetchOutcome) {
        self.scheduler().mark_unrouted();
        let completion = Completion {
            item_id,
            token,
            outcome,
        };
        if self.completions.send(completion).is_err() {
            tracing::debug!(item = item_id, "Routing loop closed, outcome dropped");
            self.scheduler().mark_routed();
            self.settled.notify_waiters();
        }
    }

    fn handle_completion(&self, completion: Completion) {
        let decision = self.scheduler().route(completion, Instant::now());
        if let RouteDecision::Completed { item, response } = decision {
            self.run_callback(item, response);
        }

        self.scheduler().mark_routed();
        self.wake.notify_one();
        self.settled.notify_waiters();
    }

    fn run_callback(&self, item: WorkItem, response: Response) {
        let identity = item.producer().to_string();
        let Some(producer) = self.producers.get(&identity) else {
            tracing::error!(item = %item.label(), producer = %identity, "No producer registered for completed item, response dropped");
            return;
        };

        let result = catch_unwind(AssertUnwindSafe(|| -> ProducerResult<Vec<Output>> {
            let response = producer.preparse(response, &item)?;
            producer.parse(&item.callback().name, &response, &item)
        }));

        match result {
            Ok(Ok(outputs)) => {
                let report = self.submit(outputs, Some(&identity));
                tracing::debug!(
                    item = %item.label(),
                    producer = %identity,
                    admitted = report.admitted,
                    artifacts = report.artifacts,
                    "Callback finished"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(item = %item.label(), target = %item.target(), producer = %identity, "Producer callback failed: {}", e);
            }
            Err(_) => {
                tracing::error!(item = %item.label(), target = %item.target(), producer = %identity, "Producer callback panicked");
            }
        }
    }

    fn submit<I>(&self, outputs: I, producer: Option<&str>) -> SubmitReport
    where
        I: IntoIterator<Item = Output>,
    {
        let mut report = SubmitReport::default();
        for output in outputs {
            match output {
                Output::Request(item) => match self.admit(item) {
                    Some(Admission::Admitted) => report.admitted += 1,
                    Some(Admission::Duplicate) => report.duplicates += 1,
                    None => report.rejected += 1,
                },
                Output::Artifact(mut artifact) => {
                    if artifact.producer.is_none() {
                        artifact.producer = producer.map(str::to_string);
                    }
                    self.sinks.deliver(&artifact);
                    report.artifacts += 1;
                }
            }
        }

        if report.admitted > 0 {
            self.wake.notify_one();
        }
        report
    }

    fn admit(&self, mut item: WorkItem) -> Option<Admission> {
        if self.producers.get(item.producer()).is_none() {
            tracing::error!(
                item = %item.label(),
                target = %item.target(),
                producer = %item.producer(),
                "Work item names an unregistered producer, dropped"
            );
            return None;
        }
        item.apply_retry_defaults(&self.config.retry);
        Some(self.scheduler().admit(item))
    }

    fn take_snapshot(&self) -> SchedulerSnapshot {
        let now = Instant::now();
        let scheduler = self.scheduler();
        SchedulerSnapshot {
            fingerprints: scheduler.fingerprints(),
            pending: scheduler
                .pending_items()
                .iter()
                .map(|item| PendingRecord::capture(item, now))
                .collect(),
            tags: self.tags.snapshot(),
            producers: self.producers.identities(),
            sinks: self.sinks.identities().to_vec(),
            config_hash: self.config_hash.clone(),
        }
    }
}

async fn dispatch_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.config.scheduler.tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.wake.notified() => {}
            _ = shutdown.changed() => break,
        }
        shared.dispatch_ready();
    }
    tracing::debug!("Dispatch loop stopped");
}

async fn routing_loop(
    shared: Arc<Shared>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            completion = completions.recv() => match completion {
                Some(completion) => shared.handle_completion(completion),
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Routing loop stopped");
}

/// Builder for [`Crawler`]
pub struct CrawlerBuilder {
    config: Config,
    config_hash: Option<String>,
    fetcher: Option<Arc<dyn Fetcher>>,
    producers: ProducerRegistry,
    sinks: Vec<Arc<dyn Sink>>,
    tags: Tags,
}

impl CrawlerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            config_hash: None,
            fetcher: None,
            producers: ProducerRegistry::new(),
            sinks: Vec::new(),
            tags: Tags::new(),
        }
    }

    /// Hash of the config file, recorded in snapshot manifests
    pub fn config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Replaces the default HTTP fetcher
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn producer(mut self, producer: Arc<dyn Producer>) -> Self {
        self.producers.register(producer);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Shares an existing tag map, so producers built earlier can hold a handle
    pub fn tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Validates the config and starts the scheduler's loops
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Running crawler (paused if `start-paused` is set)
    /// * `Err(TidepoolError)` - Invalid config, no tokio runtime, or the HTTP client could not be built
    pub fn build(self) -> Result<Crawler> {
        crate::config::validate(&self.config)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TidepoolError::NoRuntime)?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.config.http)?),
        };

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sinks = SinkDispatcher::new(self.sinks, self.config.sinks.error_policy);

        tracing::info!(
            producers = self.producers.len(),
            sinks = sinks.len(),
            max_concurrency = self.config.scheduler.max_concurrency,
            paused = self.config.scheduler.start_paused,
            "Starting scheduler"
        );

        let shared = Arc::new(Shared {
            scheduler: Mutex::new(Scheduler::new(self.config.scheduler.clone())),
            config: self.config,
            config_hash: self.config_hash,
            fetcher,
            producers: self.producers,
            sinks,
            tags: self.tags,
            wake: Notify::new(),
            settled: Notify::new(),
            completions: completions_tx,
            shutdown: shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let dispatch = runtime.spawn(dispatch_loop(Arc::clone(&shared), shutdown_rx.clone()));
        let routing = runtime.spawn(routing_loop(Arc::clone(&shared), completions_rx, shutdown_rx));
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([dispatch, routing]);

        Ok(Crawler { shared })
    }
}

/// Handle to a running scheduler
///
/// Cheap to clone; all clones drive the same scheduler.
#[derive(Clone)]
pub struct Crawler {
    shared: Arc<Shared>,
}

impl Crawler {
    pub fn builder(config: Config) -> CrawlerBuilder {
        CrawlerBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Shared tag map handed to producers and sinks
    pub fn tags(&self) -> Tags {
        self.shared.tags.clone()
    }

    /// Runs every producer's `start` and submits what it returns
    pub fn start_producers(&self) -> SubmitReport {
        let mut total = SubmitReport::default();
        for producer in self.shared.producers.iter() {
            let identity = producer.identity();
            match catch_unwind(AssertUnwindSafe(|| producer.start())) {
                Ok(Ok(outputs)) => {
                    let report = self.shared.submit(outputs, Some(&identity));
                    tracing::info!(producer = %identity, admitted = report.admitted, "Producer started");
                    total.merge(report);
                }
                Ok(Err(e)) => tracing::error!(producer = %identity, "Producer failed to start: {}", e),
                Err(_) => tracing::error!(producer = %identity, "Producer panicked while starting"),
            }
        }
        total
    }

    /// Submits producer output: work items go through dedup into the queue,
    /// artifacts go to the sinks
    pub fn submit<I>(&self, outputs: I, producer: Option<&str>) -> SubmitReport
    where
        I: IntoIterator<Item = Output>,
    {
        self.shared.submit(outputs, producer)
    }

    /// Submits a single work item
    ///
    /// Returns `None` when the item names an unregistered producer.
    pub fn submit_request(&self, item: WorkItem) -> Option<Admission> {
        let admission = self.shared.admit(item);
        if admission == Some(Admission::Admitted) {
            self.shared.wake.notify_one();
        }
        admission
    }

    /// Sends an artifact to every accepting sink
    pub fn deliver(&self, artifact: &Artifact) -> usize {
        self.shared.sinks.deliver(artifact)
    }

    pub fn pause(&self) {
        self.shared.scheduler().pause();
        tracing::info!("Scheduler paused");
    }

    pub fn resume(&self) {
        self.shared.scheduler().resume();
        self.shared.wake.notify_one();
        tracing::info!("Scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.scheduler().is_paused()
    }

    /// Stops an in-flight item; its running fetch is ignored and the item
    /// goes back to the head of the queue
    pub fn stop_item(&self, id: u64) -> bool {
        let stopped = self.shared.scheduler().stop(id);
        if stopped {
            self.shared.settled.notify_waiters();
            self.shared.wake.notify_one();
        }
        stopped
    }

    /// Stops every in-flight item
    pub fn stop_all(&self) -> usize {
        let stopped = self.shared.scheduler().stop_all();
        if stopped > 0 {
            self.shared.settled.notify_waiters();
            self.shared.wake.notify_one();
        }
        stopped
    }

    /// Waits until nothing is in flight and no outcome awaits routing
    pub async fn wait_quiescent(&self) -> Result<()> {
        self.wait_until(Scheduler::is_quiescent).await
    }

    /// Waits until the scheduler is quiescent and the queue is empty
    pub async fn wait_idle(&self) -> Result<()> {
        self.wait_until(Scheduler::is_idle).await
    }

    async fn wait_until(&self, done: fn(&Scheduler) -> bool) -> Result<()> {
        let mut shutdown = self.shared.shutdown.subscribe();
        loop {
            let settled = self.shared.settled.notified();
            if done(&self.shared.scheduler()) {
                return Ok(());
            }
            if self.shared.is_shut_down() {
                return Err(TidepoolError::ShutDown);
            }
            tokio::select! {
                _ = settled => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Waits until every delivered artifact has been handled by its sinks
    pub async fn flush_sinks(&self) {
        self.shared.sinks.flush().await
    }

    /// Pauses, waits for quiescence and writes a snapshot to `dir`
    ///
    /// The directory is created if needed. With [`SaveOptions::fast`] the
    /// in-flight items are stopped and requeued at the head instead of
    /// being waited for.
    pub async fn save(&self, dir: impl AsRef<Path>, options: SaveOptions) -> Result<SnapshotManifest> {
        if self.shared.is_shut_down() {
            return Err(TidepoolError::ShutDown);
        }

        self.pause();
        if options.fast {
            self.stop_all();
        }
        self.wait_quiescent().await?;

        let snapshot = self.shared.take_snapshot();
        let store = DirectoryStore::new(dir.as_ref());
        let manifest = tokio::task::spawn_blocking(move || store.write_snapshot(&snapshot))
            .await
            .map_err(|e| TidepoolError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        tracing::info!(
            dir = %dir.as_ref().display(),
            pending = manifest.pending,
            fingerprints = manifest.fingerprints,
            "Snapshot saved"
        );

        if options.resume_after {
            self.resume();
        }
        Ok(manifest)
    }

    /// Runs [`Crawler::save`] on its own task so the caller is not held up
    pub fn save_in_background(
        &self,
        dir: impl Into<PathBuf>,
        options: SaveOptions,
    ) -> JoinHandle<Result<SnapshotManifest>> {
        let crawler = self.clone();
        let dir = dir.into();
        tokio::spawn(async move { crawler.save(dir, options).await })
    }

    /// Restores a snapshot written by [`Crawler::save`]
    ///
    /// Producer and sink identities are compared with the saved ones; a
    /// mismatch is a warning. Pending items are admitted through the dedup
    /// index before the saved fingerprints are merged, so loading the same
    /// snapshot twice does not duplicate queue entries.
    pub async fn load(&self, dir: impl AsRef<Path>) -> Result<LoadReport> {
        let store = DirectoryStore::new(dir.as_ref());
        let (snapshot, manifest) = tokio::task::spawn_blocking(move || {
            let manifest = store.read_manifest()?;
            let snapshot = store.read_snapshot()?;
            Ok::<_, crate::storage::StorageError>((snapshot, manifest))
        })
        .await
        .map_err(|e| TidepoolError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        self.check_identities(&snapshot);

        let mut report = LoadReport {
            manifest,
            admitted: 0,
            duplicates: 0,
            unknown_producer: 0,
            invalid: 0,
            fingerprints: snapshot.fingerprints.len(),
            tags: snapshot.tags.len(),
        };

        let mut items = Vec::with_capacity(snapshot.pending.len());
        for record in snapshot.pending {
            if self.shared.producers.get(&record.producer).is_none() {
                tracing::warn!(producer = %record.producer, target = %record.target, "Saved item names an unregistered producer, skipped");
                report.unknown_producer += 1;
                continue;
            }
            let target = record.target.clone();
            match record.restore() {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(item = %target, "Saved item could not be rebuilt: {}", e);
                    report.invalid += 1;
                }
            }
        }

        let (admitted, duplicates) = self.shared.scheduler().restore(items, snapshot.fingerprints);
        report.admitted = admitted;
        report.duplicates = duplicates;
        self.shared.tags.extend(snapshot.tags);
        self.shared.wake.notify_one();

        tracing::info!(
            dir = %dir.as_ref().display(),
            admitted,
            duplicates,
            "Snapshot loaded"
        );
        Ok(report)
    }

    fn check_identities(&self, snapshot: &SchedulerSnapshot) {
        if let (Some(saved), Some(current)) = (&snapshot.config_hash, &self.shared.config_hash) {
            if saved != current {
                tracing::warn!(saved = %saved, current = %current, "Snapshot was taken with a different config");
            }
        }

        let producers = self.shared.producers.identities();
        warn_mismatch("producer", &snapshot.producers, &producers);
        warn_mismatch("sink", &snapshot.sinks, self.shared.sinks.identities());
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.scheduler().stats()
    }

    pub fn pending_info(&self) -> Vec<ItemInfo> {
        self.shared.scheduler().pending_info()
    }

    pub fn in_flight_info(&self) -> Vec<ItemInfo> {
        self.shared.scheduler().in_flight_info()
    }

    /// The `n` most recent routed executions, oldest first
    pub fn history(&self, n: usize) -> Vec<HistoryEntry> {
        self.shared.scheduler().history().recent(n)
    }

    pub fn producer_identities(&self) -> Vec<String> {
        self.shared.producers.identities()
    }

    pub fn sink_identities(&self) -> Vec<String> {
        self.shared.sinks.identities().to_vec()
    }

    /// Stops the loops and drains the sinks
    ///
    /// In-flight fetches are left to finish on their own; their outcomes
    /// are dropped.
    pub async fn shutdown(&self) {
        if self.shared.shutdown.send_replace(true) {
            return;
        }
        tracing::info!("Shutting down scheduler");

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.shared.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Scheduler task ended abnormally: {}", e);
            }
        }
        self.shared.sinks.shutdown().await;
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("producers", &self.shared.producers)
            .field("sinks", &self.shared.sinks)
            .finish()
    }
}

fn warn_mismatch(kind: &str, saved: &[String], current: &[String]) {
    for identity in saved.iter().filter(|id| !current.contains(id)) {
        tracing::warn!(kind, identity = %identity, "Saved {} is not registered", kind);
    }
    for identity in current.iter().filter(|id| !saved.contains(id)) {
        tracing::warn!(kind, identity = %identity, "Registered {} was not in the snapshot", kind);
    }
}
