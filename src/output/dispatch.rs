//! Artifact fan-out to sinks
//!
//! Every sink owns a serial worker fed by its own channel, so one slow sink
//! never holds up the others or the scheduler. Saves run on the blocking pool.

use crate::config::SinkErrorPolicy;
use crate::item::Artifact;
use crate::output::traits::Sink;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

struct SinkWorker {
    identity: String,
    sink: Arc<dyn Sink>,
    tx: mpsc::UnboundedSender<Artifact>,
    stopped: Arc<AtomicBool>,
}

/// Tracks artifacts queued for or being saved by any worker
#[derive(Default)]
struct Outstanding {
    count: AtomicUsize,
    drained: Notify,
}

impl Outstanding {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Delivers artifacts to every registered sink that accepts them
pub struct SinkDispatcher {
    workers: Mutex<Vec<SinkWorker>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    identities: Vec<String>,
    policy: SinkErrorPolicy,
    outstanding: Arc<Outstanding>,
}

impl SinkDispatcher {
    /// Spawns one worker per sink; must be called inside a tokio runtime
    pub fn new(sinks: Vec<Arc<dyn Sink>>, policy: SinkErrorPolicy) -> Self {
        let outstanding = Arc::new(Outstanding::default());
        let mut workers = Vec::with_capacity(sinks.len());
        let mut handles = Vec::with_capacity(sinks.len());
        let mut identities = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let identity = sink.identity();
            let (tx, rx) = mpsc::unbounded_channel();
            let stopped = Arc::new(AtomicBool::new(false));

            handles.push(tokio::spawn(run_worker(
                identity.clone(),
                Arc::clone(&sink),
                rx,
                policy,
                Arc::clone(&stopped),
                Arc::clone(&outstanding),
            )));
            identities.push(identity.clone());
            workers.push(SinkWorker {
                identity,
                sink,
                tx,
                stopped,
            });
        }

        Self {
            workers: Mutex::new(workers),
            handles: Mutex::new(handles),
            identities,
            policy,
            outstanding,
        }
    }

    /// Hands `artifact` to each accepting sink; returns how many took it
    ///
    /// Fire-and-forget: failures inside a sink are logged by its worker.
    pub fn deliver(&self, artifact: &Artifact) -> usize {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        let mut accepted = 0;

        for worker in workers.iter() {
            if worker.stopped.load(Ordering::SeqCst) {
                tracing::debug!(sink = %worker.identity, "Skipping stopped sink");
                continue;
            }
            if !worker.sink.acceptable(artifact) {
                continue;
            }

            self.outstanding.add();
            if worker.tx.send(artifact.clone()).is_err() {
                self.outstanding.done();
                tracing::warn!(sink = %worker.identity, "Sink worker is gone, artifact dropped");
                continue;
            }
            accepted += 1;
        }

        if accepted == 0 && !workers.is_empty() {
            tracing::debug!(artifact = %artifact.name, "No sink accepted artifact");
        }
        accepted
    }

    /// Waits until every delivered artifact has been saved or dropped
    pub async fn flush(&self) {
        loop {
            let drained = self.outstanding.drained.notified();
            if self.outstanding.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Closes all channels and waits for the workers to drain
    pub async fn shutdown(&self) {
        let workers: Vec<SinkWorker> = {
            let mut guard = self.workers.lock().unwrap_or_else(|p| p.into_inner());
            guard.drain(..).collect()
        };
        drop(workers);

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Sink worker ended abnormally: {}", e);
            }
        }
    }

    /// Identities of the registered sinks, in registration order
    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    pub fn policy(&self) -> SinkErrorPolicy {
        self.policy
    }

    /// Sinks whose worker stopped after an error
    pub fn stopped_sinks(&self) -> Vec<String> {
        let workers = self.workers.lock().unwrap_or_else(|p| p.into_inner());
        workers
            .iter()
            .filter(|w| w.stopped.load(Ordering::SeqCst))
            .map(|w| w.identity.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl std::fmt::Debug for SinkDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkDispatcher")
            .field("sinks", &self.identities)
            .field("policy", &self.policy)
            .finish()
    }
}

async fn run_worker(
    identity: String,
    sink: Arc<dyn Sink>,
    mut rx: mpsc::UnboundedReceiver<Artifact>,
    policy: SinkErrorPolicy,
    stopped: Arc<AtomicBool>,
    outstanding: Arc<Outstanding>,
) {
    while let Some(artifact) = rx.recv().await {
        let target = Arc::clone(&sink);
        let name = artifact.name.clone();
        let result = tokio::task::spawn_blocking(move || target.save(&artifact)).await;

        let failure = match result {
            Ok(Ok(())) => {
                tracing::trace!(sink = %identity, artifact = %name, "Saved");
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some("sink panicked".to_string()),
            Err(e) => Some(e.to_string()),
        };

        let Some(reason) = failure else {
            outstanding.done();
            continue;
        };
        tracing::error!(sink = %identity, artifact = %name, %reason, "Sink failed to save artifact");
        if policy == SinkErrorPolicy::Stop {
            tracing::error!(sink = %identity, "Stopping sink worker after error");
            stopped.store(true, Ordering::SeqCst);
            outstanding.done();
            break;
        }
        outstanding.done();
    }

    // Anything still queued is dropped with the worker
    rx.close();
    while rx.try_recv().is_ok() {
        outstanding.done();
    }
    tracing::debug!(sink = %identity, "Sink worker finished");
}
