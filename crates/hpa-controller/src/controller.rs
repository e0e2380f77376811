//! Controller: resync loop and worker pool over the work queue.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hpa_core::ControllerSettings;

use crate::backoff::Backoff;
use crate::queue::WorkQueue;
use crate::reconciler::{ReconcileOutcome, Reconciler};

pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
    settings: ControllerSettings,
}

impl Controller {
    pub fn new(reconciler: Reconciler, settings: ControllerSettings) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            queue: Arc::new(WorkQueue::new()),
            backoff: Arc::new(Backoff::new(settings.backoff_base, settings.backoff_max)),
            settings,
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Queue every stored autoscaler. Returns how many keys were added.
    pub async fn enqueue_all(&self) -> anyhow::Result<usize> {
        let keys = self.reconciler.store().list_keys()?;
        for key in &keys {
            self.queue.add(key).await;
        }
        Ok(keys.len())
    }

    /// Run until `shutdown` flips. Workers finish the key they hold, then exit.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sync_period_secs = self.settings.sync_period.as_secs(),
            workers = self.settings.workers,
            "controller started"
        );

        let workers: Vec<JoinHandle<()>> = (0..self.settings.workers.max(1))
            .map(|id| {
                let reconciler = Arc::clone(&self.reconciler);
                let queue = Arc::clone(&self.queue);
                let backoff = Arc::clone(&self.backoff);
                tokio::spawn(worker(id, reconciler, queue, backoff))
            })
            .collect();

        loop {
            match self.enqueue_all().await {
                Ok(n) => debug!(queued = n, "resync"),
                Err(e) => error!(error = %e, "resync failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.sync_period) => {}
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }

        self.queue.shut_down().await;
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker panicked");
            }
        }
        info!("controller stopped");
    }
}

async fn worker(
    id: usize,
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
) {
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Ok(outcome) => {
                backoff.forget(&key).await;
                if let ReconcileOutcome::Unchanged(decision) = &outcome {
                    debug!(worker = id, autoscaler = %key, reason = ?decision.reason, "no change");
                }
            }
            Err(e) if e.is_retryable() => {
                let delay = backoff.next_delay(&key).await;
                warn!(
                    worker = id,
                    autoscaler = %key,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "reconcile failed, requeueing"
                );
                queue.add_after(&key, delay);
            }
            Err(e) => {
                backoff.forget(&key).await;
                warn!(worker = id, autoscaler = %key, class = e.class(), error = %e, "reconcile failed");
            }
        }
        queue.done(&key).await;
    }
    debug!(worker = id, "worker exiting");
}
