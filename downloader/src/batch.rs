/// Batch downloads with bounded concurrency and aggregate progress.
///
/// Uses a tokio Semaphore to limit how many transfers run at once. Per-asset workers
/// report back to a single collector, which is the only writer of the batch counter.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mediablob_shared::{Asset, BatchProgress, DownloadError, DownloadState};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::manager::DownloadManager;

/// Default number of transfers a batch runs in parallel.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Final state of one asset within a batch.
#[derive(Debug, Clone)]
pub struct AssetOutcome {
    pub asset: Asset,
    pub state: DownloadState,
}

/// Result of a finished batch, in the same order as the input assets.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<AssetOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    /// True only if every asset reached `Completed`.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.state.is_completed())
    }

    pub fn completed(&self) -> impl Iterator<Item = &AssetOutcome> {
        self.outcomes.iter().filter(|o| o.state.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &AssetOutcome> {
        self.outcomes.iter().filter(|o| !o.state.is_completed())
    }

    /// Failed assets worth another attempt. Cancelled ones are left out.
    pub fn retriable(&self) -> Vec<Asset> {
        self.outcomes
            .iter()
            .filter(|o| o.state.failure().is_some_and(DownloadError::is_retriable))
            .map(|o| o.asset.clone())
            .collect()
    }

    pub fn progress(&self) -> BatchProgress {
        let mut progress = BatchProgress::new(self.outcomes.len());
        for outcome in &self.outcomes {
            progress.record(&outcome.state);
        }
        progress
    }
}

/// Running batch: observable progress plus the eventual report.
pub struct BatchHandle {
    progress: watch::Receiver<BatchProgress>,
    task: JoinHandle<BatchReport>,
    assets: Vec<Asset>,
    cancel: CancellationToken,
}

impl BatchHandle {
    /// Receiver that is updated on every terminal transition in the batch.
    pub fn progress(&self) -> watch::Receiver<BatchProgress> {
        self.progress.clone()
    }

    pub fn current(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    /// Stop the batch. Running transfers are cancelled and queued assets never start;
    /// both end as `Failed(Cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the report. If the batch task itself was torn down, every asset is
    /// reported as cancelled so the report never claims success for unfinished work.
    pub async fn finish(self) -> BatchReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => match e.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(e) => {
                    warn!("Batch task ended abnormally: {}", e);
                    let now = Utc::now();
                    BatchReport {
                        outcomes: self
                            .assets
                            .into_iter()
                            .map(|asset| AssetOutcome {
                                asset,
                                state: DownloadState::Failed(DownloadError::Cancelled),
                            })
                            .collect(),
                        started_at: now,
                        finished_at: now,
                    }
                }
            },
        }
    }
}

/// Drives a whole asset list through a [`DownloadManager`].
#[derive(Clone)]
pub struct BatchCoordinator {
    manager: DownloadManager,
    max_concurrent: usize,
}

impl BatchCoordinator {
    pub fn new(manager: DownloadManager, max_concurrent: usize) -> Self {
        Self {
            manager,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Start downloading every asset. A failing asset never stops its siblings.
    pub fn download_all(&self, assets: Vec<Asset>) -> BatchHandle {
        let total = assets.len();
        let (progress_tx, progress_rx) = watch::channel(BatchProgress::new(total));
        let manager = self.manager.clone();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let max_concurrent = self.max_concurrent;
        let cancel = CancellationToken::new();
        let batch_assets = assets.clone();
        let batch_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let started_at = Utc::now();
            info!(
                "Batch of {} assets started (max {} concurrent)",
                total, max_concurrent
            );

            let mut workers = JoinSet::new();
            for (index, asset) in assets.iter().cloned().enumerate() {
                let manager = manager.clone();
                let semaphore = semaphore.clone();
                let cancel = batch_cancel.clone();
                workers.spawn(async move {
                    let state = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => DownloadState::Failed(DownloadError::Cancelled),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(_permit) => download_one(&manager, &asset, &cancel).await,
                            Err(_) => DownloadState::Failed(DownloadError::Io(
                                "batch scheduler closed".to_string(),
                            )),
                        },
                    };
                    (index, state)
                });
            }

            let mut states: Vec<Option<DownloadState>> = vec![None; total];
            let mut progress = BatchProgress::new(total);
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((index, state)) => {
                        progress.record(&state);
                        progress_tx.send_replace(progress);
                        states[index] = Some(state);
                    }
                    Err(e) => warn!("Batch worker ended abnormally: {}", e),
                }
            }

            let outcomes: Vec<AssetOutcome> = assets
                .into_iter()
                .zip(states)
                .map(|(asset, state)| {
                    let state = state.unwrap_or_else(|| {
                        let state = DownloadState::Failed(DownloadError::Io(format!(
                            "worker for {} did not report",
                            asset.name
                        )));
                        progress.record(&state);
                        progress_tx.send_replace(progress);
                        state
                    });
                    AssetOutcome { asset, state }
                })
                .collect();

            let report = BatchReport {
                outcomes,
                started_at,
                finished_at: Utc::now(),
            };
            info!(
                "Batch finished: {} completed, {} failed in {}ms",
                report.completed().count(),
                report.failed().count(),
                (report.finished_at - report.started_at).num_milliseconds()
            );
            report
        });

        BatchHandle {
            progress: progress_rx,
            task,
            assets: batch_assets,
            cancel,
        }
    }

    /// Download every asset and wait for the report.
    pub async fn run(&self, assets: Vec<Asset>) -> BatchReport {
        self.download_all(assets).finish().await
    }
}

async fn download_one(
    manager: &DownloadManager,
    asset: &Asset,
    cancel: &CancellationToken,
) -> DownloadState {
    let handle = match manager.download(asset).await {
        Ok(handle) => handle,
        Err(e) => return DownloadState::Failed(e),
    };

    let transfer = handle.cancellation_token();
    let finished = handle.finish();
    tokio::pin!(finished);
    tokio::select! {
        state = &mut finished => return state,
        _ = cancel.cancelled() => transfer.cancel(),
    }
    finished.await
}
