/// Single-asset download orchestration.
///
/// Each call to [`DownloadManager::download`] spawns one transfer task that owns the
/// asset's state machine for its whole run. State changes go to the shared state table
/// and to an unbounded channel, so a slow observer never stalls the network read loop.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use mediablob_shared::{Asset, DownloadError, DownloadState};
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::AssetStore;

/// Minimum change in fraction between two progress events.
pub const DEFAULT_PROGRESS_STEP: f64 = 0.01;

/// Drives asset transfers and tracks their states for the current session.
#[derive(Clone)]
pub struct DownloadManager {
    http: Client,
    store: AssetStore,
    /// Latest state per asset name.
    states: Arc<Mutex<HashMap<String, DownloadState>>>,
    /// Cancellation handles of in-flight transfers.
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
    progress_step: f64,
}

impl DownloadManager {
    pub fn new(http: Client, store: AssetStore) -> Self {
        Self {
            http,
            store,
            states: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(Mutex::new(HashMap::new())),
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }

    /// Coalesce progress events smaller than `step` (0.0 reports every chunk).
    ///
    /// Non-finite steps fall back to [`DEFAULT_PROGRESS_STEP`].
    pub fn with_progress_step(mut self, step: f64) -> Self {
        self.progress_step = if step.is_finite() {
            step.clamp(0.0, 1.0)
        } else {
            DEFAULT_PROGRESS_STEP
        };
        self
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Current state of an asset, or `None` if it was never requested in this session.
    pub async fn state(&self, name: &str) -> Option<DownloadState> {
        self.states.lock().await.get(name).cloned()
    }

    /// Snapshot of every tracked asset state.
    pub async fn states(&self) -> HashMap<String, DownloadState> {
        self.states.lock().await.clone()
    }

    pub async fn is_active(&self, name: &str) -> bool {
        self.active.lock().await.contains_key(name)
    }

    /// Cancel an in-flight transfer by asset name. Returns false if none was running.
    pub async fn cancel(&self, name: &str) -> bool {
        match self.active.lock().await.get(name) {
            Some(token) => {
                token.cancel();
                info!("Cancellation requested for {}", name);
                true
            }
            None => false,
        }
    }

    /// Start downloading an asset.
    ///
    /// If the asset is already in the store the transfer completes immediately without
    /// touching the network. Only one transfer per asset name may run at a time.
    pub async fn download(&self, asset: &Asset) -> Result<DownloadHandle, DownloadError> {
        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().await;
            if active.contains_key(&asset.name) {
                warn!("Download of {} already running", asset.name);
                return Err(DownloadError::AlreadyInProgress(asset.name.clone()));
            }
            active.insert(asset.name.clone(), token.clone());
        }

        self.states
            .lock()
            .await
            .entry(asset.name.clone())
            .or_insert(DownloadState::NotStarted);

        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = StateReporter {
            name: asset.name.clone(),
            states: self.states.clone(),
            tx,
        };
        let transfer = Transfer {
            http: self.http.clone(),
            store: self.store.clone(),
            asset: asset.clone(),
            progress_step: self.progress_step,
        };

        let active = self.active.clone();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let state = transfer.run(&reporter, task_token).await;
            active.lock().await.remove(&reporter.name);
            state
        });

        Ok(DownloadHandle {
            name: asset.name.clone(),
            events: rx,
            cancel: token,
            task,
        })
    }
}

/// Caller-side view of one running transfer.
///
/// Events end with exactly one terminal state. Dropping the handle does not stop the
/// transfer; use [`DownloadHandle::cancel`] for that.
pub struct DownloadHandle {
    name: String,
    events: mpsc::UnboundedReceiver<DownloadState>,
    cancel: CancellationToken,
    task: JoinHandle<DownloadState>,
}

impl DownloadHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cancellation. The transfer ends as `Failed(Cancelled)` and its
    /// temporary file is removed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next state transition, or `None` once the transfer task has finished.
    pub async fn next_state(&mut self) -> Option<DownloadState> {
        self.events.recv().await
    }

    /// All remaining transitions as a stream that ends after the terminal state.
    pub fn into_stream(self) -> impl Stream<Item = DownloadState> {
        futures::stream::unfold(self.events, |mut events| async move {
            events.recv().await.map(|state| (state, events))
        })
    }

    /// Wait for the terminal state.
    pub async fn finish(self) -> DownloadState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => DownloadState::Failed(DownloadError::Io(format!(
                "download task for {} ended abnormally: {}",
                self.name, e
            ))),
        }
    }
}

/// Writes state transitions for one asset. Only the owning transfer task holds one.
struct StateReporter {
    name: String,
    states: Arc<Mutex<HashMap<String, DownloadState>>>,
    tx: mpsc::UnboundedSender<DownloadState>,
}

impl StateReporter {
    async fn set(&self, state: DownloadState) {
        self.states
            .lock()
            .await
            .insert(self.name.clone(), state.clone());
        // Observers may have gone away; that never affects the transfer.
        let _ = self.tx.send(state);
    }
}

struct Transfer {
    http: Client,
    store: AssetStore,
    asset: Asset,
    progress_step: f64,
}

impl Transfer {
    async fn run(self, reporter: &StateReporter, cancel: CancellationToken) -> DownloadState {
        let name = &self.asset.name;

        if self.store.exists(name) {
            info!("{} already downloaded, skipping", name);
            reporter.set(DownloadState::Completed).await;
            return DownloadState::Completed;
        }

        info!("Downloading {} from {}", name, self.asset.source_url);
        // Every attempt enters InProgress before it can fail.
        reporter.set(DownloadState::InProgress(None)).await;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.transfer(reporter) => result,
        };

        let state = match result {
            Ok(path) => {
                info!("Downloaded {} to {}", name, path.display());
                DownloadState::Completed
            }
            Err(DownloadError::Cancelled) => {
                info!("Download of {} cancelled", name);
                DownloadState::Failed(DownloadError::Cancelled)
            }
            Err(e) => {
                warn!("Download of {} failed: {}", name, e);
                DownloadState::Failed(e)
            }
        };

        reporter.set(state.clone()).await;
        state
    }

    async fn transfer(&self, reporter: &StateReporter) -> Result<PathBuf, DownloadError> {
        let source = &self.asset.source_url;
        let url = Url::parse(source)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", source, e)))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        let total = response.content_length().filter(|len| *len > 0);
        if total.is_some() {
            reporter.set(DownloadState::InProgress(Some(0.0))).await;
        }

        // Removed on drop unless committed below.
        let staged = self.store.stage(&self.asset.name)?;
        let handle = staged
            .as_file()
            .try_clone()
            .map_err(|e| DownloadError::Io(e.to_string()))?;
        let mut file = tokio::fs::File::from_std(handle);

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut last_reported = 0.0_f64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::Transport(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::Io(e.to_string()))?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let fraction = (received as f64 / total as f64).min(1.0);
                let finished = fraction >= 1.0 && last_reported < 1.0;
                if finished || fraction - last_reported >= self.progress_step {
                    last_reported = fraction;
                    reporter.set(DownloadState::InProgress(Some(fraction))).await;
                }
            }
        }

        if let Some(total) = total {
            if received < total {
                return Err(DownloadError::Transport(format!(
                    "connection closed after {} of {} bytes",
                    received, total
                )));
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;
        drop(file);

        debug!("Received {} bytes for {}", received, self.asset.name);
        let path = self.store.commit(staged, &self.asset.name)?;
        Ok(path)
    }
}
