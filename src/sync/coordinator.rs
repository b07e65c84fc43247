use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::{
    counter::DailyCounter,
    debounce::Debouncer,
    snapshot::{SyncSnapshot, SyncStatus},
};
use crate::{
    cloud::{CloudApi, CloudError},
    credentials::Credentials,
    events::{StateBus, StateListener},
    readings::{Reading, ReadingBuffer},
};

/// Delay between the first buffered reading and its upload.
pub const UPLOAD_DEBOUNCE: Duration = Duration::from_secs(5);

/// Cooldown collapsing refresh requests into one status fetch.
pub const REFRESH_COOLDOWN: Duration = Duration::from_secs(5);

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("update failed: {0}")]
    UpdateFailed(#[from] CloudError),

    #[error("sync coordinator is stopped")]
    Stopped,
}

/// Source of the current local date for the readings-today counter.
pub type DateSource = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct SyncSettings {
    /// Entity IDs whose state changes are buffered (solar, battery, grid).
    pub monitored_entities: Vec<String>,
    pub scan_interval: Duration,
    pub upload_debounce: Duration,
    pub refresh_cooldown: Duration,
    pub today: DateSource,
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSettings")
            .field("monitored_entities", &self.monitored_entities)
            .field("scan_interval", &self.scan_interval)
            .field("upload_debounce", &self.upload_debounce)
            .field("refresh_cooldown", &self.refresh_cooldown)
            .finish_non_exhaustive()
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            monitored_entities: Vec::new(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            upload_debounce: UPLOAD_DEBOUNCE,
            refresh_cooldown: REFRESH_COOLDOWN,
            today: Arc::new(|| Local::now().date_naive()),
        }
    }
}

/// Point-in-time dump of coordinator internals. The token is redacted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Diagnostics {
    #[schema(value_type = Object)]
    pub credentials: serde_json::Value,
    pub monitored_entities: Vec<String>,
    pub scan_interval_secs: u64,
    pub snapshot: SyncSnapshot,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub buffered_readings: usize,
    pub upload_pending: bool,
    pub last_upload: Option<DateTime<Utc>>,
}

/// Owns the buffer → upload → refresh cycle.
///
/// - Readings are appended to the buffer; the first one arms a single
///   debounced upload task, later ones only grow the buffer.
/// - The upload swaps the buffer out, posts it, and on failure puts the batch
///   back. It then asks for a (debounced) refresh.
/// - A refresh flushes the buffer first, then fetches status and publishes a
///   new [`SyncSnapshot`].
///
/// Uploads are serialized, so at most one `post_readings` call is on the wire.
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn CloudApi>,
    credentials: Credentials,
    settings: SyncSettings,
    state: Mutex<SyncState>,
    upload_lock: Mutex<()>,
    refresh_lock: Mutex<()>,
    upload_debouncer: Debouncer,
    refresh_debouncer: Debouncer,
    snapshot_tx: watch::Sender<SyncSnapshot>,
    /// Listener and poller, aborted on stop.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Set by `stop`, cleared by `start`. No cloud traffic while set.
    stopped: AtomicBool,
}

#[derive(Debug, Default)]
struct SyncState {
    buffer: ReadingBuffer,
    counter: DailyCounter,
    last_upload: Option<DateTime<Utc>>,
    last_update_success: bool,
    last_error: Option<String>,
}

impl SyncCoordinator {
    pub fn new(api: Arc<dyn CloudApi>, credentials: Credentials, settings: SyncSettings) -> Self {
        let (snapshot_tx, _) = watch::channel(SyncSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                api,
                credentials,
                upload_debouncer: Debouncer::new(settings.upload_debounce),
                refresh_debouncer: Debouncer::new(settings.refresh_cooldown),
                settings,
                state: Mutex::new(SyncState::default()),
                upload_lock: Mutex::new(()),
                refresh_lock: Mutex::new(()),
                snapshot_tx,
                tasks: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.credentials.instance_id
    }

    pub fn monitored_entities(&self) -> &[String] {
        &self.inner.settings.monitored_entities
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Subscribe to `bus` for the monitored entities and start the periodic
    /// poll. Calling `start` on a running coordinator does nothing.
    pub async fn start(&self, bus: &StateBus) {
        let mut tasks = self.inner.tasks.lock().await;
        if !tasks.is_empty() {
            warn!("Sync coordinator already started");
            return;
        }
        self.inner.stopped.store(false, Ordering::SeqCst);

        let entities = self.inner.settings.monitored_entities.clone();
        if entities.is_empty() {
            debug!("No entities configured to monitor");
        } else {
            let listener = StateListener::new(entities, self.clone());
            tasks.push(tokio::spawn(listener.run(bus.subscribe())));
        }

        tasks.push(tokio::spawn(self.clone().run_poller()));
        info!(instance_id = %self.instance_id(), "Sync coordinator started");
    }

    /// Unsubscribe from the bus, stop polling and cancel any pending or
    /// running upload. Buffered readings are not flushed.
    ///
    /// Until the next `start`, readings are dropped and refreshes are refused.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        for task in self.inner.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.inner.upload_debouncer.cancel().await;
        self.inner.refresh_debouncer.cancel().await;

        let unsent = self.buffered().await;
        info!(unsent, "Sync coordinator stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    fn today(&self) -> NaiveDate {
        (self.inner.settings.today)()
    }

    async fn run_poller(self) {
        let period = self.inner.settings.scan_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "Status polling loop started");

        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Scheduled refresh failed; retrying next interval");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Buffering & upload
    // -----------------------------------------------------------------------

    /// Append a reading and arm the debounced upload if none is outstanding.
    pub async fn record(&self, reading: Reading) {
        if self.is_stopped() {
            debug!(entity_id = %reading.entity_id, "Coordinator stopped; reading dropped");
            return;
        }
        debug!(entity_id = %reading.entity_id, state = %reading.state, "Buffered reading");
        self.inner.state.lock().await.buffer.push(reading);

        let this = self.clone();
        let scheduled = self
            .inner
            .upload_debouncer
            .schedule(async move { this.debounced_upload().await })
            .await;
        if scheduled {
            debug!(
                delay_secs = self.inner.upload_debouncer.delay().as_secs(),
                "Upload scheduled"
            );
        }
    }

    async fn debounced_upload(&self) {
        // failures are logged by flush and the batch is back in the buffer
        let _ = self.flush().await;
        self.request_refresh().await;
    }

    /// Upload everything currently buffered. Returns the number of readings
    /// sent; on failure the batch is restored to the buffer.
    pub async fn flush(&self) -> Result<usize, CloudError> {
        let _uploading = self.inner.upload_lock.lock().await;

        let batch = self.inner.state.lock().await.buffer.take();
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        debug!(count, "Uploading readings");

        match self.inner.api.post_readings(&batch).await {
            Ok(_) => {
                let mut state = self.inner.state.lock().await;
                state.last_upload = Some(Utc::now());
                state.counter.record(self.today(), count);
                info!(count, "Readings uploaded");
                Ok(count)
            }
            Err(e) => {
                error!(count, error = %e, "Failed to upload readings; kept for retry");
                self.inner.state.lock().await.buffer.restore(batch);
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Ask for a refresh after the cooldown. Requests arriving while one is
    /// outstanding are merged into it.
    pub async fn request_refresh(&self) {
        if self.is_stopped() {
            debug!("Coordinator stopped; refresh request ignored");
            return;
        }
        let this = self.clone();
        self.inner
            .refresh_debouncer
            .schedule(async move {
                if let Err(e) = this.refresh().await {
                    warn!(error = %e, "Requested refresh failed");
                }
            })
            .await;
    }

    /// Flush the buffer, fetch status and publish a new snapshot.
    ///
    /// On failure the published snapshot keeps its values but is marked
    /// disconnected with `sync_status = error`; `last_sync` is unchanged.
    pub async fn refresh(&self) -> Result<SyncSnapshot, SyncError> {
        if self.is_stopped() {
            return Err(SyncError::Stopped);
        }
        let _cycle = self.inner.refresh_lock.lock().await;
        let syncing = SyncingMarker::publish(&self.inner.snapshot_tx);

        if self.flush().await.is_err() {
            debug!("Continuing refresh with readings still buffered");
        }

        let result = self.inner.api.get_status().await;

        let mut state = self.inner.state.lock().await;
        syncing.settle();
        let readings_today = state.counter.current(self.today());

        match result {
            Ok(status) => {
                let snapshot = SyncSnapshot::synced(status, readings_today, Utc::now());
                state.last_update_success = true;
                state.last_error = None;
                self.inner.snapshot_tx.send_replace(snapshot.clone());
                debug!(readings_today, "Snapshot refreshed");
                Ok(snapshot)
            }
            Err(e) => {
                state.last_update_success = false;
                state.last_error = Some(e.to_string());
                self.inner
                    .snapshot_tx
                    .send_modify(|s| *s = s.degraded(readings_today));
                Err(SyncError::UpdateFailed(e))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub async fn readings_today(&self) -> u64 {
        self.inner.state.lock().await.counter.current(self.today())
    }

    pub async fn buffered(&self) -> usize {
        self.inner.state.lock().await.buffer.len()
    }

    pub async fn upload_pending(&self) -> bool {
        self.inner.upload_debouncer.is_pending().await
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        let upload_pending = self.upload_pending().await;
        let mut state = self.inner.state.lock().await;
        let readings_today = state.counter.current(self.today());
        let mut snapshot = self.snapshot();
        snapshot.readings_today = readings_today;

        Diagnostics {
            credentials: self.inner.credentials.redacted(),
            monitored_entities: self.inner.settings.monitored_entities.clone(),
            scan_interval_secs: self.inner.settings.scan_interval.as_secs(),
            snapshot,
            last_update_success: state.last_update_success,
            last_error: state.last_error.clone(),
            buffered_readings: state.buffer.len(),
            upload_pending,
            last_upload: state.last_upload,
        }
    }

    /// Revoke this installation's token with the cloud.
    pub async fn unpair(&self) -> Result<bool, CloudError> {
        let unpaired = self.inner.api.unpair().await?;
        info!(instance_id = %self.instance_id(), unpaired, "Unpair requested");
        Ok(unpaired)
    }
}

/// Publishes `sync_status = syncing` for the duration of a refresh.
///
/// Dropped without [`settle`](Self::settle) (the refresh was cancelled), it
/// puts back the status the snapshot had before.
struct SyncingMarker<'a> {
    tx: &'a watch::Sender<SyncSnapshot>,
    previous: Option<SyncStatus>,
}

impl<'a> SyncingMarker<'a> {
    fn publish(tx: &'a watch::Sender<SyncSnapshot>) -> Self {
        let previous = tx.borrow().sync_status;
        tx.send_modify(|s| *s = s.syncing());
        Self {
            tx,
            previous: Some(previous),
        }
    }

    /// The caller publishes the outcome itself.
    fn settle(mut self) {
        self.previous = None;
    }
}

impl Drop for SyncingMarker<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.tx.send_modify(|s| s.sync_status = previous);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
