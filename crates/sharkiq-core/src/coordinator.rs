// ── Sync coordinator ──
//
// Owns one `AuthSession` and the `DeviceStore` fed by it. A tick signs in
// if needed, lists devices, and swaps in a new snapshot. Ticks never run
// concurrently: a request arriving mid-tick awaits the in-flight run. The
// tick body runs as its own task, so callers that stop waiting never
// strand it holding the session lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use sharkiq_api::DatapointAck;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CacheDisposition, CoreError, SyncError, SyncErrorKind};
use crate::model::{Device, mask_serial};
use crate::session::AuthSession;
use crate::store::{DeviceCache, DeviceStore};

const EVENT_CHANNEL_SIZE: usize = 64;

type TickResult = Result<Arc<DeviceCache>, SyncError>;
type TickFuture = Shared<BoxFuture<'static, TickResult>>;

// ── SyncEvent ────────────────────────────────────────────────────

/// Signals emitted once per tick outcome.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A new snapshot is in place.
    Refreshed { devices: usize, online: usize },
    /// The tick failed but the previous snapshot is still served.
    TransientFailure { kind: SyncErrorKind, message: String },
    /// Stored credentials stopped working. The cache was cleared and no
    /// further sign-in is attempted until the caller supplies new ones.
    ReauthRequired { message: String },
    /// The user must open `url` and hand back the redirect.
    InteractionRequired { url: Url },
}

// ── Coordinator ──────────────────────────────────────────────────

/// Periodic and on-demand device sync for one session.
///
/// Cheaply cloneable; clones share the session, the store, and the
/// in-flight tick.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    session: AuthSession,
    store: DeviceStore,
    events: broadcast::Sender<Arc<SyncEvent>>,
    cancel: CancellationToken,
    /// Child token for the running background task, replaced on `start`.
    cancel_child: Mutex<CancellationToken>,
    inflight: StdMutex<Option<Inflight>>,
    next_tick: AtomicU64,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

struct Inflight {
    id: u64,
    future: TickFuture,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(session: AuthSession) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(CoordinatorInner {
                session,
                store: DeviceStore::new(),
                events,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                inflight: StdMutex::new(None),
                next_tick: AtomicU64::new(0),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.inner.session
    }

    pub fn store(&self) -> &DeviceStore {
        &self.inner.store
    }

    /// Subscribe to tick outcomes.
    pub fn events(&self) -> broadcast::Receiver<Arc<SyncEvent>> {
        self.inner.events.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<DeviceCache> {
        self.inner.store.snapshot()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.snapshot().devices().cloned().collect()
    }

    pub fn device(&self, serial: &str) -> Option<Device> {
        self.snapshot().get(serial).cloned()
    }

    pub fn is_online(&self, serial: &str) -> bool {
        self.snapshot().is_online(serial)
    }

    // ── Ticks ────────────────────────────────────────────────────

    /// Run one sync cycle, or join the one already running.
    ///
    /// Dropping the returned future stops waiting but not the cycle; use
    /// [`cancel_tick`](Self::cancel_tick) to abort it.
    pub async fn tick(&self) -> TickResult {
        let future = {
            let mut slot = self
                .inner
                .inflight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(running) = slot.as_ref() {
                debug!("tick already in flight, joining it");
                running.future.clone()
            } else {
                let id = self.inner.next_tick.fetch_add(1, Ordering::Relaxed);
                let cancel = self.inner.cancel.child_token();
                let handle = tokio::spawn(run_tick(Arc::clone(&self.inner), cancel.clone(), id));
                let future = async move {
                    handle.await.unwrap_or_else(|e| {
                        warn!(error = %e, "tick task ended abnormally");
                        Err(SyncError::from_core(CoreError::Cancelled))
                    })
                }
                .boxed()
                .shared();
                *slot = Some(Inflight {
                    id,
                    future: future.clone(),
                    cancel,
                });
                future
            }
        };

        future.await
    }

    /// Cancel the tick in flight, if any. Its waiters get a `Cancelled`
    /// failure and the cache is left as it was.
    pub fn cancel_tick(&self) {
        let slot = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = slot.as_ref() {
            running.cancel.cancel();
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Write one property value.
    ///
    /// Once a listing has succeeded, serials it did not contain are
    /// rejected locally. The ack does not mean the device applied the
    /// value; the next tick shows that.
    pub async fn set_property(
        &self,
        serial: &str,
        property: &str,
        value: Value,
    ) -> Result<DatapointAck, CoreError> {
        let snapshot = self.snapshot();
        if snapshot.refreshed_at().is_some() && snapshot.get(serial).is_none() {
            return Err(CoreError::DeviceNotFound {
                serial: serial.to_owned(),
            });
        }

        let cloud = self.inner.session.cloud().clone();
        let value = Arc::new(value);
        let ack = self
            .inner
            .session
            .authorized(|access| {
                let cloud = cloud.clone();
                let value = Arc::clone(&value);
                let serial = serial.to_owned();
                let property = property.to_owned();
                async move {
                    cloud
                        .set_property(&access, &serial, &property, &value)
                        .await
                }
            })
            .await?;

        info!(serial = %mask_serial(serial), property, "property set");
        Ok(ack)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Run an initial tick, then keep ticking every `refresh_interval`
    /// (unless it is zero) until [`stop`](Self::stop).
    ///
    /// Background ticks start even when the first one fails: a connection
    /// failure is worth retrying, and a credentials failure makes later
    /// ticks fail fast without touching the network.
    pub async fn start(&self) -> TickResult {
        self.stop().await;

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let first = self.tick().await;

        let period = self.inner.session.config().refresh_interval;
        if !period.is_zero() {
            let coordinator = self.clone();
            self.inner
                .task_handles
                .lock()
                .await
                .push(tokio::spawn(refresh_task(coordinator, period, child)));
        }

        first
    }

    /// Stop background ticks and cancel any tick in flight.
    pub async fn stop(&self) {
        self.inner.cancel_child.lock().await.cancel();
        self.cancel_tick();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("sync stopped");
    }

    /// Stop for good. Later ticks fail as cancelled immediately.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.stop().await;
    }
}

// ── Tick body ────────────────────────────────────────────────────

async fn run_tick(inner: Arc<CoordinatorInner>, cancel: CancellationToken, id: u64) -> TickResult {
    let result = sync_once(&inner, cancel).await;

    let mut slot = inner
        .inflight
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().is_some_and(|running| running.id == id) {
        *slot = None;
    }
    result
}

async fn sync_once(inner: &CoordinatorInner, cancel: CancellationToken) -> TickResult {
    let cloud = inner.session.cloud().clone();
    let fetch = inner.session.authorized(|access| {
        let cloud = cloud.clone();
        async move { cloud.list_devices(&access).await }
    });

    let listed = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            inner.session.interrupted();
            Err(CoreError::Cancelled)
        }
        result = fetch => result,
    };

    match listed {
        Ok(listings) => {
            let devices: Vec<Device> = listings.into_iter().map(Device::from).collect();
            let previous = inner.store.snapshot();
            let next = DeviceCache::from_listing(devices, &previous, Utc::now());

            for serial in next.online().difference(previous.online()) {
                debug!(serial = %mask_serial(serial), "device confirmed online");
            }

            let snapshot = inner.store.replace(next);
            debug!(
                devices = snapshot.len(),
                online = snapshot.online().len(),
                "tick complete"
            );
            emit(
                inner,
                SyncEvent::Refreshed {
                    devices: snapshot.len(),
                    online: snapshot.online().len(),
                },
            );
            Ok(snapshot)
        }
        Err(err) => Err(settle_failure(inner, err)),
    }
}

fn settle_failure(inner: &CoordinatorInner, err: CoreError) -> SyncError {
    let url = match &err {
        CoreError::InteractionRequired { url } => Some(url.clone()),
        _ => None,
    };
    let failure = SyncError::from_core(err);

    if failure.cache == CacheDisposition::Invalidated {
        inner.store.invalidate();
    }

    match (failure.kind, url) {
        (SyncErrorKind::Credentials, _) => {
            warn!(error = %failure.source, "sync needs reauthentication, cache cleared");
            emit(
                inner,
                SyncEvent::ReauthRequired {
                    message: failure.source.to_string(),
                },
            );
        }
        (SyncErrorKind::InteractionRequired, Some(url)) => {
            info!("sync waiting on interactive login");
            emit(inner, SyncEvent::InteractionRequired { url });
        }
        (SyncErrorKind::Cancelled, _) => {
            debug!("tick cancelled, cache untouched");
        }
        (kind, _) => {
            warn!(error = %failure.source, %kind, "tick failed, serving previous snapshot");
            emit(
                inner,
                SyncEvent::TransientFailure {
                    kind,
                    message: failure.source.to_string(),
                },
            );
        }
    }

    failure
}

fn emit(inner: &CoordinatorInner, event: SyncEvent) {
    // No receivers is fine.
    let _ = inner.events.send(Arc::new(event));
}

// ── Background refresh ───────────────────────────────────────────

async fn refresh_task(coordinator: Coordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = coordinator.tick().await {
                    debug!(error = %e, "periodic tick failed");
                }
            }
        }
    }
}
