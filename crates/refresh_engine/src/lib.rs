use refresh_core::{
    Page, RefreshError, Refresher, RefresherConfig, RefresherSnapshot, ScheduleHandle, Scheduler,
    Task,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No Tokio runtime available to drive the refresh timer")]
    NoRuntime,
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

pub type SharedRefresher = Arc<Mutex<Refresher>>;

/// Scheduler backed by Tokio's timer.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        TokioScheduler { runtime }
    }

    /// Scheduler on the runtime the caller is running in.
    pub fn current() -> Result<Self, EngineError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| EngineError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, mut task: Task) -> ScheduleHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let task_cancelled = Arc::clone(&cancelled);

        tracing::debug!("Spawning refresh timer task with interval {:?}", interval);
        let join_handle = self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            // a late tick pushes the following ones back instead of bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if task_cancelled.load(Ordering::SeqCst) {
                    tracing::debug!("Refresh timer task observed cancellation");
                    break;
                }
                task();
            }
        });

        ScheduleHandle::new(cancelled).with_cancel_hook(move || {
            tracing::debug!("Aborting refresh timer task");
            join_handle.abort();
        })
    }
}

/// Owns a refresher and the timer driving it.
pub struct Engine {
    refresher: SharedRefresher,
    scheduler: TokioScheduler,
}

impl Engine {
    /// Initialize a refresher for `page`. Must be called inside a Tokio runtime.
    pub fn new(config: RefresherConfig, page: &dyn Page) -> Result<Self, EngineError> {
        let scheduler = TokioScheduler::current()?;
        let refresher = Refresher::initialize(config, page)?;
        Ok(Engine {
            refresher: Arc::new(Mutex::new(refresher)),
            scheduler,
        })
    }

    pub fn start(&self) -> Result<(), EngineError> {
        let mut refresher = self.lock();
        refresher.start(&self.scheduler)?;
        tracing::info!("Engine started for station '{}'", refresher.station_id());
        Ok(())
    }

    pub fn stop(&self) -> bool {
        let mut refresher = self.lock();
        let was_running = refresher.stop();
        if was_running {
            tracing::info!("Engine stopped for station '{}'", refresher.station_id());
        } else {
            tracing::debug!("Engine stop requested while not running");
        }
        was_running
    }

    /// Handle shared with the status server.
    pub fn refresher(&self) -> SharedRefresher {
        Arc::clone(&self.refresher)
    }

    pub fn snapshot(&self) -> RefresherSnapshot {
        self.lock().snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, Refresher> {
        self.refresher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
