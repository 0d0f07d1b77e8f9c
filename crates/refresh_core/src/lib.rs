//! Station image refresher.
//!
//! Keeps one image element pointed at `/station/{id}?rand={n}`, where the
//! station id is taken from the page address once at startup and `rand`
//! changes on every assignment so caches never serve a stale image.

mod cache_bust;
mod models;
mod page;
mod scheduler;

pub use crate::cache_bust::{CacheBuster, CounterCacheBuster, RandomCacheBuster, for_strategy};
pub use crate::models::*;
pub use crate::page::{DisplayElement, HeadlessPage, ImageElement, Page};
pub use crate::scheduler::{ScheduleHandle, Scheduler, Task, VirtualScheduler};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Refresh interval must be greater than zero, got {interval_ms}ms")]
    InvalidInterval { interval_ms: u64 },
    #[error("Display element id must not be empty")]
    EmptyElementId,
    #[error("Refresher for station '{station_id}' is already running")]
    AlreadyRunning { station_id: StationId },
}

struct RefreshState {
    station_id: StationId,
    element: Option<Arc<dyn DisplayElement>>,
    cache_buster: Box<dyn CacheBuster>,
    phase: RefresherPhase,
    tick_count: u64,
    last_url: Option<RefreshUrl>,
    /// Generation of the live timer; bumped on every start, cleared by stop.
    active_timer: Option<u64>,
    timer_generation: u64,
}

impl RefreshState {
    /// Point the element at a fresh URL. Without an element this only
    /// records the URL.
    fn assign_next(&mut self) -> RefreshUrl {
        let url = RefreshUrl::new(self.station_id.clone(), self.cache_buster.next_value());
        if let Some(element) = &self.element {
            element.set_source(&url.to_string());
        }
        self.last_url = Some(url.clone());
        url
    }
}

fn lock_state(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_tick(state: &Mutex<RefreshState>) -> RefreshUrl {
    let mut state = lock_state(state);
    tick_locked(&mut state)
}

/// Timer-driven tick. A firing from a stopped or replaced timer is dropped;
/// the check runs under the state lock so it cannot race `stop()`.
fn run_scheduled_tick(state: &Mutex<RefreshState>, generation: u64) -> Option<RefreshUrl> {
    let mut state = lock_state(state);
    if state.active_timer != Some(generation) {
        tracing::debug!(
            "Dropping tick from cancelled timer {} for station '{}'",
            generation,
            state.station_id
        );
        return None;
    }
    Some(tick_locked(&mut state))
}

fn tick_locked(state: &mut RefreshState) -> RefreshUrl {
    let url = state.assign_next();
    state.tick_count += 1;
    if state.phase != RefresherPhase::Stopped {
        state.phase = RefresherPhase::Ticking;
    }
    tracing::debug!("Refresh tick {} for station '{}': {}", state.tick_count, state.station_id, url);
    url
}

/// Periodically repoints a display element at its station image.
pub struct Refresher {
    config: RefresherConfig,
    state: Arc<Mutex<RefreshState>>,
    timer: Option<ScheduleHandle>,
}

impl Refresher {
    /// Derive the station from the page address, resolve the element once
    /// and assign its first source.
    ///
    /// A missing element is not an error: the refresher keeps producing URLs
    /// and every assignment is a no-op.
    pub fn initialize(config: RefresherConfig, page: &dyn Page) -> Result<Self, RefreshError> {
        let cache_buster = for_strategy(config.cache_busting);
        Self::with_cache_buster(config, page, cache_buster)
    }

    pub fn with_cache_buster(
        config: RefresherConfig,
        page: &dyn Page,
        cache_buster: Box<dyn CacheBuster>,
    ) -> Result<Self, RefreshError> {
        config.validate()?;

        let station_id = StationId::from_address(page.address());
        if station_id.is_empty() {
            tracing::warn!(
                "Page address '{}' ends without a station segment, using an empty station id",
                page.address()
            );
        }

        let element = page.element_by_id(&config.element_id);
        if element.is_none() {
            tracing::warn!(
                "Display element '{}' not found, source assignments will have no effect",
                config.element_id
            );
        }

        let mut state = RefreshState {
            station_id,
            element,
            cache_buster,
            phase: RefresherPhase::Initialized,
            tick_count: 0,
            last_url: None,
            active_timer: None,
            timer_generation: 0,
        };
        let url = state.assign_next();
        tracing::info!(
            "Refresher initialized for station '{}' with source {}",
            state.station_id,
            url
        );

        Ok(Refresher {
            config,
            state: Arc::new(Mutex::new(state)),
            timer: None,
        })
    }

    pub fn station_id(&self) -> StationId {
        lock_state(&self.state).station_id.clone()
    }

    pub fn phase(&self) -> RefresherPhase {
        lock_state(&self.state).phase
    }

    pub fn tick_count(&self) -> u64 {
        lock_state(&self.state).tick_count
    }

    /// URL of the most recent assignment.
    pub fn current_url(&self) -> Option<RefreshUrl> {
        lock_state(&self.state).last_url.clone()
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Reassign the element's source right away, outside the timer.
    pub fn tick(&self) -> RefreshUrl {
        run_tick(&self.state)
    }

    /// Schedule a tick every configured interval on `scheduler`.
    pub fn start(&mut self, scheduler: &dyn Scheduler) -> Result<(), RefreshError> {
        if self.timer.is_some() {
            return Err(RefreshError::AlreadyRunning {
                station_id: self.station_id(),
            });
        }

        let generation = {
            let mut state = lock_state(&self.state);
            if state.phase == RefresherPhase::Stopped {
                state.phase = RefresherPhase::Ticking;
            }
            state.timer_generation += 1;
            state.active_timer = Some(state.timer_generation);
            state.timer_generation
        };

        let state = Arc::clone(&self.state);
        let handle = scheduler.schedule_repeating(
            self.config.refresh_interval(),
            Box::new(move || {
                run_scheduled_tick(&state, generation);
            }),
        );
        self.timer = Some(handle);

        tracing::info!(
            "Refreshing station '{}' every {:?}",
            self.station_id(),
            self.config.refresh_interval()
        );
        Ok(())
    }

    /// Cancel the timer. Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.timer.take() else {
            return false;
        };

        {
            // a firing already past the scheduler's cancel check sees this
            let mut state = lock_state(&self.state);
            state.active_timer = None;
            state.phase = RefresherPhase::Stopped;
            tracing::info!(
                "Stopped refreshing station '{}' after {} ticks",
                state.station_id,
                state.tick_count
            );
        }
        handle.cancel();
        true
    }

    pub fn snapshot(&self) -> RefresherSnapshot {
        let state = lock_state(&self.state);
        RefresherSnapshot {
            station_id: state.station_id.clone(),
            element_id: self.config.element_id.clone(),
            element_found: state.element.is_some(),
            phase: state.phase,
            running: self.timer.is_some(),
            tick_count: state.tick_count,
            current_source: state.last_url.as_ref().map(ToString::to_string),
            refresh_interval_ms: self.config.refresh_interval_ms,
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}
