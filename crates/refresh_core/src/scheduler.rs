//! Recurring timer abstraction.
//!
//! A [`Scheduler`] runs a task every `interval`, first firing one full
//! interval after scheduling, until the returned [`ScheduleHandle`] is
//! cancelled. [`VirtualScheduler`] drives tasks from a manual clock so a
//! caller can simulate exactly N ticks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub type Task = Box<dyn FnMut() + Send + 'static>;

pub trait Scheduler {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> ScheduleHandle;
}

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle leaves the task running; only [`cancel`](Self::cancel)
/// stops it.
pub struct ScheduleHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleHandle {
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        ScheduleHandle {
            cancelled,
            on_cancel: None,
        }
    }

    /// Run `hook` once when the handle is cancelled, e.g. to abort a task.
    pub fn with_cancel_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct VirtualTask {
    interval: Duration,
    next_due: Duration,
    cancelled: Arc<AtomicBool>,
    task: Arc<Mutex<Task>>,
}

#[derive(Default)]
struct VirtualClock {
    now: Duration,
    tasks: Vec<VirtualTask>,
}

/// Scheduler driven by [`advance`](Self::advance) instead of wall time.
#[derive(Clone, Default)]
pub struct VirtualScheduler {
    clock: Arc<Mutex<VirtualClock>>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .tasks
            .iter()
            .filter(|task| !task.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Move the clock forward by `by`, running every firing that falls due in
    /// order. Returns the number of task runs.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now + by;
        let mut fired = 0;

        loop {
            // The lock is released before running the task so it may call
            // back into the scheduler.
            let due = {
                let mut clock = self.lock();
                clock
                    .tasks
                    .retain(|task| !task.cancelled.load(Ordering::SeqCst));
                let next = clock
                    .tasks
                    .iter_mut()
                    .filter(|task| task.next_due <= target)
                    .min_by_key(|task| task.next_due)
                    .map(|task| {
                        let due_at = task.next_due;
                        task.next_due += task.interval;
                        (due_at, Arc::clone(&task.task))
                    });
                next.map(|(due_at, runnable)| {
                    clock.now = due_at;
                    runnable
                })
            };

            let Some(task) = due else {
                break;
            };
            let mut task = task.lock().unwrap_or_else(PoisonError::into_inner);
            (*task)();
            fired += 1;
        }

        self.lock().now = target;
        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> ScheduleHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut clock = self.lock();
        let next_due = clock.now + interval;
        clock.tasks.push(VirtualTask {
            interval,
            next_due,
            cancelled: Arc::clone(&cancelled),
            task: Arc::new(Mutex::new(task)),
        });
        ScheduleHandle::new(cancelled)
    }
}

impl fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_first_run_after_one_interval() {
        let scheduler = VirtualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _handle = scheduler.schedule_repeating(Duration::from_secs(30), counting_task(&counter));

        assert_eq!(scheduler.advance(Duration::from_secs(29)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(scheduler.advance(Duration::from_secs(1)), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.now(), Duration::from_secs(30));
    }

    #[test]
    fn test_advance_runs_every_due_firing() {
        let scheduler = VirtualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let _handle = scheduler.schedule_repeating(Duration::from_secs(30), counting_task(&counter));

        assert_eq!(scheduler.advance(Duration::from_secs(95)), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.now(), Duration::from_secs(95));

        // next firing is due at 120s
        assert_eq!(scheduler.advance(Duration::from_secs(5)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        assert_eq!(scheduler.advance(Duration::from_secs(20)), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.now(), Duration::from_secs(120));
    }

    #[test]
    fn test_cancel_stops_task() {
        let scheduler = VirtualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule_repeating(Duration::from_secs(10), counting_task(&counter));

        scheduler.advance(Duration::from_secs(20));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 1);

        handle.cancel();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(100)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_handle_keeps_task_running() {
        let scheduler = VirtualScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        drop(scheduler.schedule_repeating(Duration::from_secs(10), counting_task(&counter)));

        scheduler.advance(Duration::from_secs(30));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_hook_runs_once() {
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let hook_counter = Arc::clone(&hook_runs);
        let handle = ScheduleHandle::new(Arc::new(AtomicBool::new(false))).with_cancel_hook(
            move || {
                hook_counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert!(!handle.is_cancelled());
        handle.cancel();
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tasks_interleave_by_due_time() {
        let scheduler = VirtualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let fast_order = Arc::clone(&order);
        let _fast = scheduler.schedule_repeating(
            Duration::from_secs(10),
            Box::new(move || fast_order.lock().unwrap().push("fast")),
        );
        let slow_order = Arc::clone(&order);
        let _slow = scheduler.schedule_repeating(
            Duration::from_secs(25),
            Box::new(move || slow_order.lock().unwrap().push("slow")),
        );

        scheduler.advance(Duration::from_secs(30));
        assert_eq!(
            *order.lock().unwrap(),
            vec!["fast", "fast", "slow", "fast"]
        );
    }
}
