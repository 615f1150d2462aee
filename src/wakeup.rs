//! In-process wake-up runner — an [`AlarmScheduler`] for desktop builds
//! where no OS alarm service exists.
//!
//! A background thread holds the pending queue and sleeps until the next
//! due time, in bounded increments so shutdown stays responsive. Supports
//! graceful shutdown via `shutdown()` or automatic cleanup on `Drop`; store
//! the runner in app state so it is dropped when the shell exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::reminder::{AlarmScheduler, CapabilityError};

/// Upper bound on one wait; keeps shutdown responsive even without a wake.
const MAX_WAIT_MS: u64 = 5_000;

/// Invoked on the runner thread when an alarm comes due.
pub type WakeHandler = Box<dyn Fn(i64, &[u8]) + Send + Sync>;

struct PendingAlarm {
    id: i64,
    at_epoch_millis: i64,
    payload: Vec<u8>,
}

struct Shared {
    pending: Mutex<Vec<PendingAlarm>>,
    wake: Condvar,
    shutdown: AtomicBool,
}

/// Thread-backed alarm scheduler.
pub struct ThreadAlarms {
    shared: Arc<Shared>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ThreadAlarms {
    /// Spawn the runner thread. `handler` receives (id, payload) for each
    /// alarm that comes due and is invoked on the runner thread.
    pub fn start(handler: WakeHandler) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Vec::new()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let loop_shared = shared.clone();
        let handle = std::thread::spawn(move || run_loop(&loop_shared, handler));

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Request graceful shutdown. Pending alarms are discarded.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.wake.notify_all();
    }

    /// Number of alarms currently queued.
    pub fn pending_count(&self) -> usize {
        self.shared
            .pending
            .lock()
            .map(|pending| pending.len())
            .unwrap_or(0)
    }
}

impl AlarmScheduler for ThreadAlarms {
    fn schedule(
        &self,
        id: i64,
        at_epoch_millis: i64,
        payload: &[u8],
    ) -> Result<(), CapabilityError> {
        if let Ok(mut pending) = self.shared.pending.lock() {
            // Re-scheduling an id replaces its previous registration.
            pending.retain(|p| p.id != id);
            pending.push(PendingAlarm {
                id,
                at_epoch_millis,
                payload: payload.to_vec(),
            });
        }
        self.shared.wake.notify_all();
        Ok(())
    }

    fn cancel(&self, id: i64) {
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.retain(|p| p.id != id);
        }
        self.shared.wake.notify_all();
    }
}

impl Drop for ThreadAlarms {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(shared: &Shared, handler: WakeHandler) {
    tracing::info!("In-process alarm runner started");
    loop {
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
        let Ok(mut pending) = shared.pending.lock() else {
            break;
        };

        let now = Utc::now().timestamp_millis();
        if let Some(pos) = pending.iter().position(|p| p.at_epoch_millis <= now) {
            let alarm = pending.swap_remove(pos);
            drop(pending);
            tracing::debug!(id = alarm.id, "Alarm due, invoking handler");
            handler(alarm.id, &alarm.payload);
            continue;
        }

        let wait = pending
            .iter()
            .map(|p| p.at_epoch_millis - now)
            .min()
            .map(|ms| Duration::from_millis((ms.max(1) as u64).min(MAX_WAIT_MS)))
            .unwrap_or(Duration::from_millis(MAX_WAIT_MS));
        if shared.wake.wait_timeout(pending, wait).is_err() {
            break;
        }
    }
    tracing::info!("In-process alarm runner shut down");
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
