//! Change signal — the subscription channel screens refresh through.
//!
//! The UI holds immutable snapshots and re-queries when an event arrives;
//! it never reaches into the store directly.

use std::sync::Mutex;

use chrono::NaiveDate;
use serde::Serialize;

/// What changed. Coarse-grained on purpose: subscribers re-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeEvent {
    DosesChanged,
    LedgerChanged { date: NaiveDate },
    SettingsChanged,
    ProfileChanged,
}

type Listener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Fan-out of [`ChangeEvent`]s to registered listeners.
pub struct ChangeNotifier {
    listeners: Mutex<Vec<Listener>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for the lifetime of the notifier.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(Box::new(listener));
        }
    }

    /// Deliver an event to every listener, in subscription order.
    pub fn emit(&self, event: &ChangeEvent) {
        tracing::debug!(?event, "Emitting change event");
        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(event);
            }
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
