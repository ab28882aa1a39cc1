//! Component timeouts.
//!
//! [`ComponentTimeoutManager`] keeps one tokio timer per component. An elapsed timer does
//! not run anything itself, it sends the component id on a channel consumed by the
//! timeout loop of [`ComponentsListener`](crate::core::listener::ComponentsListener),
//! which deletes the component and runs its timeout handler.

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Schedules expiration callbacks of components.
pub trait TimeoutManager: Send + Sync {
    /// Schedules the expiration of a component, replacing any previous schedule.
    fn schedule_timeout(&self, component_id: i32, expiration: DateTime<Utc>);

    /// Cancels the expiration of a component.
    ///
    /// With `throw_if_pending`, finding a timeout which already elapsed but was not
    /// processed yet is an internal error.
    fn remove_timeouts(&self, component_id: i32, throw_if_pending: bool) -> Result<()>;
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
    firing: bool,
}

#[derive(Default)]
struct Timers {
    next_generation: u64,
    timers: HashMap<i32, Timer>,
}

/// tokio based [`TimeoutManager`].
pub struct ComponentTimeoutManager {
    timers: Arc<Mutex<Timers>>,
    sender: mpsc::UnboundedSender<i32>,
}

impl ComponentTimeoutManager {
    /// Creates the manager and the receiver of elapsed component ids.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<i32>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let manager = Self {
            timers: Arc::new(Mutex::new(Timers::default())),
            sender,
        };
        (manager, receiver)
    }

    /// Whether a timeout is scheduled or elapsed but not processed.
    #[must_use]
    pub fn is_scheduled(&self, component_id: i32) -> bool {
        self.timers.lock().timers.contains_key(&component_id)
    }
}

impl TimeoutManager for ComponentTimeoutManager {
    fn schedule_timeout(&self, component_id: i32, expiration: DateTime<Utc>) {
        let delay = (expiration - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        trace!("Scheduling timeout of component {component_id} in {delay:?}");

        // The task cannot observe the map before its entry is inserted
        let mut timers = self.timers.lock();
        let generation = timers.next_generation;
        timers.next_generation += 1;

        let shared_timers = Arc::clone(&self.timers);
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut timers = shared_timers.lock();
                match timers.timers.get_mut(&component_id) {
                    Some(timer) if timer.generation == generation => timer.firing = true,
                    _ => return,
                }
            }

            if sender.send(component_id).is_err() {
                warn!("Timeout of component {component_id} elapsed but the timeout loop is stopped");
            }
        });

        if let Some(previous) = timers.timers.insert(
            component_id,
            Timer {
                generation,
                handle,
                firing: false,
            },
        ) {
            previous.handle.abort();
        }
    }

    fn remove_timeouts(&self, component_id: i32, throw_if_pending: bool) -> Result<()> {
        let Some(timer) = self.timers.lock().timers.remove(&component_id) else {
            return Ok(());
        };
        timer.handle.abort();

        if timer.firing && throw_if_pending {
            return Err(Error::internal(format!(
                "Timeout of component {component_id} already elapsed and is waiting to be processed"
            )));
        }
        Ok(())
    }
}
