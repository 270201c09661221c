//! [`Watchdog`] – component heartbeat monitor.
//!
//! Every component worker publishes a heartbeat on the event bus.  The
//! supervisor feeds those into [`Watchdog::heartbeat`]; a component is known
//! from its first heartbeat onward and is considered *stalled* once its last
//! heartbeat is older than the timeout.
//!
//! [`Watchdog::take_new_stalls`] reports each stall once; the next heartbeat
//! from that component re-arms it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

struct ComponentEntry {
    last_heartbeat: Instant,
    reported: bool,
}

/// Tracks heartbeats and detects stalled components.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kinesis_safety::watchdog::Watchdog;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut wd = Watchdog::new(Duration::from_secs(3));
/// wd.heartbeat("sensor_hub");
///
/// assert!(wd.check_all().is_empty());
/// assert_eq!(wd.components(), vec!["sensor_hub".to_string()]);
/// # }
/// ```
pub struct Watchdog {
    components: HashMap<String, ComponentEntry>,
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            components: HashMap::new(),
            timeout,
        }
    }

    /// Record a heartbeat, registering the component if it is new.
    ///
    /// Returns `true` when this heartbeat ends a stall that was already
    /// reported.
    pub fn heartbeat(&mut self, component_id: &str) -> bool {
        match self.components.get_mut(component_id) {
            Some(entry) => {
                entry.last_heartbeat = Instant::now();
                std::mem::replace(&mut entry.reported, false)
            }
            None => {
                self.components.insert(
                    component_id.to_string(),
                    ComponentEntry {
                        last_heartbeat: Instant::now(),
                        reported: false,
                    },
                );
                false
            }
        }
    }

    /// Every stalled component, sorted.
    pub fn check_all(&self) -> Vec<String> {
        let mut stalled: Vec<String> = self
            .components
            .iter()
            .filter(|(_, entry)| entry.last_heartbeat.elapsed() > self.timeout)
            .map(|(id, _)| id.clone())
            .collect();
        stalled.sort();
        stalled
    }

    /// Stalled components not reported since their last heartbeat, sorted.
    /// Marks them reported.
    pub fn take_new_stalls(&mut self) -> Vec<String> {
        let mut stalled = Vec::new();
        for (id, entry) in &mut self.components {
            if !entry.reported && entry.last_heartbeat.elapsed() > self.timeout {
                entry.reported = true;
                stalled.push(id.clone());
            }
        }
        stalled.sort();
        stalled
    }

    /// Every component seen so far, sorted.
    pub fn components(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.components.keys().cloned().collect();
        ids.sort();
        ids
    }
}
