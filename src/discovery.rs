//! Device discovery off the controlling thread
//!
//! Hardware enumeration can stall for seconds on some backends, so it runs on
//! a dedicated worker started once per application lifetime. A discovery
//! request triggers enumeration followed by a bounded wait; completion is
//! delivered back exactly once per request, whether or not the device list
//! changed. A timeout is not an error - it simply means no change was
//! observed within the window.
//!
//! Only one request should be outstanding at a time; issuing a second one
//! before the first completes is a caller error (the worker will still answer
//! each trigger exactly once, in order).

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::DISCOVERY_TIMEOUT_MS;

/// Identity and capability record of one enumerated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Backend-specific device identifier (e.g. "rtlsdr", "airspy")
    pub driver: String,
    /// Human-readable device label
    pub label: String,
    /// Antenna names the device exposes
    pub antennas: Vec<String>,
    /// Gain element names the device exposes
    pub gains: Vec<String>,
}

impl DeviceDescriptor {
    /// Whether `name` is a gain element this device actually exposes
    pub fn has_gain(&self, name: &str) -> bool {
        self.gains.iter().any(|g| g == name)
    }
}

/// Outcome of one bounded device wait
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryOutcome {
    /// Whether the device list changed within the wait window
    pub changed: bool,
    /// Backend that reported the change, when one did
    pub backend: Option<String>,
}

/// Enumeration backend the worker drives
///
/// Implemented over the real enumeration machinery by the hosting
/// application; tests provide an in-memory implementation.
pub trait DeviceFacade: Send + Sync {
    /// Fire-and-forget trigger for a full enumeration pass
    fn discover_all(&self) -> anyhow::Result<()>;

    /// Block up to `timeout` waiting for the device list to settle
    fn wait_for_devices(&self, timeout: Duration) -> DiscoveryOutcome;

    /// Devices known from the last completed enumeration
    fn devices(&self) -> Vec<DeviceDescriptor>;
}

/// Completion notification for one discovery request
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Done(DiscoveryOutcome),
}

/// Long-lived worker thread servicing discovery requests
///
/// Torn down by dropping the worker: the trigger channel closes, the thread
/// drains and exits, and drop joins it.
pub struct DiscoveryWorker {
    trigger_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DiscoveryWorker {
    /// Spawn the worker over `facade`, returning it with its event stream
    pub fn spawn(facade: Arc<dyn DeviceFacade>) -> (Self, Receiver<DiscoveryEvent>) {
        let (trigger_tx, trigger_rx) = unbounded::<()>();
        let (event_tx, event_rx) = unbounded::<DiscoveryEvent>();

        let handle = thread::Builder::new()
            .name("device-discovery".to_string())
            .spawn(move || {
                for () in trigger_rx.iter() {
                    if let Err(e) = facade.discover_all() {
                        tracing::warn!("Device enumeration trigger failed: {e}");
                    }

                    let outcome =
                        facade.wait_for_devices(Duration::from_millis(DISCOVERY_TIMEOUT_MS));
                    if outcome.changed {
                        tracing::info!(
                            "{}: changes in the device list",
                            outcome.backend.as_deref().unwrap_or("unknown")
                        );
                    }

                    if event_tx.send(DiscoveryEvent::Done(outcome)).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn discovery thread");

        (
            Self {
                trigger_tx: Some(trigger_tx),
                handle: Some(handle),
            },
            event_rx,
        )
    }

    /// Request one enumeration pass
    ///
    /// Completion arrives as a single [`DiscoveryEvent::Done`] on the event
    /// stream, after at most [`DISCOVERY_TIMEOUT_MS`].
    pub fn request_discovery(&self) {
        if let Some(tx) = &self.trigger_tx {
            let _ = tx.send(());
        }
    }
}

impl Drop for DiscoveryWorker {
    fn drop(&mut self) {
        // Closing the trigger channel signals the thread to stop
        self.trigger_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
