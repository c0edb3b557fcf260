//! Explicitly passed service context
//!
//! Device enumeration and the recent-error log live in a [`CoreContext`]
//! handed to the capture controller at construction and torn down with the
//! application; there is no hidden global state.

use std::sync::Arc;

use crate::discovery::DeviceFacade;
use crate::journal::LogJournal;
use crate::DEFAULT_MAX_SAMPLE_RATE;

/// Services shared by the control core
#[derive(Clone)]
pub struct CoreContext {
    devices: Arc<dyn DeviceFacade>,
    journal: LogJournal,
    max_sample_rate: u32,
}

impl CoreContext {
    /// Build a context over a device facade with default settings
    pub fn new(devices: Arc<dyn DeviceFacade>) -> Self {
        Self {
            devices,
            journal: LogJournal::new(),
            max_sample_rate: DEFAULT_MAX_SAMPLE_RATE,
        }
    }

    /// Override the maximum accepted decimated sample rate for real-time
    /// sources
    pub fn with_max_sample_rate(mut self, rate: u32) -> Self {
        self.max_sample_rate = rate;
        self
    }

    /// Device enumeration backend
    pub fn devices(&self) -> &Arc<dyn DeviceFacade> {
        &self.devices
    }

    /// Shared recent-error journal
    pub fn journal(&self) -> &LogJournal {
        &self.journal
    }

    /// Maximum accepted decimated sample rate for real-time sources
    pub fn max_sample_rate(&self) -> u32 {
        self.max_sample_rate
    }
}
