//! Capability surface of the external capture engine ("the Analyzer")
//!
//! The core never talks to hardware directly. A running capture engine is
//! reached through the [`Analyzer`] trait and observed through a FIFO
//! [`AnalyzerMessage`] stream delivered on a `crossbeam-channel` receiver.
//! Construction goes through an [`AnalyzerFactory`], so both the capture
//! controller and the panoramic scanner can be driven against a simulated
//! engine in tests.
//!
//! Every imperative operation returns a `Result`; a failed operation never
//! rolls back settings already applied by earlier operations.

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::session::CaptureProfile;

/// Status code reported when the engine fails to initialize after start
pub const STATUS_INIT_FAILURE: i32 = -1;

/// Errors reported by individual Analyzer operations
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Operation not supported by this source: {0}")]
    NotSupported(String),

    #[error("Source does not allow seeking")]
    NotSeekable,

    #[error("Device error: {0}")]
    Device(String),

    #[error("Failed to construct analyzer: {0}")]
    Construction(String),
}

/// Acquisition mode requested at analyzer start
///
/// This core always runs analyzers in channel mode; wide-sweep acquisition is
/// built on top of channel-mode captures by the panoramic scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerMode {
    Channel,
}

/// Tunable acquisition parameters, echoed back by the engine after start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerRunParams {
    /// Acquisition mode
    pub mode: AnalyzerMode,
    /// FFT window length in bins
    pub window_size: u32,
    /// PSD frame production rate in Hz
    pub psd_rate: f32,
}

impl Default for AnalyzerRunParams {
    fn default() -> Self {
        Self {
            mode: AnalyzerMode::Channel,
            window_size: 4096,
            psd_rate: 25.0,
        }
    }
}

/// Permission set reported by a running engine
///
/// Governs which parameters may be hot-applied without tearing the analyzer
/// down. A parameter whose permission bit is unset must never be sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    pub can_set_antenna: bool,
    pub can_set_bandwidth: bool,
    pub can_set_frequency: bool,
    pub can_set_dc_remove: bool,
    pub seekable: bool,
}

impl SourceCapabilities {
    /// Capabilities of a typical live hardware source (everything tunable,
    /// not seekable)
    pub fn live() -> Self {
        Self {
            can_set_antenna: true,
            can_set_bandwidth: true,
            can_set_frequency: true,
            can_set_dc_remove: true,
            seekable: false,
        }
    }
}

/// One power-spectral-density snapshot for a single capture window
///
/// Bins are ordered by ascending frequency and cover
/// `center_freq ± sample_rate / 2`.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Center frequency of the capture window in Hz
    pub center_freq: f64,
    /// Sample rate of the capture in Hz (also the frame's spectral width)
    pub sample_rate: f64,
    /// Per-bin power magnitudes
    pub bins: Arc<[f32]>,
    /// Source time of the capture
    pub timestamp: DateTime<Utc>,
}

impl SpectrumFrame {
    /// Lowest frequency covered by this frame
    pub fn freq_min(&self) -> f64 {
        self.center_freq - self.sample_rate / 2.0
    }

    /// Highest frequency covered by this frame
    pub fn freq_max(&self) -> f64 {
        self.center_freq + self.sample_rate / 2.0
    }
}

/// Asynchronous messages produced by a running engine
///
/// Delivery is FIFO per analyzer instance. `Halted` is the completion signal
/// for [`Analyzer::halt`]; it is the last message an instance emits.
#[derive(Debug, Clone)]
pub enum AnalyzerMessage {
    /// One PSD snapshot
    Psd(SpectrumFrame),
    /// Permission set of the bound source (sent at start and on change)
    SourceInfo(SourceCapabilities),
    /// Free-form status report
    Status { code: i32, text: String },
    /// Echo of the effective run parameters
    Params(AnalyzerRunParams),
    /// The source ran out of data
    Eos,
    /// The source failed mid-capture
    ReadError,
    /// The engine finished halting
    Halted,
}

/// A running capture engine bound to one source
///
/// Exclusively owned by either the capture controller or the panoramic
/// scanner; ownership is released only after the `Halted` message arrives.
pub trait Analyzer: Send {
    /// Ask the engine to halt; completion arrives as [`AnalyzerMessage::Halted`]
    fn halt(&mut self);

    /// Seek the bound source to `target`
    fn seek(&mut self, target: DateTime<Utc>) -> Result<(), AnalyzerError>;

    /// Retune the center frequency, accounting for an LNB offset
    fn set_frequency(&mut self, freq: f64, lnb_offset: f64) -> Result<(), AnalyzerError>;

    /// Change the analog bandwidth
    fn set_bandwidth(&mut self, bandwidth: f64) -> Result<(), AnalyzerError>;

    /// Select an antenna by name
    fn set_antenna(&mut self, name: &str) -> Result<(), AnalyzerError>;

    /// Enable or disable DC removal
    fn set_dc_remove(&mut self, enabled: bool) -> Result<(), AnalyzerError>;

    /// Set one gain element by the name the device reports
    fn set_gain(&mut self, name: &str, value: f32) -> Result<(), AnalyzerError>;

    /// Permission set of the bound source
    fn source_info(&self) -> SourceCapabilities;

    /// Current source time, polled periodically by the controlling context
    fn source_timestamp(&self) -> DateTime<Utc>;
}

/// Constructor for capture engines
///
/// `start` either yields a fully running analyzer plus its message stream or
/// fails; it never partially starts.
pub trait AnalyzerFactory: Send + Sync {
    fn start(
        &self,
        params: &AnalyzerRunParams,
        profile: &CaptureProfile,
    ) -> Result<(Box<dyn Analyzer>, Receiver<AnalyzerMessage>), AnalyzerError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_frequency_bounds() {
        let frame = SpectrumFrame {
            center_freq: 100_000_000.0,
            sample_rate: 2_000_000.0,
            bins: vec![0.0; 16].into(),
            timestamp: Utc::now(),
        };

        assert_eq!(frame.freq_min(), 99_000_000.0);
        assert_eq!(frame.freq_max(), 101_000_000.0);
    }

    #[test]
    fn test_default_params_run_channel_mode() {
        let params = AnalyzerRunParams::default();
        assert_eq!(params.mode, AnalyzerMode::Channel);
    }

    #[test]
    fn test_live_capabilities_not_seekable() {
        let caps = SourceCapabilities::live();
        assert!(caps.can_set_frequency);
        assert!(!caps.seekable);
    }
}
