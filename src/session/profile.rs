//! Capture profiles
//!
//! A profile describes everything needed to bind an Analyzer to a source:
//! device, rates, tuning, antenna and free-form device parameters. Profiles
//! are supplied from outside (settings UI, persisted config) and mutated only
//! through the capture controller's apply operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of source a profile binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Live hardware source producing samples in real time
    RealTime,
    /// Pre-recorded capture replayed from storage
    Replay,
}

/// Description of one capture source
///
/// A label of `""` means no source has been selected yet; the controller
/// refuses to start such a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureProfile {
    /// Human-readable profile label
    pub label: String,
    /// Device specifier (backend driver string, e.g. "rtlsdr")
    pub device: String,
    /// Live hardware or replay
    pub kind: SourceKind,
    /// Raw sample rate in Hz
    pub sample_rate: u32,
    /// Decimation factor applied by the engine (1 = none)
    pub decimation: u32,
    /// Analog bandwidth in Hz
    pub bandwidth: f64,
    /// Center frequency in Hz
    pub frequency: f64,
    /// LNB local-oscillator offset in Hz
    pub lnb_offset: f64,
    /// Selected antenna name
    pub antenna: String,
    /// Whether the engine should remove the DC spike
    pub dc_remove: bool,
    /// Free-form device parameters forwarded verbatim to the backend
    pub params: BTreeMap<String, String>,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            label: String::new(),
            device: String::new(),
            kind: SourceKind::RealTime,
            sample_rate: 0,
            decimation: 1,
            bandwidth: 0.0,
            frequency: 0.0,
            lnb_offset: 0.0,
            antenna: String::new(),
            dc_remove: false,
            params: BTreeMap::new(),
        }
    }
}

impl CaptureProfile {
    /// Whether a source has been selected
    pub fn has_source(&self) -> bool {
        !self.label.is_empty()
    }

    /// Whether the profile binds a live hardware source
    pub fn is_real_time(&self) -> bool {
        self.kind == SourceKind::RealTime
    }

    /// Effective sample rate after decimation
    pub fn decimated_sample_rate(&self) -> u32 {
        self.sample_rate / self.decimation.max(1)
    }

    /// Set one free-form device parameter
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_label_means_no_source() {
        let profile = CaptureProfile::default();
        assert!(!profile.has_source());

        let named = CaptureProfile {
            label: "RTL-SDR @ 100 MHz".to_string(),
            ..Default::default()
        };
        assert!(named.has_source());
    }

    #[test]
    fn test_decimated_sample_rate() {
        let mut profile = CaptureProfile {
            sample_rate: 6_000_000,
            decimation: 3,
            ..Default::default()
        };
        assert_eq!(profile.decimated_sample_rate(), 2_000_000);

        // Decimation 0 is treated as 1
        profile.decimation = 0;
        assert_eq!(profile.decimated_sample_rate(), 6_000_000);
    }

    #[test]
    fn test_device_params() {
        let mut profile = CaptureProfile::default();
        profile.set_param("stream:bufflen", "16384");
        assert_eq!(
            profile.params.get("stream:bufflen").map(String::as_str),
            Some("16384")
        );
    }
}
