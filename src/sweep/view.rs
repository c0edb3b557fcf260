//! Assembled wide-spectrum snapshot
//!
//! The view is a fixed-resolution power buffer spanning the absolute sweep
//! range. Each sweep step overwrites the frequency-indexed slice its PSD
//! frame covers, so after one full pass the buffer holds a gapless spectrum
//! of the whole span. The scanner is the only writer; readers only ever see
//! immutable `Arc` snapshots taken after a completed write.

use crate::analyzer::SpectrumFrame;
use crate::SPECTRUM_SIZE;

/// Wide-spectrum buffer over `[freq_min, freq_max]`
#[derive(Debug, Clone)]
pub struct SpectrumView {
    freq_min: f64,
    freq_max: f64,
    psd: Vec<f32>,
}

impl SpectrumView {
    /// Create a zeroed view over `[freq_min, freq_max]`
    ///
    /// The range must be non-empty; the scanner validates it at start.
    pub fn new(freq_min: f64, freq_max: f64) -> Self {
        debug_assert!(freq_min < freq_max);
        Self {
            freq_min,
            freq_max,
            psd: vec![0.0; SPECTRUM_SIZE],
        }
    }

    /// Lower bound of the covered span in Hz
    pub fn freq_min(&self) -> f64 {
        self.freq_min
    }

    /// Upper bound of the covered span in Hz
    pub fn freq_max(&self) -> f64 {
        self.freq_max
    }

    /// Power samples ordered by ascending frequency
    pub fn samples(&self) -> &[f32] {
        &self.psd
    }

    /// Number of samples in the buffer
    pub fn sample_count(&self) -> usize {
        self.psd.len()
    }

    /// Width of one view bin in Hz
    pub fn bin_width(&self) -> f64 {
        (self.freq_max - self.freq_min) / self.psd.len() as f64
    }

    /// Center frequency of bin `index`
    pub fn bin_frequency(&self, index: usize) -> f64 {
        self.freq_min + (index as f64 + 0.5) * self.bin_width()
    }

    /// Overwrite the slice covered by `[usable_lo, usable_hi]` from `frame`
    ///
    /// Only the usable portion of the frame is stitched in; the rest of the
    /// frame (filter skirts outside the relative bandwidth) is ignored. Each
    /// view bin takes the nearest frame bin. Returns the frequency range
    /// actually touched, or `None` when the frame does not overlap the view.
    pub fn write_frame(
        &mut self,
        frame: &SpectrumFrame,
        usable_lo: f64,
        usable_hi: f64,
    ) -> Option<(f64, f64)> {
        if frame.bins.is_empty() {
            return None;
        }

        let lo = usable_lo.max(self.freq_min);
        let hi = usable_hi.min(self.freq_max);
        if lo >= hi {
            return None;
        }

        let bin_w = self.bin_width();
        let first = ((lo - self.freq_min) / bin_w).floor() as usize;
        let last = (((hi - self.freq_min) / bin_w).ceil() as usize).min(self.psd.len());

        let frame_lo = frame.freq_min();
        let frame_bin_count = frame.bins.len();
        for i in first..last {
            let f = self.bin_frequency(i);
            if f < lo || f > hi {
                continue;
            }
            let pos = (f - frame_lo) / frame.sample_rate * frame_bin_count as f64;
            let idx = (pos.floor() as usize).min(frame_bin_count - 1);
            self.psd[i] = frame.bins[idx];
        }

        Some((lo, hi))
    }
}
