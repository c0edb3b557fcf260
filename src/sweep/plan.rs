//! Sub-band partitioning and visit order
//!
//! A sweep plan partitions the active frequency window into sub-bands sized
//! from the usable bandwidth per step, then hands them out one at a time in
//! the order the selected strategy dictates. The plan is pass-local state:
//! the scanner rebuilds it whenever geometry-affecting settings change.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Order in which sub-bands are visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStrategy {
    /// Pseudo-random permutation, regenerated each pass; every sub-band is
    /// visited exactly once per pass
    Stochastic,
    /// Ascending frequency order, wrapping after the last sub-band
    Progressive,
}

/// How the span is divided into sub-bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitioningMode {
    /// Overlapping sub-bands (half-bandwidth steps) smoothing the seams
    /// between stitched fragments
    Continuous,
    /// Disjoint sub-bands exactly tiling the span; the last one is truncated
    /// when the span is not an exact multiple
    Discrete,
}

/// One frequency slice visited during a sweep step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubBand {
    /// Lower bound in Hz
    pub lo: f64,
    /// Upper bound in Hz
    pub hi: f64,
}

impl SubBand {
    /// Center frequency the analyzer is tuned to for this slice
    pub fn center(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    /// Slice width in Hz
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

/// Partition `[lo, hi]` into sub-bands of at most `usable_bw` Hz
pub fn partition(lo: f64, hi: f64, usable_bw: f64, mode: PartitioningMode) -> Vec<SubBand> {
    let span = hi - lo;
    if span <= 0.0 || usable_bw <= 0.0 {
        return Vec::new();
    }
    if usable_bw >= span {
        return vec![SubBand { lo, hi }];
    }

    let mut bands = Vec::new();
    match mode {
        PartitioningMode::Discrete => {
            let count = (span / usable_bw).ceil() as usize;
            for i in 0..count {
                let band_lo = lo + i as f64 * usable_bw;
                let band_hi = (band_lo + usable_bw).min(hi);
                bands.push(SubBand {
                    lo: band_lo,
                    hi: band_hi,
                });
            }
        }
        PartitioningMode::Continuous => {
            // Half-bandwidth steps: adjacent sub-bands overlap by 50%
            let step = usable_bw / 2.0;
            let mut band_lo = lo;
            loop {
                if band_lo + usable_bw >= hi {
                    bands.push(SubBand {
                        lo: (hi - usable_bw).max(lo),
                        hi,
                    });
                    break;
                }
                bands.push(SubBand {
                    lo: band_lo,
                    hi: band_lo + usable_bw,
                });
                band_lo += step;
            }
        }
    }
    bands
}

/// Pass-local sweep schedule over a partitioned window
#[derive(Debug)]
pub struct SweepPlan {
    bands: Vec<SubBand>,
    order: Vec<usize>,
    cursor: usize,
    strategy: ScanStrategy,
}

impl SweepPlan {
    /// Build a plan over `[lo, hi]` with `usable_bw` Hz per step
    pub fn new(
        lo: f64,
        hi: f64,
        usable_bw: f64,
        strategy: ScanStrategy,
        partitioning: PartitioningMode,
    ) -> Self {
        let bands = partition(lo, hi, usable_bw, partitioning);
        let mut plan = Self {
            order: (0..bands.len()).collect(),
            bands,
            cursor: 0,
            strategy,
        };
        plan.begin_pass();
        plan
    }

    /// Number of sub-bands per pass
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Whether the plan has no sub-bands (degenerate window)
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// All sub-bands in ascending frequency order
    pub fn bands(&self) -> &[SubBand] {
        &self.bands
    }

    /// Hand out the next sub-band to visit
    ///
    /// Wraps to a fresh pass after the last sub-band; a stochastic plan
    /// reshuffles its permutation at each wrap.
    pub fn next(&mut self) -> Option<SubBand> {
        if self.bands.is_empty() {
            return None;
        }
        if self.cursor >= self.order.len() {
            self.begin_pass();
        }
        let band = self.bands[self.order[self.cursor]];
        self.cursor += 1;
        Some(band)
    }

    fn begin_pass(&mut self) {
        self.cursor = 0;
        if self.strategy == ScanStrategy::Stochastic {
            self.order.shuffle(&mut rand::thread_rng());
        }
    }
}
