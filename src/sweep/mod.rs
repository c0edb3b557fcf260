//! Panoramic spectrum sweep
//!
//! A sweep covers a frequency span far wider than one capture window by
//! stepping a dedicated Analyzer across sub-bands and stitching the PSD
//! fragments into a single wide [`SpectrumView`]. The span is partitioned by
//! a [`SweepPlan`]; the [`Scanner`] worker paces the stepping, collects
//! frames and publishes immutable spectrum snapshots.

pub mod plan;
pub mod scanner;
pub mod view;

pub use plan::{PartitioningMode, ScanStrategy, SubBand, SweepPlan};
pub use scanner::{Scanner, ScannerConfig, ScannerEvent, ScannerStartError};
pub use view::SpectrumView;

/// Default fraction of the sample rate treated as usable per sweep step
pub const DEFAULT_RELATIVE_BW: f32 = 0.5;

/// Default round-trip-time budget between consecutive tuning steps
pub const DEFAULT_RTT_MS: u64 = 100;
