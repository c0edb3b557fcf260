//! Pansweep - capture session control and panoramic sweep core
//!
//! This library is the control core of an SDR frontend. It owns two
//! independent pieces of machinery:
//!
//! - a [`CaptureController`](session::CaptureController) driving the lifecycle
//!   of one live capture session (an external "Analyzer" engine reached
//!   through the [`analyzer::Analyzer`] trait), and
//! - a [`Scanner`](sweep::Scanner) sweeping a frequency span wider than one
//!   capture window by stepping a second, dedicated Analyzer across sub-bands
//!   and stitching the resulting PSD fragments into one wide spectrum.
//!
//! Device enumeration runs on its own worker ([`discovery::DiscoveryWorker`])
//! so the controlling thread never blocks on hardware probing. All outward
//! notifications are typed `crossbeam-channel` streams; nothing in this crate
//! renders, demodulates or persists anything.

pub mod analyzer;
pub mod context;
pub mod discovery;
pub mod journal;
pub mod session;
pub mod sweep;

pub use analyzer::{Analyzer, AnalyzerFactory, AnalyzerMessage, SpectrumFrame};
pub use context::CoreContext;
pub use discovery::{DeviceDescriptor, DeviceFacade, DiscoveryEvent, DiscoveryWorker};
pub use journal::LogJournal;
pub use session::{CaptureController, CaptureProfile, CaptureState, SessionEvent};
pub use sweep::{PartitioningMode, ScanStrategy, Scanner, ScannerConfig, ScannerEvent, SpectrumView};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Highest decimated sample rate accepted for real-time sources without
/// offering the user a decimation factor first
pub const DEFAULT_MAX_SAMPLE_RATE: u32 = 20_000_000;

/// Number of bins in the assembled panoramic spectrum
pub const SPECTRUM_SIZE: usize = 8192;

/// Bounded wait applied to each device discovery request
pub const DISCOVERY_TIMEOUT_MS: u64 = 5000;

/// Default number of trailing journal lines attached to failure notifications
pub const LOG_TAIL_LINES: usize = 10;
