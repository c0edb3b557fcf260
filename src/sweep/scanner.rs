//! Panoramic scanner worker
//!
//! The scanner owns a second, dedicated Analyzer and steps it across the
//! sub-bands of the active sweep window: retune, wait for the next matching
//! PSD frame, stitch it into the wide spectrum, publish a snapshot. Stepping
//! is paced so consecutive tuning commands are never issued closer together
//! than the round-trip-time budget.
//!
//! All runtime controls travel over a control channel and take effect at the
//! next scheduling decision; none of them restarts the sweep. `stop()` makes
//! the scanner inert and halts the Analyzer without blocking on an in-flight
//! step. Published spectrum snapshots are immutable `Arc`s, so a consumer may
//! keep reading the last one long after the scanner is gone.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::analyzer::{
    Analyzer, AnalyzerFactory, AnalyzerMessage, AnalyzerRunParams, SpectrumFrame,
};
use crate::context::CoreContext;
use crate::discovery::DeviceDescriptor;
use crate::journal::LogJournal;
use crate::session::{CaptureProfile, SourceKind};
use crate::sweep::plan::{PartitioningMode, ScanStrategy, SweepPlan};
use crate::sweep::view::SpectrumView;
use crate::sweep::{DEFAULT_RELATIVE_BW, DEFAULT_RTT_MS};
use crate::LOG_TAIL_LINES;

/// Configuration for one sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Absolute lower sweep bound in Hz
    pub freq_min: f64,
    /// Absolute upper sweep bound in Hz
    pub freq_max: f64,
    /// Initial zoom sub-range lower bound in Hz
    pub zoom_min: f64,
    /// Initial zoom sub-range upper bound in Hz
    pub zoom_max: f64,
    /// Stay within the zoom range instead of hopping over the full span
    pub no_hop: bool,
    /// Device the dedicated analyzer binds to
    pub device: DeviceDescriptor,
    /// Antenna to select
    pub antenna: String,
    /// Capture sample rate in Hz
    pub sample_rate: f64,
    /// LNB local-oscillator offset in Hz
    pub lnb_offset: f64,
    /// Initial per-gain-element values
    pub gains: BTreeMap<String, f32>,
    /// Fraction of the sample rate treated as usable per step
    pub relative_bw: f32,
    /// Minimum spacing between consecutive tuning commands in ms
    pub rtt_ms: u64,
    /// Sub-band visit order
    pub strategy: ScanStrategy,
    /// Span partitioning mode
    pub partitioning: PartitioningMode,
}

impl ScannerConfig {
    /// Configuration over `[freq_min, freq_max]` with library defaults
    pub fn new(freq_min: f64, freq_max: f64, device: DeviceDescriptor, sample_rate: f64) -> Self {
        Self {
            freq_min,
            freq_max,
            zoom_min: freq_min,
            zoom_max: freq_max,
            no_hop: false,
            device,
            antenna: String::new(),
            sample_rate,
            lnb_offset: 0.0,
            gains: BTreeMap::new(),
            relative_bw: DEFAULT_RELATIVE_BW,
            rtt_ms: DEFAULT_RTT_MS,
            strategy: ScanStrategy::Progressive,
            partitioning: PartitioningMode::Discrete,
        }
    }
}

/// Failures starting a sweep
#[derive(Error, Debug)]
pub enum ScannerStartError {
    #[error("Invalid sweep range")]
    InvalidRange,

    #[error("Invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start sweep analyzer:\n{log}")]
    Construction { log: String },
}

/// Notifications published by the scanner
#[derive(Debug, Clone)]
pub enum ScannerEvent {
    /// A sweep step completed; `view` is the full current buffer and
    /// `[touched_min, touched_max]` the range this step overwrote
    Spectrum {
        view: Arc<SpectrumView>,
        touched_min: f64,
        touched_max: f64,
    },
    /// The scanner became inert; `log` carries recent error text when the
    /// stop was caused by a failure
    Stopped { log: String },
}

/// Runtime controls, applied at the worker's next scheduling decision
enum Ctl {
    SetRelativeBw(f32),
    SetRttMs(u64),
    SetStrategy(ScanStrategy),
    SetPartitioning(PartitioningMode),
    SetGain(String, f32),
    SetViewRange { min: f64, max: f64, no_hop: bool },
    Reset,
    Stop,
}

/// Handle to a running panoramic sweep
///
/// Dropping the handle stops the worker and joins it; spectrum snapshots
/// already handed out stay valid.
pub struct Scanner {
    ctl_tx: Sender<Ctl>,
    latest: Arc<Mutex<Arc<SpectrumView>>>,
    running: Arc<AtomicBool>,
    device: DeviceDescriptor,
    sample_rate: f64,
    handle: Option<JoinHandle<()>>,
}

impl Scanner {
    /// Construct the dedicated analyzer and start sweeping
    ///
    /// On failure the scanner is absent and the error carries recent log
    /// lines. The initial center frequency is the midpoint of the zoom
    /// range; DC removal is enabled; RTL-SDR devices get a shortened stream
    /// buffer so per-step latency does not bottleneck the sweep.
    pub fn start(
        ctx: &CoreContext,
        factory: Arc<dyn AnalyzerFactory>,
        config: ScannerConfig,
    ) -> Result<(Self, Receiver<ScannerEvent>), ScannerStartError> {
        if !(config.freq_min < config.freq_max) {
            return Err(ScannerStartError::InvalidRange);
        }
        if !(config.sample_rate > 0.0) {
            return Err(ScannerStartError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }

        let (zoom_min, zoom_max) = clamp_zoom(&config);

        let mut profile = CaptureProfile {
            label: format!("Panoramic sweep ({})", config.device.label),
            device: config.device.driver.clone(),
            kind: SourceKind::RealTime,
            sample_rate: config.sample_rate as u32,
            bandwidth: config.sample_rate,
            frequency: 0.5 * (zoom_min + zoom_max),
            lnb_offset: config.lnb_offset,
            antenna: config.antenna.clone(),
            dc_remove: true,
            ..Default::default()
        };

        // The default RTL-SDR buffer adds ~40 ms between chunks; a shorter
        // one keeps the retune-to-frame latency down
        if config.device.driver == "rtlsdr" {
            profile.set_param("stream:bufflen", "16384");
        }

        let journal = ctx.journal().clone();
        journal.flush();

        let (mut analyzer, messages) = factory
            .start(&AnalyzerRunParams::default(), &profile)
            .map_err(|e| {
                journal.record(e.to_string());
                ScannerStartError::Construction {
                    log: journal.tail(LOG_TAIL_LINES),
                }
            })?;

        for (name, value) in &config.gains {
            if !config.device.has_gain(name) {
                tracing::warn!("Ignoring gain element {name} not exposed by the device");
                continue;
            }
            if let Err(e) = analyzer.set_gain(name, *value) {
                journal.record(format!("Failed to set gain {name}: {e}"));
            }
        }

        let latest = Arc::new(Mutex::new(Arc::new(SpectrumView::new(
            config.freq_min,
            config.freq_max,
        ))));
        let running = Arc::new(AtomicBool::new(true));
        let (ctl_tx, ctl_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let worker = Worker {
            analyzer,
            messages,
            ctl: ctl_rx,
            events: event_tx,
            journal,
            view: SpectrumView::new(config.freq_min, config.freq_max),
            latest: Arc::clone(&latest),
            running: Arc::clone(&running),
            freq_min: config.freq_min,
            freq_max: config.freq_max,
            zoom_min,
            zoom_max,
            no_hop: config.no_hop,
            lnb_offset: config.lnb_offset,
            sample_rate: config.sample_rate,
            relative_bw: config.relative_bw.clamp(0.05, 1.0),
            rtt: Duration::from_millis(config.rtt_ms),
            strategy: config.strategy,
            partitioning: config.partitioning,
            plan: SweepPlan::new(0.0, 0.0, 0.0, config.strategy, config.partitioning),
            plan_dirty: true,
            last_tune: None,
        };

        let handle = thread::Builder::new()
            .name("panoramic-sweep".to_string())
            .spawn(move || worker.run())
            .map_err(|e| ScannerStartError::InvalidConfig(e.to_string()))?;

        tracing::info!(
            "Panoramic sweep started: {:.0}-{:.0} Hz on {}",
            config.freq_min,
            config.freq_max,
            config.device.label
        );

        Ok((
            Self {
                ctl_tx,
                latest,
                running,
                device: config.device,
                sample_rate: config.sample_rate,
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    /// Latest published spectrum snapshot
    pub fn spectrum(&self) -> Arc<SpectrumView> {
        match self.latest.lock() {
            Ok(latest) => Arc::clone(&latest),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Sample rate of the dedicated analyzer
    ///
    /// Also the narrowest bandwidth one sweep step can resolve.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Whether the worker is still sweeping
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Change the usable fraction of the sample rate per step
    pub fn set_relative_bw(&self, relative_bw: f32) {
        let _ = self.ctl_tx.send(Ctl::SetRelativeBw(relative_bw));
    }

    /// Change the round-trip-time budget between tuning commands
    pub fn set_rtt_ms(&self, rtt_ms: u64) {
        let _ = self.ctl_tx.send(Ctl::SetRttMs(rtt_ms));
    }

    /// Change the sub-band visit order
    pub fn set_strategy(&self, strategy: ScanStrategy) {
        let _ = self.ctl_tx.send(Ctl::SetStrategy(strategy));
    }

    /// Change the span partitioning mode
    pub fn set_partitioning(&self, partitioning: PartitioningMode) {
        let _ = self.ctl_tx.send(Ctl::SetPartitioning(partitioning));
    }

    /// Set one gain element by the name the device reports
    ///
    /// Names the device does not expose are ignored.
    pub fn set_gain(&self, name: &str, value: f32) {
        if !self.device.has_gain(name) {
            tracing::warn!("Ignoring gain element {name} not exposed by the device");
            return;
        }
        let _ = self.ctl_tx.send(Ctl::SetGain(name.to_string(), value));
    }

    /// Update the active sweep window
    ///
    /// With `no_hop` set the sweep stays within `[min, max]`; otherwise the
    /// full configured span is swept. Spectrum content already collected
    /// outside the new window is kept.
    pub fn set_view_range(&self, min: f64, max: f64, no_hop: bool) {
        let _ = self.ctl_tx.send(Ctl::SetViewRange { min, max, no_hop });
    }

    /// Force recomputation of the sweep geometry
    ///
    /// Rebuilds the partitioning and the visit permutation and restarts the
    /// current pass; collected spectrum content is kept.
    pub fn reset(&self) {
        let _ = self.ctl_tx.send(Ctl::Reset);
    }

    /// Stop sweeping and halt the dedicated analyzer
    ///
    /// Returns immediately; the worker winds down on its own and publishes a
    /// final [`ScannerEvent::Stopped`]. Snapshots already delivered remain
    /// readable.
    pub fn stop(&self) {
        let _ = self.ctl_tx.send(Ctl::Stop);
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        let _ = self.ctl_tx.send(Ctl::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn clamp_zoom(config: &ScannerConfig) -> (f64, f64) {
    let lo = config.zoom_min.clamp(config.freq_min, config.freq_max);
    let hi = config.zoom_max.clamp(config.freq_min, config.freq_max);
    if lo < hi {
        (lo, hi)
    } else {
        (config.freq_min, config.freq_max)
    }
}

/// Outcome of waiting for one sweep step's PSD frame
enum StepWait {
    Frame(SpectrumFrame),
    Stop,
}

struct Worker {
    analyzer: Box<dyn Analyzer>,
    messages: Receiver<AnalyzerMessage>,
    ctl: Receiver<Ctl>,
    events: Sender<ScannerEvent>,
    journal: LogJournal,
    view: SpectrumView,
    latest: Arc<Mutex<Arc<SpectrumView>>>,
    running: Arc<AtomicBool>,
    freq_min: f64,
    freq_max: f64,
    zoom_min: f64,
    zoom_max: f64,
    no_hop: bool,
    lnb_offset: f64,
    sample_rate: f64,
    relative_bw: f32,
    rtt: Duration,
    strategy: ScanStrategy,
    partitioning: PartitioningMode,
    plan: SweepPlan,
    plan_dirty: bool,
    last_tune: Option<Instant>,
}

impl Worker {
    fn run(mut self) {
        loop {
            // Scheduling decision: settings changed since the last step
            // apply here
            loop {
                match self.ctl.try_recv() {
                    Ok(ctl) => {
                        if !self.apply_ctl(ctl) {
                            return self.finish();
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return self.finish(),
                }
            }

            if self.plan_dirty {
                self.rebuild_plan();
            }

            let Some(band) = self.plan.next() else {
                // Degenerate window; wait for a control change
                match self.ctl.recv_timeout(Duration::from_millis(100)) {
                    Ok(ctl) => {
                        if !self.apply_ctl(ctl) {
                            return self.finish();
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return self.finish(),
                }
                continue;
            };

            if !self.pace() {
                return self.finish();
            }

            let center = band.center();
            if let Err(e) = self.analyzer.set_frequency(center, self.lnb_offset) {
                self.journal.record(format!("Retune to {center:.0} Hz failed: {e}"));
                self.last_tune = Some(Instant::now());
                continue;
            }
            self.last_tune = Some(Instant::now());

            match self.await_frame(center) {
                StepWait::Frame(frame) => self.stitch(&frame),
                StepWait::Stop => return self.finish(),
            }
        }
    }

    /// Hold off until the RTT budget since the previous retune has elapsed,
    /// staying responsive to controls
    fn pace(&mut self) -> bool {
        let Some(prev) = self.last_tune else {
            return true;
        };
        loop {
            let elapsed = prev.elapsed();
            if elapsed >= self.rtt {
                return true;
            }
            match self.ctl.recv_timeout(self.rtt - elapsed) {
                Ok(ctl) => {
                    if !self.apply_ctl(ctl) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return true,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Wait for the PSD frame matching the commanded center frequency
    fn await_frame(&mut self, center: f64) -> StepWait {
        loop {
            crossbeam_channel::select! {
                recv(self.messages) -> msg => match msg {
                    Ok(AnalyzerMessage::Psd(frame)) => {
                        // Frames captured before the retune settled carry the
                        // old center; skip them
                        let tolerance =
                            frame.sample_rate / frame.bins.len().max(1) as f64;
                        if (frame.center_freq - center).abs() <= tolerance {
                            return StepWait::Frame(frame);
                        }
                    }
                    Ok(AnalyzerMessage::Eos) => {
                        self.journal.record("Sweep source reported end of stream");
                        return StepWait::Stop;
                    }
                    Ok(AnalyzerMessage::ReadError) => {
                        self.journal.record("Sweep source read error");
                        return StepWait::Stop;
                    }
                    Ok(AnalyzerMessage::Halted) => return StepWait::Stop,
                    Ok(_) => {}
                    Err(_) => return StepWait::Stop,
                },
                recv(self.ctl) -> ctl => match ctl {
                    Ok(ctl) => {
                        if !self.apply_ctl(ctl) {
                            return StepWait::Stop;
                        }
                    }
                    Err(_) => return StepWait::Stop,
                },
            }
        }
    }

    /// Write one frame's usable slice and publish a snapshot
    fn stitch(&mut self, frame: &SpectrumFrame) {
        let usable = self.relative_bw as f64 * frame.sample_rate;
        let usable_lo = frame.center_freq - usable / 2.0;
        let usable_hi = frame.center_freq + usable / 2.0;

        let Some((touched_min, touched_max)) = self.view.write_frame(frame, usable_lo, usable_hi)
        else {
            return;
        };

        let snapshot = Arc::new(self.view.clone());
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Arc::clone(&snapshot);
        }
        let _ = self.events.send(ScannerEvent::Spectrum {
            view: snapshot,
            touched_min,
            touched_max,
        });
    }

    /// Apply one control message; false means stop
    fn apply_ctl(&mut self, ctl: Ctl) -> bool {
        match ctl {
            Ctl::SetRelativeBw(relative_bw) => {
                self.relative_bw = relative_bw.clamp(0.05, 1.0);
                self.plan_dirty = true;
            }
            Ctl::SetRttMs(rtt_ms) => self.rtt = Duration::from_millis(rtt_ms),
            Ctl::SetStrategy(strategy) => {
                self.strategy = strategy;
                self.plan_dirty = true;
            }
            Ctl::SetPartitioning(partitioning) => {
                self.partitioning = partitioning;
                self.plan_dirty = true;
            }
            Ctl::SetGain(name, value) => {
                if let Err(e) = self.analyzer.set_gain(&name, value) {
                    self.journal.record(format!("Failed to set gain {name}: {e}"));
                }
            }
            Ctl::SetViewRange { min, max, no_hop } => {
                let lo = min.clamp(self.freq_min, self.freq_max);
                let hi = max.clamp(self.freq_min, self.freq_max);
                if lo < hi {
                    self.zoom_min = lo;
                    self.zoom_max = hi;
                }
                self.no_hop = no_hop;
                self.plan_dirty = true;
            }
            Ctl::Reset => self.plan_dirty = true,
            Ctl::Stop => return false,
        }
        true
    }

    fn rebuild_plan(&mut self) {
        let (lo, hi) = if self.no_hop {
            (self.zoom_min, self.zoom_max)
        } else {
            (self.freq_min, self.freq_max)
        };
        let usable = self.relative_bw as f64 * self.sample_rate;
        self.plan = SweepPlan::new(lo, hi, usable, self.strategy, self.partitioning);
        self.plan_dirty = false;
        tracing::debug!(
            "Sweep plan rebuilt: {} sub-bands over {:.0}-{:.0} Hz",
            self.plan.len(),
            lo,
            hi
        );
    }

    /// Halt the analyzer, mark the scanner inert and publish the final event
    fn finish(mut self) {
        self.analyzer.halt();
        self.running.store(false, Ordering::Relaxed);
        let _ = self.events.send(ScannerEvent::Stopped {
            log: self.journal.tail(LOG_TAIL_LINES),
        });
        tracing::info!("Panoramic sweep stopped");
    }
}
