//! Capture session state machine
//!
//! The controller owns at most one live Analyzer. All mutation funnels
//! through the controlling context: commands from outside and completion
//! notifications drained via [`CaptureController::poll_messages`], so the
//! state and the analyzer slot are never touched from two places at once.
//!
//! Transition table:
//!
//! ```text
//! Halted --start--> Running --stop--> Halting --halted--> Halted
//!                   Running --restart--> Restarting --halted--> (start) Running
//!                   Running --eos/read_error--> ordered halt --> Halted
//! ```
//!
//! The analyzer slot is populated iff the state is Running, Halting or
//! Restarting; ownership is released only on the transition into Halted.

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;

use crate::analyzer::{
    Analyzer, AnalyzerError, AnalyzerFactory, AnalyzerMessage, AnalyzerMode, AnalyzerRunParams,
    SourceCapabilities, SpectrumFrame, STATUS_INIT_FAILURE,
};
use crate::context::CoreContext;
use crate::session::profile::CaptureProfile;
use crate::LOG_TAIL_LINES;

use std::sync::Arc;

/// Lifecycle state of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No analyzer exists
    Halted,
    /// An analyzer is live and producing messages
    Running,
    /// A halt was requested; waiting for the halted notification
    Halting,
    /// Halting with the intent to start again with the current profile
    Restarting,
}

/// Notifications published to external collaborators
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session entered a new state
    StateChanged(CaptureState),
    /// A PSD snapshot arrived from the analyzer
    Psd(SpectrumFrame),
    /// The analyzer reported its source permission set
    SourceInfo(SourceCapabilities),
    /// Free-form analyzer status
    Status { code: i32, text: String },
    /// Echo of the effective run parameters
    Params(AnalyzerRunParams),
    /// A profile replacement was accepted, and whether it forced a restart
    ProfileApplied { needs_restart: bool },
    /// Source timestamp tick (emitted while running)
    TimeStamp(DateTime<Utc>),
    /// A real-time profile exceeds the rate cap; a decision is needed before
    /// the session can start
    RateDecisionNeeded {
        label: String,
        current_rate: u32,
        proposed_decimation: u32,
        proposed_rate: u32,
    },
    /// Analyzer construction failed; the session stayed halted
    StartFailed { log: String },
    /// The engine reported an initialization failure after construction
    InitFailed { text: String },
    /// The source ran out of data; the session was halted in order
    StreamEnded { log: String },
    /// The source failed mid-capture; the session was halted in order
    ReadError { log: String },
    /// One or more live parameter changes were rejected
    HotApplyFailed { log: String },
}

/// Result of a start command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The analyzer is live and the session is running
    Started,
    /// The profile's decimated rate exceeds the cap; call
    /// [`CaptureController::resolve_rate_decision`] to continue
    RateDecisionRequired {
        current_rate: u32,
        proposed_decimation: u32,
        proposed_rate: u32,
    },
    /// The pending start was cancelled; the session stays halted
    Cancelled,
    /// The command was issued outside `Halted` and was ignored
    Ignored,
}

/// Caller's answer to a rate-cap offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Apply the proposed decimation factor, then start
    Decimate,
    /// Start unchanged
    Proceed,
    /// Abandon the start
    Cancel,
}

/// Failures of the start path
#[derive(Error, Debug)]
pub enum StartError {
    #[error("No source defined in the current profile")]
    NoSource,

    #[error("A rate decision is already pending")]
    DecisionPending,

    #[error("No rate decision is pending")]
    NoDecisionPending,

    #[error(transparent)]
    Construction(#[from] AnalyzerError),
}

/// Owner and driver of the live capture session
pub struct CaptureController {
    ctx: CoreContext,
    factory: Arc<dyn AnalyzerFactory>,
    state: CaptureState,
    profile: CaptureProfile,
    params: AnalyzerRunParams,
    analyzer: Option<Box<dyn Analyzer>>,
    messages: Option<Receiver<AnalyzerMessage>>,
    events: Sender<SessionEvent>,
    source_info_received: bool,
    pending_decimation: Option<u32>,
    pending_stop: bool,
}

impl CaptureController {
    /// Create a controller, returning it together with its event stream
    pub fn new(
        ctx: CoreContext,
        factory: Arc<dyn AnalyzerFactory>,
    ) -> (Self, Receiver<SessionEvent>) {
        let (events, event_rx) = unbounded();
        (
            Self {
                ctx,
                factory,
                state: CaptureState::Halted,
                profile: CaptureProfile::default(),
                params: AnalyzerRunParams::default(),
                analyzer: None,
                messages: None,
                events,
                source_info_received: false,
                pending_decimation: None,
                pending_stop: false,
            },
            event_rx,
        )
    }

    /// Current session state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Current capture profile
    pub fn profile(&self) -> &CaptureProfile {
        &self.profile
    }

    /// Effective analyzer run parameters
    pub fn params(&self) -> &AnalyzerRunParams {
        &self.params
    }

    /// Whether an analyzer instance is currently owned
    ///
    /// Holds iff the state is Running, Halting or Restarting.
    pub fn owns_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Whether the analyzer has reported its source info since the last start
    pub fn source_info_received(&self) -> bool {
        self.source_info_received
    }

    /// Start a capture with the current profile
    ///
    /// Only acts while `Halted`. When the profile is a real-time source whose
    /// decimated rate exceeds the configured cap, no analyzer is constructed
    /// yet; instead [`StartOutcome::RateDecisionRequired`] is returned (and
    /// mirrored as a [`SessionEvent::RateDecisionNeeded`]) and the start
    /// continues through [`resolve_rate_decision`](Self::resolve_rate_decision).
    pub fn start(&mut self) -> Result<StartOutcome, StartError> {
        if self.state != CaptureState::Halted {
            return Ok(StartOutcome::Ignored);
        }
        if self.pending_decimation.is_some() {
            return Err(StartError::DecisionPending);
        }
        if !self.profile.has_source() {
            return Err(StartError::NoSource);
        }

        let max_rate = self.ctx.max_sample_rate();
        if self.profile.is_real_time() && self.profile.decimated_sample_rate() > max_rate {
            let decimate = (self.profile.sample_rate as f64 / max_rate as f64).ceil() as u32;
            let proposed_rate = self.profile.sample_rate / decimate;
            self.pending_decimation = Some(decimate);

            let outcome = StartOutcome::RateDecisionRequired {
                current_rate: self.profile.decimated_sample_rate(),
                proposed_decimation: decimate,
                proposed_rate,
            };
            self.emit(SessionEvent::RateDecisionNeeded {
                label: self.profile.label.clone(),
                current_rate: self.profile.decimated_sample_rate(),
                proposed_decimation: decimate,
                proposed_rate,
            });
            return Ok(outcome);
        }

        self.launch()
    }

    /// Answer a pending rate-cap offer and finish (or abandon) the start
    pub fn resolve_rate_decision(
        &mut self,
        decision: RateDecision,
    ) -> Result<StartOutcome, StartError> {
        let decimate = self
            .pending_decimation
            .take()
            .ok_or(StartError::NoDecisionPending)?;

        match decision {
            RateDecision::Cancel => Ok(StartOutcome::Cancelled),
            RateDecision::Decimate => {
                self.profile.decimation = decimate;
                self.launch()
            }
            RateDecision::Proceed => self.launch(),
        }
    }

    /// Construct the analyzer in channel mode and enter `Running`
    fn launch(&mut self) -> Result<StartOutcome, StartError> {
        // Only lines from this attempt end up in a failure notification
        self.ctx.journal().flush();

        self.params.mode = AnalyzerMode::Channel;

        match self.factory.start(&self.params, &self.profile) {
            Ok((analyzer, messages)) => {
                self.analyzer = Some(analyzer);
                self.messages = Some(messages);
                self.source_info_received = false;
                self.set_state(CaptureState::Running);
                tracing::info!(
                    "Capture started: {} @ {} Hz",
                    self.profile.label,
                    self.profile.decimated_sample_rate()
                );
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.ctx.journal().record(e.to_string());
                self.emit(SessionEvent::StartFailed {
                    log: self.ctx.journal().tail(LOG_TAIL_LINES),
                });
                Err(StartError::Construction(e))
            }
        }
    }

    /// Stop the capture
    ///
    /// While `Running` this asks the analyzer to halt and enters `Halting`;
    /// ownership is released when the halted notification arrives. A stop
    /// issued while a restart is in flight is queued and applied once the
    /// halted notification arrives. A stop while a rate decision is pending
    /// cancels the pending start.
    pub fn stop(&mut self) {
        if self.pending_decimation.take().is_some() {
            return;
        }
        match self.state {
            CaptureState::Running => {
                self.set_state(CaptureState::Halting);
                if let Some(analyzer) = self.analyzer.as_mut() {
                    analyzer.halt();
                }
            }
            CaptureState::Restarting => {
                self.pending_stop = true;
            }
            CaptureState::Halting | CaptureState::Halted => {}
        }
    }

    /// Halt the current analyzer and start again with the current profile
    pub fn restart(&mut self) {
        if self.state == CaptureState::Running {
            self.set_state(CaptureState::Restarting);
            if let Some(analyzer) = self.analyzer.as_mut() {
                analyzer.halt();
            }
        }
    }

    /// Replace the capture profile
    ///
    /// `needs_restart` marks changes the source cannot apply live (device
    /// swaps and the like): while running, the session is restarted with the
    /// new profile. Otherwise a running session gets the changed attributes
    /// hot-applied, filtered by the reported permission set.
    pub fn set_profile(&mut self, profile: CaptureProfile, needs_restart: bool) {
        self.profile = profile;
        self.emit(SessionEvent::ProfileApplied { needs_restart });

        if needs_restart {
            self.restart();
        } else if self.state == CaptureState::Running {
            self.hot_apply();
        }
    }

    /// Apply the permitted subset of live-tunable attributes
    ///
    /// Each attempt is independent; failures are aggregated into a single
    /// notification and never tear the session down.
    fn hot_apply(&mut self) {
        let Some(analyzer) = self.analyzer.as_mut() else {
            return;
        };
        let caps = analyzer.source_info();
        let mut errors = false;

        if caps.can_set_antenna {
            errors |= analyzer.set_antenna(&self.profile.antenna).is_err();
        }
        if caps.can_set_bandwidth {
            errors |= analyzer.set_bandwidth(self.profile.bandwidth).is_err();
        }
        if caps.can_set_frequency {
            errors |= analyzer
                .set_frequency(self.profile.frequency, self.profile.lnb_offset)
                .is_err();
        }
        if caps.can_set_dc_remove {
            errors |= analyzer.set_dc_remove(self.profile.dc_remove).is_err();
        }

        if errors {
            self.ctx
                .journal()
                .record("Some of the settings in the profile could not be applied");
            self.emit(SessionEvent::HotApplyFailed {
                log: self.ctx.journal().tail(LOG_TAIL_LINES),
            });
        }
    }

    /// Update the tuning frequency and LNB offset
    ///
    /// Live sources get the change written through to the profile; a running
    /// analyzer is retuned. Retune failures are tolerated silently.
    pub fn set_frequency(&mut self, freq: f64, lnb_offset: f64) {
        if self.profile.is_real_time() {
            self.profile.frequency = freq;
            self.profile.lnb_offset = lnb_offset;
        }

        if self.state == CaptureState::Running {
            if let Some(analyzer) = self.analyzer.as_mut() {
                if let Err(e) = analyzer.set_frequency(freq, lnb_offset) {
                    tracing::warn!("Retune to {freq} Hz failed: {e}");
                }
            }
        }
    }

    /// Seek the source to `target`
    ///
    /// Forwarded only while `Running`; a non-seekable source reports an error
    /// and the state is unchanged.
    pub fn seek(&mut self, target: DateTime<Utc>) -> Result<(), AnalyzerError> {
        if self.state != CaptureState::Running {
            return Ok(());
        }
        let Some(analyzer) = self.analyzer.as_mut() else {
            return Ok(());
        };
        analyzer.seek(target).map_err(|e| {
            self.ctx.journal().record(e.to_string());
            e
        })
    }

    /// Drain and handle pending analyzer messages
    ///
    /// Call periodically from the controlling context. Handlers never block.
    pub fn poll_messages(&mut self) {
        loop {
            let msg = match &self.messages {
                Some(rx) => match rx.try_recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
                None => break,
            };
            self.handle_message(msg);
        }
    }

    /// Periodic tick from the controlling context
    ///
    /// Emits a source-timestamp event while running.
    pub fn tick(&mut self) {
        if self.state == CaptureState::Running {
            if let Some(analyzer) = self.analyzer.as_ref() {
                let ts = analyzer.source_timestamp();
                self.emit(SessionEvent::TimeStamp(ts));
            }
        }
    }

    fn handle_message(&mut self, msg: AnalyzerMessage) {
        match msg {
            AnalyzerMessage::Psd(frame) => self.emit(SessionEvent::Psd(frame)),
            AnalyzerMessage::SourceInfo(caps) => {
                self.source_info_received = true;
                self.emit(SessionEvent::SourceInfo(caps));
            }
            AnalyzerMessage::Status { code, text } => {
                if code == STATUS_INIT_FAILURE {
                    self.ctx.journal().record(text.clone());
                    self.emit(SessionEvent::InitFailed { text });
                } else {
                    self.emit(SessionEvent::Status { code, text });
                }
            }
            AnalyzerMessage::Params(params) => {
                self.params = params.clone();
                self.emit(SessionEvent::Params(params));
            }
            AnalyzerMessage::Eos => {
                let log = self.ctx.journal().tail(LOG_TAIL_LINES);
                self.emit(SessionEvent::StreamEnded { log });
                self.ordered_halt();
            }
            AnalyzerMessage::ReadError => {
                let log = self.ctx.journal().tail(LOG_TAIL_LINES);
                self.emit(SessionEvent::ReadError { log });
                self.ordered_halt();
            }
            AnalyzerMessage::Halted => self.on_halted(),
        }
    }

    /// Completion of a commanded halt
    fn on_halted(&mut self) {
        let restart = self.state == CaptureState::Restarting && !self.pending_stop;
        self.pending_stop = false;

        self.ordered_halt();

        if restart {
            if let Err(e) = self.start() {
                tracing::error!("Restart failed: {e}");
            }
        }
    }

    /// Unconditional ordered teardown: Halting, release ownership, Halted
    fn ordered_halt(&mut self) {
        if self.state != CaptureState::Halting {
            self.set_state(CaptureState::Halting);
        }
        self.analyzer = None;
        self.messages = None;
        self.set_state(CaptureState::Halted);
        tracing::info!("Capture halted");
    }

    fn set_state(&mut self, state: CaptureState) {
        if self.state != state {
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{SimCall, SimFactory};
    use crate::discovery::{DeviceDescriptor, DeviceFacade, DiscoveryOutcome};
    use std::time::Duration;

    struct NoDevices;

    impl DeviceFacade for NoDevices {
        fn discover_all(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn wait_for_devices(&self, _timeout: Duration) -> DiscoveryOutcome {
            DiscoveryOutcome::default()
        }
        fn devices(&self) -> Vec<DeviceDescriptor> {
            Vec::new()
        }
    }

    fn test_context() -> CoreContext {
        CoreContext::new(Arc::new(NoDevices))
    }

    fn live_profile(sample_rate: u32) -> CaptureProfile {
        CaptureProfile {
            label: "test source".to_string(),
            device: "rtlsdr".to_string(),
            sample_rate,
            bandwidth: sample_rate as f64,
            frequency: 100_000_000.0,
            antenna: "RX".to_string(),
            dc_remove: true,
            ..Default::default()
        }
    }

    fn controller_with_factory(
        ctx: CoreContext,
    ) -> (
        CaptureController,
        crossbeam_channel::Receiver<SessionEvent>,
        Arc<crate::analyzer::testing::SimShared>,
    ) {
        let factory = SimFactory::new();
        let shared = Arc::clone(&factory.shared);
        let (controller, events) = CaptureController::new(ctx, Arc::new(factory));
        (controller, events, shared)
    }

    fn drain(events: &crossbeam_channel::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = events.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_initial_state() {
        let (controller, _events, _shared) = controller_with_factory(test_context());
        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(!controller.owns_analyzer());
    }

    #[test]
    fn test_start_without_source_fails() {
        let (mut controller, _events, _shared) = controller_with_factory(test_context());
        assert!(matches!(controller.start(), Err(StartError::NoSource)));
        assert_eq!(controller.state(), CaptureState::Halted);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let (mut controller, events, _shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);

        assert!(matches!(controller.start(), Ok(StartOutcome::Started)));
        assert_eq!(controller.state(), CaptureState::Running);
        assert!(controller.owns_analyzer());

        controller.stop();
        assert_eq!(controller.state(), CaptureState::Halting);
        // Ownership is not released before the halted notification
        assert!(controller.owns_analyzer());

        controller.poll_messages();
        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(!controller.owns_analyzer());

        let states: Vec<_> = drain(&events)
            .into_iter()
            .filter_map(|ev| match ev {
                SessionEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                CaptureState::Running,
                CaptureState::Halting,
                CaptureState::Halted
            ]
        );
    }

    #[test]
    fn test_start_ignored_outside_halted() {
        let (mut controller, _events, _shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        assert!(matches!(controller.start(), Ok(StartOutcome::Ignored)));
        assert_eq!(controller.state(), CaptureState::Running);
    }

    #[test]
    fn test_construction_failure_stays_halted() {
        let (mut controller, events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        shared
            .fail_start
            .store(true, std::sync::atomic::Ordering::Relaxed);

        assert!(matches!(
            controller.start(),
            Err(StartError::Construction(_))
        ));
        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(!controller.owns_analyzer());

        let failed: Vec<_> = drain(&events)
            .into_iter()
            .filter(|ev| matches!(ev, SessionEvent::StartFailed { .. }))
            .collect();
        assert_eq!(failed.len(), 1, "start failure must be reported once");
        if let SessionEvent::StartFailed { log } = &failed[0] {
            assert!(
                log.contains("simulated start failure"),
                "failure notification should carry recent log text"
            );
        }
    }

    #[test]
    fn test_over_limit_rate_offers_decimation() {
        let ctx = test_context().with_max_sample_rate(1_000_000);
        let (mut controller, _events, _shared) = controller_with_factory(ctx);
        controller.set_profile(live_profile(3_000_000), false);

        let outcome = controller.start().unwrap();
        assert_eq!(
            outcome,
            StartOutcome::RateDecisionRequired {
                current_rate: 3_000_000,
                proposed_decimation: 3,
                proposed_rate: 1_000_000,
            }
        );
        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(!controller.owns_analyzer());

        let outcome = controller.resolve_rate_decision(RateDecision::Decimate).unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(controller.profile().decimation, 3);
        assert_eq!(controller.state(), CaptureState::Running);
    }

    #[test]
    fn test_rate_decision_cancel_stays_halted() {
        let ctx = test_context().with_max_sample_rate(1_000_000);
        let (mut controller, _events, _shared) = controller_with_factory(ctx);
        controller.set_profile(live_profile(3_000_000), false);

        controller.start().unwrap();
        let outcome = controller.resolve_rate_decision(RateDecision::Cancel).unwrap();
        assert_eq!(outcome, StartOutcome::Cancelled);
        assert_eq!(controller.state(), CaptureState::Halted);
        assert_eq!(controller.profile().decimation, 1);
    }

    #[test]
    fn test_rate_decision_proceed_keeps_profile() {
        let ctx = test_context().with_max_sample_rate(1_000_000);
        let (mut controller, _events, _shared) = controller_with_factory(ctx);
        controller.set_profile(live_profile(3_000_000), false);

        controller.start().unwrap();
        let outcome = controller.resolve_rate_decision(RateDecision::Proceed).unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(controller.profile().decimation, 1);
    }

    #[test]
    fn test_replay_profile_bypasses_rate_cap() {
        let ctx = test_context().with_max_sample_rate(1_000_000);
        let (mut controller, _events, _shared) = controller_with_factory(ctx);
        let mut profile = live_profile(8_000_000);
        profile.kind = crate::session::SourceKind::Replay;
        controller.set_profile(profile, false);

        assert!(matches!(controller.start(), Ok(StartOutcome::Started)));
    }

    #[test]
    fn test_read_error_performs_ordered_halt() {
        let (mut controller, events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();
        controller.ctx.journal().record("read failed: I/O error");

        shared.inject(AnalyzerMessage::ReadError);
        controller.poll_messages();

        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(!controller.owns_analyzer());

        let read_errors: Vec<_> = drain(&events)
            .into_iter()
            .filter(|ev| matches!(ev, SessionEvent::ReadError { .. }))
            .collect();
        assert_eq!(read_errors.len(), 1, "read error must be reported exactly once");
        if let SessionEvent::ReadError { log } = &read_errors[0] {
            assert!(log.contains("I/O error"));
        }
    }

    #[test]
    fn test_eos_performs_ordered_halt() {
        let (mut controller, events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        shared.inject(AnalyzerMessage::Eos);
        controller.poll_messages();

        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(drain(&events)
            .iter()
            .any(|ev| matches!(ev, SessionEvent::StreamEnded { .. })));
    }

    #[test]
    fn test_restart_reaches_running_with_new_analyzer() {
        let (mut controller, _events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        controller.set_profile(live_profile(4_000_000), true);
        assert_eq!(controller.state(), CaptureState::Restarting);

        controller.poll_messages();
        assert_eq!(controller.state(), CaptureState::Running);
        assert_eq!(*shared.starts.lock().unwrap(), 2);
    }

    #[test]
    fn test_stop_during_restart_is_queued() {
        let (mut controller, _events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        controller.restart();
        controller.stop();

        controller.poll_messages();
        assert_eq!(controller.state(), CaptureState::Halted);
        assert!(!controller.owns_analyzer());
        assert_eq!(
            *shared.starts.lock().unwrap(),
            1,
            "queued stop must suppress the restart"
        );
    }

    #[test]
    fn test_hot_apply_respects_permissions() {
        let (mut controller, _events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        shared.caps.lock().unwrap().can_set_bandwidth = false;
        shared.calls.lock().unwrap().clear();

        let mut profile = live_profile(2_000_000);
        profile.antenna = "LNA".to_string();
        profile.bandwidth = 1_500_000.0;
        controller.set_profile(profile, false);

        let calls = shared.calls();
        assert!(
            calls.contains(&SimCall::SetAntenna("LNA".to_string())),
            "permitted antenna change must be sent"
        );
        assert!(
            !calls.iter().any(|c| matches!(c, SimCall::SetBandwidth(_))),
            "unpermitted bandwidth change must never be sent"
        );
        assert!(calls.iter().any(|c| matches!(c, SimCall::SetFrequency(..))));
        assert!(calls.iter().any(|c| matches!(c, SimCall::SetDcRemove(_))));
    }

    #[test]
    fn test_hot_apply_failure_does_not_abort_batch() {
        let (mut controller, events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        shared.fail_op("antenna");
        shared.calls.lock().unwrap().clear();

        controller.set_profile(live_profile(2_000_000), false);

        let calls = shared.calls();
        assert!(
            calls.iter().any(|c| matches!(c, SimCall::SetBandwidth(_))),
            "a failed attempt must not prevent the remaining attempts"
        );

        let failures: Vec<_> = drain(&events)
            .into_iter()
            .filter(|ev| matches!(ev, SessionEvent::HotApplyFailed { .. }))
            .collect();
        assert_eq!(failures.len(), 1, "failures are aggregated into one event");
        assert_eq!(controller.state(), CaptureState::Running);
    }

    #[test]
    fn test_seek_unsupported_reports_and_keeps_state() {
        let (mut controller, _events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();
        shared.fail_op("seek");

        let result = controller.seek(Utc::now());
        assert!(matches!(result, Err(AnalyzerError::NotSeekable)));
        assert_eq!(controller.state(), CaptureState::Running);
    }

    #[test]
    fn test_seek_ignored_while_halted() {
        let (mut controller, _events, _shared) = controller_with_factory(test_context());
        assert!(controller.seek(Utc::now()).is_ok());
    }

    #[test]
    fn test_live_frequency_change_writes_through() {
        let (mut controller, _events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();
        shared.calls.lock().unwrap().clear();

        controller.set_frequency(433_920_000.0, 0.0);

        assert_eq!(controller.profile().frequency, 433_920_000.0);
        assert!(shared
            .calls()
            .contains(&SimCall::SetFrequency(433_920_000.0, 0.0)));
    }

    #[test]
    fn test_init_failure_status_is_surfaced() {
        let (mut controller, events, shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();

        shared.inject(AnalyzerMessage::Status {
            code: STATUS_INIT_FAILURE,
            text: "no such device".to_string(),
        });
        controller.poll_messages();

        assert!(drain(&events).iter().any(|ev| matches!(
            ev,
            SessionEvent::InitFailed { text } if text == "no such device"
        )));
    }

    #[test]
    fn test_profile_replacement_is_announced() {
        let (mut controller, events, _shared) = controller_with_factory(test_context());
        controller.set_profile(live_profile(2_000_000), false);

        assert!(drain(&events).iter().any(|ev| matches!(
            ev,
            SessionEvent::ProfileApplied {
                needs_restart: false
            }
        )));
    }

    #[test]
    fn test_tick_emits_timestamp_only_while_running() {
        let (mut controller, events, _shared) = controller_with_factory(test_context());
        controller.tick();
        assert!(drain(&events).is_empty());

        controller.set_profile(live_profile(2_000_000), false);
        controller.start().unwrap();
        controller.tick();
        assert!(drain(&events)
            .iter()
            .any(|ev| matches!(ev, SessionEvent::TimeStamp(_))));
    }
}
