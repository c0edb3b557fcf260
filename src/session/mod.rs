//! Capture session lifecycle
//!
//! One [`CaptureController`] owns at most one live Analyzer and drives it
//! through an explicit state machine. External collaborators issue commands
//! (start, stop, profile changes, seeks) and consume the typed
//! [`SessionEvent`] stream.

pub mod controller;
pub mod profile;

pub use controller::{
    CaptureController, CaptureState, RateDecision, SessionEvent, StartError, StartOutcome,
};
pub use profile::{CaptureProfile, SourceKind};
