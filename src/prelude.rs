//! Common imports for typical session usage.
//!
//! This module intentionally exports the most frequently used configuration
//! and session types so application code needs fewer import lines.
pub use crate::{
    BackendRef, CompilerSession, EnvError, GccSpec, ObservationValue, RewardSpace, SessionConfig,
    SessionState, StepResult,
};
