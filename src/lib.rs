//! Session client for an out-of-process GCC optimization backend.
//!
//! The backend exposes the compiler's option space for reinforcement-learning
//! style exploration: a session establishes an episode against a benchmark,
//! applies actions (per-option choice vectors), retrieves typed observations
//! (source, assembly, object code, size metrics), and computes incremental
//! episode rewards from them.
//!
//! # Usage
//!
//! ```no_run
//! use gcc_env::prelude::*;
//!
//! fn main() -> Result<(), EnvError> {
//!     let config = SessionConfig::new(BackendRef::parse("docker:gcc-backend:11.2.0")?)
//!         .benchmark("benchmark://chstone-v0/adpcm")
//!         .timeout(30);
//!     let mut session = CompilerSession::launch(config)?;
//!     session.reset(None, 0)?;
//!
//!     let spec = session.spec()?;
//!     let action = vec![-1; spec.options.len()];
//!     let result = session.step(&action, &["asm_size"], &["asm_size"])?;
//!     println!("asm_size reward: {}", result.rewards[0]);
//!
//!     session.close();
//!     Ok(())
//! }
//! ```

/// Client-side action validation and encoding.
pub mod action;
/// Blocking backend seam and raw payload types.
pub mod backend;
/// Concrete backend transports.
pub mod backends;
/// Parameter channel and well-known keys.
pub mod channel;
/// Backend references and session configuration.
pub mod config;
/// Public error types used by the session API.
pub mod errors;
/// Observation spaces, decoding, and the per-step cache.
pub mod observation;
/// Common imports for typical usage.
pub mod prelude;
/// Reward policies and incremental trackers.
pub mod reward;
/// Session orchestration: episode lifecycle, step, close.
pub mod session;
/// Capability spec types and blob decoding.
pub mod spec;

pub use action::{decode_choices, encode_choices, validate_choices};
pub use backend::{Backend, ObservationPayload};
pub use backends::stdio::StdioBackend;
pub use channel::{KEY_CHOICES, KEY_SPEC, KEY_TIMEOUT, ParameterChannel};
pub use config::{BackendRef, DEFAULT_BENCHMARK, SessionConfig};
pub use errors::{
    ActionError, BackendError, ChannelError, EnvError, ObservationError, RewardError,
};
pub use observation::{
    DecodeKind, ObservationSpace, ObservationValue, ObservationView, builtin_spaces,
};
pub use reward::{RewardPolicy, RewardSpace, RewardTracker};
pub use session::{CompilerSession, SessionState, StepInfo, StepResult};
pub use spec::{GccOption, GccSpec};
