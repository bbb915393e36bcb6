use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::action::{encode_choices, validate_choices};
use crate::backend::Backend;
use crate::backends::stdio::StdioBackend;
use crate::channel::ParameterChannel;
use crate::config::SessionConfig;
use crate::errors::{BackendError, ChannelError, EnvError, ObservationError, RewardError};
use crate::observation::{ObservationSpace, ObservationValue, ObservationView};
use crate::reward::{RewardPolicy, RewardSpace, RewardTracker};
use crate::spec::GccSpec;

/// Lifecycle of the backend session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed; no episode established yet.
    Created,
    /// An episode is established and accepting steps.
    Active,
    /// Explicitly closed; every further operation except `close` fails.
    Closed,
    /// The backend connection failed unrecoverably.
    Failed,
}

/// Extra information reported alongside a step result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepInfo {
    /// 1-based index of this step within the episode.
    pub step: u64,
    /// Present when the step terminated the episode through a backend
    /// failure.
    pub error: Option<String>,
}

/// Result of applying one action.
#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    /// Requested observations, in request order.
    pub observations: Vec<ObservationValue>,
    /// Requested rewards, in request order.
    pub rewards: Vec<f64>,
    /// Whether the episode ended on this step.
    pub done: bool,
    /// Step metadata.
    pub info: StepInfo,
}

/// Top-level session orchestrator.
///
/// Owns the backend connection and the episode lifecycle: `reset` establishes
/// an episode, `step` applies a validated action and collects observations
/// and rewards, `close` releases the backend. The connection is released on
/// drop as well, so an early error path never leaks the external process.
pub struct CompilerSession {
    session_id: Uuid,
    config: SessionConfig,
    backend: Box<dyn Backend>,
    state: SessionState,
    benchmark: String,
    timeout: Option<u64>,
    step_count: u64,
    spec: Option<Arc<GccSpec>>,
    observations: ObservationView,
    trackers: Vec<RewardTracker>,
}

impl CompilerSession {
    /// Launches the configured backend process and opens a session over it.
    ///
    /// The backend reference is validated before anything is spawned, so an
    /// invalid path or image fails fast with a construction error.
    pub fn launch(config: SessionConfig) -> Result<Self, EnvError> {
        config.backend.validate()?;
        let backend = StdioBackend::launch(&config.backend)?;
        Ok(Self::new(config, Box::new(backend)))
    }

    /// Opens a session over a caller-supplied backend transport.
    ///
    /// The configured backend reference is still validated eagerly so both
    /// constructors fail fast on bad configuration.
    pub fn with_backend(config: SessionConfig, backend: Box<dyn Backend>) -> Result<Self, EnvError> {
        config.backend.validate()?;
        Ok(Self::new(config, backend))
    }

    fn new(config: SessionConfig, backend: Box<dyn Backend>) -> Self {
        let session_id = Uuid::new_v4();
        debug!(session_id = %session_id, name = %config.name, "session created");
        Self {
            session_id,
            benchmark: config.benchmark.clone(),
            timeout: config.timeout,
            config,
            backend,
            state: SessionState::Created,
            step_count: 0,
            spec: None,
            observations: ObservationView::with_builtin_spaces(),
            trackers: vec![
                RewardTracker::new(RewardSpace::asm_size()),
                RewardTracker::new(RewardSpace::obj_size()),
            ],
        }
    }

    /// Unique id for this session, for log correlation.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Benchmark the current or next episode runs against.
    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    /// Currently configured per-compile timeout in seconds.
    pub fn timeout(&self) -> Option<u64> {
        self.timeout
    }

    /// Sets the compile timeout and pushes it to the backend immediately.
    /// `None` clears it. The value is also resent on every reset because the
    /// backend does not persist it across reconnects.
    pub fn set_timeout(&mut self, timeout: Option<u64>) -> Result<(), EnvError> {
        self.ensure_open()?;
        self.timeout = timeout;
        ParameterChannel::new(self.backend.as_mut())
            .send_timeout(timeout)
            .map_err(|err| channel_failure(&mut self.state, err))?;
        Ok(())
    }

    /// Registers an additional reward signal.
    pub fn register_reward(&mut self, space: RewardSpace) -> Result<(), EnvError> {
        if self.trackers.iter().any(|t| t.id() == space.id) {
            return Err(EnvError::Construction(format!(
                "duplicate reward registration: {}",
                space.id
            )));
        }
        self.trackers.push(RewardTracker::new(space));
        Ok(())
    }

    /// Registers an additional observation space.
    pub fn register_observation_space(&mut self, space: ObservationSpace) {
        self.observations.register(space);
    }

    /// The backend's capability spec: fetched lazily over the parameter
    /// channel on first access and cached for the session lifetime. Exclusive
    /// ownership of the session serializes first access, so exactly one round
    /// trip occurs; the cache is discarded only if the connection is
    /// replaced.
    pub fn spec(&mut self) -> Result<Arc<GccSpec>, EnvError> {
        self.ensure_open()?;
        if let Some(spec) = &self.spec {
            return Ok(Arc::clone(spec));
        }
        let blob = ParameterChannel::new(self.backend.as_mut())
            .fetch_spec_blob()
            .map_err(|err| channel_failure(&mut self.state, err))?;
        let spec = Arc::new(GccSpec::from_blob(&blob)?);
        debug!(
            session_id = %self.session_id,
            version = %spec.version,
            options = spec.options.len(),
            "capability spec fetched"
        );
        self.spec = Some(Arc::clone(&spec));
        Ok(spec)
    }

    /// (Re)establishes an episode.
    ///
    /// Runs against `benchmark` when given, else the previously used one. On
    /// a service-init rejection the attempt is repeated up to `retry_count`
    /// additional times before the failure propagates; transport failures are
    /// never retried. After success the configured timeout is resent and all
    /// reward trackers are reset. Returns the configured reset observation,
    /// if any.
    pub fn reset(
        &mut self,
        benchmark: Option<&str>,
        retry_count: usize,
    ) -> Result<Option<ObservationValue>, EnvError> {
        self.ensure_open()?;
        if let Some(benchmark) = benchmark {
            self.benchmark = benchmark.to_string();
        }
        if self.state == SessionState::Active
            && let Err(err) = self.backend.end_session()
        {
            warn!(session_id = %self.session_id, error = %err, "stale episode teardown failed");
        }

        let mut attempt = 0;
        loop {
            match self.backend.start_session(&self.benchmark) {
                Ok(()) => break,
                Err(BackendError::ServiceInit(message)) if attempt < retry_count => {
                    attempt += 1;
                    warn!(
                        session_id = %self.session_id,
                        benchmark = %self.benchmark,
                        attempt,
                        message,
                        "backend rejected session init; retrying"
                    );
                }
                Err(BackendError::ServiceInit(message)) => {
                    return Err(EnvError::ServiceInit(message));
                }
                Err(BackendError::Channel(err)) => {
                    return Err(channel_failure(&mut self.state, err));
                }
            }
        }

        self.state = SessionState::Active;
        self.step_count = 0;
        self.observations.invalidate();

        // The backend does not persist the timeout across reconnects.
        if self.timeout.is_some() {
            ParameterChannel::new(self.backend.as_mut())
                .send_timeout(self.timeout)
                .map_err(|err| channel_failure(&mut self.state, err))?;
        }

        for tracker in &mut self.trackers {
            let baseline = match tracker.space().policy {
                RewardPolicy::DeltaFromPrevious => None,
                RewardPolicy::ScaledFromBaseline => {
                    let space = tracker.space().observation_space.clone();
                    let value = self
                        .observations
                        .get(self.backend.as_mut(), &space)
                        .map_err(|err| observation_failure(&mut self.state, err))?;
                    Some(numeric_observation(tracker.id(), &value)?)
                }
            };
            tracker.reset(baseline)?;
        }

        debug!(session_id = %self.session_id, benchmark = %self.benchmark, "episode established");

        match self.config.reset_observation.clone() {
            Some(name) => {
                let value = self
                    .observations
                    .get(self.backend.as_mut(), &name)
                    .map_err(|err| observation_failure(&mut self.state, err))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Applies one action and collects the requested observations and
    /// rewards.
    ///
    /// The choice vector is validated against the capability spec and every
    /// requested name is checked before anything is transmitted. Observations
    /// are fetched first, then rewards are computed, so a reward sees the
    /// values fetched in the same step. A mid-episode compile failure ends
    /// the episode (`done = true`) and each requested reward falls back to
    /// its on-error value.
    pub fn step(
        &mut self,
        choices: &[i64],
        observation_names: &[&str],
        reward_names: &[&str],
    ) -> Result<StepResult, EnvError> {
        self.ensure_active()?;
        let spec = self.spec()?;
        validate_choices(choices, &spec)?;
        for name in observation_names {
            if self.observations.space(name).is_none() {
                return Err(ObservationError::UnknownSpace(name.to_string()).into());
            }
        }
        let mut tracker_indices = Vec::with_capacity(reward_names.len());
        for id in reward_names {
            let index = self
                .trackers
                .iter()
                .position(|t| t.id() == *id)
                .ok_or_else(|| RewardError::UnknownReward(id.to_string()))?;
            tracker_indices.push(index);
        }

        let encoded = encode_choices(choices);
        ParameterChannel::new(self.backend.as_mut())
            .send_choices(&encoded)
            .map_err(|err| channel_failure(&mut self.state, err))?;
        self.step_count += 1;
        self.observations.invalidate();

        let mut observations = Vec::with_capacity(observation_names.len());
        for name in observation_names {
            let value = self
                .observations
                .get(self.backend.as_mut(), name)
                .map_err(|err| observation_failure(&mut self.state, err))?;
            observations.push(value);
        }

        let mut rewards = Vec::with_capacity(tracker_indices.len());
        let mut done = false;
        let mut info = StepInfo {
            step: self.step_count,
            error: None,
        };
        for index in tracker_indices {
            let space = self.trackers[index].space().observation_space.clone();
            match self.observations.get(self.backend.as_mut(), &space) {
                Ok(value) => {
                    let numeric = numeric_observation(self.trackers[index].id(), &value)?;
                    rewards.push(self.trackers[index].update(numeric)?);
                }
                Err(ObservationError::Unavailable { space, reason }) => {
                    warn!(
                        session_id = %self.session_id,
                        space = %space,
                        reason = %reason,
                        "observation unavailable; ending episode"
                    );
                    done = true;
                    if info.error.is_none() {
                        info.error = Some(reason);
                    }
                    rewards.push(self.trackers[index].reward_on_error());
                }
                Err(err) => return Err(observation_failure(&mut self.state, err)),
            }
        }

        Ok(StepResult {
            observations,
            rewards,
            done,
            info,
        })
    }

    /// Ad hoc key/value passthrough to the parameter channel. Never retried.
    pub fn send_param(&mut self, key: &str, value: &str) -> Result<String, EnvError> {
        self.ensure_open()?;
        ParameterChannel::new(self.backend.as_mut())
            .send(key, value)
            .map_err(|err| channel_failure(&mut self.state, err))
    }

    /// Fetches a single observation from the current episode.
    pub fn observation(&mut self, name: &str) -> Result<ObservationValue, EnvError> {
        self.ensure_active()?;
        self.observations
            .get(self.backend.as_mut(), name)
            .map_err(|err| observation_failure(&mut self.state, err))
    }

    /// The command line corresponding to the current choices.
    pub fn commandline(&mut self) -> Result<String, EnvError> {
        self.text_observation("command_line")
    }

    /// The source code under compilation.
    pub fn source(&mut self) -> Result<String, EnvError> {
        self.text_observation("source")
    }

    /// The final RTL of the program.
    pub fn rtl(&mut self) -> Result<String, EnvError> {
        self.text_observation("rtl")
    }

    /// The assembly listing.
    pub fn asm(&mut self) -> Result<String, EnvError> {
        self.text_observation("asm")
    }

    /// The assembly size in bytes.
    pub fn asm_size(&mut self) -> Result<i64, EnvError> {
        self.int_observation("asm_size")
    }

    /// A hash of the assembly listing.
    pub fn asm_hash(&mut self) -> Result<String, EnvError> {
        self.text_observation("asm_hash")
    }

    /// Instruction type counts in the assembly. Fields beginning with `.`
    /// (like `.bss` and `.align`) are counted too.
    pub fn instruction_counts(&mut self) -> Result<BTreeMap<String, i64>, EnvError> {
        let value = self.observation("instruction_counts")?;
        match value {
            ObservationValue::Dict(map) => Ok(map),
            other => Err(ObservationError::malformed(
                "instruction_counts",
                format!("expected a count mapping, got {other:?}"),
            )
            .into()),
        }
    }

    /// The object code.
    pub fn obj(&mut self) -> Result<Vec<u8>, EnvError> {
        let value = self.observation("obj")?;
        match value {
            ObservationValue::Bytes(bytes) => Ok(bytes),
            other => {
                Err(ObservationError::malformed("obj", format!("expected bytes, got {other:?}"))
                    .into())
            }
        }
    }

    /// The object code size in bytes.
    pub fn obj_size(&mut self) -> Result<i64, EnvError> {
        self.int_observation("obj_size")
    }

    /// A hash of the object code.
    pub fn obj_hash(&mut self) -> Result<String, EnvError> {
        self.text_observation("obj_hash")
    }

    /// The choice vector currently applied by the backend.
    pub fn choices(&mut self) -> Result<Vec<i64>, EnvError> {
        let value = self.observation("choices")?;
        match value {
            ObservationValue::IntList(values) => Ok(values),
            other => Err(ObservationError::malformed(
                "choices",
                format!("expected an integer list, got {other:?}"),
            )
            .into()),
        }
    }

    /// Releases the backend session. Idempotent: calling `close` after the
    /// session is already closed is a no-op.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if matches!(self.state, SessionState::Active | SessionState::Failed)
            && let Err(err) = self.backend.end_session()
        {
            warn!(session_id = %self.session_id, error = %err, "backend session teardown failed");
        }
        debug!(session_id = %self.session_id, "session closed");
        self.state = SessionState::Closed;
    }

    fn text_observation(&mut self, name: &str) -> Result<String, EnvError> {
        let value = self.observation(name)?;
        match value {
            ObservationValue::Text(text) => Ok(text),
            other => Err(
                ObservationError::malformed(name, format!("expected text, got {other:?}")).into(),
            ),
        }
    }

    fn int_observation(&mut self, name: &str) -> Result<i64, EnvError> {
        let value = self.observation(name)?;
        value.as_int().ok_or_else(|| {
            ObservationError::malformed(name, format!("expected an integer, got {value:?}")).into()
        })
    }

    fn ensure_open(&self) -> Result<(), EnvError> {
        match self.state {
            SessionState::Closed | SessionState::Failed => Err(EnvError::Closed),
            SessionState::Created | SessionState::Active => Ok(()),
        }
    }

    fn ensure_active(&self) -> Result<(), EnvError> {
        self.ensure_open()?;
        if self.state != SessionState::Active {
            return Err(EnvError::NoEpisode);
        }
        Ok(())
    }
}

impl Drop for CompilerSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// A transport failure means the connection is gone: the session moves to
/// `Failed` and only `close` remains usable. Backend rejections are not
/// terminal.
fn channel_failure(state: &mut SessionState, err: ChannelError) -> EnvError {
    if matches!(err, ChannelError::Transport(_)) {
        *state = SessionState::Failed;
    }
    EnvError::Channel(err)
}

fn observation_failure(state: &mut SessionState, err: ObservationError) -> EnvError {
    match err {
        ObservationError::Channel(err) => channel_failure(state, err),
        other => other.into(),
    }
}

fn numeric_observation(reward_id: &str, value: &ObservationValue) -> Result<f64, RewardError> {
    value
        .as_int()
        .map(|v| v as f64)
        .ok_or_else(|| RewardError::NonNumeric {
            id: reward_id.to_string(),
            got: format!("{value:?}"),
        })
}
