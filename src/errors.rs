/// Transport-level failures on the backend parameter channel.
///
/// Channel errors are surfaced to the caller and never retried internally, so
/// callers can distinguish "bad input" from "service unavailable" and decide
/// whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The backend process or pipe is gone, or I/O failed mid round trip.
    #[error("channel transport failed: {0}")]
    Transport(String),
    /// The backend answered but rejected the parameter key or value.
    #[error("backend rejected parameter '{key}': {message}")]
    Rejected { key: String, message: String },
}

impl ChannelError {
    /// Creates a transport-level channel error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a rejected-parameter channel error.
    pub fn rejected(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Failures establishing a backend session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused to initialize the requested session (for example an
    /// unsupported compiler version or unknown benchmark). Retryable by the
    /// caller through the explicit `reset` retry count.
    #[error("backend rejected session init: {0}")]
    ServiceInit(String),
    /// The transport failed before the backend could answer.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Failures retrieving or decoding a named observation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    /// The observation name is not registered with the session.
    #[error("unknown observation space '{0}'")]
    UnknownSpace(String),
    /// The backend cannot currently produce the observation (for example the
    /// compile failed).
    #[error("observation '{space}' unavailable: {reason}")]
    Unavailable { space: String, reason: String },
    /// The payload did not match the space's declared decode kind.
    #[error("observation '{space}' payload malformed: {reason}")]
    Malformed { space: String, reason: String },
    /// The transport failed while fetching the observation.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl ObservationError {
    /// Creates an unavailable-observation error.
    pub fn unavailable(space: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            space: space.into(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed-payload error.
    pub fn malformed(space: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            space: space.into(),
            reason: reason.into(),
        }
    }
}

/// Client-side action vector validation failures.
///
/// Raised synchronously, before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The choice vector length does not match the option count.
    #[error("action has {got} choices but the compiler spec has {expected} options")]
    SpaceMismatch { expected: usize, got: usize },
    /// A choice is outside the legal range for its option. `-1` selects the
    /// option's default.
    #[error("choice {value} at index {index} is outside [-1, {max}]")]
    OutOfRange { index: usize, value: i64, max: i64 },
}

/// Reward computation failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewardError {
    /// The reward id is not registered with the session.
    #[error("unknown reward '{0}'")]
    UnknownReward(String),
    /// A scaled reward captured a zero episode baseline; the relative delta
    /// is undefined and must not silently produce NaN.
    #[error("reward '{id}': episode baseline is zero, relative delta is undefined")]
    ZeroBaseline { id: String },
    /// The tracker was updated before any episode was started.
    #[error("reward '{id}' updated before the episode was reset")]
    NotReset { id: String },
    /// A scaled reward was reset without its episode-start observation.
    #[error("reward '{id}' requires an episode-start baseline observation")]
    MissingBaseline { id: String },
    /// The dependent observation did not decode to a number.
    #[error("reward '{id}' expects a numeric observation, got {got}")]
    NonNumeric { id: String, got: String },
}

/// Top-level error type for the public session API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvError {
    /// Invalid backend reference or unmet prerequisite, detected before any
    /// session exists.
    #[error("construction error: {0}")]
    Construction(String),
    /// The backend rejected session initialization after all retries.
    #[error("service init failed: {0}")]
    ServiceInit(String),
    /// Transport failure on the parameter channel.
    #[error(transparent)]
    Channel(ChannelError),
    /// Observation retrieval or decode failure.
    #[error(transparent)]
    Observation(ObservationError),
    /// Action vector validation failure.
    #[error(transparent)]
    Action(ActionError),
    /// Reward computation failure.
    #[error(transparent)]
    Reward(RewardError),
    /// The capability-spec blob could not be decoded.
    #[error("compiler spec decode failed: {0}")]
    SpecDecode(String),
    /// Operation on a session that has no active episode yet.
    #[error("no active episode; call reset first")]
    NoEpisode,
    /// Operation on a session that was already closed or has failed.
    #[error("session is closed")]
    Closed,
}

impl From<ChannelError> for EnvError {
    fn from(value: ChannelError) -> Self {
        Self::Channel(value)
    }
}

impl From<ObservationError> for EnvError {
    fn from(value: ObservationError) -> Self {
        // Transport failures keep a single top-level kind regardless of which
        // operation hit them.
        match value {
            ObservationError::Channel(err) => Self::Channel(err),
            other => Self::Observation(other),
        }
    }
}

impl From<ActionError> for EnvError {
    fn from(value: ActionError) -> Self {
        Self::Action(value)
    }
}

impl From<RewardError> for EnvError {
    fn from(value: RewardError) -> Self {
        Self::Reward(value)
    }
}

impl From<BackendError> for EnvError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::ServiceInit(message) => Self::ServiceInit(message),
            BackendError::Channel(err) => Self::Channel(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_channel_errors_flatten_to_channel_kind() {
        let err: EnvError = ObservationError::Channel(ChannelError::transport("pipe broke")).into();
        assert!(matches!(err, EnvError::Channel(ChannelError::Transport(_))));
    }

    #[test]
    fn backend_service_init_maps_to_service_init_kind() {
        let err: EnvError = BackendError::ServiceInit("bad version".into()).into();
        assert!(matches!(err, EnvError::ServiceInit(msg) if msg.contains("bad version")));
    }
}
