use crate::errors::{BackendError, ChannelError, ObservationError};

/// Raw payload shapes the backend can report for an observation.
///
/// This is the wire contract, not the decoded value: the observation view
/// checks the payload against the space's declared decode kind and converts
/// it into an [`ObservationValue`](crate::observation::ObservationValue).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ObservationPayload {
    /// UTF-8 text (source listings, hashes, JSON documents).
    Text(String),
    /// A single integer metric.
    Int(i64),
    /// Raw bytes (object code).
    Bytes(Vec<u8>),
    /// A list of integers (the current choice vector).
    IntList(Vec<i64>),
}

impl ObservationPayload {
    /// Short shape name used in decode error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int(_) => "int",
            Self::Bytes(_) => "bytes",
            Self::IntList(_) => "int_list",
        }
    }
}

/// Blocking seam to the out-of-process compiler service.
///
/// A backend holds at most one session at a time. Every call blocks for up to
/// the backend-side compile timeout; with no timeout configured a call may
/// block indefinitely, so cancellation is achieved only by propagating a
/// timeout value through the `timeout` parameter key.
pub trait Backend: Send {
    /// Establishes an episode against the given benchmark, replacing any
    /// session already held by the backend.
    fn start_session(&mut self, benchmark: &str) -> Result<(), BackendError>;

    /// Tears down the current session, if any.
    fn end_session(&mut self) -> Result<(), ChannelError>;

    /// Synchronous key -> value round trip. The returned string is the
    /// backend's acknowledgement, or an encoded payload for request keys.
    fn send_param(&mut self, key: &str, value: &str) -> Result<String, ChannelError>;

    /// Produces the raw payload for a named observation space.
    fn observe(&mut self, space: &str) -> Result<ObservationPayload, ObservationError>;
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use super::*;

    /// Recorded state of a [`FakeBackend`], shared between the session under
    /// test and the assertions.
    #[derive(Default)]
    pub struct FakeState {
        pub params: Vec<(String, String)>,
        pub sessions_started: Vec<String>,
        pub sessions_ended: usize,
        pub observe_calls: Vec<String>,
        pub payloads: HashMap<String, VecDeque<ObservationPayload>>,
        pub spec_blob: Option<String>,
        pub fail_starts: usize,
        pub transport_dead: bool,
    }

    /// In-memory backend double that records every call.
    #[derive(Clone, Default)]
    pub struct FakeBackend {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeBackend {
        pub fn state(&self) -> MutexGuard<'_, FakeState> {
            self.state.lock().expect("fake backend state")
        }

        /// Queues one payload for a space. The last queued payload repeats
        /// once the queue would otherwise run dry.
        pub fn push_payload(&self, space: &str, payload: ObservationPayload) {
            self.state()
                .payloads
                .entry(space.to_string())
                .or_default()
                .push_back(payload);
        }

        pub fn set_spec_blob(&self, blob: impl Into<String>) {
            self.state().spec_blob = Some(blob.into());
        }

        /// Makes the next `count` session starts fail with a service-init
        /// rejection.
        pub fn fail_next_starts(&self, count: usize) {
            self.state().fail_starts = count;
        }

        /// Simulates a dead connection: every further call fails with a
        /// transport error.
        pub fn kill_transport(&self) {
            self.state().transport_dead = true;
        }

        pub fn param_count(&self, key: &str) -> usize {
            self.state().params.iter().filter(|(k, _)| k == key).count()
        }

        pub fn observe_count(&self, space: &str) -> usize {
            self.state()
                .observe_calls
                .iter()
                .filter(|s| s.as_str() == space)
                .count()
        }
    }

    impl Backend for FakeBackend {
        fn start_session(&mut self, benchmark: &str) -> Result<(), BackendError> {
            let mut state = self.state();
            if state.transport_dead {
                return Err(BackendError::Channel(ChannelError::transport(
                    "backend closed the connection",
                )));
            }
            if state.fail_starts > 0 {
                state.fail_starts -= 1;
                return Err(BackendError::ServiceInit(format!(
                    "rejected session for {benchmark}"
                )));
            }
            state.sessions_started.push(benchmark.to_string());
            Ok(())
        }

        fn end_session(&mut self) -> Result<(), ChannelError> {
            let mut state = self.state();
            if state.transport_dead {
                return Err(ChannelError::transport("backend closed the connection"));
            }
            state.sessions_ended += 1;
            Ok(())
        }

        fn send_param(&mut self, key: &str, value: &str) -> Result<String, ChannelError> {
            let mut state = self.state();
            if state.transport_dead {
                return Err(ChannelError::transport("backend closed the connection"));
            }
            state.params.push((key.to_string(), value.to_string()));
            if key == crate::channel::KEY_SPEC {
                return match &state.spec_blob {
                    Some(blob) => Ok(blob.clone()),
                    None => Err(ChannelError::rejected(key, "no spec configured")),
                };
            }
            Ok(value.to_string())
        }

        fn observe(&mut self, space: &str) -> Result<ObservationPayload, ObservationError> {
            let mut state = self.state();
            if state.transport_dead {
                return Err(ObservationError::Channel(ChannelError::transport(
                    "backend closed the connection",
                )));
            }
            state.observe_calls.push(space.to_string());
            let queue = state
                .payloads
                .get_mut(space)
                .ok_or_else(|| ObservationError::unavailable(space, "compile produced no output"))?;
            if queue.len() > 1 {
                Ok(queue.pop_front().expect("non-empty queue"))
            } else {
                queue
                    .front()
                    .cloned()
                    .ok_or_else(|| ObservationError::unavailable(space, "payload queue empty"))
            }
        }
    }
}
