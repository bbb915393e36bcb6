use tracing::debug;

use crate::backend::Backend;
use crate::errors::ChannelError;

/// Parameter key carrying the per-compile timeout, in decimal seconds. An
/// empty value clears the timeout backend-side.
pub const KEY_TIMEOUT: &str = "timeout";
/// Parameter key carrying the current action vector as comma-joined decimal
/// integers.
pub const KEY_CHOICES: &str = "choices";
/// Parameter key requesting the encoded capability-spec blob. The request
/// value is empty; the acknowledgement carries the blob.
pub const KEY_SPEC: &str = "gcc_spec";

/// Blocking key -> string round trip to the backend.
///
/// The channel performs no interpretation of payload contents; decoding an
/// encoded blob is the caller's responsibility.
pub struct ParameterChannel<'a> {
    backend: &'a mut dyn Backend,
}

impl<'a> ParameterChannel<'a> {
    /// Wraps a backend connection for one or more round trips.
    pub fn new(backend: &'a mut dyn Backend) -> Self {
        Self { backend }
    }

    /// Sends one key/value pair and returns the backend's acknowledgement.
    pub fn send(&mut self, key: &str, value: &str) -> Result<String, ChannelError> {
        debug!(key, value, "parameter round trip");
        self.backend.send_param(key, value)
    }

    /// Pushes the per-compile timeout. `None` sends an empty value, which
    /// clears any timeout the backend holds.
    pub fn send_timeout(&mut self, timeout: Option<u64>) -> Result<String, ChannelError> {
        let value = timeout.map(|t| t.to_string()).unwrap_or_default();
        self.send(KEY_TIMEOUT, &value)
    }

    /// Transmits an already-encoded action vector.
    pub fn send_choices(&mut self, encoded: &str) -> Result<String, ChannelError> {
        self.send(KEY_CHOICES, encoded)
    }

    /// Requests the encoded capability-spec blob.
    pub fn fetch_spec_blob(&mut self) -> Result<String, ChannelError> {
        self.send(KEY_SPEC, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;

    #[test]
    fn send_timeout_formats_decimal_seconds() {
        let fake = FakeBackend::default();
        let mut backend = fake.clone();
        ParameterChannel::new(&mut backend)
            .send_timeout(Some(30))
            .expect("send");
        assert_eq!(
            fake.state().params,
            vec![(KEY_TIMEOUT.to_string(), "30".to_string())]
        );
    }

    #[test]
    fn send_timeout_none_sends_empty_value_to_clear() {
        let fake = FakeBackend::default();
        let mut backend = fake.clone();
        ParameterChannel::new(&mut backend)
            .send_timeout(None)
            .expect("send");
        assert_eq!(
            fake.state().params,
            vec![(KEY_TIMEOUT.to_string(), String::new())]
        );
    }

    #[test]
    fn fetch_spec_blob_sends_empty_request_value() {
        let fake = FakeBackend::default();
        fake.set_spec_blob("AAAA");
        let mut backend = fake.clone();
        let blob = ParameterChannel::new(&mut backend)
            .fetch_spec_blob()
            .expect("fetch");
        assert_eq!(blob, "AAAA");
        assert_eq!(
            fake.state().params,
            vec![(KEY_SPEC.to_string(), String::new())]
        );
    }
}
