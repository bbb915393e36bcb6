use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::action::decode_choices;
use crate::backend::{Backend, ObservationPayload};
use crate::errors::ObservationError;

/// How a space's raw payload is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeKind {
    /// Plain text passthrough.
    Text,
    /// Integer, either native or parsed from text.
    Int,
    /// Raw byte payload.
    Bytes,
    /// JSON object of string -> integer (for example instruction counts).
    JsonDict,
    /// List of integers, either native or parsed from comma-joined text.
    IntList,
    /// Externally defined structure, passed through undecoded; consumers
    /// deserialize it themselves.
    Opaque,
}

/// A named, typed piece of backend-reported state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationSpace {
    /// Space name used in requests.
    pub name: String,
    /// Decode rule for the space's payload.
    pub kind: DecodeKind,
    /// Whether values depend on the machine the backend runs on.
    pub platform_dependent: bool,
}

impl ObservationSpace {
    /// Creates a space descriptor.
    pub fn new(name: impl Into<String>, kind: DecodeKind, platform_dependent: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            platform_dependent,
        }
    }
}

/// Decoded observation value.
#[derive(Clone, Debug, PartialEq)]
pub enum ObservationValue {
    /// Decoded text.
    Text(String),
    /// Decoded integer.
    Int(i64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Decoded string -> integer mapping.
    Dict(BTreeMap<String, i64>),
    /// Decoded integer list.
    IntList(Vec<i64>),
    /// Undecoded opaque payload.
    Opaque(Vec<u8>),
}

impl ObservationValue {
    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the mapping content, if this is a dict value.
    pub fn as_dict(&self) -> Option<&BTreeMap<String, i64>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the byte content for byte and opaque values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) | Self::Opaque(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the integer-list content, if this is a list value.
    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Self::IntList(values) => Some(values),
            _ => None,
        }
    }
}

/// The observation spaces every gcc backend reports.
pub fn builtin_spaces() -> Vec<ObservationSpace> {
    vec![
        ObservationSpace::new("command_line", DecodeKind::Text, false),
        ObservationSpace::new("source", DecodeKind::Text, false),
        ObservationSpace::new("rtl", DecodeKind::Text, true),
        ObservationSpace::new("asm", DecodeKind::Text, true),
        ObservationSpace::new("asm_size", DecodeKind::Int, true),
        ObservationSpace::new("asm_hash", DecodeKind::Text, true),
        ObservationSpace::new("instruction_counts", DecodeKind::JsonDict, true),
        ObservationSpace::new("obj", DecodeKind::Bytes, true),
        ObservationSpace::new("obj_size", DecodeKind::Int, true),
        ObservationSpace::new("obj_hash", DecodeKind::Text, true),
        ObservationSpace::new("choices", DecodeKind::IntList, false),
    ]
}

/// Named, typed observation retrieval with per-step caching.
///
/// Repeated reads of the same name inside one step return the same value
/// without a re-fetch; [`invalidate`](Self::invalidate) is called at every
/// step and reset boundary.
pub struct ObservationView {
    spaces: HashMap<String, ObservationSpace>,
    cache: HashMap<String, ObservationValue>,
}

impl ObservationView {
    /// Creates a view pre-populated with the builtin gcc spaces.
    pub fn with_builtin_spaces() -> Self {
        let mut view = Self {
            spaces: HashMap::new(),
            cache: HashMap::new(),
        };
        for space in builtin_spaces() {
            view.register(space);
        }
        view
    }

    /// Registers an additional space, replacing any existing descriptor with
    /// the same name.
    pub fn register(&mut self, space: ObservationSpace) {
        self.spaces.insert(space.name.clone(), space);
    }

    /// Looks up a registered space descriptor.
    pub fn space(&self, name: &str) -> Option<&ObservationSpace> {
        self.spaces.get(name)
    }

    /// Drops all cached values.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Fetches and decodes a named observation, serving repeats from the
    /// cache.
    pub fn get(
        &mut self,
        backend: &mut dyn Backend,
        name: &str,
    ) -> Result<ObservationValue, ObservationError> {
        let kind = self
            .spaces
            .get(name)
            .map(|space| space.kind)
            .ok_or_else(|| ObservationError::UnknownSpace(name.to_string()))?;
        if let Some(value) = self.cache.get(name) {
            return Ok(value.clone());
        }
        let payload = backend.observe(name)?;
        let value = decode(name, kind, payload)?;
        debug!(space = name, "observation fetched");
        self.cache.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

fn decode(
    name: &str,
    kind: DecodeKind,
    payload: ObservationPayload,
) -> Result<ObservationValue, ObservationError> {
    match (kind, payload) {
        (DecodeKind::Text, ObservationPayload::Text(text)) => Ok(ObservationValue::Text(text)),
        (DecodeKind::Int, ObservationPayload::Int(value)) => Ok(ObservationValue::Int(value)),
        (DecodeKind::Int, ObservationPayload::Text(text)) => text
            .trim()
            .parse()
            .map(ObservationValue::Int)
            .map_err(|e| ObservationError::malformed(name, format!("not an integer: {e}"))),
        (DecodeKind::Bytes, ObservationPayload::Bytes(bytes)) => Ok(ObservationValue::Bytes(bytes)),
        (DecodeKind::JsonDict, ObservationPayload::Text(text)) => {
            serde_json::from_str::<BTreeMap<String, i64>>(&text)
                .map(ObservationValue::Dict)
                .map_err(|e| ObservationError::malformed(name, format!("not a count mapping: {e}")))
        }
        (DecodeKind::IntList, ObservationPayload::IntList(values)) => {
            Ok(ObservationValue::IntList(values))
        }
        (DecodeKind::IntList, ObservationPayload::Text(text)) => decode_choices(&text)
            .map(ObservationValue::IntList)
            .ok_or_else(|| ObservationError::malformed(name, "not a comma-joined integer list")),
        (DecodeKind::Opaque, ObservationPayload::Bytes(bytes)) => {
            Ok(ObservationValue::Opaque(bytes))
        }
        (DecodeKind::Opaque, ObservationPayload::Text(text)) => {
            Ok(ObservationValue::Opaque(text.into_bytes()))
        }
        (kind, payload) => Err(ObservationError::malformed(
            name,
            format!("{} payload does not satisfy {kind:?}", payload.shape()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;

    #[test]
    fn unknown_space_fails_without_a_backend_call() {
        let fake = FakeBackend::default();
        let mut backend = fake.clone();
        let mut view = ObservationView::with_builtin_spaces();
        let err = view.get(&mut backend, "no_such_space").expect_err("unknown");
        assert!(matches!(err, ObservationError::UnknownSpace(name) if name == "no_such_space"));
        assert_eq!(fake.observe_count("no_such_space"), 0);
    }

    #[test]
    fn instruction_counts_decode_to_a_mapping() {
        let fake = FakeBackend::default();
        fake.push_payload(
            "instruction_counts",
            ObservationPayload::Text(r#"{"mov":10,"jmp":2}"#.into()),
        );
        let mut backend = fake.clone();
        let mut view = ObservationView::with_builtin_spaces();
        let value = view.get(&mut backend, "instruction_counts").expect("get");
        let dict = value.as_dict().expect("dict");
        assert_eq!(dict.get("mov"), Some(&10));
        assert_eq!(dict.get("jmp"), Some(&2));
    }

    #[test]
    fn integer_spaces_accept_text_payloads() {
        let fake = FakeBackend::default();
        fake.push_payload("asm_size", ObservationPayload::Text(" 1824 ".into()));
        let mut backend = fake.clone();
        let mut view = ObservationView::with_builtin_spaces();
        let value = view.get(&mut backend, "asm_size").expect("get");
        assert_eq!(value.as_int(), Some(1824));
    }

    #[test]
    fn mismatched_payload_shape_is_malformed() {
        let fake = FakeBackend::default();
        fake.push_payload("asm_size", ObservationPayload::Bytes(vec![1, 2]));
        let mut backend = fake.clone();
        let mut view = ObservationView::with_builtin_spaces();
        let err = view.get(&mut backend, "asm_size").expect_err("shape");
        assert!(matches!(err, ObservationError::Malformed { .. }));
    }

    #[test]
    fn repeated_reads_within_a_step_hit_the_cache() {
        let fake = FakeBackend::default();
        fake.push_payload("asm_size", ObservationPayload::Int(100));
        fake.push_payload("asm_size", ObservationPayload::Int(50));
        let mut backend = fake.clone();
        let mut view = ObservationView::with_builtin_spaces();

        let first = view.get(&mut backend, "asm_size").expect("first");
        let second = view.get(&mut backend, "asm_size").expect("second");
        assert_eq!(first, second);
        assert_eq!(fake.observe_count("asm_size"), 1);

        view.invalidate();
        let third = view.get(&mut backend, "asm_size").expect("third");
        assert_eq!(third.as_int(), Some(50));
        assert_eq!(fake.observe_count("asm_size"), 2);
    }

    #[test]
    fn unavailable_observation_is_surfaced() {
        let fake = FakeBackend::default();
        let mut backend = fake.clone();
        let mut view = ObservationView::with_builtin_spaces();
        let err = view.get(&mut backend, "asm").expect_err("unavailable");
        assert!(matches!(err, ObservationError::Unavailable { space, .. } if space == "asm"));
    }

    #[test]
    fn builtin_registry_covers_the_backend_contract() {
        let view = ObservationView::with_builtin_spaces();
        for name in [
            "command_line",
            "source",
            "rtl",
            "asm",
            "asm_size",
            "asm_hash",
            "instruction_counts",
            "obj",
            "obj_size",
            "obj_hash",
            "choices",
        ] {
            assert!(view.space(name).is_some(), "missing builtin space {name}");
        }
        assert_eq!(view.space("asm_size").map(|s| s.kind), Some(DecodeKind::Int));
        assert_eq!(
            view.space("choices").map(|s| s.platform_dependent),
            Some(false)
        );
    }
}
