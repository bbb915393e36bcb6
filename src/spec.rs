use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::errors::EnvError;

/// One tunable compiler option: an ordered list of legal choice labels.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GccOption {
    /// Flag family name (for example `-O` or `-finline-limit`).
    pub name: String,
    /// Legal choice labels, in the order the backend reports them.
    pub choices: Vec<String>,
}

impl GccOption {
    /// Creates an option from a name and its choice labels.
    pub fn new(
        name: impl Into<String>,
        choices: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}

/// Backend-reported description of the available options and their legal
/// choices.
///
/// Immutable once fetched; the session caches it for its whole lifetime and
/// only discards it when the underlying connection is replaced.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GccSpec {
    /// Compiler version string reported by the backend.
    pub version: String,
    /// Ordered option list; actions carry one choice per entry.
    pub options: Vec<GccOption>,
}

impl GccSpec {
    /// Decodes the text-safe blob returned for the `gcc_spec` parameter key:
    /// base64 over a JSON document.
    pub fn from_blob(blob: &str) -> Result<Self, EnvError> {
        let bytes = BASE64
            .decode(blob.trim())
            .map_err(|e| EnvError::SpecDecode(format!("invalid base64: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EnvError::SpecDecode(format!("invalid spec document: {e}")))
    }

    /// Inverse of [`from_blob`](Self::from_blob); used by backends serving the
    /// spec and by tests.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn small_spec() -> GccSpec {
        GccSpec {
            version: "11.2.0".into(),
            options: vec![
                GccOption::new("-O", ["0", "1", "2", "3", "s"]),
                GccOption::new("-finline-limit", ["100", "1000"]),
            ],
        }
    }

    #[test]
    fn blob_decode_reverses_encode() {
        let spec = small_spec();
        let blob = spec.to_blob().expect("encode");
        assert_eq!(GccSpec::from_blob(&blob).expect("decode"), spec);
    }

    #[test]
    fn from_blob_rejects_non_base64_input() {
        assert!(matches!(
            GccSpec::from_blob("not base64!!!"),
            Err(EnvError::SpecDecode(msg)) if msg.contains("base64")
        ));
    }

    #[test]
    fn from_blob_rejects_unexpected_documents() {
        let blob = BASE64.encode(b"[1,2,3]");
        assert!(matches!(
            GccSpec::from_blob(&blob),
            Err(EnvError::SpecDecode(msg)) if msg.contains("spec document")
        ));
    }
}
