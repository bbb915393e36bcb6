use std::path::PathBuf;

use crate::errors::EnvError;

/// Benchmark used when the caller does not name one.
pub const DEFAULT_BENCHMARK: &str = "benchmark://chstone-v0/adpcm";

/// Reference to the compiler backend executable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendRef {
    /// Path to a local backend binary.
    Binary(PathBuf),
    /// Docker image identifier, written `docker:IMAGE` in the raw form.
    DockerImage(String),
}

impl BackendRef {
    /// Parses a raw backend reference: `docker:IMAGE` or a filesystem path.
    pub fn parse(raw: &str) -> Result<Self, EnvError> {
        if let Some(image) = raw.strip_prefix("docker:") {
            if image.trim().is_empty() {
                return Err(EnvError::Construction(
                    "docker image name must not be empty".into(),
                ));
            }
            return Ok(Self::DockerImage(image.to_string()));
        }
        if raw.trim().is_empty() {
            return Err(EnvError::Construction(
                "backend reference must not be empty".into(),
            ));
        }
        Ok(Self::Binary(PathBuf::from(raw)))
    }

    /// Validates the reference eagerly, before any process or network session
    /// begins, so a bad backend fails fast instead of surfacing as a slow
    /// connection timeout.
    pub fn validate(&self) -> Result<(), EnvError> {
        match self {
            Self::Binary(path) => {
                if !path.is_file() {
                    return Err(EnvError::Construction(format!(
                        "backend binary not found: {}",
                        path.display()
                    )));
                }
                Ok(())
            }
            Self::DockerImage(image) => {
                if image.contains(char::is_whitespace) {
                    return Err(EnvError::Construction(format!(
                        "invalid docker image name: '{image}'"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Configuration used to open a [`CompilerSession`](crate::session::CompilerSession).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Human-readable session name (useful for logs).
    pub name: String,
    /// Backend the session drives.
    pub backend: BackendRef,
    /// Benchmark established by `reset` when none is passed explicitly.
    pub benchmark: String,
    /// Per-compile timeout in seconds; `None` leaves the backend unbounded.
    pub timeout: Option<u64>,
    /// Observation space returned from `reset`, if any.
    pub reset_observation: Option<String>,
}

impl SessionConfig {
    /// Creates a config with defaults for the given backend.
    pub fn new(backend: BackendRef) -> Self {
        Self {
            name: "gcc-session".to_string(),
            backend,
            benchmark: DEFAULT_BENCHMARK.to_string(),
            timeout: None,
            reset_observation: None,
        }
    }

    /// Overrides the session name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the default benchmark.
    pub fn benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = benchmark.into();
        self
    }

    /// Sets the per-compile timeout in seconds.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Names the observation space returned from `reset`.
    pub fn reset_observation(mut self, space: impl Into<String>) -> Self {
        self.reset_observation = Some(space.into());
        self
    }
}
