use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::backend::{Backend, ObservationPayload};
use crate::config::BackendRef;
use crate::errors::{BackendError, ChannelError, EnvError, ObservationError};

/// One request frame sent to the backend process.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Request {
    StartSession { benchmark: String },
    EndSession,
    Param { key: String, value: String },
    Observe { space: String },
}

/// Error kinds a backend process can report in a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ErrorKind {
    ServiceInit,
    Rejected,
    Unavailable,
}

/// One response frame read from the backend process.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Response {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<ObservationPayload>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

/// Blocking transport to a compiler backend subprocess.
///
/// Frames are newline-delimited JSON: one request line out, one response line
/// back, strictly alternating. The process is killed when the transport is
/// dropped so an abandoned session cannot leak it.
pub struct StdioBackend {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioBackend {
    /// Spawns the backend process for the given reference. A spawn failure
    /// surfaces as a construction error, before any session exists.
    pub fn launch(backend: &BackendRef) -> Result<Self, EnvError> {
        let mut command = match backend {
            BackendRef::Binary(path) => Command::new(path),
            BackendRef::DockerImage(image) => {
                let mut command = Command::new("docker");
                command.args(["run", "--rm", "-i"]).arg(image);
                command
            }
        };
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| EnvError::Construction(format!("failed to launch backend: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EnvError::Construction("backend stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EnvError::Construction("backend stdout unavailable".into()))?;
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn round_trip(&mut self, request: &Request) -> Result<Response, ChannelError> {
        let frame = serde_json::to_string(request)
            .map_err(|e| ChannelError::transport(format!("request encode failed: {e}")))?;
        debug!(frame = %frame, "backend request");
        writeln!(self.stdin, "{frame}")
            .map_err(|e| ChannelError::transport(format!("backend write failed: {e}")))?;
        self.stdin
            .flush()
            .map_err(|e| ChannelError::transport(format!("backend flush failed: {e}")))?;

        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| ChannelError::transport(format!("backend read failed: {e}")))?;
        if read == 0 {
            return Err(ChannelError::transport("backend closed the connection"));
        }
        serde_json::from_str(&line)
            .map_err(|e| ChannelError::transport(format!("response decode failed: {e}")))
    }
}

impl Backend for StdioBackend {
    fn start_session(&mut self, benchmark: &str) -> Result<(), BackendError> {
        let response = self.round_trip(&Request::StartSession {
            benchmark: benchmark.to_string(),
        })?;
        start_response(response)
    }

    fn end_session(&mut self) -> Result<(), ChannelError> {
        match self.round_trip(&Request::EndSession)? {
            Response::Ok { .. } => Ok(()),
            Response::Error { message, .. } => Err(ChannelError::transport(message)),
        }
    }

    fn send_param(&mut self, key: &str, value: &str) -> Result<String, ChannelError> {
        let response = self.round_trip(&Request::Param {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        param_response(key, response)
    }

    fn observe(&mut self, space: &str) -> Result<ObservationPayload, ObservationError> {
        let response = self
            .round_trip(&Request::Observe {
                space: space.to_string(),
            })
            .map_err(ObservationError::Channel)?;
        observe_response(space, response)
    }
}

impl Drop for StdioBackend {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn start_response(response: Response) -> Result<(), BackendError> {
    match response {
        Response::Ok { .. } => Ok(()),
        Response::Error {
            kind: ErrorKind::ServiceInit,
            message,
        } => Err(BackendError::ServiceInit(message)),
        Response::Error { message, .. } => {
            Err(BackendError::Channel(ChannelError::transport(message)))
        }
    }
}

fn param_response(key: &str, response: Response) -> Result<String, ChannelError> {
    match response {
        Response::Ok { value, .. } => Ok(value.unwrap_or_default()),
        Response::Error {
            kind: ErrorKind::Rejected,
            message,
        } => Err(ChannelError::rejected(key, message)),
        Response::Error { message, .. } => Err(ChannelError::transport(message)),
    }
}

fn observe_response(space: &str, response: Response) -> Result<ObservationPayload, ObservationError> {
    match response {
        Response::Ok {
            payload: Some(payload),
            ..
        } => Ok(payload),
        Response::Ok { payload: None, .. } => Err(ObservationError::malformed(
            space,
            "response frame carried no payload",
        )),
        Response::Error {
            kind: ErrorKind::Unavailable,
            message,
        } => Err(ObservationError::unavailable(space, message)),
        Response::Error { message, .. } => {
            Err(ObservationError::Channel(ChannelError::transport(message)))
        }
    }
}
