//! Message contract between a front end and an agent worker.
//!
//! Requests look like `{cmd, target, session?, input}` and responses like
//! `{cmd, msg, session?, input}`, where `msg` is `"complete"` or `"error"`.
//! `init` opens a session and every later request names it.

use crate::error::{IoError, Result};
use crate::serialization::{from_json, from_value, to_json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use waterworld_core::mdp::GridWorld;
use waterworld_core::rl::{DpOptions, DqnOptions, TdOptions};

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Init,
    Act,
    Learn,
    Load,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "DQN")]
    Dqn,
    #[serde(rename = "TD")]
    Td,
    #[serde(rename = "DP")]
    Dp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub cmd: Command,
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub cmd: Command,
    pub msg: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    #[serde(default)]
    pub input: Value,
}

impl WorkerRequest {
    pub fn new(cmd: Command, target: Target, session: Option<SessionId>, input: Value) -> Self {
        Self {
            cmd,
            target,
            session,
            input,
        }
    }

    /// The session every command except `init` must carry.
    pub fn require_session(&self) -> Result<SessionId> {
        self.session
            .ok_or_else(|| IoError::protocol(format!("{:?} request without a session", self.cmd)))
    }

    /// Decodes `input` into the payload type the command expects.
    pub fn payload<T>(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        from_value(self.input.clone())
            .map_err(|e| e.with_context(format!("decoding {:?} input", self.cmd)))
    }
}

impl WorkerResponse {
    pub fn complete(cmd: Command, session: Option<SessionId>, input: Value) -> Self {
        Self {
            cmd,
            msg: Status::Complete,
            session,
            input,
        }
    }

    /// Error reply; the message travels in `input`.
    pub fn error(cmd: Command, session: Option<SessionId>, message: impl Into<String>) -> Self {
        Self {
            cmd,
            msg: Status::Error,
            session,
            input: Value::String(message.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.msg == Status::Complete
    }
}

/// `init` payload for a DQN session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqnInit {
    pub num_states: usize,
    pub num_actions: usize,
    #[serde(default)]
    pub options: DqnOptions,
}

/// `init` payload for a TD session. Without `env` the cliff demo grid is
/// used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TdInit {
    #[serde(default)]
    pub env: Option<GridWorld>,
    #[serde(default)]
    pub options: TdOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DpInit {
    #[serde(default)]
    pub env: Option<GridWorld>,
    #[serde(default)]
    pub options: DpOptions,
}

pub fn parse_request(line: &str) -> Result<WorkerRequest> {
    from_json(line).map_err(|e| e.with_context("parsing worker request"))
}

pub fn parse_response(line: &str) -> Result<WorkerResponse> {
    from_json(line).map_err(|e| e.with_context("parsing worker response"))
}

pub fn encode_response(response: &WorkerResponse) -> Result<String> {
    to_json(response)
}

pub fn encode_request(request: &WorkerRequest) -> Result<String> {
    to_json(request)
}
