//! Agent worker: owns learner sessions and answers protocol messages.
//!
//! [`AgentHost`] is the synchronous core. [`spawn_worker`] moves a host onto
//! a tokio task so callers can drive it over a channel, one request at a
//! time.

use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use waterworld_core::mdp::{Environment, GridWorld};
use waterworld_core::rl::{DpAgent, DqnAgent, DqnSnapshot, TdAgent, TdSnapshot};
use waterworld_io::protocol::{DpInit, DqnInit, TdInit};
use waterworld_io::{Command, SessionId, Target, WorkerRequest, WorkerResponse};

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    #[error("Session {session} runs {actual:?}, request targets {requested:?}")]
    TargetMismatch {
        session: SessionId,
        actual: Target,
        requested: Target,
    },

    #[error("{cmd:?} is not supported for {target:?} agents")]
    Unsupported { cmd: Command, target: Target },

    #[error("State {state} is out of range for {num_states} states")]
    StateOutOfRange { state: usize, num_states: usize },

    #[error("State {0} has no available actions")]
    NoActions(usize),
}

enum Session {
    Dqn(DqnAgent),
    Td(TdAgent),
    Dp(DpAgent),
}

impl Session {
    fn target(&self) -> Target {
        match self {
            Session::Dqn(_) => Target::Dqn,
            Session::Td(_) => Target::Td,
            Session::Dp(_) => Target::Dp,
        }
    }
}

/// A reward, optionally flagged as the last one of an episode.
#[derive(Deserialize)]
#[serde(untagged)]
enum LearnInput {
    Reward(f64),
    Step {
        reward: f64,
        #[serde(default)]
        done: bool,
    },
}

impl LearnInput {
    fn parts(&self) -> (f64, bool) {
        match *self {
            LearnInput::Reward(r) => (r, false),
            LearnInput::Step { reward, done } => (reward, done),
        }
    }
}

/// Learner sessions keyed by id. Every request is answered; failures come
/// back as `"error"` responses.
#[derive(Default)]
pub struct AgentHost {
    sessions: HashMap<SessionId, Session>,
}

impl AgentHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        let cmd = request.cmd;
        match self.dispatch(&request) {
            Ok((session, output)) => WorkerResponse::complete(cmd, session, output),
            Err(e) => {
                tracing::warn!(cmd = ?cmd, target = ?request.target, error = %e, "Worker request failed");
                WorkerResponse::error(cmd, request.session, format!("{:#}", e))
            }
        }
    }

    fn dispatch(&mut self, request: &WorkerRequest) -> anyhow::Result<(Option<SessionId>, Value)> {
        if request.cmd == Command::Init {
            let id = Uuid::new_v4();
            let (session, info) = init_session(request)?;
            self.sessions.insert(id, session);
            tracing::debug!(session = %id, target = ?request.target, "Session opened");
            return Ok((Some(id), info));
        }

        let id = request.require_session()?;
        if request.cmd == Command::Stop {
            self.sessions
                .remove(&id)
                .ok_or(HostError::UnknownSession(id))?;
            tracing::debug!(session = %id, "Session closed");
            return Ok((Some(id), Value::Null));
        }

        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(HostError::UnknownSession(id))?;
        if session.target() != request.target {
            return Err(HostError::TargetMismatch {
                session: id,
                actual: session.target(),
                requested: request.target,
            }
            .into());
        }

        let output = match (request.cmd, session) {
            (Command::Act, Session::Dqn(agent)) => {
                let state: Vec<f64> = request.payload()?;
                anyhow::ensure!(
                    state.len() == agent.num_states(),
                    "DQN expects {} inputs, got {}",
                    agent.num_states(),
                    state.len()
                );
                json!(agent.act(&state))
            }
            (Command::Act, Session::Td(agent)) => {
                let s: usize = request.payload()?;
                check_state(agent.env(), s)?;
                json!(agent.act(s))
            }
            (Command::Act, Session::Dp(agent)) => {
                let s: usize = request.payload()?;
                check_state(agent.env(), s)?;
                json!(agent.act(s))
            }
            (Command::Learn, Session::Dqn(agent)) => {
                let (reward, done) = request.payload::<LearnInput>()?.parts();
                let mut tderror = agent.learn(reward);
                if done {
                    tderror = agent.end_episode();
                }
                json!(tderror)
            }
            (Command::Learn, Session::Td(agent)) => {
                let (reward, done) = request.payload::<LearnInput>()?.parts();
                agent.learn(reward);
                if done {
                    agent.end_episode();
                }
                Value::Null
            }
            (Command::Learn, Session::Dp(agent)) => json!(agent.learn()),
            (Command::Load, Session::Dqn(agent)) => {
                let snapshot: DqnSnapshot = request.payload()?;
                agent.load(snapshot).context("loading DQN snapshot")?;
                Value::Null
            }
            (Command::Load, Session::Td(agent)) => {
                let snapshot: TdSnapshot = request.payload()?;
                agent.load(snapshot).context("loading TD snapshot")?;
                Value::Null
            }
            (cmd, session) => {
                return Err(HostError::Unsupported {
                    cmd,
                    target: session.target(),
                }
                .into())
            }
        };
        Ok((Some(id), output))
    }
}

/// The state must exist and offer at least one action.
fn check_state(env: &dyn Environment, state: usize) -> Result<(), HostError> {
    let num_states = env.num_states();
    if state >= num_states {
        return Err(HostError::StateOutOfRange { state, num_states });
    }
    if env.allowed_actions(state).is_empty() {
        return Err(HostError::NoActions(state));
    }
    Ok(())
}

fn grid_env(env: Option<GridWorld>) -> anyhow::Result<Arc<dyn Environment>> {
    let grid = env.unwrap_or_else(GridWorld::cliff_demo);
    grid.validate()?;
    Ok(Arc::new(grid))
}

fn init_session(request: &WorkerRequest) -> anyhow::Result<(Session, Value)> {
    match request.target {
        Target::Dqn => {
            let init: DqnInit = request.payload()?;
            let agent = DqnAgent::new(init.num_states, init.num_actions, init.options)?;
            let info = json!({ "num_states": init.num_states, "num_actions": init.num_actions });
            Ok((Session::Dqn(agent), info))
        }
        Target::Td => {
            let init: TdInit = request.payload()?;
            let env = grid_env(init.env)?;
            let info = json!({ "num_states": env.num_states(), "num_actions": env.max_num_actions() });
            Ok((Session::Td(TdAgent::new(env, init.options)?), info))
        }
        Target::Dp => {
            let init: DpInit = request.payload()?;
            let env = grid_env(init.env)?;
            let info = json!({ "num_states": env.num_states(), "num_actions": env.max_num_actions() });
            Ok((Session::Dp(DpAgent::new(env, init.options)?), info))
        }
    }
}

struct Job {
    request: WorkerRequest,
    reply: oneshot::Sender<WorkerResponse>,
}

/// Cloneable handle to a running worker task.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Job>,
}

impl WorkerHandle {
    /// Sends one request and waits for its reply.
    pub async fn request(&self, request: WorkerRequest) -> anyhow::Result<WorkerResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job { request, reply })
            .await
            .map_err(|_| anyhow::anyhow!("Worker task has stopped"))?;
        rx.await.context("Worker dropped the request")
    }
}

/// Starts a host on its own task. The task ends when every handle is
/// dropped.
pub fn spawn_worker(buffer: usize) -> WorkerHandle {
    let (tx, mut rx) = mpsc::channel::<Job>(buffer.max(1));
    tokio::spawn(async move {
        let mut host = AgentHost::new();
        while let Some(job) = rx.recv().await {
            let response = host.handle(job.request);
            if job.reply.send(response).is_err() {
                tracing::debug!("Worker reply receiver dropped");
            }
        }
        tracing::debug!(open_sessions = host.len(), "Worker stopped");
    });
    WorkerHandle { tx }
}

/// Serves newline-delimited JSON requests from stdin, one response line per
/// request on stdout.
pub async fn serve_stdio() -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let worker = spawn_worker(16);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match waterworld_io::protocol::parse_request(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed request");
                continue;
            }
        };
        let response = worker.request(request).await?;
        let mut out = waterworld_io::protocol::encode_response(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waterworld_io::Status;

    fn init(host: &mut AgentHost, target: Target, input: Value) -> SessionId {
        let resp = host.handle(WorkerRequest::new(Command::Init, target, None, input));
        assert_eq!(resp.msg, Status::Complete, "{:?}", resp.input);
        resp.session.unwrap()
    }

    #[test]
    fn test_td_session_lifecycle() {
        let mut host = AgentHost::new();
        let id = init(&mut host, Target::Td, json!({ "options": { "seed": 1 } }));
        assert_eq!(host.len(), 1);

        let act = host.handle(WorkerRequest::new(Command::Act, Target::Td, Some(id), json!(0)));
        assert!(act.is_complete());
        assert!(act.input.as_u64().unwrap() < 4);

        let learn = host.handle(WorkerRequest::new(
            Command::Learn,
            Target::Td,
            Some(id),
            json!({ "reward": 1.0, "done": true }),
        ));
        assert!(learn.is_complete());

        let stop = host.handle(WorkerRequest::new(Command::Stop, Target::Td, Some(id), Value::Null));
        assert!(stop.is_complete());
        assert!(host.is_empty());
    }

    #[test]
    fn test_unknown_session_and_wrong_target() {
        let mut host = AgentHost::new();
        let id = init(&mut host, Target::Dp, json!({}));
        let wrong = host.handle(WorkerRequest::new(Command::Act, Target::Td, Some(id), json!(0)));
        assert_eq!(wrong.msg, Status::Error);

        let missing = host.handle(WorkerRequest::new(
            Command::Act,
            Target::Dp,
            Some(Uuid::new_v4()),
            json!(0),
        ));
        assert_eq!(missing.msg, Status::Error);
        assert!(missing.input.as_str().unwrap().contains("Unknown session"));
    }

    #[test]
    fn test_dp_load_is_unsupported() {
        let mut host = AgentHost::new();
        let id = init(&mut host, Target::Dp, json!({}));
        let resp = host.handle(WorkerRequest::new(Command::Load, Target::Dp, Some(id), json!({})));
        assert_eq!(resp.msg, Status::Error);
    }

    #[test]
    fn test_dqn_rejects_wrong_state_length() {
        let mut host = AgentHost::new();
        let id = init(&mut host, Target::Dqn, json!({ "num_states": 3, "num_actions": 2 }));
        let bad = host.handle(WorkerRequest::new(Command::Act, Target::Dqn, Some(id), json!([1.0])));
        assert_eq!(bad.msg, Status::Error);
        let good = host.handle(WorkerRequest::new(
            Command::Act,
            Target::Dqn,
            Some(id),
            json!([1.0, 0.0, 0.5]),
        ));
        assert!(good.is_complete());
    }

    #[test]
    fn test_out_of_range_state_is_an_error() {
        let mut host = AgentHost::new();
        let id = init(&mut host, Target::Td, json!({}));
        let resp = host.handle(WorkerRequest::new(Command::Act, Target::Td, Some(id), json!(1000)));
        assert_eq!(resp.msg, Status::Error);
        // Cell 22 is a wall in the demo grid.
        let blocked = host.handle(WorkerRequest::new(Command::Act, Target::Td, Some(id), json!(22)));
        assert_eq!(blocked.msg, Status::Error);
    }
}
