//! Saved brains.
//!
//! Files hold the bare JSON each learner exports: a [`DqnSnapshot`]
//! `{nh, ns, na, net}`, a [`TdSnapshot`] `{ns, na, q, p}`, or a plain
//! [`Net`] `{name: {n, d, w}}`. [`load_brain`] tells them apart by shape.

use crate::error::{IoError, Result};
use crate::serialization::{read_json_file, write_json_file};
use serde::{Deserialize, Serialize};
use std::path::Path;
use waterworld_core::rl::{DqnSnapshot, Net, TdSnapshot};

/// Any brain file. Untagged so files stay in the learners' own format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Brain {
    Dqn(DqnSnapshot),
    Td(TdSnapshot),
    Net(Net),
}

impl Brain {
    pub fn kind(&self) -> &'static str {
        match self {
            Brain::Dqn(_) => "dqn",
            Brain::Td(_) => "td",
            Brain::Net(_) => "net",
        }
    }
}

pub fn save_brain<P: AsRef<Path>>(brain: &Brain, path: P) -> Result<()> {
    write_json_file(brain, path)
}

pub fn load_brain<P: AsRef<Path>>(path: P) -> Result<Brain> {
    let brain: Brain = read_json_file(&path)?;
    validate(&brain).map_err(|e| e.with_context(format!("loading {:?}", path.as_ref())))?;
    Ok(brain)
}

pub fn load_dqn<P: AsRef<Path>>(path: P) -> Result<DqnSnapshot> {
    match load_brain(&path)? {
        Brain::Dqn(snapshot) => Ok(snapshot),
        other => Err(mismatch("dqn", &other, path.as_ref())),
    }
}

pub fn load_td<P: AsRef<Path>>(path: P) -> Result<TdSnapshot> {
    match load_brain(&path)? {
        Brain::Td(snapshot) => Ok(snapshot),
        other => Err(mismatch("td", &other, path.as_ref())),
    }
}

/// Loads a network from either a plain net file or a DQN snapshot.
pub fn load_net<P: AsRef<Path>>(path: P) -> Result<Net> {
    match load_brain(&path)? {
        Brain::Net(net) => Ok(net),
        Brain::Dqn(snapshot) => Ok(snapshot.net),
        other => Err(mismatch("net", &other, path.as_ref())),
    }
}

fn mismatch(expected: &str, found: &Brain, path: &Path) -> IoError {
    IoError::validation(format!(
        "{:?} holds a {} brain, expected {}",
        path,
        found.kind(),
        expected
    ))
}

fn validate(brain: &Brain) -> Result<()> {
    match brain {
        Brain::Dqn(s) => {
            if !s.net.is_finite() {
                return Err(IoError::validation("DQN network holds non-finite weights"));
            }
            Ok(())
        }
        Brain::Td(s) => {
            let cells = s.ns * s.na;
            if s.q.len() != cells || s.p.len() != cells {
                return Err(IoError::validation(format!(
                    "TD tables must hold {} entries, got q={} p={}",
                    cells,
                    s.q.len(),
                    s.p.len()
                )));
            }
            Ok(())
        }
        Brain::Net(net) => {
            if net.is_empty() {
                return Err(IoError::validation("Network has no parameters"));
            }
            if !net.is_finite() {
                return Err(IoError::validation("Network holds non-finite weights"));
            }
            Ok(())
        }
    }
}
