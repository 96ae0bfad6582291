//! # WaterWorld IO
//!
//! Persistence and wire formats for the WaterWorld sandbox:
//! - Structured error handling with [`IoError`]
//! - JSON and HexDNA helpers
//! - Saved brain files
//! - The agent worker message protocol

/// Error types and result aliases for I/O operations
pub mod error;
/// Brain files for DQN, TD and plain networks
pub mod persistence;
/// Worker request/response messages and their payloads
pub mod protocol;
/// JSON helpers and the HexDNA gene format
pub mod serialization;

pub use error::{IoError, Result};
pub use persistence::{load_brain, load_dqn, load_net, load_td, save_brain, Brain};
pub use protocol::{Command, SessionId, Status, Target, WorkerRequest, WorkerResponse};
pub use serialization::{
    decode_gene, encode_gene, from_hex_dna, from_json, is_valid_hex_dna, read_json_file,
    to_hex_dna, to_json, to_json_pretty, write_json_file,
};
