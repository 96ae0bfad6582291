//! JSON helpers and the HexDNA gene format.
//!
//! HexDNA is the hex encoding of a gene's weights as little-endian `f64`
//! bytes, sixteen hex characters per weight. It round-trips exactly, which
//! JSON floats only do when the printer cooperates.

use crate::error::{IoError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use waterworld_core::evolution::Chromosome;

const HEX_PER_WEIGHT: usize = 16;

pub fn to_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| IoError::serialization(format!("JSON serialization failed: {}", e)))
}

pub fn to_json_pretty<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| IoError::serialization(format!("JSON serialization failed: {}", e)))
}

/// Parses `json`, rejecting blank input up front.
pub fn from_json<T>(json: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    if json.trim().is_empty() {
        return Err(IoError::validation("Empty JSON string"));
    }
    serde_json::from_str(json)
        .map_err(|e| IoError::serialization(format!("JSON deserialization failed: {}", e)))
}

/// Converts an already-parsed value, as found inside worker messages.
pub fn from_value<T>(value: serde_json::Value) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value)
        .map_err(|e| IoError::serialization(format!("JSON deserialization failed: {}", e)))
}

pub fn to_value<T: Serialize>(data: &T) -> Result<serde_json::Value> {
    serde_json::to_value(data)
        .map_err(|e| IoError::serialization(format!("JSON serialization failed: {}", e)))
}

pub fn encode_gene(gene: &[f64]) -> String {
    let mut bytes = Vec::with_capacity(gene.len() * 8);
    for w in gene {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    hex::encode(bytes)
}

pub fn decode_gene(hex_str: &str) -> Result<Vec<f64>> {
    let hex_str = hex_str.trim();
    if hex_str.is_empty() {
        return Err(IoError::validation("Empty hex string"));
    }
    if hex_str.len() % HEX_PER_WEIGHT != 0 {
        return Err(IoError::validation(format!(
            "HexDNA length {} is not a multiple of {}",
            hex_str.len(),
            HEX_PER_WEIGHT
        )));
    }
    let bytes = hex::decode(hex_str)
        .map_err(|e| IoError::validation(format!("Invalid hex encoding: {}", e)))?;
    let gene: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            f64::from_le_bytes(word)
        })
        .collect();
    if gene.iter().any(|w| !w.is_finite()) {
        return Err(IoError::validation("HexDNA holds a non-finite weight"));
    }
    Ok(gene)
}

pub fn is_valid_hex_dna(hex_str: &str) -> bool {
    decode_gene(hex_str).is_ok()
}

pub fn to_hex_dna(chromosome: &Chromosome) -> String {
    encode_gene(&chromosome.gene)
}

/// Fresh, unevaluated chromosome carrying the decoded gene.
pub fn from_hex_dna(hex_str: &str) -> Result<Chromosome> {
    decode_gene(hex_str).map(Chromosome::new)
}

pub fn write_json_file<T, P>(data: &T, path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let json = to_json_pretty(data)?;
    std::fs::write(&path, json).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("writing JSON to {:?}", path.as_ref()))
    })
}

pub fn read_json_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(IoError::not_found(format!("{:?}", path)));
    }
    let json = std::fs::read_to_string(path).map_err(|e| {
        IoError::FileSystem(e).with_context(format!("reading JSON from {:?}", path))
    })?;
    from_json(&json).map_err(|e| e.with_context(format!("parsing {:?}", path)))
}
