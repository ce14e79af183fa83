//! Artifact builders shared by the pipeline tests

#![allow(dead_code)]

use std::time::Duration;

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use deploy_scripts::{
    artifacts::{Artifact, ArtifactRegistry},
    executor::{RetryPolicy, TransactionConfig},
    pipeline::{FailurePolicy, PipelineConfig},
    post_deploy::ActionPolicy,
};
use eyre::Result;
use migrations_common::types::ArtifactId;
use serde_json::{json, Value};

/// Creation bytecode shared by every test artifact
pub const BYTECODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52];

/// The role management methods the land registry contracts expose
pub const ROLE_METHODS: &[&str] = &["addMinter", "addPauser"];

/// Build an artifact with the given constructor parameter types and
/// single-address-argument methods
pub fn artifact(name: &str, constructor: &[&str], methods: &[&str]) -> Result<Artifact> {
    let inputs: Vec<Value> = constructor
        .iter()
        .enumerate()
        .map(|(i, ty)| json!({ "name": format!("arg{i}"), "type": ty, "internalType": ty }))
        .collect();

    let mut abi = vec![json!({
        "type": "constructor",
        "stateMutability": "nonpayable",
        "inputs": inputs,
    })];
    for method in methods {
        abi.push(json!({
            "type": "function",
            "name": method,
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "account", "type": "address", "internalType": "address" }],
            "outputs": [],
        }));
    }

    let abi: JsonAbi = serde_json::from_value(Value::Array(abi))?;
    let id: ArtifactId = name.parse()?;
    Ok(Artifact::new(id, abi, Bytes::from_static(BYTECODE)))
}

/// Build a registry from the given artifacts
pub fn registry(artifacts: Vec<Artifact>) -> Result<ArtifactRegistry> {
    let mut registry = ArtifactRegistry::new();
    for artifact in artifacts {
        registry.register(artifact)?;
    }

    Ok(registry)
}

/// A pipeline config with the given policies that retries without sleeping
pub fn config(failure_policy: FailurePolicy, action_policy: ActionPolicy) -> PipelineConfig {
    PipelineConfig {
        failure_policy,
        action_policy,
        transactions: TransactionConfig {
            confirmation_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::ZERO,
            },
        },
    }
}

/// Left-pad a 20-byte address into an ABI word
pub fn address_word(address: alloy::primitives::Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    word
}

/// Encode an integer as an ABI word
pub fn uint_word(n: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&n.to_be_bytes());
    word
}
