//! The artifact registry: resolves a logical contract name to its creation
//! bytecode and ABI.
//!
//! Artifacts are registered once at startup from build output and are only
//! read afterwards.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy::{
    json_abi::{JsonAbi, Param},
    primitives::Bytes,
};
use migrations_common::types::ArtifactId;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    constants::{
        ABI_EXTENSION, BIN_EXTENSION, BUILD_INFO_DIR, DEBUG_ARTIFACT_SUFFIX, HEX_PREFIX,
        JSON_EXTENSION, UNLINKED_LIBRARY_MARKER,
    },
    errors::{DeployError, ScriptError},
};

/// A deployable contract: creation bytecode plus its interface
#[derive(Clone, Debug)]
pub struct Artifact {
    /// The id under which the artifact is registered
    pub id: ArtifactId,
    /// The contract ABI
    pub abi: JsonAbi,
    /// The creation bytecode, without constructor arguments
    pub bytecode: Bytes,
}

/// The bytecode field of a JSON artifact.
///
/// Truffle and Hardhat store a hex string, Foundry nests it under `object`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// A bare hex string
    Hex(String),
    /// A Foundry-style bytecode object
    Object {
        /// The hex-encoded bytecode
        object: String,
    },
}

/// The subset of a JSON compilation artifact used for deployment
#[derive(Deserialize)]
struct RawArtifact {
    /// The contract ABI
    abi: JsonAbi,
    /// The creation bytecode
    bytecode: RawBytecode,
}

impl Artifact {
    /// Construct an artifact from its parts
    pub fn new(id: ArtifactId, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self { id, abi, bytecode }
    }

    /// Parse a Truffle, Hardhat, or Foundry JSON artifact
    pub fn from_json(id: ArtifactId, json: &str) -> Result<Self, ScriptError> {
        let raw: RawArtifact = serde_json::from_str(json)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{id}: {e}")))?;
        let hex = match raw.bytecode {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        };
        let bytecode = parse_bytecode(&id, &hex)?;

        Ok(Self::new(id, raw.abi, bytecode))
    }

    /// Parse an artifact split into `solc --abi` and `solc --bin` outputs
    pub fn from_parts(id: ArtifactId, abi: &str, bin: &str) -> Result<Self, ScriptError> {
        let abi: JsonAbi = serde_json::from_str(abi)
            .map_err(|e| ScriptError::ArtifactParsing(format!("{id}: {e}")))?;
        let bytecode = parse_bytecode(&id, bin)?;

        Ok(Self::new(id, abi, bytecode))
    }

    /// The declared constructor parameters; empty if the contract declares
    /// no constructor
    pub fn constructor_inputs(&self) -> &[Param] {
        self.abi
            .constructor
            .as_ref()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default()
    }

    /// Whether the artifact has creation bytecode, i.e. is not an
    /// interface or abstract contract
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }
}

/// Decode hex bytecode, rejecting bytecode with unlinked library placeholders
fn parse_bytecode(id: &ArtifactId, hex: &str) -> Result<Bytes, ScriptError> {
    let hex = hex.trim();
    if hex.contains(UNLINKED_LIBRARY_MARKER) {
        return Err(ScriptError::ArtifactParsing(format!(
            "{id}: bytecode contains unlinked library references"
        )));
    }

    hex::decode(hex.strip_prefix(HEX_PREFIX).unwrap_or(hex))
        .map(Bytes::from)
        .map_err(|e| ScriptError::ArtifactParsing(format!("{id}: {e}")))
}

/// The set of artifacts available to a migration
#[derive(Clone, Debug, Default)]
pub struct ArtifactRegistry {
    /// The registered artifacts, keyed by id
    artifacts: BTreeMap<ArtifactId, Artifact>,
}

impl ArtifactRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact; an id may only be registered once
    pub fn register(&mut self, artifact: Artifact) -> Result<(), ScriptError> {
        if self.artifacts.contains_key(&artifact.id) {
            return Err(ScriptError::ArtifactParsing(format!(
                "artifact `{}` registered twice",
                artifact.id
            )));
        }

        self.artifacts.insert(artifact.id.clone(), artifact);
        Ok(())
    }

    /// Look up an artifact by id
    pub fn get(&self, id: &ArtifactId) -> Result<&Artifact, DeployError> {
        self.artifacts.get(id).ok_or_else(|| {
            let near_match = self
                .artifacts
                .keys()
                .find(|known| known.to_string().eq_ignore_ascii_case(&id.to_string()));

            match near_match {
                Some(known) => DeployError::UnknownArtifact(format!(
                    "`{id}` is not registered (did you mean `{known}`?)"
                )),
                None => DeployError::UnknownArtifact(format!("`{id}` is not registered")),
            }
        })
    }

    /// The ids of all registered artifacts, in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &ArtifactId> {
        self.artifacts.keys()
    }

    /// The number of registered artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Load every artifact found under the given build output directory.
    ///
    /// `Name.json` files are parsed as JSON artifacts, `Name.abi` files are
    /// paired with a sibling `Name.bin`. A file stem of the form
    /// `Name@version` registers a versioned artifact.
    ///
    /// Files that are not deployable artifacts are skipped with a warning:
    /// Hardhat `.dbg.json` files, `build-info` directories, JSON without an
    /// ABI or bytecode, unlinked bytecode, and interfaces or abstract
    /// contracts. A plan referencing a skipped artifact fails at lookup.
    pub fn load_dir(dir: &Path) -> Result<Self, ScriptError> {
        let mut registry = Self::new();
        for path in collect_files(dir)? {
            let artifact = match load_file(&path) {
                Ok(Some(artifact)) => artifact,
                Ok(None) => continue,
                Err(ScriptError::ArtifactParsing(e)) => {
                    warn!(path = %path.display(), "skipping artifact: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !artifact.is_deployable() {
                debug!(artifact = %artifact.id, "skipping artifact without creation bytecode");
                continue;
            }

            registry.register(artifact)?;
        }

        debug!(count = registry.len(), dir = %dir.display(), "loaded artifacts");
        Ok(registry)
    }
}

/// Recursively list the files under a directory, in a stable order
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, ScriptError> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir)
        .map_err(|e| ScriptError::ReadFile(format!("{}: {e}", dir.display())))?;

    for entry in entries {
        let path = entry.map_err(|e| ScriptError::ReadFile(e.to_string()))?.path();
        if path.is_dir() && path.file_name().is_some_and(|name| name == BUILD_INFO_DIR) {
            debug!(dir = %path.display(), "skipping build info");
        } else if path.is_dir() {
            files.extend(collect_files(&path)?);
        } else {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Load the artifact stored at the given path, if the path is an artifact
fn load_file(path: &Path) -> Result<Option<Artifact>, ScriptError> {
    let (Some(stem), Some(ext)) = (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) else {
        return Ok(None);
    };
    if stem.ends_with(DEBUG_ARTIFACT_SUFFIX) {
        return Ok(None);
    }

    let id: ArtifactId = match stem.parse() {
        Ok(id) => id,
        Err(e) => {
            warn!(path = %path.display(), "ignoring artifact file: {e}");
            return Ok(None);
        }
    };

    match ext {
        JSON_EXTENSION => {
            let json = read_to_string(path)?;
            Artifact::from_json(id, &json).map(Some)
        }
        ABI_EXTENSION => {
            let bin_path = path.with_extension(BIN_EXTENSION);
            if !bin_path.exists() {
                warn!(path = %path.display(), "ABI file has no matching .bin file");
                return Ok(None);
            }

            let abi = read_to_string(path)?;
            let bin = read_to_string(&bin_path)?;
            Artifact::from_parts(id, &abi, &bin).map(Some)
        }
        _ => Ok(None),
    }
}

/// Read a file to a string, mapping the error
fn read_to_string(path: &Path) -> Result<String, ScriptError> {
    fs::read_to_string(path).map_err(|e| ScriptError::ReadFile(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use migrations_common::types::ArtifactId;

    use super::{Artifact, ArtifactRegistry};
    use crate::errors::DeployError;

    /// A Truffle-style artifact with a two-argument constructor
    const TRUFFLE_ARTIFACT: &str = r#"{
        "contractName": "Land",
        "abi": [
            {
                "type": "constructor",
                "inputs": [
                    { "name": "creator", "type": "address", "internalType": "address" },
                    { "name": "baseLandType", "type": "uint256", "internalType": "uint256" }
                ],
                "stateMutability": "nonpayable"
            }
        ],
        "bytecode": "0x6080604052"
    }"#;

    #[test]
    fn test_parse_truffle_artifact() {
        let artifact = Artifact::from_json(ArtifactId::new("Land"), TRUFFLE_ARTIFACT).unwrap();

        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(artifact.constructor_inputs().len(), 2);
        assert_eq!(artifact.constructor_inputs()[1].ty, "uint256");
    }

    #[test]
    fn test_parse_foundry_artifact() {
        let json = r#"{ "abi": [], "bytecode": { "object": "0x6001" } }"#;
        let artifact = Artifact::from_json(ArtifactId::new("Time"), json).unwrap();

        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x01]);
        assert!(artifact.constructor_inputs().is_empty());
    }

    #[test]
    fn test_reject_unlinked_bytecode() {
        let json = r#"{ "abi": [], "bytecode": "0x6001__$abcdef$__" }"#;
        assert!(Artifact::from_json(ArtifactId::new("Time"), json).is_err());
    }

    #[test]
    fn test_unknown_artifact_suggests_case_match() {
        let mut registry = ArtifactRegistry::new();
        let artifact = Artifact::from_json(ArtifactId::new("QuadKey"), TRUFFLE_ARTIFACT).unwrap();
        registry.register(artifact).unwrap();

        let err = registry.get(&ArtifactId::new("Quadkey")).unwrap_err();
        match err {
            DeployError::UnknownArtifact(msg) => assert!(msg.contains("did you mean `QuadKey`")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ArtifactRegistry::new();
        let artifact = Artifact::from_json(ArtifactId::new("Land"), TRUFFLE_ARTIFACT).unwrap();
        registry.register(artifact.clone()).unwrap();

        assert!(registry.register(artifact).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_dir() {
        let dir = std::env::temp_dir().join(format!("artifacts-{}", std::process::id()));
        let nested = dir.join("Land.sol");
        fs::create_dir_all(&nested).unwrap();

        fs::write(nested.join("Land.json"), TRUFFLE_ARTIFACT).unwrap();
        fs::write(dir.join("QuadKey@2.abi"), "[]").unwrap();
        fs::write(dir.join("QuadKey@2.bin"), "6001").unwrap();
        fs::write(dir.join("IERC20.json"), r#"{ "abi": [], "bytecode": "0x" }"#).unwrap();
        fs::write(dir.join("README.md"), "not an artifact").unwrap();

        let registry = ArtifactRegistry::load_dir(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let ids: Vec<String> = registry.ids().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["Land", "QuadKey@2"]);
        assert!(registry.get(&ArtifactId::new("IERC20")).is_err());
    }

    #[test]
    fn test_load_dir_hardhat_layout() {
        let dir = std::env::temp_dir().join(format!("hardhat-artifacts-{}", std::process::id()));
        let contracts = dir.join("contracts").join("Land.sol");
        let build_info = dir.join("build-info");
        fs::create_dir_all(&contracts).unwrap();
        fs::create_dir_all(&build_info).unwrap();

        fs::write(contracts.join("Land.json"), TRUFFLE_ARTIFACT).unwrap();
        fs::write(
            contracts.join("Land.dbg.json"),
            r#"{ "_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/abc.json" }"#,
        )
        .unwrap();
        fs::write(build_info.join("abc.json"), r#"{ "id": "abc", "input": {}, "output": {} }"#)
            .unwrap();
        fs::write(contracts.join("Lands.json"), r#"{ "contractName": "Lands" }"#).unwrap();
        fs::write(contracts.join("Linked.json"), r#"{ "abi": [], "bytecode": "0x60__$ab$__" }"#)
            .unwrap();

        let registry = ArtifactRegistry::load_dir(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let ids: Vec<String> = registry.ids().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["Land"]);
        match registry.get(&ArtifactId::new("Linked")).unwrap_err() {
            DeployError::UnknownArtifact(_) => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
