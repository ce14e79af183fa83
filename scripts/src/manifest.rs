//! Persisted run output: the deployments manifest and the run report

use std::{collections::BTreeMap, fs, path::Path};

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    constants::DEPLOYMENTS_KEY,
    errors::ScriptError,
    ledger::DeploymentLedger,
    pipeline::{DeploymentResult, RunReport, RunStatus, StepOutcome, StepState},
    post_deploy::{ActionOutcome, ActionResult},
    utils::{get_json_from_file, write_json_to_file},
};

// ------------
// | MANIFEST |
// ------------

/// The addresses recorded by an earlier migration, by step name
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DeploymentManifest {
    /// The deployed addresses
    #[serde(default)]
    deployments: BTreeMap<String, Address>,
}

impl DeploymentManifest {
    /// Read a deployments manifest
    pub fn read(path: &Path) -> Result<Self, ScriptError> {
        let json = get_json_from_file(path)?;
        serde_json::from_value(json)
            .map_err(|e| ScriptError::Serde(format!("{}: {e}", path.display())))
    }

    /// The address recorded for a step
    pub fn get(&self, step: &str) -> Option<Address> {
        self.deployments.get(step).copied()
    }
}

/// Record a deployed address in the deployments manifest at the given path,
/// creating the file if needed
pub fn write_deployed_address(
    file_path: &Path,
    step: &str,
    address: Address,
) -> Result<(), ScriptError> {
    update_deployments(file_path, [(step, address)])
}

/// Record the ledger's addresses in the deployments manifest at the given
/// path, creating the file if needed.
///
/// Entries for steps not in the ledger, and any other keys in the file,
/// are left as they are.
pub fn write_deployments(file_path: &Path, ledger: &DeploymentLedger) -> Result<(), ScriptError> {
    update_deployments(file_path, ledger.iter())
}

/// Set the given entries under the deployments key of the manifest
fn update_deployments<'a>(
    file_path: &Path,
    entries: impl IntoIterator<Item = (&'a str, Address)>,
) -> Result<(), ScriptError> {
    // If the file doesn't exist, create it
    if !file_path.exists() {
        fs::write(file_path, "{}")
            .map_err(|e| ScriptError::WriteFile(format!("{}: {e}", file_path.display())))?;
    }
    let mut parsed_json = get_json_from_file(file_path)?;
    if !parsed_json.is_object() {
        return Err(ScriptError::Serde(format!(
            "{}: expected a JSON object",
            file_path.display()
        )));
    }

    if !parsed_json[DEPLOYMENTS_KEY].is_object() {
        parsed_json[DEPLOYMENTS_KEY] = Value::Object(Map::new());
    }
    for (step, address) in entries {
        parsed_json[DEPLOYMENTS_KEY][step] = Value::String(format!("{address:#x}"));
    }

    write_json_to_file(file_path, &parsed_json)
}

// ----------
// | REPORT |
// ----------

/// The serialized form of a run report
#[derive(Debug, Serialize)]
struct ReportFile {
    /// The overall status
    status: &'static str,
    /// The failed step, for aborted runs
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_step: Option<String>,
    /// The failed steps, for runs that continued past failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed_steps: Vec<String>,
    /// The steps never started, for cancelled runs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    not_started: Vec<String>,
    /// One entry per step started
    results: Vec<StepEntry>,
}

/// The serialized form of a step result
#[derive(Debug, Serialize)]
struct StepEntry {
    /// The step name
    step: String,
    /// The artifact id
    artifact: String,
    /// `completed` or `failed`
    status: &'static str,
    /// The state the step failed in
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_in: Option<StepState>,
    /// The deployed address
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<Address>,
    /// The creation transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<TxHash>,
    /// The failure
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// The post-deploy actions
    #[serde(skip_serializing_if = "Vec::is_empty")]
    actions: Vec<ActionEntry>,
}

/// The serialized form of a post-deploy action result
#[derive(Debug, Serialize)]
struct ActionEntry {
    /// The call, e.g. `addPauser(0x..)`
    call: String,
    /// `succeeded`, `failed` or `skipped`
    status: &'static str,
    /// The call transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<TxHash>,
    /// The failure
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ActionResult> for ActionEntry {
    fn from(result: &ActionResult) -> Self {
        let (status, tx_hash, error) = match &result.outcome {
            ActionOutcome::Succeeded { tx_hash } => ("succeeded", Some(*tx_hash), None),
            ActionOutcome::Failed { error, tx_hash } => {
                ("failed", *tx_hash, Some(error.to_string()))
            }
            ActionOutcome::Skipped => ("skipped", None, None),
        };

        Self {
            call: result.action.to_string(),
            status,
            tx_hash,
            error,
        }
    }
}

impl From<&DeploymentResult> for StepEntry {
    fn from(result: &DeploymentResult) -> Self {
        let mut entry = StepEntry {
            step: result.step.clone(),
            artifact: result.artifact.to_string(),
            status: "completed",
            failed_in: None,
            address: None,
            tx_hash: None,
            error: None,
            actions: Vec::new(),
        };

        match &result.outcome {
            StepOutcome::Completed {
                address,
                tx_hash,
                actions,
            } => {
                entry.address = Some(*address);
                entry.tx_hash = Some(*tx_hash);
                entry.actions = actions.iter().map(ActionEntry::from).collect();
            }
            StepOutcome::Failed {
                stage,
                error,
                tx_hash,
            } => {
                entry.status = "failed";
                entry.failed_in = Some(*stage);
                entry.tx_hash = *tx_hash;
                entry.error = Some(error.to_string());
            }
        }

        entry
    }
}

impl From<&RunReport> for ReportFile {
    fn from(report: &RunReport) -> Self {
        let mut file = ReportFile {
            status: "all_succeeded",
            failed_step: None,
            failed_steps: Vec::new(),
            not_started: Vec::new(),
            results: report.results.iter().map(StepEntry::from).collect(),
        };

        match &report.status {
            RunStatus::AllSucceeded => {}
            RunStatus::PartiallyFailed(failed) => {
                file.status = "partially_failed";
                file.failed_steps = failed.clone();
            }
            RunStatus::Aborted { failed_step } => {
                file.status = "aborted";
                file.failed_step = Some(failed_step.clone());
            }
            RunStatus::Cancelled { remaining } => {
                file.status = "cancelled";
                file.not_started = remaining.clone();
            }
        }

        file
    }
}

/// Render a run report as JSON
pub fn report_json(report: &RunReport) -> Result<Value, ScriptError> {
    serde_json::to_value(ReportFile::from(report)).map_err(|e| ScriptError::Serde(e.to_string()))
}

/// Write a run report to the given path, replacing any existing file
pub fn write_report(file_path: &Path, report: &RunReport) -> Result<(), ScriptError> {
    write_json_to_file(file_path, &report_json(report)?)
}

#[cfg(test)]
mod tests {
    use std::{env, fs, path::PathBuf, process};

    use alloy::primitives::{address, Address, TxHash};
    use migrations_common::types::{ArtifactId, LiteralValue, PostDeployAction};

    use super::{report_json, write_deployed_address, write_deployments, DeploymentManifest};
    use crate::{
        errors::DeployError,
        ledger::DeploymentLedger,
        pipeline::{DeploymentResult, RunReport, RunStatus, StepOutcome, StepState},
        post_deploy::{ActionOutcome, ActionResult},
    };

    /// The address of the `Time` deployment in these tests
    const TIME: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");

    /// A fresh path in the temp dir
    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("{name}-{}.json", process::id()))
    }

    #[test]
    fn test_write_deployments_merges() {
        let path = temp_path("manifest-merge");
        let existing = serde_json::json!({
            "network": "mainnet",
            "deployments": {
                "Time": "0x0000000000000000000000000000000000000001",
                "Old": "0x0000000000000000000000000000000000000002"
            }
        });
        fs::write(&path, existing.to_string()).unwrap();

        let mut ledger = DeploymentLedger::new();
        ledger.record("Time", TIME);
        write_deployments(&path, &ledger).unwrap();

        let manifest = DeploymentManifest::read(&path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(manifest.get("Time"), Some(TIME));
        assert_eq!(manifest.get("Old"), Some(Address::with_last_byte(2)));
        assert_eq!(raw["network"], "mainnet");
    }

    #[test]
    fn test_write_deployments_creates_file() {
        let path = temp_path("manifest-create");
        let _ = fs::remove_file(&path);

        let mut ledger = DeploymentLedger::new();
        ledger.record("Time", TIME);
        write_deployments(&path, &ledger).unwrap();

        let manifest = DeploymentManifest::read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(manifest.get("Time"), Some(TIME));
    }

    #[test]
    fn test_report_json() {
        let mut ledger = DeploymentLedger::new();
        ledger.record("Time", TIME);
        let action = PostDeployAction::new("addPauser", vec![LiteralValue::Address(TIME)]);

        let report = RunReport {
            results: vec![
                DeploymentResult {
                    step: "Time".to_string(),
                    artifact: ArtifactId::new("Time"),
                    outcome: StepOutcome::Completed {
                        address: TIME,
                        tx_hash: TxHash::ZERO,
                        actions: vec![ActionResult {
                            action,
                            outcome: ActionOutcome::Skipped,
                        }],
                    },
                },
                DeploymentResult {
                    step: "Land".to_string(),
                    artifact: ArtifactId::versioned("Land", "2"),
                    outcome: StepOutcome::Failed {
                        stage: StepState::Resolving,
                        error: DeployError::UnresolvedReference("LandType".to_string()),
                        tx_hash: None,
                    },
                },
            ],
            ledger,
            status: RunStatus::Aborted {
                failed_step: "Land".to_string(),
            },
        };

        let json = report_json(&report).unwrap();

        assert_eq!(json["status"], "aborted");
        assert_eq!(json["failed_step"], "Land");
        assert!(json.get("failed_steps").is_none());
        let address: Address =
            serde_json::from_value(json["results"][0]["address"].clone()).unwrap();
        assert_eq!(address, TIME);
        assert_eq!(json["results"][0]["actions"][0]["status"], "skipped");
        assert_eq!(json["results"][1]["artifact"], "Land@2");
        assert_eq!(json["results"][1]["failed_in"], "resolving");
        assert_eq!(json["results"][1]["error"], "unresolved reference: LandType");
    }

    #[test]
    fn test_report_lists_failed_steps() {
        let failed = |step: &str| DeploymentResult {
            step: step.to_string(),
            artifact: ArtifactId::new(step),
            outcome: StepOutcome::Failed {
                stage: StepState::Deploying,
                error: DeployError::DeploymentReverted("out of gas".to_string()),
                tx_hash: None,
            },
        };
        let report = RunReport {
            results: vec![failed("Land"), failed("QuadKey")],
            ledger: DeploymentLedger::new(),
            status: RunStatus::PartiallyFailed(vec!["Land".to_string(), "QuadKey".to_string()]),
        };

        let json = report_json(&report).unwrap();

        assert_eq!(json["status"], "partially_failed");
        assert_eq!(json["failed_steps"], serde_json::json!(["Land", "QuadKey"]));
        assert!(json.get("failed_step").is_none());
    }

    #[test]
    fn test_write_deployed_address_adds_entries() {
        let path = temp_path("manifest-incremental");
        let _ = fs::remove_file(&path);

        write_deployed_address(&path, "Time", TIME).unwrap();
        write_deployed_address(&path, "Land", Address::with_last_byte(7)).unwrap();

        let manifest = DeploymentManifest::read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(manifest.get("Time"), Some(TIME));
        assert_eq!(manifest.get("Land"), Some(Address::with_last_byte(7)));
    }
}
