//! The pipeline orchestrator: runs the steps of a migration plan in order,
//! threading deployed addresses from earlier steps into later ones.
//!
//! Each step moves through
//! `Pending -> Resolving -> Deploying -> PostDeploying -> Completed`, or to
//! `Failed` from `Resolving` or `Deploying`. A failed post-deploy action
//! does not fail its step.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy::primitives::{Address, TxHash, U256};
use clap::ValueEnum;
use migrations_common::types::{ArtifactId, DeploymentStep};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    artifacts::ArtifactRegistry,
    errors::{DeployError, PlanError},
    executor::{ExecutionFailure, Executor, TransactionConfig},
    ledger::DeploymentLedger,
    manifest::write_deployed_address,
    network::Network,
    post_deploy::{ActionPolicy, ActionResult, PostDeployRunner},
    resolver::{encode_call, resolve_arguments, ResolvedArguments},
};

// ------------
// | POLICIES |
// ------------

/// What the pipeline does when a step fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Halt the run after the first failed step
    #[default]
    Abort,
    /// Continue with the remaining steps; steps referencing a failed step
    /// fail in turn
    BestEffort,
}

/// Settings for a pipeline run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// What to do when a step fails
    pub failure_policy: FailurePolicy,
    /// What to do when a post-deploy action fails
    pub action_policy: ActionPolicy,
    /// Timeout and retry settings for every transaction
    pub transactions: TransactionConfig,
}

/// A flag requesting that a run stop before its next step.
///
/// Cancellation is only observed between steps; a transaction that has
/// been submitted is always waited on.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    /// A signal that has not been raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------
// | STEPS |
// ---------

/// The lifecycle state of a step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not yet started
    Pending,
    /// Looking up the artifact and resolving its arguments
    Resolving,
    /// Submitting the creation transaction and awaiting confirmation
    Deploying,
    /// Running post-deploy actions
    PostDeploying,
    /// Deployed; post-deploy actions have all been attempted
    Completed,
    /// Could not be deployed
    Failed,
}

impl StepState {
    /// Whether a step may move from this state to the next
    pub fn can_transition_to(self, next: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Resolving, Deploying)
                | (Resolving, Failed)
                | (Deploying, PostDeploying)
                | (Deploying, Failed)
                | (PostDeploying, Completed)
        )
    }
}

/// Tracks the state of the step being run
struct StepTracker<'a> {
    /// The name of the step
    step: &'a str,
    /// The current state
    state: StepState,
}

impl<'a> StepTracker<'a> {
    /// A tracker for a pending step
    fn new(step: &'a str) -> Self {
        Self {
            step,
            state: StepState::Pending,
        }
    }

    /// Move to the next state
    fn advance(&mut self, next: StepState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?} for `{}`",
            self.state,
            next,
            self.step
        );
        debug!(step = self.step, from = ?self.state, to = ?next, "step transition");
        self.state = next;
    }

    /// Move to `Failed`, returning the state the step failed in
    fn fail(&mut self) -> StepState {
        let stage = self.state;
        self.advance(StepState::Failed);
        stage
    }
}

/// How a step ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The contract was deployed
    Completed {
        /// The deployed address
        address: Address,
        /// The creation transaction
        tx_hash: TxHash,
        /// The outcome of each post-deploy action, in order
        actions: Vec<ActionResult>,
    },
    /// The contract was not deployed
    Failed {
        /// The state the step was in when it failed
        stage: StepState,
        /// Why the step failed
        error: DeployError,
        /// The creation transaction, if one was accepted before failing
        tx_hash: Option<TxHash>,
    },
}

/// The result of running one step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentResult {
    /// The name of the step
    pub step: String,
    /// The artifact the step deploys
    pub artifact: ArtifactId,
    /// How the step ended
    pub outcome: StepOutcome,
}

impl DeploymentResult {
    /// Whether the step failed
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. })
    }

    /// The deployed address, if the step completed
    pub fn address(&self) -> Option<Address> {
        match self.outcome {
            StepOutcome::Completed { address, .. } => Some(address),
            StepOutcome::Failed { .. } => None,
        }
    }

    /// The post-deploy action results, empty if the step failed
    pub fn actions(&self) -> &[ActionResult] {
        match &self.outcome {
            StepOutcome::Completed { actions, .. } => actions,
            StepOutcome::Failed { .. } => &[],
        }
    }
}

// -----------
// | RESULTS |
// -----------

/// The overall status of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Every step completed
    AllSucceeded,
    /// The run finished under the best-effort policy with these steps failed
    PartiallyFailed(Vec<String>),
    /// The run halted on the failure of this step
    Aborted {
        /// The step that failed
        failed_step: String,
    },
    /// The run was cancelled before these steps started
    Cancelled {
        /// The steps that were never started
        remaining: Vec<String>,
    },
}

/// Everything a run produced
#[derive(Clone, Debug)]
pub struct RunReport {
    /// One result per step that was started, in execution order
    pub results: Vec<DeploymentResult>,
    /// The addresses deployed in this run
    pub ledger: DeploymentLedger,
    /// The overall status of the run
    pub status: RunStatus,
}

impl RunReport {
    /// The number of post-deploy actions that failed across all steps
    pub fn failed_actions(&self) -> usize {
        self.results
            .iter()
            .flat_map(|r| r.actions())
            .filter(|a| a.outcome.is_failed())
            .count()
    }
}

// --------
// | PLAN |
// --------

/// An ordered list of steps, validated so that step names are unique and
/// every reference names a step declared earlier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// The steps, in declaration order
    steps: Vec<DeploymentStep>,
}

impl DeploymentPlan {
    /// Validate and construct a plan
    pub fn new(steps: Vec<DeploymentStep>) -> Result<Self, PlanError> {
        let all: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        let mut declared = HashSet::new();

        for step in &steps {
            for reference in step.references() {
                if !declared.contains(reference) {
                    let err = if all.contains(reference) {
                        PlanError::ForwardReference {
                            step: step.name.clone(),
                            reference: reference.to_string(),
                        }
                    } else {
                        PlanError::UnknownReference {
                            step: step.name.clone(),
                            reference: reference.to_string(),
                        }
                    };
                    return Err(err);
                }
            }

            if !declared.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep(step.name.clone()));
            }
        }

        Ok(Self { steps })
    }

    /// The steps, in declaration order
    pub fn steps(&self) -> &[DeploymentStep] {
        &self.steps
    }
}

/// The result of checking one step of a plan without deploying it
#[derive(Clone, Debug, PartialEq)]
pub struct DryRunResult {
    /// The name of the step
    pub step: String,
    /// The resolved constructor arguments, or why they could not be resolved
    pub outcome: Result<ResolvedArguments, DeployError>,
}

/// Check every step of a plan against the registry without touching the
/// network.
///
/// Each step is assumed to deploy to a distinct placeholder address, so
/// references are checked for type and ordering only. Post-deploy actions
/// are encoded against the artifact ABI as well.
pub fn dry_run(registry: &ArtifactRegistry, plan: &DeploymentPlan) -> Vec<DryRunResult> {
    let mut ledger = DeploymentLedger::new();

    plan.steps()
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let outcome = registry.get(&step.artifact).and_then(|artifact| {
                let resolved = resolve_arguments(artifact, &step.arguments, &ledger)?;
                for action in &step.post_deploy {
                    encode_call(artifact, &action.method, &action.arguments).map_err(|e| {
                        DeployError::PostDeployActionFailed(format!("{action}: {e}"))
                    })?;
                }

                Ok(resolved)
            });

            if outcome.is_ok() {
                ledger.record(&step.name, Address::from_word(U256::from(i + 1).into()));
            }

            DryRunResult {
                step: step.name.clone(),
                outcome,
            }
        })
        .collect()
}

// ----------------
// | ORCHESTRATOR |
// ----------------

/// Runs a deployment plan against a network
pub struct Orchestrator<'a, N> {
    /// The artifacts available to the plan
    registry: &'a ArtifactRegistry,
    /// The network to deploy through
    network: &'a N,
    /// Policies, timeouts and retries
    config: PipelineConfig,
    /// Checked before each step
    cancellation: CancellationSignal,
    /// The manifest each deployed address is written to as it is produced
    deployments_file: Option<PathBuf>,
}

impl<'a, N: Network> Orchestrator<'a, N> {
    /// Construct an orchestrator
    pub fn new(registry: &'a ArtifactRegistry, network: &'a N, config: PipelineConfig) -> Self {
        Self {
            registry,
            network,
            config,
            cancellation: CancellationSignal::new(),
            deployments_file: None,
        }
    }

    /// Use the given cancellation signal
    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Write each deployed address to the given manifest as soon as its
    /// creation confirms
    pub fn with_deployments_file(mut self, path: PathBuf) -> Self {
        self.deployments_file = Some(path);
        self
    }

    /// Run the plan to completion, abortion or cancellation
    pub async fn run(&self, plan: &DeploymentPlan) -> RunReport {
        let mut ledger = DeploymentLedger::new();
        let mut results = Vec::with_capacity(plan.steps().len());
        let mut halted = None;

        for (i, step) in plan.steps().iter().enumerate() {
            if self.cancellation.is_cancelled() {
                let remaining: Vec<String> =
                    plan.steps()[i..].iter().map(|s| s.name.clone()).collect();
                warn!("run cancelled, {} steps not started", remaining.len());
                halted = Some(RunStatus::Cancelled { remaining });
                break;
            }

            let span = info_span!("step", name = %step.name, artifact = %step.artifact);
            let result = self.run_step(step, &mut ledger).instrument(span).await;
            let failed = result.is_failed();
            results.push(result);

            if failed && self.config.failure_policy == FailurePolicy::Abort {
                error!("step `{}` failed, aborting run", step.name);
                halted = Some(RunStatus::Aborted {
                    failed_step: step.name.clone(),
                });
                break;
            }
        }

        let status = halted.unwrap_or_else(|| {
            let failed: Vec<String> =
                results.iter().filter(|r| r.is_failed()).map(|r| r.step.clone()).collect();
            if failed.is_empty() {
                RunStatus::AllSucceeded
            } else {
                RunStatus::PartiallyFailed(failed)
            }
        });

        RunReport {
            results,
            ledger,
            status,
        }
    }

    /// Run a single step, recording its address in the ledger on success
    async fn run_step(
        &self,
        step: &DeploymentStep,
        ledger: &mut DeploymentLedger,
    ) -> DeploymentResult {
        let mut tracker = StepTracker::new(&step.name);
        let result = |outcome| DeploymentResult {
            step: step.name.clone(),
            artifact: step.artifact.clone(),
            outcome,
        };

        tracker.advance(StepState::Resolving);
        let resolved = self.registry.get(&step.artifact).and_then(|artifact| {
            resolve_arguments(artifact, &step.arguments, ledger).map(|args| (artifact, args))
        });
        let (artifact, arguments) = match resolved {
            Ok(resolved) => resolved,
            Err(error) => {
                error!("{error}");
                return result(StepOutcome::Failed {
                    stage: tracker.fail(),
                    error,
                    tx_hash: None,
                });
            }
        };

        tracker.advance(StepState::Deploying);
        let executor = Executor::new(self.network, self.config.transactions);
        let deployed = match executor.deploy(artifact, &arguments).await {
            Ok(deployed) => deployed,
            Err(ExecutionFailure { error, tx_hash }) => {
                error!("{error}");
                return result(StepOutcome::Failed {
                    stage: tracker.fail(),
                    error,
                    tx_hash,
                });
            }
        };

        if !ledger.record(&step.name, deployed.address) {
            warn!("`{}` already has a ledger entry", step.name);
        }
        info!(address = %deployed.address, "{} deployed", step.name);
        if let Some(path) = &self.deployments_file {
            if let Err(e) = write_deployed_address(path, &step.name, deployed.address) {
                error!("failed to record `{}` in {}: {e}", step.name, path.display());
            }
        }

        tracker.advance(StepState::PostDeploying);
        let runner = PostDeployRunner::new(
            self.network,
            self.config.transactions,
            self.config.action_policy,
        );
        let actions = runner.run(artifact, deployed.address, &step.post_deploy).await;

        tracker.advance(StepState::Completed);
        result(StepOutcome::Completed {
            address: deployed.address,
            tx_hash: deployed.tx_hash,
            actions,
        })
    }
}
