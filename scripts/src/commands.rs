//! Implementations of the migration commands

use std::time::Duration;

use itertools::Itertools;
use tracing::{error, info, warn};

use crate::{
    artifacts::ArtifactRegistry,
    cli::{MigrateArgs, PlanArgs, PlanSource},
    config::{LoadedPlan, PlanFile},
    errors::ScriptError,
    executor::{RetryPolicy, TransactionConfig},
    manifest::{write_deployments, write_report, DeploymentManifest},
    network::RpcNetwork,
    pipeline::{dry_run, CancellationSignal, Orchestrator, PipelineConfig, RunReport, RunStatus},
};

/// Load the artifacts and the plan for the selected environment
fn load(source: &PlanSource) -> Result<(ArtifactRegistry, LoadedPlan), ScriptError> {
    let registry = ArtifactRegistry::load_dir(&source.artifacts)?;
    info!("loaded {} artifacts from {}", registry.len(), source.artifacts.display());

    let previous = source.previous.as_deref().map(DeploymentManifest::read).transpose()?;
    let loaded = PlanFile::load(&source.plan)?.materialize(&source.env, previous.as_ref())?;
    info!(
        "plan for `{}`: {}",
        source.env,
        loaded.plan.steps().iter().map(|s| &s.name).join(" -> ")
    );

    Ok((registry, loaded))
}

/// Run a migration plan, recording each deployed address in the
/// deployments file as soon as its creation confirms
pub async fn migrate(args: MigrateArgs, priv_key: &str, rpc_url: &str) -> Result<(), ScriptError> {
    let (registry, loaded) = load(&args.source)?;

    let config = PipelineConfig {
        failure_policy: args.failure_policy.unwrap_or(loaded.failure_policy),
        action_policy: args.action_policy.unwrap_or(loaded.action_policy),
        transactions: TransactionConfig {
            confirmation_timeout: Duration::from_secs(args.timeout_secs),
            retry: RetryPolicy {
                max_retries: args.retries,
                ..RetryPolicy::default()
            },
        },
    };

    let network = RpcNetwork::connect(priv_key, rpc_url).await?;

    // Stop before the next step on Ctrl-C; an in-flight transaction is
    // still awaited
    let cancellation = CancellationSignal::new();
    let signal = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            signal.cancel();
        }
    });

    let report = Orchestrator::new(&registry, &network, config)
        .with_cancellation(cancellation)
        .with_deployments_file(args.deployments.clone())
        .run(&loaded.plan)
        .await;

    // Rewrite the whole ledger so a failed incremental write surfaces here
    write_deployments(&args.deployments, &report.ledger)?;
    info!("deployments written to {}", args.deployments.display());
    if let Some(path) = &args.report {
        write_report(path, &report)?;
        info!("run report written to {}", path.display());
    }

    summarize(&report)
}

/// Log a summary of a run, and fail unless every step and action succeeded
fn summarize(report: &RunReport) -> Result<(), ScriptError> {
    for (step, address) in report.ledger.iter() {
        info!("{step}: {address:#x}");
    }

    let failed_actions = report.failed_actions();
    if failed_actions > 0 {
        warn!("{failed_actions} post-deploy actions failed");
    }

    match &report.status {
        RunStatus::AllSucceeded if failed_actions == 0 => {
            info!("all {} steps succeeded", report.results.len());
            Ok(())
        }
        RunStatus::AllSucceeded => Err(ScriptError::RunFailed(format!(
            "{failed_actions} post-deploy actions failed"
        ))),
        RunStatus::PartiallyFailed(failed) => {
            Err(ScriptError::RunFailed(format!("failed steps: {}", failed.join(", "))))
        }
        RunStatus::Aborted { failed_step } => {
            Err(ScriptError::RunFailed(format!("aborted at `{failed_step}`")))
        }
        RunStatus::Cancelled { remaining } => Err(ScriptError::RunFailed(format!(
            "cancelled before {}",
            remaining.join(", ")
        ))),
    }
}

/// Check a migration plan against the artifacts, without a network
pub fn plan(args: PlanArgs) -> Result<(), ScriptError> {
    let (registry, loaded) = load(&args.source)?;

    let mut first_error = None;
    for result in dry_run(&registry, &loaded.plan) {
        match result.outcome {
            Ok(resolved) => info!(
                "{}: {} constructor arguments, {} bytes of arguments",
                result.step,
                resolved.values.len(),
                resolved.encoded.len()
            ),
            Err(e) => {
                error!("{}: {e}", result.step);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
