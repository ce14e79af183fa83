//! Definitions of CLI arguments and commands for the migration scripts

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;

use crate::{
    commands::{migrate, plan},
    constants::{
        DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_CONNECTIVITY_RETRIES,
        DEFAULT_DEPLOYMENTS_PATH, DEFAULT_RPC_URL,
    },
    errors::ScriptError,
    pipeline::FailurePolicy,
    post_deploy::ActionPolicy,
};

/// Deploy and configure a set of contracts from a migration plan
#[derive(Parser)]
#[command(name = "deploy", version)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PKEY", hide_env_values = true)]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Increase log verbosity, may be repeated
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// The maximum log level selected by the verbosity flag
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// The available commands
#[derive(Subcommand)]
pub enum Command {
    /// Run a migration plan against the network
    Migrate(MigrateArgs),
    /// Check a migration plan against the artifacts without deploying
    Plan(PlanArgs),
}

impl Command {
    /// Run the command
    pub async fn run(self, priv_key: Option<&str>, rpc_url: &str) -> Result<(), ScriptError> {
        match self {
            Command::Migrate(args) => {
                let priv_key = priv_key.ok_or_else(|| {
                    ScriptError::ClientInitialization(
                        "a private key is required, pass --priv-key or set PKEY".to_string(),
                    )
                })?;
                migrate(args, priv_key, rpc_url).await
            }
            Command::Plan(args) => plan(args),
        }
    }
}

/// The plan to load, shared by every command
#[derive(Args)]
pub struct PlanSource {
    /// Path to the plan file
    #[arg(long)]
    pub plan: PathBuf,

    /// The environment to run the plan for
    #[arg(short, long)]
    pub env: String,

    /// Directory containing the compiled contract artifacts
    #[arg(short, long)]
    pub artifacts: PathBuf,

    /// Deployments manifest of an earlier migration, for `external`
    /// arguments
    #[arg(long)]
    pub previous: Option<PathBuf>,
}

/// Run a migration
#[derive(Args)]
pub struct MigrateArgs {
    /// The plan to run
    #[command(flatten)]
    pub source: PlanSource,

    /// Path of the deployments manifest to record addresses in
    #[arg(short, long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments: PathBuf,

    /// Path to write the run report to
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Override the environment's failure policy
    #[arg(long, value_enum)]
    pub failure_policy: Option<FailurePolicy>,

    /// Override the environment's post-deploy action policy
    #[arg(long, value_enum)]
    pub action_policy: Option<ActionPolicy>,

    /// Seconds to wait for each transaction to confirm
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Times to retry a transaction after a connectivity failure
    #[arg(long, default_value_t = DEFAULT_CONNECTIVITY_RETRIES)]
    pub retries: u32,
}

/// Check a migration plan
#[derive(Args)]
pub struct PlanArgs {
    /// The plan to check
    #[command(flatten)]
    pub source: PlanSource,
}
