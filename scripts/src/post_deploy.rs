//! The post-deploy action runner: invokes configuration calls against a
//! freshly deployed contract, e.g. granting the minter and pauser roles

use alloy::primitives::{Address, TxHash};
use clap::ValueEnum;
use migrations_common::types::PostDeployAction;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    artifacts::Artifact,
    errors::DeployError,
    executor::{await_confirmation, TransactionConfig},
    network::{Confirmation, Network},
    resolver::encode_call,
    utils::with_retries,
};

/// What to do with the remaining actions of a step once one fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ActionPolicy {
    /// Attempt every action regardless of earlier failures
    #[default]
    Continue,
    /// Skip the remaining actions after the first failure
    AbortRemaining,
}

/// The outcome of a single post-deploy action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The call confirmed successfully
    Succeeded {
        /// The hash of the call transaction
        tx_hash: TxHash,
    },
    /// The call failed
    Failed {
        /// Why the call failed, always a `PostDeployActionFailed`
        error: DeployError,
        /// The call transaction, if the network accepted it
        tx_hash: Option<TxHash>,
    },
    /// The call was not attempted since an earlier action failed
    Skipped,
}

impl ActionOutcome {
    /// Whether the action failed
    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }
}

/// A post-deploy action together with its outcome
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionResult {
    /// The action that was run
    pub action: PostDeployAction,
    /// What happened when it ran
    pub outcome: ActionOutcome,
}

/// Runs the post-deploy actions of a step against its deployed contract
pub struct PostDeployRunner<'a, N> {
    /// The network to send calls through
    network: &'a N,
    /// Timeout and retry settings
    config: TransactionConfig,
    /// Whether to continue after a failed action
    policy: ActionPolicy,
}

impl<'a, N: Network> PostDeployRunner<'a, N> {
    /// Construct a runner over the given network
    pub fn new(network: &'a N, config: TransactionConfig, policy: ActionPolicy) -> Self {
        Self {
            network,
            config,
            policy,
        }
    }

    /// Run the actions in order, waiting for each call to confirm before
    /// sending the next.
    ///
    /// Every action gets a result; failures never undo the deployment.
    pub async fn run(
        &self,
        artifact: &Artifact,
        address: Address,
        actions: &[PostDeployAction],
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        let mut aborted = false;

        for action in actions {
            let outcome = if aborted {
                ActionOutcome::Skipped
            } else {
                self.run_action(artifact, address, action).await
            };

            if outcome.is_failed() && self.policy == ActionPolicy::AbortRemaining {
                aborted = true;
            }

            results.push(ActionResult {
                action: action.clone(),
                outcome,
            });
        }

        results
    }

    /// Encode, send and confirm a single action
    async fn run_action(
        &self,
        artifact: &Artifact,
        address: Address,
        action: &PostDeployAction,
    ) -> ActionOutcome {
        let failed = |reason: String, tx_hash: Option<TxHash>| {
            warn!(contract = %address, "{action} failed: {reason}");
            ActionOutcome::Failed {
                error: DeployError::PostDeployActionFailed(format!("{action}: {reason}")),
                tx_hash,
            }
        };

        let calldata = match encode_call(artifact, &action.method, &action.arguments) {
            Ok(calldata) => calldata,
            Err(reason) => return failed(reason, None),
        };

        let tx_hash = match with_retries(&self.config.retry, &action.method, || {
            self.network.submit_call(address, calldata.clone())
        })
        .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => return failed(e.to_string(), None),
        };

        let confirmation =
            await_confirmation(self.network, &self.config, tx_hash, &action.method).await;

        match confirmation {
            Ok(Confirmation::Included { .. }) => {
                info!(tx = %tx_hash, contract = %address, "{action} confirmed");
                ActionOutcome::Succeeded { tx_hash }
            }
            Ok(Confirmation::Reverted { .. }) => failed("call reverted".to_string(), Some(tx_hash)),
            Err(e) => failed(e.to_string(), Some(tx_hash)),
        }
    }
}
