//! The deployment executor: submits one creation transaction and waits for
//! it to confirm.
//!
//! A creation is a one-shot side effect. Once the network has accepted the
//! transaction it is never resubmitted, whatever happens afterwards; only a
//! submission that failed in transport, and the idempotent wait for its
//! receipt, are retried.

use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    artifacts::Artifact,
    constants::{
        DEFAULT_CONFIRMATION_TIMEOUT_SECS, DEFAULT_CONNECTIVITY_RETRIES, INITIAL_RETRY_BACKOFF_MS,
        MAX_RETRY_BACKOFF_MS,
    },
    errors::DeployError,
    network::{Confirmation, Network},
    resolver::ResolvedArguments,
    utils::with_retries,
};

/// A bounded retry policy for connectivity failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The maximum number of retries after the first attempt
    pub max_retries: u32,
    /// The delay before the first retry, doubled for each subsequent one
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// The delay before the given retry, counting from zero, capped at
    /// [`MAX_RETRY_BACKOFF_MS`]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(Duration::from_millis(MAX_RETRY_BACKOFF_MS))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_CONNECTIVITY_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_RETRY_BACKOFF_MS),
        }
    }
}

/// Settings shared by every transaction the pipeline sends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionConfig {
    /// How long to wait for each transaction to confirm, across all
    /// retries of the wait
    pub confirmation_timeout: Duration,
    /// How to retry connectivity failures
    pub retry: RetryPolicy,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// A confirmed deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deployed {
    /// The address of the deployed contract
    pub address: Address,
    /// The hash of the creation transaction
    pub tx_hash: TxHash,
}

/// A failed deployment, with the creation transaction if it was submitted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionFailure {
    /// Why the deployment failed
    pub error: DeployError,
    /// The creation transaction, if the network accepted it
    pub tx_hash: Option<TxHash>,
}

impl ExecutionFailure {
    /// A failure that occurred before any transaction was accepted
    fn unsubmitted(error: DeployError) -> Self {
        Self {
            error,
            tx_hash: None,
        }
    }
}

/// Deploys artifacts through a [`Network`]
pub struct Executor<'a, N> {
    /// The network to deploy through
    network: &'a N,
    /// Timeout and retry settings
    config: TransactionConfig,
}

impl<'a, N: Network> Executor<'a, N> {
    /// Construct an executor over the given network
    pub fn new(network: &'a N, config: TransactionConfig) -> Self {
        Self { network, config }
    }

    /// Deploy the artifact with the given resolved constructor arguments,
    /// blocking until the creation transaction confirms or times out
    pub async fn deploy(
        &self,
        artifact: &Artifact,
        arguments: &ResolvedArguments,
    ) -> Result<Deployed, ExecutionFailure> {
        let code = arguments.creation_code(artifact);

        let submission = with_retries(&self.config.retry, "creation submission", || {
            self.network.submit_creation(code.clone())
        })
        .await
        .map_err(ExecutionFailure::unsubmitted)?;

        let tx_hash = submission.tx_hash;
        info!(tx = %tx_hash, artifact = %artifact.id, "creation transaction submitted");

        let failed = |error| ExecutionFailure {
            error,
            tx_hash: Some(tx_hash),
        };
        let confirmation =
            await_confirmation(self.network, &self.config, tx_hash, "confirmation wait")
                .await
                .map_err(failed)?;

        match confirmation {
            Confirmation::Included {
                contract_address, ..
            } => {
                let address = match contract_address {
                    Some(actual) if actual != submission.contract_address => {
                        warn!(
                            expected = %submission.contract_address,
                            actual = %actual,
                            "contract deployed at an unexpected address"
                        );
                        actual
                    }
                    _ => submission.contract_address,
                };

                Ok(Deployed { address, tx_hash })
            }
            Confirmation::Reverted { block_number } => Err(failed(
                DeployError::DeploymentReverted(format!(
                    "creation of `{}` reverted in block {}",
                    artifact.id,
                    block_number.map_or_else(|| "?".to_string(), |n| n.to_string())
                )),
            )),
        }
    }
}

/// Wait for a transaction to confirm, retrying connectivity failures.
///
/// Every retry waits only for what is left of the confirmation timeout, so
/// the wait as a whole never exceeds it.
pub(crate) async fn await_confirmation<N: Network>(
    network: &N,
    config: &TransactionConfig,
    tx_hash: TxHash,
    operation: &str,
) -> Result<Confirmation, DeployError> {
    let deadline = Instant::now() + config.confirmation_timeout;
    with_retries(&config.retry, operation, || {
        let remaining = deadline.saturating_duration_since(Instant::now());
        network.wait_for_confirmation(tx_hash, remaining)
    })
    .await
}
