//! An in-memory [`Network`] with scripted failures, for testing the
//! pipeline without a node

use std::{collections::HashMap, sync::Mutex, time::Duration};

use alloy::primitives::{address, keccak256, Address, Bytes, TxHash};

use crate::{
    errors::DeployError,
    network::{Confirmation, Network, Submission},
    pipeline::CancellationSignal,
};

/// The account the mock network sends transactions from
pub const MOCK_SENDER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// A failure to inject into the n-th creation or call transaction.
///
/// Transactions are counted from zero in submission order; a submission
/// that fails with a connectivity error keeps its index for the retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFailure {
    /// Submission fails with a connectivity error this many times before
    /// being accepted
    SubmitConnectivity(usize),
    /// The node rejects the transaction at submission
    Rejected,
    /// The transaction is included but reverts
    Revert,
    /// The transaction is never confirmed
    Timeout,
    /// Waiting for the receipt fails with a connectivity error this many
    /// times before the transaction confirms
    WaitConnectivity(usize),
}

/// What the mock reports when a transaction is waited on
#[derive(Clone, Copy, Debug)]
enum PendingOutcome {
    /// Confirm after failing this many polls with a connectivity error
    Confirm {
        /// The created contract, for creation transactions
        contract_address: Option<Address>,
        /// Remaining connectivity failures before confirming
        flaky_polls: usize,
    },
    /// Report the transaction as reverted
    Revert,
    /// Never confirm
    Timeout,
}

/// The mutable state of the mock
#[derive(Default)]
struct MockState {
    /// The next nonce of the sender
    nonce: u64,
    /// Failures to inject, keyed by creation index
    creation_failures: HashMap<usize, MockFailure>,
    /// Failures to inject, keyed by call index
    call_failures: HashMap<usize, MockFailure>,
    /// The accepted creation transactions' code, in order
    creations: Vec<Bytes>,
    /// The accepted call transactions, in order
    calls: Vec<(Address, Bytes)>,
    /// The index of the next creation transaction; advances once a
    /// submission is accepted or rejected
    next_creation: usize,
    /// The index of the next call transaction
    next_call: usize,
    /// The number of submissions attempted, accepted or not
    submit_attempts: usize,
    /// The outcome of each accepted transaction
    pending: HashMap<TxHash, PendingOutcome>,
    /// Signals raised once the creation with the given index is accepted
    cancellations: HashMap<usize, CancellationSignal>,
    /// The timeout passed to each confirmation wait, in order
    wait_timeouts: Vec<Duration>,
}

/// An in-memory network that accepts every transaction unless told otherwise
#[derive(Default)]
pub struct MockNetwork {
    /// The mock's state, behind a lock since the network is shared by reference
    state: Mutex<MockState>,
}

impl MockNetwork {
    /// A mock network with no injected failures
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure into the creation transaction with the given index
    pub fn fail_creation(self, index: usize, failure: MockFailure) -> Self {
        self.lock().creation_failures.insert(index, failure);
        self
    }

    /// Inject a failure into the call transaction with the given index
    pub fn fail_call(self, index: usize, failure: MockFailure) -> Self {
        self.lock().call_failures.insert(index, failure);
        self
    }

    /// Raise the given signal once the creation transaction with the given
    /// index has been accepted, i.e. while its step is in flight
    pub fn cancel_on_creation(self, index: usize, signal: CancellationSignal) -> Self {
        self.lock().cancellations.insert(index, signal);
        self
    }

    /// The creation code of every accepted creation transaction, in order
    pub fn creations(&self) -> Vec<Bytes> {
        self.lock().creations.clone()
    }

    /// Every accepted call transaction, in order
    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.lock().calls.clone()
    }

    /// The timeout given to each confirmation wait, in order
    pub fn wait_timeouts(&self) -> Vec<Duration> {
        self.lock().wait_timeouts.clone()
    }

    /// The number of submissions attempted, including failed ones
    pub fn submit_attempts(&self) -> usize {
        self.lock().submit_attempts
    }

    /// The address the n-th transaction of the sender deploys to
    pub fn address_for_nonce(nonce: u64) -> Address {
        MOCK_SENDER.create(nonce)
    }

    /// Acquire the state lock; a poisoned lock only means another test
    /// thread panicked
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MockState {
    /// Apply submission-time failures; on acceptance, consume a nonce and
    /// record the outcome to report when the transaction is waited on
    fn accept(
        &mut self,
        failure: Option<MockFailure>,
        contract_address: Option<Address>,
    ) -> Result<TxHash, DeployError> {
        self.submit_attempts += 1;
        let flaky_polls = match failure {
            Some(MockFailure::SubmitConnectivity(n)) if n > 0 => {
                return Err(DeployError::ConnectivityError("connection refused".to_string()));
            }
            Some(MockFailure::Rejected) => {
                return Err(DeployError::DeploymentReverted("insufficient funds".to_string()));
            }
            Some(MockFailure::WaitConnectivity(n)) => n,
            _ => 0,
        };

        let nonce = self.nonce;
        self.nonce += 1;
        let tx_hash = keccak256(nonce.to_be_bytes());
        let outcome = match failure {
            Some(MockFailure::Revert) => PendingOutcome::Revert,
            Some(MockFailure::Timeout) => PendingOutcome::Timeout,
            _ => PendingOutcome::Confirm {
                contract_address,
                flaky_polls,
            },
        };
        self.pending.insert(tx_hash, outcome);

        Ok(tx_hash)
    }

    /// Take the injected failure for a transaction, counting down
    /// submission connectivity failures
    fn take_failure(
        failures: &mut HashMap<usize, MockFailure>,
        index: usize,
    ) -> Option<MockFailure> {
        let failure = failures.get(&index).copied();
        if let Some(MockFailure::SubmitConnectivity(n)) = failure {
            if n > 0 {
                failures.insert(index, MockFailure::SubmitConnectivity(n - 1));
            }
        }
        failure
    }
}

impl Network for MockNetwork {
    async fn submit_creation(&self, code: Bytes) -> Result<Submission, DeployError> {
        let mut state = self.lock();
        let index = state.next_creation;
        let failure = MockState::take_failure(&mut state.creation_failures, index);

        let contract_address = MockNetwork::address_for_nonce(state.nonce);
        let res = state.accept(failure, Some(contract_address));
        if !matches!(&res, Err(e) if e.is_retryable()) {
            state.next_creation += 1;
        }

        let tx_hash = res?;
        state.creations.push(code);
        if let Some(signal) = state.cancellations.get(&index) {
            signal.cancel();
        }

        Ok(Submission {
            tx_hash,
            contract_address,
        })
    }

    async fn submit_call(&self, to: Address, calldata: Bytes) -> Result<TxHash, DeployError> {
        let mut state = self.lock();
        let index = state.next_call;
        let failure = MockState::take_failure(&mut state.call_failures, index);

        let res = state.accept(failure, None);
        if !matches!(&res, Err(e) if e.is_retryable()) {
            state.next_call += 1;
        }

        let tx_hash = res?;
        state.calls.push((to, calldata));

        Ok(tx_hash)
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Confirmation, DeployError> {
        let mut state = self.lock();
        state.wait_timeouts.push(timeout);
        let outcome = state.pending.get_mut(&tx_hash).ok_or_else(|| {
            DeployError::ConnectivityError(format!("unknown transaction {tx_hash}"))
        })?;

        match outcome {
            PendingOutcome::Confirm { flaky_polls, .. } if *flaky_polls > 0 => {
                *flaky_polls -= 1;
                Err(DeployError::ConnectivityError("connection reset".to_string()))
            }
            PendingOutcome::Confirm {
                contract_address, ..
            } => Ok(Confirmation::Included {
                block_number: Some(1),
                contract_address: *contract_address,
            }),
            PendingOutcome::Revert => Ok(Confirmation::Reverted {
                block_number: Some(1),
            }),
            PendingOutcome::Timeout => Err(DeployError::DeploymentTimeout(format!(
                "{tx_hash} not confirmed within {timeout:?}"
            ))),
        }
    }
}
