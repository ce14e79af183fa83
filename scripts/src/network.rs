//! The network interface the pipeline deploys through, and its
//! implementation over a JSON-RPC node

use std::{str::FromStr, time::Duration};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::{http::reqwest::Url, RpcError, TransportError},
};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::{
    constants::RECEIPT_POLL_INTERVAL_MS,
    errors::{DeployError, ScriptError},
};

/// A creation transaction accepted by the network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submission {
    /// The hash of the creation transaction
    pub tx_hash: TxHash,
    /// The address the contract will be deployed at, derived from the
    /// sender and its nonce
    pub contract_address: Address,
}

/// The outcome of a transaction once it is included in a block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// The transaction executed successfully
    Included {
        /// The block the transaction was included in
        block_number: Option<u64>,
        /// The address of the created contract, for creation transactions
        contract_address: Option<Address>,
    },
    /// The transaction was included but its execution reverted
    Reverted {
        /// The block the transaction was included in
        block_number: Option<u64>,
    },
}

/// The operations the pipeline needs from a chain.
///
/// Implementations must not resubmit transactions on their own; retrying
/// is the caller's decision.
#[allow(async_fn_in_trait)]
pub trait Network {
    /// Submit a contract creation transaction with the given creation code
    async fn submit_creation(&self, code: Bytes) -> Result<Submission, DeployError>;

    /// Submit a call transaction to the given contract
    async fn submit_call(&self, to: Address, calldata: Bytes) -> Result<TxHash, DeployError>;

    /// Block until the transaction is included, or the timeout elapses
    async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<Confirmation, DeployError>;
}

// ---------------
// | RPC NETWORK |
// ---------------

/// A [`Network`] backed by an HTTP JSON-RPC node, signing with a local key
pub struct RpcNetwork {
    /// The RPC provider, with the signer attached
    provider: DynProvider,
    /// The address transactions are sent from
    sender: Address,
    /// The interval at which receipts are polled
    poll_interval: Duration,
}

impl RpcNetwork {
    /// Sets up the client with which to deploy, from the deployer's private
    /// key and the RPC url
    pub async fn connect(priv_key: &str, rpc_url: &str) -> Result<Self, ScriptError> {
        let signer = PrivateKeySigner::from_str(priv_key)
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        let sender = signer.address();
        let url: Url = rpc_url
            .parse()
            .map_err(|e| ScriptError::ClientInitialization(format!("{rpc_url}: {e}")))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .on_http(url);
        let provider = DynProvider::new(provider);

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        info!(chain_id, sender = %sender, "connected to {rpc_url}");

        Ok(Self {
            provider,
            sender,
            poll_interval: Duration::from_millis(RECEIPT_POLL_INTERVAL_MS),
        })
    }

    /// The address transactions are sent from
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Poll for a transaction receipt until one is available
    async fn poll_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, DeployError> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(classify_rpc_error)?;

            match receipt {
                Some(receipt) => return Ok(receipt),
                None => sleep(self.poll_interval).await,
            }
        }
    }
}

impl Network for RpcNetwork {
    async fn submit_creation(&self, code: Bytes) -> Result<Submission, DeployError> {
        // Pin the nonce so that the contract address is known up front
        let nonce = self
            .provider
            .get_transaction_count(self.sender)
            .await
            .map_err(classify_rpc_error)?;

        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_nonce(nonce)
            .with_deploy_code(code);
        let pending = self.provider.send_transaction(tx).await.map_err(classify_rpc_error)?;

        let submission = Submission {
            tx_hash: *pending.tx_hash(),
            contract_address: self.sender.create(nonce),
        };
        debug!(tx = %submission.tx_hash, nonce, "submitted creation transaction");

        Ok(submission)
    }

    async fn submit_call(&self, to: Address, calldata: Bytes) -> Result<TxHash, DeployError> {
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(calldata);
        let pending = self.provider.send_transaction(tx).await.map_err(classify_rpc_error)?;

        debug!(tx = %pending.tx_hash(), to = %to, "submitted call transaction");
        Ok(*pending.tx_hash())
    }

    async fn wait_for_confirmation(
        &self,
        tx_hash: TxHash,
        wait: Duration,
    ) -> Result<Confirmation, DeployError> {
        let receipt = timeout(wait, self.poll_receipt(tx_hash)).await.map_err(|_| {
            DeployError::DeploymentTimeout(format!("{tx_hash} not confirmed within {wait:?}"))
        })??;

        debug!(
            tx = %tx_hash,
            block = ?receipt.block_number,
            gas_used = receipt.gas_used,
            "receipt received"
        );
        if receipt.status() {
            Ok(Confirmation::Included {
                block_number: receipt.block_number,
                contract_address: receipt.contract_address,
            })
        } else {
            Ok(Confirmation::Reverted {
                block_number: receipt.block_number,
            })
        }
    }
}

/// Classify an RPC error: transport failures are connectivity errors, an
/// error response from the node is a rejection of the transaction
fn classify_rpc_error(err: TransportError) -> DeployError {
    match err {
        RpcError::ErrorResp(payload) => {
            DeployError::DeploymentReverted(payload.message.to_string())
        }
        RpcError::Transport(kind) => DeployError::ConnectivityError(kind.to_string()),
        other => DeployError::ConnectivityError(other.to_string()),
    }
}
