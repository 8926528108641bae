#![doc = include_str!("../README.md")]

pub mod backend;
pub mod bundle;
pub mod codec;
mod config;
mod error;
mod fee;
mod lookup;
pub mod pipeline;
pub mod relay;
mod retry;
mod rpc;
mod transaction;
use {
    solana_hash::Hash,
    solana_message::AddressLookupTableAccount,
    solana_pubkey::Pubkey,
    solana_rpc_client::nonblocking::rpc_client::RpcClient,
    solana_rpc_client_api::{
        config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
        response::{RpcPrioritizationFee, RpcSimulateTransactionResult},
    },
    solana_signature::Signature,
    solana_transaction::versioned::VersionedTransaction,
};
pub use {
    backend::{HttpBackend, InstructionBackend, InstructionPlan},
    bundle::{BundleOutcome, BundlePipeline, BundleResult},
    config::*,
    error::*,
    fee::*,
    lookup::*,
    moka::{self, future::Cache},
    pipeline::{PipelineState, SubmissionPipeline, SubmissionReport},
    relay::{BundleRelay, JsonRpcRelay},
    retry::RetryPolicy,
    rpc::*,
    transaction::*,
};
pub type Result<T> = std::result::Result<T, Error>;

/// Trait abstracting the ledger RPC operations the pipelines depend on.
///
/// This trait allows for different RPC implementations (native, cached,
/// counting, mocked) while the builder, fee estimator, resolver and pipelines
/// stay oblivious to where the data comes from.
///
/// # Implementing Custom Providers
/// All implementations must convert their failures into the crate's
/// [`Error`] type. `get_lookup_table_accounts` must omit addresses that have
/// no on-chain state yet instead of failing, since readiness polling relies
/// on it.
///
/// # Examples
/// ```no_run
/// # use txpilot::{SolanaRpcProvider, NativeRpcWrapper};
/// # use solana_rpc_client::nonblocking::rpc_client::RpcClient;
/// let rpc = RpcClient::new("https://api.mainnet-beta.solana.com".to_string());
/// let provider: NativeRpcWrapper = rpc.into();
/// ```
#[async_trait::async_trait]
pub trait SolanaRpcProvider: Send + Sync {
    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>>;
    async fn get_lookup_table_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>>;
    async fn get_latest_blockhash(&self) -> Result<Hash>;
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64>;
    /// Returns the raw simulation, including a populated `err` field. Use
    /// [`check_simulation`] to turn it into a [`Result`].
    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult>;
    /// Hands the transaction to the network entry point. Does not wait for
    /// confirmation.
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature>;
}

/// Provides access to native [`RpcClient`] for composability
pub trait SolanaRpcProviderNative: SolanaRpcProvider + AsRef<RpcClient> {}

impl SolanaRpcProviderNative for NativeRpcWrapper {}
impl SolanaRpcProviderNative for TraceNativeProvider {}
