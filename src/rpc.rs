mod counter;
mod lookup;
mod native;
mod trace;
use {
    crate::{Result, RpcConfig, SolanaRpcProvider},
    dashmap::DashMap,
    moka::future::Cache,
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
    std::sync::Arc,
};

/// Provider with lookup table caching.
///
/// Only resolved tables are cached: once a table is readable it stays usable,
/// while a miss may turn into a hit on the very next poll. Misses therefore
/// always go to the inner provider.
///
/// This uses [`moka::future::Cache`] for efficient caching of lookup tables.
/// See their documentation for more details.
#[derive(bon::Builder)]
pub struct LookupTableCacheProvider<T: SolanaRpcProvider> {
    inner: T,
    lookup_cache: Cache<Pubkey, AddressLookupTableAccount>,
}

/// A thread-safe wrapper around Solana's native RPC client
///
/// This wrapper uses `Arc` internally for efficient cloning and shared
/// ownership. Use this when you need a type that implements the
/// `SolanaRpcProvider` trait while working with the native Solana RPC client.
#[derive(Clone)]
pub struct NativeRpcWrapper(pub Arc<RpcClient>);

impl From<RpcClient> for NativeRpcWrapper {
    fn from(client: RpcClient) -> Self {
        Self(Arc::new(client))
    }
}

impl AsRef<RpcClient> for NativeRpcWrapper {
    fn as_ref(&self) -> &RpcClient {
        &self.0
    }
}

impl NativeRpcWrapper {
    pub fn from_config(config: &RpcConfig) -> Self {
        RpcClient::new_with_commitment(config.url.clone(), config.commitment).into()
    }
}

/// A thread-safe tracing wrapper around Solana's native RPC client
#[derive(Clone)]
pub struct TraceNativeProvider(pub Arc<RpcClient>);

impl From<RpcClient> for TraceNativeProvider {
    fn from(client: RpcClient) -> Self {
        Self(Arc::new(client))
    }
}

impl AsRef<RpcClient> for TraceNativeProvider {
    fn as_ref(&self) -> &RpcClient {
        &self.0
    }
}

impl TraceNativeProvider {
    pub fn from_config(config: &RpcConfig) -> Self {
        RpcClient::new_with_commitment(config.url.clone(), config.commitment).into()
    }
}

/// Convenient definitions for the [`CounterRpcProvider`]
#[derive(Clone, Copy, Debug, Eq, std::hash::Hash, PartialEq, PartialOrd)]
pub enum RpcMethod {
    Blockhash,
    Lookup,
    Balance,
    Simulate,
    Send,
    Fees,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 6] = [
        RpcMethod::Blockhash,
        RpcMethod::Lookup,
        RpcMethod::Balance,
        RpcMethod::Simulate,
        RpcMethod::Send,
        RpcMethod::Fees,
    ];
}

/// A testing utility which implements a simple counter for tracking RPC method
/// calls.
///
/// **NOTE**: not meant for production use
///
/// This provider is useful for testing and debugging purposes, e.g. proving
/// that a failed build never reached [`SolanaRpcProvider::send_transaction`].
#[derive(Clone)]
pub struct CounterRpcProvider<T: SolanaRpcProvider + Clone> {
    inner: T,
    pub(super) counters: Arc<DashMap<RpcMethod, u64>>,
}

impl<T: SolanaRpcProvider + Clone> From<T> for CounterRpcProvider<T> {
    fn from(inner: T) -> Self {
        Self::new(inner)
    }
}

impl<T: SolanaRpcProvider + Clone> CounterRpcProvider<T> {
    pub fn new(inner: T) -> Self {
        let counters = Arc::new(DashMap::new());
        for method in RpcMethod::ALL {
            counters.insert(method, 0);
        }
        Self { inner, counters }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[derive(Clone, Default)]
pub struct NoopRpc;

#[allow(unused_variables)]
mod noop {
    use super::*;
    #[async_trait::async_trait]
    impl SolanaRpcProvider for NoopRpc {
        async fn get_recent_prioritization_fees(
            &self,
            accounts: &[Pubkey],
        ) -> Result<Vec<RpcPrioritizationFee>> {
            Ok(vec![])
        }

        async fn get_lookup_table_accounts(
            &self,
            pubkeys: &[Pubkey],
        ) -> Result<Vec<AddressLookupTableAccount>> {
            Ok(vec![])
        }

        async fn get_latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::new_unique())
        }

        async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
            Ok(0)
        }

        async fn simulate_transaction(
            &self,
            tx: &VersionedTransaction,
            config: RpcSimulateTransactionConfig,
        ) -> Result<RpcSimulateTransactionResult> {
            Ok(RpcSimulateTransactionResult {
                err: None,
                logs: None,
                accounts: None,
                units_consumed: None,
                loaded_accounts_data_size: None,
                return_data: None,
                inner_instructions: None,
                replacement_blockhash: None,
            })
        }

        async fn send_transaction(
            &self,
            tx: &VersionedTransaction,
            config: RpcSendTransactionConfig,
        ) -> Result<Signature> {
            Ok(tx.signatures.first().copied().unwrap_or_default())
        }
    }
}
