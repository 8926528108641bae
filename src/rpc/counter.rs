use {
    super::RpcMethod,
    crate::{CounterRpcProvider, Result, SolanaRpcProvider},
    solana_hash::Hash,
    solana_message::AddressLookupTableAccount,
    solana_pubkey::Pubkey,
    solana_rpc_client_api::{
        config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
        response::{RpcPrioritizationFee, RpcSimulateTransactionResult},
    },
    solana_signature::Signature,
    solana_transaction::versioned::VersionedTransaction,
    std::fmt::Display,
};

impl<T: SolanaRpcProvider + Clone> Display for CounterRpcProvider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Method Counters: blockhash={} fees={} lookup={} balance={} simulate={} send={}",
            self.get_counter(&RpcMethod::Blockhash),
            self.get_counter(&RpcMethod::Fees),
            self.get_counter(&RpcMethod::Lookup),
            self.get_counter(&RpcMethod::Balance),
            self.get_counter(&RpcMethod::Simulate),
            self.get_counter(&RpcMethod::Send)
        )
    }
}

impl<T: SolanaRpcProvider + Clone> CounterRpcProvider<T> {
    /// Get the counter for a given method
    pub fn get_counter(&self, method: &RpcMethod) -> u64 {
        self.counters.get(method).map(|c| *c).unwrap_or_default()
    }

    pub fn reset_counters(&self) {
        for mut counter in self.counters.iter_mut() {
            *counter.value_mut() = 0;
        }
    }

    fn bump(&self, method: RpcMethod) {
        *self.counters.entry(method).or_insert(0) += 1;
    }
}

#[async_trait::async_trait]
impl<T: SolanaRpcProvider + Send + Sync + Clone> SolanaRpcProvider for CounterRpcProvider<T> {
    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>> {
        self.bump(RpcMethod::Fees);
        self.inner.get_recent_prioritization_fees(accounts).await
    }

    async fn get_lookup_table_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        self.bump(RpcMethod::Lookup);
        self.inner.get_lookup_table_accounts(pubkeys).await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.bump(RpcMethod::Blockhash);
        self.inner.get_latest_blockhash().await
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.bump(RpcMethod::Balance);
        self.inner.get_balance(pubkey).await
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult> {
        self.bump(RpcMethod::Simulate);
        self.inner.simulate_transaction(tx, config).await
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature> {
        self.bump(RpcMethod::Send);
        self.inner.send_transaction(tx, config).await
    }
}
