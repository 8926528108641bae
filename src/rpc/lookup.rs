use {
    super::LookupTableCacheProvider,
    crate::{Result, SolanaRpcProvider},
    moka::future::Cache,
    solana_hash::Hash,
    solana_message::AddressLookupTableAccount,
    solana_pubkey::Pubkey,
    solana_rpc_client_api::{
        config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
        response::{RpcPrioritizationFee, RpcSimulateTransactionResult},
    },
    solana_signature::Signature,
    solana_transaction::versioned::VersionedTransaction,
    tracing::{Level, event},
};

impl<T: SolanaRpcProvider> LookupTableCacheProvider<T> {
    pub fn new(client: T, lookup_cache: Cache<Pubkey, AddressLookupTableAccount>) -> Self {
        Self {
            inner: client,
            lookup_cache,
        }
    }

    /// Checks if the lookup table cache is empty.
    ///
    /// **Note:** This method does not run pending tasks on the cache.
    /// Results may be inaccurate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup_cache.entry_count() == 0
    }

    /// Returns the number of entries in the lookup table cache.
    ///
    /// **Note:** This method does not run pending tasks on the cache. Results
    /// may be inaccurate.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.lookup_cache.entry_count()
    }

    pub async fn clear(&self) {
        self.lookup_cache.invalidate_all();
        self.lookup_cache.run_pending_tasks().await;
    }

    /// Runs pending tasks on the cache to ensure counts are accurate.
    /// This is needed because moka cache uses eventual consistency for
    /// entry_count.
    pub async fn sync(&self) {
        self.lookup_cache.run_pending_tasks().await;
    }
}

#[async_trait::async_trait]
impl<T: SolanaRpcProvider + Send + Sync> SolanaRpcProvider for LookupTableCacheProvider<T> {
    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>> {
        self.inner.get_recent_prioritization_fees(accounts).await
    }

    /// Serves cached tables and fetches the rest in a single inner call.
    ///
    /// **NOTE** the order of the results does not matter.
    /// If pubkeys = [A, B, C] and cache has [A, C]:
    /// result = [A, C]  // from cache
    /// result.extend(\[ B \])  // fetched
    /// Final: \[ A, C, B \]  // THIS IS VALID
    #[tracing::instrument(skip_all, name = "lookup-resolver", fields(lookups = pubkeys.len()))]
    async fn get_lookup_table_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        let mut resolved = Vec::with_capacity(pubkeys.len());
        let mut missing = Vec::new();
        for pubkey in pubkeys {
            match self.lookup_cache.get(pubkey).await {
                Some(account) => resolved.push(account),
                None => missing.push(*pubkey),
            }
        }
        if missing.is_empty() {
            return Ok(resolved);
        }
        event!(Level::DEBUG, misses = missing.len(), "cache-miss");
        let fetched = self.inner.get_lookup_table_accounts(&missing).await?;
        for account in fetched {
            self.lookup_cache.insert(account.key, account.clone()).await;
            resolved.push(account);
        }
        Ok(resolved)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.inner.get_latest_blockhash().await
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.inner.get_balance(pubkey).await
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult> {
        self.inner.simulate_transaction(tx, config).await
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature> {
        self.inner.send_transaction(tx, config).await
    }
}

#[cfg(test)]
mod tests {

    use {
        super::*,
        crate::{CounterRpcProvider, NoopRpc, RpcMethod},
        dashmap::DashMap,
        std::{fmt::Debug, sync::Arc, time::Duration},
    };

    #[derive(Clone, Default)]
    struct MockRpcProvider {
        inner: NoopRpc,
        lookups: Arc<DashMap<Pubkey, AddressLookupTableAccount>>,
    }

    impl Debug for MockRpcProvider {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "mocks={}", self.lookups.len())
        }
    }

    #[async_trait::async_trait]
    impl SolanaRpcProvider for MockRpcProvider {
        async fn get_recent_prioritization_fees(
            &self,
            accounts: &[Pubkey],
        ) -> Result<Vec<RpcPrioritizationFee>> {
            self.inner.get_recent_prioritization_fees(accounts).await
        }

        #[tracing::instrument(level = "info", skip(pubkeys), name = "mock_lookups")]
        async fn get_lookup_table_accounts(
            &self,
            pubkeys: &[Pubkey],
        ) -> Result<Vec<AddressLookupTableAccount>> {
            Ok(pubkeys
                .iter()
                .filter_map(|pubkey| self.lookups.get(pubkey).map(|l| l.clone()))
                .collect())
        }

        async fn get_latest_blockhash(&self) -> Result<Hash> {
            self.inner.get_latest_blockhash().await
        }

        async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
            self.inner.get_balance(pubkey).await
        }

        async fn simulate_transaction(
            &self,
            tx: &VersionedTransaction,
            config: RpcSimulateTransactionConfig,
        ) -> Result<RpcSimulateTransactionResult> {
            self.inner.simulate_transaction(tx, config).await
        }

        async fn send_transaction(
            &self,
            tx: &VersionedTransaction,
            config: RpcSendTransactionConfig,
        ) -> Result<Signature> {
            self.inner.send_transaction(tx, config).await
        }
    }

    fn table(key: Pubkey) -> AddressLookupTableAccount {
        AddressLookupTableAccount {
            key,
            addresses: vec![Pubkey::new_unique()],
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_lookup_cache_hits_and_misses() -> anyhow::Result<()> {
        let mock = MockRpcProvider::default();
        let counter = CounterRpcProvider::new(mock.clone());
        let lookup_cache = LookupTableCacheProvider::new(
            counter.clone(),
            Cache::builder()
                .time_to_live(Duration::from_secs(60))
                .build(),
        );
        assert!(lookup_cache.is_empty());

        let hit1 = Pubkey::new_unique();
        let pending = Pubkey::new_unique();
        let hit2 = Pubkey::new_unique();
        mock.lookups.insert(hit1, table(hit1));
        mock.lookups.insert(hit2, table(hit2));

        let query = vec![hit1, pending, hit2];
        let results = lookup_cache.get_lookup_table_accounts(&query).await?;
        lookup_cache.sync().await;
        assert_eq!(2, results.len());
        assert_eq!(2, lookup_cache.len());
        assert_eq!(1, counter.get_counter(&RpcMethod::Lookup));

        // the pending table is never cached as a miss, so it shows up as soon
        // as the network has it
        mock.lookups.insert(pending, table(pending));
        let results = lookup_cache.get_lookup_table_accounts(&query).await?;
        assert_eq!(3, results.len());
        assert_eq!(2, counter.get_counter(&RpcMethod::Lookup));

        // fully cached now
        let results = lookup_cache.get_lookup_table_accounts(&query).await?;
        assert_eq!(3, results.len());
        assert_eq!(2, counter.get_counter(&RpcMethod::Lookup));

        lookup_cache.clear().await;
        assert!(lookup_cache.is_empty());
        Ok(())
    }
}
