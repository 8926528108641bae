use {
    crate::{Error, Result, SolanaRpcProvider, TraceNativeProvider},
    base64::prelude::*,
    solana_hash::Hash,
    solana_message::AddressLookupTableAccount,
    solana_pubkey::Pubkey,
    solana_rpc_client_api::{
        config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
        response::{RpcPrioritizationFee, RpcSimulateTransactionResult},
    },
    solana_signature::Signature,
    solana_transaction::versioned::VersionedTransaction,
    tracing::debug,
};

#[async_trait::async_trait]
impl SolanaRpcProvider for TraceNativeProvider {
    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>> {
        self.0
            .get_recent_prioritization_fees(accounts)
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to get prioritization fees: {e}")))
    }

    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn get_lookup_table_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        crate::lookup::fetch_lookup_tables(pubkeys, &self.0).await
    }

    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.0
            .get_latest_blockhash()
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to get latest blockhash: {e}")))
    }

    #[tracing::instrument(skip(self), level = tracing::Level::INFO)]
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.0
            .get_balance(pubkey)
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to get balance of {pubkey}: {e}")))
    }

    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let transaction_base64 = BASE64_STANDARD.encode(bincode::serialize(&tx)?);
            debug!(simulate_tx =? transaction_base64);
        }
        let result = self
            .0
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to simulate transaction: {e}")))?;
        debug!(err =? result.value.err, units =? result.value.units_consumed, "simulated");
        Ok(result.value)
    }

    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature> {
        let signature = self
            .0
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| Error::SubmissionRejected(e.to_string()))?;
        debug!(%signature, "accepted");
        Ok(signature)
    }
}
