use {
    crate::{Error, NativeRpcWrapper, Result, SolanaRpcProvider},
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
    tracing::{debug, trace},
};

#[async_trait::async_trait]
impl SolanaRpcProvider for NativeRpcWrapper {
    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>> {
        debug!(accounts =? accounts.len(), "get_recent_prioritization_fees");
        self.0
            .get_recent_prioritization_fees(accounts)
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to get prioritization fees: {e}")))
    }

    async fn get_lookup_table_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        debug!(accounts =? pubkeys.len(), "calling get_lookup_table_accounts");
        crate::lookup::fetch_lookup_tables(pubkeys, &self.0).await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        debug!("calling get_latest_blockhash");
        self.0
            .get_latest_blockhash()
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to get latest blockhash: {e}")))
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        debug!(account =% pubkey, "calling get_balance");
        self.0
            .get_balance(pubkey)
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to get balance of {pubkey}: {e}")))
    }

    async fn simulate_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult> {
        debug!("calling simulate_transaction");
        let result = self
            .0
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| Error::SolanaRpcError(format!("failed to simulate transaction: {e}")))?;
        Ok(result.value)
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: RpcSendTransactionConfig,
    ) -> Result<Signature> {
        if tracing::enabled!(tracing::Level::TRACE) {
            let transaction_base64 = BASE64_STANDARD.encode(bincode::serialize(&tx)?);
            trace!(send_tx =? transaction_base64);
        }
        self.0
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| Error::SubmissionRejected(e.to_string()))
    }
}
