//! Atomic multi-transaction submission through a bundle relay.
use {
    crate::{
        BundleConfig,
        Error,
        Result,
        SolanaRpcProvider,
        TransactionBuilder,
        backend::InstructionBackend,
        codec,
        relay::{BundleRelay, BundleSimulation, SimulateBundleConfig},
        sign_partial,
    },
    serde_json::Value,
    solana_account_decoder_client_types::UiAccount,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signer::Signer,
    solana_transaction::versioned::VersionedTransaction,
    tracing::{debug, info, warn},
};

/// Watched account states captured around one transaction of the bundle,
/// in watched-account order.
pub type AccountSnapshot = Vec<UiAccount>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BundleResult {
    pub pre_state: Vec<AccountSnapshot>,
    pub post_state: Vec<AccountSnapshot>,
    pub outcome: BundleOutcome,
    /// Set once the bundle was handed to the relay
    pub bundle_id: Option<String>,
}

impl BundleResult {
    fn from_simulation(simulation: BundleSimulation) -> Self {
        let outcome = match simulation.summary.failure_reason() {
            None => BundleOutcome::Succeeded,
            Some(reason) => BundleOutcome::Failed(reason),
        };
        let (pre_state, post_state) = simulation
            .transaction_results
            .into_iter()
            .map(|r| {
                (
                    r.pre_execution_accounts.unwrap_or_default(),
                    r.post_execution_accounts.unwrap_or_default(),
                )
            })
            .unzip();
        Self {
            pre_state,
            post_state,
            outcome,
            bundle_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == BundleOutcome::Succeeded
    }
}

/// The payer followed by its associated token account for every mint.
pub fn watched_accounts(payer: &Pubkey, mints: &[Pubkey]) -> Vec<Pubkey> {
    std::iter::once(*payer)
        .chain(
            mints
                .iter()
                .map(|mint| spl_associated_token_account::get_associated_token_address(payer, mint)),
        )
        .collect()
}

/// Simulates a set of signed transactions as one atomic bundle and, if asked
/// to and only when the simulation passed, submits it with a tip.
///
/// A failed bundle is reported, never retried.
pub struct BundlePipeline<R: SolanaRpcProvider, Rl: BundleRelay> {
    rpc: R,
    relay: Rl,
    payer: Keypair,
    config: BundleConfig,
}

impl<R: SolanaRpcProvider, Rl: BundleRelay> BundlePipeline<R, Rl> {
    pub fn new(rpc: R, relay: Rl, payer: Keypair, config: BundleConfig) -> Self {
        Self {
            rpc,
            relay,
            payer,
            config,
        }
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    pub fn relay(&self) -> &Rl {
        &self.relay
    }

    fn check_size(&self, transactions: usize, auto_submit: bool) -> Result<()> {
        if transactions == 0 {
            return Err(Error::NoInstructions);
        }
        let total = if auto_submit {
            transactions + 1
        } else {
            transactions
        };
        if total > self.config.max_bundle_size {
            return Err(Error::BundleTooLarge(total, self.config.max_bundle_size));
        }
        Ok(())
    }

    async fn wait_for_leader(&self) -> Result<()> {
        let threshold = self.config.leader_slot_threshold;
        self.config
            .leader_wait
            .poll(
                "leader-slot",
                |attempt| async move {
                    let leader = self.relay.get_next_scheduled_leader().await?;
                    let slots = leader.slots_away();
                    info!(slots, attempt, "next relay leader slot");
                    Ok((slots <= threshold).then_some(()))
                },
                Error::LeaderWindowTimeout,
            )
            .await
    }

    async fn tip_transaction(&self) -> Result<VersionedTransaction> {
        let tip_account = self
            .relay
            .get_tip_accounts()
            .await?
            .first()
            .copied()
            .ok_or_else(|| Error::RelayError("relay returned no tip accounts".to_string()))?;
        let payer = self.payer.pubkey();
        TransactionBuilder::from(solana_system_interface::instruction::transfer(
            &payer,
            &tip_account,
            self.config.tip_lamports,
        ))
        .build(&payer, &[&self.payer], &self.rpc)
        .await
    }

    #[tracing::instrument(skip(self, transactions, watched), fields(txs = transactions.len()))]
    pub async fn simulate_and_maybe_submit(
        &self,
        transactions: Vec<VersionedTransaction>,
        watched: &[Pubkey],
        auto_submit: bool,
    ) -> Result<BundleResult> {
        self.check_size(transactions.len(), auto_submit)?;
        let config = SimulateBundleConfig::builder()
            .watched_accounts(watched.to_vec())
            .build();
        let simulation = self.relay.simulate_bundle(&transactions, &config).await?;
        let mut result = BundleResult::from_simulation(simulation);

        if let BundleOutcome::Failed(reason) = &result.outcome {
            warn!(%reason, "bundle simulation failed");
            return Ok(result);
        }
        info!("bundle simulation succeeded");
        if !auto_submit {
            return Ok(result);
        }

        self.wait_for_leader().await?;
        let mut bundle = transactions;
        bundle.push(self.tip_transaction().await?);
        let bundle_id = self.relay.send_bundle(&bundle).await?;
        result.bundle_id = Some(bundle_id.clone());
        self.relay
            .await_bundle_result(&bundle_id, &self.config.result_wait)
            .await?;
        Ok(result)
    }

    /// Fetches pre-built transactions from the backend, adds the payer's
    /// signature and runs them as a bundle. A failed simulation is
    /// [`Error::BundleFailed`].
    #[tracing::instrument(skip_all)]
    pub async fn swap_and_mint<B: InstructionBackend>(
        &self,
        backend: &B,
        params: &Value,
        watched: &[Pubkey],
        auto_submit: bool,
    ) -> Result<BundleResult> {
        let encoded = backend.bundle_transactions(params).await?;
        let payer = self.payer.pubkey();
        let balance = self.rpc.get_balance(&payer).await?;
        debug!(%payer, balance, transactions = encoded.len(), "payer balance");
        let mut transactions = Vec::with_capacity(encoded.len());
        for raw in &encoded {
            let mut tx = codec::decode_transaction(raw)?;
            sign_partial(&mut tx, &[&self.payer])?;
            transactions.push(tx);
        }
        let result = self
            .simulate_and_maybe_submit(transactions, watched, auto_submit)
            .await?;
        match &result.outcome {
            BundleOutcome::Succeeded => Ok(result),
            BundleOutcome::Failed(reason) => Err(Error::BundleFailed(reason.clone())),
        }
    }
}
