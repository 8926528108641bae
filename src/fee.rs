use {
    super::{Error, FeeConfig, Result, SolanaRpcProvider, TransactionBuilder},
    solana_compute_budget_interface::ComputeBudgetInstruction,
    solana_instruction::Instruction,
    solana_pubkey::Pubkey,
    tracing::{debug, info},
};

/// Jupiter v6 aggregator
pub const JUPITER_PROGRAM_ID: Pubkey =
    solana_pubkey::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");
/// Raydium concentrated liquidity
pub const RAYDIUM_CLMM_PROGRAM_ID: Pubkey =
    solana_pubkey::pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");

pub const DEFAULT_FALLBACK_FEE: u64 = 10_000;
pub const MAX_ACCEPTABLE_PRIORITY_FEE: u64 = 50_000_000;

/// Median of the non-zero samples, `None` when nothing is left.
///
/// An even count resolves to the floor of the average of the two middle
/// values.
pub fn median_fee(samples: &[u64]) -> Option<u64> {
    let mut fees: Vec<u64> = samples.iter().copied().filter(|f| *f > 0).collect();
    if fees.is_empty() {
        return None;
    }
    fees.sort_unstable();
    let mid = fees.len() / 2;
    if fees.len() % 2 == 1 {
        Some(fees[mid])
    } else {
        // u128 keeps the sum of two large samples from overflowing
        Some(((fees[mid - 1] as u128 + fees[mid] as u128) / 2) as u64)
    }
}

/// Derives a compute unit price (micro-lamports) from recent network fees.
#[derive(Clone, Debug, Default)]
pub struct FeeEstimator {
    config: FeeConfig,
}

impl From<FeeConfig> for FeeEstimator {
    fn from(config: FeeConfig) -> Self {
        Self::new(config)
    }
}

impl FeeEstimator {
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Samples fees scoped to `accounts`, or to the configured hot accounts
    /// when `accounts` is empty.
    ///
    /// Fails with [`Error::PriorityFeeTooHigh`] instead of clamping, so an
    /// operator notices a congested network.
    #[tracing::instrument(skip_all, level = tracing::Level::DEBUG)]
    pub async fn estimate<T: SolanaRpcProvider>(&self, rpc: &T, accounts: &[Pubkey]) -> Result<u64> {
        let accounts = if accounts.is_empty() {
            self.config.hot_accounts.as_slice()
        } else {
            accounts
        };
        let samples: Vec<u64> = rpc
            .get_recent_prioritization_fees(accounts)
            .await?
            .iter()
            .map(|f| f.prioritization_fee)
            .collect();
        let fee = match median_fee(&samples) {
            Some(fee) => {
                debug!(samples = samples.len(), fee, "median priority fee");
                fee
            }
            None => {
                info!(
                    samples = samples.len(),
                    fallback = self.config.fallback_fee,
                    "no usable fee samples"
                );
                self.config.fallback_fee
            }
        };
        if fee > self.config.max_fee {
            return Err(Error::PriorityFeeTooHigh(fee, self.config.max_fee));
        }
        Ok(fee)
    }
}

impl TransactionBuilder {
    /// Inserts a `SetComputeUnitPrice` instruction at index 0. Fails if the
    /// instructions already set a price; unit limit and heap frame requests
    /// are left alone.
    ///
    /// # Special Considerations
    /// If you use priority fees with a Durable Nonce Transaction, the
    /// AdvanceNonce instruction must come first. Do not use this helper for
    /// those.
    ///
    /// Reference: <https://solana.com/developers/guides/advanced/how-to-use-priority-fees>
    pub fn prepend_compute_unit_price(mut self, micro_lamports: u64) -> Result<Self> {
        if self.instructions.iter().any(is_compute_unit_price) {
            return Err(Error::ComputeBudgetAlreadyPresent);
        }
        self.instructions.insert(
            0,
            ComputeBudgetInstruction::set_compute_unit_price(micro_lamports),
        );
        Ok(self)
    }
}

/// `SetComputeUnitPrice` is variant 3 of the compute budget instruction enum.
fn is_compute_unit_price(ix: &Instruction) -> bool {
    ix.program_id == solana_compute_budget_interface::ID && ix.data.first() == Some(&3)
}
