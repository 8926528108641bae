#![allow(dead_code)]
use {
    dashmap::DashMap,
    serde_json::Value,
    solana_commitment_config::CommitmentConfig,
    solana_hash::Hash,
    solana_instruction::{AccountMeta, Instruction},
    solana_keypair::Keypair,
    solana_message::AddressLookupTableAccount,
    solana_pubkey::{Pubkey, pubkey},
    solana_rpc_client::nonblocking::rpc_client::RpcClient,
    solana_rpc_client_api::{
        config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
        response::{RpcPrioritizationFee, RpcSimulateTransactionResult},
    },
    solana_signature::Signature,
    solana_signer::Signer,
    solana_transaction::versioned::VersionedTransaction,
    solana_transaction_error::TransactionError,
    std::{
        env,
        sync::{Arc, Mutex, Once},
        time::Duration,
    },
    tracing::trace,
    tracing_subscriber::{EnvFilter, fmt::format::FmtSpan},
    txpilot::{
        Config,
        InstructionBackend,
        InstructionPlan,
        Result,
        RetryPolicy,
        RpcConfig,
        SolanaRpcProvider,
        TraceNativeProvider,
        codec,
    },
};

pub static INIT: Once = Once::new();
pub const RANDO: Pubkey = pubkey!("8X35rQUK2u9hfn8rMPwwr6ZSEUhbmfDPEapp589XyoM1");
pub const MEMO_PROGRAM: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
pub fn setup() {
    INIT.call_once(|| {
        if env::var("CI").is_err() {
            // only load .env if not in CI
            if dotenvy::dotenv_override().is_err() {
                eprintln!("no .env file");
            }
        }
        tracing_subscriber::fmt()
            .with_target(true)
            .with_level(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}

/// Payer and provider for the tests that talk to a real cluster.
#[allow(clippy::expect_fun_call)]
pub fn init() -> anyhow::Result<(Keypair, TraceNativeProvider)> {
    setup();
    let owner = match env::var("KEYPAIR_FILE") {
        Ok(kp) => solana_keypair::read_keypair_file(&kp)
            .expect(&format!("unable to load keypair file {kp}")),
        Err(_) => {
            let kp = env::var("TEST_PRIVATE_KEY").expect("TEST_PRIVATE_KEY is not set");
            Keypair::from_base58_string(&kp)
        }
    };
    trace!("using solana address {}", owner.pubkey());
    let url = env::var("RPC_URL").expect("RPC_URL is not set");
    trace!("using RPC {url}");
    let rpc = RpcClient::new_with_commitment(url, CommitmentConfig::confirmed());
    Ok((owner, rpc.into()))
}

pub fn config(lookup_attempts: u32) -> Config {
    Config::builder()
        .rpc(RpcConfig::builder().url("http://localhost:8899").build())
        .backend_url("http://localhost:3000")
        .relay_url("http://localhost:4000")
        .lookup_wait(
            RetryPolicy::new(lookup_attempts, Duration::from_secs(1))
                .with_initial_delay(Duration::from_secs(3)),
        )
        .build()
}

/// A memo-like instruction touching `accounts` as writable non-signers.
pub fn touching(accounts: &[Pubkey]) -> Instruction {
    Instruction::new_with_bytes(
        MEMO_PROGRAM,
        b"txpilot",
        accounts.iter().map(|a| AccountMeta::new(*a, false)).collect(),
    )
}

/// In-memory ledger.
///
/// Lookup tables registered as pending stay invisible for a number of polls
/// before they start showing up.
#[derive(Clone, Default)]
pub struct MockLedger {
    tables: Arc<DashMap<Pubkey, AddressLookupTableAccount>>,
    pending: Arc<DashMap<Pubkey, u32>>,
    pub fees: Arc<Mutex<Vec<u64>>>,
    pub simulation_error: Arc<Mutex<Option<TransactionError>>>,
    pub simulated: Arc<Mutex<Vec<RpcSimulateTransactionConfig>>>,
    pub sent: Arc<Mutex<Vec<(VersionedTransaction, RpcSendTransactionConfig)>>>,
}

impl MockLedger {
    pub fn live_table(&self, addresses: Vec<Pubkey>) -> Pubkey {
        let key = Pubkey::new_unique();
        self.tables
            .insert(key, AddressLookupTableAccount { key, addresses });
        key
    }

    /// Table that becomes readable on poll number `polls + 1`
    pub fn pending_table(&self, addresses: Vec<Pubkey>, polls: u32) -> Pubkey {
        let key = self.live_table(addresses);
        self.pending.insert(key, polls);
        key
    }

    pub fn with_fees(self, fees: &[u64]) -> Self {
        if let Ok(mut f) = self.fees.lock() {
            *f = fees.to_vec();
        }
        self
    }

    pub fn failing_simulation(self, err: TransactionError) -> Self {
        if let Ok(mut e) = self.simulation_error.lock() {
            *e = Some(err);
        }
        self
    }

    pub fn sent(&self) -> Vec<(VersionedTransaction, RpcSendTransactionConfig)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn simulated(&self) -> Vec<RpcSimulateTransactionConfig> {
        self.simulated.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SolanaRpcProvider for MockLedger {
    async fn get_recent_prioritization_fees(
        &self,
        _accounts: &[Pubkey],
    ) -> Result<Vec<RpcPrioritizationFee>> {
        let fees = self.fees.lock().map(|f| f.clone()).unwrap_or_default();
        Ok(fees
            .into_iter()
            .enumerate()
            .map(|(slot, prioritization_fee)| RpcPrioritizationFee {
                slot: slot as u64,
                prioritization_fee,
            })
            .collect())
    }

    async fn get_lookup_table_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        let mut found = Vec::new();
        for key in pubkeys {
            if let Some(mut remaining) = self.pending.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    continue;
                }
            }
            if let Some(table) = self.tables.get(key) {
                found.push(table.clone());
            }
        }
        Ok(found)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64> {
        Ok(1_000_000_000)
    }

    async fn simulate_transaction(
        &self,
        _tx: &VersionedTransaction,
        config: RpcSimulateTransactionConfig,
    ) -> Result<RpcSimulateTransactionResult> {
        if let Ok(mut s) = self.simulated.lock() {
            s.push(config);
        }
        let err = self
            .simulation_error
            .lock()
            .ok()
            .and_then(|e| e.clone());
        let logs = err
            .as_ref()
            .map(|_| vec!["Program log: slippage exceeded".to_string()]);
        Ok(RpcSimulateTransactionResult {
            err: err.map(Into::into),
            logs,
            accounts: None,
            units_consumed: Some(42_000),
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
        if let Ok(mut s) = self.sent.lock() {
            s.push((tx.clone(), config));
        }
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }
}

/// Backend answering every request with the same plan.
pub struct StubBackend {
    pub plan: InstructionPlan,
    pub requests: Arc<Mutex<Vec<Value>>>,
}

impl StubBackend {
    pub fn new(plan: InstructionPlan) -> Self {
        Self {
            plan,
            requests: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl InstructionBackend for StubBackend {
    async fn instruction_plan(&self, params: &Value) -> Result<InstructionPlan> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(params.clone());
        }
        Ok(self.plan.clone())
    }

    async fn bundle_transactions(&self, _params: &Value) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub fn ix_data(
    instructions: &[Instruction],
    signers: &[&Keypair],
    tables: &[Pubkey],
) -> txpilot::backend::IxData {
    txpilot::backend::IxData {
        instructions: instructions.iter().map(codec::encode).collect(),
        signers: signers.iter().map(|k| k.to_base58_string()).collect(),
        lookup_table_addresses: tables.iter().map(|t| t.to_string()).collect(),
    }
}
