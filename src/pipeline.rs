//! Setup, dependency wait, fee injection, simulation and submission of a
//! backend supplied instruction plan.
use {
    crate::{
        Config,
        Error,
        FeeEstimator,
        LookupTableResolver,
        Result,
        SolanaRpcProvider,
        TransactionBuilder,
        backend::{InstructionBackend, IxData},
        simulate_checked,
    },
    serde_json::Value,
    solana_instruction::Instruction,
    solana_keypair::Keypair,
    solana_message::AddressLookupTableAccount,
    solana_pubkey::Pubkey,
    solana_rpc_client_api::config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
    solana_signature::Signature,
    solana_signer::Signer,
    solana_transaction::versioned::VersionedTransaction,
    std::{fmt::Display, time::Duration},
    tracing::{error, info},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Init,
    SetupBuilt,
    SetupSubmitted,
    DependencyResolved,
    MainBuilt,
    Simulated,
    Submitted,
    Failed(String),
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionReport {
    pub setup_signature: Option<Signature>,
    pub signature: Signature,
    /// Tables cited by the main transaction
    pub lookup_tables: Vec<Pubkey>,
    pub priority_fee: u64,
    pub transitions: Vec<PipelineState>,
}

/// Drives one instruction plan from the backend to an accepted main
/// transaction.
///
/// Only the lookup table wait is retried. Every other failure ends the run
/// in [`PipelineState::Failed`] and is returned to the caller.
pub struct SubmissionPipeline<R: SolanaRpcProvider, Bk: InstructionBackend> {
    payer: Keypair,
    rpc: R,
    backend: Bk,
    config: Config,
    history: Vec<PipelineState>,
}

impl<R: SolanaRpcProvider, Bk: InstructionBackend> SubmissionPipeline<R, Bk> {
    pub fn new(payer: Keypair, rpc: R, backend: Bk, config: Config) -> Self {
        Self {
            payer,
            rpc,
            backend,
            config,
            history: vec![PipelineState::Init],
        }
    }

    pub fn state(&self) -> &PipelineState {
        self.history.last().unwrap_or(&PipelineState::Init)
    }

    pub fn transitions(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    #[tracing::instrument(skip_all, fields(payer = %self.payer.pubkey()))]
    pub async fn run(&mut self, params: &Value) -> Result<SubmissionReport> {
        let mut history = vec![PipelineState::Init];
        let result = self.execute(params, &mut history).await;
        if let Err(e) = &result {
            error!(state = %history.last().cloned().unwrap_or_default(), "pipeline failed: {e}");
            history.push(PipelineState::Failed(e.to_string()));
        }
        self.history = history.clone();
        result.map(|mut report| {
            report.transitions = history;
            report
        })
    }

    async fn execute(
        &self,
        params: &Value,
        history: &mut Vec<PipelineState>,
    ) -> Result<SubmissionReport> {
        let plan = self.backend.instruction_plan(params).await?;

        // every descriptor is decoded before anything touches the ledger
        let setup = match &plan.setup_ix_data {
            Some(setup) => Some((
                DecodedIxData::try_from(&setup.ix_data)?,
                setup.new_lookup_table()?,
            )),
            None => None,
        };
        let main = DecodedIxData::try_from(&plan.ix_data)?;

        let mut setup_signature = None;
        let mut new_table = None;
        if let Some((setup, table)) = &setup {
            let tx = self.build(setup, &[], None).await?;
            transition(history, PipelineState::SetupBuilt);
            let signature = self
                .rpc
                .send_transaction(&tx, RpcSendTransactionConfig::default())
                .await?;
            info!(%signature, %table, "setup transaction accepted");
            transition(history, PipelineState::SetupSubmitted);
            setup_signature = Some(signature);
            new_table = Some(*table);
        }

        let mut lookup_tables = main.lookup_tables.clone();
        lookup_tables.extend(new_table);
        let policy = match new_table {
            Some(_) => self.config.lookup_wait,
            // nothing was just created, tables are either live or missing
            None => self.config.lookup_wait.with_initial_delay(Duration::ZERO),
        };
        let resolved = LookupTableResolver::new(policy)
            .resolve(&self.rpc, &lookup_tables)
            .await?;
        transition(history, PipelineState::DependencyResolved);

        let priority_fee = FeeEstimator::new(self.config.fee.clone())
            .estimate(&self.rpc, &[])
            .await?;
        let tx = self.build(&main, &resolved, Some(priority_fee)).await?;
        transition(history, PipelineState::MainBuilt);

        simulate_checked(&self.rpc, &tx, RpcSimulateTransactionConfig {
            sig_verify: true,
            replace_recent_blockhash: false,
            ..Default::default()
        })
        .await?;
        transition(history, PipelineState::Simulated);

        let signature = self
            .rpc
            .send_transaction(&tx, RpcSendTransactionConfig {
                skip_preflight: true,
                ..Default::default()
            })
            .await?;
        info!(%signature, priority_fee, "main transaction accepted");
        transition(history, PipelineState::Submitted);

        Ok(SubmissionReport {
            setup_signature,
            signature,
            lookup_tables: resolved.iter().map(|t| t.key).collect(),
            priority_fee,
            transitions: Vec::new(),
        })
    }

    /// Signs with the payer plus the plan's own signers. Tables the plan
    /// lists that are not already `resolved` are looked up by the builder.
    async fn build(
        &self,
        decoded: &DecodedIxData,
        resolved: &[AddressLookupTableAccount],
        priority_fee: Option<u64>,
    ) -> Result<VersionedTransaction> {
        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(decoded.signers.len() + 1);
        signers.push(&self.payer);
        for keypair in &decoded.signers {
            signers.push(keypair);
        }

        let mut builder = TransactionBuilder::from(decoded.instructions.clone());
        if resolved.is_empty() {
            if !decoded.lookup_tables.is_empty() {
                builder = builder.with_lookup_keys(decoded.lookup_tables.clone());
            }
        } else {
            builder = builder.with_address_tables(resolved.to_vec());
        }
        if let Some(fee) = priority_fee {
            builder = builder.with_priority_fee(fee);
        }
        builder.build(&self.payer.pubkey(), &signers, &self.rpc).await
    }
}

/// One instruction set of a plan, decoded.
struct DecodedIxData {
    instructions: Vec<Instruction>,
    signers: Vec<Keypair>,
    lookup_tables: Vec<Pubkey>,
}

impl TryFrom<&IxData> for DecodedIxData {
    type Error = Error;

    fn try_from(ix_data: &IxData) -> Result<Self> {
        let instructions = ix_data.decode_instructions()?;
        if instructions.is_empty() {
            return Err(Error::NoInstructions);
        }
        Ok(Self {
            instructions,
            signers: ix_data.decode_signers()?,
            lookup_tables: ix_data.lookup_tables()?,
        })
    }
}

fn transition(history: &mut Vec<PipelineState>, state: PipelineState) {
    info!(%state, "pipeline transition");
    history.push(state);
}
