use {
    super::{Error, Result},
    crate::SolanaRpcProvider,
    base64::prelude::*,
    solana_instruction::Instruction,
    solana_message::{AddressLookupTableAccount, VersionedMessage, v0::Message},
    solana_pubkey::Pubkey,
    solana_rpc_client_api::{
        config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
        response::RpcSimulateTransactionResult,
    },
    solana_signature::Signature,
    solana_signer::{Signer, signers::Signers},
    solana_transaction::versioned::VersionedTransaction,
    std::fmt::Debug,
    tracing::debug,
};

/// Largest serialized transaction the network accepts (one packet).
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Builder/Helper for creating signed Solana [`VersionedTransaction`]s,
/// with [`AddressLookupTableAccount`] support
///
/// See [`VersionedTransaction`] and [`Message`] for official reference
#[derive(bon::Builder, Clone, Default)]
pub struct TransactionBuilder {
    pub instructions: Vec<Instruction>,
    /// [`Pubkey`]s that resolve to [`AddressLookupTableAccount`] via
    /// [`SolanaRpcProvider::get_lookup_table_accounts`] at build time
    pub lookup_tables_keys: Option<Vec<Pubkey>>,

    /// Already resolved tables, used as is
    pub address_lookup_tables: Option<Vec<AddressLookupTableAccount>>,

    /// Compute unit price in micro-lamports, prepended when compiling
    pub priority_fee: Option<u64>,
}

impl Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#inxs={}", self.instructions.len())
    }
}

impl TransactionBuilder {
    /// Resolves every lookup reference. Fails with
    /// [`Error::LookupTableUnresolved`] for the first key the network does not
    /// know yet; the builder never waits, see [`crate::LookupTableResolver`].
    async fn lookup_tables<T: SolanaRpcProvider>(
        &self,
        rpc: &T,
    ) -> Result<Option<Vec<AddressLookupTableAccount>>> {
        let mut tables = self.address_lookup_tables.clone().unwrap_or_default();
        if let Some(keys) = self.lookup_tables_keys.as_ref().filter(|k| !k.is_empty()) {
            let fetched = rpc.get_lookup_table_accounts(keys).await?;
            for key in keys {
                if tables.iter().any(|t| t.key == *key) {
                    continue;
                }
                match fetched.iter().find(|t| t.key == *key) {
                    Some(table) => tables.push(table.clone()),
                    None => return Err(Error::LookupTableUnresolved(*key)),
                }
            }
        }
        if tables.is_empty() && self.lookup_tables_keys.is_none() {
            return Ok(self.address_lookup_tables.clone());
        }
        Ok(Some(tables))
    }

    fn compiled_instructions(&self) -> Result<Vec<Instruction>> {
        match self.priority_fee {
            Some(fee) => Ok(self.clone().prepend_compute_unit_price(fee)?.instructions),
            None => Ok(self.instructions.clone()),
        }
    }

    /// Compiles the message against the freshest blockhash. Lookup tables are
    /// resolved before the blockhash is read.
    pub async fn create_message<T: SolanaRpcProvider>(
        &self,
        payer: &Pubkey,
        rpc: &T,
    ) -> Result<VersionedMessage> {
        if self.instructions.is_empty() {
            return Err(Error::NoInstructions);
        }
        let tables = self.lookup_tables(rpc).await?;
        let instructions = self.compiled_instructions()?;
        let blockhash = rpc.get_latest_blockhash().await?;
        Ok(match tables {
            Some(accounts) => VersionedMessage::V0(Message::try_compile(
                payer,
                &instructions,
                &accounts,
                blockhash,
            )?),
            None => VersionedMessage::Legacy(solana_message::Message::new_with_blockhash(
                &instructions,
                Some(payer),
                &blockhash,
            )),
        })
    }

    /// Builds and signs the transaction.
    ///
    /// The provided signers must be exactly the signers the compiled message
    /// requires, payer included. Repeated keys are collapsed. With no signers at all the transaction is
    /// returned unsigned, see [`TransactionBuilder::unsigned_tx`].
    #[tracing::instrument(skip(self, signers, rpc), level = tracing::Level::DEBUG)]
    pub async fn build<S: Signers + ?Sized, T: SolanaRpcProvider>(
        &self,
        payer: &Pubkey,
        signers: &S,
        rpc: &T,
    ) -> Result<VersionedTransaction> {
        let provided = signers.try_pubkeys()?;
        let message = self.create_message(payer, rpc).await?;
        let tx = if provided.is_empty() {
            unsigned(message)
        } else {
            let required = required_signers(&message);
            if let Some(missing) = required.iter().find(|k| !provided.contains(k)) {
                return Err(Error::MissingSigner(*missing));
            }
            if let Some(extra) = provided.iter().find(|k| !required.contains(k)) {
                return Err(Error::UnexpectedSigner(*extra));
            }
            // a key given more than once signs its slot once
            let signed = signers.try_sign_message(&message.serialize())?;
            let mut signatures = Vec::with_capacity(required.len());
            for key in &required {
                let signature = provided
                    .iter()
                    .position(|k| k == key)
                    .and_then(|i| signed.get(i).copied())
                    .ok_or(Error::MissingSigner(*key))?;
                signatures.push(signature);
            }
            VersionedTransaction {
                signatures,
                message,
            }
        };
        let size = transaction_size(&tx)?;
        debug!(size, signatures = tx.signatures.len(), "built transaction");
        if size > MAX_TRANSACTION_SIZE {
            return Err(Error::TransactionTooLarge {
                size,
                max: MAX_TRANSACTION_SIZE,
            });
        }
        Ok(tx)
    }

    pub async fn unsigned_tx<T: SolanaRpcProvider>(
        &self,
        payer: &Pubkey,
        rpc: &T,
    ) -> Result<VersionedTransaction> {
        Ok(unsigned(self.create_message(payer, rpc).await?))
    }

    /// Builds, simulates and sends the transaction, skipping preflight since
    /// the simulation already ran.
    #[tracing::instrument(skip(self, rpc, signers), level = tracing::Level::INFO)]
    pub async fn send<S: Signers + ?Sized, T: SolanaRpcProvider>(
        &self,
        rpc: &T,
        payer: &Pubkey,
        signers: &S,
    ) -> Result<Signature> {
        let tx = self.build(payer, signers, rpc).await?;
        simulate_checked(rpc, &tx, RpcSimulateTransactionConfig {
            sig_verify: true,
            ..Default::default()
        })
        .await?;
        rpc.send_transaction(&tx, RpcSendTransactionConfig {
            skip_preflight: true,
            ..Default::default()
        })
        .await
    }
}

impl TransactionBuilder {
    /// When [`TransactionBuilder::build`] is called, these keys will be
    /// resolved via RPC into [`AddressLookupTableAccount`]s.
    pub fn with_lookup_keys<I, P>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Pubkey>,
    {
        let new_keys: Vec<Pubkey> = keys.into_iter().map(|k| k.into()).collect();
        match self.lookup_tables_keys {
            Some(ref mut existing) => existing.extend(new_keys),
            None => self.lookup_tables_keys = Some(new_keys),
        }
        self
    }

    /// Tables passed here are used without an RPC round trip. A key given to
    /// [`TransactionBuilder::with_lookup_keys`] that is also present here is
    /// not fetched.
    pub fn with_address_tables<I, P>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<AddressLookupTableAccount>,
    {
        let new_tables: Vec<AddressLookupTableAccount> =
            keys.into_iter().map(|k| k.into()).collect();
        match self.address_lookup_tables {
            Some(ref mut existing) => existing.extend(new_tables),
            None => self.address_lookup_tables = Some(new_tables),
        }
        self
    }

    pub fn with_priority_fee(mut self, micro_lamports: u64) -> Self {
        self.priority_fee = Some(micro_lamports);
        self
    }

    /// Adds an instruction to the transaction.
    pub fn push(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Appends multiple instructions to the transaction.
    pub fn append<I: IntoIterator<Item = Instruction>>(mut self, instructions: I) -> Self {
        self.instructions.extend(instructions);
        self
    }
}

fn unsigned(message: VersionedMessage) -> VersionedTransaction {
    let num_sigs = message.header().num_required_signatures as usize;
    VersionedTransaction {
        signatures: vec![Signature::default(); num_sigs],
        message,
    }
}

fn required_signers(message: &VersionedMessage) -> Vec<Pubkey> {
    let num_sigs = message.header().num_required_signatures as usize;
    message
        .static_account_keys()
        .iter()
        .take(num_sigs)
        .copied()
        .collect()
}

pub fn transaction_size(tx: &VersionedTransaction) -> Result<usize> {
    Ok(bincode::serialized_size(tx)? as usize)
}

/// Adds signatures to an already compiled transaction, e.g. one the backend
/// built and partially signed. Slots of other signers are left untouched.
pub fn sign_partial(tx: &mut VersionedTransaction, signers: &[&dyn Signer]) -> Result<()> {
    let required = required_signers(&tx.message);
    if tx.signatures.len() < required.len() {
        tx.signatures.resize(required.len(), Signature::default());
    }
    let message = tx.message.serialize();
    for signer in signers {
        let pubkey = signer.try_pubkey()?;
        let position = required
            .iter()
            .position(|k| *k == pubkey)
            .ok_or(Error::UnexpectedSigner(pubkey))?;
        tx.signatures[position] = signer.try_sign_message(&message)?;
    }
    Ok(())
}

/// Turns a simulation that reports an error into [`Error::SimulationFailed`].
pub fn check_simulation(result: RpcSimulateTransactionResult) -> Result<RpcSimulateTransactionResult> {
    match result.err {
        Some(ref e) => Err(Error::SimulationFailed {
            reason: format!("{e:?}"),
            logs: result.logs.clone().unwrap_or_default(),
        }),
        None => Ok(result),
    }
}

/// Simulates exactly `tx` and fails on a reported error.
pub async fn simulate_checked<T: SolanaRpcProvider>(
    rpc: &T,
    tx: &VersionedTransaction,
    config: RpcSimulateTransactionConfig,
) -> Result<RpcSimulateTransactionResult> {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let transaction_base64 = BASE64_STANDARD.encode(bincode::serialize(&tx)?);
        debug!(tx = ?transaction_base64, "simulating");
    }
    let result = rpc.simulate_transaction(tx, config).await?;
    debug!(units =? result.units_consumed, err =? result.err, "simulation");
    check_simulation(result)
}

impl From<TransactionBuilder> for Vec<Instruction> {
    fn from(builder: TransactionBuilder) -> Self {
        builder.instructions
    }
}

impl From<Vec<Instruction>> for TransactionBuilder {
    fn from(instructions: Vec<Instruction>) -> Self {
        TransactionBuilder::builder()
            .instructions(instructions)
            .build()
    }
}

impl From<Instruction> for TransactionBuilder {
    fn from(instruction: Instruction) -> Self {
        Self::builder().instructions(vec![instruction]).build()
    }
}

impl Extend<Instruction> for TransactionBuilder {
    fn extend<I: IntoIterator<Item = Instruction>>(&mut self, iter: I) {
        self.instructions.extend(iter);
    }
}

impl IntoIterator for TransactionBuilder {
    type IntoIter = std::vec::IntoIter<Instruction>;
    type Item = Instruction;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.into_iter()
    }
}
