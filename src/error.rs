use {solana_pubkey::Pubkey, thiserror::Error};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[error("Malformed instruction: {0}")]
    MalformedInstruction(String),

    #[error("No instructions provided")]
    NoInstructions,

    #[error("Lookup table {0} is not readable yet")]
    LookupTableUnresolved(Pubkey),

    #[error("Lookup tables {pending:?} still unresolved after {attempts} attempts")]
    LookupTableResolutionTimeout { pending: Vec<Pubkey>, attempts: u32 },

    #[error("Failed simulation: {reason}\n{}", logs.join("\n"))]
    SimulationFailed { reason: String, logs: Vec<String> },

    #[error("Transaction rejected: {0}")]
    SubmissionRejected(String),

    #[error("Bundle failed: {0}")]
    BundleFailed(String),

    #[error("Bundle of {0} transactions exceeds relay limit of {1}")]
    BundleTooLarge(usize, usize),

    #[error("Leader window not reached after {0} attempts")]
    LeaderWindowTimeout(u32),

    #[error("Transaction size {size} exceeds maximum of {max} bytes")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("Required signer {0} was not provided")]
    MissingSigner(Pubkey),

    #[error("Signer {0} is not required by the transaction")]
    UnexpectedSigner(Pubkey),

    #[error("Failed RPC call: {0}")]
    SolanaRpcError(String),

    #[error("Backend request failed: {0}")]
    BackendError(String),

    #[error("Relay request failed: {0}")]
    RelayError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error(transparent)]
    ParseAccountError(#[from] solana_account_decoder::parse_account_data::ParseAccountError),

    #[error(transparent)]
    ParsePubkeyError(#[from] solana_pubkey::ParsePubkeyError),

    #[error(transparent)]
    MessageError(#[from] solana_message::CompileError),

    #[error(transparent)]
    SignerError(#[from] solana_signer::SignerError),

    #[error(
        "Priority fee too high. Calculated fee: {0} microlamports exceeds ceiling: {1} \
         microlamports"
    )]
    PriorityFeeTooHigh(u64, u64),

    #[error("Compute unit price already present in instructions")]
    ComputeBudgetAlreadyPresent,
}

impl Error {
    /// Only an unresolved lookup table may clear up by waiting; everything
    /// else needs a new plan from the backend or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LookupTableUnresolved(_))
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::MalformedInstruction(format!("invalid base64: {e}"))
    }
}
