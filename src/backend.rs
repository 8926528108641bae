//! Client side of the external computation service that turns business
//! parameters into instructions or pre-built transactions.
use {
    crate::{
        Config,
        Error,
        Result,
        codec::{self, InstructionDescriptor},
    },
    reqwest::{Client, Response},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    solana_instruction::Instruction,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    tracing::debug,
};

/// Instructions for one transaction, plus the keys of accounts the backend
/// wants created alongside them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IxData {
    pub instructions: Vec<InstructionDescriptor>,
    /// base58 secret keys
    #[serde(default)]
    pub signers: Vec<String>,
    #[serde(default)]
    pub lookup_table_addresses: Vec<String>,
}

impl IxData {
    pub fn decode_instructions(&self) -> Result<Vec<Instruction>> {
        codec::decode_all(&self.instructions)
    }

    pub fn decode_signers(&self) -> Result<Vec<Keypair>> {
        codec::decode_signers(&self.signers)
    }

    pub fn lookup_tables(&self) -> Result<Vec<Pubkey>> {
        self.lookup_table_addresses
            .iter()
            .map(|a| codec::parse_address(a))
            .collect()
    }
}

/// [`IxData`] of the transaction that creates a new lookup table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupIxData {
    #[serde(flatten)]
    pub ix_data: IxData,
    pub setup_lookup_table_address: String,
}

impl SetupIxData {
    /// Address of the table the setup transaction creates
    pub fn new_lookup_table(&self) -> Result<Pubkey> {
        codec::parse_address(&self.setup_lookup_table_address)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_ix_data: Option<SetupIxData>,
    pub ix_data: IxData,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTransaction {
    pub encoded_data: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransactions {
    #[serde(default)]
    pub swap_data: Option<Vec<Option<EncodedTransaction>>>,
}

/// Response of the swap-and-mint endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapAndMint {
    #[serde(default)]
    pub swap_txs: Vec<SwapTransactions>,
    pub liquidity_tx: EncodedTransaction,
}

impl SwapAndMint {
    /// Swap transactions in order, followed by the liquidity transaction.
    pub fn into_encoded(self) -> Vec<String> {
        let mut txs: Vec<String> = self
            .swap_txs
            .into_iter()
            .flat_map(|s| s.swap_data.unwrap_or_default())
            .flatten()
            .map(|t| t.encoded_data)
            .collect();
        txs.push(self.liquidity_tx.encoded_data);
        txs
    }
}

/// Parameters of the auto-rebalance endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, bon::Builder)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceParams {
    #[builder(into)]
    pub nft_mint_address: String,
    #[builder(into)]
    pub user_address: String,
    #[builder(into)]
    pub operator: String,
    #[builder(into, default = "raydiumv3".to_string())]
    pub protocol: String,
    #[builder(default = 0.01)]
    pub swap_slippage: f64,
    #[builder(default = 0.01)]
    pub withdraw_slippage: f64,
    #[builder(default = 0.01)]
    pub liquidity_slippage: f64,
    pub new_tick_lower: i32,
    pub new_tick_upper: i32,
    #[builder(default = true)]
    pub build_tx: bool,
    #[builder(default)]
    pub close_position: bool,
    #[builder(default)]
    pub gas_ceiling_percent: u32,
    #[builder(default)]
    pub compound_fees: bool,
}

/// Parameters of the swap-and-mint endpoint, sent as a query string.
#[derive(Clone, Debug, PartialEq, Serialize, bon::Builder)]
#[serde(rename_all = "camelCase")]
pub struct SwapAndMintParams {
    #[builder(into)]
    pub user_address: String,
    #[builder(into)]
    pub pool_address: String,
    #[builder(into)]
    pub token_in_address: String,
    pub amount_in: u64,
    pub tick_lower: i32,
    pub tick_upper: i32,
    #[builder(default = 0.01)]
    pub swap_slippage: f64,
    #[builder(default = 0.01)]
    pub liquidity_slippage: f64,
    #[builder(into, default = "raydiumv3".to_string())]
    pub protocol: String,
}

/// The external computation service, injected into the pipelines.
///
/// Parameters are opaque JSON; the core only reads the documented response
/// fields.
#[async_trait::async_trait]
pub trait InstructionBackend: Send + Sync {
    /// Setup and main instruction sets of a rebalance
    async fn instruction_plan(&self, params: &Value) -> Result<InstructionPlan>;
    /// Encoded, partially signed transactions of a swap-and-mint, in
    /// execution order
    async fn bundle_transactions(&self, params: &Value) -> Result<Vec<String>>;
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backend_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::BackendError(format!("{status}: {body}")))
}

#[async_trait::async_trait]
impl InstructionBackend for HttpBackend {
    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn instruction_plan(&self, params: &Value) -> Result<InstructionPlan> {
        let response = self
            .client
            .post(self.url("autoRebalance"))
            .json(params)
            .send()
            .await?;
        let plan: InstructionPlan = check_status(response).await?.json().await?;
        debug!(
            setup = plan.setup_ix_data.is_some(),
            instructions = plan.ix_data.instructions.len(),
            "instruction plan"
        );
        Ok(plan)
    }

    #[tracing::instrument(skip_all, level = tracing::Level::INFO)]
    async fn bundle_transactions(&self, params: &Value) -> Result<Vec<String>> {
        if !params.is_object() {
            return Err(Error::BackendError(
                "swap-and-mint parameters must be a flat object".to_string(),
            ));
        }
        let response = self
            .client
            .get(self.url("swapAndMint"))
            .query(params)
            .send()
            .await?;
        let swap: SwapAndMint = check_status(response).await?.json().await?;
        let txs = swap.into_encoded();
        debug!(transactions = txs.len(), "swap-and-mint");
        Ok(txs)
    }
}
