//! Bundle relay (block engine) access over JSON-RPC 2.0.
use {
    crate::{Config, Error, Result, RetryPolicy, codec},
    reqwest::Client,
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::{Value, json},
    solana_account_decoder_client_types::UiAccount,
    solana_pubkey::Pubkey,
    solana_transaction::versioned::VersionedTransaction,
    std::str::FromStr,
    tracing::{debug, info, warn},
};

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// Options of an atomic bundle simulation.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
pub struct SimulateBundleConfig {
    /// Accounts captured before and after every transaction
    #[builder(default)]
    pub watched_accounts: Vec<Pubkey>,
    #[builder(default = true)]
    pub skip_sig_verify: bool,
    #[builder(default = true)]
    pub replace_recent_blockhash: bool,
}

impl SimulateBundleConfig {
    fn to_json(&self, transactions: usize) -> Value {
        let accounts = json!({
            "addresses": self.watched_accounts.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            "encoding": "base64",
        });
        let per_tx = vec![accounts; transactions];
        json!({
            "preExecutionAccountsConfigs": per_tx,
            "postExecutionAccountsConfigs": per_tx,
            "transactionEncoding": "base64",
            "skipSigVerify": self.skip_sig_verify,
            "replaceRecentBlockhash": self.replace_recent_blockhash,
        })
    }
}

/// Pass/fail verdict of a bundle simulation.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleSummary {
    Succeeded,
    #[serde(rename_all = "camelCase")]
    Failed {
        error: Value,
        #[serde(default, alias = "tx_signature")]
        tx_signature: Option<String>,
    },
}

impl BundleSummary {
    pub fn is_success(&self) -> bool {
        matches!(self, BundleSummary::Succeeded)
    }

    /// Human readable failure reason, `None` on success
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            BundleSummary::Succeeded => None,
            BundleSummary::Failed {
                error,
                tx_signature,
            } => Some(match tx_signature {
                Some(sig) => format!("{error} (tx {sig})"),
                None => error.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransactionResult {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
    #[serde(default)]
    pub pre_execution_accounts: Option<Vec<UiAccount>>,
    #[serde(default)]
    pub post_execution_accounts: Option<Vec<UiAccount>>,
    #[serde(default)]
    pub units_consumed: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSimulation {
    pub summary: BundleSummary,
    #[serde(default)]
    pub transaction_results: Vec<BundleTransactionResult>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextScheduledLeader {
    pub current_slot: u64,
    pub next_leader_slot: u64,
    #[serde(default)]
    pub next_leader_identity: String,
}

impl NextScheduledLeader {
    pub fn slots_away(&self) -> u64 {
        self.next_leader_slot.saturating_sub(self.current_slot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum BundleStatus {
    Invalid,
    Pending,
    Failed,
    Landed,
}

#[derive(Clone, Debug, Deserialize)]
struct InflightBundleStatus {
    status: BundleStatus,
    #[serde(default)]
    landed_slot: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
struct RpcValue<T> {
    value: T,
}

/// Relay operations the bundle pipeline depends on.
#[async_trait::async_trait]
pub trait BundleRelay: Send + Sync {
    async fn simulate_bundle(
        &self,
        transactions: &[VersionedTransaction],
        config: &SimulateBundleConfig,
    ) -> Result<BundleSimulation>;
    async fn get_tip_accounts(&self) -> Result<Vec<Pubkey>>;
    async fn get_next_scheduled_leader(&self) -> Result<NextScheduledLeader>;
    /// Returns the bundle id
    async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String>;
    /// Waits for the relay's verdict on a submitted bundle. A rejected bundle
    /// is [`Error::BundleFailed`].
    async fn await_bundle_result(&self, bundle_id: &str, policy: &RetryPolicy) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct JsonRpcRelay {
    client: Client,
    url: String,
}

impl JsonRpcRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.relay_url.clone())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let payload = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(method, %status, "relay returned non-success status");
            return Err(Error::RelayError(format!("{method} {status}: {body}")));
        }
        let mut value: Value = response.json().await?;
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(Error::RelayError(format!("{method}: {error}")));
        }
        let result = value
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| Error::RelayError(format!("{method}: response has no result")))?;
        Ok(serde_json::from_value(result)?)
    }

    fn encode_all(transactions: &[VersionedTransaction]) -> Result<Vec<String>> {
        transactions.iter().map(codec::encode_transaction).collect()
    }
}

#[async_trait::async_trait]
impl BundleRelay for JsonRpcRelay {
    #[tracing::instrument(skip_all, fields(txs = transactions.len()))]
    async fn simulate_bundle(
        &self,
        transactions: &[VersionedTransaction],
        config: &SimulateBundleConfig,
    ) -> Result<BundleSimulation> {
        let encoded = Self::encode_all(transactions)?;
        let params = json!([
            { "encodedTransactions": encoded },
            config.to_json(transactions.len()),
        ]);
        let result: RpcValue<BundleSimulation> = self.call("simulateBundle", params).await?;
        debug!(summary = ?result.value.summary, "bundle simulation");
        Ok(result.value)
    }

    async fn get_tip_accounts(&self) -> Result<Vec<Pubkey>> {
        let accounts: Vec<String> = self.call("getTipAccounts", json!([])).await?;
        accounts
            .iter()
            .map(|a| {
                Pubkey::from_str(a)
                    .map_err(|e| Error::RelayError(format!("invalid tip account {a}: {e}")))
            })
            .collect()
    }

    async fn get_next_scheduled_leader(&self) -> Result<NextScheduledLeader> {
        self.call("getNextScheduledLeader", json!([])).await
    }

    #[tracing::instrument(skip_all, fields(txs = transactions.len()))]
    async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String> {
        let encoded = Self::encode_all(transactions)?;
        let bundle_id: String = self
            .call("sendBundle", json!([encoded, { "encoding": "base64" }]))
            .await?;
        info!(%bundle_id, "bundle submitted");
        Ok(bundle_id)
    }

    #[tracing::instrument(skip(self, policy))]
    async fn await_bundle_result(&self, bundle_id: &str, policy: &RetryPolicy) -> Result<()> {
        policy
            .poll(
                "bundle-result",
                |_| async move {
                    let statuses: RpcValue<Vec<InflightBundleStatus>> = self
                        .call("getInflightBundleStatuses", json!([[bundle_id]]))
                        .await?;
                    match statuses.value.first().map(|s| (s.status, s.landed_slot)) {
                        Some((BundleStatus::Landed, slot)) => {
                            info!(bundle_id, ?slot, "bundle landed");
                            Ok(Some(()))
                        }
                        Some((BundleStatus::Failed, _)) => Err(Error::BundleFailed(format!(
                            "bundle {bundle_id} failed on chain"
                        ))),
                        Some((BundleStatus::Invalid, _)) => Err(Error::BundleFailed(format!(
                            "bundle {bundle_id} rejected as invalid"
                        ))),
                        _ => Ok(None),
                    }
                },
                |attempts| {
                    Error::RelayError(format!(
                        "no result for bundle {bundle_id} after {attempts} attempts"
                    ))
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::{Matcher, Server},
        std::time::Duration,
    };

    fn rpc_result(result: Value) -> String {
        json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string()
    }

    fn account(lamports: u64) -> Value {
        json!({
            "lamports": lamports,
            "data": ["", "base64"],
            "owner": "11111111111111111111111111111111",
            "executable": false,
            "rentEpoch": 0,
            "space": 0
        })
    }

    #[test]
    fn test_simulate_config_json() {
        let watched = Pubkey::new_unique();
        let config = SimulateBundleConfig::builder()
            .watched_accounts(vec![watched])
            .build();
        let value = config.to_json(2);
        assert_eq!(value["skipSigVerify"], true);
        assert_eq!(value["replaceRecentBlockhash"], true);
        assert_eq!(value["preExecutionAccountsConfigs"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            value["postExecutionAccountsConfigs"][1]["addresses"][0],
            watched.to_string()
        );
    }

    #[test]
    fn test_summary_deserialize() -> anyhow::Result<()> {
        let ok: BundleSummary = serde_json::from_value(json!("succeeded"))?;
        assert!(ok.is_success());
        assert_eq!(ok.failure_reason(), None);
        let failed: BundleSummary = serde_json::from_value(json!({
            "failed": {
                "error": {"TransactionFailure": [[1, 2], "insufficient funds"]},
                "txSignature": "sig"
            }
        }))?;
        assert!(!failed.is_success());
        let reason = failed.failure_reason().unwrap_or_default();
        assert!(reason.contains("insufficient funds"));
        assert!(reason.contains("sig"));
        Ok(())
    }

    #[tokio::test]
    async fn test_simulate_bundle() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "simulateBundle"})))
            .with_status(200)
            .with_body(rpc_result(json!({
                "context": {"slot": 1},
                "value": {
                    "summary": "succeeded",
                    "transactionResults": [{
                        "err": null,
                        "logs": ["Program log: ok"],
                        "preExecutionAccounts": [account(10)],
                        "postExecutionAccounts": [account(7)],
                        "unitsConsumed": 1200
                    }]
                }
            })))
            .create_async()
            .await;
        let relay = JsonRpcRelay::new(server.url());
        let simulation = relay
            .simulate_bundle(&[], &SimulateBundleConfig::builder().build())
            .await?;
        mock.assert_async().await;
        assert!(simulation.summary.is_success());
        let result = &simulation.transaction_results[0];
        assert_eq!(result.units_consumed, Some(1200));
        assert_eq!(
            result.pre_execution_accounts.as_ref().map(|a| a[0].lamports),
            Some(10)
        );
        assert_eq!(
            result.post_execution_accounts.as_ref().map(|a| a[0].lamports),
            Some(7)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rpc_error() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "bad"}})
                    .to_string(),
            )
            .create_async()
            .await;
        let result = JsonRpcRelay::new(server.url()).get_tip_accounts().await;
        assert!(matches!(result, Err(Error::RelayError(msg)) if msg.contains("getTipAccounts")));
        Ok(())
    }

    #[tokio::test]
    async fn test_tip_accounts_and_leader() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let tip = Pubkey::new_unique();
        let _tips = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "getTipAccounts"})))
            .with_body(rpc_result(json!([tip.to_string()])))
            .create_async()
            .await;
        let _leader = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "getNextScheduledLeader"})))
            .with_body(rpc_result(json!({
                "currentSlot": 100,
                "nextLeaderSlot": 103,
                "nextLeaderIdentity": "leader"
            })))
            .create_async()
            .await;
        let relay = JsonRpcRelay::new(server.url());
        assert_eq!(relay.get_tip_accounts().await?, vec![tip]);
        assert_eq!(relay.get_next_scheduled_leader().await?.slots_away(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_send_bundle_and_result() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _send = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "sendBundle",
                "params": [[], {"encoding": "base64"}]
            })))
            .with_body(rpc_result(json!("bundle-1")))
            .create_async()
            .await;
        let _status = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "getInflightBundleStatuses",
                "params": [["bundle-1"]]
            })))
            .with_body(rpc_result(json!({
                "context": {"slot": 5},
                "value": [{"bundle_id": "bundle-1", "status": "Landed", "landed_slot": 5}]
            })))
            .create_async()
            .await;
        let relay = JsonRpcRelay::new(server.url());
        let id = relay.send_bundle(&[]).await?;
        assert_eq!(id, "bundle-1");
        relay
            .await_bundle_result(&id, &RetryPolicy::new(2, Duration::from_millis(10)))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_bundle_result_failed() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let status = server
            .mock("POST", "/")
            .with_body(rpc_result(json!({
                "context": {"slot": 5},
                "value": [{"bundle_id": "b", "status": "Failed", "landed_slot": null}]
            })))
            .expect(1)
            .create_async()
            .await;
        let result = JsonRpcRelay::new(server.url())
            .await_bundle_result("b", &RetryPolicy::new(5, Duration::from_millis(10)))
            .await;
        assert!(matches!(result, Err(Error::BundleFailed(_))));
        status.assert_async().await;
        Ok(())
    }
}
