use {
    crate::{
        DEFAULT_FALLBACK_FEE,
        Error,
        JUPITER_PROGRAM_ID,
        MAX_ACCEPTABLE_PRIORITY_FEE,
        RAYDIUM_CLMM_PROGRAM_ID,
        Result,
        RetryPolicy,
    },
    serde::{Deserialize, Deserializer},
    solana_commitment_config::CommitmentConfig,
    solana_pubkey::Pubkey,
    std::{str::FromStr, time::Duration},
};

/// Ledger RPC endpoint.
#[derive(Clone, Debug, PartialEq, bon::Builder, Deserialize)]
pub struct RpcConfig {
    #[builder(into)]
    pub url: String,
    #[builder(default = CommitmentConfig::confirmed())]
    #[serde(default = "CommitmentConfig::confirmed", deserialize_with = "commitment")]
    pub commitment: CommitmentConfig,
}

#[derive(Clone, Debug, PartialEq, bon::Builder, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Used when the network reports no non-zero sample
    #[builder(default = DEFAULT_FALLBACK_FEE)]
    pub fallback_fee: u64,
    #[builder(default = MAX_ACCEPTABLE_PRIORITY_FEE)]
    pub max_fee: u64,
    #[builder(default = default_hot_accounts())]
    #[serde(deserialize_with = "pubkeys")]
    pub hot_accounts: Vec<Pubkey>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_hot_accounts() -> Vec<Pubkey> {
    vec![JUPITER_PROGRAM_ID, RAYDIUM_CLMM_PROGRAM_ID]
}

#[derive(Clone, Debug, PartialEq, bon::Builder, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    #[builder(default = 100_000)]
    pub tip_lamports: u64,
    /// Submit once the next relay leader is at most this many slots away
    #[builder(default = 2)]
    pub leader_slot_threshold: u64,
    #[builder(default = RetryPolicy::new(240, Duration::from_millis(500)))]
    pub leader_wait: RetryPolicy,
    #[builder(default = RetryPolicy::new(30, Duration::from_secs(2)))]
    pub result_wait: RetryPolicy,
    /// Relay limit, tip transaction included
    #[builder(default = 5)]
    pub max_bundle_size: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything a pipeline needs to talk to the outside world.
///
/// ```
/// # use txpilot::{Config, RpcConfig};
/// let config = Config::builder()
///     .rpc(RpcConfig::builder().url("http://localhost:8899").build())
///     .backend_url("http://localhost:3000")
///     .relay_url("http://localhost:4000/api/v1/bundles")
///     .build();
/// assert_eq!(config.bundle.tip_lamports, 100_000);
/// ```
#[derive(Clone, Debug, PartialEq, bon::Builder, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    #[builder(into)]
    pub backend_url: String,
    #[builder(into)]
    pub relay_url: String,
    #[builder(default)]
    #[serde(default)]
    pub fee: FeeConfig,
    #[builder(default = default_lookup_wait())]
    #[serde(default = "default_lookup_wait")]
    pub lookup_wait: RetryPolicy,
    #[builder(default)]
    #[serde(default)]
    pub bundle: BundleConfig,
}

fn default_lookup_wait() -> RetryPolicy {
    *crate::LookupTableResolver::default().policy()
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::ConfigError(format!("{name} is not set")))
}

fn optional<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("{name}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Reads `RPC_URL`, `BACKEND_URL` and `RELAY_URL`, plus the optional
    /// `FEE_FALLBACK`, `FEE_MAX`, `LOOKUP_WAIT_ATTEMPTS`,
    /// `LOOKUP_WAIT_INTERVAL` (e.g. `1s`) and `BUNDLE_TIP_LAMPORTS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::builder()
            .rpc(RpcConfig::builder().url(required("RPC_URL")?).build())
            .backend_url(required("BACKEND_URL")?)
            .relay_url(required("RELAY_URL")?)
            .build();
        if let Some(fee) = optional("FEE_FALLBACK")? {
            config.fee.fallback_fee = fee;
        }
        if let Some(fee) = optional("FEE_MAX")? {
            config.fee.max_fee = fee;
        }
        if let Some(attempts) = optional("LOOKUP_WAIT_ATTEMPTS")? {
            config.lookup_wait.max_attempts = attempts;
        }
        if let Some(interval) = optional::<humantime::Duration>("LOOKUP_WAIT_INTERVAL")? {
            config.lookup_wait.interval = interval.into();
        }
        if let Some(tip) = optional("BUNDLE_TIP_LAMPORTS")? {
            config.bundle.tip_lamports = tip;
        }
        Ok(config)
    }
}

fn commitment<'de, D>(deserializer: D) -> std::result::Result<CommitmentConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    CommitmentConfig::from_str(&raw).map_err(serde::de::Error::custom)
}

fn pubkeys<'de, D>(deserializer: D) -> std::result::Result<Vec<Pubkey>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|raw| Pubkey::from_str(raw).map_err(serde::de::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let fee = FeeConfig::default();
        assert_eq!(fee.fallback_fee, 10_000);
        assert_eq!(fee.max_fee, 50_000_000);
        assert_eq!(fee.hot_accounts, default_hot_accounts());

        let bundle = BundleConfig::default();
        assert_eq!(bundle.tip_lamports, 100_000);
        assert_eq!(bundle.leader_slot_threshold, 2);
        assert_eq!(bundle.leader_wait.max_attempts, 240);
        assert_eq!(bundle.leader_wait.interval, Duration::from_millis(500));
        assert_eq!(bundle.max_bundle_size, 5);
    }

    #[test]
    fn test_deserialize() -> anyhow::Result<()> {
        let config: Config = serde_json::from_value(serde_json::json!({
            "rpc": { "url": "http://localhost:8899", "commitment": "finalized" },
            "backend_url": "http://localhost:3000",
            "relay_url": "http://localhost:4000",
            "fee": { "fallback_fee": 42, "hot_accounts": ["11111111111111111111111111111111"] },
            "lookup_wait": { "max_attempts": 5, "interval": "250ms", "initial_delay": "2s" },
            "bundle": { "tip_lamports": 7, "leader_wait": { "max_attempts": 3, "interval": "1s" } }
        }))?;
        assert_eq!(config.rpc.commitment, CommitmentConfig::finalized());
        assert_eq!(config.fee.fallback_fee, 42);
        assert_eq!(config.fee.max_fee, MAX_ACCEPTABLE_PRIORITY_FEE);
        assert_eq!(config.fee.hot_accounts, vec![Pubkey::default()]);
        assert_eq!(config.lookup_wait.interval, Duration::from_millis(250));
        assert_eq!(config.lookup_wait.initial_delay, Duration::from_secs(2));
        assert_eq!(config.bundle.tip_lamports, 7);
        assert_eq!(config.bundle.leader_wait.max_attempts, 3);
        assert_eq!(config.bundle.max_bundle_size, 5);
        Ok(())
    }

    #[test]
    fn test_deserialize_defaults() -> anyhow::Result<()> {
        let config: Config = serde_json::from_value(serde_json::json!({
            "rpc": { "url": "http://localhost:8899" },
            "backend_url": "b",
            "relay_url": "r",
        }))?;
        assert_eq!(config.rpc.commitment, CommitmentConfig::confirmed());
        assert_eq!(config.lookup_wait, default_lookup_wait());
        assert_eq!(config.lookup_wait.initial_delay, Duration::from_secs(3));
        Ok(())
    }
}
