use {
    crate::{Error, Result, RetryPolicy, SolanaRpcProvider},
    dashmap::DashMap,
    solana_account::Account,
    solana_account_decoder::parse_address_lookup_table::{
        LookupTableAccountType,
        parse_address_lookup_table,
    },
    solana_message::AddressLookupTableAccount,
    solana_pubkey::Pubkey,
    solana_rpc_client::nonblocking::rpc_client::RpcClient,
    std::{str::FromStr, time::Duration},
    tracing::{debug, info},
};

async fn get_multiple_accts(
    lookup_tables: &[Pubkey],
    rpc: impl AsRef<RpcClient>,
) -> Result<Vec<Option<Account>>> {
    rpc.as_ref()
        .get_multiple_accounts(lookup_tables)
        .await
        .map_err(|e| Error::SolanaRpcError(format!("failed to get lookup table accounts: {e}")))
}

/// Keeps every table that has an on-chain state record. A table that was just
/// created but not extended yet is still returned, with no addresses.
fn process_lookup_tables(
    lookup_tables: &[Pubkey],
    accounts: Vec<Option<Account>>,
) -> Result<Vec<AddressLookupTableAccount>> {
    let mut lookup_tables_state = Vec::with_capacity(accounts.len());

    for (i, maybe_account) in accounts.iter().enumerate() {
        match maybe_account {
            None => tracing::warn!("lookup table account {} not found", lookup_tables[i]),
            Some(account) => {
                let table_type = parse_address_lookup_table(account.data.as_ref())?;
                match table_type {
                    LookupTableAccountType::Uninitialized => {
                        tracing::warn!("lookup table {} is uninitialized", lookup_tables[i])
                    }
                    LookupTableAccountType::LookupTable(table) => {
                        if table.addresses.is_empty() {
                            debug!("lookup table {} has no addresses yet", lookup_tables[i]);
                        }
                        let mut addresses = Vec::with_capacity(table.addresses.len());
                        for a in table.addresses.iter() {
                            addresses.push(Pubkey::from_str(a)?);
                        }
                        lookup_tables_state.push(AddressLookupTableAccount {
                            key: lookup_tables[i],
                            addresses,
                        });
                    }
                }
            }
        }
    }
    debug!(
        "found {} valid lookup table state accounts",
        lookup_tables_state.len()
    );
    Ok(lookup_tables_state)
}

/// Fetches lookup tables from the Solana blockchain.
pub async fn fetch_lookup_tables(
    lookup_tables: &[Pubkey],
    rpc: impl AsRef<RpcClient>,
) -> Result<Vec<AddressLookupTableAccount>> {
    if lookup_tables.is_empty() {
        return Ok(Vec::with_capacity(0));
    }
    debug!(lookup_tables =? lookup_tables.len(), "fetching lookup tables");
    let accounts = get_multiple_accts(lookup_tables, rpc).await?;
    process_lookup_tables(lookup_tables, accounts)
}

/// Readiness of a single lookup table.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolverState {
    Pending,
    Ready(AddressLookupTableAccount),
}

/// Polls the network until freshly created lookup tables become readable.
///
/// Every poll queries all still pending tables at once. A table moves from
/// [`ResolverState::Pending`] to [`ResolverState::Ready`] on the first poll
/// that returns its state record and never goes back. Running out of
/// attempts fails with [`Error::LookupTableResolutionTimeout`].
#[derive(Clone, Copy, Debug)]
pub struct LookupTableResolver {
    policy: RetryPolicy,
}

impl Default for LookupTableResolver {
    fn default() -> Self {
        Self::new(
            RetryPolicy::new(30, Duration::from_secs(1)).with_initial_delay(Duration::from_secs(3)),
        )
    }
}

impl LookupTableResolver {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Waits until every address in `addresses` is readable and returns the
    /// tables in the order given (duplicates removed).
    #[tracing::instrument(skip_all, fields(tables = addresses.len()))]
    pub async fn resolve<T: SolanaRpcProvider>(
        &self,
        rpc: &T,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>> {
        let mut ordered = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !ordered.contains(address) {
                ordered.push(*address);
            }
        }
        if ordered.is_empty() {
            return Ok(Vec::new());
        }
        let ordered = &ordered;

        let tracker: DashMap<Pubkey, ResolverState> = ordered
            .iter()
            .map(|k| (*k, ResolverState::Pending))
            .collect();
        let tracker = &tracker;
        let pending = move || -> Vec<Pubkey> {
            ordered
                .iter()
                .filter(|k| {
                    tracker
                        .get(*k)
                        .is_none_or(|s| matches!(*s, ResolverState::Pending))
                })
                .copied()
                .collect()
        };

        self.policy
            .poll(
                "lookup-tables",
                |attempt| {
                    let waiting = pending();
                    async move {
                        let found = rpc.get_lookup_table_accounts(&waiting).await?;
                        for table in found {
                            if let Some(mut state) = tracker.get_mut(&table.key) {
                                info!(table =% table.key, attempt, "lookup table ready");
                                *state = ResolverState::Ready(table);
                            }
                        }
                        let still_pending = pending();
                        if still_pending.is_empty() {
                            Ok(Some(()))
                        } else {
                            debug!(pending =? still_pending, attempt, "waiting for lookup tables");
                            Ok(None)
                        }
                    }
                },
                |attempts| Error::LookupTableResolutionTimeout {
                    pending: pending(),
                    attempts,
                },
            )
            .await?;

        Ok(ordered
            .iter()
            .filter_map(|k| match tracker.get(k).map(|s| s.clone()) {
                Some(ResolverState::Ready(table)) => Some(table),
                _ => None,
            })
            .collect())
    }
}
