//! Loading and indexing the dashboard datasets.

use std::collections::HashMap;

use fetchbox::{Client, DataLocation, FetchError, FetchOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::model::{Account, Contribution, Fund, Holding, Provider, Transaction, User};

/// File names of the seven datasets, relative to the data location.
pub const DATASET_FILES: [&str; 7] = [
    "users.json",
    "providers.json",
    "accounts.json",
    "funds.json",
    "holdings.json",
    "contributions.json",
    "transactions.json",
];

/// Records of every dataset, as loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Datasets {
    /// Records of `users.json`.
    pub users: Vec<User>,
    /// Records of `providers.json`.
    pub providers: Vec<Provider>,
    /// Records of `accounts.json`.
    pub accounts: Vec<Account>,
    /// Records of `funds.json`.
    pub funds: Vec<Fund>,
    /// Records of `holdings.json`.
    pub holdings: Vec<Holding>,
    /// Records of `contributions.json`.
    pub contributions: Vec<Contribution>,
    /// Records of `transactions.json`.
    pub transactions: Vec<Transaction>,
}

impl Datasets {
    /// Fetches all seven datasets concurrently, failing with the first error.
    pub async fn load(
        client: &Client,
        location: &DataLocation,
        options: &FetchOptions,
    ) -> Result<Self, FetchError> {
        let url = |file: &str| location.resolve(file);
        let (users, providers, accounts, funds, holdings, contributions, transactions) = tokio::try_join!(
            load_one::<User>(client, url(DATASET_FILES[0]), options),
            load_one::<Provider>(client, url(DATASET_FILES[1]), options),
            load_one::<Account>(client, url(DATASET_FILES[2]), options),
            load_one::<Fund>(client, url(DATASET_FILES[3]), options),
            load_one::<Holding>(client, url(DATASET_FILES[4]), options),
            load_one::<Contribution>(client, url(DATASET_FILES[5]), options),
            load_one::<Transaction>(client, url(DATASET_FILES[6]), options),
        )?;
        Ok(Self {
            users,
            providers,
            accounts,
            funds,
            holdings,
            contributions,
            transactions,
        })
    }

    /// Number of records per dataset.
    pub fn counts(&self) -> DatasetCounts {
        DatasetCounts {
            users: self.users.len(),
            providers: self.providers.len(),
            accounts: self.accounts.len(),
            funds: self.funds.len(),
            holdings: self.holdings.len(),
            contributions: self.contributions.len(),
            transactions: self.transactions.len(),
        }
    }
}

async fn load_one<T>(
    client: &Client,
    url: String,
    options: &FetchOptions,
) -> Result<Vec<T>, FetchError>
where
    T: DeserializeOwned,
{
    let records: Vec<T> = client.fetch_json_as(&url, options).await?;
    debug!(%url, records = records.len(), "dataset loaded");
    Ok(records)
}

/// Record counts of a [`Datasets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetCounts {
    /// Records in `users.json`.
    pub users: usize,
    /// Records in `providers.json`.
    pub providers: usize,
    /// Records in `accounts.json`.
    pub accounts: usize,
    /// Records in `funds.json`.
    pub funds: usize,
    /// Records in `holdings.json`.
    pub holdings: usize,
    /// Records in `contributions.json`.
    pub contributions: usize,
    /// Records in `transactions.json`.
    pub transactions: usize,
}

/// Per-account figures derived from the other datasets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    /// The account itself.
    #[serde(flatten)]
    pub account: Account,
    /// Provider name, or the provider id when the provider is unknown or unnamed.
    pub provider: String,
    /// User name, or the user id when the user is unknown or unnamed.
    pub user_name: String,
    /// Sum of the account's holding values.
    pub holdings_value: f64,
    /// Balance minus holdings value, rounded to cents.
    pub balance_delta: f64,
    /// Number of holdings of the account.
    pub holdings_count: usize,
    /// Number of contributions into the account.
    pub contribution_count: usize,
    /// Number of transactions of the account.
    pub transaction_count: usize,
}

/// Datasets with lookup indexes.
///
/// By-id indexes keep the last record for a duplicated id. Grouped lookups
/// preserve file order.
#[derive(Debug, Clone, Default)]
pub struct PensionData {
    data: Datasets,
    users_by_id: HashMap<String, usize>,
    providers_by_id: HashMap<String, usize>,
    accounts_by_id: HashMap<String, usize>,
    funds_by_id: HashMap<String, usize>,
    accounts_by_user: HashMap<String, Vec<usize>>,
    holdings_by_account: HashMap<String, Vec<usize>>,
    contributions_by_account: HashMap<String, Vec<usize>>,
    transactions_by_account: HashMap<String, Vec<usize>>,
}

impl PensionData {
    /// Loads every dataset through `client` and indexes it.
    pub async fn load(
        client: &Client,
        location: &DataLocation,
        options: &FetchOptions,
    ) -> Result<Self, FetchError> {
        Datasets::load(client, location, options).await.map(Self::new)
    }

    /// Indexes already loaded datasets.
    pub fn new(data: Datasets) -> Self {
        Self {
            users_by_id: index_by(&data.users, |u| &u.id),
            providers_by_id: index_by(&data.providers, |p| &p.id),
            accounts_by_id: index_by(&data.accounts, |a| &a.id),
            funds_by_id: index_by(&data.funds, |f| &f.id),
            accounts_by_user: group_by(&data.accounts, |a| &a.user_id),
            holdings_by_account: group_by(&data.holdings, |h| &h.account_id),
            contributions_by_account: group_by(&data.contributions, |c| &c.account_id),
            transactions_by_account: group_by(&data.transactions, |t| &t.account_id),
            data,
        }
    }

    /// The raw datasets.
    pub fn datasets(&self) -> &Datasets {
        &self.data
    }

    /// User with `id`.
    pub fn user(&self, id: &str) -> Option<&User> {
        lookup(&self.users_by_id, &self.data.users, id)
    }

    /// Provider with `id`.
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        lookup(&self.providers_by_id, &self.data.providers, id)
    }

    /// Account with `id`.
    pub fn account(&self, id: &str) -> Option<&Account> {
        lookup(&self.accounts_by_id, &self.data.accounts, id)
    }

    /// Fund with `id`.
    pub fn fund(&self, id: &str) -> Option<&Fund> {
        lookup(&self.funds_by_id, &self.data.funds, id)
    }

    /// Accounts owned by `user_id`.
    pub fn accounts_of(&self, user_id: &str) -> Vec<&Account> {
        grouped(&self.accounts_by_user, &self.data.accounts, user_id)
    }

    /// Holdings of `account_id`.
    pub fn holdings_of(&self, account_id: &str) -> Vec<&Holding> {
        grouped(&self.holdings_by_account, &self.data.holdings, account_id)
    }

    /// Contributions into `account_id`.
    pub fn contributions_of(&self, account_id: &str) -> Vec<&Contribution> {
        grouped(&self.contributions_by_account, &self.data.contributions, account_id)
    }

    /// Transactions of `account_id`.
    pub fn transactions_of(&self, account_id: &str) -> Vec<&Transaction> {
        grouped(&self.transactions_by_account, &self.data.transactions, account_id)
    }

    /// One summary per account, in file order.
    pub fn account_summaries(&self) -> Vec<AccountSummary> {
        self.data
            .accounts
            .iter()
            .map(|account| self.summarize(account))
            .collect()
    }

    fn summarize(&self, account: &Account) -> AccountSummary {
        let holdings = self.holdings_of(&account.id);
        let holdings_value: f64 = holdings.iter().map(|h| h.value).sum();
        let provider = self
            .provider(&account.provider_id)
            .and_then(|p| p.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(account.provider_id.as_str())
            .to_owned();
        let user_name = self
            .user(&account.user_id)
            .and_then(|u| u.full_name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(account.user_id.as_str())
            .to_owned();

        AccountSummary {
            provider,
            user_name,
            holdings_value,
            balance_delta: round_cents(account.balance - holdings_value),
            holdings_count: holdings.len(),
            contribution_count: self.contributions_of(&account.id).len(),
            transaction_count: self.transactions_of(&account.id).len(),
            account: account.clone(),
        }
    }
}

fn index_by<T>(records: &[T], id: impl Fn(&T) -> &String) -> HashMap<String, usize> {
    records
        .iter()
        .enumerate()
        .map(|(idx, record)| (id(record).clone(), idx))
        .collect()
}

fn group_by<T>(records: &[T], key: impl Fn(&T) -> &String) -> HashMap<String, Vec<usize>> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        groups.entry(key(record).clone()).or_default().push(idx);
    }
    groups
}

fn lookup<'a, T>(index: &HashMap<String, usize>, records: &'a [T], id: &str) -> Option<&'a T> {
    index.get(id).and_then(|&idx| records.get(idx))
}

fn grouped<'a, T>(index: &HashMap<String, Vec<usize>>, records: &'a [T], key: &str) -> Vec<&'a T> {
    index
        .get(key)
        .map(|ids| ids.iter().filter_map(|&idx| records.get(idx)).collect())
        .unwrap_or_default()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
