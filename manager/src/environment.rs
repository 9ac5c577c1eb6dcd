//! Chain reads consumed by a session
//!
//! Every feed is a stream: the first item is the current value, later
//! items are changes. A feed that ends keeps its last value; a feed that
//! yields an error ends the session.

use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use vault_model::{
    Address, Amount, BalanceInfo, Environment, IlkData, PriceInfo, Vault, DEBT_TOKEN,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("{feed} feed failed: {reason}")]
    Feed { feed: &'static str, reason: String },

    #[error("vault {0} not found")]
    VaultNotFound(u64),
}

pub type EnvStream<T> = BoxStream<'static, Result<T, EnvironmentError>>;

/// Read side of the chain
pub trait VaultEnvironment: Send + Sync + 'static {
    fn proxy_address(&self, account: &Address) -> EnvStream<Option<Address>>;

    fn allowance(&self, token: &str, owner: &Address, spender: &Address) -> EnvStream<Amount>;

    fn price_info(&self, token: &str) -> EnvStream<PriceInfo>;

    /// Zero balances when no account is connected
    fn balance_info(&self, token: &str, account: Option<&Address>) -> EnvStream<BalanceInfo>;

    fn ilk_data(&self, ilk: &str) -> EnvStream<IlkData>;

    fn vault(&self, id: u64) -> EnvStream<Vault>;
}

/// One change read from a feed
#[derive(Clone, Debug, PartialEq)]
pub enum EnvironmentUpdate {
    Vault(Vault),
    IlkData(IlkData),
    PriceInfo(PriceInfo),
    BalanceInfo(BalanceInfo),
    ProxyAddress(Option<Address>),
    /// Allowance granted to `spender`
    CollateralAllowance { spender: Address, amount: Amount },
    DaiAllowance { spender: Address, amount: Amount },
}

impl EnvironmentUpdate {
    /// Fold the update into `env`. Allowances read for a spender other
    /// than the current proxy are dropped; returns whether `env` changed.
    pub fn apply(self, env: &mut Environment) -> bool {
        let current_spender = env.proxy_address.as_ref();
        match self {
            EnvironmentUpdate::Vault(vault) => replace(&mut env.vault, vault),
            EnvironmentUpdate::IlkData(ilk_data) => replace(&mut env.ilk_data, ilk_data),
            EnvironmentUpdate::PriceInfo(price_info) => replace(&mut env.price_info, price_info),
            EnvironmentUpdate::BalanceInfo(balance_info) => {
                replace(&mut env.balance_info, balance_info)
            }
            EnvironmentUpdate::ProxyAddress(proxy_address) => {
                replace(&mut env.proxy_address, proxy_address)
            }
            EnvironmentUpdate::CollateralAllowance { spender, amount } => {
                if current_spender != Some(&spender) {
                    log::debug!("dropping collateral allowance for stale spender {}", spender);
                    return false;
                }
                replace(&mut env.collateral_allowance, Some(amount))
            }
            EnvironmentUpdate::DaiAllowance { spender, amount } => {
                if current_spender != Some(&spender) {
                    log::debug!("dropping dai allowance for stale spender {}", spender);
                    return false;
                }
                replace(&mut env.dai_allowance, Some(amount))
            }
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

type Feed<T> = watch::Sender<Result<T, EnvironmentError>>;

fn feed<T>(value: T) -> Feed<T> {
    watch::Sender::new(Ok(value))
}

/// Stream the current value of a watch channel, then every change
fn watch_stream<T>(rx: watch::Receiver<Result<T, EnvironmentError>>) -> EnvStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    futures::stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
    .boxed()
}

/// In-process environment holding the latest value of every feed.
///
/// Used by the binary driver and tests. Setters publish to the
/// subscribed sessions; `fail_price` makes the price feed error.
pub struct SnapshotEnvironment {
    vault_id: u64,
    vault: Feed<Vault>,
    ilk_data: Feed<IlkData>,
    price_info: Feed<PriceInfo>,
    balance_info: Feed<BalanceInfo>,
    proxy_address: Feed<Option<Address>>,
    /// Keyed by (token, spender)
    allowances: Mutex<HashMap<(String, Address), Feed<Amount>>>,
}

impl SnapshotEnvironment {
    pub fn new(environment: &Environment) -> Self {
        let mut allowances = HashMap::new();
        if let Some(proxy) = &environment.proxy_address {
            if let Some(amount) = &environment.collateral_allowance {
                allowances.insert(
                    (environment.vault.token.clone(), proxy.clone()),
                    feed(amount.clone()),
                );
            }
            if let Some(amount) = &environment.dai_allowance {
                allowances.insert((DEBT_TOKEN.to_string(), proxy.clone()), feed(amount.clone()));
            }
        }
        Self {
            vault_id: environment.vault.id,
            vault: feed(environment.vault.clone()),
            ilk_data: feed(environment.ilk_data.clone()),
            price_info: feed(environment.price_info.clone()),
            balance_info: feed(environment.balance_info.clone()),
            proxy_address: feed(environment.proxy_address.clone()),
            allowances: Mutex::new(allowances),
        }
    }

    pub fn set_vault(&self, vault: Vault) {
        self.vault.send_replace(Ok(vault));
    }

    pub fn set_ilk_data(&self, ilk_data: IlkData) {
        self.ilk_data.send_replace(Ok(ilk_data));
    }

    pub fn set_price_info(&self, price_info: PriceInfo) {
        self.price_info.send_replace(Ok(price_info));
    }

    pub fn set_balance_info(&self, balance_info: BalanceInfo) {
        self.balance_info.send_replace(Ok(balance_info));
    }

    pub fn set_proxy_address(&self, proxy_address: Option<Address>) {
        self.proxy_address.send_replace(Ok(proxy_address));
    }

    pub fn set_allowance(&self, token: &str, spender: &Address, amount: Amount) {
        let mut allowances = self.allowances.lock().unwrap_or_else(|e| e.into_inner());
        allowances
            .entry((token.to_string(), spender.clone()))
            .or_insert_with(|| feed(Amount::default()))
            .send_replace(Ok(amount));
    }

    pub fn fail_price(&self, reason: impl Into<String>) {
        self.price_info.send_replace(Err(EnvironmentError::Feed {
            feed: "price",
            reason: reason.into(),
        }));
    }

    pub fn current_price(&self) -> Option<PriceInfo> {
        self.price_info.borrow().as_ref().ok().cloned()
    }
}

impl VaultEnvironment for SnapshotEnvironment {
    fn proxy_address(&self, _account: &Address) -> EnvStream<Option<Address>> {
        watch_stream(self.proxy_address.subscribe())
    }

    fn allowance(&self, token: &str, _owner: &Address, spender: &Address) -> EnvStream<Amount> {
        let mut allowances = self.allowances.lock().unwrap_or_else(|e| e.into_inner());
        let rx = allowances
            .entry((token.to_string(), spender.clone()))
            .or_insert_with(|| feed(Amount::default()))
            .subscribe();
        watch_stream(rx)
    }

    fn price_info(&self, _token: &str) -> EnvStream<PriceInfo> {
        watch_stream(self.price_info.subscribe())
    }

    fn balance_info(&self, _token: &str, account: Option<&Address>) -> EnvStream<BalanceInfo> {
        if account.is_none() {
            return futures::stream::iter([Ok(BalanceInfo::default())]).boxed();
        }
        watch_stream(self.balance_info.subscribe())
    }

    fn ilk_data(&self, _ilk: &str) -> EnvStream<IlkData> {
        watch_stream(self.ilk_data.subscribe())
    }

    fn vault(&self, id: u64) -> EnvStream<Vault> {
        if id != self.vault_id {
            return futures::stream::iter([Err(EnvironmentError::VaultNotFound(id))]).boxed();
        }
        watch_stream(self.vault.subscribe())
    }
}
