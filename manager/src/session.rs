//! Manage-vault session
//!
//! One task owns the state of a session. User commands arrive on an
//! unbounded mailbox, chain reads and transaction updates arrive on keyed
//! feeds. Every event is folded into the state, the pure pipeline runs,
//! and the result is published on a watch channel.

use crate::config::SessionConfig;
use crate::environment::{EnvStream, EnvironmentError, EnvironmentUpdate, VaultEnvironment};
use crate::error::SessionError;
use crate::tx::{TransactionIssuer, TxMeta};
use futures::stream::{BoxStream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Sleep};
use tokio_stream::StreamMap;
use vault_model::{
    apply_pipeline, apply_tx_update, clear_form, enter_multiply_transition, progress, regress,
    toggle_editing, Address, AllowanceOption, Amount, Environment, ManageVaultAction,
    ManageVaultStage, ManageVaultState, PriceInfo, StageCategory, Transition, TxState, Vault,
    DEBT_TOKEN,
};

/// Who is managing which vault
#[derive(Clone, Debug, PartialEq)]
pub struct SessionContext {
    pub account: Option<Address>,
    pub vault_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Feed {
    Vault,
    IlkData,
    PriceInfo,
    BalanceInfo,
    ProxyAddress,
    CollateralAllowance,
    DaiAllowance,
    Tx(StageCategory),
}

impl Feed {
    fn name(self) -> &'static str {
        match self {
            Feed::Vault => "vault",
            Feed::IlkData => "ilk data",
            Feed::PriceInfo => "price",
            Feed::BalanceInfo => "balance",
            Feed::ProxyAddress => "proxy address",
            Feed::CollateralAllowance => "collateral allowance",
            Feed::DaiAllowance => "dai allowance",
            Feed::Tx(_) => "transaction",
        }
    }
}

enum Event {
    Environment(Result<EnvironmentUpdate, EnvironmentError>),
    Tx(TxState),
}

type Feeds = StreamMap<Feed, BoxStream<'static, Event>>;

type StateOverride = Box<dyn FnOnce(&mut ManageVaultState) + Send>;

pub(crate) enum ManageVaultCommand {
    UpdateDeposit(Option<Amount>),
    UpdateWithdraw(Option<Amount>),
    UpdateGenerate(Option<Amount>),
    UpdatePayback(Option<Amount>),
    SetPaybackAll,
    ToggleEditing,
    Progress,
    Regress,
    Clear,
    EnterMultiplyTransition,
    SetCollateralAllowanceOption(AllowanceOption),
    UpdateCollateralAllowanceAmount(Option<Amount>),
    SetDaiAllowanceOption(AllowanceOption),
    UpdateDaiAllowanceAmount(Option<Amount>),
    #[cfg_attr(not(any(test, feature = "state-override")), allow(dead_code))]
    Override(StateOverride),
    /// Reply with the state once every earlier command is applied
    Snapshot(oneshot::Sender<ManageVaultState>),
    Shutdown,
}

fn updates<T, F>(stream: EnvStream<T>, to_update: F) -> EnvStream<EnvironmentUpdate>
where
    T: Send + 'static,
    F: Fn(T) -> EnvironmentUpdate + Send + 'static,
{
    stream.map(move |item| item.map(&to_update)).boxed()
}

fn events(stream: EnvStream<EnvironmentUpdate>) -> BoxStream<'static, Event> {
    stream.map(Event::Environment).boxed()
}

async fn first(
    stream: &mut EnvStream<EnvironmentUpdate>,
    feed: Feed,
) -> Result<EnvironmentUpdate, SessionError> {
    match stream.next().await {
        Some(Ok(update)) => Ok(update),
        Some(Err(e)) => Err(e.into()),
        None => Err(SessionError::MissingInitial(feed.name())),
    }
}

/// Allowance feeds for `proxy` as spender. Native collateral needs none.
fn allowance_feeds<E: VaultEnvironment>(
    environment: &E,
    account: &Address,
    proxy: &Address,
    vault: &Vault,
) -> Vec<(Feed, EnvStream<EnvironmentUpdate>)> {
    let mut feeds = Vec::new();
    if !vault.is_native_collateral() {
        let spender = proxy.clone();
        feeds.push((
            Feed::CollateralAllowance,
            updates(environment.allowance(&vault.token, account, proxy), move |amount| {
                EnvironmentUpdate::CollateralAllowance {
                    spender: spender.clone(),
                    amount,
                }
            }),
        ));
    }
    let spender = proxy.clone();
    feeds.push((
        Feed::DaiAllowance,
        updates(environment.allowance(DEBT_TOKEN, account, proxy), move |amount| {
            EnvironmentUpdate::DaiAllowance {
                spender: spender.clone(),
                amount,
            }
        }),
    ));
    feeds
}

/// Start a session: read the first value of every feed, build and publish
/// the initial state, then hand the rest to the session task.
pub async fn start<E, T>(
    environment: Arc<E>,
    issuer: Arc<T>,
    context: SessionContext,
    config: SessionConfig,
) -> Result<ManageVaultHandle, SessionError>
where
    E: VaultEnvironment,
    T: TransactionIssuer,
{
    let mut snapshot = Environment {
        account: context.account.clone(),
        ..Environment::default()
    };
    let mut feeds = Feeds::new();

    let mut vault = updates(environment.vault(context.vault_id), EnvironmentUpdate::Vault);
    first(&mut vault, Feed::Vault).await?.apply(&mut snapshot);
    feeds.insert(Feed::Vault, events(vault));

    let ilk = snapshot.vault.ilk.clone();
    let token = snapshot.vault.token.clone();
    let mut pending = vec![
        (
            Feed::IlkData,
            updates(environment.ilk_data(&ilk), EnvironmentUpdate::IlkData),
        ),
        (
            Feed::PriceInfo,
            updates(environment.price_info(&token), EnvironmentUpdate::PriceInfo),
        ),
        (
            Feed::BalanceInfo,
            updates(
                environment.balance_info(&token, context.account.as_ref()),
                EnvironmentUpdate::BalanceInfo,
            ),
        ),
    ];
    if let Some(account) = &context.account {
        pending.push((
            Feed::ProxyAddress,
            updates(environment.proxy_address(account), EnvironmentUpdate::ProxyAddress),
        ));
    }
    for (feed, mut stream) in pending {
        first(&mut stream, feed).await?.apply(&mut snapshot);
        feeds.insert(feed, events(stream));
    }

    if let (Some(account), Some(proxy)) = (&context.account, snapshot.proxy_address.clone()) {
        for (feed, mut stream) in allowance_feeds(&*environment, account, &proxy, &snapshot.vault)
        {
            first(&mut stream, feed).await?.apply(&mut snapshot);
            feeds.insert(feed, events(stream));
        }
    }

    let state = apply_pipeline(ManageVaultState::new(snapshot, config.safe_confirmations));
    log::info!(
        "Manage vault session started for vault {} in stage {}",
        context.vault_id,
        state.stage
    );

    let (publisher, receiver) = watch::channel(state.clone());
    let (commands, mailbox) = mpsc::unbounded_channel();
    let session = Session {
        environment,
        issuer,
        context,
        price_debounce: config.price_debounce(),
        state,
        feeds,
        pending_price: None,
        publisher,
    };
    let task = tokio::spawn(session.run(mailbox));

    Ok(ManageVaultHandle {
        commands,
        state: receiver,
        task,
    })
}

struct Session<E, T> {
    environment: Arc<E>,
    issuer: Arc<T>,
    context: SessionContext,
    price_debounce: Duration,
    state: ManageVaultState,
    feeds: Feeds,
    /// Latest price held back by the debounce window
    pending_price: Option<PriceInfo>,
    publisher: watch::Sender<ManageVaultState>,
}

impl<E, T> Session<E, T>
where
    E: VaultEnvironment,
    T: TransactionIssuer,
{
    async fn run(
        mut self,
        mut mailbox: mpsc::UnboundedReceiver<ManageVaultCommand>,
    ) -> Result<(), SessionError> {
        let debounce = time::sleep(Duration::ZERO);
        tokio::pin!(debounce);

        loop {
            tokio::select! {
                command = mailbox.recv() => match command {
                    None | Some(ManageVaultCommand::Shutdown) => break,
                    Some(ManageVaultCommand::Snapshot(reply)) => {
                        let _ = reply.send(self.state.clone());
                    }
                    Some(command) => self.handle_command(command),
                },
                Some((feed, event)) = self.feeds.next(), if !self.feeds.is_empty() => match event {
                    Event::Environment(Ok(update)) => self.handle_update(update, debounce.as_mut()),
                    Event::Environment(Err(e)) => {
                        log::error!("{} feed failed for vault {}: {}", feed.name(), self.context.vault_id, e);
                        return Err(e.into());
                    }
                    Event::Tx(update) => {
                        if let Feed::Tx(category) = feed {
                            log::debug!("{:?} transaction: {:?}", category, update.status);
                            self.apply(|s| apply_tx_update(s, category, &update));
                        }
                    }
                },
                () = &mut debounce, if self.pending_price.is_some() => {
                    if let Some(price_info) = self.pending_price.take() {
                        self.apply_update(EnvironmentUpdate::PriceInfo(price_info));
                    }
                }
            }
        }

        log::info!("Manage vault session for vault {} closed", self.context.vault_id);
        Ok(())
    }

    fn handle_command(&mut self, command: ManageVaultCommand) {
        use ManageVaultCommand::*;

        match command {
            UpdateDeposit(amount) => self.apply(|mut s| {
                s.form.update_deposit(amount);
                s
            }),
            UpdateWithdraw(amount) => self.apply(|mut s| {
                s.form.update_withdraw(amount);
                s
            }),
            UpdateGenerate(amount) => self.apply(|mut s| {
                s.form.update_generate(amount);
                s
            }),
            UpdatePayback(amount) => self.apply(|mut s| {
                s.form.update_payback(amount);
                s
            }),
            SetPaybackAll => self.apply(|mut s| {
                let debt = s.environment.vault.debt.clone();
                s.form.set_payback_all(&debt);
                s
            }),
            ToggleEditing => self.apply(toggle_editing),
            Progress => {
                let mut action = None;
                self.apply(|s| {
                    let Transition { state, action: next } = progress(s);
                    action = next;
                    state
                });
                if let Some(action) = action {
                    self.submit(action);
                }
            }
            Regress => self.apply(regress),
            Clear => self.apply(clear_form),
            EnterMultiplyTransition => self.apply(enter_multiply_transition),
            SetCollateralAllowanceOption(option) => self.apply(|mut s| {
                s.form.set_collateral_allowance_option(option);
                s
            }),
            UpdateCollateralAllowanceAmount(amount) => self.apply(|mut s| {
                s.form.update_collateral_allowance_amount(amount);
                s
            }),
            SetDaiAllowanceOption(option) => self.apply(|mut s| {
                let debt_offset = s.environment.vault.debt_offset.clone();
                s.form.set_dai_allowance_option(option, &debt_offset);
                s
            }),
            UpdateDaiAllowanceAmount(amount) => self.apply(|mut s| {
                s.form.update_dai_allowance_amount(amount);
                s
            }),
            Override(patch) => self.apply(|mut s| {
                patch(&mut s);
                s
            }),
            // handled by the run loop
            Snapshot(_) | Shutdown => {}
        }
    }

    fn handle_update(&mut self, update: EnvironmentUpdate, debounce: Pin<&mut Sleep>) {
        match update {
            EnvironmentUpdate::PriceInfo(price_info) if !self.price_debounce.is_zero() => {
                if self.pending_price.is_none() {
                    debounce.reset(Instant::now() + self.price_debounce);
                }
                self.pending_price = Some(price_info);
            }
            EnvironmentUpdate::ProxyAddress(proxy) => {
                if proxy != self.state.environment.proxy_address {
                    self.resubscribe_allowances(proxy.as_ref());
                }
                self.apply_update(EnvironmentUpdate::ProxyAddress(proxy));
            }
            update => self.apply_update(update),
        }
    }

    /// Replace the allowance feeds after the proxy changed
    fn resubscribe_allowances(&mut self, proxy: Option<&Address>) {
        log::info!(
            "Proxy for vault {} changed to {:?}, resubscribing allowances",
            self.context.vault_id,
            proxy.map(Address::as_str)
        );
        self.feeds.remove(&Feed::CollateralAllowance);
        self.feeds.remove(&Feed::DaiAllowance);
        self.state.environment.collateral_allowance = None;
        self.state.environment.dai_allowance = None;

        if let (Some(account), Some(proxy)) = (self.context.account.clone(), proxy) {
            let feeds = allowance_feeds(
                &*self.environment,
                &account,
                proxy,
                &self.state.environment.vault,
            );
            for (feed, stream) in feeds {
                self.feeds.insert(feed, events(stream));
            }
        }
    }

    fn apply_update(&mut self, update: EnvironmentUpdate) {
        let mut changed = false;
        self.apply(|mut s| {
            changed = update.apply(&mut s.environment);
            s
        });
        if !changed {
            log::trace!("environment update left vault {} unchanged", self.context.vault_id);
        }
    }

    fn submit(&mut self, action: ManageVaultAction) {
        let kind = action.category();
        let meta = TxMeta {
            kind,
            account: self.context.account.clone(),
            vault_id: self.context.vault_id,
        };
        log::info!("Submitting {:?} transaction for vault {}", kind, self.context.vault_id);
        let updates = self.issuer.send(&action, meta).map(Event::Tx).boxed();
        self.feeds.insert(Feed::Tx(kind), updates);
    }

    fn apply(&mut self, f: impl FnOnce(ManageVaultState) -> ManageVaultState) {
        let state = std::mem::take(&mut self.state);
        self.state = apply_pipeline(f(state));
        self.publisher.send_replace(self.state.clone());
    }
}

/// Caller side of a session. Dropping it ends the session.
pub struct ManageVaultHandle {
    commands: mpsc::UnboundedSender<ManageVaultCommand>,
    state: watch::Receiver<ManageVaultState>,
    task: JoinHandle<Result<(), SessionError>>,
}

impl ManageVaultHandle {
    fn send(&self, command: ManageVaultCommand) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }

    /// Latest published state
    pub fn state(&self) -> ManageVaultState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ManageVaultState> {
        self.state.clone()
    }

    /// Wait until a published state satisfies `predicate`
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&ManageVaultState) -> bool,
    ) -> Result<ManageVaultState, SessionError> {
        let mut receiver = self.state.clone();
        let state = receiver
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(state.clone())
    }

    pub async fn wait_for_stage(
        &self,
        stage: ManageVaultStage,
        timeout: Duration,
    ) -> Result<ManageVaultState, SessionError> {
        time::timeout(timeout, self.wait_for(|s| s.stage == stage))
            .await
            .map_err(|_| SessionError::StageTimeout(stage))?
    }

    /// State after every command sent so far has been applied
    pub async fn snapshot(&self) -> Result<ManageVaultState, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(ManageVaultCommand::Snapshot(reply))?;
        response.await.map_err(|_| SessionError::Closed)
    }

    pub fn update_deposit(&self, amount: Option<Amount>) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::UpdateDeposit(amount))
    }

    pub fn update_withdraw(&self, amount: Option<Amount>) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::UpdateWithdraw(amount))
    }

    pub fn update_generate(&self, amount: Option<Amount>) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::UpdateGenerate(amount))
    }

    pub fn update_payback(&self, amount: Option<Amount>) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::UpdatePayback(amount))
    }

    pub fn set_payback_all(&self) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::SetPaybackAll)
    }

    pub fn toggle_editing(&self) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::ToggleEditing)
    }

    pub fn progress(&self) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::Progress)
    }

    pub fn regress(&self) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::Regress)
    }

    /// Reset pending inputs without leaving the stage
    pub fn clear(&self) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::Clear)
    }

    pub fn enter_multiply_transition(&self) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::EnterMultiplyTransition)
    }

    pub fn set_collateral_allowance_option(
        &self,
        option: AllowanceOption,
    ) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::SetCollateralAllowanceOption(option))
    }

    pub fn update_collateral_allowance_amount(
        &self,
        amount: Option<Amount>,
    ) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::UpdateCollateralAllowanceAmount(amount))
    }

    pub fn set_dai_allowance_option(&self, option: AllowanceOption) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::SetDaiAllowanceOption(option))
    }

    pub fn update_dai_allowance_amount(&self, amount: Option<Amount>) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::UpdateDaiAllowanceAmount(amount))
    }

    /// Patch the state directly. The pipeline still runs before the
    /// result is published.
    #[cfg(any(test, feature = "state-override"))]
    pub fn inject_state_override(
        &self,
        patch: impl FnOnce(&mut ManageVaultState) + Send + 'static,
    ) -> Result<(), SessionError> {
        self.send(ManageVaultCommand::Override(Box::new(patch)))
    }

    /// Stop the session and return how its task ended
    pub async fn shutdown(self) -> Result<(), SessionError> {
        let _ = self.commands.send(ManageVaultCommand::Shutdown);
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Session task aborted: {}", e);
                Err(SessionError::Closed)
            }
        }
    }
}
