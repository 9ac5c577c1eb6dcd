//! Scripted sessions replayed by the driver

use crate::environment::SnapshotEnvironment;
use crate::error::SessionError;
use crate::session::ManageVaultHandle;
use crate::tx::SimulatedOutcome;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use vault_model::{
    Address, AllowanceOption, Amount, BalanceInfo, Environment, IlkData, ManageVaultStage,
    ManageVaultState, PriceInfo, Vault,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Connected wallet, `None` for a read-only session
    pub account: Option<Address>,
    pub environment: Environment,
    #[serde(default)]
    pub tx_outcome: SimulatedOutcome,
    pub commands: Vec<ScenarioCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScenarioCommand {
    UpdateDeposit {
        #[serde(default)]
        amount: Option<Amount>,
    },
    UpdateWithdraw {
        #[serde(default)]
        amount: Option<Amount>,
    },
    UpdateGenerate {
        #[serde(default)]
        amount: Option<Amount>,
    },
    UpdatePayback {
        #[serde(default)]
        amount: Option<Amount>,
    },
    SetPaybackAll,
    ToggleEditing,
    Progress,
    Regress,
    Clear,
    EnterMultiplyTransition,
    SetCollateralAllowanceOption {
        option: AllowanceOption,
    },
    UpdateCollateralAllowanceAmount {
        #[serde(default)]
        amount: Option<Amount>,
    },
    SetDaiAllowanceOption {
        option: AllowanceOption,
    },
    UpdateDaiAllowanceAmount {
        #[serde(default)]
        amount: Option<Amount>,
    },
    /// Publish a new price on the environment feed
    SetPrice { current: Amount, next: Amount },
    SetProxyAddress {
        #[serde(default)]
        address: Option<Address>,
    },
    WaitForStage {
        stage: ManageVaultStage,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
}

/// Send `commands` in order and return the state once all are applied
pub async fn replay(
    handle: &ManageVaultHandle,
    environment: &SnapshotEnvironment,
    commands: &[ScenarioCommand],
) -> Result<ManageVaultState, SessionError> {
    for command in commands {
        log::debug!("scenario: {:?}", command);
        match command.clone() {
            ScenarioCommand::UpdateDeposit { amount } => handle.update_deposit(amount)?,
            ScenarioCommand::UpdateWithdraw { amount } => handle.update_withdraw(amount)?,
            ScenarioCommand::UpdateGenerate { amount } => handle.update_generate(amount)?,
            ScenarioCommand::UpdatePayback { amount } => handle.update_payback(amount)?,
            ScenarioCommand::SetPaybackAll => handle.set_payback_all()?,
            ScenarioCommand::ToggleEditing => handle.toggle_editing()?,
            ScenarioCommand::Progress => handle.progress()?,
            ScenarioCommand::Regress => handle.regress()?,
            ScenarioCommand::Clear => handle.clear()?,
            ScenarioCommand::EnterMultiplyTransition => handle.enter_multiply_transition()?,
            ScenarioCommand::SetCollateralAllowanceOption { option } => {
                handle.set_collateral_allowance_option(option)?
            }
            ScenarioCommand::UpdateCollateralAllowanceAmount { amount } => {
                handle.update_collateral_allowance_amount(amount)?
            }
            ScenarioCommand::SetDaiAllowanceOption { option } => {
                handle.set_dai_allowance_option(option)?
            }
            ScenarioCommand::UpdateDaiAllowanceAmount { amount } => {
                handle.update_dai_allowance_amount(amount)?
            }
            ScenarioCommand::SetPrice { current, next } => {
                let is_static_collateral_price = environment
                    .current_price()
                    .map_or(false, |price| price.is_static_collateral_price);
                environment.set_price_info(PriceInfo {
                    current_collateral_price: current,
                    next_collateral_price: next,
                    is_static_collateral_price,
                });
            }
            ScenarioCommand::SetProxyAddress { address } => environment.set_proxy_address(address),
            ScenarioCommand::WaitForStage { stage, timeout_ms } => {
                handle
                    .wait_for_stage(stage, Duration::from_millis(timeout_ms))
                    .await?;
            }
        }
    }
    handle.snapshot().await
}

fn amount(value: &str) -> Amount {
    Amount::from_str(value).unwrap_or_default()
}

impl Scenario {
    /// Deposit 10 WBTC and generate 5000 DAI on a vault that already has a
    /// proxy and a collateral allowance
    pub fn wbtc_deposit_and_generate() -> Self {
        let owner = Address::new("0x8a7c3f0e1b2d4a6c9e8f7a6b5c4d3e2f1a0b9c8d");
        let proxy = Address::new("0x5ad1f3c2e4b6a8d0c9e7f5a3b1d2c4e6f8a0b2c4");
        let environment = Environment {
            vault: Vault {
                id: 1,
                ilk: "WBTC-A".to_string(),
                token: "WBTC".to_string(),
                controller: Some(owner.clone()),
                locked_collateral: amount("10"),
                debt: amount("1000"),
                debt_offset: amount("0.01"),
            },
            ilk_data: IlkData {
                ilk: "WBTC-A".to_string(),
                token: "WBTC".to_string(),
                liquidation_ratio: amount("1.5"),
                debt_available: amount("5000000"),
                debt_floor: amount("2000"),
                stability_fee: amount("0.04"),
                liquidation_penalty: amount("0.13"),
                collateralization_danger_threshold: amount("1.75"),
                collateralization_warning_threshold: amount("2.25"),
            },
            price_info: PriceInfo {
                current_collateral_price: amount("30000"),
                next_collateral_price: amount("30000"),
                is_static_collateral_price: false,
            },
            balance_info: BalanceInfo {
                collateral_balance: amount("50"),
                dai_balance: amount("20000"),
            },
            account: Some(owner.clone()),
            proxy_address: Some(proxy),
            collateral_allowance: Some(amount("100")),
            dai_allowance: Some(amount("0")),
        };
        Self {
            account: Some(owner),
            environment,
            tx_outcome: SimulatedOutcome::default(),
            commands: vec![
                ScenarioCommand::UpdateDeposit {
                    amount: Some(amount("10")),
                },
                ScenarioCommand::UpdateGenerate {
                    amount: Some(amount("5000")),
                },
                ScenarioCommand::Progress,
                ScenarioCommand::Progress,
                ScenarioCommand::WaitForStage {
                    stage: ManageVaultStage::ManageSuccess,
                    timeout_ms: 5_000,
                },
            ],
        }
    }
}
