//! Manage-vault state: environment snapshot, form inputs, derived fields

use crate::math::{max_uint256, or_zero, Amount};
use crate::stage::{EditingStage, ManageVaultStage};
use crate::validations::{VaultErrorMessage, VaultWarningMessage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collateral that needs no ERC-20 approval
pub const NATIVE_TOKEN: &str = "ETH";

/// Debt token minted by the protocol
pub const DEBT_TOKEN: &str = "DAI";

/// Account, proxy or controller address. Stored lower-cased so that
/// checksummed and plain spellings compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain vault snapshot (read-only here)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub id: u64,
    pub ilk: String,
    /// Collateral token symbol
    pub token: String,
    pub controller: Option<Address>,
    pub locked_collateral: Amount,
    pub debt: Amount,
    /// Extra debt accrued between reading and paying back
    #[serde(default)]
    pub debt_offset: Amount,
}

impl Vault {
    pub fn is_native_collateral(&self) -> bool {
        self.token == NATIVE_TOKEN
    }
}

/// Risk parameters of a collateral type
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IlkData {
    pub ilk: String,
    pub token: String,
    pub liquidation_ratio: Amount,
    /// Debt that can still be issued before the ceiling
    pub debt_available: Amount,
    pub debt_floor: Amount,
    #[serde(default)]
    pub stability_fee: Amount,
    #[serde(default)]
    pub liquidation_penalty: Amount,
    pub collateralization_danger_threshold: Amount,
    pub collateralization_warning_threshold: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceInfo {
    pub current_collateral_price: Amount,
    pub next_collateral_price: Amount,
    #[serde(default)]
    pub is_static_collateral_price: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceInfo {
    pub collateral_balance: Amount,
    pub dai_balance: Amount,
}

/// Everything read from the chain for this session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub vault: Vault,
    pub ilk_data: IlkData,
    pub price_info: PriceInfo,
    pub balance_info: BalanceInfo,
    pub account: Option<Address>,
    pub proxy_address: Option<Address>,
    /// `None` until read; requires a proxy as spender
    pub collateral_allowance: Option<Amount>,
    pub dai_allowance: Option<Amount>,
}

/// Allowance amount picked in the approval step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllowanceOption {
    #[default]
    Unlimited,
    DepositAmount,
    Custom,
}

/// User inputs of the current editing pass
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageVaultForm {
    pub deposit_amount: Option<Amount>,
    pub withdraw_amount: Option<Amount>,
    pub generate_amount: Option<Amount>,
    pub payback_amount: Option<Amount>,
    pub should_payback_all: bool,

    pub collateral_allowance_amount: Option<Amount>,
    pub selected_collateral_allowance_radio: AllowanceOption,
    pub dai_allowance_amount: Option<Amount>,
    pub selected_dai_allowance_radio: AllowanceOption,
}

impl Default for ManageVaultForm {
    fn default() -> Self {
        Self {
            deposit_amount: None,
            withdraw_amount: None,
            generate_amount: None,
            payback_amount: None,
            should_payback_all: false,
            collateral_allowance_amount: Some(max_uint256()),
            selected_collateral_allowance_radio: AllowanceOption::Unlimited,
            dai_allowance_amount: Some(max_uint256()),
            selected_dai_allowance_radio: AllowanceOption::Unlimited,
        }
    }
}

impl ManageVaultForm {
    /// Setting a deposit discards a pending withdrawal
    pub fn update_deposit(&mut self, amount: Option<Amount>) {
        if amount.is_some() {
            self.withdraw_amount = None;
        }
        self.deposit_amount = amount;
    }

    pub fn update_withdraw(&mut self, amount: Option<Amount>) {
        if amount.is_some() {
            self.deposit_amount = None;
        }
        self.withdraw_amount = amount;
    }

    pub fn update_generate(&mut self, amount: Option<Amount>) {
        if amount.is_some() {
            self.payback_amount = None;
            self.should_payback_all = false;
        }
        self.generate_amount = amount;
    }

    pub fn update_payback(&mut self, amount: Option<Amount>) {
        if amount.is_some() {
            self.generate_amount = None;
        }
        self.should_payback_all = false;
        self.payback_amount = amount;
    }

    /// Pay back the whole vault debt
    pub fn set_payback_all(&mut self, debt: &Amount) {
        self.generate_amount = None;
        self.payback_amount = Some(debt.clone());
        self.should_payback_all = true;
    }

    pub fn set_collateral_allowance_option(&mut self, option: AllowanceOption) {
        self.selected_collateral_allowance_radio = option;
        self.collateral_allowance_amount = match option {
            AllowanceOption::Unlimited => Some(max_uint256()),
            AllowanceOption::DepositAmount => self.deposit_amount.clone(),
            AllowanceOption::Custom => None,
        };
    }

    pub fn update_collateral_allowance_amount(&mut self, amount: Option<Amount>) {
        self.collateral_allowance_amount = amount;
    }

    /// The payback option approves the payback plus the accrual buffer
    pub fn set_dai_allowance_option(&mut self, option: AllowanceOption, debt_offset: &Amount) {
        self.selected_dai_allowance_radio = option;
        self.dai_allowance_amount = match option {
            AllowanceOption::Unlimited => Some(max_uint256()),
            AllowanceOption::DepositAmount => self
                .payback_amount
                .as_ref()
                .map(|payback| payback + debt_offset),
            AllowanceOption::Custom => None,
        };
    }

    pub fn update_dai_allowance_amount(&mut self, amount: Option<Amount>) {
        self.dai_allowance_amount = amount;
    }
}

/// Transaction bookkeeping for display
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    pub proxy_tx_hash: Option<String>,
    pub collateral_allowance_tx_hash: Option<String>,
    pub dai_allowance_tx_hash: Option<String>,
    pub manage_tx_hash: Option<String>,
    pub multiply_transition_tx_hash: Option<String>,
    pub proxy_confirmations: Option<u32>,
    pub tx_error: Option<String>,
    /// Confirmations required before a transaction counts as successful
    pub safe_confirmations: u32,
}

/// Projections of the vault after the pending action
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageVaultCalculations {
    pub collateralization_ratio: Amount,
    pub collateralization_ratio_at_next_price: Amount,
    pub liquidation_price: Amount,
    pub free_collateral: Amount,
    pub free_collateral_at_next_price: Amount,
    pub dai_yield_from_locked_collateral: Amount,

    pub after_locked_collateral: Amount,
    pub after_debt: Amount,
    /// Zero when the vault carries no debt after the action
    pub after_collateralization_ratio: Amount,
    pub after_collateralization_ratio_at_next_price: Amount,
    /// Zero when no collateral is left
    pub after_liquidation_price: Amount,
    pub after_free_collateral: Amount,

    pub max_deposit_amount: Amount,
    pub max_deposit_amount_usd: Amount,
    pub max_withdraw_amount_at_current_price: Amount,
    pub max_withdraw_amount_at_next_price: Amount,
    pub max_withdraw_amount_usd: Amount,
    pub max_generate_amount_at_current_price: Amount,
    pub max_generate_amount_at_next_price: Amount,
    pub max_payback_amount: Amount,

    pub deposit_amount_usd: Option<Amount>,
    pub withdraw_amount_usd: Option<Amount>,
}

/// Boolean view of the state, consumed by validation and the UI
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageVaultConditions {
    pub is_editing_stage: bool,
    pub is_proxy_stage: bool,
    pub is_collateral_allowance_stage: bool,
    pub is_dai_allowance_stage: bool,
    pub is_manage_stage: bool,
    pub is_multiply_transition_stage: bool,

    pub can_progress: bool,
    pub can_regress: bool,

    pub deposit_and_withdraw_amounts_empty: bool,
    pub generate_and_payback_amounts_empty: bool,
    pub input_amounts_empty: bool,

    pub vault_will_be_at_risk_level_warning: bool,
    pub vault_will_be_at_risk_level_danger: bool,
    pub vault_will_be_under_collateralized: bool,

    pub vault_will_be_at_risk_level_warning_at_next_price: bool,
    pub vault_will_be_at_risk_level_danger_at_next_price: bool,
    pub vault_will_be_under_collateralized_at_next_price: bool,

    pub account_is_connected: bool,
    pub account_is_controller: bool,

    pub depositing_all_eth_balance: bool,
    pub deposit_amount_exceeds_collateral_balance: bool,
    pub withdraw_amount_exceeds_free_collateral: bool,
    pub withdraw_amount_exceeds_free_collateral_at_next_price: bool,
    pub generate_amount_exceeds_dai_yield_from_total_collateral: bool,
    pub generate_amount_exceeds_dai_yield_from_total_collateral_at_next_price: bool,
    pub generate_amount_less_than_debt_floor: bool,
    pub generate_amount_exceeds_debt_ceiling: bool,
    pub payback_amount_exceeds_vault_debt: bool,
    pub payback_amount_exceeds_dai_balance: bool,

    pub debt_will_be_less_than_debt_floor: bool,
    pub is_loading_stage: bool,

    pub insufficient_collateral_allowance: bool,
    pub custom_collateral_allowance_amount_empty: bool,
    pub custom_collateral_allowance_amount_exceeds_max_uint256: bool,
    pub custom_collateral_allowance_amount_less_than_deposit_amount: bool,

    pub insufficient_dai_allowance: bool,
    pub custom_dai_allowance_amount_empty: bool,
    pub custom_dai_allowance_amount_exceeds_max_uint256: bool,
    pub custom_dai_allowance_amount_less_than_payback_amount: bool,

    pub withdraw_collateral_on_vault_under_debt_floor: bool,
    pub deposit_collateral_on_vault_under_debt_floor: bool,
}

impl Default for ManageVaultConditions {
    fn default() -> Self {
        Self {
            is_editing_stage: false,
            is_proxy_stage: false,
            is_collateral_allowance_stage: false,
            is_dai_allowance_stage: false,
            is_manage_stage: false,
            is_multiply_transition_stage: false,
            can_progress: false,
            can_regress: false,
            deposit_and_withdraw_amounts_empty: true,
            generate_and_payback_amounts_empty: true,
            input_amounts_empty: true,
            vault_will_be_at_risk_level_warning: false,
            vault_will_be_at_risk_level_danger: false,
            vault_will_be_under_collateralized: false,
            vault_will_be_at_risk_level_warning_at_next_price: false,
            vault_will_be_at_risk_level_danger_at_next_price: false,
            vault_will_be_under_collateralized_at_next_price: false,
            account_is_connected: false,
            account_is_controller: false,
            depositing_all_eth_balance: false,
            deposit_amount_exceeds_collateral_balance: false,
            withdraw_amount_exceeds_free_collateral: false,
            withdraw_amount_exceeds_free_collateral_at_next_price: false,
            generate_amount_exceeds_dai_yield_from_total_collateral: false,
            generate_amount_exceeds_dai_yield_from_total_collateral_at_next_price: false,
            generate_amount_less_than_debt_floor: false,
            generate_amount_exceeds_debt_ceiling: false,
            payback_amount_exceeds_vault_debt: false,
            payback_amount_exceeds_dai_balance: false,
            debt_will_be_less_than_debt_floor: false,
            is_loading_stage: false,
            insufficient_collateral_allowance: false,
            custom_collateral_allowance_amount_empty: false,
            custom_collateral_allowance_amount_exceeds_max_uint256: false,
            custom_collateral_allowance_amount_less_than_deposit_amount: false,
            insufficient_dai_allowance: false,
            custom_dai_allowance_amount_empty: false,
            custom_dai_allowance_amount_exceeds_max_uint256: false,
            custom_dai_allowance_amount_less_than_payback_amount: false,
            withdraw_collateral_on_vault_under_debt_floor: false,
            deposit_collateral_on_vault_under_debt_floor: false,
        }
    }
}

/// The aggregate owned by one manage-vault session.
///
/// `stage` is written by `transitions` only; `calculations`, `conditions`,
/// the step counter and both message lists are written by
/// `apply_pipeline` only.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageVaultState {
    pub stage: ManageVaultStage,
    pub original_editing_stage: EditingStage,

    pub environment: Environment,
    pub form: ManageVaultForm,
    pub tx: TxInfo,

    /// 2 or 3, fixed when the session starts
    pub initial_total_steps: u8,
    pub total_steps: u8,
    pub current_step: u8,

    pub calculations: ManageVaultCalculations,
    pub conditions: ManageVaultConditions,
    pub warning_messages: Vec<VaultWarningMessage>,
    pub error_messages: Vec<VaultErrorMessage>,
}

impl ManageVaultState {
    /// Fresh session state in the collateral editing stage. Derived fields
    /// are empty until the state goes through `apply_pipeline`.
    pub fn new(environment: Environment, safe_confirmations: u32) -> Self {
        let initial_total_steps = initial_total_steps(
            environment.proxy_address.as_ref(),
            &environment.vault.token,
            environment.collateral_allowance.as_ref(),
        );
        Self {
            stage: ManageVaultStage::CollateralEditing,
            original_editing_stage: EditingStage::CollateralEditing,
            environment,
            form: ManageVaultForm::default(),
            tx: TxInfo {
                safe_confirmations,
                ..TxInfo::default()
            },
            initial_total_steps,
            total_steps: initial_total_steps,
            current_step: 1,
            calculations: ManageVaultCalculations::default(),
            conditions: ManageVaultConditions::default(),
            warning_messages: Vec::new(),
            error_messages: Vec::new(),
        }
    }

    pub fn deposit_amount(&self) -> Amount {
        or_zero(self.form.deposit_amount.as_ref())
    }

    pub fn payback_amount(&self) -> Amount {
        or_zero(self.form.payback_amount.as_ref())
    }
}

/// Steps shown in the progress indicator when the session starts: a proxy
/// deployment or a missing collateral allowance adds one step to the
/// edit + confirm pair.
pub fn initial_total_steps(
    proxy_address: Option<&Address>,
    token: &str,
    collateral_allowance: Option<&Amount>,
) -> u8 {
    if proxy_address.is_none() {
        return 3;
    }
    let has_allowance = token == NATIVE_TOKEN
        || collateral_allowance.map_or(false, |allowance| *allowance > crate::math::zero());
    if has_allowance {
        2
    } else {
        3
    }
}
