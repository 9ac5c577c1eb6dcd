//! Warning and error codes shown next to the form
//!
//! Both validators read raw inputs and derived values, never condition
//! flags, so they can run on any state out of band.

use crate::conditions::{
    deposit_collateral_on_vault_under_debt_floor, has_collateral_allowance, has_dai_allowance,
    withdraw_collateral_on_vault_under_debt_floor,
};
use crate::helpers::input_amounts_empty;
use crate::math::{gt_opt, max_uint256, zero};
use crate::stage::{ManageVaultStage, StageCategory};
use crate::state::ManageVaultState;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultWarningMessage {
    NoProxyAddress,
    DepositAmountEmpty,
    GenerateAmountEmpty,
    PotentialGenerateAmountLessThanDebtFloor,
    NoCollateralAllowance,
    CollateralAllowanceLessThanDepositAmount,
    NoDaiAllowance,
    DaiAllowanceLessThanPaybackAmount,
}

impl VaultWarningMessage {
    pub fn as_str(self) -> &'static str {
        match self {
            VaultWarningMessage::NoProxyAddress => "noProxyAddress",
            VaultWarningMessage::DepositAmountEmpty => "depositAmountEmpty",
            VaultWarningMessage::GenerateAmountEmpty => "generateAmountEmpty",
            VaultWarningMessage::PotentialGenerateAmountLessThanDebtFloor => {
                "potentialGenerateAmountLessThanDebtFloor"
            }
            VaultWarningMessage::NoCollateralAllowance => "noCollateralAllowance",
            VaultWarningMessage::CollateralAllowanceLessThanDepositAmount => {
                "collateralAllowanceLessThanDepositAmount"
            }
            VaultWarningMessage::NoDaiAllowance => "noDaiAllowance",
            VaultWarningMessage::DaiAllowanceLessThanPaybackAmount => {
                "daiAllowanceLessThanPaybackAmount"
            }
        }
    }
}

impl fmt::Display for VaultWarningMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultErrorMessage {
    DepositAmountGreaterThanMaxDepositAmount,
    WithdrawAmountGreaterThanMaxWithdrawAmount,
    GenerateAmountLessThanDebtFloor,
    GenerateAmountGreaterThanDebtCeiling,
    PaybackAmountGreaterThanMaxPaybackAmount,
    PaybackAmountLessThanDebtFloor,
    WithdrawCollateralOnVaultUnderDebtFloor,
    DepositCollateralOnVaultUnderDebtFloor,
    CollateralAllowanceAmountEmpty,
    CustomCollateralAllowanceAmountGreaterThanMaxUint256,
    CustomCollateralAllowanceAmountLessThanDepositAmount,
    DaiAllowanceAmountEmpty,
    CustomDaiAllowanceAmountGreaterThanMaxUint256,
    CustomDaiAllowanceAmountLessThanPaybackAmount,
    VaultUnderCollateralized,
}

impl VaultErrorMessage {
    pub fn as_str(self) -> &'static str {
        use VaultErrorMessage::*;
        match self {
            DepositAmountGreaterThanMaxDepositAmount => "depositAmountGreaterThanMaxDepositAmount",
            WithdrawAmountGreaterThanMaxWithdrawAmount => {
                "withdrawAmountGreaterThanMaxWithdrawAmount"
            }
            GenerateAmountLessThanDebtFloor => "generateAmountLessThanDebtFloor",
            GenerateAmountGreaterThanDebtCeiling => "generateAmountGreaterThanDebtCeiling",
            PaybackAmountGreaterThanMaxPaybackAmount => "paybackAmountGreaterThanMaxPaybackAmount",
            PaybackAmountLessThanDebtFloor => "paybackAmountLessThanDebtFloor",
            WithdrawCollateralOnVaultUnderDebtFloor => "withdrawCollateralOnVaultUnderDebtFloor",
            DepositCollateralOnVaultUnderDebtFloor => "depositCollateralOnVaultUnderDebtFloor",
            CollateralAllowanceAmountEmpty => "collateralAllowanceAmountEmpty",
            CustomCollateralAllowanceAmountGreaterThanMaxUint256 => {
                "customCollateralAllowanceAmountGreaterThanMaxUint256"
            }
            CustomCollateralAllowanceAmountLessThanDepositAmount => {
                "customCollateralAllowanceAmountLessThanDepositAmount"
            }
            DaiAllowanceAmountEmpty => "daiAllowanceAmountEmpty",
            CustomDaiAllowanceAmountGreaterThanMaxUint256 => {
                "customDaiAllowanceAmountGreaterThanMaxUint256"
            }
            CustomDaiAllowanceAmountLessThanPaybackAmount => {
                "customDaiAllowanceAmountLessThanPaybackAmount"
            }
            VaultUnderCollateralized => "vaultUnderCollateralized",
        }
    }
}

impl fmt::Display for VaultErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_warnings(mut s: ManageVaultState) -> ManageVaultState {
    s.warning_messages = warnings(&s);
    s
}

pub fn validate_errors(mut s: ManageVaultState) -> ManageVaultState {
    s.error_messages = errors(&s);
    s
}

/// Warning codes for `s`, in declaration order
pub fn warnings(s: &ManageVaultState) -> Vec<VaultWarningMessage> {
    let env = &s.environment;
    let form = &s.form;
    let mut messages = Vec::new();

    if env.proxy_address.is_none() {
        messages.push(VaultWarningMessage::NoProxyAddress);
    }

    let editing_collateral = s.stage == ManageVaultStage::CollateralEditing;
    if editing_collateral && form.deposit_amount.is_none() {
        messages.push(VaultWarningMessage::DepositAmountEmpty);
    }
    if editing_collateral && form.generate_amount.is_none() {
        messages.push(VaultWarningMessage::GenerateAmountEmpty);
    }

    if let Some(deposit_usd) = &s.calculations.deposit_amount_usd {
        if *deposit_usd < env.ilk_data.debt_floor {
            messages.push(VaultWarningMessage::PotentialGenerateAmountLessThanDebtFloor);
        }
    }

    if !has_collateral_allowance(s) {
        messages.push(match env.collateral_allowance {
            None => VaultWarningMessage::NoCollateralAllowance,
            Some(_) => VaultWarningMessage::CollateralAllowanceLessThanDepositAmount,
        });
    }

    if !has_dai_allowance(s) {
        messages.push(match env.dai_allowance {
            None => VaultWarningMessage::NoDaiAllowance,
            Some(_) => VaultWarningMessage::DaiAllowanceLessThanPaybackAmount,
        });
    }

    messages
}

/// Error codes for `s`, in declaration order
pub fn errors(s: &ManageVaultState) -> Vec<VaultErrorMessage> {
    use VaultErrorMessage::*;

    let env = &s.environment;
    let form = &s.form;
    let calc = &s.calculations;
    let debt = &env.vault.debt;
    let debt_floor = &env.ilk_data.debt_floor;
    let mut messages = Vec::new();

    if gt_opt(form.deposit_amount.as_ref(), &calc.max_deposit_amount) {
        messages.push(DepositAmountGreaterThanMaxDepositAmount);
    }
    if gt_opt(form.withdraw_amount.as_ref(), &calc.max_withdraw_amount_at_current_price) {
        messages.push(WithdrawAmountGreaterThanMaxWithdrawAmount);
    }
    if let Some(generate) = &form.generate_amount {
        let total = generate + debt;
        if !total.is_zero() && total < *debt_floor {
            messages.push(GenerateAmountLessThanDebtFloor);
        }
    }
    if gt_opt(form.generate_amount.as_ref(), &env.ilk_data.debt_available) {
        messages.push(GenerateAmountGreaterThanDebtCeiling);
    }
    if gt_opt(form.payback_amount.as_ref(), &calc.max_payback_amount) {
        messages.push(PaybackAmountGreaterThanMaxPaybackAmount);
    }
    if let (Some(payback), false) = (&form.payback_amount, form.should_payback_all) {
        let remaining = debt - payback;
        if remaining > zero() && remaining < *debt_floor {
            messages.push(PaybackAmountLessThanDebtFloor);
        }
    }
    if withdraw_collateral_on_vault_under_debt_floor(s) {
        messages.push(WithdrawCollateralOnVaultUnderDebtFloor);
    }
    if deposit_collateral_on_vault_under_debt_floor(s) {
        messages.push(DepositCollateralOnVaultUnderDebtFloor);
    }

    match s.stage.category() {
        StageCategory::CollateralAllowance => match &form.collateral_allowance_amount {
            None => messages.push(CollateralAllowanceAmountEmpty),
            Some(amount) if *amount > max_uint256() => {
                messages.push(CustomCollateralAllowanceAmountGreaterThanMaxUint256)
            }
            Some(amount) if gt_opt(form.deposit_amount.as_ref(), amount) => {
                messages.push(CustomCollateralAllowanceAmountLessThanDepositAmount)
            }
            Some(_) => {}
        },
        StageCategory::DaiAllowance => match &form.dai_allowance_amount {
            None => messages.push(DaiAllowanceAmountEmpty),
            Some(amount) if *amount > max_uint256() => {
                messages.push(CustomDaiAllowanceAmountGreaterThanMaxUint256)
            }
            Some(amount) if gt_opt(form.payback_amount.as_ref(), amount) => {
                messages.push(CustomDaiAllowanceAmountLessThanPaybackAmount)
            }
            Some(_) => {}
        },
        _ => {}
    }

    let ratio = &calc.after_collateralization_ratio;
    if !input_amounts_empty(form)
        && !ratio.is_zero()
        && *ratio < env.ilk_data.liquidation_ratio
    {
        messages.push(VaultUnderCollateralized);
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Amount;
    use crate::state::{Address, Environment, IlkData, ManageVaultForm, PriceInfo, Vault};
    use std::str::FromStr;

    fn dec(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    const WBTC_PRICE: &str = "50000";

    /// A WBTC vault with proxy and allowances in place and every input set
    fn fixture() -> ManageVaultState {
        let environment = Environment {
            vault: Vault {
                id: 1,
                ilk: "WBTC-A".to_string(),
                token: "WBTC".to_string(),
                controller: Some(Address::new("0xController")),
                locked_collateral: dec("20"),
                debt: dec("3000"),
                ..Vault::default()
            },
            ilk_data: IlkData {
                ilk: "WBTC-A".to_string(),
                token: "WBTC".to_string(),
                liquidation_ratio: dec("1.5"),
                debt_available: dec("50000"),
                debt_floor: dec("2000"),
                collateralization_danger_threshold: dec("2"),
                collateralization_warning_threshold: dec("2.5"),
                ..IlkData::default()
            },
            price_info: PriceInfo {
                current_collateral_price: dec(WBTC_PRICE),
                next_collateral_price: dec(WBTC_PRICE),
                is_static_collateral_price: true,
            },
            account: Some(Address::new("0xController")),
            proxy_address: Some(Address::new("0xProxyAddress")),
            collateral_allowance: Some(dec("10")),
            dai_allowance: Some(dec("10")),
            ..Environment::default()
        };
        let mut s = ManageVaultState::new(environment, 1);
        s.form.deposit_amount = Some(dec("10"));
        s.form.withdraw_amount = Some(dec("10"));
        s.form.generate_amount = Some(dec("5000"));
        s.form.payback_amount = Some(dec("10"));

        let deposit_usd = dec("10") * dec(WBTC_PRICE);
        s.calculations.deposit_amount_usd = Some(deposit_usd.clone());
        s.calculations.max_deposit_amount = deposit_usd * dec("2");
        s.calculations.max_withdraw_amount_at_current_price = dec("10");
        s.calculations.max_payback_amount = dec("10000");
        s
    }

    fn slightly_less(amount: &Amount) -> Amount {
        amount * dec("0.99")
    }

    fn slightly_more(amount: &Amount) -> Amount {
        amount * dec("1.01")
    }

    #[test]
    fn test_no_warnings_when_state_is_correct() {
        assert!(warnings(&fixture()).is_empty());
    }

    #[test]
    fn test_single_warnings() {
        let cases: [(fn(&mut ManageVaultState), VaultWarningMessage); 8] = [
            (|s| s.environment.proxy_address = None, VaultWarningMessage::NoProxyAddress),
            (|s| s.form.deposit_amount = None, VaultWarningMessage::DepositAmountEmpty),
            (|s| s.form.generate_amount = None, VaultWarningMessage::GenerateAmountEmpty),
            (
                |s| {
                    let usd = s.calculations.deposit_amount_usd.clone().unwrap();
                    s.environment.ilk_data.debt_floor = slightly_more(&usd);
                },
                VaultWarningMessage::PotentialGenerateAmountLessThanDebtFloor,
            ),
            (
                |s| s.environment.collateral_allowance = None,
                VaultWarningMessage::NoCollateralAllowance,
            ),
            (
                |s| s.environment.collateral_allowance = Some(zero()),
                VaultWarningMessage::CollateralAllowanceLessThanDepositAmount,
            ),
            (
                |s| s.environment.dai_allowance = Some(slightly_less(&dec("10"))),
                VaultWarningMessage::DaiAllowanceLessThanPaybackAmount,
            ),
            (|s| s.environment.dai_allowance = None, VaultWarningMessage::NoDaiAllowance),
        ];
        for (mutate, expected) in cases {
            let mut s = fixture();
            mutate(&mut s);
            assert_eq!(warnings(&s), vec![expected]);
        }
    }

    #[test]
    fn test_debt_floor_slightly_below_deposit_value_is_fine() {
        let mut s = fixture();
        let usd = s.calculations.deposit_amount_usd.clone().unwrap();
        s.environment.ilk_data.debt_floor = slightly_less(&usd);
        assert!(warnings(&s).is_empty());
    }

    #[test]
    fn test_no_errors_when_state_is_correct() {
        assert!(errors(&fixture()).is_empty());
    }

    #[test]
    fn test_single_errors() {
        let cases: [(fn(&mut ManageVaultState), VaultErrorMessage); 7] = [
            (
                |s| s.calculations.max_deposit_amount = slightly_less(&dec("10")),
                VaultErrorMessage::DepositAmountGreaterThanMaxDepositAmount,
            ),
            (
                |s| s.calculations.max_withdraw_amount_at_current_price = slightly_less(&dec("10")),
                VaultErrorMessage::WithdrawAmountGreaterThanMaxWithdrawAmount,
            ),
            (
                |s| {
                    s.environment.vault.debt = zero();
                    s.form.generate_amount = Some(dec("1"));
                },
                VaultErrorMessage::GenerateAmountLessThanDebtFloor,
            ),
            (
                |s| s.form.generate_amount = Some(slightly_more(&dec("50000"))),
                VaultErrorMessage::GenerateAmountGreaterThanDebtCeiling,
            ),
            (
                |s| s.calculations.max_payback_amount = slightly_less(&dec("10")),
                VaultErrorMessage::PaybackAmountGreaterThanMaxPaybackAmount,
            ),
            (
                |s| s.form.payback_amount = Some(dec("3000") - dec("2000") + dec("1")),
                VaultErrorMessage::PaybackAmountLessThanDebtFloor,
            ),
            (
                |s| s.calculations.after_collateralization_ratio = dec("1.49"),
                VaultErrorMessage::VaultUnderCollateralized,
            ),
        ];
        for (mutate, expected) in cases {
            let mut s = fixture();
            mutate(&mut s);
            assert_eq!(errors(&s), vec![expected]);
        }
    }

    #[test]
    fn test_dai_allowance_errors_only_in_dai_allowance_stages() {
        let cases = [
            (None, VaultErrorMessage::DaiAllowanceAmountEmpty),
            (
                Some(max_uint256() + dec("1")),
                VaultErrorMessage::CustomDaiAllowanceAmountGreaterThanMaxUint256,
            ),
            (
                Some(dec("9")),
                VaultErrorMessage::CustomDaiAllowanceAmountLessThanPaybackAmount,
            ),
        ];
        for (amount, expected) in cases {
            let mut s = fixture();
            s.form.dai_allowance_amount = amount;
            assert!(errors(&s).is_empty());

            s.stage = ManageVaultStage::DaiAllowanceWaitingForConfirmation;
            assert_eq!(errors(&s), vec![expected]);
        }
    }

    #[test]
    fn test_collateral_allowance_errors() {
        let mut s = fixture();
        s.stage = ManageVaultStage::CollateralAllowanceWaitingForConfirmation;
        s.form.collateral_allowance_amount = Some(dec("9"));
        assert_eq!(
            errors(&s),
            vec![VaultErrorMessage::CustomCollateralAllowanceAmountLessThanDepositAmount]
        );
        s.form.collateral_allowance_amount = None;
        assert_eq!(errors(&s), vec![VaultErrorMessage::CollateralAllowanceAmountEmpty]);
    }

    #[test]
    fn test_dust_guards_surface_as_errors() {
        let mut s = fixture();
        s.environment.vault.debt = dec("1000");
        s.form.deposit_amount = None;
        s.form.generate_amount = None;
        s.form.payback_amount = None;
        assert_eq!(
            errors(&s),
            vec![VaultErrorMessage::WithdrawCollateralOnVaultUnderDebtFloor]
        );
    }

    #[test]
    fn test_zero_amounts_agree_with_risk_flags() {
        let mut s = fixture();
        s.environment.price_info.current_collateral_price = dec("200");
        s.environment.price_info.next_collateral_price = dec("200");
        s.form = ManageVaultForm::default();
        s.form.deposit_amount = Some(dec("0"));
        let s = crate::apply_pipeline(s);
        // 20 WBTC at 200 against 3000 DAI sits below the liquidation ratio
        assert!(s.calculations.after_collateralization_ratio < dec("1.5"));
        assert!(s.conditions.input_amounts_empty);
        assert!(!s.conditions.vault_will_be_under_collateralized);
        assert!(!s.error_messages.contains(&VaultErrorMessage::VaultUnderCollateralized));

        let mut s = s;
        s.form.deposit_amount = Some(dec("0.1"));
        let s = crate::apply_pipeline(s);
        assert!(s.conditions.vault_will_be_under_collateralized);
        assert!(s.error_messages.contains(&VaultErrorMessage::VaultUnderCollateralized));
    }

    #[test]
    fn test_codes_serialize_as_camel_case() {
        let json = serde_json::to_string(&vec![
            VaultErrorMessage::VaultUnderCollateralized,
            VaultErrorMessage::PaybackAmountLessThanDebtFloor,
        ])
        .unwrap();
        assert_eq!(json, r#"["vaultUnderCollateralized","paybackAmountLessThanDebtFloor"]"#);
        assert_eq!(
            VaultWarningMessage::NoProxyAddress.to_string(),
            "noProxyAddress"
        );
    }
}
