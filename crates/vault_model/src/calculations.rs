//! Derived values: projections of the vault after the pending action
//!
//! Pure and total. Absent inputs count as zero, a zero price or a zero
//! liquidation ratio never reaches a division.

use crate::math::{div_or_zero, min_amount, or_zero, sub_floor, zero, Amount};
use crate::state::{ManageVaultCalculations, ManageVaultState};
use num_traits::Zero;

/// Collateral value over debt; zero when there is no debt
pub fn collateralization_ratio(collateral: &Amount, price: &Amount, debt: &Amount) -> Amount {
    if debt.is_zero() {
        zero()
    } else {
        (collateral * price) / debt
    }
}

/// Price at which the position hits the liquidation ratio; zero without collateral
pub fn liquidation_price(collateral: &Amount, debt: &Amount, liquidation_ratio: &Amount) -> Amount {
    if collateral.is_zero() {
        zero()
    } else {
        (debt * liquidation_ratio) / collateral
    }
}

/// Collateral that can leave the vault while the ratio stays at or above
/// the liquidation ratio
pub fn free_collateral(
    collateral: &Amount,
    debt: &Amount,
    price: &Amount,
    liquidation_ratio: &Amount,
) -> Amount {
    if debt.is_zero() {
        return collateral.clone();
    }
    if price.is_zero() {
        return zero();
    }
    sub_floor(collateral, &((debt * liquidation_ratio) / price))
}

/// Debt the collateral can back at the liquidation ratio, minus the debt
/// already drawn
pub fn dai_yield(
    collateral: &Amount,
    debt: &Amount,
    price: &Amount,
    liquidation_ratio: &Amount,
) -> Amount {
    let capacity = div_or_zero(&(collateral * price), liquidation_ratio);
    sub_floor(&capacity, debt)
}

pub fn apply_calculations(mut s: ManageVaultState) -> ManageVaultState {
    let env = &s.environment;
    let form = &s.form;
    let vault = &env.vault;
    let ilk = &env.ilk_data;
    let price = &env.price_info.current_collateral_price;
    let next_price = &env.price_info.next_collateral_price;
    let liquidation_ratio = &ilk.liquidation_ratio;

    let deposit = or_zero(form.deposit_amount.as_ref());
    let withdraw = or_zero(form.withdraw_amount.as_ref());
    let generate = or_zero(form.generate_amount.as_ref());
    let payback = or_zero(form.payback_amount.as_ref());

    let after_locked_collateral = sub_floor(&(&vault.locked_collateral + &deposit), &withdraw);
    let after_debt = if form.should_payback_all {
        zero()
    } else {
        sub_floor(&(&vault.debt + &generate), &payback)
    };

    // Bounds for the amount being edited leave that amount out
    let collateral_before_withdraw = &vault.locked_collateral + &deposit;
    let debt_before_generate = if form.should_payback_all {
        zero()
    } else {
        sub_floor(&vault.debt, &payback)
    };

    let max_withdraw = |price: &Amount| {
        free_collateral(&collateral_before_withdraw, &after_debt, price, liquidation_ratio)
    };
    let max_generate = |price: &Amount| {
        min_amount(
            &dai_yield(&after_locked_collateral, &debt_before_generate, price, liquidation_ratio),
            &ilk.debt_available,
        )
    };

    let max_withdraw_amount_at_current_price = max_withdraw(price);
    let max_deposit_amount = env.balance_info.collateral_balance.clone();

    let calculations = ManageVaultCalculations {
        collateralization_ratio: collateralization_ratio(
            &vault.locked_collateral,
            price,
            &vault.debt,
        ),
        collateralization_ratio_at_next_price: collateralization_ratio(
            &vault.locked_collateral,
            next_price,
            &vault.debt,
        ),
        liquidation_price: liquidation_price(
            &vault.locked_collateral,
            &vault.debt,
            liquidation_ratio,
        ),
        free_collateral: free_collateral(
            &vault.locked_collateral,
            &vault.debt,
            price,
            liquidation_ratio,
        ),
        free_collateral_at_next_price: free_collateral(
            &vault.locked_collateral,
            &vault.debt,
            next_price,
            liquidation_ratio,
        ),
        dai_yield_from_locked_collateral: dai_yield(
            &vault.locked_collateral,
            &vault.debt,
            price,
            liquidation_ratio,
        ),

        after_collateralization_ratio: collateralization_ratio(
            &after_locked_collateral,
            price,
            &after_debt,
        ),
        after_collateralization_ratio_at_next_price: collateralization_ratio(
            &after_locked_collateral,
            next_price,
            &after_debt,
        ),
        after_liquidation_price: liquidation_price(
            &after_locked_collateral,
            &after_debt,
            liquidation_ratio,
        ),
        after_free_collateral: free_collateral(
            &after_locked_collateral,
            &after_debt,
            price,
            liquidation_ratio,
        ),

        max_deposit_amount_usd: &max_deposit_amount * price,
        max_deposit_amount,
        max_withdraw_amount_usd: &max_withdraw_amount_at_current_price * price,
        max_withdraw_amount_at_next_price: max_withdraw(next_price),
        max_withdraw_amount_at_current_price,
        max_generate_amount_at_current_price: max_generate(price),
        max_generate_amount_at_next_price: max_generate(next_price),
        max_payback_amount: min_amount(&vault.debt, &env.balance_info.dai_balance),

        deposit_amount_usd: form.deposit_amount.as_ref().map(|amount| amount * price),
        withdraw_amount_usd: form.withdraw_amount.as_ref().map(|amount| amount * price),

        after_locked_collateral,
        after_debt,
    };

    s.calculations = calculations;
    s
}
