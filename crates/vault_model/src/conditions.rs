//! Condition evaluation: stage categorisation, step counter, risk and
//! eligibility flags

use crate::helpers;
use crate::math::{gt_opt, is_nonzero, is_zero_or_none, max_uint256, zero};
use crate::stage::{ManageVaultStage, StageCategory, StagePhase};
use crate::state::{AllowanceOption, ManageVaultConditions, ManageVaultState};
use num_traits::Zero;

/// Collateral allowance covers the pending deposit. Native collateral
/// needs no approval.
pub fn has_collateral_allowance(s: &ManageVaultState) -> bool {
    let env = &s.environment;
    if env.vault.is_native_collateral() {
        return true;
    }
    match (&s.form.deposit_amount, &env.collateral_allowance) {
        (None, _) => true,
        (Some(deposit), _) if deposit.is_zero() => true,
        (Some(deposit), Some(allowance)) => allowance >= deposit,
        (Some(_), None) => false,
    }
}

/// Debt-token allowance covers the pending payback plus the accrual buffer
pub fn has_dai_allowance(s: &ManageVaultState) -> bool {
    let env = &s.environment;
    match (&s.form.payback_amount, &env.dai_allowance) {
        (None, _) => true,
        (Some(payback), _) if payback.is_zero() => true,
        (Some(payback), Some(allowance)) => *allowance >= payback + &env.vault.debt_offset,
        (Some(_), None) => false,
    }
}

/// Withdrawing from a vault whose debt already sits under the floor,
/// without clearing that debt
pub fn withdraw_collateral_on_vault_under_debt_floor(s: &ManageVaultState) -> bool {
    let debt = &s.environment.vault.debt;
    let form = &s.form;
    *debt > zero()
        && *debt < s.environment.ilk_data.debt_floor
        && is_nonzero(form.withdraw_amount.as_ref())
        && !form.should_payback_all
        && form.payback_amount.as_ref().map_or(true, |payback| payback < debt)
}

/// Depositing into a vault whose debt sits under the floor and stays there
pub fn deposit_collateral_on_vault_under_debt_floor(s: &ManageVaultState) -> bool {
    let debt = &s.environment.vault.debt;
    let floor = &s.environment.ilk_data.debt_floor;
    let after_debt = &s.calculations.after_debt;
    *debt > zero()
        && debt < floor
        && is_nonzero(s.form.deposit_amount.as_ref())
        && *after_debt > zero()
        && after_debt < floor
}

/// Set stage category flags and recompute the step counter.
///
/// The total starts from `initial_total_steps`; it grows to 3 while an
/// allowance is missing and drops back to 2 once both allowances are in
/// place for a payback.
pub fn categorise_stage(mut s: ManageVaultState) -> ManageVaultState {
    let has_collateral_allowance = has_collateral_allowance(&s);
    let has_dai_allowance = has_dai_allowance(&s);
    let is_payback_zero = is_zero_or_none(s.form.payback_amount.as_ref());

    let mut total_steps = s.initial_total_steps;
    if s.initial_total_steps == 2 && (!has_collateral_allowance || !has_dai_allowance) {
        total_steps = 3;
    }
    if s.initial_total_steps == 3 && has_collateral_allowance && has_dai_allowance && !is_payback_zero
    {
        total_steps = 2;
    }

    let category = s.stage.category();
    let c = &mut s.conditions;
    c.is_editing_stage = category == StageCategory::Editing;
    c.is_proxy_stage = category == StageCategory::Proxy;
    c.is_collateral_allowance_stage = category == StageCategory::CollateralAllowance;
    c.is_dai_allowance_stage = category == StageCategory::DaiAllowance;
    c.is_manage_stage = category == StageCategory::Manage;
    c.is_multiply_transition_stage = category == StageCategory::MultiplyTransition;

    let (total_steps, current_step) = match category {
        StageCategory::Editing => (total_steps, 1),
        StageCategory::Proxy => {
            let offset = if s.environment.vault.is_native_collateral() { 1 } else { 2 };
            (total_steps, total_steps.saturating_sub(offset).max(1))
        }
        StageCategory::CollateralAllowance | StageCategory::DaiAllowance => {
            (total_steps, total_steps.saturating_sub(1))
        }
        StageCategory::Manage => (total_steps, total_steps),
        StageCategory::MultiplyTransition => {
            (2, if s.stage.phase() == StagePhase::Editing { 1 } else { 2 })
        }
    };
    s.total_steps = total_steps;
    s.current_step = current_step;
    s
}

/// Compute every condition flag. `can_progress` here covers the stage and
/// input rules; `gate_progression` folds in validation errors afterwards.
pub fn apply_conditions(mut s: ManageVaultState) -> ManageVaultState {
    let env = &s.environment;
    let form = &s.form;
    let calc = &s.calculations;
    let vault = &env.vault;
    let ilk = &env.ilk_data;
    let stage = s.stage;
    let prev = &s.conditions;

    let deposit = form.deposit_amount.as_ref();
    let withdraw = form.withdraw_amount.as_ref();
    let generate = form.generate_amount.as_ref();
    let payback = form.payback_amount.as_ref();

    let deposit_and_withdraw_amounts_empty = helpers::deposit_and_withdraw_amounts_empty(form);
    let generate_and_payback_amounts_empty = helpers::generate_and_payback_amounts_empty(form);
    let input_amounts_empty = helpers::input_amounts_empty(form);

    // Risk levels: under-collateralized, then danger, then warning. The
    // next-price flag of a level is only raised when the current-price flag
    // of that level is not.
    let ratio = &calc.after_collateralization_ratio;
    let next_ratio = &calc.after_collateralization_ratio_at_next_price;
    let liquidation_ratio = &ilk.liquidation_ratio;
    let danger = &ilk.collateralization_danger_threshold;
    let warning = &ilk.collateralization_warning_threshold;

    let is_under = |r: &crate::math::Amount| r < liquidation_ratio && !r.is_zero();
    let is_danger = |r: &crate::math::Amount| r >= liquidation_ratio && r <= danger;
    let is_warning = |r: &crate::math::Amount| r > danger && r <= warning;

    let vault_will_be_under_collateralized = !input_amounts_empty && is_under(ratio);
    let vault_will_be_at_risk_level_danger =
        !input_amounts_empty && !vault_will_be_under_collateralized && is_danger(ratio);
    let vault_will_be_at_risk_level_warning = !input_amounts_empty
        && !vault_will_be_under_collateralized
        && !vault_will_be_at_risk_level_danger
        && is_warning(ratio);

    let vault_will_be_under_collateralized_at_next_price =
        !input_amounts_empty && !vault_will_be_under_collateralized && is_under(next_ratio);
    let vault_will_be_at_risk_level_danger_at_next_price = !input_amounts_empty
        && !vault_will_be_at_risk_level_danger
        && !vault_will_be_under_collateralized_at_next_price
        && is_danger(next_ratio);
    let vault_will_be_at_risk_level_warning_at_next_price = !input_amounts_empty
        && !vault_will_be_at_risk_level_warning
        && !vault_will_be_under_collateralized_at_next_price
        && !vault_will_be_at_risk_level_danger_at_next_price
        && is_warning(next_ratio);

    let account_is_connected = env.account.is_some();
    let account_is_controller = match &env.account {
        None => true,
        Some(account) => vault.controller.as_ref() == Some(account),
    };

    let collateral_balance = &env.balance_info.collateral_balance;
    let deposit_amount_exceeds_collateral_balance = gt_opt(deposit, collateral_balance);
    let depositing_all_eth_balance =
        vault.is_native_collateral() && deposit.map_or(false, |d| d == collateral_balance);

    let withdraw_amount_exceeds_free_collateral =
        gt_opt(withdraw, &calc.max_withdraw_amount_at_current_price);
    let withdraw_amount_exceeds_free_collateral_at_next_price = !withdraw_amount_exceeds_free_collateral
        && gt_opt(withdraw, &calc.max_withdraw_amount_at_next_price);

    let generate_amount_exceeds_debt_ceiling = gt_opt(generate, &ilk.debt_available);
    let generate_amount_exceeds_dai_yield_from_total_collateral = !generate_amount_exceeds_debt_ceiling
        && gt_opt(generate, &calc.max_generate_amount_at_current_price);
    let generate_amount_exceeds_dai_yield_from_total_collateral_at_next_price =
        !generate_amount_exceeds_debt_ceiling
            && !generate_amount_exceeds_dai_yield_from_total_collateral
            && gt_opt(generate, &calc.max_generate_amount_at_next_price);

    let generate_amount_less_than_debt_floor = generate.map_or(false, |g| {
        let total = g + &vault.debt;
        !total.is_zero() && total < ilk.debt_floor
    });

    let payback_amount_exceeds_dai_balance = gt_opt(payback, &env.balance_info.dai_balance);
    let payback_amount_exceeds_vault_debt = gt_opt(payback, &vault.debt);

    let debt_will_be_less_than_debt_floor = !form.should_payback_all
        && payback.map_or(false, |p| {
            let remaining = &vault.debt - p;
            remaining < ilk.debt_floor && remaining > zero()
        });

    let custom_collateral = form.selected_collateral_allowance_radio == AllowanceOption::Custom;
    let custom_dai = form.selected_dai_allowance_radio == AllowanceOption::Custom;
    let collateral_allowance_amount = form.collateral_allowance_amount.as_ref();
    let dai_allowance_amount = form.dai_allowance_amount.as_ref();

    let custom_collateral_allowance_amount_empty =
        custom_collateral && collateral_allowance_amount.is_none();
    let custom_collateral_allowance_amount_exceeds_max_uint256 =
        custom_collateral && gt_opt(collateral_allowance_amount, &max_uint256());
    let custom_collateral_allowance_amount_less_than_deposit_amount = custom_collateral
        && matches!((collateral_allowance_amount, deposit), (Some(a), Some(d)) if a < d);

    let custom_dai_allowance_amount_empty = custom_dai && dai_allowance_amount.is_none();
    let custom_dai_allowance_amount_exceeds_max_uint256 =
        custom_dai && gt_opt(dai_allowance_amount, &max_uint256());
    let custom_dai_allowance_amount_less_than_payback_amount =
        custom_dai && matches!((dai_allowance_amount, payback), (Some(a), Some(p)) if a < p);

    let insufficient_collateral_allowance = !has_collateral_allowance(&s);
    let insufficient_dai_allowance = !has_dai_allowance(&s);

    let is_loading_stage = stage.is_loading();
    let withdraw_collateral_on_vault_under_debt_floor =
        withdraw_collateral_on_vault_under_debt_floor(&s);
    let deposit_collateral_on_vault_under_debt_floor =
        deposit_collateral_on_vault_under_debt_floor(&s);

    let collateral_allowance_progression_disabled = prev.is_collateral_allowance_stage
        && (custom_collateral_allowance_amount_empty
            || custom_collateral_allowance_amount_exceeds_max_uint256
            || custom_collateral_allowance_amount_less_than_deposit_amount);

    let dai_allowance_progression_disabled = prev.is_dai_allowance_stage
        && (custom_dai_allowance_amount_empty
            || custom_dai_allowance_amount_exceeds_max_uint256
            || custom_dai_allowance_amount_less_than_payback_amount);

    let multiply_transition_disabled = prev.is_multiply_transition_stage && !account_is_controller;

    // regress is the way out of a failed transaction
    let is_failure_stage = stage.phase() == StagePhase::Failure;

    s.conditions = ManageVaultConditions {
        is_editing_stage: prev.is_editing_stage,
        is_proxy_stage: prev.is_proxy_stage,
        is_collateral_allowance_stage: prev.is_collateral_allowance_stage,
        is_dai_allowance_stage: prev.is_dai_allowance_stage,
        is_manage_stage: prev.is_manage_stage,
        is_multiply_transition_stage: prev.is_multiply_transition_stage,

        can_progress: false,
        can_regress: stage.can_regress(),

        deposit_and_withdraw_amounts_empty,
        generate_and_payback_amounts_empty,
        input_amounts_empty,

        vault_will_be_at_risk_level_warning,
        vault_will_be_at_risk_level_danger,
        vault_will_be_under_collateralized,
        vault_will_be_at_risk_level_warning_at_next_price,
        vault_will_be_at_risk_level_danger_at_next_price,
        vault_will_be_under_collateralized_at_next_price,

        account_is_connected,
        account_is_controller,

        depositing_all_eth_balance,
        deposit_amount_exceeds_collateral_balance,
        withdraw_amount_exceeds_free_collateral,
        withdraw_amount_exceeds_free_collateral_at_next_price,
        generate_amount_exceeds_dai_yield_from_total_collateral,
        generate_amount_exceeds_dai_yield_from_total_collateral_at_next_price,
        generate_amount_less_than_debt_floor,
        generate_amount_exceeds_debt_ceiling,
        payback_amount_exceeds_vault_debt,
        payback_amount_exceeds_dai_balance,

        debt_will_be_less_than_debt_floor,
        is_loading_stage,

        insufficient_collateral_allowance,
        custom_collateral_allowance_amount_empty,
        custom_collateral_allowance_amount_exceeds_max_uint256,
        custom_collateral_allowance_amount_less_than_deposit_amount,

        insufficient_dai_allowance,
        custom_dai_allowance_amount_empty,
        custom_dai_allowance_amount_exceeds_max_uint256,
        custom_dai_allowance_amount_less_than_payback_amount,

        withdraw_collateral_on_vault_under_debt_floor,
        deposit_collateral_on_vault_under_debt_floor,
    };

    let manage_blocked = manage_action_blocked(&s);
    let editing_progression_disabled =
        s.conditions.is_editing_stage && (input_amounts_empty || manage_blocked);
    let manage_progression_disabled =
        stage == ManageVaultStage::ManageWaitingForConfirmation && manage_blocked;

    s.conditions.can_progress = !(is_loading_stage
        || is_failure_stage
        || editing_progression_disabled
        || manage_progression_disabled
        || collateral_allowance_progression_disabled
        || dai_allowance_progression_disabled
        || multiply_transition_disabled);
    s
}

/// Inputs no manage transaction may be built from. Empty inputs are not
/// among them: the proxy and allowance steps stay reachable without amounts.
pub fn manage_action_blocked(s: &ManageVaultState) -> bool {
    let c = &s.conditions;
    s.environment.vault.controller.is_none()
        || !c.account_is_connected
        || c.vault_will_be_under_collateralized
        || c.vault_will_be_under_collateralized_at_next_price
        || c.debt_will_be_less_than_debt_floor
        || c.deposit_amount_exceeds_collateral_balance
        || c.withdraw_amount_exceeds_free_collateral
        || c.withdraw_amount_exceeds_free_collateral_at_next_price
        || c.depositing_all_eth_balance
        || c.generate_amount_exceeds_debt_ceiling
        || c.generate_amount_less_than_debt_floor
        || c.payback_amount_exceeds_dai_balance
        || c.payback_amount_exceeds_vault_debt
        || c.withdraw_collateral_on_vault_under_debt_floor
        || c.deposit_collateral_on_vault_under_debt_floor
}

/// Any validation error blocks progression
pub fn gate_progression(mut s: ManageVaultState) -> ManageVaultState {
    if !s.error_messages.is_empty() {
        s.conditions.can_progress = false;
    }
    s
}
