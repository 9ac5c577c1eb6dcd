//! Input predicates and invariant checking helpers

use crate::math::is_zero_or_none;
use crate::state::*;

/// Deposit and withdraw are both absent or zero
pub fn deposit_and_withdraw_amounts_empty(form: &ManageVaultForm) -> bool {
    is_zero_or_none(form.deposit_amount.as_ref()) && is_zero_or_none(form.withdraw_amount.as_ref())
}

/// Generate and payback are both absent or zero
pub fn generate_and_payback_amounts_empty(form: &ManageVaultForm) -> bool {
    is_zero_or_none(form.generate_amount.as_ref()) && is_zero_or_none(form.payback_amount.as_ref())
}

/// No input moves collateral or debt. Shared by the risk flags and the
/// under-collateralization error so both agree on zero amounts.
pub fn input_amounts_empty(form: &ManageVaultForm) -> bool {
    deposit_and_withdraw_amounts_empty(form) && generate_and_payback_amounts_empty(form)
}

/// At most one current-price risk level is raised
pub fn risk_levels_exclusive(s: &ManageVaultState) -> bool {
    let c = &s.conditions;
    let raised = [
        c.vault_will_be_under_collateralized,
        c.vault_will_be_at_risk_level_danger,
        c.vault_will_be_at_risk_level_warning,
    ];
    raised.iter().filter(|flag| **flag).count() <= 1
}

/// A next-price risk flag is never raised together with its current-price
/// counterpart
pub fn next_price_flags_incremental(s: &ManageVaultState) -> bool {
    let c = &s.conditions;
    !(c.vault_will_be_under_collateralized && c.vault_will_be_under_collateralized_at_next_price)
        && !(c.vault_will_be_at_risk_level_danger
            && c.vault_will_be_at_risk_level_danger_at_next_price)
        && !(c.vault_will_be_at_risk_level_warning
            && c.vault_will_be_at_risk_level_warning_at_next_price)
}

/// Empty inputs raise no risk flag at either price
pub fn empty_inputs_carry_no_risk(s: &ManageVaultState) -> bool {
    let c = &s.conditions;
    if !c.input_amounts_empty {
        return true;
    }
    !(c.vault_will_be_under_collateralized
        || c.vault_will_be_at_risk_level_danger
        || c.vault_will_be_at_risk_level_warning
        || c.vault_will_be_under_collateralized_at_next_price
        || c.vault_will_be_at_risk_level_danger_at_next_price
        || c.vault_will_be_at_risk_level_warning_at_next_price)
}

/// Loading stages never accept progress or regress
pub fn loading_stages_locked(s: &ManageVaultState) -> bool {
    if !s.conditions.is_loading_stage {
        return true;
    }
    !s.conditions.can_progress && !s.conditions.can_regress
}

/// Any validation error blocks progression
pub fn errors_block_progress(s: &ManageVaultState) -> bool {
    s.error_messages.is_empty() || !s.conditions.can_progress
}

/// Step counter stays within the progress indicator
pub fn steps_in_range(s: &ManageVaultState) -> bool {
    (1..=3).contains(&s.total_steps) && (1..=s.total_steps).contains(&s.current_step)
}

/// Derived fields unchanged between two states
pub fn derived_unchanged(before: &ManageVaultState, after: &ManageVaultState) -> bool {
    before.calculations == after.calculations
        && before.conditions == after.conditions
        && before.warning_messages == after.warning_messages
        && before.error_messages == after.error_messages
        && before.total_steps == after.total_steps
        && before.current_step == after.current_step
}

/// Every invariant that holds for a state fresh out of `apply_pipeline`
pub fn pipeline_invariants_hold(s: &ManageVaultState) -> bool {
    risk_levels_exclusive(s)
        && next_price_flags_incremental(s)
        && empty_inputs_carry_no_risk(s)
        && loading_stages_locked(s)
        && errors_block_progress(s)
        && steps_in_range(s)
}
