//! Stage transition engine
//!
//! Every function takes a state that went through `apply_pipeline` and
//! returns the next one. The caller re-runs the pipeline on the result.
//! Transitions that need a transaction return it as the follow-on action;
//! the stage moves to the waiting stage right away and transaction updates
//! are fed back through `apply_tx_update`.

use crate::conditions::{has_collateral_allowance, has_dai_allowance, manage_action_blocked};
use crate::math::or_zero;
use crate::stage::{ManageVaultStage, StageCategory, StagePhase};
use crate::state::{ManageVaultForm, ManageVaultState};
use crate::tx::{ManageVaultAction, TxState, TxStatus};
use log::debug;

/// Outcome of a user transition
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: ManageVaultState,
    pub action: Option<ManageVaultAction>,
}

impl Transition {
    fn stay(state: ManageVaultState) -> Self {
        Self {
            state,
            action: None,
        }
    }

    fn to(state: ManageVaultState, stage: ManageVaultStage) -> Self {
        Self::stay(move_to(state, stage))
    }

    /// Hand `action` to the issuer and wait for the wallet
    fn issue(mut state: ManageVaultState, action: ManageVaultAction) -> Self {
        let category = action.category();
        let waiting = ManageVaultStage::from_parts(category, StagePhase::WaitingForApproval)
            .or_else(|| ManageVaultStage::from_parts(category, StagePhase::InProgress));
        if let Some(stage) = waiting {
            state = move_to(state, stage);
        }
        state.tx.tx_error = None;
        Self {
            state,
            action: Some(action),
        }
    }
}

fn move_to(mut s: ManageVaultState, stage: ManageVaultStage) -> ManageVaultState {
    if s.stage != stage {
        debug!("stage {} -> {}", s.stage, stage);
        s.stage = stage;
    }
    s
}

/// First unmet requirement on the way to the manage transaction
fn next_requirement(s: &ManageVaultState) -> ManageVaultStage {
    if s.environment.proxy_address.is_none() {
        ManageVaultStage::ProxyWaitingForConfirmation
    } else {
        after_proxy(s)
    }
}

fn after_proxy(s: &ManageVaultState) -> ManageVaultStage {
    if !has_collateral_allowance(s) {
        ManageVaultStage::CollateralAllowanceWaitingForConfirmation
    } else {
        after_collateral_allowance(s)
    }
}

fn after_collateral_allowance(s: &ManageVaultState) -> ManageVaultStage {
    if !has_dai_allowance(s) {
        ManageVaultStage::DaiAllowanceWaitingForConfirmation
    } else {
        ManageVaultStage::ManageWaitingForConfirmation
    }
}

pub fn progress(s: ManageVaultState) -> Transition {
    use ManageVaultStage::*;

    if s.stage.is_loading() || s.stage.phase() == StagePhase::Failure {
        return Transition::stay(s);
    }
    let has_errors = !s.error_messages.is_empty();

    match s.stage {
        CollateralEditing | DaiEditing => {
            if has_errors {
                debug!("progress blocked by {} validation error(s)", s.error_messages.len());
                return Transition::stay(s);
            }
            if manage_action_blocked(&s) {
                debug!("progress blocked by vault conditions");
                return Transition::stay(s);
            }
            let next = next_requirement(&s);
            Transition::to(s, next)
        }

        ProxyWaitingForConfirmation => {
            if s.environment.proxy_address.is_some() {
                let next = after_proxy(&s);
                return Transition::to(s, next);
            }
            let owner = s.environment.account.clone();
            Transition::issue(s, ManageVaultAction::CreateProxy { owner })
        }
        ProxySuccess => {
            if s.environment.proxy_address.is_none() {
                debug!("proxy deployed, waiting for its address");
                return Transition::stay(s);
            }
            let next = after_proxy(&s);
            Transition::to(s, next)
        }

        CollateralAllowanceWaitingForConfirmation => {
            if has_errors {
                return Transition::stay(s);
            }
            let action = ManageVaultAction::ApproveCollateral {
                token: s.environment.vault.token.clone(),
                spender: s.environment.proxy_address.clone(),
                amount: or_zero(s.form.collateral_allowance_amount.as_ref()),
            };
            Transition::issue(s, action)
        }
        CollateralAllowanceSuccess => {
            let next = after_collateral_allowance(&s);
            Transition::to(s, next)
        }

        DaiAllowanceWaitingForConfirmation => {
            if has_errors {
                return Transition::stay(s);
            }
            let action = ManageVaultAction::ApproveDai {
                spender: s.environment.proxy_address.clone(),
                amount: or_zero(s.form.dai_allowance_amount.as_ref()),
            };
            Transition::issue(s, action)
        }
        DaiAllowanceSuccess => Transition::to(s, ManageWaitingForConfirmation),

        ManageWaitingForConfirmation => {
            // inputs may have changed since editing
            if has_errors || manage_action_blocked(&s) {
                return Transition::stay(s);
            }
            let action = ManageVaultAction::manage(&s);
            Transition::issue(s, action)
        }
        ManageSuccess => {
            let mut s = s;
            s.form = ManageVaultForm::default();
            let editing = s.original_editing_stage.into();
            Transition::to(s, editing)
        }

        MultiplyTransitionEditing => {
            if !s.conditions.account_is_controller {
                return Transition::stay(s);
            }
            Transition::to(s, MultiplyTransitionWaitingForConfirmation)
        }
        MultiplyTransitionWaitingForConfirmation => {
            if !s.conditions.account_is_controller {
                return Transition::stay(s);
            }
            let vault = &s.environment.vault;
            let action = ManageVaultAction::ConvertToMultiply {
                id: vault.id,
                ilk: vault.ilk.clone(),
                proxy_address: s.environment.proxy_address.clone(),
            };
            Transition::issue(s, action)
        }

        // loading and failure stages returned above
        ProxyWaitingForApproval
        | ProxyInProgress
        | ProxyFailure
        | CollateralAllowanceWaitingForApproval
        | CollateralAllowanceInProgress
        | CollateralAllowanceFailure
        | DaiAllowanceWaitingForApproval
        | DaiAllowanceInProgress
        | DaiAllowanceFailure
        | ManageWaitingForApproval
        | ManageInProgress
        | ManageFailure
        | MultiplyTransitionInProgress
        | MultiplyTransitionFailure
        | MultiplyTransitionSuccess => Transition::stay(s),
    }
}

pub fn regress(s: ManageVaultState) -> ManageVaultState {
    use ManageVaultStage::*;

    if !s.stage.can_regress() {
        return s;
    }
    let editing = ManageVaultStage::from(s.original_editing_stage);
    let target = match s.stage {
        ProxyWaitingForConfirmation
        | CollateralAllowanceWaitingForConfirmation
        | DaiAllowanceWaitingForConfirmation
        | ManageWaitingForConfirmation
        | MultiplyTransitionEditing => editing,
        MultiplyTransitionWaitingForConfirmation => MultiplyTransitionEditing,
        failure => ManageVaultStage::from_parts(failure.category(), StagePhase::WaitingForConfirmation)
            .unwrap_or(editing),
    };
    move_to(s, target)
}

/// Switch between the collateral and debt editing stages with a fresh form
pub fn toggle_editing(mut s: ManageVaultState) -> ManageVaultState {
    if s.stage.is_loading() {
        return s;
    }
    let current = s.stage.as_editing().unwrap_or(s.original_editing_stage);
    let next = current.other();
    s.original_editing_stage = next;
    s.form = ManageVaultForm::default();
    move_to(s, next.into())
}

pub fn enter_multiply_transition(s: ManageVaultState) -> ManageVaultState {
    if s.stage.category() != StageCategory::Editing {
        return s;
    }
    move_to(s, ManageVaultStage::MultiplyTransitionEditing)
}

/// Reset pending inputs, keeping the stage
pub fn clear_form(mut s: ManageVaultState) -> ManageVaultState {
    s.form = ManageVaultForm::default();
    s
}

/// Fold a transaction update into the state.
///
/// Updates for a category other than the current stage's, or arriving
/// when the stage no longer waits on a transaction, are ignored.
pub fn apply_tx_update(
    mut s: ManageVaultState,
    category: StageCategory,
    update: &TxState,
) -> ManageVaultState {
    let waiting = matches!(
        s.stage.phase(),
        StagePhase::WaitingForApproval | StagePhase::InProgress
    );
    if s.stage.category() != category || !waiting {
        debug!("dropping {:?} update for {:?} in {}", update.status, category, s.stage);
        return s;
    }

    if let Some(hash) = &update.tx_hash {
        let slot = match category {
            StageCategory::Proxy => &mut s.tx.proxy_tx_hash,
            StageCategory::CollateralAllowance => &mut s.tx.collateral_allowance_tx_hash,
            StageCategory::DaiAllowance => &mut s.tx.dai_allowance_tx_hash,
            StageCategory::Manage => &mut s.tx.manage_tx_hash,
            StageCategory::MultiplyTransition => &mut s.tx.multiply_transition_tx_hash,
            StageCategory::Editing => return s,
        };
        *slot = Some(hash.clone());
    }

    let stage_for = |phase| ManageVaultStage::from_parts(category, phase);
    let target = match &update.status {
        TxStatus::WaitingForApproval => {
            stage_for(StagePhase::WaitingForApproval).or_else(|| stage_for(StagePhase::InProgress))
        }
        TxStatus::Propagating | TxStatus::WaitingForConfirmation => {
            stage_for(StagePhase::InProgress)
        }
        TxStatus::Success => {
            if category == StageCategory::Proxy {
                s.tx.proxy_confirmations = Some(update.confirmations);
            }
            if update.confirmations >= s.tx.safe_confirmations {
                match category {
                    StageCategory::CollateralAllowance => {
                        s.environment.collateral_allowance = s.form.collateral_allowance_amount.clone();
                    }
                    StageCategory::DaiAllowance => {
                        s.environment.dai_allowance = s.form.dai_allowance_amount.clone();
                    }
                    _ => {}
                }
                stage_for(StagePhase::Success)
            } else {
                stage_for(StagePhase::InProgress)
            }
        }
        TxStatus::CancelledByTheUser | TxStatus::Error { .. } | TxStatus::Failure { .. } => {
            s.tx.tx_error = update.failure_reason();
            stage_for(StagePhase::Failure)
        }
    };

    match target {
        Some(stage) => move_to(s, stage),
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply_pipeline;
    use crate::math::Amount;
    use crate::state::{Address, BalanceInfo, Environment, IlkData, PriceInfo, Vault};
    use crate::stage::EditingStage;
    use std::str::FromStr;

    fn dec(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn session(proxy: Option<&str>) -> ManageVaultState {
        let environment = Environment {
            vault: Vault {
                id: 42,
                ilk: "WBTC-A".to_string(),
                token: "WBTC".to_string(),
                controller: Some(Address::new("0xowner")),
                locked_collateral: dec("10"),
                debt: dec("3000"),
                ..Vault::default()
            },
            ilk_data: IlkData {
                liquidation_ratio: dec("1.5"),
                collateralization_danger_threshold: dec("2"),
                collateralization_warning_threshold: dec("2.5"),
                debt_available: dec("100000"),
                debt_floor: dec("2000"),
                ..IlkData::default()
            },
            price_info: PriceInfo {
                current_collateral_price: dec("1000"),
                next_collateral_price: dec("1000"),
                is_static_collateral_price: true,
            },
            balance_info: BalanceInfo {
                collateral_balance: dec("100"),
                dai_balance: dec("10000"),
            },
            account: Some(Address::new("0xowner")),
            proxy_address: proxy.map(Address::new),
            ..Environment::default()
        };
        apply_pipeline(ManageVaultState::new(environment, 1))
    }

    fn progressed(s: ManageVaultState) -> (ManageVaultState, Option<ManageVaultAction>) {
        let Transition { state, action } = progress(apply_pipeline(s));
        (apply_pipeline(state), action)
    }

    #[test]
    fn test_editing_without_proxy_goes_to_proxy() {
        let (s, action) = progressed(session(None));
        assert_eq!(s.stage, ManageVaultStage::ProxyWaitingForConfirmation);
        assert!(s.conditions.is_proxy_stage);
        assert_eq!(action, None);
    }

    #[test]
    fn test_editing_with_proxy_goes_to_manage() {
        let (s, _) = progressed(session(Some("0xProxyAddress")));
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForConfirmation);
        assert!(s.conditions.is_manage_stage);
    }

    #[test]
    fn test_validation_errors_block_editing_progress() {
        let mut s = session(Some("0xproxy"));
        s.form.update_generate(Some(dec("200000")));
        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
    }

    /// Withdrawal that is safe at the current price but not at the next one
    fn unsafe_at_next_price() -> ManageVaultState {
        let mut s = session(Some("0xproxy"));
        s.environment.price_info.next_collateral_price = dec("600");
        s.form.update_withdraw(Some(dec("4")));
        s
    }

    #[test]
    fn test_vault_conditions_block_editing_progress() {
        let (s, action) = progressed(unsafe_at_next_price());
        assert!(s.error_messages.is_empty());
        assert!(s.conditions.vault_will_be_under_collateralized_at_next_price);
        assert!(!s.conditions.can_progress);
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
        assert_eq!(action, None);
    }

    #[test]
    fn test_vault_conditions_block_manage_transaction() {
        let mut s = unsafe_at_next_price();
        s.stage = ManageVaultStage::ManageWaitingForConfirmation;
        let s = apply_pipeline(s);
        assert!(!s.conditions.can_progress);

        let (s, action) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForConfirmation);
        assert_eq!(action, None);

        let mut s = s;
        s.form.update_withdraw(Some(dec("2")));
        let (s, action) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForApproval);
        assert!(matches!(action, Some(ManageVaultAction::WithdrawAndPayback { .. })));
    }

    #[test]
    fn test_missing_controller_blocks_editing_progress() {
        let mut s = session(Some("0xproxy"));
        s.environment.vault.controller = None;
        s.form.update_deposit(Some(dec("1")));
        let (s, action) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
        assert_eq!(action, None);
    }

    #[test]
    fn test_editing_routes_to_missing_allowances() {
        let mut s = session(Some("0xproxy"));
        s.form.update_deposit(Some(dec("1")));
        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::CollateralAllowanceWaitingForConfirmation);

        let mut s = session(Some("0xproxy"));
        s.form.update_payback(Some(dec("100")));
        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::DaiAllowanceWaitingForConfirmation);
    }

    #[test]
    fn test_proxy_confirmation_issues_create_proxy() {
        let (s, _) = progressed(session(None));
        let (s, action) = progressed(s);
        assert_eq!(
            action,
            Some(ManageVaultAction::CreateProxy {
                owner: Some(Address::new("0xowner"))
            })
        );
        assert_eq!(s.stage, ManageVaultStage::ProxyWaitingForApproval);
        assert!(!s.conditions.can_progress);
    }

    #[test]
    fn test_proxy_confirmation_skips_deployment_when_proxy_known() {
        let (mut s, _) = progressed(session(None));
        s.environment.proxy_address = Some(Address::new("0xproxy"));
        let (s, action) = progressed(s);
        assert_eq!(action, None);
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForConfirmation);
    }

    #[test]
    fn test_manage_transaction_lifecycle() {
        let mut s = session(Some("0xproxy"));
        s.tx.safe_confirmations = 2;
        s.form.update_generate(Some(dec("1000")));
        let (s, _) = progressed(s);
        let (s, action) = progressed(s);
        assert!(matches!(
            action,
            Some(ManageVaultAction::DepositAndGenerate { .. })
        ));
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForApproval);

        let s = apply_tx_update(
            s,
            StageCategory::Manage,
            &TxState::new(TxStatus::Propagating).with_hash("0xabc"),
        );
        assert_eq!(s.stage, ManageVaultStage::ManageInProgress);
        assert_eq!(s.tx.manage_tx_hash.as_deref(), Some("0xabc"));

        let s = apply_tx_update(
            s,
            StageCategory::Manage,
            &TxState::new(TxStatus::Success).with_confirmations(1),
        );
        assert_eq!(s.stage, ManageVaultStage::ManageInProgress);

        let s = apply_tx_update(
            s,
            StageCategory::Manage,
            &TxState::new(TxStatus::Success).with_confirmations(2),
        );
        assert_eq!(s.stage, ManageVaultStage::ManageSuccess);

        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
        assert_eq!(s.form, ManageVaultForm::default());
    }

    #[test]
    fn test_failure_is_recovered_by_regress_only() {
        let (s, _) = progressed(session(Some("0xproxy")));
        let (s, _) = progressed(s);
        let s = apply_pipeline(apply_tx_update(
            s,
            StageCategory::Manage,
            &TxState::new(TxStatus::Failure {
                reason: "reverted".to_string(),
            }),
        ));
        assert_eq!(s.stage, ManageVaultStage::ManageFailure);
        assert_eq!(s.tx.tx_error.as_deref(), Some("reverted"));
        assert!(!s.conditions.can_progress);
        assert!(s.conditions.can_regress);

        let (s, action) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::ManageFailure);
        assert_eq!(action, None);

        let s = regress(s);
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForConfirmation);
        let s = regress(s);
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
    }

    #[test]
    fn test_regress_is_ignored_while_loading() {
        let mut s = session(None);
        s.stage = ManageVaultStage::ProxyInProgress;
        assert_eq!(regress(s).stage, ManageVaultStage::ProxyInProgress);
    }

    #[test]
    fn test_allowance_success_records_allowance() {
        let mut s = session(Some("0xproxy"));
        s.form.update_deposit(Some(dec("2")));
        let (mut s, _) = progressed(s);
        s.form.set_collateral_allowance_option(crate::state::AllowanceOption::DepositAmount);
        let (s, action) = progressed(s);
        assert_eq!(
            action,
            Some(ManageVaultAction::ApproveCollateral {
                token: "WBTC".to_string(),
                spender: Some(Address::new("0xproxy")),
                amount: dec("2"),
            })
        );
        let s = apply_tx_update(
            s,
            StageCategory::CollateralAllowance,
            &TxState::new(TxStatus::Success).with_confirmations(1),
        );
        assert_eq!(s.stage, ManageVaultStage::CollateralAllowanceSuccess);
        assert_eq!(s.environment.collateral_allowance, Some(dec("2")));

        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForConfirmation);
    }

    #[test]
    fn test_updates_for_other_categories_are_dropped() {
        let (s, _) = progressed(session(None));
        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::ProxyWaitingForApproval);
        let after = apply_tx_update(
            s.clone(),
            StageCategory::Manage,
            &TxState::new(TxStatus::Success).with_confirmations(5),
        );
        assert_eq!(after, s);
    }

    #[test]
    fn test_cancelled_by_user_fails_the_stage() {
        let (s, _) = progressed(session(None));
        let (s, _) = progressed(s);
        let s = apply_tx_update(
            s,
            StageCategory::Proxy,
            &TxState::new(TxStatus::CancelledByTheUser),
        );
        assert_eq!(s.stage, ManageVaultStage::ProxyFailure);
        assert!(s.tx.tx_error.is_some());
    }

    #[test]
    fn test_toggle_editing_twice() {
        let mut s = session(None);
        s.form.update_deposit(Some(dec("1")));
        let s = toggle_editing(s);
        assert_eq!(s.stage, ManageVaultStage::DaiEditing);
        assert_eq!(s.original_editing_stage, EditingStage::DaiEditing);
        assert_eq!(s.form, ManageVaultForm::default());

        let mut s = s;
        s.form.update_payback(Some(dec("1")));
        let s = toggle_editing(s);
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
        assert_eq!(s.original_editing_stage, EditingStage::CollateralEditing);
        assert_eq!(s.form, ManageVaultForm::default());
    }

    #[test]
    fn test_multiply_transition_branch() {
        let s = enter_multiply_transition(session(Some("0xproxy")));
        assert_eq!(s.stage, ManageVaultStage::MultiplyTransitionEditing);

        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::MultiplyTransitionWaitingForConfirmation);
        assert_eq!((s.total_steps, s.current_step), (2, 2));

        let (s, action) = progressed(s);
        assert!(matches!(
            action,
            Some(ManageVaultAction::ConvertToMultiply { id: 42, .. })
        ));
        assert_eq!(s.stage, ManageVaultStage::MultiplyTransitionInProgress);

        let s = apply_tx_update(
            s,
            StageCategory::MultiplyTransition,
            &TxState::new(TxStatus::Error {
                reason: "nope".to_string(),
            }),
        );
        assert_eq!(s.stage, ManageVaultStage::MultiplyTransitionFailure);
        let s = regress(regress(regress(s)));
        assert_eq!(s.stage, ManageVaultStage::CollateralEditing);
    }

    #[test]
    fn test_multiply_transition_requires_controller() {
        let mut s = enter_multiply_transition(session(Some("0xproxy")));
        s.environment.account = Some(Address::new("0xintruder"));
        let (s, _) = progressed(s);
        assert_eq!(s.stage, ManageVaultStage::MultiplyTransitionEditing);
    }

    #[test]
    fn test_clear_keeps_stage() {
        let (mut s, _) = progressed(session(Some("0xproxy")));
        s.form.update_generate(Some(dec("5")));
        let s = clear_form(s);
        assert_eq!(s.stage, ManageVaultStage::ManageWaitingForConfirmation);
        assert_eq!(s.form.generate_amount, None);
    }
}
