//! Transactions requested by the flow and the statuses reported back

use crate::math::Amount;
use crate::stage::StageCategory;
use crate::state::{Address, ManageVaultState};
use serde::{Deserialize, Serialize};

/// Follow-on action a transition asks the transaction issuer to perform
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ManageVaultAction {
    CreateProxy {
        owner: Option<Address>,
    },
    #[serde(rename_all = "camelCase")]
    ApproveCollateral {
        token: String,
        spender: Option<Address>,
        amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    ApproveDai {
        spender: Option<Address>,
        amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    DepositAndGenerate {
        id: u64,
        ilk: String,
        token: String,
        proxy_address: Option<Address>,
        deposit_amount: Amount,
        generate_amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    WithdrawAndPayback {
        id: u64,
        ilk: String,
        token: String,
        proxy_address: Option<Address>,
        withdraw_amount: Amount,
        payback_amount: Amount,
        should_payback_all: bool,
    },
    #[serde(rename_all = "camelCase")]
    ConvertToMultiply {
        id: u64,
        ilk: String,
        proxy_address: Option<Address>,
    },
}

impl ManageVaultAction {
    /// Stage category whose stages track this transaction
    pub fn category(&self) -> StageCategory {
        match self {
            ManageVaultAction::CreateProxy { .. } => StageCategory::Proxy,
            ManageVaultAction::ApproveCollateral { .. } => StageCategory::CollateralAllowance,
            ManageVaultAction::ApproveDai { .. } => StageCategory::DaiAllowance,
            ManageVaultAction::DepositAndGenerate { .. }
            | ManageVaultAction::WithdrawAndPayback { .. } => StageCategory::Manage,
            ManageVaultAction::ConvertToMultiply { .. } => StageCategory::MultiplyTransition,
        }
    }

    /// The manage transaction for the pending form: deposit-and-generate
    /// when either of those is set, withdraw-and-payback otherwise.
    pub fn manage(state: &ManageVaultState) -> Self {
        let vault = &state.environment.vault;
        let form = &state.form;
        let proxy_address = state.environment.proxy_address.clone();
        if form.deposit_amount.is_some() || form.generate_amount.is_some() {
            ManageVaultAction::DepositAndGenerate {
                id: vault.id,
                ilk: vault.ilk.clone(),
                token: vault.token.clone(),
                proxy_address,
                deposit_amount: crate::math::or_zero(form.deposit_amount.as_ref()),
                generate_amount: crate::math::or_zero(form.generate_amount.as_ref()),
            }
        } else {
            ManageVaultAction::WithdrawAndPayback {
                id: vault.id,
                ilk: vault.ilk.clone(),
                token: vault.token.clone(),
                proxy_address,
                withdraw_amount: crate::math::or_zero(form.withdraw_amount.as_ref()),
                payback_amount: crate::math::or_zero(form.payback_amount.as_ref()),
                should_payback_all: form.should_payback_all,
            }
        }
    }
}

/// Status reported by the transaction issuer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TxStatus {
    WaitingForApproval,
    CancelledByTheUser,
    Propagating,
    WaitingForConfirmation,
    Success,
    Error { reason: String },
    Failure { reason: String },
}

/// One update of a submitted transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxState {
    #[serde(flatten)]
    pub status: TxStatus,
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub confirmations: u32,
}

impl TxState {
    pub fn new(status: TxStatus) -> Self {
        Self {
            status,
            tx_hash: None,
            confirmations: 0,
        }
    }

    pub fn with_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_confirmations(mut self, confirmations: u32) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Reason to surface when the transaction did not go through
    pub fn failure_reason(&self) -> Option<String> {
        match &self.status {
            TxStatus::CancelledByTheUser => Some("cancelled by the user".to_string()),
            TxStatus::Error { reason } | TxStatus::Failure { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}
