//! Stage identifiers of the manage-vault flow

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("unknown manage vault stage: {0}")]
    Unknown(String),
}

/// Every stage the flow can be in.
///
/// The set is closed: values arriving from outside the process (config,
/// serialized snapshots) go through `FromStr`/serde, which reject anything
/// not listed here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ManageVaultStage {
    #[default]
    CollateralEditing,
    DaiEditing,

    ProxyWaitingForConfirmation,
    ProxyWaitingForApproval,
    ProxyInProgress,
    ProxyFailure,
    ProxySuccess,

    CollateralAllowanceWaitingForConfirmation,
    CollateralAllowanceWaitingForApproval,
    CollateralAllowanceInProgress,
    CollateralAllowanceFailure,
    CollateralAllowanceSuccess,

    DaiAllowanceWaitingForConfirmation,
    DaiAllowanceWaitingForApproval,
    DaiAllowanceInProgress,
    DaiAllowanceFailure,
    DaiAllowanceSuccess,

    ManageWaitingForConfirmation,
    ManageWaitingForApproval,
    ManageInProgress,
    ManageFailure,
    ManageSuccess,

    MultiplyTransitionEditing,
    MultiplyTransitionWaitingForConfirmation,
    MultiplyTransitionInProgress,
    MultiplyTransitionFailure,
    MultiplyTransitionSuccess,
}

/// Which part of the flow a stage belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageCategory {
    Editing,
    Proxy,
    CollateralAllowance,
    DaiAllowance,
    Manage,
    MultiplyTransition,
}

/// Position of a stage inside its category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StagePhase {
    Editing,
    WaitingForConfirmation,
    WaitingForApproval,
    InProgress,
    Failure,
    Success,
}

/// The two stages a session returns to after a flow completes or is abandoned
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditingStage {
    #[default]
    CollateralEditing,
    DaiEditing,
}

impl EditingStage {
    pub fn other(self) -> Self {
        match self {
            EditingStage::CollateralEditing => EditingStage::DaiEditing,
            EditingStage::DaiEditing => EditingStage::CollateralEditing,
        }
    }
}

impl From<EditingStage> for ManageVaultStage {
    fn from(stage: EditingStage) -> Self {
        match stage {
            EditingStage::CollateralEditing => ManageVaultStage::CollateralEditing,
            EditingStage::DaiEditing => ManageVaultStage::DaiEditing,
        }
    }
}

impl ManageVaultStage {
    pub const ALL: [ManageVaultStage; 27] = [
        ManageVaultStage::CollateralEditing,
        ManageVaultStage::DaiEditing,
        ManageVaultStage::ProxyWaitingForConfirmation,
        ManageVaultStage::ProxyWaitingForApproval,
        ManageVaultStage::ProxyInProgress,
        ManageVaultStage::ProxyFailure,
        ManageVaultStage::ProxySuccess,
        ManageVaultStage::CollateralAllowanceWaitingForConfirmation,
        ManageVaultStage::CollateralAllowanceWaitingForApproval,
        ManageVaultStage::CollateralAllowanceInProgress,
        ManageVaultStage::CollateralAllowanceFailure,
        ManageVaultStage::CollateralAllowanceSuccess,
        ManageVaultStage::DaiAllowanceWaitingForConfirmation,
        ManageVaultStage::DaiAllowanceWaitingForApproval,
        ManageVaultStage::DaiAllowanceInProgress,
        ManageVaultStage::DaiAllowanceFailure,
        ManageVaultStage::DaiAllowanceSuccess,
        ManageVaultStage::ManageWaitingForConfirmation,
        ManageVaultStage::ManageWaitingForApproval,
        ManageVaultStage::ManageInProgress,
        ManageVaultStage::ManageFailure,
        ManageVaultStage::ManageSuccess,
        ManageVaultStage::MultiplyTransitionEditing,
        ManageVaultStage::MultiplyTransitionWaitingForConfirmation,
        ManageVaultStage::MultiplyTransitionInProgress,
        ManageVaultStage::MultiplyTransitionFailure,
        ManageVaultStage::MultiplyTransitionSuccess,
    ];

    pub fn as_str(self) -> &'static str {
        use ManageVaultStage::*;
        match self {
            CollateralEditing => "collateralEditing",
            DaiEditing => "daiEditing",
            ProxyWaitingForConfirmation => "proxyWaitingForConfirmation",
            ProxyWaitingForApproval => "proxyWaitingForApproval",
            ProxyInProgress => "proxyInProgress",
            ProxyFailure => "proxyFailure",
            ProxySuccess => "proxySuccess",
            CollateralAllowanceWaitingForConfirmation => "collateralAllowanceWaitingForConfirmation",
            CollateralAllowanceWaitingForApproval => "collateralAllowanceWaitingForApproval",
            CollateralAllowanceInProgress => "collateralAllowanceInProgress",
            CollateralAllowanceFailure => "collateralAllowanceFailure",
            CollateralAllowanceSuccess => "collateralAllowanceSuccess",
            DaiAllowanceWaitingForConfirmation => "daiAllowanceWaitingForConfirmation",
            DaiAllowanceWaitingForApproval => "daiAllowanceWaitingForApproval",
            DaiAllowanceInProgress => "daiAllowanceInProgress",
            DaiAllowanceFailure => "daiAllowanceFailure",
            DaiAllowanceSuccess => "daiAllowanceSuccess",
            ManageWaitingForConfirmation => "manageWaitingForConfirmation",
            ManageWaitingForApproval => "manageWaitingForApproval",
            ManageInProgress => "manageInProgress",
            ManageFailure => "manageFailure",
            ManageSuccess => "manageSuccess",
            MultiplyTransitionEditing => "multiplyTransitionEditing",
            MultiplyTransitionWaitingForConfirmation => "multiplyTransitionWaitingForConfirmation",
            MultiplyTransitionInProgress => "multiplyTransitionInProgress",
            MultiplyTransitionFailure => "multiplyTransitionFailure",
            MultiplyTransitionSuccess => "multiplyTransitionSuccess",
        }
    }

    pub fn category(self) -> StageCategory {
        use ManageVaultStage::*;
        match self {
            CollateralEditing | DaiEditing => StageCategory::Editing,
            ProxyWaitingForConfirmation | ProxyWaitingForApproval | ProxyInProgress
            | ProxyFailure | ProxySuccess => StageCategory::Proxy,
            CollateralAllowanceWaitingForConfirmation
            | CollateralAllowanceWaitingForApproval
            | CollateralAllowanceInProgress
            | CollateralAllowanceFailure
            | CollateralAllowanceSuccess => StageCategory::CollateralAllowance,
            DaiAllowanceWaitingForConfirmation
            | DaiAllowanceWaitingForApproval
            | DaiAllowanceInProgress
            | DaiAllowanceFailure
            | DaiAllowanceSuccess => StageCategory::DaiAllowance,
            ManageWaitingForConfirmation | ManageWaitingForApproval | ManageInProgress
            | ManageFailure | ManageSuccess => StageCategory::Manage,
            MultiplyTransitionEditing
            | MultiplyTransitionWaitingForConfirmation
            | MultiplyTransitionInProgress
            | MultiplyTransitionFailure
            | MultiplyTransitionSuccess => StageCategory::MultiplyTransition,
        }
    }

    pub fn phase(self) -> StagePhase {
        use ManageVaultStage::*;
        match self {
            CollateralEditing | DaiEditing | MultiplyTransitionEditing => StagePhase::Editing,
            ProxyWaitingForConfirmation
            | CollateralAllowanceWaitingForConfirmation
            | DaiAllowanceWaitingForConfirmation
            | ManageWaitingForConfirmation
            | MultiplyTransitionWaitingForConfirmation => StagePhase::WaitingForConfirmation,
            ProxyWaitingForApproval
            | CollateralAllowanceWaitingForApproval
            | DaiAllowanceWaitingForApproval
            | ManageWaitingForApproval => StagePhase::WaitingForApproval,
            ProxyInProgress
            | CollateralAllowanceInProgress
            | DaiAllowanceInProgress
            | ManageInProgress
            | MultiplyTransitionInProgress => StagePhase::InProgress,
            ProxyFailure
            | CollateralAllowanceFailure
            | DaiAllowanceFailure
            | ManageFailure
            | MultiplyTransitionFailure => StagePhase::Failure,
            ProxySuccess
            | CollateralAllowanceSuccess
            | DaiAllowanceSuccess
            | ManageSuccess
            | MultiplyTransitionSuccess => StagePhase::Success,
        }
    }

    /// Compose a stage from its category and phase.
    ///
    /// Returns `None` for combinations that do not exist, e.g. an editing
    /// phase inside the proxy category or approval inside the multiply
    /// transition branch. `(Editing, Editing)` is ambiguous and also `None`.
    pub fn from_parts(category: StageCategory, phase: StagePhase) -> Option<Self> {
        ManageVaultStage::ALL
            .iter()
            .copied()
            .filter(|s| s.category() != StageCategory::Editing)
            .find(|s| s.category() == category && s.phase() == phase)
    }

    /// Editing stage this value represents, if any
    pub fn as_editing(self) -> Option<EditingStage> {
        match self {
            ManageVaultStage::CollateralEditing => Some(EditingStage::CollateralEditing),
            ManageVaultStage::DaiEditing => Some(EditingStage::DaiEditing),
            _ => None,
        }
    }

    /// Stages waiting on the wallet or the chain; no user action applies
    pub fn is_loading(self) -> bool {
        use ManageVaultStage::*;
        matches!(
            self,
            ProxyInProgress
                | ProxyWaitingForApproval
                | CollateralAllowanceWaitingForApproval
                | CollateralAllowanceInProgress
                | DaiAllowanceWaitingForApproval
                | DaiAllowanceInProgress
                | ManageInProgress
                | ManageWaitingForApproval
                | MultiplyTransitionInProgress
                | MultiplyTransitionSuccess
        )
    }

    pub fn can_regress(self) -> bool {
        use ManageVaultStage::*;
        matches!(
            self,
            ProxyWaitingForConfirmation
                | ProxyFailure
                | CollateralAllowanceWaitingForConfirmation
                | CollateralAllowanceFailure
                | DaiAllowanceWaitingForConfirmation
                | DaiAllowanceFailure
                | ManageWaitingForConfirmation
                | ManageFailure
                | MultiplyTransitionEditing
                | MultiplyTransitionWaitingForConfirmation
                | MultiplyTransitionFailure
        )
    }
}

impl fmt::Display for ManageVaultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManageVaultStage {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManageVaultStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| StageError::Unknown(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip_for_every_stage() {
        for stage in ManageVaultStage::ALL {
            assert_eq!(stage.as_str().parse::<ManageVaultStage>(), Ok(stage));
        }
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert_eq!(
            "manageSomething".parse::<ManageVaultStage>(),
            Err(StageError::Unknown("manageSomething".to_string()))
        );
        let parsed: Result<ManageVaultStage, _> = serde_json::from_str("\"openVault\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_serde_uses_stage_names() {
        let json = serde_json::to_string(&ManageVaultStage::DaiAllowanceInProgress).unwrap();
        assert_eq!(json, "\"daiAllowanceInProgress\"");
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            ManageVaultStage::from_parts(StageCategory::Proxy, StagePhase::InProgress),
            Some(ManageVaultStage::ProxyInProgress)
        );
        assert_eq!(
            ManageVaultStage::from_parts(
                StageCategory::MultiplyTransition,
                StagePhase::WaitingForApproval
            ),
            None
        );
        assert_eq!(
            ManageVaultStage::from_parts(StageCategory::Editing, StagePhase::Editing),
            None
        );
        for stage in ManageVaultStage::ALL {
            if stage.category() != StageCategory::Editing {
                assert_eq!(
                    ManageVaultStage::from_parts(stage.category(), stage.phase()),
                    Some(stage)
                );
            }
        }
    }

    #[test]
    fn test_loading_and_regress_sets_are_disjoint() {
        for stage in ManageVaultStage::ALL {
            assert!(!(stage.is_loading() && stage.can_regress()), "{stage}");
        }
    }
}
