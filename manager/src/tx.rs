//! Transaction submission

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use vault_model::{Address, ManageVaultAction, StageCategory, TxState, TxStatus};

/// Context attached to every submitted transaction
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    pub kind: StageCategory,
    pub account: Option<Address>,
    pub vault_id: u64,
}

/// Write side of the chain: submits an action and reports its progress
pub trait TransactionIssuer: Send + Sync + 'static {
    fn send(&self, action: &ManageVaultAction, meta: TxMeta) -> BoxStream<'static, TxState>;
}

/// How every simulated transaction ends
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SimulatedOutcome {
    /// Mined, reporting one update per confirmation
    Success { confirmations: u32 },
    /// Mined and reverted
    Failure { reason: String },
    /// Rejected in the wallet
    Rejected,
}

impl Default for SimulatedOutcome {
    fn default() -> Self {
        SimulatedOutcome::Success { confirmations: 1 }
    }
}

/// Issuer that answers every action with a scripted status sequence
pub struct SimulatedIssuer {
    outcome: Mutex<SimulatedOutcome>,
    nonce: AtomicU64,
    sent: Mutex<Vec<(ManageVaultAction, TxMeta)>>,
}

impl SimulatedIssuer {
    pub fn new(outcome: SimulatedOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            nonce: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_outcome(&self, outcome: SimulatedOutcome) {
        *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = outcome;
    }

    /// Actions received so far, oldest first
    pub fn sent(&self) -> Vec<(ManageVaultAction, TxMeta)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn statuses(outcome: &SimulatedOutcome, tx_hash: &str) -> Vec<TxState> {
        let mut updates = vec![TxState::new(TxStatus::WaitingForApproval)];
        match outcome {
            SimulatedOutcome::Rejected => {
                updates.push(TxState::new(TxStatus::CancelledByTheUser));
                return updates;
            }
            SimulatedOutcome::Failure { reason } => {
                updates.push(TxState::new(TxStatus::Propagating).with_hash(tx_hash));
                updates.push(
                    TxState::new(TxStatus::Failure {
                        reason: reason.clone(),
                    })
                    .with_hash(tx_hash),
                );
            }
            SimulatedOutcome::Success { confirmations } => {
                updates.push(TxState::new(TxStatus::Propagating).with_hash(tx_hash));
                updates.push(TxState::new(TxStatus::WaitingForConfirmation).with_hash(tx_hash));
                for confirmation in 0..=*confirmations {
                    updates.push(
                        TxState::new(TxStatus::Success)
                            .with_hash(tx_hash)
                            .with_confirmations(confirmation),
                    );
                }
            }
        }
        updates
    }
}

impl TransactionIssuer for SimulatedIssuer {
    fn send(&self, action: &ManageVaultAction, meta: TxMeta) -> BoxStream<'static, TxState> {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let tx_hash = format!("0x{:064x}", nonce + 1);
        log::info!("Simulating {:?} transaction {}", meta.kind, tx_hash);

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((action.clone(), meta));

        let outcome = self.outcome.lock().unwrap_or_else(|e| e.into_inner()).clone();
        stream::iter(Self::statuses(&outcome, &tx_hash)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TxMeta {
        TxMeta {
            kind: StageCategory::Proxy,
            account: Some(Address::new("0xowner")),
            vault_id: 1,
        }
    }

    fn action() -> ManageVaultAction {
        ManageVaultAction::CreateProxy {
            owner: Some(Address::new("0xowner")),
        }
    }

    #[tokio::test]
    async fn test_success_reports_each_confirmation() {
        let issuer = SimulatedIssuer::new(SimulatedOutcome::Success { confirmations: 2 });
        let updates: Vec<TxState> = issuer.send(&action(), meta()).collect().await;

        assert_eq!(updates[0].status, TxStatus::WaitingForApproval);
        let last = updates.last().unwrap();
        assert_eq!(last.status, TxStatus::Success);
        assert_eq!(last.confirmations, 2);
        assert!(last.tx_hash.is_some());
        assert_eq!(issuer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_never_propagates() {
        let issuer = SimulatedIssuer::new(SimulatedOutcome::Rejected);
        let updates: Vec<TxState> = issuer.send(&action(), meta()).collect().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].status, TxStatus::CancelledByTheUser);
    }

    #[tokio::test]
    async fn test_hashes_are_unique() {
        let issuer = SimulatedIssuer::new(SimulatedOutcome::Failure {
            reason: "out of gas".to_string(),
        });
        let first: Vec<TxState> = issuer.send(&action(), meta()).collect().await;
        let second: Vec<TxState> = issuer.send(&action(), meta()).collect().await;
        assert_ne!(first[1].tx_hash, second[1].tx_hash);
        assert_eq!(first.last().unwrap().failure_reason(), Some("out of gas".to_string()));
    }
}
