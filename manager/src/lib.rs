//! Manage-vault session orchestration
//!
//! Wires the pure model in `vault_model` to chain reads and transaction
//! submission behind the `VaultEnvironment` and `TransactionIssuer` seams.

pub mod config;
pub mod environment;
pub mod error;
pub mod scenario;
pub mod session;
pub mod tx;

pub use config::{Config, SessionConfig};
pub use environment::{
    EnvStream, EnvironmentError, EnvironmentUpdate, SnapshotEnvironment, VaultEnvironment,
};
pub use error::SessionError;
pub use scenario::{replay, Scenario, ScenarioCommand};
pub use session::{start, ManageVaultHandle, SessionContext};
pub use tx::{SimulatedIssuer, SimulatedOutcome, TransactionIssuer, TxMeta};
