//! Service events, delivered over a `tokio::sync::broadcast` channel.

use lockbox_core::types::{Account, KeyringState, MemStoreState, UnlockScene};

/// Events emitted by [`KeyringService`](crate::KeyringService).
#[derive(Debug, Clone, PartialEq)]
pub enum KeyringEvent {
    /// Password and keyrings were dropped.
    Locked,
    /// The service entered the unlocked state.
    Unlocked { scene: UnlockScene },
    /// An account was derived or added.
    NewAccount(Account),
    /// An account was removed from its keyring.
    RemovedAccount(Account),
    /// About to re-encrypt under a new password. Carries the state as it was.
    BeforeUpdatePassword { keyring_state: KeyringState },
    /// Snapshot pushed by `full_update`.
    Updated(MemStoreState),
}
