//! Nonce sequencing for acting accounts
//!
//! Handles:
//! - Local nonce tracking so concurrent submissions never collide
//! - Holding the account lock from reservation until broadcast
//! - Refetching from the node after a nonce rejection

use crate::chain::{codes, BlockId, NodeClient};
use crate::error::{ScriptError, ScriptResult};
use crate::types::{ContractAddress, TransactionHash};

use dashmap::DashMap;
use starknet_crypto::FieldElement;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Per-account nonce state
#[derive(Debug, Default)]
struct AccountNonceState {
    /// Next nonce to use; `None` until fetched or after invalidation
    next: Option<FieldElement>,
    /// Broadcast but not yet settled: nonce -> tx hash
    pending: BTreeMap<FieldElement, TransactionHash>,
}

/// Hands out nonces per account, one submission at a time
#[derive(Debug, Default)]
pub struct NonceSequencer {
    accounts: DashMap<ContractAddress, Arc<Mutex<AccountNonceState>>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, account: ContractAddress) -> Arc<Mutex<AccountNonceState>> {
        self.accounts
            .entry(account)
            .or_insert_with(Default::default)
            .value()
            .clone()
    }

    /// Lock the account and reserve its next nonce.
    ///
    /// The lock is held by the returned reservation; dropping it without
    /// `commit` leaves the counter untouched.
    pub async fn reserve(
        &self,
        account: ContractAddress,
        node: &dyn NodeClient,
    ) -> ScriptResult<NonceReservation> {
        let mut guard = self.slot(account).lock_owned().await;

        let nonce = match guard.next {
            Some(nonce) => nonce,
            None => {
                let nonce = node
                    .nonce(BlockId::Pending, account)
                    .await
                    .map_err(|e| match e.code() {
                        Some(codes::CONTRACT_NOT_FOUND) => ScriptError::Nonce {
                            account,
                            message: "account contract is not deployed".to_string(),
                        },
                        _ => e.into_script_error("starknet_getNonce"),
                    })?;
                debug!("Fetched nonce {} for account {}", nonce, account);
                guard.next = Some(nonce);
                nonce
            }
        };

        debug!("Reserved nonce {} for account {}", nonce, account);
        Ok(NonceReservation {
            account,
            nonce,
            guard,
        })
    }

    /// Forget the cached counter so the next reservation refetches
    pub async fn invalidate(&self, account: ContractAddress) {
        let slot = match self.accounts.get(&account) {
            Some(slot) => slot.value().clone(),
            None => return,
        };
        let mut state = slot.lock().await;
        state.next = None;
        state.pending.clear();
        warn!("Invalidated cached nonce for account {}", account);
    }

    /// A transaction using `nonce` reached a terminal state
    pub async fn settle(&self, account: ContractAddress, nonce: FieldElement) {
        let slot = match self.accounts.get(&account) {
            Some(slot) => slot.value().clone(),
            None => return,
        };
        let mut state = slot.lock().await;
        if state.pending.remove(&nonce).is_some() {
            debug!("Settled nonce {} for account {}", nonce, account);
        }
    }

    /// Broadcast transactions not yet settled
    pub async fn pending_count(&self, account: ContractAddress) -> usize {
        let slot = match self.accounts.get(&account) {
            Some(slot) => slot.value().clone(),
            None => return 0,
        };
        let state = slot.lock().await;
        state.pending.len()
    }
}

/// A reserved nonce; holds the account lock until consumed or dropped
pub struct NonceReservation {
    account: ContractAddress,
    nonce: FieldElement,
    guard: OwnedMutexGuard<AccountNonceState>,
}

impl NonceReservation {
    pub fn nonce(&self) -> FieldElement {
        self.nonce
    }

    /// The transaction was admitted; advance the counter
    pub fn commit(mut self, transaction_hash: TransactionHash) {
        self.guard.pending.insert(self.nonce, transaction_hash);
        self.guard.next = Some(self.nonce + FieldElement::ONE);
        debug!(
            "Committed nonce {} for account {} ({})",
            self.nonce, self.account, transaction_hash
        );
    }

    /// The node disagreed about the nonce; refetch next time
    pub fn invalidate(mut self) {
        self.guard.next = None;
        warn!(
            "Nonce {} rejected for account {}, will refetch",
            self.nonce, self.account
        );
    }
}
