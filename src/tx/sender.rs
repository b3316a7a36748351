//! Transaction sender: nonce, fee, signature, broadcast

use super::account::Account;
use super::fee::FeeEstimator;
use super::nonce::NonceSequencer;
use crate::chain::{
    codes, BroadcastedDeclare, BroadcastedInvoke, BroadcastedTransaction, NodeClient,
};
use crate::codec::tx_hash::{declare_v2_hash, invoke_v1_hash, transaction_version};
use crate::codec::{encode_execute, ContractCall, PreparedClass};
use crate::error::{ScriptError, ScriptResult};
use crate::metrics::ScriptMetrics;
use crate::types::{FeeCeiling, TransactionHash};

use starknet_crypto::FieldElement;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What is being submitted
#[derive(Debug, Clone)]
pub enum TransactionKind {
    /// INVOKE v1 through the account's `__execute__`
    Invoke { calls: Vec<ContractCall> },
    /// DECLARE v2 of a Sierra class
    Declare { class: Box<PreparedClass> },
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Invoke { .. } => "invoke",
            TransactionKind::Declare { .. } => "declare",
        }
    }
}

/// A transaction the node admitted to its pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub transaction_hash: TransactionHash,
    pub nonce: FieldElement,
    pub max_fee: u128,
}

/// Signs and broadcasts transactions for any account
pub struct TransactionSender {
    node: Arc<dyn NodeClient>,
    nonces: NonceSequencer,
    fees: FeeEstimator,
    chain_id: FieldElement,
    metrics: Arc<ScriptMetrics>,
}

impl TransactionSender {
    pub fn new(
        node: Arc<dyn NodeClient>,
        chain_id: FieldElement,
        fees: FeeEstimator,
        metrics: Arc<ScriptMetrics>,
    ) -> Self {
        Self {
            node,
            nonces: NonceSequencer::new(),
            fees,
            chain_id,
            metrics,
        }
    }

    pub fn nonces(&self) -> &NonceSequencer {
        &self.nonces
    }

    pub fn fees(&self) -> &FeeEstimator {
        &self.fees
    }

    /// Reserve a nonce, resolve the fee, sign and broadcast.
    ///
    /// The account stays locked until the node answers, so concurrent
    /// submissions from one account get consecutive nonces. Nothing is
    /// broadcast when the fee ceiling is below the estimate.
    pub async fn submit(
        &self,
        account: &Account,
        kind: &TransactionKind,
        ceiling: FeeCeiling,
    ) -> ScriptResult<Submission> {
        let reservation = self
            .nonces
            .reserve(account.address(), self.node.as_ref())
            .await?;
        let nonce = reservation.nonce();

        let (_, query) = self.build(account, kind, nonce, FieldElement::ZERO, true)?;
        let estimated = self.fees.estimate(self.node.as_ref(), query).await?;
        let max_fee = self.fees.resolve(ceiling, estimated)?;

        let (local_hash, transaction) =
            self.build(account, kind, nonce, FieldElement::from(max_fee), false)?;

        debug!(
            "Broadcasting {} from {} (nonce {}, max fee {})",
            kind.label(),
            account.address(),
            nonce,
            max_fee
        );

        let transaction_hash = match self.broadcast(transaction).await {
            Ok(transaction_hash) => {
                if transaction_hash.felt() != local_hash {
                    warn!(
                        "Node returned hash {} but {:#x} was signed; using the node's",
                        transaction_hash, local_hash
                    );
                }
                transaction_hash
            }
            Err(NodeBroadcastError::Duplicate) => {
                info!("Transaction {:#x} is already in the pool", local_hash);
                TransactionHash::new(local_hash)
                    .ok_or_else(|| ScriptError::Internal("signed a zero hash".to_string()))?
            }
            Err(NodeBroadcastError::Failed(error)) => {
                if let ScriptError::Rejected { reason, .. } = &error {
                    self.metrics.record_rejection(reason.label());
                }
                if error.invalidates_nonce() {
                    reservation.invalidate();
                }
                return Err(error);
            }
        };

        reservation.commit(transaction_hash);
        self.metrics.record_submitted(kind.label());
        info!(
            "Submitted {} {} from {}",
            kind.label(),
            transaction_hash,
            account.address()
        );

        Ok(Submission {
            transaction_hash,
            nonce,
            max_fee,
        })
    }

    /// Build and sign; returns the locally computed hash alongside
    fn build(
        &self,
        account: &Account,
        kind: &TransactionKind,
        nonce: FieldElement,
        max_fee: FieldElement,
        query: bool,
    ) -> ScriptResult<(FieldElement, BroadcastedTransaction)> {
        let sender = account.address();
        match kind {
            TransactionKind::Invoke { calls } => {
                let calldata = encode_execute(calls, account.encoding());
                let hash = invoke_v1_hash(
                    sender.felt(),
                    &calldata,
                    max_fee,
                    self.chain_id,
                    nonce,
                    query,
                );
                let signature = account.sign(&hash)?;
                Ok((
                    hash,
                    BroadcastedTransaction::Invoke(BroadcastedInvoke {
                        sender_address: sender,
                        calldata,
                        max_fee,
                        version: transaction_version(1, query),
                        signature,
                        nonce,
                    }),
                ))
            }
            TransactionKind::Declare { class } => {
                let hash = declare_v2_hash(
                    sender.felt(),
                    class.class_hash.felt(),
                    class.compiled_class_hash,
                    max_fee,
                    self.chain_id,
                    nonce,
                    query,
                );
                let signature = account.sign(&hash)?;
                Ok((
                    hash,
                    BroadcastedTransaction::Declare(BroadcastedDeclare {
                        sender_address: sender,
                        compiled_class_hash: class.compiled_class_hash,
                        max_fee,
                        version: transaction_version(2, query),
                        signature,
                        nonce,
                        contract_class: class.definition.clone(),
                    }),
                ))
            }
        }
    }

    async fn broadcast(
        &self,
        transaction: BroadcastedTransaction,
    ) -> Result<TransactionHash, NodeBroadcastError> {
        let (operation, result) = match transaction {
            BroadcastedTransaction::Invoke(invoke) => (
                "starknet_addInvokeTransaction",
                self.node.add_invoke_transaction(invoke).await,
            ),
            BroadcastedTransaction::Declare(declare) => (
                "starknet_addDeclareTransaction",
                self.node
                    .add_declare_transaction(declare)
                    .await
                    .map(|ack| ack.transaction_hash),
            ),
        };

        result.map_err(|e| {
            if e.code() == Some(codes::DUPLICATE_TX) {
                NodeBroadcastError::Duplicate
            } else {
                NodeBroadcastError::Failed(e.into_script_error(operation))
            }
        })
    }
}

enum NodeBroadcastError {
    /// Same hash already in the pool: a resend of an admitted transaction
    Duplicate,
    Failed(ScriptError),
}
