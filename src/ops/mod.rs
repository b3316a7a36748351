//! Script operations: declare, deploy, invoke, multicall, call
//!
//! Every state-changing operation follows the same path:
//! build calls -> reserve nonce -> resolve fee -> sign and broadcast ->
//! wait per the context's `WaitFor` -> typed result.

pub mod abi;
pub mod call;
pub mod declare;
pub mod deploy;
pub mod invoke;
pub mod multicall;

pub use call::{call, CallRequest};
pub use declare::{declare, DeclareRequest};
pub use deploy::{deploy, DeployRequest};
pub use invoke::{invoke, InvokeRequest};
pub use multicall::{multicall, CallTarget, MulticallPlan, MulticallStep, MULTICALL_TEMPLATE};

use crate::context::ExecutionContext;
use crate::error::{Rejection, ScriptError, ScriptResult};
use crate::tx::{Account, Submission};
use crate::types::{Confirmation, TransactionHash, TransactionOutcome, WaitFor};

use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Wait for `transaction_hash` to reach `target`, bounded by `deadline`
pub async fn await_confirmation(
    ctx: &ExecutionContext,
    transaction_hash: TransactionHash,
    target: WaitFor,
    deadline: Duration,
) -> ScriptResult<Confirmation> {
    ctx.tracker().wait(transaction_hash, target, deadline).await
}

/// Wait per the context policy and turn the outcome into a result
pub(crate) async fn settle(
    ctx: &ExecutionContext,
    account: &Account,
    submission: &Submission,
) -> ScriptResult<()> {
    let transaction_hash = submission.transaction_hash;
    let wait_for = ctx.wait_for();
    if wait_for == WaitFor::Submission {
        // Nothing will observe this transaction again
        ctx.sender()
            .nonces()
            .settle(account.address(), submission.nonce)
            .await;
        return Ok(());
    }

    let started = Instant::now();
    let confirmation = ctx
        .tracker()
        .wait(transaction_hash, wait_for, ctx.confirmation_timeout())
        .await?;

    let outcome = match confirmation {
        Confirmation::Settled(outcome) => outcome,
        Confirmation::TimedOut {
            waited,
            last_observed,
        } => {
            ctx.sender()
                .nonces()
                .settle(account.address(), submission.nonce)
                .await;
            ctx.metrics().record_outcome("timed_out");
            return Err(ScriptError::TimedOut {
                transaction_hash,
                waited,
                last_observed,
            });
        }
    };

    ctx.metrics().record_outcome(outcome.label());
    ctx.metrics().record_confirmation_latency(started.elapsed());

    match outcome {
        TransactionOutcome::AcceptedOnL2 | TransactionOutcome::AcceptedOnL1 => {
            ctx.sender()
                .nonces()
                .settle(account.address(), submission.nonce)
                .await;
            info!("Transaction {} accepted", transaction_hash);
            Ok(())
        }
        TransactionOutcome::Reverted(reason) => {
            // A reverted transaction still consumed its nonce
            ctx.sender()
                .nonces()
                .settle(account.address(), submission.nonce)
                .await;
            warn!("Transaction {} reverted: {}", transaction_hash, reason);
            Err(ScriptError::Reverted {
                transaction_hash,
                reason,
            })
        }
        TransactionOutcome::Rejected(reason) => {
            ctx.sender().nonces().invalidate(account.address()).await;
            ctx.metrics().record_rejection("status");
            warn!("Transaction {} rejected: {}", transaction_hash, reason);
            Err(ScriptError::Rejected {
                transaction_hash: Some(transaction_hash),
                reason: Rejection::Status(reason),
            })
        }
        TransactionOutcome::Pending => Ok(()),
    }
}
