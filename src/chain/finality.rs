//! Transaction confirmation tracking
//!
//! A submitted transaction moves through:
//! - Received (pending): admitted to the pool, not yet in a block
//! - ACCEPTED_ON_L2: included in an L2 block
//! - ACCEPTED_ON_L1: the block is proven on L1
//! - REJECTED / REVERTED: terminal failures
//!
//! `PollState` is the pure decision step; `ConfirmationTracker` drives it
//! against a node under a hard deadline.

use super::{codes, ExecutionStatus, FinalityStatus, NodeClient, TransactionStatus};
use crate::error::ScriptResult;
use crate::types::{Confirmation, TransactionHash, TransactionOutcome, WaitFor};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Polling cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// First delay between status requests
    pub poll_interval: Duration,
    /// Delay ceiling
    pub max_poll_interval: Duration,
    /// Growth factor applied after every inconclusive poll
    pub backoff_multiplier: u32,
}

impl ConfirmationPolicy {
    pub fn new(poll_interval: Duration, max_poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_poll_interval: max_poll_interval.max(poll_interval),
            backoff_multiplier: 2,
        }
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(5))
    }
}

/// What to do after one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Poll again after the given delay
    Continue(Duration),
    /// Stop with this outcome
    Finish(TransactionOutcome),
}

/// Polling state machine
#[derive(Debug, Clone)]
pub struct PollState {
    next_interval: Duration,
    max_interval: Duration,
    multiplier: u32,
    last_observed: TransactionOutcome,
    polls: u32,
}

impl PollState {
    pub fn new(policy: &ConfirmationPolicy) -> Self {
        Self {
            next_interval: policy.poll_interval,
            max_interval: policy.max_poll_interval,
            multiplier: policy.backoff_multiplier.max(1),
            last_observed: TransactionOutcome::Pending,
            polls: 0,
        }
    }

    /// Feed one observed outcome
    pub fn observe(&mut self, outcome: TransactionOutcome, target: WaitFor) -> PollStep {
        self.polls += 1;
        self.last_observed = outcome.clone();

        let finished = match outcome {
            TransactionOutcome::Pending => target == WaitFor::Submission,
            TransactionOutcome::AcceptedOnL2 => target != WaitFor::AcceptedOnL1,
            TransactionOutcome::AcceptedOnL1
            | TransactionOutcome::Rejected(_)
            | TransactionOutcome::Reverted(_) => true,
        };

        if finished {
            PollStep::Finish(outcome)
        } else {
            PollStep::Continue(self.advance())
        }
    }

    /// The node does not know the hash yet; keep waiting
    pub fn observe_missing(&mut self) -> PollStep {
        self.polls += 1;
        PollStep::Continue(self.advance())
    }

    pub fn last_observed(&self) -> &TransactionOutcome {
        &self.last_observed
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    fn advance(&mut self) -> Duration {
        let current = self.next_interval;
        self.next_interval = current
            .saturating_mul(self.multiplier)
            .min(self.max_interval);
        current
    }
}

/// Map a node status onto the outcome model
pub fn outcome_from_status(status: &TransactionStatus) -> TransactionOutcome {
    let reason = || {
        status
            .failure_reason
            .clone()
            .unwrap_or_else(|| "no reason given".to_string())
    };

    match status.finality_status {
        FinalityStatus::Rejected => TransactionOutcome::Rejected(reason()),
        _ if status.execution_status == Some(ExecutionStatus::Reverted) => {
            TransactionOutcome::Reverted(reason())
        }
        FinalityStatus::AcceptedOnL2 => TransactionOutcome::AcceptedOnL2,
        FinalityStatus::AcceptedOnL1 => TransactionOutcome::AcceptedOnL1,
        FinalityStatus::Received | FinalityStatus::Unknown => TransactionOutcome::Pending,
    }
}

/// Polls a node until a transaction settles or the deadline passes
#[derive(Clone)]
pub struct ConfirmationTracker {
    node: Arc<dyn NodeClient>,
    policy: ConfirmationPolicy,
}

impl ConfirmationTracker {
    pub fn new(node: Arc<dyn NodeClient>, policy: ConfirmationPolicy) -> Self {
        Self { node, policy }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Wait for `transaction_hash` to reach `target`.
    ///
    /// Every status request runs under the time left before `deadline`, so
    /// a hanging request is dropped when the deadline passes. Only status
    /// errors other than "hash not found" are returned as errors.
    pub async fn wait(
        &self,
        transaction_hash: TransactionHash,
        target: WaitFor,
        deadline: Duration,
    ) -> ScriptResult<Confirmation> {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let mut state = PollState::new(&self.policy);

        debug!(
            "Tracking {} until {:?} (deadline {:?})",
            transaction_hash, target, deadline
        );

        loop {
            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(self.timed_out(transaction_hash, started, &state));
            }

            let step = match timeout(remaining, self.node.transaction_status(transaction_hash)).await {
                Err(_) => return Ok(self.timed_out(transaction_hash, started, &state)),
                Ok(Ok(status)) => state.observe(outcome_from_status(&status), target),
                Ok(Err(e)) if e.code() == Some(codes::TXN_HASH_NOT_FOUND) => {
                    debug!("{} not known to the node yet", transaction_hash);
                    state.observe_missing()
                }
                Ok(Err(e)) => return Err(e.into_script_error("starknet_getTransactionStatus")),
            };

            match step {
                PollStep::Finish(outcome) => {
                    info!(
                        "Transaction {} settled as {} after {} polls",
                        transaction_hash,
                        outcome,
                        state.polls()
                    );
                    return Ok(Confirmation::Settled(outcome));
                }
                PollStep::Continue(delay) => {
                    let remaining = deadline_at.saturating_duration_since(Instant::now());
                    tokio::time::sleep(delay.min(remaining)).await;
                }
            }
        }
    }

    fn timed_out(
        &self,
        transaction_hash: TransactionHash,
        started: Instant,
        state: &PollState,
    ) -> Confirmation {
        let waited = started.elapsed();
        warn!(
            "Gave up on {} after {:?} (last status: {})",
            transaction_hash,
            waited,
            state.last_observed()
        );
        Confirmation::TimedOut {
            waited,
            last_observed: state.last_observed().clone(),
        }
    }
}
