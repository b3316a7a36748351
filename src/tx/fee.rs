//! Fee estimation and ceiling enforcement

use crate::chain::{BlockId, BroadcastedTransaction, NodeClient};
use crate::error::{ScriptError, ScriptResult};
use crate::types::FeeCeiling;

use tracing::debug;

/// Resolves the max fee a transaction is signed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEstimator {
    /// Buffer added to the estimate when no ceiling is given (e.g., 10 = 10%)
    buffer_percent: u64,
}

impl FeeEstimator {
    pub fn new(buffer_percent: u64) -> Self {
        Self { buffer_percent }
    }

    pub fn buffer_percent(&self) -> u64 {
        self.buffer_percent
    }

    /// Estimate plus the configured buffer
    pub fn apply_buffer(&self, estimated: u128) -> u128 {
        let percent = u128::from(self.buffer_percent);
        let buffer = (estimated / 100)
            .saturating_mul(percent)
            .saturating_add((estimated % 100) * percent / 100);
        estimated.saturating_add(buffer)
    }

    /// Simulate a query-version transaction and return its overall fee
    pub async fn estimate(
        &self,
        node: &dyn NodeClient,
        transaction: BroadcastedTransaction,
    ) -> ScriptResult<u128> {
        let estimate = node
            .estimate_fee(transaction, BlockId::Pending)
            .await
            .map_err(|e| e.into_script_error("starknet_estimateFee"))?;

        u128::try_from(estimate.overall_fee).map_err(|_| {
            ScriptError::UnexpectedResponse(format!(
                "fee estimate {:#x} does not fit in 128 bits",
                estimate.overall_fee
            ))
        })
    }

    /// Max fee to sign with, or `FeeTooLow` when an explicit ceiling is
    /// below the estimate
    pub fn resolve(&self, ceiling: FeeCeiling, estimated: u128) -> ScriptResult<u128> {
        match ceiling {
            FeeCeiling::Auto => {
                let max_fee = self.apply_buffer(estimated);
                debug!(
                    "Fee estimate {} buffered by {}% to {}",
                    estimated, self.buffer_percent, max_fee
                );
                Ok(max_fee)
            }
            FeeCeiling::Max(max_fee) if max_fee < estimated => {
                Err(ScriptError::FeeTooLow { max_fee, estimated })
            }
            FeeCeiling::Max(max_fee) => Ok(max_fee),
        }
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(10)
    }
}
