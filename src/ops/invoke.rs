//! Invoke an external entry point from the acting account

use super::settle;
use crate::codec::{encode_args, Arg, ContractCall};
use crate::context::ExecutionContext;
use crate::error::{ScriptError, ScriptResult};
use crate::tx::TransactionKind;
use crate::types::{ContractAddress, FeeCeiling, InvokeResult};

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub contract_address: ContractAddress,
    pub entrypoint: String,
    pub args: Vec<Arg>,
    pub fee: FeeCeiling,
}

impl InvokeRequest {
    pub fn new(contract_address: ContractAddress, entrypoint: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            contract_address,
            entrypoint: entrypoint.into(),
            args,
            fee: FeeCeiling::Auto,
        }
    }

    pub fn with_fee(mut self, fee: FeeCeiling) -> Self {
        self.fee = fee;
        self
    }
}

pub async fn invoke(ctx: &ExecutionContext, request: InvokeRequest) -> ScriptResult<InvokeResult> {
    let account = ctx.account()?;
    let calldata = encode_args(&request.args)?;
    check_entrypoint(ctx, request.contract_address, &request.entrypoint).await?;

    let call = ContractCall::new(request.contract_address, &request.entrypoint, calldata)?;
    info!(
        "Invoking {} on {}",
        request.entrypoint, request.contract_address
    );

    let kind = TransactionKind::Invoke { calls: vec![call] };
    let submission = ctx.sender().submit(account, &kind, request.fee).await?;
    settle(ctx, account, &submission).await?;

    Ok(InvokeResult {
        transaction_hash: submission.transaction_hash,
    })
}

/// Fail early when the deployed class's ABI lacks `entrypoint`. Classes
/// without a readable ABI are let through.
pub(crate) async fn check_entrypoint(
    ctx: &ExecutionContext,
    contract: ContractAddress,
    entrypoint: &str,
) -> ScriptResult<()> {
    match ctx.contract_abi(contract).await? {
        Some(abi) if !abi.has_entrypoint(entrypoint) => Err(ScriptError::EntrypointNotFound {
            contract,
            entrypoint: entrypoint.to_string(),
        }),
        _ => Ok(()),
    }
}
