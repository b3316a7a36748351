//! Read-only contract calls

use super::invoke::check_entrypoint;
use crate::chain::{codes, BlockId, FunctionCall, NodeError};
use crate::codec::{encode_args, selector_from_name, Arg};
use crate::context::ExecutionContext;
use crate::error::{ScriptError, ScriptResult};
use crate::types::{CallResult, ContractAddress};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub contract_address: ContractAddress,
    pub entrypoint: String,
    pub args: Vec<Arg>,
    pub block: BlockId,
}

impl CallRequest {
    pub fn new(contract_address: ContractAddress, entrypoint: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            contract_address,
            entrypoint: entrypoint.into(),
            args,
            block: BlockId::Latest,
        }
    }

    pub fn at_block(mut self, block: BlockId) -> Self {
        self.block = block;
        self
    }
}

/// Run `starknet_call`. Needs no account and submits nothing.
///
/// Unknown entrypoints are caught against the deployed class's ABI before
/// the call goes out.
pub async fn call(ctx: &ExecutionContext, request: CallRequest) -> ScriptResult<CallResult> {
    let calldata = encode_args(&request.args)?;
    check_entrypoint(ctx, request.contract_address, &request.entrypoint).await?;
    let function_call = FunctionCall {
        contract_address: request.contract_address,
        entry_point_selector: selector_from_name(&request.entrypoint)?,
        calldata,
    };

    debug!(
        "Calling {} on {} at {:?}",
        request.entrypoint, request.contract_address, request.block
    );
    match ctx.node().call(function_call, request.block).await {
        Ok(data) => Ok(CallResult { data }),
        Err(e) if e.code() == Some(codes::CONTRACT_NOT_FOUND) => {
            Err(ScriptError::ContractNotFound(request.contract_address))
        }
        // Classes without a readable ABI only tell us through the error text
        Err(e) if reports_missing_entrypoint(&e) => Err(ScriptError::EntrypointNotFound {
            contract: request.contract_address,
            entrypoint: request.entrypoint,
        }),
        Err(e) => Err(e.into_script_error("starknet_call")),
    }
}

fn reports_missing_entrypoint(error: &NodeError) -> bool {
    match error {
        NodeError::Rpc {
            code: codes::CONTRACT_ERROR,
            message,
            data,
        } => {
            let text = data.as_deref().unwrap_or(message);
            text.contains("Entry point") && text.contains("not found")
        }
        _ => false,
    }
}
