//! Declare a Sierra class (put-if-absent)

use super::settle;
use crate::chain::{codes, BlockId};
use crate::codec::{ClassSource, PreparedClass};
use crate::context::ExecutionContext;
use crate::error::{Rejection, ScriptError, ScriptResult};
use crate::tx::TransactionKind;
use crate::types::{ClassHash, DeclareResult, FeeCeiling};

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclareRequest {
    pub source: ClassSource,
    pub fee: FeeCeiling,
}

impl DeclareRequest {
    pub fn new(source: ClassSource) -> Self {
        Self {
            source,
            fee: FeeCeiling::Auto,
        }
    }

    pub fn with_fee(mut self, fee: FeeCeiling) -> Self {
        self.fee = fee;
        self
    }
}

/// Declare the class behind `request.source`.
///
/// An already-declared class succeeds with `transaction_hash = None`,
/// whether found up front or reported by the node.
pub async fn declare(ctx: &ExecutionContext, request: DeclareRequest) -> ScriptResult<DeclareResult> {
    let account = ctx.account()?;
    let class = PreparedClass::load(&request.source)?;
    let class_hash = class.class_hash;

    if is_declared(ctx, class_hash).await? {
        info!("Class {} is already declared", class_hash);
        return Ok(DeclareResult {
            class_hash,
            transaction_hash: None,
        });
    }

    info!("Declaring class {}", class_hash);
    let kind = TransactionKind::Declare {
        class: Box::new(class),
    };
    let submission = match ctx.sender().submit(account, &kind, request.fee).await {
        Ok(submission) => submission,
        Err(ScriptError::Rejected {
            reason: Rejection::ClassAlreadyDeclared,
            ..
        }) => {
            info!("Class {} was declared concurrently", class_hash);
            return Ok(DeclareResult {
                class_hash,
                transaction_hash: None,
            });
        }
        Err(e) => return Err(e),
    };

    settle(ctx, account, &submission).await?;

    Ok(DeclareResult {
        class_hash,
        transaction_hash: Some(submission.transaction_hash),
    })
}

async fn is_declared(ctx: &ExecutionContext, class_hash: ClassHash) -> ScriptResult<bool> {
    match ctx.node().class(BlockId::Pending, class_hash).await {
        Ok(_) => Ok(true),
        Err(e) if e.code() == Some(codes::CLASS_HASH_NOT_FOUND) => Ok(false),
        Err(e) => Err(e.into_script_error("starknet_getClass")),
    }
}
