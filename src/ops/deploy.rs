//! Deploy a declared class through the Universal Deployer

use super::abi::ContractAbi;
use super::settle;
use crate::chain::{codes, BlockId};
use crate::codec::calldata::udc_deploy_call;
use crate::codec::{encode_args, udc_deployed_address, Arg};
use crate::context::ExecutionContext;
use crate::error::{ScriptError, ScriptResult};
use crate::tx::TransactionKind;
use crate::types::{ClassHash, DeployResult, FeeCeiling, Salt};

use starknet_crypto::FieldElement;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub class_hash: ClassHash,
    pub constructor_args: Vec<Arg>,
    /// `None` picks `Salt::default_for(unique)`
    pub salt: Option<Salt>,
    pub unique: bool,
    pub fee: FeeCeiling,
}

impl DeployRequest {
    pub fn new(class_hash: ClassHash) -> Self {
        Self {
            class_hash,
            constructor_args: Vec::new(),
            salt: None,
            unique: false,
            fee: FeeCeiling::Auto,
        }
    }

    pub fn with_args(mut self, args: Vec<Arg>) -> Self {
        self.constructor_args = args;
        self
    }

    pub fn with_salt(mut self, salt: Salt) -> Self {
        self.salt = Some(salt);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_fee(mut self, fee: FeeCeiling) -> Self {
        self.fee = fee;
        self
    }
}

/// Deploy `request.class_hash`, returning the address computed up front
pub async fn deploy(ctx: &ExecutionContext, request: DeployRequest) -> ScriptResult<DeployResult> {
    let account = ctx.account()?;
    let calldata = encode_args(&request.constructor_args)?;
    check_deployable(ctx, request.class_hash, &calldata).await?;

    let salt = resolve_salt(request.salt, request.unique);
    let contract_address = udc_deployed_address(
        account.address(),
        request.class_hash,
        salt,
        request.unique,
        &calldata,
    );
    info!(
        "Deploying class {} at {} (salt {:#x}, unique: {})",
        request.class_hash, contract_address, salt, request.unique
    );

    let kind = TransactionKind::Invoke {
        calls: vec![udc_deploy_call(
            request.class_hash,
            salt,
            request.unique,
            &calldata,
        )],
    };
    let submission = ctx.sender().submit(account, &kind, request.fee).await?;
    settle(ctx, account, &submission).await?;

    Ok(DeployResult {
        contract_address,
        transaction_hash: submission.transaction_hash,
        salt,
    })
}

/// Concrete salt for a deployment
pub(crate) fn resolve_salt(salt: Option<Salt>, unique: bool) -> FieldElement {
    match salt.unwrap_or_else(|| Salt::default_for(unique)) {
        Salt::Fixed(value) => value,
        Salt::Random => random_salt(),
    }
}

/// 248 random bits, always below the field modulus
fn random_salt() -> FieldElement {
    rand::random::<[u8; 31]>()
        .iter()
        .fold(FieldElement::ZERO, |acc, byte| {
            acc * FieldElement::from(256u64) + FieldElement::from(*byte)
        })
}

/// Check that `class_hash` is declared and that its constructor takes
/// `calldata.len()` values
pub(crate) async fn check_deployable(
    ctx: &ExecutionContext,
    class_hash: ClassHash,
    calldata: &[FieldElement],
) -> ScriptResult<()> {
    let class = match ctx.node().class(BlockId::Pending, class_hash).await {
        Ok(class) => class,
        Err(e) if e.code() == Some(codes::CLASS_HASH_NOT_FOUND) => {
            return Err(ScriptError::ClassNotDeclared { class_hash })
        }
        Err(e) => return Err(e.into_script_error("starknet_getClass")),
    };

    match ContractAbi::from_class(&class).and_then(|abi| abi.constructor_felt_arity()) {
        Some(expected) if expected != calldata.len() => Err(ScriptError::ConstructorArity {
            expected,
            actual: calldata.len(),
        }),
        Some(_) => Ok(()),
        None => {
            debug!("Skipping constructor arity check for class {}", class_hash);
            Ok(())
        }
    }
}
