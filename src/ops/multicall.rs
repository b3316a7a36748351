//! Bundle deploy and invoke steps into a single INVOKE transaction
//!
//! Plans can be written as TOML:
//!
//! ```toml
//! [[call]]
//! call_type = "deploy"
//! class_hash = "0x..."
//! inputs = []
//! id = "map"
//! unique = false
//!
//! [[call]]
//! call_type = "invoke"
//! contract_address = "map"
//! function = "put"
//! inputs = ["0x1", "0x2"]
//! ```
//!
//! An invoke step's `contract_address` is either an address or the `id` of
//! an earlier deploy step in the same plan.

use super::deploy::{check_deployable, resolve_salt};
use super::invoke::check_entrypoint;
use super::settle;
use crate::codec::calldata::udc_deploy_call;
use crate::codec::felt::parse_felt;
use crate::codec::{encode_args, udc_deployed_address, Arg, ContractCall};
use crate::context::ExecutionContext;
use crate::error::{ScriptError, ScriptResult};
use crate::tx::TransactionKind;
use crate::types::{ClassHash, ContractAddress, FeeCeiling, MulticallResult, Salt};

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Skeleton written by `multicall new`
pub const MULTICALL_TEMPLATE: &str = r#"[[call]]
call_type = "deploy"
class_hash = ""
inputs = []
id = ""
unique = false

[[call]]
call_type = "invoke"
contract_address = ""
function = ""
inputs = []
"#;

/// Contract an invoke step targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Address(ContractAddress),
    /// Contract deployed by an earlier step with this id
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MulticallStep {
    Deploy {
        id: Option<String>,
        class_hash: ClassHash,
        constructor_args: Vec<Arg>,
        salt: Option<Salt>,
        unique: bool,
    },
    Invoke {
        target: CallTarget,
        entrypoint: String,
        args: Vec<Arg>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MulticallPlan {
    pub steps: Vec<MulticallStep>,
    pub fee: FeeCeiling,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    call: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "call_type", rename_all = "lowercase")]
enum RawStep {
    Deploy {
        class_hash: String,
        #[serde(default)]
        inputs: Vec<RawInput>,
        id: Option<String>,
        #[serde(default)]
        unique: bool,
        salt: Option<String>,
    },
    Invoke {
        contract_address: String,
        function: String,
        #[serde(default)]
        inputs: Vec<RawInput>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Number(u64),
    Text(String),
}

impl From<RawInput> for Arg {
    fn from(input: RawInput) -> Self {
        match input {
            RawInput::Number(n) => Arg::from(n),
            RawInput::Text(text) => Arg::from(text),
        }
    }
}

fn config_error(message: impl Into<String>) -> ScriptError {
    ScriptError::Config(message.into())
}

impl MulticallPlan {
    pub fn new(steps: Vec<MulticallStep>) -> Self {
        Self {
            steps,
            fee: FeeCeiling::Auto,
        }
    }

    pub fn with_fee(mut self, fee: FeeCeiling) -> Self {
        self.fee = fee;
        self
    }

    pub fn from_file(path: &Path) -> ScriptResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("Failed to read multicall file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ScriptResult<Self> {
        let raw: RawPlan = toml::from_str(text)
            .map_err(|e| config_error(format!("Failed to parse multicall plan: {}", e)))?;

        let mut steps = Vec::with_capacity(raw.call.len());
        for (index, step) in raw.call.into_iter().enumerate() {
            steps.push(convert_step(index, step)?);
        }

        let plan = Self::new(steps);
        plan.validate()?;
        Ok(plan)
    }

    /// Ids are unique and only referenced after the step that defines them
    pub fn validate(&self) -> ScriptResult<()> {
        if self.steps.is_empty() {
            return Err(config_error("Multicall plan has no steps"));
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            match step {
                MulticallStep::Deploy { id: Some(id), .. } => {
                    if !ids.insert(id.as_str()) {
                        return Err(config_error(format!("Duplicate multicall id '{}'", id)));
                    }
                }
                MulticallStep::Invoke {
                    target: CallTarget::Id(id),
                    ..
                } if !ids.contains(id.as_str()) => {
                    return Err(config_error(format!(
                        "Invoke targets '{}' before any deploy step defines it",
                        id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn convert_step(index: usize, step: RawStep) -> ScriptResult<MulticallStep> {
    let step = match step {
        RawStep::Deploy {
            class_hash,
            inputs,
            id,
            unique,
            salt,
        } => {
            let class_hash = class_hash.parse().map_err(|e| {
                config_error(format!("Step {}: invalid class_hash: {}", index, e))
            })?;
            let salt = salt
                .map(|raw| parse_felt(&raw).map(Salt::Fixed))
                .transpose()
                .map_err(|e| config_error(format!("Step {}: invalid salt: {}", index, e)))?;
            MulticallStep::Deploy {
                id: id.filter(|id| !id.is_empty()),
                class_hash,
                constructor_args: inputs.into_iter().map(Arg::from).collect(),
                salt,
                unique,
            }
        }
        RawStep::Invoke {
            contract_address,
            function,
            inputs,
        } => {
            if function.is_empty() {
                return Err(config_error(format!("Step {}: function is empty", index)));
            }
            let target = match contract_address.parse() {
                Ok(address) => CallTarget::Address(address),
                Err(_) if !contract_address.is_empty() => CallTarget::Id(contract_address),
                Err(e) => {
                    return Err(config_error(format!(
                        "Step {}: invalid contract_address: {}",
                        index, e
                    )))
                }
            };
            MulticallStep::Invoke {
                target,
                entrypoint: function,
                args: inputs.into_iter().map(Arg::from).collect(),
            }
        }
    };
    Ok(step)
}

/// Run every step of `plan` atomically in one transaction
pub async fn multicall(ctx: &ExecutionContext, plan: &MulticallPlan) -> ScriptResult<MulticallResult> {
    let account = ctx.account()?;
    plan.validate()?;

    let mut calls = Vec::with_capacity(plan.steps.len());
    let mut ids: HashMap<&str, ContractAddress> = HashMap::new();
    let mut deployed = Vec::new();

    for step in &plan.steps {
        match step {
            MulticallStep::Deploy {
                id,
                class_hash,
                constructor_args,
                salt,
                unique,
            } => {
                let calldata = encode_args(constructor_args)?;
                check_deployable(ctx, *class_hash, &calldata).await?;
                let salt = resolve_salt(*salt, *unique);
                let address =
                    udc_deployed_address(account.address(), *class_hash, salt, *unique, &calldata);
                if let Some(id) = id {
                    ids.insert(id.as_str(), address);
                }
                deployed.push(address);
                calls.push(udc_deploy_call(*class_hash, salt, *unique, &calldata));
            }
            MulticallStep::Invoke {
                target,
                entrypoint,
                args,
            } => {
                let address = match target {
                    CallTarget::Address(address) => *address,
                    CallTarget::Id(id) => *ids
                        .get(id.as_str())
                        .ok_or_else(|| config_error(format!("Unknown multicall id '{}'", id)))?,
                };
                let calldata = encode_args(args)?;
                // Contracts created earlier in the bundle do not exist yet
                if !deployed.contains(&address) {
                    check_entrypoint(ctx, address, entrypoint).await?;
                }
                calls.push(ContractCall::new(address, entrypoint, calldata)?);
            }
        }
    }

    info!(
        "Submitting multicall with {} calls ({} deployments)",
        calls.len(),
        deployed.len()
    );
    let kind = TransactionKind::Invoke { calls };
    let submission = ctx.sender().submit(account, &kind, plan.fee).await?;
    settle(ctx, account, &submission).await?;

    Ok(MulticallResult {
        transaction_hash: submission.transaction_hash,
        deployed,
    })
}
