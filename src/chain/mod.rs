//! Chain module - the node boundary
//!
//! This module provides:
//! - The `NodeClient` trait every operation talks to
//! - A JSON-RPC implementation with endpoint failover and retries
//! - The confirmation tracker that polls transactions to a terminal state

pub mod finality;
pub mod provider;
pub mod retry;

#[cfg(test)]
pub(crate) mod devnet;

pub use finality::{ConfirmationPolicy, ConfirmationTracker, PollState, PollStep};
pub use provider::JsonRpcNode;
pub use retry::RetryPolicy;

use crate::codec::felt::{serde_hex, serde_hex_vec};
use crate::codec::FlattenedSierraClass;
use crate::error::{Rejection, ScriptError};
use crate::types::{ClassHash, ContractAddress, TransactionHash};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use starknet_crypto::FieldElement;
use thiserror::Error;

/// Node error codes the pipeline reacts to
pub mod codes {
    pub const CONTRACT_NOT_FOUND: i64 = 20;
    pub const BLOCK_NOT_FOUND: i64 = 24;
    pub const CLASS_HASH_NOT_FOUND: i64 = 28;
    pub const TXN_HASH_NOT_FOUND: i64 = 29;
    pub const CONTRACT_ERROR: i64 = 40;
    pub const TRANSACTION_EXECUTION_ERROR: i64 = 41;
    pub const CLASS_ALREADY_DECLARED: i64 = 51;
    pub const INVALID_TRANSACTION_NONCE: i64 = 52;
    pub const DUPLICATE_TX: i64 = 59;
}

/// Errors at the node boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl NodeError {
    /// Connection failures, timeouts, 5xx and rate limits are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            NodeError::Transport(_) | NodeError::Timeout(_) => true,
            NodeError::Http { status, .. } => *status >= 500 || *status == 429,
            NodeError::Rpc { .. } | NodeError::Decode(_) => false,
        }
    }

    /// RPC error code, if the node answered with one
    pub fn code(&self) -> Option<i64> {
        match self {
            NodeError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Translate into the caller-facing taxonomy
    pub fn into_script_error(self, operation: &str) -> ScriptError {
        match self {
            NodeError::Transport(message) | NodeError::Timeout(message) => ScriptError::Network {
                operation: operation.to_string(),
                message,
            },
            NodeError::Http { status, body } => ScriptError::Network {
                operation: operation.to_string(),
                message: format!("HTTP {}: {}", status, body),
            },
            NodeError::Decode(message) => ScriptError::UnexpectedResponse(message),
            NodeError::Rpc {
                code,
                message,
                data,
            } => {
                if let Some(reason) = Rejection::from_code(code, &message, data.as_deref()) {
                    return ScriptError::Rejected {
                        transaction_hash: None,
                        reason,
                    };
                }
                match code {
                    codes::CONTRACT_ERROR | codes::TRANSACTION_EXECUTION_ERROR => {
                        ScriptError::ExecutionReverted {
                            reason: data.unwrap_or(message),
                        }
                    }
                    _ => ScriptError::Node { code, message },
                }
            }
        }
    }
}

/// Result type for node calls
pub type NodeResult<T> = Result<T, NodeError>;

/// Block a read is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockId {
    #[default]
    Latest,
    Pending,
    Number(u64),
    Hash(FieldElement),
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct ByNumber {
            block_number: u64,
        }
        #[derive(Serialize)]
        struct ByHash {
            #[serde(with = "serde_hex")]
            block_hash: FieldElement,
        }

        match self {
            BlockId::Latest => serializer.serialize_str("latest"),
            BlockId::Pending => serializer.serialize_str("pending"),
            BlockId::Number(block_number) => ByNumber {
                block_number: *block_number,
            }
            .serialize(serializer),
            BlockId::Hash(block_hash) => ByHash {
                block_hash: *block_hash,
            }
            .serialize(serializer),
        }
    }
}

impl std::str::FromStr for BlockId {
    type Err = crate::codec::FeltError;

    /// `latest`, `pending`, a block number, or a `0x` block hash
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(BlockId::Latest),
            "pending" => Ok(BlockId::Pending),
            hash if hash.starts_with("0x") => crate::codec::felt::parse_felt(hash).map(BlockId::Hash),
            number => number
                .parse::<u64>()
                .map(BlockId::Number)
                .map_err(|_| crate::codec::FeltError::InvalidLiteral(number.to_string())),
        }
    }
}

/// Read-only call request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCall {
    pub contract_address: ContractAddress,
    #[serde(with = "serde_hex")]
    pub entry_point_selector: FieldElement,
    #[serde(with = "serde_hex_vec")]
    pub calldata: Vec<FieldElement>,
}

/// Signed INVOKE v1 as sent to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastedInvoke {
    pub sender_address: ContractAddress,
    #[serde(with = "serde_hex_vec")]
    pub calldata: Vec<FieldElement>,
    #[serde(with = "serde_hex")]
    pub max_fee: FieldElement,
    #[serde(with = "serde_hex")]
    pub version: FieldElement,
    #[serde(with = "serde_hex_vec")]
    pub signature: Vec<FieldElement>,
    #[serde(with = "serde_hex")]
    pub nonce: FieldElement,
}

/// Signed DECLARE v2 as sent to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastedDeclare {
    pub sender_address: ContractAddress,
    #[serde(with = "serde_hex")]
    pub compiled_class_hash: FieldElement,
    #[serde(with = "serde_hex")]
    pub max_fee: FieldElement,
    #[serde(with = "serde_hex")]
    pub version: FieldElement,
    #[serde(with = "serde_hex_vec")]
    pub signature: Vec<FieldElement>,
    #[serde(with = "serde_hex")]
    pub nonce: FieldElement,
    pub contract_class: FlattenedSierraClass,
}

/// Any transaction the pipeline can estimate or broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum BroadcastedTransaction {
    #[serde(rename = "INVOKE")]
    Invoke(BroadcastedInvoke),
    #[serde(rename = "DECLARE")]
    Declare(BroadcastedDeclare),
}

/// Fee simulation result
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeeEstimate {
    #[serde(with = "serde_hex")]
    pub overall_fee: FieldElement,
    #[serde(default, with = "option_hex")]
    pub gas_consumed: Option<FieldElement>,
    #[serde(default, with = "option_hex")]
    pub gas_price: Option<FieldElement>,
}

/// Node acknowledgement of a DECLARE
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeclareAck {
    pub transaction_hash: TransactionHash,
    pub class_hash: ClassHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalityStatus {
    Received,
    Rejected,
    AcceptedOnL2,
    AcceptedOnL1,
    /// Anything a newer node reports that this client does not know
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Reverted,
}

/// Status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionStatus {
    pub finality_status: FinalityStatus,
    #[serde(default)]
    pub execution_status: Option<ExecutionStatus>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

mod option_hex {
    use crate::codec::felt::parse_felt;
    use serde::{Deserialize, Deserializer};
    use starknet_crypto::FieldElement;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<FieldElement>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|value| parse_felt(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Node operations the orchestration layer depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Chain identifier used in transaction hashes
    async fn chain_id(&self) -> NodeResult<FieldElement>;

    /// Next nonce of `address` at `block`
    async fn nonce(&self, block: BlockId, address: ContractAddress) -> NodeResult<FieldElement>;

    /// Class definition by hash, as raw JSON
    async fn class(&self, block: BlockId, class_hash: ClassHash) -> NodeResult<serde_json::Value>;

    /// Class definition of the contract deployed at `address`
    async fn class_at(
        &self,
        block: BlockId,
        address: ContractAddress,
    ) -> NodeResult<serde_json::Value>;

    /// Simulate `transaction` and return its cost
    async fn estimate_fee(
        &self,
        transaction: BroadcastedTransaction,
        block: BlockId,
    ) -> NodeResult<FeeEstimate>;

    async fn add_invoke_transaction(
        &self,
        transaction: BroadcastedInvoke,
    ) -> NodeResult<TransactionHash>;

    async fn add_declare_transaction(
        &self,
        transaction: BroadcastedDeclare,
    ) -> NodeResult<DeclareAck>;

    /// Current status; the revert reason is filled in when available
    async fn transaction_status(
        &self,
        transaction_hash: TransactionHash,
    ) -> NodeResult<TransactionStatus>;

    /// Execute a read-only call
    async fn call(&self, request: FunctionCall, block: BlockId) -> NodeResult<Vec<FieldElement>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_wire_format() {
        assert_eq!(serde_json::to_value(BlockId::Latest).unwrap(), "latest");
        assert_eq!(serde_json::to_value(BlockId::Pending).unwrap(), "pending");
        assert_eq!(
            serde_json::to_value(BlockId::Number(7)).unwrap(),
            serde_json::json!({"block_number": 7})
        );
        assert_eq!(
            serde_json::to_value(BlockId::Hash(FieldElement::from(0xabu64))).unwrap(),
            serde_json::json!({"block_hash": "0xab"})
        );
        assert_eq!("12".parse::<BlockId>().unwrap(), BlockId::Number(12));
        assert_eq!("pending".parse::<BlockId>().unwrap(), BlockId::Pending);
        assert!("yesterday".parse::<BlockId>().is_err());
    }

    #[test]
    fn test_invoke_wire_format() {
        let tx = BroadcastedTransaction::Invoke(BroadcastedInvoke {
            sender_address: ContractAddress::new(FieldElement::from(0x1u64)),
            calldata: vec![FieldElement::from(0x2u64)],
            max_fee: FieldElement::from(0x3u64),
            version: FieldElement::ONE,
            signature: vec![FieldElement::from(0x4u64), FieldElement::from(0x5u64)],
            nonce: FieldElement::ZERO,
        });
        assert_eq!(
            serde_json::to_value(&tx).unwrap(),
            serde_json::json!({
                "type": "INVOKE",
                "sender_address": "0x1",
                "calldata": ["0x2"],
                "max_fee": "0x3",
                "version": "0x1",
                "signature": ["0x4", "0x5"],
                "nonce": "0x0"
            })
        );
    }

    #[test]
    fn test_status_parsing_tolerates_unknown_values() {
        let status: TransactionStatus = serde_json::from_value(serde_json::json!({
            "finality_status": "ACCEPTED_ON_L2",
            "execution_status": "REVERTED"
        }))
        .unwrap();
        assert_eq!(status.finality_status, FinalityStatus::AcceptedOnL2);
        assert_eq!(status.execution_status, Some(ExecutionStatus::Reverted));

        let status: TransactionStatus = serde_json::from_value(serde_json::json!({
            "finality_status": "PRE_CONFIRMED"
        }))
        .unwrap();
        assert_eq!(status.finality_status, FinalityStatus::Unknown);
    }

    #[test]
    fn test_node_error_mapping() {
        assert!(NodeError::Transport("reset".into()).is_transient());
        assert!(NodeError::Http { status: 503, body: String::new() }.is_transient());
        assert!(NodeError::Http { status: 429, body: String::new() }.is_transient());
        assert!(!NodeError::Http { status: 400, body: String::new() }.is_transient());

        let rpc = NodeError::Rpc {
            code: codes::INVALID_TRANSACTION_NONCE,
            message: "Invalid transaction nonce".into(),
            data: None,
        };
        assert!(!rpc.is_transient());
        assert!(matches!(
            rpc.into_script_error("starknet_addInvokeTransaction"),
            ScriptError::Rejected { reason: Rejection::InvalidNonce, .. }
        ));

        let reverted = NodeError::Rpc {
            code: codes::CONTRACT_ERROR,
            message: "Contract error".into(),
            data: Some("assertion failed".into()),
        };
        assert!(matches!(
            reverted.into_script_error("starknet_call"),
            ScriptError::ExecutionReverted { reason } if reason == "assertion failed"
        ));

        assert!(matches!(
            NodeError::Timeout("30s".into()).into_script_error("starknet_chainId"),
            ScriptError::Network { .. }
        ));
    }
}
