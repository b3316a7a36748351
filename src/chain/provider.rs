//! JSON-RPC node client with multi-endpoint failover and retries

use super::retry::RetryPolicy;
use super::{
    BlockId, BroadcastedDeclare, BroadcastedInvoke, BroadcastedTransaction, DeclareAck,
    ExecutionStatus, FeeEstimate, FunctionCall, NodeClient, NodeError, NodeResult,
    TransactionStatus,
};
use crate::codec::felt::{serde_hex, serde_hex_vec};
use crate::error::{ScriptError, ScriptResult};
use crate::types::{ClassHash, ContractAddress, TransactionHash};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use starknet_crypto::FieldElement;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    /// Flatten `data` into the most useful string the node gave us
    fn into_node_error(self) -> NodeError {
        let data = self.data.map(|data| match data {
            Value::String(text) => text,
            Value::Object(ref fields) => fields
                .get("revert_error")
                .or_else(|| fields.get("execution_error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
            other => other.to_string(),
        });
        NodeError::Rpc {
            code: self.code,
            message: self.message,
            data,
        }
    }
}

#[derive(Deserialize)]
struct Felt(#[serde(with = "serde_hex")] FieldElement);

#[derive(Deserialize)]
struct Felts(#[serde(with = "serde_hex_vec")] Vec<FieldElement>);

#[derive(Deserialize)]
struct InvokeAck {
    transaction_hash: TransactionHash,
}

#[derive(Deserialize)]
struct ReceiptRevert {
    #[serde(default)]
    revert_reason: Option<String>,
}

/// Node client speaking Starknet JSON-RPC over HTTP
pub struct JsonRpcNode {
    /// Endpoints in failover order
    urls: Vec<String>,
    /// Current active endpoint index
    current: AtomicUsize,
    client: reqwest::Client,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl JsonRpcNode {
    /// Create a client over one or more endpoints
    pub fn new(
        urls: Vec<String>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> ScriptResult<Self> {
        if urls.is_empty() {
            return Err(ScriptError::Config("No RPC URLs configured".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ScriptError::Config(format!("Failed to build HTTP client: {}", e)))?;

        for url in &urls {
            debug!("Added RPC endpoint: {}", url);
        }

        Ok(Self {
            urls,
            current: AtomicUsize::new(0),
            client,
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    /// Active endpoint
    pub fn endpoint(&self) -> &str {
        let idx = self.current.load(Ordering::Relaxed);
        &self.urls[idx % self.urls.len()]
    }

    /// Switch to the next endpoint
    pub fn failover(&self) {
        if self.urls.len() < 2 {
            return;
        }
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.urls.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("RPC failover to endpoint {} ({})", next, self.urls[next]);
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> NodeResult<R> {
        let params = &params;
        self.retry
            .run(method, move || self.send_once(method, params))
            .await
    }

    async fn send_once<R: DeserializeOwned>(&self, method: &str, params: &Value) -> NodeResult<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = match self.client.post(self.endpoint()).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    NodeError::Timeout(e.to_string())
                } else {
                    NodeError::Transport(e.to_string())
                };
                self.failover();
                return Err(error);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                self.failover();
            }
            return Err(NodeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| NodeError::Decode(format!("{}: {}", method, e)))?;

        if let Some(error) = envelope.error {
            return Err(error.into_node_error());
        }
        let result = envelope
            .result
            .ok_or_else(|| NodeError::Decode(format!("{}: response has no result", method)))?;
        serde_json::from_value(result).map_err(|e| NodeError::Decode(format!("{}: {}", method, e)))
    }

    /// Revert reason from the receipt, if the node has one
    async fn revert_reason(&self, transaction_hash: TransactionHash) -> Option<String> {
        let receipt: NodeResult<ReceiptRevert> = self
            .request(
                "starknet_getTransactionReceipt",
                json!({ "transaction_hash": transaction_hash }),
            )
            .await;
        match receipt {
            Ok(receipt) => receipt.revert_reason,
            Err(e) => {
                warn!("Failed to fetch receipt for {}: {}", transaction_hash, e);
                None
            }
        }
    }
}

#[async_trait]
impl NodeClient for JsonRpcNode {
    async fn chain_id(&self) -> NodeResult<FieldElement> {
        let Felt(chain_id) = self.request("starknet_chainId", json!([])).await?;
        Ok(chain_id)
    }

    async fn nonce(&self, block: BlockId, address: ContractAddress) -> NodeResult<FieldElement> {
        let Felt(nonce) = self
            .request(
                "starknet_getNonce",
                json!({ "block_id": block, "contract_address": address }),
            )
            .await?;
        Ok(nonce)
    }

    async fn class(&self, block: BlockId, class_hash: ClassHash) -> NodeResult<Value> {
        self.request(
            "starknet_getClass",
            json!({ "block_id": block, "class_hash": class_hash }),
        )
        .await
    }

    async fn class_at(&self, block: BlockId, address: ContractAddress) -> NodeResult<Value> {
        self.request(
            "starknet_getClassAt",
            json!({ "block_id": block, "contract_address": address }),
        )
        .await
    }

    async fn estimate_fee(
        &self,
        transaction: BroadcastedTransaction,
        block: BlockId,
    ) -> NodeResult<FeeEstimate> {
        let estimates: Vec<FeeEstimate> = self
            .request(
                "starknet_estimateFee",
                json!({
                    "request": [transaction],
                    "simulation_flags": [],
                    "block_id": block,
                }),
            )
            .await?;
        estimates
            .into_iter()
            .next()
            .ok_or_else(|| NodeError::Decode("starknet_estimateFee: empty estimate list".into()))
    }

    async fn add_invoke_transaction(
        &self,
        transaction: BroadcastedInvoke,
    ) -> NodeResult<TransactionHash> {
        let ack: InvokeAck = self
            .request(
                "starknet_addInvokeTransaction",
                json!({ "invoke_transaction": BroadcastedTransaction::Invoke(transaction) }),
            )
            .await?;
        Ok(ack.transaction_hash)
    }

    async fn add_declare_transaction(
        &self,
        transaction: BroadcastedDeclare,
    ) -> NodeResult<DeclareAck> {
        self.request(
            "starknet_addDeclareTransaction",
            json!({ "declare_transaction": BroadcastedTransaction::Declare(transaction) }),
        )
        .await
    }

    async fn transaction_status(
        &self,
        transaction_hash: TransactionHash,
    ) -> NodeResult<TransactionStatus> {
        let mut status: TransactionStatus = self
            .request(
                "starknet_getTransactionStatus",
                json!({ "transaction_hash": transaction_hash }),
            )
            .await?;

        if status.execution_status == Some(ExecutionStatus::Reverted)
            && status.failure_reason.is_none()
        {
            status.failure_reason = self.revert_reason(transaction_hash).await;
        }
        Ok(status)
    }

    async fn call(&self, request: FunctionCall, block: BlockId) -> NodeResult<Vec<FieldElement>> {
        let Felts(data) = self
            .request(
                "starknet_call",
                json!({ "request": request, "block_id": block }),
            )
            .await?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FinalityStatus;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node(urls: Vec<String>, attempts: u32) -> JsonRpcNode {
        JsonRpcNode::new(
            urls,
            Duration::from_secs(5),
            RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(5)),
        )
        .unwrap()
    }

    fn rpc_result(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    fn rpc_error(code: i64, message: &str, data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": code, "message": message, "data": data}
        }))
    }

    #[test]
    fn test_requires_an_endpoint() {
        assert!(matches!(
            JsonRpcNode::new(vec![], Duration::from_secs(1), RetryPolicy::default()),
            Err(ScriptError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_chain_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "starknet_chainId"})))
            .respond_with(rpc_result(json!("0x534e5f5345504f4c4941")))
            .mount(&server)
            .await;

        let node = node(vec![server.uri()], 1);
        assert_eq!(
            node.chain_id().await.unwrap(),
            crate::codec::short_string("SN_SEPOLIA").unwrap()
        );
    }

    #[tokio::test]
    async fn test_rpc_error_carries_revert_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "starknet_call"})))
            .respond_with(rpc_error(
                40,
                "Contract error",
                json!({"revert_error": "Error in the called contract"}),
            ))
            .mount(&server)
            .await;

        let node = node(vec![server.uri()], 3);
        let request = FunctionCall {
            contract_address: ContractAddress::new(FieldElement::ONE),
            entry_point_selector: FieldElement::TWO,
            calldata: vec![],
        };
        let error = node.call(request, BlockId::Latest).await.unwrap_err();
        assert_eq!(
            error,
            NodeError::Rpc {
                code: 40,
                message: "Contract error".into(),
                data: Some("Error in the called contract".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "starknet_getNonce"})))
            .respond_with(rpc_result(json!("0x5")))
            .expect(1)
            .mount(&server)
            .await;

        let node = node(vec![server.uri()], 3);
        let nonce = node
            .nonce(BlockId::Pending, ContractAddress::new(FieldElement::ONE))
            .await
            .unwrap();
        assert_eq!(nonce, FieldElement::from(5u64));
    }

    #[tokio::test]
    async fn test_surfaces_last_error_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(2)
            .mount(&server)
            .await;

        let node = node(vec![server.uri()], 2);
        let error = node.chain_id().await.unwrap_err();
        assert_eq!(
            error,
            NodeError::Http {
                status: 502,
                body: "bad gateway".into()
            }
        );
        assert!(matches!(
            error.into_script_error("starknet_chainId"),
            ScriptError::Network { .. }
        ));
    }

    #[tokio::test]
    async fn test_fails_over_to_next_endpoint() {
        let broken = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&broken)
            .await;
        let healthy = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_result(json!("0x1")))
            .mount(&healthy)
            .await;

        let node = node(vec![broken.uri(), healthy.uri()], 2);
        assert_eq!(node.chain_id().await.unwrap(), FieldElement::ONE);
        assert_eq!(node.endpoint(), healthy.uri());
    }

    #[tokio::test]
    async fn test_estimate_fee_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "starknet_estimateFee",
                "params": {"simulation_flags": [], "block_id": "pending"}
            })))
            .respond_with(rpc_result(json!([{
                "gas_consumed": "0x10",
                "gas_price": "0x2",
                "overall_fee": "0x20"
            }])))
            .mount(&server)
            .await;

        let node = node(vec![server.uri()], 1);
        let tx = BroadcastedTransaction::Invoke(BroadcastedInvoke {
            sender_address: ContractAddress::new(FieldElement::ONE),
            calldata: vec![],
            max_fee: FieldElement::ZERO,
            version: FieldElement::ONE,
            signature: vec![],
            nonce: FieldElement::ZERO,
        });
        let estimate = node.estimate_fee(tx, BlockId::Pending).await.unwrap();
        assert_eq!(estimate.overall_fee, FieldElement::from(0x20u64));
        assert_eq!(estimate.gas_consumed, Some(FieldElement::from(0x10u64)));
    }

    #[tokio::test]
    async fn test_reverted_status_fetches_receipt_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "starknet_getTransactionStatus"})))
            .respond_with(rpc_result(json!({
                "finality_status": "ACCEPTED_ON_L2",
                "execution_status": "REVERTED"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "starknet_getTransactionReceipt"})))
            .respond_with(rpc_result(json!({
                "execution_status": "REVERTED",
                "revert_reason": "Error in the called contract"
            })))
            .mount(&server)
            .await;

        let node = node(vec![server.uri()], 1);
        let hash = TransactionHash::new(FieldElement::from(0xabcu64)).unwrap();
        let status = node.transaction_status(hash).await.unwrap();
        assert_eq!(status.finality_status, FinalityStatus::AcceptedOnL2);
        assert_eq!(
            status.failure_reason.as_deref(),
            Some("Error in the called contract")
        );
    }
}
