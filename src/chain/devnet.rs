//! In-memory node used by the test suite.
//!
//! Accepts declares and `__execute__` invokes from registered accounts, checks
//! signatures, nonces and fees the way a sequencer would, deploys through the
//! Universal Deployer, and runs a key/value contract exposing `put` and `get`.

use super::{
    codes, BlockId, BroadcastedDeclare, BroadcastedInvoke, BroadcastedTransaction, DeclareAck,
    ExecutionStatus, FeeEstimate, FinalityStatus, FunctionCall, NodeClient, NodeError, NodeResult,
    TransactionStatus,
};
use crate::codec::address::{udc_deployed_address, UDC_ADDRESS};
use crate::codec::class::sierra_class_hash;
use crate::codec::felt::{selector_from_name, short_string, starknet_keccak};
use crate::codec::tx_hash::{declare_v2_hash, invoke_v1_hash};
use crate::types::{ClassHash, ContractAddress, TransactionHash};

use async_trait::async_trait;
use serde_json::Value;
use starknet_crypto::{get_public_key, verify, FieldElement};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Default)]
struct Ledger {
    classes: HashMap<ClassHash, Value>,
    contracts: HashMap<ContractAddress, ClassHash>,
    storage: HashMap<(ContractAddress, FieldElement), FieldElement>,
    nonces: HashMap<ContractAddress, FieldElement>,
}

#[derive(Default)]
struct DevnetState {
    ledger: Ledger,
    accounts: HashMap<ContractAddress, FieldElement>,
    statuses: HashMap<TransactionHash, TransactionStatus>,
    fee: u128,
    broadcasts: usize,
    estimates: usize,
    injected: Option<NodeError>,
}

pub(crate) struct DevnetNode {
    chain_id: FieldElement,
    state: Mutex<DevnetState>,
}

fn rpc(code: i64, message: &str, data: Option<String>) -> NodeError {
    NodeError::Rpc {
        code,
        message: message.to_string(),
        data,
    }
}

impl DevnetNode {
    pub fn new() -> Self {
        Self {
            chain_id: short_string("SN_SEPOLIA").unwrap(),
            state: Mutex::new(DevnetState {
                fee: 1_000,
                ..Default::default()
            }),
        }
    }

    pub fn chain(&self) -> FieldElement {
        self.chain_id
    }

    /// Register an account contract controlled by `private_key`
    pub fn add_account(&self, address: ContractAddress, private_key: FieldElement) {
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(address, get_public_key(&private_key));
        state.ledger.nonces.entry(address).or_insert(FieldElement::ZERO);
    }

    pub fn set_fee(&self, fee: u128) {
        self.state.lock().unwrap().fee = fee;
    }

    /// Move an account's nonce as if another client had used it
    pub fn set_nonce(&self, address: ContractAddress, nonce: FieldElement) {
        self.state.lock().unwrap().ledger.nonces.insert(address, nonce);
    }

    /// Fail the next broadcast with `error`
    pub fn inject_broadcast_error(&self, error: NodeError) {
        self.state.lock().unwrap().injected = Some(error);
    }

    /// Report `transaction_hash` with the given status from now on
    pub fn set_status(&self, transaction_hash: TransactionHash, status: TransactionStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(transaction_hash, status);
    }

    pub fn broadcast_count(&self) -> usize {
        self.state.lock().unwrap().broadcasts
    }

    pub fn estimate_count(&self) -> usize {
        self.state.lock().unwrap().estimates
    }

    pub fn is_declared(&self, class_hash: ClassHash) -> bool {
        self.state.lock().unwrap().ledger.classes.contains_key(&class_hash)
    }

    pub fn is_deployed(&self, address: ContractAddress) -> bool {
        self.state.lock().unwrap().ledger.contracts.contains_key(&address)
    }

    pub fn storage_at(&self, address: ContractAddress, key: FieldElement) -> FieldElement {
        self.state
            .lock()
            .unwrap()
            .ledger
            .storage
            .get(&(address, key))
            .copied()
            .unwrap_or_default()
    }

    pub fn current_nonce(&self, address: ContractAddress) -> FieldElement {
        self.state
            .lock()
            .unwrap()
            .ledger
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default()
    }
}

/// Run `__execute__` calldata (Cairo 1 layout) against `ledger`
fn execute(
    ledger: &mut Ledger,
    sender: ContractAddress,
    calldata: &[FieldElement],
) -> Result<(), String> {
    let deploy_selector = starknet_keccak(b"deployContract");
    let put_selector = selector_from_name("put").unwrap();

    let mut words = calldata.iter().copied();
    let mut next = || words.next().ok_or_else(|| "calldata too short".to_string());
    let count = felt_to_usize(next()?)?;

    for _ in 0..count {
        let to = ContractAddress::new(next()?);
        let selector = next()?;
        let len = felt_to_usize(next()?)?;
        let data = (0..len).map(|_| next()).collect::<Result<Vec<_>, _>>()?;

        if to.felt() == *UDC_ADDRESS && selector == deploy_selector {
            if data.len() < 4 {
                return Err("deployContract: malformed calldata".into());
            }
            let class_hash = ClassHash::new(data[0]);
            let unique = data[2] != FieldElement::ZERO;
            let ctor_len = felt_to_usize(data[3])?;
            let ctor = data
                .get(4..4 + ctor_len)
                .ok_or_else(|| "deployContract: constructor calldata too short".to_string())?;
            if !ledger.classes.contains_key(&class_hash) {
                return Err(format!("Class with hash {} is not declared", class_hash));
            }
            let address = udc_deployed_address(sender, class_hash, data[1], unique, ctor);
            if ledger.contracts.contains_key(&address) {
                return Err(format!("Requested contract address {} is unavailable", address));
            }
            ledger.contracts.insert(address, class_hash);
            continue;
        }

        if !ledger.contracts.contains_key(&to) {
            return Err(format!("Requested contract address {} is not deployed", to));
        }
        if selector != put_selector || data.len() != 2 {
            return Err("ENTRYPOINT_NOT_FOUND".into());
        }
        ledger.storage.insert((to, data[0]), data[1]);
    }
    Ok(())
}

fn felt_to_usize(value: FieldElement) -> Result<usize, String> {
    u64::try_from(value)
        .map(|v| v as usize)
        .map_err(|_| "length out of range".to_string())
}

fn accepted(execution: ExecutionStatus, failure_reason: Option<String>) -> TransactionStatus {
    TransactionStatus {
        finality_status: FinalityStatus::AcceptedOnL2,
        execution_status: Some(execution),
        failure_reason,
    }
}

impl DevnetState {
    fn check_account(
        &self,
        sender: ContractAddress,
        nonce: FieldElement,
        signature: &[FieldElement],
        hash: FieldElement,
    ) -> NodeResult<()> {
        let public_key = self
            .accounts
            .get(&sender)
            .ok_or_else(|| rpc(codes::CONTRACT_NOT_FOUND, "Contract not found", None))?;
        let expected = self.ledger.nonces.get(&sender).copied().unwrap_or_default();
        if nonce != expected {
            return Err(rpc(codes::INVALID_TRANSACTION_NONCE, "Invalid transaction nonce", None));
        }
        let valid = match signature {
            [r, s] => verify(public_key, &hash, r, s).unwrap_or(false),
            _ => false,
        };
        if !valid {
            return Err(rpc(
                55,
                "Account validation failed",
                Some("invalid signature".into()),
            ));
        }
        Ok(())
    }

    fn check_fee(&self, max_fee: FieldElement) -> NodeResult<()> {
        if max_fee < FieldElement::from(self.fee) {
            return Err(rpc(53, "Max fee is smaller than the minimal transaction cost", None));
        }
        Ok(())
    }

    fn bump_nonce(&mut self, sender: ContractAddress) {
        let nonce = self.ledger.nonces.entry(sender).or_insert(FieldElement::ZERO);
        *nonce += FieldElement::ONE;
    }
}

#[async_trait]
impl NodeClient for DevnetNode {
    async fn chain_id(&self) -> NodeResult<FieldElement> {
        Ok(self.chain_id)
    }

    async fn nonce(&self, _block: BlockId, address: ContractAddress) -> NodeResult<FieldElement> {
        let state = self.state.lock().unwrap();
        state
            .ledger
            .nonces
            .get(&address)
            .copied()
            .ok_or_else(|| rpc(codes::CONTRACT_NOT_FOUND, "Contract not found", None))
    }

    async fn class(&self, _block: BlockId, class_hash: ClassHash) -> NodeResult<Value> {
        let state = self.state.lock().unwrap();
        state
            .ledger
            .classes
            .get(&class_hash)
            .cloned()
            .ok_or_else(|| rpc(codes::CLASS_HASH_NOT_FOUND, "Class hash not found", None))
    }

    async fn class_at(&self, _block: BlockId, address: ContractAddress) -> NodeResult<Value> {
        let state = self.state.lock().unwrap();
        state
            .ledger
            .contracts
            .get(&address)
            .and_then(|class_hash| state.ledger.classes.get(class_hash))
            .cloned()
            .ok_or_else(|| rpc(codes::CONTRACT_NOT_FOUND, "Contract not found", None))
    }

    async fn estimate_fee(
        &self,
        transaction: BroadcastedTransaction,
        _block: BlockId,
    ) -> NodeResult<FeeEstimate> {
        let mut state = self.state.lock().unwrap();
        state.estimates += 1;
        if let BroadcastedTransaction::Invoke(invoke) = &transaction {
            let mut scratch = state.ledger.clone();
            if let Err(reason) = execute(&mut scratch, invoke.sender_address, &invoke.calldata) {
                return Err(rpc(
                    codes::TRANSACTION_EXECUTION_ERROR,
                    "Transaction execution error",
                    Some(reason),
                ));
            }
        }
        Ok(FeeEstimate {
            overall_fee: FieldElement::from(state.fee),
            gas_consumed: Some(FieldElement::from(state.fee)),
            gas_price: Some(FieldElement::ONE),
        })
    }

    async fn add_invoke_transaction(
        &self,
        transaction: BroadcastedInvoke,
    ) -> NodeResult<TransactionHash> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.injected.take() {
            return Err(error);
        }

        let hash = invoke_v1_hash(
            transaction.sender_address.felt(),
            &transaction.calldata,
            transaction.max_fee,
            self.chain_id,
            transaction.nonce,
            false,
        );
        let transaction_hash = TransactionHash::new(hash)
            .ok_or_else(|| NodeError::Decode("zero transaction hash".into()))?;
        if state.statuses.contains_key(&transaction_hash) {
            return Err(rpc(codes::DUPLICATE_TX, "A transaction with the same hash already exists in the mempool", None));
        }

        state.check_account(
            transaction.sender_address,
            transaction.nonce,
            &transaction.signature,
            hash,
        )?;
        state.check_fee(transaction.max_fee)?;
        state.broadcasts += 1;
        state.bump_nonce(transaction.sender_address);

        let mut scratch = state.ledger.clone();
        let status = match execute(&mut scratch, transaction.sender_address, &transaction.calldata) {
            Ok(()) => {
                state.ledger = scratch;
                accepted(ExecutionStatus::Succeeded, None)
            }
            Err(reason) => accepted(ExecutionStatus::Reverted, Some(reason)),
        };
        state.statuses.insert(transaction_hash, status);
        Ok(transaction_hash)
    }

    async fn add_declare_transaction(
        &self,
        transaction: BroadcastedDeclare,
    ) -> NodeResult<DeclareAck> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.injected.take() {
            return Err(error);
        }

        let class_hash = sierra_class_hash(&transaction.contract_class);
        if state.ledger.classes.contains_key(&class_hash) {
            return Err(rpc(codes::CLASS_ALREADY_DECLARED, "Class already declared", None));
        }

        let hash = declare_v2_hash(
            transaction.sender_address.felt(),
            class_hash.felt(),
            transaction.compiled_class_hash,
            transaction.max_fee,
            self.chain_id,
            transaction.nonce,
            false,
        );
        state.check_account(
            transaction.sender_address,
            transaction.nonce,
            &transaction.signature,
            hash,
        )?;
        state.check_fee(transaction.max_fee)?;
        state.broadcasts += 1;
        state.bump_nonce(transaction.sender_address);

        let definition = serde_json::to_value(&transaction.contract_class)
            .map_err(|e| NodeError::Decode(e.to_string()))?;
        state.ledger.classes.insert(class_hash, definition);

        let transaction_hash = TransactionHash::new(hash)
            .ok_or_else(|| NodeError::Decode("zero transaction hash".into()))?;
        state
            .statuses
            .insert(transaction_hash, accepted(ExecutionStatus::Succeeded, None));
        Ok(DeclareAck {
            transaction_hash,
            class_hash,
        })
    }

    async fn transaction_status(
        &self,
        transaction_hash: TransactionHash,
    ) -> NodeResult<TransactionStatus> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(&transaction_hash)
            .cloned()
            .ok_or_else(|| rpc(codes::TXN_HASH_NOT_FOUND, "Transaction hash not found", None))
    }

    async fn call(&self, request: FunctionCall, _block: BlockId) -> NodeResult<Vec<FieldElement>> {
        let state = self.state.lock().unwrap();
        if !state.ledger.contracts.contains_key(&request.contract_address) {
            return Err(rpc(codes::CONTRACT_NOT_FOUND, "Contract not found", None));
        }
        let get_selector = selector_from_name("get").unwrap();
        match request.calldata.as_slice() {
            [key] if request.entry_point_selector == get_selector => Ok(vec![state
                .ledger
                .storage
                .get(&(request.contract_address, *key))
                .copied()
                .unwrap_or_default()]),
            _ => Err(rpc(
                codes::CONTRACT_ERROR,
                "Contract error",
                Some(format!(
                    "Entry point EntryPointSelector({:#x}) not found in contract.",
                    request.entry_point_selector
                )),
            )),
        }
    }
}
