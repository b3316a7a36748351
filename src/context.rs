//! Execution context threaded through every operation

use crate::chain::{
    codes, BlockId, ConfirmationPolicy, ConfirmationTracker, JsonRpcNode, NodeClient,
};
use crate::codec::ClassSource;
use crate::config::Settings;
use crate::error::{ScriptError, ScriptResult};
use crate::metrics::ScriptMetrics;
use crate::ops::abi::ContractAbi;
use crate::tx::{Account, FeeEstimator, TransactionSender};
use crate::types::{ContractAddress, WaitFor};

use dashmap::DashMap;
use starknet_crypto::FieldElement;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default deadline for a confirmation wait
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Node, account and policies an operation runs with.
///
/// Cloning is cheap and clones share the nonce sequencer, the ABI cache
/// and the metrics registry.
#[derive(Clone)]
pub struct ExecutionContext {
    node: Arc<dyn NodeClient>,
    account: Option<Account>,
    chain_id: FieldElement,
    sender: Arc<TransactionSender>,
    tracker: ConfirmationTracker,
    wait_for: WaitFor,
    confirmation_timeout: Duration,
    target_dir: PathBuf,
    abi_cache: Arc<DashMap<ContractAddress, Arc<ContractAbi>>>,
    metrics: Arc<ScriptMetrics>,
}

impl ExecutionContext {
    /// Context over `node` with default policies and no account
    pub fn new(node: Arc<dyn NodeClient>, chain_id: FieldElement) -> ScriptResult<Self> {
        let metrics = Arc::new(
            ScriptMetrics::new()
                .map_err(|e| ScriptError::Internal(format!("Failed to create metrics: {}", e)))?,
        );
        let sender = Arc::new(TransactionSender::new(
            node.clone(),
            chain_id,
            FeeEstimator::default(),
            metrics.clone(),
        ));
        let tracker = ConfirmationTracker::new(node.clone(), ConfirmationPolicy::default());

        Ok(Self {
            node,
            account: None,
            chain_id,
            sender,
            tracker,
            wait_for: WaitFor::default(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            target_dir: PathBuf::from("target/dev"),
            abi_cache: Arc::new(DashMap::new()),
            metrics,
        })
    }

    /// Ask the node for its chain id and build a context around it
    pub async fn connect(node: Arc<dyn NodeClient>) -> ScriptResult<Self> {
        let chain_id = node
            .chain_id()
            .await
            .map_err(|e| e.into_script_error("starknet_chainId"))?;
        info!("Connected to chain {:#x}", chain_id);
        Self::new(node, chain_id)
    }

    /// Build the node client, account and policies from settings
    pub async fn from_settings(settings: &Settings) -> ScriptResult<Self> {
        let node = JsonRpcNode::new(
            settings.network.rpc_urls.clone(),
            settings.request_timeout(),
            settings.retry_policy(),
        )?;
        let account = settings
            .build_account()
            .map_err(|e| ScriptError::Config(format!("{:#}", e)))?;

        let mut context = Self::connect(Arc::new(node))
            .await?
            .with_fee_estimator(settings.fee_estimator())
            .with_confirmation_policy(settings.confirmation_policy())
            .with_wait_for(settings.transactions.wait_for)
            .with_confirmation_timeout(settings.confirmation_timeout())
            .with_target_dir(settings.artifacts.target_dir.clone());
        if let Some(account) = account {
            context = context.with_account(account);
        }
        Ok(context)
    }

    pub fn with_account(mut self, account: Account) -> Self {
        debug!("Acting account: {}", account.address());
        self.account = Some(account);
        self
    }

    pub fn with_wait_for(mut self, wait_for: WaitFor) -> Self {
        self.wait_for = wait_for;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_confirmation_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.tracker = ConfirmationTracker::new(self.node.clone(), policy);
        self
    }

    /// Replaces the sender; call before any submission
    pub fn with_fee_estimator(mut self, fees: FeeEstimator) -> Self {
        self.sender = Arc::new(TransactionSender::new(
            self.node.clone(),
            self.chain_id,
            fees,
            self.metrics.clone(),
        ));
        self
    }

    pub fn with_target_dir(mut self, target_dir: impl Into<PathBuf>) -> Self {
        self.target_dir = target_dir.into();
        self
    }

    pub fn node(&self) -> &dyn NodeClient {
        self.node.as_ref()
    }

    /// Account for state-changing operations
    pub fn account(&self) -> ScriptResult<&Account> {
        self.account.as_ref().ok_or(ScriptError::MissingAccount)
    }

    pub fn chain_id(&self) -> FieldElement {
        self.chain_id
    }

    pub fn sender(&self) -> &TransactionSender {
        &self.sender
    }

    pub fn tracker(&self) -> &ConfirmationTracker {
        &self.tracker
    }

    pub fn wait_for(&self) -> WaitFor {
        self.wait_for
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Class source for a contract built into the target directory
    pub fn named_class(&self, name: &str) -> ClassSource {
        ClassSource::named(name, self.target_dir.clone())
    }

    pub fn metrics(&self) -> &ScriptMetrics {
        &self.metrics
    }

    /// ABI of the contract at `address`, cached per context.
    ///
    /// Fails with `ContractNotFound` when nothing is deployed there; `None`
    /// when the class has no readable ABI.
    pub async fn contract_abi(
        &self,
        address: ContractAddress,
    ) -> ScriptResult<Option<Arc<ContractAbi>>> {
        if let Some(abi) = self.abi_cache.get(&address) {
            return Ok(Some(abi.value().clone()));
        }

        let class = match self.node.class_at(BlockId::Pending, address).await {
            Ok(class) => class,
            Err(e) if e.code() == Some(codes::CONTRACT_NOT_FOUND) => {
                return Err(ScriptError::ContractNotFound(address))
            }
            Err(e) => return Err(e.into_script_error("starknet_getClassAt")),
        };

        let abi = match ContractAbi::from_class(&class) {
            Some(abi) => Arc::new(abi),
            None => {
                debug!("Contract {} has no readable ABI", address);
                return Ok(None);
            }
        };
        self.abi_cache.insert(address, abi.clone());
        Ok(Some(abi))
    }
}
