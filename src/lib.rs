//! StarkScript - transaction orchestration for Starknet deployment scripts
//!
//! Turns declare, deploy, invoke and call intents into signed transactions,
//! submits them through a JSON-RPC node and tracks them to finality.
//!
//! ```no_run
//! use starkscript::{deploy, declare, DeclareRequest, DeployRequest, ExecutionContext, Settings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! starkscript::init_logging();
//! let settings = Settings::load()?;
//! let ctx = ExecutionContext::from_settings(&settings).await?;
//!
//! let declared = declare(&ctx, DeclareRequest::new(ctx.named_class("Mapa"))).await?;
//! let deployed = deploy(&ctx, DeployRequest::new(declared.class_hash)).await?;
//! println!("deployed at {}", deployed.contract_address);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod ops;
pub mod output;
pub mod tx;
pub mod types;

pub use chain::{BlockId, JsonRpcNode, NodeClient};
pub use codec::{Arg, ClassSource};
pub use config::Settings;
pub use context::ExecutionContext;
pub use error::{Rejection, ScriptError, ScriptResult};
pub use ops::{
    await_confirmation, call, declare, deploy, invoke, multicall, CallRequest, CallTarget,
    DeclareRequest, DeployRequest, InvokeRequest, MulticallPlan, MulticallStep,
};
pub use output::ValueFormat;
pub use starknet_crypto::FieldElement;
pub use types::{
    CallResult, ClassHash, Confirmation, ContractAddress, DeclareResult, DeployResult,
    FeeCeiling, InvokeResult, MulticallResult, Salt, TransactionHash, TransactionOutcome, WaitFor,
};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Does nothing if a subscriber is
/// already installed.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,starkscript=debug,reqwest=warn,hyper=warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
