//! Calldata encoding: user arguments, account `__execute__` payloads and
//! Universal Deployer calls

use super::address::UDC_ADDRESS;
use super::felt::{parse_felt, selector_from_name, short_string, FeltError};
use crate::types::{ClassHash, ContractAddress};

use serde::Deserialize;
use starknet_crypto::FieldElement;
use std::fmt;

/// A single calldata argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Already encoded
    Felt(FieldElement),
    /// Text such as `0x1f`, `31`, `-1` or `'hello'`
    Raw(String),
}

impl Arg {
    /// Encode into a field element
    pub fn encode(&self) -> Result<FieldElement, FeltError> {
        match self {
            Arg::Felt(value) => Ok(*value),
            Arg::Raw(text) => encode_text(text),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Felt(value) => write!(f, "{:#x}", value),
            Arg::Raw(text) => f.write_str(text),
        }
    }
}

impl From<FieldElement> for Arg {
    fn from(value: FieldElement) -> Self {
        Arg::Felt(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Raw(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Raw(value)
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        Arg::Felt(value.into())
    }
}

impl From<u128> for Arg {
    fn from(value: u128) -> Self {
        Arg::Felt(value.into())
    }
}

impl From<ContractAddress> for Arg {
    fn from(value: ContractAddress) -> Self {
        Arg::Felt(value.felt())
    }
}

impl From<ClassHash> for Arg {
    fn from(value: ClassHash) -> Self {
        Arg::Felt(value.felt())
    }
}

fn encode_text(text: &str) -> Result<FieldElement, FeltError> {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return short_string(inner);
    }
    if let Some(magnitude) = trimmed.strip_prefix('-') {
        return parse_felt(magnitude).map(|value| -value);
    }
    parse_felt(trimmed)
}

/// Encode every argument, failing on the first bad one
pub fn encode_args(args: &[Arg]) -> Result<Vec<FieldElement>, FeltError> {
    args.iter().map(Arg::encode).collect()
}

/// One call inside an account transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: ContractAddress,
    pub selector: FieldElement,
    pub calldata: Vec<FieldElement>,
}

impl ContractCall {
    /// Build a call by entry point name
    pub fn new(
        to: ContractAddress,
        entrypoint: &str,
        calldata: Vec<FieldElement>,
    ) -> Result<Self, FeltError> {
        Ok(Self {
            to,
            selector: selector_from_name(entrypoint)?,
            calldata,
        })
    }
}

/// Layout the account contract expects for `__execute__`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionEncoding {
    /// Cairo 1 accounts: calls are laid out one after another
    #[default]
    New,
    /// Cairo 0 accounts: call headers with offsets, then one shared data array
    Legacy,
}

/// Flatten calls into `__execute__` calldata
pub fn encode_execute(calls: &[ContractCall], encoding: ExecutionEncoding) -> Vec<FieldElement> {
    let mut encoded = vec![FieldElement::from(calls.len())];

    match encoding {
        ExecutionEncoding::New => {
            for call in calls {
                encoded.push(call.to.felt());
                encoded.push(call.selector);
                encoded.push(FieldElement::from(call.calldata.len()));
                encoded.extend_from_slice(&call.calldata);
            }
        }
        ExecutionEncoding::Legacy => {
            let mut offset = 0usize;
            for call in calls {
                encoded.push(call.to.felt());
                encoded.push(call.selector);
                encoded.push(FieldElement::from(offset));
                encoded.push(FieldElement::from(call.calldata.len()));
                offset += call.calldata.len();
            }
            encoded.push(FieldElement::from(offset));
            for call in calls {
                encoded.extend_from_slice(&call.calldata);
            }
        }
    }

    encoded
}

/// `deployContract` call on the Universal Deployer
pub fn udc_deploy_call(
    class_hash: ClassHash,
    salt: FieldElement,
    unique: bool,
    constructor_calldata: &[FieldElement],
) -> ContractCall {
    let mut calldata = Vec::with_capacity(constructor_calldata.len() + 4);
    calldata.push(class_hash.felt());
    calldata.push(salt);
    calldata.push(if unique {
        FieldElement::ONE
    } else {
        FieldElement::ZERO
    });
    calldata.push(FieldElement::from(constructor_calldata.len()));
    calldata.extend_from_slice(constructor_calldata);

    ContractCall {
        to: ContractAddress::new(*UDC_ADDRESS),
        selector: super::felt::starknet_keccak(b"deployContract"),
        calldata,
    }
}
