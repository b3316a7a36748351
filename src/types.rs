//! Core domain types shared by the codec, the transaction pipeline and the
//! operations

use crate::codec::felt::{parse_felt, to_hex, FeltError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use starknet_crypto::FieldElement;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

macro_rules! felt_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(FieldElement);

        impl $name {
            pub fn new(value: FieldElement) -> Self {
                Self(value)
            }

            /// Underlying field element
            pub fn felt(&self) -> FieldElement {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = FeltError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_felt(s).map(Self)
            }
        }

        impl From<FieldElement> for $name {
            fn from(value: FieldElement) -> Self {
                Self(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&to_hex(&self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

felt_newtype!(
    /// Content-addressed identifier of a declared class
    ClassHash
);

felt_newtype!(
    /// Address of a deployed contract instance or account
    ContractAddress
);

/// Hash of a submitted transaction. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionHash(FieldElement);

impl TransactionHash {
    /// Wrap a hash, rejecting zero
    pub fn new(value: FieldElement) -> Option<Self> {
        (value != FieldElement::ZERO).then_some(Self(value))
    }

    pub fn felt(&self) -> FieldElement {
        self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(&self.0))
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let value = parse_felt(&raw).map_err(serde::de::Error::custom)?;
        TransactionHash::new(value)
            .ok_or_else(|| serde::de::Error::custom("transaction hash must not be zero"))
    }
}

/// Salt used for address derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Salt {
    /// Caller-chosen value
    Fixed(FieldElement),
    /// Pick a fresh random value at deploy time
    Random,
}

impl Salt {
    /// Salt used when the caller does not pick one
    pub fn default_for(unique: bool) -> Self {
        if unique {
            Salt::Random
        } else {
            Salt::Fixed(FieldElement::ZERO)
        }
    }
}

/// Upper bound on what a transaction may pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeCeiling {
    /// Estimate and add the configured buffer
    #[default]
    Auto,
    /// Fail before broadcast if the estimate exceeds this value
    Max(u128),
}

/// Observed state of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Pending,
    AcceptedOnL2,
    AcceptedOnL1,
    Rejected(String),
    Reverted(String),
}

impl TransactionOutcome {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionOutcome::Pending)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            TransactionOutcome::AcceptedOnL2 | TransactionOutcome::AcceptedOnL1
        )
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            TransactionOutcome::Pending => "pending",
            TransactionOutcome::AcceptedOnL2 => "accepted_on_l2",
            TransactionOutcome::AcceptedOnL1 => "accepted_on_l1",
            TransactionOutcome::Rejected(_) => "rejected",
            TransactionOutcome::Reverted(_) => "reverted",
        }
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionOutcome::Rejected(reason) | TransactionOutcome::Reverted(reason) => {
                write!(f, "{}: {}", self.label(), reason)
            }
            _ => f.write_str(self.label()),
        }
    }
}

/// How far state-changing operations wait before returning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitFor {
    /// Return as soon as the node admits the transaction
    Submission,
    /// Wait until the transaction is in an accepted L2 block
    #[default]
    AcceptedOnL2,
    /// Wait until the block is proven on L1
    AcceptedOnL1,
}

/// Result of the tracker: a settled outcome or a client-side give-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Settled(TransactionOutcome),
    TimedOut {
        waited: Duration,
        last_observed: TransactionOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclareResult {
    pub class_hash: ClassHash,
    /// `None` when the class was already declared and nothing was submitted
    pub transaction_hash: Option<TransactionHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployResult {
    pub contract_address: ContractAddress,
    pub transaction_hash: TransactionHash,
    /// Salt passed to the deployer, so the address can be recomputed
    #[serde(with = "crate::codec::felt::serde_hex")]
    pub salt: FieldElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvokeResult {
    pub transaction_hash: TransactionHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MulticallResult {
    pub transaction_hash: TransactionHash,
    /// Contracts deployed by the bundle, in step order
    pub deployed: Vec<ContractAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallResult {
    #[serde(with = "crate::codec::felt::serde_hex_vec")]
    pub data: Vec<FieldElement>,
}
