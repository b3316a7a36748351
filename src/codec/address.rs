//! Deterministic contract address derivation
//!
//! Addresses depend only on the deployer, the salt, the class hash and the
//! constructor calldata. Deployments through the Universal Deployer Contract
//! (UDC) either use the raw salt with a zero deployer, or, when `unique` is
//! set, bind the salt to the deploying account and use the UDC as deployer.

use super::felt::{felt_from_halves, short_string_const};
use crate::types::{ClassHash, ContractAddress};

use lazy_static::lazy_static;
use starknet_crypto::{pedersen_hash, FieldElement};

lazy_static! {
    /// Universal Deployer Contract address
    pub static ref UDC_ADDRESS: FieldElement = felt_from_halves(
        0x041a78e741e5af2fec34b695679bc689,
        0x1742439f7afb8484ecd7766661ad02bf,
    );

    /// Upper bound (exclusive) for contract addresses: 2**251 - 256
    pub static ref ADDR_BOUND: FieldElement = felt_from_halves(
        0x07ffffffffffffffffffffffffffffff,
        0xffffffffffffffffffffffffffffff00,
    );

    static ref CONTRACT_ADDRESS_PREFIX: FieldElement =
        short_string_const("STARKNET_CONTRACT_ADDRESS");
}

/// Pedersen hash chain over a list, terminated by its length
pub fn compute_hash_on_elements(data: &[FieldElement]) -> FieldElement {
    let mut current = FieldElement::ZERO;
    for item in data {
        current = pedersen_hash(&current, item);
    }
    pedersen_hash(&current, &FieldElement::from(data.len()))
}

/// Reduce a hash into the valid address range
pub fn normalize_address(address: FieldElement) -> FieldElement {
    address % *ADDR_BOUND
}

/// Address of a contract deployed by `deployer_address`
pub fn contract_address(
    salt: FieldElement,
    class_hash: FieldElement,
    constructor_calldata: &[FieldElement],
    deployer_address: FieldElement,
) -> FieldElement {
    normalize_address(compute_hash_on_elements(&[
        *CONTRACT_ADDRESS_PREFIX,
        deployer_address,
        salt,
        class_hash,
        compute_hash_on_elements(constructor_calldata),
    ]))
}

/// Salt and deployer the UDC uses for a deployment requested by `account`
pub fn udc_salt_and_deployer(
    account: FieldElement,
    salt: FieldElement,
    unique: bool,
) -> (FieldElement, FieldElement) {
    if unique {
        (pedersen_hash(&account, &salt), *UDC_ADDRESS)
    } else {
        (salt, FieldElement::ZERO)
    }
}

/// Address the UDC assigns to a `deployContract` call from `account`
pub fn udc_deployed_address(
    account: ContractAddress,
    class_hash: ClassHash,
    salt: FieldElement,
    unique: bool,
    constructor_calldata: &[FieldElement],
) -> ContractAddress {
    let (effective_salt, deployer) = udc_salt_and_deployer(account.felt(), salt, unique);
    ContractAddress::new(contract_address(
        effective_salt,
        class_hash.felt(),
        constructor_calldata,
        deployer,
    ))
}
