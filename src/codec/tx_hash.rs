//! Transaction hashes for INVOKE v1 and DECLARE v2
//!
//! Fee estimation signs the same payload with a "query" version
//! (`2**128 + version`) so the simulated transaction can never be replayed.

use super::address::compute_hash_on_elements;
use super::felt::{felt_from_halves, short_string_const};

use lazy_static::lazy_static;
use starknet_crypto::FieldElement;

lazy_static! {
    static ref PREFIX_INVOKE: FieldElement = short_string_const("invoke");
    static ref PREFIX_DECLARE: FieldElement = short_string_const("declare");
    static ref QUERY_VERSION_BASE: FieldElement = felt_from_halves(1, 0);
}

/// Transaction version, optionally offset into the query range
pub fn transaction_version(version: u64, query: bool) -> FieldElement {
    let version = FieldElement::from(version);
    if query {
        *QUERY_VERSION_BASE + version
    } else {
        version
    }
}

/// Hash of an INVOKE v1 transaction from `sender` carrying `calldata`
pub fn invoke_v1_hash(
    sender: FieldElement,
    calldata: &[FieldElement],
    max_fee: FieldElement,
    chain_id: FieldElement,
    nonce: FieldElement,
    query: bool,
) -> FieldElement {
    compute_hash_on_elements(&[
        *PREFIX_INVOKE,
        transaction_version(1, query),
        sender,
        FieldElement::ZERO,
        compute_hash_on_elements(calldata),
        max_fee,
        chain_id,
        nonce,
    ])
}

/// Hash of a DECLARE v2 transaction
pub fn declare_v2_hash(
    sender: FieldElement,
    class_hash: FieldElement,
    compiled_class_hash: FieldElement,
    max_fee: FieldElement,
    chain_id: FieldElement,
    nonce: FieldElement,
    query: bool,
) -> FieldElement {
    compute_hash_on_elements(&[
        *PREFIX_DECLARE,
        transaction_version(2, query),
        sender,
        FieldElement::ZERO,
        compute_hash_on_elements(&[class_hash]),
        max_fee,
        chain_id,
        nonce,
        compiled_class_hash,
    ])
}
