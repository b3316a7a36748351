//! Pure encoding layer: field elements, selectors, addresses, class and
//! transaction hashes, calldata. Nothing here performs I/O except reading
//! class artifacts from disk.

pub mod address;
pub mod calldata;
pub mod class;
pub mod felt;
pub mod tx_hash;

pub use address::{compute_hash_on_elements, contract_address, udc_deployed_address, UDC_ADDRESS};
pub use calldata::{encode_args, encode_execute, Arg, ContractCall, ExecutionEncoding};
pub use class::{ClassError, ClassSource, FlattenedSierraClass, PreparedClass};
pub use felt::{selector_from_name, short_string, starknet_keccak, FeltError};
