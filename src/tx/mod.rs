//! Transaction submission module with nonce sequencing and fee resolution

pub mod account;
pub mod fee;
pub mod nonce;
pub mod sender;

pub use account::{Account, LocalSigner, Signer};
pub use fee::FeeEstimator;
pub use nonce::{NonceReservation, NonceSequencer};
pub use sender::{Submission, TransactionKind, TransactionSender};
