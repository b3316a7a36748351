//! Acting account and its signing capability

use crate::codec::ExecutionEncoding;
use crate::error::{ScriptError, ScriptResult};
use crate::types::ContractAddress;

use starknet_crypto::{get_public_key, rfc6979_generate_k, sign, FieldElement, SignError};
use std::fmt;
use std::sync::Arc;

/// Produces account signatures over transaction hashes
pub trait Signer: Send + Sync {
    fn public_key(&self) -> FieldElement;

    /// Signature the account contract validates, usually `[r, s]`
    fn sign_hash(&self, hash: &FieldElement) -> ScriptResult<Vec<FieldElement>>;
}

/// STARK-curve key held in memory
pub struct LocalSigner {
    private_key: FieldElement,
    public_key: FieldElement,
}

impl LocalSigner {
    pub fn new(private_key: FieldElement) -> Self {
        Self {
            private_key,
            public_key: get_public_key(&private_key),
        }
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("public_key", &format_args!("{:#x}", self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Signer for LocalSigner {
    fn public_key(&self) -> FieldElement {
        self.public_key
    }

    fn sign_hash(&self, hash: &FieldElement) -> ScriptResult<Vec<FieldElement>> {
        // RFC 6979 nonce; an unusable k is retried with an incremented seed
        let mut seed: Option<FieldElement> = None;
        loop {
            let k = rfc6979_generate_k(hash, &self.private_key, seed.as_ref());
            match sign(&self.private_key, hash, &k) {
                Ok(signature) => return Ok(vec![signature.r, signature.s]),
                Err(SignError::InvalidK) => {
                    seed = Some(match seed {
                        Some(value) => value + FieldElement::ONE,
                        None => FieldElement::ONE,
                    });
                }
                Err(SignError::InvalidMessageHash) => {
                    return Err(ScriptError::Signing(format!(
                        "message hash {:#x} is out of range",
                        hash
                    )))
                }
            }
        }
    }
}

/// Account contract that pays for and signs transactions
#[derive(Clone)]
pub struct Account {
    address: ContractAddress,
    signer: Arc<dyn Signer>,
    encoding: ExecutionEncoding,
}

impl Account {
    pub fn new(address: ContractAddress, signer: Arc<dyn Signer>) -> Self {
        Self {
            address,
            signer,
            encoding: ExecutionEncoding::default(),
        }
    }

    /// Use a different `__execute__` layout
    pub fn with_encoding(mut self, encoding: ExecutionEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn address(&self) -> ContractAddress {
        self.address
    }

    pub fn encoding(&self) -> ExecutionEncoding {
        self.encoding
    }

    pub fn public_key(&self) -> FieldElement {
        self.signer.public_key()
    }

    pub fn sign(&self, hash: &FieldElement) -> ScriptResult<Vec<FieldElement>> {
        self.signer.sign_hash(hash)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &format_args!("{}", self.address))
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starknet_crypto::verify;

    fn felt(hex: &str) -> FieldElement {
        FieldElement::from_hex_be(hex).unwrap()
    }

    #[test]
    fn test_signature_vector() {
        let signer = LocalSigner::new(felt(
            "0x0139fe4d6f02e666e86a6f58e65060f115cd3c185bd9e98bd829636931458f79",
        ));
        let hash = felt("0x06fea80189363a786037ed3e7ba546dad0ef7de49fccae0e31eb658b7dd4ea76");

        let signature = signer.sign_hash(&hash).unwrap();
        assert_eq!(
            signature,
            vec![
                felt("0x061ec782f76a66f6984efc3a1b6d152a124c701c00abdd2bf76641b4135c770f"),
                felt("0x04e44e759cea02c23568bb4d8a09929bbca8768ab68270d50c18d214166ccd9a"),
            ]
        );
        assert!(verify(&signer.public_key(), &hash, &signature[0], &signature[1]).unwrap());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let signer = LocalSigner::new(felt("0x1234"));
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("<redacted>"));

        let account = Account::new(ContractAddress::new(felt("0xabc")), Arc::new(signer));
        assert_eq!(account.encoding(), ExecutionEncoding::New);
        assert!(format!("{:?}", account).contains("0xabc"));
    }
}
