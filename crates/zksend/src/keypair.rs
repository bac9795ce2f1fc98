//! Single-purpose Ed25519 keys backing claim links, plus Sui address
//! derivation and the `suiprivkey` format.

use std::fmt;

use bech32::{FromBase32, ToBase32, Variant};
use ed25519_dalek::SigningKey;
use rand::RngCore;
use rand::rngs::OsRng;
use sui_sdk_types::{Address, Ed25519PublicKey};

use crate::error::{Result, ZkSendError};

/// Signature scheme flag for Ed25519 keys, addresses and signatures.
pub const ED25519_FLAG: u8 = 0x00;
pub const SUI_PRIVATE_KEY_PREFIX: &str = "suiprivkey";

/// An account able to authorize transactions. Ledger backends sign with the
/// returned key; it must never be logged.
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    fn ed25519_secret(&self) -> [u8; 32];
}

#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Fresh key from the OS random source.
    pub fn generate() -> Result<Self> {
        let mut secret = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| ZkSendError::KeyGeneration(e.to_string()))?;
        Ok(Self::from_secret_bytes(secret))
    }

    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        derive_address(&self.public_key())
    }

    /// Parses a bech32 `suiprivkey1...` string holding `flag || secret`.
    pub fn from_sui_private_key(encoded: &str) -> Result<Self> {
        let (hrp, data, _variant) = bech32::decode(encoded.trim())
            .map_err(|e| ZkSendError::InvalidKey(format!("bech32 decode failed: {e}")))?;
        if hrp != SUI_PRIVATE_KEY_PREFIX {
            return Err(ZkSendError::InvalidKey(format!(
                "expected '{SUI_PRIVATE_KEY_PREFIX}' prefix, found '{hrp}'"
            )));
        }
        let payload = Vec::<u8>::from_base32(&data)
            .map_err(|e| ZkSendError::InvalidKey(format!("invalid bech32 payload: {e}")))?;

        match payload.split_first() {
            Some((&ED25519_FLAG, secret)) if secret.len() == 32 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(secret);
                Ok(Self::from_secret_bytes(bytes))
            }
            Some((&ED25519_FLAG, secret)) => Err(ZkSendError::InvalidKey(format!(
                "expected 32 secret bytes, found {}",
                secret.len()
            ))),
            Some((flag, _)) => Err(ZkSendError::InvalidKey(format!(
                "unsupported signature scheme flag 0x{flag:02x}"
            ))),
            None => Err(ZkSendError::InvalidKey("empty key payload".to_string())),
        }
    }

    pub fn to_sui_private_key(&self) -> Result<String> {
        let mut payload = Vec::with_capacity(33);
        payload.push(ED25519_FLAG);
        payload.extend_from_slice(&self.secret_bytes());
        bech32::encode(SUI_PRIVATE_KEY_PREFIX, payload.to_base32(), Variant::Bech32)
            .map_err(|e| ZkSendError::InvalidKey(format!("bech32 encode failed: {e}")))
    }
}

impl TransactionSigner for Keypair {
    fn address(&self) -> Address {
        Keypair::address(self)
    }

    fn ed25519_secret(&self) -> [u8; 32] {
        self.secret_bytes()
    }
}

// Secret material stays out of logs.
impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Sui address of an Ed25519 public key: blake2b-256 over `flag || pk`.
pub fn derive_address(public_key: &[u8; 32]) -> Address {
    Ed25519PublicKey::new(*public_key).derive_address()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_address(address: &Address) -> String {
        format!("0x{}", hex::encode(address.as_bytes()))
    }

    #[test]
    fn test_known_private_keys() {
        let vectors = [
            (
                "suiprivkey1qqg9ex8p8e8fdz2ex5r0muptts3e4zctv8eahdxcrl5vne73szs365yfhkp",
                "0xdaf4e0011c0df11dfca353dd9e11124f0a9a08e622787c3210f773b0d5312174",
            ),
            (
                "suiprivkey1qzxr2y0cwppjeqkrjfjy7nyskxf2k23zsjx3pawde6f45egw5szns52cxra",
                "0xbd22aa69c59813435088fa59b5fc5018a434fa9714dcf46108271682d89f7393",
            ),
        ];

        for (private_key, expected) in vectors {
            let keypair = Keypair::from_sui_private_key(private_key).unwrap();
            assert_eq!(hex_address(&keypair.address()), expected);
            assert_eq!(keypair.to_sui_private_key().unwrap(), private_key);
        }
    }

    #[test]
    fn test_generate_roundtrip() {
        let keypair = Keypair::generate().unwrap();
        let encoded = keypair.to_sui_private_key().unwrap();
        assert!(encoded.starts_with("suiprivkey1"));

        let restored = Keypair::from_sui_private_key(&encoded).unwrap();
        assert_eq!(restored.secret_bytes(), keypair.secret_bytes());
        assert_eq!(restored.address(), keypair.address());
    }

    #[test]
    fn test_address_is_deterministic() {
        let a = Keypair::from_secret_bytes([7u8; 32]);
        let b = Keypair::from_secret_bytes([7u8; 32]);
        let c = Keypair::from_secret_bytes([8u8; 32]);
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
        assert_eq!(a.address(), derive_address(&a.public_key()));
    }

    #[test]
    fn test_rejects_foreign_prefix() {
        let payload = [vec![ED25519_FLAG], vec![1u8; 32]].concat();
        let encoded = bech32::encode("notsuikey", payload.to_base32(), Variant::Bech32).unwrap();
        assert!(matches!(
            Keypair::from_sui_private_key(&encoded),
            Err(ZkSendError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_rejects_non_ed25519_flag() {
        let payload = [vec![0x01u8], vec![1u8; 32]].concat();
        let encoded =
            bech32::encode(SUI_PRIVATE_KEY_PREFIX, payload.to_base32(), Variant::Bech32).unwrap();
        let err = Keypair::from_sui_private_key(&encoded).unwrap_err();
        assert!(err.to_string().contains("0x01"));
    }

    #[test]
    fn test_signer_exposes_link_key() {
        let keypair = Keypair::from_secret_bytes([42u8; 32]);
        let signer: &dyn TransactionSigner = &keypair;
        assert_eq!(signer.address(), keypair.address());
        assert_eq!(signer.ed25519_secret(), [42u8; 32]);
    }

    #[test]
    fn test_debug_hides_secret() {
        let keypair = Keypair::from_secret_bytes([9u8; 32]);
        let rendered = format!("{keypair:?}");
        assert!(rendered.contains("address"));
        assert!(!rendered.contains(&hex::encode([9u8; 32])));
    }
}
