//! Module: Seed
//! But: Seed material handling and master-node resolution.
//!
//! *Signed: kryon.kas*

use std::fmt;
use std::ops::RangeInclusive;

use bip32::{ChildNumber, DerivationPath, ExtendedKey, ExtendedKeyAttrs, Prefix, XPrv};
use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroize;

use crate::error::{KeyPoolError, Result};

type HmacSha512 = Hmac<Sha512>;

/// HMAC key of the BIP-32 master key derivation.
const MASTER_KEY_DOMAIN: &[u8] = b"Bitcoin seed";

/// Seed sizes BIP-32 allows: 128 to 512 bits.
const SEED_LEN: RangeInclusive<usize> = 16..=64;

// --- Matériel ---

/// Mnemonic phrase and/or raw seed (hex) a pool is derived from.
///
/// The mnemonic wins when both are present and non-empty. Secrets are wiped
/// on drop and never printed by `Debug`.
#[derive(Clone, Default, Zeroize)]
pub struct SeedMaterial {
    mnemonic: Option<String>,
    private_key: Option<String>,
}

impl SeedMaterial {
    pub fn new(mnemonic: Option<&str>, private_key: Option<&str>) -> Self {
        Self {
            mnemonic: mnemonic.map(str::to_owned),
            private_key: private_key.map(str::to_owned),
        }
    }

    pub fn from_mnemonic(phrase: &str) -> Self {
        Self::new(Some(phrase), None)
    }

    /// Raw seed bytes as hex, `0x` prefix optional.
    pub fn from_private_key(hex_seed: &str) -> Self {
        Self::new(None, Some(hex_seed))
    }

    /// Builds the master node for this material.
    pub fn resolve(&self) -> Result<RootNode> {
        resolve_root(self.mnemonic.as_deref(), self.private_key.as_deref())
    }
}

impl Drop for SeedMaterial {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl fmt::Debug for SeedMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("SeedMaterial")
            .field("mnemonic", &redact(&self.mnemonic))
            .field("private_key", &redact(&self.private_key))
            .finish()
    }
}

// --- Racine ---

/// BIP-32 master node. Read-only once built, safe to share between threads.
#[derive(Clone)]
pub struct RootNode {
    xprv: XPrv,
}

impl RootNode {
    /// Master node from raw seed bytes, any length in 16..=64.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if !SEED_LEN.contains(&seed.len()) {
            return Err(KeyPoolError::InvalidSeed(format!(
                "seed is {} bytes, expected {} to {}",
                seed.len(),
                SEED_LEN.start(),
                SEED_LEN.end()
            )));
        }
        let invalid = |e: String| KeyPoolError::InvalidSeed(format!("cannot build master key: {e}"));

        // I = HMAC-SHA512("Bitcoin seed", seed), IL = key, IR = chain code
        let mut mac = HmacSha512::new_from_slice(MASTER_KEY_DOMAIN).map_err(|e| invalid(e.to_string()))?;
        mac.update(seed);
        let mut digest = [0u8; 64];
        digest.copy_from_slice(&mac.finalize().into_bytes());

        let mut key_bytes = [0u8; 33];
        key_bytes[1..].copy_from_slice(&digest[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);
        digest.zeroize();

        let master = ExtendedKey {
            prefix: Prefix::XPRV,
            attrs: ExtendedKeyAttrs {
                depth: 0,
                parent_fingerprint: [0u8; 4],
                child_number: ChildNumber(0),
                chain_code,
            },
            key_bytes,
        };
        key_bytes.zeroize();
        chain_code.zeroize();

        // NB: rejects IL = 0 or IL >= n
        let xprv = XPrv::try_from(master).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { xprv })
    }

    /// Walks `path` from the master node.
    pub(crate) fn derive(&self, path: DerivationPath) -> std::result::Result<XPrv, bip32::Error> {
        let mut node = self.xprv.clone();
        for child in path {
            node = node.derive_child(child)?;
        }
        Ok(node)
    }
}

impl fmt::Debug for RootNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootNode")
            .field("depth", &self.xprv.attrs().depth)
            .finish_non_exhaustive()
    }
}

/// Resolves the master node from a mnemonic, falling back to a hex seed.
pub fn resolve_root(mnemonic: Option<&str>, private_key: Option<&str>) -> Result<RootNode> {
    let phrase = mnemonic.map(str::trim).filter(|p| !p.is_empty());
    if let Some(phrase) = phrase {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase)
            .map_err(|e| KeyPoolError::InvalidSeed(format!("invalid mnemonic: {e}")))?;
        // No passphrase
        let mut seed = mnemonic.to_seed("");
        let root = RootNode::from_seed(&seed);
        seed.zeroize();
        return root;
    }

    let hex_seed = private_key
        .map(str::trim)
        .map(|k| k.strip_prefix("0x").or_else(|| k.strip_prefix("0X")).unwrap_or(k))
        .filter(|k| !k.is_empty())
        .ok_or_else(|| KeyPoolError::InvalidSeed("no mnemonic or private key supplied".into()))?;

    let mut seed = hex::decode(hex_seed)
        .map_err(|e| KeyPoolError::InvalidSeed(format!("private key is not valid hex: {e}")))?;
    let root = RootNode::from_seed(&seed);
    seed.zeroize();
    root
}

// --- Génération ---

/// Generates a random BIP-39 mnemonic.
pub fn generate_random_mnemonic(word_count: usize) -> Result<Mnemonic> {
    let mut rng = rand::rng();

    // 12 words = 128 bits, 24 words = 256 bits
    let entropy_len = match word_count {
        12 => 16,
        _ => 32, // Défaut: 24 words
    };

    let mut entropy = vec![0u8; entropy_len];
    rng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|e| KeyPoolError::InvalidSeed(format!("failed to generate mnemonic: {e}")));
    entropy.zeroize();
    mnemonic
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_mnemonic_generation() {
        let mnemonic = generate_random_mnemonic(12).unwrap();
        assert_eq!(mnemonic.word_count(), 12);

        let mnemonic = generate_random_mnemonic(24).unwrap();
        assert_eq!(mnemonic.word_count(), 24);

        let mnemonic = generate_random_mnemonic(7).unwrap();
        assert_eq!(mnemonic.word_count(), 24);
    }

    #[test]
    fn test_empty_seed_material_is_rejected() {
        assert!(matches!(resolve_root(None, None), Err(KeyPoolError::InvalidSeed(_))));
        assert!(matches!(resolve_root(Some(""), Some("")), Err(KeyPoolError::InvalidSeed(_))));
        assert!(matches!(resolve_root(Some("   "), Some("0x")), Err(KeyPoolError::InvalidSeed(_))));
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(resolve_root(Some(phrase), None), Err(KeyPoolError::InvalidSeed(_))));
    }

    #[test]
    fn test_bad_private_key_is_rejected() {
        assert!(matches!(resolve_root(None, Some("zz")), Err(KeyPoolError::InvalidSeed(_))));
        // 8 bytes is below the BIP-32 minimum
        assert!(matches!(
            resolve_root(None, Some("0001020304050607")),
            Err(KeyPoolError::InvalidSeed(_))
        ));
        // 65 bytes is above the BIP-32 maximum
        assert!(matches!(
            resolve_root(None, Some(&"ab".repeat(65))),
            Err(KeyPoolError::InvalidSeed(_))
        ));
        assert!(matches!(
            resolve_root(None, Some(&"ab".repeat(15))),
            Err(KeyPoolError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_any_seed_length_in_range_is_accepted() {
        for len in [16, 20, 24, 32, 33, 48, 63, 64] {
            let seed = "ab".repeat(len);
            assert!(resolve_root(None, Some(&seed)).is_ok(), "seed of {len} bytes");
        }
    }

    #[test]
    fn test_master_key_matches_bip32_vector() {
        // BIP-32 test vector 1, chain m
        let root = RootNode::from_seed(&hex::decode("000102030405060708090a0b0c0d0e0f").unwrap()).unwrap();
        assert_eq!(
            hex::encode(root.xprv.public_key().to_bytes()),
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
        assert_eq!(
            hex::encode(root.xprv.attrs().chain_code),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
    }

    #[test]
    fn test_mnemonic_takes_precedence() {
        let bogus_key = "not hex at all";
        assert!(resolve_root(Some(PHRASE), Some(bogus_key)).is_ok());
        // Empty mnemonic falls through to the private key
        assert!(resolve_root(Some(""), Some("000102030405060708090a0b0c0d0e0f")).is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let seed = SeedMaterial::new(Some(PHRASE), Some("00ff"));
        let printed = format!("{seed:?}");
        assert!(!printed.contains("abandon"));
        assert!(!printed.contains("00ff"));
        assert!(printed.contains("<redacted>"));
    }
}
