//! Module: KeyPair
//! But: Connection key-pair record and its persisted JSON form.
//!
//! *Signed: kryon.kas*

use serde::{Deserialize, Serialize};

/// Compressed SEC1 secp256k1 public key.
pub type PublicKeyBytes = [u8; 33];

/// Primary and secondary public keys reserved for one connection slot.
///
/// Serialized as `{"A": "0x..", "Ad": "0x..", "connIndex": n}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPair {
    /// Key on the `connType = 0` branch.
    #[serde(rename = "A", with = "hex_key")]
    pub primary: PublicKeyBytes,

    /// Key on the `connType = 1` branch.
    #[serde(rename = "Ad", with = "hex_key")]
    pub secondary: PublicKeyBytes,

    #[serde(rename = "connIndex")]
    pub conn_index: u32,
}

impl KeyPair {
    pub fn primary_hex(&self) -> String {
        format!("0x{}", hex::encode(self.primary))
    }

    pub fn secondary_hex(&self) -> String {
        format!("0x{}", hex::encode(self.secondary))
    }
}

/// `0x`-prefixed hex with curve-point validation on the way in.
mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::PublicKeyBytes;

    pub fn serialize<S: Serializer>(key: &PublicKeyBytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(key)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PublicKeyBytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        let digits = text.strip_prefix("0x").unwrap_or(&text);

        let mut key = [0u8; 33];
        hex::decode_to_slice(digits, &mut key).map_err(D::Error::custom)?;

        // Attention: reject anything that is not a point on secp256k1
        k256::PublicKey::from_sec1_bytes(&key)
            .map_err(|_| D::Error::custom("not a compressed secp256k1 public key"))?;
        Ok(key)
    }
}
