//! Module: Path
//! But: Derivation path templates and per-index key-pair derivation.
//!
//! *Signed: kryon.kas*

use std::fmt;
use std::str::FromStr;

use bip32::DerivationPath;
use k256::ecdsa::VerifyingKey;

use crate::error::{KeyPoolError, Result};
use crate::keypair::{KeyPair, PublicKeyBytes};
use crate::seed::RootNode;

/// Token replaced by the branch digit.
pub const CONN_TYPE_PLACEHOLDER: &str = "connType";

/// Account path shared by every connection slot.
/// The last segment is rewritten with the connection index.
pub const DEFAULT_PATH_TEMPLATE: &str = "m/44/60'/0'/connType/0";

/// Branch selected by the placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnType {
    Primary,
    Secondary,
}

impl ConnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnType::Primary => "0",
            ConnType::Secondary => "1",
        }
    }
}

// --- Modèle ---

/// Path with a `connType` placeholder and a trailing index segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let template = template.trim();
        let invalid = |why: &str| KeyPoolError::InvalidPathTemplate(format!("'{template}': {why}"));

        if !template.starts_with("m/") {
            return Err(invalid("must start with 'm/'"));
        }
        if !template.contains(CONN_TYPE_PLACEHOLDER) {
            return Err(invalid("missing connType placeholder"));
        }
        let last = template.rsplit('/').next().unwrap_or_default();
        if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("last segment must be a non-hardened index"));
        }

        Ok(Self(template.to_owned()))
    }

    /// Same template with its last segment set to `index`.
    pub fn with_index(&self, index: u32) -> Self {
        let base = self.0.rsplit_once('/').map_or(self.0.as_str(), |(base, _)| base);
        Self(format!("{base}/{index}"))
    }

    /// Concrete path for one branch. Only the first placeholder is replaced.
    pub fn branch(&self, conn_type: ConnType) -> String {
        self.0.replacen(CONN_TYPE_PLACEHOLDER, conn_type.as_str(), 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PathTemplate {
    fn default() -> Self {
        Self(DEFAULT_PATH_TEMPLATE.to_owned())
    }
}

impl FromStr for PathTemplate {
    type Err = KeyPoolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Dérivation ---

/// Derives the primary and secondary keys of `template` for slot `index`.
///
/// The index segment of `template` is used as given.
pub fn derive_pair(root: &RootNode, template: &PathTemplate, index: u32) -> Result<KeyPair> {
    Ok(KeyPair {
        primary: derive_public_key(root, &template.branch(ConnType::Primary), index)?,
        secondary: derive_public_key(root, &template.branch(ConnType::Secondary), index)?,
        conn_index: index,
    })
}

/// Sequentially derives `start..start + count`, stopping at the first failure.
pub fn derive_range(
    root: &RootNode,
    template: &PathTemplate,
    start: u32,
    count: u32,
) -> Result<Vec<KeyPair>> {
    let mut pairs = Vec::with_capacity(count as usize);
    for offset in 0..count {
        let index = start.checked_add(offset).ok_or_else(|| KeyPoolError::Derivation {
            index: u32::MAX,
            reason: format!("index {start} + {offset} overflows"),
        })?;
        pairs.push(derive_pair(root, &template.with_index(index), index)?);
    }
    Ok(pairs)
}

fn derive_public_key(root: &RootNode, path: &str, index: u32) -> Result<PublicKeyBytes> {
    let failed = |reason: String| KeyPoolError::Derivation { index, reason };

    let derivation_path =
        DerivationPath::from_str(path).map_err(|e| failed(format!("invalid path '{path}': {e}")))?;
    let child_xprv = root
        .derive(derivation_path)
        .map_err(|e| failed(format!("cannot derive '{path}': {e}")))?;

    // Public Key Extraction + Compression
    let extended_pubkey = child_xprv.public_key();
    let public_key: &VerifyingKey = extended_pubkey.public_key();
    let compressed_pubkey = public_key.to_encoded_point(true);

    compressed_pubkey
        .as_bytes()
        .try_into()
        .map_err(|_| failed(format!("unexpected public key length at '{path}'")))
}
