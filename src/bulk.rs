//! Module: Bulk
//! But: One-shot generation of a full key-pair pool, indices 0..count.
//!
//! *Signed: kryon.kas*

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::keypair::KeyPair;
use crate::path::{PathTemplate, derive_pair};
use crate::seed::SeedMaterial;

/// Pool size used when the caller has no preference.
pub const DEFAULT_POOL_SIZE: u32 = 200;

/// Derives `count` key pairs on the default template.
pub fn generate_pool(seed: &SeedMaterial, count: u32) -> Result<Vec<KeyPair>> {
    generate_pool_with(seed, count, &PathTemplate::default())
}

/// Derives key pairs for indices `0..count` in parallel.
///
/// The root is resolved once and shared read-only. Output is in index order.
/// All-or-nothing: the error of the lowest failing index is returned.
pub fn generate_pool_with(
    seed: &SeedMaterial,
    count: u32,
    template: &PathTemplate,
) -> Result<Vec<KeyPair>> {
    let root = seed.resolve()?;
    debug!(count, template = %template, "Deriving bulk pool");

    // NB: indexed collect keeps positions regardless of completion order
    let results: Vec<Result<KeyPair>> = (0..count)
        .into_par_iter()
        .map(|index| derive_pair(&root, &template.with_index(index), index))
        .collect();

    let pairs = results.into_iter().collect::<Result<Vec<_>>>()?;
    info!(count = pairs.len(), "Bulk pool generated");
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyPoolError;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_pool() {
        let seed = SeedMaterial::from_mnemonic(PHRASE);
        let pairs = generate_pool(&seed, 10).unwrap();

        assert_eq!(pairs.len(), 10);
        for (i, pair) in pairs.iter().enumerate() {
            assert_eq!(pair.conn_index, i as u32);
        }
    }

    #[test]
    fn test_generate_pool_zero() {
        let seed = SeedMaterial::from_mnemonic(PHRASE);
        assert!(generate_pool(&seed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_generate_pool_invalid_seed() {
        let seed = SeedMaterial::default();
        assert!(matches!(generate_pool(&seed, 3), Err(KeyPoolError::InvalidSeed(_))));
    }

    #[test]
    fn test_generate_pool_custom_template() {
        let seed = SeedMaterial::from_mnemonic(PHRASE);
        let template = PathTemplate::parse("m/44/60'/1'/connType/0").unwrap();
        let custom = generate_pool_with(&seed, 2, &template).unwrap();
        let standard = generate_pool(&seed, 2).unwrap();
        assert_ne!(custom[0].primary, standard[0].primary);
    }
}
