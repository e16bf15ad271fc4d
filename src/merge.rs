//! Module: Merge
//! But: Re-assembles worker slices into one pool ordered by connection index.
//!
//! *Signed: kryon.kas*

use crate::error::{KeyPoolError, Result};
use crate::keypair::KeyPair;

/// Concatenates `slices` and sorts by `conn_index`.
///
/// Slice order is irrelevant. A repeated index means the partitioning is
/// broken and is reported as `DuplicateIndex`.
pub fn merge(slices: Vec<Vec<KeyPair>>) -> Result<Vec<KeyPair>> {
    let mut pairs: Vec<KeyPair> = slices.into_iter().flatten().collect();
    pairs.sort_by_key(|pair| pair.conn_index);

    if let Some(window) = pairs.windows(2).find(|w| w[0].conn_index == w[1].conn_index) {
        return Err(KeyPoolError::DuplicateIndex(window[0].conn_index));
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(conn_index: u32) -> KeyPair {
        KeyPair {
            primary: [2; 33],
            secondary: [3; 33],
            conn_index,
        }
    }

    fn indices(pairs: &[KeyPair]) -> Vec<u32> {
        pairs.iter().map(|p| p.conn_index).collect()
    }

    #[test]
    fn test_merge_orders_slices() {
        let merged = merge(vec![
            vec![pair(40), pair(41)],
            vec![pair(0), pair(1)],
            vec![pair(20), pair(21)],
        ])
        .unwrap();
        assert_eq!(indices(&merged), vec![0, 1, 20, 21, 40, 41]);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge(vec![]).unwrap().is_empty());
        assert!(merge(vec![vec![], vec![]]).unwrap().is_empty());
    }

    #[test]
    fn test_merge_duplicate_index() {
        let result = merge(vec![vec![pair(3), pair(7)], vec![pair(7), pair(8)]]);
        assert!(matches!(result, Err(KeyPoolError::DuplicateIndex(7))));
    }
}
