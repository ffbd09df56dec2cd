//! Root digest aggregation.
//!
//! A root digest folds every `(path, content hash)` pair of a snapshot into a
//! single 64-bit value. Pairs are fed in byte-lexicographic path order, so the
//! result depends only on the set of pairs, never on scan or map order.
//!
//! Large record sets are cut into [`PARALLEL_CHUNKS`] contiguous sorted
//! chunks that are hashed on the rayon pool; the partial digests are then
//! hashed once more in chunk order.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::record::FileRecord;

/// Record count above which chunks are hashed in parallel.
pub const PARALLEL_THRESHOLD: usize = 10_000;

/// Number of chunks used by the parallel strategy.
pub const PARALLEL_CHUNKS: usize = 4;

/// Compute the root digest of a record map. Empty input yields 0.
pub fn compute_root(files: &HashMap<String, FileRecord>) -> u64 {
    compute_root_from_pairs(
        files
            .iter()
            .map(|(path, record)| (path.as_str(), record.hash.as_str())),
    )
}

/// Compute the root digest of arbitrary `(path, hash)` pairs.
pub fn compute_root_from_pairs<'a, I>(pairs: I) -> u64
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    if pairs.is_empty() {
        return 0;
    }

    pairs.par_sort_unstable_by(|a, b| a.0.cmp(b.0));

    if pairs.len() <= PARALLEL_THRESHOLD {
        return hash_pairs(&pairs);
    }

    let chunk_size = pairs.len().div_ceil(PARALLEL_CHUNKS);
    let partials: Vec<u64> = pairs.par_chunks(chunk_size).map(hash_pairs).collect();

    let mut hasher = Xxh3::new();
    for partial in partials {
        hasher.update(&partial.to_le_bytes());
    }
    hasher.digest()
}

fn hash_pairs(pairs: &[(&str, &str)]) -> u64 {
    let mut hasher = Xxh3::new();
    for (path, hash) in pairs {
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(hash.as_bytes());
        hasher.update(&[0]);
    }
    hasher.digest()
}

/// Small digest summary kept alongside a snapshot for quick inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSummary {
    /// Root digest.
    pub root: u64,
    /// Number of non-directory records.
    pub leaf_count: u64,
    /// Depth of a balanced binary tree over all records.
    pub depth: u32,
}

impl DigestSummary {
    /// Summarize a record map whose root digest is already known.
    pub fn new(root: u64, files: &HashMap<String, FileRecord>) -> Self {
        let leaf_count = files.values().filter(|r| !r.is_dir).count() as u64;
        Self {
            root,
            leaf_count,
            depth: estimated_depth(files.len()),
        }
    }
}

/// Smallest `d >= 1` with `2^(d-1) >= count`.
pub fn estimated_depth(count: usize) -> u32 {
    let mut depth = 1;
    let mut nodes: usize = 1;
    while nodes < count {
        depth += 1;
        nodes = nodes.saturating_mul(2);
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(n: usize) -> Vec<(String, String)> {
        (0..n)
            .map(|i| (format!("/root/dir{}/file{i}", i % 97), format!("{i:016x}")))
            .collect()
    }

    fn root_of(pairs: &[(String, String)]) -> u64 {
        compute_root_from_pairs(pairs.iter().map(|(p, h)| (p.as_str(), h.as_str())))
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(compute_root(&HashMap::new()), 0);
        assert_eq!(compute_root_from_pairs(std::iter::empty()), 0);
    }

    #[test]
    fn test_order_independent() {
        let forward = pairs(50);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(root_of(&forward), root_of(&reversed));
    }

    #[test]
    fn test_changes_with_hash_or_path() {
        let base = pairs(20);
        let root = root_of(&base);

        let mut changed_hash = base.clone();
        changed_hash[3].1 = "ffffffffffffffff".to_string();
        assert_ne!(root, root_of(&changed_hash));

        let mut renamed = base.clone();
        renamed[3].0.push_str(".bak");
        assert_ne!(root, root_of(&renamed));

        let mut fewer = base.clone();
        fewer.pop();
        assert_ne!(root, root_of(&fewer));
    }

    #[test]
    fn test_pair_boundaries_are_unambiguous() {
        let a = vec![("/ab".to_string(), "c".to_string())];
        let b = vec![("/a".to_string(), "bc".to_string())];
        assert_ne!(root_of(&a), root_of(&b));
    }

    #[test]
    fn test_parallel_path_is_deterministic() {
        let large = pairs(PARALLEL_THRESHOLD + 1234);
        let mut shuffled = large.clone();
        shuffled.reverse();
        shuffled.swap(0, 5000);

        let root = root_of(&large);
        assert_ne!(root, 0);
        assert_eq!(root, root_of(&shuffled));

        let mut changed = large.clone();
        changed[PARALLEL_THRESHOLD].1 = "0".to_string();
        assert_ne!(root, root_of(&changed));
    }

    #[test]
    fn test_estimated_depth() {
        assert_eq!(estimated_depth(0), 1);
        assert_eq!(estimated_depth(1), 1);
        assert_eq!(estimated_depth(2), 2);
        assert_eq!(estimated_depth(3), 3);
        assert_eq!(estimated_depth(4), 3);
        assert_eq!(estimated_depth(5), 4);
    }
}
