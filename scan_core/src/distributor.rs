//! Round-robin sharding of candidate wallets across workers.

use tracing::info;

use crate::WalletAddress;

/// Split `wallets` into at most `requested_workers` round-robin shards.
///
/// Wallet `i` lands in shard `i % effective`, where `effective` is capped at
/// the candidate count, so no shard is ever empty and relative order within a
/// shard follows the input order.
pub fn distribute(wallets: Vec<WalletAddress>, requested_workers: usize) -> Vec<Vec<WalletAddress>> {
    if wallets.is_empty() || requested_workers == 0 {
        return Vec::new();
    }
    let effective = requested_workers.min(wallets.len());
    if effective < requested_workers {
        info!(
            "Only {} wallets to scan, reducing workers from {} to {}",
            wallets.len(),
            requested_workers,
            effective
        );
    }
    let mut shards: Vec<Vec<WalletAddress>> = vec![Vec::new(); effective];
    for (i, wallet) in wallets.into_iter().enumerate() {
        shards[i % effective].push(wallet);
    }
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn wallets(n: usize) -> Vec<WalletAddress> {
        (0..n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn five_wallets_two_workers_round_robin() {
        let shards = distribute(wallets(5), 2);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0], vec!["w0", "w2", "w4"]);
        assert_eq!(shards[1], vec!["w1", "w3"]);
    }

    #[test]
    fn shards_are_disjoint_and_cover_input() {
        let input = wallets(13);
        let shards = distribute(input.clone(), 4);
        let mut seen = HashSet::new();
        for shard in &shards {
            for wallet in shard {
                assert!(seen.insert(wallet.clone()), "{wallet} appeared twice");
            }
        }
        assert_eq!(seen.len(), input.len());
    }

    #[test]
    fn more_workers_than_wallets_reduces_worker_count() {
        let shards = distribute(wallets(3), 10);
        assert_eq!(shards.len(), 3);
        assert!(shards.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn no_shard_is_empty() {
        for n in 1..=8 {
            for workers in 1..=8 {
                let shards = distribute(wallets(n), workers);
                assert!(shards.iter().all(|s| !s.is_empty()), "n={n} workers={workers}");
            }
        }
    }

    #[test]
    fn empty_input_yields_no_shards() {
        assert!(distribute(Vec::new(), 4).is_empty());
    }

    #[test]
    fn zero_workers_yields_no_shards() {
        assert!(distribute(wallets(3), 0).is_empty());
    }
}
