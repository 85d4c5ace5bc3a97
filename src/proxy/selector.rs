//! Peer Selector
//!
//! Randomizes the order in which equally eligible peers are tried, to spread
//! load. Each selector owns its random source, so a seeded selector gives a
//! reproducible order.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::{Mutex, PoisonError};

pub struct PeerSelector {
    rng: Mutex<StdRng>,
}

impl PeerSelector {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns a uniformly random permutation of `peers`.
    ///
    /// No peer is dropped or weighted by past failures.
    // TODO: weight peers that recently failed lower, without excluding them.
    pub fn select<T>(&self, mut peers: Vec<T>) -> Vec<T> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        peers.shuffle(&mut *rng);
        peers
    }
}

impl Default for PeerSelector {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_a_permutation() {
        let selector = PeerSelector::from_entropy();
        let peers: Vec<String> = (0..20).map(|i| format!("10.0.0.{}:9599", i)).collect();

        let mut selected = selector.select(peers.clone());
        assert_eq!(selected.len(), peers.len());

        selected.sort();
        let mut expected = peers;
        expected.sort();
        assert_eq!(selected, expected);
    }

    #[test]
    fn test_same_seed_same_order() {
        let peers: Vec<u32> = (0..10).collect();

        let first = PeerSelector::seeded(7).select(peers.clone());
        let second = PeerSelector::seeded(7).select(peers);
        assert_eq!(first, second);
    }

    #[test]
    fn test_orders_vary_between_calls() {
        let selector = PeerSelector::seeded(1);
        let peers: Vec<u32> = (0..10).collect();

        let orders: std::collections::HashSet<Vec<u32>> =
            (0..20).map(|_| selector.select(peers.clone())).collect();
        assert!(orders.len() > 1, "20 shuffles of 10 peers should not all agree");
    }

    #[test]
    fn test_empty_and_single() {
        let selector = PeerSelector::seeded(3);
        assert!(selector.select(Vec::<u32>::new()).is_empty());
        assert_eq!(selector.select(vec![5]), vec![5]);
    }
}
