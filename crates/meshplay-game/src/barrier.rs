//! Acknowledgement barriers.

use std::collections::HashSet;

use meshplay_transport::PeerId;

/// Collects one acknowledgement per peer for a protocol phase.
///
/// Completion compares against the live membership passed in, so a
/// duplicate acknowledgement never counts twice and an ack from a peer
/// that has since left does not stand in for a missing one.
#[derive(Debug)]
pub struct AckBarrier {
    name: &'static str,
    acked: HashSet<PeerId>,
}

impl AckBarrier {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            acked: HashSet::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Records `peer`. Returns `false` for a duplicate.
    pub fn record(&mut self, peer: &PeerId) -> bool {
        let fresh = self.acked.insert(peer.clone());
        if fresh {
            tracing::debug!(barrier = self.name, %peer, acked = self.acked.len(), "ack recorded");
        } else {
            tracing::debug!(barrier = self.name, %peer, "duplicate ack ignored");
        }
        fresh
    }

    pub fn has_acked(&self, peer: &PeerId) -> bool {
        self.acked.contains(peer)
    }

    /// Number of distinct peers that acknowledged.
    pub fn count(&self) -> usize {
        self.acked.len()
    }

    /// `true` once every peer in `connected` has acknowledged.
    pub fn is_complete(&self, connected: &[PeerId]) -> bool {
        connected.iter().all(|peer| self.acked.contains(peer))
    }

    pub fn reset(&mut self) {
        self.acked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers() -> Vec<PeerId> {
        vec![PeerId::new("a", 1), PeerId::new("b", 2)]
    }

    #[test]
    fn test_record_duplicate_does_not_double_count() {
        let mut barrier = AckBarrier::new("show");
        let [a, b] = <[PeerId; 2]>::try_from(peers()).unwrap();

        assert!(barrier.record(&a));
        assert!(!barrier.record(&a));

        assert_eq!(barrier.count(), 1);
        assert!(!barrier.is_complete(&[a.clone(), b.clone()]));

        barrier.record(&b);
        assert!(barrier.is_complete(&[a, b]));
    }

    #[test]
    fn test_is_complete_with_no_peers_is_true() {
        assert!(AckBarrier::new("show").is_complete(&[]));
    }

    #[test]
    fn test_is_complete_ignores_acks_from_departed_peers() {
        let mut barrier = AckBarrier::new("end");
        barrier.record(&PeerId::new("gone", 9));
        assert!(!barrier.is_complete(&peers()));
    }

    #[test]
    fn test_reset_clears_acks() {
        let mut barrier = AckBarrier::new("schedule");
        barrier.record(&PeerId::new("a", 1));
        barrier.reset();
        assert_eq!(barrier.count(), 0);
    }
}
