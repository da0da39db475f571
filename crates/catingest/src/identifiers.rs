//! Cross-file identifier coordination
//!
//! One [`IdentifierCoordinator`] lives for a whole multi-file run. The
//! assigning file reserves a block sized to its record count and mints one
//! surrogate identifier per first-seen natural key; every later file only
//! resolves. Assignment and resolution are separated by type: the projector
//! gets an [`IdentifierAccess::Assign`] (exclusive borrow) for the assigning
//! file and an [`IdentifierAccess::Resolve`] (shared borrow) otherwise.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

use crate::error::IdentifierError;
use crate::store::IdentifierSequence;

#[derive(Debug, Default)]
pub struct IdentifierCoordinator {
    assigned: HashMap<i64, i64>,
    in_use: HashSet<i64>,
    block: VecDeque<i64>,
    reserved: usize,
    sealed: bool,
}

impl IdentifierCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `count` fresh identifiers in one round trip. They are handed
    /// out in ascending order.
    pub async fn reserve<S>(&mut self, sequence: &S, count: usize) -> Result<usize, IdentifierError>
    where
        S: IdentifierSequence + ?Sized,
    {
        if self.sealed {
            return Err(IdentifierError::AssignmentClosed);
        }
        if count == 0 {
            return Ok(0);
        }

        let mut block = sequence
            .next_block(count)
            .await
            .map_err(|e| IdentifierError::Sequence(e.to_string()))?;
        if block.len() != count {
            return Err(IdentifierError::BlockSize {
                requested: count,
                received: block.len(),
            });
        }

        block.sort_unstable();
        let mut seen: HashSet<i64> = self.block.iter().copied().collect();
        for id in &block {
            if !seen.insert(*id) || self.in_use.contains(id) {
                return Err(IdentifierError::DuplicateIdentifier { id: *id });
            }
        }

        debug!(
            count,
            first = block.first().copied(),
            last = block.last().copied(),
            "Reserved identifier block"
        );
        self.block.extend(block);
        self.reserved += count;
        Ok(count)
    }

    /// Identifier for `key`, minting one from the reserved block when the key
    /// is new.
    pub fn resolve_or_assign(&mut self, key: i64) -> Result<i64, IdentifierError> {
        if let Some(id) = self.assigned.get(&key) {
            return Ok(*id);
        }
        if self.sealed {
            return Err(IdentifierError::AssignmentClosed);
        }
        let id = self.block.pop_front().ok_or(IdentifierError::Exhausted {
            reserved: self.reserved,
        })?;
        self.assigned.insert(key, id);
        self.in_use.insert(id);
        Ok(id)
    }

    /// Identifier previously assigned to `key`.
    pub fn resolve(&self, key: i64) -> Result<i64, IdentifierError> {
        self.assigned
            .get(&key)
            .copied()
            .ok_or(IdentifierError::Unresolved { key })
    }

    /// Load pairs already stored in the database, for runs where the
    /// assigning file was ingested earlier.
    pub fn seed<I>(&mut self, pairs: I) -> Result<usize, IdentifierError>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        if self.sealed {
            return Err(IdentifierError::AssignmentClosed);
        }
        let mut added = 0;
        for (key, id) in pairs {
            match self.assigned.get(&key) {
                Some(existing) if *existing == id => continue,
                Some(_) => return Err(IdentifierError::DuplicateIdentifier { id }),
                None => {
                    if !self.in_use.insert(id) {
                        return Err(IdentifierError::DuplicateIdentifier { id });
                    }
                    self.assigned.insert(key, id);
                    added += 1;
                },
            }
        }
        info!(added, total = self.assigned.len(), "Seeded identifier map from ledger");
        Ok(added)
    }

    /// Close the assigning phase. Returns how many reserved identifiers went
    /// unused; they are discarded.
    pub fn seal(&mut self) -> usize {
        self.sealed = true;
        let unused = self.block.len();
        if unused > 0 {
            warn!(
                unused,
                first_unused = self.block.front().copied(),
                "Reserved identifiers left unused"
            );
        }
        self.block.clear();
        unused
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Natural keys mapped so far.
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Identifiers reserved but not yet handed out.
    pub fn remaining(&self) -> usize {
        self.block.len()
    }
}

/// What a projector may do with the coordinator for the current file.
#[derive(Debug)]
pub enum IdentifierAccess<'a> {
    Assign(&'a mut IdentifierCoordinator),
    Resolve(&'a IdentifierCoordinator),
}

impl IdentifierAccess<'_> {
    pub fn identify(&mut self, key: i64) -> Result<i64, IdentifierError> {
        match self {
            IdentifierAccess::Assign(coordinator) => coordinator.resolve_or_assign(key),
            IdentifierAccess::Resolve(coordinator) => coordinator.resolve(key),
        }
    }

    pub fn can_assign(&self) -> bool {
        matches!(self, IdentifierAccess::Assign(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct Counter(AtomicI64);

    #[async_trait]
    impl IdentifierSequence for Counter {
        async fn next_block(&self, count: usize) -> Result<Vec<i64>, StoreError> {
            let start = self.0.fetch_add(count as i64, Ordering::SeqCst);
            Ok((start..start + count as i64).collect())
        }
    }

    struct Fixed(Vec<i64>);

    #[async_trait]
    impl IdentifierSequence for Fixed {
        async fn next_block(&self, _count: usize) -> Result<Vec<i64>, StoreError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_assignment_is_stable_across_phases() {
        let mut ids = IdentifierCoordinator::new();
        ids.reserve(&Counter(AtomicI64::new(1000)), 3).await.unwrap();

        let first = ids.resolve_or_assign(42).unwrap();
        assert_eq!(first, 1000);
        assert_eq!(ids.resolve_or_assign(42).unwrap(), first);
        assert_eq!(ids.resolve_or_assign(7).unwrap(), 1001);

        ids.seal();
        assert_eq!(ids.resolve(42).unwrap(), first);
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_on_n_plus_one() {
        let mut ids = IdentifierCoordinator::new();
        ids.reserve(&Counter(AtomicI64::new(1)), 2).await.unwrap();
        ids.resolve_or_assign(1).unwrap();
        ids.resolve_or_assign(2).unwrap();
        assert_eq!(
            ids.resolve_or_assign(3).unwrap_err(),
            IdentifierError::Exhausted { reserved: 2 }
        );
    }

    #[tokio::test]
    async fn test_unresolved_key() {
        let ids = IdentifierCoordinator::new();
        assert_eq!(ids.resolve(9999).unwrap_err(), IdentifierError::Unresolved { key: 9999 });
    }

    #[tokio::test]
    async fn test_sealed_coordinator_refuses_assignment() {
        let mut ids = IdentifierCoordinator::new();
        ids.reserve(&Counter(AtomicI64::new(1)), 3).await.unwrap();
        ids.resolve_or_assign(10).unwrap();
        assert_eq!(ids.seal(), 2);

        assert_eq!(ids.resolve_or_assign(11).unwrap_err(), IdentifierError::AssignmentClosed);
        assert!(ids.reserve(&Counter(AtomicI64::new(1)), 1).await.is_err());
        // already-assigned keys still resolve through either path
        assert_eq!(ids.resolve_or_assign(10).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_block_validation() {
        let mut ids = IdentifierCoordinator::new();
        let short = ids.reserve(&Fixed(vec![1, 2]), 3).await.unwrap_err();
        assert_eq!(short, IdentifierError::BlockSize { requested: 3, received: 2 });

        let dup = ids.reserve(&Fixed(vec![5, 5]), 2).await.unwrap_err();
        assert_eq!(dup, IdentifierError::DuplicateIdentifier { id: 5 });
    }

    #[tokio::test]
    async fn test_block_is_handed_out_ascending() {
        let mut ids = IdentifierCoordinator::new();
        ids.reserve(&Fixed(vec![30, 10, 20]), 3).await.unwrap();
        let assigned: Vec<i64> = (0..3).map(|k| ids.resolve_or_assign(k).unwrap()).collect();
        assert_eq!(assigned, vec![10, 20, 30]);
    }

    #[test]
    fn test_seed_from_ledger() {
        let mut ids = IdentifierCoordinator::new();
        assert_eq!(ids.seed(vec![(1, 100), (2, 101), (1, 100)]).unwrap(), 2);
        assert_eq!(ids.resolve(2).unwrap(), 101);
        assert!(ids.seed(vec![(1, 555)]).is_err());
        assert!(ids.seed(vec![(3, 100)]).is_err());
    }

    #[test]
    fn test_access_modes() {
        let mut ids = IdentifierCoordinator::new();
        ids.seed(vec![(1, 100)]).unwrap();

        let mut resolve = IdentifierAccess::Resolve(&ids);
        assert!(!resolve.can_assign());
        assert_eq!(resolve.identify(1).unwrap(), 100);
        assert!(resolve.identify(2).is_err());
    }
}
