use crate::core::Transaction;
use crate::error::Result;
use crate::utils::current_timestamp;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Validated transactions waiting to be mined
///
/// ( K -> txid_hex, V => Transaction )
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    // Every mutation is a single insert, remove or retain, so a panicked
    // holder cannot leave the map half-updated and the guard is recovered.
    fn read_pool(&self) -> RwLockReadGuard<'_, HashMap<String, Transaction>> {
        self.inner.read().unwrap_or_else(|poisoned| {
            warn!("Memory pool lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_pool(&self) -> RwLockWriteGuard<'_, HashMap<String, Transaction>> {
        self.inner.write().unwrap_or_else(|poisoned| {
            warn!("Memory pool lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Validate `tx` and insert it, replacing any entry with the same id
    pub fn submit(&self, tx: Transaction) -> Result<()> {
        tx.check()?;
        debug!("Accepted transaction {} into memory pool", tx.get_id());
        self.write_pool().insert(tx.get_id().to_string(), tx);
        Ok(())
    }

    /// Snapshot of every pending transaction ordered by (timestamp, id).
    /// Nothing is removed; see [`MemoryPool::evict_mined`].
    pub fn drain(&self) -> Vec<Transaction> {
        let mut pending: Vec<Transaction> = self.read_pool().values().cloned().collect();
        pending.sort_by(|a, b| {
            a.get_timestamp()
                .cmp(&b.get_timestamp())
                .then_with(|| a.get_id().cmp(b.get_id()))
        });
        pending
    }

    /// Remove every transaction in `mined` by id
    pub fn evict_mined(&self, mined: &[Transaction]) -> usize {
        let mut pool = self.write_pool();
        mined
            .iter()
            .filter(|tx| pool.remove(tx.get_id()).is_some())
            .count()
    }

    /// Remove transactions whose timestamp is older than `max_age`
    pub fn evict_expired(&self, max_age: Duration) -> Result<usize> {
        let now = current_timestamp()?;
        Ok(self.evict_older_than(now, max_age))
    }

    pub(crate) fn evict_older_than(&self, now: i64, max_age: Duration) -> usize {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(max_age_ms);
        let mut pool = self.write_pool();
        let before = pool.len();
        pool.retain(|_, tx| tx.get_timestamp() >= cutoff);
        let evicted = before - pool.len();
        if evicted > 0 {
            info!("Evicted {evicted} expired transactions from memory pool");
        }
        evicted
    }

    pub fn get(&self, txid: &str) -> Option<Transaction> {
        self.read_pool().get(txid).cloned()
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.read_pool().contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.read_pool().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_pool().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BlockchainError, TransactionViolation};
    use crate::testnet::test_utils::{signed_tx, signed_tx_at, FIXED_TIMESTAMP};
    use crate::wallet::Wallet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_submit_rejects_invalid_transaction() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let mut tx = signed_tx(&wallet, "bob", 10.0);
        tx.amount = -5.0;

        assert!(matches!(
            pool.submit(tx),
            Err(BlockchainError::InvalidTransaction(
                TransactionViolation::NonPositiveAmount(_)
            ))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_submit_overwrites_by_id() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let tx = signed_tx(&wallet, "bob", 10.0);

        pool.submit(tx.clone()).unwrap();
        pool.submit(tx.clone()).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(tx.get_id()));
        assert_eq!(pool.get(tx.get_id()).unwrap().get_amount(), 10.0);
    }

    #[test]
    fn test_drain_keeps_entries_and_orders_them() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let late = signed_tx_at(&wallet, "bob", 1.0, FIXED_TIMESTAMP + 10);
        let early = signed_tx_at(&wallet, "bob", 2.0, FIXED_TIMESTAMP);
        pool.submit(late.clone()).unwrap();
        pool.submit(early.clone()).unwrap();

        let drained = pool.drain();
        assert_eq!(drained, vec![early, late]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_evict_mined_removes_only_those_ids() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let a = signed_tx(&wallet, "bob", 1.0);
        let b = signed_tx(&wallet, "bob", 2.0);
        pool.submit(a.clone()).unwrap();
        pool.submit(b.clone()).unwrap();

        assert_eq!(pool.evict_mined(&[a.clone()]), 1);
        assert!(!pool.contains(a.get_id()));
        assert!(pool.contains(b.get_id()));
        assert_eq!(pool.evict_mined(&[a]), 0);
    }

    #[test]
    fn test_evict_expired_by_age() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let old = signed_tx_at(&wallet, "bob", 1.0, FIXED_TIMESTAMP);
        let fresh = signed_tx_at(&wallet, "bob", 2.0, FIXED_TIMESTAMP + 60_000);
        pool.submit(old.clone()).unwrap();
        pool.submit(fresh.clone()).unwrap();

        let now = FIXED_TIMESTAMP + 90_000;
        assert_eq!(pool.evict_older_than(now, Duration::from_secs(60)), 1);
        assert!(!pool.contains(old.get_id()));
        assert!(pool.contains(fresh.get_id()));

        // Fixed test timestamps are far in the past
        assert_eq!(pool.evict_expired(Duration::from_secs(3600)).unwrap(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_submit_and_drain() {
        let pool = Arc::new(MemoryPool::new());
        let wallet = Arc::new(Wallet::new().unwrap());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let pool = Arc::clone(&pool);
                let wallet = Arc::clone(&wallet);
                thread::spawn(move || {
                    for n in 0..10 {
                        let amount = (worker * 10 + n + 1) as f64;
                        pool.submit(signed_tx(&wallet, "bob", amount)).unwrap();
                        let _ = pool.drain();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.len(), 40);
        assert_eq!(pool.drain().len(), 40);
    }

    #[test]
    fn test_poisoned_lock_still_stores_submissions() {
        let pool = Arc::new(MemoryPool::new());
        let wallet = Wallet::new().unwrap();
        let held = signed_tx(&wallet, "bob", 1.0);
        pool.submit(held.clone()).unwrap();

        let poisoner = Arc::clone(&pool);
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poisoning memory pool lock");
        })
        .join();
        assert!(pool.inner.is_poisoned());

        let tx = signed_tx(&wallet, "carol", 2.0);
        pool.submit(tx.clone()).unwrap();
        assert!(pool.contains(tx.get_id()));
        assert!(pool.contains(held.get_id()));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.evict_mined(&[held]), 1);
        assert_eq!(pool.drain(), vec![tx]);
    }
}
