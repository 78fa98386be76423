//! Striped async locks (§5): one mutex per shard, keyed by hashing a
//! `Uuid` into a fixed shard count. Used to serialize concurrent
//! operations against the same transaction or creator without the
//! unbounded memory growth of a lock-per-id map.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub struct StripedLocks {
    shards: Vec<Arc<Mutex<()>>>,
}

impl StripedLocks {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self { shards: (0..shard_count).map(|_| Arc::new(Mutex::new(()))).collect() }
    }

    fn shard_for(&self, key: Uuid) -> &Arc<Mutex<()>> {
        let (_, low) = key.as_u64_pair();
        &self.shards[(low as usize) % self.shards.len()]
    }

    pub async fn lock(&self, key: Uuid) -> MutexGuard<'_, ()> {
        self.shard_for(key).lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serializes_through_the_same_shard() {
        let locks = StripedLocks::new(4);
        let key = Uuid::new_v4();
        let _first = locks.lock(key).await;
        // A second, distinct key may or may not share a shard; this
        // just confirms acquiring a guard doesn't panic or deadlock
        // the test harness itself.
        drop(_first);
        let _second = locks.lock(key).await;
    }
}
