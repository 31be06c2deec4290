//! Process-local keyed exclusive locks.
//!
//! `spec.md` §4.5/§4.8 require every write path on an aggregate (License,
//! Scope) to execute under "an exclusive row-level lock on the License"
//! before re-reading its current state. `mhub-database`'s SurrealDB wrapper
//! exposes no row-lock primitive of its own (`migrations.rs`'s
//! `BEGIN TRANSACTION` blocks serialize a fixed, known statement sequence,
//! not an arbitrary read-decide-write critical section keyed by a runtime
//! id). This module supplies that missing primitive for a single process:
//! one `tokio::sync::Mutex` per distinct key, created on first use and kept
//! alive for the life of the process.
//!
//! This bounds the guarantee to one server instance. `spec.md` §5 allows a
//! multi-host deployment "provided each state-changing operation executes
//! within a transaction against the same store" — a cross-host deployment
//! needs the store itself to supply the lock (e.g. an `UPDATE ... WHERE`
//! compare-and-swap, or a dedicated row-lock table), which is store-specific
//! and out of this crate's scope per `spec.md` §1's "persistence engine
//! choice" exclusion. Single-process deployments, the common case for this
//! kind of internal licensing service, get the full guarantee.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>;

static LOCKS: LazyLock<Registry> = LazyLock::new(|| StdMutex::new(HashMap::new()));

fn entry(namespace: &str, key: &str) -> Arc<AsyncMutex<()>> {
    let full_key = format!("{namespace}:{key}");
    let mut registry = LOCKS.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    registry.entry(full_key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Acquires the exclusive lock for `(namespace, key)`, blocking until any
/// other holder releases it. The returned guard releases the lock on drop.
///
/// `namespace` separates aggregate kinds (`"license"`, `"scope"`) sharing
/// the same registry so a license id and a scope slug can never collide.
pub async fn acquire(namespace: &str, key: &str) -> OwnedMutexGuard<()> {
    entry(namespace, key).lock_owned().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_concurrent_holders_of_the_same_key() {
        let counter = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = counter.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = acquire("test-serialize", "shared").await;
                let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.expect("task completes");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1, "never more than one holder at a time");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let start = std::time::Instant::now();
        let a = acquire("test-distinct", "a").await;
        let b = acquire("test-distinct", "b").await;
        drop(a);
        drop(b);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
