//! Resizable counting-permit gate for in-flight range fetches.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::instrument;

/// The most simultaneous range fetches a gate will ever admit, regardless of
/// the configured concurrency preference.
pub const MAX_PERMITS: usize = 3;

/// A held fetch permit. Dropping it returns capacity to the pool that
/// granted it (which may no longer be the gate's current pool after a
/// resize).
pub type FetchPermit = OwnedSemaphorePermit;

/// Bounded-permit gate limiting simultaneous in-flight range fetches.
///
/// The permit count follows a user concurrency preference clamped to
/// `1..=`[`MAX_PERMITS`]. [`resize`](Self::resize) swaps in a fresh semaphore
/// atomically: requests arriving afterwards draw from the new pool, while
/// permits already granted from the old pool remain valid until dropped (and
/// never return to the new pool).
///
/// # Examples
///
/// ```
/// use imprint_fetch::FetchGate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = FetchGate::new(2);
/// let _permit = gate.acquire().await.unwrap();
/// gate.resize(1).await;
/// # }
/// ```
#[derive(Debug)]
pub struct FetchGate {
    pool: RwLock<Arc<Semaphore>>,
}

impl FetchGate {
    /// Create a gate with `permits` clamped to `1..=`[`MAX_PERMITS`].
    pub fn new(permits: usize) -> Self {
        Self {
            pool: RwLock::new(Arc::new(Semaphore::new(Self::clamp(permits)))),
        }
    }

    fn clamp(permits: usize) -> usize {
        permits.clamp(1, MAX_PERMITS)
    }

    /// Suspend until a permit is free, then take it.
    ///
    /// Never blocks when capacity is available. No fairness guarantee beyond
    /// the FIFO-ish release order of the underlying semaphore.
    #[instrument(level = "trace", skip(self))]
    pub async fn acquire(&self) -> Result<FetchPermit> {
        // Clone the current pool out of the lock so a concurrent resize is
        // never blocked behind waiters queued on the semaphore itself.
        let pool = self.pool.read().await.clone();
        pool.acquire_owned().await.or_raise(|| ErrorKind::GateClosed)
    }

    /// Replace the permit pool with a fresh one of `permits` capacity
    /// (clamped to `1..=`[`MAX_PERMITS`]).
    ///
    /// Permits already held keep their original pool alive until released;
    /// they are never revoked and never migrate.
    #[instrument(level = "debug", skip(self))]
    pub async fn resize(&self, permits: usize) {
        let fresh = Arc::new(Semaphore::new(Self::clamp(permits)));
        *self.pool.write().await = fresh;
    }

    /// Permits currently available in the active pool.
    pub async fn available(&self) -> usize {
        self.pool.read().await.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(3, 3)]
    #[case(7, 3)]
    #[tokio::test]
    async fn test_clamping(#[case] configured: usize, #[case] expected: usize) {
        let gate = FetchGate::new(configured);
        assert_eq!(gate.available().await, expected);
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let gate = FetchGate::new(2);
        let first = gate.acquire().await.unwrap();
        let second = gate.acquire().await.unwrap();
        assert_eq!(gate.available().await, 0);
        // A third acquire must not complete while both permits are held.
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), gate.acquire());
        assert!(pending.await.is_err());
        drop(first);
        let third = gate.acquire().await.unwrap();
        drop(second);
        drop(third);
    }

    #[tokio::test]
    async fn test_resize_does_not_revoke_held_permits() {
        let gate = FetchGate::new(3);
        let held = gate.acquire().await.unwrap();
        gate.resize(1).await;
        // The fresh pool has its full capacity despite the outstanding permit.
        assert_eq!(gate.available().await, 1);
        let fresh = gate.acquire().await.unwrap();
        assert_eq!(gate.available().await, 0);
        // Releasing the old-pool permit does not refill the new pool.
        drop(held);
        assert_eq!(gate.available().await, 0);
        drop(fresh);
        assert_eq!(gate.available().await, 1);
    }

    #[tokio::test]
    async fn test_resize_up_admits_more() {
        let gate = FetchGate::new(1);
        let _held = gate.acquire().await.unwrap();
        gate.resize(3).await;
        let _a = gate.acquire().await.unwrap();
        let _b = gate.acquire().await.unwrap();
        let _c = gate.acquire().await.unwrap();
        assert_eq!(gate.available().await, 0);
    }
}
