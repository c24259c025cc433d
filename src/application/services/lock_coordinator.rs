use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::errors::LockError;
use crate::application::ports::LeaseBackend;
use crate::domain::entities::Lease;
use crate::domain::value_objects::{LockKey, LockToken};

/// How long a lease lives and how hard to try for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasePolicy {
    pub lease: Duration,
    pub retry_interval: Duration,
    /// Extra attempts after the first; 0 means fail immediately on contention
    pub max_retries: u32,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(30),
            retry_interval: Duration::from_millis(100),
            max_retries: 0,
        }
    }
}

impl LeasePolicy {
    pub fn non_blocking(lease: Duration) -> Self {
        Self {
            lease,
            ..Self::default()
        }
    }

    pub fn blocking(lease: Duration, retry_interval: Duration, max_retries: u32) -> Self {
        Self {
            lease,
            retry_interval,
            max_retries,
        }
    }
}

/// Lease-based mutual exclusion across service instances
///
/// Leases expire unconditionally, so a critical section that outlives its
/// lease can lose it to another caller. Keep guarded sections short.
/// Not reentrant: a holder acquiring its own key again is refused.
#[derive(Clone)]
pub struct LockCoordinator {
    backend: Arc<dyn LeaseBackend>,
}

impl LockCoordinator {
    pub fn new(backend: Arc<dyn LeaseBackend>) -> Self {
        Self { backend }
    }

    /// Single non-blocking attempt
    pub async fn acquire(&self, key: &LockKey, lease: Duration) -> Result<Lease, LockError> {
        let token = LockToken::generate();
        if self.backend.try_set_if_absent(key, &token, lease).await? {
            debug!(key = %key, "Lease acquired");
            return Ok(Lease::new(key.clone(), token, lease));
        }

        Err(LockError::Contended {
            key: key.to_string(),
        })
    }

    /// Retry at a fixed interval, up to `max_retries` extra attempts
    pub async fn acquire_blocking(
        &self,
        key: &LockKey,
        lease: Duration,
        retry_interval: Duration,
        max_retries: u32,
    ) -> Result<Lease, LockError> {
        for attempt in 0..=max_retries {
            match self.acquire(key, lease).await {
                Err(LockError::Contended { .. }) if attempt < max_retries => {
                    tokio::time::sleep(retry_interval).await;
                }
                other => return other,
            }
        }

        Err(LockError::Contended {
            key: key.to_string(),
        })
    }

    pub async fn acquire_with(
        &self,
        key: &LockKey,
        policy: &LeasePolicy,
    ) -> Result<Lease, LockError> {
        self.acquire_blocking(key, policy.lease, policy.retry_interval, policy.max_retries)
            .await
    }

    /// Compare-and-delete release
    ///
    /// Returns `false` when the lease had already expired or been taken over;
    /// that is logged, not treated as an error.
    pub async fn release(&self, key: &LockKey, token: &LockToken) -> Result<bool, LockError> {
        let released = self.backend.compare_and_delete(key, token).await?;
        if released {
            debug!(key = %key, "Lease released");
        } else {
            warn!(key = %key, "Lease was no longer held at release; it expired or was taken over");
        }
        Ok(released)
    }

    /// Run `f` while holding the lease on `key`
    ///
    /// The lease is released whether `f` succeeds or fails. If the returned
    /// future is dropped mid-flight (cancellation or panic), a drop guard
    /// spawns the release on the current runtime.
    pub async fn with_lease<F, Fut, T, E>(
        &self,
        key: &LockKey,
        policy: &LeasePolicy,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let lease = self.acquire_with(key, policy).await?;
        let mut guard = LeaseGuard {
            backend: Arc::clone(&self.backend),
            lease: Some(lease),
        };

        let result = f().await;

        if let Some(lease) = guard.lease.take() {
            if let Err(e) = self.release(lease.key(), lease.token()).await {
                // The section already ran; the lease will lapse on its own
                warn!(key = %lease.key(), error = %e, "Failed to release lease");
            }
        }
        result
    }
}

struct LeaseGuard {
    backend: Arc<dyn LeaseBackend>,
    lease: Option<Lease>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let backend = Arc::clone(&self.backend);
                handle.spawn(async move {
                    if let Err(e) = backend.compare_and_delete(lease.key(), lease.token()).await {
                        warn!(key = %lease.key(), error = %e, "Failed to release abandoned lease");
                    }
                });
            }
            Err(_) => {
                warn!(key = %lease.key(), "Lease abandoned outside a runtime; it will expire");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockLeaseBackend, RepositoryError};
    use crate::infrastructure::memory::InMemoryLeaseBackend;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn key() -> LockKey {
        LockKey::new("folder:1:0:reports").unwrap()
    }

    fn fast_policy(max_retries: u32) -> LeasePolicy {
        LeasePolicy::blocking(Duration::from_secs(30), Duration::from_millis(1), max_retries)
    }

    #[tokio::test]
    async fn test_acquire_returns_lease_for_key() {
        let mut backend = MockLeaseBackend::new();
        backend
            .expect_try_set_if_absent()
            .times(1)
            .returning(|_, _, _| Ok(true));

        let coordinator = LockCoordinator::new(Arc::new(backend));
        let lease = coordinator
            .acquire(&key(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(lease.key(), &key());
        assert!(!lease.is_expired());
    }

    #[tokio::test]
    async fn test_non_blocking_acquire_fails_immediately() {
        let mut backend = MockLeaseBackend::new();
        backend
            .expect_try_set_if_absent()
            .times(1)
            .returning(|_, _, _| Ok(false));

        let coordinator = LockCoordinator::new(Arc::new(backend));
        let err = coordinator
            .acquire_with(&key(), &LeasePolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Contended { .. }));
    }

    #[tokio::test]
    async fn test_blocking_acquire_retries_until_free() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);

        let mut backend = MockLeaseBackend::new();
        backend
            .expect_try_set_if_absent()
            .times(3)
            .returning(move |_, _, _| Ok(seen.fetch_add(1, Ordering::SeqCst) == 2));

        let coordinator = LockCoordinator::new(Arc::new(backend));
        coordinator
            .acquire_with(&key(), &fast_policy(5))
            .await
            .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_blocking_acquire_gives_up_after_bound() {
        let mut backend = MockLeaseBackend::new();
        backend
            .expect_try_set_if_absent()
            .times(3)
            .returning(|_, _, _| Ok(false));

        let coordinator = LockCoordinator::new(Arc::new(backend));
        let err = coordinator
            .acquire_with(&key(), &fast_policy(2))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_retried() {
        let mut backend = MockLeaseBackend::new();
        backend
            .expect_try_set_if_absent()
            .times(1)
            .returning(|_, _, _| Err(RepositoryError::Internal("unreachable".into())));

        let coordinator = LockCoordinator::new(Arc::new(backend));
        let err = coordinator
            .acquire_with(&key(), &fast_policy(5))
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Backend(_)));
    }

    #[tokio::test]
    async fn test_with_lease_releases_on_error() {
        let mut backend = MockLeaseBackend::new();
        backend
            .expect_try_set_if_absent()
            .times(1)
            .returning(|_, _, _| Ok(true));
        backend
            .expect_compare_and_delete()
            .times(1)
            .returning(|_, _| Ok(true));

        let coordinator = LockCoordinator::new(Arc::new(backend));
        let result: Result<(), LockError> = coordinator
            .with_lease(&key(), &LeasePolicy::default(), || async {
                Err(LockError::Backend(RepositoryError::Internal("boom".into())))
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_with_lease_releases_on_success() {
        let backend = Arc::new(InMemoryLeaseBackend::new());
        let coordinator = LockCoordinator::new(backend.clone());

        let value: Result<u32, LockError> = coordinator
            .with_lease(&key(), &LeasePolicy::default(), || async { Ok(42) })
            .await;

        assert_eq!(value.unwrap(), 42);
        assert_eq!(backend.live_leases(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_section_releases_lease() {
        let backend = Arc::new(InMemoryLeaseBackend::new());
        let coordinator = LockCoordinator::new(backend.clone());

        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let _: Result<(), LockError> = coordinator
                    .with_lease(&key(), &LeasePolicy::default(), || async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(())
                    })
                    .await;
            })
        };

        while backend.live_leases() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        let _ = task.await;

        // Release is spawned from the guard's drop
        let lease = coordinator
            .acquire_blocking(&key(), Duration::from_secs(30), Duration::from_millis(5), 200)
            .await
            .unwrap();
        assert!(coordinator.release(lease.key(), lease.token()).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_is_false() {
        let backend = Arc::new(InMemoryLeaseBackend::new());
        let coordinator = LockCoordinator::new(backend);

        let lease = coordinator
            .acquire(&key(), Duration::from_secs(30))
            .await
            .unwrap();

        let stranger = LockToken::generate();
        assert!(!coordinator.release(&key(), &stranger).await.unwrap());
        assert!(coordinator.release(lease.key(), lease.token()).await.unwrap());
    }
}
