//! Per-key coalescing of artifact production
//!
//! The first caller for a key spawns the work; callers arriving while it is
//! running await the same outcome instead of starting their own. The work
//! runs in its own task, so it completes even if every caller goes away.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinError;
use tracing::debug;

type Pending<E> = Shared<BoxFuture<'static, Result<(), E>>>;
type PendingMap<E> = Arc<Mutex<HashMap<String, Pending<E>>>>;

/// In-flight work keyed by artifact id
pub struct InFlight<E> {
    pending: PendingMap<E>,
}

/// Drops the map entry when the spawned work finishes, including by panic
struct Release<E> {
    pending: PendingMap<E>,
    key: String,
}

impl<E> Drop for Release<E> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<E> InFlight<E>
where
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys currently being produced
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `work` for `key` unless it is already running, then wait for the
    /// outcome.
    ///
    /// Returns the shared outcome and whether this call started the work.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> (Result<(), E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let (pending, led) = {
            let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(key) {
                Some(existing) => {
                    debug!(key, "Joining in-flight work");
                    (existing.clone(), false)
                }
                None => {
                    let release = Release {
                        pending: Arc::clone(&self.pending),
                        key: key.to_string(),
                    };
                    let fut = work();
                    // The entry is inserted before this lock is released, so
                    // the task cannot remove it early.
                    let handle = tokio::spawn(async move {
                        let _release = release;
                        fut.await
                    });
                    let shared = async move { handle.await.unwrap_or_else(|e| Err(E::from(e))) }
                        .boxed()
                        .shared();
                    map.insert(key.to_string(), shared.clone());
                    (shared, true)
                }
            }
        };

        (pending.await, led)
    }
}

impl<E> Default for InFlight<E>
where
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(String);

    impl From<JoinError> for TestError {
        fn from(err: JoinError) -> Self {
            TestError(err.to_string())
        }
    }

    #[tokio::test]
    async fn test_single_caller_leads() {
        let in_flight: InFlight<TestError> = InFlight::new();

        let (outcome, led) = in_flight.run("abc", || async { Ok(()) }).await;
        assert_eq!(outcome, Ok(()));
        assert!(led);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let in_flight: Arc<InFlight<TestError>> = Arc::new(InFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let leader = {
            let in_flight = Arc::clone(&in_flight);
            let runs = Arc::clone(&runs);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                in_flight
                    .run("abc", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };

        // Wait until the leader has registered its work
        while in_flight.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let follower = {
            let in_flight = Arc::clone(&in_flight);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                in_flight
                    .run("abc", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        let (leader_outcome, leader_led) = leader.await.unwrap();
        let (follower_outcome, follower_led) = follower.await.unwrap();

        assert_eq!(leader_outcome, Ok(()));
        assert_eq!(follower_outcome, Ok(()));
        assert!(leader_led);
        assert!(!follower_led);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_key_released() {
        let in_flight: InFlight<TestError> = InFlight::new();

        let (outcome, _) = in_flight
            .run("abc", || async { Err(TestError("boom".into())) })
            .await;
        assert_eq!(outcome, Err(TestError("boom".into())));
        assert!(in_flight.is_empty());

        // A later call starts fresh
        let (outcome, led) = in_flight.run("abc", || async { Ok(()) }).await;
        assert_eq!(outcome, Ok(()));
        assert!(led);
    }

    #[tokio::test]
    async fn test_panicking_work_becomes_error() {
        let in_flight: InFlight<TestError> = InFlight::new();

        let (outcome, led) = in_flight
            .run("abc", || async {
                if true {
                    panic!("work panicked");
                }
                Ok(())
            })
            .await;
        assert!(outcome.is_err());
        assert!(led);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let in_flight: InFlight<TestError> = InFlight::new();

        let ((a, a_led), (b, b_led)) = tokio::join!(
            in_flight.run("a", || async { Ok(()) }),
            in_flight.run("b", || async { Err(TestError("b failed".into())) }),
        );

        assert!(a_led && b_led);
        assert_eq!(a, Ok(()));
        assert_eq!(b, Err(TestError("b failed".into())));
    }
}
