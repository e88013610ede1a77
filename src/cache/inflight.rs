//! In-Flight Registry Module
//!
//! Coalesces concurrent misses for the same key into one computation.

use std::future::Future;
use std::hash::Hash;
use std::ptr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

type Call<V> = Arc<OnceCell<V>>;

// == In-Flight Registry ==
/// Per-key markers for computations that have not settled yet.
///
/// The first caller for a key runs its computation, later callers for the
/// same key wait for that result instead of starting their own. A failed
/// computation is never shared: its error goes to the caller that ran it
/// and the next waiter in line runs its own computation.
#[derive(Debug)]
pub struct InFlight<K, V>
where
    K: Eq + Hash,
{
    calls: DashMap<K, Call<V>>,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    /// Number of keys with a computation in flight.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Forgets every marker. Callers already waiting keep their own handle.
    pub fn clear(&self) {
        self.calls.clear();
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Run ==
    /// Runs `compute` for `key` unless a computation for it is already in
    /// flight, in which case its result is awaited and shared.
    pub async fn run<E, F, Fut>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let call = Arc::clone(
            self.calls
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        // settles on every exit path, including a dropped caller
        let mut settle = Settle {
            calls: &self.calls,
            key,
            call: None,
        };
        let call = settle.call.insert(call);

        let result = call.get_or_try_init(compute).await.cloned();
        result
    }
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

// == Settle Guard ==
/// Drops the marker for `key` once it holds a value, or once nobody else is
/// waiting on it.
///
/// A failed marker with waiters stays registered so that new callers queue
/// behind the waiter that retries instead of racing it.
struct Settle<'a, K, V>
where
    K: Eq + Hash,
{
    calls: &'a DashMap<K, Call<V>>,
    key: K,
    call: Option<Call<V>>,
}

impl<K, V> Drop for Settle<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let Some(call) = self.call.take() else {
            return;
        };
        // release this handle first, the last guard out then finds only the map's
        let marker = Arc::downgrade(&call);
        drop(call);

        self.calls.remove_if(&self.key, |_, current| {
            ptr::eq(Arc::as_ptr(current), marker.as_ptr())
                && (current.initialized() || Arc::strong_count(current) == 1)
        });
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, assert_ready_ok, task};

    #[tokio::test]
    async fn test_run_returns_value_and_settles() {
        let in_flight: InFlight<&str, u32> = InFlight::new();

        let value = in_flight.run("key", || async { Ok::<_, ()>(7) }).await;

        assert_eq!(value, Ok(7));
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_run_error_is_not_shared() {
        let in_flight: InFlight<&str, u32> = InFlight::new();

        let failed = in_flight.run("key", || async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));
        assert!(in_flight.is_empty());

        let retried = in_flight.run("key", || async { Ok::<_, &str>(9) }).await;
        assert_eq!(retried, Ok(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_share_one_computation() {
        let in_flight: Arc<InFlight<&str, u32>> = Arc::new(InFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    in_flight
                        .run("key", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok::<_, ()>(42)
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_observes_leader_result() {
        let in_flight: InFlight<&str, u32> = InFlight::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        let mut leader = task::spawn(in_flight.run("key", || async move {
            Ok::<_, ()>(rx.await.unwrap_or_default())
        }));
        assert_pending!(leader.poll());
        assert_eq!(in_flight.len(), 1);

        let mut waiter = task::spawn(in_flight.run("key", || async { Ok::<_, ()>(0) }));
        assert_pending!(waiter.poll());

        tx.send(5).unwrap();
        assert_eq!(assert_ready_ok!(leader.poll()), 5);
        assert!(waiter.is_woken());
        assert_eq!(assert_ready!(waiter.poll()), Ok(5));
        assert!(in_flight.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failures_settling_together_leave_no_marker() {
        let in_flight: Arc<InFlight<u32, u32>> = Arc::new(InFlight::new());

        for round in 0..50 {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let in_flight = Arc::clone(&in_flight);
                    tokio::spawn(async move {
                        in_flight
                            .run(round, || async {
                                tokio::task::yield_now().await;
                                Err::<u32, _>("unavailable")
                            })
                            .await
                    })
                })
                .collect();

            for handle in handles {
                assert_eq!(handle.await.unwrap(), Err("unavailable"));
            }
        }

        assert!(in_flight.is_empty(), "{} markers left behind", in_flight.len());
    }

    #[tokio::test]
    async fn test_dropped_leader_hands_over_to_waiter() {
        let in_flight: InFlight<&str, u32> = InFlight::new();

        let mut leader = task::spawn(
            in_flight.run("key", || std::future::pending::<Result<u32, ()>>()),
        );
        assert_pending!(leader.poll());

        let mut waiter = task::spawn(in_flight.run("key", || async { Ok::<_, ()>(3) }));
        assert_pending!(waiter.poll());

        drop(leader);
        assert_eq!(assert_ready!(waiter.poll()), Ok(3));
        assert!(in_flight.is_empty());
    }
}
