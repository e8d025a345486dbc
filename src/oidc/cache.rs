// std
use std::time::Instant;
// self
use crate::_prelude::*;

/// Cached value tagged with the generation it was stored under.
#[derive(Debug)]
pub(crate) struct Cached<V> {
	pub(crate) value: Arc<V>,
	pub(crate) generation: u64,
}
impl<V> Clone for Cached<V> {
	fn clone(&self) -> Self {
		Self { value: self.value.clone(), generation: self.generation }
	}
}

struct Entry<V> {
	cached: Cached<V>,
	fetched_at: Instant,
}

/// TTL cache whose misses are fetched once per key, however many callers wait.
///
/// A caller that found a cached value unusable (e.g. a JWKS lacking a new `kid`) passes that
/// value's generation as `stale`; the entry is then refetched unless another caller already
/// replaced it in the meantime.
pub(crate) struct SingleflightCache<V> {
	ttl: StdDuration,
	entries: Mutex<HashMap<String, Entry<V>>>,
	guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl<V> SingleflightCache<V> {
	pub(crate) fn new(ttl: StdDuration) -> Self {
		Self { ttl, entries: Default::default(), guards: Default::default() }
	}

	pub(crate) async fn get_or_fetch<F, Fut>(
		&self,
		key: &str,
		stale: Option<u64>,
		fetch: F,
	) -> Result<Cached<V>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V>>,
	{
		if let Some(cached) = self.usable(key, stale) {
			return Ok(cached);
		}

		let guard = self.guard(key);
		let _lock = guard.lock().await;

		if let Some(cached) = self.usable(key, stale) {
			return Ok(cached);
		}

		let value = Arc::new(fetch().await?);
		let mut entries = self.entries.lock();
		let generation = entries.get(key).map_or(1, |entry| entry.cached.generation + 1);
		let cached = Cached { value, generation };

		entries.insert(
			key.to_owned(),
			Entry { cached: cached.clone(), fetched_at: Instant::now() },
		);

		Ok(cached)
	}

	fn usable(&self, key: &str, stale: Option<u64>) -> Option<Cached<V>> {
		let entries = self.entries.lock();
		let entry = entries.get(key)?;

		if entry.fetched_at.elapsed() >= self.ttl || Some(entry.cached.generation) == stale {
			return None;
		}

		Some(entry.cached.clone())
	}

	fn guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
		self.guards.lock().entry(key.to_owned()).or_default().clone()
	}
}
impl<V> Debug for SingleflightCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleflightCache")
			.field("ttl", &self.ttl)
			.field("entries", &self.entries.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn concurrent_misses_fetch_once() {
		let cache = Arc::new(SingleflightCache::<u32>::new(StdDuration::from_secs(60)));
		let fetches = Arc::new(AtomicU32::new(0));
		let tasks: Vec<_> = (0..8)
			.map(|_| {
				let cache = cache.clone();
				let fetches = fetches.clone();

				tokio::spawn(async move {
					cache
						.get_or_fetch("https://idp.example/jwks", None, || async move {
							fetches.fetch_add(1, Ordering::SeqCst);
							tokio::time::sleep(StdDuration::from_millis(20)).await;

							Ok(7)
						})
						.await
						.expect("Fetch should succeed.")
				})
			})
			.collect();

		for task in tasks {
			assert_eq!(*task.await.expect("Task should not panic.").value, 7);
		}

		assert_eq!(fetches.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn stale_generation_forces_one_refetch() {
		let cache = SingleflightCache::<u32>::new(StdDuration::from_secs(60));
		let first = cache
			.get_or_fetch("k", None, || async { Ok(1) })
			.await
			.expect("Fetch should succeed.");
		let hit = cache
			.get_or_fetch("k", None, || async { Ok(99) })
			.await
			.expect("Cache hit should succeed.");

		assert_eq!((*hit.value, hit.generation), (1, 1));

		let refreshed = cache
			.get_or_fetch("k", Some(first.generation), || async { Ok(2) })
			.await
			.expect("Refetch should succeed.");

		assert_eq!((*refreshed.value, refreshed.generation), (2, 2));

		// A second caller holding the same stale generation reuses the refreshed value.
		let reused = cache
			.get_or_fetch("k", Some(first.generation), || async { Ok(3) })
			.await
			.expect("Cache hit should succeed.");

		assert_eq!(*reused.value, 2);
	}

	#[tokio::test]
	async fn expired_entries_are_refetched_and_errors_are_not_cached() {
		let cache = SingleflightCache::<u32>::new(StdDuration::ZERO);

		cache.get_or_fetch("k", None, || async { Ok(1) }).await.expect("Fetch should succeed.");

		let refetched =
			cache.get_or_fetch("k", None, || async { Ok(2) }).await.expect("Fetch should succeed.");

		assert_eq!(*refetched.value, 2);

		let cache = SingleflightCache::<u32>::new(StdDuration::from_secs(60));

		cache
			.get_or_fetch("k", None, || async { Err(Error::Timeout { operation: "jwks endpoint" }) })
			.await
			.expect_err("Failure should surface.");

		let value =
			cache.get_or_fetch("k", None, || async { Ok(5) }).await.expect("Fetch should succeed.");

		assert_eq!(*value.value, 5);
	}
}
