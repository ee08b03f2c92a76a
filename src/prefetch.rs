use crate::backend::Backend;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use tracing::{debug, warn};

/// On-disk cover cache keyed by appid. Population is an optimization only;
/// a missing or unavailable cache never affects catalog correctness.
#[derive(Debug, Clone)]
pub struct AssetCache {
    dir: PathBuf,
    available: bool,
}

impl AssetCache {
    pub fn open(dir: &Path) -> Self {
        let available = match fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(err) => {
                warn!("cover cache unavailable at {}: {err}", dir.display());
                false
            }
        };
        Self {
            dir: dir.to_path_buf(),
            available,
        }
    }

    fn path_for(&self, app_id: u32) -> PathBuf {
        self.dir.join(format!("{app_id}.jpg"))
    }

    pub fn contains(&self, app_id: u32) -> bool {
        self.available && self.path_for(app_id).exists()
    }

    /// Never blocks on the network; absent means the caller should fall back
    /// to the canonical remote URL.
    pub fn resolve_cached(&self, app_id: u32) -> Option<PathBuf> {
        if !self.available {
            return None;
        }
        let path = self.path_for(app_id);
        path.exists().then_some(path)
    }

    pub fn store(&self, app_id: u32, bytes: &[u8]) -> bool {
        if !self.available {
            return false;
        }
        match fs::write(self.path_for(app_id), bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to cache cover for {app_id}: {err}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrefetchPolicy {
    /// Leading entries fetched with full concurrency, presentation priority order.
    pub priority_count: usize,
    pub chunk_size: usize,
    pub pause: Duration,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self {
            priority_count: 12,
            chunk_size: 6,
            pause: Duration::from_millis(100),
        }
    }
}

impl PrefetchPolicy {
    pub fn immediate() -> Self {
        Self {
            pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Best-effort cover prefetch. Returns the number of covers newly cached;
/// individual failures are logged and swallowed.
pub fn prefetch(
    backend: &dyn Backend,
    cache: &AssetCache,
    app_ids: &[u32],
    policy: PrefetchPolicy,
) -> usize {
    if !cache.available {
        debug!("cover cache unavailable, skipping prefetch");
        return 0;
    }

    let priority_count = policy.priority_count.min(app_ids.len());
    let (priority, remainder) = app_ids.split_at(priority_count);

    let mut cached = fetch_concurrently(backend, cache, priority);
    debug!("prefetched {cached} priority covers");

    let chunk_size = policy.chunk_size.max(1);
    let chunk_count = (remainder.len() + chunk_size - 1) / chunk_size;
    for (index, chunk) in remainder.chunks(chunk_size).enumerate() {
        cached += fetch_concurrently(backend, cache, chunk);
        if index + 1 < chunk_count && !policy.pause.is_zero() {
            thread::sleep(policy.pause);
        }
    }
    cached
}

fn fetch_concurrently(backend: &dyn Backend, cache: &AssetCache, app_ids: &[u32]) -> usize {
    let mut cached = 0;
    thread::scope(|scope| {
        let handles: Vec<_> = app_ids
            .iter()
            .map(|&app_id| scope.spawn(move || prefetch_one(backend, cache, app_id)))
            .collect();
        for handle in handles {
            if handle.join().unwrap_or(false) {
                cached += 1;
            }
        }
    });
    cached
}

fn prefetch_one(backend: &dyn Backend, cache: &AssetCache, app_id: u32) -> bool {
    if cache.contains(app_id) {
        return false;
    }
    match backend.fetch_cover(app_id) {
        Ok(bytes) => cache.store(app_id, &bytes),
        Err(err) => {
            debug!("cover prefetch failed for {app_id}: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CatalogPayload, CompatibilityPayload, FetchError};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeBackend {
        failing: Vec<u32>,
        fetched: Mutex<Vec<u32>>,
    }

    impl FakeBackend {
        fn new(failing: Vec<u32>) -> Self {
            Self {
                failing,
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    impl Backend for FakeBackend {
        fn fetch_catalog(&self, _ids: &[String]) -> Result<CatalogPayload, FetchError> {
            unimplemented!("not used by prefetch")
        }

        fn fetch_compatibility(&self, _app_id: u32) -> Result<CompatibilityPayload, FetchError> {
            unimplemented!("not used by prefetch")
        }

        fn fetch_cover(&self, app_id: u32) -> Result<Vec<u8>, FetchError> {
            self.fetched.lock().unwrap().push(app_id);
            if self.failing.contains(&app_id) {
                return Err(FetchError::Status(404));
            }
            Ok(vec![0xff, 0xd8, 0xff])
        }
    }

    #[test]
    fn resolve_cached_is_absent_until_stored() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::open(dir.path());
        assert_eq!(cache.resolve_cached(730), None);

        assert!(cache.store(730, &[1, 2, 3]));
        let path = cache.resolve_cached(730).unwrap();
        assert_eq!(fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn prefetch_caches_everything_and_swallows_failures() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::open(dir.path());
        let backend = FakeBackend::new(vec![5]);
        let app_ids: Vec<u32> = (1..=20).collect();

        let cached = prefetch(&backend, &cache, &app_ids, PrefetchPolicy::immediate());
        assert_eq!(cached, 19);
        assert!(cache.resolve_cached(5).is_none());
        assert!(cache.resolve_cached(20).is_some());
    }

    #[test]
    fn already_cached_covers_are_not_refetched() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::open(dir.path());
        cache.store(2, &[9]);
        let backend = FakeBackend::new(Vec::new());

        let cached = prefetch(&backend, &cache, &[1, 2, 3], PrefetchPolicy::immediate());
        assert_eq!(cached, 2);
        assert!(!backend.fetched.lock().unwrap().contains(&2));
    }

    #[test]
    fn empty_id_list_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let cache = AssetCache::open(dir.path());
        let backend = FakeBackend::new(Vec::new());
        assert_eq!(prefetch(&backend, &cache, &[], PrefetchPolicy::immediate()), 0);
    }
}
