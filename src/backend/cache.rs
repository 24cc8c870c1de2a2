use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_MEMORY_ASSETS: usize = 32;
const MAX_DISK_CACHE_MB: u64 = 200;

/// Narration bytes keyed by asset URL: a small in-memory LRU in front of an
/// optional on-disk cache.
#[derive(Clone)]
pub struct AssetCache {
    inner: Arc<RwLock<AssetCacheInner>>,
}

struct AssetCacheInner {
    assets: HashMap<String, Arc<[u8]>>,
    access_order: Vec<String>,
    cache_dir: Option<PathBuf>,
}

impl AssetCache {
    /// Cache backed by `{cache_dir}/taha-tui/audio`.
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taha-tui")
            .join("audio");

        match fs::create_dir_all(&cache_dir) {
            Ok(()) => Self::with_dir(Some(cache_dir)),
            Err(e) => {
                log::warn!("audio disk cache disabled, cannot create {}: {}", cache_dir.display(), e);
                Self::with_dir(None)
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::with_dir(None)
    }

    pub fn with_dir(cache_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AssetCacheInner {
                assets: HashMap::new(),
                access_order: Vec::new(),
                cache_dir,
            })),
        }
    }

    pub async fn get(&self, url: &str) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.write().await;

        if let Some(data) = inner.assets.get(url).cloned() {
            inner.access_order.retain(|k| k != url);
            inner.access_order.push(url.to_string());
            return Some(data);
        }

        if let Some(data) = inner.load_from_disk(url) {
            inner.insert_memory(url.to_string(), data.clone());
            return Some(data);
        }

        None
    }

    pub async fn insert(&self, url: String, data: Arc<[u8]>) {
        let mut inner = self.inner.write().await;
        inner.save_to_disk(&url, &data);
        inner.insert_memory(url, data);
    }

    pub async fn contains(&self, url: &str) -> bool {
        let inner = self.inner.read().await;
        if inner.assets.contains_key(url) {
            return true;
        }
        inner.disk_cache_exists(url)
    }
}

impl AssetCacheInner {
    fn insert_memory(&mut self, url: String, data: Arc<[u8]>) {
        if self.assets.len() >= MAX_MEMORY_ASSETS && !self.assets.contains_key(&url) {
            if let Some(oldest) = self.access_order.first().cloned() {
                self.assets.remove(&oldest);
                self.access_order.remove(0);
            }
        }

        self.access_order.retain(|k| k != &url);
        self.access_order.push(url.clone());
        self.assets.insert(url, data);
    }

    fn url_to_filename(&self, url: &str) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let digest = Sha1::digest(url.as_bytes());
        Some(dir.join(format!("{}.mp3", hex::encode(digest))))
    }

    fn disk_cache_exists(&self, url: &str) -> bool {
        self.url_to_filename(url).is_some_and(|p| p.exists())
    }

    fn load_from_disk(&self, url: &str) -> Option<Arc<[u8]>> {
        let path = self.url_to_filename(url)?;
        let bytes = fs::read(&path).ok()?;
        if bytes.is_empty() {
            return None;
        }
        Some(Arc::from(bytes))
    }

    fn save_to_disk(&self, url: &str, data: &[u8]) {
        let Some(path) = self.url_to_filename(url) else {
            return;
        };
        self.cleanup_old_cache();

        // a file only appears under its final name once fully written
        let tmp = path.with_extension("mp3.tmp");
        let written = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            log::warn!("failed to write audio cache {}: {}", path.display(), e);
            let _ = fs::remove_file(&tmp);
        }
    }

    /// Deletes the least recently written files once the directory grows
    /// past its cap, down to 80% of it.
    fn cleanup_old_cache(&self) {
        let Some(dir) = self.cache_dir.as_ref() else {
            return;
        };
        let Ok(read_dir) = fs::read_dir(dir) else {
            return;
        };

        let mut files = Vec::new();
        for entry in read_dir.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if let Ok(modified) = meta.modified() {
                files.push((modified, meta.len(), entry.path()));
            }
        }

        let cap = MAX_DISK_CACHE_MB * 1024 * 1024;
        let mut used: u64 = files.iter().map(|(_, len, _)| len).sum();
        if used <= cap {
            return;
        }

        files.sort_unstable_by_key(|(modified, _, _)| *modified);
        let target = cap / 10 * 8;
        let mut evicted = 0;
        for (_, len, path) in files {
            if used <= target {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                used = used.saturating_sub(len);
                evicted += 1;
            }
        }
        log::debug!("evicted {} cached audio files", evicted);
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new()
    }
}
