use tokio::task::JoinHandle;

use super::audio::AudioAssets;
use super::model::{Narrator, UnitId};

/// Fetches the asset that will play next into the asset cache so the real
/// `play` finds it there. Holds at most one warm-up at a time.
pub struct PreloadBuffer {
    assets: AudioAssets,
    pending: Option<(String, JoinHandle<()>)>,
}

impl PreloadBuffer {
    pub fn new(assets: AudioAssets) -> Self {
        Self {
            assets,
            pending: None,
        }
    }

    /// Starts fetching `unit` under `narrator` in the background. Replaces
    /// any earlier warm-up. Failures only cost latency later, so they are
    /// logged and dropped.
    pub fn warm(&mut self, unit: UnitId, narrator: Narrator) {
        let url = self.assets.url(narrator, unit);
        if let Some((pending_url, task)) = &self.pending {
            if *pending_url == url && !task.is_finished() {
                return;
            }
        }
        self.cancel();

        let assets = self.assets.clone();
        let task = tokio::spawn(async move {
            if assets.is_cached(narrator, unit).await {
                return;
            }
            match assets.fetch(narrator, unit).await {
                Ok(asset) => log::debug!("preloaded {} ({} bytes)", asset.url, asset.data.len()),
                Err(e) => log::warn!("preload of unit {} ({}) failed: {}", unit, narrator.slug(), e),
            }
        });
        self.pending = Some((url, task));
    }

    pub fn cancel(&mut self) {
        if let Some((_, task)) = self.pending.take() {
            task.abort();
        }
    }

    pub fn is_warming(&self) -> bool {
        self.pending.as_ref().is_some_and(|(_, task)| !task.is_finished())
    }
}

impl Drop for PreloadBuffer {
    fn drop(&mut self) {
        self.cancel();
    }
}
